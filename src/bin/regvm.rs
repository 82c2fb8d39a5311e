// RegVM CLI - Command Line Interface
// Usage: regvm FILE [OPTIONS]

use clap::Parser;
use colored::*;
use std::fs;
use std::path::PathBuf;

use regvm::bytecode::disasm;
use regvm::{HostBindings, Value, Vm};

/// RegVM - a minimal register-based bytecode virtual machine
#[derive(Parser)]
#[command(name = "regvm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a pre-encoded bytecode stream", long_about = None)]
struct Cli {
    /// Bytecode file to run
    file: PathBuf,

    /// JSON file populating the global/document host roots
    #[arg(long = "host-state")]
    host_state: Option<PathBuf>,

    /// Debug options: asm, trace (comma-separated)
    #[arg(short = 'd', long = "debug", value_delimiter = ',')]
    debug: Option<Vec<String>>,

    /// Print the disassembly and exit without running
    #[arg(long = "no-run")]
    no_run: bool,
}

fn main() {
    let cli = Cli::parse();
    let debug = DebugFlags::from_options(&cli.debug);

    if let Err(e) = run(cli, debug) {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

#[derive(Default, Clone)]
struct DebugFlags {
    asm: bool,
    trace: bool,
}

impl DebugFlags {
    fn from_options(opts: &Option<Vec<String>>) -> Self {
        let mut flags = Self::default();
        if let Some(opts) = opts {
            for opt in opts {
                match opt.as_str() {
                    "asm" => flags.asm = true,
                    "trace" => flags.trace = true,
                    _ => eprintln!("{} Unknown debug option: {}", "!".yellow(), opt),
                }
            }
        }
        flags
    }
}

fn run(cli: Cli, debug: DebugFlags) -> Result<(), String> {
    let code = fs::read(&cli.file)
        .map_err(|e| format!("Error reading file '{}': {}", cli.file.display(), e))?;

    if debug.asm || cli.no_run {
        print!("{}", disasm::disassemble(&code));
        if cli.no_run {
            return Ok(());
        }
    }

    let bindings = match &cli.host_state {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| format!("Error reading file '{}': {}", path.display(), e))?;
            let json = serde_json::from_str(&text)
                .map_err(|e| format!("Invalid host state '{}': {}", path.display(), e))?;
            HostBindings::from_json(&json)
        }
        None => HostBindings::default(),
    };
    let bindings = with_default_natives(bindings);

    let mut vm = Vm::new(code, bindings);
    vm.set_trace(debug.trace);

    let result = vm.run().map_err(|e| e.to_string())?;
    println!("{}", result);
    Ok(())
}

/// Install the stock natives every stream can rely on. Currently just
/// `print`, attached to the global root.
fn with_default_natives(bindings: HostBindings) -> HostBindings {
    if let Value::Object(global) = &bindings.global {
        global.borrow_mut().set(
            "print",
            Value::native("print", |_, args| {
                let line: Vec<String> = args.iter().map(|v| v.to_string()).collect();
                println!("{}", line.join(" "));
                Ok(Value::Void)
            }),
        );
    }
    bindings
}
