// RegVM Runtime Values
// Dynamically-typed cells stored in the register file.
// Execution is single-threaded, so shared values use Rc/RefCell.

use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// Host function type: receiver binding plus positional arguments.
pub type NativeFn = Rc<dyn Fn(&Value, &[Value]) -> Result<Value, String>>;

/// A callable handle owned by the host environment.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub func: NativeFn,
}

impl NativeFunction {
    pub fn new(name: impl Into<String>, func: NativeFn) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// A host object handle: a shared property map the VM passes through but
/// does not own. The environment and document roots are values of this kind.
#[derive(Debug, Default)]
pub struct HostObject {
    pub props: FxHashMap<String, Value>,
}

impl HostObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Value {
        self.props.get(key).cloned().unwrap_or(Value::Void)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.props.insert(key.into(), value);
    }
}

pub type ObjectRef = Rc<RefCell<HostObject>>;

/// Runtime value kinds.
///
/// No static typing is enforced; opcodes fail with a type mismatch at
/// use-site when the runtime kind is wrong.
#[derive(Debug, Clone)]
pub enum Value {
    Void,
    Bool(bool),
    Number(f64),
    String(Rc<String>),
    Array(Rc<RefCell<Vec<Value>>>),
    Object(ObjectRef),
    Function(NativeFunction),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Rc::new(s.into()))
    }

    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn object() -> Self {
        Value::Object(Rc::new(RefCell::new(HostObject::new())))
    }

    pub fn object_from(object: HostObject) -> Self {
        Value::Object(Rc::new(RefCell::new(object)))
    }

    pub fn native(
        name: impl Into<String>,
        func: impl Fn(&Value, &[Value]) -> Result<Value, String> + 'static,
    ) -> Self {
        Value::Function(NativeFunction::new(name, Rc::new(func)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Void => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Same-kind equality. Shared handles compare by identity.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(&a.func, &b.func),
            _ => false,
        }
    }

    /// Coercing equality: numbers and strings compare through a numeric
    /// conversion, booleans convert to numbers first.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
                string_to_number(s).map(|v| v == *n).unwrap_or(false)
            }
            (Value::Bool(b), other) | (other, Value::Bool(b)) => {
                Value::Number(if *b { 1.0 } else { 0.0 }).loose_eq(other)
            }
            _ => self.strict_eq(other),
        }
    }

    /// Ordering for the relational comparison opcodes. Only numbers and
    /// strings are ordered.
    pub fn partial_cmp_value(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

fn string_to_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::String(s) => write!(f, "{}", s),
            Value::Array(arr) => {
                let items: Vec<String> = arr.borrow().iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Object(obj) => {
                let obj = obj.borrow();
                let mut keys: Vec<&String> = obj.props.keys().collect();
                keys.sort();
                let items: Vec<String> = keys
                    .iter()
                    .map(|k| format!("\"{}\": {}", k, obj.props[*k]))
                    .collect();
                write!(f, "{{{}}}", items.join(", "))
            }
            Value::Function(func) => write!(f, "<function {}>", func.name),
        }
    }
}
