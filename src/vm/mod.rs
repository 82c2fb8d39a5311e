pub mod host;
pub mod value;
pub mod vm;

pub use host::{HostBindings, HostEval, NoEval};
pub use value::{HostObject, NativeFn, NativeFunction, ObjectRef, Value};
pub use vm::Vm;
