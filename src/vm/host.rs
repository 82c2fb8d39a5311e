// RegVM Host Interop
// The seam between the VM and the environment that embeds it.

use crate::vm::value::{HostObject, Value};
use serde_json::Value as JsonValue;

/// Evaluates host-language source on behalf of the EVAL opcode.
///
/// The VM bundles no expression engine; embedders install one through this
/// trait (or a closure, via the blanket impl). Whatever the evaluator returns
/// lands in the destination register; whatever it rejects surfaces as a
/// `HostEvaluationFailure`.
pub trait HostEval {
    fn eval(&mut self, source: &str) -> Result<Value, String>;
}

impl<F> HostEval for F
where
    F: FnMut(&str) -> Result<Value, String>,
{
    fn eval(&mut self, source: &str) -> Result<Value, String> {
        self(source)
    }
}

/// Default evaluator: reports the missing capability instead of executing.
pub struct NoEval;

impl HostEval for NoEval {
    fn eval(&mut self, _source: &str) -> Result<Value, String> {
        Err("no host evaluator installed".to_string())
    }
}

/// Host roots injected at VM construction.
///
/// The VM never inspects their structure; it only routes PROPACCESS and
/// FUNC_CALL through them.
pub struct HostBindings {
    pub global: Value,
    pub document: Value,
}

impl HostBindings {
    pub fn new(global: Value, document: Value) -> Self {
        Self { global, document }
    }

    /// Build both roots from a JSON document with optional top-level
    /// `"global"` and `"document"` keys. Missing keys yield empty objects.
    pub fn from_json(json: &JsonValue) -> Self {
        let root = |key: &str| match json.get(key) {
            Some(sub) => value_from_json(sub),
            None => Value::object(),
        };
        Self {
            global: root("global"),
            document: root("document"),
        }
    }
}

impl Default for HostBindings {
    fn default() -> Self {
        Self {
            global: Value::object(),
            document: Value::object(),
        }
    }
}

/// Convert a JSON tree into VM values. JSON objects become host objects,
/// `null` becomes the void sentinel.
pub fn value_from_json(json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Void,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        JsonValue::String(s) => Value::string(s.clone()),
        JsonValue::Array(items) => Value::array(items.iter().map(value_from_json).collect()),
        JsonValue::Object(fields) => {
            let mut object = HostObject::new();
            for (key, value) in fields {
                object.set(key.clone(), value_from_json(value));
            }
            Value::object_from(object)
        }
    }
}
