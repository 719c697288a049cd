use std::fmt;
use std::rc::Rc;

/// The message carried by a thrown exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thrown {
    pub message: String,
}

impl Thrown {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for Thrown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

pub type NativeFn = dyn Fn() -> Result<Value, Thrown>;

pub struct Callable {
    pub name: String,
    body: Box<NativeFn>,
}

impl Callable {
    pub fn call(&self) -> Result<Value, Thrown> {
        (self.body)()
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function {}]", self.display_name())
    }
}

impl Callable {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "anonymous"
        } else {
            &self.name
        }
    }
}

#[derive(Debug)]
pub struct Object {
    /// `None` for plain objects (prototype is `Object.prototype` or null).
    pub class: Option<String>,
    pub entries: Vec<(String, Value)>,
    /// Display form of non-plain objects such as dates and errors.
    pub repr: Option<String>,
}

impl Object {
    pub fn is_plain(&self) -> bool {
        self.class.is_none()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

#[derive(Debug)]
pub struct RegExp {
    pub source: String,
    pub flags: String,
}

#[derive(Debug)]
pub struct Symbol {
    pub description: String,
}

/// A JavaScript value as seen by the expectation library.
///
/// Containers are reference counted so that strict equality can compare
/// identity the way `===` does, while deep equality walks the contents.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(String),
    String(String),
    Symbol(Rc<Symbol>),
    Array(Rc<Vec<Value>>),
    Object(Rc<Object>),
    RegExp(Rc<RegExp>),
    Function(Rc<Callable>),
    /// Back-reference to a container that is still being visited.
    Circular,
}

impl Value {
    pub fn array(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Array(Rc::new(items.into_iter().collect()))
    }

    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Object(Rc::new(Object {
            class: None,
            entries: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            repr: None,
        }))
    }

    pub fn instance(class: impl Into<String>, repr: Option<String>) -> Self {
        Value::Object(Rc::new(Object {
            class: Some(class.into()),
            entries: Vec::new(),
            repr,
        }))
    }

    pub fn regexp(source: impl Into<String>, flags: impl Into<String>) -> Self {
        Value::RegExp(Rc::new(RegExp {
            source: source.into(),
            flags: flags.into(),
        }))
    }

    pub fn symbol(description: impl Into<String>) -> Self {
        Value::Symbol(Rc::new(Symbol {
            description: description.into(),
        }))
    }

    pub fn function<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn() -> Result<Value, Thrown> + 'static,
    {
        Value::Function(Rc::new(Callable {
            name: name.into(),
            body: Box::new(body),
        }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::RegExp(_) => "regexp",
            Value::Function(_) => "function",
            Value::Circular => "object",
        }
    }

    /// JavaScript `Boolean(value)` coercion.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => !(*n == 0.0 || n.is_nan()),
            Value::BigInt(digits) => digits.trim_start_matches('-').trim_start_matches('0') != "",
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(items))
    }
}

/// Every conversion allocates fresh containers, so two conversions of the
/// same JSON are deep-equal but never identical.
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::array(items.into_iter().map(Value::from)),
            serde_json::Value::Object(map) => Value::object(map.into_iter().map(|(k, v)| (k, Value::from(v)))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness_follows_js_coercion() {
        let falsy = [
            Value::Undefined,
            Value::Null,
            Value::from(false),
            Value::from(0),
            Value::Number(-0.0),
            Value::Number(f64::NAN),
            Value::from(""),
            Value::BigInt("0".into()),
        ];
        for value in &falsy {
            assert!(!value.is_truthy(), "{:?} should be falsy", value);
        }

        let truthy = [Value::from("0"), Value::from(-1), Value::array([]), Value::object::<&str>([])];
        for value in &truthy {
            assert!(value.is_truthy(), "{:?} should be truthy", value);
        }
    }

    #[test]
    fn test_json_conversion_builds_fresh_containers() {
        let a = Value::from(json!([1, {"x": 1}]));
        let b = Value::from(json!([1, {"x": 1}]));
        match (&a, &b) {
            (Value::Array(x), Value::Array(y)) => assert!(!Rc::ptr_eq(x, y)),
            _ => panic!("expected arrays"),
        }
    }
}
