//! Runtime values of the reference interpreter

use crate::generator::ResumeAction;
use crate::ir::FunctionId;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type ObjectRef = Rc<RefCell<Object>>;
pub type EnvRef = Rc<RefCell<EnvRecord>>;

/// A runtime value
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    /// Uninitialized-binding sentinel
    Empty,
    Boolean(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
    /// Environment records travel in registers like any other value
    Env(EnvRef),
}

/// A heap object
#[derive(Debug)]
pub struct Object {
    pub kind: ObjectKind,
    /// Own properties in insertion order
    pub properties: Vec<(String, Value)>,
}

#[derive(Debug)]
pub enum ObjectKind {
    Ordinary,
    Array(Vec<Value>),
    Closure { func: FunctionId, env: Option<EnvRef> },
    Class {
        name: String,
        constructor: Option<Value>,
        methods: Vec<(String, Value)>,
    },
    Generator {
        machine: FunctionId,
        env: EnvRef,
        state: u32,
    },
    /// Built-in iterator over an array or string
    ListIterator { source: Value, index: usize },
    Promise(PromiseState),
    Native(Native),
}

/// Host functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Native {
    /// `log(...values)`: append one output line
    Log,
    /// `sideEffect(...values)`: append a marked output line
    SideEffect,
    /// `rejected(reason)`: a promise rejected with `reason`
    Rejected,
    /// `resolved(value)`: a promise fulfilled with `value`
    Resolved,
    /// `next`/`throw`/`return` of a generator object
    GeneratorMethod(ResumeAction),
    /// `next` of a built-in list iterator
    ListIteratorNext,
}

#[derive(Debug, Clone)]
pub enum PromiseState {
    Pending(Vec<Reaction>),
    Fulfilled(Value),
    Rejected(Value),
}

/// What happens when a pending promise settles
#[derive(Debug, Clone)]
pub enum Reaction {
    /// Resume the async machine of a task
    Resume(usize),
    /// Settle another promise the same way
    Adopt(ObjectRef),
}

/// An environment record: a fixed slot array and its parent
#[derive(Debug, Clone)]
pub struct EnvRecord {
    pub slots: Vec<Value>,
    pub parent: Option<EnvRef>,
}

impl Object {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            properties: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        match self.properties.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((key.to_string(), value)),
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self.kind,
            ObjectKind::Closure { .. } | ObjectKind::Class { .. } | ObjectKind::Native(_)
        )
    }
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn object(kind: ObjectKind) -> Self {
        Value::Object(Rc::new(RefCell::new(Object::new(kind))))
    }

    pub fn array(elements: Vec<Value>) -> Self {
        Value::object(ObjectKind::Array(elements))
    }

    /// `{ value, done }`
    pub fn iter_result(value: Value, done: bool) -> Self {
        let mut object = Object::new(ObjectKind::Ordinary);
        object.set("value", value);
        object.set("done", Value::Boolean(done));
        Value::Object(Rc::new(RefCell::new(object)))
    }

    /// An error object with `name` and `message`
    pub fn error(name: &str, message: &str) -> Self {
        let mut object = Object::new(ObjectKind::Ordinary);
        object.set("name", Value::string(name));
        object.set("message", Value::string(message));
        Value::Object(Rc::new(RefCell::new(object)))
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        self.as_object().map(|o| o.borrow().is_callable()).unwrap_or(false)
    }

    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null | Value::Empty => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) | Value::Env(_) => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined | Value::Empty => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Object(_) | Value::Env(_) => {
                let text = self.to_string();
                Value::string(text).to_number()
            }
        }
    }

    pub fn to_int32(&self) -> i32 {
        let n = self.to_number();
        if !n.is_finite() {
            return 0;
        }
        (n.trunc() as i64 & 0xffff_ffff) as u32 as i32
    }

    pub fn to_uint32(&self) -> u32 {
        self.to_int32() as u32
    }

    /// Property key for element access
    pub fn to_property_key(&self) -> String {
        self.to_string()
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined | Value::Empty => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(object) if object.borrow().is_callable() => "function",
            Value::Object(_) | Value::Env(_) => "object",
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) | (Value::Empty, Value::Empty) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Env(a), Value::Env(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Object(_), Value::Object(_)) => self.strict_equals(other),
            (Value::String(_), Value::String(_)) => self.strict_equals(other),
            (Value::Object(_), _) | (_, Value::Object(_)) => self.to_string() == other.to_string(),
            _ => self.to_number() == other.to_number(),
        }
    }
}

/// Number formatting as the language prints numbers
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined | Value::Empty => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Env(_) => write!(f, "[environment]"),
            Value::Object(object) => {
                let object = object.borrow();
                match &object.kind {
                    ObjectKind::Array(elements) => {
                        for (i, element) in elements.iter().enumerate() {
                            if i > 0 {
                                write!(f, ",")?;
                            }
                            if !element.is_nullish() {
                                write!(f, "{}", element)?;
                            }
                        }
                        Ok(())
                    }
                    ObjectKind::Closure { .. } | ObjectKind::Native(_) => write!(f, "function"),
                    ObjectKind::Class { name, .. } => write!(f, "class {}", name),
                    ObjectKind::Generator { .. } => write!(f, "[object Generator]"),
                    ObjectKind::Promise(_) => write!(f, "[object Promise]"),
                    ObjectKind::ListIterator { .. } => write!(f, "[object Iterator]"),
                    ObjectKind::Ordinary => match (object.get("name"), object.get("message")) {
                        (Some(Value::String(name)), Some(Value::String(message))) => {
                            write!(f, "{}: {}", name, message)
                        }
                        _ => write!(f, "[object Object]"),
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(Value::Number(1.0).loose_equals(&Value::string("1")));
        assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
    }

    #[test]
    fn test_array_display() {
        let array = Value::array(vec![Value::Number(3.0), Value::Number(4.0)]);
        assert_eq!(array.to_string(), "3,4");
    }

    #[test]
    fn test_error_display() {
        let error = Value::error("TypeError", "bad");
        assert_eq!(error.to_string(), "TypeError: bad");
    }
}
