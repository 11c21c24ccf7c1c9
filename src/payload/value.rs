//! Dynamically typed value used as event payload material.
//!
//! `Value` is a tagged union over six shapes: undefined, IEEE double,
//! string, boolean, pointer-sized opaque reference and nested [`Object`].
//! Equality and hashing follow the payload-carrier contract rather than the
//! derived semantics, so the type is a lawful `HashMap` key.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::Object;

/// Represents a single dynamically typed value.
///
/// Equality rules:
/// - strings and nested objects compare structurally;
/// - references compare by token;
/// - numbers and booleans compare bitwise (`f64::to_bits`), so NaN equals
///   NaN while `0.0` and `-0.0` differ;
/// - `Undefined` equals `Undefined`; different variants are never equal.
///
/// Hashing is consistent with the above except for nested objects, which
/// hash by heap identity: an object key is only found in a map through the
/// very same boxed instance, never through a structurally equal copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    /// The absent value. This is the default.
    #[default]
    Undefined,
    /// A 64-bit floating-point number.
    Number(f64),
    /// An owned UTF-8 string.
    String(String),
    /// A boolean.
    Boolean(bool),
    /// A pointer-sized opaque token. The bus never dereferences it.
    Reference(usize),
    /// A nested associative object.
    Object(Box<Object>),
}

impl Value {
    /// Wraps an opaque pointer-sized token.
    pub fn reference(token: usize) -> Self {
        Value::Reference(token)
    }

    /// Returns the number if this value holds one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(number) => Some(*number),
            _ => None,
        }
    }

    /// Returns the string contents if this value holds a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(string) => Some(string),
            _ => None,
        }
    }

    /// Returns the boolean if this value holds one.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(boolean) => Some(*boolean),
            _ => None,
        }
    }

    /// Returns the opaque token if this value holds a reference.
    pub fn as_reference(&self) -> Option<usize> {
        match self {
            Value::Reference(token) => Some(*token),
            _ => None,
        }
    }

    /// Returns the nested object if this value holds one.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Looks a key up in the nested object. `None` for non-object values.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match self {
            Value::Object(object) => object.get(key),
            _ => None,
        }
    }

    /// Stable textual tag of the held variant.
    pub fn get_type(&self) -> &'static str {
        match self {
            Value::Undefined => "Undefined",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Boolean(_) => "Boolean",
            Value::Reference(_) => "Reference",
            Value::Object(_) => "Object",
        }
    }

    /// Truthiness: undefined is false, numbers are `!= 0.0`, strings are
    /// non-empty, booleans are themselves, references are non-zero tokens,
    /// objects are always true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Number(number) => *number != 0.0,
            Value::String(string) => !string.is_empty(),
            Value::Boolean(boolean) => *boolean,
            Value::Reference(token) => *token != 0,
            Value::Object(_) => true,
        }
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Value::Number(number)
    }
}

impl From<&str> for Value {
    fn from(string: &str) -> Self {
        Value::String(string.to_owned())
    }
}

impl From<String> for Value {
    fn from(string: String) -> Self {
        Value::String(string)
    }
}

impl From<bool> for Value {
    fn from(boolean: bool) -> Self {
        Value::Boolean(boolean)
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(Box::new(object))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Reference(a), Value::Reference(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            // Undefined hashes to a fixed constant.
            Value::Undefined => state.write_u8(0),
            Value::Number(number) => {
                state.write_u8(1);
                state.write_u64(number.to_bits());
            }
            Value::String(string) => {
                state.write_u8(2);
                string.hash(state);
            }
            Value::Boolean(boolean) => {
                state.write_u8(3);
                boolean.hash(state);
            }
            Value::Reference(token) => {
                state.write_u8(4);
                state.write_usize(*token);
            }
            // Nested objects hash by heap identity, not by contents.
            Value::Object(object) => {
                state.write_u8(5);
                state.write_usize(&**object as *const Object as usize);
            }
        }
    }
}
