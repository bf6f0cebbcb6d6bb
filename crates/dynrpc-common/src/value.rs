//! Dynamic runtime values.
//!
//! [`Value`] is the single runtime representation of every encodable
//! protocol type. Compiled declarations construct values, the wire codec
//! encodes and decodes them, and user handlers receive and return them.
//! The shape invariants (structs carry every field, unions carry at most
//! one variant) are enforced by the compiled declaration constructors, not
//! by this type itself.

use std::fmt;

use crate::error::{DynrpcError, Result};

/// An opaque transferred resource. Handles travel out-of-band next to the
/// encoded payload; the codec replaces them with indices on the wire.
pub type RawHandle = u32;

/// Framework-level error codes carried in the `framework_err` variant of a
/// flexible result union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum FrameworkError {
    UnknownMethod = -2,
}

impl FrameworkError {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -2 => Some(FrameworkError::UnknownMethod),
            _ => None,
        }
    }
}

impl fmt::Display for FrameworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameworkError::UnknownMethod => write!(f, "UNKNOWN_METHOD"),
        }
    }
}

/// A dynamic protocol value.
///
/// Composite variants carry the qualified name of their declaring type so
/// diagnostics and result-union faults can name the offending declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Vector(Vec<Value>),
    /// A struct value: every declared field is present, in declaration order.
    Struct {
        ty: String,
        fields: Vec<(String, Value)>,
    },
    /// A table value: only the fields that were set are present.
    Table {
        ty: String,
        fields: Vec<(String, Value)>,
    },
    /// A union value: at most one variant holds a value.
    Union {
        ty: String,
        variant: Option<(String, Box<Value>)>,
    },
    Enum {
        ty: String,
        value: i64,
    },
    Bits {
        ty: String,
        value: u64,
    },
    Handle(RawHandle),
    ClientEnd {
        protocol: String,
        handle: RawHandle,
    },
    ServerEnd {
        protocol: String,
        handle: RawHandle,
    },
}

impl Value {
    /// Returns the qualified type name for composite values.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Value::Struct { ty, .. }
            | Value::Table { ty, .. }
            | Value::Union { ty, .. }
            | Value::Enum { ty, .. }
            | Value::Bits { ty, .. } => Some(ty),
            _ => None,
        }
    }

    /// Looks up a field of a struct or table value by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct { fields, .. } | Value::Table { fields, .. } => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Returns the set variant of a union value, if any.
    pub fn variant(&self) -> Option<(&str, &Value)> {
        match self {
            Value::Union {
                variant: Some((name, value)),
                ..
            } => Some((name.as_str(), value.as_ref())),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Unwraps a result union structurally.
    ///
    /// Returns the `response` payload if it is set. A set `framework_err`
    /// variant fails first, then a set `err` variant, each naming the
    /// declaring type and the error payload. A union with no variant set
    /// (or a variant outside the result triple) fails with a distinct
    /// no-error-or-response fault.
    pub fn unwrap_result(&self) -> Result<Value> {
        let Value::Union { ty, variant } = self else {
            return Err(DynrpcError::InvalidArguments {
                ty: self.type_name().unwrap_or("<value>").to_string(),
                detail: "unwrap requires a result union value".to_string(),
            });
        };
        match variant {
            Some((name, value)) if name == "framework_err" => {
                Err(DynrpcError::ResultFrameworkError {
                    ty: ty.clone(),
                    error: value.to_string(),
                })
            }
            Some((name, value)) if name == "err" => Err(DynrpcError::ResultError {
                ty: ty.clone(),
                error: value.to_string(),
            }),
            Some((name, value)) if name == "response" => Ok(value.as_ref().clone()),
            _ => Err(DynrpcError::NoErrorOrResponse(ty.clone())),
        }
    }
}

// Compact single-line rendering used in error messages and logs.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Vector(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Struct { ty, fields } | Value::Table { ty, fields } => {
                write!(f, "{ty}(")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}={value}")?;
                }
                write!(f, ")")
            }
            Value::Union { ty, variant } => match variant {
                Some((name, value)) => write!(f, "{ty}({name}={value})"),
                None => write!(f, "{ty}(None)"),
            },
            Value::Enum { ty, value } => write!(f, "{ty}({value})"),
            Value::Bits { ty, value } => write!(f, "{ty}({value:#x})"),
            Value::Handle(handle) => write!(f, "handle({handle})"),
            Value::ClientEnd { protocol, handle } => {
                write!(f, "client_end<{protocol}>({handle})")
            }
            Value::ServerEnd { protocol, handle } => {
                write!(f, "server_end<{protocol}>({handle})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_union(variant: Option<(&str, Value)>) -> Value {
        Value::Union {
            ty: "test.lib/NoopResult".to_string(),
            variant: variant.map(|(name, value)| (name.to_string(), Box::new(value))),
        }
    }

    #[test]
    fn test_unwrap_result_response() {
        let union = result_union(Some(("response", Value::String("ok".to_string()))));
        assert_eq!(
            union.unwrap_result().unwrap(),
            Value::String("ok".to_string())
        );
    }

    #[test]
    fn test_unwrap_result_err() {
        let union = result_union(Some(("err", Value::Int(-1))));
        let err = union.unwrap_result().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("test.lib/NoopResult"));
        assert!(message.contains("-1"));
    }

    #[test]
    fn test_unwrap_result_framework_err_precedes_err() {
        let union = result_union(Some(("framework_err", Value::Int(-2))));
        let message = union.unwrap_result().unwrap_err().to_string();
        assert!(message.contains("framework error"));
    }

    #[test]
    fn test_unwrap_result_empty() {
        let union = result_union(None);
        let message = union.unwrap_result().unwrap_err().to_string();
        assert!(message.contains("no error or response"));
    }

    #[test]
    fn test_field_lookup() {
        let value = Value::Struct {
            ty: "test.lib/Point".to_string(),
            fields: vec![
                ("x".to_string(), Value::Int(3)),
                ("y".to_string(), Value::Int(4)),
            ],
        };
        assert_eq!(value.field("y"), Some(&Value::Int(4)));
        assert_eq!(value.field("z"), None);
    }

    #[test]
    fn test_display_union() {
        let union = result_union(Some(("response", Value::Int(1))));
        assert_eq!(union.to_string(), "test.lib/NoopResult(response=1)");
        assert_eq!(result_union(None).to_string(), "test.lib/NoopResult(None)");
    }
}
