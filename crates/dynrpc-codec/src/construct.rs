//! Typed value construction from decoded JSON.
//!
//! Decode is driven by the compiled declaration for the payload type, so
//! values come back in their proper shapes: unions as single-variant
//! values, tables with only their present fields, handle indices swapped
//! back for the transferred handles.

use dynrpc_common::{DynrpcError, RawHandle, Result, Value};
use dynrpc_compiler::declarations::AliasTarget;
use dynrpc_compiler::{Declaration, Export, Field, Registry, Type, TypeKind};

fn decode_error(ty: &str, detail: impl Into<String>) -> DynrpcError {
    DynrpcError::Decode {
        ty: ty.to_string(),
        detail: detail.into(),
    }
}

/// Constructs a typed value for `decl` from its JSON wire form.
pub fn construct_declaration(
    registry: &Registry,
    decl: &Declaration,
    json: &serde_json::Value,
    handles: &[RawHandle],
) -> Result<Value> {
    match decl {
        Declaration::Struct(ty) => {
            let object = as_object(&ty.name, json)?;
            let fields = ty
                .fields
                .iter()
                .map(|field| {
                    let raw = field_json(object, field);
                    let value = construct_type(registry, &field.ty, raw, handles)?;
                    Ok((field.name.clone(), value))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Struct {
                ty: ty.name.clone(),
                fields,
            })
        }
        Declaration::Table(ty) => {
            let object = as_object(&ty.name, json)?;
            let mut fields = Vec::new();
            for field in &ty.fields {
                let raw = field_json(object, field);
                if raw.is_null() {
                    continue;
                }
                let value = construct_type(registry, &field.ty, raw, handles)?;
                fields.push((field.name.clone(), value));
            }
            Ok(Value::Table {
                ty: ty.name.clone(),
                fields,
            })
        }
        Declaration::Union(ty) => {
            let object = as_object(&ty.name, json)?;
            if object.len() > 1 {
                return Err(decode_error(
                    &ty.name,
                    format!("union carries {} variants, at most one allowed", object.len()),
                ));
            }
            let Some((name, raw)) = object.iter().next() else {
                return Ok(ty.make_default());
            };
            let variant = ty
                .variants
                .iter()
                .find(|variant| variant.name == *name || variant.raw_name == *name)
                .ok_or_else(|| decode_error(&ty.name, format!("unknown variant '{name}'")))?;
            let value = construct_type(registry, &variant.ty, raw, handles)?;
            Ok(Value::Union {
                ty: ty.name.clone(),
                variant: Some((variant.name.clone(), Box::new(value))),
            })
        }
        Declaration::Enum(ty) => ty.from_raw(as_i64(&ty.name, json)?),
        Declaration::Bits(ty) => ty.from_raw(as_u64(&ty.name, json)?),
        Declaration::Alias(ty) => match &ty.target {
            AliasTarget::Primitive(_) | AliasTarget::String | AliasTarget::Sequence => {
                untyped(&ty.name, json)
            }
            AliasTarget::Named(ident) => {
                let Export::Decl(target) = registry.compiled(ident)? else {
                    return Err(decode_error(&ty.name, "alias target is not a declaration"));
                };
                construct_declaration(registry, &target, json, handles)
            }
        },
        Declaration::Resource(ty) => Ok(Value::UInt(as_u64(&ty.name, json)?)),
    }
}

/// Constructs a typed value from a resolved type descriptor.
pub fn construct_type(
    registry: &Registry,
    ty: &Type,
    json: &serde_json::Value,
    handles: &[RawHandle],
) -> Result<Value> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    match &ty.kind {
        TypeKind::Primitive(primitive) => {
            use dynrpc_compiler::PrimitiveType;
            if *primitive == PrimitiveType::Bool {
                json.as_bool()
                    .map(Value::Bool)
                    .ok_or_else(|| decode_error("bool", json.to_string()))
            } else if primitive.is_float() {
                json.as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| decode_error("float", json.to_string()))
            } else if primitive.is_signed() {
                json.as_i64()
                    .map(Value::Int)
                    .ok_or_else(|| decode_error("int", json.to_string()))
            } else {
                json.as_u64()
                    .map(Value::UInt)
                    .ok_or_else(|| decode_error("uint", json.to_string()))
            }
        }
        TypeKind::String => json
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| decode_error("string", json.to_string())),
        TypeKind::Vector(element) | TypeKind::Array { element, .. } => {
            let items = json
                .as_array()
                .ok_or_else(|| decode_error("vector", json.to_string()))?;
            Ok(Value::Vector(
                items
                    .iter()
                    .map(|item| construct_type(registry, element, item, handles))
                    .collect::<Result<_>>()?,
            ))
        }
        TypeKind::Handle(subtype) => Ok(Value::Handle(take_handle(subtype, json, handles)?)),
        TypeKind::ClientEndpoint { protocol } => Ok(Value::ClientEnd {
            protocol: protocol.clone(),
            handle: take_handle(protocol, json, handles)?,
        }),
        TypeKind::ServerEndpoint { protocol } => Ok(Value::ServerEnd {
            protocol: protocol.clone(),
            handle: take_handle(protocol, json, handles)?,
        }),
        TypeKind::Identifier { ident, .. } => match registry.compiled(ident)? {
            Export::Decl(decl) => construct_declaration(registry, &decl, json, handles),
            Export::Protocol(info) => Ok(Value::ClientEnd {
                protocol: info.name.clone(),
                handle: take_handle(&info.name, json, handles)?,
            }),
            Export::Const(_) => Err(decode_error(ident, "constant used as a payload type")),
        },
        TypeKind::Internal(subtype) => match subtype.as_str() {
            "framework_error" => json
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| decode_error(subtype, json.to_string())),
            other => Err(decode_error(other, "unsupported internal type")),
        },
    }
}

fn field_json<'a>(
    object: &'a serde_json::Map<String, serde_json::Value>,
    field: &Field,
) -> &'a serde_json::Value {
    object
        .get(&field.raw_name)
        .or_else(|| object.get(&field.name))
        .unwrap_or(&serde_json::Value::Null)
}

fn as_object<'a>(
    ty: &str,
    json: &'a serde_json::Value,
) -> Result<&'a serde_json::Map<String, serde_json::Value>> {
    json.as_object()
        .ok_or_else(|| decode_error(ty, format!("expected an object, got {json}")))
}

fn as_i64(ty: &str, json: &serde_json::Value) -> Result<i64> {
    json.as_i64()
        .ok_or_else(|| decode_error(ty, format!("expected an integer, got {json}")))
}

fn as_u64(ty: &str, json: &serde_json::Value) -> Result<u64> {
    json.as_u64()
        .ok_or_else(|| decode_error(ty, format!("expected an unsigned integer, got {json}")))
}

fn take_handle(ty: &str, json: &serde_json::Value, handles: &[RawHandle]) -> Result<RawHandle> {
    let index = as_u64(ty, json)? as usize;
    handles
        .get(index)
        .copied()
        .ok_or_else(|| decode_error(ty, format!("handle index {index} out of range")))
}

/// Structural conversion for alias targets whose element types the IR does
/// not preserve.
fn untyped(ty: &str, json: &serde_json::Value) -> Result<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(v) => Value::Bool(*v),
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_i64() {
                Value::Int(v)
            } else if let Some(v) = n.as_u64() {
                Value::UInt(v)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(v) => Value::String(v.clone()),
        serde_json::Value::Array(items) => Value::Vector(
            items
                .iter()
                .map(|item| untyped(ty, item))
                .collect::<Result<_>>()?,
        ),
        serde_json::Value::Object(_) => {
            return Err(decode_error(ty, "object without a declared shape"))
        }
    })
}
