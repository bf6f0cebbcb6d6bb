//! DynRPC JSON Wire Codec
//!
//! The reference implementation of the [`WireCodec`] boundary. Payloads
//! are encoded as JSON driven by the compiled declaration for the payload
//! type; a production deployment would plug a native binary codec in
//! behind the same trait.
//!
//! # Wire Conventions
//!
//! - struct and table values encode as objects; tables omit absent fields
//! - unions encode as single-variant objects (the empty union as `{}`)
//! - enums and bits encode as their raw integer value
//! - handles and endpoints encode as indices into the message's
//!   out-of-band handle table, in transfer order

pub mod construct;

use std::sync::Arc;

use dynrpc_common::{DynrpcError, RawHandle, Result, Value, WireCodec};
use dynrpc_compiler::{Export, Registry};

use crate::construct::construct_declaration;

/// JSON codec over the compiled type records of a [`Registry`].
pub struct JsonCodec {
    registry: Arc<Registry>,
}

impl JsonCodec {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

impl WireCodec for JsonCodec {
    fn decode(&self, type_name: &str, bytes: &[u8], handles: &[RawHandle]) -> Result<Value> {
        let json: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|err| DynrpcError::Decode {
                ty: type_name.to_string(),
                detail: err.to_string(),
            })?;
        let Export::Decl(decl) = self.registry.compiled(type_name)? else {
            return Err(DynrpcError::Decode {
                ty: type_name.to_string(),
                detail: "payload type is not an encodable declaration".to_string(),
            });
        };
        construct_declaration(&self.registry, &decl, &json, handles)
    }

    fn encode(
        &self,
        _library: &str,
        type_name: &str,
        value: &Value,
    ) -> Result<(Vec<u8>, Vec<RawHandle>)> {
        let mut handles = Vec::new();
        let json = lower(value, &mut handles)?;
        let bytes = serde_json::to_vec(&json).map_err(|err| DynrpcError::Encode {
            ty: type_name.to_string(),
            detail: err.to_string(),
        })?;
        Ok((bytes, handles))
    }
}

/// Lowers a value into its JSON wire form, appending transferred handles
/// to the handle table in encounter order.
fn lower(value: &Value, handles: &mut Vec<RawHandle>) -> Result<serde_json::Value> {
    use serde_json::Value as Json;
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(v) => Json::from(*v),
        Value::Int(v) => Json::from(*v),
        Value::UInt(v) => Json::from(*v),
        Value::Float(v) => Json::from(*v),
        Value::String(v) => Json::from(v.clone()),
        Value::Vector(items) => Json::Array(
            items
                .iter()
                .map(|item| lower(item, handles))
                .collect::<Result<_>>()?,
        ),
        Value::Struct { fields, .. } => {
            let mut object = serde_json::Map::with_capacity(fields.len());
            for (name, field) in fields {
                object.insert(name.clone(), lower(field, handles)?);
            }
            Json::Object(object)
        }
        Value::Table { fields, .. } => {
            let mut object = serde_json::Map::with_capacity(fields.len());
            for (name, field) in fields {
                if !field.is_null() {
                    object.insert(name.clone(), lower(field, handles)?);
                }
            }
            Json::Object(object)
        }
        Value::Union { variant, .. } => {
            let mut object = serde_json::Map::new();
            if let Some((name, inner)) = variant {
                object.insert(name.clone(), lower(inner, handles)?);
            }
            Json::Object(object)
        }
        Value::Enum { value, .. } => Json::from(*value),
        Value::Bits { value, .. } => Json::from(*value),
        Value::Handle(handle)
        | Value::ClientEnd { handle, .. }
        | Value::ServerEnd { handle, .. } => {
            let index = handles.len() as u64;
            handles.push(*handle);
            Json::from(index)
        }
    })
}
