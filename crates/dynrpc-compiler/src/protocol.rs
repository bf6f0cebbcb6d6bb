//! Protocol compiler.
//!
//! Compiles one protocol declaration into the immutable dispatch metadata
//! shared by every client, server and event-handler bound to it. Methods
//! with a request drive the server's dispatch table; methods without one
//! are events, delivered the opposite way and keyed in their own table.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dynrpc_common::{DynrpcError, Result, Value};

use crate::declarations::Declaration;
use crate::ir;
use crate::module::Export;
use crate::names;
use crate::registry::Registry;
use crate::resolve::DeclKind;

/// Per-method dispatch metadata. Built once per protocol and shared by
/// every role instance; never mutated afterwards.
#[derive(Debug)]
pub struct MethodInfo {
    /// Snake-case method name, the key user handlers dispatch on.
    pub name: String,
    pub raw_name: String,
    pub ordinal: u64,
    pub doc: Option<String>,
    pub has_request: bool,
    pub has_response: bool,
    /// Raw identifier of the inbound payload: the request payload for
    /// request-bearing methods, the event payload for events.
    pub request_ident: Option<String>,
    pub request_kind: Option<DeclKind>,
    /// True when the method declares a response payload the server must
    /// produce.
    pub requires_response: bool,
    /// True when the method has a response with no declared payload; the
    /// server acknowledges with an empty message.
    pub empty_response: bool,
    pub has_result: bool,
    /// Raw identifier of the response payload.
    pub response_ident: Option<String>,
}

/// Compiled dispatch metadata for one protocol.
#[derive(Debug)]
pub struct ProtocolInfo {
    /// Normalized qualified name, e.g. `example.echo/Echo`.
    pub name: String,
    pub raw_name: String,
    /// Lookup marker, e.g. `example.echo.Echo`.
    pub marker: String,
    pub library: String,
    pub doc: Option<String>,
    /// Request-bearing methods by ordinal; drives the server role.
    pub methods: BTreeMap<u64, Arc<MethodInfo>>,
    /// Events by ordinal; drives the event-handler role.
    pub events: BTreeMap<u64, Arc<MethodInfo>>,
    method_names: HashMap<String, u64>,
    event_names: HashMap<String, u64>,
}

impl ProtocolInfo {
    pub fn method_by_ordinal(&self, ordinal: u64) -> Option<&Arc<MethodInfo>> {
        self.methods.get(&ordinal)
    }

    pub fn method_by_name(&self, name: &str) -> Result<&Arc<MethodInfo>> {
        self.method_names
            .get(name)
            .and_then(|ordinal| self.methods.get(ordinal))
            .ok_or_else(|| DynrpcError::UnknownMethod {
                protocol: self.name.clone(),
                method: name.to_string(),
            })
    }

    pub fn event_by_ordinal(&self, ordinal: u64) -> Option<&Arc<MethodInfo>> {
        self.events.get(&ordinal)
    }

    pub fn event_by_name(&self, name: &str) -> Result<&Arc<MethodInfo>> {
        self.event_names
            .get(name)
            .and_then(|ordinal| self.events.get(ordinal))
            .ok_or_else(|| DynrpcError::UnknownMethod {
                protocol: self.name.clone(),
                method: name.to_string(),
            })
    }
}

/// Compiles a protocol declaration into its dispatch metadata.
///
/// # Errors
///
/// Fails on duplicate ordinals and on payload shapes that cannot be
/// dispatched (non-identifier payloads).
pub fn compile_protocol(
    decl: &ir::ProtocolDecl,
    ir: &ir::IrDocument,
    registry: &Registry,
) -> Result<ProtocolInfo> {
    let mut methods = BTreeMap::new();
    let mut events = BTreeMap::new();
    let mut method_names = HashMap::new();
    let mut event_names = HashMap::new();

    for method in &decl.methods {
        let snake_name = names::snake_case(&method.name);
        let info = if method.has_request {
            let request_ident = payload_identifier(method.maybe_request_payload.as_ref(), decl, ir)?;
            let request_kind = request_ident
                .as_deref()
                .map(|ident| registry.resolve_kind(ident, ir))
                .transpose()?;
            let response_ident =
                payload_identifier(method.maybe_response_payload.as_ref(), decl, ir)?;
            MethodInfo {
                name: snake_name.clone(),
                raw_name: method.name.clone(),
                ordinal: method.ordinal,
                doc: method.doc(),
                has_request: true,
                has_response: method.has_response,
                request_ident,
                request_kind,
                requires_response: method.has_response && method.maybe_response_payload.is_some(),
                empty_response: method.has_response && method.maybe_response_payload.is_none(),
                has_result: method.has_result(),
                response_ident,
            }
        } else {
            // An event: the initiating payload rides in the response slot
            // of the IR record.
            let request_ident =
                payload_identifier(method.maybe_response_payload.as_ref(), decl, ir)?;
            let request_kind = request_ident
                .as_deref()
                .map(|ident| registry.resolve_kind(ident, ir))
                .transpose()?;
            MethodInfo {
                name: snake_name.clone(),
                raw_name: method.name.clone(),
                ordinal: method.ordinal,
                doc: method.doc(),
                has_request: false,
                has_response: method.has_response,
                request_ident,
                request_kind,
                requires_response: false,
                empty_response: false,
                has_result: false,
                response_ident: None,
            }
        };

        let duplicate = methods.contains_key(&method.ordinal) || events.contains_key(&method.ordinal);
        if duplicate {
            return Err(DynrpcError::DuplicateOrdinal {
                protocol: decl.name.clone(),
                ordinal: method.ordinal,
            });
        }
        if info.has_request {
            method_names.insert(snake_name, method.ordinal);
            methods.insert(method.ordinal, Arc::new(info));
        } else {
            event_names.insert(snake_name, method.ordinal);
            events.insert(method.ordinal, Arc::new(info));
        }
    }

    Ok(ProtocolInfo {
        name: names::normalize_identifier(&decl.name),
        raw_name: decl.name.clone(),
        marker: names::marker(&decl.name),
        library: ir.name.clone(),
        doc: ir::docstring(&decl.maybe_attributes),
        methods,
        events,
        method_names,
        event_names,
    })
}

fn payload_identifier(
    payload: Option<&ir::TypeIr>,
    decl: &ir::ProtocolDecl,
    ir: &ir::IrDocument,
) -> Result<Option<String>> {
    match payload {
        None => Ok(None),
        Some(ty) => match ty.raw_identifier() {
            Some(ident) => Ok(Some(ident.to_string())),
            None => Err(DynrpcError::UnsupportedKind {
                what: "method payload",
                kind: format!("<non-identifier payload on {}>", decl.name),
                library: ir.name.clone(),
            }),
        },
    }
}

/// Builds a method payload from named call-site arguments, validating the
/// arity the payload kind demands: struct members are all required, table
/// members optional, unions take exactly one variant.
pub fn build_payload(
    registry: &Registry,
    ident: &str,
    args: Vec<(String, Value)>,
) -> Result<Value> {
    let export = registry.compiled(ident)?;
    let Export::Decl(decl) = export else {
        return Err(DynrpcError::UnsupportedKind {
            what: "method payload",
            kind: ident.to_string(),
            library: names::library_of(ident).to_string(),
        });
    };
    match decl.as_ref() {
        Declaration::Struct(payload) => payload.new_value(args),
        Declaration::Table(payload) => payload.new_value(args),
        Declaration::Union(payload) => {
            if args.len() != 1 {
                return Err(DynrpcError::InvalidArguments {
                    ty: payload.name.clone(),
                    detail: format!("union payload expects exactly one variant, got {}", args.len()),
                });
            }
            payload.from_args(args)
        }
        other => Err(DynrpcError::UnsupportedKind {
            what: "method payload",
            kind: other.kind().as_str().to_string(),
            library: names::library_of(ident).to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Registry {
        let registry = Registry::new();
        registry
            .add_ir_json(json!({
                "name": "test.proto",
                "declarations": {
                    "test.proto/EchoSayRequest": "struct",
                    "test.proto/EchoSayResponse": "struct",
                    "test.proto/EchoPingRequest": "struct",
                    "test.proto/EchoOnNewsRequest": "struct",
                    "test.proto/Echo": "protocol",
                },
                "declaration_order": [
                    "test.proto/EchoSayRequest",
                    "test.proto/EchoSayResponse",
                    "test.proto/EchoPingRequest",
                    "test.proto/EchoOnNewsRequest",
                    "test.proto/Echo",
                ],
                "struct_declarations": [
                    {
                        "name": "test.proto/EchoSayRequest",
                        "members": [{"name": "value", "type": {"kind": "string"}}],
                    },
                    {
                        "name": "test.proto/EchoSayResponse",
                        "members": [{"name": "value", "type": {"kind": "string"}}],
                    },
                    {
                        "name": "test.proto/EchoPingRequest",
                        "members": [{"name": "seq", "type": {"kind": "primitive", "subtype": "uint32"}}],
                    },
                    {
                        "name": "test.proto/EchoOnNewsRequest",
                        "members": [{"name": "headline", "type": {"kind": "string"}}],
                    },
                ],
                "protocol_declarations": [{
                    "name": "test.proto/Echo",
                    "methods": [
                        {
                            "name": "Say",
                            "ordinal": 1,
                            "has_request": true,
                            "has_response": true,
                            "strict": true,
                            "maybe_request_payload": {"kind": "identifier", "identifier": "test.proto/EchoSayRequest"},
                            "maybe_response_payload": {"kind": "identifier", "identifier": "test.proto/EchoSayResponse"},
                        },
                        {
                            "name": "Ping",
                            "ordinal": 2,
                            "has_request": true,
                            "has_response": false,
                            "strict": true,
                            "maybe_request_payload": {"kind": "identifier", "identifier": "test.proto/EchoPingRequest"},
                        },
                        {
                            "name": "Sync",
                            "ordinal": 3,
                            "has_request": true,
                            "has_response": true,
                            "strict": true,
                        },
                        {
                            "name": "OnNews",
                            "ordinal": 4,
                            "has_request": false,
                            "has_response": true,
                            "strict": true,
                            "maybe_response_payload": {"kind": "identifier", "identifier": "test.proto/EchoOnNewsRequest"},
                        },
                    ],
                }],
            }))
            .unwrap();
        registry
    }

    fn compile(registry: &Registry) -> ProtocolInfo {
        let ir = registry.load_ir("test.proto").unwrap();
        compile_protocol(&ir.protocol_declarations[0], &ir, registry).unwrap()
    }

    #[test]
    fn test_method_map_shape() {
        let registry = registry();
        let info = compile(&registry);
        assert_eq!(info.marker, "test.proto.Echo");
        assert_eq!(info.methods.len(), 3);
        assert_eq!(info.events.len(), 1);

        let say = info.method_by_name("say").unwrap();
        assert!(say.requires_response);
        assert!(!say.empty_response);
        assert_eq!(say.request_ident.as_deref(), Some("test.proto/EchoSayRequest"));
        assert_eq!(
            say.response_ident.as_deref(),
            Some("test.proto/EchoSayResponse")
        );

        let ping = info.method_by_name("ping").unwrap();
        assert!(!ping.requires_response);
        assert!(!ping.empty_response);

        let sync = info.method_by_name("sync").unwrap();
        assert!(!sync.requires_response);
        assert!(sync.empty_response);
    }

    #[test]
    fn test_requires_response_iff_payload_declared() {
        let registry = registry();
        let info = compile(&registry);
        for method in info.methods.values() {
            assert_eq!(
                method.requires_response,
                method.has_response && method.response_ident.is_some()
            );
        }
    }

    #[test]
    fn test_ordinals_pairwise_distinct() {
        let registry = registry();
        let info = compile(&registry);
        let mut seen: Vec<u64> = info
            .methods
            .keys()
            .chain(info.events.keys())
            .copied()
            .collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), info.methods.len() + info.events.len());
    }

    #[test]
    fn test_event_uses_response_payload_as_inbound() {
        let registry = registry();
        let info = compile(&registry);
        let event = info.event_by_name("on_news").unwrap();
        assert_eq!(
            event.request_ident.as_deref(),
            Some("test.proto/EchoOnNewsRequest")
        );
        assert!(!event.has_result);
        assert!(event.response_ident.is_none());
    }

    #[test]
    fn test_unknown_method_lookup_fails() {
        let registry = registry();
        let info = compile(&registry);
        let err = info.method_by_name("nope").unwrap_err();
        assert!(matches!(err, DynrpcError::UnknownMethod { .. }));
        // Events are not callable as methods, and vice versa.
        assert!(info.method_by_name("on_news").is_err());
        assert!(info.event_by_name("say").is_err());
    }

    #[test]
    fn test_duplicate_ordinal_is_fatal() {
        let registry = Registry::new();
        registry
            .add_ir_json(json!({
                "name": "test.dup",
                "declarations": {"test.dup/P": "protocol"},
                "declaration_order": ["test.dup/P"],
                "protocol_declarations": [{
                    "name": "test.dup/P",
                    "methods": [
                        {"name": "A", "ordinal": 9, "has_request": true, "has_response": false},
                        {"name": "B", "ordinal": 9, "has_request": true, "has_response": false},
                    ],
                }],
            }))
            .unwrap();
        let ir = registry.load_ir("test.dup").unwrap();
        let err = compile_protocol(&ir.protocol_declarations[0], &ir, &registry).unwrap_err();
        assert!(matches!(err, DynrpcError::DuplicateOrdinal { ordinal: 9, .. }));
    }

    #[test]
    fn test_build_payload_struct_requires_all_members() {
        let registry = registry();
        let value = build_payload(
            &registry,
            "test.proto/EchoSayRequest",
            vec![("value".to_string(), Value::String("hi".to_string()))],
        )
        .unwrap();
        assert_eq!(value.field("value"), Some(&Value::String("hi".to_string())));

        let err = build_payload(&registry, "test.proto/EchoSayRequest", vec![]).unwrap_err();
        assert!(err.to_string().contains("missing member"));
    }
}
