// Integration tests for the server dispatch engine.
//
// These drive a Server over a raw channel end: requests are written by
// hand with explicit transaction ids, and the responses read back and
// decoded, so header fidelity (ordinal, txid) is asserted exactly.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use dynrpc_codec::JsonCodec;
use dynrpc_common::message::{MessageBuf, TransactionHeader};
use dynrpc_common::transport::{Channel, ChannelRead};
use dynrpc_common::{DynrpcError, Result, Value, WireCodec};
use dynrpc_compiler::{build_payload, MethodInfo, Registry};
use dynrpc_server::{Reply, RequestHandler, Server};

// ============================================================================
// Test Helpers
// ============================================================================

fn echo_registry() -> Arc<Registry> {
    let registry = Registry::new();
    registry
        .add_ir_json(json!({
            "name": "example.echo",
            "declarations": {
                "example.echo/Point": "struct",
                "example.echo/EchoSayRequest": "struct",
                "example.echo/EchoSayResponse": "struct",
                "example.echo/EchoPingRequest": "struct",
                "example.echo/EchoOnNewsRequest": "struct",
                "example.echo/EchoFetchResponse": "struct",
                "example.echo/Echo_Fetch_Result": "union",
                "example.echo/Echo": "protocol",
            },
            "declaration_order": [
                "example.echo/Point",
                "example.echo/EchoSayRequest",
                "example.echo/EchoSayResponse",
                "example.echo/EchoPingRequest",
                "example.echo/EchoOnNewsRequest",
                "example.echo/EchoFetchResponse",
                "example.echo/Echo_Fetch_Result",
                "example.echo/Echo",
            ],
            "struct_declarations": [
                {
                    "name": "example.echo/Point",
                    "members": [
                        {"name": "x", "type": {"kind": "primitive", "subtype": "int32"}},
                        {"name": "y", "type": {"kind": "primitive", "subtype": "int32"}},
                    ],
                },
                {
                    "name": "example.echo/EchoSayRequest",
                    "members": [{"name": "value", "type": {"kind": "string"}}],
                },
                {
                    "name": "example.echo/EchoSayResponse",
                    "members": [{"name": "value", "type": {"kind": "string"}}],
                },
                {
                    "name": "example.echo/EchoPingRequest",
                    "members": [{"name": "seq", "type": {"kind": "primitive", "subtype": "uint32"}}],
                },
                {
                    "name": "example.echo/EchoOnNewsRequest",
                    "members": [{"name": "headline", "type": {"kind": "string"}}],
                },
                {
                    "name": "example.echo/EchoFetchResponse",
                    "members": [{"name": "data", "type": {
                        "kind": "vector",
                        "element_type": {"kind": "primitive", "subtype": "uint8"},
                    }}],
                },
            ],
            "union_declarations": [{
                "name": "example.echo/Echo_Fetch_Result",
                "is_result": true,
                "members": [
                    {"name": "response", "type": {"kind": "identifier", "identifier": "example.echo/EchoFetchResponse"}},
                    {"name": "err", "type": {"kind": "primitive", "subtype": "int32"}},
                    {"name": "framework_err", "type": {"kind": "internal", "subtype": "framework_error"}},
                ],
            }],
            "protocol_declarations": [{
                "name": "example.echo/Echo",
                "methods": [
                    {
                        "name": "Say",
                        "ordinal": 1,
                        "has_request": true,
                        "has_response": true,
                        "strict": true,
                        "maybe_request_payload": {"kind": "identifier", "identifier": "example.echo/EchoSayRequest"},
                        "maybe_response_payload": {"kind": "identifier", "identifier": "example.echo/EchoSayResponse"},
                    },
                    {
                        "name": "Ping",
                        "ordinal": 2,
                        "has_request": true,
                        "has_response": false,
                        "strict": true,
                        "maybe_request_payload": {"kind": "identifier", "identifier": "example.echo/EchoPingRequest"},
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
                        "maybe_response_payload": {"kind": "identifier", "identifier": "example.echo/EchoOnNewsRequest"},
                    },
                    {
                        "name": "Fetch",
                        "ordinal": 5,
                        "has_request": true,
                        "has_response": true,
                        "strict": false,
                        "has_error": true,
                        "maybe_response_payload": {"kind": "identifier", "identifier": "example.echo/Echo_Fetch_Result"},
                    },
                ],
            }],
        }))
        .unwrap();
    Arc::new(registry)
}

struct Harness {
    registry: Arc<Registry>,
    codec: Arc<dyn WireCodec>,
    client_end: Channel,
    server: Server,
}

fn harness(handler: Box<dyn RequestHandler>) -> Harness {
    let registry = echo_registry();
    let codec: Arc<dyn WireCodec> = Arc::new(JsonCodec::new(registry.clone()));
    let protocol = registry
        .namespace("example.echo")
        .unwrap()
        .protocol("Echo")
        .unwrap();
    let (client_end, server_end) = Channel::create();
    let server = Server::new(
        server_end,
        protocol,
        registry.clone(),
        codec.clone(),
        handler,
    );
    Harness {
        registry,
        codec,
        client_end,
        server,
    }
}

impl Harness {
    fn write_request(&self, txid: u32, ordinal: u64, type_name: &str, args: Vec<(String, Value)>) {
        let payload = build_payload(&self.registry, type_name, args).unwrap();
        let (bytes, handles) = self
            .codec
            .encode("example.echo", type_name, &payload)
            .unwrap();
        self.client_end
            .write(MessageBuf::new(
                TransactionHeader::new(txid, ordinal),
                &bytes,
                handles,
            ))
            .unwrap();
    }

    fn write_bare_request(&self, txid: u32, ordinal: u64) {
        self.client_end
            .write(MessageBuf::new(
                TransactionHeader::new(txid, ordinal),
                &[],
                Vec::new(),
            ))
            .unwrap();
    }

    fn read_response(&self) -> (TransactionHeader, MessageBuf) {
        let ChannelRead::Message(message) = self.client_end.read() else {
            panic!("expected a queued response");
        };
        let (header, _) = TransactionHeader::decode(&message.bytes).unwrap();
        (header, message)
    }
}

/// Echoes `say`, accepts `ping` and `sync`.
struct EchoHandler;

#[async_trait]
impl RequestHandler for EchoHandler {
    async fn handle_request(
        &mut self,
        method: &MethodInfo,
        request: Option<Value>,
    ) -> Result<Reply> {
        match method.name.as_str() {
            "say" => {
                let request = request.expect("say carries a payload");
                let value = request.field("value").cloned().expect("value member");
                Ok(Reply::Message(Value::Struct {
                    ty: "example.echo/EchoSayResponse".to_string(),
                    fields: vec![("value".to_string(), value)],
                }))
            }
            "ping" | "sync" => Ok(Reply::None),
            other => Err(DynrpcError::NotImplemented(other.to_string())),
        }
    }
}

/// Replies with a fixed [`Reply`] to every method.
struct FixedHandler {
    reply: fn() -> Reply,
}

#[async_trait]
impl RequestHandler for FixedHandler {
    async fn handle_request(&mut self, _: &MethodInfo, _: Option<Value>) -> Result<Reply> {
        Ok((self.reply)())
    }
}

/// Requests a server stop on the first request.
struct StoppingHandler;

#[async_trait]
impl RequestHandler for StoppingHandler {
    async fn handle_request(&mut self, _: &MethodInfo, _: Option<Value>) -> Result<Reply> {
        Err(DynrpcError::Stopped)
    }
}

/// The abstract-by-default server: every method not implemented.
struct DefaultHandler;

#[async_trait]
impl RequestHandler for DefaultHandler {}

// ============================================================================
// Request/Response Exchange
// ============================================================================

#[tokio::test]
async fn test_say_round_trip_preserves_txid_and_ordinal() {
    let mut h = harness(Box::new(EchoHandler));
    h.write_request(
        7,
        1,
        "example.echo/EchoSayRequest",
        vec![("value".to_string(), Value::String("hi".to_string()))],
    );

    assert!(h.server.next_request().await.unwrap());

    let (header, message) = h.read_response();
    assert_eq!(header.txid, 7);
    assert_eq!(header.ordinal, 1);
    let (_, body) = TransactionHeader::decode(&message.bytes).unwrap();
    let response = h
        .codec
        .decode("example.echo/EchoSayResponse", body, &message.handles)
        .unwrap();
    assert_eq!(
        response.field("value"),
        Some(&Value::String("hi".to_string()))
    );
    // Exactly one response was produced.
    assert_eq!(h.client_end.read(), ChannelRead::WouldBlock);
}

#[tokio::test]
async fn test_one_way_then_peer_close() {
    let mut h = harness(Box::new(EchoHandler));
    h.write_request(
        0,
        2,
        "example.echo/EchoPingRequest",
        vec![("seq".to_string(), Value::UInt(1))],
    );
    h.client_end.close();

    // One request, then a clean end with no error.
    assert!(h.server.next_request().await.unwrap());
    assert!(!h.server.next_request().await.unwrap());
    // Terminated engines stay terminated.
    assert!(!h.server.next_request().await.unwrap());
}

#[tokio::test]
async fn test_empty_response_acknowledgement() {
    let mut h = harness(Box::new(EchoHandler));
    h.write_bare_request(11, 3);

    assert!(h.server.next_request().await.unwrap());

    let (header, message) = h.read_response();
    assert_eq!(header.txid, 11);
    assert_eq!(header.ordinal, 3);
    let (_, body) = TransactionHeader::decode(&message.bytes).unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_serve_loops_until_peer_close() {
    let mut h = harness(Box::new(EchoHandler));
    for txid in 1..=3u32 {
        h.write_request(
            txid,
            1,
            "example.echo/EchoSayRequest",
            vec![("value".to_string(), Value::String(format!("m{txid}")))],
        );
    }
    h.client_end.close();
    h.server.serve().await.unwrap();
    for txid in 1..=3u32 {
        let (header, _) = h.read_response();
        assert_eq!(header.txid, txid);
    }
}

// ============================================================================
// Contract Violations
// ============================================================================

#[tokio::test]
async fn test_two_way_returning_nothing_is_fatal() {
    let mut h = harness(Box::new(FixedHandler {
        reply: || Reply::None,
    }));
    h.write_request(
        9,
        1,
        "example.echo/EchoSayRequest",
        vec![("value".to_string(), Value::String("x".to_string()))],
    );

    let err = h.server.next_request().await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("say"), "unexpected error: {message}");
    assert!(message.contains("no response"));
    // The owning channel is closed.
    assert_eq!(h.client_end.read(), ChannelRead::PeerClosed);
}

#[tokio::test]
async fn test_one_way_returning_value_is_fatal() {
    let mut h = harness(Box::new(FixedHandler {
        reply: || Reply::Message(Value::Null),
    }));
    h.write_request(
        0,
        2,
        "example.echo/EchoPingRequest",
        vec![("seq".to_string(), Value::UInt(4))],
    );

    let err = h.server.next_request().await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("ping"));
    assert!(message.contains("one-way"));
    assert_eq!(h.client_end.read(), ChannelRead::PeerClosed);
}

#[tokio::test]
async fn test_error_reply_without_result_is_fatal() {
    let mut h = harness(Box::new(FixedHandler {
        reply: || Reply::DomainError(Value::Int(-1)),
    }));
    h.write_request(
        5,
        1,
        "example.echo/EchoSayRequest",
        vec![("value".to_string(), Value::String("x".to_string()))],
    );

    let err = h.server.next_request().await.unwrap_err();
    assert!(err.to_string().contains("without a result"));
}

#[tokio::test]
async fn test_not_implemented_default_closes_channel() {
    let mut h = harness(Box::new(DefaultHandler));
    h.write_request(
        3,
        1,
        "example.echo/EchoSayRequest",
        vec![("value".to_string(), Value::String("x".to_string()))],
    );

    let err = h.server.next_request().await.unwrap_err();
    assert!(matches!(err, DynrpcError::NotImplemented(ref name) if name == "say"));
    assert_eq!(h.client_end.read(), ChannelRead::PeerClosed);
}

#[tokio::test]
async fn test_unknown_ordinal_is_fatal() {
    let mut h = harness(Box::new(DefaultHandler));
    h.write_bare_request(1, 999);

    let err = h.server.next_request().await.unwrap_err();
    assert!(matches!(err, DynrpcError::UnknownOrdinal { ordinal: 999, .. }));
    assert_eq!(h.client_end.read(), ChannelRead::PeerClosed);
}

// ============================================================================
// Result Wrapping
// ============================================================================

async fn fetch_result(reply: fn() -> Reply) -> Value {
    let mut h = harness(Box::new(FixedHandler { reply }));
    h.write_bare_request(21, 5);
    assert!(h.server.next_request().await.unwrap());
    let (_, message) = h.read_response();
    let (_, body) = TransactionHeader::decode(&message.bytes).unwrap();
    h.codec
        .decode("example.echo/Echo_Fetch_Result", body, &message.handles)
        .unwrap()
}

#[tokio::test]
async fn test_result_success_wraps_into_response_variant() {
    let result = fetch_result(|| {
        Reply::Message(Value::Struct {
            ty: "example.echo/EchoFetchResponse".to_string(),
            fields: vec![(
                "data".to_string(),
                Value::Vector(vec![Value::UInt(1), Value::UInt(2)]),
            )],
        })
    })
    .await;
    let response = result.unwrap_result().unwrap();
    assert_eq!(
        response.field("data"),
        Some(&Value::Vector(vec![Value::UInt(1), Value::UInt(2)]))
    );
}

#[tokio::test]
async fn test_result_domain_error_wraps_into_err_variant() {
    let result = fetch_result(|| Reply::DomainError(Value::Int(-5))).await;
    assert_eq!(result.variant(), Some(("err", &Value::Int(-5))));
    let err = result.unwrap_result().unwrap_err();
    assert!(err.to_string().contains("-5"));
}

#[tokio::test]
async fn test_result_framework_error_wraps_into_framework_variant() {
    let result = fetch_result(|| {
        Reply::FrameworkError(dynrpc_common::FrameworkError::UnknownMethod)
    })
    .await;
    assert_eq!(result.variant(), Some(("framework_err", &Value::Int(-2))));
    assert!(result
        .unwrap_result()
        .unwrap_err()
        .to_string()
        .contains("framework error"));
}

#[tokio::test]
async fn test_result_empty_success_unwraps_cleanly() {
    let result = fetch_result(|| Reply::None).await;
    assert_eq!(result.unwrap_result().unwrap(), Value::Null);
}

// ============================================================================
// Stop and Events
// ============================================================================

#[tokio::test]
async fn test_handler_stop_ends_loop_cleanly() {
    let mut h = harness(Box::new(StoppingHandler));
    h.write_bare_request(2, 3);

    assert!(!h.server.next_request().await.unwrap());
    assert_eq!(h.client_end.read(), ChannelRead::PeerClosed);
}

#[tokio::test]
async fn test_send_event_writes_txid_zero() {
    let h = harness(Box::new(DefaultHandler));
    h.server
        .send_event(
            "on_news",
            vec![(
                "headline".to_string(),
                Value::String("it compiles".to_string()),
            )],
        )
        .unwrap();

    let ChannelRead::Message(message) = h.client_end.read() else {
        panic!("expected the event message");
    };
    let (header, body) = TransactionHeader::decode(&message.bytes).unwrap();
    assert_eq!(header.txid, 0);
    assert_eq!(header.ordinal, 4);
    let payload = h
        .codec
        .decode("example.echo/EchoOnNewsRequest", body, &message.handles)
        .unwrap();
    assert_eq!(
        payload.field("headline"),
        Some(&Value::String("it compiles".to_string()))
    );
}
