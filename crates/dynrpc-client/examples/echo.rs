//! In-process echo demo: compiles a small IR document, binds a server and
//! a client to the two ends of a channel, and round-trips one call.
//!
//! Run with `RUST_LOG=debug cargo run --example echo` to watch the
//! dispatch loop work.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use dynrpc_client::ProtocolClient;
use dynrpc_codec::JsonCodec;
use dynrpc_common::transport::Channel;
use dynrpc_common::{Result, Value, WireCodec};
use dynrpc_compiler::{MethodInfo, Registry};
use dynrpc_server::{Reply, RequestHandler, Server};

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
                let value = request
                    .and_then(|request| request.field("value").cloned())
                    .unwrap_or(Value::Null);
                Ok(Reply::Message(Value::Struct {
                    ty: "example.echo/EchoSayResponse".to_string(),
                    fields: vec![("value".to_string(), value)],
                }))
            }
            other => Err(dynrpc_common::DynrpcError::NotImplemented(other.to_string())),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let registry = Arc::new(Registry::new());
    registry.add_ir_json(json!({
        "name": "example.echo",
        "declarations": {
            "example.echo/EchoSayRequest": "struct",
            "example.echo/EchoSayResponse": "struct",
            "example.echo/Echo": "protocol",
        },
        "declaration_order": [
            "example.echo/EchoSayRequest",
            "example.echo/EchoSayResponse",
            "example.echo/Echo",
        ],
        "struct_declarations": [
            {
                "name": "example.echo/EchoSayRequest",
                "members": [{"name": "value", "type": {"kind": "string"}}],
            },
            {
                "name": "example.echo/EchoSayResponse",
                "members": [{"name": "value", "type": {"kind": "string"}}],
            },
        ],
        "protocol_declarations": [{
            "name": "example.echo/Echo",
            "methods": [{
                "name": "Say",
                "ordinal": 1,
                "has_request": true,
                "has_response": true,
                "strict": true,
                "maybe_request_payload": {"kind": "identifier", "identifier": "example.echo/EchoSayRequest"},
                "maybe_response_payload": {"kind": "identifier", "identifier": "example.echo/EchoSayResponse"},
            }],
        }],
    }))?;

    let codec: Arc<dyn WireCodec> = Arc::new(JsonCodec::new(registry.clone()));
    let protocol = registry.namespace("example.echo")?.protocol("Echo")?;

    let (client_end, server_end) = Channel::create();
    let mut server = Server::new(
        server_end,
        protocol.clone(),
        registry.clone(),
        codec.clone(),
        Box::new(EchoHandler),
    );
    let server_task = tokio::spawn(async move { server.serve().await });

    let client = ProtocolClient::new(client_end, protocol, registry, codec);
    let response = client
        .call(
            "say",
            vec![("value".to_string(), Value::String("hello, wire".to_string()))],
        )
        .await?
        .expect("say has a response");
    println!("server echoed: {response}");

    drop(client);
    server_task.await.expect("server task")?;
    Ok(())
}
