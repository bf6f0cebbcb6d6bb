use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use dynrpc_common::message::{MessageBuf, TransactionHeader};
use dynrpc_common::transport::{Channel, ChannelRead};
use dynrpc_common::{DynrpcError, FrameworkError, Result, Value, WireCodec};
use dynrpc_compiler::{build_payload, names, MethodInfo, ProtocolInfo, Registry};

/// What a request handler produced.
#[derive(Debug)]
pub enum Reply {
    /// No value: completes a one-way method, an empty-response
    /// acknowledgement, or an empty result success.
    None,
    /// The response payload of a two-way method.
    Message(Value),
    /// The domain error of a result-bearing method.
    DomainError(Value),
    /// The framework error of a flexible method.
    FrameworkError(FrameworkError),
}

/// User-supplied method implementations for one protocol.
///
/// The engine calls `handle_request` once per inbound request; dispatch on
/// `method.name` (the snake-case method name). Every method defaults to
/// "not implemented" until overridden, which fails the channel.
#[async_trait]
pub trait RequestHandler: Send {
    async fn handle_request(&mut self, method: &MethodInfo, request: Option<Value>)
        -> Result<Reply>
    {
        let _ = request;
        Err(DynrpcError::NotImplemented(method.name.clone()))
    }
}

/// The server end of one channel bound to one compiled protocol.
///
/// Exactly one request is in flight at a time: the loop never reads the
/// next message until the previous one's response has been fully written.
pub struct Server {
    channel: Channel,
    protocol: Arc<ProtocolInfo>,
    registry: Arc<Registry>,
    codec: Arc<dyn WireCodec>,
    handler: Box<dyn RequestHandler>,
    terminated: bool,
}

impl Server {
    pub fn new(
        channel: Channel,
        protocol: Arc<ProtocolInfo>,
        registry: Arc<Registry>,
        codec: Arc<dyn WireCodec>,
        handler: Box<dyn RequestHandler>,
    ) -> Self {
        Self {
            channel,
            protocol,
            registry,
            codec,
            handler,
            terminated: false,
        }
    }

    pub fn protocol(&self) -> &Arc<ProtocolInfo> {
        &self.protocol
    }

    /// Serves requests until the peer closes or the handler requests a
    /// stop. Fatal dispatch failures close the channel and propagate.
    pub async fn serve(&mut self) -> Result<()> {
        while self.next_request().await? {}
        Ok(())
    }

    /// Processes at most one request.
    ///
    /// Returns `Ok(true)` when a request was dispatched and answered, and
    /// `Ok(false)` when no more requests will arrive (peer closed, or the
    /// handler stopped the server).
    pub async fn next_request(&mut self) -> Result<bool> {
        if self.terminated {
            return Ok(false);
        }
        let message = loop {
            match self.channel.read() {
                ChannelRead::Message(message) => break message,
                ChannelRead::WouldBlock => self.channel.readable().await,
                ChannelRead::PeerClosed => {
                    debug!(protocol = %self.protocol.marker, "peer closed, ending dispatch loop");
                    self.terminated = true;
                    return Ok(false);
                }
            }
        };
        match self.dispatch(message).await {
            Ok(()) => Ok(true),
            Err(DynrpcError::Stopped) => {
                debug!(protocol = %self.protocol.marker, "handler stopped the server");
                self.terminate();
                Ok(false)
            }
            Err(err) => {
                self.terminate();
                Err(err)
            }
        }
    }

    fn terminate(&mut self) {
        self.channel.close();
        self.terminated = true;
    }

    async fn dispatch(&mut self, message: MessageBuf) -> Result<()> {
        let (header, payload) = TransactionHeader::decode(&message.bytes)?;
        let info = self
            .protocol
            .method_by_ordinal(header.ordinal)
            .cloned()
            .ok_or_else(|| DynrpcError::UnknownOrdinal {
                protocol: self.protocol.name.clone(),
                ordinal: header.ordinal,
            })?;
        let request = match info.request_ident.as_deref() {
            Some(ident) => Some(self.codec.decode(ident, payload, &message.handles)?),
            None => None,
        };
        debug!(
            method = %info.name,
            ordinal = info.ordinal,
            txid = header.txid,
            "dispatching request"
        );

        let reply = self.handler.handle_request(&info, request).await?;

        if !info.requires_response {
            if !matches!(reply, Reply::None) {
                return Err(DynrpcError::ContractViolation {
                    method: info.name.clone(),
                    detail: "one-way method produced a response".to_string(),
                });
            }
            if info.empty_response {
                let ack = MessageBuf::new(
                    TransactionHeader::new(header.txid, header.ordinal),
                    &[],
                    Vec::new(),
                );
                self.channel.write(ack)?;
            }
            return Ok(());
        }

        let body = if info.has_result {
            wrap_result(&info, reply)?
        } else {
            match reply {
                Reply::Message(value) => value,
                Reply::None => {
                    return Err(DynrpcError::ContractViolation {
                        method: info.name.clone(),
                        detail: "two-way method returned no response".to_string(),
                    })
                }
                Reply::DomainError(_) | Reply::FrameworkError(_) => {
                    return Err(DynrpcError::ContractViolation {
                        method: info.name.clone(),
                        detail: "error reply from a method without a result".to_string(),
                    })
                }
            }
        };
        let ident = info
            .response_ident
            .as_deref()
            .expect("requires_response implies a response payload");
        let (bytes, handles) = self.codec.encode(&self.protocol.library, ident, &body)?;
        self.channel.write(MessageBuf::new(
            TransactionHeader::new(header.txid, header.ordinal),
            &bytes,
            handles,
        ))?;
        Ok(())
    }

    /// Sends an event: a one-way server-to-client message with txid 0,
    /// built from the event's payload shape.
    pub fn send_event(&self, event: &str, args: Vec<(String, Value)>) -> Result<()> {
        let info = self.protocol.event_by_name(event)?.clone();
        let (bytes, handles) = match info.request_ident.as_deref() {
            Some(ident) => {
                let payload = build_payload(&self.registry, ident, args)?;
                self.codec.encode(&self.protocol.library, ident, &payload)?
            }
            None => {
                if !args.is_empty() {
                    return Err(DynrpcError::InvalidArguments {
                        ty: info.name.clone(),
                        detail: "event takes no arguments".to_string(),
                    });
                }
                (Vec::new(), Vec::new())
            }
        };
        debug!(event = %info.name, "sending event");
        self.channel.write(MessageBuf::new(
            TransactionHeader::new(0, info.ordinal),
            &bytes,
            handles,
        ))
    }
}

/// Wraps a raw handler reply into the method's result-union shape. A reply
/// that already is the result union passes through unchanged.
fn wrap_result(info: &MethodInfo, reply: Reply) -> Result<Value> {
    let ident = info
        .response_ident
        .as_deref()
        .expect("has_result implies a response payload");
    let ty = names::normalize_identifier(ident);
    let (variant, value) = match reply {
        Reply::Message(value) => {
            if value.type_name() == Some(ty.as_str()) {
                return Ok(value);
            }
            ("response", value)
        }
        // An error-only method's success carries no payload.
        Reply::None => ("response", Value::Null),
        Reply::DomainError(error) => ("err", error),
        Reply::FrameworkError(error) => ("framework_err", Value::Int(error.code() as i64)),
    };
    Ok(Value::Union {
        ty,
        variant: Some((variant.to_string(), Box::new(value))),
    })
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("protocol", &self.protocol.marker)
            .field("terminated", &self.terminated)
            .finish()
    }
}
