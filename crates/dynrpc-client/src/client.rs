use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use dynrpc_common::message::{epitaph_status, MessageBuf, TransactionHeader};
use dynrpc_common::transport::{Channel, ChannelRead};
use dynrpc_common::value::RawHandle;
use dynrpc_common::{DynrpcError, Result, Value, WireCodec};
use dynrpc_compiler::{build_payload, MethodInfo, ProtocolInfo, Registry};

/// The client end of one channel bound to one compiled protocol.
///
/// One request-per-call: `call` builds the payload from named arguments,
/// writes it with a fresh transaction id, and awaits the matching
/// response. Multiple calls may be pending at once; whichever caller is
/// reading stages the other transactions' responses for their owners.
pub struct ProtocolClient {
    channel: Channel,
    protocol: Arc<ProtocolInfo>,
    registry: Arc<Registry>,
    codec: Arc<dyn WireCodec>,
    next_txid: AtomicU32,
    demux: Mutex<Demux>,
    /// Serializes channel reads; waiters re-check the demux after taking it.
    read_gate: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct Demux {
    responses: HashMap<u32, MessageBuf>,
    events: VecDeque<MessageBuf>,
    epitaph: Option<i32>,
    peer_closed: bool,
}

impl ProtocolClient {
    pub fn new(
        channel: Channel,
        protocol: Arc<ProtocolInfo>,
        registry: Arc<Registry>,
        codec: Arc<dyn WireCodec>,
    ) -> Self {
        Self {
            channel,
            protocol,
            registry,
            codec,
            next_txid: AtomicU32::new(1),
            demux: Mutex::new(Demux::default()),
            read_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn protocol(&self) -> &Arc<ProtocolInfo> {
        &self.protocol
    }

    /// Calls a method by its snake-case name.
    ///
    /// Two-way methods resolve to the decoded response value (`None` for
    /// an empty-response acknowledgement); one-way methods write and
    /// return immediately.
    pub async fn call(&self, method: &str, args: Vec<(String, Value)>) -> Result<Option<Value>> {
        let info = self.protocol.method_by_name(method)?.clone();
        let (bytes, handles) = self.encode_args(&info, args)?;
        if !info.has_response {
            self.write_message(0, info.ordinal, &bytes, handles)?;
            return Ok(None);
        }
        let txid = self.alloc_txid();
        debug!(method = %info.name, txid, "sending two-way request");
        self.write_message(txid, info.ordinal, &bytes, handles)?;
        let reply = self.wait_response(txid).await?;
        let (_, body) = TransactionHeader::decode(&reply.bytes)?;
        if info.requires_response {
            let ident = info
                .response_ident
                .as_deref()
                .expect("requires_response implies a response payload");
            Ok(Some(self.codec.decode(ident, body, &reply.handles)?))
        } else {
            // Empty-response acknowledgement carries no payload.
            Ok(None)
        }
    }

    fn encode_args(
        &self,
        info: &MethodInfo,
        args: Vec<(String, Value)>,
    ) -> Result<(Vec<u8>, Vec<RawHandle>)> {
        match info.request_ident.as_deref() {
            Some(ident) => {
                let payload = build_payload(&self.registry, ident, args)?;
                self.codec.encode(&self.protocol.library, ident, &payload)
            }
            None => {
                if !args.is_empty() {
                    return Err(DynrpcError::InvalidArguments {
                        ty: info.name.clone(),
                        detail: "method takes no arguments".to_string(),
                    });
                }
                Ok((Vec::new(), Vec::new()))
            }
        }
    }

    fn alloc_txid(&self) -> u32 {
        loop {
            let txid = self.next_txid.fetch_add(1, Ordering::Relaxed);
            if txid != 0 {
                return txid;
            }
        }
    }

    fn write_message(
        &self,
        txid: u32,
        ordinal: u64,
        payload: &[u8],
        handles: Vec<RawHandle>,
    ) -> Result<()> {
        self.check_terminal()?;
        let message = MessageBuf::new(TransactionHeader::new(txid, ordinal), payload, handles);
        self.channel.write(message).map_err(|err| match err {
            DynrpcError::PeerClosed => self.terminal_error(),
            other => other,
        })
    }

    fn check_terminal(&self) -> Result<()> {
        let demux = self.demux.lock().expect("demux lock");
        match demux.epitaph {
            Some(status) => Err(DynrpcError::Epitaph(status)),
            None if demux.peer_closed => Err(DynrpcError::PeerClosed),
            None => Ok(()),
        }
    }

    fn terminal_error(&self) -> DynrpcError {
        match self.demux.lock().expect("demux lock").epitaph {
            Some(status) => DynrpcError::Epitaph(status),
            None => DynrpcError::PeerClosed,
        }
    }

    /// Routes one inbound message to its consumer.
    fn classify(&self, message: MessageBuf) -> Result<()> {
        let (header, payload) = TransactionHeader::decode(&message.bytes)?;
        let mut demux = self.demux.lock().expect("demux lock");
        if header.is_epitaph() {
            let status = epitaph_status(payload)?;
            debug!(status, "received epitaph");
            demux.epitaph.get_or_insert(status);
        } else if header.txid == 0 {
            demux.events.push_back(message);
        } else {
            demux.responses.insert(header.txid, message);
        }
        Ok(())
    }

    fn take_response(&self, txid: u32) -> Result<Option<MessageBuf>> {
        let mut demux = self.demux.lock().expect("demux lock");
        if let Some(message) = demux.responses.remove(&txid) {
            return Ok(Some(message));
        }
        if let Some(status) = demux.epitaph {
            return Err(DynrpcError::Epitaph(status));
        }
        if demux.peer_closed {
            return Err(DynrpcError::PeerClosed);
        }
        Ok(None)
    }

    async fn wait_response(&self, txid: u32) -> Result<MessageBuf> {
        loop {
            if let Some(message) = self.take_response(txid)? {
                return Ok(message);
            }
            let _gate = self.read_gate.lock().await;
            // Another reader may have staged our response while we waited
            // for the gate.
            if let Some(message) = self.take_response(txid)? {
                return Ok(message);
            }
            self.pump_one().await;
        }
    }

    /// Performs one channel read, suspending on readiness if nothing is
    /// queued. Must be called with the read gate held.
    async fn pump_one(&self) {
        match self.channel.read() {
            ChannelRead::Message(message) => {
                if let Err(err) = self.classify(message) {
                    debug!(error = %err, "dropping malformed inbound message");
                }
            }
            ChannelRead::WouldBlock => self.channel.readable().await,
            ChannelRead::PeerClosed => {
                self.demux.lock().expect("demux lock").peer_closed = true;
            }
        }
    }

    fn take_event(&self) -> Option<std::result::Result<MessageBuf, ()>> {
        let mut demux = self.demux.lock().expect("demux lock");
        if let Some(message) = demux.events.pop_front() {
            return Some(Ok(message));
        }
        // Epitaph or closure ends event consumption cleanly.
        if demux.epitaph.is_some() || demux.peer_closed {
            return Some(Err(()));
        }
        None
    }

    /// Awaits the next event on this channel.
    ///
    /// Returns `None` when the peer has closed (with or without an
    /// epitaph) and every staged event has been consumed.
    pub async fn next_event(&self) -> Result<Option<(Arc<MethodInfo>, Option<Value>)>> {
        let message = loop {
            match self.take_event() {
                Some(Ok(message)) => break message,
                Some(Err(())) => return Ok(None),
                None => {}
            }
            let _gate = self.read_gate.lock().await;
            match self.take_event() {
                Some(Ok(message)) => break message,
                Some(Err(())) => return Ok(None),
                None => self.pump_one().await,
            }
        };
        let (header, body) = TransactionHeader::decode(&message.bytes)?;
        let info = self
            .protocol
            .event_by_ordinal(header.ordinal)
            .cloned()
            .ok_or_else(|| DynrpcError::UnknownOrdinal {
                protocol: self.protocol.name.clone(),
                ordinal: header.ordinal,
            })?;
        let payload = match info.request_ident.as_deref() {
            Some(ident) => Some(self.codec.decode(ident, body, &message.handles)?),
            None => None,
        };
        Ok(Some((info, payload)))
    }

    /// Closes the underlying channel.
    pub fn close(&self) {
        self.channel.close();
    }
}

impl std::fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("protocol", &self.protocol.marker)
            .finish()
    }
}
