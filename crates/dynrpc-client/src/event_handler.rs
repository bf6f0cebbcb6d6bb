//! Event-handler role.
//!
//! Events are server-initiated messages with no reply. The handler trait
//! exposes one entry point keyed by the event's dispatch metadata; every
//! event defaults to "not implemented" until overridden.

use async_trait::async_trait;
use tracing::debug;

use dynrpc_common::{DynrpcError, Result, Value};
use dynrpc_compiler::MethodInfo;

use crate::client::ProtocolClient;

/// User-supplied event handling for one protocol.
#[async_trait]
pub trait EventHandler: Send {
    /// Handles one event. Dispatch on `event.name`.
    ///
    /// Returning `Err(DynrpcError::Stopped)` ends the serving loop
    /// cleanly; any other error closes the channel and propagates.
    async fn on_event(&mut self, event: &MethodInfo, payload: Option<Value>) -> Result<()> {
        let _ = payload;
        Err(DynrpcError::NotImplemented(event.name.clone()))
    }
}

impl ProtocolClient {
    /// Drives the event-handler loop until the peer closes or the handler
    /// requests a stop.
    pub async fn serve_events<H>(&self, handler: &mut H) -> Result<()>
    where
        H: EventHandler + ?Sized,
    {
        loop {
            let event = match self.next_event().await {
                Ok(event) => event,
                Err(err) => {
                    self.close();
                    return Err(err);
                }
            };
            let Some((info, payload)) = event else {
                debug!(protocol = %self.protocol().marker, "event stream ended");
                return Ok(());
            };
            debug!(event = %info.name, "dispatching event");
            match handler.on_event(&info, payload).await {
                Ok(()) => {}
                Err(DynrpcError::Stopped) => return Ok(()),
                Err(err) => {
                    self.close();
                    return Err(err);
                }
            }
        }
    }
}
