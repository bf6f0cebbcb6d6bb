use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::error::{DynrpcError, Result};
use crate::message::{epitaph_message, MessageBuf};

/// Outcome of a non-blocking channel read.
#[derive(Debug, PartialEq)]
pub enum ChannelRead {
    /// A complete message was dequeued.
    Message(MessageBuf),
    /// No message is queued; wait on [`Channel::readable`] and retry.
    WouldBlock,
    /// The peer endpoint closed and every queued message has been drained.
    PeerClosed,
}

struct Side {
    inner: Mutex<SideState>,
    readable: Notify,
}

struct SideState {
    queue: VecDeque<MessageBuf>,
    /// Set once the endpoint that reads from this side has closed.
    closed: bool,
}

struct Shared {
    sides: [Side; 2],
}

/// One endpoint of an in-process datagram channel pair.
///
/// # Example
///
/// ```
/// use dynrpc_common::transport::{Channel, ChannelRead};
/// use dynrpc_common::message::MessageBuf;
///
/// let (a, b) = Channel::create();
/// a.write(MessageBuf { bytes: vec![1, 2, 3], handles: vec![] }).unwrap();
/// match b.read() {
///     ChannelRead::Message(m) => assert_eq!(m.bytes, vec![1, 2, 3]),
///     other => panic!("unexpected read result: {other:?}"),
/// }
/// ```
pub struct Channel {
    shared: Arc<Shared>,
    /// Index of the side this endpoint reads from.
    side: usize,
}

impl Channel {
    /// Creates a connected channel pair.
    pub fn create() -> (Channel, Channel) {
        let shared = Arc::new(Shared {
            sides: [Side::new(), Side::new()],
        });
        (
            Channel {
                shared: shared.clone(),
                side: 0,
            },
            Channel { shared, side: 1 },
        )
    }

    fn our_side(&self) -> &Side {
        &self.shared.sides[self.side]
    }

    fn peer_side(&self) -> &Side {
        &self.shared.sides[1 - self.side]
    }

    /// Dequeues the next message without blocking.
    pub fn read(&self) -> ChannelRead {
        let mut state = self.our_side().inner.lock().expect("channel lock");
        if let Some(message) = state.queue.pop_front() {
            return ChannelRead::Message(message);
        }
        drop(state);
        let peer_closed = self.peer_side().inner.lock().expect("channel lock").closed;
        if peer_closed {
            ChannelRead::PeerClosed
        } else {
            ChannelRead::WouldBlock
        }
    }

    /// Queues a message for the peer endpoint.
    ///
    /// # Errors
    ///
    /// Fails with [`DynrpcError::PeerClosed`] if the peer endpoint has
    /// already closed.
    pub fn write(&self, message: MessageBuf) -> Result<()> {
        let peer = self.peer_side();
        let mut state = peer.inner.lock().expect("channel lock");
        if state.closed {
            return Err(DynrpcError::PeerClosed);
        }
        state.queue.push_back(message);
        drop(state);
        peer.readable.notify_one();
        Ok(())
    }

    /// Closes this endpoint. Queued messages already delivered to the peer
    /// remain readable; the peer then observes [`ChannelRead::PeerClosed`].
    pub fn close(&self) {
        let mut state = self.our_side().inner.lock().expect("channel lock");
        if state.closed {
            return;
        }
        state.closed = true;
        drop(state);
        // Wake a peer blocked in readable() so it can observe the closure.
        self.peer_side().readable.notify_one();
    }

    /// Sends a terminal epitaph carrying `status`, then closes.
    pub fn close_with_epitaph(&self, status: i32) {
        let _ = self.write(epitaph_message(status));
        self.close();
    }

    /// Suspends until a message is queued or the peer closes.
    pub async fn readable(&self) {
        loop {
            {
                let state = self.our_side().inner.lock().expect("channel lock");
                if !state.queue.is_empty() {
                    return;
                }
            }
            if self.peer_side().inner.lock().expect("channel lock").closed {
                return;
            }
            self.our_side().readable.notified().await;
        }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").field("side", &self.side).finish()
    }
}

impl Side {
    fn new() -> Self {
        Self {
            inner: Mutex::new(SideState {
                queue: VecDeque::new(),
                closed: false,
            }),
            readable: Notify::new(),
        }
    }
}
