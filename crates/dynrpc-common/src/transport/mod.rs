//! DynRPC Channel Transport
//!
//! This module provides the in-process datagram channel the protocol roles
//! run over.
//!
//! # Architecture
//!
//! A channel is a pair of connected endpoints with exclusive ownership:
//! whoever holds an endpoint reads from it, writes to its peer, and is
//! responsible for closing it. Message boundaries are preserved; there are
//! no partial reads.
//!
//! Reads never block. An empty queue reports [`ChannelRead::WouldBlock`]
//! and the reader suspends on [`Channel::readable`] — an explicit
//! readiness notification — before re-issuing the read. Peer closure is a
//! clean signal ([`ChannelRead::PeerClosed`]), delivered only after every
//! queued message has been drained.

pub mod channel;

pub use channel::{Channel, ChannelRead};
