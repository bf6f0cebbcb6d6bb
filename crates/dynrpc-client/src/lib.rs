//! DynRPC Client Role
//!
//! This crate provides the client side of a compiled protocol: two-way
//! calls correlated by transaction id, fire-and-forget one-way calls, and
//! the event-handler role consuming server-initiated events.
//!
//! # Overview
//!
//! A [`ProtocolClient`] binds one channel endpoint to one compiled
//! protocol. Call-site arguments are validated against the method's
//! payload shape (struct members required, table members optional, union
//! variants exactly-one) before anything is written to the channel.
//!
//! Inbound messages are demultiplexed: responses are staged by transaction
//! id so concurrent calls interleave safely, events (txid 0) queue for the
//! [`EventHandler`] role, and a terminal epitaph message fails every
//! pending and subsequent call with the peer's closing status.

pub mod client;
pub mod event_handler;

pub use client::ProtocolClient;
pub use event_handler::EventHandler;
