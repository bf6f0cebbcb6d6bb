//! DynRPC Server Dispatch Engine
//!
//! This crate drives a single channel's request/response exchange: one
//! message is read, decoded through the wire codec, dispatched to the
//! user-supplied handler, and its reply validated against the method's
//! contract and written back — strictly one request at a time.
//!
//! # Dispatch Loop
//!
//! [`Server::serve`] loops over [`Server::next_request`], whose states
//! are `Idle → Reading → Dispatching → (Idle | Terminated)`:
//!
//! - a would-block read suspends on the channel's readiness notification
//!   and retries, invisibly to application code
//! - peer closure terminates the loop cleanly
//! - a handler-requested stop closes the channel and ends the loop
//!   cleanly
//! - everything else — unknown ordinals, decode failures, contract
//!   violations, handler errors — closes the channel and propagates
//!   (fail-fast: a desynced request/response stream must not continue)
//!
//! Multiple servers on distinct channels run concurrently without
//! cross-channel locking; every piece of shared compiled state is
//! immutable after materialization.

pub mod server;

pub use server::{Reply, RequestHandler, Server};
