//! DynRPC Common Types and Transport
//!
//! This crate provides the shared protocol layer for the DynRPC dynamic
//! binding system: the runtime value model, message framing, the wire-codec
//! boundary, and the in-process channel transport used by both protocol
//! roles.
//!
//! # Overview
//!
//! DynRPC compiles machine-readable interface descriptions ("IR documents")
//! into runtime protocol bindings and drives per-channel request dispatch.
//! Everything above this crate — the compiler, the codec, the client and
//! server roles — exchanges data through the types defined here:
//!
//! - **Value Layer**: [`Value`], the dynamic representation of every
//!   encodable protocol type (structs, tables, unions, enums, bits,
//!   handles, endpoints)
//! - **Message Layer**: [`TransactionHeader`] and [`MessageBuf`], the fixed
//!   transaction framing carried on every channel message
//! - **Codec Boundary**: [`WireCodec`], the seam behind which payload
//!   bytes are produced and consumed
//! - **Transport Layer**: [`Channel`], in-process datagram channel pairs
//!   with explicit readiness notification
//!
//! # Wire Format
//!
//! Every channel message is `[16-byte transaction header] + [payload]`,
//! with transferred handles carried out-of-band in the message buffer.
//! The payload encoding itself is owned by the codec implementation.

pub mod codec;
pub mod error;
pub mod message;
pub mod transport;
pub mod value;

pub use codec::WireCodec;
pub use error::{DynrpcError, Result};
pub use message::{MessageBuf, TransactionHeader, EPITAPH_ORDINAL};
pub use transport::{Channel, ChannelRead};
pub use value::{FrameworkError, RawHandle, Value};
