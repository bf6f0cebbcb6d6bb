//! Transaction message framing.
//!
//! Every channel message starts with a fixed 16-byte transaction header:
//!
//! ```text
//! [txid: u32 LE] [reserved: 3 bytes] [magic: u8] [ordinal: u64 LE]
//! ```
//!
//! The transaction id pairs a two-way request with its response; one-way
//! messages and events carry txid 0. The ordinal identifies the method
//! within its protocol. Whatever follows the header is an opaque payload
//! owned by the wire codec; transferred handles ride alongside the bytes
//! in the [`MessageBuf`], never inside them.

use crate::error::{DynrpcError, Result};
use crate::value::RawHandle;

/// Reserved ordinal for the terminal epitaph message a closing peer may
/// send to report its closing status.
pub const EPITAPH_ORDINAL: u64 = u64::MAX;

/// Header magic identifying the framing revision.
pub const WIRE_MAGIC: u8 = 1;

/// Encoded header length in bytes.
pub const HEADER_LEN: usize = 16;

/// The fixed per-message transaction header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHeader {
    pub txid: u32,
    pub ordinal: u64,
}

impl TransactionHeader {
    pub fn new(txid: u32, ordinal: u64) -> Self {
        Self { txid, ordinal }
    }

    pub fn is_epitaph(&self) -> bool {
        self.ordinal == EPITAPH_ORDINAL
    }

    /// Encodes the header into its fixed wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.txid.to_le_bytes());
        bytes[7] = WIRE_MAGIC;
        bytes[8..16].copy_from_slice(&self.ordinal.to_le_bytes());
        bytes
    }

    /// Splits a message into its header and payload bytes.
    ///
    /// # Errors
    ///
    /// Fails if the message is shorter than a header or carries an
    /// unrecognized magic byte.
    pub fn decode(bytes: &[u8]) -> Result<(Self, &[u8])> {
        if bytes.len() < HEADER_LEN {
            return Err(DynrpcError::MalformedMessage(format!(
                "message of {} bytes is shorter than the {} byte header",
                bytes.len(),
                HEADER_LEN
            )));
        }
        if bytes[7] != WIRE_MAGIC {
            return Err(DynrpcError::MalformedMessage(format!(
                "unrecognized wire magic {:#x}",
                bytes[7]
            )));
        }
        let txid = u32::from_le_bytes(bytes[0..4].try_into().expect("header slice"));
        let ordinal = u64::from_le_bytes(bytes[8..16].try_into().expect("header slice"));
        Ok((Self { txid, ordinal }, &bytes[HEADER_LEN..]))
    }
}

/// One channel message: header + payload bytes plus any transferred handles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageBuf {
    pub bytes: Vec<u8>,
    pub handles: Vec<RawHandle>,
}

impl MessageBuf {
    /// Assembles a message from a header, payload bytes and handles.
    pub fn new(header: TransactionHeader, payload: &[u8], handles: Vec<RawHandle>) -> Self {
        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&header.encode());
        bytes.extend_from_slice(payload);
        Self { bytes, handles }
    }
}

/// Builds the terminal epitaph message carrying the peer's closing status.
pub fn epitaph_message(status: i32) -> MessageBuf {
    let header = TransactionHeader::new(0, EPITAPH_ORDINAL);
    MessageBuf::new(header, &status.to_le_bytes(), Vec::new())
}

/// Extracts the status from an epitaph payload.
pub fn epitaph_status(payload: &[u8]) -> Result<i32> {
    let bytes: [u8; 4] = payload.try_into().map_err(|_| {
        DynrpcError::MalformedMessage(format!(
            "epitaph payload of {} bytes, expected 4",
            payload.len()
        ))
    })?;
    Ok(i32::from_le_bytes(bytes))
}
