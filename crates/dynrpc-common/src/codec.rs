//! Wire codec boundary.
//!
//! Payload bytes are produced and consumed exclusively behind this trait.
//! The dispatch engine and the client role hand the codec a qualified type
//! name and the raw payload; how the bytes are laid out is entirely the
//! codec's business. The reference implementation is the JSON codec in
//! `dynrpc-codec`; a native binary codec slots in behind the same trait.

use crate::error::Result;
use crate::value::{RawHandle, Value};

pub trait WireCodec: Send + Sync {
    /// Decodes a payload into a structured value.
    ///
    /// # Arguments
    ///
    /// * `type_name` - qualified name of the payload type, as spelled in
    ///   the IR (the raw identifier)
    /// * `bytes` - the encoded payload, header already stripped
    /// * `handles` - handles transferred alongside the payload
    fn decode(&self, type_name: &str, bytes: &[u8], handles: &[RawHandle]) -> Result<Value>;

    /// Encodes a value into payload bytes plus the handles it transfers.
    ///
    /// # Arguments
    ///
    /// * `library` - name of the library declaring the payload type
    /// * `type_name` - qualified name of the payload type
    /// * `value` - the compiled value to encode
    fn encode(
        &self,
        library: &str,
        type_name: &str,
        value: &Value,
    ) -> Result<(Vec<u8>, Vec<RawHandle>)>;
}
