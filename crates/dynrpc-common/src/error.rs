use thiserror::Error;

#[derive(Error, Debug)]
pub enum DynrpcError {
    #[error("Library not found: no IR document for '{library}' under '{path}'")]
    LibraryNotFound { library: String, path: String },

    #[error("IR search path not configured: {0} is not set")]
    IrPathNotConfigured(&'static str),

    #[error("Failed to parse IR document '{path}': {source}")]
    IrParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unresolved kind: '{0}' is not declared in any loaded library")]
    UnresolvedKind(String),

    #[error("Unsupported {what} kind '{kind}' in library '{library}'")]
    UnsupportedKind {
        what: &'static str,
        kind: String,
        library: String,
    },

    #[error("Duplicate ordinal {ordinal} in protocol '{protocol}'")]
    DuplicateOrdinal { protocol: String, ordinal: u64 },

    #[error("Unknown declaration '{0}'")]
    UnknownDeclaration(String),

    #[error("Unknown method '{method}' on protocol '{protocol}'")]
    UnknownMethod { protocol: String, method: String },

    #[error("Unknown ordinal {ordinal} for protocol '{protocol}'")]
    UnknownOrdinal { protocol: String, ordinal: u64 },

    #[error("Invalid arguments for '{ty}': {detail}")]
    InvalidArguments { ty: String, detail: String },

    #[error("Method '{0}' not implemented")]
    NotImplemented(String),

    #[error("Contract violation in method '{method}': {detail}")]
    ContractViolation { method: String, detail: String },

    #[error("{ty} error {error}")]
    ResultError { ty: String, error: String },

    #[error("{ty} framework error {error}")]
    ResultFrameworkError { ty: String, error: String },

    #[error("Failed to unwrap {0} with no error or response")]
    NoErrorOrResponse(String),

    #[error("Failed to encode '{ty}': {detail}")]
    Encode { ty: String, detail: String },

    #[error("Failed to decode '{ty}': {detail}")]
    Decode { ty: String, detail: String },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Channel closed by peer")]
    PeerClosed,

    #[error("Channel closed with epitaph status {0}")]
    Epitaph(i32),

    #[error("Handler requested stop")]
    Stopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DynrpcError>;
