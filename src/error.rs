// EggCam — Error Types
//
// One error per pipeline failure kind. Every one of them is recoverable: the
// wake cycle logs it, degrades and still reaches deep sleep.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("capture failed: {0}")]
    Capture(String),

    #[error("JPEG decode failed: {0}")]
    Decode(String),

    #[error("inference failed (code {0})")]
    Inference(i32),

    #[error("JPEG encode failed: {0}")]
    Encode(String),

    #[error("transmit aborted at byte {offset} of {total}: {source}")]
    Transmit {
        offset: usize,
        total: usize,
        #[source]
        source: LinkError,
    },

    #[error("cannot allocate {0} bytes")]
    Alloc(usize),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Failure of a single datagram submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("peer did not acknowledge")]
    NoAck,

    #[error("datagram of {0} bytes exceeds the link MTU")]
    TooLarge(usize),

    #[error("driver error {0}")]
    Driver(i32),

    #[error("link closed")]
    Closed,

    #[error("cannot encode datagram: {0}")]
    Encode(#[from] ProtocolError),
}

/// Malformed or unknown inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("datagram truncated ({0} bytes)")]
    Truncated(usize),

    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),

    #[error("encoded message does not fit one datagram")]
    Overflow,
}
