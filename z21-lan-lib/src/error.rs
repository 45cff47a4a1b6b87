use thiserror::Error;

/// Errors that can occur while talking to a Z21 station
#[derive(Error, Debug)]
pub enum Z21Error {
    #[error("failed to resolve station address: {0}")]
    AddressResolution(String),

    #[error("failed to open UDP socket: {0}")]
    SocketOpen(#[source] std::io::Error),

    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("not connected to a station")]
    NotConnected,

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Wire-level errors confined to a single DataSet or LAN_X envelope.
///
/// The receive loop logs these and drops the offending frame; they never
/// terminate the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("DataSet length field {0} is shorter than the 4-byte header")]
    BadLength(u16),

    #[error("truncated DataSet: declared {declared} bytes, {available} available")]
    TruncatedDataSet { declared: usize, available: usize },

    #[error("truncated {what}: need at least {need} bytes, got {got}")]
    Truncated {
        what: &'static str,
        need: usize,
        got: usize,
    },

    #[error("unexpected payload length {len} for {what}")]
    UnexpectedLength { what: &'static str, len: usize },

    #[error("bad LAN_X checksum: computed {computed:#04x}, found {found:#04x}")]
    BadChecksum { computed: u8, found: u8 },
}

pub type Result<T> = std::result::Result<T, Z21Error>;
