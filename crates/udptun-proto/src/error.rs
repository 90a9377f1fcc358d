use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("bad magic")]
    BadMagic,
    #[error("unsupported version {0}")]
    UnsupportedVersion(u8),
    #[error("payload too large: {0}")]
    PayloadTooLarge(usize),
    #[error("destination port must be 1..=65535 for data frames")]
    InvalidDstPort,
    #[error("bad trailer: tag length {0}")]
    BadTrailer(u8),
    #[error("authentication failed")]
    BadAuth,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtoError {
    /// Transport-level failures come from the underlying stream; everything
    /// else is a protocol validation failure. Both are unrecoverable for the
    /// connection they occur on.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProtoError::Io(_))
    }
}
