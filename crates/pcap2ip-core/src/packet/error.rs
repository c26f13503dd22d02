use thiserror::Error;

use super::checksum::ChecksumScope;
use super::layers::LayerKind;

/// Per-packet failures. None of these abort a run; the pipeline turns them
/// into drops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error("unsupported link type {0}")]
    UnsupportedLinktype(i32),
    #[error("no {0} layer in packet")]
    LayerNotFound(LayerKind),
    #[error("packet is neither TCP nor UDP (IP protocol {0})")]
    NotTransport(u8),
    #[error("{0} checksum mismatch")]
    ChecksumMismatch(ChecksumScope),
}

impl PacketError {
    pub(crate) fn malformed(err: impl std::fmt::Display) -> Self {
        PacketError::Malformed(err.to_string())
    }
}
