//! Capture sources.
//!
//! `CaptureSource` streams raw records out of one pcap/pcapng stream, and
//! `MergedSource` interleaves a traffic source with an optional DNS-only
//! source in timestamp order. All capture file I/O on the read side lives
//! here; decoding happens later in `PacketView`.

mod merge;
pub(crate) mod pcap;

pub use merge::MergedSource;
pub use pcap::CaptureSource;

use pcap_parser::Linktype;
use thiserror::Error;

use crate::filter::FilterError;
use crate::timestamp::Timestamp;

/// One captured packet as stored in the capture file.
///
/// The record carries the link type of the stream it came from so decoding
/// never depends on ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub timestamp: Timestamp,
    pub linktype: Linktype,
    /// Length of the packet on the wire, as recorded by the capturing tool.
    pub orig_len: u32,
    pub data: Vec<u8>,
}

impl CaptureRecord {
    /// Number of bytes actually present in the capture.
    pub fn captured_len(&self) -> usize {
        self.data.len()
    }
}

/// Sequential source of capture records.
///
/// `Ok(None)` marks the end of the stream; it is not an error.
pub trait PacketSource {
    fn next_packet(&mut self) -> Result<Option<CaptureRecord>, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PCAP parse error: {0}")]
    Pcap(String),
    #[error("invalid filter: {0}")]
    Filter(#[from] FilterError),
}

impl From<pcap::error::PcapSourceError> for SourceError {
    fn from(value: pcap::error::PcapSourceError) -> Self {
        match value {
            pcap::error::PcapSourceError::Io(err) => SourceError::Io(err),
            pcap::error::PcapSourceError::Pcap { context, message } => {
                SourceError::Pcap(format!("{context}: {message}"))
            }
        }
    }
}
