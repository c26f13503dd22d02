//! Capture output.
//!
//! `CaptureWriter` emits a legacy pcap stream: one global header followed by
//! a record header and the raw bytes for each packet. All integers are
//! little-endian and timestamps have microsecond resolution.

pub mod layout;

use std::io::{self, BufWriter, Write};

use log::debug;
use pcap_parser::Linktype;
use thiserror::Error;

use crate::timestamp::Timestamp;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("timestamp {0} does not fit a 32-bit seconds field")]
    TimestampOutOfRange(Timestamp),
    #[error("record of {len} bytes exceeds snapshot length {snaplen}")]
    RecordTooLarge { len: usize, snaplen: u32 },
}

/// Buffered legacy pcap writer.
///
/// The global header is written by [`CaptureWriter::open`]. Dropping the
/// writer flushes on a best-effort basis; call [`CaptureWriter::close`] to
/// observe flush errors and get the sink back.
#[derive(Debug)]
pub struct CaptureWriter<W: Write> {
    sink: BufWriter<W>,
    snaplen: u32,
    linktype: Linktype,
    records: u64,
}

impl<W: Write> CaptureWriter<W> {
    pub fn open(sink: W, snaplen: u32, linktype: Linktype) -> Result<Self, WriterError> {
        let mut sink = BufWriter::new(sink);
        let mut header = [0u8; layout::GLOBAL_HEADER_LEN];
        header[0..4].copy_from_slice(&layout::PCAP_MAGIC_MICROS.to_le_bytes());
        header[4..6].copy_from_slice(&layout::VERSION_MAJOR.to_le_bytes());
        header[6..8].copy_from_slice(&layout::VERSION_MINOR.to_le_bytes());
        // thiszone and sigfigs stay zero.
        header[16..20].copy_from_slice(&snaplen.to_le_bytes());
        header[20..24].copy_from_slice(&(linktype.0 as u32).to_le_bytes());
        sink.write_all(&header)?;
        debug!("capture writer opened (snaplen {snaplen}, linktype {})", linktype.0);
        Ok(Self {
            sink,
            snaplen,
            linktype,
            records: 0,
        })
    }

    /// Append one record. `orig_len` is copied into the header unchanged.
    pub fn write_record(
        &mut self,
        data: &[u8],
        orig_len: u32,
        timestamp: Timestamp,
    ) -> Result<(), WriterError> {
        let captured_len = u32::try_from(data.len())
            .ok()
            .filter(|len| *len <= self.snaplen)
            .ok_or(WriterError::RecordTooLarge {
                len: data.len(),
                snaplen: self.snaplen,
            })?;
        let (secs, micros) = timestamp.to_micros_rounded();
        let secs = u32::try_from(secs).map_err(|_| WriterError::TimestampOutOfRange(timestamp))?;

        let mut header = [0u8; layout::RECORD_HEADER_LEN];
        header[0..4].copy_from_slice(&secs.to_le_bytes());
        header[4..8].copy_from_slice(&micros.to_le_bytes());
        header[8..12].copy_from_slice(&captured_len.to_le_bytes());
        header[12..16].copy_from_slice(&orig_len.to_le_bytes());
        self.sink.write_all(&header)?;
        self.sink.write_all(data)?;
        self.records += 1;
        Ok(())
    }

    pub fn linktype(&self) -> Linktype {
        self.linktype
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Flush buffered output and return the sink.
    pub fn close(self) -> Result<W, WriterError> {
        let records = self.records;
        let sink = self
            .sink
            .into_inner()
            .map_err(|err| WriterError::Io(err.into_error()))?;
        debug!("capture writer closed after {records} records");
        Ok(sink)
    }
}
