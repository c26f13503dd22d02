use std::io::{self, Chain, Cursor, Read};

use super::error::PcapSourceError;
use super::layout;
use crate::timestamp::Timestamp;
use pcap_parser::{InterfaceDescriptionBlock, Linktype};

/// Read the leading block of a capture and hand back a reader that replays it.
///
/// Works on non-seekable streams: the consumed prefix is chained in front of
/// the remaining input instead of rewinding. Up to `head_len` bytes are
/// buffered so a parser that fills its buffer with a single `read` sees the
/// whole file header, however short the reads of the underlying stream are.
///
/// # Examples
/// This helper is part of an internal module, so the example is marked as
/// text example.
/// ```text
/// use pcap2ip_core::source::pcap::reader::read_magic;
/// use std::io::{Cursor, Read};
///
/// let (magic, mut replay) = read_magic(Cursor::new(vec![0x0a, 0x0d, 0x0d, 0x0a, 0x01]), 64).unwrap();
/// assert_eq!(magic, [0x0a, 0x0d, 0x0d, 0x0a]);
/// let mut all = Vec::new();
/// replay.read_to_end(&mut all).unwrap();
/// assert_eq!(all.len(), 5);
/// ```
///
/// # Errors
/// Returns `PcapSourceError::Io` when fewer than four bytes can be read.
pub fn read_magic<R: Read>(
    mut reader: R,
    head_len: usize,
) -> Result<([u8; 4], Chain<Cursor<Vec<u8>>, R>), PcapSourceError> {
    let mut head = Vec::with_capacity(head_len);
    (&mut reader).take(head_len as u64).read_to_end(&mut head)?;
    let magic: [u8; 4] = head
        .get(..4)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "capture shorter than its magic"))?;
    Ok((magic, Cursor::new(head).chain(reader)))
}

/// Check whether the magic bytes match PCAPNG.
pub fn is_pcapng_magic(magic: &[u8; 4]) -> bool {
    magic == &layout::PCAPNG_MAGIC
}

/// Per-interface state from a PCAPNG interface description block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NgInterface {
    pub linktype: Linktype,
    /// Timestamp units per second.
    pub resolution: u64,
    /// Seconds added to every timestamp.
    pub offset: i64,
}

impl NgInterface {
    pub fn from_block(block: &InterfaceDescriptionBlock) -> Self {
        Self {
            linktype: block.linktype,
            resolution: pcapng_resolution(block.if_tsresol),
            offset: block.if_tsoffset,
        }
    }

    pub fn timestamp(&self, ts_high: u32, ts_low: u32) -> Timestamp {
        pcapng_ts(ts_high, ts_low, self.resolution, self.offset)
    }
}

impl Default for NgInterface {
    fn default() -> Self {
        Self {
            linktype: Linktype::ETHERNET,
            resolution: layout::MICROS_PER_SEC,
            offset: 0,
        }
    }
}

/// Resolve the interface for a given interface id, defaulting to Ethernet
/// with microsecond timestamps.
///
/// # Examples
/// ```text
/// use pcap2ip_core::source::pcap::reader::{interface_for, NgInterface};
/// use pcap_parser::Linktype;
///
/// let raw = NgInterface { linktype: Linktype::RAW, ..NgInterface::default() };
/// assert_eq!(interface_for(&[raw], 0).linktype, Linktype::RAW);
/// assert_eq!(interface_for(&[raw], 1).linktype, Linktype::ETHERNET);
/// ```
pub fn interface_for(interfaces: &[NgInterface], if_id: u32) -> NgInterface {
    interfaces
        .get(if_id as usize)
        .copied()
        .unwrap_or_default()
}

/// Convert a legacy pcap record timestamp.
///
/// `fraction` is in nanoseconds for nanosecond-precision files and in
/// microseconds otherwise.
pub fn legacy_ts(ts_sec: u32, fraction: u32, nanosecond: bool) -> Timestamp {
    if nanosecond {
        Timestamp::new(u64::from(ts_sec), fraction)
    } else {
        Timestamp::from_micros(u64::from(ts_sec), fraction)
    }
}

/// Units per second of a PCAPNG interface, from its `if_tsresol` option.
///
/// The high bit selects a power of two instead of a power of ten. Falls back
/// to microseconds when the unit does not fit 64 bits.
pub fn pcapng_resolution(if_tsresol: u8) -> u64 {
    let exponent = u32::from(if_tsresol & !layout::TSRESOL_BINARY);
    let units = if if_tsresol & layout::TSRESOL_BINARY == 0 {
        10u64.checked_pow(exponent)
    } else {
        1u64.checked_shl(exponent)
    };
    units.unwrap_or(layout::MICROS_PER_SEC)
}

/// Convert a PCAPNG high/low timestamp counted in `resolution` units per
/// second since `offset` seconds.
pub fn pcapng_ts(ts_high: u32, ts_low: u32, resolution: u64, offset: i64) -> Timestamp {
    let ts = (u64::from(ts_high) << 32) | u64::from(ts_low);
    let resolution = resolution.max(1);
    let secs = (ts / resolution).saturating_add_signed(offset);
    let fraction = u128::from(ts % resolution);
    let nanos = fraction * u128::from(layout::NANOS_PER_SEC) / u128::from(resolution);
    Timestamp::new(secs, nanos as u32)
}
