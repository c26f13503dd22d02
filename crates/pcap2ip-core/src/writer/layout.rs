//! Legacy pcap on-disk layout, as written (little-endian, microsecond magic).

pub const PCAP_MAGIC_MICROS: u32 = 0xa1b2_c3d4;
pub const VERSION_MAJOR: u16 = 2;
pub const VERSION_MINOR: u16 = 4;

pub const GLOBAL_HEADER_LEN: usize = 24;
pub const RECORD_HEADER_LEN: usize = 16;

/// Default snapshot length: the largest IPv4 datagram.
pub const DEFAULT_SNAPLEN: u32 = 65_535;
