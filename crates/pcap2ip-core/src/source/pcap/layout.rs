/// Initial buffer capacity of the streaming pcap-parser readers.
pub const PCAP_READER_BUFFER_SIZE: usize = 64 * 1024;

/// Number of records pulled per read-ahead batch.
pub const READ_AHEAD_BATCH: usize = 100;

pub const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

/// `if_tsresol` flag for base-2 resolutions.
pub const TSRESOL_BINARY: u8 = 0x80;

pub const MICROS_PER_SEC: u64 = 1_000_000;
pub const NANOS_PER_SEC: u64 = 1_000_000_000;
