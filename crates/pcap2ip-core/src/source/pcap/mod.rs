//! PCAP/PCAPNG source implementation.
//!
//! This module provides a `PacketSource` backed by any byte stream holding a
//! PCAP or PCAPNG capture. The format is detected from the magic bytes
//! without seeking, so pipes and standard input work. Records are read ahead
//! in small batches and an optional filter is applied before buffering.

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use parser::CaptureSource;
