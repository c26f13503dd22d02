//! pcap2ip core library: rewrite packet captures into raw-IP captures.
//!
//! This crate implements the streaming pipeline used by the CLI: capture
//! sources feed a chronological merge, each packet is decoded lazily down to
//! its IP/TCP/UDP layers, checksums are verified, and surviving IPv4
//! datagrams are written to a legacy pcap stream with link type RAW.
//! Decoding is byte-oriented and side-effect free; all I/O is isolated in the
//! `source` and `writer` modules.
//!
//! Invariants:
//! - Output order is non-decreasing in time when every input is.
//! - Per-packet failures (undecodable, not TCP/UDP, bad checksum) drop the
//!   packet and never abort a run.
//! - A checksum is only reported wrong when every byte it covers was captured.
//!
//! # Examples
//! ```no_run
//! use std::fs::File;
//! use std::path::Path;
//!
//! use pcap2ip_core::{CaptureSource, MergedSource, Pipeline, PipelineConfig};
//!
//! let traffic = CaptureSource::open(Path::new("capture.pcapng"), None)?;
//! let mut source = MergedSource::with_dns_capture(traffic, Path::new("dns.pcap"))?;
//! let mut pipeline = Pipeline::new(PipelineConfig::default());
//! pipeline.run(&mut source, File::create("out.pcap")?)?;
//! println!("accepted {} packets", pipeline.stats().accepted);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod filter;
pub mod packet;
mod pipeline;
pub mod source;
mod timestamp;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_utils;

pub use filter::{FilterError, PacketFilter};
pub use packet::PacketView;
pub use packet::checksum::{ChecksumScope, ChecksumStatus, Unverifiable};
pub use packet::error::PacketError;
pub use packet::flow::FlowKey;
pub use packet::layers::{Layer, LayerKind, LayerStack};
pub use pipeline::{
    DropCounts, DropReason, Pipeline, PipelineConfig, PipelineError, PipelineStats, Verdict,
    classify, rewrite_stream,
};
pub use source::{CaptureRecord, CaptureSource, MergedSource, PacketSource, SourceError};
pub use timestamp::Timestamp;
pub use writer::{CaptureWriter, WriterError};

/// Re-exported so callers can name link types without depending on the parser crate.
pub use pcap_parser::Linktype;
