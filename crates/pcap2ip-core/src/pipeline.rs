use std::collections::HashSet;
use std::fmt;
use std::io::{Read, Write};
use std::path::PathBuf;

use log::{info, trace, warn};
use pcap_parser::Linktype;
use serde::Serialize;
use thiserror::Error;

use crate::filter::PacketFilter;
use crate::packet::PacketView;
use crate::packet::checksum::ChecksumStatus;
use crate::packet::flow::FlowKey;
use crate::source::{CaptureSource, MergedSource, SourceError};
use crate::timestamp::Timestamp;
use crate::writer::{CaptureWriter, WriterError, layout::DEFAULT_SNAPLEN};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),
    #[error("writer error: {0}")]
    Writer(#[from] WriterError),
}

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Snapshot length written to the output header.
    pub snaplen: u32,
    /// Link type of the output capture.
    pub linktype: Linktype,
    /// Verify TCP/UDP checksums in addition to the IPv4 header checksum.
    pub verify_transport: bool,
    /// Secondary capture whose DNS packets are merged into the output.
    pub dns_capture: Option<PathBuf>,
    /// Filter expression applied to the primary input.
    pub traffic_filter: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            snaplen: DEFAULT_SNAPLEN,
            linktype: Linktype::RAW,
            verify_transport: true,
            dns_capture: None,
            traffic_filter: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No IPv4 layer (other link payloads, IPv6, undecodable records).
    NotIp,
    /// IP protocol is neither TCP nor UDP.
    NotTransport,
    BadChecksum,
    /// The output format cannot represent the record (timestamp past 2106,
    /// datagram over the snapshot length).
    Unwritable,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DropReason::NotIp => "not IPv4",
            DropReason::NotTransport => "not TCP/UDP",
            DropReason::BadChecksum => "bad checksum",
            DropReason::Unwritable => "not representable in the output",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// `unverified` is set when the transport checksum could not be checked.
    Accept { unverified: bool },
    Drop(DropReason),
}

/// Decide whether a packet is written to the output.
pub fn classify(packet: &PacketView, verify_transport: bool) -> Verdict {
    if let Err(err) = packet.ip() {
        trace!("{}: {err}", packet.timestamp());
        return Verdict::Drop(DropReason::NotIp);
    }
    if !(packet.is_tcp() || packet.is_udp()) {
        return Verdict::Drop(DropReason::NotTransport);
    }
    match packet.verify_checksums(verify_transport) {
        Ok(ChecksumStatus::Unverifiable(why)) => {
            trace!("{}: transport checksum not verified ({why:?})", packet.timestamp());
            Verdict::Accept { unverified: true }
        }
        Ok(_) => Verdict::Accept { unverified: false },
        Err(err) => {
            trace!("{}: {err}", packet.timestamp());
            Verdict::Drop(DropReason::BadChecksum)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub not_ip: u64,
    pub not_transport: u64,
    pub bad_checksum: u64,
    pub unwritable: u64,
}

/// Counters reported after a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub accepted: u64,
    pub dropped: u64,
    pub drops: DropCounts,
    /// Accepted packets whose transport checksum could not be verified.
    pub unverified: u64,
    /// Accepted packets classified as DNS.
    pub dns_packets: u64,
    /// Distinct bidirectional flows among accepted packets.
    pub flows: u64,
    /// RFC 3339 time of the first accepted packet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_start: Option<String>,
    /// RFC 3339 time of the last accepted packet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_end: Option<String>,
}

/// Drives a merged source into a capture writer, keeping accept/drop counts.
#[derive(Debug, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    stats: PipelineStats,
    flows: HashSet<FlowKey>,
    first_ts: Option<Timestamp>,
    last_ts: Option<Timestamp>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Rewrite every packet of `source` into `sink`.
    ///
    /// The writer is closed on every path. When an earlier step failed, a
    /// failure to close is logged and the original error is returned.
    pub fn run<W: Write>(
        &mut self,
        source: &mut MergedSource,
        sink: W,
    ) -> Result<W, PipelineError> {
        let mut writer = CaptureWriter::open(sink, self.config.snaplen, self.config.linktype)?;
        match self.drain(source, &mut writer) {
            Ok(()) => {
                let sink = writer.close()?;
                info!(
                    "rewrite finished: {} accepted, {} dropped ({} not IPv4, {} not TCP/UDP, {} bad checksum, {} unwritable)",
                    self.stats.accepted,
                    self.stats.dropped,
                    self.stats.drops.not_ip,
                    self.stats.drops.not_transport,
                    self.stats.drops.bad_checksum,
                    self.stats.drops.unwritable
                );
                Ok(sink)
            }
            Err(err) => {
                if let Err(close_err) = writer.close() {
                    warn!("failed to close output after error: {close_err}");
                }
                Err(err)
            }
        }
    }

    fn drain<W: Write>(
        &mut self,
        source: &mut MergedSource,
        writer: &mut CaptureWriter<W>,
    ) -> Result<(), PipelineError> {
        while let Some(packet) = source.next_packet()? {
            self.process(&packet, writer)?;
        }
        Ok(())
    }

    fn process<W: Write>(
        &mut self,
        packet: &PacketView,
        writer: &mut CaptureWriter<W>,
    ) -> Result<(), WriterError> {
        let verdict = classify(packet, self.config.verify_transport);
        let (ip_bytes, unverified) = match (verdict, packet.ip_bytes()) {
            (Verdict::Accept { unverified }, Ok(bytes)) => (bytes, unverified),
            (Verdict::Drop(reason), _) => {
                self.record_drop(reason);
                return Ok(());
            }
            (Verdict::Accept { .. }, Err(_)) => {
                self.record_drop(DropReason::NotIp);
                return Ok(());
            }
        };

        match writer.write_record(ip_bytes, packet.record().orig_len, packet.timestamp()) {
            Ok(()) => {}
            Err(err @ (WriterError::TimestampOutOfRange(_) | WriterError::RecordTooLarge { .. })) => {
                warn!("{}: dropping packet: {err}", packet.timestamp());
                self.record_drop(DropReason::Unwritable);
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        self.stats.accepted += 1;
        if unverified {
            self.stats.unverified += 1;
        }
        if packet.is_dns() {
            self.stats.dns_packets += 1;
        }
        if let Ok(key) = packet.flow_key() {
            if self.flows.insert(key.canonical()) {
                self.stats.flows += 1;
            }
        }
        let ts = packet.timestamp();
        if self.first_ts.is_none() {
            self.first_ts = Some(ts);
            self.stats.time_start = ts.to_rfc3339();
        }
        if self.last_ts.is_none_or(|last| ts >= last) {
            self.last_ts = Some(ts);
            self.stats.time_end = ts.to_rfc3339();
        }
        Ok(())
    }

    fn record_drop(&mut self, reason: DropReason) {
        self.stats.dropped += 1;
        match reason {
            DropReason::NotIp => self.stats.drops.not_ip += 1,
            DropReason::NotTransport => self.stats.drops.not_transport += 1,
            DropReason::BadChecksum => self.stats.drops.bad_checksum += 1,
            DropReason::Unwritable => self.stats.drops.unwritable += 1,
        }
    }
}

/// Rewrite the capture read from `input` into `output` according to
/// `config`, merging the DNS capture when one is configured.
///
/// # Examples
/// ```no_run
/// use std::io;
///
/// use pcap2ip_core::{PipelineConfig, rewrite_stream};
///
/// let (_, stats) = rewrite_stream(io::stdin(), io::stdout(), &PipelineConfig::default())?;
/// eprintln!("accepted {} packets", stats.accepted);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn rewrite_stream<R: Read + 'static, W: Write>(
    input: R,
    output: W,
    config: &PipelineConfig,
) -> Result<(W, PipelineStats), PipelineError> {
    let filter = config
        .traffic_filter
        .as_deref()
        .map(PacketFilter::parse)
        .transpose()
        .map_err(SourceError::from)?;
    let traffic = CaptureSource::from_reader("input", input, filter)?;
    let mut source = match &config.dns_capture {
        Some(path) => MergedSource::with_dns_capture(traffic, path)?,
        None => MergedSource::traffic_only(traffic),
    };
    let mut pipeline = Pipeline::new(config.clone());
    let output = pipeline.run(&mut source, output)?;
    Ok((output, pipeline.stats.clone()))
}
