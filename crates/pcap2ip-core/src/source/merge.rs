use std::mem;
use std::path::Path;

use log::debug;

use crate::filter::PacketFilter;
use crate::packet::PacketView;
use crate::packet::dns::DNS_FILTER;
use crate::source::{CaptureSource, PacketSource, SourceError};

/// Lookahead slot for the DNS side of the merge.
#[derive(Debug)]
enum DnsSlot {
    Empty,
    Ready(PacketView),
    /// DNS input exhausted (or never configured). Sorts after every packet.
    Cork,
}

/// Chronological merge of a traffic source with an optional DNS source.
///
/// When both inputs are individually non-decreasing in time, the output is
/// too. On equal timestamps the DNS packet goes first. The traffic source
/// drives termination: once it is exhausted the merge ends, even if DNS
/// packets remain.
pub struct MergedSource {
    traffic: CaptureSource,
    dns: Option<CaptureSource>,
    dns_slot: DnsSlot,
    deferred: Option<PacketView>,
    pending: Option<PacketView>,
}

impl MergedSource {
    pub fn new(traffic: CaptureSource, dns: Option<CaptureSource>) -> Self {
        Self {
            traffic,
            dns,
            dns_slot: DnsSlot::Empty,
            deferred: None,
            pending: None,
        }
    }

    /// Pass-through over `traffic` with no DNS input.
    pub fn traffic_only(traffic: CaptureSource) -> Self {
        Self::new(traffic, None)
    }

    /// Merge `traffic` with the DNS packets (UDP port 53) of the capture at
    /// `dns_path`.
    pub fn with_dns_capture(traffic: CaptureSource, dns_path: &Path) -> Result<Self, SourceError> {
        let filter = PacketFilter::parse(DNS_FILTER)?;
        let dns = CaptureSource::open(dns_path, Some(filter))?;
        Ok(Self::new(traffic, Some(dns)))
    }

    /// Next packet in timestamp order, or `None` once traffic is exhausted.
    pub fn next_packet(&mut self) -> Result<Option<PacketView>, SourceError> {
        if let Some(packet) = self.pending.take() {
            return Ok(Some(packet));
        }
        self.ensure_dns_slot()?;

        let traffic = match self.deferred.take() {
            Some(packet) => packet,
            None => match self.traffic.next_packet()? {
                Some(record) => PacketView::new(record),
                None => {
                    self.finish();
                    return Ok(None);
                }
            },
        };

        let dns_first = match &self.dns_slot {
            DnsSlot::Ready(dns) => traffic.timestamp() >= dns.timestamp(),
            DnsSlot::Empty | DnsSlot::Cork => false,
        };
        if !dns_first {
            return Ok(Some(traffic));
        }
        self.deferred = Some(traffic);
        match mem::replace(&mut self.dns_slot, DnsSlot::Empty) {
            DnsSlot::Ready(dns) => Ok(Some(dns)),
            other => {
                self.dns_slot = other;
                Ok(self.deferred.take())
            }
        }
    }

    /// The packet the next call to `next_packet` will return.
    pub fn peek(&mut self) -> Result<Option<&PacketView>, SourceError> {
        if self.pending.is_none() {
            self.pending = self.next_packet()?;
        }
        Ok(self.pending.as_ref())
    }

    fn ensure_dns_slot(&mut self) -> Result<(), SourceError> {
        if !matches!(self.dns_slot, DnsSlot::Empty) {
            return Ok(());
        }
        let next = match self.dns.as_mut() {
            Some(source) => source.next_packet()?,
            None => None,
        };
        self.dns_slot = match next {
            Some(record) => DnsSlot::Ready(PacketView::new(record)),
            None => {
                if let Some(mut source) = self.dns.take() {
                    source.close();
                    debug!("DNS source exhausted, merge continues with traffic only");
                }
                DnsSlot::Cork
            }
        };
        Ok(())
    }

    fn finish(&mut self) {
        if let DnsSlot::Ready(_) = self.dns_slot {
            debug!("traffic exhausted; discarding remaining DNS packets");
        }
        self.dns_slot = DnsSlot::Cork;
        if let Some(mut source) = self.dns.take() {
            source.close();
        }
        self.traffic.close();
    }
}
