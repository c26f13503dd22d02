//! Lazy packet decoding.
//!
//! `PacketView` wraps one `CaptureRecord` and decodes it on first use into a
//! `LayerStack` (link layer first, transport last). Every derived value is
//! memoized on first computation and never recomputed, including decode
//! failures. Lookups of different layer kinds are independent: a missing
//! TCP layer does not hide the IPv4 layer below it.
//!
//! Byte offsets and protocol constants live in `layout`; checksum rules in
//! `checksum`; flow identity in `flow`.

pub mod checksum;
pub mod dns;
pub mod error;
pub mod flow;
pub mod layers;
pub mod layout;

use std::cell::OnceCell;
use std::net::{IpAddr, Ipv4Addr};

use etherparse::{Ipv4HeaderSlice, TcpHeaderSlice, UdpHeaderSlice};
use hickory_proto::op::Message;
use log::trace;
use pcap_parser::Linktype;

use crate::source::CaptureRecord;
use crate::timestamp::Timestamp;

use checksum::ChecksumStatus;
use error::PacketError;
use flow::FlowKey;
use layers::{Layer, LayerKind, LayerStack};

/// Decoded view over a single capture record.
#[derive(Debug, Clone)]
pub struct PacketView {
    record: CaptureRecord,
    layers: OnceCell<Result<LayerStack, PacketError>>,
    src_addr: OnceCell<String>,
    dst_addr: OnceCell<String>,
    flow_key: OnceCell<FlowKey>,
    is_dns: OnceCell<bool>,
    dns: OnceCell<Message>,
}

impl PacketView {
    pub fn new(record: CaptureRecord) -> Self {
        Self {
            record,
            layers: OnceCell::new(),
            src_addr: OnceCell::new(),
            dst_addr: OnceCell::new(),
            flow_key: OnceCell::new(),
            is_dns: OnceCell::new(),
            dns: OnceCell::new(),
        }
    }

    pub fn record(&self) -> &CaptureRecord {
        &self.record
    }

    pub fn into_record(self) -> CaptureRecord {
        self.record
    }

    pub fn timestamp(&self) -> Timestamp {
        self.record.timestamp
    }

    pub fn linktype(&self) -> Linktype {
        self.record.linktype
    }

    pub fn data(&self) -> &[u8] {
        &self.record.data
    }

    /// Decode the record into its layer stack.
    pub fn decode(&self) -> Result<&LayerStack, PacketError> {
        self.layers
            .get_or_init(|| layers::decode(self.record.linktype, &self.record.data))
            .as_ref()
            .map_err(PacketError::clone)
    }

    /// Find the first layer of `kind`.
    pub fn layer(&self, kind: LayerKind) -> Result<&Layer, PacketError> {
        self.decode()?
            .find(kind)
            .ok_or(PacketError::LayerNotFound(kind))
    }

    /// Header and payload bytes of the layer of `kind`.
    pub fn layer_bytes(&self, kind: LayerKind) -> Result<&[u8], PacketError> {
        let layer = self.layer(kind)?;
        Ok(&self.record.data[layer.range()])
    }

    pub fn ip(&self) -> Result<Ipv4HeaderSlice<'_>, PacketError> {
        let bytes = self.layer_bytes(LayerKind::Ipv4)?;
        Ipv4HeaderSlice::from_slice(bytes).map_err(PacketError::malformed)
    }

    /// The IPv4 datagram as captured, without link framing or trailing padding.
    pub fn ip_bytes(&self) -> Result<&[u8], PacketError> {
        self.layer_bytes(LayerKind::Ipv4)
    }

    pub fn tcp(&self) -> Result<TcpHeaderSlice<'_>, PacketError> {
        let bytes = self.layer_bytes(LayerKind::Tcp)?;
        TcpHeaderSlice::from_slice(bytes).map_err(PacketError::malformed)
    }

    pub fn udp(&self) -> Result<UdpHeaderSlice<'_>, PacketError> {
        let bytes = self.layer_bytes(LayerKind::Udp)?;
        UdpHeaderSlice::from_slice(bytes).map_err(PacketError::malformed)
    }

    /// UDP payload bytes (after the 8-byte header).
    pub fn udp_payload(&self) -> Result<&[u8], PacketError> {
        let layer = self.layer(LayerKind::Udp)?;
        Ok(&self.record.data[layer.payload_range()])
    }

    /// IP protocol number.
    pub fn protocol(&self) -> Result<u8, PacketError> {
        Ok(self.ip()?.protocol().0)
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self.protocol(), Ok(layout::IP_PROTO_TCP))
    }

    pub fn is_udp(&self) -> bool {
        matches!(self.protocol(), Ok(layout::IP_PROTO_UDP))
    }

    pub fn sport(&self) -> Result<u16, PacketError> {
        match self.protocol()? {
            layout::IP_PROTO_TCP => Ok(self.tcp()?.source_port()),
            layout::IP_PROTO_UDP => Ok(self.udp()?.source_port()),
            other => Err(PacketError::NotTransport(other)),
        }
    }

    pub fn dport(&self) -> Result<u16, PacketError> {
        match self.protocol()? {
            layout::IP_PROTO_TCP => Ok(self.tcp()?.destination_port()),
            layout::IP_PROTO_UDP => Ok(self.udp()?.destination_port()),
            other => Err(PacketError::NotTransport(other)),
        }
    }

    pub fn src(&self) -> Result<Ipv4Addr, PacketError> {
        Ok(self.ip()?.source_addr())
    }

    pub fn dst(&self) -> Result<Ipv4Addr, PacketError> {
        Ok(self.ip()?.destination_addr())
    }

    /// Source address rendered as text.
    pub fn src_addr(&self) -> Result<&str, PacketError> {
        if let Some(addr) = self.src_addr.get() {
            return Ok(addr);
        }
        let addr = self.src()?.to_string();
        Ok(self.src_addr.get_or_init(|| addr))
    }

    /// Destination address rendered as text.
    pub fn dst_addr(&self) -> Result<&str, PacketError> {
        if let Some(addr) = self.dst_addr.get() {
            return Ok(addr);
        }
        let addr = self.dst()?.to_string();
        Ok(self.dst_addr.get_or_init(|| addr))
    }

    pub fn flow_key(&self) -> Result<&FlowKey, PacketError> {
        if let Some(key) = self.flow_key.get() {
            return Ok(key);
        }
        let key = FlowKey::new(
            IpAddr::V4(self.src()?),
            self.sport()?,
            IpAddr::V4(self.dst()?),
            self.dport()?,
            self.protocol()?,
        );
        Ok(self.flow_key.get_or_init(|| key))
    }

    /// Verify the IPv4 header checksum and, when `include_transport` is set,
    /// the TCP/UDP checksum.
    pub fn verify_checksums(
        &self,
        include_transport: bool,
    ) -> Result<ChecksumStatus, PacketError> {
        checksum::verify(self, include_transport)
    }

    /// `true` unless a checksum was fully recomputed and found wrong, or the
    /// packet has no IPv4 layer.
    pub fn checksum_ok(&self, include_transport: bool) -> bool {
        self.verify_checksums(include_transport).is_ok()
    }

    /// UDP with port 53 on either side. Decode failures classify as "not DNS".
    pub fn is_dns(&self) -> bool {
        *self.is_dns.get_or_init(|| {
            self.is_udp()
                && self
                    .udp()
                    .map(|udp| dns::is_dns_port(udp.source_port(), udp.destination_port()))
                    .unwrap_or(false)
        })
    }

    /// UDP payload parsed as DNS. Anything that does not parse yields an
    /// empty message.
    pub fn dns_payload(&self) -> &Message {
        self.dns.get_or_init(|| {
            self.udp_payload()
                .and_then(dns::parse_dns_message)
                .unwrap_or_else(|err| {
                    trace!("DNS payload at {} not parsed: {err}", self.timestamp());
                    Message::new()
                })
        })
    }
}
