use std::fmt;
use std::ops::Range;

use etherparse::{
    Ethernet2HeaderSlice, Ipv4HeaderSlice, Ipv6HeaderSlice, SingleVlanHeaderSlice,
    TcpHeaderSlice, UdpHeaderSlice,
};
use log::trace;
use pcap_parser::Linktype;

use super::error::PacketError;
use super::layout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Loopback,
    Ethernet,
    Vlan,
    Pppoe,
    Ipv4,
    Ipv6,
    Tcp,
    Udp,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Loopback => "loopback",
            LayerKind::Ethernet => "Ethernet",
            LayerKind::Vlan => "VLAN",
            LayerKind::Pppoe => "PPPoE",
            LayerKind::Ipv4 => "IPv4",
            LayerKind::Ipv6 => "IPv6",
            LayerKind::Tcp => "TCP",
            LayerKind::Udp => "UDP",
        };
        f.write_str(name)
    }
}

/// One decoded protocol layer, as byte offsets into the record data.
///
/// `end` is where this layer's payload stops. For IP it is bounded by the
/// datagram's length field, so link-layer padding is excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layer {
    kind: LayerKind,
    offset: usize,
    header_len: usize,
    end: usize,
}

impl Layer {
    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Header plus payload.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.end
    }

    pub fn header_range(&self) -> Range<usize> {
        self.offset..self.offset + self.header_len
    }

    pub fn payload_range(&self) -> Range<usize> {
        self.offset + self.header_len..self.end
    }
}

/// Decoded layers, outermost first. Each layer is the payload of the one
/// before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerStack {
    layers: Vec<Layer>,
}

impl LayerStack {
    /// Outermost (link) layer.
    pub fn top(&self) -> Option<&Layer> {
        self.layers.first()
    }

    /// Walk the payload chain until a layer of `kind` is found.
    pub fn find(&self, kind: LayerKind) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.kind == kind)
    }

    pub fn kinds(&self) -> Vec<LayerKind> {
        self.layers.iter().map(Layer::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Decode `data` according to its capture link type.
///
/// Only a broken link layer fails the decode. Inner layers that do not parse
/// simply end the stack, so a later lookup reports the layer as missing.
pub(crate) fn decode(linktype: Linktype, data: &[u8]) -> Result<LayerStack, PacketError> {
    let mut decoder = Decoder {
        data,
        layers: Vec::new(),
    };
    match linktype {
        Linktype::NULL => decoder.loopback(false)?,
        Linktype::LOOP => decoder.loopback(true)?,
        Linktype::ETHERNET => decoder.ethernet()?,
        Linktype::RAW => decoder.raw_ip()?,
        other => return Err(PacketError::UnsupportedLinktype(other.0)),
    }
    Ok(LayerStack {
        layers: decoder.layers,
    })
}

struct Decoder<'a> {
    data: &'a [u8],
    layers: Vec<Layer>,
}

impl Decoder<'_> {
    fn push(&mut self, kind: LayerKind, offset: usize, header_len: usize, end: usize) {
        self.layers.push(Layer {
            kind,
            offset,
            header_len,
            end,
        });
    }

    fn loopback(&mut self, network_order: bool) -> Result<(), PacketError> {
        let bytes: [u8; layout::LOOPBACK_HEADER_LEN] = self
            .data
            .get(..layout::LOOPBACK_HEADER_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                PacketError::Malformed(format!(
                    "loopback header needs {} bytes, got {}",
                    layout::LOOPBACK_HEADER_LEN,
                    self.data.len()
                ))
            })?;
        let family = if network_order {
            u32::from_be_bytes(bytes)
        } else {
            // Written in the capturing host's byte order; family values are small.
            let le = u32::from_le_bytes(bytes);
            if le & 0xffff_0000 == 0 {
                le
            } else {
                u32::from_be_bytes(bytes)
            }
        };
        let offset = layout::LOOPBACK_HEADER_LEN;
        self.push(LayerKind::Loopback, 0, offset, self.data.len());
        if family == layout::AF_INET {
            self.ipv4(offset);
        } else if layout::AF_INET6.contains(&family) {
            self.ipv6(offset);
        } else {
            trace!("loopback family {family} carries no IP payload");
        }
        Ok(())
    }

    fn ethernet(&mut self) -> Result<(), PacketError> {
        let eth = Ethernet2HeaderSlice::from_slice(self.data).map_err(PacketError::malformed)?;
        let mut offset = eth.slice().len();
        let mut ether_type = eth.ether_type().0;
        self.push(LayerKind::Ethernet, 0, offset, self.data.len());

        while layout::ETHERTYPE_VLAN.contains(&ether_type) {
            let vlan = match SingleVlanHeaderSlice::from_slice(&self.data[offset..]) {
                Ok(vlan) => vlan,
                Err(err) => {
                    trace!("VLAN tag did not decode: {err}");
                    return Ok(());
                }
            };
            self.push(LayerKind::Vlan, offset, layout::VLAN_TAG_LEN, self.data.len());
            ether_type = vlan.ether_type().0;
            offset += layout::VLAN_TAG_LEN;
        }

        match ether_type {
            layout::ETHERTYPE_IPV4 => self.ipv4(offset),
            layout::ETHERTYPE_IPV6 => self.ipv6(offset),
            layout::ETHERTYPE_PPPOE_SESSION => self.pppoe(offset),
            other => trace!("ethertype {other:#06x} carries no IP payload"),
        }
        Ok(())
    }

    fn raw_ip(&mut self) -> Result<(), PacketError> {
        match self.data.first().map(|b| b >> 4) {
            Some(4) => self.ipv4(0),
            Some(6) => self.ipv6(0),
            Some(version) => {
                return Err(PacketError::Malformed(format!(
                    "raw IP record with version {version}"
                )));
            }
            None => return Err(PacketError::Malformed("empty raw IP record".to_string())),
        }
        Ok(())
    }

    fn pppoe(&mut self, offset: usize) {
        let header_len = layout::PPPOE_HEADER_LEN + layout::PPP_PROTOCOL_LEN;
        let Some(header) = self.data.get(offset..offset + header_len) else {
            trace!("PPPoE session header truncated");
            return;
        };
        let protocol = u16::from_be_bytes([header[6], header[7]]);
        self.push(LayerKind::Pppoe, offset, header_len, self.data.len());
        match protocol {
            layout::PPP_IPV4 => self.ipv4(offset + header_len),
            layout::PPP_IPV6 => self.ipv6(offset + header_len),
            other => trace!("PPP protocol {other:#06x} carries no IP payload"),
        }
    }

    fn ipv4(&mut self, offset: usize) {
        let rest = &self.data[offset.min(self.data.len())..];
        let header = match Ipv4HeaderSlice::from_slice(rest) {
            Ok(header) => header,
            Err(err) => {
                trace!("IPv4 header did not decode: {err}");
                return;
            }
        };
        let header_len = header.slice().len();
        let total_len = usize::from(header.total_len());
        if total_len < header_len {
            trace!("IPv4 total length {total_len} shorter than header {header_len}");
            return;
        }
        let end = offset + total_len.min(rest.len());
        self.push(LayerKind::Ipv4, offset, header_len, end);

        let flags = u16::from_be_bytes([
            header.slice()[layout::IPV4_FLAGS_RANGE.start],
            header.slice()[layout::IPV4_FLAGS_RANGE.start + 1],
        ]);
        if flags & (layout::IPV4_MORE_FRAGMENTS | layout::IPV4_FRAGMENT_OFFSET_MASK) != 0 {
            trace!("IPv4 fragment, transport header not decoded");
            return;
        }
        self.transport(header.protocol().0, offset + header_len, end);
    }

    fn ipv6(&mut self, offset: usize) {
        let rest = &self.data[offset.min(self.data.len())..];
        let header = match Ipv6HeaderSlice::from_slice(rest) {
            Ok(header) => header,
            Err(err) => {
                trace!("IPv6 header did not decode: {err}");
                return;
            }
        };
        let payload_len = usize::from(header.payload_length());
        let end = if payload_len == 0 {
            self.data.len()
        } else {
            offset + (layout::IPV6_HEADER_LEN + payload_len).min(rest.len())
        };
        self.push(LayerKind::Ipv6, offset, layout::IPV6_HEADER_LEN, end);
        self.transport(header.next_header().0, offset + layout::IPV6_HEADER_LEN, end);
    }

    fn transport(&mut self, protocol: u8, offset: usize, end: usize) {
        let segment = &self.data[offset..end];
        match protocol {
            layout::IP_PROTO_TCP => match TcpHeaderSlice::from_slice(segment) {
                Ok(tcp) => self.push(LayerKind::Tcp, offset, tcp.slice().len(), end),
                Err(err) => trace!("TCP header did not decode: {err}"),
            },
            layout::IP_PROTO_UDP => match UdpHeaderSlice::from_slice(segment) {
                Ok(_) => self.push(LayerKind::Udp, offset, layout::UDP_HEADER_LEN, end),
                Err(err) => trace!("UDP header did not decode: {err}"),
            },
            _ => {}
        }
    }
}
