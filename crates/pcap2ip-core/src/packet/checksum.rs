//! Internet checksum verification for IPv4 headers and TCP/UDP segments.
//!
//! A mismatch is only reported when every byte needed to recompute the sum
//! was captured. Truncated datagrams, fragments and segments whose transport
//! header cannot be located are reported as unverifiable and pass.

use std::fmt;

use etherparse::checksum::Sum16BitWords;

use super::PacketView;
use super::error::PacketError;
use super::layers::LayerKind;
use super::layout;

/// Which checksum failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumScope {
    Ipv4Header,
    Tcp,
    Udp,
}

impl fmt::Display for ChecksumScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChecksumScope::Ipv4Header => "IPv4 header",
            ChecksumScope::Tcp => "TCP",
            ChecksumScope::Udp => "UDP",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStatus {
    /// Every requested checksum was recomputed and matched.
    Verified,
    /// The IP header matched; the transport checksum was not requested.
    HeaderOnly,
    /// The IP header matched; the transport checksum could not be checked.
    Unverifiable(Unverifiable),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unverifiable {
    /// The capture holds fewer bytes than the IP total length.
    Truncated,
    /// No TCP/UDP header could be located (other protocol, fragment, short segment).
    NoTransport,
    /// UDP sender left the checksum field at zero.
    UdpChecksumAbsent,
}

/// One's-complement sum over `parts`, complemented, as the big-endian value
/// that goes into a header checksum field.
///
/// Returns zero when the data already contains a correct checksum. Every part
/// except the last must have even length.
pub fn internet_checksum(parts: &[&[u8]]) -> u16 {
    parts
        .iter()
        .fold(Sum16BitWords::new(), |sum, part| sum.add_slice(part))
        .ones_complement()
        .to_be()
}

/// IPv4 pseudo-header used by the TCP and UDP checksums.
pub fn ipv4_pseudo_header(src: [u8; 4], dst: [u8; 4], protocol: u8, length: u16) -> [u8; 12] {
    let mut header = [0u8; 12];
    header[0..4].copy_from_slice(&src);
    header[4..8].copy_from_slice(&dst);
    header[9] = protocol;
    header[10..12].copy_from_slice(&length.to_be_bytes());
    header
}

pub(crate) fn verify(
    view: &PacketView,
    include_transport: bool,
) -> Result<ChecksumStatus, PacketError> {
    let ip = view.ip()?;
    if internet_checksum(&[ip.slice()]) != 0 {
        return Err(PacketError::ChecksumMismatch(ChecksumScope::Ipv4Header));
    }
    if !include_transport {
        return Ok(ChecksumStatus::HeaderOnly);
    }

    let ip_layer = view.layer(LayerKind::Ipv4)?;
    let available = view.data().len().saturating_sub(ip_layer.offset());
    if available < usize::from(ip.total_len()) {
        return Ok(ChecksumStatus::Unverifiable(Unverifiable::Truncated));
    }

    let protocol = ip.protocol().0;
    let (kind, scope) = match protocol {
        layout::IP_PROTO_TCP => (LayerKind::Tcp, ChecksumScope::Tcp),
        layout::IP_PROTO_UDP => (LayerKind::Udp, ChecksumScope::Udp),
        _ => return Ok(ChecksumStatus::Unverifiable(Unverifiable::NoTransport)),
    };
    let segment = match view.layer(kind) {
        Ok(layer) => &view.data()[layer.range()],
        Err(_) => return Ok(ChecksumStatus::Unverifiable(Unverifiable::NoTransport)),
    };
    if scope == ChecksumScope::Udp && view.udp()?.checksum() == 0 {
        return Ok(ChecksumStatus::Unverifiable(Unverifiable::UdpChecksumAbsent));
    }

    let length = u16::try_from(segment.len()).map_err(PacketError::malformed)?;
    let pseudo = ipv4_pseudo_header(ip.source(), ip.destination(), protocol, length);
    if internet_checksum(&[&pseudo, segment]) != 0 {
        return Err(PacketError::ChecksumMismatch(scope));
    }
    Ok(ChecksumStatus::Verified)
}
