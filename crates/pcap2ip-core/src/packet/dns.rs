use hickory_proto::op::Message;

use super::error::PacketError;

/// DNS well-known port.
pub const DNS_PORT: u16 = 53;

/// Filter expression used for DNS-only capture sources.
pub const DNS_FILTER: &str = "udp and port 53";

pub fn is_dns_port(src_port: u16, dst_port: u16) -> bool {
    src_port == DNS_PORT || dst_port == DNS_PORT
}

/// Parse a UDP payload as a DNS message.
pub fn parse_dns_message(payload: &[u8]) -> Result<Message, PacketError> {
    Message::from_vec(payload).map_err(PacketError::malformed)
}
