pub const LOOPBACK_HEADER_LEN: usize = 4;
pub const AF_INET: u32 = 2;
/// BSD flavours disagree on the IPv6 address family value.
pub const AF_INET6: [u32; 3] = [24, 28, 30];

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;
pub const ETHERTYPE_PPPOE_SESSION: u16 = 0x8864;
pub const ETHERTYPE_VLAN: [u16; 3] = [0x8100, 0x88a8, 0x9100];
pub const VLAN_TAG_LEN: usize = 4;

pub const PPPOE_HEADER_LEN: usize = 6;
pub const PPP_PROTOCOL_LEN: usize = 2;
pub const PPP_IPV4: u16 = 0x0021;
pub const PPP_IPV6: u16 = 0x0057;

pub const IPV4_FLAGS_RANGE: std::ops::Range<usize> = 6..8;
pub const IPV4_MORE_FRAGMENTS: u16 = 0x2000;
pub const IPV4_FRAGMENT_OFFSET_MASK: u16 = 0x1fff;
pub const IPV6_HEADER_LEN: usize = 40;

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;

pub const UDP_HEADER_LEN: usize = 8;
