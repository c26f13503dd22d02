//! tcpdump-style packet filters.
//!
//! Supported syntax:
//! - protocols: `tcp`, `udp`, `icmp`, `ip`, `ip6`
//! - `[src|dst] host 10.0.0.1`
//! - `[src|dst] net 10.0.0.0/8`
//! - `[src|dst] [tcp|udp] port 53`
//! - `[src|dst] [tcp|udp] portrange 1024-2048`
//! - `proto 47`
//! - `and`/`&&`, `or`/`||`, `not`/`!` and parentheses
//!
//! A primitive that needs a layer the packet does not have evaluates to
//! false.
//!
//! # Examples
//! ```
//! use pcap2ip_core::PacketFilter;
//!
//! assert!(PacketFilter::parse("udp and port 53").is_ok());
//! assert!(PacketFilter::parse("udp and").is_err());
//! ```

mod ast;
mod error;
mod parser;

pub use ast::{Cidr, Direction, FilterExpr, Primitive, Protocol};
pub use error::FilterError;

use std::net::Ipv4Addr;

use crate::packet::PacketView;
use crate::packet::layers::LayerKind;
use crate::packet::layout;

/// Compiled filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketFilter {
    expression: String,
    expr: FilterExpr,
}

impl PacketFilter {
    pub fn parse(expression: &str) -> Result<Self, FilterError> {
        let expr = parser::parse_filter(expression)?;
        Ok(Self {
            expression: expression.trim().to_string(),
            expr,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn expr(&self) -> &FilterExpr {
        &self.expr
    }

    pub fn matches(&self, packet: &PacketView) -> bool {
        eval(&self.expr, packet)
    }
}

fn eval(expr: &FilterExpr, packet: &PacketView) -> bool {
    match expr {
        FilterExpr::Primitive(primitive) => eval_primitive(primitive, packet),
        FilterExpr::Not(inner) => !eval(inner, packet),
        FilterExpr::And(left, right) => eval(left, packet) && eval(right, packet),
        FilterExpr::Or(left, right) => eval(left, packet) || eval(right, packet),
    }
}

fn eval_primitive(primitive: &Primitive, packet: &PacketView) -> bool {
    match primitive {
        Primitive::Protocol(Protocol::Tcp) => packet.is_tcp(),
        Primitive::Protocol(Protocol::Udp) => packet.is_udp(),
        Primitive::Protocol(Protocol::Icmp) => packet.protocol() == Ok(layout::IP_PROTO_ICMP),
        Primitive::Protocol(Protocol::Ip) => packet.layer(LayerKind::Ipv4).is_ok(),
        Primitive::Protocol(Protocol::Ip6) => packet.layer(LayerKind::Ipv6).is_ok(),
        Primitive::Host { direction, address } => {
            match_addresses(packet, *direction, |addr| addr == *address)
        }
        Primitive::Net { direction, cidr } => {
            match_addresses(packet, *direction, |addr| cidr.contains(addr))
        }
        Primitive::Port {
            direction,
            protocol,
            port,
        } => match_ports(packet, *direction, *protocol, |p| p == *port),
        Primitive::PortRange {
            direction,
            protocol,
            start,
            end,
        } => match_ports(packet, *direction, *protocol, |p| (*start..=*end).contains(&p)),
        Primitive::Proto(number) => packet.protocol() == Ok(*number),
    }
}

fn match_addresses(
    packet: &PacketView,
    direction: Direction,
    pred: impl Fn(Ipv4Addr) -> bool,
) -> bool {
    let src = || packet.src().map(&pred).unwrap_or(false);
    let dst = || packet.dst().map(&pred).unwrap_or(false);
    match direction {
        Direction::Src => src(),
        Direction::Dst => dst(),
        Direction::SrcOrDst => src() || dst(),
    }
}

fn match_ports(
    packet: &PacketView,
    direction: Direction,
    protocol: Option<Protocol>,
    pred: impl Fn(u16) -> bool,
) -> bool {
    let protocol_ok = match protocol {
        Some(Protocol::Tcp) => packet.is_tcp(),
        Some(Protocol::Udp) => packet.is_udp(),
        _ => true,
    };
    if !protocol_ok {
        return false;
    }
    let src = || packet.sport().map(&pred).unwrap_or(false);
    let dst = || packet.dport().map(&pred).unwrap_or(false);
    match direction {
        Direction::Src => src(),
        Direction::Dst => dst(),
        Direction::SrcOrDst => src() || dst(),
    }
}

#[cfg(test)]
mod tests {
    use super::PacketFilter;
    use crate::packet::PacketView;
    use crate::test_utils::{arp_frame, ethernet, ipv4_tcp, ipv4_udp, record};
    use pcap_parser::Linktype;

    fn raw(data: Vec<u8>) -> PacketView {
        PacketView::new(record(Linktype::RAW, 0.0, data))
    }

    fn matches(expression: &str, packet: &PacketView) -> bool {
        PacketFilter::parse(expression).unwrap().matches(packet)
    }

    #[test]
    fn dns_filter_selects_udp_port_53() {
        let query = raw(ipv4_udp([10, 0, 0, 1], [10, 0, 0, 53], 40000, 53, b"q"));
        let reply = raw(ipv4_udp([10, 0, 0, 53], [10, 0, 0, 1], 53, 40000, b"r"));
        let tcp53 = raw(ipv4_tcp([10, 0, 0, 1], [10, 0, 0, 53], 40000, 53, b"q"));
        let other = raw(ipv4_udp([10, 0, 0, 1], [10, 0, 0, 2], 40000, 123, b"n"));

        assert!(matches("udp and port 53", &query));
        assert!(matches("udp and port 53", &reply));
        assert!(!matches("udp and port 53", &tcp53));
        assert!(!matches("udp and port 53", &other));
    }

    #[test]
    fn directions_and_networks() {
        let packet = raw(ipv4_tcp([192, 168, 1, 10], [10, 0, 0, 5], 5555, 80, &[]));
        assert!(matches("src host 192.168.1.10", &packet));
        assert!(!matches("dst host 192.168.1.10", &packet));
        assert!(matches("host 10.0.0.5", &packet));
        assert!(matches("dst net 10.0.0.0/8", &packet));
        assert!(!matches("src net 10.0.0.0/8", &packet));
        assert!(matches("dst tcp port 80", &packet));
        assert!(!matches("udp port 80", &packet));
        assert!(matches("src portrange 5000-6000", &packet));
        assert!(matches("proto 6 and not icmp", &packet));
        assert!(matches("ip and !ip6", &packet));
    }

    #[test]
    fn missing_layers_evaluate_false() {
        let arp = PacketView::new(record(Linktype::ETHERNET, 0.0, arp_frame()));
        assert!(!matches("ip", &arp));
        assert!(!matches("port 53", &arp));
        assert!(!matches("host 10.0.0.1", &arp));
        assert!(matches("not ip", &arp));

        let eth = PacketView::new(record(
            Linktype::ETHERNET,
            0.0,
            ethernet(&ipv4_udp([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, &[])),
        ));
        assert!(matches("ip and udp", &eth));
    }

    #[test]
    fn keeps_expression_text() {
        let filter = PacketFilter::parse("  tcp or udp ").unwrap();
        assert_eq!(filter.expression(), "tcp or udp");
    }
}
