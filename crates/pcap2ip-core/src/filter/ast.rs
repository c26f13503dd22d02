use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Src,
    Dst,
    #[default]
    SrcOrDst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// IPv4
    Ip,
    /// IPv6
    Ip6,
}

/// IPv4 network in prefix notation. Host bits of `address` are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl Cidr {
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = match self.prefix_len {
            0 => 0,
            len => u32::MAX << (32 - u32::from(len.min(32))),
        };
        u32::from(addr) & mask == u32::from(self.address) & mask
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
    Protocol(Protocol),
    Host {
        direction: Direction,
        address: Ipv4Addr,
    },
    Net {
        direction: Direction,
        cidr: Cidr,
    },
    /// `protocol` restricts the match to TCP or UDP.
    Port {
        direction: Direction,
        protocol: Option<Protocol>,
        port: u16,
    },
    PortRange {
        direction: Direction,
        protocol: Option<Protocol>,
        start: u16,
        end: u16,
    },
    /// IP protocol number.
    Proto(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    Primitive(Primitive),
    Not(Box<FilterExpr>),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
}

impl FilterExpr {
    pub fn negate(expr: FilterExpr) -> Self {
        FilterExpr::Not(Box::new(expr))
    }

    pub fn and(left: FilterExpr, right: FilterExpr) -> Self {
        FilterExpr::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: FilterExpr, right: FilterExpr) -> Self {
        FilterExpr::Or(Box::new(left), Box::new(right))
    }
}
