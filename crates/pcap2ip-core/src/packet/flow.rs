use std::cell::OnceCell;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

use super::layout;

/// Directional 5-tuple identifying one side of a flow.
///
/// Equality compares the full tuple. The precomputed signature only feeds
/// `Hash`, so two distinct tuples can never be treated as the same flow.
///
/// # Examples
/// ```
/// use pcap2ip_core::FlowKey;
///
/// let key = FlowKey::new("10.0.0.2".parse().unwrap(), 80, "10.0.0.1".parse().unwrap(), 4000, 6);
/// assert!(!key.is_forward());
/// assert!(key.backward().is_forward());
/// assert_eq!(key.to_string(), "TCP 10.0.0.2:80 -> 10.0.0.1:4000");
/// ```
#[derive(Debug, Clone)]
pub struct FlowKey {
    src: IpAddr,
    src_port: u16,
    dst: IpAddr,
    dst_port: u16,
    protocol: u8,
    signature: u64,
    backward: OnceCell<Box<FlowKey>>,
}

impl FlowKey {
    pub fn new(src: IpAddr, src_port: u16, dst: IpAddr, dst_port: u16, protocol: u8) -> Self {
        let mut hasher = DefaultHasher::new();
        (src, src_port, dst, dst_port, protocol).hash(&mut hasher);
        Self {
            src,
            src_port,
            dst,
            dst_port,
            protocol,
            signature: hasher.finish(),
            backward: OnceCell::new(),
        }
    }

    pub fn src(&self) -> IpAddr {
        self.src
    }

    pub fn src_port(&self) -> u16 {
        self.src_port
    }

    pub fn dst(&self) -> IpAddr {
        self.dst
    }

    pub fn dst_port(&self) -> u16 {
        self.dst_port
    }

    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    pub fn signature(&self) -> u64 {
        self.signature
    }

    /// Canonical direction: lower address first, ties broken by port.
    pub fn is_forward(&self) -> bool {
        self.src < self.dst || (self.src == self.dst && self.src_port <= self.dst_port)
    }

    /// The same flow seen from the other end. Built on first use.
    pub fn backward(&self) -> &FlowKey {
        self.backward.get_or_init(|| {
            Box::new(FlowKey::new(
                self.dst,
                self.dst_port,
                self.src,
                self.src_port,
                self.protocol,
            ))
        })
    }

    /// Direction-normalised key, identical for both sides of a flow.
    pub fn canonical(&self) -> FlowKey {
        if self.is_forward() {
            self.clone()
        } else {
            self.backward().clone()
        }
    }

    fn tuple(&self) -> (IpAddr, u16, IpAddr, u16, u8) {
        (self.src, self.src_port, self.dst, self.dst_port, self.protocol)
    }
}

impl PartialEq for FlowKey {
    fn eq(&self, other: &Self) -> bool {
        self.tuple() == other.tuple()
    }
}

impl Eq for FlowKey {}

impl Hash for FlowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.signature);
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            layout::IP_PROTO_TCP => f.write_str("TCP")?,
            layout::IP_PROTO_UDP => f.write_str("UDP")?,
            other => write!(f, "IP/{other}")?,
        }
        write!(
            f,
            " {} -> {}",
            format_endpoint(self.src, self.src_port),
            format_endpoint(self.dst, self.dst_port)
        )
    }
}

fn format_endpoint(ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(addr) => format!("{}:{}", addr, port),
        IpAddr::V6(addr) => format!("[{}]:{}", addr, port),
    }
}
