//! Packet and capture builders shared by unit tests.

use std::io::{self, Cursor, Read};

use etherparse::PacketBuilder;
use hickory_proto::op::{Message, Query};
use hickory_proto::rr::{Name, RecordType};
use hickory_proto::serialize::binary::BinEncodable;
use pcap_parser::Linktype;

use crate::source::CaptureRecord;
use crate::timestamp::Timestamp;
use crate::writer::CaptureWriter;

pub(crate) fn ipv4_tcp(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ipv4(src, dst, 64).tcp(sport, dport, 1, 1024);
    let mut packet = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut packet, payload).unwrap();
    packet
}

pub(crate) fn ipv4_udp(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ipv4(src, dst, 64).udp(sport, dport);
    let mut packet = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut packet, payload).unwrap();
    packet
}

/// Wrap an IPv4 datagram in an Ethernet II frame.
pub(crate) fn ethernet(ip: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x02, 0, 0, 0, 0, 0x01, 0x02, 0, 0, 0, 0, 0x02, 0x08, 0x00];
    frame.extend_from_slice(ip);
    frame
}

pub(crate) fn arp_frame() -> Vec<u8> {
    let mut frame = vec![0xff; 6];
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01, 0x08, 0x06]);
    frame.extend_from_slice(&[0x00, 0x01, 0x08, 0x00, 0x06, 0x04, 0x00, 0x01]);
    frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01, 10, 0, 0, 1]);
    frame.extend_from_slice(&[0, 0, 0, 0, 0, 0, 10, 0, 0, 2]);
    frame
}

pub(crate) fn record(linktype: Linktype, secs: f64, data: Vec<u8>) -> CaptureRecord {
    CaptureRecord {
        timestamp: Timestamp::from_secs_f64(secs),
        linktype,
        orig_len: data.len() as u32,
        data,
    }
}

pub(crate) fn dns_query(id: u16, name: &str) -> Vec<u8> {
    let mut message = Message::new();
    message.set_id(id);
    message.set_recursion_desired(true);
    message.add_query(Query::query(Name::from_ascii(name).unwrap(), RecordType::A));
    message.to_bytes().unwrap()
}

/// Serialize records into an in-memory legacy pcap file.
pub(crate) fn capture_bytes(linktype: Linktype, records: &[(Timestamp, Vec<u8>)]) -> Vec<u8> {
    let mut writer = CaptureWriter::open(Vec::new(), 65535, linktype).unwrap();
    for (timestamp, data) in records {
        writer
            .write_record(data, data.len() as u32, *timestamp)
            .unwrap();
    }
    writer.close().unwrap()
}

/// Reader that hands out one byte per `read`, like a slow pipe.
pub(crate) struct Trickle(Cursor<Vec<u8>>);

impl Trickle {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self(Cursor::new(bytes))
    }
}

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(1);
        self.0.read(&mut buf[..len])
    }
}
