use assert_cmd::Command;
use etherparse::PacketBuilder;
use pcap2ip_core::{CaptureSource, CaptureWriter, Linktype, PacketSource, Timestamp};
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("pcap2ip"))
}

fn udp(sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64).udp(sport, dport);
    let mut packet = Vec::new();
    builder.write(&mut packet, payload).expect("udp packet");
    packet
}

fn tcp(sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2([1, 2, 3, 4, 5, 6], [7, 8, 9, 10, 11, 12])
        .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
        .tcp(sport, dport, 1, 1024);
    let mut packet = Vec::new();
    builder.write(&mut packet, payload).expect("tcp frame");
    packet
}

fn capture(linktype: Linktype, packets: &[(u64, Vec<u8>)]) -> Vec<u8> {
    let mut writer = CaptureWriter::open(Vec::new(), 65535, linktype).expect("writer");
    for (secs, data) in packets {
        writer
            .write_record(data, data.len() as u32, Timestamp::new(*secs, 0))
            .expect("record");
    }
    writer.close().expect("close")
}

fn record_count(output: &[u8]) -> usize {
    let mut source =
        CaptureSource::from_reader("stdout", std::io::Cursor::new(output.to_vec()), None)
            .expect("output is a capture");
    let mut count = 0;
    while source.next_packet().expect("record").is_some() {
        count += 1;
    }
    count
}

fn ethernet_input() -> Vec<u8> {
    let mut bad = tcp(4000, 80, b"corrupt");
    let last = bad.len() - 1;
    bad[last] ^= 0xff;
    capture(
        Linktype::ETHERNET,
        &[(1, tcp(4000, 80, b"hello")), (2, bad), (3, tcp(4000, 22, b"ssh"))],
    )
}

#[test]
fn help_describes_stdin_stdout() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("stdin").and(contains("--dns")));
}

#[test]
fn positional_argument_is_usage_error() {
    cmd()
        .arg("capture.pcap")
        .write_stdin(ethernet_input())
        .assert()
        .failure()
        .stdout(predicates::str::is_empty())
        .stderr(contains("capture.pcap"));
}

#[test]
fn rewrites_stdin_to_stdout() {
    let assert = cmd().write_stdin(ethernet_input()).assert().success();
    let output = assert.get_output().stdout.clone();
    assert_eq!(&output[..4], &[0xd4, 0xc3, 0xb2, 0xa1]);
    assert_eq!(u32::from_le_bytes(output[20..24].try_into().unwrap()), 101);
    assert_eq!(record_count(&output), 2);
}

#[test]
fn stats_are_json_on_stderr() {
    let assert = cmd()
        .arg("--stats")
        .write_stdin(ethernet_input())
        .assert()
        .success();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).expect("utf8");
    let stats: Value = serde_json::from_str(&stderr).expect("stats json");
    assert_eq!(stats["accepted"], 2);
    assert_eq!(stats["dropped"], 1);
    assert_eq!(stats["drops"]["bad_checksum"], 1);
    assert_eq!(stats["flows"], 2);
}

#[test]
fn filter_and_checksum_flags() {
    let assert = cmd()
        .args(["--filter", "tcp port 80", "--no-transport-checksum"])
        .write_stdin(ethernet_input())
        .assert()
        .success();
    assert_eq!(record_count(&assert.get_output().stdout), 2);
}

#[test]
fn invalid_filter_shows_error_and_hint() {
    cmd()
        .args(["--filter", "tcp and"])
        .write_stdin(ethernet_input())
        .assert()
        .code(2)
        .stdout(predicates::str::is_empty())
        .stderr(contains("error:").and(contains("hint:")));
}

#[test]
fn garbage_input_shows_error_and_hint() {
    cmd()
        .write_stdin(vec![0u8; 64])
        .assert()
        .code(2)
        .stderr(contains("error:").and(contains("hint:")));
}

#[test]
fn missing_dns_capture_shows_error_and_hint() {
    let temp = TempDir::new().expect("tempdir");
    let missing = temp.path().join("dns.pcap");
    cmd()
        .arg("--dns")
        .arg(&missing)
        .write_stdin(ethernet_input())
        .assert()
        .code(2)
        .stdout(predicates::str::is_empty())
        .stderr(contains("error:").and(contains("hint:")));
}

#[test]
fn dns_capture_is_merged() {
    let temp = TempDir::new().expect("tempdir");
    let dns_path = temp.path().join("dns.pcap");
    std::fs::write(
        &dns_path,
        capture(
            Linktype::RAW,
            &[(2, udp(5353, 53, b"query")), (2, udp(5353, 123, b"ntp"))],
        ),
    )
    .expect("write dns capture");

    let assert = cmd()
        .arg("--dns")
        .arg(&dns_path)
        .arg("--stats")
        .write_stdin(ethernet_input())
        .assert()
        .success();
    let output = assert.get_output();
    assert_eq!(record_count(&output.stdout), 3);
    let stats: Value = serde_json::from_slice(&output.stderr).expect("stats json");
    assert_eq!(stats["dns_packets"], 1);
}
