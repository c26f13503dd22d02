use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{debug, warn};
use pcap_parser::{
    Block, LegacyPcapReader, Linktype, PcapBlockOwned, PcapError, PcapNGReader,
    traits::PcapReaderIterator,
};

use crate::filter::PacketFilter;
use crate::packet::PacketView;
use crate::source::{CaptureRecord, PacketSource, SourceError};

use super::error::PcapSourceError;
use super::layout;
use super::reader::{NgInterface, interface_for, is_pcapng_magic, legacy_ts, read_magic};

type Input = Box<dyn Read>;

/// Buffered, optionally filtered reader over one capture stream.
///
/// Records come out in file order. The underlying input is dropped as soon as
/// it reports end of stream, or on [`CaptureSource::close`].
pub struct CaptureSource {
    name: String,
    inner: Option<PcapReader>,
    filter: Option<PacketFilter>,
    buffer: VecDeque<CaptureRecord>,
    filtered_out: u64,
}

enum PcapReader {
    Legacy {
        reader: LegacyPcapReader<Input>,
        linktype: Option<Linktype>,
        nanosecond: bool,
    },
    Ng {
        reader: PcapNGReader<Input>,
        interfaces: Vec<NgInterface>,
    },
}

impl CaptureSource {
    /// Open a capture file.
    pub fn open(path: &Path, filter: Option<PacketFilter>) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(SourceError::from)?;
        Self::from_reader(path.display().to_string(), file, filter)
    }

    /// Wrap an arbitrary byte stream (stdin, a decompressor, an in-memory
    /// buffer). `name` is only used in log messages.
    pub fn from_reader<R: Read + 'static>(
        name: impl Into<String>,
        reader: R,
        filter: Option<PacketFilter>,
    ) -> Result<Self, SourceError> {
        let name = name.into();
        let inner = create_reader(Box::new(reader)).map_err(SourceError::from)?;
        debug!("{name}: capture opened");
        Ok(Self {
            name,
            inner: Some(inner),
            filter,
            buffer: VecDeque::with_capacity(layout::READ_AHEAD_BATCH),
            filtered_out: 0,
        })
    }

    /// Return the next record without consuming it.
    ///
    /// Repeated calls return the same record until `next_packet` is called.
    pub fn peek(&mut self) -> Result<Option<&CaptureRecord>, SourceError> {
        self.refill()?;
        Ok(self.buffer.front())
    }

    /// Release the input and discard any read-ahead records.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!("{}: capture closed", self.name);
        }
        self.buffer.clear();
    }

    /// True while the underlying input is still held open.
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn refill(&mut self) -> Result<(), SourceError> {
        if !self.buffer.is_empty() {
            return Ok(());
        }
        while self.buffer.len() < layout::READ_AHEAD_BATCH {
            let Some(reader) = self.inner.as_mut() else {
                break;
            };
            match next_record(reader).map_err(SourceError::from)? {
                Some(record) => {
                    if let Some(record) = self.admit(record) {
                        self.buffer.push_back(record);
                    }
                }
                None => {
                    debug!(
                        "{}: end of capture ({} records filtered out), releasing input",
                        self.name, self.filtered_out
                    );
                    self.inner = None;
                }
            }
        }
        Ok(())
    }

    fn admit(&mut self, record: CaptureRecord) -> Option<CaptureRecord> {
        let Some(filter) = self.filter.as_ref() else {
            return Some(record);
        };
        let view = PacketView::new(record);
        if filter.matches(&view) {
            Some(view.into_record())
        } else {
            self.filtered_out += 1;
            None
        }
    }
}

impl PacketSource for CaptureSource {
    fn next_packet(&mut self) -> Result<Option<CaptureRecord>, SourceError> {
        self.refill()?;
        Ok(self.buffer.pop_front())
    }
}

fn create_reader(input: Input) -> Result<PcapReader, PcapSourceError> {
    let (magic, replay) = read_magic(input, layout::PCAP_READER_BUFFER_SIZE)?;
    let input: Input = Box::new(replay);

    if is_pcapng_magic(&magic) {
        let reader = PcapNGReader::new(layout::PCAP_READER_BUFFER_SIZE, input).map_err(|e| {
            PcapSourceError::Pcap {
                context: "pcapng reader init",
                message: e.to_string(),
            }
        })?;
        Ok(PcapReader::Ng {
            reader,
            interfaces: Vec::new(),
        })
    } else {
        let reader = LegacyPcapReader::new(layout::PCAP_READER_BUFFER_SIZE, input).map_err(|e| {
            PcapSourceError::Pcap {
                context: "pcap reader init",
                message: e.to_string(),
            }
        })?;
        Ok(PcapReader::Legacy {
            reader,
            linktype: None,
            nanosecond: false,
        })
    }
}

fn next_record(reader: &mut PcapReader) -> Result<Option<CaptureRecord>, PcapSourceError> {
    loop {
        match reader {
            PcapReader::Legacy {
                reader,
                linktype,
                nanosecond,
            } => match reader.next() {
                Ok((offset, block)) => {
                    let record = match block {
                        PcapBlockOwned::LegacyHeader(header) => {
                            *linktype = Some(header.network);
                            *nanosecond = header.is_nanosecond_precision();
                            None
                        }
                        PcapBlockOwned::Legacy(packet) => Some(CaptureRecord {
                            timestamp: legacy_ts(packet.ts_sec, packet.ts_usec, *nanosecond),
                            linktype: linktype.unwrap_or(Linktype::ETHERNET),
                            orig_len: packet.origlen,
                            data: packet.data.to_vec(),
                        }),
                        _ => None,
                    };
                    reader.consume(offset);
                    if record.is_some() {
                        return Ok(record);
                    }
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::UnexpectedEof) => {
                    warn!("pcap input ends inside a record; ignoring the partial tail");
                    return Ok(None);
                }
                Err(PcapError::Incomplete(_)) => {
                    reader.refill().map_err(|e| PcapSourceError::Pcap {
                        context: "pcap reader refill",
                        message: e.to_string(),
                    })?;
                }
                Err(e) => {
                    return Err(PcapSourceError::Pcap {
                        context: "pcap reader next",
                        message: e.to_string(),
                    });
                }
            },
            PcapReader::Ng { reader, interfaces } => match reader.next() {
                Ok((offset, block)) => {
                    let record = match block {
                        PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                            interfaces.clear();
                            None
                        }
                        PcapBlockOwned::NG(Block::InterfaceDescription(intf)) => {
                            interfaces.push(NgInterface::from_block(&intf));
                            None
                        }
                        PcapBlockOwned::NG(Block::EnhancedPacket(packet)) => {
                            let caplen = (packet.caplen as usize).min(packet.data.len());
                            let interface = interface_for(interfaces, packet.if_id);
                            Some(CaptureRecord {
                                timestamp: interface.timestamp(packet.ts_high, packet.ts_low),
                                linktype: interface.linktype,
                                orig_len: packet.origlen,
                                data: packet.data[..caplen].to_vec(),
                            })
                        }
                        _ => None,
                    };
                    reader.consume(offset);
                    if record.is_some() {
                        return Ok(record);
                    }
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::UnexpectedEof) => {
                    warn!("pcapng input ends inside a block; ignoring the partial tail");
                    return Ok(None);
                }
                Err(PcapError::Incomplete(_)) => {
                    reader.refill().map_err(|e| PcapSourceError::Pcap {
                        context: "pcapng reader refill",
                        message: e.to_string(),
                    })?;
                }
                Err(e) => {
                    return Err(PcapSourceError::Pcap {
                        context: "pcapng reader next",
                        message: e.to_string(),
                    });
                }
            },
        }
    }
}
