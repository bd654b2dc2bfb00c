use std::cmp::min;
use std::io::Read;

use libifstat::{Config, FrameSink};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{Block, Linktype, PcapBlockOwned, PcapError};

use crate::error::Error;

/// Counters about the capture itself
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Blocks read, headers included
    pub blocks: usize,
    /// Frames fed to the sink
    pub frames: usize,
    /// Packets skipped because their interface is not Ethernet
    pub skipped: usize,
}

/// pcap/pcap-ng replay engine
///
/// Reads a capture and feeds every Ethernet frame to a `FrameSink`, in file
/// order. The frame is the captured part of the packet.
pub struct ReplayEngine<S: FrameSink> {
    sink: S,
    capacity: usize,
}

impl<S: FrameSink> ReplayEngine<S> {
    pub fn new(sink: S, config: &Config) -> Self {
        let capacity = config
            .get_usize("buffer_initial_capacity")
            .unwrap_or(128 * 1024);
        ReplayEngine { sink, capacity }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Main function: given a reader, read all pcap data and call the sink for each frame
    ///
    /// The sink is initialized before the first block and torn down after the
    /// last one, or on error.
    pub fn run(&mut self, reader: &mut (dyn Read + Send)) -> Result<ReplayStats, Error> {
        let mut reader = pcap_parser::create_reader(self.capacity, reader)?;

        self.sink.init()?;
        let mut stats = ReplayStats::default();
        let res = self.read_blocks(&mut *reader, &mut stats);
        self.sink.teardown();
        if let Err(e) = &res {
            error!("error while reading: {}", e);
        }
        if stats.skipped > 0 {
            debug!("{} packets on non-Ethernet interfaces skipped", stats.skipped);
        }
        res.map(|_| stats)
    }

    fn read_blocks(
        &mut self,
        reader: &mut dyn PcapReaderIterator,
        stats: &mut ReplayStats,
    ) -> Result<(), Error> {
        let mut interfaces: Vec<Linktype> = Vec::new();

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    stats.blocks += 1;
                    self.handle_block(&block, &mut interfaces, stats)?;
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => {
                    trace!("need refill");
                    let available = reader.data().len();
                    reader.refill()?;
                    if reader.data().len() == available {
                        warn!(
                            "Could not read complete data block (block_index={})",
                            stats.blocks
                        );
                        if reader.reader_exhausted() {
                            warn!("Hint: the input file may be truncated.");
                        } else {
                            warn!("Hint: the reader buffer size may be too small.");
                        }
                        break;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn handle_block(
        &mut self,
        block: &PcapBlockOwned,
        interfaces: &mut Vec<Linktype>,
        stats: &mut ReplayStats,
    ) -> Result<(), Error> {
        let (linktype, data) = match block {
            PcapBlockOwned::LegacyHeader(hdr) => {
                debug!("Legacy pcap, link type: {:?}", hdr.network);
                interfaces.clear();
                interfaces.push(hdr.network);
                return Ok(());
            }
            PcapBlockOwned::Legacy(b) => {
                let caplen = min(b.caplen as usize, b.data.len());
                (interfaces.first().copied(), &b.data[..caplen])
            }
            PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                debug!("pcap-ng: new section");
                interfaces.clear();
                return Ok(());
            }
            PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                debug!(
                    "pcap-ng: interface {}, link type: {:?}",
                    interfaces.len(),
                    idb.linktype
                );
                interfaces.push(idb.linktype);
                return Ok(());
            }
            PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                // data is padded to 32 bits
                let caplen = min(epb.caplen as usize, epb.data.len());
                (
                    interfaces.get(epb.if_id as usize).copied(),
                    &epb.data[..caplen],
                )
            }
            PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                let caplen = min(spb.origlen as usize, spb.data.len());
                (interfaces.first().copied(), &spb.data[..caplen])
            }
            _ => {
                trace!("ignoring block");
                return Ok(());
            }
        };
        match linktype {
            Some(Linktype::ETHERNET) => {
                stats.frames += 1;
                self.sink.handle_frame(data)?;
            }
            Some(_) => stats.skipped += 1,
            None => {
                return Err(Error::Generic("packet block without interface description"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        frames: Vec<usize>,
        fail_at: Option<usize>,
        init: usize,
        teardown: usize,
    }

    impl FrameSink for Recorder {
        fn init(&mut self) -> Result<(), libifstat::Error> {
            self.init += 1;
            Ok(())
        }

        fn handle_frame(&mut self, frame: &[u8]) -> Result<(), libifstat::Error> {
            if self.fail_at == Some(self.frames.len()) {
                return Err(libifstat::Error::Generic("sink full"));
            }
            self.frames.push(frame.len());
            Ok(())
        }

        fn teardown(&mut self) {
            self.teardown += 1;
        }
    }

    fn legacy_pcap(linktype: u32, frames: &[usize]) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
        v.extend_from_slice(&[2, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        v.extend_from_slice(&65535u32.to_le_bytes());
        v.extend_from_slice(&linktype.to_le_bytes());
        for &len in frames {
            v.extend_from_slice(&[0; 8]);
            v.extend_from_slice(&(len as u32).to_le_bytes());
            v.extend_from_slice(&(len as u32).to_le_bytes());
            v.resize(v.len() + len, 0xaa);
        }
        v
    }

    fn replay(sink: Recorder, data: &[u8]) -> (Recorder, Result<ReplayStats, Error>) {
        let mut engine = ReplayEngine::new(sink, &Config::default());
        let mut input = data;
        let res = engine.run(&mut input);
        (engine.sink, res)
    }

    #[test]
    fn frames_in_file_order() {
        let (sink, res) = replay(Recorder::default(), &legacy_pcap(1, &[60, 1600, 42]));
        let stats = res.unwrap();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.blocks, 4);
        assert_eq!(sink.frames, vec![60, 1600, 42]);
        assert_eq!((sink.init, sink.teardown), (1, 1));
    }

    /// Reader returning at most 40 bytes per call
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.0.len()).min(40);
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn short_reads_are_refilled() {
        let data = legacy_pcap(1, &[60, 1600, 42]);
        let mut engine = ReplayEngine::new(Recorder::default(), &Config::default());
        let stats = engine.run(&mut Trickle(&data)).unwrap();
        assert_eq!(stats.frames, 3);
        assert_eq!(engine.sink().frames, vec![60, 1600, 42]);
    }

    #[test]
    fn other_link_types_are_skipped() {
        // LINKTYPE_RAW
        let (sink, res) = replay(Recorder::default(), &legacy_pcap(101, &[60, 60]));
        let stats = res.unwrap();
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.skipped, 2);
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn teardown_after_sink_error() {
        let sink = Recorder {
            fail_at: Some(1),
            ..Recorder::default()
        };
        let (sink, res) = replay(sink, &legacy_pcap(1, &[60, 70, 80]));
        assert!(res.is_err());
        assert_eq!(sink.frames, vec![60]);
        assert_eq!(sink.teardown, 1);
    }

    #[test]
    fn teardown_after_read_error() {
        let mut data = legacy_pcap(1, &[60]);
        // caplen far beyond the snaplen
        data.extend_from_slice(&[0; 8]);
        data.extend_from_slice(&0x7fff_0000u32.to_le_bytes());
        data.extend_from_slice(&60u32.to_le_bytes());
        data.resize(data.len() + 60, 0);
        let (sink, res) = replay(Recorder::default(), &data);
        assert_eq!(sink.frames, vec![60]);
        assert_eq!(sink.teardown, 1);
        // either rejected or reported as truncated, never fed to the sink
        if let Ok(stats) = res {
            assert_eq!(stats.frames, 1);
        }
    }
}
