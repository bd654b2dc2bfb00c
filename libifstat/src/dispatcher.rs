use crate::bucket::classify;
use crate::error::Error;
use crate::filter::FilterSet;
use crate::frame;
use crate::sink::FrameSink;
use crate::stats::StatsStore;

/// Decision returned for every frame
///
/// The classifier only observes traffic, so frames are always let through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
}

/// Outcome of the analysis of one frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    /// Not IPv4, not TCP/UDP, or truncated: nothing was counted
    DropAnalysis,
    /// Parsed, and counted for `matched` filters (possibly none)
    Processed { matched: usize },
}

/// Per-frame entry point: parse, match every enabled filter, count
///
/// The filter set is fixed at construction. Counters are created zeroed with
/// one replica per execution context, and live as long as the dispatcher.
pub struct Dispatcher {
    filters: FilterSet,
    stats: StatsStore,
}

impl Dispatcher {
    pub fn new(filters: FilterSet, num_contexts: usize) -> Self {
        let stats = StatsStore::new(&filters, num_contexts);
        debug!(
            "dispatcher: {} filter(s) enabled, {} context(s)",
            filters.num_enabled(),
            stats.num_contexts()
        );
        Dispatcher { filters, stats }
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn stats(&self) -> &StatsStore {
        &self.stats
    }

    /// Analyze `frame` on execution context `context`
    ///
    /// Each enabled filter is evaluated independently, in slot order, so a
    /// frame may be counted by several filters.
    pub fn process(&self, context: usize, frame: &[u8]) -> DispatchState {
        let flow = match frame::parse(frame) {
            Some(flow) => flow,
            None => {
                trace!("ctx {}: frame of {} bytes skipped", context, frame.len());
                return DispatchState::DropAnalysis;
            }
        };
        let mut matched = 0;
        for (id, spec) in self.filters.enabled() {
            if spec.matches(&flow) {
                self.stats.increment(context, id, classify(flow.size), flow.size);
                matched += 1;
            }
        }
        trace!(
            "ctx {}: {}:{} -> {}:{} proto {} size {}: {} match(es)",
            context,
            flow.src_ip,
            flow.src_port,
            flow.dst_ip,
            flow.dst_port,
            flow.ip_proto.0,
            flow.size,
            matched
        );
        DispatchState::Processed { matched }
    }

    /// Analyze `frame` and return the verdict, which is always `Pass`
    #[inline]
    pub fn dispatch(&self, context: usize, frame: &[u8]) -> Verdict {
        let _ = self.process(context, frame);
        Verdict::Pass
    }
}

/// Single-context use: every frame is accounted on context 0
impl FrameSink for Dispatcher {
    fn handle_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        self.dispatch(0, frame);
        Ok(())
    }

    fn teardown(&mut self) {
        for (id, counters) in self.stats.merged().iter() {
            debug!(
                "{}: {} packets, {} bytes",
                id,
                counters.packets(),
                counters.bytes()
            );
        }
    }
}
