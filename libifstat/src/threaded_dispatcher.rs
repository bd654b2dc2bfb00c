use std::hash::Hasher;
use std::sync::{Arc, Barrier};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use fnv::FnvHasher;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::filter::FilterSet;
use crate::frame::{ETHERNET_HEADER_LEN, TRANSPORT_OFFSET};
use crate::sink::FrameSink;
use crate::stats::StatsStore;

pub enum Job {
    Exit,
    Frame(Vec<u8>),
    Wait,
}

pub struct Worker {
    pub(crate) id: usize,
    pub(crate) handler: thread::JoinHandle<()>,
}

/// Dispatcher running one worker thread per execution context
///
/// Frames are copied to the queue of a worker chosen from their IPv4
/// addresses, so all frames between two hosts land on the same context. Each
/// worker only writes to its own counter replica.
pub struct ThreadedDispatcher {
    dispatcher: Arc<Dispatcher>,
    n_workers: usize,

    local_jobs: Vec<Sender<Job>>,
    workers: Vec<Worker>,
    barrier: Arc<Barrier>,
}

impl ThreadedDispatcher {
    /// Create a dispatcher with `num_threads` workers (from `config`, default: number of CPUs)
    pub fn new(filters: FilterSet, config: &Config) -> Self {
        let n_workers = config
            .get_usize("num_threads")
            .filter(|&n| n > 0)
            .unwrap_or_else(num_cpus::get);
        let dispatcher = Arc::new(Dispatcher::new(filters, n_workers));
        let barrier = Arc::new(Barrier::new(n_workers + 1));
        ThreadedDispatcher {
            dispatcher,
            n_workers,
            local_jobs: Vec::new(),
            workers: Vec::new(),
            barrier,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.n_workers
    }

    pub fn stats(&self) -> &StatsStore {
        self.dispatcher.stats()
    }

    /// Block until all frames queued so far have been accounted
    pub fn flush(&self) -> Result<(), Error> {
        if self.workers.is_empty() {
            return Ok(());
        }
        trace!("waiting for threads to finish processing");
        for (i, job) in self.local_jobs.iter().enumerate() {
            job.send(Job::Wait)
                .map_err(|_| Error::Worker(i, "job queue closed"))?;
        }
        self.barrier.wait();
        Ok(())
    }

    fn spawn_worker(&self, i: usize, r: Receiver<Job>) -> Result<Worker, Error> {
        let dispatcher = self.dispatcher.clone();
        let barrier = self.barrier.clone();
        let handler = thread::Builder::new()
            .name(format!("worker {}", i))
            .spawn(move || {
                let _span = tracing::debug_span!("worker", id = i).entered();
                debug!("worker thread {} starting", i);
                let mut frames = 0u64;
                while let Ok(msg) = r.recv() {
                    match msg {
                        Job::Exit => break,
                        Job::Frame(data) => {
                            dispatcher.dispatch(i, &data);
                            frames += 1;
                        }
                        Job::Wait => {
                            trace!("thread {}: waiting at barrier", i);
                            barrier.wait();
                        }
                    }
                }
                debug!("worker thread {} exiting after {} frames", i, frames);
            })?;
        Ok(Worker { id: i, handler })
    }
}

impl FrameSink for ThreadedDispatcher {
    fn init(&mut self) -> Result<(), Error> {
        if !self.workers.is_empty() {
            return Err(Error::Generic("workers already started"));
        }
        self.local_jobs.reserve(self.n_workers);
        for i in 0..self.n_workers {
            let (sender, receiver) = unbounded();
            match self.spawn_worker(i, receiver) {
                Ok(worker) => {
                    self.local_jobs.push(sender);
                    self.workers.push(worker);
                }
                Err(e) => {
                    // closing the queues stops the workers already started
                    self.local_jobs.clear();
                    for w in self.workers.drain(..) {
                        let _ = w.handler.join();
                    }
                    return Err(e);
                }
            }
        }
        debug!("{} workers started", self.n_workers);
        Ok(())
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        if self.local_jobs.is_empty() {
            return Err(Error::Generic("workers not started"));
        }
        let i = fan_out(frame, self.local_jobs.len());
        debug_assert!(i < self.local_jobs.len());
        self.local_jobs[i]
            .send(Job::Frame(frame.to_vec()))
            .map_err(|_| Error::Worker(i, "job queue closed"))
    }

    fn teardown(&mut self) {
        debug!("main: exit");
        if let Err(e) = self.flush() {
            warn!("could not synchronize workers: {}", e);
        }
        for job in self.local_jobs.iter() {
            let _ = job.send(Job::Exit);
        }
        while let Some(w) = self.workers.pop() {
            if w.handler.join().is_err() {
                warn!("worker {} panicked", w.id);
            }
        }
        self.local_jobs.clear();
        debug!("main: all workers ended");
    }
}

impl Drop for ThreadedDispatcher {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.teardown();
        }
    }
}

/// Pick a worker for `frame`, from the XOR of its IPv4 addresses
///
/// The XOR is symmetric, so both directions of a flow share a context.
/// Frames too short to carry an IPv4 header go to worker 0.
pub(crate) fn fan_out(frame: &[u8], n_workers: usize) -> usize {
    if n_workers <= 1 || frame.len() < TRANSPORT_OFFSET {
        return 0;
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    if ethertype != 0x0800 {
        return 0;
    }
    let ip = &frame[ETHERNET_HEADER_LEN..];
    let buf = [ip[12] ^ ip[16], ip[13] ^ ip[17], ip[14] ^ ip[18], ip[15] ^ ip[19]];
    let mut hasher = FnvHasher::default();
    hasher.write(&buf);
    (hasher.finish() % n_workers as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterId, FilterSpec};

    fn frame(src: [u8; 4], dst: [u8; 4]) -> Vec<u8> {
        let mut v = vec![0u8; 12];
        v.extend_from_slice(&[0x08, 0x00]);
        v.extend_from_slice(&[0x45, 0, 0, 28, 0, 0, 0, 0, 64, 17, 0, 0]);
        v.extend_from_slice(&src);
        v.extend_from_slice(&dst);
        v.extend_from_slice(&[0x13, 0x88, 0x13, 0x89, 0, 8, 0, 0]);
        v
    }

    #[test]
    fn fan_out_is_symmetric() {
        for n in 1..8 {
            for last in 0..32u8 {
                let a = frame([10, 0, 0, last], [192, 168, 1, 1]);
                let b = frame([192, 168, 1, 1], [10, 0, 0, last]);
                let i = fan_out(&a, n);
                assert!(i < n);
                assert_eq!(i, fan_out(&b, n));
            }
        }
    }

    #[test]
    fn fan_out_short_or_foreign() {
        assert_eq!(fan_out(&[0u8; 10], 4), 0);
        let mut arp = frame([1, 2, 3, 4], [5, 6, 7, 8]);
        arp[12] = 0x08;
        arp[13] = 0x06;
        assert_eq!(fan_out(&arp, 4), 0);
    }

    #[test]
    fn workers_account_all_frames() {
        let mut config = Config::default();
        config.set("num_threads", 4);
        let filters = FilterSet::from_specs(vec![FilterSpec::any()]).unwrap();
        let mut td = ThreadedDispatcher::new(filters, &config);
        assert_eq!(td.num_workers(), 4);
        td.init().unwrap();
        for last in 0..100u8 {
            td.handle_frame(&frame([10, 0, 0, last], [10, 0, 1, 1])).unwrap();
        }
        td.flush().unwrap();
        let id = FilterId::new(0).unwrap();
        let merged = td.stats().merged_filter(id).unwrap();
        assert_eq!(merged.packets(), 100);
        assert_eq!(merged.bytes(), 100 * 42);
        td.teardown();
        // per-context replicas add up to the merged total
        let per_ctx: u64 = (0..4)
            .map(|i| td.stats().context(i).unwrap().read(id).unwrap().packets())
            .sum();
        assert_eq!(per_ctx, 100);
    }

    #[test]
    fn frames_before_init_are_refused() {
        let mut td = ThreadedDispatcher::new(FilterSet::default(), &Config::default());
        assert!(td.handle_frame(&frame([1, 1, 1, 1], [2, 2, 2, 2])).is_err());
        assert!(td.num_workers() >= 1);
    }
}
