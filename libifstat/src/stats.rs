//! Per-filter counter tables, replicated per execution context
//!
//! Each execution context (worker thread, core) owns one replica and is the
//! only writer of it, so the hot path never contends on a cache line with
//! another context. Slots are atomics only so that readers can take a
//! tear-free snapshot while writers are running. Summing replicas is done at
//! read time.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::bucket::{BucketIndex, BUCKET_LAST};
use crate::filter::{FilterId, FilterSet, MAX_FILTERS};

/// Plain copy of one filter's counter table
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    values: [u64; BUCKET_LAST],
}

impl Counters {
    pub fn from_array(values: [u64; BUCKET_LAST]) -> Self {
        Counters { values }
    }

    #[inline]
    pub fn get(&self, bucket: BucketIndex) -> u64 {
        self.values[bucket.index()]
    }

    pub fn packets(&self) -> u64 {
        self.get(BucketIndex::TotalPackets)
    }

    pub fn bytes(&self) -> u64 {
        self.get(BucketIndex::TotalBytes)
    }

    /// Add `other` into `self`, slot by slot
    pub fn merge(&mut self, other: &Counters) {
        for (a, b) in self.values.iter_mut().zip(other.values.iter()) {
            *a = a.wrapping_add(*b);
        }
    }

    /// Difference with an earlier read of the same table
    ///
    /// Counters only grow (modulo 2^64), so successive reads can be
    /// subtracted to get the activity of the interval.
    pub fn delta(&self, earlier: &Counters) -> Counters {
        let mut values = self.values;
        for (a, b) in values.iter_mut().zip(earlier.values.iter()) {
            *a = a.wrapping_sub(*b);
        }
        Counters { values }
    }
}

impl Serialize for Counters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(BUCKET_LAST))?;
        for b in BucketIndex::ALL {
            map.serialize_entry(b.label(), &self.get(b))?;
        }
        map.end()
    }
}

#[repr(align(64))]
struct FilterCounters {
    slots: [AtomicU64; BUCKET_LAST],
}

impl FilterCounters {
    fn new() -> Self {
        FilterCounters {
            slots: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    #[inline]
    fn add(&self, bucket: BucketIndex, value: u64) {
        self.slots[bucket.index()].fetch_add(value, Ordering::Relaxed);
    }

    fn load(&self) -> Counters {
        Counters {
            values: std::array::from_fn(|i| self.slots[i].load(Ordering::Relaxed)),
        }
    }
}

/// Counter replica of one execution context
///
/// Only enabled filters get a table.
pub struct ContextStats {
    filters: [Option<FilterCounters>; MAX_FILTERS],
}

impl ContextStats {
    fn new(filters: &FilterSet) -> Self {
        ContextStats {
            filters: std::array::from_fn(|i| {
                let id = FilterId::new(i).ok()?;
                filters.is_enabled(id).then(FilterCounters::new)
            }),
        }
    }

    /// Read the counters of `filter`, or `None` if the filter is disabled
    pub fn read(&self, filter: FilterId) -> Option<Counters> {
        self.filters[filter.index()].as_ref().map(FilterCounters::load)
    }

    pub fn snapshot(&self) -> MergedStats {
        MergedStats {
            filters: std::array::from_fn(|i| self.filters[i].as_ref().map(FilterCounters::load)),
        }
    }
}

/// Counters for all enabled filters, created zeroed for a `FilterSet`
pub struct StatsStore {
    contexts: Box<[ContextStats]>,
}

impl StatsStore {
    /// Create a zeroed store with `num_contexts` replicas (at least one)
    pub fn new(filters: &FilterSet, num_contexts: usize) -> Self {
        let contexts = (0..num_contexts.max(1))
            .map(|_| ContextStats::new(filters))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        StatsStore { contexts }
    }

    pub fn num_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Account one frame of `size` bytes in `bucket` for `filter`
    ///
    /// The size bucket, the packet total and the byte total are updated
    /// together on the replica of `context`. Context ids wrap around the
    /// number of replicas. Disabled filters are ignored.
    #[inline]
    pub fn increment(&self, context: usize, filter: FilterId, bucket: BucketIndex, size: u16) {
        let replica = &self.contexts[context % self.contexts.len()];
        if let Some(counters) = &replica.filters[filter.index()] {
            counters.add(bucket, 1);
            counters.add(BucketIndex::TotalPackets, 1);
            counters.add(BucketIndex::TotalBytes, u64::from(size));
        }
    }

    /// The replica of `context`, for per-context reads
    pub fn context(&self, context: usize) -> Option<&ContextStats> {
        self.contexts.get(context)
    }

    /// Sum of all replicas for `filter`, or `None` if the filter is disabled
    pub fn merged_filter(&self, filter: FilterId) -> Option<Counters> {
        let mut total: Option<Counters> = None;
        for ctx in self.contexts.iter() {
            if let Some(c) = ctx.read(filter) {
                total.get_or_insert_with(Counters::default).merge(&c);
            }
        }
        total
    }

    /// Sum of all replicas, for every enabled filter
    pub fn merged(&self) -> MergedStats {
        MergedStats {
            filters: std::array::from_fn(|i| {
                FilterId::new(i).ok().and_then(|id| self.merged_filter(id))
            }),
        }
    }
}

/// Snapshot of the counters of all enabled filters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergedStats {
    filters: [Option<Counters>; MAX_FILTERS],
}

impl MergedStats {
    pub fn get(&self, filter: FilterId) -> Option<&Counters> {
        self.filters[filter.index()].as_ref()
    }

    /// Enabled filters and their counters, in slot order
    pub fn iter(&self) -> impl Iterator<Item = (FilterId, &Counters)> {
        FilterId::all()
            .zip(self.filters.iter())
            .filter_map(|(id, c)| c.as_ref().map(|c| (id, c)))
    }

    /// Per-filter difference with an earlier snapshot
    ///
    /// Filters missing from `earlier` are returned unchanged.
    pub fn delta(&self, earlier: &MergedStats) -> MergedStats {
        MergedStats {
            filters: std::array::from_fn(|i| match (&self.filters[i], &earlier.filters[i]) {
                (Some(now), Some(before)) => Some(now.delta(before)),
                (now, _) => *now,
            }),
        }
    }
}

impl Serialize for MergedStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (id, counters) in self.iter() {
            map.serialize_entry(&id.to_string(), counters)?;
        }
        map.end()
    }
}
