//! Per-filter packet size histograms for Ethernet/IPv4 traffic
//!
//! Every frame goes through [`Dispatcher::dispatch`]: it is parsed into a
//! [`FlowDescriptor`], tested against each enabled [`FilterSpec`], and counted
//! in the [`StatsStore`] of every matching filter. Frames are never dropped or
//! modified.

#[macro_use]
extern crate log;

pub mod bucket;
mod config;
mod dispatcher;
mod error;
pub mod filter;
pub mod frame;
mod sink;
pub mod stats;
mod threaded_dispatcher;

pub use bucket::{classify, BucketIndex, BUCKET_LAST, SIZE_BUCKETS};
pub use config::*;
pub use dispatcher::*;
pub use error::*;
pub use filter::{FilterId, FilterSet, FilterSpec, Match, MAX_FILTERS};
pub use frame::FlowDescriptor;
pub use sink::*;
pub use stats::{ContextStats, Counters, MergedStats, StatsStore};
pub use threaded_dispatcher::*;
