//! Flow filters
//!
//! A filter is a set of field constraints, each of which can be a wildcard.
//! Up to `MAX_FILTERS` filters are configured at once, each in its own slot.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use pnet_packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};

use crate::config::Config;
use crate::error::Error;
use crate::frame::{is_tracked_protocol, FlowDescriptor};

/// Number of filter slots
pub const MAX_FILTERS: usize = 5;

/// Filter slot number, in `0..MAX_FILTERS`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(u8);

impl FilterId {
    pub fn new(slot: usize) -> Result<FilterId, Error> {
        if slot < MAX_FILTERS {
            Ok(FilterId(slot as u8))
        } else {
            Err(Error::InvalidFilterSlot(slot))
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn all() -> impl Iterator<Item = FilterId> {
        (0..MAX_FILTERS as u8).map(FilterId)
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "filter{}", self.0)
    }
}

/// Constraint on a single field: either a literal value, or `Any`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Match<T> {
    Any,
    Exact(T),
}

impl<T> Default for Match<T> {
    fn default() -> Self {
        Match::Any
    }
}

impl<T: PartialEq> Match<T> {
    #[inline]
    pub fn accepts(&self, value: &T) -> bool {
        match self {
            Match::Any => true,
            Match::Exact(v) => v == value,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Match<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Match::Any => f.write_str("any"),
            Match::Exact(v) => v.fmt(f),
        }
    }
}

/// Match rule for one filter slot
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterSpec {
    pub enabled: bool,
    pub src_port: Match<u16>,
    pub dst_port: Match<u16>,
    pub src_ip: Match<Ipv4Addr>,
    pub dst_ip: Match<Ipv4Addr>,
    /// `Any` restricts matches to TCP and UDP, not to every protocol
    pub ip_proto: Match<IpNextHeaderProtocol>,
}

impl FilterSpec {
    /// An enabled filter matching every TCP and UDP flow
    pub fn any() -> Self {
        FilterSpec {
            enabled: true,
            ..FilterSpec::default()
        }
    }

    /// Test `flow` against this rule. The `enabled` flag is not checked.
    pub fn matches(&self, flow: &FlowDescriptor) -> bool {
        matches(self, flow)
    }

    /// Read the rule for `slot` from `config`
    ///
    /// Both layouts are accepted: a `[filterN]` table with lowercase keys, or
    /// flat `FILTERN_*` keys. A missing field means any value, a missing
    /// `enabled` key means the slot is disabled.
    pub fn from_config(config: &Config, slot: FilterId) -> Result<FilterSpec, Error> {
        let lookup = |field: &str| lookup_field(config, slot, field);

        let enabled = match lookup("enabled") {
            None => false,
            Some((key, v)) => match config.get_bool(&key) {
                Some(b) => b,
                None => return Err(invalid(key, v)),
            },
        };
        let src_port = field_match(lookup("src_port"), parse_port)?;
        let dst_port = field_match(lookup("dst_port"), parse_port)?;
        let src_ip = field_match(lookup("src_ip"), parse_ipv4)?;
        let dst_ip = field_match(lookup("dst_ip"), parse_ipv4)?;
        let ip_proto = field_match(lookup("ipproto").or_else(|| lookup("ip_proto")), parse_proto)?;

        Ok(FilterSpec {
            enabled,
            src_port,
            dst_port,
            src_ip,
            dst_ip,
            ip_proto,
        })
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let proto = match self.ip_proto {
            Match::Any => "tcp/udp".to_string(),
            Match::Exact(p) => p.0.to_string(),
        };
        write!(
            f,
            "proto {} {}:{} -> {}:{}",
            proto, self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

/// Test `flow` against `spec`
///
/// Gates are evaluated in order (protocol, addresses, ports) and the first
/// failing gate rejects the flow.
pub fn matches(spec: &FilterSpec, flow: &FlowDescriptor) -> bool {
    let proto_ok = match spec.ip_proto {
        Match::Any => is_tracked_protocol(flow.ip_proto),
        Match::Exact(p) => flow.ip_proto == p,
    };
    if !proto_ok {
        return false;
    }
    if !spec.src_ip.accepts(&flow.src_ip) || !spec.dst_ip.accepts(&flow.dst_ip) {
        return false;
    }
    spec.src_port.accepts(&flow.src_port) && spec.dst_port.accepts(&flow.dst_port)
}

/// The set of configured filters, fixed for the lifetime of a dispatcher
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterSet {
    slots: [FilterSpec; MAX_FILTERS],
}

impl FilterSet {
    pub fn new(slots: [FilterSpec; MAX_FILTERS]) -> Self {
        FilterSet { slots }
    }

    /// Build a set from a list of rules, assigned to slots in order
    ///
    /// Rules are stored as given, so a disabled rule takes a slot too.
    pub fn from_specs<I>(specs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = FilterSpec>,
    {
        let mut set = FilterSet::default();
        for (i, spec) in specs.into_iter().enumerate() {
            let id = FilterId::new(i)?;
            set.slots[id.index()] = spec;
        }
        Ok(set)
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let mut set = FilterSet::default();
        for id in FilterId::all() {
            let spec = FilterSpec::from_config(config, id)?;
            if spec.enabled {
                debug!("{}: {}", id, spec);
            }
            set.slots[id.index()] = spec;
        }
        Ok(set)
    }

    pub fn get(&self, id: FilterId) -> &FilterSpec {
        &self.slots[id.index()]
    }

    /// Enabled filters, in slot order
    pub fn enabled(&self) -> impl Iterator<Item = (FilterId, &FilterSpec)> {
        FilterId::all()
            .zip(self.slots.iter())
            .filter(|(_, spec)| spec.enabled)
    }

    pub fn is_enabled(&self, id: FilterId) -> bool {
        self.slots[id.index()].enabled
    }

    pub fn num_enabled(&self) -> usize {
        self.slots.iter().filter(|s| s.enabled).count()
    }
}

fn lookup_field<'a>(
    config: &'a Config,
    slot: FilterId,
    field: &str,
) -> Option<(String, &'a toml::Value)> {
    let nested = format!("filter{}.{}", slot.index(), field);
    if let Some(v) = config.get_value(&nested) {
        return Some((nested, v));
    }
    let flat = format!("FILTER{}_{}", slot.index(), field.to_ascii_uppercase());
    config.get_value(&flat).map(|v| (flat, v))
}

fn invalid(key: String, v: &toml::Value) -> Error {
    Error::InvalidFilterValue {
        key,
        value: v.to_string(),
    }
}

/// `-1`, `"any"` and `"*"` are wildcards, anything else goes through `parse`
fn field_match<T>(
    entry: Option<(String, &toml::Value)>,
    parse: fn(&toml::Value) -> Option<T>,
) -> Result<Match<T>, Error> {
    let (key, value) = match entry {
        None => return Ok(Match::Any),
        Some(e) => e,
    };
    match value {
        toml::Value::Integer(-1) => Ok(Match::Any),
        toml::Value::String(s) if s.eq_ignore_ascii_case("any") || s == "*" => Ok(Match::Any),
        v => parse(v).map(Match::Exact).ok_or_else(|| invalid(key, v)),
    }
}

fn parse_port(v: &toml::Value) -> Option<u16> {
    match v {
        toml::Value::Integer(i) => u16::try_from(*i).ok(),
        toml::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn parse_ipv4(v: &toml::Value) -> Option<Ipv4Addr> {
    match v {
        toml::Value::String(s) => Ipv4Addr::from_str(s).ok(),
        // host-order integer, as used by the flat FILTERN_ keys
        toml::Value::Integer(i) => u32::try_from(*i).ok().map(Ipv4Addr::from),
        _ => None,
    }
}

fn parse_proto(v: &toml::Value) -> Option<IpNextHeaderProtocol> {
    match v {
        toml::Value::Integer(i) => u8::try_from(*i).ok().map(IpNextHeaderProtocol::new),
        toml::Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "tcp" => Some(IpNextHeaderProtocols::Tcp),
            "udp" => Some(IpNextHeaderProtocols::Udp),
            "icmp" => Some(IpNextHeaderProtocols::Icmp),
            other => other.parse().ok().map(IpNextHeaderProtocol::new),
        },
        _ => None,
    }
}
