//! Ethernet/IPv4 frame parsing
//!
//! Only the minimal layout is understood: an untagged Ethernet header, an IPv4
//! header without options and a TCP or UDP header right after it. All offsets
//! are fixed. Every header view is built from a sub-slice of the frame, and
//! `pnet_packet` refuses to build a view over a slice shorter than the header,
//! so no field is ever read past the end of the frame.

use std::net::Ipv4Addr;

use pnet_packet::ethernet::{EtherTypes, EthernetPacket};
use pnet_packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::tcp::TcpPacket;
use pnet_packet::udp::UdpPacket;

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
/// Offset of the transport header. IPv4 options are not supported.
pub const TRANSPORT_OFFSET: usize = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN;

/// Normalized view of a TCP or UDP frame
///
/// Addresses and ports are decoded from network byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlowDescriptor {
    pub src_port: u16,
    pub dst_port: u16,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub ip_proto: IpNextHeaderProtocol,
    /// Length of the whole frame, Ethernet header included
    pub size: u16,
}

/// Whether `proto` is one of the transport protocols the classifier tracks
#[inline]
pub fn is_tracked_protocol(proto: IpNextHeaderProtocol) -> bool {
    proto == IpNextHeaderProtocols::Tcp || proto == IpNextHeaderProtocols::Udp
}

/// Frame length, saturated to 16 bits
#[inline]
pub fn frame_size(frame: &[u8]) -> u16 {
    u16::try_from(frame.len()).unwrap_or(u16::MAX)
}

/// Extract a `FlowDescriptor` from a raw Ethernet frame
///
/// Returns `None` if the frame is not IPv4, is too short to hold the
/// Ethernet, IPv4 and transport headers, or does not carry TCP or UDP.
pub fn parse(frame: &[u8]) -> Option<FlowDescriptor> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }
    let ipv4 = Ipv4Packet::new(frame.get(ETHERNET_HEADER_LEN..)?)?;
    let ip_proto = ipv4.get_next_level_protocol();
    let transport = frame.get(TRANSPORT_OFFSET..)?;
    let (src_port, dst_port) = match ip_proto {
        IpNextHeaderProtocols::Tcp => {
            let tcp = TcpPacket::new(transport)?;
            (tcp.get_source(), tcp.get_destination())
        }
        IpNextHeaderProtocols::Udp => {
            let udp = UdpPacket::new(transport)?;
            (udp.get_source(), udp.get_destination())
        }
        _ => return None,
    };
    Some(FlowDescriptor {
        src_port,
        dst_port,
        src_ip: ipv4.get_source(),
        dst_ip: ipv4.get_destination(),
        ip_proto,
        size: frame_size(frame),
    })
}
