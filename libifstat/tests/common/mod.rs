#![allow(dead_code)]

use std::net::Ipv4Addr;

use pnet_packet::ethernet::{EtherType, EtherTypes, MutableEthernetPacket};
use pnet_packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet_packet::ipv4::MutableIpv4Packet;
use pnet_packet::tcp::MutableTcpPacket;
use pnet_packet::udp::MutableUdpPacket;

pub const ETH_LEN: usize = 14;
pub const IPV4_LEN: usize = 20;

/// Description of a test frame
#[derive(Clone, Copy, Debug)]
pub struct FrameBuilder {
    pub ethertype: EtherType,
    pub proto: IpNextHeaderProtocol,
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    /// Total frame length, headers included
    pub size: usize,
}

impl FrameBuilder {
    pub fn tcp(size: usize) -> Self {
        FrameBuilder {
            ethertype: EtherTypes::Ipv4,
            proto: IpNextHeaderProtocols::Tcp,
            src_ip: Ipv4Addr::new(192, 168, 1, 10),
            dst_ip: Ipv4Addr::new(10, 0, 0, 1),
            src_port: 50000,
            dst_port: 443,
            size,
        }
    }

    pub fn udp(size: usize) -> Self {
        FrameBuilder {
            proto: IpNextHeaderProtocols::Udp,
            src_port: 5353,
            dst_port: 53,
            ..FrameBuilder::tcp(size)
        }
    }

    pub fn icmp(size: usize) -> Self {
        FrameBuilder {
            proto: IpNextHeaderProtocols::Icmp,
            src_port: 0,
            dst_port: 0,
            ..FrameBuilder::tcp(size)
        }
    }

    pub fn arp(size: usize) -> Self {
        FrameBuilder {
            ethertype: EtherTypes::Arp,
            ..FrameBuilder::tcp(size)
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.size];
        {
            let mut eth = MutableEthernetPacket::new(&mut buf).expect("room for ethernet header");
            eth.set_ethertype(self.ethertype);
        }
        if self.ethertype != EtherTypes::Ipv4 {
            return buf;
        }
        {
            let mut ip = MutableIpv4Packet::new(&mut buf[ETH_LEN..]).expect("room for ipv4 header");
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length((self.size - ETH_LEN) as u16);
            ip.set_ttl(64);
            ip.set_next_level_protocol(self.proto);
            ip.set_source(self.src_ip);
            ip.set_destination(self.dst_ip);
        }
        let l4 = &mut buf[ETH_LEN + IPV4_LEN..];
        match self.proto {
            IpNextHeaderProtocols::Tcp => {
                let mut tcp = MutableTcpPacket::new(l4).expect("room for tcp header");
                tcp.set_source(self.src_port);
                tcp.set_destination(self.dst_port);
                tcp.set_data_offset(5);
            }
            IpNextHeaderProtocols::Udp => {
                let mut udp = MutableUdpPacket::new(l4).expect("room for udp header");
                udp.set_source(self.src_port);
                udp.set_destination(self.dst_port);
                udp.set_length((self.size - ETH_LEN - IPV4_LEN) as u16);
            }
            _ => {}
        }
        buf
    }
}
