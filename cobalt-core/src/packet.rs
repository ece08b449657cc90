use std::fmt::Debug;

use etherparse::{Ethernet2Header, IpEcn, Ipv4Header};

const ETHERNET_HEADER_LENGTH: usize = 14;
const IPV4_MIN_HEADER_LENGTH: usize = 20;
const IPV4_TOS_OFFSET: usize = 1;
const IPV4_CHECKSUM_OFFSET: usize = 10;

pub trait Packet: Debug + 'static + Send {
    fn from_raw_buffer(buf: &[u8]) -> Self;

    // Raw buffer length
    fn length(&self) -> usize;
    // Network layer length
    fn l3_length(&self) -> usize;
    fn as_slice(&self) -> &[u8];
    fn as_raw_buffer(&mut self) -> &mut [u8];
    fn ether_hdr(&self) -> Option<Ethernet2Header>;
    fn ip_hdr(&self) -> Option<Ipv4Header>;

    // Packet description
    fn desc(&self) -> String {
        String::new()
    }
}

/// An Ethernet frame held in an owned buffer.
#[derive(Clone, Debug)]
pub struct StdPacket {
    buf: Vec<u8>,
}

impl StdPacket {
    /// An Ethernet + IPv4 frame whose network layer spans `l3_length` bytes (at least the
    /// 20-byte IPv4 header) with the given ECN codepoint and a valid header checksum.
    pub fn synthetic_ipv4(ecn: IpEcn, l3_length: usize) -> Self {
        let l3_length = l3_length.clamp(IPV4_MIN_HEADER_LENGTH, u16::MAX as usize);
        let mut buf = vec![0u8; ETHERNET_HEADER_LENGTH + l3_length];
        buf[..6].copy_from_slice(&[0x38, 0x7e, 0x58, 0xe7, 0x87, 0x2b]);
        buf[6..12].copy_from_slice(&[0x38, 0x7e, 0x58, 0xe7, 0x87, 0x2a]);
        buf[12..14].copy_from_slice(&[0x08, 0x00]);

        let ip = &mut buf[ETHERNET_HEADER_LENGTH..];
        ip[0] = 0x45;
        ip[IPV4_TOS_OFFSET] = ecn.value();
        ip[2..4].copy_from_slice(&(l3_length as u16).to_be_bytes());
        ip[8] = 64; // ttl
        ip[9] = 17; // udp
        ip[12..16].copy_from_slice(&[192, 168, 1, 1]);
        ip[16..20].copy_from_slice(&[192, 168, 2, 2]);

        let mut packet = Self { buf };
        if let Some(header) = packet.ip_hdr() {
            let checksum = header.calc_header_checksum().to_be_bytes();
            packet.buf[ETHERNET_HEADER_LENGTH + IPV4_CHECKSUM_OFFSET
                ..ETHERNET_HEADER_LENGTH + IPV4_CHECKSUM_OFFSET + 2]
                .copy_from_slice(&checksum);
        }
        packet
    }
}

impl Packet for StdPacket {
    fn from_raw_buffer(buf: &[u8]) -> Self {
        Self { buf: buf.to_vec() }
    }

    fn length(&self) -> usize {
        self.buf.len()
    }

    fn l3_length(&self) -> usize {
        self.buf.len().saturating_sub(ETHERNET_HEADER_LENGTH)
    }

    fn as_slice(&self) -> &[u8] {
        self.buf.as_slice()
    }

    fn as_raw_buffer(&mut self) -> &mut [u8] {
        self.buf.as_mut_slice()
    }

    fn ether_hdr(&self) -> Option<Ethernet2Header> {
        Ethernet2Header::from_slice(self.buf.as_slice())
            .ok()
            .map(|(header, _)| header)
    }

    fn ip_hdr(&self) -> Option<Ipv4Header> {
        let (_, payload) = Ethernet2Header::from_slice(self.buf.as_slice()).ok()?;
        Ipv4Header::from_slice(payload)
            .ok()
            .map(|(header, _)| header)
    }

    fn desc(&self) -> String {
        match self.ip_hdr() {
            Some(header) => format!(
                "[IPv4] src: {:?} dst: {:?} ecn: {}",
                header.source,
                header.destination,
                header.ecn.value()
            ),
            None => "[Unknown]".to_string(),
        }
    }
}

/// ECN codepoint of the packet, Not-ECT when it has no IPv4 header.
pub fn classify<P: Packet>(packet: &P) -> IpEcn {
    match packet.ip_hdr() {
        Some(header) => header.ecn,
        None => IpEcn::ZERO,
    }
}

/// Set Congestion Experienced on an ECN-capable IPv4 packet, fixing up the header
/// checksum incrementally. Returns whether the packet now carries CE.
pub fn set_ce<P: Packet>(packet: &mut P) -> bool {
    if packet.ip_hdr().is_none() {
        return false; // No ip header, cannot change.
    }
    let ip_hdr_idx = if packet.ether_hdr().is_some() {
        ETHERNET_HEADER_LENGTH
    } else {
        0
    };
    let tos_idx = ip_hdr_idx + IPV4_TOS_OFFSET;
    let check_idx = ip_hdr_idx + IPV4_CHECKSUM_OFFSET;

    let buffer = packet.as_raw_buffer();
    let ecn = buffer[tos_idx].wrapping_add(1) & IpEcn::THREE.value();
    /*
     * After the last operation we have (in binary):
     * Not-ECT => 01
     * ECT(1)  => 10
     * ECT(0)  => 11
     * CE      => 00
     */
    if ecn & 2 == 0 {
        return ecn == 0;
    }

    /*
     * The following gives us:
     * ECT(1) => check += 0xFFFD
     * ECT(0) => check += 0xFFFE
     */
    buffer[tos_idx] |= IpEcn::THREE.value();

    let check_before = u16::from_be_bytes([buffer[check_idx], buffer[check_idx + 1]]);
    let sum = check_before as u32 + 0xFFFB + ecn as u32;
    let check_after = ((sum & 0xFFFF) + (sum >> 16)) as u16;
    buffer[check_idx..check_idx + 2].copy_from_slice(&check_after.to_be_bytes());
    true
}
