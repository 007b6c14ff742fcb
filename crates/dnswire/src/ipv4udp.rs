use anyhow::{Result, anyhow, bail};

const UDP_PROTO: u8 = 17;
const DNS_SRC_PORT: u16 = 53;

/// Strips the IPv4 and UDP headers from a raw datagram captured off the
/// queue, returning the DNS payload. Rejects anything that is not a UDP
/// datagram sourced from port 53 (mirrors `extractUdpPayload` in the
/// implementation this was derived from).
pub fn extract_udp_payload(packet: &[u8]) -> Result<&[u8]> {
    if packet.len() < 20 {
        bail!("packet too short for an IPv4 header");
    }
    let version = packet[0] >> 4;
    if version != 4 {
        bail!("not an IPv4 packet");
    }
    let ihl = (packet[0] & 0x0F) as usize;
    let ip_header_len = ihl * 4;
    if ip_header_len < 20 || packet.len() < ip_header_len {
        return Err(anyhow!("invalid IPv4 header length"));
    }

    let protocol = packet[9];
    if protocol != UDP_PROTO {
        bail!("not a UDP packet");
    }

    if packet.len() < ip_header_len + 8 {
        bail!("packet too short for a UDP header");
    }
    let udp = &packet[ip_header_len..];
    let src_port = u16::from_be_bytes([udp[0], udp[1]]);
    let udp_length = u16::from_be_bytes([udp[4], udp[5]]) as usize;

    if packet.len() < ip_header_len + udp_length {
        bail!("packet too short for its declared UDP payload");
    }
    if src_port != DNS_SRC_PORT {
        bail!("not a DNS response: source port {src_port} != 53");
    }

    Ok(&packet[ip_header_len + 8..ip_header_len + udp_length])
}
