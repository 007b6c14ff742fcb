//! Wire-format decoding for the packets the queue worker hands to the
//! decision engine: an IPv4+UDP header strip, followed by a DNS message
//! parse limited to what the router needs (questions are drained and
//! discarded, only A and CNAME answers are kept).

mod dns;
mod ipv4udp;

pub use dns::parse_dns_answer;
pub use ipv4udp::extract_udp_payload;
