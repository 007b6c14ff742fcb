use std::collections::HashMap;
use std::net::Ipv4Addr;

use anyhow::{Result, bail};

const TYPE_A: u16 = 1;
const TYPE_CNAME: u16 = 5;
const MAX_NAME_JUMPS: u8 = 16;

/// Parses a DNS message's answer section into `name -> [Ipv4Addr]`.
///
/// CNAME aliases are propagated one hop: if `alias` has a CNAME pointing at
/// `owner` and `owner` has an A record, the resolved addresses are
/// attributed to both names. Deeper chains are not followed — see the
/// design notes on why that bound is accepted. Any parse error yields an
/// empty map; the caller treats that as "no decision material", not a hard
/// failure.
pub fn parse_dns_answer(payload: &[u8]) -> HashMap<String, Vec<Ipv4Addr>> {
    parse_inner(payload).unwrap_or_default()
}

struct Record {
    name: String,
    rtype: u16,
    rdata_start: usize,
    rdata_len: usize,
}

fn parse_inner(payload: &[u8]) -> Result<HashMap<String, Vec<Ipv4Addr>>> {
    if payload.len() < 12 {
        bail!("dns message too short for header");
    }
    let qdcount = u16::from_be_bytes([payload[4], payload[5]]);
    let ancount = u16::from_be_bytes([payload[6], payload[7]]);

    let mut cursor = 12usize;
    for _ in 0..qdcount {
        cursor = skip_name(payload, cursor)?;
        if payload.len() < cursor + 4 {
            bail!("truncated question");
        }
        cursor += 4; // qtype + qclass
    }

    let mut records = Vec::with_capacity(ancount as usize);
    for _ in 0..ancount {
        let (name, next) = read_name(payload, cursor)?;
        cursor = next;
        if payload.len() < cursor + 10 {
            bail!("truncated answer record");
        }
        let rtype = u16::from_be_bytes([payload[cursor], payload[cursor + 1]]);
        let rdlength = u16::from_be_bytes([payload[cursor + 8], payload[cursor + 9]]) as usize;
        cursor += 10;
        if payload.len() < cursor + rdlength {
            bail!("truncated rdata");
        }
        records.push(Record {
            name: name.to_ascii_lowercase(),
            rtype,
            rdata_start: cursor,
            rdata_len: rdlength,
        });
        cursor += rdlength;
    }

    let mut cname_map: HashMap<String, String> = HashMap::new();
    for rec in &records {
        if rec.rtype == TYPE_CNAME {
            let (target, _) = read_name(payload, rec.rdata_start)?;
            cname_map.insert(rec.name.clone(), target.to_ascii_lowercase());
        }
    }

    let mut result: HashMap<String, Vec<Ipv4Addr>> = HashMap::new();
    for rec in &records {
        if rec.rtype != TYPE_A || rec.rdata_len != 4 {
            continue;
        }
        let bytes = &payload[rec.rdata_start..rec.rdata_start + 4];
        let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);

        result.entry(rec.name.clone()).or_default().push(ip);
        for (alias, target) in &cname_map {
            if target == &rec.name {
                result.entry(alias.clone()).or_default().push(ip);
            }
        }
    }

    Ok(result)
}

/// Reads a (possibly compressed) domain name starting at `pos`, returning
/// the decoded name and the cursor position immediately past it in the
/// *original* stream (pointer targets do not advance that position).
fn read_name(payload: &[u8], pos: usize) -> Result<(String, usize)> {
    let mut labels = Vec::new();
    let mut cursor = pos;
    let mut end_cursor: Option<usize> = None;
    let mut jumps = 0u8;

    loop {
        if cursor >= payload.len() {
            bail!("name runs past end of message");
        }
        let len = payload[cursor];
        if len == 0 {
            cursor += 1;
            if end_cursor.is_none() {
                end_cursor = Some(cursor);
            }
            break;
        }
        if len & 0xC0 == 0xC0 {
            if cursor + 1 >= payload.len() {
                bail!("truncated compression pointer");
            }
            if end_cursor.is_none() {
                end_cursor = Some(cursor + 2);
            }
            jumps += 1;
            if jumps > MAX_NAME_JUMPS {
                bail!("too many compression pointer jumps");
            }
            let offset = (((len & 0x3F) as usize) << 8) | payload[cursor + 1] as usize;
            cursor = offset;
            continue;
        }
        let len = len as usize;
        let start = cursor + 1;
        let stop = start + len;
        if payload.len() < stop {
            bail!("label runs past end of message");
        }
        labels.push(std::str::from_utf8(&payload[start..stop])?.to_string());
        cursor = stop;
    }

    Ok((labels.join("."), end_cursor.unwrap_or(cursor)))
}

fn skip_name(payload: &[u8], pos: usize) -> Result<usize> {
    let (_, next) = read_name(payload, pos)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(s: &str) -> Vec<u8> {
        let mut out = vec![s.len() as u8];
        out.extend_from_slice(s.as_bytes());
        out
    }

    fn name_bytes(labels: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        for l in labels {
            out.extend(label(l));
        }
        out.push(0);
        out
    }

    fn header(ancount: u16) -> Vec<u8> {
        let mut h = vec![0u8; 12];
        h[6..8].copy_from_slice(&ancount.to_be_bytes());
        h
    }

    #[test]
    fn parses_single_a_record() {
        let mut msg = header(1);
        msg.extend(name_bytes(&["example", "com"]));
        msg.extend(&TYPE_A.to_be_bytes());
        msg.extend(&1u16.to_be_bytes()); // class IN
        msg.extend(&0u32.to_be_bytes()); // ttl
        msg.extend(&4u16.to_be_bytes()); // rdlength
        msg.extend(&[93, 184, 216, 34]);

        let result = parse_dns_answer(&msg);
        assert_eq!(
            result.get("example.com"),
            Some(&vec![Ipv4Addr::new(93, 184, 216, 34)])
        );
    }

    #[test]
    fn propagates_a_record_to_direct_cname_alias() {
        let mut msg = header(2);

        // CNAME: alias.example -> example.com
        msg.extend(name_bytes(&["alias", "example"]));
        msg.extend(&TYPE_CNAME.to_be_bytes());
        msg.extend(&1u16.to_be_bytes());
        msg.extend(&0u32.to_be_bytes());
        let target = name_bytes(&["example", "com"]);
        msg.extend(&(target.len() as u16).to_be_bytes());
        msg.extend(&target);

        // A: example.com -> 10.0.0.1
        msg.extend(name_bytes(&["example", "com"]));
        msg.extend(&TYPE_A.to_be_bytes());
        msg.extend(&1u16.to_be_bytes());
        msg.extend(&0u32.to_be_bytes());
        msg.extend(&4u16.to_be_bytes());
        msg.extend(&[10, 0, 0, 1]);

        let result = parse_dns_answer(&msg);
        assert_eq!(result.get("example.com"), Some(&vec![Ipv4Addr::new(10, 0, 0, 1)]));
        assert_eq!(result.get("alias.example"), Some(&vec![Ipv4Addr::new(10, 0, 0, 1)]));
    }

    #[test]
    fn malformed_message_yields_empty_map() {
        let result = parse_dns_answer(&[0u8; 4]);
        assert!(result.is_empty());
    }

    #[test]
    fn ignores_aaaa_and_other_types() {
        let mut msg = header(1);
        msg.extend(name_bytes(&["example", "com"]));
        msg.extend(&28u16.to_be_bytes()); // AAAA
        msg.extend(&1u16.to_be_bytes());
        msg.extend(&0u32.to_be_bytes());
        msg.extend(&16u16.to_be_bytes());
        msg.extend(&[0u8; 16]);

        let result = parse_dns_answer(&msg);
        assert!(result.is_empty());
    }
}
