//! Multicast DNS host records: answers A queries for `<host>.local`.

pub const MDNS_PORT: u16 = 5353;
pub const MDNS_GROUP: [u8; 4] = [224, 0, 0, 251];
pub const MDNS_PACKET_MAX: usize = 512;

const LOCAL_DOMAIN: &str = "local";
const LABEL_MAX_LEN: usize = 63;
const RECORD_TTL_SECS: u32 = 120;
const HEADER_LEN: usize = 12;
const MAX_POINTER_HOPS: usize = 8;

const TYPE_A: u16 = 1;
const TYPE_ANY: u16 = 255;
const CLASS_IN: u16 = 1;
// top bit of the class is unicast-response in questions, cache-flush in answers
const CLASS_MASK: u16 = 0x7FFF;
const CACHE_FLUSH: u16 = 0x8000;

const FLAG_RESPONSE: u16 = 0x8000;
const FLAG_AUTHORITATIVE: u16 = 0x0400;
const OPCODE_MASK: u16 = 0x7800;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MdnsError {
    Truncated,
    NotAQuery,
    BadName,
    BadHost,
    BufferTooSmall,
}

/// Whether any question of `packet` asks for the A record of `<host>.local`.
pub fn asks_for_host(packet: &[u8], host: &str) -> Result<bool, MdnsError> {
    let header = packet.get(..HEADER_LEN).ok_or(MdnsError::Truncated)?;
    let flags = u16::from_be_bytes([header[2], header[3]]);
    if flags & (FLAG_RESPONSE | OPCODE_MASK) != 0 {
        return Err(MdnsError::NotAQuery);
    }

    let questions = u16::from_be_bytes([header[4], header[5]]);
    let mut pos = HEADER_LEN;
    let mut found = false;
    for _ in 0..questions {
        let (name_matches, next) = compare_name(packet, pos, host)?;
        let fields = packet.get(next..next + 4).ok_or(MdnsError::Truncated)?;
        let qtype = u16::from_be_bytes([fields[0], fields[1]]);
        let qclass = u16::from_be_bytes([fields[2], fields[3]]) & CLASS_MASK;
        found |= name_matches && (qtype == TYPE_A || qtype == TYPE_ANY) && qclass == CLASS_IN;
        pos = next + 4;
    }
    Ok(found)
}

/// Compares the name at `start` with `<host>.local`, following compression
/// pointers. Also returns the offset right after the name at `start`.
fn compare_name(packet: &[u8], start: usize, host: &str) -> Result<(bool, usize), MdnsError> {
    let mut expected = [host, LOCAL_DOMAIN].into_iter();
    let mut matches = true;
    let mut pos = start;
    let mut end = None;
    let mut hops = 0;

    loop {
        let len = *packet.get(pos).ok_or(MdnsError::Truncated)? as usize;
        match len & 0xC0 {
            0xC0 => {
                let low = *packet.get(pos + 1).ok_or(MdnsError::Truncated)? as usize;
                end.get_or_insert(pos + 2);
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(MdnsError::BadName);
                }
                pos = ((len & 0x3F) << 8) | low;
            }
            0x00 if len == 0 => {
                matches &= expected.next().is_none();
                return Ok((matches, end.unwrap_or(pos + 1)));
            }
            0x00 => {
                let label = packet
                    .get(pos + 1..pos + 1 + len)
                    .ok_or(MdnsError::Truncated)?;
                matches &= expected
                    .next()
                    .is_some_and(|want| want.as_bytes().eq_ignore_ascii_case(label));
                pos += 1 + len;
            }
            _ => return Err(MdnsError::BadName),
        }
    }
}

/// Writes a response carrying the A record of `<host>.local`. Used both for
/// unsolicited announcements and for answers.
pub fn write_host_record(host: &str, ipv4: [u8; 4], out: &mut [u8]) -> Result<usize, MdnsError> {
    if host.is_empty() || host.len() > LABEL_MAX_LEN {
        return Err(MdnsError::BadHost);
    }

    let mut writer = Writer { out, len: 0 };
    writer.put(&0u16.to_be_bytes())?;
    writer.put(&(FLAG_RESPONSE | FLAG_AUTHORITATIVE).to_be_bytes())?;
    // no questions, one answer
    writer.put(&[0, 0, 0, 1, 0, 0, 0, 0])?;
    for label in [host, LOCAL_DOMAIN] {
        writer.put(&[label.len() as u8])?;
        writer.put(label.as_bytes())?;
    }
    writer.put(&[0])?;
    writer.put(&TYPE_A.to_be_bytes())?;
    writer.put(&(CACHE_FLUSH | CLASS_IN).to_be_bytes())?;
    writer.put(&RECORD_TTL_SECS.to_be_bytes())?;
    writer.put(&4u16.to_be_bytes())?;
    writer.put(&ipv4)?;
    Ok(writer.len)
}

struct Writer<'a> {
    out: &'a mut [u8],
    len: usize,
}

impl Writer<'_> {
    fn put(&mut self, bytes: &[u8]) -> Result<(), MdnsError> {
        let end = self.len + bytes.len();
        self.out
            .get_mut(self.len..end)
            .ok_or(MdnsError::BufferTooSmall)?
            .copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Vec;

    fn header(questions: u8) -> Vec<u8, 256> {
        let mut packet = Vec::new();
        packet
            .extend_from_slice(&[0, 0, 0, 0, 0, questions, 0, 0, 0, 0, 0, 0])
            .unwrap();
        packet
    }

    fn push_question(packet: &mut Vec<u8, 256>, name: &[&str], qtype: u16) {
        for label in name {
            packet.push(label.len() as u8).unwrap();
            packet.extend_from_slice(label.as_bytes()).unwrap();
        }
        packet.push(0).unwrap();
        packet.extend_from_slice(&qtype.to_be_bytes()).unwrap();
        // unicast-response bit set, class IN
        packet.extend_from_slice(&[0x80, 0x01]).unwrap();
    }

    fn query(name: &[&str], qtype: u16) -> Vec<u8, 256> {
        let mut packet = header(1);
        push_question(&mut packet, name, qtype);
        packet
    }

    #[test]
    fn a_and_any_queries_for_the_host_match() {
        assert_eq!(asks_for_host(&query(&["kitchen", "local"], 1), "kitchen"), Ok(true));
        assert_eq!(asks_for_host(&query(&["Kitchen", "LOCAL"], 255), "kitchen"), Ok(true));
    }

    #[test]
    fn other_names_and_types_do_not_match() {
        assert_eq!(asks_for_host(&query(&["office", "local"], 1), "kitchen"), Ok(false));
        assert_eq!(asks_for_host(&query(&["kitchen", "local"], 28), "kitchen"), Ok(false));
        assert_eq!(
            asks_for_host(&query(&["kitchen", "local", "extra"], 1), "kitchen"),
            Ok(false)
        );
        assert_eq!(asks_for_host(&query(&["kitchen"], 1), "kitchen"), Ok(false));
    }

    #[test]
    fn any_matching_question_is_enough() {
        let mut packet = header(2);
        push_question(&mut packet, &["office", "local"], 1);
        push_question(&mut packet, &["kitchen", "local"], 1);
        assert_eq!(asks_for_host(&packet, "kitchen"), Ok(true));
    }

    #[test]
    fn compressed_names_are_followed() {
        let mut packet = header(2);
        push_question(&mut packet, &["office", "local"], 1);
        // "kitchen" + pointer to "local" of the first question at offset 19
        packet.push(7).unwrap();
        packet.extend_from_slice(b"kitchen").unwrap();
        packet.extend_from_slice(&[0xC0, 19, 0, 1, 0, 1]).unwrap();
        assert_eq!(asks_for_host(&packet, "kitchen"), Ok(true));
    }

    #[test]
    fn malformed_packets_are_rejected() {
        assert_eq!(asks_for_host(&[0u8; 5], "kitchen"), Err(MdnsError::Truncated));

        let mut response = query(&["kitchen", "local"], 1);
        response[2] = 0x84;
        assert_eq!(asks_for_host(&response, "kitchen"), Err(MdnsError::NotAQuery));

        let looping = [0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0xC0, 12, 0, 1, 0, 1];
        assert_eq!(asks_for_host(&looping, "kitchen"), Err(MdnsError::BadName));

        let mut cut = query(&["kitchen", "local"], 1);
        cut.truncate(cut.len() - 3);
        assert_eq!(asks_for_host(&cut, "kitchen"), Err(MdnsError::Truncated));
    }

    #[test]
    fn host_record_layout() {
        let mut out = [0u8; MDNS_PACKET_MAX];
        let len = write_host_record("kitchen", [192, 168, 0, 5], &mut out).unwrap();
        let packet = &out[..len];

        assert_eq!(&packet[..12], &[0, 0, 0x84, 0, 0, 0, 0, 1, 0, 0, 0, 0]);
        assert_eq!(&packet[12..27], b"\x07kitchen\x05local\x00");
        assert_eq!(
            &packet[27..],
            &[0, 1, 0x80, 1, 0, 0, 0, 120, 0, 4, 192, 168, 0, 5]
        );
    }

    #[test]
    fn host_record_needs_a_valid_label_and_room() {
        let mut out = [0u8; MDNS_PACKET_MAX];
        assert_eq!(write_host_record("", [10, 0, 0, 1], &mut out), Err(MdnsError::BadHost));

        let mut small = [0u8; 20];
        assert_eq!(
            write_host_record("kitchen", [10, 0, 0, 1], &mut small),
            Err(MdnsError::BufferTooSmall)
        );
    }
}
