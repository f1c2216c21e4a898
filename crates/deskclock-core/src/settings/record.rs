//! On-flash layout of one settings namespace.
//!
//! ```text
//! magic "DKV1" | version | ns_len | ns | count | (key_len key val_len val)* | fnv1a32
//! ```
//!
//! Everything after the checksum stays erased (`0xFF`).

use heapless::Vec;

use super::{Key, MAX_ENTRIES, SettingsError, Value};

pub const RECORD_MAGIC: [u8; 4] = *b"DKV1";
pub const RECORD_VERSION: u8 = 1;
/// Upper bound of an encoded record, rounded up to whole flash words.
pub const RECORD_CAPACITY: usize = 768;

pub type Entries = Vec<(Key, Value), MAX_ENTRIES>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordError {
    Truncated,
    Checksum,
    Malformed,
}

/// Serializes `entries` into `out`, returning the encoded length.
pub fn encode(namespace: &str, entries: &Entries, out: &mut [u8]) -> Result<usize, SettingsError> {
    out.fill(0xFF);
    let mut cursor = Cursor { buf: out, pos: 0 };

    cursor.put(&RECORD_MAGIC)?;
    cursor.put(&[RECORD_VERSION])?;
    cursor.put_str(namespace)?;
    cursor.put(&[entries.len() as u8])?;
    for (key, value) in entries {
        cursor.put_str(key)?;
        cursor.put_str(value)?;
    }

    let body_len = cursor.pos;
    let checksum = checksum32(&cursor.buf[..body_len]);
    cursor.put(&checksum.to_le_bytes())?;
    Ok(cursor.pos)
}

/// Parses a raw record.
///
/// Returns `Ok(None)` for an erased sector or a record that belongs to some
/// other format or namespace.
pub fn decode(namespace: &str, raw: &[u8]) -> Result<Option<Entries>, RecordError> {
    if raw.iter().all(|b| *b == 0xFF) {
        return Ok(None);
    }
    if raw.len() < RECORD_MAGIC.len() + 1 || raw[..4] != RECORD_MAGIC {
        return Ok(None);
    }
    if raw[4] != RECORD_VERSION {
        return Ok(None);
    }

    let mut reader = Reader { buf: raw, pos: 5 };
    let stored_namespace = reader.take_str()?;
    let count = reader.take(1)?[0] as usize;
    if count > MAX_ENTRIES {
        return Err(RecordError::Malformed);
    }

    let mut entries = Entries::new();
    for _ in 0..count {
        let key = reader.take_str()?;
        let value = reader.take_str()?;
        let key = Key::try_from(key).map_err(|_| RecordError::Malformed)?;
        let value = Value::try_from(value).map_err(|_| RecordError::Malformed)?;
        entries
            .push((key, value))
            .map_err(|_| RecordError::Malformed)?;
    }

    let body_len = reader.pos;
    let stored = reader.take(4)?;
    let expected = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
    if checksum32(&raw[..body_len]) != expected {
        return Err(RecordError::Checksum);
    }

    if stored_namespace != namespace {
        return Ok(None);
    }
    Ok(Some(entries))
}

pub fn checksum32(bytes: &[u8]) -> u32 {
    let mut hash = 0x811C9DC5u32;
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

struct Cursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn put(&mut self, bytes: &[u8]) -> Result<(), SettingsError> {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            return Err(SettingsError::RecordFull);
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn put_str(&mut self, text: &str) -> Result<(), SettingsError> {
        let len = u8::try_from(text.len()).map_err(|_| SettingsError::ValueTooLong)?;
        self.put(&[len])?;
        self.put(text.as_bytes())
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], RecordError> {
        let end = self.pos + len;
        let bytes = self.buf.get(self.pos..end).ok_or(RecordError::Truncated)?;
        self.pos = end;
        Ok(bytes)
    }

    fn take_str(&mut self) -> Result<&'a str, RecordError> {
        let len = self.take(1)?[0] as usize;
        let bytes = self.take(len)?;
        core::str::from_utf8(bytes).map_err(|_| RecordError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> Entries {
        let mut out = Entries::new();
        for (k, v) in pairs {
            out.push((Key::try_from(*k).unwrap(), Value::try_from(*v).unwrap()))
                .unwrap();
        }
        out
    }

    #[test]
    fn erased_sector_is_empty() {
        let raw = [0xFFu8; RECORD_CAPACITY];
        assert_eq!(decode("storage", &raw), Ok(None));
    }

    #[test]
    fn foreign_magic_is_ignored() {
        let mut raw = [0xFFu8; RECORD_CAPACITY];
        raw[..4].copy_from_slice(b"RDS1");
        assert_eq!(decode("storage", &raw), Ok(None));
    }

    #[test]
    fn encoded_record_decodes_for_own_namespace_only() {
        let stored = entries(&[("devicename", "kitchen"), ("timezone", "Europe/Paris")]);
        let mut raw = [0u8; RECORD_CAPACITY];
        let len = encode("storage", &stored, &mut raw).unwrap();
        assert!(raw[len..].iter().all(|b| *b == 0xFF));

        assert_eq!(decode("storage", &raw), Ok(Some(stored)));
        assert_eq!(decode("other", &raw), Ok(None));
    }

    #[test]
    fn flipped_bit_fails_checksum() {
        let stored = entries(&[("timezone", "Europe/Berlin")]);
        let mut raw = [0u8; RECORD_CAPACITY];
        encode("storage", &stored, &mut raw).unwrap();
        raw[20] ^= 0x01;
        assert_eq!(decode("storage", &raw), Err(RecordError::Checksum));
    }

    #[test]
    fn record_that_does_not_fit_is_rejected() {
        let stored = entries(&[("timezone", "Europe/Berlin")]);
        let mut raw = [0u8; 16];
        assert_eq!(
            encode("storage", &stored, &mut raw),
            Err(SettingsError::RecordFull)
        );
    }
}
