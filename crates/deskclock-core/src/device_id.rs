//! Device identity used as display name and DHCP host name.

use core::fmt::Write;

use heapless::String;

pub const DEVICE_NAME_MAX_LEN: usize = 32;
const ID_PREFIX: &str = "clock-";

pub type DeviceName = String<DEVICE_NAME_MAX_LEN>;

/// Builds `clock-xxyyzz` from the last three bytes of the station MAC.
pub fn generate(mac: [u8; 6]) -> DeviceName {
    let mut name = DeviceName::new();
    let _ = name.push_str(ID_PREFIX);
    for byte in &mac[3..] {
        let _ = write!(name, "{:02x}", byte);
    }
    name
}

/// Reduces a free-form device name to a valid host name label.
///
/// Returns `None` when nothing usable is left.
pub fn sanitize_hostname(name: &str) -> Option<DeviceName> {
    let mut out = DeviceName::new();
    let mut last_dash = true;

    for ch in name.chars() {
        let mapped = match ch {
            'a'..='z' | '0'..='9' => ch,
            'A'..='Z' => ch.to_ascii_lowercase(),
            ' ' | '-' | '_' | '.' => '-',
            _ => continue,
        };
        if mapped == '-' {
            if last_dash {
                continue;
            }
            last_dash = true;
        } else {
            last_dash = false;
        }
        if out.push(mapped).is_err() {
            break;
        }
    }

    while out.ends_with('-') {
        out.pop();
    }

    if out.is_empty() { None } else { Some(out) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_id_uses_mac_suffix() {
        let id = generate([0x24, 0x6f, 0x28, 0xA1, 0x0b, 0xFF]);
        assert_eq!(id.as_str(), "clock-a10bff");
    }

    #[test]
    fn hostname_is_lowercased_and_dashed() {
        let name = sanitize_hostname("Kitchen Clock_2").unwrap();
        assert_eq!(name.as_str(), "kitchen-clock-2");
    }

    #[test]
    fn hostname_drops_invalid_and_edge_dashes() {
        let name = sanitize_hostname("--Büro  Uhr!--").unwrap();
        assert_eq!(name.as_str(), "bro-uhr");
        assert_eq!(sanitize_hostname("!!!"), None);
    }
}
