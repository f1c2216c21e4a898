//! Request parsing and routing for the configuration web server.

pub mod pages;

use core::fmt::{self, Write};

use heapless::{String, Vec};
use log::{error, warn};

use crate::{app::ConfigEvent, settings::WifiCredentials, update::UpdateKind};

pub use pages::{Page, PageContext};

pub const HTTP_PORT: u16 = 80;
pub const ROOT_PAGE: &str = "/_ac";

const MAX_FORM_FIELDS: usize = 8;

pub type FormKey = String<16>;
pub type FormValue = String<64>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HttpError {
    Incomplete,
    Malformed,
    UnsupportedMethod,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RequestHead<'a> {
    pub method: Method,
    pub path: &'a str,
    pub query: &'a str,
    pub content_length: Option<usize>,
    /// Bytes up to and including the blank line.
    pub head_len: usize,
}

/// Parses the request line and the headers we care about.
pub fn parse_head(buf: &[u8]) -> Result<RequestHead<'_>, HttpError> {
    let end = buf
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .ok_or(HttpError::Incomplete)?;
    let head = core::str::from_utf8(&buf[..end]).map_err(|_| HttpError::Malformed)?;

    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or(HttpError::Malformed)?;
    let mut parts = request_line.split_whitespace();
    let method = match parts.next() {
        Some("GET") => Method::Get,
        Some("POST") => Method::Post,
        Some(_) => return Err(HttpError::UnsupportedMethod),
        None => return Err(HttpError::Malformed),
    };
    let target = parts.next().ok_or(HttpError::Malformed)?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    let mut content_length = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("content-length") {
            let length = value
                .trim()
                .parse::<usize>()
                .map_err(|_| HttpError::Malformed)?;
            content_length = Some(length);
        }
    }

    Ok(RequestHead {
        method,
        path,
        query,
        content_length,
        head_len: end + 4,
    })
}

/// Decoded `application/x-www-form-urlencoded` parameters.
#[derive(Debug, Default)]
pub struct Form {
    fields: Vec<(FormKey, FormValue), MAX_FORM_FIELDS>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds all pairs of `encoded`. Later duplicates do not replace earlier ones.
    pub fn extend_from(&mut self, encoded: &str) {
        for pair in encoded.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let Some(key) = url_decode::<16>(key) else {
                continue;
            };
            let Some(value) = url_decode::<64>(value) else {
                warn!("[ConfigServer] value of '{}' is too long", key);
                continue;
            };
            if self.get(&key).is_some() {
                continue;
            }
            if self.fields.push((key, value)).is_err() {
                break;
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(stored, _)| stored.as_str() == key)
            .map(|(_, value)| value.as_str())
    }

    fn arg(&self, key: &str) -> Option<&str> {
        let value = self.get(key);
        if value.is_none() {
            error!("[ConfigServer] Error: arg '{}' not found in parameters", key);
        }
        value
    }
}

/// Percent-decodes into `N` bytes; `None` on overflow or invalid UTF-8.
/// A `%` not followed by two hex digits is kept as is.
fn url_decode<const N: usize>(encoded: &str) -> Option<String<N>> {
    let mut bytes = Vec::<u8, N>::new();
    let input = encoded.as_bytes();
    let mut pos = 0;

    while pos < input.len() {
        let (decoded, used) = match input[pos] {
            b'+' => (b' ', 1),
            b'%' => match (
                input.get(pos + 1).copied().and_then(hex_value),
                input.get(pos + 2).copied().and_then(hex_value),
            ) {
                (Some(hi), Some(lo)) => ((hi << 4) | lo, 3),
                _ => (b'%', 1),
            },
            other => (other, 1),
        };
        bytes.push(decoded).ok()?;
        pos += used;
    }

    String::from_utf8(bytes).ok()
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|digit| digit as u8)
}

/// What the server has to do with a request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigRequest {
    Redirect(&'static str),
    Page(Page),
    Apply {
        event: Option<ConfigEvent>,
        redirect: &'static str,
    },
    Upload(UpdateKind),
    NotFound,
}

/// Routes a request. `form` holds the query and, for posts, the body.
pub fn route(method: Method, path: &str, form: &Form) -> ConfigRequest {
    match (method, path) {
        (Method::Get, "/") => ConfigRequest::Redirect(ROOT_PAGE),
        (Method::Get, "/_ac") => ConfigRequest::Page(Page::Menu),
        (Method::Get, "/device") => ConfigRequest::Page(Page::Device),
        (Method::Get, "/timezone") => ConfigRequest::Page(Page::TimeZone),
        (Method::Get, "/factory_reset") => ConfigRequest::Page(Page::FactoryReset),
        (Method::Get, "/wifi") => ConfigRequest::Page(Page::Wifi),
        (Method::Get, "/update") => ConfigRequest::Page(Page::Update),
        (Method::Post, "/update") => match form.get("kind") {
            Some("filesystem") => ConfigRequest::Upload(UpdateKind::Filesystem),
            _ => ConfigRequest::Upload(UpdateKind::Firmware),
        },
        (_, "/device_set") => ConfigRequest::Apply {
            event: form
                .arg("devicename")
                .and_then(|name| bounded::<32>("devicename", name))
                .map(ConfigEvent::SetDeviceName),
            redirect: "/device",
        },
        (_, "/timezone_set") => ConfigRequest::Apply {
            event: form
                .arg("timezone")
                .and_then(|zone| bounded::<64>("timezone", zone.trim()))
                .map(ConfigEvent::SetTimeZone),
            redirect: "/timezone",
        },
        (_, "/factory_reset_set") => ConfigRequest::Apply {
            event: (form.arg("sure") == Some("true")).then_some(ConfigEvent::FactoryReset),
            redirect: "/factory_reset",
        },
        (_, "/wifi_set") => ConfigRequest::Apply {
            event: form.arg("ssid").and_then(|ssid| {
                let credentials =
                    WifiCredentials::new(ssid, form.get("password").unwrap_or(""));
                if credentials.is_none() {
                    warn!("[ConfigServer] rejected wifi credentials");
                }
                credentials.map(ConfigEvent::SetWifiCredentials)
            }),
            redirect: "/wifi",
        },
        _ => ConfigRequest::NotFound,
    }
}

fn bounded<const N: usize>(name: &str, value: &str) -> Option<String<N>> {
    if value.is_empty() {
        warn!("[ConfigServer] arg '{}' is empty", name);
        return None;
    }
    let bounded = String::try_from(value).ok();
    if bounded.is_none() {
        warn!("[ConfigServer] arg '{}' is too long", name);
    }
    bounded
}

/// `302 Found` without a body; the connection is closed afterwards.
pub fn write_redirect<W: Write>(out: &mut W, location: &str) -> fmt::Result {
    write!(
        out,
        "HTTP/1.1 302 Found\r\n\
         Location: {}\r\n\
         Content-Length: 0\r\n\
         Connection: close\r\n\
         \r\n",
        location
    )
}

pub fn write_status<W: Write>(out: &mut W, code: u16, reason: &str, body: &str) -> fmt::Result {
    write!(
        out,
        "HTTP/1.1 {} {}\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        code,
        reason,
        body.len(),
        body
    )
}

pub fn write_not_found<W: Write>(out: &mut W) -> fmt::Result {
    write_status(out, 404, "Not Found", "Not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device_id::DeviceName, settings::ZoneName};

    fn form(encoded: &str) -> Form {
        let mut form = Form::new();
        form.extend_from(encoded);
        form
    }

    #[test]
    fn head_with_query_and_length() {
        let raw = b"POST /device_set?x=1 HTTP/1.1\r\nHost: clock\r\nContent-Length: 17\r\n\r\ndevicename=kitch";
        let head = parse_head(raw).unwrap();
        assert_eq!(head.method, Method::Post);
        assert_eq!(head.path, "/device_set");
        assert_eq!(head.query, "x=1");
        assert_eq!(head.content_length, Some(17));
        assert_eq!(&raw[head.head_len..], b"devicename=kitch");
    }

    #[test]
    fn head_errors() {
        assert_eq!(parse_head(b"GET / HTTP/1.1\r\n"), Err(HttpError::Incomplete));
        assert_eq!(
            parse_head(b"DELETE / HTTP/1.1\r\n\r\n"),
            Err(HttpError::UnsupportedMethod)
        );
        assert_eq!(
            parse_head(b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n"),
            Err(HttpError::Malformed)
        );
    }

    #[test]
    fn form_values_are_percent_decoded() {
        let form = form("timezone=America%2FNew_York&devicename=Desk+Clock&empty");
        assert_eq!(form.get("timezone"), Some("America/New_York"));
        assert_eq!(form.get("devicename"), Some("Desk Clock"));
        assert_eq!(form.get("empty"), Some(""));
        assert_eq!(form.get("missing"), None);
    }

    #[test]
    fn multibyte_values_survive_decoding() {
        let form = form("devicename=B%C3%BCro");
        assert_eq!(form.get("devicename"), Some("Büro"));
    }

    #[test]
    fn malformed_escapes_are_kept_literally() {
        let form = form("devicename=100%25+%zz%4&ssid=50%");
        assert_eq!(form.get("devicename"), Some("100% %zz%4"));
        assert_eq!(form.get("ssid"), Some("50%"));
    }

    #[test]
    fn root_redirects_to_menu() {
        assert_eq!(
            route(Method::Get, "/", &Form::new()),
            ConfigRequest::Redirect("/_ac")
        );
    }

    #[test]
    fn device_name_is_applied() {
        let request = route(Method::Post, "/device_set", &form("devicename=kitchen"));
        assert_eq!(
            request,
            ConfigRequest::Apply {
                event: Some(ConfigEvent::SetDeviceName(
                    DeviceName::try_from("kitchen").unwrap()
                )),
                redirect: "/device",
            }
        );
    }

    #[test]
    fn missing_parameter_still_redirects() {
        for (path, redirect) in [
            ("/device_set", "/device"),
            ("/timezone_set", "/timezone"),
            ("/factory_reset_set", "/factory_reset"),
            ("/wifi_set", "/wifi"),
        ] {
            assert_eq!(
                route(Method::Post, path, &Form::new()),
                ConfigRequest::Apply {
                    event: None,
                    redirect,
                }
            );
        }
    }

    #[test]
    fn any_zone_name_is_accepted() {
        let request = route(Method::Get, "/timezone_set", &form("timezone=Not%2FAZone"));
        assert_eq!(
            request,
            ConfigRequest::Apply {
                event: Some(ConfigEvent::SetTimeZone(
                    ZoneName::try_from("Not/AZone").unwrap()
                )),
                redirect: "/timezone",
            }
        );
    }

    #[test]
    fn factory_reset_needs_sure_true() {
        let confirmed = route(Method::Post, "/factory_reset_set", &form("sure=true"));
        assert_eq!(
            confirmed,
            ConfigRequest::Apply {
                event: Some(ConfigEvent::FactoryReset),
                redirect: "/factory_reset",
            }
        );

        for body in ["sure=false", "sure=TRUE", "sure="] {
            let declined = route(Method::Post, "/factory_reset_set", &form(body));
            assert_eq!(
                declined,
                ConfigRequest::Apply {
                    event: None,
                    redirect: "/factory_reset",
                }
            );
        }
    }

    #[test]
    fn wifi_credentials_need_ssid() {
        let request = route(Method::Post, "/wifi_set", &form("ssid=home&password=p%40ss"));
        assert_eq!(
            request,
            ConfigRequest::Apply {
                event: WifiCredentials::new("home", "p@ss").map(ConfigEvent::SetWifiCredentials),
                redirect: "/wifi",
            }
        );

        let empty = route(Method::Post, "/wifi_set", &form("ssid=&password=x"));
        assert_eq!(
            empty,
            ConfigRequest::Apply {
                event: None,
                redirect: "/wifi",
            }
        );
    }

    #[test]
    fn update_routes() {
        assert_eq!(
            route(Method::Get, "/update", &Form::new()),
            ConfigRequest::Page(Page::Update)
        );
        assert_eq!(
            route(Method::Post, "/update", &Form::new()),
            ConfigRequest::Upload(UpdateKind::Firmware)
        );
        assert_eq!(
            route(Method::Post, "/update", &form("kind=filesystem")),
            ConfigRequest::Upload(UpdateKind::Filesystem)
        );
    }

    #[test]
    fn unknown_paths_are_not_found() {
        assert_eq!(route(Method::Get, "/nope", &Form::new()), ConfigRequest::NotFound);
        assert_eq!(route(Method::Post, "/device", &Form::new()), ConfigRequest::NotFound);
    }

    #[test]
    fn redirect_has_no_body_and_closes() {
        let mut out = String::<128>::new();
        write_redirect(&mut out, "/device").unwrap();
        assert_eq!(
            out.as_str(),
            "HTTP/1.1 302 Found\r\nLocation: /device\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
    }
}
