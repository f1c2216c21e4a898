//! HTML of the configuration menu and its sections.

use core::fmt::{self, Write};

use crate::render::NetworkLabel;

pub const TITLE: &str = "DeskClock";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Page {
    Menu,
    Device,
    TimeZone,
    FactoryReset,
    Wifi,
    Update,
}

/// Current values shown in the forms.
#[derive(Clone, Copy, Debug)]
pub struct PageContext<'a> {
    pub device_name: &'a str,
    pub zone_name: &'a str,
    pub wifi_ssid: Option<&'a str>,
    pub network: NetworkLabel,
    pub firmware_version: &'a str,
}

pub fn write_page<W: Write>(out: &mut W, page: Page, ctx: &PageContext<'_>) -> fmt::Result {
    write!(
        out,
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/html\r\n\
         Connection: close\r\n\
         \r\n\
         <!DOCTYPE html><html><head>\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>{title}</title><link rel=\"icon\" href=\"data:,\">\
         <style>\
         body {{ font-family: Arial, sans-serif; max-width: 500px; margin: 30px auto; padding: 20px; }}\
         input {{ width: 100%; padding: 8px; margin: 8px 0; box-sizing: border-box; }}\
         button {{ padding: 10px 20px; }}\
         nav a {{ margin-right: 12px; }}\
         </style></head><body>\
         <nav><a href=\"/_ac\">Menu</a><a href=\"/device\">Device</a><a href=\"/timezone\">Timezone</a>\
         <a href=\"/wifi\">WiFi</a><a href=\"/update\">Update</a><a href=\"/factory_reset\">Factory reset</a></nav>",
        title = TITLE
    )?;

    match page {
        Page::Menu => {
            out.write_str("<h1>")?;
            write_escaped(out, ctx.device_name)?;
            write!(
                out,
                "</h1><p>Address: {}</p><p>Timezone: ",
                ctx.network
            )?;
            write_escaped(out, ctx.zone_name)?;
            write!(out, "</p><p>Firmware: {}</p>", ctx.firmware_version)?;
        }
        Page::Device => {
            out.write_str(
                "<h1>Device</h1><form method=\"POST\" action=\"/device_set\">\
                 <label for=\"devicename\">Device name</label>\
                 <input type=\"text\" id=\"devicename\" name=\"devicename\" maxlength=\"32\" value=\"",
            )?;
            write_escaped(out, ctx.device_name)?;
            out.write_str("\"><button type=\"submit\">Save</button></form>")?;
        }
        Page::TimeZone => {
            out.write_str(
                "<h1>Timezone</h1><form method=\"POST\" action=\"/timezone_set\">\
                 <label for=\"timezone\">IANA zone name, e.g. Europe/Berlin</label>\
                 <input type=\"text\" id=\"timezone\" name=\"timezone\" maxlength=\"64\" value=\"",
            )?;
            write_escaped(out, ctx.zone_name)?;
            out.write_str("\"><button type=\"submit\">Save</button></form>")?;
        }
        Page::Wifi => {
            out.write_str(
                "<h1>WiFi</h1><form method=\"POST\" action=\"/wifi_set\">\
                 <label for=\"ssid\">Network name (SSID)</label>\
                 <input type=\"text\" id=\"ssid\" name=\"ssid\" maxlength=\"32\" value=\"",
            )?;
            write_escaped(out, ctx.wifi_ssid.unwrap_or(""))?;
            out.write_str(
                "\"><label for=\"password\">Password</label>\
                 <input type=\"password\" id=\"password\" name=\"password\" maxlength=\"64\">\
                 <button type=\"submit\">Connect</button></form>",
            )?;
        }
        Page::FactoryReset => {
            out.write_str(
                "<h1>Factory reset</h1>\
                 <p>Erases WiFi credentials and all settings, then restarts.</p>\
                 <form method=\"POST\" action=\"/factory_reset_set\">\
                 <label><input type=\"checkbox\" name=\"sure\" value=\"true\" style=\"width:auto\"> I am sure</label>\
                 <button type=\"submit\">Reset</button></form>",
            )?;
        }
        Page::Update => {
            write!(
                out,
                "<h1>Firmware update</h1><p>Running: {}</p>\
                 <input type=\"file\" id=\"image\" accept=\".bin\">\
                 <button onclick=\"upload()\">Upload</button><p id=\"status\"></p>\
                 <script>\
                 function upload() {{\
                   var file = document.getElementById('image').files[0];\
                   if (!file) return;\
                   var status = document.getElementById('status');\
                   status.textContent = 'Uploading...';\
                   fetch('/update', {{ method: 'POST', body: file }})\
                     .then(function (r) {{ return r.text(); }})\
                     .then(function (t) {{ status.textContent = t; }})\
                     .catch(function () {{ status.textContent = 'Upload failed'; }});\
                 }}\
                 </script>",
                ctx.firmware_version
            )?;
        }
    }

    out.write_str("</body></html>")
}

fn write_escaped<W: Write>(out: &mut W, value: &str) -> fmt::Result {
    for ch in value.chars() {
        match ch {
            '&' => out.write_str("&amp;")?,
            '<' => out.write_str("&lt;")?,
            '>' => out.write_str("&gt;")?,
            '"' => out.write_str("&quot;")?,
            '\'' => out.write_str("&#39;")?,
            _ => out.write_char(ch)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::String;

    fn context() -> PageContext<'static> {
        PageContext {
            device_name: "desk \"one\"",
            zone_name: "Europe/Berlin",
            wifi_ssid: Some("home"),
            network: NetworkLabel::Address([192, 168, 0, 5]),
            firmware_version: "0.1.0",
        }
    }

    #[test]
    fn section_pages_are_prefilled_and_escaped() {
        let mut out = String::<4096>::new();
        write_page(&mut out, Page::Device, &context()).unwrap();
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("value=\"desk &quot;one&quot;\""));

        out.clear();
        write_page(&mut out, Page::TimeZone, &context()).unwrap();
        assert!(out.contains("value=\"Europe/Berlin\""));
        assert!(out.contains("action=\"/timezone_set\""));
    }

    #[test]
    fn menu_shows_status() {
        let mut out = String::<4096>::new();
        write_page(&mut out, Page::Menu, &context()).unwrap();
        assert!(out.contains("Address: 192.168.0.5"));
        assert!(out.ends_with("</body></html>"));
    }

    #[test]
    fn every_page_fits_the_response_buffer() {
        for page in [
            Page::Menu,
            Page::Device,
            Page::TimeZone,
            Page::FactoryReset,
            Page::Wifi,
            Page::Update,
        ] {
            let mut out = String::<4096>::new();
            assert!(write_page(&mut out, page, &context()).is_ok());
        }
    }
}
