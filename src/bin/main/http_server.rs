use core::cell::RefCell;
use core::fmt;

use deskclock_core::{
    app::ClockApp,
    http::{
        ConfigRequest, Form, HTTP_PORT, HttpError, Method, PageContext, pages::write_page,
        parse_head, route, write_not_found, write_redirect, write_status,
    },
    update::{UpdateError, UpdateKind, UpdateSession, UpdateTracker},
};
use deskclock_hal_esp32s3::{
    network::ConnectivityHandle,
    system,
    update::{OTA_PAGE_SIZE, OtaImageSink},
};
use embassy_net::{Stack, tcp::TcpSocket};
use embassy_time::{Duration, Timer};
use embedded_io_async::Write as _;
use embedded_storage::Storage;
use esp_bootloader_esp_idf::partitions::PARTITION_TABLE_MAX_LEN;
use heapless::String;
use log::{error, info, warn};

use super::{ConfigEvents, FIRMWARE_VERSION};

const REQUEST_BUF_LEN: usize = 1024;
const RESPONSE_BUF_LEN: usize = 4096;
const FORM_BODY_MAX_LEN: usize = 512;
const UPLOAD_CHUNK_LEN: usize = 1024;
const SOCKET_BUF_LEN: usize = 1536;
const SOCKET_TIMEOUT_SECS: u64 = 10;
const RESTART_DELAY_MS: u64 = 500;

/// Everything the config server reads or hands off.
pub(super) struct ServerContext<'a, F: Storage> {
    pub(super) app: &'a RefCell<ClockApp>,
    pub(super) events: &'a ConfigEvents,
    pub(super) tracker: &'static UpdateTracker,
    pub(super) connectivity: &'static ConnectivityHandle,
    pub(super) flash: &'a mut F,
    pub(super) table_buf: &'a mut [u8; PARTITION_TABLE_MAX_LEN],
    pub(super) ota_page: &'a mut [u8; OTA_PAGE_SIZE],
}

/// Accepts one connection at a time on port 80 and closes it after the
/// response.
pub(super) async fn config_server_loop<F: Storage>(
    stack: Stack<'_>,
    mut ctx: ServerContext<'_, F>,
) -> ! {
    let mut rx_buffer = [0u8; SOCKET_BUF_LEN];
    let mut tx_buffer = [0u8; SOCKET_BUF_LEN];
    let mut request = [0u8; REQUEST_BUF_LEN];
    let mut response = String::<RESPONSE_BUF_LEN>::new();

    info!("[ConfigServer] listening on port {}", HTTP_PORT);

    loop {
        stack.wait_config_up().await;

        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));

        if let Err(err) = socket.accept(HTTP_PORT).await {
            warn!("[ConfigServer] accept failed: {:?}", err);
            Timer::after_millis(200).await;
            continue;
        }

        if let Err(err) = handle_connection(&mut socket, &mut ctx, &mut request, &mut response).await
        {
            warn!("[ConfigServer] connection error: {:?}", err);
        }

        socket.close();
        let _ = socket.flush().await;
    }
}

async fn handle_connection<F: Storage>(
    socket: &mut TcpSocket<'_>,
    ctx: &mut ServerContext<'_, F>,
    request: &mut [u8; REQUEST_BUF_LEN],
    response: &mut String<RESPONSE_BUF_LEN>,
) -> Result<(), embassy_net::tcp::Error> {
    let mut filled = 0usize;
    loop {
        let n = socket.read(&mut request[filled..]).await?;
        if n == 0 {
            return Ok(());
        }
        filled += n;
        match parse_head(&request[..filled]) {
            Err(HttpError::Incomplete) if filled < request.len() => {}
            _ => break,
        }
    }

    let head = match parse_head(&request[..filled]) {
        Ok(head) => head,
        Err(err) => {
            warn!("[ConfigServer] bad request: {:?}", err);
            response.clear();
            let status = match err {
                HttpError::UnsupportedMethod => write_status(response, 405, "Method Not Allowed", ""),
                HttpError::Incomplete => write_status(response, 431, "Request Header Fields Too Large", ""),
                HttpError::Malformed => write_status(response, 400, "Bad Request", ""),
            };
            return send(socket, response, status).await;
        }
    };
    let content_length = head.content_length;
    let body_start = head.head_len;

    let mut form = Form::new();
    form.extend_from(head.query);
    let is_upload = head.method == Method::Post && head.path == "/update";
    if head.method == Method::Post && !is_upload {
        let mut body = [0u8; FORM_BODY_MAX_LEN];
        let len = read_form_body(socket, &request[body_start..filled], content_length, &mut body).await?;
        match core::str::from_utf8(&body[..len]) {
            Ok(encoded) => form.extend_from(encoded),
            Err(_) => warn!("[ConfigServer] form body is not UTF-8"),
        }
    }

    info!("[ConfigServer] {:?} {}", head.method, head.path);
    let routed = route(head.method, head.path, &form);

    response.clear();
    let status = match routed {
        ConfigRequest::Redirect(location) => write_redirect(response, location),
        ConfigRequest::Page(page) => match ctx.app.try_borrow() {
            Ok(app) => {
                let page_ctx = PageContext {
                    device_name: app.device_name(),
                    zone_name: app.zone_name(),
                    wifi_ssid: app.settings().wifi.as_ref().map(|wifi| wifi.ssid.as_str()),
                    network: ctx.connectivity.snapshot().network_label(),
                    firmware_version: FIRMWARE_VERSION,
                };
                write_page(response, page, &page_ctx)
            }
            Err(_) => write_status(response, 503, "Service Unavailable", "busy"),
        },
        ConfigRequest::Apply { event, redirect } => {
            if let Some(event) = event {
                if ctx.events.try_send(event).is_err() {
                    warn!("[ConfigServer] event queue full, change dropped");
                }
            }
            write_redirect(response, redirect)
        }
        ConfigRequest::Upload(kind) => {
            let already = &request[body_start..filled];
            return handle_upload(socket, ctx, kind, content_length, already, response).await;
        }
        ConfigRequest::NotFound => write_not_found(response),
    };

    send(socket, response, status).await
}

/// Collects an urlencoded body; anything past `out` is drained and dropped.
async fn read_form_body(
    socket: &mut TcpSocket<'_>,
    already: &[u8],
    content_length: Option<usize>,
    out: &mut [u8; FORM_BODY_MAX_LEN],
) -> Result<usize, embassy_net::tcp::Error> {
    let expected = content_length.unwrap_or(already.len());
    let keep = expected.min(out.len());
    let mut len = already.len().min(keep);
    out[..len].copy_from_slice(&already[..len]);

    while len < keep {
        let n = socket.read(&mut out[len..keep]).await?;
        if n == 0 {
            break;
        }
        len += n;
    }

    if expected > keep {
        warn!("[ConfigServer] form body of {} bytes truncated", expected);
    }
    Ok(len)
}

async fn handle_upload<F: Storage>(
    socket: &mut TcpSocket<'_>,
    ctx: &mut ServerContext<'_, F>,
    kind: UpdateKind,
    content_length: Option<usize>,
    already: &[u8],
    response: &mut String<RESPONSE_BUF_LEN>,
) -> Result<(), embassy_net::tcp::Error> {
    if kind == UpdateKind::Filesystem {
        warn!("update: {} images are not supported", kind.as_str());
        let status = write_status(response, 501, "Not Implemented", "filesystem images are not supported");
        return send(socket, response, status).await;
    }
    let Some(total) = content_length else {
        let status = write_status(response, 411, "Length Required", "Content-Length required");
        return send(socket, response, status).await;
    };

    let sink = match OtaImageSink::new(&mut *ctx.flash, &mut *ctx.table_buf, &mut *ctx.ota_page) {
        Ok(sink) => sink,
        Err(err) => {
            error!("update: no OTA slot available: {:?}", err);
            let status = write_status(response, 500, "Internal Server Error", "no OTA slot");
            return send(socket, response, status).await;
        }
    };

    let total = u32::try_from(total).unwrap_or(u32::MAX);
    let outcome = match UpdateSession::start(ctx.tracker, sink, kind, total) {
        Ok(mut session) => {
            let mut result = session.write(already);
            let mut chunk = [0u8; UPLOAD_CHUNK_LEN];
            while result.is_ok() && session.remaining() > 0 {
                let want = (session.remaining() as usize).min(chunk.len());
                match socket.read(&mut chunk[..want]).await {
                    Ok(0) => break,
                    Ok(n) => result = session.write(&chunk[..n]),
                    Err(err) => {
                        warn!("update: upload interrupted: {:?}", err);
                        break;
                    }
                }
            }
            result.and_then(|()| session.finish())
        }
        Err(err) => Err(err),
    };

    match outcome {
        Ok(()) => {
            let status = write_status(response, 200, "OK", "Update complete, restarting");
            send(socket, response, status).await?;
            socket.close();
            let _ = socket.flush().await;
            Timer::after_millis(RESTART_DELAY_MS).await;
            system::restart()
        }
        Err(err) => {
            let (code, reason) = update_error_status(err);
            let status = write_status(response, code, reason, "update failed");
            send(socket, response, status).await
        }
    }
}

fn update_error_status(err: UpdateError) -> (u16, &'static str) {
    match err {
        UpdateError::AlreadyRunning => (409, "Conflict"),
        UpdateError::ImageTooLarge => (413, "Payload Too Large"),
        UpdateError::EmptyImage | UpdateError::Overrun | UpdateError::Incomplete => {
            (400, "Bad Request")
        }
        UpdateError::Unsupported => (501, "Not Implemented"),
        UpdateError::Sink | UpdateError::Aborted => (500, "Internal Server Error"),
    }
}

async fn send(
    socket: &mut TcpSocket<'_>,
    response: &String<RESPONSE_BUF_LEN>,
    status: fmt::Result,
) -> Result<(), embassy_net::tcp::Error> {
    if status.is_err() {
        warn!("[ConfigServer] response truncated at {} bytes", response.len());
    }
    socket.write_all(response.as_bytes()).await?;
    socket.flush().await
}
