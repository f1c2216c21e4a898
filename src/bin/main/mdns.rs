use deskclock_core::{
    device_id::DeviceName,
    mdns::{MDNS_GROUP, MDNS_PACKET_MAX, MDNS_PORT, asks_for_host, write_host_record},
};
use embassy_futures::select::{Either3, select3};
use embassy_net::{
    IpAddress, IpEndpoint, Ipv4Address, Stack,
    udp::{PacketMetadata, UdpSocket},
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use embassy_time::Timer;
use log::{debug, info, warn};

const ADDRESS_CHECK_SECS: u64 = 30;
const ANNOUNCE_ROUNDS: u32 = 2;
const ANNOUNCE_GAP_MS: u64 = 1_000;
const ANSWER_BUF_LEN: usize = 96;

/// New host label after a device name change.
pub(super) type HostnameChanges = Signal<CriticalSectionRawMutex, DeviceName>;

struct MdnsBuffers {
    rx_meta: [PacketMetadata; 4],
    tx_meta: [PacketMetadata; 4],
    rx: [u8; MDNS_PACKET_MAX],
    tx: [u8; ANSWER_BUF_LEN * 2],
    packet: [u8; MDNS_PACKET_MAX],
    answer: [u8; ANSWER_BUF_LEN],
}

impl MdnsBuffers {
    const fn new() -> Self {
        Self {
            rx_meta: [PacketMetadata::EMPTY; 4],
            tx_meta: [PacketMetadata::EMPTY; 4],
            rx: [0; MDNS_PACKET_MAX],
            tx: [0; ANSWER_BUF_LEN * 2],
            packet: [0; MDNS_PACKET_MAX],
            answer: [0; ANSWER_BUF_LEN],
        }
    }
}

fn group_endpoint() -> IpEndpoint {
    IpEndpoint::new(IpAddress::Ipv4(Ipv4Address::from(MDNS_GROUP)), MDNS_PORT)
}

async fn send_host_record(socket: &UdpSocket<'_>, host: &str, ipv4: [u8; 4], buf: &mut [u8]) {
    match write_host_record(host, ipv4, buf) {
        Ok(len) => {
            if let Err(err) = socket.send_to(&buf[..len], group_endpoint()).await {
                warn!("mdns: send failed: {:?}", err);
            }
        }
        Err(err) => warn!("mdns: cannot encode {}.local: {:?}", host, err),
    }
}

async fn announce(socket: &UdpSocket<'_>, host: &str, ipv4: [u8; 4], buf: &mut [u8]) {
    for round in 0..ANNOUNCE_ROUNDS {
        if round > 0 {
            Timer::after_millis(ANNOUNCE_GAP_MS).await;
        }
        send_host_record(socket, host, ipv4, buf).await;
    }
}

/// Publishes `<host>.local` while the stack has an address.
///
/// Re-announces after a rename and rebinds when the address changes.
pub(super) async fn mdns_responder_loop(
    stack: Stack<'_>,
    changes: &HostnameChanges,
    mut host: DeviceName,
) -> ! {
    let mut buffers = MdnsBuffers::new();
    let group = group_endpoint();

    loop {
        stack.wait_config_up().await;
        let Some(ipv4) = stack
            .config_v4()
            .map(|config| config.address.address().octets())
        else {
            Timer::after_secs(1).await;
            continue;
        };

        if let Err(err) = stack.join_multicast_group(group.addr) {
            warn!("mdns: join multicast group failed: {:?}", err);
        }

        let MdnsBuffers {
            rx_meta,
            tx_meta,
            rx,
            tx,
            packet,
            answer,
        } = &mut buffers;
        let mut socket = UdpSocket::new(stack, rx_meta, rx, tx_meta, tx);
        if let Err(err) = socket.bind(MDNS_PORT) {
            warn!("mdns: bind failed: {:?}", err);
            Timer::after_secs(ADDRESS_CHECK_SECS).await;
            continue;
        }

        info!("mdns: start name {}.local", host);
        announce(&socket, &host, ipv4, answer).await;

        loop {
            match select3(
                socket.recv_from(packet),
                changes.wait(),
                Timer::after_secs(ADDRESS_CHECK_SECS),
            )
            .await
            {
                Either3::First(Ok((len, _))) => match asks_for_host(&packet[..len], &host) {
                    Ok(true) => send_host_record(&socket, &host, ipv4, answer).await,
                    Ok(false) => {}
                    Err(err) => debug!("mdns: ignored packet: {:?}", err),
                },
                Either3::First(Err(err)) => warn!("mdns: receive failed: {:?}", err),
                Either3::Second(renamed) => {
                    host = renamed;
                    info!("mdns: start name {}.local", host);
                    announce(&socket, &host, ipv4, answer).await;
                }
                Either3::Third(()) => {
                    let current = stack
                        .config_v4()
                        .map(|config| config.address.address().octets());
                    if current != Some(ipv4) {
                        info!("mdns: address changed, rebinding");
                        break;
                    }
                }
            }
        }

        socket.close();
        if let Err(err) = stack.leave_multicast_group(group.addr) {
            debug!("mdns: leave multicast group failed: {:?}", err);
        }
    }
}
