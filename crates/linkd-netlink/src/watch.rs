// # Rtnetlink Watch
//
// Subscribes to the RTMGRP_LINK multicast group and turns RTM_NEWLINK /
// RTM_DELLINK messages into link events.

use linkd_core::link::LinkIndex;
use linkd_core::traits::LinkEvent;
use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
use netlink_packet_route::link::nlas::Nla;
use netlink_packet_route::{LinkMessage, RtnlMessage};
use netlink_sys::protocols::NETLINK_ROUTE;
use netlink_sys::{AsyncSocket, AsyncSocketExt, SocketAddr, TokioSocket};
use std::io;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::kernel::{KernelLink, OperStatus};

/// Link notifications multicast group
const RTMGRP_LINK: u32 = 1;

/// Open a route socket subscribed to link notifications
pub(crate) fn open_socket() -> io::Result<TokioSocket> {
    let mut socket = TokioSocket::new(NETLINK_ROUTE)?;
    socket.socket_mut().bind(&SocketAddr::new(0, RTMGRP_LINK))?;
    Ok(socket)
}

/// Forward kernel link notifications until the receiver goes away
pub(crate) async fn run(mut socket: TokioSocket, tx: mpsc::Sender<LinkEvent>) {
    loop {
        let buf = tokio::select! {
            _ = tx.closed() => {
                debug!("Link event stream dropped, closing netlink socket");
                return;
            }

            received = socket.recv_from_full() => match received {
                Ok((buf, _addr)) => buf,
                Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) => {
                    // Kernel dropped notifications; later ones still arrive
                    warn!("Netlink receive buffer overrun, link events were lost");
                    continue;
                }
                Err(e) => {
                    error!("Netlink receive failed: {}", e);
                    return;
                }
            },
        };

        for event in parse_events(&buf) {
            trace!("Kernel link event: {:?}", event);
            if tx.send(event).await.is_err() {
                return;
            }
        }
    }
}

/// Decode every link message in one datagram
pub(crate) fn parse_events(buf: &[u8]) -> Vec<LinkEvent> {
    let mut events = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let message = match NetlinkMessage::<RtnlMessage>::deserialize(&buf[offset..]) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping undecodable netlink message: {}", e);
                break;
            }
        };

        let length = message.header.length as usize;

        match message.payload {
            NetlinkPayload::InnerMessage(RtnlMessage::NewLink(link)) => {
                match kernel_link(&link).and_then(|l| l.to_link_info()) {
                    Some(info) => events.push(LinkEvent::Upsert(info)),
                    None => debug!("Ignoring unusable RTM_NEWLINK for index {}", link.header.index),
                }
            }
            NetlinkPayload::InnerMessage(RtnlMessage::DelLink(link)) => {
                if let Ok(index) = LinkIndex::try_from(link.header.index) {
                    events.push(LinkEvent::Removed { index });
                }
            }
            _ => {}
        }

        if length == 0 {
            break;
        }
        // NLMSG_ALIGN
        offset += (length + 3) & !3;
    }

    events
}

fn kernel_link(link: &LinkMessage) -> Option<KernelLink> {
    let mut name = None;
    let mut oper = OperStatus::Unknown;

    for nla in &link.nlas {
        match nla {
            Nla::IfName(ifname) => name = Some(ifname.clone()),
            Nla::OperState(state) => oper = OperStatus::from_raw(u8::from(*state)),
            _ => {}
        }
    }

    Some(KernelLink {
        index: link.header.index,
        name: name?,
        flags: link.header.flags,
        oper,
    })
}
