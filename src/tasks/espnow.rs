// EggCam — ESP-NOW Tasks
//
// Dispatcher: high-priority loop over inbound datagrams. Report acks go to
// the client over a channel; parameter writes are applied on the spot.
//
// Client: once per boot, sends the parameter report to the master, applies
// the reply (clock, sun times, queued writes) and then starts the camera.

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use crate::config::*;
use crate::link::{format_mac, Inbound};
use crate::node::Node;
use crate::params::{level, DeviceState, ParamId, ParamStore};
use crate::protocol::{decode, Message, ReportAck};
use crate::sync::TaskId;

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------
pub fn dispatcher_task(node: Node, acks: Sender<ReportAck>) {
    let _running = node.tasks.enter();
    log::info!("ESP-NOW dispatcher started");

    let poll = Duration::from_millis(LINK_RECV_POLL_MS);
    while !node.tasks.is_halted() {
        if let Some(inbound) = node.messenger.recv(poll) {
            handle_datagram(&node, &inbound, &acks);
        }
    }
}

pub fn handle_datagram(node: &Node, inbound: &Inbound, acks: &Sender<ReportAck>) {
    let master = node.master();
    if master != BROADCAST_MAC && inbound.src != master {
        log::debug!("Ignoring datagram from {}", format_mac(&inbound.src));
        return;
    }

    match decode(&inbound.data) {
        Ok((_, Message::ReportAck(ack))) => {
            if acks.send(ack).is_err() {
                log::debug!("Late gateway reply dropped");
            }
        }
        Ok((_, Message::ParamWrite { address, value })) => apply_write(node, address, value),
        Ok((_, other)) => log::debug!("Unexpected tag {:#04x}", other.tag()),
        Err(e) => log::warn!("Bad datagram from {}: {}", format_mac(&inbound.src), e),
    }
}

fn apply_write(node: &Node, address: u16, value: i32) {
    match node.params.write_external(address, value, level::ESPNOW) {
        Ok(id) => log::info!("{} = {}", ParamStore::def(id).name, value),
        Err(e) => node.log.warn(format!("Gateway write rejected: {e}")),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------
pub fn client_task(node: Node, acks: Receiver<ReportAck>) {
    let _running = node.tasks.enter();
    log::info!("ESP-NOW client started");

    exchange(&node, &acks);
    node.tasks.wake_camera(&node.signal);
    node.tasks.set_active(TaskId::EspNowClient, false);

    let poll = Duration::from_millis(LINK_RECV_POLL_MS);
    while !node.tasks.is_halted() {
        match acks.recv_timeout(poll) {
            Ok(ack) => apply_ack(&node, &ack),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => thread::sleep(poll),
        }
    }
}

/// Report to the master and apply its reply. Returns `false` when the
/// gateway could not be reached or did not answer in time.
pub fn exchange(node: &Node, acks: &Receiver<ReportAck>) -> bool {
    let master = node.master();
    let report = Message::Report(node.params.report(level::ESPNOW));
    if let Err(e) = node.messenger.send(&master, &report, SEND_ATTEMPTS) {
        node.log.warn(format!("Report to {} failed: {e}", format_mac(&master)));
        return false;
    }

    match acks.recv_timeout(Duration::from_millis(GATEWAY_REPLY_TIMEOUT_MS)) {
        Ok(ack) => {
            apply_ack(node, &ack);
            true
        }
        Err(_) => {
            log::warn!("No reply from gateway within {} ms", GATEWAY_REPLY_TIMEOUT_MS);
            false
        }
    }
}

pub fn apply_ack(node: &Node, ack: &ReportAck) {
    let params = &node.params;
    if ack.unix_time != 0 {
        node.clock.set_now(ack.unix_time as i64);
    }
    if ack.sunrise != 0 {
        params.set(ParamId::CasVychodu, ack.sunrise);
    }
    if ack.sunset != 0 {
        params.set(ParamId::CasZapadu, ack.sunset);
    }
    for &(address, value) in &ack.writes {
        apply_write(node, address, value);
    }
    if node.master() != BROADCAST_MAC {
        params.set(ParamId::StavZarizeni, DeviceState::Paired as i32);
    }
    log::debug!("Gateway reply applied ({} writes)", ack.writes.len());
}
