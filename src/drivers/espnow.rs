// EggCam — ESP-NOW Link Driver
//
// Wi-Fi is started in station mode only to carry ESP-NOW; the node never
// associates with an access point. Driver callbacks run in the Wi-Fi task and
// only push into channels:
//
//   send callback -> delivery reports, consumed by `send`
//   recv callback -> bounded inbound queue, consumed by `recv`

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Mutex;
use std::time::Duration;

use esp_idf_hal::modem::Modem;
use esp_idf_svc::espnow::{EspNow, PeerInfo, ReceiveInfo, SendStatus};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{ClientConfiguration, Configuration, EspWifi};
use esp_idf_sys::esp;

use crate::config::*;
use crate::error::LinkError;
use crate::link::{format_mac, Inbound, Link, MacAddr};
use crate::protocol::Datagram;
use crate::sync::lock;

pub struct EspNowLink {
    _wifi: EspWifi<'static>,
    espnow: EspNow<'static>,
    /// Serialises `send` so delivery reports match their datagram.
    reports: Mutex<Receiver<bool>>,
    inbound: Mutex<Receiver<Inbound>>,
}

impl EspNowLink {
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        channel: u8,
    ) -> anyhow::Result<Self> {
        let mut wifi = EspWifi::new(modem, sysloop, Some(nvs))?;
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            channel: Some(channel),
            ..Default::default()
        }))?;
        wifi.start()?;
        // SAFETY: Wi-Fi is started; a fixed primary channel is required for ESP-NOW.
        esp!(unsafe {
            esp_idf_sys::esp_wifi_set_channel(channel, esp_idf_sys::wifi_second_chan_t_WIFI_SECOND_CHAN_NONE)
        })?;

        let espnow = EspNow::take()?;

        let (report_tx, report_rx) = mpsc::sync_channel::<bool>(1);
        espnow.register_send_cb(move |_mac: &[u8], status: SendStatus| {
            let _ = report_tx.try_send(matches!(status, SendStatus::SUCCESS));
        })?;

        let (inbound_tx, inbound_rx): (SyncSender<Inbound>, _) =
            mpsc::sync_channel(INBOUND_QUEUE_DEPTH);
        espnow.register_recv_cb(move |info: &ReceiveInfo, data: &[u8]| {
            let Ok(data) = Datagram::from_slice(data) else {
                return;
            };
            // Full queue: drop, the gateway retries.
            let _ = inbound_tx.try_send(Inbound { src: *info.src_addr, data });
        })?;

        log::info!("ESP-NOW up on channel {}", channel);
        Ok(Self {
            _wifi: wifi,
            espnow,
            reports: Mutex::new(report_rx),
            inbound: Mutex::new(inbound_rx),
        })
    }

    fn ensure_peer(&self, peer: &MacAddr) -> Result<(), LinkError> {
        if self.espnow.peer_exists(*peer).map_err(|e| LinkError::Driver(e.code()))? {
            return Ok(());
        }
        self.espnow
            .add_peer(PeerInfo {
                peer_addr: *peer,
                ..Default::default()
            })
            .map_err(|e| LinkError::Driver(e.code()))?;
        log::debug!("ESP-NOW peer {} added", format_mac(peer));
        Ok(())
    }
}

impl Link for EspNowLink {
    fn send(&self, peer: &MacAddr, data: &[u8]) -> Result<(), LinkError> {
        if data.len() > ESPNOW_MAX_DATA_LEN {
            return Err(LinkError::TooLarge(data.len()));
        }
        self.ensure_peer(peer)?;

        let reports = lock(&self.reports);
        // Drop a report left over from a timed-out send.
        while reports.try_recv().is_ok() {}

        self.espnow
            .send(*peer, data)
            .map_err(|e| LinkError::Driver(e.code()))?;

        match reports.recv_timeout(Duration::from_millis(SEND_ACK_TIMEOUT_MS)) {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => Err(LinkError::NoAck),
        }
    }

    fn recv(&self, timeout: Duration) -> Option<Inbound> {
        lock(&self.inbound).recv_timeout(timeout).ok()
    }
}
