// EggCam — Datagram Link
//
// `Link` is the raw ESP-NOW driver surface: one submission per `send`, which
// blocks until the peer's MAC-layer ack (or its absence) is known. `Messenger`
// adds framing, sequence numbers and bounded retry on top.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::LinkError;
use crate::protocol::{Datagram, Message};

pub type MacAddr = [u8; 6];

/// Datagram received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub src: MacAddr,
    pub data: Datagram,
}

pub trait Link: Send + Sync {
    /// Submit one datagram and wait for the delivery report.
    fn send(&self, peer: &MacAddr, data: &[u8]) -> Result<(), LinkError>;

    /// Next inbound datagram, or `None` after `timeout`.
    fn recv(&self, timeout: Duration) -> Option<Inbound>;
}

pub struct Messenger {
    link: Arc<dyn Link>,
    seq: AtomicU8,
}

impl Messenger {
    pub fn new(link: Arc<dyn Link>) -> Self {
        Self { link, seq: AtomicU8::new(0) }
    }

    pub fn recv(&self, timeout: Duration) -> Option<Inbound> {
        self.link.recv(timeout)
    }

    /// Encode `message` once and submit it up to `attempts` times.
    pub fn send(&self, peer: &MacAddr, message: &Message<'_>, attempts: u32) -> Result<(), LinkError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let datagram = message.encode(seq)?;

        let attempts = attempts.max(1);
        let mut last = LinkError::NoAck;
        for attempt in 1..=attempts {
            match self.link.send(peer, &datagram) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::warn!(
                        "ESP-NOW tag {:#04x} attempt {}/{} failed: {}",
                        message.tag(),
                        attempt,
                        attempts,
                        e
                    );
                    last = e;
                }
            }
        }
        Err(last)
    }
}

pub fn format_mac(mac: &MacAddr) -> String {
    mac.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode;
    use crate::testing::RecordingLink;

    const PEER: MacAddr = [0x24, 0x6f, 0x28, 0x01, 0x02, 0x03];

    #[test]
    fn retries_until_acked() {
        let link = Arc::new(RecordingLink::new());
        link.fail_next(2);
        let messenger = Messenger::new(link.clone());

        messenger.send(&PEER, &Message::Sleep { seconds: 10 }, 5).unwrap();
        assert_eq!(link.attempts(), 3);
        assert_eq!(link.delivered().len(), 1);
        assert_eq!(link.delivered()[0].0, PEER);
    }

    #[test]
    fn gives_up_after_attempts() {
        let link = Arc::new(RecordingLink::new());
        link.fail_next(10);
        let messenger = Messenger::new(link.clone());

        assert_eq!(
            messenger.send(&PEER, &Message::Sleep { seconds: 10 }, 5),
            Err(LinkError::NoAck)
        );
        assert_eq!(link.attempts(), 5);
        assert!(link.delivered().is_empty());
    }

    #[test]
    fn sequence_numbers_advance() {
        let link = Arc::new(RecordingLink::new());
        let messenger = Messenger::new(link.clone());
        messenger.send(&PEER, &Message::Sleep { seconds: 1 }, 1).unwrap();
        messenger.send(&PEER, &Message::Sleep { seconds: 2 }, 1).unwrap();

        let seqs: Vec<u8> = link
            .delivered()
            .iter()
            .map(|(_, dg)| decode(dg).unwrap().0)
            .collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn formats_mac() {
        assert_eq!(format_mac(&PEER), "24:6f:28:01:02:03");
    }
}
