// EggCam — Chunked Photo Transmitter
//
// Splits a JPEG into MTU_PAYLOAD slices and sends each as a BYTE_STREAM
// datagram, in order, with per-chunk retry. The gateway reassembles by
// `index` and knows the photo is complete once `index + nmr == max_mr_bytes`.

use crate::config::{MTU_PAYLOAD, SEND_ATTEMPTS};
use crate::error::{Error, Result};
use crate::link::{format_mac, MacAddr, Messenger};
use crate::protocol::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub total_size: u32,
    pub offset: u32,
    pub payload: &'a [u8],
}

impl Chunk<'_> {
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    fn message(&self) -> Message<'_> {
        Message::ByteStream {
            max_mr_bytes: self.total_size,
            index: self.offset,
            data: self.payload,
        }
    }
}

/// Chunks of `jpeg` in ascending offset order.
pub fn chunks(jpeg: &[u8]) -> impl Iterator<Item = Chunk<'_>> {
    let total_size = jpeg.len() as u32;
    jpeg.chunks(MTU_PAYLOAD).enumerate().map(move |(i, payload)| Chunk {
        total_size,
        offset: (i * MTU_PAYLOAD) as u32,
        payload,
    })
}

/// Send the whole photo to `peer`. Returns the number of chunks sent.
pub fn send_photo(messenger: &Messenger, peer: &MacAddr, jpeg: &[u8]) -> Result<usize> {
    if jpeg.is_empty() {
        return Ok(0);
    }

    let mut sent = 0;
    for chunk in chunks(jpeg) {
        messenger
            .send(peer, &chunk.message(), SEND_ATTEMPTS)
            .map_err(|source| Error::Transmit {
                offset: chunk.offset as usize,
                total: jpeg.len(),
                source,
            })?;
        sent += 1;
    }
    log::info!("Photo sent to {}: {} bytes in {} chunks", format_mac(peer), jpeg.len(), sent);
    Ok(sent)
}
