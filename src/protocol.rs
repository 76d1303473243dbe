// EggCam — ESP-NOW Wire Format
//
// Every datagram is a 4-byte header followed by a body; all integers are
// little-endian and a datagram never exceeds ESPNOW_MAX_DATA_LEN.
//
//   header   tag u8 | seq u8 | len u16
//   0x01 REPORT        count u8, count x (address u16, value i32)
//   0x02 REPORT_ACK    unix_time u32, sunrise i32, sunset i32,
//                      count u8, count x (address u16, value i32)
//   0x03 PARAM_WRITE   address u16, value i32
//   0x10 BYTE_STREAM   max_mr_bytes u32, index u32, nmr u16, data[nmr]
//   0x11 SLEEP         sleep_time u32

use crate::config::{ESPNOW_MAX_DATA_LEN, MTU_PAYLOAD};
use crate::error::ProtocolError;

pub const HEADER_LEN: usize = 4;
const STREAM_PREFIX_LEN: usize = 10;

const _: () = assert!(HEADER_LEN + STREAM_PREFIX_LEN + MTU_PAYLOAD <= ESPNOW_MAX_DATA_LEN);

pub type Datagram = heapless::Vec<u8, ESPNOW_MAX_DATA_LEN>;

pub mod tag {
    pub const REPORT: u8 = 0x01;
    pub const REPORT_ACK: u8 = 0x02;
    pub const PARAM_WRITE: u8 = 0x03;
    pub const BYTE_STREAM: u8 = 0x10;
    pub const SLEEP: u8 = 0x11;
}

/// Gateway reply to the boot report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReportAck {
    pub unix_time: u32,
    /// 0 = unchanged
    pub sunrise: i32,
    pub sunset: i32,
    pub writes: Vec<(u16, i32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<'a> {
    Report(Vec<(u16, i32)>),
    ReportAck(ReportAck),
    ParamWrite { address: u16, value: i32 },
    ByteStream { max_mr_bytes: u32, index: u32, data: &'a [u8] },
    Sleep { seconds: u32 },
}

impl Message<'_> {
    pub fn tag(&self) -> u8 {
        match self {
            Message::Report(_) => tag::REPORT,
            Message::ReportAck(_) => tag::REPORT_ACK,
            Message::ParamWrite { .. } => tag::PARAM_WRITE,
            Message::ByteStream { .. } => tag::BYTE_STREAM,
            Message::Sleep { .. } => tag::SLEEP,
        }
    }

    pub fn encode(&self, seq: u8) -> Result<Datagram, ProtocolError> {
        let mut out = Writer(Datagram::new());
        out.put(&[self.tag(), seq, 0, 0])?;

        match self {
            Message::Report(values) => out.pairs(values)?,
            Message::ReportAck(ack) => {
                out.put(&ack.unix_time.to_le_bytes())?;
                out.put(&ack.sunrise.to_le_bytes())?;
                out.put(&ack.sunset.to_le_bytes())?;
                out.pairs(&ack.writes)?;
            }
            Message::ParamWrite { address, value } => {
                out.put(&address.to_le_bytes())?;
                out.put(&value.to_le_bytes())?;
            }
            Message::ByteStream { max_mr_bytes, index, data } => {
                let nmr = u16::try_from(data.len()).map_err(|_| ProtocolError::Overflow)?;
                out.put(&max_mr_bytes.to_le_bytes())?;
                out.put(&index.to_le_bytes())?;
                out.put(&nmr.to_le_bytes())?;
                out.put(data)?;
            }
            Message::Sleep { seconds } => out.put(&seconds.to_le_bytes())?,
        }

        let body_len = (out.0.len() - HEADER_LEN) as u16;
        out.0[2..4].copy_from_slice(&body_len.to_le_bytes());
        Ok(out.0)
    }
}

/// Parse one datagram into `(seq, message)`. The message borrows from `data`.
pub fn decode(data: &[u8]) -> Result<(u8, Message<'_>), ProtocolError> {
    let mut header = Reader(data);
    let kind = header.u8()?;
    let seq = header.u8()?;
    let len = header.u16()? as usize;
    let body = header.take(len)?;
    let mut r = Reader(body);

    let message = match kind {
        tag::REPORT => Message::Report(r.pairs()?),
        tag::REPORT_ACK => Message::ReportAck(ReportAck {
            unix_time: r.u32()?,
            sunrise: r.i32()?,
            sunset: r.i32()?,
            writes: r.pairs()?,
        }),
        tag::PARAM_WRITE => Message::ParamWrite { address: r.u16()?, value: r.i32()? },
        tag::BYTE_STREAM => {
            let max_mr_bytes = r.u32()?;
            let index = r.u32()?;
            let nmr = r.u16()? as usize;
            Message::ByteStream { max_mr_bytes, index, data: r.take(nmr)? }
        }
        tag::SLEEP => Message::Sleep { seconds: r.u32()? },
        other => return Err(ProtocolError::UnknownTag(other)),
    };
    Ok((seq, message))
}

// ---------------------------------------------------------------------------
// Byte helpers
// ---------------------------------------------------------------------------
struct Writer(Datagram);

impl Writer {
    fn put(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.0.extend_from_slice(bytes).map_err(|_| ProtocolError::Overflow)
    }

    fn pairs(&mut self, pairs: &[(u16, i32)]) -> Result<(), ProtocolError> {
        let count = u8::try_from(pairs.len()).map_err(|_| ProtocolError::Overflow)?;
        self.put(&[count])?;
        for (address, value) in pairs {
            self.put(&address.to_le_bytes())?;
            self.put(&value.to_le_bytes())?;
        }
        Ok(())
    }
}

struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.0.len() < n {
            return Err(ProtocolError::Truncated(self.0.len()));
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, ProtocolError> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        self.array().map(u32::from_le_bytes)
    }

    fn i32(&mut self) -> Result<i32, ProtocolError> {
        self.array().map(i32::from_le_bytes)
    }

    fn pairs(&mut self) -> Result<Vec<(u16, i32)>, ProtocolError> {
        let count = self.u8()? as usize;
        (0..count).map(|_| Ok((self.u16()?, self.i32()?))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_stream_layout() {
        let data = [0xaa; 80];
        let msg = Message::ByteStream { max_mr_bytes: 12_500, index: 12_420, data: &data };
        let dg = msg.encode(7).unwrap();

        assert_eq!(dg.len(), HEADER_LEN + 10 + 80);
        assert_eq!(&dg[..4], &[tag::BYTE_STREAM, 7, 90, 0]);
        assert_eq!(&dg[4..8], &12_500u32.to_le_bytes());
        assert_eq!(&dg[8..12], &12_420u32.to_le_bytes());
        assert_eq!(&dg[12..14], &80u16.to_le_bytes());
        assert_eq!(decode(&dg).unwrap(), (7, msg));
    }

    #[test]
    fn full_mtu_chunk_fits() {
        let data = [0u8; MTU_PAYLOAD];
        let dg = Message::ByteStream { max_mr_bytes: 1, index: 0, data: &data }
            .encode(0)
            .unwrap();
        assert_eq!(dg.len(), 244);
    }

    #[test]
    fn oversized_payload_overflows() {
        let data = [0u8; ESPNOW_MAX_DATA_LEN];
        let msg = Message::ByteStream { max_mr_bytes: 1, index: 0, data: &data };
        assert_eq!(msg.encode(0), Err(ProtocolError::Overflow));
    }

    #[test]
    fn sleep_notice() {
        let dg = Message::Sleep { seconds: 600 }.encode(1).unwrap();
        assert_eq!(&dg[..], &[tag::SLEEP, 1, 4, 0, 0x58, 0x02, 0, 0]);
    }

    #[test]
    fn report_ack_decodes() {
        let ack = ReportAck {
            unix_time: 1_712_901_600,
            sunrise: 1_712_896_000,
            sunset: 1_712_945_000,
            writes: vec![(7, 120), (3, 1)],
        };
        let dg = Message::ReportAck(ack.clone()).encode(3).unwrap();
        assert_eq!(decode(&dg).unwrap(), (3, Message::ReportAck(ack)));
    }

    #[test]
    fn truncated_and_unknown() {
        assert_eq!(decode(&[tag::SLEEP, 0]), Err(ProtocolError::Truncated(0)));
        assert_eq!(decode(&[tag::SLEEP, 0, 4, 0, 1]), Err(ProtocolError::Truncated(1)));
        assert_eq!(decode(&[0x7f, 0, 0, 0]), Err(ProtocolError::UnknownTag(0x7f)));
    }
}
