// EggCam — JPEG Codec
//
// JPEG <-> packed RGB888, decoding straight into a preallocated buffer so the
// detection path never allocates a second full frame.

use std::io::Cursor;

use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::{ColorType, ImageDecoder};

use crate::error::{Error, Result};

pub trait JpegCodec: Send {
    /// Decode `jpeg` into `out` (`width * height * 3` bytes). The image must
    /// have exactly the given dimensions.
    fn decode_rgb888(&mut self, jpeg: &[u8], out: &mut [u8], width: usize, height: usize)
        -> Result<()>;

    fn encode_rgb888(&mut self, rgb: &[u8], width: usize, height: usize, quality: u8)
        -> Result<Vec<u8>>;
}

/// Software codec from the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCodec;

impl JpegCodec for ImageCodec {
    fn decode_rgb888(
        &mut self,
        jpeg: &[u8],
        out: &mut [u8],
        width: usize,
        height: usize,
    ) -> Result<()> {
        let decoder =
            JpegDecoder::new(Cursor::new(jpeg)).map_err(|e| Error::Decode(e.to_string()))?;

        let (w, h) = decoder.dimensions();
        if (w as usize, h as usize) != (width, height) {
            return Err(Error::Decode(format!("got {w}x{h}, expected {width}x{height}")));
        }
        if decoder.color_type() != ColorType::Rgb8 {
            return Err(Error::Decode(format!("unsupported colour type {:?}", decoder.color_type())));
        }

        let len = width * height * 3;
        let target = out
            .get_mut(..len)
            .ok_or_else(|| Error::Decode(format!("output buffer below {len} bytes")))?;
        decoder
            .read_image(target)
            .map_err(|e| Error::Decode(e.to_string()))
    }

    fn encode_rgb888(
        &mut self,
        rgb: &[u8],
        width: usize,
        height: usize,
        quality: u8,
    ) -> Result<Vec<u8>> {
        let len = width * height * 3;
        let pixels = rgb
            .get(..len)
            .ok_or_else(|| Error::Encode(format!("input buffer below {len} bytes")))?;
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality)
            .encode(pixels, width as u32, height as u32, ColorType::Rgb8)
            .map_err(|e| Error::Encode(e.to_string()))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: usize, height: usize, rgb: [u8; 3]) -> Vec<u8> {
        rgb.iter().copied().cycle().take(width * height * 3).collect()
    }

    #[test]
    fn encoded_image_decodes_to_same_size() {
        let mut codec = ImageCodec;
        let jpeg = codec.encode_rgb888(&solid(32, 16, [200, 40, 40]), 32, 16, 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);

        let mut out = vec![0u8; 32 * 16 * 3];
        codec.decode_rgb888(&jpeg, &mut out, 32, 16).unwrap();
        // lossy, but a flat colour stays close
        assert!(out.chunks(3).all(|p| p[0] > 150 && p[1] < 90 && p[2] < 90));
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let mut codec = ImageCodec;
        let jpeg = codec.encode_rgb888(&solid(16, 16, [0, 0, 0]), 16, 16, 80).unwrap();
        let mut out = vec![0u8; 32 * 16 * 3];
        assert!(matches!(codec.decode_rgb888(&jpeg, &mut out, 32, 16), Err(Error::Decode(_))));
    }

    #[test]
    fn rejects_garbage() {
        let mut codec = ImageCodec;
        let mut out = vec![0u8; 12];
        assert!(codec.decode_rgb888(&[1, 2, 3, 4], &mut out, 2, 2).is_err());
    }
}
