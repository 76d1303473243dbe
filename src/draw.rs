// EggCam — Detection Overlay
//
// Packed RGB888 frame exposed as an embedded-graphics draw target, plus the
// box drawing used to mark each counted egg.

use core::convert::Infallible;

use embedded_graphics::pixelcolor::{Rgb888, RgbColor};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyleBuilder, Rectangle, StrokeAlignment};

use crate::config::{BOX_COLOR, BOX_THICKNESS, RGB888_BYTES};

pub struct Rgb888Canvas<'a> {
    buf: &'a mut [u8],
    width: usize,
    height: usize,
}

impl<'a> Rgb888Canvas<'a> {
    /// `buf` must hold at least `width * height * 3` bytes.
    pub fn new(buf: &'a mut [u8], width: usize, height: usize) -> Self {
        debug_assert!(buf.len() >= width * height * RGB888_BYTES);
        Self { buf, width, height }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y * self.width + x) * RGB888_BYTES;
        self.buf.get(i..i + 3).map(|p| [p[0], p[1], p[2]])
    }
}

impl OriginDimensions for Rgb888Canvas<'_> {
    fn size(&self) -> Size {
        Size::new(self.width as u32, self.height as u32)
    }
}

impl DrawTarget for Rgb888Canvas<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, color) in pixels {
            if p.x < 0 || p.y < 0 || p.x as usize >= self.width || p.y as usize >= self.height {
                continue;
            }
            let i = (p.y as usize * self.width + p.x as usize) * RGB888_BYTES;
            if let Some(px) = self.buf.get_mut(i..i + 3) {
                px.copy_from_slice(&[color.r(), color.g(), color.b()]);
            }
        }
        Ok(())
    }
}

/// Outline the box at `(x, y, width, height)` in canvas pixels. The box is
/// clipped to the canvas first and the stroke lies inside the clipped edge.
pub fn draw_box(canvas: &mut Rgb888Canvas<'_>, x: i32, y: i32, width: u32, height: u32) {
    let max_x = canvas.width as i32 - 1;
    let max_y = canvas.height as i32 - 1;
    let x1 = x.max(0);
    let y1 = y.max(0);
    let x2 = (x + width as i32 - 1).min(max_x);
    let y2 = (y + height as i32 - 1).min(max_y);
    if x2 < x1 || y2 < y1 {
        return;
    }

    let style = PrimitiveStyleBuilder::new()
        .stroke_color(Rgb888::new(BOX_COLOR[0], BOX_COLOR[1], BOX_COLOR[2]))
        .stroke_width(BOX_THICKNESS)
        .stroke_alignment(StrokeAlignment::Inside)
        .build();

    let _ = Rectangle::with_corners(Point::new(x1, y1), Point::new(x2, y2))
        .into_styled(style)
        .draw(canvas);
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 3] = BOX_COLOR;
    const BLACK: [u8; 3] = [0, 0, 0];

    #[test]
    fn strokes_two_pixels_inside_the_box() {
        let mut buf = vec![0u8; 20 * 20 * 3];
        let mut canvas = Rgb888Canvas::new(&mut buf, 20, 20);
        draw_box(&mut canvas, 2, 3, 10, 8);

        // corners (2,3)-(11,10)
        assert_eq!(canvas.pixel(2, 3), Some(RED));
        assert_eq!(canvas.pixel(3, 4), Some(RED));
        assert_eq!(canvas.pixel(11, 10), Some(RED));
        assert_eq!(canvas.pixel(10, 9), Some(RED));
        // interior and outside stay untouched
        assert_eq!(canvas.pixel(4, 5), Some(BLACK));
        assert_eq!(canvas.pixel(1, 3), Some(BLACK));
        assert_eq!(canvas.pixel(12, 10), Some(BLACK));
        assert_eq!(canvas.pixel(5, 11), Some(BLACK));
    }

    #[test]
    fn box_past_the_edge_is_clipped() {
        let mut buf = vec![0u8; 10 * 20 * 3];
        let mut canvas = Rgb888Canvas::new(&mut buf, 10, 20);
        draw_box(&mut canvas, -5, 6, 12, 20);

        // clipped to (0,6)-(6,19)
        assert_eq!(canvas.pixel(0, 8), Some(RED));
        assert_eq!(canvas.pixel(6, 19), Some(RED));
        assert_eq!(canvas.pixel(5, 6), Some(RED));
        assert_eq!(canvas.pixel(3, 18), Some(RED));
        assert_eq!(canvas.pixel(3, 10), Some(BLACK));
        assert_eq!(canvas.pixel(7, 9), Some(BLACK));
        assert_eq!(canvas.pixel(3, 5), Some(BLACK));
    }

    #[test]
    fn empty_or_offscreen_box_draws_nothing() {
        let mut buf = vec![0u8; 8 * 8 * 3];
        let mut canvas = Rgb888Canvas::new(&mut buf, 8, 8);
        draw_box(&mut canvas, 2, 2, 0, 4);
        draw_box(&mut canvas, 9, 9, 4, 4);
        drop(canvas);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
