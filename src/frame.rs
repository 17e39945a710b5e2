//! Flat RGBA8 frame buffers.
//!
//! Every stage produces a fresh [`Frame`]; nothing is mutated in place once
//! it has been handed on. Channel order is always R, G, B, A with straight
//! (non-premultiplied) alpha.

use image::RgbaImage;

use crate::error::FrameError;

/// Integer rectangle inside a frame's extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// Symmetric inward crop of a `width` x `height` extent, removing
    /// `inset` (a fraction of each dimension) from every side.
    ///
    /// The removed margin is rounded to whole pixels and never leaves less
    /// than one pixel per axis.
    pub fn centered_inset(width: u32, height: u32, inset: f32) -> Self {
        let inset = if inset.is_finite() {
            inset.clamp(0.0, 0.5)
        } else {
            0.0
        };
        let margin = |len: u32| -> u32 {
            let m = (len as f32 * inset).round() as u32;
            m.min(len.saturating_sub(1) / 2)
        };
        let mx = margin(width);
        let my = margin(height);
        Self {
            x: mx,
            y: my,
            width: width - 2 * mx,
            height: height - 2 * my,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Frame {
    /// Wrap an RGBA8 buffer. The buffer must hold exactly `width * height * 4` bytes.
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, FrameError> {
        let expected = byte_len(width, height)?;
        if rgba.len() != expected {
            return Err(FrameError::BufferLengthMismatch {
                expected,
                actual: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// A frame with every pixel set to `color`.
    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut rgba = Vec::with_capacity(count * 4);
        for _ in 0..count {
            rgba.extend_from_slice(&color);
        }
        Self {
            width,
            height,
            rgba,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Zero-extent frames carry no pixels and are never processed.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn into_rgba(self) -> Vec<u8> {
        self.rgba
    }

    /// The pixel at `(x, y)`. Panics when out of range, like slice indexing.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = self.offset(x, y);
        [
            self.rgba[idx],
            self.rgba[idx + 1],
            self.rgba[idx + 2],
            self.rgba[idx + 3],
        ]
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let idx = self.offset(x, y);
        self.rgba[idx..idx + 4].copy_from_slice(&color);
    }

    /// Texel lookup with transparent black outside the extent.
    #[inline]
    pub fn texel(&self, x: i64, y: i64) -> Option<[u8; 4]> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        Some(self.pixel(x as u32, y as u32))
    }

    /// Bilinear fetch at a continuous position where pixel `i` sits at
    /// coordinate `i`. Taps outside the extent contribute transparent zero,
    /// so positions far outside the frame return `[0.0; 4]`.
    ///
    /// Channels are returned on the 0..=255 scale.
    pub fn sample(&self, x: f32, y: f32) -> [f32; 4] {
        let mut out = [0.0_f32; 4];
        if !x.is_finite() || !y.is_finite() {
            return out;
        }

        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let ix = x0 as i64;
        let iy = y0 as i64;

        let taps = [
            (ix, iy, (1.0 - fx) * (1.0 - fy)),
            (ix.saturating_add(1), iy, fx * (1.0 - fy)),
            (ix, iy.saturating_add(1), (1.0 - fx) * fy),
            (ix.saturating_add(1), iy.saturating_add(1), fx * fy),
        ];
        for (tx, ty, weight) in taps {
            if weight == 0.0 {
                continue;
            }
            if let Some(px) = self.texel(tx, ty) {
                for (acc, channel) in out.iter_mut().zip(px) {
                    *acc += f32::from(channel) * weight;
                }
            }
        }
        out
    }

    /// Exact rectangular copy; `rect` is clipped to the extent.
    pub fn crop(&self, rect: Rect) -> Frame {
        let x = rect.x.min(self.width);
        let y = rect.y.min(self.height);
        let width = rect.width.min(self.width - x);
        let height = rect.height.min(self.height - y);

        let row_bytes = width as usize * 4;
        let mut rgba = Vec::with_capacity(row_bytes * height as usize);
        for row in y..y + height {
            let start = self.offset(x, row);
            rgba.extend_from_slice(&self.rgba[start..start + row_bytes]);
        }
        Frame {
            width,
            height,
            rgba,
        }
    }

    /// Convert into an `image` buffer for encoding or resizing.
    pub fn into_image(self) -> RgbaImage {
        let (width, height) = (self.width, self.height);
        RgbaImage::from_raw(width, height, self.rgba).unwrap_or_else(|| RgbaImage::new(width, height))
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        ((y as usize * self.width as usize) + x as usize) << 2
    }
}

impl From<RgbaImage> for Frame {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            rgba: image.into_raw(),
        }
    }
}

fn byte_len(width: u32, height: u32) -> Result<usize, FrameError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|count| count.checked_mul(4))
        .ok_or(FrameError::DimensionsOverflow)
}

/// Round an accumulated 0..=255 channel back to a byte.
#[inline]
pub(crate) fn to_byte(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
