//! Headless video feedback.
//!
//! [`SimulatedCamera`] stands in for a camera pointed at the screen: every
//! capture is the seed image blended with whatever was displayed last,
//! scaled back to the camera's extent.

use std::time::Duration;

use image::imageops::{self, FilterType};

use crate::capture::CapturedFrame;
use crate::frame::{to_byte, Frame};

/// Roughly 30 fps.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

#[derive(Debug, Clone)]
pub struct SimulatedCamera {
    seed: Frame,
    gain: f32,
    interval: Duration,
    elapsed: Duration,
    last_display: Option<Frame>,
}

impl SimulatedCamera {
    /// `gain` is the weight of the displayed frame in each capture, clamped
    /// to `[0, 1]`. Zero always captures the seed.
    pub fn new(seed: Frame, gain: f32) -> Self {
        let gain = if gain.is_finite() {
            gain.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            seed,
            gain,
            interval: DEFAULT_FRAME_INTERVAL,
            elapsed: Duration::ZERO,
            last_display: None,
        }
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn extent(&self) -> (u32, u32) {
        self.seed.extent()
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Next captured frame, stamped `interval` after the previous one.
    pub fn capture(&mut self) -> CapturedFrame {
        let frame = self.next_frame();
        let timestamp = self.elapsed;
        self.elapsed += self.interval;
        CapturedFrame::new(frame, timestamp)
    }

    pub fn next_frame(&self) -> Frame {
        let Some(shown) = &self.last_display else {
            return self.seed.clone();
        };
        if self.gain == 0.0 || self.seed.is_empty() {
            return self.seed.clone();
        }

        let (width, height) = self.seed.extent();
        let shown = if shown.extent() == (width, height) {
            shown.clone()
        } else {
            let image = shown.clone().into_image();
            Frame::from(imageops::resize(&image, width, height, FilterType::Triangle))
        };

        let keep = 1.0 - self.gain;
        let rgba = self
            .seed
            .as_rgba()
            .iter()
            .zip(shown.as_rgba())
            .map(|(&seed, &shown)| {
                to_byte(f32::from(seed) * keep + f32::from(shown) * self.gain)
            })
            .collect();
        Frame::new(width, height, rgba).unwrap_or_else(|_| self.seed.clone())
    }

    /// Record what the display is showing now. Empty frames are ignored.
    pub fn display(&mut self, frame: Frame) {
        if !frame.is_empty() {
            self.last_display = Some(frame);
        }
    }
}
