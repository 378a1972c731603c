//! Synthetic frame source for `stub://` URLs.
//!
//! Simulates a fixed camera watching a doorway: a flat background with
//! mild sensor noise, and a bright square "visitor" that periodically
//! walks through the scene. Quiet and busy phases alternate so the motion
//! gate has something real to do in tests and demos.

use anyhow::Result;
use rand::Rng;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;
use crate::{now_s, PipelineError};

/// Length of one quiet-then-busy scene cycle, in frames.
const SCENE_CYCLE: u64 = 80;
/// Frames of the cycle during which the visitor is in the scene.
const VISITOR_FRAMES: u64 = 40;
const VISITOR_SIZE: u32 = 96;
const BACKGROUND_LUMA: u8 = 64;
const VISITOR_LUMA: u8 = 220;
/// Sensor noise amplitude. Kept well under the default motion threshold.
const NOISE_AMPLITUDE: u8 = 3;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Stop after this many frames (playback-style sources). `None` runs
    /// forever.
    pub frame_limit: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://front_door".to_string(),
            width: 640,
            height: 480,
            frame_limit: None,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.config.width;
        let height = self.config.height;
        let mut rng = rand::thread_rng();

        let mut pixels = vec![BACKGROUND_LUMA; (width * height * 3) as usize];

        // Visitor walks left to right across the middle of the frame
        // during the busy half of each scene cycle.
        let phase = self.frame_count % SCENE_CYCLE;
        if phase < VISITOR_FRAMES && width > VISITOR_SIZE && height > VISITOR_SIZE {
            let span = (width - VISITOR_SIZE) as u64;
            let x = (phase * span / VISITOR_FRAMES.max(1)) as u32;
            let y = (height - VISITOR_SIZE) / 2;
            for row in y..y + VISITOR_SIZE {
                let start = ((row * width + x) * 3) as usize;
                let end = start + (VISITOR_SIZE * 3) as usize;
                pixels[start..end].fill(VISITOR_LUMA);
            }
        }

        for value in pixels.iter_mut() {
            let noise = rng.gen_range(0..=NOISE_AMPLITUDE * 2) as i16 - NOISE_AMPLITUDE as i16;
            *value = (*value as i16 + noise).clamp(0, 255) as u8;
        }

        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {}", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if let Some(limit) = self.config.frame_limit {
            if self.frame_count >= limit {
                return Err(PipelineError::SourceUnavailable(format!(
                    "{}: playback ended after {} frames",
                    self.config.url, limit
                ))
                .into());
            }
        }

        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(
            self.config.width,
            self.config.height,
            self.frame_count,
            now_s()?,
            pixels,
        )
    }

    fn is_healthy(&self) -> bool {
        self.config
            .frame_limit
            .map_or(true, |limit| self.frame_count < limit)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
