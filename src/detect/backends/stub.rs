//! Scripted face locator for tests.
//!
//! Plays back a fixed per-frame script of regions, or repeats one set on
//! every call. Lets pipeline and tracking tests control exactly where
//! "faces" appear without any image analysis.

use std::collections::VecDeque;

use crate::detect::locator::FaceLocator;
use crate::detect::region::FaceRegion;
use crate::frame::Frame;

pub struct ScriptedLocator {
    script: VecDeque<Vec<FaceRegion>>,
    repeat: Option<Vec<FaceRegion>>,
}

impl ScriptedLocator {
    /// Play `frames` back one call at a time, then report nothing.
    pub fn new(frames: Vec<Vec<FaceRegion>>) -> Self {
        Self {
            script: frames.into(),
            repeat: None,
        }
    }

    /// Report the same regions on every call.
    pub fn always(regions: Vec<FaceRegion>) -> Self {
        Self {
            script: VecDeque::new(),
            repeat: Some(regions),
        }
    }
}

impl FaceLocator for ScriptedLocator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn locate(&mut self, _frame: &Frame) -> Vec<FaceRegion> {
        if let Some(regions) = &self.repeat {
            return regions.clone();
        }
        self.script.pop_front().unwrap_or_default()
    }
}
