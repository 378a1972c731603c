use crate::detect::region::{merge_overlapping, FaceRegion};
use crate::frame::Frame;

/// A face-finding strategy.
///
/// Implementations are interchangeable: the pipeline runs every registered
/// strategy on the frame and merges the combined detections. Concrete
/// vision backends plug in here; the built-ins keep the pipeline fully
/// testable without one.
pub trait FaceLocator: Send {
    /// Strategy identifier, recorded on each region it produces.
    fn name(&self) -> &'static str;

    /// Candidate face regions in `frame`, already clamped to its bounds.
    fn locate(&mut self, frame: &Frame) -> Vec<FaceRegion>;
}

/// Ordered set of detection strategies.
///
/// The first registered strategy has no special role; all run on every
/// full-detection pass and their outputs are merged by IoU.
pub struct LocatorRegistry {
    locators: Vec<Box<dyn FaceLocator>>,
    merge_iou: f32,
}

impl LocatorRegistry {
    pub fn new(merge_iou: f32) -> Self {
        Self {
            locators: Vec::new(),
            merge_iou,
        }
    }

    pub fn register<L: FaceLocator + 'static>(&mut self, locator: L) {
        self.locators.push(Box::new(locator));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.locators.iter().map(|l| l.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.locators.is_empty()
    }

    /// Run every strategy and merge overlapping detections.
    pub fn locate(&mut self, frame: &Frame) -> Vec<FaceRegion> {
        let mut all = Vec::new();
        for locator in &mut self.locators {
            let found = locator.locate(frame);
            log::trace!("{}: {} candidate regions", locator.name(), found.len());
            all.extend(found);
        }
        merge_overlapping(all, self.merge_iou)
    }
}
