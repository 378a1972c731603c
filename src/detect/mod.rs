mod backends;
mod locator;
mod quality;
mod region;

pub use backends::{BlobLocator, ScriptedLocator};
pub use locator::{FaceLocator, LocatorRegistry};
pub use quality::assess_quality;
pub use region::{merge_overlapping, FaceRegion, MERGE_IOU};
