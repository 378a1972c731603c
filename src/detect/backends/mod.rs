pub mod blob;
pub mod stub;

pub use blob::BlobLocator;
pub use stub::ScriptedLocator;
