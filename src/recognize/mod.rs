mod embedding;
mod gallery;

pub use embedding::{
    DigestEmbedder, Embedding, FaceEmbedder, HistogramEmbedder, EMBEDDING_DIM,
};
pub use gallery::{Gallery, GalleryEntry, GalleryHandle, Match, UNKNOWN_LABEL};
