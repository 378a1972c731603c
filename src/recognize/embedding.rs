//! Identity embeddings and the extractors that produce them.
//!
//! An embedding is a fixed-length unit vector summarizing one face crop.
//! The numerical algorithm behind it is an opaque capability: the pipeline
//! only relies on the contract that similar faces land close together
//! under Euclidean distance. Two built-in extractors keep everything
//! testable without a vision model.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::detect::FaceRegion;
use crate::frame::Frame;
use crate::PipelineError;

/// System-wide embedding dimensionality. Comparisons require equal length,
/// so every extractor and every stored gallery entry uses this.
pub const EMBEDDING_DIM: usize = 32;

/// Crops with either side below this cannot be embedded.
const MIN_CROP_SIDE: u32 = 8;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.len() != EMBEDDING_DIM {
            return Err(anyhow!(
                "embedding has {} components, expected {}",
                values.len(),
                EMBEDDING_DIM
            ));
        }
        Ok(Self(values))
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Euclidean distance to another embedding of the same dimensionality.
    pub fn distance(&self, other: &Embedding) -> Result<f32> {
        if self.0.len() != other.0.len() {
            return Err(anyhow!(
                "embedding length mismatch: {} vs {}",
                self.0.len(),
                other.0.len()
            ));
        }
        Ok(self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt())
    }

    fn normalized(mut values: Vec<f32>) -> Vec<f32> {
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in values.iter_mut() {
                *v /= norm;
            }
        }
        values
    }
}

/// Turns a face crop into an identity embedding.
pub trait FaceEmbedder: Send {
    fn name(&self) -> &'static str;

    /// Embed the crop of `region`. Fails with `EmbeddingFailed` when the
    /// region is degenerate after cropping.
    fn embed(&self, frame: &Frame, region: &FaceRegion) -> Result<Embedding>;
}

fn crop_for_embedding(frame: &Frame, region: &FaceRegion) -> Result<(Vec<u8>, u32, u32)> {
    let rect = region
        .rect
        .clamped_to(frame.width, frame.height)
        .ok_or_else(|| {
            PipelineError::EmbeddingFailed("region is outside the frame".to_string())
        })?;
    if rect.w < MIN_CROP_SIDE || rect.h < MIN_CROP_SIDE {
        return Err(PipelineError::EmbeddingFailed(format!(
            "crop {}x{} is too small to embed",
            rect.w, rect.h
        ))
        .into());
    }
    let crop = frame.crop_luma(&rect).ok_or_else(|| {
        PipelineError::EmbeddingFailed("region crop is degenerate".to_string())
    })?;
    Ok((crop, rect.w, rect.h))
}

/// Deterministic luma-statistics embedder.
///
/// Histogram bins plus brightness moments, L2-normalized. The same crop
/// always maps to the same embedding, which is what the classification
/// tests rely on; different crops of the same synthetic "face" stay close.
#[derive(Default)]
pub struct HistogramEmbedder;

impl HistogramEmbedder {
    pub fn new() -> Self {
        Self
    }
}

impl FaceEmbedder for HistogramEmbedder {
    fn name(&self) -> &'static str {
        "histogram"
    }

    fn embed(&self, frame: &Frame, region: &FaceRegion) -> Result<Embedding> {
        let (crop, _, _) = crop_for_embedding(frame, region)?;

        let mut values = vec![0f32; EMBEDDING_DIM];
        let bins = EMBEDDING_DIM - 2;
        for &px in &crop {
            values[px as usize * bins / 256] += 1.0;
        }
        for v in values.iter_mut().take(bins) {
            *v /= crop.len() as f32;
        }

        let mean = crop.iter().map(|&v| v as f32).sum::<f32>() / crop.len() as f32;
        let variance = crop
            .iter()
            .map(|&v| {
                let d = v as f32 - mean;
                d * d
            })
            .sum::<f32>()
            / crop.len() as f32;
        values[bins] = mean / 255.0;
        values[bins + 1] = variance.sqrt() / 128.0;

        Embedding::new(Embedding::normalized(values))
    }
}

/// Digest-based stub embedder.
///
/// Hashes the crop bytes and spreads the digest over the vector. Identical
/// crops collide, everything else lands far apart; useful when a test
/// needs embeddings with no geometric structure at all.
#[derive(Default)]
pub struct DigestEmbedder;

impl DigestEmbedder {
    pub fn new() -> Self {
        Self
    }
}

impl FaceEmbedder for DigestEmbedder {
    fn name(&self) -> &'static str {
        "digest"
    }

    fn embed(&self, frame: &Frame, region: &FaceRegion) -> Result<Embedding> {
        let (crop, width, height) = crop_for_embedding(frame, region)?;

        let mut hasher = Sha256::new();
        hasher.update(width.to_le_bytes());
        hasher.update(height.to_le_bytes());
        hasher.update(&crop);
        let digest: [u8; 32] = hasher.finalize().into();

        let values = digest.iter().map(|&b| b as f32 / 255.0).collect();
        Embedding::new(Embedding::normalized(values))
    }
}
