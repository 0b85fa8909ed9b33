use std::path::Path;

use base64::Engine;
use sha2::{Digest, Sha256};

use super::format::FileCategory;
use super::ImportError;

/// Compute the appropriate hash based on file category
pub fn compute_hash(path: &Path, category: &FileCategory) -> Result<String, ImportError> {
    match category {
        FileCategory::Image => compute_image_hash(path),
        FileCategory::DigitalPdf | FileCategory::ScannedPdf => compute_content_hash(path),
        FileCategory::PlainText => compute_content_hash(path),
        FileCategory::Unsupported => Err(ImportError::UnsupportedFormat),
    }
}

/// Compute perceptual hash for an image file.
/// Uses DoubleGradient algorithm (256-bit hash) for near-duplicate detection.
/// Uses img_hash's re-exported image crate for compatibility.
pub fn compute_image_hash(path: &Path) -> Result<String, ImportError> {
    let img =
        img_hash::image::open(path).map_err(|e| ImportError::ImageProcessing(e.to_string()))?;

    let hasher = img_hash::HasherConfig::new()
        .hash_alg(img_hash::HashAlg::DoubleGradient)
        .hash_size(16, 16)
        .to_hasher();

    let hash = hasher.hash_image(&img);
    Ok(hash.to_base64())
}

/// Compute SHA-256 content hash for PDFs and text files
pub fn compute_content_hash(path: &Path) -> Result<String, ImportError> {
    let content = std::fs::read(path)?;
    let hash = Sha256::digest(&content);
    Ok(base64::engine::general_purpose::STANDARD.encode(hash))
}

/// Compare two perceptual hashes and return similarity score (0.0-1.0)
pub fn hash_similarity(hash_a: &str, hash_b: &str) -> Option<f64> {
    let a = img_hash::ImageHash::<Vec<u8>>::from_base64(hash_a).ok()?;
    let b = img_hash::ImageHash::<Vec<u8>>::from_base64(hash_b).ok()?;

    let distance = a.dist(&b);
    let max_bits = (a.as_bytes().len() * 8).max(1) as f64;
    Some(1.0 - (distance as f64 / max_bits))
}
