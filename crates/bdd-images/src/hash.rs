//! Perceptual difference hash (dHash).
//!
//! The image is reduced to grayscale, resized to `(N + 1) x N` with a
//! Lanczos filter, and each row yields `N` bits: one per horizontally
//! adjacent pixel pair, set when the right pixel is brighter.
//!
//! Two screenshots that differ only in detail lost by the resize hash equal.
//! That is the point of a perceptual hash, not a defect.

use crate::result::{ImagesError, ImagesResult};
use image::imageops::{self, FilterType};
use image::DynamicImage;
use std::fmt;

/// Default grid size (8x8 = 64 bits)
pub const DEFAULT_HASH_SIZE: usize = 8;

/// Boolean grid produced by [`dhash`]
///
/// Equality and `std::hash::Hash` are grid-wise, so the value can key maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageHash {
    size: usize,
    bits: Vec<bool>,
}

impl ImageHash {
    /// Build a hash from a row-major grid of `size * size` bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the bit count does not match `size * size`.
    pub fn from_bits(size: usize, bits: Vec<bool>) -> ImagesResult<Self> {
        if bits.len() != size * size {
            return Err(ImagesError::HashShapeMismatch {
                left: size,
                right: (bits.len() as f64).sqrt() as usize,
            });
        }
        Ok(Self { size, bits })
    }

    /// Grid side length
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Row-major bits
    #[must_use]
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Number of differing bits (Hamming distance).
    ///
    /// # Errors
    ///
    /// Returns an error when the two grids have different sizes.
    pub fn distance(&self, other: &Self) -> ImagesResult<u32> {
        if self.size != other.size {
            return Err(ImagesError::HashShapeMismatch {
                left: self.size,
                right: other.size,
            });
        }
        let differing = self
            .bits
            .iter()
            .zip(&other.bits)
            .filter(|(a, b)| a != b)
            .count();
        Ok(differing as u32)
    }

    /// Hex encoding: each group of eight bits becomes one byte, least
    /// significant bit first.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.bits
            .chunks(8)
            .map(|chunk| {
                let byte = chunk
                    .iter()
                    .enumerate()
                    .filter(|(_, bit)| **bit)
                    .fold(0u8, |acc, (i, _)| acc | (1 << i));
                format!("{byte:02x}")
            })
            .collect()
    }

    /// Integer encoding, available when the grid fits in 64 bits
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        if self.bits.len() > 64 {
            return None;
        }
        Some(
            self.bits
                .iter()
                .enumerate()
                .filter(|(_, bit)| **bit)
                .fold(0u64, |acc, (i, _)| acc | (1 << i)),
        )
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute the difference hash of a decoded image.
///
/// A `hash_size` of zero is treated as one.
#[must_use]
pub fn dhash(image: &DynamicImage, hash_size: usize) -> ImageHash {
    let size = hash_size.max(1);
    let gray = image.to_luma8();
    let small = imageops::resize(&gray, (size + 1) as u32, size as u32, FilterType::Lanczos3);

    let mut bits = Vec::with_capacity(size * size);
    for row in 0..size as u32 {
        for col in 0..size as u32 {
            let left = small.get_pixel(col, row)[0];
            let right = small.get_pixel(col + 1, row)[0];
            bits.push(right > left);
        }
    }
    ImageHash { size, bits }
}

/// Decode an encoded image (PNG, JPEG) and hash it with the default size.
///
/// # Errors
///
/// Returns [`ImagesError::Decode`] when the bytes cannot be decoded. Callers
/// treat that as "no hash available", never as a zero hash.
pub fn dhash_bytes(data: &[u8]) -> ImagesResult<ImageHash> {
    dhash_bytes_sized(data, DEFAULT_HASH_SIZE)
}

/// [`dhash_bytes`] with an explicit grid size.
///
/// # Errors
///
/// Returns [`ImagesError::Decode`] when the bytes cannot be decoded.
pub fn dhash_bytes_sized(data: &[u8], hash_size: usize) -> ImagesResult<ImageHash> {
    let image = image::load_from_memory(data)
        .map_err(|e| ImagesError::decode(format!("Failed to decode image for hashing: {e}")))?;
    Ok(dhash(&image, hash_size))
}
