//! # Transform Module
//!
//! Decode, rotate and save primitives used by the worker pool.
//!
//! ## Rotation
//! Rotations are clockwise multiples of 90 degrees. They move pixels without
//! resampling, so the canvas swaps width and height for 90 and 270 and
//! nothing is cropped.
//!
//! ## Saving
//! A rotated image never overwrites anything until it is fully encoded: it
//! is written to a temporary file in the destination directory and renamed
//! into place. Without `overwrite` the destination is a sibling carrying the
//! `-rotated` marker. JPEG sources are turned losslessly by moving DCT blocks
//! and are only re-encoded when their dimensions make that impossible.

mod codec;
mod naming;

pub use codec::{FastDecoder, SaveOptions, StandardCodec, DEFAULT_JPEG_QUALITY};
pub use naming::{rotated_path, ROTATED_MARKER};

use crate::error::{DecodeError, SaveError};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A clockwise quarter-turn count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// All four orientations in search order
    pub const ALL: [Rotation; 4] = [
        Rotation::None,
        Rotation::Cw90,
        Rotation::Cw180,
        Rotation::Cw270,
    ];

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    pub fn is_none(self) -> bool {
        self == Rotation::None
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Rotate an image clockwise, expanding the canvas as needed
pub fn rotate(image: &DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::None => image.clone(),
        Rotation::Cw90 => image.rotate90(),
        Rotation::Cw180 => image.rotate180(),
        Rotation::Cw270 => image.rotate270(),
    }
}

/// Codec seam between the worker pool and the image library.
///
/// Implement this trait to swap the codec (or to inject failures in tests).
pub trait ImageCodec: Send + Sync {
    /// Decode a file into a raster. Zero-sized rasters are an error.
    fn decode(&self, path: &Path) -> Result<DynamicImage, DecodeError>;

    /// Write `image` to `destination`, replacing it atomically if it exists.
    /// `source` is the file the image was read from.
    fn save(&self, image: &DynamicImage, source: &Path, destination: &Path) -> Result<(), SaveError>;

    /// Write `image` (decoded from `source`) turned by `rotation` to
    /// `destination`. Codecs that can rotate the encoded file directly
    /// override this; the default rotates the raster and calls `save`.
    fn rewrite(
        &self,
        image: &DynamicImage,
        rotation: Rotation,
        source: &Path,
        destination: &Path,
    ) -> Result<(), SaveError> {
        self.save(&rotate(image, rotation), source, destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7) as u8, (y * 11) as u8, ((x + y) * 3) as u8])
        }))
    }

    #[test]
    fn rotation_displays_degrees() {
        assert_eq!(Rotation::Cw270.to_string(), "270°");
        assert_eq!(Rotation::None.degrees(), 0);
    }

    #[test]
    fn quarter_turns_expand_the_canvas() {
        let image = gradient(6, 4);

        assert_eq!(rotate(&image, Rotation::Cw90).dimensions(), (4, 6));
        assert_eq!(rotate(&image, Rotation::Cw180).dimensions(), (6, 4));
        assert_eq!(rotate(&image, Rotation::Cw270).dimensions(), (4, 6));
    }

    #[test]
    fn rotate_90_is_clockwise() {
        let image = gradient(6, 4);
        let rotated = rotate(&image, Rotation::Cw90);

        // Bottom-left pixel moves to the top-left corner
        assert_eq!(rotated.get_pixel(0, 0), image.get_pixel(0, 3));
        // Top-left pixel moves to the top-right corner
        assert_eq!(rotated.get_pixel(3, 0), image.get_pixel(0, 0));
    }

    #[test]
    fn four_cumulative_quarter_turns_restore_the_original() {
        let image = gradient(7, 3);

        let mut working = image.clone();
        for _ in 0..4 {
            working = rotate(&working, Rotation::Cw90);
        }

        assert_eq!(working.to_rgb8().as_raw(), image.to_rgb8().as_raw());
    }

    #[test]
    fn cumulative_turns_match_single_rotation() {
        let image = gradient(5, 9);

        let twice = rotate(&rotate(&image, Rotation::Cw90), Rotation::Cw90);
        let thrice = rotate(&twice, Rotation::Cw90);

        assert_eq!(twice.to_rgb8().as_raw(), rotate(&image, Rotation::Cw180).to_rgb8().as_raw());
        assert_eq!(thrice.to_rgb8().as_raw(), rotate(&image, Rotation::Cw270).to_rgb8().as_raw());
    }
}
