//! Label-image observation wrapper.
//!
//! Pixel value 0 is background; every positive value is the tag of one body
//! part. Coordinates follow the image convention: `x` is the column, `y` the
//! row, `(0, 0)` top-left.

use image::{GrayImage, Luma};

use crate::error::{PbpError, Result};

/// Background label.
pub const BACKGROUND: u8 = 0;

/// A single static observation.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelImage {
    img: GrayImage,
}

impl LabelImage {
    /// All-background image of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            img: GrayImage::new(width, height),
        }
    }

    /// Wrap an 8-bit grayscale buffer whose values are part tags.
    pub fn from_gray(img: GrayImage) -> Self {
        Self { img }
    }

    /// Build from a row-major buffer of `width * height` labels.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let got = data.len();
        GrayImage::from_raw(width, height, data)
            .map(Self::from_gray)
            .ok_or_else(|| {
                PbpError::InvalidConfig(format!(
                    "label buffer has {} values, expected {}x{}",
                    got, width, height
                ))
            })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.img.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.img.height()
    }

    /// `[width, height]`.
    #[inline]
    pub fn size(&self) -> [u32; 2] {
        [self.img.width(), self.img.height()]
    }

    /// Label at integer pixel `(x, y)`, or `None` outside the image.
    #[inline]
    pub fn label_at(&self, x: i64, y: i64) -> Option<u8> {
        if x < 0 || y < 0 || x >= self.img.width() as i64 || y >= self.img.height() as i64 {
            return None;
        }
        Some(self.img.get_pixel(x as u32, y as u32)[0])
    }

    /// Overwrite one pixel; out-of-bounds writes are ignored.
    #[inline]
    pub fn set(&mut self, x: i64, y: i64, tag: u8) {
        if x < 0 || y < 0 || x >= self.img.width() as i64 || y >= self.img.height() as i64 {
            return;
        }
        self.img.put_pixel(x as u32, y as u32, Luma([tag]));
    }

    /// Coordinates `[x, y]` of every pixel carrying `tag`, in row-major order.
    pub fn pixels_with_tag(&self, tag: u8) -> Vec<[u32; 2]> {
        self.img
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == tag)
            .map(|(x, y, _)| [x, y])
            .collect()
    }

    /// Number of pixels carrying `tag`.
    pub fn count_tag(&self, tag: u8) -> usize {
        self.img.pixels().filter(|p| p[0] == tag).count()
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.img
    }

    pub fn into_gray(self) -> GrayImage {
        self.img
    }

    /// Fail with [`PbpError::ImageSize`] unless the image is `expected` sized.
    pub(crate) fn ensure_size(&self, expected: [u32; 2]) -> Result<()> {
        let got = self.size();
        if got != expected {
            return Err(PbpError::ImageSize { expected, got });
        }
        Ok(())
    }
}

impl From<GrayImage> for LabelImage {
    fn from(img: GrayImage) -> Self {
        Self::from_gray(img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_lookup_respects_bounds() {
        let mut img = LabelImage::new(4, 3);
        img.set(3, 2, 7);
        img.set(9, 9, 7);
        assert_eq!(img.label_at(3, 2), Some(7));
        assert_eq!(img.label_at(0, 0), Some(BACKGROUND));
        assert_eq!(img.label_at(4, 0), None);
        assert_eq!(img.label_at(-1, 1), None);
        assert_eq!(img.pixels_with_tag(7), vec![[3, 2]]);
    }

    #[test]
    fn from_raw_rejects_wrong_length() {
        assert!(LabelImage::from_raw(3, 3, vec![0; 8]).is_err());
        let img = LabelImage::from_raw(3, 2, vec![0, 1, 0, 0, 0, 1]).unwrap();
        assert_eq!(img.pixels_with_tag(1), vec![[1, 0], [2, 1]]);
        assert_eq!(img.count_tag(1), 2);
    }
}
