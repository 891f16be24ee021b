//! # Bitmaps
//!
//! The pixel buffer owned by each layer. Straight (non-premultiplied) 8-bit RGBA, row-major, top row first.
//! Everything here is integer math, so applying the same operations to the same buffer always gives
//! byte-identical output - replay depends on that.

use crate::commands::ReplayError;

#[repr(C)]
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Default,
    bytemuck::Pod,
    bytemuck::Zeroable,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}
impl Rgba8 {
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
    /// Composite `self` over `below`, source-over.
    #[must_use]
    pub fn over(self, below: Self) -> Self {
        let src_a = u32::from(self.a);
        match src_a {
            255 => return self,
            0 => return below,
            _ => (),
        }
        // Everything below is in units of 255^2, to keep precision without floats.
        let below_weight = u32::from(below.a) * (255 - src_a);
        let src_weight = src_a * 255;
        let total = src_weight + below_weight;
        if total == 0 {
            return Self::TRANSPARENT;
        }
        let channel = |src: u8, below: u8| -> u8 {
            let mixed =
                (u32::from(src) * src_weight + u32::from(below) * below_weight + total / 2) / total;
            // Weighted average of two u8s, can't exceed u8::MAX.
            u8::try_from(mixed).unwrap_or(u8::MAX)
        };
        Self {
            r: channel(self.r, below.r),
            g: channel(self.g, below.g),
            b: channel(self.b, below.b),
            a: u8::try_from((total + 127) / 255).unwrap_or(u8::MAX),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapError {
    #[error("bitmap dimensions {0}x{1} are empty or too large")]
    BadDimensions(u32, u32),
    #[error("expected {expected} pixels, got {actual}")]
    WrongLength { expected: usize, actual: usize },
}

#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<Rgba8>,
}
impl std::fmt::Debug for Bitmap {
    // Printing every pixel is never useful.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("digest", &self.digest().to_hex())
            .finish()
    }
}
impl Bitmap {
    fn pixel_count(width: u32, height: u32) -> Result<usize, BitmapError> {
        use az::CheckedAs;
        if width == 0 || height == 0 {
            return Err(BitmapError::BadDimensions(width, height));
        }
        width
            .checked_as::<usize>()
            .zip(height.checked_as::<usize>())
            .and_then(|(w, h)| w.checked_mul(h))
            // Must also be addressable as bytes.
            .filter(|count| count.checked_mul(std::mem::size_of::<Rgba8>()).is_some())
            .ok_or(BitmapError::BadDimensions(width, height))
    }
    /// A fully transparent bitmap.
    pub fn new(width: u32, height: u32) -> Result<Self, BitmapError> {
        let count = Self::pixel_count(width, height)?;
        Ok(Self {
            width,
            height,
            pixels: vec![Rgba8::TRANSPARENT; count],
        })
    }
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Rgba8>) -> Result<Self, BitmapError> {
        let expected = Self::pixel_count(width, height)?;
        if pixels.len() != expected {
            return Err(BitmapError::WrongLength {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }
    /// Rebuild from raw RGBA bytes, as read back from a spill file.
    pub fn from_bytes(width: u32, height: u32, bytes: &[u8]) -> Result<Self, BitmapError> {
        let expected = Self::pixel_count(width, height)?;
        // Length checked before the cast, cast_slice would panic on a remainder.
        if bytes.len() != expected * std::mem::size_of::<Rgba8>() {
            return Err(BitmapError::WrongLength {
                expected,
                actual: bytes.len() / std::mem::size_of::<Rgba8>(),
            });
        }
        Ok(Self {
            width,
            height,
            // Rgba8 has an alignment of one, so any byte slice casts.
            pixels: bytemuck::cast_slice::<u8, Rgba8>(bytes).to_vec(),
        })
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
    #[must_use]
    pub fn pixels(&self) -> &[Rgba8] {
        &self.pixels
    }
    pub fn pixels_mut(&mut self) -> &mut [Rgba8] {
        &mut self.pixels
    }
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }
    /// Size of the pixel data, in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.as_bytes().len()
    }
    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| y as usize * self.width as usize + x as usize)
    }
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<Rgba8> {
        self.pixels.get(self.index(x, y)?).copied()
    }
    /// Source-over `color` onto one pixel. Out of bounds is silently clipped.
    pub fn blend(&mut self, x: u32, y: u32, color: Rgba8) {
        if let Some(idx) = self.index(x, y) {
            let pixel = &mut self.pixels[idx];
            *pixel = color.over(*pixel);
        }
    }
    /// Reset every pixel to transparent.
    pub fn clear(&mut self) {
        self.pixels.fill(Rgba8::TRANSPARENT);
    }
    /// Check that `other` could stand in for this bitmap.
    pub fn check_compatible(&self, width: u32, height: u32) -> Result<(), ReplayError> {
        if self.dimensions() == (width, height) {
            Ok(())
        } else {
            Err(ReplayError::Incompatible {
                expected: (width, height),
                found: self.dimensions(),
            })
        }
    }
    /// Overwrite self with the contents of `source`, which must have equal dimensions.
    pub fn copy_from(&mut self, source: &Bitmap) -> Result<(), ReplayError> {
        self.check_compatible(source.width, source.height)?;
        self.pixels.copy_from_slice(&source.pixels);
        Ok(())
    }
    /// Composite `upper` onto self, source-over.
    pub fn composite(&mut self, upper: &Bitmap) -> Result<(), ReplayError> {
        self.check_compatible(upper.width, upper.height)?;
        for (below, above) in self.pixels.iter_mut().zip(&upper.pixels) {
            *below = above.over(*below);
        }
        Ok(())
    }
    /// Content hash, for logs and equality checks across process boundaries.
    #[must_use]
    pub fn digest(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.width.to_le_bytes());
        hasher.update(&self.height.to_le_bytes());
        hasher.update(self.as_bytes());
        hasher.finalize()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    #[test]
    fn over_extremes() {
        let red = Rgba8::new(255, 0, 0, 255);
        let blue = Rgba8::new(0, 0, 255, 255);
        assert_eq!(red.over(blue), red);
        assert_eq!(Rgba8::TRANSPARENT.over(blue), blue);
        assert_eq!(red.over(Rgba8::TRANSPARENT), red);
        assert_eq!(
            Rgba8::TRANSPARENT.over(Rgba8::TRANSPARENT),
            Rgba8::TRANSPARENT
        );
    }
    #[test]
    fn over_half() {
        let half_white = Rgba8::new(255, 255, 255, 128);
        let mixed = half_white.over(Rgba8::BLACK);
        assert_eq!(mixed.a, 255);
        assert!((127..=129).contains(&mixed.r), "{mixed:?}");
        // Onto nothing, the color is kept as-is.
        assert_eq!(half_white.over(Rgba8::TRANSPARENT), half_white);
    }
    #[test]
    fn bad_dimensions() {
        assert_eq!(Bitmap::new(0, 4), Err(BitmapError::BadDimensions(0, 4)));
        assert!(Bitmap::from_pixels(2, 2, vec![Rgba8::BLACK; 3]).is_err());
        assert!(Bitmap::from_bytes(2, 2, &[0; 15]).is_err());
    }
    #[test]
    fn bytes_round_trip() {
        let mut bitmap = Bitmap::new(3, 2).unwrap();
        bitmap.blend(1, 1, Rgba8::new(1, 2, 3, 255));
        let copy = Bitmap::from_bytes(3, 2, bitmap.as_bytes()).unwrap();
        assert_eq!(copy, bitmap);
        assert_eq!(copy.get(1, 1), Some(Rgba8::new(1, 2, 3, 255)));
        assert_eq!(copy.get(3, 0), None);
    }
    #[test]
    fn bytes_at_odd_offset() {
        let mut buffer = vec![7u8; 1 + 2 * 2 * 4];
        buffer[1..5].copy_from_slice(&[10, 20, 30, 40]);
        let bitmap = Bitmap::from_bytes(2, 2, &buffer[1..]).unwrap();
        assert_eq!(bitmap.get(0, 0), Some(Rgba8::new(10, 20, 30, 40)));
        assert_eq!(bitmap.get(1, 1), Some(Rgba8::new(7, 7, 7, 7)));
    }
    #[test]
    fn incompatible() {
        let mut a = Bitmap::new(4, 4).unwrap();
        let b = Bitmap::new(4, 5).unwrap();
        assert!(matches!(
            a.composite(&b),
            Err(ReplayError::Incompatible {
                expected: (4, 5),
                found: (4, 4)
            })
        ));
    }
}
