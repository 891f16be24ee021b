//! # Bitmap IO
//!
//! Lossless encoding of layer bitmaps to secondary storage. PNG, 8 bit RGBA, no filtering tricks that
//! could lose data - reading back a written file gives the exact same pixels.

pub mod spill;

use crate::bitmap::{Bitmap, BitmapError};

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to encode: {0}")]
    Encode(#[from] png::EncodingError),
    #[error("failed to decode: {0}")]
    Decode(#[from] png::DecodingError),
    /// The stored image is readable but not what was written.
    #[error("stored image does not match: {0}")]
    Mismatch(String),
}
impl From<BitmapError> for StorageError {
    fn from(value: BitmapError) -> Self {
        Self::Mismatch(value.to_string())
    }
}

/// Write the bitmap as an RGBA8 PNG.
/// # Errors
/// Errs are forwarded from the writer `w` or the encoder.
pub fn write_png<W: std::io::Write>(bitmap: &Bitmap, w: W) -> Result<(), StorageError> {
    let mut encoder = png::Encoder::new(w, bitmap.width(), bitmap.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    // Spill files are short-lived, favor speed over size.
    encoder.set_compression(png::Compression::Fast);

    let mut writer = encoder.write_header()?;
    writer.write_image_data(bitmap.as_bytes())?;
    writer.finish()?;
    Ok(())
}

/// Read an RGBA8 PNG, as written by [`write_png`].
/// # Errors
/// Any other color type or depth is rejected rather than converted, as conversion could not be lossless.
pub fn read_png<R: std::io::Read>(r: R) -> Result<Bitmap, StorageError> {
    let decoder = png::Decoder::new(r);
    let mut reader = decoder.read_info()?;
    let mut buffer = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buffer)?;

    if frame.color_type != png::ColorType::Rgba || frame.bit_depth != png::BitDepth::Eight {
        return Err(StorageError::Mismatch(format!(
            "expected 8 bit RGBA, found {:?} {:?}",
            frame.bit_depth, frame.color_type
        )));
    }
    buffer.truncate(frame.buffer_size());
    Ok(Bitmap::from_bytes(frame.width, frame.height, &buffer)?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitmap::Rgba8;

    #[test]
    fn png_is_lossless() {
        let mut bitmap = Bitmap::new(7, 5).unwrap();
        // Odd alphas are where a premultiplying codec would round.
        for (idx, pixel) in bitmap.pixels_mut().iter_mut().enumerate() {
            let v = u8::try_from(idx * 7 % 256).unwrap();
            *pixel = Rgba8::new(v, 255 - v, v / 3, v | 1);
        }
        let mut file = Vec::new();
        write_png(&bitmap, &mut file).unwrap();
        let read = read_png(file.as_slice()).unwrap();
        assert_eq!(read, bitmap);
    }
    #[test]
    fn rejects_other_formats() {
        let mut file = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut file, 2, 2);
            encoder.set_color(png::ColorType::Grayscale);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[0, 64, 128, 255]).unwrap();
        }
        assert!(matches!(
            read_png(file.as_slice()),
            Err(StorageError::Mismatch(_))
        ));
    }
    #[test]
    fn garbage() {
        assert!(matches!(
            read_png(&b"definitely not a png"[..]),
            Err(StorageError::Decode(_))
        ));
    }
}
