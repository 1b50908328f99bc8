//! Photo I/O on top of the `image` crate.

use facesort_core::ImageCodec;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbImage};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use thiserror::Error;

const JPEG_QUALITY: u8 = 95;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
    #[error("{0}: HEIC/HEIF photos cannot be decoded; convert them to JPEG first")]
    Heif(PathBuf),
}

/// Whether photos with extension `ext` can be decoded by [`read_rgb`].
pub fn can_decode_extension(ext: &str) -> bool {
    ImageFormat::from_extension(ext).is_some_and(|format| format.reading_enabled())
}

fn is_heif(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("heic") || e.eq_ignore_ascii_case("heif"))
}

/// Decodes photos to RGB and encodes annotated copies.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhotoCodec;

impl PhotoCodec {
    pub fn new() -> Self {
        Self
    }
}

/// Decode a photo, honouring its EXIF orientation.
pub fn read_rgb(path: &Path) -> Result<RgbImage, CodecError> {
    if is_heif(path) {
        return Err(CodecError::Heif(path.to_path_buf()));
    }
    let mut decoder = ImageReader::open(path)?.with_guessed_format()?.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image.to_rgb8())
}

/// Encode `image` at `path`. JPEG unless the extension names another format.
pub fn write_rgb(path: &Path, image: &RgbImage) -> Result<(), CodecError> {
    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Jpeg);
    if format == ImageFormat::Jpeg {
        let writer = BufWriter::new(File::create(path)?);
        image.write_with_encoder(JpegEncoder::new_with_quality(writer, JPEG_QUALITY))?;
    } else {
        image.save_with_format(path, format)?;
    }
    Ok(())
}

impl ImageCodec for PhotoCodec {
    type Image = RgbImage;
    type Error = CodecError;

    fn read(&self, path: &Path) -> Result<RgbImage, CodecError> {
        read_rgb(path)
    }

    fn write(&self, path: &Path, image: &RgbImage) -> Result<(), CodecError> {
        write_rgb(path, image)
    }

    fn copy(&self, src: &Path, dst: &Path) -> Result<(), CodecError> {
        fs::copy(src, dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn checker() -> RgbImage {
        RgbImage::from_fn(16, 8, |x, _| if x < 8 { Rgb([250, 10, 10]) } else { Rgb([10, 10, 250]) })
    }

    #[test]
    fn test_png_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_rgb(&path, &checker()).unwrap();
        assert_eq!(read_rgb(&path).unwrap(), checker());
    }

    #[test]
    fn test_jpg_written_as_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        write_rgb(&path, &checker()).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..3], &[0xFF, 0xD8, 0xFF]);

        let back = read_rgb(&path).unwrap();
        assert_eq!(back.dimensions(), (16, 8));
        assert!(back.get_pixel(2, 4)[0] > 200);
        assert!(back.get_pixel(13, 4)[2] > 200);
    }

    #[test]
    fn test_unknown_extension_falls_back_to_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.unknownext");
        write_rgb(&path, &checker()).unwrap();
        assert_eq!(&fs::read(&path).unwrap()[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_copy_preserves_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        fs::write(&src, b"not really a photo").unwrap();
        let dst = dir.path().join("dst.bin");
        PhotoCodec::new().copy(&src, &dst).unwrap();
        assert_eq!(fs::read(dst).unwrap(), b"not really a photo");
    }

    #[test]
    fn test_undecodable_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        fs::write(&path, b"garbage").unwrap();
        assert!(PhotoCodec::new().read(&path).is_err());
    }

    #[test]
    fn test_decodable_extensions() {
        for ext in ["jpg", "JPEG", "png", "webp", "tif"] {
            assert!(can_decode_extension(ext), "{ext}");
        }
        for ext in ["heic", "HEIF", "raw", ""] {
            assert!(!can_decode_extension(ext), "{ext}");
        }
    }

    #[test]
    fn test_heic_reported_as_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("IMG_0001.HEIC");
        fs::write(&path, b"ftypheic").unwrap();
        assert!(matches!(read_rgb(&path), Err(CodecError::Heif(p)) if p == path));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_rgb(&dir.path().join("nope.jpg")).unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
    }
}
