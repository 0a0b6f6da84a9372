//! Importer for standard image formats (PNG, JPEG, BMP, TIFF, WebP).
//!
//! Decodes RGB images into a 3-band pixel-interleaved cube held in
//! memory. Like the NumPy importer, on-disk read-only processing is
//! refused through the validation flags.

use std::path::Path;

use crate::descriptor::{DataDescriptor, FileDescriptor};
use crate::error::RasterError;
use crate::importer::{RasterImporter, ValidationTest};
use crate::pager::memory::MemoryBlockPager;
use crate::pager::{PagerGeometry, RasterPager};
use crate::types::{Encoding, Endian, Interleave};

/// Importer for standard image formats.
#[derive(Debug)]
pub struct ImageImporter;

impl RasterImporter for ImageImporter {
    fn id(&self) -> &'static str {
        "image"
    }

    fn display_name(&self) -> &'static str {
        "Standard Image (RGB)"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["png", "jpg", "jpeg", "bmp", "tiff", "tif", "webp"]
    }

    fn can_import(&self, data: &[u8]) -> bool {
        // Check common image magic bytes
        if data.len() < 8 {
            return false;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return true;
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return true;
        }

        // BMP: 42 4D (BM)
        if data.starts_with(&[0x42, 0x4D]) {
            return true;
        }

        // TIFF: 49 49 2A 00 (little endian) or 4D 4D 00 2A (big endian)
        if data.starts_with(&[0x49, 0x49, 0x2A, 0x00])
            || data.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
        {
            return true;
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12
            && data.starts_with(&[0x52, 0x49, 0x46, 0x46])
            && &data[8..12] == b"WEBP"
        {
            return true;
        }

        false
    }

    fn import_descriptor(&self, path: &Path) -> Result<DataDescriptor, RasterError> {
        // Only the header is read here; pixels are decoded when the pager
        // is created.
        let (width, height) = image::image_dimensions(path).map_err(|error| {
            RasterError::validation(format!(
                "failed to read image header {}: {error}",
                path.display()
            ))
        })?;
        let file = FileDescriptor::new(
            path,
            height as usize,
            width as usize,
            3,
            Interleave::Bip,
            Encoding::U8,
            Endian::native(),
        );
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        Ok(DataDescriptor::new(name, file))
    }

    fn create_pager(
        &self,
        descriptor: &DataDescriptor,
        _writable: bool,
    ) -> Result<Box<dyn RasterPager>, RasterError> {
        let file = descriptor.file();
        let img = image::open(file.filename())
            .map_err(|error| {
                RasterError::validation(format!(
                    "failed to decode image {}: {error}",
                    file.filename().display()
                ))
            })?
            .to_rgb8();

        log::trace!(
            "decoded {}x{} image as 3 bands (RGB)",
            img.width(),
            img.height()
        );

        let geometry = PagerGeometry {
            rows: img.height() as usize,
            columns: img.width() as usize,
            bands: 3,
            bytes_per_element: 1,
            interleave: Interleave::Bip,
        };
        // RGB byte order per pixel is already pixel-interleaved.
        Ok(Box::new(MemoryBlockPager::new(geometry, img.into_raw())?))
    }

    fn validation_tests(&self, _descriptor: &DataDescriptor) -> ValidationTest {
        ValidationTest::NO_ON_DISK_READ_ONLY | ValidationTest::NO_BAND_FILES
    }

    fn priority(&self) -> i32 {
        // Standard images have lower priority than specialized formats
        0
    }
}
