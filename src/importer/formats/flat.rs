//! Importer for flat binary cubes with a JSON sidecar.
//!
//! A `.cube` file is a small JSON document describing a raw binary raster:
//! shape, interleave, encoding, endianness, and any header or padding
//! bytes, plus the name of the data file (or one file per band for
//! band-sequential data). Because the raster bytes sit uncompressed on
//! disk, this is the one built-in format that can be processed in place,
//! read-only or read-write.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::descriptor::{DataDescriptor, FileDescriptor};
use crate::error::{RasterError, io_err};
use crate::importer::RasterImporter;
use crate::pager::flat::FlatFilePager;
use crate::pager::RasterPager;
use crate::types::{Encoding, Endian, Interleave};

/// Current sidecar format version.
pub const CUBE_VERSION: u32 = 1;

/// Sidecar description of a flat binary cube.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CubeHeader {
    /// Version of the sidecar format
    #[serde(default = "default_version")]
    pub version: u32,

    /// Raw data file, relative to the sidecar's directory
    pub data_file: String,

    /// One file per band (band-sequential only); empty means `data_file`
    /// holds every band
    #[serde(default)]
    pub band_files: Vec<String>,

    pub rows: usize,
    pub columns: usize,
    pub bands: usize,
    pub interleave: Interleave,
    pub encoding: Encoding,

    #[serde(default = "default_endian")]
    pub endian: Endian,

    #[serde(default)]
    pub header_bytes: usize,
    #[serde(default)]
    pub trailer_bytes: usize,
    #[serde(default)]
    pub preline_bytes: usize,
    #[serde(default)]
    pub postline_bytes: usize,
    #[serde(default)]
    pub preband_bytes: usize,
    #[serde(default)]
    pub postband_bytes: usize,
}

fn default_version() -> u32 {
    CUBE_VERSION
}

fn default_endian() -> Endian {
    Endian::Little
}

impl CubeHeader {
    /// Build the file descriptor this sidecar describes, resolving file
    /// names against `base_dir`.
    pub fn to_file_descriptor(&self, base_dir: &Path) -> FileDescriptor {
        let data_path = base_dir.join(&self.data_file);
        let mut descriptor = FileDescriptor::new(
            data_path,
            self.rows,
            self.columns,
            self.bands,
            self.interleave,
            self.encoding,
            self.endian,
        )
        .with_header_bytes(self.header_bytes)
        .with_trailer_bytes(self.trailer_bytes)
        .with_line_padding(self.preline_bytes, self.postline_bytes)
        .with_band_padding(self.preband_bytes, self.postband_bytes);
        if !self.band_files.is_empty() {
            descriptor = descriptor
                .with_band_files(self.band_files.iter().map(|f| base_dir.join(f)).collect());
        }
        descriptor
    }

    /// Recover a sidecar from a file descriptor. File names are reduced to
    /// their final components; callers place the sidecar next to the data.
    pub fn from_file_descriptor(descriptor: &FileDescriptor) -> Self {
        let name_of = |path: &Path| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        Self {
            version: CUBE_VERSION,
            data_file: name_of(descriptor.filename()),
            band_files: descriptor.band_files().iter().map(|p| name_of(p)).collect(),
            rows: descriptor.row_count(),
            columns: descriptor.column_count(),
            bands: descriptor.band_count(),
            interleave: descriptor.interleave(),
            encoding: descriptor.encoding(),
            endian: descriptor.endian(),
            header_bytes: descriptor.header_bytes(),
            trailer_bytes: descriptor.trailer_bytes(),
            preline_bytes: descriptor.preline_bytes(),
            postline_bytes: descriptor.postline_bytes(),
            preband_bytes: descriptor.preband_bytes(),
            postband_bytes: descriptor.postband_bytes(),
        }
    }
}

/// Importer for `.cube` sidecar files.
#[derive(Debug)]
pub struct FlatImporter;

impl RasterImporter for FlatImporter {
    fn id(&self) -> &'static str {
        "flat"
    }

    fn display_name(&self) -> &'static str {
        "Flat Binary Cube"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cube"]
    }

    fn can_import(&self, data: &[u8]) -> bool {
        // A JSON object mentioning the one required field.
        let head = match std::str::from_utf8(data) {
            Ok(text) => text,
            Err(_) => return false,
        };
        head.trim_start().starts_with('{') && head.contains("\"data_file\"")
    }

    fn import_descriptor(&self, path: &Path) -> Result<DataDescriptor, RasterError> {
        let text = std::fs::read_to_string(path).map_err(io_err(path))?;
        let header: CubeHeader = serde_json::from_str(&text).map_err(|error| {
            RasterError::validation(format!("invalid cube sidecar {}: {error}", path.display()))
        })?;
        if header.rows == 0 || header.columns == 0 || header.bands == 0 {
            return Err(RasterError::validation(format!(
                "cube sidecar {} declares an empty shape",
                path.display()
            )));
        }

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cube".to_string());
        log::debug!(
            "described {}x{}x{} {} cube from {}",
            header.rows,
            header.columns,
            header.bands,
            header.interleave.name(),
            path.display()
        );
        Ok(DataDescriptor::new(
            name,
            header.to_file_descriptor(base_dir),
        ))
    }

    fn create_pager(
        &self,
        descriptor: &DataDescriptor,
        writable: bool,
    ) -> Result<Box<dyn RasterPager>, RasterError> {
        let file = descriptor.file();
        let mut pager = FlatFilePager::from_descriptor(file, writable);
        pager.open(file.filename())?;
        Ok(Box::new(pager))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> CubeHeader {
        CubeHeader {
            version: CUBE_VERSION,
            data_file: "scene.raw".to_string(),
            band_files: Vec::new(),
            rows: 100,
            columns: 50,
            bands: 4,
            interleave: Interleave::Bsq,
            encoding: Encoding::U16,
            endian: Endian::Little,
            header_bytes: 512,
            trailer_bytes: 0,
            preline_bytes: 0,
            postline_bytes: 0,
            preband_bytes: 0,
            postband_bytes: 0,
        }
    }

    #[test]
    fn test_sidecar_roundtrip() {
        let original = header();
        let descriptor = original.to_file_descriptor(Path::new("/data"));
        assert_eq!(descriptor.filename(), Path::new("/data/scene.raw"));
        assert_eq!(descriptor.row_count(), 100);
        assert_eq!(descriptor.header_bytes(), 512);

        let restored = CubeHeader::from_file_descriptor(&descriptor);
        assert_eq!(restored, original);
    }

    #[test]
    fn test_sidecar_json_defaults() {
        let json = r#"{
            "data_file": "x.raw",
            "rows": 2, "columns": 3, "bands": 1,
            "interleave": "bip", "encoding": "u8"
        }"#;
        let header: CubeHeader = serde_json::from_str(json).unwrap();
        assert_eq!(header.endian, Endian::Little);
        assert_eq!(header.header_bytes, 0);
        assert_eq!(header.version, CUBE_VERSION);
    }

    #[test]
    fn test_can_import_sniffs_json() {
        let importer = FlatImporter;
        assert!(importer.can_import(br#"{ "data_file": "x.raw", "rows": 1 }"#));
        assert!(!importer.can_import(b"\x89PNG\r\n\x1a\n"));
        assert!(!importer.can_import(b"{ \"unrelated\": true }"));
    }

    #[test]
    fn test_import_descriptor_rejects_empty_shape() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("rastra-test-{}-empty.cube", std::process::id()));
        std::fs::write(
            &path,
            r#"{"data_file": "x.raw", "rows": 0, "columns": 3, "bands": 1,
               "interleave": "bip", "encoding": "u8"}"#,
        )
        .unwrap();
        let result = FlatImporter.import_descriptor(&path);
        assert!(matches!(result, Err(RasterError::Validation { .. })));
        std::fs::remove_file(path).unwrap();
    }
}
