//! Trait-based raster import system.
//!
//! This module provides an extensible system for importing raster datasets
//! from various file formats. New formats can be added by implementing the
//! [`RasterImporter`] trait: describe the file, hand out a pager for it,
//! and declare which access combinations the format cannot serve.
//!
//! The [`ImporterShell`] drives a single import through validation, the
//! processing-location decision, and either direct pager attachment or a
//! streamed copy.

pub mod formats;
pub mod shell;

#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use bitflags::bitflags;

use crate::descriptor::DataDescriptor;
use crate::error::{RasterError, io_err};
use crate::pager::RasterPager;

pub use shell::{ImportState, ImporterShell};

bitflags! {
    /// Access combinations a format cannot serve directly from disk.
    ///
    /// Importers return these from [`RasterImporter::validation_tests`] so
    /// the shell can reject unsupported read-only configurations before
    /// any I/O happens.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ValidationTest: u32 {
        const NO_BAND_FILES = 1 << 0;
        const NO_ROW_SUBSETS = 1 << 1;
        const NO_COLUMN_SUBSETS = 1 << 2;
        const NO_BAND_SUBSETS = 1 << 3;
        const NO_SKIP_FACTORS = 1 << 4;
        const NO_INTERLEAVE_CONVERSIONS = 1 << 5;
        const NO_ON_DISK_READ_ONLY = 1 << 6;
        const NO_SUBSETS = Self::NO_ROW_SUBSETS.bits()
            | Self::NO_COLUMN_SUBSETS.bits()
            | Self::NO_BAND_SUBSETS.bits()
            | Self::NO_SKIP_FACTORS.bits();
    }
}

/// Trait for raster format importers.
///
/// Each format (flat binary, NumPy, standard images, ...) implements this
/// trait to describe datasets and serve their bytes through a
/// [`RasterPager`].
pub trait RasterImporter: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this importer (e.g. "flat", "npy", "image").
    fn id(&self) -> &'static str;

    /// Human-readable name for UI display.
    fn display_name(&self) -> &'static str;

    /// File extensions this importer handles (lowercase, without dots).
    fn extensions(&self) -> &'static [&'static str];

    /// Check if this importer can handle the given data.
    ///
    /// Used for format auto-detection when the file extension is unknown
    /// or ambiguous. Implementations should check magic bytes or headers.
    fn can_import(&self, data: &[u8]) -> bool;

    /// Describe the dataset at `path` without loading its raster data.
    ///
    /// The returned descriptor activates the full on-disk shape; callers
    /// subset it and choose a processing location before running the
    /// import.
    fn import_descriptor(&self, path: &Path) -> Result<DataDescriptor, RasterError>;

    /// Create and open a pager serving the file behind `descriptor`.
    fn create_pager(
        &self,
        descriptor: &DataDescriptor,
        writable: bool,
    ) -> Result<Box<dyn RasterPager>, RasterError>;

    /// Access combinations this format cannot serve. The default says the
    /// format supports everything the shell's structural checks allow.
    fn validation_tests(&self, descriptor: &DataDescriptor) -> ValidationTest {
        let _ = descriptor;
        ValidationTest::empty()
    }

    /// Priority for format detection (higher = checked first).
    fn priority(&self) -> i32 {
        0
    }
}

/// Registry of available raster importers.
///
/// Provides format detection and a unified entry point for imports.
pub struct ImporterRegistry {
    importers: Vec<Box<dyn RasterImporter>>,
}

impl ImporterRegistry {
    /// Create a new registry with all built-in importers.
    pub fn new() -> Self {
        let mut registry = Self {
            importers: Vec::new(),
        };

        registry.register(Box::new(formats::flat::FlatImporter));
        registry.register(Box::new(formats::npy::NpyImporter));
        registry.register(Box::new(formats::image::ImageImporter));

        registry
    }

    /// Register a new importer.
    pub fn register(&mut self, importer: Box<dyn RasterImporter>) {
        self.importers.push(importer);
        self.importers.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// Get all supported file extensions (for file filtering).
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut extensions: Vec<&'static str> = self
            .importers
            .iter()
            .flat_map(|i| i.extensions().iter().copied())
            .collect();
        extensions.sort_unstable();
        extensions.dedup();
        extensions
    }

    /// Check if a filename has a supported extension.
    pub fn is_supported_file(&self, filename: &str) -> bool {
        let lower = filename.to_lowercase();
        self.supported_extensions()
            .iter()
            .any(|ext| lower.ends_with(&format!(".{ext}")))
    }

    /// All registered importers.
    pub fn importers(&self) -> &[Box<dyn RasterImporter>] {
        &self.importers
    }

    /// Find the importer for `path`: extension match first, then magic
    /// bytes. Fails naming the file when nothing claims it.
    pub fn find_for(&self, path: &Path) -> Result<&dyn RasterImporter, RasterError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        if let Some(ext) = &extension {
            if let Some(importer) = self
                .importers
                .iter()
                .find(|i| i.extensions().iter().any(|e| e == ext))
            {
                log::debug!("selected {} importer by extension", importer.id());
                return Ok(importer.as_ref());
            }
        }

        let mut head = [0u8; 512];
        let read = File::open(path)
            .and_then(|mut file| file.read(&mut head))
            .map_err(io_err(path))?;
        if let Some(importer) = self.importers.iter().find(|i| i.can_import(&head[..read])) {
            log::debug!("selected {} importer by detection", importer.id());
            return Ok(importer.as_ref());
        }

        Err(RasterError::validation(format!(
            "no importer recognizes {}",
            path.display()
        )))
    }
}

impl Default for ImporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
