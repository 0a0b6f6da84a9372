//! Dataset shape descriptors.
//!
//! A [`FileDescriptor`] records the full on-disk layout of a dataset and is
//! immutable once its element exists. A [`DataDescriptor`] owns the file
//! descriptor and records the *active* working set: the row/column/band
//! subsets selected for this session, the working encoding and interleave,
//! and the processing location.

use std::path::{Path, PathBuf};

use crate::dims::{DimensionDescriptor, generate_dimension_vector};
use crate::types::{Encoding, Endian, Interleave, ProcessingLocation};

/// Full on-disk shape of a dataset.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    filename: PathBuf,
    /// One file per band (BSQ only). Empty means a single multi-band file.
    band_files: Vec<PathBuf>,
    rows: Vec<DimensionDescriptor>,
    columns: Vec<DimensionDescriptor>,
    bands: Vec<DimensionDescriptor>,
    interleave: Interleave,
    encoding: Encoding,
    endian: Endian,
    bits_per_element: usize,
    header_bytes: usize,
    trailer_bytes: usize,
    preline_bytes: usize,
    postline_bytes: usize,
    preband_bytes: usize,
    postband_bytes: usize,
}

impl FileDescriptor {
    /// Describe a file of `rows` × `columns` × `bands` elements, numbering
    /// every dimension in the original and on-disk spaces.
    pub fn new(
        filename: impl Into<PathBuf>,
        rows: usize,
        columns: usize,
        bands: usize,
        interleave: Interleave,
        encoding: Encoding,
        endian: Endian,
    ) -> Self {
        Self {
            filename: filename.into(),
            band_files: Vec::new(),
            rows: generate_dimension_vector(rows, true, false, true),
            columns: generate_dimension_vector(columns, true, false, true),
            bands: generate_dimension_vector(bands, true, false, true),
            interleave,
            encoding,
            endian,
            bits_per_element: encoding.bytes() * 8,
            header_bytes: 0,
            trailer_bytes: 0,
            preline_bytes: 0,
            postline_bytes: 0,
            preband_bytes: 0,
            postband_bytes: 0,
        }
    }

    /// Use one file per band instead of a single multi-band file.
    pub fn with_band_files(mut self, band_files: Vec<PathBuf>) -> Self {
        self.band_files = band_files;
        self
    }

    /// Set leading file bytes to skip before any raster data.
    pub fn with_header_bytes(mut self, bytes: usize) -> Self {
        self.header_bytes = bytes;
        self
    }

    /// Set trailing file bytes after the raster data.
    pub fn with_trailer_bytes(mut self, bytes: usize) -> Self {
        self.trailer_bytes = bytes;
        self
    }

    /// Set non-data bytes before and after every line.
    pub fn with_line_padding(mut self, preline: usize, postline: usize) -> Self {
        self.preline_bytes = preline;
        self.postline_bytes = postline;
        self
    }

    /// Set non-data bytes before and after every band region (BSQ only).
    pub fn with_band_padding(mut self, preband: usize, postband: usize) -> Self {
        self.preband_bytes = preband;
        self.postband_bytes = postband;
        self
    }

    /// Override the declared element width in bits.
    pub fn with_bits_per_element(mut self, bits: usize) -> Self {
        self.bits_per_element = bits;
        self
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn band_files(&self) -> &[PathBuf] {
        &self.band_files
    }

    pub fn rows(&self) -> &[DimensionDescriptor] {
        &self.rows
    }

    pub fn columns(&self) -> &[DimensionDescriptor] {
        &self.columns
    }

    pub fn bands(&self) -> &[DimensionDescriptor] {
        &self.bands
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn interleave(&self) -> Interleave {
        self.interleave
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn bits_per_element(&self) -> usize {
        self.bits_per_element
    }

    pub fn bytes_per_element(&self) -> usize {
        self.bits_per_element / 8
    }

    pub fn header_bytes(&self) -> usize {
        self.header_bytes
    }

    pub fn trailer_bytes(&self) -> usize {
        self.trailer_bytes
    }

    pub fn preline_bytes(&self) -> usize {
        self.preline_bytes
    }

    pub fn postline_bytes(&self) -> usize {
        self.postline_bytes
    }

    pub fn preband_bytes(&self) -> usize {
        self.preband_bytes
    }

    pub fn postband_bytes(&self) -> usize {
        self.postband_bytes
    }

    /// Total file size implied by the declared shape, padding included.
    pub fn required_file_bytes(&self) -> u64 {
        let rows = self.row_count() as u64;
        let columns = self.column_count() as u64;
        let bands = self.band_count() as u64;
        let element = self.bytes_per_element() as u64;
        let line_overhead = (self.preline_bytes + self.postline_bytes) as u64;
        let band_overhead = (self.preband_bytes + self.postband_bytes) as u64;

        let row_bytes = match self.interleave {
            Interleave::Bsq => columns * element + line_overhead,
            Interleave::Bip | Interleave::Bil => bands * columns * element + line_overhead,
        };
        let data_bytes = match self.interleave {
            Interleave::Bsq => bands * (rows * row_bytes + band_overhead),
            Interleave::Bip | Interleave::Bil => rows * row_bytes,
        };
        self.header_bytes as u64 + data_bytes + self.trailer_bytes as u64
    }
}

/// Active working set of an element: subsets, working encoding/interleave,
/// and processing location. Mutable until the element is created.
#[derive(Debug, Clone)]
pub struct DataDescriptor {
    name: String,
    file: FileDescriptor,
    rows: Vec<DimensionDescriptor>,
    columns: Vec<DimensionDescriptor>,
    bands: Vec<DimensionDescriptor>,
    interleave: Interleave,
    encoding: Encoding,
    processing_location: ProcessingLocation,
}

impl DataDescriptor {
    /// Create a descriptor whose active set is the full on-disk shape.
    pub fn new(name: impl Into<String>, file: FileDescriptor) -> Self {
        let mut rows = file.rows().to_vec();
        let mut columns = file.columns().to_vec();
        let mut bands = file.bands().to_vec();
        for (i, dim) in rows.iter_mut().enumerate() {
            dim.set_active_number(i);
        }
        for (i, dim) in columns.iter_mut().enumerate() {
            dim.set_active_number(i);
        }
        for (i, dim) in bands.iter_mut().enumerate() {
            dim.set_active_number(i);
        }
        let interleave = file.interleave();
        let encoding = file.encoding();
        Self {
            name: name.into(),
            file,
            rows,
            columns,
            bands,
            interleave,
            encoding,
            processing_location: ProcessingLocation::InMemory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn file(&self) -> &FileDescriptor {
        &self.file
    }

    pub fn rows(&self) -> &[DimensionDescriptor] {
        &self.rows
    }

    pub fn columns(&self) -> &[DimensionDescriptor] {
        &self.columns
    }

    pub fn bands(&self) -> &[DimensionDescriptor] {
        &self.bands
    }

    /// Replace the active row subset.
    pub fn set_rows(&mut self, rows: Vec<DimensionDescriptor>) {
        self.rows = rows;
    }

    /// Replace the active column subset.
    pub fn set_columns(&mut self, columns: Vec<DimensionDescriptor>) {
        self.columns = columns;
    }

    /// Replace the active band subset.
    pub fn set_bands(&mut self, bands: Vec<DimensionDescriptor>) {
        self.bands = bands;
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn interleave(&self) -> Interleave {
        self.interleave
    }

    pub fn set_interleave(&mut self, interleave: Interleave) {
        self.interleave = interleave;
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    pub fn processing_location(&self) -> ProcessingLocation {
        self.processing_location
    }

    pub fn set_processing_location(&mut self, location: ProcessingLocation) {
        self.processing_location = location;
    }

    pub fn bytes_per_element(&self) -> usize {
        self.encoding.bytes()
    }

    /// Bytes needed to hold the full active subset contiguously.
    pub fn total_bytes(&self) -> u64 {
        self.row_count() as u64
            * self.column_count() as u64
            * self.band_count() as u64
            * self.bytes_per_element() as u64
    }

    /// The active row at index `active`, if in range.
    pub fn active_row(&self, active: usize) -> Option<DimensionDescriptor> {
        self.rows.get(active).copied()
    }

    /// The active column at index `active`, if in range.
    pub fn active_column(&self, active: usize) -> Option<DimensionDescriptor> {
        self.columns.get(active).copied()
    }

    /// The active band at index `active`, if in range.
    pub fn active_band(&self, active: usize) -> Option<DimensionDescriptor> {
        self.bands.get(active).copied()
    }

    /// Describe the full, unchipped on-disk dataset this descriptor was cut
    /// from, suitable for a temporary read-only source element during
    /// import.
    pub fn unchipped_source(&self) -> DataDescriptor {
        let mut source = DataDescriptor::new(format!("{} (source)", self.name), self.file.clone());
        source.set_processing_location(ProcessingLocation::OnDiskReadOnly);
        source
    }
}
