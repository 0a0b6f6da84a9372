//! Pager for flat binary raster files.
//!
//! Serves raw cubes stored uncompressed in any interleave, with optional
//! file header, per-line padding, and per-band padding, from either a
//! single multi-band file or one file per band (BSQ only). Also provides
//! the temporary backing files used by read-write destination elements.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::descriptor::FileDescriptor;
use crate::error::{RasterError, io_err};
use crate::pager::{BlockRequest, PagerGeometry, RasterPager};
use crate::types::Interleave;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Byte layout of a flat file, derived from its descriptor.
#[derive(Debug, Clone, Copy)]
struct FlatLayout {
    geometry: PagerGeometry,
    header_bytes: usize,
    preline_bytes: usize,
    postline_bytes: usize,
    preband_bytes: usize,
    postband_bytes: usize,
}

impl FlatLayout {
    fn row_data_bytes(&self) -> usize {
        self.geometry.row_bytes()
    }

    fn padded_row_bytes(&self) -> usize {
        self.preline_bytes + self.row_data_bytes() + self.postline_bytes
    }

    fn has_line_padding(&self) -> bool {
        self.preline_bytes != 0 || self.postline_bytes != 0
    }

    /// File offset of the first data byte of `start_row` in the region of
    /// `start_band`. For per-band files the band term is dropped because
    /// each band starts its own file.
    fn row_offset(&self, start_row: usize, start_band: usize, per_band_files: bool) -> u64 {
        let band_region = if self.geometry.interleave == Interleave::Bsq && !per_band_files {
            let band_bytes = self.preband_bytes
                + self.geometry.rows * self.padded_row_bytes()
                + self.postband_bytes;
            start_band * band_bytes + self.preband_bytes
        } else {
            0
        };
        (self.header_bytes + band_region + start_row * self.padded_row_bytes() + self.preline_bytes)
            as u64
    }
}

/// [`RasterPager`] for flat binary files.
pub struct FlatFilePager {
    layout: FlatLayout,
    path: PathBuf,
    band_paths: Vec<PathBuf>,
    file: Option<File>,
    band_handles: Vec<File>,
    writable: bool,
    temporary: bool,
}

impl FlatFilePager {
    /// Build a pager for the file described by `file_descriptor`. The pager
    /// is unusable until [`RasterPager::open`] succeeds.
    pub fn from_descriptor(file_descriptor: &FileDescriptor, writable: bool) -> Self {
        let geometry = PagerGeometry {
            rows: file_descriptor.row_count(),
            columns: file_descriptor.column_count(),
            bands: file_descriptor.band_count(),
            bytes_per_element: file_descriptor.bytes_per_element(),
            interleave: file_descriptor.interleave(),
        };
        Self {
            layout: FlatLayout {
                geometry,
                header_bytes: file_descriptor.header_bytes(),
                preline_bytes: file_descriptor.preline_bytes(),
                postline_bytes: file_descriptor.postline_bytes(),
                preband_bytes: file_descriptor.preband_bytes(),
                postband_bytes: file_descriptor.postband_bytes(),
            },
            path: file_descriptor.filename().to_path_buf(),
            band_paths: file_descriptor.band_files().to_vec(),
            file: None,
            band_handles: Vec::new(),
            writable,
            temporary: false,
        }
    }

    /// Create a writable temporary backing file sized for `geometry`, with
    /// no header or padding. The file is removed when the pager is dropped.
    pub fn create_temp(geometry: PagerGeometry) -> Result<Self, RasterError> {
        let name = format!(
            "rastra-{}-{}.raw",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let path = std::env::temp_dir().join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(io_err(&path))?;
        file.set_len(geometry.total_bytes() as u64)
            .map_err(io_err(&path))?;
        log::debug!("created temporary backing file {}", path.display());

        Ok(Self {
            layout: FlatLayout {
                geometry,
                header_bytes: 0,
                preline_bytes: 0,
                postline_bytes: 0,
                preband_bytes: 0,
                postband_bytes: 0,
            },
            path,
            band_paths: Vec::new(),
            file: Some(file),
            band_handles: Vec::new(),
            writable: true,
            temporary: true,
        })
    }

    /// The main backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn per_band_files(&self) -> bool {
        !self.band_paths.is_empty()
    }

    fn open_one(&self, path: &Path) -> Result<File, RasterError> {
        OpenOptions::new()
            .read(true)
            .write(self.writable)
            .open(path)
            .map_err(io_err(path))
    }

    /// The open handle and path that hold `band`.
    fn handle_for_band(&mut self, band: usize) -> Result<(&mut File, &Path), RasterError> {
        if self.per_band_files() {
            match (self.band_handles.get_mut(band), self.band_paths.get(band)) {
                (Some(file), Some(path)) => Ok((file, path)),
                _ => Err(RasterError::fetch(format!("no file for band {band}"))),
            }
        } else {
            match self.file.as_mut() {
                Some(file) => Ok((file, &self.path)),
                None => Err(RasterError::invalid_access("pager has not been opened")),
            }
        }
    }

    fn check_block(&self, block: &BlockRequest) -> Result<(), RasterError> {
        let g = &self.layout.geometry;
        if block.start_row + block.rows > g.rows
            || block.start_band >= g.bands
            || block.start_band + block.bands > g.bands
            || block.bands != g.bands_per_block()
        {
            return Err(RasterError::fetch(format!(
                "block rows {}..{} bands {}..{} outside {} x {} file",
                block.start_row,
                block.start_row + block.rows,
                block.start_band,
                block.start_band + block.bands,
                g.rows,
                g.bands
            )));
        }
        Ok(())
    }

    fn read_rows(
        &mut self,
        start_row: usize,
        rows: usize,
        start_band: usize,
        buf: &mut [u8],
    ) -> Result<(), RasterError> {
        let layout = self.layout;
        let per_band = self.per_band_files();
        let offset = layout.row_offset(start_row, start_band, per_band);
        let (file, path) = self.handle_for_band(start_band)?;
        file.seek(SeekFrom::Start(offset)).map_err(io_err(path))?;
        file.read_exact(&mut buf[..rows * layout.row_data_bytes()])
            .map_err(io_err(path))?;
        Ok(())
    }

    fn write_rows(
        &mut self,
        start_row: usize,
        rows: usize,
        start_band: usize,
        data: &[u8],
    ) -> Result<(), RasterError> {
        let layout = self.layout;
        let per_band = self.per_band_files();
        let offset = layout.row_offset(start_row, start_band, per_band);
        let (file, path) = self.handle_for_band(start_band)?;
        file.seek(SeekFrom::Start(offset)).map_err(io_err(path))?;
        file.write_all(&data[..rows * layout.row_data_bytes()])
            .map_err(io_err(path))?;
        Ok(())
    }
}

impl RasterPager for FlatFilePager {
    fn open(&mut self, path: &Path) -> Result<(), RasterError> {
        if self.per_band_files() {
            let mut handles = Vec::with_capacity(self.band_paths.len());
            let band_paths = self.band_paths.clone();
            for band_path in &band_paths {
                handles.push(self.open_one(band_path)?);
            }
            self.band_handles = handles;
        } else {
            self.file = Some(self.open_one(path)?);
            self.path = path.to_path_buf();
        }
        Ok(())
    }

    fn fetch(&mut self, block: &BlockRequest) -> Result<Option<Vec<u8>>, RasterError> {
        self.check_block(block)?;
        // A padded multi-row range is not one contiguous run of data bytes;
        // let the caller fall back to per-row fetches.
        if block.rows > 1 && self.layout.has_line_padding() {
            return Ok(None);
        }
        let mut buf = vec![0u8; block.rows * self.layout.row_data_bytes()];
        self.read_rows(block.start_row, block.rows, block.start_band, &mut buf)?;
        Ok(Some(buf))
    }

    fn write(&mut self, block: &BlockRequest, data: &[u8]) -> Result<(), RasterError> {
        if !self.writable {
            return Err(RasterError::unsupported("pager is read-only"));
        }
        self.check_block(block)?;
        let row_bytes = self.layout.row_data_bytes();
        if data.len() < block.rows * row_bytes {
            return Err(RasterError::fetch(format!(
                "write data is {} bytes, block needs {}",
                data.len(),
                block.rows * row_bytes
            )));
        }
        if self.layout.has_line_padding() {
            for row in 0..block.rows {
                let chunk = &data[row * row_bytes..(row + 1) * row_bytes];
                self.write_rows(block.start_row + row, 1, block.start_band, chunk)?;
            }
        } else {
            self.write_rows(block.start_row, block.rows, block.start_band, data)?;
        }
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn geometry(&self) -> PagerGeometry {
        self.layout.geometry
    }
}

impl Drop for FlatFilePager {
    fn drop(&mut self) {
        if self.temporary {
            self.file = None;
            if let Err(error) = std::fs::remove_file(&self.path) {
                log::warn!(
                    "could not remove temporary file {}: {error}",
                    self.path.display()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Encoding, Endian};

    fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "rastra-test-{}-{name}",
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn open_pager(descriptor: &FileDescriptor) -> FlatFilePager {
        let mut pager = FlatFilePager::from_descriptor(descriptor, false);
        pager.open(descriptor.filename()).unwrap();
        pager
    }

    #[test]
    fn test_bsq_fetch_with_header() {
        // 2 bands x 3 rows x 4 columns of u8 behind a 6 byte header.
        let mut contents = vec![0xEEu8; 6];
        contents.extend(0..24);
        let path = temp_file("bsq-header.raw", &contents);
        let descriptor = FileDescriptor::new(
            &path,
            3,
            4,
            2,
            Interleave::Bsq,
            Encoding::U8,
            Endian::Little,
        )
        .with_header_bytes(6);

        let mut pager = open_pager(&descriptor);
        let block = BlockRequest {
            start_row: 1,
            rows: 2,
            start_band: 1,
            bands: 1,
        };
        let bytes = pager.fetch(&block).unwrap().unwrap();
        // Band 1 begins at element 12; rows 1..3 are elements 16..24.
        assert_eq!(bytes, (16..24).collect::<Vec<u8>>());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_padded_multi_row_fetch_declines() {
        // 4 rows x 2 columns BIP with 1 byte of padding on each side of a line.
        let row = |data: [u8; 2]| {
            let mut padded = vec![0xAA];
            padded.extend(data);
            padded.push(0xBB);
            padded
        };
        let contents: Vec<u8> = [row([0, 1]), row([2, 3]), row([4, 5]), row([6, 7])].concat();
        let path = temp_file("bip-padded.raw", &contents);
        let descriptor = FileDescriptor::new(
            &path,
            4,
            2,
            1,
            Interleave::Bip,
            Encoding::U8,
            Endian::Little,
        )
        .with_line_padding(1, 1);

        let mut pager = open_pager(&descriptor);
        let multi = BlockRequest {
            start_row: 0,
            rows: 2,
            start_band: 0,
            bands: 1,
        };
        assert!(pager.fetch(&multi).unwrap().is_none());

        let single = BlockRequest {
            start_row: 2,
            rows: 1,
            start_band: 0,
            bands: 1,
        };
        assert_eq!(pager.fetch(&single).unwrap().unwrap(), vec![4, 5]);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_band_files() {
        let band0 = temp_file("band0.raw", &[0, 1, 2, 3]);
        let band1 = temp_file("band1.raw", &[10, 11, 12, 13]);
        let descriptor = FileDescriptor::new(
            &band0,
            2,
            2,
            2,
            Interleave::Bsq,
            Encoding::U8,
            Endian::Little,
        )
        .with_band_files(vec![band0.clone(), band1.clone()]);

        let mut pager = FlatFilePager::from_descriptor(&descriptor, false);
        pager.open(descriptor.filename()).unwrap();
        let block = BlockRequest {
            start_row: 0,
            rows: 2,
            start_band: 1,
            bands: 1,
        };
        assert_eq!(pager.fetch(&block).unwrap().unwrap(), vec![10, 11, 12, 13]);
        std::fs::remove_file(band0).unwrap();
        std::fs::remove_file(band1).unwrap();
    }

    #[test]
    fn test_temp_file_write_read_and_cleanup() {
        let geometry = PagerGeometry {
            rows: 2,
            columns: 3,
            bands: 1,
            bytes_per_element: 1,
            interleave: Interleave::Bip,
        };
        let mut pager = FlatFilePager::create_temp(geometry).unwrap();
        let path = pager.path().to_path_buf();
        assert!(path.exists());

        let block = BlockRequest {
            start_row: 1,
            rows: 1,
            start_band: 0,
            bands: 1,
        };
        pager.write(&block, &[7, 8, 9]).unwrap();
        assert_eq!(pager.fetch(&block).unwrap().unwrap(), vec![7, 8, 9]);

        drop(pager);
        assert!(!path.exists());
    }

    #[test]
    fn test_read_only_write_rejected() {
        let path = temp_file("ro.raw", &[0u8; 4]);
        let descriptor = FileDescriptor::new(
            &path,
            2,
            2,
            1,
            Interleave::Bip,
            Encoding::U8,
            Endian::Little,
        );
        let mut pager = open_pager(&descriptor);
        let block = BlockRequest {
            start_row: 0,
            rows: 1,
            start_band: 0,
            bands: 1,
        };
        assert!(matches!(
            pager.write(&block, &[1, 2]),
            Err(RasterError::Unsupported(_))
        ));
        std::fs::remove_file(path).unwrap();
    }
}
