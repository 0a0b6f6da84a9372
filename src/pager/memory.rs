//! Memory-resident page sources.
//!
//! [`InMemoryPager`] backs an element whose whole active cube lives in one
//! allocation: the cube is held as a single cache unit and pages are views
//! into it, so no block cache is needed. [`MemoryBlockPager`] is the format
//! side of the same idea: a [`RasterPager`] serving blocks out of an owned
//! byte buffer, used by importers whose formats must be decoded up front.

use std::path::Path;
use std::sync::Arc;

use crate::error::RasterError;
use crate::pager::cache::{CacheUnit, UnitHandle};
use crate::pager::{BlockRequest, Page, PagerGeometry, RasterPager};
use crate::types::Interleave;

fn checked_total_bytes(geometry: &PagerGeometry) -> Result<usize, RasterError> {
    geometry
        .rows
        .checked_mul(geometry.columns)
        .and_then(|n| n.checked_mul(geometry.bands))
        .and_then(|n| n.checked_mul(geometry.bytes_per_element))
        .ok_or_else(|| RasterError::validation("cube size overflows the address space"))
}

/// Element data source holding the full cube in memory.
#[derive(Debug)]
pub struct InMemoryPager {
    unit: UnitHandle,
    geometry: PagerGeometry,
}

impl InMemoryPager {
    /// Allocate a zeroed cube for `geometry`.
    pub fn allocate(geometry: PagerGeometry) -> Result<Self, RasterError> {
        let total = checked_total_bytes(&geometry)?;
        log::debug!("allocating {total} byte in-memory cube");
        Ok(Self::wrap(geometry, vec![0u8; total]))
    }

    /// Adopt an existing cube laid out according to `geometry`.
    pub fn from_vec(geometry: PagerGeometry, data: Vec<u8>) -> Result<Self, RasterError> {
        let total = checked_total_bytes(&geometry)?;
        if data.len() != total {
            return Err(RasterError::validation(format!(
                "cube buffer is {} bytes, expected {}",
                data.len(),
                total
            )));
        }
        Ok(Self::wrap(geometry, data))
    }

    fn wrap(geometry: PagerGeometry, data: Vec<u8>) -> Self {
        Self {
            unit: Arc::new(CacheUnit::new(0, geometry.rows, 0, geometry.bands, data)),
            geometry,
        }
    }

    /// View the cube starting at the given storage position. Returns `None`
    /// past the end of the cube.
    pub fn page(&self, start_row: usize, start_col: usize, start_band: usize) -> Option<Page> {
        let g = &self.geometry;
        if start_row >= g.rows || start_col >= g.columns || start_band >= g.bands {
            return None;
        }
        let bpe = g.bytes_per_element;
        let (offset, bands) = match g.interleave {
            Interleave::Bip => (
                ((start_row * g.columns + start_col) * g.bands + start_band) * bpe,
                g.bands,
            ),
            Interleave::Bil => (
                (start_row * g.columns * g.bands + start_band * g.columns + start_col) * bpe,
                g.bands,
            ),
            Interleave::Bsq => (
                ((start_band * g.rows + start_row) * g.columns + start_col) * bpe,
                1,
            ),
        };
        Some(Page {
            unit: Arc::clone(&self.unit),
            offset,
            rows: g.rows - start_row,
            columns: g.columns,
            bands,
            row_step: 1,
        })
    }

    /// The single unit holding the cube.
    pub fn unit(&self) -> UnitHandle {
        Arc::clone(&self.unit)
    }

    pub fn geometry(&self) -> PagerGeometry {
        self.geometry
    }
}

/// Read-only [`RasterPager`] over an owned memory block.
///
/// Formats that have to be decoded in full (compressed images, NumPy
/// arrays) expose their decoded bytes through this pager so the import
/// pipeline can stream from them like from any other format.
#[derive(Debug)]
pub struct MemoryBlockPager {
    data: Vec<u8>,
    geometry: PagerGeometry,
}

impl MemoryBlockPager {
    /// Wrap `data`, which must exactly hold `geometry`'s cube.
    pub fn new(geometry: PagerGeometry, data: Vec<u8>) -> Result<Self, RasterError> {
        let total = checked_total_bytes(&geometry)?;
        if data.len() != total {
            return Err(RasterError::validation(format!(
                "decoded buffer is {} bytes, expected {}",
                data.len(),
                total
            )));
        }
        Ok(Self { data, geometry })
    }

    fn block_range(&self, block: &BlockRequest) -> Result<(usize, usize), RasterError> {
        let g = &self.geometry;
        let in_bounds = block.start_row + block.rows <= g.rows
            && block.start_band < g.bands
            && block.start_band + block.bands <= g.bands
            && block.bands == g.bands_per_block();
        if !in_bounds {
            return Err(RasterError::fetch(format!(
                "block rows {}..{} bands {}..{} outside {}x{} cube",
                block.start_row,
                block.start_row + block.rows,
                block.start_band,
                block.start_band + block.bands,
                g.rows,
                g.bands
            )));
        }
        let row_bytes = g.row_bytes();
        let offset = match g.interleave {
            Interleave::Bsq => (block.start_band * g.rows + block.start_row) * row_bytes,
            Interleave::Bip | Interleave::Bil => block.start_row * row_bytes,
        };
        Ok((offset, block.rows * row_bytes))
    }
}

impl RasterPager for MemoryBlockPager {
    fn open(&mut self, _path: &Path) -> Result<(), RasterError> {
        Ok(())
    }

    fn fetch(&mut self, block: &BlockRequest) -> Result<Option<Vec<u8>>, RasterError> {
        let (offset, len) = self.block_range(block)?;
        Ok(Some(self.data[offset..offset + len].to_vec()))
    }

    fn geometry(&self) -> PagerGeometry {
        self.geometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(interleave: Interleave) -> PagerGeometry {
        PagerGeometry {
            rows: 4,
            columns: 3,
            bands: 2,
            bytes_per_element: 1,
            interleave,
        }
    }

    #[test]
    fn test_allocate_zeroed() {
        let pager = InMemoryPager::allocate(geometry(Interleave::Bip)).unwrap();
        let unit = pager.unit();
        assert_eq!(unit.byte_len(), 4 * 3 * 2);
        assert!(unit.read().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_from_vec_rejects_wrong_size() {
        assert!(InMemoryPager::from_vec(geometry(Interleave::Bip), vec![0u8; 5]).is_err());
    }

    #[test]
    fn test_bip_page_offset() {
        let data: Vec<u8> = (0..24).collect();
        let pager = InMemoryPager::from_vec(geometry(Interleave::Bip), data).unwrap();
        // Pixel (row 1, col 2, band 1): ((1*3 + 2)*2 + 1) = 11.
        let page = pager.page(1, 2, 1).unwrap();
        assert_eq!(page.offset, 11);
        assert_eq!(page.rows, 3);
        assert_eq!(page.bands, 2);
    }

    #[test]
    fn test_bsq_page_offset() {
        let data: Vec<u8> = (0..24).collect();
        let pager = InMemoryPager::from_vec(geometry(Interleave::Bsq), data).unwrap();
        // Band 1 region starts at 12; row 2 adds 6, col 1 adds 1.
        let page = pager.page(2, 1, 1).unwrap();
        assert_eq!(page.offset, 12 + 6 + 1);
        assert_eq!(page.bands, 1);
    }

    #[test]
    fn test_page_past_end() {
        let pager = InMemoryPager::allocate(geometry(Interleave::Bip)).unwrap();
        assert!(pager.page(4, 0, 0).is_none());
    }

    #[test]
    fn test_block_pager_bsq_fetch() {
        let data: Vec<u8> = (0..24).collect();
        let mut pager = MemoryBlockPager::new(geometry(Interleave::Bsq), data).unwrap();
        let block = BlockRequest {
            start_row: 1,
            rows: 2,
            start_band: 1,
            bands: 1,
        };
        let bytes = pager.fetch(&block).unwrap().unwrap();
        // Band 1 rows 1..3: offsets 15..21.
        assert_eq!(bytes, (15..21).collect::<Vec<u8>>());
    }

    #[test]
    fn test_block_pager_rejects_out_of_bounds() {
        let mut pager =
            MemoryBlockPager::new(geometry(Interleave::Bip), vec![0u8; 24]).unwrap();
        let block = BlockRequest {
            start_row: 3,
            rows: 2,
            start_band: 0,
            bands: 2,
        };
        assert!(matches!(
            pager.fetch(&block),
            Err(RasterError::Fetch { .. })
        ));
    }
}
