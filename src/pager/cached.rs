//! The caching engine layered over a format pager.
//!
//! Decouples the unit granularity of block I/O from the arbitrary row
//! ranges accessors ask for: requests are mapped onto fixed-geometry cache
//! units, fetched through the format pager on a miss, and served from the
//! bounded [`BlockCache`] on a hit. Dirty units are written back through
//! the format pager before eviction and on [`CachedPager::flush`].

use std::sync::{Arc, Mutex};

use crate::config::EngineConfig;
use crate::error::RasterError;
use crate::pager::cache::{BlockCache, CacheUnit, UnitHandle, UnitKey};
use crate::pager::{BlockRequest, Page, PagerGeometry, RasterPager};
use crate::types::Interleave;

/// Bounded cache of fixed-size units in front of a [`RasterPager`].
pub struct CachedPager {
    format: Mutex<Box<dyn RasterPager>>,
    cache: Mutex<BlockCache>,
    geometry: PagerGeometry,
    rows_per_unit: usize,
    writable: bool,
}

impl CachedPager {
    /// Wrap an already-open format pager. Unit geometry and the byte
    /// capacity come from `config`.
    pub fn new(format: Box<dyn RasterPager>, config: &EngineConfig) -> Self {
        let geometry = format.geometry();
        let writable = format.is_writable();
        Self {
            format: Mutex::new(format),
            cache: Mutex::new(BlockCache::new(config.cache_capacity_bytes)),
            geometry,
            rows_per_unit: config.rows_per_unit.max(1),
            writable,
        }
    }

    pub fn geometry(&self) -> PagerGeometry {
        self.geometry
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Serve a page starting at the given storage position, fetching the
    /// covering unit if it is not cached. Returns `Ok(None)` past the end
    /// of the data, which invalidates the requesting cursor.
    pub fn page(
        &self,
        start_row: usize,
        start_col: usize,
        start_band: usize,
    ) -> Result<Option<Page>, RasterError> {
        let g = &self.geometry;
        if start_row >= g.rows || start_col >= g.columns || start_band >= g.bands {
            return Ok(None);
        }

        let unit = self.fetch_unit(start_row, start_band)?;
        let bpe = g.bytes_per_element;
        let row_bytes = g.row_bytes();
        let row_rel = start_row - unit.start_row();
        let offset = row_rel * row_bytes
            + match g.interleave {
                Interleave::Bip => (start_col * g.bands + start_band) * bpe,
                Interleave::Bil => (start_band * g.columns + start_col) * bpe,
                Interleave::Bsq => start_col * bpe,
            };

        Ok(Some(Page {
            rows: unit.rows() - row_rel,
            columns: g.columns,
            bands: g.bands_per_block(),
            offset,
            unit,
            row_step: 1,
        }))
    }

    /// Get or create the cache unit covering `start_row` of the band chunk
    /// containing `start_band`.
    fn fetch_unit(&self, start_row: usize, start_band: usize) -> Result<UnitHandle, RasterError> {
        let g = &self.geometry;
        let unit_row = start_row - start_row % self.rows_per_unit;
        let unit_band = match g.interleave {
            Interleave::Bsq => start_band,
            Interleave::Bip | Interleave::Bil => 0,
        };
        let key = UnitKey {
            start_row: unit_row,
            start_band: unit_band,
        };

        let mut cache = self.cache.lock().unwrap();
        if let Some(unit) = cache.get(&key) {
            log::trace!("cache hit for unit at row {unit_row} band {unit_band}");
            return Ok(unit);
        }

        let rows = self.rows_per_unit.min(g.rows - unit_row);
        let bands = g.bands_per_block();
        let block = BlockRequest {
            start_row: unit_row,
            rows,
            start_band: unit_band,
            bands,
        };
        let row_bytes = g.row_bytes();

        let mut format = self.format.lock().unwrap();
        let data = match format.fetch(&block)? {
            Some(bytes) => bytes,
            None => {
                // The format cannot serve the range in one contiguous
                // operation; assemble the unit row by row.
                log::trace!("assembling unit at row {unit_row} from single-row fetches");
                let mut buf = vec![0u8; rows * row_bytes];
                for row in 0..rows {
                    let row_block = BlockRequest {
                        start_row: unit_row + row,
                        rows: 1,
                        start_band: unit_band,
                        bands,
                    };
                    let row_data = format.fetch(&row_block)?.ok_or_else(|| {
                        RasterError::fetch(format!(
                            "pager declined single-row fetch at row {}",
                            unit_row + row
                        ))
                    })?;
                    buf[row * row_bytes..(row + 1) * row_bytes]
                        .copy_from_slice(&row_data[..row_bytes]);
                }
                buf
            }
        };
        if data.len() != rows * row_bytes {
            return Err(RasterError::fetch(format!(
                "pager returned {} bytes for a {} byte block",
                data.len(),
                rows * row_bytes
            )));
        }

        let unit = Arc::new(CacheUnit::new(unit_row, rows, unit_band, bands, data));
        let evicted = cache.insert(key, Arc::clone(&unit));
        drop(cache);

        for old in evicted {
            if old.is_dirty() && self.writable {
                write_unit(format.as_mut(), &old)?;
            }
        }
        Ok(unit)
    }

    /// Write every dirty unit back through the format pager. A no-op for
    /// read-only pagers.
    pub fn flush(&self) -> Result<(), RasterError> {
        if !self.writable {
            return Ok(());
        }
        let dirty = self.cache.lock().unwrap().dirty_units();
        if dirty.is_empty() {
            return Ok(());
        }
        log::debug!("writing back {} dirty unit(s)", dirty.len());
        let mut format = self.format.lock().unwrap();
        for unit in dirty {
            write_unit(format.as_mut(), &unit)?;
        }
        Ok(())
    }

    /// Number of units currently cached.
    pub fn cached_units(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

fn write_unit(format: &mut dyn RasterPager, unit: &CacheUnit) -> Result<(), RasterError> {
    let block = BlockRequest {
        start_row: unit.start_row(),
        rows: unit.rows(),
        start_band: unit.start_band(),
        bands: unit.bands(),
    };
    format.write(&block, &unit.read())?;
    unit.clear_dirty();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::memory::MemoryBlockPager;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Format pager test double that counts fetches and can refuse
    /// multi-row blocks.
    struct CountingPager {
        inner: MemoryBlockPager,
        fetches: Arc<AtomicUsize>,
        single_row_only: bool,
    }

    impl RasterPager for CountingPager {
        fn open(&mut self, path: &Path) -> Result<(), RasterError> {
            self.inner.open(path)
        }

        fn fetch(&mut self, block: &BlockRequest) -> Result<Option<Vec<u8>>, RasterError> {
            if self.single_row_only && block.rows > 1 {
                return Ok(None);
            }
            self.fetches.fetch_add(1, Ordering::Relaxed);
            self.inner.fetch(block)
        }

        fn geometry(&self) -> PagerGeometry {
            self.inner.geometry()
        }
    }

    fn geometry() -> PagerGeometry {
        PagerGeometry {
            rows: 16,
            columns: 4,
            bands: 2,
            bytes_per_element: 1,
            interleave: Interleave::Bsq,
        }
    }

    fn cube_bytes() -> Vec<u8> {
        (0..128).collect()
    }

    fn counting_pager(single_row_only: bool) -> (Box<dyn RasterPager>, Arc<AtomicUsize>) {
        let fetches = Arc::new(AtomicUsize::new(0));
        let pager = CountingPager {
            inner: MemoryBlockPager::new(geometry(), cube_bytes()).unwrap(),
            fetches: Arc::clone(&fetches),
            single_row_only,
        };
        (Box::new(pager), fetches)
    }

    fn config(rows_per_unit: usize, capacity: usize) -> EngineConfig {
        EngineConfig {
            rows_per_unit,
            cache_capacity_bytes: capacity,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_repeated_pages_hit_cache() {
        let (format, fetches) = counting_pager(false);
        let cached = CachedPager::new(format, &config(4, 1024));

        for _ in 0..10 {
            let page = cached.page(1, 0, 0).unwrap().unwrap();
            assert_eq!(page.unit.start_row(), 0);
        }
        assert_eq!(fetches.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_page_offset_within_unit() {
        let (format, _) = counting_pager(false);
        let cached = CachedPager::new(format, &config(4, 1024));

        // BSQ band 1, row 5 sits in the unit covering rows 4..8.
        let page = cached.page(5, 2, 1).unwrap().unwrap();
        assert_eq!(page.unit.start_band(), 1);
        // One row into the unit (4 bytes) plus 2 columns.
        assert_eq!(page.offset, 6);
        assert_eq!(page.rows, 3);
        let expected = cube_bytes()[64 + 5 * 4 + 2];
        assert_eq!(page.unit.read()[page.offset], expected);
    }

    #[test]
    fn test_past_end_returns_none() {
        let (format, _) = counting_pager(false);
        let cached = CachedPager::new(format, &config(4, 1024));
        assert!(cached.page(16, 0, 0).unwrap().is_none());
        assert!(cached.page(0, 0, 2).unwrap().is_none());
    }

    #[test]
    fn test_single_row_fallback_assembles_unit() {
        let (format, fetches) = counting_pager(true);
        let cached = CachedPager::new(format, &config(4, 1024));

        let page = cached.page(0, 0, 0).unwrap().unwrap();
        assert_eq!(page.rows, 4);
        assert_eq!(fetches.load(Ordering::Relaxed), 4);
        assert_eq!(&page.unit.read()[..16], &cube_bytes()[..16]);
    }

    #[test]
    fn test_dirty_unit_written_back_on_eviction() {
        use crate::pager::flat::FlatFilePager;

        let mut file_pager = FlatFilePager::create_temp(geometry()).unwrap();
        let seed = cube_bytes();
        file_pager
            .write(
                &BlockRequest {
                    start_row: 0,
                    rows: 16,
                    start_band: 0,
                    bands: 1,
                },
                &seed[..64],
            )
            .unwrap();
        file_pager
            .write(
                &BlockRequest {
                    start_row: 0,
                    rows: 16,
                    start_band: 1,
                    bands: 1,
                },
                &seed[64..],
            )
            .unwrap();

        // Capacity of one 16-byte unit forces eviction on the second fetch.
        let cached = CachedPager::new(Box::new(file_pager), &config(4, 16));
        {
            let page = cached.page(0, 0, 0).unwrap().unwrap();
            page.unit.write()[0] = 0xFF;
        }
        let _other = cached.page(8, 0, 1).unwrap().unwrap();

        // Cold read of the first unit sees the written byte.
        let page = cached.page(0, 0, 0).unwrap().unwrap();
        assert_eq!(page.unit.read()[0], 0xFF);
    }

    #[test]
    fn test_flush_persists_dirty_units() {
        use crate::pager::flat::FlatFilePager;

        let mut pager = FlatFilePager::create_temp(geometry()).unwrap();
        let seed = cube_bytes();
        for band in 0..2 {
            pager
                .write(
                    &BlockRequest {
                        start_row: 0,
                        rows: 16,
                        start_band: band,
                        bands: 1,
                    },
                    &seed[band * 64..(band + 1) * 64],
                )
                .unwrap();
        }
        let path = pager.path().to_path_buf();
        let cached = CachedPager::new(Box::new(pager), &config(4, 1024));

        {
            let page = cached.page(2, 0, 0).unwrap().unwrap();
            let offset = page.offset;
            page.unit.write()[offset] = 0x7E;
        }
        cached.flush().unwrap();

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(on_disk[2 * 4], 0x7E);
    }
}
