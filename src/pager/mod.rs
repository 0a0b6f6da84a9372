//! Pagers: the components that turn block requests into raw bytes.
//!
//! A format-specific [`RasterPager`] translates a row/band range into I/O
//! against one particular file layout and nothing else; caching is strictly
//! the [`CachedPager`]'s job so format implementations stay interchangeable.
//!
//! - [`cache`]: reference-counted cache units and the bounded block cache
//! - [`cached`]: the caching engine layered over any [`RasterPager`]
//! - [`memory`]: page sources backed by a resident memory block
//! - [`flat`]: raw binary files (single- or per-band) with optional padding
//! - [`convert`]: interleave-converting page source

pub mod cache;
pub mod cached;
pub mod convert;
pub mod flat;
pub mod memory;

use std::path::Path;

use crate::error::RasterError;
use crate::types::Interleave;

pub use cache::{BlockCache, CacheUnit, UnitHandle, UnitKey};
pub use cached::CachedPager;
pub use flat::FlatFilePager;
pub use memory::{InMemoryPager, MemoryBlockPager};

/// Storage shape served by a pager, in the pager's own row/band numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagerGeometry {
    pub rows: usize,
    pub columns: usize,
    pub bands: usize,
    pub bytes_per_element: usize,
    pub interleave: Interleave,
}

impl PagerGeometry {
    /// Bands delivered together in one block: all of them for pixel- and
    /// line-interleaved data, one at a time for band-sequential data.
    pub fn bands_per_block(&self) -> usize {
        match self.interleave {
            Interleave::Bsq => 1,
            Interleave::Bip | Interleave::Bil => self.bands,
        }
    }

    /// Data bytes in one stored row of a block.
    pub fn row_bytes(&self) -> usize {
        self.columns * self.bands_per_block() * self.bytes_per_element
    }

    /// Data bytes in a block of `rows` stored rows.
    pub fn block_bytes(&self, rows: usize) -> usize {
        rows * self.row_bytes()
    }

    /// Total data bytes in the cube.
    pub fn total_bytes(&self) -> usize {
        self.rows * self.columns * self.bands * self.bytes_per_element
    }
}

/// A contiguous row/band range requested from a format pager, in the
/// pager's storage numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    pub start_row: usize,
    pub rows: usize,
    pub start_band: usize,
    pub bands: usize,
}

/// Format-specific block access. One implementation per supported file
/// format.
///
/// Implementations translate a block range into format I/O and must not
/// cache; a pager that cannot serve a multi-row range in one contiguous
/// operation returns `Ok(None)` from [`RasterPager::fetch`] and the caller
/// falls back to fetching row by row.
pub trait RasterPager: Send {
    /// Open the backing file(s). Failure here is fatal to the pager.
    fn open(&mut self, path: &Path) -> Result<(), RasterError>;

    /// Read the raw bytes of `block`, laid out in the pager's storage
    /// interleave with padding stripped. `Ok(None)` signals that the range
    /// cannot be served by a single contiguous fetch.
    fn fetch(&mut self, block: &BlockRequest) -> Result<Option<Vec<u8>>, RasterError>;

    /// Write `data` back over `block`. Only writable pagers implement this.
    fn write(&mut self, block: &BlockRequest, data: &[u8]) -> Result<(), RasterError> {
        let _ = (block, data);
        Err(RasterError::unsupported("pager is read-only"))
    }

    /// Whether [`RasterPager::write`] is available.
    fn is_writable(&self) -> bool {
        false
    }

    /// The storage shape this pager serves.
    fn geometry(&self) -> PagerGeometry;
}

/// A borrowed view over one cache unit, handed to an accessor.
///
/// `offset` locates the first requested element inside the unit's bytes;
/// `rows` says how many rows the accessor may walk before it must ask for
/// the next page. `columns` and `bands` describe the unit's own layout,
/// which can be wider than the accessor's request. `row_step` is the
/// number of stored rows one cursor row advances over; it exceeds 1 when
/// a strided row subset is served straight from its file.
#[derive(Debug, Clone)]
pub struct Page {
    pub unit: UnitHandle,
    pub offset: usize,
    pub rows: usize,
    pub columns: usize,
    pub bands: usize,
    pub row_step: usize,
}
