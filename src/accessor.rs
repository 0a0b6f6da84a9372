//! Row-major cursors over an element's active data.
//!
//! A [`DataAccessor`] walks rows, columns, and (for band-sequential
//! cursors) bands of the active subset, hiding the cache and the storage
//! interleave behind it. The cursor borrows its element, so the backing
//! data cannot be destroyed underneath it, and holds at most one cache
//! unit at a time; walking past the unit boundary releases the old unit
//! and acquires the next.
//!
//! Row and column access return RAII guards into the current unit's bytes;
//! the unit itself owns the memory.

use std::ops::{Deref, DerefMut};
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use crate::element::RasterElement;
use crate::error::RasterError;
use crate::pager::Page;
use crate::request::DataRequest;
use crate::types::{Encoding, Endian, Interleave};

/// Read-only view of the cursor's current row or column span.
pub struct RowView<'a> {
    guard: RwLockReadGuard<'a, Vec<u8>>,
    start: usize,
    len: usize,
}

impl Deref for RowView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard[self.start..self.start + self.len]
    }
}

/// Writable view of the cursor's current row or column span. Creating one
/// marks the underlying cache unit dirty.
pub struct RowViewMut<'a> {
    guard: RwLockWriteGuard<'a, Vec<u8>>,
    start: usize,
    len: usize,
}

impl Deref for RowViewMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard[self.start..self.start + self.len]
    }
}

impl DerefMut for RowViewMut<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard[self.start..self.start + self.len]
    }
}

/// Cursor over an element's active subset.
pub struct DataAccessor<'a> {
    element: &'a RasterElement,
    interleave: Interleave,
    encoding: Encoding,
    endian: Endian,
    bytes_per_element: usize,
    concurrent_rows: usize,
    writable: bool,

    start_row: usize,
    stop_row: usize,
    start_col: usize,
    stop_col: usize,
    start_band: usize,
    stop_band: usize,

    page: Option<Page>,
    /// Active row the current page starts at.
    page_row: usize,
    /// Rows walked within the current page.
    current_row: usize,
    current_col: usize,
    /// Active band served by the current page (band-sequential cursors).
    band: usize,
    row_size: usize,
    col_size: usize,
    row_offset: usize,
    col_offset: usize,
    valid: bool,
}

impl<'a> DataAccessor<'a> {
    pub(crate) fn new(
        element: &'a RasterElement,
        request: DataRequest,
    ) -> Result<Self, RasterError> {
        let descriptor = element.descriptor();
        let interleave = request.requested_interleave(descriptor);

        let active = |dim: Option<crate::dims::DimensionDescriptor>, what: &str| {
            dim.and_then(|d| d.active_number())
                .ok_or_else(|| RasterError::invalid_access(format!("request {what} is not active")))
        };
        let start_row = active(request.start_row(), "start row")?;
        let stop_row = active(request.stop_row(), "stop row")?;
        let start_col = active(request.start_column(), "start column")?;
        let stop_col = active(request.stop_column(), "stop column")?;
        let start_band = active(request.start_band(), "start band")?;
        let stop_band = active(request.stop_band(), "stop band")?;

        let mut accessor = Self {
            element,
            interleave,
            encoding: descriptor.encoding(),
            endian: element.storage_endian(),
            bytes_per_element: descriptor.bytes_per_element(),
            concurrent_rows: request.concurrent_row_hint(),
            writable: request.is_writable(),
            start_row,
            stop_row,
            start_col,
            stop_col,
            start_band,
            stop_band,
            page: None,
            page_row: start_row,
            current_row: 0,
            current_col: 0,
            band: start_band,
            row_size: 0,
            col_size: 0,
            row_offset: 0,
            col_offset: 0,
            valid: true,
        };
        accessor.fetch_page(start_row)?;
        Ok(accessor)
    }

    /// Whether row and column access is currently backed by a page.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The active band the cursor is positioned on.
    pub fn band(&self) -> usize {
        self.band
    }

    /// Columns covered by one row view.
    pub fn column_count(&self) -> usize {
        self.stop_col - self.start_col + 1
    }

    /// Bytes in one row view.
    pub fn row_bytes(&self) -> usize {
        self.row_view_len()
    }

    /// Read the current row. The slice begins at the requested start
    /// column; for pixel-interleaved cursors it holds every band of each
    /// column in order.
    pub fn row(&self) -> Result<RowView<'_>, RasterError> {
        let page = self.page_ref()?;
        let guard = page.unit.read();
        let start = page.offset + self.row_offset;
        let len = self.row_view_len().min(guard.len().saturating_sub(start));
        Ok(RowView { guard, start, len })
    }

    /// Write the current row. Marks the backing unit dirty.
    pub fn row_mut(&mut self) -> Result<RowViewMut<'_>, RasterError> {
        self.check_writable()?;
        let wanted = self.row_view_len();
        let page = self.page_ref()?;
        let guard = page.unit.write();
        let start = page.offset + self.row_offset;
        let len = wanted.min(guard.len().saturating_sub(start));
        Ok(RowViewMut { guard, start, len })
    }

    /// Read the current column position: one pixel's bands for
    /// pixel-interleaved cursors, a single element otherwise.
    pub fn column(&self) -> Result<RowView<'_>, RasterError> {
        self.check_column()?;
        let page = self.page_ref()?;
        let guard = page.unit.read();
        let start = page.offset + self.row_offset + self.col_offset;
        let len = self.col_size.min(guard.len().saturating_sub(start));
        Ok(RowView { guard, start, len })
    }

    /// Write the current column position. Marks the backing unit dirty.
    pub fn column_mut(&mut self) -> Result<RowViewMut<'_>, RasterError> {
        self.check_writable()?;
        self.check_column()?;
        let wanted = self.col_size;
        let page = self.page_ref()?;
        let guard = page.unit.write();
        let start = page.offset + self.row_offset + self.col_offset;
        let len = wanted.min(guard.len().saturating_sub(start));
        Ok(RowViewMut { guard, start, len })
    }

    /// Decode the element `index` positions past the current column as an
    /// `f64`.
    pub fn value(&self, index: usize) -> Result<f64, RasterError> {
        self.check_column()?;
        let page = self.page_ref()?;
        let guard = page.unit.read();
        let at = page.offset + self.row_offset + self.col_offset + index * self.bytes_per_element;
        if at + self.bytes_per_element > guard.len() {
            return Err(RasterError::invalid_access(format!(
                "element index {index} is outside the current page"
            )));
        }
        Ok(self.encoding.decode(&guard[at..], self.endian))
    }

    /// Decode the element `index` positions past the current column as an
    /// `i64`, truncating any fractional part.
    pub fn value_as_i64(&self, index: usize) -> Result<i64, RasterError> {
        Ok(self.value(index)? as i64)
    }

    /// Encode `value` into the element `index` positions past the current
    /// column. Marks the backing unit dirty.
    pub fn set_value(&mut self, index: usize, value: f64) -> Result<(), RasterError> {
        self.check_writable()?;
        self.check_column()?;
        let bpe = self.bytes_per_element;
        let encoding = self.encoding;
        let endian = self.endian;
        let at = self.row_offset + self.col_offset + index * bpe;
        let page = self.page_ref()?;
        let mut guard = page.unit.write();
        let at = page.offset + at;
        if at + bpe > guard.len() {
            return Err(RasterError::invalid_access(format!(
                "element index {index} is outside the current page"
            )));
        }
        encoding.encode(value, endian, &mut guard[at..]);
        Ok(())
    }

    /// Advance to the next row, resetting the column to the start of the
    /// request. Crossing the page boundary releases the current unit and
    /// fetches the next one; walking past the requested stop row
    /// invalidates the cursor instead.
    pub fn next_row(&mut self) -> Result<(), RasterError> {
        if !self.valid {
            return Ok(());
        }
        self.current_row += 1;
        self.row_offset += self.row_size;
        self.current_col = 0;
        self.col_offset = 0;

        let row = self.page_row + self.current_row;
        if row > self.stop_row {
            self.release_page();
            return Ok(());
        }
        let page_rows = self.page.as_ref().map_or(0, |page| page.rows);
        if self.current_row >= page_rows {
            self.fetch_page(row)?;
        }
        Ok(())
    }

    /// Advance `count` columns within the current row.
    pub fn next_column(&mut self) {
        self.current_col += 1;
        self.col_offset += self.col_size;
    }

    /// Move a band-sequential cursor to the next requested band, resetting
    /// the row position to the start row. Revalidates a cursor that walked
    /// past its last row; invalidates past the stop band.
    pub fn next_band(&mut self) -> Result<(), RasterError> {
        if self.interleave != Interleave::Bsq {
            return Err(RasterError::invalid_access(
                "next_band requires a band-sequential cursor",
            ));
        }
        self.band += 1;
        if self.band > self.stop_band {
            self.release_page();
            return Ok(());
        }
        self.fetch_page(self.start_row)
    }

    /// Jump to the given active row and column within the current band.
    pub fn to_pixel(&mut self, row: usize, column: usize) -> Result<(), RasterError> {
        if row < self.start_row
            || row > self.stop_row
            || column < self.start_col
            || column > self.stop_col
        {
            self.release_page();
            return Err(RasterError::invalid_access(format!(
                "pixel ({row}, {column}) is outside the requested region"
            )));
        }
        self.valid = true;

        let in_page = self
            .page
            .as_ref()
            .is_some_and(|page| row >= self.page_row && row < self.page_row + page.rows);
        if in_page {
            self.current_row = row - self.page_row;
            self.row_offset = self.current_row * self.row_size;
        } else {
            self.fetch_page(row)?;
            self.current_row = 0;
            self.row_offset = 0;
        }
        self.current_col = column - self.start_col;
        self.col_offset = self.current_col * self.col_size;
        Ok(())
    }

    /// Fetch the page covering active `row` for the current band and reset
    /// the intra-page position to its start.
    fn fetch_page(&mut self, row: usize) -> Result<(), RasterError> {
        let page = self.element.page_for(
            self.interleave,
            row,
            self.start_col,
            self.band,
            self.concurrent_rows,
        )?;
        match page {
            Some(page) => {
                self.update_sizes(&page);
                self.page = Some(page);
                self.page_row = row;
                self.current_row = 0;
                self.current_col = 0;
                self.row_offset = 0;
                self.col_offset = 0;
                self.valid = true;
                Ok(())
            }
            None => {
                self.release_page();
                Ok(())
            }
        }
    }

    fn release_page(&mut self) {
        self.page = None;
        self.valid = false;
    }

    /// Derive row and column strides from the page layout. A page serving
    /// a strided row subset advances `row_step` stored rows per cursor
    /// row.
    fn update_sizes(&mut self, page: &Page) {
        let bpe = self.bytes_per_element;
        match self.interleave {
            Interleave::Bip => {
                self.col_size = bpe * page.bands;
                self.row_size = self.col_size * page.columns;
            }
            Interleave::Bil => {
                self.col_size = bpe;
                self.row_size = bpe * page.columns * page.bands;
            }
            Interleave::Bsq => {
                self.col_size = bpe;
                self.row_size = bpe * page.columns;
            }
        }
        self.row_size *= page.row_step.max(1);
    }

    fn row_view_len(&self) -> usize {
        let span = self.column_count();
        match self.interleave {
            Interleave::Bip | Interleave::Bsq => span * self.col_size,
            Interleave::Bil => {
                let page_bands = self.page.as_ref().map_or(1, |p| p.bands);
                let page_columns = self.page.as_ref().map_or(span, |p| p.columns);
                // Spans through the last band's columns; bands are
                // column-major within the row block.
                (page_bands - 1) * page_columns * self.bytes_per_element
                    + span * self.bytes_per_element
            }
        }
    }

    fn page_ref(&self) -> Result<&Page, RasterError> {
        if !self.valid {
            return Err(RasterError::invalid_access("cursor is past its end"));
        }
        self.page
            .as_ref()
            .ok_or_else(|| RasterError::invalid_access("cursor has no backing page"))
    }

    fn check_writable(&self) -> Result<(), RasterError> {
        if !self.writable {
            return Err(RasterError::unsupported("cursor is read-only"));
        }
        Ok(())
    }

    fn check_column(&self) -> Result<(), RasterError> {
        if self.start_col + self.current_col > self.stop_col {
            return Err(RasterError::invalid_access(format!(
                "column {} is past the requested stop column {}",
                self.start_col + self.current_col,
                self.stop_col
            )));
        }
        Ok(())
    }
}
