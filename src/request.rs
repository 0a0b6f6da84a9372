//! Cursor construction parameters.
//!
//! A [`DataRequest`] names the region an accessor will walk, the interleave
//! it wants the data presented in, and whether it intends to write. Unset
//! fields are filled from the element's descriptor by [`DataRequest::polish`]
//! before the request is validated.

use crate::descriptor::DataDescriptor;
use crate::dims::DimensionDescriptor;
use crate::error::RasterError;
use crate::types::Interleave;

/// Parameters for creating a [`crate::accessor::DataAccessor`].
#[derive(Debug, Clone, Default)]
pub struct DataRequest {
    interleave: Option<Interleave>,
    start_row: Option<DimensionDescriptor>,
    stop_row: Option<DimensionDescriptor>,
    start_column: Option<DimensionDescriptor>,
    stop_column: Option<DimensionDescriptor>,
    start_band: Option<DimensionDescriptor>,
    stop_band: Option<DimensionDescriptor>,
    concurrent_rows: Option<usize>,
    writable: bool,
}

impl DataRequest {
    /// Create a request with all defaults: the element's own interleave,
    /// the full active region, read-only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the data re-ordered into `interleave`.
    pub fn interleave(mut self, interleave: Interleave) -> Self {
        self.interleave = Some(interleave);
        self
    }

    /// Restrict the cursor to the active rows `start..=stop`.
    pub fn rows(mut self, start: DimensionDescriptor, stop: DimensionDescriptor) -> Self {
        self.start_row = Some(start);
        self.stop_row = Some(stop);
        self
    }

    /// Restrict the cursor to the active columns `start..=stop`.
    pub fn columns(mut self, start: DimensionDescriptor, stop: DimensionDescriptor) -> Self {
        self.start_column = Some(start);
        self.stop_column = Some(stop);
        self
    }

    /// Restrict the cursor to the active bands `start..=stop`.
    pub fn bands(mut self, start: DimensionDescriptor, stop: DimensionDescriptor) -> Self {
        self.start_band = Some(start);
        self.stop_band = Some(stop);
        self
    }

    /// Hint how many rows to materialize per fetch, trading memory for
    /// fetch overhead. Only converting accessors are sensitive to this;
    /// native accessors page at the cache's unit size.
    pub fn concurrent_rows(mut self, rows: usize) -> Self {
        self.concurrent_rows = Some(rows);
        self
    }

    /// Request write access. Writable cursors require a writable element
    /// and the element's native interleave.
    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// Fill unset fields from the element's descriptor.
    pub fn polish(&mut self, descriptor: &DataDescriptor) {
        if self.interleave.is_none() {
            self.interleave = Some(descriptor.interleave());
        }
        if self.start_row.is_none() {
            self.start_row = descriptor.rows().first().copied();
        }
        if self.stop_row.is_none() {
            self.stop_row = descriptor.rows().last().copied();
        }
        if self.start_column.is_none() {
            self.start_column = descriptor.columns().first().copied();
        }
        if self.stop_column.is_none() {
            self.stop_column = descriptor.columns().last().copied();
        }
        if self.start_band.is_none() {
            self.start_band = descriptor.bands().first().copied();
        }
        if self.stop_band.is_none() {
            self.stop_band = descriptor.bands().last().copied();
        }
        if self.concurrent_rows.is_none() {
            self.concurrent_rows = Some(1);
        }
    }

    /// Check a polished request against the element's descriptor.
    pub fn validate(&self, descriptor: &DataDescriptor) -> Result<(), RasterError> {
        let stop_row = self.checked_span(self.start_row, self.stop_row, "row")?;
        let stop_col = self.checked_span(self.start_column, self.stop_column, "column")?;
        let stop_band = self.checked_span(self.start_band, self.stop_band, "band")?;

        if stop_row >= descriptor.row_count()
            || stop_col >= descriptor.column_count()
            || stop_band >= descriptor.band_count()
        {
            return Err(RasterError::validation(
                "requested region exceeds the active data set",
            ));
        }

        let interleave = self.requested_interleave(descriptor);
        if self.writable && interleave != descriptor.interleave() {
            return Err(RasterError::validation(
                "writable cursors cannot request an interleave conversion",
            ));
        }
        Ok(())
    }

    /// Resolve one start/stop pair to active numbers and return the stop.
    fn checked_span(
        &self,
        start: Option<DimensionDescriptor>,
        stop: Option<DimensionDescriptor>,
        what: &str,
    ) -> Result<usize, RasterError> {
        let start = start
            .and_then(|d| d.active_number())
            .ok_or_else(|| RasterError::validation(format!("request start {what} is not active")))?;
        let stop = stop
            .and_then(|d| d.active_number())
            .ok_or_else(|| RasterError::validation(format!("request stop {what} is not active")))?;
        if start > stop {
            return Err(RasterError::validation(format!(
                "request start {what} {start} is past stop {what} {stop}"
            )));
        }
        Ok(stop)
    }

    /// The interleave the accessor will present, after polishing.
    pub fn requested_interleave(&self, descriptor: &DataDescriptor) -> Interleave {
        self.interleave.unwrap_or_else(|| descriptor.interleave())
    }

    pub fn start_row(&self) -> Option<DimensionDescriptor> {
        self.start_row
    }

    pub fn stop_row(&self) -> Option<DimensionDescriptor> {
        self.stop_row
    }

    pub fn start_column(&self) -> Option<DimensionDescriptor> {
        self.start_column
    }

    pub fn stop_column(&self) -> Option<DimensionDescriptor> {
        self.stop_column
    }

    pub fn start_band(&self) -> Option<DimensionDescriptor> {
        self.start_band
    }

    pub fn stop_band(&self) -> Option<DimensionDescriptor> {
        self.stop_band
    }

    pub fn concurrent_row_hint(&self) -> usize {
        self.concurrent_rows.unwrap_or(1)
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}
