//! Raster elements: a descriptor bound to a data source.
//!
//! An element owns its [`DataDescriptor`] and, once a source is attached,
//! serves cursors over the active data. The source is either a resident
//! memory block, a cached pager over the original file (read-only), or a
//! cached pager over a temporary backing file (read-write). The element is
//! also where data is streamed between processing locations: `copy_data_to`
//! walks a source element and a destination element row by row, converting
//! interleave and encoding on the way.

use std::sync::Arc;

use crate::accessor::DataAccessor;
use crate::config::EngineConfig;
use crate::descriptor::DataDescriptor;
use crate::dims::{DimensionDescriptor, determine_skip_factor};
use crate::error::RasterError;
use crate::pager::cached::CachedPager;
use crate::pager::convert::converted_page;
use crate::pager::flat::FlatFilePager;
use crate::pager::memory::InMemoryPager;
use crate::pager::{Page, PagerGeometry, RasterPager};
use crate::progress::{AbortFlag, Progress, ReportingLevel};
use crate::request::DataRequest;
use crate::types::{Endian, Interleave, ProcessingLocation};

/// Match `chip` dimensions back to the entries of `source` they were cut
/// from, pairing by original number. The result carries `source`'s own
/// numbering.
pub(crate) fn match_dims(
    source: &[DimensionDescriptor],
    chip: &[DimensionDescriptor],
) -> Vec<DimensionDescriptor> {
    let mut matched = Vec::with_capacity(chip.len());
    let mut chip_iter = chip.iter().peekable();
    for dim in source {
        let Some(next) = chip_iter.peek() else {
            break;
        };
        if dim.original_number() == next.original_number() {
            matched.push(*dim);
            chip_iter.next();
        }
    }
    matched
}

enum ElementSource {
    Memory(InMemoryPager),
    Disk {
        pager: CachedPager,
        /// Whether active positions must be translated through the
        /// descriptor's on-disk numbering. False for temporary backing
        /// files, which store exactly the active cube.
        maps_on_disk: bool,
    },
}

impl ElementSource {
    fn geometry(&self) -> PagerGeometry {
        match self {
            ElementSource::Memory(pager) => pager.geometry(),
            ElementSource::Disk { pager, .. } => pager.geometry(),
        }
    }

    fn is_writable(&self) -> bool {
        match self {
            ElementSource::Memory(_) => true,
            ElementSource::Disk { pager, .. } => pager.is_writable(),
        }
    }
}

/// A dataset bound to a data source.
pub struct RasterElement {
    descriptor: DataDescriptor,
    source: Option<ElementSource>,
}

impl std::fmt::Debug for RasterElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterElement")
            .field("descriptor", &self.descriptor)
            .field("has_source", &self.source.is_some())
            .finish()
    }
}

impl RasterElement {
    /// Create an element with no data source attached. Cursors fail until
    /// a source exists.
    pub fn new(descriptor: DataDescriptor) -> Self {
        Self {
            descriptor,
            source: None,
        }
    }

    pub fn descriptor(&self) -> &DataDescriptor {
        &self.descriptor
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Attach an opened format pager, serving the original file directly.
    ///
    /// The pager's shape must match the file descriptor, and the active
    /// row/column subsets must be contiguous on disk, since cursor
    /// positions translate to storage positions by a constant offset.
    pub fn attach_pager(
        &mut self,
        format: Box<dyn RasterPager>,
        config: &EngineConfig,
    ) -> Result<(), RasterError> {
        let file = self.descriptor.file();
        let geometry = format.geometry();
        if geometry.rows != file.row_count()
            || geometry.columns != file.column_count()
            || geometry.bands != file.band_count()
        {
            return Err(RasterError::validation(format!(
                "pager shape {}x{}x{} does not match the file descriptor",
                geometry.rows, geometry.columns, geometry.bands
            )));
        }
        // Rows may be strided (the page layer walks the file at the row
        // pitch), but columns must be contiguous: column gaps would break
        // the in-row stride every cursor relies on.
        if determine_skip_factor(self.descriptor.columns()) != Some(1) {
            return Err(RasterError::validation(
                "attached pagers require a contiguous on-disk column subset",
            ));
        }
        self.source = Some(ElementSource::Disk {
            pager: CachedPager::new(format, config),
            maps_on_disk: true,
        });
        Ok(())
    }

    /// Allocate the default data source for the descriptor's processing
    /// location: a memory block for [`ProcessingLocation::InMemory`], a
    /// temporary backing file for [`ProcessingLocation::OnDiskReadWrite`].
    pub fn create_default_source(&mut self, config: &EngineConfig) -> Result<(), RasterError> {
        if self.source.is_some() {
            return Ok(());
        }
        let geometry = PagerGeometry {
            rows: self.descriptor.row_count(),
            columns: self.descriptor.column_count(),
            bands: self.descriptor.band_count(),
            bytes_per_element: self.descriptor.bytes_per_element(),
            interleave: self.descriptor.interleave(),
        };
        match self.descriptor.processing_location() {
            ProcessingLocation::InMemory => {
                self.source = Some(ElementSource::Memory(InMemoryPager::allocate(geometry)?));
            }
            ProcessingLocation::OnDiskReadWrite => {
                let pager = FlatFilePager::create_temp(geometry)?;
                self.source = Some(ElementSource::Disk {
                    pager: CachedPager::new(Box::new(pager), config),
                    maps_on_disk: false,
                });
            }
            ProcessingLocation::OnDiskReadOnly => {
                return Err(RasterError::validation(
                    "read-only elements are served by a format pager, not a default source",
                ));
            }
        }
        Ok(())
    }

    /// Byte order of the element's stored data: the file's for attached
    /// pagers, the host's for memory blocks and temporary files.
    pub fn storage_endian(&self) -> Endian {
        match &self.source {
            Some(ElementSource::Disk {
                maps_on_disk: true, ..
            }) => self.descriptor.file().endian(),
            _ => Endian::native(),
        }
    }

    /// Create a cursor over the active data.
    pub fn accessor(&self, mut request: DataRequest) -> Result<DataAccessor<'_>, RasterError> {
        request.polish(&self.descriptor);
        request.validate(&self.descriptor)?;
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| RasterError::invalid_access("element has no data source attached"))?;
        if request.is_writable() && !source.is_writable() {
            return Err(RasterError::validation(
                "cannot get a writable cursor to a read-only element",
            ));
        }
        DataAccessor::new(self, request)
    }

    /// Write every dirty cache unit back to the backing store.
    pub fn flush(&self) -> Result<(), RasterError> {
        match &self.source {
            Some(ElementSource::Disk { pager, .. }) => pager.flush(),
            _ => Ok(()),
        }
    }

    /// Serve a page starting at the given active position, presented in
    /// `interleave`. Returns `Ok(None)` past the end of the active data.
    pub(crate) fn page_for(
        &self,
        interleave: Interleave,
        row: usize,
        col: usize,
        band: usize,
        rows_hint: usize,
    ) -> Result<Option<Page>, RasterError> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| RasterError::invalid_access("element has no data source attached"))?;
        let storage = source.geometry();
        if interleave == storage.interleave {
            return self.native_page(source, row, col, band);
        }
        let active_geometry = PagerGeometry {
            rows: self.descriptor.row_count(),
            columns: self.descriptor.column_count(),
            bands: self.descriptor.band_count(),
            bytes_per_element: self.descriptor.bytes_per_element(),
            interleave: storage.interleave,
        };
        converted_page(
            |r, c, b| self.native_page(source, r, c, b),
            active_geometry,
            storage.columns,
            interleave,
            row,
            col,
            band,
            rows_hint,
        )
    }

    /// Serve a page in the storage interleave at an active position.
    fn native_page(
        &self,
        source: &ElementSource,
        row: usize,
        col: usize,
        band: usize,
    ) -> Result<Option<Page>, RasterError> {
        let desc = &self.descriptor;
        if row >= desc.row_count() || col >= desc.column_count() || band >= desc.band_count() {
            return Ok(None);
        }
        match source {
            ElementSource::Memory(pager) => Ok(pager.page(row, col, band)),
            ElementSource::Disk {
                pager,
                maps_on_disk,
            } => {
                let (storage_row, storage_col, storage_band) = if *maps_on_disk {
                    let missing =
                        || RasterError::invalid_access("active dimension has no on-disk number");
                    (
                        desc.rows()[row].on_disk_number().ok_or_else(missing)?,
                        desc.columns()[col].on_disk_number().ok_or_else(missing)?,
                        desc.bands()[band].on_disk_number().ok_or_else(missing)?,
                    )
                } else {
                    (row, col, band)
                };
                let page = pager.page(storage_row, storage_col, storage_band)?;
                // A uniformly strided row subset walks the unit at a
                // multiple of the stored row pitch; an irregular subset
                // falls back to one page per row.
                let stride = determine_skip_factor(desc.rows());
                Ok(page.map(|mut page| {
                    match stride {
                        Some(step) => {
                            let reachable = page.rows.div_ceil(step);
                            page.rows = reachable.min(desc.row_count() - row);
                            page.row_step = step;
                        }
                        None => {
                            page.rows = 1;
                            page.row_step = 1;
                        }
                    }
                    page
                }))
            }
        }
    }

    /// Decode a single element at an active (row, column, band) position.
    pub fn pixel_value(&self, row: usize, col: usize, band: usize) -> Result<f64, RasterError> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| RasterError::invalid_access("element has no data source attached"))?;
        let storage_interleave = source.geometry().interleave;
        let page = self
            .page_for(storage_interleave, row, col, band, 1)?
            .ok_or_else(|| {
                RasterError::invalid_access(format!("pixel ({row}, {col}, {band}) is out of range"))
            })?;
        let guard = page.unit.read();
        Ok(self
            .descriptor
            .encoding()
            .decode(&guard[page.offset..], self.storage_endian()))
    }

    /// Replace non-finite values in a floating-point element with
    /// `replacement`, returning how many were replaced. Integer encodings
    /// are untouched.
    pub fn sanitize(&self, replacement: f64) -> Result<u64, RasterError> {
        let encoding = self.descriptor.encoding();
        if !encoding.is_floating_point() {
            return Ok(0);
        }
        let endian = self.storage_endian();
        let bpe = encoding.bytes();
        let band_passes = match self.descriptor.interleave() {
            Interleave::Bsq => self.descriptor.band_count(),
            Interleave::Bip | Interleave::Bil => 1,
        };
        let rows = self.descriptor.row_count();

        let mut replaced = 0u64;
        let mut cursor = self.accessor(DataRequest::new().writable(true))?;
        for pass in 0..band_passes {
            for _ in 0..rows {
                {
                    let mut row = cursor.row_mut()?;
                    for at in (0..row.len()).step_by(bpe) {
                        let value = encoding.decode(&row[at..], endian);
                        if !value.is_finite() {
                            encoding.encode(replacement, endian, &mut row[at..]);
                            replaced += 1;
                        }
                    }
                }
                cursor.next_row()?;
            }
            if pass + 1 < band_passes {
                cursor.next_band()?;
            }
        }
        self.flush()?;
        Ok(replaced)
    }

    /// Copy the selected region of this element into `dest`, converting
    /// interleave and encoding as the destination descriptor demands.
    ///
    /// The selection vectors carry this element's active numbering and
    /// must match the destination's shape. The abort flag is polled after
    /// every destination row; on abort the rows written so far are flushed
    /// and left in place.
    pub fn copy_data_to(
        &self,
        dest: &RasterElement,
        selected_rows: &[DimensionDescriptor],
        selected_columns: &[DimensionDescriptor],
        selected_bands: &[DimensionDescriptor],
        abort: &AbortFlag,
        progress: &mut dyn Progress,
    ) -> Result<(), RasterError> {
        let dest_desc = dest.descriptor();
        if selected_rows.len() != dest_desc.row_count()
            || selected_columns.len() != dest_desc.column_count()
            || selected_bands.len() != dest_desc.band_count()
        {
            return Err(RasterError::validation(
                "selection does not match the destination shape",
            ));
        }
        if selected_rows.is_empty() || selected_columns.is_empty() || selected_bands.is_empty() {
            return Err(RasterError::validation("selection is empty"));
        }

        match dest_desc.interleave() {
            Interleave::Bip => {
                self.copy_bip(dest, selected_rows, selected_columns, selected_bands, abort, progress)
            }
            Interleave::Bil => {
                self.copy_bil(dest, selected_rows, selected_columns, selected_bands, abort, progress)
            }
            Interleave::Bsq => {
                self.copy_bsq(dest, selected_rows, selected_columns, selected_bands, abort, progress)
            }
        }
    }

    fn same_representation(&self, dest: &RasterElement) -> bool {
        self.descriptor.encoding() == dest.descriptor.encoding()
            && self.storage_endian() == dest.storage_endian()
    }

    fn convert_element(
        &self,
        dest: &RasterElement,
        src: &[u8],
        dst: &mut [u8],
        same_repr: bool,
    ) {
        if same_repr {
            let bpe = self.descriptor.bytes_per_element();
            dst[..bpe].copy_from_slice(&src[..bpe]);
        } else {
            let value = self
                .descriptor
                .encoding()
                .decode(src, self.storage_endian());
            dest.descriptor
                .encoding()
                .encode(value, dest.storage_endian(), dst);
        }
    }

    fn copy_bip(
        &self,
        dest: &RasterElement,
        selected_rows: &[DimensionDescriptor],
        selected_columns: &[DimensionDescriptor],
        selected_bands: &[DimensionDescriptor],
        abort: &AbortFlag,
        progress: &mut dyn Progress,
    ) -> Result<(), RasterError> {
        progress.update("Copying data", 0, ReportingLevel::Normal);
        let src_desc = self.descriptor();
        let same_repr = self.same_representation(dest);
        let full_bands = selected_bands.len() == src_desc.band_count();
        let fast = full_bands && same_repr && contiguous(selected_columns);

        let mut dst = dest.accessor(DataRequest::new().interleave(Interleave::Bip).writable(true))?;
        let total = selected_rows.len();

        if fast {
            let first_col = active_of(&selected_columns[0])?;
            let request = DataRequest::new()
                .interleave(Interleave::Bip)
                .rows(selected_rows[0], selected_rows[selected_rows.len() - 1])
                .columns(
                    selected_columns[0],
                    selected_columns[selected_columns.len() - 1],
                );
            let mut src = self.accessor(request)?;
            let copy_bytes = src_desc.bytes_per_element()
                * selected_bands.len()
                * selected_columns.len();

            for (step, row) in selected_rows.iter().enumerate() {
                src.to_pixel(active_of(row)?, first_col)?;
                {
                    let srow = src.row()?;
                    let mut drow = dst.row_mut()?;
                    drow[..copy_bytes].copy_from_slice(&srow[..copy_bytes]);
                }
                dst.next_row()?;
                report_row(progress, step, total);
                check_abort(dest, abort)?;
            }
            return Ok(());
        }

        // Element-by-element path: works for any selection and encoding.
        let request = DataRequest::new()
            .interleave(Interleave::Bip)
            .rows(selected_rows[0], selected_rows[selected_rows.len() - 1]);
        let mut src = self.accessor(request)?;
        let src_bands = src_desc.band_count();
        let src_bpe = src_desc.bytes_per_element();
        let dst_bpe = dest.descriptor().bytes_per_element();

        for (step, row) in selected_rows.iter().enumerate() {
            src.to_pixel(active_of(row)?, 0)?;
            {
                let srow = src.row()?;
                let mut drow = dst.row_mut()?;
                let mut at = 0;
                for col in selected_columns {
                    let c = active_of(col)?;
                    for band in selected_bands {
                        let b = active_of(band)?;
                        let s = (c * src_bands + b) * src_bpe;
                        self.convert_element(dest, &srow[s..], &mut drow[at..], same_repr);
                        at += dst_bpe;
                    }
                }
            }
            dst.next_row()?;
            report_row(progress, step, total);
            check_abort(dest, abort)?;
        }
        Ok(())
    }

    fn copy_bsq(
        &self,
        dest: &RasterElement,
        selected_rows: &[DimensionDescriptor],
        selected_columns: &[DimensionDescriptor],
        selected_bands: &[DimensionDescriptor],
        abort: &AbortFlag,
        progress: &mut dyn Progress,
    ) -> Result<(), RasterError> {
        progress.update("Copying data", 0, ReportingLevel::Normal);
        let src_desc = self.descriptor();
        let same_repr = self.same_representation(dest);
        let fast = same_repr && contiguous(selected_columns);
        let src_bpe = src_desc.bytes_per_element();
        let dst_bpe = dest.descriptor().bytes_per_element();

        let mut dst = dest.accessor(DataRequest::new().interleave(Interleave::Bsq).writable(true))?;
        let total = selected_bands.len() * selected_rows.len();
        let mut step = 0;

        for (band_index, band) in selected_bands.iter().enumerate() {
            let mut request = DataRequest::new()
                .interleave(Interleave::Bsq)
                .rows(selected_rows[0], selected_rows[selected_rows.len() - 1])
                .bands(*band, *band);
            if fast {
                request = request.columns(
                    selected_columns[0],
                    selected_columns[selected_columns.len() - 1],
                );
            }
            let mut src = self.accessor(request)?;
            let first_col = if fast {
                active_of(&selected_columns[0])?
            } else {
                0
            };

            for row in selected_rows {
                src.to_pixel(active_of(row)?, first_col)?;
                {
                    let srow = src.row()?;
                    let mut drow = dst.row_mut()?;
                    if fast {
                        let copy_bytes = src_bpe * selected_columns.len();
                        drow[..copy_bytes].copy_from_slice(&srow[..copy_bytes]);
                    } else {
                        let mut at = 0;
                        for col in selected_columns {
                            let s = active_of(col)? * src_bpe;
                            self.convert_element(dest, &srow[s..], &mut drow[at..], same_repr);
                            at += dst_bpe;
                        }
                    }
                }
                dst.next_row()?;
                report_row(progress, step, total);
                step += 1;
                check_abort(dest, abort)?;
            }
            if band_index + 1 < selected_bands.len() {
                dst.next_band()?;
            }
        }
        Ok(())
    }

    fn copy_bil(
        &self,
        dest: &RasterElement,
        selected_rows: &[DimensionDescriptor],
        selected_columns: &[DimensionDescriptor],
        selected_bands: &[DimensionDescriptor],
        abort: &AbortFlag,
        progress: &mut dyn Progress,
    ) -> Result<(), RasterError> {
        progress.update("Copying data", 0, ReportingLevel::Normal);
        let src_desc = self.descriptor();
        let same_repr = self.same_representation(dest);
        let full_row = selected_columns.len() == src_desc.column_count()
            && selected_bands.len() == src_desc.band_count();
        let fast = full_row && same_repr;

        let request = DataRequest::new()
            .interleave(Interleave::Bil)
            .rows(selected_rows[0], selected_rows[selected_rows.len() - 1]);
        let mut src = self.accessor(request)?;
        let mut dst = dest.accessor(DataRequest::new().interleave(Interleave::Bil).writable(true))?;

        let src_cols = src_desc.column_count();
        let src_bpe = src_desc.bytes_per_element();
        let dst_bpe = dest.descriptor().bytes_per_element();
        let sel_cols = selected_columns.len();
        let total = selected_rows.len();

        for (step, row) in selected_rows.iter().enumerate() {
            src.to_pixel(active_of(row)?, 0)?;
            {
                let srow = src.row()?;
                let mut drow = dst.row_mut()?;
                if fast {
                    let copy_bytes = src_bpe * src_cols * src_desc.band_count();
                    drow[..copy_bytes].copy_from_slice(&srow[..copy_bytes]);
                } else {
                    for (bi, band) in selected_bands.iter().enumerate() {
                        let b = active_of(band)?;
                        for (ci, col) in selected_columns.iter().enumerate() {
                            let c = active_of(col)?;
                            let s = (b * src_cols + c) * src_bpe;
                            let d = (bi * sel_cols + ci) * dst_bpe;
                            self.convert_element(dest, &srow[s..], &mut drow[d..], same_repr);
                        }
                    }
                }
            }
            dst.next_row()?;
            report_row(progress, step, total);
            check_abort(dest, abort)?;
        }
        Ok(())
    }

    /// Cut a new in-memory element out of this one.
    ///
    /// The dimension vectors are subsets of this element's active
    /// dimensions, e.g. produced by
    /// [`crate::dims::subset_dimension_vector`].
    pub fn create_chip(
        &self,
        name: impl Into<String>,
        rows: &[DimensionDescriptor],
        columns: &[DimensionDescriptor],
        bands: &[DimensionDescriptor],
        config: &EngineConfig,
        abort: &AbortFlag,
        progress: &mut dyn Progress,
    ) -> Result<RasterElement, RasterError> {
        let mut chip_descriptor = DataDescriptor::new(name, self.descriptor.file().clone());
        chip_descriptor.set_rows(renumbered(rows));
        chip_descriptor.set_columns(renumbered(columns));
        chip_descriptor.set_bands(renumbered(bands));
        chip_descriptor.set_interleave(self.descriptor.interleave());
        chip_descriptor.set_encoding(self.descriptor.encoding());
        chip_descriptor.set_processing_location(ProcessingLocation::InMemory);

        let selected_rows = match_dims(self.descriptor.rows(), chip_descriptor.rows());
        let selected_columns = match_dims(self.descriptor.columns(), chip_descriptor.columns());
        let selected_bands = match_dims(self.descriptor.bands(), chip_descriptor.bands());
        if selected_rows.len() != rows.len()
            || selected_columns.len() != columns.len()
            || selected_bands.len() != bands.len()
        {
            return Err(RasterError::validation(
                "chip dimensions are not drawn from this element's active set",
            ));
        }

        let mut chip = RasterElement::new(chip_descriptor);
        chip.create_default_source(config)?;
        self.copy_data_to(
            &chip,
            &selected_rows,
            &selected_columns,
            &selected_bands,
            abort,
            progress,
        )?;
        Ok(chip)
    }

    /// The raw cube of an in-memory element, for direct inspection.
    pub fn memory_unit(&self) -> Option<Arc<crate::pager::CacheUnit>> {
        match &self.source {
            Some(ElementSource::Memory(pager)) => Some(pager.unit()),
            _ => None,
        }
    }
}

fn active_of(dim: &DimensionDescriptor) -> Result<usize, RasterError> {
    dim.active_number()
        .ok_or_else(|| RasterError::invalid_access("selected dimension has no active number"))
}

fn contiguous(dims: &[DimensionDescriptor]) -> bool {
    match (
        dims.first().and_then(|d| d.active_number()),
        dims.last().and_then(|d| d.active_number()),
    ) {
        (Some(first), Some(last)) => last - first + 1 == dims.len(),
        _ => false,
    }
}

fn renumbered(dims: &[DimensionDescriptor]) -> Vec<DimensionDescriptor> {
    dims.iter()
        .enumerate()
        .map(|(i, dim)| {
            let mut out = *dim;
            out.set_active_number(i);
            out
        })
        .collect()
}

fn report_row(progress: &mut dyn Progress, step: usize, total: usize) {
    progress.update(
        "Copying data",
        ((step * 100) / total.max(1)) as u8,
        ReportingLevel::Normal,
    );
}

fn check_abort(dest: &RasterElement, abort: &AbortFlag) -> Result<(), RasterError> {
    if abort.is_set() {
        // Flush in-flight writable units so the rows already written are
        // intact on the backing store.
        dest.flush()?;
        return Err(RasterError::Aborted);
    }
    Ok(())
}
