//! Interleave conversion.
//!
//! When a cursor requests an interleave different from the element's
//! storage interleave, pages are materialized on the fly: source rows are
//! read through the element's native page source and their elements
//! re-ordered into the requested layout. The reshuffle is keyed purely by
//! element width and never changes numeric values. Converted units are
//! owned by the requesting cursor alone and are not inserted into the
//! block cache.

use std::sync::Arc;

use crate::error::RasterError;
use crate::pager::cache::CacheUnit;
use crate::pager::{Page, PagerGeometry};
use crate::types::Interleave;

/// Materialize a page in `target` interleave covering up to `rows_wanted`
/// rows from `start_row`, by re-ordering rows served by `native`.
///
/// `native` is called with (row, column, band) positions in
/// `native_geometry`'s numbering and must serve pages in its interleave.
/// `native_row_pitch` is the column stride of the rows `native` serves,
/// which exceeds `native_geometry.columns` when a column subset rides on
/// wider storage rows. Returns `Ok(None)` past the end of the data.
pub(crate) fn converted_page<F>(
    native: F,
    native_geometry: PagerGeometry,
    native_row_pitch: usize,
    target: Interleave,
    start_row: usize,
    start_col: usize,
    start_band: usize,
    rows_wanted: usize,
) -> Result<Option<Page>, RasterError>
where
    F: Fn(usize, usize, usize) -> Result<Option<Page>, RasterError>,
{
    let g = &native_geometry;
    if start_row >= g.rows || start_col >= g.columns || start_band >= g.bands {
        return Ok(None);
    }

    let bpe = g.bytes_per_element;
    let columns = g.columns;
    let native_bands = g.bands;
    let pitch = native_row_pitch.max(columns);
    let rows = rows_wanted.max(1).min(g.rows - start_row);

    // A BSQ page carries one band; the interleaved targets carry them all.
    let (page_bands, band_range) = match target {
        Interleave::Bsq => (1, start_band..start_band + 1),
        Interleave::Bip | Interleave::Bil => (native_bands, 0..native_bands),
    };

    let mut buf = vec![0u8; rows * columns * page_bands * bpe];

    for row_rel in 0..rows {
        let row = start_row + row_rel;
        match g.interleave {
            Interleave::Bsq => {
                for band in band_range.clone() {
                    let page = fetch_row(&native, row, band)?;
                    let guard = page.unit.read();
                    let row_slice = &guard[page.offset..page.offset + columns * bpe];
                    for col in 0..columns {
                        let src = &row_slice[col * bpe..(col + 1) * bpe];
                        let dst = target_index(
                            target, row_rel, col, band - band_range.start, columns, page_bands,
                        ) * bpe;
                        buf[dst..dst + bpe].copy_from_slice(src);
                    }
                }
            }
            Interleave::Bip => {
                let page = fetch_row(&native, row, 0)?;
                let guard = page.unit.read();
                let row_slice = &guard[page.offset..page.offset + columns * native_bands * bpe];
                for col in 0..columns {
                    for band in band_range.clone() {
                        let src_at = (col * native_bands + band) * bpe;
                        let src = &row_slice[src_at..src_at + bpe];
                        let dst = target_index(
                            target, row_rel, col, band - band_range.start, columns, page_bands,
                        ) * bpe;
                        buf[dst..dst + bpe].copy_from_slice(src);
                    }
                }
            }
            Interleave::Bil => {
                let page = fetch_row(&native, row, 0)?;
                let guard = page.unit.read();
                let span = ((native_bands - 1) * pitch + columns) * bpe;
                let row_slice = &guard[page.offset..page.offset + span];
                for band in band_range.clone() {
                    for col in 0..columns {
                        let src_at = (band * pitch + col) * bpe;
                        let src = &row_slice[src_at..src_at + bpe];
                        let dst = target_index(
                            target, row_rel, col, band - band_range.start, columns, page_bands,
                        ) * bpe;
                        buf[dst..dst + bpe].copy_from_slice(src);
                    }
                }
            }
        }
    }

    let unit_band = match target {
        Interleave::Bsq => start_band,
        Interleave::Bip | Interleave::Bil => 0,
    };
    let unit = Arc::new(CacheUnit::new(start_row, rows, unit_band, page_bands, buf));

    let offset = match target {
        Interleave::Bip => (start_col * page_bands + start_band) * bpe,
        Interleave::Bil => (start_band * columns + start_col) * bpe,
        Interleave::Bsq => start_col * bpe,
    };
    Ok(Some(Page {
        unit,
        offset,
        rows,
        columns,
        bands: page_bands,
        row_step: 1,
    }))
}

/// Element index of (row, col, band) in the target page layout.
fn target_index(
    target: Interleave,
    row: usize,
    col: usize,
    band: usize,
    columns: usize,
    bands: usize,
) -> usize {
    match target {
        Interleave::Bip => (row * columns + col) * bands + band,
        Interleave::Bil => (row * bands + band) * columns + col,
        Interleave::Bsq => row * columns + col,
    }
}

fn fetch_row<F>(native: &F, row: usize, band: usize) -> Result<Page, RasterError>
where
    F: Fn(usize, usize, usize) -> Result<Option<Page>, RasterError>,
{
    native(row, 0, band)?.ok_or_else(|| {
        RasterError::fetch(format!("source page unavailable at row {row} band {band}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::memory::InMemoryPager;

    fn bsq_source() -> (InMemoryPager, PagerGeometry) {
        let geometry = PagerGeometry {
            rows: 2,
            columns: 3,
            bands: 2,
            bytes_per_element: 1,
            interleave: Interleave::Bsq,
        };
        // Band 0 holds 0..6, band 1 holds 10..16.
        let mut data: Vec<u8> = (0..6).collect();
        data.extend(10..16);
        (InMemoryPager::from_vec(geometry, data).unwrap(), geometry)
    }

    #[test]
    fn test_bsq_to_bip() {
        let (source, geometry) = bsq_source();
        let page = converted_page(
            |r, c, b| Ok(source.page(r, c, b)),
            geometry,
            geometry.columns,
            Interleave::Bip,
            0,
            0,
            0,
            2,
        )
        .unwrap()
        .unwrap();

        assert_eq!(page.rows, 2);
        assert_eq!(page.bands, 2);
        let expected = vec![0, 10, 1, 11, 2, 12, 3, 13, 4, 14, 5, 15];
        assert_eq!(*page.unit.read(), expected);
    }

    #[test]
    fn test_bsq_to_bil() {
        let (source, geometry) = bsq_source();
        let page = converted_page(
            |r, c, b| Ok(source.page(r, c, b)),
            geometry,
            geometry.columns,
            Interleave::Bil,
            0,
            0,
            0,
            2,
        )
        .unwrap()
        .unwrap();

        let expected = vec![0, 1, 2, 10, 11, 12, 3, 4, 5, 13, 14, 15];
        assert_eq!(*page.unit.read(), expected);
    }

    #[test]
    fn test_bip_to_bsq_single_band() {
        let geometry = PagerGeometry {
            rows: 2,
            columns: 3,
            bands: 2,
            bytes_per_element: 1,
            interleave: Interleave::Bip,
        };
        let data = vec![0, 10, 1, 11, 2, 12, 3, 13, 4, 14, 5, 15];
        let source = InMemoryPager::from_vec(geometry, data).unwrap();

        let page = converted_page(
            |r, c, b| Ok(source.page(r, c, b)),
            geometry,
            geometry.columns,
            Interleave::Bsq,
            0,
            0,
            1,
            2,
        )
        .unwrap()
        .unwrap();

        assert_eq!(page.bands, 1);
        assert_eq!(*page.unit.read(), vec![10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn test_conversion_past_end() {
        let (source, geometry) = bsq_source();
        let page = converted_page(
            |r, c, b| Ok(source.page(r, c, b)),
            geometry,
            geometry.columns,
            Interleave::Bip,
            2,
            0,
            0,
            1,
        )
        .unwrap();
        assert!(page.is_none());
    }

    #[test]
    fn test_converted_unit_is_not_marked_dirty() {
        let (source, geometry) = bsq_source();
        let page = converted_page(
            |r, c, b| Ok(source.page(r, c, b)),
            geometry,
            geometry.columns,
            Interleave::Bip,
            0,
            0,
            0,
            1,
        )
        .unwrap()
        .unwrap();
        assert!(!page.unit.is_dirty());
    }
}
