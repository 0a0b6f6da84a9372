//! Importer for NumPy `.npy` cubes.
//!
//! Supports 2-D arrays (single-band) and 3-D arrays in bands-first
//! `(bands, rows, columns)` or bands-last `(rows, columns, bands)` layout.
//! Arrays are decoded in full and served from memory, so this format
//! refuses on-disk read-only processing through its validation flags.

use std::io::Cursor;
use std::path::Path;

use ndarray::ArrayD;
use ndarray_npy::ReadNpyExt;

use crate::descriptor::{DataDescriptor, FileDescriptor};
use crate::error::{RasterError, io_err};
use crate::importer::{RasterImporter, ValidationTest};
use crate::pager::memory::MemoryBlockPager;
use crate::pager::{PagerGeometry, RasterPager};
use crate::types::{Encoding, Endian, Interleave};

/// A fully decoded array, re-encoded as host-endian raster bytes.
struct DecodedCube {
    rows: usize,
    columns: usize,
    bands: usize,
    interleave: Interleave,
    encoding: Encoding,
    data: Vec<u8>,
}

/// Numeric types the importer understands, in the order they are tried.
trait CubeElement: Copy {
    const ENCODING: Encoding;
    fn append_to(self, out: &mut Vec<u8>);
}

macro_rules! cube_element {
    ($ty:ty, $encoding:expr) => {
        impl CubeElement for $ty {
            const ENCODING: Encoding = $encoding;
            fn append_to(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_ne_bytes());
            }
        }
    };
}

cube_element!(f32, Encoding::F32);
cube_element!(f64, Encoding::F64);
cube_element!(u8, Encoding::U8);
cube_element!(u16, Encoding::U16);
cube_element!(i16, Encoding::I16);
cube_element!(i32, Encoding::I32);

fn array_to_cube<T: CubeElement>(array: ArrayD<T>) -> Result<DecodedCube, RasterError> {
    let shape = array.shape().to_vec();
    let (rows, columns, bands, interleave) = match shape.len() {
        2 => (shape[0], shape[1], 1, Interleave::Bip),
        3 => {
            // Bands-first cubes keep the small axis in front; bands-last
            // images keep it at the back. Ambiguous shapes default to
            // bands-first, the common hyperspectral layout.
            if shape[0] <= 100 && shape[2] > shape[0] {
                (shape[1], shape[2], shape[0], Interleave::Bsq)
            } else if shape[2] <= 100 && shape[0] > shape[2] {
                (shape[0], shape[1], shape[2], Interleave::Bip)
            } else {
                log::warn!(
                    "ambiguous 3-D shape {shape:?}; assuming (bands, rows, columns)"
                );
                (shape[1], shape[2], shape[0], Interleave::Bsq)
            }
        }
        n => {
            return Err(RasterError::validation(format!(
                "unsupported array dimensions: {n} (expected 2 or 3)"
            )));
        }
    };

    // Logical iteration order matches the interleave derived above:
    // (bands, rows, columns) is band-sequential, (rows, columns, bands)
    // is pixel-interleaved.
    let mut data = Vec::with_capacity(array.len() * T::ENCODING.bytes());
    for value in array.iter() {
        value.append_to(&mut data);
    }

    Ok(DecodedCube {
        rows,
        columns,
        bands,
        interleave,
        encoding: T::ENCODING,
        data,
    })
}

fn decode(bytes: &[u8]) -> Result<DecodedCube, RasterError> {
    // Try dtypes in order of likelihood; f32 is most common for
    // scientific data.
    let mut cursor = Cursor::new(bytes);
    if let Ok(array) = ArrayD::<f32>::read_npy(&mut cursor) {
        return array_to_cube(array);
    }
    cursor.set_position(0);
    if let Ok(array) = ArrayD::<f64>::read_npy(&mut cursor) {
        return array_to_cube(array);
    }
    cursor.set_position(0);
    if let Ok(array) = ArrayD::<u8>::read_npy(&mut cursor) {
        return array_to_cube(array);
    }
    cursor.set_position(0);
    if let Ok(array) = ArrayD::<u16>::read_npy(&mut cursor) {
        return array_to_cube(array);
    }
    cursor.set_position(0);
    if let Ok(array) = ArrayD::<i16>::read_npy(&mut cursor) {
        return array_to_cube(array);
    }
    cursor.set_position(0);
    if let Ok(array) = ArrayD::<i32>::read_npy(&mut cursor) {
        return array_to_cube(array);
    }
    Err(RasterError::validation(
        "failed to read NumPy array: unsupported dtype or invalid format",
    ))
}

/// Importer for NumPy `.npy` files.
#[derive(Debug)]
pub struct NpyImporter;

impl NpyImporter {
    /// NumPy magic bytes: \x93NUMPY
    const MAGIC: &'static [u8] = &[0x93, b'N', b'U', b'M', b'P', b'Y'];
}

impl RasterImporter for NpyImporter {
    fn id(&self) -> &'static str {
        "npy"
    }

    fn display_name(&self) -> &'static str {
        "NumPy Array (.npy)"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["npy"]
    }

    fn can_import(&self, data: &[u8]) -> bool {
        data.len() >= Self::MAGIC.len() && data.starts_with(Self::MAGIC)
    }

    fn import_descriptor(&self, path: &Path) -> Result<DataDescriptor, RasterError> {
        let bytes = std::fs::read(path).map_err(io_err(path))?;
        let cube = decode(&bytes)?;
        log::debug!(
            "described {}x{}x{} {} array from {}",
            cube.rows,
            cube.columns,
            cube.bands,
            cube.encoding.name(),
            path.display()
        );

        let file = FileDescriptor::new(
            path,
            cube.rows,
            cube.columns,
            cube.bands,
            cube.interleave,
            cube.encoding,
            Endian::native(),
        );
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "array".to_string());
        Ok(DataDescriptor::new(name, file))
    }

    fn create_pager(
        &self,
        descriptor: &DataDescriptor,
        _writable: bool,
    ) -> Result<Box<dyn RasterPager>, RasterError> {
        let file = descriptor.file();
        let bytes = std::fs::read(file.filename()).map_err(io_err(file.filename()))?;
        let cube = decode(&bytes)?;
        if cube.rows != file.row_count()
            || cube.columns != file.column_count()
            || cube.bands != file.band_count()
        {
            return Err(RasterError::validation(format!(
                "{} changed shape since it was described",
                file.filename().display()
            )));
        }
        let geometry = PagerGeometry {
            rows: cube.rows,
            columns: cube.columns,
            bands: cube.bands,
            bytes_per_element: cube.encoding.bytes(),
            interleave: cube.interleave,
        };
        Ok(Box::new(MemoryBlockPager::new(geometry, cube.data)?))
    }

    fn validation_tests(&self, _descriptor: &DataDescriptor) -> ValidationTest {
        // Decoded in memory; nothing can be served straight from disk.
        ValidationTest::NO_ON_DISK_READ_ONLY | ValidationTest::NO_BAND_FILES
    }

    fn priority(&self) -> i32 {
        // Ahead of generic images: .npy carries scientific data.
        10
    }
}
