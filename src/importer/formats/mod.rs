//! Built-in raster format importers.
//!
//! - [`flat`]: raw binary cubes described by a JSON sidecar; the only
//!   built-in format that supports true on-disk processing
//! - [`npy`]: NumPy `.npy` arrays, decoded fully and served from memory
//! - [`image`]: standard images (PNG, JPEG, BMP, TIFF, WebP) as 3-band
//!   cubes, decoded fully and served from memory

pub mod flat;
pub mod image;
pub mod npy;
