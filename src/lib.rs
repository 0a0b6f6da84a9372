//! rastra - Raster Data Access Engine
//!
//! A caching, interleave-aware access layer for arbitrarily large
//! row x column x band raster datasets that may live on disk or in memory.
//!
//! The pieces, leaf to root:
//!
//! - [`dims`]: dimension identity across original / on-disk / active
//!   numbering, and subsetting
//! - [`descriptor`]: on-disk shape ([`FileDescriptor`]) and active working
//!   set ([`DataDescriptor`])
//! - [`pager`]: format pagers, the bounded block cache, and the caching
//!   engine in front of any format
//! - [`accessor`]: row-major cursors that hide caching and interleave
//! - [`element`]: a descriptor bound to a data source, plus the copy
//!   pipeline between processing locations
//! - [`importer`]: format importers, the registry, and the import shell
//! - [`progress`], [`config`], [`error`]: reporting, tunables, and the
//!   error taxonomy

pub mod accessor;
pub mod config;
pub mod descriptor;
pub mod dims;
pub mod element;
pub mod error;
pub mod importer;
pub mod pager;
pub mod progress;
pub mod request;
pub mod types;

pub use accessor::{DataAccessor, RowView, RowViewMut};
pub use config::{EngineConfig, LogLevel};
pub use descriptor::{DataDescriptor, FileDescriptor};
pub use dims::{
    DimensionDescriptor, determine_skip_factor, generate_dimension_vector,
    subset_dimension_vector,
};
pub use element::RasterElement;
pub use error::RasterError;
pub use importer::{ImportState, ImporterRegistry, ImporterShell, RasterImporter, ValidationTest};
pub use pager::{BlockRequest, CachedPager, Page, PagerGeometry, RasterPager};
pub use progress::{AbortFlag, LogProgress, Progress, ReportingLevel};
pub use request::DataRequest;
pub use types::{Encoding, Endian, Interleave, ProcessingLocation};
