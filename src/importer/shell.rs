//! The import pipeline.
//!
//! An [`ImporterShell`] drives one import through its states:
//! `Unconfigured -> Validated -> Executing -> {Succeeded, Failed, Aborted}`.
//! Validation is free of side effects and can be repeated while the caller
//! adjusts the descriptor. Execution branches on the processing location:
//! read-only imports attach the format pager directly and copy nothing;
//! in-memory and read-write imports stream the selected region from a
//! temporary source element into a freshly allocated destination.

use crate::config::EngineConfig;
use crate::descriptor::DataDescriptor;
use crate::dims::determine_skip_factor;
use crate::element::{RasterElement, match_dims};
use crate::error::RasterError;
use crate::importer::{RasterImporter, ValidationTest};
use crate::progress::{AbortFlag, Progress, ReportingLevel};
use crate::types::{Interleave, ProcessingLocation};

/// Lifecycle of one import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportState {
    Unconfigured,
    Validated,
    Executing,
    Succeeded,
    /// Terminal failure with a human-readable reason.
    Failed(String),
    /// Terminated by the external abort flag, not by a fault.
    Aborted,
}

/// Orchestrates a single import for one format importer.
pub struct ImporterShell<'a> {
    importer: &'a dyn RasterImporter,
    config: EngineConfig,
    abort: AbortFlag,
    state: ImportState,
}

impl<'a> ImporterShell<'a> {
    pub fn new(importer: &'a dyn RasterImporter, config: EngineConfig) -> Self {
        Self {
            importer,
            config,
            abort: AbortFlag::new(),
            state: ImportState::Unconfigured,
        }
    }

    pub fn state(&self) -> &ImportState {
        &self.state
    }

    /// The flag a caller sets to cancel this import. Polled between rows.
    pub fn abort_flag(&self) -> AbortFlag {
        self.abort.clone()
    }

    /// Run the structural checks plus the importer's own restrictions.
    /// Side-effect free; callable repeatedly while parameters are adjusted.
    pub fn validate(&mut self, descriptor: &DataDescriptor) -> Result<(), RasterError> {
        self.validate_basic(descriptor)?;
        self.validate_format_restrictions(descriptor)?;
        if descriptor.processing_location() == ProcessingLocation::OnDiskReadOnly {
            self.validate_on_disk_read_only(descriptor)?;
        }
        self.state = ImportState::Validated;
        Ok(())
    }

    fn validate_basic(&self, descriptor: &DataDescriptor) -> Result<(), RasterError> {
        let file = descriptor.file();

        if descriptor.row_count() == 0 || descriptor.column_count() == 0
            || descriptor.band_count() == 0
        {
            return Err(RasterError::validation(
                "the data set is empty; check the rows, columns, and bands",
            ));
        }
        if file.bits_per_element() == 0 {
            return Err(RasterError::validation("the bits per element is zero"));
        }
        if (file.preband_bytes() != 0 || file.postband_bytes() != 0)
            && file.interleave() != Interleave::Bsq
        {
            return Err(RasterError::validation(
                "only band-sequential data can carry pre-band and post-band bytes",
            ));
        }

        let band_files = file.band_files();
        if !band_files.is_empty() {
            if band_files.len() < file.band_count() {
                return Err(RasterError::validation(format!(
                    "{} band files specified for {} bands",
                    band_files.len(),
                    file.band_count()
                )));
            }
            if file.interleave() != Interleave::Bsq {
                return Err(RasterError::validation(
                    "multiple band files require band-sequential data",
                ));
            }
            for band in descriptor.bands() {
                let Some(on_disk) = band.on_disk_number() else {
                    continue;
                };
                if let Some(band_path) = band_files.get(on_disk) {
                    if !band_path.exists() {
                        return Err(RasterError::validation(format!(
                            "band file {} does not exist",
                            band_path.display()
                        )));
                    }
                }
            }
        }

        if descriptor.processing_location() == ProcessingLocation::InMemory {
            let needed = descriptor.total_bytes();
            if needed > self.config.memory_budget_bytes as u64 {
                return Err(RasterError::validation(format!(
                    "the {needed} byte data set exceeds the in-memory budget; \
                     use an on-disk processing location or subset the image",
                )));
            }
        }
        Ok(())
    }

    fn validate_format_restrictions(&self, descriptor: &DataDescriptor) -> Result<(), RasterError> {
        let tests = self.importer.validation_tests(descriptor);
        let file = descriptor.file();

        if tests.contains(ValidationTest::NO_BAND_FILES) && !file.band_files().is_empty() {
            return Err(RasterError::validation(format!(
                "the {} format does not support band files",
                self.importer.display_name()
            )));
        }
        if tests.contains(ValidationTest::NO_ROW_SUBSETS)
            && descriptor.row_count() != file.row_count()
        {
            return Err(RasterError::validation("row subsets are not supported"));
        }
        if tests.contains(ValidationTest::NO_COLUMN_SUBSETS)
            && descriptor.column_count() != file.column_count()
        {
            return Err(RasterError::validation("column subsets are not supported"));
        }
        if tests.contains(ValidationTest::NO_BAND_SUBSETS)
            && descriptor.band_count() != file.band_count()
        {
            return Err(RasterError::validation("band subsets are not supported"));
        }
        if tests.contains(ValidationTest::NO_SKIP_FACTORS)
            && (determine_skip_factor(descriptor.rows()) != Some(1)
                || determine_skip_factor(descriptor.columns()) != Some(1))
        {
            return Err(RasterError::validation("skip factors are not supported"));
        }
        if tests.contains(ValidationTest::NO_INTERLEAVE_CONVERSIONS)
            && descriptor.interleave() != file.interleave()
        {
            return Err(RasterError::validation(
                "interleave conversions are not supported",
            ));
        }
        if tests.contains(ValidationTest::NO_ON_DISK_READ_ONLY)
            && descriptor.processing_location() == ProcessingLocation::OnDiskReadOnly
        {
            return Err(RasterError::validation(format!(
                "the {} format cannot be processed on disk read-only",
                self.importer.display_name()
            )));
        }
        Ok(())
    }

    fn validate_on_disk_read_only(&self, descriptor: &DataDescriptor) -> Result<(), RasterError> {
        let file = descriptor.file();

        if file.band_files().is_empty() {
            let metadata = std::fs::metadata(file.filename())
                .map_err(crate::error::io_err(file.filename()))?;
            if metadata.len() < file.required_file_bytes() {
                return Err(RasterError::validation(
                    "the size of the file does not match the declared shape",
                ));
            }
        }

        if file.band_count() > 1 && descriptor.interleave() != file.interleave() {
            return Err(RasterError::validation(
                "interleave conversions are not supported with on-disk read-only \
                 processing of multi-band data",
            ));
        }
        if descriptor.band_count() != file.band_count() {
            return Err(RasterError::validation(
                "band subsets are not supported with on-disk read-only processing",
            ));
        }
        // Strided row subsets are served by walking the file at the row
        // pitch; column gaps cannot be, since they break the in-row
        // element stride.
        if determine_skip_factor(descriptor.columns()) != Some(1) {
            return Err(RasterError::validation(
                "column skip factors are not supported with on-disk read-only processing",
            ));
        }
        Ok(())
    }

    /// Validate (if not already validated), then execute the import.
    pub fn run(
        &mut self,
        descriptor: DataDescriptor,
        progress: &mut dyn Progress,
    ) -> Result<RasterElement, RasterError> {
        if self.state != ImportState::Validated {
            if let Err(error) = self.validate(&descriptor) {
                self.state = ImportState::Failed(error.to_string());
                progress.update(&error.to_string(), 0, ReportingLevel::Error);
                return Err(error);
            }
        }

        self.state = ImportState::Executing;
        log::info!(
            "importing {} via {}",
            descriptor.name(),
            self.importer.display_name()
        );
        progress.update("Import started", 1, ReportingLevel::Normal);

        match self.perform_import(&descriptor, progress) {
            Ok(element) => {
                self.state = ImportState::Succeeded;
                progress.update("Import complete", 100, ReportingLevel::Normal);
                Ok(element)
            }
            Err(error) if error.is_abort() => {
                self.state = ImportState::Aborted;
                progress.update("Import aborted", 0, ReportingLevel::Abort);
                Err(error)
            }
            Err(error) => {
                self.state = ImportState::Failed(error.to_string());
                progress.update(&error.to_string(), 0, ReportingLevel::Error);
                Err(error)
            }
        }
    }

    fn perform_import(
        &mut self,
        descriptor: &DataDescriptor,
        progress: &mut dyn Progress,
    ) -> Result<RasterElement, RasterError> {
        match descriptor.processing_location() {
            ProcessingLocation::OnDiskReadOnly => {
                let mut element = RasterElement::new(descriptor.clone());
                let pager = self.importer.create_pager(descriptor, false)?;
                element.attach_pager(pager, &self.config)?;
                log::debug!("attached {} pager read-only", self.importer.id());
                Ok(element)
            }
            ProcessingLocation::InMemory | ProcessingLocation::OnDiskReadWrite => {
                // Stream from a temporary element over the full unchipped
                // file into the freshly allocated destination.
                let mut source = RasterElement::new(descriptor.unchipped_source());
                let pager = self.importer.create_pager(source.descriptor(), false)?;
                source.attach_pager(pager, &self.config)?;

                let mut dest = RasterElement::new(descriptor.clone());
                dest.create_default_source(&self.config)?;

                let selected_rows = match_dims(source.descriptor().rows(), descriptor.rows());
                let selected_columns =
                    match_dims(source.descriptor().columns(), descriptor.columns());
                let selected_bands = match_dims(source.descriptor().bands(), descriptor.bands());
                if selected_rows.len() != descriptor.row_count()
                    || selected_columns.len() != descriptor.column_count()
                    || selected_bands.len() != descriptor.band_count()
                {
                    return Err(RasterError::validation(
                        "the active subset is not drawn from the on-disk dimensions",
                    ));
                }

                source.copy_data_to(
                    &dest,
                    &selected_rows,
                    &selected_columns,
                    &selected_bands,
                    &self.abort,
                    progress,
                )?;

                if dest.descriptor().encoding().is_floating_point() {
                    let replaced = dest.sanitize(0.0)?;
                    if replaced > 0 {
                        progress.update(
                            &format!("{replaced} bad value(s) found in data; replaced with 0"),
                            99,
                            ReportingLevel::Warning,
                        );
                    }
                }
                dest.flush()?;
                Ok(dest)
            }
        }
    }
}
