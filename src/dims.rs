//! Dimension identity and subsetting.
//!
//! Every row, column, and band of a dataset is identified in up to three
//! coordinate spaces:
//!
//! - **original**: its index in the raw data produced by the sensor
//! - **on-disk**: its index in the file as stored, after any file-level
//!   subsetting
//! - **active**: its index within the working set currently selected for
//!   processing
//!
//! A missing index means the dimension does not participate in that space,
//! e.g. a dataset created by an algorithm has no on-disk numbers.

use crate::error::RasterError;

/// Index information for one row, column, or band.
///
/// An active-numbered sequence, when present, is a strictly increasing
/// subsequence of the on-disk sequence, which in turn is a subsequence of
/// the original sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimensionDescriptor {
    original: Option<usize>,
    on_disk: Option<usize>,
    active: Option<usize>,
}

impl DimensionDescriptor {
    /// Create a descriptor that is invalid until a number is set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a descriptor carrying only an original number.
    pub fn with_original(original: usize) -> Self {
        Self {
            original: Some(original),
            on_disk: None,
            active: None,
        }
    }

    /// The index in the original sensor data, if set.
    pub fn original_number(&self) -> Option<usize> {
        self.original
    }

    /// The index in the file as stored, if set.
    pub fn on_disk_number(&self) -> Option<usize> {
        self.on_disk
    }

    /// The index in the active working set, if set.
    pub fn active_number(&self) -> Option<usize> {
        self.active
    }

    /// Set the original number.
    pub fn set_original_number(&mut self, number: usize) {
        self.original = Some(number);
    }

    /// Set the on-disk number.
    pub fn set_on_disk_number(&mut self, number: usize) {
        self.on_disk = Some(number);
    }

    /// Set the active number.
    pub fn set_active_number(&mut self, number: usize) {
        self.active = Some(number);
    }

    /// Clear the active number, marking the dimension as not part of the
    /// working set.
    pub fn clear_active_number(&mut self) {
        self.active = None;
    }

    /// Whether any of the three numbers is set.
    pub fn is_valid(&self) -> bool {
        self.original.is_some() || self.on_disk.is_some() || self.active.is_some()
    }
}

/// Build a vector of `count` descriptors numbered `0..count` in each of the
/// requested spaces.
pub fn generate_dimension_vector(
    count: usize,
    original: bool,
    active: bool,
    on_disk: bool,
) -> Vec<DimensionDescriptor> {
    (0..count)
        .map(|i| {
            let mut dim = DimensionDescriptor::new();
            if original {
                dim.set_original_number(i);
            }
            if active {
                dim.set_active_number(i);
            }
            if on_disk {
                dim.set_on_disk_number(i);
            }
            dim
        })
        .collect()
}

/// Recover the uniform on-disk stride of a dimension vector.
///
/// Returns `Some(1)` for a contiguous run, `Some(n)` when every consecutive
/// pair of on-disk numbers differs by exactly `n`, and `None` when any
/// on-disk number is missing or the stride is not uniform. Empty and
/// single-element vectors are trivially contiguous.
pub fn determine_skip_factor(dims: &[DimensionDescriptor]) -> Option<usize> {
    let mut stride = None;
    for pair in dims.windows(2) {
        let previous = pair[0].on_disk_number()?;
        let current = pair[1].on_disk_number()?;
        if current <= previous {
            return None;
        }
        let step = current - previous;
        match stride {
            None => stride = Some(step),
            Some(existing) if existing != step => return None,
            Some(_) => {}
        }
    }
    if !dims.is_empty() {
        dims[0].on_disk_number()?;
    }
    Some(stride.unwrap_or(1))
}

/// Select `[start, stop]` (inclusive, by original number) out of `full` at
/// the given stride, assigning fresh contiguous active numbers `0..n` while
/// preserving each retained element's original and on-disk numbers.
///
/// A missing `start` or `stop` number defaults to the first or last element
/// of `full`. Fails without partial results when `skip_factor` is zero, when
/// `start` falls after `stop`, or when an element of `full` carries no
/// original number.
pub fn subset_dimension_vector(
    full: &[DimensionDescriptor],
    start: DimensionDescriptor,
    stop: DimensionDescriptor,
    skip_factor: usize,
) -> Result<Vec<DimensionDescriptor>, RasterError> {
    if skip_factor < 1 {
        return Err(RasterError::validation("subset skip factor must be >= 1"));
    }
    if full.is_empty() {
        return Ok(Vec::new());
    }

    for dim in full {
        if dim.original_number().is_none() {
            return Err(RasterError::validation(
                "dimension vector element has no original number",
            ));
        }
    }

    // Ordering check prefers the on-disk space when both endpoints carry it.
    if let (Some(first), Some(last)) = (start.on_disk_number(), stop.on_disk_number()) {
        if first > last {
            return Err(RasterError::validation(
                "subset start falls after stop in on-disk order",
            ));
        }
    }

    let first_value = match start.original_number() {
        Some(value) => value,
        None => full[0].original_number().unwrap_or(0),
    };
    let last_value = match stop.original_number() {
        Some(value) => value,
        None => full[full.len() - 1].original_number().unwrap_or(0),
    };
    if first_value > last_value {
        return Err(RasterError::validation(
            "subset start falls after stop in original order",
        ));
    }

    let mut subset = Vec::new();
    let mut index = 0;
    while index < full.len() {
        let original = full[index].original_number().unwrap_or(0);
        if original >= first_value && original <= last_value {
            let mut dim = full[index];
            dim.set_active_number(subset.len());
            subset.push(dim);
            index += skip_factor;
        } else {
            index += 1;
        }
    }

    Ok(subset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_set(count: usize) -> Vec<DimensionDescriptor> {
        generate_dimension_vector(count, true, true, true)
    }

    #[test]
    fn test_subset_basic_stride() {
        let full = full_set(100);
        let subset = subset_dimension_vector(
            &full,
            DimensionDescriptor::with_original(10),
            DimensionDescriptor::with_original(59),
            2,
        )
        .unwrap();

        assert_eq!(subset.len(), 25);
        for (i, dim) in subset.iter().enumerate() {
            assert_eq!(dim.active_number(), Some(i));
            assert_eq!(dim.original_number(), Some(10 + 2 * i));
            assert_eq!(dim.on_disk_number(), Some(10 + 2 * i));
        }
    }

    #[test]
    fn test_subset_on_disk_strictly_increasing() {
        let full = full_set(64);
        for skip in 1..5 {
            let subset = subset_dimension_vector(
                &full,
                DimensionDescriptor::with_original(3),
                DimensionDescriptor::with_original(50),
                skip,
            )
            .unwrap();
            let numbers: Vec<usize> = subset.iter().filter_map(|d| d.on_disk_number()).collect();
            assert_eq!(numbers.len(), subset.len());
            assert!(numbers.windows(2).all(|w| w[0] < w[1]), "skip={skip}");
            let active: Vec<usize> = subset.iter().filter_map(|d| d.active_number()).collect();
            assert_eq!(active, (0..subset.len()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_subset_zero_skip_rejected() {
        let full = full_set(10);
        let result = subset_dimension_vector(
            &full,
            DimensionDescriptor::with_original(0),
            DimensionDescriptor::with_original(9),
            0,
        );
        assert!(matches!(result, Err(RasterError::Validation { .. })));
    }

    #[test]
    fn test_subset_start_after_stop_rejected() {
        let full = full_set(10);
        let result = subset_dimension_vector(
            &full,
            DimensionDescriptor::with_original(8),
            DimensionDescriptor::with_original(2),
            1,
        );
        assert!(matches!(result, Err(RasterError::Validation { .. })));
    }

    #[test]
    fn test_subset_defaults_to_full_range() {
        let full = full_set(12);
        let subset = subset_dimension_vector(
            &full,
            DimensionDescriptor::new(),
            DimensionDescriptor::new(),
            1,
        )
        .unwrap();
        assert_eq!(subset.len(), 12);
    }

    #[test]
    fn test_subset_without_active_numbers_still_renumbers() {
        let full = generate_dimension_vector(20, true, false, true);
        let subset = subset_dimension_vector(
            &full,
            DimensionDescriptor::with_original(5),
            DimensionDescriptor::with_original(14),
            1,
        )
        .unwrap();
        assert_eq!(subset.len(), 10);
        assert_eq!(subset[0].active_number(), Some(0));
        assert_eq!(subset[9].active_number(), Some(9));
    }

    #[test]
    fn test_determine_skip_factor_contiguous() {
        let dims = full_set(5);
        assert_eq!(determine_skip_factor(&dims), Some(1));
        assert_eq!(determine_skip_factor(&dims[..1]), Some(1));
        assert_eq!(determine_skip_factor(&[]), Some(1));
    }

    #[test]
    fn test_determine_skip_factor_uniform_stride() {
        let full = full_set(30);
        let subset = subset_dimension_vector(
            &full,
            DimensionDescriptor::with_original(0),
            DimensionDescriptor::with_original(29),
            3,
        )
        .unwrap();
        assert_eq!(determine_skip_factor(&subset), Some(3));
    }

    #[test]
    fn test_determine_skip_factor_irregular() {
        let mut dims = vec![
            DimensionDescriptor::with_original(0),
            DimensionDescriptor::with_original(1),
            DimensionDescriptor::with_original(2),
        ];
        dims[0].set_on_disk_number(0);
        dims[1].set_on_disk_number(1);
        dims[2].set_on_disk_number(5);
        assert_eq!(determine_skip_factor(&dims), None);
    }

    #[test]
    fn test_determine_skip_factor_missing_numbers() {
        let dims = generate_dimension_vector(4, true, true, false);
        assert_eq!(determine_skip_factor(&dims), None);
    }
}
