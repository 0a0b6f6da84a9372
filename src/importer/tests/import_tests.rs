//! End-to-end import scenarios across processing locations.

use crate::config::EngineConfig;
use crate::descriptor::DataDescriptor;
use crate::dims::{DimensionDescriptor, subset_dimension_vector};
use crate::element::RasterElement;
use crate::error::RasterError;
use crate::importer::formats::flat::FlatImporter;
use crate::importer::formats::npy::NpyImporter;
use crate::importer::shell::{ImportState, ImporterShell};
use crate::importer::{ImporterRegistry, RasterImporter};
use crate::progress::{AbortFlag, LogProgress};
use crate::request::DataRequest;
use crate::types::{Interleave, ProcessingLocation};

use super::fixtures::{AbortAfter, CubeFixture};

/// Subset the descriptor to rows `[10, 60)` at stride 2.
fn subset_rows_10_60_by_2(descriptor: &mut DataDescriptor) {
    let rows = subset_dimension_vector(
        descriptor.rows(),
        DimensionDescriptor::with_original(10),
        DimensionDescriptor::with_original(59),
        2,
    )
    .unwrap();
    descriptor.set_rows(rows);
}

#[test]
fn test_read_only_subset_attaches_pager_without_copying() {
    let fixture = CubeFixture::bsq("ro-subset", 100, 50, 4);
    let importer = FlatImporter;
    let mut descriptor = importer.import_descriptor(&fixture.sidecar).unwrap();
    subset_rows_10_60_by_2(&mut descriptor);
    descriptor.set_processing_location(ProcessingLocation::OnDiskReadOnly);

    let mut shell = ImporterShell::new(&importer, EngineConfig::default());
    let element = shell.run(descriptor, &mut LogProgress).unwrap();
    assert_eq!(*shell.state(), ImportState::Succeeded);

    // 25 active rows, originals 10, 12, .., 58; nothing materialized in
    // memory.
    assert_eq!(element.descriptor().row_count(), 25);
    for (i, row) in element.descriptor().rows().iter().enumerate() {
        assert_eq!(row.original_number(), Some(10 + 2 * i));
        assert_eq!(row.active_number(), Some(i));
    }
    assert!(element.memory_unit().is_none());

    // Values come straight off the file, strided over the stored rows.
    for (active, stored) in [(0, 10), (1, 12), (12, 34), (24, 58)] {
        for (column, band) in [(0, 0), (17, 1), (49, 3)] {
            assert_eq!(
                element.pixel_value(active, column, band).unwrap(),
                f64::from(CubeFixture::value(stored, column, band)),
                "active row {active}"
            );
        }
    }

    // A cursor walk observes the same stride.
    let mut cursor = element.accessor(DataRequest::new()).unwrap();
    for active in 0..25 {
        let row = cursor.row().unwrap();
        assert_eq!(row.len(), 50);
        assert_eq!(row[3], CubeFixture::value(10 + 2 * active, 3, 0));
        drop(row);
        cursor.next_row().unwrap();
    }
    assert!(!cursor.is_valid());
}

#[test]
fn test_in_memory_import_with_bsq_to_bip_conversion() {
    let fixture = CubeFixture::bsq("bip-convert", 100, 50, 4);
    let importer = FlatImporter;
    let mut descriptor = importer.import_descriptor(&fixture.sidecar).unwrap();
    descriptor.set_interleave(Interleave::Bip);
    descriptor.set_processing_location(ProcessingLocation::InMemory);

    let mut shell = ImporterShell::new(&importer, EngineConfig::default());
    let element = shell.run(descriptor, &mut LogProgress).unwrap();
    assert_eq!(*shell.state(), ImportState::Succeeded);

    // The copy ran into memory and the layout follows the BIP stride
    // formula: band + col*numBands + row*numCols*numBands.
    let unit = element.memory_unit().expect("in-memory cube");
    let data = unit.read();
    assert_eq!(data.len(), 100 * 50 * 4);
    for (row, column, band) in [(0, 0, 0), (0, 1, 2), (42, 13, 3), (99, 49, 1)] {
        let index = band + column * 4 + row * 50 * 4;
        assert_eq!(
            data[index],
            CubeFixture::value(row, column, band),
            "({row}, {column}, {band})"
        );
    }
}

#[test]
fn test_abort_after_30_rows_leaves_30_converted_rows() {
    let fixture = CubeFixture::bsq("abort-30", 100, 50, 4);
    let importer = FlatImporter;
    let descriptor = importer.import_descriptor(&fixture.sidecar).unwrap();

    // Source element over the file, destination in memory as BIP.
    let mut source = RasterElement::new(descriptor.clone());
    source
        .attach_pager(
            importer.create_pager(&descriptor, false).unwrap(),
            &EngineConfig::default(),
        )
        .unwrap();

    let mut dest_descriptor = descriptor.clone();
    dest_descriptor.set_interleave(Interleave::Bip);
    dest_descriptor.set_processing_location(ProcessingLocation::InMemory);
    let mut dest = RasterElement::new(dest_descriptor);
    dest.create_default_source(&EngineConfig::default()).unwrap();

    let abort = AbortFlag::new();
    let mut progress = AbortAfter::new(30, abort.clone());
    let result = source.copy_data_to(
        &dest,
        source.descriptor().rows(),
        source.descriptor().columns(),
        source.descriptor().bands(),
        &abort,
        &mut progress,
    );
    assert!(matches!(result, Err(RasterError::Aborted)));

    // Exactly 30 fully written rows; the rest still zeroed.
    let unit = dest.memory_unit().unwrap();
    let data = unit.read();
    for row in 0..30 {
        for column in [0, 25, 49] {
            for band in 0..4 {
                let index = band + column * 4 + row * 50 * 4;
                assert_eq!(data[index], CubeFixture::value(row, column, band));
            }
        }
    }
    assert!(data[30 * 50 * 4..].iter().all(|&b| b == 0));
}

#[test]
fn test_read_write_import_persists_writes_through_eviction() {
    let fixture = CubeFixture::bsq("rw-writeback", 16, 8, 2);
    let importer = FlatImporter;
    let mut descriptor = importer.import_descriptor(&fixture.sidecar).unwrap();
    descriptor.set_processing_location(ProcessingLocation::OnDiskReadWrite);

    // One 4x8 byte unit of cache so dirty units get evicted quickly.
    let config = EngineConfig {
        rows_per_unit: 4,
        cache_capacity_bytes: 32,
        ..EngineConfig::default()
    };
    let mut shell = ImporterShell::new(&importer, config);
    let element = shell.run(descriptor, &mut LogProgress).unwrap();

    // The copy is intact on the backing file.
    assert_eq!(
        element.pixel_value(3, 5, 1).unwrap(),
        f64::from(CubeFixture::value(3, 5, 1))
    );

    // Overwrite one element, then push the dirty unit out of the cache
    // and read it back cold.
    {
        let mut cursor = element
            .accessor(DataRequest::new().writable(true))
            .unwrap();
        cursor.to_pixel(0, 0).unwrap();
        cursor.set_value(0, 77.0).unwrap();
    }
    for row in [4, 8, 12] {
        element.pixel_value(row, 0, 1).unwrap();
    }
    assert_eq!(element.pixel_value(0, 0, 0).unwrap(), 77.0);

    // Flushing also persists without an eviction in between.
    {
        let mut cursor = element
            .accessor(DataRequest::new().writable(true))
            .unwrap();
        cursor.to_pixel(1, 1).unwrap();
        cursor.set_value(0, 99.0).unwrap();
    }
    element.flush().unwrap();
    assert_eq!(element.pixel_value(1, 1, 0).unwrap(), 99.0);
}

#[test]
fn test_npy_refuses_read_only_but_imports_in_memory() {
    use crate::importer::formats::npy::tests::npy_bytes;

    let data: Vec<u8> = (0..24).collect();
    let path = std::env::temp_dir().join(format!(
        "rastra-test-{}-shell.npy",
        std::process::id()
    ));
    std::fs::write(&path, npy_bytes("|u1", &[2, 3, 4], &data)).unwrap();

    let importer = NpyImporter;
    let mut descriptor = importer.import_descriptor(&path).unwrap();
    descriptor.set_processing_location(ProcessingLocation::OnDiskReadOnly);

    let mut shell = ImporterShell::new(&importer, EngineConfig::default());
    let denied = shell.validate(&descriptor);
    assert!(matches!(denied, Err(RasterError::Validation { .. })));

    descriptor.set_processing_location(ProcessingLocation::InMemory);
    let element = shell.run(descriptor, &mut LogProgress).unwrap();
    assert_eq!(*shell.state(), ImportState::Succeeded);
    // Band 1, row 1, column 2 of the (2, 3, 4) bands-first array.
    assert_eq!(element.pixel_value(1, 2, 1).unwrap(), f64::from(data[18]));

    std::fs::remove_file(path).unwrap();
}

#[test]
fn test_registry_resolves_extension_then_magic() {
    let fixture = CubeFixture::bsq("registry", 4, 4, 1);
    let registry = ImporterRegistry::new();

    let by_extension = registry.find_for(&fixture.sidecar).unwrap();
    assert_eq!(by_extension.id(), "flat");

    // An npy cube behind an unknown extension is found by magic bytes.
    use crate::importer::formats::npy::tests::npy_bytes;
    let data: Vec<u8> = (0..12).collect();
    let path = std::env::temp_dir().join(format!(
        "rastra-test-{}-magic.dat",
        std::process::id()
    ));
    std::fs::write(&path, npy_bytes("|u1", &[3, 4], &data)).unwrap();
    let by_magic = registry.find_for(&path).unwrap();
    assert_eq!(by_magic.id(), "npy");
    std::fs::remove_file(&path).unwrap();

    // Unrecognized data names the file in the error.
    let junk = std::env::temp_dir().join(format!(
        "rastra-test-{}-junk.bin",
        std::process::id()
    ));
    std::fs::write(&junk, [0u8; 16]).unwrap();
    let error = registry.find_for(&junk).unwrap_err();
    assert!(error.to_string().contains("junk.bin"));
    std::fs::remove_file(junk).unwrap();
}

#[test]
fn test_validation_rejects_oversized_in_memory_import() {
    let fixture = CubeFixture::bsq("budget", 10, 10, 2);
    let importer = FlatImporter;
    let mut descriptor = importer.import_descriptor(&fixture.sidecar).unwrap();
    descriptor.set_processing_location(ProcessingLocation::InMemory);

    let config = EngineConfig {
        memory_budget_bytes: 64,
        ..EngineConfig::default()
    };
    let mut shell = ImporterShell::new(&importer, config);
    let error = shell.validate(&descriptor).unwrap_err();
    assert!(error.to_string().contains("budget"), "{error}");
    assert_eq!(*shell.state(), ImportState::Unconfigured);
}

#[test]
fn test_validation_rejects_band_subset_read_only() {
    let fixture = CubeFixture::bsq("band-subset", 8, 8, 4);
    let importer = FlatImporter;
    let mut descriptor = importer.import_descriptor(&fixture.sidecar).unwrap();
    let bands = descriptor.bands()[..2].to_vec();
    descriptor.set_bands(bands);
    descriptor.set_processing_location(ProcessingLocation::OnDiskReadOnly);

    let mut shell = ImporterShell::new(&importer, EngineConfig::default());
    assert!(shell.validate(&descriptor).is_err());
}

#[test]
fn test_state_machine_transitions() {
    let fixture = CubeFixture::bsq("states", 4, 4, 1);
    let importer = FlatImporter;
    let mut descriptor = importer.import_descriptor(&fixture.sidecar).unwrap();
    descriptor.set_processing_location(ProcessingLocation::InMemory);

    let mut shell = ImporterShell::new(&importer, EngineConfig::default());
    assert_eq!(*shell.state(), ImportState::Unconfigured);

    shell.validate(&descriptor).unwrap();
    assert_eq!(*shell.state(), ImportState::Validated);

    shell.run(descriptor, &mut LogProgress).unwrap();
    assert_eq!(*shell.state(), ImportState::Succeeded);
}

#[test]
fn test_failed_import_reports_reason() {
    let importer = FlatImporter;
    let dir = std::env::temp_dir();
    let sidecar = dir.join(format!("rastra-test-{}-missing.cube", std::process::id()));
    std::fs::write(
        &sidecar,
        r#"{"data_file": "does-not-exist.raw", "rows": 4, "columns": 4, "bands": 1,
           "interleave": "bsq", "encoding": "u8"}"#,
    )
    .unwrap();

    let descriptor = {
        let mut d = importer.import_descriptor(&sidecar).unwrap();
        d.set_processing_location(ProcessingLocation::InMemory);
        d
    };
    let mut shell = ImporterShell::new(&importer, EngineConfig::default());
    let error = shell.run(descriptor, &mut LogProgress).unwrap_err();
    assert!(matches!(error, RasterError::Io { .. }));
    assert!(matches!(shell.state(), ImportState::Failed(_)));

    std::fs::remove_file(sidecar).unwrap();
}
