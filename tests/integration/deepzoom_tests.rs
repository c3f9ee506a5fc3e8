//! Tests for slides read from disk.
//!
//! Tests verify:
//! - Deep Zoom pyramids are split at their full-resolution level
//! - Sidecar properties become slide metadata and can be exported
//! - Missing tile files fail only the affected region
//! - Plain raster files are split as single-level pyramids

use image::RgbImage;
use serde_json::Value;
use wsi_splitter::error::{IoError, RegionError, SourceError, SplitError};
use wsi_splitter::slide::{DeepZoomDescriptor, MetadataValue, PyramidSource, SlideFormat, SlideSource};
use wsi_splitter::split::{SlideSplitter, SplitOptions};

use super::test_utils::{tile_color, write_deepzoom, ScratchDir};

const TS: u32 = 16;

// =============================================================================
// Deep Zoom
// =============================================================================

#[tokio::test]
async fn test_open_deepzoom_levels() {
    let dir = ScratchDir::new("deepzoom_tests_1");
    let dzi = write_deepzoom(dir.path(), "case", 40, 20, TS, "png");

    let source = SlideSource::open(&dzi, 256).await.unwrap();
    assert_eq!(source.format(), SlideFormat::DeepZoom);
    // Descriptor tile size wins over the raster default
    assert_eq!(source.tile_size(), TS);
    assert_eq!(source.level_count(), 7);
    assert_eq!(source.level_dimensions(6), Some((40, 20)));
    assert_eq!(source.tile_count(6), Some((3, 2)));
    assert_eq!(source.level_dimensions(0), Some((1, 1)));
}

#[tokio::test]
async fn test_split_deepzoom_into_two() {
    let dir = ScratchDir::new("deepzoom_tests_2");
    let dzi = write_deepzoom(dir.path(), "case", 40, 20, TS, "png");

    let splitter = SlideSplitter::open(&dzi, 2, 256).await.unwrap();
    assert_eq!(splitter.name(), "case");
    assert_eq!(splitter.level_to_split(), 6);
    assert_eq!(splitter.grid_aspect().as_pair(), (2, 1));

    let assembly = splitter.split(&SplitOptions::default()).await.unwrap();
    assert!(assembly.is_complete());
    assert_eq!(assembly.identifiers(), vec!["case_1_1", "case_1_2"]);

    let top = assembly.get("case_1_1").unwrap();
    let bottom = assembly.get("case_1_2").unwrap();
    assert_eq!((top.width(), top.height()), (3 * TS, TS));
    assert_eq!((bottom.width(), bottom.height()), (3 * TS, TS));

    for x in 0..3 {
        assert_eq!(*top.image().get_pixel(x * TS + 2, 2), tile_color(x, 0));
        assert_eq!(*bottom.image().get_pixel(x * TS + 2, 2), tile_color(x, 1));
    }
}

#[tokio::test]
async fn test_missing_tile_fails_one_region() {
    let dir = ScratchDir::new("deepzoom_tests_3");
    let dzi = write_deepzoom(dir.path(), "case", 40, 20, TS, "png");
    std::fs::remove_file(dir.path().join("case_files").join("6").join("1_1.png")).unwrap();

    let splitter = SlideSplitter::open(&dzi, 2, 256).await.unwrap();
    let options = SplitOptions {
        retries: 3,
        ..SplitOptions::default()
    };
    let assembly = splitter.split(&options).await.unwrap();

    assert_eq!(assembly.identifiers(), vec!["case_1_1"]);
    assert_eq!(assembly.failed(), 1);
    assert!(matches!(
        assembly.failures[0].error,
        RegionError::Source(SourceError::Io(IoError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_sidecar_metadata_and_export() {
    let dir = ScratchDir::new("deepzoom_tests_4");
    let dzi = write_deepzoom(dir.path(), "case", 32, 16, TS, "png");
    std::fs::write(
        dir.path().join("case.properties.json"),
        r#"{"openslide.mpp-x": "0.25", "aperio.AppMag": 20, "vendor.unknown": "x"}"#,
    )
    .unwrap();

    let splitter = SlideSplitter::open(&dzi, 1, 256).await.unwrap();
    let metadata = splitter.metadata();
    assert_eq!(metadata.get("openslide.mpp-x"), Some(&MetadataValue::Float(0.25)));
    assert_eq!(metadata.get("aperio.AppMag"), Some(&MetadataValue::Int(20)));
    assert!(!metadata.contains_key("vendor.unknown"));

    let out = dir.path().join("out");
    std::fs::create_dir_all(&out).unwrap();
    let path = splitter.export_metadata(&out).await.unwrap();
    assert_eq!(path, out.join("case.metadata.json"));

    let json: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["aperio.AppMag"], Value::from(20));
    assert_eq!(json["openslide.vendor"], Value::Null);
}

#[tokio::test]
async fn test_exported_metadata_reads_back_as_sidecar() {
    let dir = ScratchDir::new("deepzoom_tests_8");
    let dzi = write_deepzoom(dir.path(), "first", 32, 16, TS, "png");
    std::fs::write(
        dir.path().join("first.properties.json"),
        r#"{
            "tiff.ImageDescription": "Aperio Image Library v11|AppMag = 40|MPP = 0.2520",
            "openslide.level[0].tile-width": 240,
            "openslide.mpp-y": 0.5
        }"#,
    )
    .unwrap();

    let first = SlideSplitter::open(&dzi, 1, 256).await.unwrap();
    assert_eq!(first.metadata().get("aperio.AppMag"), Some(&MetadataValue::Int(40)));
    assert_eq!(first.metadata().get("openslide.mpp-x"), Some(&MetadataValue::Float(0.252)));

    let exported = first.export_metadata(dir.path()).await.unwrap();

    // The export is a valid sidecar for another slide
    let second_dzi = write_deepzoom(dir.path(), "second", 32, 16, TS, "png");
    std::fs::copy(&exported, dir.path().join("second.properties.json")).unwrap();

    let second = SlideSplitter::open(&second_dzi, 1, 256).await.unwrap();
    assert_eq!(second.metadata(), first.metadata());
    assert_eq!(second.metadata().get("openslide.mpp-y"), Some(&MetadataValue::Float(0.5)));
    assert_eq!(second.metadata().get("openslide.vendor"), first.metadata().get("openslide.vendor"));
}

#[tokio::test]
async fn test_overlapping_tiles_rejected() {
    let dir = ScratchDir::new("deepzoom_tests_5");
    let descriptor = DeepZoomDescriptor {
        width: 64,
        height: 64,
        tile_size: 16,
        overlap: 1,
        format: "png".to_string(),
    };
    let dzi = dir.path().join("overlap.dzi");
    std::fs::write(&dzi, descriptor.to_xml()).unwrap();
    std::fs::create_dir_all(dir.path().join("overlap_files")).unwrap();

    let err = SlideSplitter::open(&dzi, 1, 256).await.unwrap_err();
    assert!(matches!(
        err,
        SplitError::Source(SourceError::Unsupported { .. })
    ));
}

#[tokio::test]
async fn test_missing_descriptor() {
    let dir = ScratchDir::new("deepzoom_tests_6");
    let err = SlideSplitter::open(dir.path().join("nope.dzi"), 1, 256)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SplitError::Source(SourceError::Io(IoError::NotFound(_)))
    ));
}

// =============================================================================
// Raster
// =============================================================================

#[tokio::test]
async fn test_split_raster_file() {
    let dir = ScratchDir::new("deepzoom_tests_7");
    let path = dir.path().join("scan.png");
    let raster = RgbImage::from_fn(64, 32, |x, y| image::Rgb([x as u8, y as u8, 9]));
    raster.save(&path).unwrap();

    let splitter = SlideSplitter::open(&path, 2, TS).await.unwrap();
    assert_eq!(splitter.level_count(), 1);
    assert_eq!(splitter.level_info().tiles_x, 4);
    assert_eq!(splitter.level_info().tiles_y, 2);

    let assembly = splitter.split(&SplitOptions::default()).await.unwrap();
    let top = assembly.get("scan_1_1").unwrap();
    let bottom = assembly.get("scan_1_2").unwrap();

    assert_eq!(top.image().dimensions(), (64, 16));
    assert_eq!(*top.image().get_pixel(63, 15), image::Rgb([63, 15, 9]));
    assert_eq!(*bottom.image().get_pixel(10, 0), image::Rgb([10, 16, 9]));
}
