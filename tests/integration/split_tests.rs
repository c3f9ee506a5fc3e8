//! End-to-end split tests over synthetic sources.
//!
//! Tests verify:
//! - The split factor follows the grid aspect
//! - Every tile lands in exactly one sub-image, at the right offset
//! - One failing region does not stop the others
//! - Transient fetch errors are retried when asked to

use std::collections::HashSet;
use std::sync::Arc;

use image::Rgb;
use wsi_splitter::error::{ConfigurationError, RegionError, SourceError, SplitError};
use wsi_splitter::split::{SaveFormat, SaveTarget, SlideSplitter, SplitFactor, SplitOptions};

use super::test_utils::{tile_color, PatternSource, ScratchDir};

const TS: u32 = 16;

fn options() -> SplitOptions {
    SplitOptions {
        max_concurrency: 4,
        ..SplitOptions::default()
    }
}

// =============================================================================
// Planning
// =============================================================================

#[test]
fn test_plan_single_image() {
    let source = Arc::new(PatternSource::new(10, 7, TS));
    let splitter = SlideSplitter::new("slide", source, 1).unwrap();

    assert_eq!(splitter.split_factor(), SplitFactor::new(1, 1));
    assert_eq!(splitter.regions().len(), 1);
    assert_eq!(splitter.level_to_split(), 0);
}

#[test]
fn test_plan_four_images_on_wide_grid() {
    let source = Arc::new(PatternSource::new(9, 4, TS));
    let splitter = SlideSplitter::new("slide", source, 4).unwrap();

    assert_eq!(splitter.grid_aspect().as_pair(), (2, 1));
    assert_eq!(splitter.split_factor(), SplitFactor::new(2, 2));

    let boxes: Vec<_> = splitter
        .regions()
        .iter()
        .map(|r| (r.column, r.row, r.tiles.cols(), r.tiles.rows()))
        .collect();
    // The extra column goes to the right-hand regions
    assert_eq!(boxes, vec![(1, 1, 4, 2), (2, 1, 5, 2), (1, 2, 4, 2), (2, 2, 5, 2)]);
}

#[test]
fn test_plan_rejects_unsupported_count() {
    let source = Arc::new(PatternSource::new(10, 10, TS));
    let err = SlideSplitter::new("slide", source, 2).unwrap_err();

    assert!(matches!(
        err,
        SplitError::Configuration(ConfigurationError::UnsupportedSplit {
            requested: 2,
            aspect: (1, 1)
        })
    ));
}

#[test]
fn test_plan_rejects_zero_images() {
    let source = Arc::new(PatternSource::new(4, 2, TS));
    let err = SlideSplitter::new("slide", source, 0).unwrap_err();
    assert!(matches!(
        err,
        SplitError::Configuration(ConfigurationError::NoImages)
    ));
}

#[test]
fn test_plan_rejects_grid_too_small() {
    // 2x1 grid, 6 images would need 3 columns and 2 rows
    let source = Arc::new(PatternSource::new(2, 1, TS));
    let err = SlideSplitter::new("slide", source, 6).unwrap_err();
    assert!(matches!(
        err,
        SplitError::Configuration(ConfigurationError::GridTooSmall { .. })
    ));
}

// =============================================================================
// Stitching
// =============================================================================

#[tokio::test]
async fn test_split_single_image_reconstructs_grid() {
    let source = Arc::new(PatternSource::new(5, 3, TS));
    let splitter = SlideSplitter::new("slide", Arc::clone(&source), 1).unwrap();

    let assembly = splitter.split(&options()).await.unwrap();
    assert!(assembly.is_complete());
    assert_eq!(assembly.identifiers(), vec!["slide_1_1"]);

    let image = assembly.get("slide_1_1").unwrap();
    assert_eq!((image.width(), image.height()), (5 * TS, 3 * TS));
    for y in 0..3 {
        for x in 0..5 {
            let px = image.image().get_pixel(x * TS + TS / 2, y * TS + TS / 2);
            assert_eq!(*px, tile_color(x, y), "tile ({}, {})", x, y);
        }
    }
    assert_eq!(source.read_count(), 15);
}

#[tokio::test]
async fn test_split_four_images_covers_every_tile_once() {
    let source = Arc::new(PatternSource::new(9, 4, TS));
    let splitter = SlideSplitter::new("wide", Arc::clone(&source), 4).unwrap();

    let assembly = splitter.split(&options()).await.unwrap();
    assert_eq!(assembly.succeeded(), 4);
    assert_eq!(
        assembly.identifiers(),
        vec!["wide_1_1", "wide_1_2", "wide_2_1", "wide_2_2"]
    );

    let mut seen = HashSet::new();
    for id in assembly.identifiers() {
        let stitched = assembly.get(id).unwrap();
        let tiles = stitched.region().tiles;
        for (x, y) in tiles.tiles() {
            assert!(seen.insert((x, y)), "tile ({}, {}) stitched twice", x, y);
            let px = stitched.image().get_pixel(
                (x - tiles.start_col) * TS + 1,
                (y - tiles.start_row) * TS + 1,
            );
            assert_eq!(*px, tile_color(x, y));
        }
    }
    assert_eq!(seen.len(), 36);
    assert_eq!(source.read_count(), 36);
}

#[tokio::test]
async fn test_partial_edge_tiles_leave_black_padding() {
    // 3.5 x 2.25 tiles of pixels
    let source = Arc::new(PatternSource::with_dimensions(56, 36, TS));
    let splitter = SlideSplitter::new("edge", source, 1).unwrap();

    let assembly = splitter.split(&options()).await.unwrap();
    let image = assembly.get("edge_1_1").unwrap();

    assert_eq!((image.width(), image.height()), (4 * TS, 3 * TS));
    assert_eq!(*image.image().get_pixel(55, 35), tile_color(3, 2));
    assert_eq!(*image.image().get_pixel(56, 0), Rgb([0, 0, 0]));
    assert_eq!(*image.image().get_pixel(0, 36), Rgb([0, 0, 0]));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_broken_tile_fails_only_its_region() {
    let source = Arc::new(PatternSource::new(8, 4, TS).with_broken_tile(6, 3));
    let splitter = SlideSplitter::new("slide", source, 4).unwrap();

    let assembly = splitter.split(&options()).await.unwrap();

    assert_eq!(assembly.succeeded(), 3);
    assert_eq!(assembly.failed(), 1);
    assert!(assembly.get("slide_2_2").is_none());

    let failure = &assembly.failures[0];
    assert_eq!((failure.region.column, failure.region.row), (2, 2));
    assert!(matches!(
        failure.error,
        RegionError::Source(SourceError::Decode { .. })
    ));
}

#[tokio::test]
async fn test_transient_errors_fail_without_retries() {
    let source = Arc::new(PatternSource::new(2, 1, TS).with_transient_failures(1));
    let splitter = SlideSplitter::new("slide", source, 1).unwrap();

    let assembly = splitter.split(&options()).await.unwrap();
    assert_eq!(assembly.failed(), 1);
}

#[tokio::test]
async fn test_transient_errors_recovered_by_retries() {
    let source = Arc::new(PatternSource::new(2, 1, TS).with_transient_failures(2));
    let splitter = SlideSplitter::new("slide", Arc::clone(&source), 1).unwrap();

    let opts = SplitOptions {
        retries: 2,
        ..options()
    };
    let assembly = splitter.split(&opts).await.unwrap();

    assert!(assembly.is_complete());
    // Two failed attempts and one success per tile
    assert_eq!(source.read_count(), 6);
}

// =============================================================================
// Saving
// =============================================================================

#[tokio::test]
async fn test_split_saves_each_sub_image() {
    let dir = ScratchDir::new("split_tests_1");
    let out = dir.path().join("nested").join("out");

    let source = Arc::new(PatternSource::new(4, 2, TS));
    let splitter = SlideSplitter::new("slide", source, 2).unwrap();

    let opts = SplitOptions {
        save: Some(SaveTarget::new(&out, SaveFormat::Png)),
        ..options()
    };
    let assembly = splitter.split(&opts).await.unwrap();
    assert_eq!(assembly.succeeded(), 2);

    for id in assembly.identifiers() {
        let stitched = assembly.get(id).unwrap();
        let path = stitched.saved_to().unwrap();
        assert_eq!(path, out.join(format!("{}.png", id)));

        let reread = image::open(path).unwrap().to_rgb8();
        assert_eq!(&reread, stitched.image());
    }
}
