//! Pyramid TIFF output tests.
//!
//! Tests verify:
//! - One IFD per level, halving down the pyramid
//! - Metadata lands in ImageDescription and the resolution tags
//! - Uncompressed tiles hold the source pixels, zero padded
//! - Split runs and image files can both be emitted

use std::sync::Arc;

use image::{Rgb, RgbImage};
use serde_json::Value;
use wsi_splitter::error::{IoError, SourceError, SplitError};
use wsi_splitter::pyramid::{Compression, PyramidEmitter, PyramidInput, TiffTag};
use wsi_splitter::slide::{MetadataValue, SlideMetadata};
use wsi_splitter::split::{SlideSplitter, SplitOptions};

use super::test_utils::{is_bigtiff, read_ifds, PatternSource, ScratchDir};

fn tag(t: TiffTag) -> u16 {
    t as u16
}

#[tokio::test]
async fn test_emit_raster_levels_and_tags() {
    let dir = ScratchDir::new("pyramid_tests_1");
    let metadata = SlideMetadata::empty()
        .with("openslide.mpp-x", MetadataValue::Float(0.5))
        .with("openslide.mpp-y", MetadataValue::Float(0.5))
        .with("aperio.AppMag", MetadataValue::Int(40));

    let emitter = PyramidEmitter::new(dir.path()).with_subresolutions(2);
    let report = emitter
        .emit_input(PyramidInput::Raster {
            name: "scan".to_string(),
            image: RgbImage::from_pixel(100, 60, Rgb([90, 30, 200])),
            metadata,
        })
        .await
        .unwrap();

    assert!(report.failures.is_empty());
    let emitted = &report.emitted[0];
    assert_eq!(emitted.path, dir.path().join("scan.tiff"));
    assert_eq!(emitted.levels, vec![(100, 60), (50, 30), (25, 15)]);
    assert!(!emitted.bigtiff);

    let data = std::fs::read(&emitted.path).unwrap();
    let ifds = read_ifds(&data);
    assert_eq!(ifds.len(), 3);

    for (ifd, &(w, h)) in ifds.iter().zip(&emitted.levels) {
        assert_eq!(ifd.value(tag(TiffTag::ImageWidth)), Some(w as u64));
        assert_eq!(ifd.value(tag(TiffTag::ImageLength)), Some(h as u64));
        assert_eq!(ifd.value(tag(TiffTag::Compression)), Some(7));
        assert_eq!(ifd.value(tag(TiffTag::TileWidth)), Some(256));
        assert_eq!(ifd.entries[&tag(TiffTag::TileOffsets)].len(), 1);
    }

    // Full resolution image carries the description, reduced ones the subfile flag
    assert_eq!(ifds[0].value(tag(TiffTag::NewSubfileType)), None);
    assert_eq!(ifds[1].value(tag(TiffTag::NewSubfileType)), Some(1));
    assert_eq!(ifds[2].value(tag(TiffTag::NewSubfileType)), Some(1));
    assert!(ifds[1].ascii.get(&tag(TiffTag::ImageDescription)).is_none());
    assert!(ifds[0].ascii[&tag(TiffTag::Software)].starts_with("wsi-splitter"));

    let description: Value =
        serde_json::from_str(&ifds[0].ascii[&tag(TiffTag::ImageDescription)]).unwrap();
    assert_eq!(description["axes"], "YXS");
    assert_eq!(description["aperio.AppMag"], 40);
    assert!(description.get("openslide.vendor").is_none());

    // 0.5 um/px in centimeters, then twice the pixel size one level down
    assert_eq!(
        ifds[0].entries[&tag(TiffTag::XResolution)],
        vec![20_000_000, 1000]
    );
    assert_eq!(
        ifds[1].entries[&tag(TiffTag::XResolution)],
        vec![10_000_000, 1000]
    );
    assert_eq!(ifds[0].value(tag(TiffTag::ResolutionUnit)), Some(3));
}

#[tokio::test]
async fn test_uncompressed_tiles_hold_source_pixels() {
    let dir = ScratchDir::new("pyramid_tests_2");
    let metadata = SlideMetadata::empty()
        .with("openslide.level[0].tile-width", MetadataValue::Int(16));
    let image = RgbImage::from_fn(40, 20, |x, y| Rgb([x as u8, y as u8, 1]));

    let emitter = PyramidEmitter::new(dir.path())
        .with_subresolutions(0)
        .with_compression(Compression::None);
    let report = emitter
        .emit_input(PyramidInput::Raster {
            name: "raw".to_string(),
            image,
            metadata,
        })
        .await
        .unwrap();

    let data = std::fs::read(&report.emitted[0].path).unwrap();
    let ifds = read_ifds(&data);
    assert_eq!(ifds.len(), 1);

    let offsets = &ifds[0].entries[&tag(TiffTag::TileOffsets)];
    let counts = &ifds[0].entries[&tag(TiffTag::TileByteCounts)];
    assert_eq!(offsets.len(), 6);
    assert!(counts.iter().all(|&c| c == 16 * 16 * 3));

    // Last tile covers x 32..40, y 16..20 and is padded with zeros
    let last = offsets[5] as usize;
    let pixel = |x: usize, y: usize| {
        let at = last + (y * 16 + x) * 3;
        [data[at], data[at + 1], data[at + 2]]
    };
    assert_eq!(pixel(0, 0), [32, 16, 1]);
    assert_eq!(pixel(7, 3), [39, 19, 1]);
    assert_eq!(pixel(8, 0), [0, 0, 0]);
    assert_eq!(pixel(0, 4), [0, 0, 0]);
}

#[tokio::test]
async fn test_emit_split_assembly() {
    let dir = ScratchDir::new("pyramid_tests_3");
    let source = Arc::new(PatternSource::new(4, 2, 16).with_metadata(
        SlideMetadata::empty().with("openslide.vendor", MetadataValue::Text("test".to_string())),
    ));
    let splitter = SlideSplitter::new("slide", source, 2).unwrap();
    let assembly = splitter.split(&SplitOptions::default()).await.unwrap();

    let report = PyramidEmitter::new(dir.path().join("pyramids"))
        .with_subresolutions(1)
        .emit_input(PyramidInput::Assembly {
            assembly,
            metadata: splitter.metadata().clone(),
        })
        .await
        .unwrap();

    let names: Vec<_> = report
        .emitted
        .iter()
        .map(|e| e.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["slide_1_1.tiff", "slide_1_2.tiff"]);

    for emitted in &report.emitted {
        assert_eq!(emitted.levels, vec![(64, 16), (32, 8)]);
        let ifds = read_ifds(&std::fs::read(&emitted.path).unwrap());
        let description: Value =
            serde_json::from_str(&ifds[0].ascii[&tag(TiffTag::ImageDescription)]).unwrap();
        assert_eq!(description["openslide.vendor"], "test");
    }
}

#[tokio::test]
async fn test_emit_image_file() {
    let dir = ScratchDir::new("pyramid_tests_4");
    let input = dir.path().join("photo.png");
    RgbImage::from_pixel(30, 30, Rgb([5, 5, 5])).save(&input).unwrap();

    let report = PyramidEmitter::new(dir.path())
        .with_bigtiff(Some(true))
        .emit_input(PyramidInput::File(input))
        .await
        .unwrap();

    let emitted = &report.emitted[0];
    assert_eq!(emitted.path, dir.path().join("photo.tiff"));
    assert!(emitted.bigtiff);
    assert!(is_bigtiff(&std::fs::read(&emitted.path).unwrap()));
}

#[tokio::test]
async fn test_emit_missing_file() {
    let dir = ScratchDir::new("pyramid_tests_5");
    let err = PyramidEmitter::new(dir.path())
        .emit_input(PyramidInput::File(dir.path().join("absent.png")))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SplitError::Source(SourceError::Io(IoError::NotFound(_)))
    ));
}
