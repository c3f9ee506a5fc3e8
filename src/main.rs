//! WSI Splitter - Split Whole Slide Images into stitched sub-images.
//!
//! This binary parses the command line, sets up logging and drives the
//! library for each subcommand.

use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_splitter::{
    config::{Cli, Command, InspectConfig, PyramidConfig, SplitConfig},
    pyramid::{EmitReport, PyramidEmitter, PyramidInput},
    slide::{PyramidSource, SlideSource},
    split::{slide_name, SlideSplitter},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Split(config) => run_split(config).await,
        Command::Inspect(config) => run_inspect(config).await,
        Command::Pyramid(config) => run_pyramid(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_splitter=debug"
    } else {
        "wsi_splitter=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Split Command
// =============================================================================

async fn run_split(config: SplitConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let splitter = match SlideSplitter::open(&config.slide, config.images, config.tile_size).await
    {
        Ok(splitter) => splitter,
        Err(e) => {
            error!("Cannot split {}: {}", config.slide.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let output_dir = config.resolved_output_dir();
    info!("Slide: {}", config.slide.display());
    info!(
        "  Level {} of {}: {}x{} px",
        splitter.level_to_split(),
        splitter.level_count(),
        splitter.image_width(),
        splitter.image_height()
    );
    info!(
        "  Tile grid: {}x{} (aspect {})",
        splitter.level_info().tiles_x,
        splitter.level_info().tiles_y,
        splitter.grid_aspect()
    );
    info!(
        "  Split: {} -> {} image(s)",
        splitter.split_factor(),
        splitter.number_of_images()
    );

    if config.export_metadata {
        if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
            error!("Cannot create {}: {}", output_dir.display(), e);
            return ExitCode::FAILURE;
        }
        match splitter.export_metadata(&output_dir).await {
            Ok(path) => info!("  Metadata: {}", path.display()),
            Err(e) => {
                error!("Metadata export failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let assembly = match splitter.split(&config.split_options()).await {
        Ok(assembly) => assembly,
        Err(e) => {
            error!("Split failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    for id in assembly.identifiers() {
        match assembly.get(id).and_then(|image| image.saved_to()) {
            Some(path) => info!("  {} -> {}", id, path.display()),
            None => info!("  {}", id),
        }
    }
    for failure in &assembly.failures {
        error!("  Failed {}", failure);
    }
    let complete = assembly.is_complete();

    if config.pyramid {
        let emitter = PyramidEmitter::new(&output_dir)
            .with_subresolutions(config.subresolutions)
            .with_jpeg_quality(config.jpeg_quality);
        let input = PyramidInput::Assembly {
            assembly,
            metadata: splitter.metadata().clone(),
        };

        match emitter.emit_input(input).await {
            Ok(report) => {
                if !log_report(&report) {
                    return ExitCode::FAILURE;
                }
            }
            Err(e) => {
                error!("Pyramid emission failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    if complete {
        ExitCode::SUCCESS
    } else {
        warn!("Some regions failed; see errors above");
        ExitCode::FAILURE
    }
}

/// Log each written pyramid and each failure. Returns `true` if all succeeded.
fn log_report(report: &EmitReport) -> bool {
    for emitted in &report.emitted {
        info!(
            "  Pyramid {} ({} levels{})",
            emitted.path.display(),
            emitted.levels.len(),
            if emitted.bigtiff { ", BigTIFF" } else { "" }
        );
    }
    for (name, e) in &report.failures {
        error!("  Pyramid {} failed: {}", name, e);
    }
    report.failures.is_empty()
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = match SlideSource::open(&config.slide, config.tile_size).await {
        Ok(source) => Arc::new(source),
        Err(e) => {
            eprintln!("Error: cannot open {}: {}", config.slide.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let levels: Vec<_> = (0..source.level_count())
        .filter_map(|level| source.level_info(level))
        .collect();
    let plan = SlideSplitter::new(slide_name(&config.slide), Arc::clone(&source), config.images);

    if config.json {
        let plan_json = match &plan {
            Ok(splitter) => serde_json::json!({
                "images": splitter.number_of_images(),
                "aspect": [splitter.grid_aspect().wide, splitter.grid_aspect().tall],
                "split": [splitter.split_factor().columns, splitter.split_factor().rows],
                "regions": splitter.regions().iter().map(|r| serde_json::json!({
                    "column": r.column,
                    "row": r.row,
                    "tiles": [r.tiles.start_col, r.tiles.start_row, r.tiles.end_col, r.tiles.end_row],
                })).collect::<Vec<_>>(),
            }),
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        };

        let json = serde_json::json!({
            "slide": config.slide.display().to_string(),
            "format": source.format().name(),
            "tile_size": source.tile_size(),
            "levels": levels.iter().map(|l| serde_json::json!({
                "width": l.width,
                "height": l.height,
                "tiles_x": l.tiles_x,
                "tiles_y": l.tiles_y,
            })).collect::<Vec<_>>(),
            "plan": plan_json,
            "metadata": source.metadata(),
        });

        return match serde_json::to_string_pretty(&json) {
            Ok(text) => {
                println!("{}", text);
                if plan.is_ok() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    print_inspect(&config.slide, &source, &levels);

    println!();
    match &plan {
        Ok(splitter) => {
            println!(
                "Split into {}: aspect {}, factor {}",
                splitter.number_of_images(),
                splitter.grid_aspect(),
                splitter.split_factor()
            );
            for region in splitter.regions() {
                println!("  {}", region);
            }
        }
        Err(e) => println!("Split into {}: {}", config.images, e),
    }

    let present: Vec<_> = source.metadata().present().collect();
    println!();
    println!("Metadata ({} of {} properties):", present.len(), source.metadata().len());
    for (key, value) in present {
        println!("  {} = {}", key, value);
    }

    if plan.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_inspect(path: &Path, source: &SlideSource, levels: &[wsi_splitter::slide::LevelInfo]) {
    println!("Slide: {}", path.display());
    println!("Format: {}", source.format().name());
    println!("Tile size: {}", source.tile_size());
    println!();
    println!("Level     Width    Height   Tiles");
    println!("─────────────────────────────────────");
    for (index, level) in levels.iter().enumerate() {
        println!(
            "{:>5} {:>9} {:>9}   {}x{}",
            index, level.width, level.height, level.tiles_x, level.tiles_y
        );
    }
}

// =============================================================================
// Pyramid Command
// =============================================================================

async fn run_pyramid(config: PyramidConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let emitter = PyramidEmitter::new(config.resolved_output_dir())
        .with_subresolutions(config.subresolutions)
        .with_jpeg_quality(config.jpeg_quality)
        .with_compression(config.compression());

    match emitter
        .emit_input(PyramidInput::File(config.raster.clone()))
        .await
    {
        Ok(report) if log_report(&report) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            error!("Cannot build pyramid from {}: {}", config.raster.display(), e);
            ExitCode::FAILURE
        }
    }
}
