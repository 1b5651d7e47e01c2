//! A quadtree-based codec for grayscale PGM images (spec.md §1, §2).
//!
//! The pipeline is the same on both sides: [`raster::Raster`] is the PGM
//! collaborator, [`tree::QuadTree`] is the in-memory decomposition, and
//! [`tree::qtc`] is the wire format between them. [`grid`] renders the
//! optional segmentation overlay.

pub mod bitstream;
pub mod error;
pub mod grid;
pub mod raster;
pub mod tree;

pub use error::QtcError;
pub use raster::Raster;
pub use tree::qtc::EncodeReport;
pub use tree::QuadTree;

use std::fs::{self, File};
use std::path::Path;

use chrono::Local;

/// Tunables for the encode pipeline (spec.md §4.6, §6.3).
#[derive(Clone, Copy, Debug)]
pub struct EncodeOptions {
    /// Lossy-filter strength; `0.0` disables filtering entirely.
    pub alpha: f64,
    /// Also render and write the segmentation grid alongside the `.qtc`.
    pub write_grid: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            alpha: 0.0,
            write_grid: false,
        }
    }
}

/// Tunables for the decode pipeline (spec.md §6.3).
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodeOptions {
    /// Also render and write the segmentation grid alongside the `.pgm`.
    pub write_grid: bool,
}

/// Reads a PGM file, builds its quadtree, optionally filters it, and writes
/// the QTC-encoded result to `output` (spec.md §6.3 encode mode).
pub fn encode_file(
    input: &Path,
    output: &Path,
    opts: &EncodeOptions,
) -> Result<EncodeReport, QtcError> {
    if opts.alpha < 0.0 || opts.alpha > 2.0 {
        return Err(QtcError::AlphaOutOfRange(opts.alpha));
    }

    let raster = Raster::read_pgm(File::open(input)?)?;
    let mut tree = QuadTree::build(&raster)?;
    // alpha < 0.1 means "no filtering" (spec.md §4.6); the filter itself
    // would otherwise still run and simply fail to uniformize anything.
    if opts.alpha >= 0.1 {
        tree.filter(opts.alpha);
    } else if opts.alpha > 0.0 {
        log::debug!("alpha {} below 0.1 threshold, skipping filter", opts.alpha);
    }

    ensure_parent_dir(output)?;
    let timestamp = Local::now().format("%a %b %e %T %Y").to_string();
    let report = tree.encode(File::create(output)?, Some(&timestamp))?;
    log::info!(
        "encoded {} -> {} ({:.2}% of raw size)",
        input.display(),
        output.display(),
        report.compression_rate_percent
    );

    if opts.write_grid {
        // The grid companion is named after the PGM side of this operation
        // (the input, on encode), matching `from_pgm_to_qtc`'s use of
        // `args->file_name_input` rather than the `.qtc` output path.
        write_grid_for(&tree, input)?;
    }

    Ok(report)
}

/// Reads a QTC file, reconstructs its raster, and writes it as PGM to
/// `output` (spec.md §6.3 decode mode).
pub fn decode_file(input: &Path, output: &Path, opts: &DecodeOptions) -> Result<(), QtcError> {
    let tree = QuadTree::decode(File::open(input)?)?;
    let raster = tree::render::to_raster(&tree);

    ensure_parent_dir(output)?;
    raster.write_pgm(File::create(output)?)?;
    log::info!("decoded {} -> {}", input.display(), output.display());

    if opts.write_grid {
        write_grid_for(&tree, output)?;
    }

    Ok(())
}

fn write_grid_for(tree: &QuadTree, companion_output: &Path) -> Result<(), QtcError> {
    let grid = grid::render_grid(tree);
    let path = grid::grid_path(companion_output);
    ensure_parent_dir(&path)?;
    grid.write_pgm(File::create(&path)?)?;
    log::info!("wrote segmentation grid to {}", path.display());
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
