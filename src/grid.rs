//! The segmentation-grid renderer (spec.md §4.8).
//!
//! Mirrors `generate_grid_from_qtree_recursive`/`change_filename_to_seg_grid`
//! from the original `qtree.c`/`main.c`: an auxiliary raster, the same size
//! as the decoded image, that outlines every leaf block's boundary in black
//! over a white field, making the tree's decomposition visible.

use std::path::{Path, PathBuf};

use crate::raster::Raster;
use crate::tree::QuadTree;

const BORDER: u8 = 0;
const FIELD: u8 = 255;

/// Renders the leaf boundaries of a decoded tree as a black-on-white raster.
pub fn render_grid(tree: &QuadTree) -> Raster {
    let side = tree.side();
    let mut grid = Raster::new(side, side, 255);
    for s in grid.samples.iter_mut() {
        *s = FIELD;
    }
    if !tree.is_empty() {
        outline(tree, &mut grid, 0, tree.level(), 0, 0);
    }
    grid
}

fn outline(tree: &QuadTree, grid: &mut Raster, index: usize, depth: u8, row: u32, col: u32) {
    let node = tree.nodes[index];

    if depth == 0 {
        // Leaf tile: too small to show a border, so use a checkerboard
        // tiebreaker on the leaf's own index instead (spec.md §4.8).
        let color = if index % 2 == 0 { FIELD } else { BORDER };
        grid.set_sample(row, col, color);
        return;
    }

    if node.u {
        draw_border(grid, row, col, 1u32 << depth);
        return;
    }

    let child_depth = depth - 1;
    let h = 1u32 << child_depth;
    let c = QuadTree::child_base(index);
    outline(tree, grid, c, child_depth, row, col);
    outline(tree, grid, c + 1, child_depth, row, col + h);
    outline(tree, grid, c + 2, child_depth, row + h, col + h);
    outline(tree, grid, c + 3, child_depth, row + h, col);
}

/// Fills a uniform tile: its top row and left column are black, the rest
/// white (spec.md §4.8 — only the top/left edges are drawn, not a full box
/// outline, so adjacent tiles don't double-draw a shared edge).
fn draw_border(grid: &mut Raster, row: u32, col: u32, side: u32) {
    for i in 0..side {
        for j in 0..side {
            let color = if i == 0 || j == 0 { BORDER } else { FIELD };
            grid.set_sample(row + i, col + j, color);
        }
    }
}

/// Derives the grid image's path from a companion output path, by inserting
/// a `_g` suffix before the stem (spec.md §6 "Grid filename convention")
/// and always using the `.pgm` extension (`out.pgm` -> `out_g.pgm`,
/// `out.qtc` -> `out_g.pgm`) — the grid is always a PGM raster, regardless
/// of which side of the codec wrote it.
pub fn grid_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!("{}_g.pgm", stem);
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}
