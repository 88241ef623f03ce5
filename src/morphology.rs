use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, VisionError};
use crate::field::ScalarField;
use crate::image_utils::in_bounds;

/// Starting value of the erosion accumulator.
pub const ERODE_CEILING: f32 = 255.0;

/// Offsets of a disk structuring element of diameter `size`.
///
/// The radius is `(size - 1) / 2` in integer arithmetic and an offset
/// qualifies only when its distance from the centre is strictly below the
/// radius. Sizes 1 and 2 therefore produce an empty element.
pub fn disk_offsets(size: u32) -> Result<Vec<(i64, i64)>> {
    if size == 0 {
        return Err(VisionError::InvalidStructuringElement(size));
    }

    let radius = ((size - 1) / 2) as i64;
    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let distance = ((dx * dx + dy * dy) as f64).sqrt();
            if distance < radius as f64 {
                offsets.push((dx, dy));
            }
        }
    }
    Ok(offsets)
}

/// Shared row loop: fold every in-bounds disk neighbour of each pixel.
/// Pixels with no in-bounds neighbour are written as 0.
fn rank_filter<F>(field: &ScalarField, size: u32, init: f32, pick: F) -> Result<ScalarField>
where
    F: Fn(f32, f32) -> f32 + Sync,
{
    let offsets = disk_offsets(size)?;
    let (width, height) = field.dimensions();
    let mut data = vec![0.0f32; width * height];
    if width == 0 {
        return Ok(ScalarField::from_raw(width, height, data));
    }

    data.par_chunks_mut(width).enumerate().for_each(|(y, out_row)| {
        for (x, out) in out_row.iter_mut().enumerate() {
            let mut value = init;
            let mut set = false;
            for &(dx, dy) in &offsets {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if in_bounds(nx, ny, width, height) {
                    value = pick(value, field.get(nx as usize, ny as usize));
                    set = true;
                }
            }
            *out = if set { value } else { 0.0 };
        }
    });

    Ok(ScalarField::from_raw(width, height, data))
}

/// Grey-level dilation: maximum over the disk.
pub fn dilate(field: &ScalarField, size: u32) -> Result<ScalarField> {
    rank_filter(field, size, 0.0, f32::max)
}

/// Grey-level erosion: minimum over the disk, capped at [`ERODE_CEILING`].
pub fn erode(field: &ScalarField, size: u32) -> Result<ScalarField> {
    rank_filter(field, size, ERODE_CEILING, f32::min)
}

/// Apply morphological closing (dilation followed by erosion)
pub fn close(field: &ScalarField, size: u32) -> Result<ScalarField> {
    erode(&dilate(field, size)?, size)
}

/// Apply morphological opening (erosion followed by dilation)
pub fn open(field: &ScalarField, size: u32) -> Result<ScalarField> {
    dilate(&erode(field, size)?, size)
}

/// Morphological operation selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MorphologyOp {
    #[default]
    None,
    Close,
    Open,
}

impl MorphologyOp {
    pub fn apply(self, field: &ScalarField, size: u32) -> Result<ScalarField> {
        match self {
            MorphologyOp::None => Ok(field.clone()),
            MorphologyOp::Close => close(field, size),
            MorphologyOp::Open => open(field, size),
        }
    }
}
