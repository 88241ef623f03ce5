//! Histogram-driven contrast/gamma correction and Phansalkar local thresholding.

use log::debug;

use crate::accel::RowDispatcher;
use crate::errors::{Result, VisionError};
use crate::field::ScalarField;
use crate::histogram::Histogram;

/// Maximum representable level for a bit depth, `2^depth - 1`.
pub fn level_max(depth: u32) -> Result<usize> {
    if !(1..=16).contains(&depth) {
        return Err(VisionError::InvalidParameter(format!(
            "bit depth must be within 1..=16, got {}",
            depth
        )));
    }
    Ok((1usize << depth) - 1)
}

/// Stretch the populated histogram range onto `[0, 2^depth - 1]`.
///
/// Both ends are walked inwards from the populated min/max until a level
/// holds more than `total / 500000` pixels. Levels holding more than
/// `total / 100` pixels are treated as spikes and skipped.
pub fn auto_contrast(field: &ScalarField, depth: u32) -> Result<ScalarField> {
    let size = level_max(depth)?;
    let histogram = Histogram::from_field(field, size);

    let (mut min, mut max) = match (histogram.min(), histogram.max()) {
        (Some(min), Some(max)) => (min, max),
        _ => {
            return Err(VisionError::DegenerateRange(
                "auto contrast needs at least one nonzero pixel".to_string(),
            ))
        }
    };

    let total = field.len() as u64;
    let limit = total / 100;
    let threshold = total / 500_000;

    let significant = |level: usize| {
        let count = histogram.count(level);
        let count = if count > limit { 0 } else { count };
        count > threshold
    };

    while min < size && !significant(min) {
        min += 1;
    }
    while max > 0 && !significant(max) {
        max -= 1;
    }

    if max < min {
        return Err(VisionError::DegenerateRange(format!(
            "auto contrast clip bounds collapsed (min {} > max {})",
            min, max
        )));
    }

    let scale = size as f32 / (max + 1 - min) as f32;
    let (low, top) = (min as f32, size as f32);
    debug!(
        "auto contrast depth={} clip=[{}, {}] scale={:.4}",
        depth, min, max, scale
    );

    Ok(field.par_map(|v| ((v - low) * scale).clamp(0.0, top)))
}

/// Gamma-correct so the field mean lands on mid-scale.
pub fn auto_gamma(field: &ScalarField, depth: u32) -> Result<ScalarField> {
    let size = level_max(depth)? as f64;
    let mean = field.mean() as f64;

    if !(mean > 0.0 && mean < size) {
        return Err(VisionError::DegenerateRange(format!(
            "auto gamma needs a mean strictly inside (0, {}), got {}",
            size, mean
        )));
    }

    let gamma = 0.5f64.ln() / (mean / size).ln();
    debug!("auto gamma depth={} mean={:.3} gamma={:.4}", depth, mean, gamma);

    Ok(field.par_map(|v| {
        let normalised = (v.max(0.0) as f64) / size;
        (size * normalised.powf(gamma)).clamp(0.0, size) as f32
    }))
}

/// Tuning constants of the Phansalkar threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhansalkarParams {
    pub p: f32,
    pub q: f32,
    pub k: f32,
    pub r: f32,
}

impl Default for PhansalkarParams {
    fn default() -> Self {
        Self {
            p: 2.5,
            q: 10.0,
            k: 0.15,
            r: 0.4,
        }
    }
}

/// Summed-area tables of `v / 255` and its square, `(w + 1) × (h + 1)`.
struct Integrals {
    stride: usize,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl Integrals {
    fn new(field: &ScalarField) -> Self {
        let (w, h) = field.dimensions();
        let stride = w + 1;
        let mut sum = vec![0.0f64; stride * (h + 1)];
        let mut sum_sq = vec![0.0f64; stride * (h + 1)];

        for y in 0..h {
            let row = field.row(y);
            let mut run = 0.0f64;
            let mut run_sq = 0.0f64;
            for x in 0..w {
                let v = row[x] as f64 / 255.0;
                run += v;
                run_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + run;
                sum_sq[i] = sum_sq[i - stride] + run_sq;
            }
        }

        Self { stride, sum, sum_sq }
    }

    /// Sums over the half-open box `[x0, x1) × [y0, y1)`.
    #[inline]
    fn window(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> (f64, f64) {
        let s = self.stride;
        let pick = |t: &[f64]| t[y1 * s + x1] - t[y0 * s + x1] - t[y1 * s + x0] + t[y0 * s + x0];
        (pick(&self.sum), pick(&self.sum_sq))
    }
}

/// Phansalkar local threshold over a `(2·radius + 1)²` window.
///
/// Pixels are normalised by 255. The window is clipped at the border and the
/// statistics use only in-bounds pixels. Output is 255 where the normalised
/// pixel exceeds `mean·(1 + p·e^(−q·mean) + k·(dev/r − 1))`, else 0.
pub fn phansalkar(
    field: &ScalarField,
    radius: usize,
    params: &PhansalkarParams,
    dispatcher: &dyn RowDispatcher,
) -> Result<ScalarField> {
    if !(params.r.abs() > 0.0) {
        return Err(VisionError::InvalidParameter(
            "phansalkar r must be nonzero".to_string(),
        ));
    }

    let (w, h) = field.dimensions();
    // any window at least this wide already covers the whole field
    let radius = radius.min(w.max(h));
    let integrals = Integrals::new(field);
    let PhansalkarParams { p, q, k, r } = *params;
    let (p, q, k, r) = (p as f64, q as f64, k as f64, r as f64);

    let mut out = vec![0.0f32; w * h];
    dispatcher.dispatch(w, &mut out, &|y, out_row| {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(h);
        let src = field.row(y);

        for (x, out) in out_row.iter_mut().enumerate() {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(w);
            let count = ((x1 - x0) * (y1 - y0)) as f64;

            let (sum, sum_sq) = integrals.window(x0, y0, x1, y1);
            let mean = sum / count;
            let deviation = (sum_sq / count - mean * mean).max(0.0).sqrt();
            let threshold = mean * (1.0 + p * (-q * mean).exp() + k * (deviation / r - 1.0));

            *out = if src[x] as f64 / 255.0 > threshold { 255.0 } else { 0.0 };
        }
    });

    debug!(
        "phansalkar radius={} via {} dispatcher",
        radius,
        dispatcher.name()
    );
    Ok(ScalarField::from_raw(w, h, out))
}

/// `max - v` for every pixel.
pub fn invert(field: &ScalarField, max: f32) -> ScalarField {
    field.par_map(|v| max - v)
}
