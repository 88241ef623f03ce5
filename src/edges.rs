//! Sobel gradients, non-maximum suppression and hysteresis linking.
//!
//! There is a single Canny-style pipeline. The only knob that differs between
//! historical variants is the magnitude norm, exposed as [`GradientNorm`].
//! Orientation is kept as `atan2(gy, gx)` in degrees, range (-180, 180], and
//! folded into [0, 180) when classifying sectors.
//!
//! Sector rule (half-open on the folded angle θ):
//!
//! | sector         | θ                          | compared neighbours      |
//! |----------------|----------------------------|--------------------------|
//! | Horizontal     | [0, 22.5) ∪ [157.5, 180)   | (x-1, y), (x+1, y)       |
//! | Diagonal       | [22.5, 67.5)               | (x-1, y-1), (x+1, y+1)   |
//! | Vertical       | [67.5, 112.5)              | (x, y-1), (x, y+1)       |
//! | AntiDiagonal   | [112.5, 157.5)             | (x+1, y-1), (x-1, y+1)   |
//!
//! A pixel survives suppression only when it is strictly greater than both
//! compared neighbours. The outermost 1-pixel frame is always zero.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, VisionError};
use crate::field::ScalarField;
use crate::image_utils::neighbours_8;
use crate::kernel::{convolve, gaussian};

type Kernel3 = [[f32; 3]; 3];

const SOBEL_KERNEL_X: Kernel3 = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_KERNEL_Y: Kernel3 = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

/// How gradient magnitude is combined from `gx` and `gy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientNorm {
    /// `|gx| + |gy|`
    #[default]
    L1,
    /// `sqrt(gx² + gy²)`
    L2,
}

impl GradientNorm {
    #[inline]
    pub fn combine(self, gx: f32, gy: f32) -> f32 {
        match self {
            GradientNorm::L1 => gx.abs() + gy.abs(),
            GradientNorm::L2 => (gx * gx + gy * gy).sqrt(),
        }
    }
}

/// Per-pixel gradient buffers.
#[derive(Debug, Clone)]
pub struct Gradient {
    pub gx: ScalarField,
    pub gy: ScalarField,
    pub magnitude: ScalarField,
    /// `atan2(gy, gx)` in degrees
    pub orientation: ScalarField,
}

/// Orientation sector used to pick the two comparison neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sector {
    Horizontal,
    Diagonal,
    Vertical,
    AntiDiagonal,
}

impl Sector {
    /// Classify an `atan2` angle in degrees.
    pub fn from_degrees(angle: f32) -> Sector {
        let folded = if angle < 0.0 { angle + 180.0 } else { angle };
        if !(22.5..157.5).contains(&folded) {
            Sector::Horizontal
        } else if folded < 67.5 {
            Sector::Diagonal
        } else if folded < 112.5 {
            Sector::Vertical
        } else {
            Sector::AntiDiagonal
        }
    }

    #[inline]
    fn neighbour_offsets(self) -> [(i64, i64); 2] {
        match self {
            Sector::Horizontal => [(-1, 0), (1, 0)],
            Sector::Diagonal => [(-1, -1), (1, 1)],
            Sector::Vertical => [(0, -1), (0, 1)],
            Sector::AntiDiagonal => [(1, -1), (-1, 1)],
        }
    }
}

/// 3×3 Sobel gradients over interior pixels; the border frame stays zero.
pub fn sobel_gradient(field: &ScalarField, norm: GradientNorm) -> Gradient {
    let (w, h) = field.dimensions();
    let mut gx = ScalarField::new(w, h);
    let mut gy = ScalarField::new(w, h);
    let mut magnitude = ScalarField::new(w, h);
    let mut orientation = ScalarField::new(w, h);

    if w < 3 || h < 3 {
        return Gradient {
            gx,
            gy,
            magnitude,
            orientation,
        };
    }

    for y in 1..h - 1 {
        let rows = [field.row(y - 1), field.row(y), field.row(y + 1)];
        for x in 1..w - 1 {
            let mut sum_x = 0.0f32;
            let mut sum_y = 0.0f32;
            for (ky, src) in rows.iter().enumerate() {
                let kx_row = &SOBEL_KERNEL_X[ky];
                let ky_row = &SOBEL_KERNEL_Y[ky];
                sum_x += src[x - 1] * kx_row[0] + src[x] * kx_row[1] + src[x + 1] * kx_row[2];
                sum_y += src[x - 1] * ky_row[0] + src[x] * ky_row[1] + src[x + 1] * ky_row[2];
            }

            gx.set(x, y, sum_x);
            gy.set(x, y, sum_y);
            magnitude.set(x, y, norm.combine(sum_x, sum_y));
            orientation.set(x, y, sum_y.atan2(sum_x).to_degrees());
        }
    }

    Gradient {
        gx,
        gy,
        magnitude,
        orientation,
    }
}

/// Thin edges: keep a magnitude only where it is a strict local maximum
/// across its orientation sector.
pub fn non_max_suppression(gradient: &Gradient) -> ScalarField {
    let mag = &gradient.magnitude;
    let (w, h) = mag.dimensions();
    let mut result = ScalarField::new(w, h);
    if w < 3 || h < 3 {
        return result;
    }

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let magnitude = mag.get(x, y);
            let sector = Sector::from_degrees(gradient.orientation.get(x, y));
            let [(ax, ay), (bx, by)] = sector.neighbour_offsets();
            let a = mag.get((x as i64 + ax) as usize, (y as i64 + ay) as usize);
            let b = mag.get((x as i64 + bx) as usize, (y as i64 + by) as usize);

            if magnitude > a && magnitude > b {
                result.set(x, y, magnitude);
            }
        }
    }

    result
}

/// Two-threshold edge linking.
///
/// Pixels `>= high` seed strong edges; 8-connected pixels `>= low` reachable
/// from a seed join them. Linked pixels are set to `edge_value`, the rest to 0.
pub fn hysteresis(field: &ScalarField, low: f32, high: f32, edge_value: f32) -> Result<ScalarField> {
    if low > high {
        return Err(VisionError::InvalidParameter(format!(
            "hysteresis low threshold {} exceeds high threshold {}",
            low, high
        )));
    }

    let (w, h) = field.dimensions();
    let values = field.as_slice();
    let mut linked = vec![false; values.len()];
    let mut worklist: Vec<usize> = Vec::new();

    for seed in 0..values.len() {
        if linked[seed] || !(values[seed] >= high) {
            continue;
        }
        linked[seed] = true;
        worklist.push(seed);

        while let Some(p) = worklist.pop() {
            for q in neighbours_8(p, w, h) {
                if !linked[q] && values[q] >= low {
                    linked[q] = true;
                    worklist.push(q);
                }
            }
        }
    }

    let data = linked
        .iter()
        .map(|&on| if on { edge_value } else { 0.0 })
        .collect();
    Ok(ScalarField::from_raw(w, h, data))
}

/// Gaussian pre-blur settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurOptions {
    pub sigma: f32,
    pub size: usize,
}

impl Default for BlurOptions {
    fn default() -> Self {
        Self { sigma: 0.6, size: 5 }
    }
}

/// Hysteresis thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HysteresisOptions {
    pub low: f32,
    pub high: f32,
    pub edge_value: f32,
}

/// Options for [`canny`].
#[derive(Debug, Clone, Default)]
pub struct EdgeOptions {
    pub norm: GradientNorm,
    pub blur: Option<BlurOptions>,
    pub hysteresis: Option<HysteresisOptions>,
}

/// Intermediate and final products of the edge pipeline.
#[derive(Debug, Clone)]
pub struct EdgeMap {
    pub gradient: Gradient,
    pub suppressed: ScalarField,
    pub linked: Option<ScalarField>,
}

impl EdgeMap {
    /// The most processed field: the linked edges when hysteresis ran,
    /// otherwise the suppressed magnitude.
    pub fn edges(&self) -> &ScalarField {
        self.linked.as_ref().unwrap_or(&self.suppressed)
    }
}

/// Blur (optional) → Sobel gradient → non-maximum suppression → hysteresis (optional).
pub fn canny(field: &ScalarField, options: &EdgeOptions) -> Result<EdgeMap> {
    let source = match options.blur {
        Some(blur) => convolve(field, &gaussian(blur.sigma, blur.size)?)?,
        None => field.clone(),
    };

    let gradient = sobel_gradient(&source, options.norm);
    let suppressed = non_max_suppression(&gradient);

    let linked = match options.hysteresis {
        Some(hy) => Some(hysteresis(&suppressed, hy.low, hy.high, hy.edge_value)?),
        None => None,
    };

    debug!(
        "canny norm={:?} blur={:?}: {} suppressed-edge pixels, {} linked",
        options.norm,
        options.blur,
        suppressed.count_nonzero(),
        linked.as_ref().map(|l| l.count_nonzero()).unwrap_or(0)
    );

    Ok(EdgeMap {
        gradient,
        suppressed,
        linked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Vertical ramp edge: 0 | 50 | 100 with a unique gradient peak at x = 3.
    fn ramp_edge(w: usize, h: usize) -> ScalarField {
        let mut f = ScalarField::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let v = match x {
                    0..=2 => 0.0,
                    3 => 50.0,
                    _ => 100.0,
                };
                f.set(x, y, v);
            }
        }
        f
    }

    fn pseudo_random(w: usize, h: usize, seed: u32) -> ScalarField {
        let mut state = seed;
        let data = (0..w * h)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                ((state >> 16) % 256) as f32
            })
            .collect();
        ScalarField::from_vec(w, h, data).unwrap()
    }

    #[test]
    fn sector_boundaries_are_half_open() {
        assert_eq!(Sector::from_degrees(0.0), Sector::Horizontal);
        assert_eq!(Sector::from_degrees(22.4), Sector::Horizontal);
        assert_eq!(Sector::from_degrees(22.5), Sector::Diagonal);
        assert_eq!(Sector::from_degrees(67.5), Sector::Vertical);
        assert_eq!(Sector::from_degrees(112.5), Sector::AntiDiagonal);
        assert_eq!(Sector::from_degrees(157.5), Sector::Horizontal);
        assert_eq!(Sector::from_degrees(180.0), Sector::Horizontal);
        assert_eq!(Sector::from_degrees(-22.5), Sector::Horizontal);
        assert_eq!(Sector::from_degrees(-45.0), Sector::AntiDiagonal);
        assert_eq!(Sector::from_degrees(-90.0), Sector::Vertical);
        assert_eq!(Sector::from_degrees(-135.0), Sector::Diagonal);
    }

    #[test]
    fn sobel_on_ramp_edge() {
        let g = sobel_gradient(&ramp_edge(8, 5), GradientNorm::L1);
        assert_eq!(g.gx.get(3, 2), 400.0);
        assert_eq!(g.gx.get(2, 2), 200.0);
        assert_eq!(g.gx.get(4, 2), 200.0);
        assert_eq!(g.gy.get(3, 2), 0.0);
        assert_eq!(g.orientation.get(3, 2), 0.0);
        // border frame is untouched
        assert_eq!(g.magnitude.get(0, 2), 0.0);
        assert_eq!(g.magnitude.get(3, 0), 0.0);
    }

    #[test]
    fn norms_combine_components() {
        let f = pseudo_random(9, 9, 7);
        let l1 = sobel_gradient(&f, GradientNorm::L1);
        let l2 = sobel_gradient(&f, GradientNorm::L2);
        for i in 0..f.len() {
            let (gx, gy) = (l1.gx[i], l1.gy[i]);
            assert_approx_eq!(l1.magnitude[i], gx.abs() + gy.abs());
            assert_approx_eq!(l2.magnitude[i], (gx * gx + gy * gy).sqrt(), 1e-3);
            assert!(l2.magnitude[i] <= l1.magnitude[i] + 1e-3);
        }
    }

    #[test]
    fn suppression_keeps_ridge_only() {
        let g = sobel_gradient(&ramp_edge(8, 5), GradientNorm::L1);
        let nms = non_max_suppression(&g);
        for y in 1..4 {
            assert_eq!(nms.get(3, y), 400.0);
            assert_eq!(nms.get(2, y), 0.0);
            assert_eq!(nms.get(4, y), 0.0);
        }
    }

    #[test]
    fn suppression_never_increases_magnitude() {
        for seed in 1..5 {
            let g = sobel_gradient(&pseudo_random(16, 12, seed), GradientNorm::L2);
            let nms = non_max_suppression(&g);
            for i in 0..nms.len() {
                assert!(nms[i] <= g.magnitude[i]);
            }
        }
    }

    #[test]
    fn hysteresis_links_weak_to_strong() {
        let f = ScalarField::from_vec(7, 1, vec![0.0, 200.0, 60.0, 60.0, 0.0, 60.0, 0.0]).unwrap();
        let out = hysteresis(&f, 50.0, 150.0, 255.0).unwrap();
        assert_eq!(out.as_slice(), &[0.0, 255.0, 255.0, 255.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn hysteresis_follows_diagonals() {
        let mut f = ScalarField::new(4, 4);
        f.set(0, 0, 200.0);
        f.set(1, 1, 60.0);
        f.set(2, 2, 60.0);
        f.set(3, 0, 60.0);
        let out = hysteresis(&f, 50.0, 150.0, 1.0).unwrap();
        assert_eq!(out.get(2, 2), 1.0);
        assert_eq!(out.get(3, 0), 0.0);
    }

    #[test]
    fn hysteresis_handles_large_connected_regions() {
        let mut f = ScalarField::filled(512, 512, 100.0);
        f.set(0, 0, 200.0);
        let out = hysteresis(&f, 50.0, 150.0, 255.0).unwrap();
        assert_eq!(out.count_nonzero(), 512 * 512);
    }

    #[test]
    fn hysteresis_rejects_inverted_thresholds() {
        let f = ScalarField::new(3, 3);
        assert!(matches!(
            hysteresis(&f, 10.0, 5.0, 1.0),
            Err(VisionError::InvalidParameter(_))
        ));
    }

    #[test]
    fn canny_without_blur_finds_the_edge_column() {
        let options = EdgeOptions {
            hysteresis: Some(HysteresisOptions {
                low: 100.0,
                high: 300.0,
                edge_value: 255.0,
            }),
            ..Default::default()
        };
        let map = canny(&ramp_edge(8, 6), &options).unwrap();
        let edges = map.edges();
        for y in 1..5 {
            assert_eq!(edges.get(3, y), 255.0);
        }
        assert_eq!(edges.count_nonzero(), 4);
    }

    #[test]
    fn canny_with_blur_runs() {
        let options = EdgeOptions {
            blur: Some(BlurOptions::default()),
            ..Default::default()
        };
        let map = canny(&ramp_edge(10, 10), &options).unwrap();
        assert!(map.linked.is_none());
        assert!(map.edges().count_nonzero() > 0);
    }
}
