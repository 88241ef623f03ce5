//! Fixed-radius Hough circle accumulator.

use log::debug;

use crate::errors::{Result, VisionError};
use crate::field::ScalarField;

/// Vote for circle centres of the given `radius`.
///
/// Every nonzero pixel of `edges` votes at `(x - r·cos θ, y - r·sin θ)` for
/// θ = 0, `increment`, … below 360 degrees. Coordinates are truncated toward
/// zero and only votes strictly inside `(0, width) × (0, height)` count.
/// Cells with fewer than `360 / increment · threshold_percent / 100` votes
/// are cleared.
pub fn hough_circles(
    edges: &ScalarField,
    radius: u32,
    increment: u32,
    threshold_percent: f32,
) -> Result<ScalarField> {
    if radius == 0 || increment == 0 {
        return Err(VisionError::InvalidParameter(format!(
            "hough radius and angle increment must be positive, got radius={} increment={}",
            radius, increment
        )));
    }

    let (width, height) = edges.dimensions();
    let mut accumulator = ScalarField::new(width, height);

    let r = radius as f64;
    let offsets: Vec<(f64, f64)> = (0..360)
        .step_by(increment as usize)
        .map(|theta| {
            let t = (theta as f64).to_radians();
            (r * t.cos(), r * t.sin())
        })
        .collect();

    for y in 0..height {
        for (x, &value) in edges.row(y).iter().enumerate() {
            if !(value > 0.0) {
                continue;
            }
            for &(dx, dy) in &offsets {
                let a = (x as f64 - dx) as i64;
                let b = (y as f64 - dy) as i64;
                if a > 0 && a < width as i64 && b > 0 && b < height as i64 {
                    accumulator[(a as usize, b as usize)] += 1.0;
                }
            }
        }
    }

    let cutoff = 360.0 / increment as f32 * threshold_percent / 100.0;
    let accumulator = accumulator.map(|v| if v < cutoff { 0.0 } else { v });
    debug!(
        "hough radius={} increment={} cutoff={:.1}: {} candidate centres",
        radius,
        increment,
        cutoff,
        accumulator.count_nonzero()
    );
    Ok(accumulator)
}

/// Coordinates of the nonzero accumulator cells, strongest first.
pub fn circle_centres(accumulator: &ScalarField) -> Vec<(usize, usize, f32)> {
    let width = accumulator.width();
    let mut centres: Vec<(usize, usize, f32)> = accumulator
        .as_slice()
        .iter()
        .enumerate()
        .filter(|(_, &v)| v > 0.0)
        .map(|(i, &v)| (i % width, i / width, v))
        .collect();
    centres.sort_by(|a, b| b.2.total_cmp(&a.2));
    centres
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(w: usize, h: usize, cx: f64, cy: f64, r: f64) -> ScalarField {
        let mut f = ScalarField::new(w, h);
        for step in 0..720 {
            let t = (step as f64 * 0.5).to_radians();
            let x = (cx + r * t.cos()).round() as usize;
            let y = (cy + r * t.sin()).round() as usize;
            f.set(x, y, 255.0);
        }
        f
    }

    #[test]
    fn rejects_zero_parameters() {
        let f = ScalarField::new(4, 4);
        assert!(hough_circles(&f, 0, 5, 30.0).is_err());
        assert!(hough_circles(&f, 3, 0, 30.0).is_err());
    }

    #[test]
    fn empty_edges_give_empty_accumulator() {
        let acc = hough_circles(&ScalarField::new(10, 10), 3, 5, 0.0).unwrap();
        assert_eq!(acc.count_nonzero(), 0);
    }

    #[test]
    fn single_pixel_votes_on_a_circle() {
        let mut f = ScalarField::new(21, 21);
        f.set(10, 10, 1.0);
        let acc = hough_circles(&f, 5, 90, 0.0).unwrap();
        // θ = 0, 90, 180, 270
        assert_eq!(acc.get(5, 10), 1.0);
        assert_eq!(acc.get(10, 5), 1.0);
        assert_eq!(acc.get(15, 10), 1.0);
        assert_eq!(acc.get(10, 15), 1.0);
        assert_eq!(acc.sum(), 4.0);
    }

    #[test]
    fn votes_on_the_left_and_top_border_are_dropped() {
        let mut f = ScalarField::new(10, 10);
        f.set(3, 3, 1.0);
        // θ = 0 lands on x = 0, which is excluded
        let acc = hough_circles(&f, 3, 360, 0.0).unwrap();
        assert_eq!(acc.sum(), 0.0);
    }

    #[test]
    fn ring_peaks_at_its_centre() {
        // a half-pixel centre keeps truncated votes inside one cell
        let edges = ring(40, 40, 20.5, 20.5, 8.0);
        let acc = hough_circles(&edges, 8, 5, 10.0).unwrap();
        let centres = circle_centres(&acc);
        assert!(!centres.is_empty());
        let (x, y, _) = centres[0];
        assert!((x as i64 - 20).abs() <= 1 && (y as i64 - 20).abs() <= 1);
    }
}
