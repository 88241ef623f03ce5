//! Convolution kernels and the clamped-sum convolution.
//!
//! Kernels are plain [`ScalarField`]s with odd width and height; the centre
//! tap sits at `(width / 2, height / 2)`.
//!
//! Border policy: taps that fall outside the input are skipped and the sum is
//! NOT renormalised. Near the border a normalised kernel therefore produces
//! darker output than in the interior. Existing pipelines depend on this
//! exact behaviour, so it is not a true convolution at the edges.

use std::f64::consts::PI;

use log::debug;
use rayon::prelude::*;

use crate::errors::{Result, VisionError};
use crate::field::ScalarField;

fn ensure_odd(kernel: &ScalarField) -> Result<()> {
    if kernel.width() % 2 == 0 || kernel.height() % 2 == 0 {
        return Err(VisionError::InvalidParameter(format!(
            "kernel dimensions must be odd, got {}x{}",
            kernel.width(),
            kernel.height()
        )));
    }
    Ok(())
}

/// Convolve `field` with `kernel` using the clamped-sum border policy.
pub fn convolve(field: &ScalarField, kernel: &ScalarField) -> Result<ScalarField> {
    ensure_odd(kernel)?;

    let (width, height) = field.dimensions();
    let half_w = (kernel.width() / 2) as i64;
    let half_h = (kernel.height() / 2) as i64;

    let mut data = vec![0.0f32; width * height];
    if width == 0 {
        return Ok(ScalarField::from_raw(width, height, data));
    }

    data.par_chunks_mut(width).enumerate().for_each(|(y, out_row)| {
        for (x, out) in out_row.iter_mut().enumerate() {
            let mut sum = 0.0f32;
            for ky in -half_h..=half_h {
                let sy = y as i64 + ky;
                if sy < 0 || sy >= height as i64 {
                    continue;
                }
                let src_row = field.row(sy as usize);
                let k_row = kernel.row((ky + half_h) as usize);
                for kx in -half_w..=half_w {
                    let sx = x as i64 + kx;
                    if sx < 0 || sx >= width as i64 {
                        continue;
                    }
                    sum += src_row[sx as usize] * k_row[(kx + half_w) as usize];
                }
            }
            *out = sum;
        }
    });

    Ok(ScalarField::from_raw(width, height, data))
}

fn check_sigma(sigma: f32, size: usize) -> Result<()> {
    if !(sigma > 0.0) || !sigma.is_finite() {
        return Err(VisionError::InvalidParameter(format!(
            "sigma must be positive and finite, got {}",
            sigma
        )));
    }
    if size == 0 {
        return Err(VisionError::InvalidParameter(
            "kernel size must be > 0".to_string(),
        ));
    }
    Ok(())
}

/// Normalised 2D Gaussian kernel of `(2r+1)²` taps where `r = size / 2`.
pub fn gaussian(sigma: f32, size: usize) -> Result<ScalarField> {
    check_sigma(sigma, size)?;

    let radius = (size / 2) as i64;
    let dim = (2 * radius + 1) as usize;
    let s2 = (sigma as f64).powi(2);
    let norm = 1.0 / (2.0 * PI * s2);

    let mut kernel = ScalarField::square(dim);
    let mut sum = 0.0f64;
    for y in -radius..=radius {
        for x in -radius..=radius {
            let distance = ((x * x + y * y) as f64) / (2.0 * s2);
            let value = norm * (-distance).exp();
            kernel.set((x + radius) as usize, (y + radius) as usize, value as f32);
            sum += value;
        }
    }

    // sum > 0 for any finite sigma: the centre tap is exp(0) * norm
    let kernel = kernel.map(|v| (v as f64 / sum) as f32);
    debug!("gaussian kernel sigma={} size={}x{}", sigma, dim, dim);
    Ok(kernel)
}

/// Laplacian-of-Gaussian ("Mexican hat") kernel, left unnormalised.
pub fn mexican_hat(sigma: f32, size: usize) -> Result<ScalarField> {
    check_sigma(sigma, size)?;

    let radius = (size / 2) as i64;
    let dim = (2 * radius + 1) as usize;
    let s2 = (sigma as f64).powi(2);

    let mut kernel = ScalarField::square(dim);
    for y in -radius..=radius {
        for x in -radius..=radius {
            let r2 = ((x * x + y * y) as f64) / (2.0 * s2);
            let value = (1.0 / (PI * s2)) * (1.0 - r2) * (-r2).exp();
            kernel.set((x + radius) as usize, (y + radius) as usize, value as f32);
        }
    }
    Ok(kernel)
}

/// 3×3 sharpen kernel: centre 1, ring 1/9.
pub fn sharpen() -> ScalarField {
    let n = 1.0 / 9.0;
    ScalarField::from_raw(3, 3, vec![n, n, n, n, 1.0, n, n, n, n])
}

/// Horizontal-derivative Sobel kernel (responds to vertical edges).
pub fn sobel_x() -> ScalarField {
    ScalarField::from_raw(3, 3, vec![-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0])
}

/// Vertical-derivative Sobel kernel, the transpose of [`sobel_x`].
pub fn sobel_y() -> ScalarField {
    ScalarField::from_raw(3, 3, vec![-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0])
}

/// Linearly rescale `field` into `[min, max]` using its observed range.
pub fn scale(field: &ScalarField, min: f32, max: f32) -> Result<ScalarField> {
    let lo = field.min();
    let hi = field.max();
    let span = hi - lo;
    if field.is_empty() || !(span.abs() > 0.0) || !span.is_finite() {
        return Err(VisionError::DegenerateRange(format!(
            "cannot rescale field with observed range [{}, {}]",
            lo, hi
        )));
    }
    let out_span = max - min;
    Ok(field.par_map(|v| out_span * (v - lo) / span + min))
}

/// Rescale into the displayable `[0, 255]` range.
pub fn rescale_to_u8(field: &ScalarField) -> Result<ScalarField> {
    scale(field, 0.0, 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn ramp(width: usize, height: usize) -> ScalarField {
        let data = (0..width * height).map(|i| (i % 7) as f32 * 3.0).collect();
        ScalarField::from_vec(width, height, data).unwrap()
    }

    #[test]
    fn unit_kernel_is_identity() {
        let f = ramp(9, 6);
        let k = ScalarField::filled(1, 1, 1.0);
        assert_eq!(convolve(&f, &k).unwrap(), f);
    }

    #[test]
    fn even_kernel_is_rejected() {
        let f = ramp(4, 4);
        assert!(matches!(
            convolve(&f, &ScalarField::new(2, 3)),
            Err(VisionError::InvalidParameter(_))
        ));
    }

    #[test]
    fn border_taps_are_skipped_not_renormalised() {
        let f = ScalarField::filled(5, 5, 1.0);
        let k = ScalarField::filled(3, 3, 1.0);
        let out = convolve(&f, &k).unwrap();
        assert_eq!(out.get(2, 2), 9.0);
        assert_eq!(out.get(0, 2), 6.0);
        assert_eq!(out.get(0, 0), 4.0);
    }

    #[test]
    fn kernel_is_not_flipped() {
        // single bright pixel picks up the kernel mirrored around the centre
        let mut f = ScalarField::new(3, 3);
        f.set(1, 1, 1.0);
        let out = convolve(&f, &sobel_x()).unwrap();
        assert_eq!(out.get(0, 1), 2.0);
        assert_eq!(out.get(2, 1), -2.0);
    }

    #[test]
    fn sobel_y_is_transpose_of_sobel_x() {
        let (x, y) = (sobel_x(), sobel_y());
        for row in 0..3 {
            for col in 0..3 {
                assert_eq!(x.get(col, row), y.get(row, col));
            }
        }
    }

    #[test]
    fn sharpen_adds_the_local_mean() {
        let k = sharpen();
        assert_eq!(k.dimensions(), (3, 3));
        assert_eq!(k.get(1, 1), 1.0);
        assert_approx_eq!(k.sum() as f32, 2.0 - 1.0 / 9.0);

        // interior of a flat field: v + 8·v/9
        let out = convolve(&ScalarField::filled(5, 5, 9.0), &k).unwrap();
        assert_approx_eq!(out.get(2, 2), 17.0, 1e-4);
        // corner keeps three ring taps
        assert_approx_eq!(out.get(0, 0), 12.0, 1e-4);
    }

    #[test]
    fn gaussian_sums_to_one() {
        for &(sigma, size) in &[(0.6f32, 5usize), (1.0, 3), (2.5, 9), (0.3, 1), (4.0, 4)] {
            let k = gaussian(sigma, size).unwrap();
            assert_eq!(k.width() % 2, 1);
            assert_approx_eq!(k.sum() as f32, 1.0, 1e-5);
        }
    }

    #[test]
    fn gaussian_peaks_at_centre() {
        let k = gaussian(1.0, 5).unwrap();
        let centre = k.get(2, 2);
        assert!(k.as_slice().iter().all(|&v| v <= centre));
        assert_approx_eq!(k.get(0, 2), k.get(4, 2));
    }

    #[test]
    fn gaussian_rejects_bad_sigma() {
        assert!(gaussian(0.0, 5).is_err());
        assert!(gaussian(-1.0, 5).is_err());
        assert!(gaussian(f32::NAN, 5).is_err());
        assert!(gaussian(1.0, 0).is_err());
    }

    #[test]
    fn mexican_hat_centre_positive_ring_negative() {
        let k = mexican_hat(1.0, 7).unwrap();
        assert!(k.get(3, 3) > 0.0);
        assert!(k.get(0, 3) < 0.0);
        assert_approx_eq!(k.get(3, 3), (1.0 / std::f64::consts::PI) as f32);
    }

    #[test]
    fn scale_maps_to_range() {
        let f = ScalarField::from_vec(3, 1, vec![10.0, 20.0, 30.0]).unwrap();
        let s = scale(&f, 0.0, 255.0).unwrap();
        assert_approx_eq!(s.get(0, 0), 0.0);
        assert_approx_eq!(s.get(1, 0), 127.5);
        assert_approx_eq!(s.get(2, 0), 255.0);
    }

    #[test]
    fn scale_flags_flat_field() {
        let f = ScalarField::filled(4, 4, 7.0);
        assert!(matches!(scale(&f, 0.0, 1.0), Err(VisionError::DegenerateRange(_))));
        assert!(rescale_to_u8(&ScalarField::new(0, 0)).is_err());
    }
}
