use assert_approx_eq::assert_approx_eq;

use scalar_vision_lib::accel::{lane_count, RayonDispatcher, SerialDispatcher};
use scalar_vision_lib::edges::{hysteresis, non_max_suppression, sobel_gradient, GradientNorm};
use scalar_vision_lib::image_io::{decode_planes, encode_planes, PlaneSet, RasterFormat};
use scalar_vision_lib::kernel::{convolve, gaussian};
use scalar_vision_lib::morphology::close;
use scalar_vision_lib::threshold::{auto_contrast, phansalkar, PhansalkarParams};
use scalar_vision_lib::watershed::{segment, Label};
use scalar_vision_lib::{ScalarField, VisionError};

/// Deterministic pseudo-random field in `0..=255`.
fn noise(width: usize, height: usize, seed: u32) -> ScalarField {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    let data = (0..width * height)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % 256) as f32
        })
        .collect();
    ScalarField::from_vec(width, height, data).unwrap()
}

/// Gaussian basins of depth 150 at `(10, 16)` and depth 100 at `(26, 16)`.
fn two_basins() -> ScalarField {
    let mut f = ScalarField::new(36, 32);
    for y in 0..32 {
        for x in 0..36 {
            let dip = |cx: f32, depth: f32| {
                let d2 = (x as f32 - cx).powi(2) + (y as f32 - 16.0).powi(2);
                depth * (-d2 / 32.0).exp()
            };
            f.set(x, y, 200.0 - dip(10.0, 150.0) - dip(26.0, 100.0));
        }
    }
    f
}

#[test]
fn arithmetic_identities() {
    let a = noise(13, 9, 1);
    let b = noise(13, 9, 2);

    let back = a.add(&b).unwrap().subtract(&b).unwrap();
    for (x, y) in back.as_slice().iter().zip(a.as_slice()) {
        assert_approx_eq!(*x, *y, 1e-3);
    }
    assert_eq!(&a * 1.0, a);
}

#[test]
fn shape_mismatch_is_reported() {
    let a = ScalarField::new(4, 4);
    let b = ScalarField::new(4, 5);
    assert!(matches!(a.add(&b), Err(VisionError::DimensionMismatch { .. })));
    assert!(matches!(a.divide(&b), Err(VisionError::DimensionMismatch { .. })));
}

#[test]
fn identity_kernel_and_normalised_gaussian() {
    let field = noise(11, 7, 3);
    let identity = ScalarField::filled(1, 1, 1.0);
    assert_eq!(convolve(&field, &identity).unwrap(), field);

    for (sigma, size) in [(0.6, 5), (1.4, 7), (3.0, 3)] {
        let kernel = gaussian(sigma, size).unwrap();
        assert_approx_eq!(kernel.sum(), 1.0, 1e-5);
    }
}

#[test]
fn auto_contrast_stays_in_range() {
    let stretched = auto_contrast(&noise(64, 64, 4), 8).unwrap();
    assert!(stretched.min() >= 0.0);
    assert!(stretched.max() <= 255.0);

    let flat = ScalarField::filled(32, 32, 128.0);
    assert!(matches!(auto_contrast(&flat, 8), Err(VisionError::DegenerateRange(_))));
}

#[test]
fn suppression_never_raises_magnitude() {
    let gradient = sobel_gradient(&noise(40, 30, 5), GradientNorm::L2);
    let suppressed = non_max_suppression(&gradient);
    for (s, m) in suppressed.as_slice().iter().zip(gradient.magnitude.as_slice()) {
        assert!(*s == 0.0 || s == m);
    }
}

#[test]
fn hysteresis_keeps_only_connected_weak_pixels() {
    let mut field = ScalarField::new(512, 512);
    // strong seed with a weak tail, plus an isolated weak run
    field.set(100, 100, 90.0);
    for x in 101..300 {
        field.set(x, 100, 30.0);
    }
    for x in 10..50 {
        field.set(x, 400, 30.0);
    }

    let linked = hysteresis(&field, 20.0, 60.0, 255.0).unwrap();
    assert_eq!(linked.count_nonzero(), 200);
    assert_approx_eq!(linked.get(299, 100), 255.0);
    assert_approx_eq!(linked.get(20, 400), 0.0);
}

#[test]
fn closing_is_idempotent() {
    let mut field = ScalarField::new(30, 30);
    for y in 5..25 {
        for x in 5..25 {
            if (x + y) % 7 != 0 {
                field.set(x, y, 255.0);
            }
        }
    }
    let once = close(&field, 5).unwrap();
    let twice = close(&once, 5).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn flat_field_is_one_region() {
    let seg = segment(&ScalarField::filled(10, 10, 42.0));
    assert_eq!(seg.region_count(), 1);
    assert_eq!(seg.boundary_count(), 0);
}

#[test]
fn separated_basins_get_distinct_labels() {
    let seg = segment(&two_basins());
    let left = seg.label_at(10, 16);
    let right = seg.label_at(26, 16);
    assert!(matches!(left, Label::Region(_)));
    assert!(matches!(right, Label::Region(_)));
    assert_ne!(left, right);
    assert!(seg.region_count() >= 2);
    assert!(seg.boundary_count() > 0);
}

#[test]
fn serial_and_parallel_thresholds_agree() {
    let field = noise(57, 43, 6);
    let params = PhansalkarParams::default();
    let serial = phansalkar(&field, 7, &params, &SerialDispatcher).unwrap();
    let parallel = phansalkar(&field, 7, &params, &RayonDispatcher).unwrap();
    assert_eq!(serial, parallel);
}

#[test]
fn lane_count_is_power_of_two_covering_sqrt() {
    assert_eq!(lane_count(0), 1);
    assert_eq!(lane_count(1), 1);
    assert_eq!(lane_count(16), 4);
    assert_eq!(lane_count(17), 8);
    assert_eq!(lane_count(1000), 32);
}

#[test]
fn png_round_trip_preserves_levels() {
    let field = noise(20, 15, 7).map(f32::floor);
    let set = PlaneSet::gray(field.clone());
    let bytes = encode_planes(&set, RasterFormat::Png).unwrap();
    let back = decode_planes(&bytes).unwrap();
    assert_eq!(back.plane_count(), 1);
    assert_eq!(back.plane(0), Some(&field));
}
