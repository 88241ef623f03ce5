//! Per-row parallel dispatch.
//!
//! Hot per-pixel loops whose output rows are independent hand a row callback
//! to a [`RowDispatcher`]. The callback receives the row index and the
//! disjoint output slice for that row, so no synchronisation is needed beyond
//! the join at the end of `dispatch`.

use rayon::prelude::*;

/// Callback computing one output row in place.
pub type RowFn<'a> = dyn Fn(usize, &mut [f32]) + Sync + 'a;

pub trait RowDispatcher: Send + Sync {
    /// Call `row_fn(y, row)` exactly once for each `width`-long row of `out`.
    fn dispatch(&self, width: usize, out: &mut [f32], row_fn: &RowFn<'_>);

    fn name(&self) -> &'static str;
}

/// Number of parallel lanes for `rows` rows: next power of two >= sqrt(rows).
pub fn lane_count(rows: usize) -> usize {
    let root = (rows as f64).sqrt().ceil() as usize;
    root.max(1).next_power_of_two()
}

/// Runs rows in order on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialDispatcher;

impl RowDispatcher for SerialDispatcher {
    fn dispatch(&self, width: usize, out: &mut [f32], row_fn: &RowFn<'_>) {
        if width == 0 {
            return;
        }
        for (y, row) in out.chunks_mut(width).enumerate() {
            row_fn(y, row);
        }
    }

    fn name(&self) -> &'static str {
        "serial"
    }
}

/// Splits rows into `lane_count(rows)` contiguous blocks on the rayon pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct RayonDispatcher;

impl RowDispatcher for RayonDispatcher {
    fn dispatch(&self, width: usize, out: &mut [f32], row_fn: &RowFn<'_>) {
        if width == 0 || out.is_empty() {
            return;
        }
        let rows = out.len() / width;
        let lanes = lane_count(rows);
        let rows_per_lane = (rows + lanes - 1) / lanes;

        out.par_chunks_mut(rows_per_lane * width)
            .enumerate()
            .for_each(|(lane, block)| {
                let first = lane * rows_per_lane;
                for (i, row) in block.chunks_mut(width).enumerate() {
                    row_fn(first + i, row);
                }
            });
    }

    fn name(&self) -> &'static str {
        "rayon"
    }
}

/// Pick a dispatcher from the `use_parallel` switch.
pub fn dispatcher(parallel: bool) -> Box<dyn RowDispatcher> {
    if parallel {
        Box::new(RayonDispatcher)
    } else {
        Box::new(SerialDispatcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn lane_count_is_next_power_of_two_of_root() {
        assert_eq!(lane_count(0), 1);
        assert_eq!(lane_count(1), 1);
        assert_eq!(lane_count(16), 4);
        assert_eq!(lane_count(17), 8);
        assert_eq!(lane_count(100), 16);
        assert_eq!(lane_count(1080), 64);
    }

    fn check_every_row_once(d: &dyn RowDispatcher, width: usize, height: usize) {
        let mut out = vec![0.0f32; width * height];
        let calls = AtomicUsize::new(0);
        d.dispatch(width, &mut out, &|y, row| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(row.len(), width);
            for v in row.iter_mut() {
                *v = y as f32;
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), height);
        for y in 0..height {
            assert!(out[y * width..(y + 1) * width].iter().all(|&v| v == y as f32));
        }
    }

    #[test]
    fn serial_visits_every_row() {
        check_every_row_once(&SerialDispatcher, 7, 13);
    }

    #[test]
    fn rayon_visits_every_row() {
        check_every_row_once(&RayonDispatcher, 7, 13);
        check_every_row_once(&RayonDispatcher, 3, 1);
        check_every_row_once(&RayonDispatcher, 5, 64);
    }

    #[test]
    fn zero_width_is_a_no_op() {
        let mut out: Vec<f32> = Vec::new();
        RayonDispatcher.dispatch(0, &mut out, &|_, _| panic!("no rows expected"));
        SerialDispatcher.dispatch(0, &mut out, &|_, _| panic!("no rows expected"));
    }
}
