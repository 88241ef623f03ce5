//! Immersion watershed (Vincent–Soille).
//!
//! The image is flooded level by level from its minima. Pixels at the current
//! level are first grown outward from already-labelled neighbours in
//! breadth-first order, one distance ring at a time (a `None` entry in the
//! queue separates the rings). Pixels reached from two different basins become
//! watershed lines. A pixel touching only a watershed line joins it unless a
//! basin reaches it later in the same pass. Whatever is left unreached at the level seeds new basins.
//!
//! State lives in a flat arena indexed by `y * width + x`; there is no
//! per-pixel object graph and nothing recurses.

use std::collections::VecDeque;

use log::debug;

use crate::field::ScalarField;
use crate::image_utils::neighbours_8;

/// Per-pixel label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// Not reached yet (above the current level).
    Init,
    /// At the current level, not yet assigned.
    Mask,
    /// Divide between two basins.
    Watershed,
    /// Basin id, starting at 1.
    Region(u32),
}

impl Label {
    #[inline]
    fn is_assigned(self) -> bool {
        matches!(self, Label::Region(_) | Label::Watershed)
    }
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    label: Label,
    distance: u32,
}

/// Result of [`segment`].
#[derive(Debug, Clone)]
pub struct Segmentation {
    width: usize,
    height: usize,
    labels: Vec<Label>,
    region_count: u32,
    boundary_count: usize,
}

impl Segmentation {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn label_at(&self, x: usize, y: usize) -> Label {
        self.labels[y * self.width + x]
    }

    /// Number of distinct basins found.
    pub fn region_count(&self) -> u32 {
        self.region_count
    }

    /// Number of watershed-line pixels.
    pub fn boundary_count(&self) -> usize {
        self.boundary_count
    }

    /// Watershed lines painted with `color`, everything else 0.
    pub fn boundary_field(&self, color: f32) -> ScalarField {
        let data = self
            .labels
            .iter()
            .map(|&l| if l == Label::Watershed { color } else { 0.0 })
            .collect();
        ScalarField::from_raw(self.width, self.height, data)
    }

    /// Region ids as intensities; watershed lines and unlabelled pixels are 0.
    pub fn region_field(&self) -> ScalarField {
        let data = self
            .labels
            .iter()
            .map(|&l| match l {
                Label::Region(id) => id as f32,
                _ => 0.0,
            })
            .collect();
        ScalarField::from_raw(self.width, self.height, data)
    }

    /// Pixel count per region; index 0 holds region 1.
    pub fn region_areas(&self) -> Vec<usize> {
        let mut areas = vec![0usize; self.region_count as usize];
        for label in &self.labels {
            if let Label::Region(id) = *label {
                areas[(id - 1) as usize] += 1;
            }
        }
        areas
    }
}

/// Integer flooding level of a value: `floor(v)` clamped at 0, NaN as 0.
#[inline]
fn level_of(value: f32) -> u64 {
    value.floor().max(0.0) as u64
}

/// Segment `field` into basins separated by watershed lines.
pub fn segment(field: &ScalarField) -> Segmentation {
    let (width, height) = field.dimensions();
    let n = width * height;

    let levels: Vec<u64> = field.as_slice().iter().map(|&v| level_of(v)).collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| levels[i]);

    let mut cells = vec![
        Cell {
            label: Label::Init,
            distance: 0,
        };
        n
    ];
    let mut queue: VecDeque<Option<usize>> = VecDeque::new();
    let mut flood: VecDeque<usize> = VecDeque::new();
    let mut next_region = 0u32;

    let mut start = 0;
    while start < n {
        let level = levels[order[start]];
        let end = start + order[start..].iter().take_while(|&&i| levels[i] == level).count();
        let pixels = &order[start..end];

        // mask the level and queue pixels bordering labelled ground
        for &p in pixels {
            cells[p].label = Label::Mask;
            if neighbours_8(p, width, height).any(|q| cells[q].label.is_assigned()) {
                cells[p].distance = 1;
                queue.push_back(Some(p));
            }
        }

        let mut distance = 1u32;
        queue.push_back(None);

        loop {
            let p = match queue.pop_front() {
                Some(Some(p)) => p,
                Some(None) => {
                    if queue.is_empty() {
                        break;
                    }
                    queue.push_back(None);
                    distance += 1;
                    match queue.pop_front() {
                        Some(Some(p)) => p,
                        _ => break,
                    }
                }
                None => break,
            };

            // set while p is a divide only because it touches one
            let mut provisional = false;
            for q in neighbours_8(p, width, height) {
                let neighbour = cells[q];
                if neighbour.distance <= distance && neighbour.label.is_assigned() {
                    match (neighbour.label, cells[p].label) {
                        (Label::Region(id), Label::Mask) => cells[p].label = Label::Region(id),
                        (Label::Region(id), Label::Watershed) if provisional => {
                            cells[p].label = Label::Region(id);
                            provisional = false;
                        }
                        (Label::Region(id), Label::Region(own)) if own != id => {
                            cells[p].label = Label::Watershed;
                            provisional = false;
                        }
                        (Label::Watershed, Label::Mask) => {
                            cells[p].label = Label::Watershed;
                            provisional = true;
                        }
                        _ => {}
                    }
                } else if neighbour.label == Label::Mask && neighbour.distance == 0 {
                    cells[q].distance = distance + 1;
                    queue.push_back(Some(q));
                }
            }
        }
        queue.clear();

        // anything still masked starts a new basin
        for &p in pixels {
            cells[p].distance = 0;
            if cells[p].label != Label::Mask {
                continue;
            }

            next_region += 1;
            cells[p].label = Label::Region(next_region);
            flood.push_back(p);

            while let Some(f) = flood.pop_front() {
                for q in neighbours_8(f, width, height) {
                    if cells[q].label == Label::Mask {
                        cells[q].label = Label::Region(next_region);
                        flood.push_back(q);
                    }
                }
            }
        }

        start = end;
    }

    let labels: Vec<Label> = cells.iter().map(|c| c.label).collect();
    let boundary_count = labels.iter().filter(|&&l| l == Label::Watershed).count();
    debug!(
        "watershed {}x{}: {} regions, {} boundary pixels",
        width, height, next_region, boundary_count
    );

    Segmentation {
        width,
        height,
        labels,
        region_count: next_region,
        boundary_count,
    }
}

/// Segment and return only the boundary field painted with `color`.
pub fn watershed(field: &ScalarField, color: f32) -> ScalarField {
    segment(field).boundary_field(color)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_basins() -> ScalarField {
        let mut f = ScalarField::new(36, 32);
        for y in 0..32 {
            for x in 0..36 {
                let d1 = ((x as f32 - 10.0).powi(2) + (y as f32 - 16.0).powi(2)) / 32.0;
                let d2 = ((x as f32 - 26.0).powi(2) + (y as f32 - 16.0).powi(2)) / 32.0;
                f.set(x, y, 200.0 - 100.0 * (-d1).exp() - 80.0 * (-d2).exp());
            }
        }
        f
    }

    #[test]
    fn flat_field_is_one_region() {
        let seg = segment(&ScalarField::filled(8, 8, 50.0));
        assert_eq!(seg.region_count(), 1);
        assert_eq!(seg.boundary_count(), 0);
        assert!(seg.labels().iter().all(|&l| l == Label::Region(1)));
        assert_eq!(watershed(&ScalarField::filled(8, 8, 50.0), 255.0).count_nonzero(), 0);
    }

    #[test]
    fn two_basins_are_separated() {
        let seg = segment(&two_basins());
        assert!(seg.region_count() >= 2);
        assert!(seg.boundary_count() > 0);

        // basin centres carry different ids
        let a = seg.label_at(10, 16);
        let b = seg.label_at(26, 16);
        assert!(matches!(a, Label::Region(_)));
        assert!(matches!(b, Label::Region(_)));
        assert_ne!(a, b);

        // the divide runs between the two centres
        assert!((11..26).any(|x| seg.label_at(x, 16) == Label::Watershed));
    }

    #[test]
    fn boundary_field_uses_color() {
        let seg = segment(&two_basins());
        let lines = seg.boundary_field(128.0);
        assert_eq!(lines.count_nonzero(), seg.boundary_count());
        assert!(lines.as_slice().iter().all(|&v| v == 0.0 || v == 128.0));
    }

    #[test]
    fn areas_cover_all_non_boundary_pixels() {
        let seg = segment(&two_basins());
        let total: usize = seg.region_areas().iter().sum();
        assert_eq!(total + seg.boundary_count(), 36 * 32);
        assert_eq!(seg.region_field().max() as u32, seg.region_count());
    }

    #[test]
    fn pixel_above_a_divide_is_not_a_new_basin() {
        let f = ScalarField::from_rows(&[
            [0.0, 0.0, 1.0, 0.0, 0.0],
            [9.0, 9.0, 2.0, 9.0, 9.0],
            [9.0, 9.0, 3.0, 9.0, 9.0],
        ])
        .unwrap();
        let seg = segment(&f);
        assert_eq!(seg.region_count(), 2);
        assert_eq!(seg.boundary_count(), 3);
        for y in 0..3 {
            assert_eq!(seg.label_at(1, y), Label::Region(1));
            assert_eq!(seg.label_at(2, y), Label::Watershed);
            assert_eq!(seg.label_at(3, y), Label::Region(2));
        }
    }

    #[test]
    fn negative_values_flood_at_level_zero() {
        let f = ScalarField::from_vec(3, 1, vec![-5.0, -1.0, 0.5]).unwrap();
        let seg = segment(&f);
        assert_eq!(seg.region_count(), 1);
    }

    #[test]
    fn empty_field() {
        let seg = segment(&ScalarField::new(0, 0));
        assert_eq!(seg.region_count(), 0);
        assert_eq!(seg.boundary_field(1.0).len(), 0);
    }
}
