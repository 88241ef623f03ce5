use crate::field::ScalarField;

/// 8-connected neighbourhood, clockwise from east
pub const NEIGHBOURS_8: [(i64, i64); 8] = [
    (1, 0),   // right
    (1, 1),   // down-right
    (0, 1),   // down
    (-1, 1),  // down-left
    (-1, 0),  // left
    (-1, -1), // up-left
    (0, -1),  // up
    (1, -1),  // up-right
];

/// Check if a point is inside the field bounds
#[inline]
pub fn in_bounds(x: i64, y: i64, width: usize, height: usize) -> bool {
    x >= 0 && y >= 0 && (x as usize) < width && (y as usize) < height
}

/// Linear indices of the in-bounds 8-neighbours of linear index `index`.
#[inline]
pub fn neighbours_8(index: usize, width: usize, height: usize) -> impl Iterator<Item = usize> {
    let x = (index % width) as i64;
    let y = (index / width) as i64;
    NEIGHBOURS_8.iter().filter_map(move |&(dx, dy)| {
        let (nx, ny) = (x + dx, y + dy);
        in_bounds(nx, ny, width, height).then(|| ny as usize * width + nx as usize)
    })
}

/// Stamp `point_size`-wide squares of `value` centred on each point.
pub fn mark_points(field: &ScalarField, points: &[(usize, usize)], value: f32, point_size: usize) -> ScalarField {
    let mut marked = field.clone();
    let (width, height) = marked.dimensions();
    let radius = point_size / 2;

    for &(x, y) in points {
        for dy in 0..point_size {
            for dx in 0..point_size {
                let px = x.saturating_sub(radius).saturating_add(dx);
                let py = y.saturating_sub(radius).saturating_add(dy);

                if px < width && py < height {
                    marked.set(px, py, value);
                }
            }
        }
    }

    marked
}
