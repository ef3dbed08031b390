/// Normalized device coordinates, used when compositing tiles into the canvas.
pub const NDC_RANGE: (f32, f32) = (-1.0, 1.0);
/// Texture-space coordinates, used when sampling a tile during playback.
pub const UV_RANGE: (f32, f32) = (0.0, 1.0);

/// Number of tiles per atlas row for `frame_count` frames.
pub fn frames_per_row(frame_count: u32) -> u32 {
    let mut grid = (frame_count as f64).sqrt().ceil() as u32;
    // Guard float rounding on large perfect squares.
    while grid.saturating_mul(grid) < frame_count {
        grid += 1;
    }
    grid.max(1)
}

/// Piecewise-linear interpolation from `domain` into `range`, clamping
/// outside the domain.
fn interp(value: f32, domain: (f32, f32), range: (f32, f32)) -> f32 {
    let (d0, d1) = domain;
    let (r0, r1) = range;
    if value <= d0 {
        return r0;
    }
    if value >= d1 {
        return r1;
    }
    r0 + (value - d0) * (r1 - r0) / (d1 - d0)
}

/// Maps `frame` to the `(row, col)` of its tile in a `grid_size` wide atlas.
///
/// Negative frames clamp to 0. There is no bounds check against the number of
/// frames in the atlas. When `remap` is set, row and col are each mapped from
/// `[0, grid_size]` into that range.
pub fn tile_coordinates(frame: i64, grid_size: u32, remap: Option<(f32, f32)>) -> (f32, f32) {
    let frame = frame.max(0);
    let grid = i64::from(grid_size.max(1));
    let row = (frame / grid) as f32;
    let col = (frame % grid) as f32;

    match remap {
        Some(range) => {
            let domain = (0.0, grid as f32);
            (interp(row, domain, range), interp(col, domain, range))
        }
        None => (row, col),
    }
}
