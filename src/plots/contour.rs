//! Marching-squares contouring on a 2-D grid
//!
//! Segment end points are fractional grid indices `(row, col)`. Cells with
//! any missing corner produce no segment.

use ndarray::ArrayView2;

pub type Segment = [(f64, f64); 2];

/// Evenly spaced round contour levels inside `[vmin, vmax]`, at most about `count`.
pub fn nice_levels(vmin: f64, vmax: f64, count: usize) -> Vec<f64> {
    if !(vmin.is_finite() && vmax.is_finite()) || vmax <= vmin || count == 0 {
        return Vec::new();
    }
    let step = nice_step((vmax - vmin) / count as f64);
    let mut level = (vmin / step).ceil() * step;
    let mut levels = Vec::new();
    while level <= vmax + step * 1e-9 {
        // avoid -0 labels
        levels.push(if level.abs() < step * 1e-9 { 0.0 } else { level });
        level += step;
    }
    levels
}

/// 1, 2, 2.5 or 5 times a power of ten, not below `raw`.
pub fn nice_step(raw: f64) -> f64 {
    let magnitude = 10f64.powf(raw.log10().floor());
    let fraction = raw / magnitude;
    let nice = if fraction <= 1.0 {
        1.0
    } else if fraction <= 2.0 {
        2.0
    } else if fraction <= 2.5 {
        2.5
    } else if fraction <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

/// Label text for a contour level with the precision its spacing needs.
pub fn level_label(level: f64, step: f64) -> String {
    let decimals = if step >= 1.0 {
        0
    } else {
        (-step.log10().floor()) as usize
    };
    format!("{level:.decimals$}")
}

fn crossing(a: (f64, f64), va: f64, b: (f64, f64), vb: f64, level: f64) -> (f64, f64) {
    let f = if vb != va { (level - va) / (vb - va) } else { 0.5 };
    (a.0 + (b.0 - a.0) * f, a.1 + (b.1 - a.1) * f)
}

/// Segments of the `level` isoline through `values`.
pub fn isoline(values: ArrayView2<'_, f64>, level: f64) -> Vec<Segment> {
    let (rows, cols) = values.dim();
    let mut segments = Vec::new();
    if rows < 2 || cols < 2 {
        return segments;
    }

    for i in 0..rows - 1 {
        for j in 0..cols - 1 {
            let v00 = values[[i, j]];
            let v01 = values[[i, j + 1]];
            let v11 = values[[i + 1, j + 1]];
            let v10 = values[[i + 1, j]];
            if !(v00.is_finite() && v01.is_finite() && v11.is_finite() && v10.is_finite()) {
                continue;
            }

            let p00 = (i as f64, j as f64);
            let p01 = (i as f64, j as f64 + 1.0);
            let p11 = (i as f64 + 1.0, j as f64 + 1.0);
            let p10 = (i as f64 + 1.0, j as f64);

            // edges in order: top, right, bottom, left
            let edges = [(p00, v00, p01, v01), (p01, v01, p11, v11), (p11, v11, p10, v10), (p10, v10, p00, v00)];
            let cuts: Vec<Option<(f64, f64)>> = edges
                .iter()
                .map(|&(a, va, b, vb)| ((va >= level) != (vb >= level)).then(|| crossing(a, va, b, vb, level)))
                .collect();
            let points: Vec<(f64, f64)> = cuts.iter().flatten().copied().collect();

            match points.len() {
                2 => segments.push([points[0], points[1]]),
                4 => {
                    let centre = (v00 + v01 + v11 + v10) / 4.0;
                    let (Some(top), Some(right), Some(bottom), Some(left)) = (cuts[0], cuts[1], cuts[2], cuts[3]) else {
                        continue;
                    };
                    if (centre >= level) == (v00 >= level) {
                        segments.push([top, right]);
                        segments.push([bottom, left]);
                    } else {
                        segments.push([top, left]);
                        segments.push([right, bottom]);
                    }
                }
                _ => {}
            }
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn nice_levels_are_round() {
        assert_eq!(nice_levels(0.3, 9.7, 5), vec![2.0, 4.0, 6.0, 8.0]);
        assert!((nice_step(0.37) - 0.5).abs() < 1e-12);
        assert!(nice_levels(1.0, 1.0, 5).is_empty());
    }

    #[test]
    fn labels_follow_step_precision() {
        assert_eq!(level_label(20.0, 5.0), "20");
        assert_eq!(level_label(0.25, 0.05), "0.25");
    }

    #[test]
    fn vertical_isoline_through_ramp() {
        let grid = array![[0.0, 1.0, 2.0], [0.0, 1.0, 2.0]];
        let segs = isoline(grid.view(), 1.5);
        assert_eq!(segs.len(), 1);
        let [a, b] = segs[0];
        assert!((a.1 - 1.5).abs() < 1e-12 && (b.1 - 1.5).abs() < 1e-12);
    }

    #[test]
    fn missing_corner_skips_cell() {
        let grid = array![[0.0, f64::NAN], [0.0, 2.0]];
        assert!(isoline(grid.view(), 1.0).is_empty());
    }
}
