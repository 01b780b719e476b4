use geo::Coord;

/// Linear-interpolated percentile of an ascending slice, `q` in [0, 1].
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = (sorted.len() - 1) as f64 * q;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.collect();
    v.sort_by(f64::total_cmp);
    v
}

fn fences(values: &[f64]) -> (f64, f64) {
    let q1 = percentile(values, 0.25);
    let q3 = percentile(values, 0.75);
    let iqr = q3 - q1;
    (q1 - 1.5 * iqr, q3 + 1.5 * iqr)
}

/// Per-axis median after dropping points outside the 1.5 IQR fences on
/// either axis. A single point is its own center.
pub fn robust_center(points: &[Coord<f64>]) -> Option<Coord<f64>> {
    match points {
        [] => return None,
        [only] => return Some(*only),
        _ => {}
    }

    let (x_lo, x_hi) = fences(&sorted(points.iter().map(|p| p.x)));
    let (y_lo, y_hi) = fences(&sorted(points.iter().map(|p| p.y)));

    let mut kept: Vec<Coord<f64>> = points
        .iter()
        .copied()
        .filter(|p| p.x >= x_lo && p.x <= x_hi && p.y >= y_lo && p.y <= y_hi)
        .collect();
    if kept.is_empty() {
        kept = points.to_vec();
    }

    let xs = sorted(kept.iter().map(|p| p.x));
    let ys = sorted(kept.iter().map(|p| p.y));
    Some(Coord {
        x: percentile(&xs, 0.5),
        y: percentile(&ys, 0.5),
    })
}
