use nalgebra::{DMatrix, Point3};

/// Distance reported for a protein against itself, large enough to never
/// satisfy any realistic contact cutoff.
pub const SELF_DISTANCE: f64 = 1e5;

/// Simulation box extents in Angstroms. The bilayer lies in the x/y plane,
/// so x and y are periodic and z is not.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxDimensions {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BoxDimensions {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    fn axis(&self, n: usize) -> f64 {
        match n {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }
}

/// Wraps coordinates into `[0, box)` along the periodic x and y axes.
///
/// Must be applied before any distance computation that assumes all points
/// lie in a single periodic image.
pub fn wrap_into_box(coords: &mut [Point3<f64>], box_dim: &BoxDimensions) {
    for p in coords.iter_mut() {
        p.x -= (p.x / box_dim.x).floor() * box_dim.x;
        p.y -= (p.y / box_dim.y).floor() * box_dim.y;
    }
}

/// Periodic-boundary-aware center of geometry.
///
/// Each axis is treated independently: coordinates are mapped to angles on a
/// circle of circumference `box_dim`, the circular mean is taken via the
/// `atan2` of the averaged sine/cosine components, and the mean angle is
/// mapped back to a linear coordinate in `[0, box)`. A naive arithmetic mean
/// is wrong for a protein straddling a periodic boundary.
pub fn periodic_centroid(coords: &[Point3<f64>], box_dim: &BoxDimensions) -> Point3<f64> {
    let mut cog = Point3::origin();
    let n = coords.len() as f64;
    for axis in 0..3 {
        let length = box_dim.axis(axis);
        let mut cos_sum = 0.0;
        let mut sin_sum = 0.0;
        for p in coords {
            let theta = p[axis] * 2.0 * std::f64::consts::PI / length;
            cos_sum += theta.cos();
            sin_sum += theta.sin();
        }
        // atan2 of the negated averages shifted by pi lands in [0, 2*pi),
        // and is well defined even for the degenerate zero-vector case.
        let theta_avg =
            (-sin_sum / n).atan2(-cos_sum / n) + std::f64::consts::PI;
        cog[axis] = theta_avg * length / (2.0 * std::f64::consts::PI);
    }
    cog
}

/// Euclidean distance under the minimum-image convention in x/y.
/// The z axis is non-periodic, consistent with a flat bilayer geometry.
pub fn minimum_image_distance(a: &Point3<f64>, b: &Point3<f64>, box_dim: &BoxDimensions) -> f64 {
    let mut dx = a.x - b.x;
    let mut dy = a.y - b.y;
    let dz = a.z - b.z;
    dx -= (dx / box_dim.x).round() * box_dim.x;
    dy -= (dy / box_dim.y).round() * box_dim.y;
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Pairwise distance matrix between two point sets (rows index `a`).
pub fn distance_matrix(
    a: &[Point3<f64>],
    b: &[Point3<f64>],
    box_dim: &BoxDimensions,
) -> DMatrix<f64> {
    DMatrix::from_fn(a.len(), b.len(), |i, j| {
        minimum_image_distance(&a[i], &b[j], box_dim)
    })
}

/// Minimum distance over all atom pairs of two selections.
///
/// Returns `SELF_DISTANCE` when either selection is empty so that an empty
/// selection can never register as a contact.
pub fn min_pair_distance(a: &[Point3<f64>], b: &[Point3<f64>], box_dim: &BoxDimensions) -> f64 {
    let mut min = SELF_DISTANCE;
    for pa in a {
        for pb in b {
            let d = minimum_image_distance(pa, pb, box_dim);
            if d < min {
                min = d;
            }
        }
    }
    min
}

/// Per-atom minimum distance from each point of `a` to the point set `b`.
pub fn min_distances_to_set(
    a: &[Point3<f64>],
    b: &[Point3<f64>],
    box_dim: &BoxDimensions,
) -> Vec<f64> {
    a.iter()
        .map(|pa| {
            b.iter()
                .map(|pb| minimum_image_distance(pa, pb, box_dim))
                .fold(SELF_DISTANCE, f64::min)
        })
        .collect()
}

/// Inter-protein distance matrix using the minimum atom-pair distance.
/// Self-distances are set to `SELF_DISTANCE` to prevent self-clustering.
pub fn min_pair_distance_matrix(
    selections: &[Vec<Point3<f64>>],
    box_dim: &BoxDimensions,
) -> DMatrix<f64> {
    let n = selections.len();
    let mut dist = DMatrix::from_element(n, n, SELF_DISTANCE);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = min_pair_distance(&selections[i], &selections[j], box_dim);
            dist[(i, j)] = d;
            dist[(j, i)] = d;
        }
    }
    dist
}

/// Inter-protein distance matrix between periodic centers of geometry.
/// Self-distances are set to `SELF_DISTANCE` to prevent self-clustering.
pub fn centroid_distance_matrix(
    selections: &[Vec<Point3<f64>>],
    box_dim: &BoxDimensions,
) -> DMatrix<f64> {
    let cogs: Vec<Point3<f64>> = selections
        .iter()
        .map(|sel| periodic_centroid(sel, box_dim))
        .collect();
    let mut dist = distance_matrix(&cogs, &cogs, box_dim);
    for i in 0..cogs.len() {
        dist[(i, i)] = SELF_DISTANCE;
    }
    dist
}
