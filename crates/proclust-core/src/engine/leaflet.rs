use crate::core::geometry::{self, BoxDimensions};
use crate::core::models::cluster::ClusterClass;
use crate::core::models::frame::LeafletHeadgroups;
use nalgebra::Point3;

/// Classifies a cluster as transmembrane or interfacial from the leaflet
/// headgroup geometry.
///
/// For every atom of every member protein, the minimum distances to the
/// lower and upper headgroup sets are compared. A cluster uniformly closer
/// to one leaflet is adsorbed to that surface; a mixed sign pattern means
/// its footprint spans the bilayer.
///
/// The test operates at the cluster level because a per-protein criterion is
/// unreliable for small or tilted proteins that individually look
/// surface-bound while cooperatively spanning the bilayer.
pub fn classify_cluster(
    members: &[usize],
    protein_atoms: &[Vec<Point3<f64>>],
    leaflets: &LeafletHeadgroups,
    box_dim: &BoxDimensions,
) -> ClusterClass {
    let mut total = 0usize;
    let mut closer_to_lower = 0usize;
    for &p in members {
        let atoms = &protein_atoms[p];
        let to_lower = geometry::min_distances_to_set(atoms, &leaflets.lower, box_dim);
        let to_upper = geometry::min_distances_to_set(atoms, &leaflets.upper, box_dim);
        for (lower, upper) in to_lower.iter().zip(to_upper.iter()) {
            total += 1;
            if upper - lower > 0.0 {
                closer_to_lower += 1;
            }
        }
    }
    if closer_to_lower == total {
        ClusterClass::InterfacialLower
    } else if closer_to_lower == 0 {
        ClusterClass::InterfacialUpper
    } else {
        ClusterClass::Transmembrane
    }
}
