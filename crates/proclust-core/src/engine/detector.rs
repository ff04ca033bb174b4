use super::config::CutoffPolicy;
use crate::core::models::topology::SystemTopology;
use nalgebra::DMatrix;
use std::collections::VecDeque;

/// Result of cluster detection for one frame: the contact graph and the
/// partition of protein indices it induces.
///
/// Clusters are sorted (members ascending, clusters by smallest member) so
/// detection output is deterministic and reproducible across runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterGraph {
    neighbors: Vec<Vec<usize>>,
    clusters: Vec<Vec<usize>>,
    cluster_of: Vec<usize>,
}

impl ClusterGraph {
    fn new(neighbors: Vec<Vec<usize>>, mut clusters: Vec<Vec<usize>>) -> Self {
        for members in clusters.iter_mut() {
            members.sort_unstable();
        }
        clusters.sort_unstable();
        let mut cluster_of = vec![0usize; neighbors.len()];
        for (c, members) in clusters.iter().enumerate() {
            for &p in members {
                cluster_of[p] = c;
            }
        }
        Self {
            neighbors,
            clusters,
            cluster_of,
        }
    }

    pub fn nb_proteins(&self) -> usize {
        self.neighbors.len()
    }

    pub fn clusters(&self) -> &[Vec<usize>] {
        &self.clusters
    }

    /// Graph neighbours of a protein (may cross cluster boundaries for
    /// density detection, where border edges to noise points exist).
    pub fn neighbors(&self, protein: usize) -> &[usize] {
        &self.neighbors[protein]
    }

    pub fn cluster_of(&self, protein: usize) -> usize {
        self.cluster_of[protein]
    }
}

/// Extracts connected components from adjacency lists via breadth-first
/// search. Components are transitive: a path through intermediates connects
/// proteins whose direct distance exceeds the cutoff.
fn connected_components(neighbors: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = neighbors.len();
    let mut visited = vec![false; n];
    let mut components = Vec::new();
    let mut queue = VecDeque::new();
    for start in 0..n {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        let mut members = Vec::new();
        while let Some(p) = queue.pop_front() {
            members.push(p);
            for &pp in &neighbors[p] {
                if !visited[pp] {
                    visited[pp] = true;
                    queue.push_back(pp);
                }
            }
        }
        components.push(members);
    }
    components
}

/// Connectivity-based detection: proteins are adjacent when their distance
/// is below the cutoff for their species pair, and clusters are the
/// connected components of that graph.
pub fn detect_connectivity(
    dist: &DMatrix<f64>,
    topology: &SystemTopology,
    cutoff: &CutoffPolicy,
) -> ClusterGraph {
    let n = dist.nrows();
    let mut neighbors = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            let threshold = cutoff.cutoff(topology.species_of(i), topology.species_of(j));
            if dist[(i, j)] < threshold {
                neighbors[i].push(j);
                neighbors[j].push(i);
            }
        }
    }
    let clusters = connected_components(&neighbors);
    ClusterGraph::new(neighbors, clusters)
}

/// Density-based detection (DBSCAN) on a precomputed distance matrix.
///
/// A protein is a core point when its eps-neighbourhood, itself included,
/// holds at least `min_samples` proteins. Core points within eps of each
/// other share a cluster; non-core points join the cluster of the first core
/// point reaching them. Noise points are emitted as singleton clusters so
/// every protein is accounted for in the per-frame size arrays.
pub fn detect_density(dist: &DMatrix<f64>, eps: f64, min_samples: usize) -> ClusterGraph {
    let n = dist.nrows();
    let mut neighbors = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            if dist[(i, j)] <= eps {
                neighbors[i].push(j);
                neighbors[j].push(i);
            }
        }
    }
    let core: Vec<bool> = (0..n).map(|i| neighbors[i].len() + 1 >= min_samples).collect();

    let mut assigned = vec![false; n];
    let mut clusters = Vec::new();
    let mut queue = VecDeque::new();
    for start in 0..n {
        if assigned[start] || !core[start] {
            continue;
        }
        assigned[start] = true;
        queue.push_back(start);
        let mut members = Vec::new();
        while let Some(p) = queue.pop_front() {
            members.push(p);
            if !core[p] {
                // Border points join the cluster but do not expand it.
                continue;
            }
            for &pp in &neighbors[p] {
                if !assigned[pp] {
                    assigned[pp] = true;
                    queue.push_back(pp);
                }
            }
        }
        clusters.push(members);
    }
    for p in 0..n {
        if !assigned[p] {
            clusters.push(vec![p]);
        }
    }
    ClusterGraph::new(neighbors, clusters)
}
