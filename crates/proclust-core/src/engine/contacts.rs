use super::config::AnalysisConfig;
use super::detector::ClusterGraph;
use super::error::EngineError;
use crate::core::geometry;
use crate::core::models::cluster::{ClusterClass, ClusterStatus};
use crate::core::models::frame::Frame;
use crate::core::models::topology::SystemTopology;
use nalgebra::{DMatrix, DVector};
use std::collections::{BTreeMap, HashSet};

/// Species index pair with the lower index first.
pub type SpeciesPair = (usize, usize);

fn ordered(s1: usize, s2: usize) -> SpeciesPair {
    (s1.min(s2), s1.max(s2))
}

/// Residue-against-headgroup contact counts for one leaflet, per species,
/// keyed by realized cluster size or size-group index. An absent key means
/// no contacts were observed for that bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafletContactSet {
    pub by_size: Vec<BTreeMap<usize, DVector<f64>>>,
    pub by_group: Vec<BTreeMap<usize, DVector<f64>>>,
}

impl LeafletContactSet {
    fn new(nb_species: usize) -> Self {
        Self {
            by_size: vec![BTreeMap::new(); nb_species],
            by_group: vec![BTreeMap::new(); nb_species],
        }
    }

    fn merge(&mut self, other: Self) {
        for (mine, theirs) in [
            (&mut self.by_size, other.by_size),
            (&mut self.by_group, other.by_group),
        ] {
            for (species, map) in theirs.into_iter().enumerate() {
                for (key, vector) in map {
                    match mine[species].get_mut(&key) {
                        Some(existing) => *existing += vector,
                        None => {
                            mine[species].insert(key, vector);
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LipidContacts {
    pub lower: LeafletContactSet,
    pub upper: LeafletContactSet,
}

/// Streaming accumulator for all cross-frame cluster statistics.
///
/// One instance is threaded through the frame loop; every frame's
/// contribution is additive and commutative, so independent accumulators
/// over disjoint frame ranges can be combined with [`merge`](Self::merge).
#[derive(Debug, Clone, PartialEq)]
pub struct ContactAccumulator {
    nb_frames: usize,
    /// Cluster assignment per (frame, protein), written exactly once.
    pub(crate) statuses: Vec<Vec<Option<ClusterStatus>>>,
    /// Residue-pair contact counts per species pair, over all sampled sizes.
    pub(crate) res_contacts: BTreeMap<SpeciesPair, DMatrix<f64>>,
    /// Same counts keyed by realized cluster size (lazily allocated).
    pub(crate) res_contacts_by_size: BTreeMap<SpeciesPair, BTreeMap<usize, DMatrix<f64>>>,
    /// Same counts keyed by size-group index (lazily allocated).
    pub(crate) res_contacts_by_group: BTreeMap<SpeciesPair, BTreeMap<usize, DMatrix<f64>>>,
    /// Total residue-pair contacts per ordered protein pair.
    pub(crate) prot_contacts: DMatrix<f64>,
    /// Per-frame neighbour tallies: proteins x species.
    pub(crate) neighbours: Vec<DMatrix<f64>>,
    /// Occurrences of each species composition per cluster size.
    pub(crate) compositions: BTreeMap<usize, BTreeMap<Vec<usize>, u64>>,
    /// Residue-lipid headgroup contacts (leaflet-enabled runs only).
    pub(crate) lipid: LipidContacts,
}

impl ContactAccumulator {
    pub fn new(topology: &SystemTopology, nb_frames: usize) -> Self {
        let nb_proteins = topology.nb_proteins();
        let nb_species = topology.nb_species();
        let mut res_contacts = BTreeMap::new();
        let mut res_contacts_by_size = BTreeMap::new();
        let mut res_contacts_by_group = BTreeMap::new();
        for s1 in 0..nb_species {
            for s2 in s1..nb_species {
                let rows = topology.species()[s1].full_length();
                let cols = topology.species()[s2].full_length();
                res_contacts.insert((s1, s2), DMatrix::zeros(rows, cols));
                res_contacts_by_size.insert((s1, s2), BTreeMap::new());
                res_contacts_by_group.insert((s1, s2), BTreeMap::new());
            }
        }
        Self {
            nb_frames,
            statuses: vec![vec![None; nb_proteins]; nb_frames],
            res_contacts,
            res_contacts_by_size,
            res_contacts_by_group,
            prot_contacts: DMatrix::zeros(nb_proteins, nb_proteins),
            neighbours: vec![DMatrix::zeros(nb_proteins, nb_species); nb_frames],
            compositions: BTreeMap::new(),
            lipid: LipidContacts {
                lower: LeafletContactSet::new(nb_species),
                upper: LeafletContactSet::new(nb_species),
            },
        }
    }

    pub fn nb_frames(&self) -> usize {
        self.nb_frames
    }

    fn set_status(
        &mut self,
        f_index: usize,
        protein: usize,
        status: ClusterStatus,
    ) -> Result<(), EngineError> {
        let slot = &mut self.statuses[f_index][protein];
        if slot.is_some() {
            return Err(EngineError::DuplicateStatus {
                frame: f_index,
                protein,
            });
        }
        *slot = Some(status);
        Ok(())
    }

    /// Folds one frame's detected clusters into the accumulator.
    ///
    /// `classes` holds the leaflet classification per cluster, parallel to
    /// `graph.clusters()`; interfacial clusters only receive a status, while
    /// transmembrane clusters contribute to every contact tensor.
    pub fn record_frame(
        &mut self,
        f_index: usize,
        frame: &Frame,
        graph: &ClusterGraph,
        classes: &[ClusterClass],
        topology: &SystemTopology,
        config: &AnalysisConfig,
    ) -> Result<(), EngineError> {
        if classes.len() != graph.clusters().len() {
            return Err(EngineError::Internal(format!(
                "{} cluster classes supplied for {} clusters",
                classes.len(),
                graph.clusters().len()
            )));
        }
        let cutoff = config.residue_contact_cutoff;
        let box_dim = frame.box_dim;
        for (c_index, (members, class)) in graph.clusters().iter().zip(classes).enumerate() {
            match class {
                ClusterClass::InterfacialLower => {
                    for &p in members {
                        self.set_status(f_index, p, ClusterStatus::InterfacialLower)?;
                    }
                    continue;
                }
                ClusterClass::InterfacialUpper => {
                    for &p in members {
                        self.set_status(f_index, p, ClusterStatus::InterfacialUpper)?;
                    }
                    continue;
                }
                ClusterClass::Transmembrane => {}
            }

            let c_size = members.len();
            let group = config.size_groups.as_ref().map(|g| g.group_of(c_size));
            let mut composition = vec![0usize; topology.nb_species()];
            let mut pairs_treated: HashSet<(usize, usize)> = HashSet::new();

            for &p in members {
                let p_species = topology.species_of(p);
                self.set_status(f_index, p, ClusterStatus::Transmembrane(c_size))?;
                composition[p_species] += 1;

                if let Some(leaflets) = &frame.leaflets {
                    self.record_lipid_contacts(
                        p,
                        p_species,
                        c_size,
                        group,
                        &frame.residue_centroids[p],
                        &leaflets.lower,
                        &leaflets.upper,
                        cutoff,
                        &box_dim,
                    );
                }

                for &pp in graph.neighbors(p) {
                    // Density border edges may point outside the cluster.
                    if graph.cluster_of(pp) != c_index {
                        continue;
                    }
                    let pair_key = (p.min(pp), p.max(pp));
                    if !pairs_treated.insert(pair_key) {
                        continue;
                    }
                    let pp_species = topology.species_of(pp);
                    self.neighbours[f_index][(p, pp_species)] += 1.0;
                    self.neighbours[f_index][(pp, p_species)] += 1.0;

                    // Rows belong to the lower species index.
                    let (row_p, col_p) = if p_species <= pp_species {
                        (p, pp)
                    } else {
                        (pp, p)
                    };
                    let dist = geometry::distance_matrix(
                        &frame.residue_centroids[row_p],
                        &frame.residue_centroids[col_p],
                        &box_dim,
                    );
                    let pair = ordered(p_species, pp_species);
                    let homotypic = p_species == pp_species;
                    let mut contact_count = 0.0;

                    let overall = self
                        .res_contacts
                        .get_mut(&pair)
                        .ok_or_else(|| EngineError::Internal("unknown species pair".into()))?;
                    let by_size = self.res_contacts_by_size.get_mut(&pair).ok_or_else(|| {
                        EngineError::Internal("unknown species pair".into())
                    })?;
                    let sized = by_size
                        .entry(c_size)
                        .or_insert_with(|| DMatrix::zeros(dist.nrows(), dist.ncols()));
                    let mut grouped = match group {
                        Some(g) => Some(
                            self.res_contacts_by_group
                                .get_mut(&pair)
                                .ok_or_else(|| {
                                    EngineError::Internal("unknown species pair".into())
                                })?
                                .entry(g)
                                .or_insert_with(|| DMatrix::zeros(dist.nrows(), dist.ncols())),
                        ),
                        None => None,
                    };

                    for i in 0..dist.nrows() {
                        for j in 0..dist.ncols() {
                            if dist[(i, j)] < cutoff {
                                contact_count += 1.0;
                                overall[(i, j)] += 1.0;
                                sized[(i, j)] += 1.0;
                                if let Some(m) = grouped.as_deref_mut() {
                                    m[(i, j)] += 1.0;
                                }
                                if homotypic {
                                    // Homotypic pairs are sampled from both
                                    // members' perspectives, doubling the
                                    // effective sampling.
                                    overall[(j, i)] += 1.0;
                                    sized[(j, i)] += 1.0;
                                    if let Some(m) = grouped.as_deref_mut() {
                                        m[(j, i)] += 1.0;
                                    }
                                }
                            }
                        }
                    }

                    self.prot_contacts[(p, pp)] += contact_count;
                    self.prot_contacts[(pp, p)] += contact_count;
                }
            }

            *self
                .compositions
                .entry(c_size)
                .or_default()
                .entry(composition)
                .or_insert(0) += 1;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn record_lipid_contacts(
        &mut self,
        _protein: usize,
        species: usize,
        c_size: usize,
        group: Option<usize>,
        residue_centroids: &[nalgebra::Point3<f64>],
        lower: &[nalgebra::Point3<f64>],
        upper: &[nalgebra::Point3<f64>],
        cutoff: f64,
        box_dim: &geometry::BoxDimensions,
    ) {
        let nb_residues = residue_centroids.len();
        for (headgroups, set) in [
            (lower, &mut self.lipid.lower),
            (upper, &mut self.lipid.upper),
        ] {
            let mut counts = DVector::zeros(nb_residues);
            for (r, centroid) in residue_centroids.iter().enumerate() {
                counts[r] = headgroups
                    .iter()
                    .filter(|hg| geometry::minimum_image_distance(centroid, hg, box_dim) < cutoff)
                    .count() as f64;
            }
            match set.by_size[species].get_mut(&c_size) {
                Some(existing) => *existing += &counts,
                None => {
                    set.by_size[species].insert(c_size, counts.clone());
                }
            }
            if let Some(g) = group {
                match set.by_group[species].get_mut(&g) {
                    Some(existing) => *existing += &counts,
                    None => {
                        set.by_group[species].insert(g, counts);
                    }
                }
            }
        }
    }

    /// Combines two accumulators covering disjoint frame ranges.
    ///
    /// Accumulation is associative and commutative across frames, so a
    /// frame-parallel run can reduce per-worker accumulators with this.
    pub fn merge(&mut self, other: ContactAccumulator) -> Result<(), EngineError> {
        if other.nb_frames != self.nb_frames {
            return Err(EngineError::Internal(format!(
                "cannot merge accumulators sized {} and {} frames",
                self.nb_frames, other.nb_frames
            )));
        }
        for (f_index, row) in other.statuses.into_iter().enumerate() {
            for (protein, status) in row.into_iter().enumerate() {
                if let Some(status) = status {
                    self.set_status(f_index, protein, status)?;
                }
            }
        }
        for (pair, matrix) in other.res_contacts {
            *self
                .res_contacts
                .get_mut(&pair)
                .ok_or_else(|| EngineError::Internal("unknown species pair".into()))? += matrix;
        }
        for (pair, by_size) in other.res_contacts_by_size {
            let mine = self
                .res_contacts_by_size
                .get_mut(&pair)
                .ok_or_else(|| EngineError::Internal("unknown species pair".into()))?;
            for (size, matrix) in by_size {
                match mine.get_mut(&size) {
                    Some(existing) => *existing += matrix,
                    None => {
                        mine.insert(size, matrix);
                    }
                }
            }
        }
        for (pair, by_group) in other.res_contacts_by_group {
            let mine = self
                .res_contacts_by_group
                .get_mut(&pair)
                .ok_or_else(|| EngineError::Internal("unknown species pair".into()))?;
            for (g, matrix) in by_group {
                match mine.get_mut(&g) {
                    Some(existing) => *existing += matrix,
                    None => {
                        mine.insert(g, matrix);
                    }
                }
            }
        }
        self.prot_contacts += other.prot_contacts;
        for (mine, theirs) in self.neighbours.iter_mut().zip(other.neighbours) {
            *mine += theirs;
        }
        for (size, comps) in other.compositions {
            let mine = self.compositions.entry(size).or_default();
            for (comp, nb) in comps {
                *mine.entry(comp).or_insert(0) += nb;
            }
        }
        self.lipid.lower.merge(other.lipid.lower);
        self.lipid.upper.merge(other.lipid.upper);
        Ok(())
    }

    /// Folds oligomer contact matrices down to monomer length by summing the
    /// repeat sub-blocks. Performed once, after all frames, before
    /// normalization; it increases effective sampling per residue.
    pub fn fold_oligomers(&mut self, topology: &SystemTopology) {
        let species = topology.species();
        for s1 in 0..species.len() {
            for s2 in s1..species.len() {
                let (m1, m2) = (species[s1].multiplicity, species[s2].multiplicity);
                if m1 == 1 && m2 == 1 {
                    continue;
                }
                let (u1, u2) = (species[s1].monomer_length(), species[s2].monomer_length());
                let pair = (s1, s2);
                if let Some(matrix) = self.res_contacts.get_mut(&pair) {
                    *matrix = fold_matrix(matrix, u1, m1, u2, m2);
                }
                if let Some(by_size) = self.res_contacts_by_size.get_mut(&pair) {
                    for matrix in by_size.values_mut() {
                        *matrix = fold_matrix(matrix, u1, m1, u2, m2);
                    }
                }
                if let Some(by_group) = self.res_contacts_by_group.get_mut(&pair) {
                    for matrix in by_group.values_mut() {
                        *matrix = fold_matrix(matrix, u1, m1, u2, m2);
                    }
                }
            }
        }
    }
}

fn fold_matrix(matrix: &DMatrix<f64>, u1: usize, m1: usize, u2: usize, m2: usize) -> DMatrix<f64> {
    let mut folded = DMatrix::zeros(u1, u2);
    for n1 in 0..m1 {
        for n2 in 0..m2 {
            for i in 0..u1 {
                for j in 0..u2 {
                    folded[(i, j)] += matrix[(n1 * u1 + i, n2 * u2 + j)];
                }
            }
        }
    }
    folded
}
