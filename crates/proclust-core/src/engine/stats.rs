//! Final aggregation of accumulated contact data into time series,
//! normalized contact maps and composition moments.

use super::config::AnalysisConfig;
use super::contacts::{ContactAccumulator, LipidContacts, SpeciesPair};
use super::error::EngineError;
use crate::core::models::cluster::ClusterStatus;
use crate::core::models::topology::SystemTopology;
use nalgebra::DMatrix;
use std::collections::BTreeMap;

/// Streaming mean and variance (Welford / Chan). Population statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMoments {
    n: u64,
    mean: f64,
    m2: f64,
}

impl RunningMoments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.n += 1;
        let delta = value - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Adds `count` observations of the same value in one step.
    pub fn push_repeated(&mut self, value: f64, count: u64) {
        self.merge(RunningMoments {
            n: count,
            mean: value,
            m2: 0.0,
        });
    }

    pub fn merge(&mut self, other: RunningMoments) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = other;
            return;
        }
        let n = self.n + other.n;
        let delta = other.mean - self.mean;
        self.mean += delta * other.n as f64 / n as f64;
        self.m2 += other.m2 + delta * delta * self.n as f64 * other.n as f64 / n as f64;
        self.n = n;
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 { 0.0 } else { self.mean }
    }

    pub fn std(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            (self.m2 / self.n as f64).sqrt()
        }
    }
}

/// Per-frame cluster counts and protein percentages for one status or group.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSeries {
    /// Clusters per frame (proteins per frame for interfacial statuses).
    pub counts: Vec<f64>,
    /// Percentage of all proteins per frame.
    pub percents: Vec<f64>,
}

impl FrameSeries {
    fn zeros(nb_frames: usize) -> Self {
        Self {
            counts: vec![0.0; nb_frames],
            percents: vec![0.0; nb_frames],
        }
    }
}

/// Per-frame track of a distinguished transmembrane size (largest sampled,
/// or the one covering the largest share of proteins).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtremumSeries {
    /// The selected size, `None` for frames without transmembrane clusters.
    pub sizes: Vec<Option<usize>>,
    pub counts: Vec<f64>,
    pub percents: Vec<f64>,
}

/// Mean and standard deviation of one species' share of a cluster, in
/// percent of the cluster size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositionMoment {
    pub mean_percent: f64,
    pub std_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisWarning {
    /// Every protein in every frame landed in the same status; the sampled
    /// trajectory cannot distinguish cluster sizes.
    DegenerateSampling { status: ClusterStatus },
}

/// Everything the analysis produces, fully normalized and ready for output.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub nb_frames: usize,
    pub nb_proteins: usize,
    /// Status of every protein in every frame.
    pub statuses: Vec<Vec<ClusterStatus>>,
    /// Distinct transmembrane cluster sizes seen, ascending.
    pub sizes_sampled: Vec<usize>,
    pub interfacial_lower_sampled: bool,
    pub interfacial_upper_sampled: bool,
    /// Per-status time series, ordered lower / sizes ascending / upper.
    pub series_by_status: BTreeMap<ClusterStatus, FrameSeries>,
    /// Per-size-group time series (one extra slot for the catch-all group),
    /// present when size groups were configured.
    pub series_by_group: Option<Vec<FrameSeries>>,
    pub biggest: ExtremumSeries,
    pub most_representative: ExtremumSeries,
    /// Residue-pair contact maps normalized to sum to 100 per species pair.
    pub res_contact_percent: BTreeMap<SpeciesPair, DMatrix<f64>>,
    pub res_contact_percent_by_size: BTreeMap<SpeciesPair, BTreeMap<usize, DMatrix<f64>>>,
    pub res_contact_percent_by_group: BTreeMap<SpeciesPair, BTreeMap<usize, DMatrix<f64>>>,
    /// Column-normalized protein-protein contact fractions: entry (i, j) is
    /// the share of protein j's contacts made with protein i.
    pub protein_contact_fraction: DMatrix<f64>,
    /// Residue-lipid headgroup contact distributions, normalized to percent.
    pub lipid_contact_percent: LipidContacts,
    /// Mean and std of neighbour counts: entry (s1, s2) averages, over all
    /// frames and all proteins of species s1, their species-s2 neighbours.
    pub neighbour_mean: DMatrix<f64>,
    pub neighbour_std: DMatrix<f64>,
    /// Per-frame neighbour totals summed over proteins, species x species.
    pub neighbour_totals: Vec<DMatrix<f64>>,
    /// Per-frame mean of per-protein neighbour counts, species x species.
    pub neighbour_mean_series: Vec<DMatrix<f64>>,
    /// Per-frame population std of per-protein neighbour counts.
    pub neighbour_std_series: Vec<DMatrix<f64>>,
    /// Per-size species composition moments, one entry per species.
    pub composition_by_size: BTreeMap<usize, Vec<CompositionMoment>>,
    pub composition_by_group: Option<BTreeMap<usize, Vec<CompositionMoment>>>,
    pub warnings: Vec<AnalysisWarning>,
}

fn percent_normalized(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let total = matrix.sum();
    if total > 0.0 {
        matrix * (100.0 / total)
    } else {
        matrix.clone()
    }
}

fn percent_normalized_vector(vector: &nalgebra::DVector<f64>) -> nalgebra::DVector<f64> {
    let total = vector.sum();
    if total > 0.0 {
        vector * (100.0 / total)
    } else {
        vector.clone()
    }
}

fn column_normalized(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let mut normalized = matrix.clone();
    for mut column in normalized.column_iter_mut() {
        let total = column.sum();
        if total > 0.0 {
            column /= total;
        }
    }
    normalized
}

/// Turns the raw accumulator into the final [`AnalysisResult`].
///
/// Fails when any protein is missing a status for some frame, which would
/// mean a cluster escaped both classification branches.
pub fn finalize(
    acc: &ContactAccumulator,
    topology: &SystemTopology,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, EngineError> {
    let nb_frames = acc.nb_frames();
    let nb_proteins = topology.nb_proteins();
    let nb_species = topology.nb_species();

    let mut statuses = Vec::with_capacity(nb_frames);
    for (frame, row) in acc.statuses.iter().enumerate() {
        let mut resolved = Vec::with_capacity(nb_proteins);
        for (protein, status) in row.iter().enumerate() {
            resolved.push(status.ok_or(EngineError::MissingStatus { frame, protein })?);
        }
        statuses.push(resolved);
    }

    // Per-frame protein tallies per status.
    let mut per_frame: Vec<BTreeMap<ClusterStatus, usize>> = Vec::with_capacity(nb_frames);
    for row in &statuses {
        let mut tally = BTreeMap::new();
        for status in row {
            *tally.entry(*status).or_insert(0usize) += 1;
        }
        per_frame.push(tally);
    }

    let mut all_statuses: Vec<ClusterStatus> = per_frame
        .iter()
        .flat_map(|tally| tally.keys().copied())
        .collect();
    all_statuses.sort_unstable();
    all_statuses.dedup();

    let sizes_sampled: Vec<usize> = all_statuses.iter().filter_map(|s| s.size()).collect();
    let interfacial_lower_sampled = all_statuses.contains(&ClusterStatus::InterfacialLower);
    let interfacial_upper_sampled = all_statuses.contains(&ClusterStatus::InterfacialUpper);

    let mut series_by_status: BTreeMap<ClusterStatus, FrameSeries> = all_statuses
        .iter()
        .map(|&status| (status, FrameSeries::zeros(nb_frames)))
        .collect();
    for (f, tally) in per_frame.iter().enumerate() {
        for (&status, &proteins) in tally {
            let series = series_by_status
                .get_mut(&status)
                .ok_or_else(|| EngineError::Internal("status series missing".into()))?;
            series.counts[f] = match status.size() {
                Some(size) => (proteins / size) as f64,
                None => proteins as f64,
            };
            series.percents[f] = proteins as f64 * 100.0 / nb_proteins as f64;
        }
    }

    let series_by_group = config.size_groups.as_ref().map(|groups| {
        let mut series = vec![FrameSeries::zeros(nb_frames); groups.len() + 1];
        for (f, tally) in per_frame.iter().enumerate() {
            for (status, &proteins) in tally {
                if let Some(size) = status.size() {
                    let g = groups.group_of(size);
                    series[g].counts[f] += (proteins / size) as f64;
                    series[g].percents[f] += proteins as f64 * 100.0 / nb_proteins as f64;
                }
            }
        }
        series
    });

    let mut biggest = ExtremumSeries {
        sizes: vec![None; nb_frames],
        counts: vec![0.0; nb_frames],
        percents: vec![0.0; nb_frames],
    };
    let mut most_representative = biggest.clone();
    for (f, tally) in per_frame.iter().enumerate() {
        // The most-representative size maximizes the share of proteins, not
        // the cluster count. Ascending size iteration with a strict
        // comparison: ties go to the smallest size.
        let mut best_proteins = 0usize;
        for (status, &proteins) in tally {
            if let Some(size) = status.size() {
                biggest.sizes[f] = Some(size);
                biggest.counts[f] = (proteins / size) as f64;
                biggest.percents[f] = proteins as f64 * 100.0 / nb_proteins as f64;
                if proteins > best_proteins {
                    best_proteins = proteins;
                    most_representative.sizes[f] = Some(size);
                    most_representative.counts[f] = (proteins / size) as f64;
                    most_representative.percents[f] = proteins as f64 * 100.0 / nb_proteins as f64;
                }
            }
        }
    }

    let res_contact_percent = acc
        .res_contacts
        .iter()
        .map(|(&pair, matrix)| (pair, percent_normalized(matrix)))
        .collect();
    let res_contact_percent_by_size = acc
        .res_contacts_by_size
        .iter()
        .map(|(&pair, by_size)| {
            (
                pair,
                by_size
                    .iter()
                    .map(|(&size, matrix)| (size, percent_normalized(matrix)))
                    .collect(),
            )
        })
        .collect();
    let res_contact_percent_by_group = acc
        .res_contacts_by_group
        .iter()
        .map(|(&pair, by_group)| {
            (
                pair,
                by_group
                    .iter()
                    .map(|(&g, matrix)| (g, percent_normalized(matrix)))
                    .collect(),
            )
        })
        .collect();

    let protein_contact_fraction = column_normalized(&acc.prot_contacts);

    let mut lipid_contact_percent = acc.lipid.clone();
    for set in [&mut lipid_contact_percent.lower, &mut lipid_contact_percent.upper] {
        for map in set.by_size.iter_mut().chain(set.by_group.iter_mut()) {
            for vector in map.values_mut() {
                *vector = percent_normalized_vector(vector);
            }
        }
    }

    let mut neighbour_moments = vec![RunningMoments::new(); nb_species * nb_species];
    let mut neighbour_totals = Vec::with_capacity(nb_frames);
    let mut neighbour_mean_series = Vec::with_capacity(nb_frames);
    let mut neighbour_std_series = Vec::with_capacity(nb_frames);
    for frame in &acc.neighbours {
        let mut totals = DMatrix::zeros(nb_species, nb_species);
        let mut frame_moments = vec![RunningMoments::new(); nb_species * nb_species];
        for p in 0..nb_proteins {
            let s1 = topology.species_of(p);
            for s2 in 0..nb_species {
                let value = frame[(p, s2)];
                neighbour_moments[s1 * nb_species + s2].push(value);
                frame_moments[s1 * nb_species + s2].push(value);
                totals[(s1, s2)] += value;
            }
        }
        neighbour_totals.push(totals);
        neighbour_mean_series.push(DMatrix::from_fn(nb_species, nb_species, |s1, s2| {
            frame_moments[s1 * nb_species + s2].mean()
        }));
        neighbour_std_series.push(DMatrix::from_fn(nb_species, nb_species, |s1, s2| {
            frame_moments[s1 * nb_species + s2].std()
        }));
    }
    let neighbour_mean = DMatrix::from_fn(nb_species, nb_species, |s1, s2| {
        neighbour_moments[s1 * nb_species + s2].mean()
    });
    let neighbour_std = DMatrix::from_fn(nb_species, nb_species, |s1, s2| {
        neighbour_moments[s1 * nb_species + s2].std()
    });

    let mut composition_by_size: BTreeMap<usize, Vec<CompositionMoment>> = BTreeMap::new();
    let mut group_moments: BTreeMap<usize, Vec<RunningMoments>> = BTreeMap::new();
    for (&size, occurrences) in &acc.compositions {
        let mut moments = vec![RunningMoments::new(); nb_species];
        for (composition, &count) in occurrences {
            for (s, &members) in composition.iter().enumerate() {
                let share = members as f64 * 100.0 / size as f64;
                moments[s].push_repeated(share, count);
                if let Some(groups) = &config.size_groups {
                    let slot = group_moments
                        .entry(groups.group_of(size))
                        .or_insert_with(|| vec![RunningMoments::new(); nb_species]);
                    slot[s].push_repeated(share, count);
                }
            }
        }
        composition_by_size.insert(
            size,
            moments
                .iter()
                .map(|m| CompositionMoment {
                    mean_percent: m.mean(),
                    std_percent: m.std(),
                })
                .collect(),
        );
    }
    let composition_by_group = config.size_groups.as_ref().map(|_| {
        group_moments
            .into_iter()
            .map(|(g, moments)| {
                (
                    g,
                    moments
                        .iter()
                        .map(|m| CompositionMoment {
                            mean_percent: m.mean(),
                            std_percent: m.std(),
                        })
                        .collect(),
                )
            })
            .collect()
    });

    let mut warnings = Vec::new();
    if all_statuses.len() == 1 {
        warnings.push(AnalysisWarning::DegenerateSampling {
            status: all_statuses[0],
        });
    }

    Ok(AnalysisResult {
        nb_frames,
        nb_proteins,
        statuses,
        sizes_sampled,
        interfacial_lower_sampled,
        interfacial_upper_sampled,
        series_by_status,
        series_by_group,
        biggest,
        most_representative,
        res_contact_percent,
        res_contact_percent_by_size,
        res_contact_percent_by_group,
        protein_contact_fraction,
        lipid_contact_percent,
        neighbour_mean,
        neighbour_std,
        neighbour_totals,
        neighbour_mean_series,
        neighbour_std_series,
        composition_by_size,
        composition_by_group,
        warnings,
    })
}
