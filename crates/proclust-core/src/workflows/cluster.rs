use crate::core::geometry;
use crate::core::io::tables::ResidueSubsets;
use crate::core::models::frame::Frame;
use crate::core::models::topology::SystemTopology;
use crate::engine::config::{AnalysisConfig, ClusterAlgorithm, ConfigError, DistanceMethod};
use crate::engine::contacts::ContactAccumulator;
use crate::engine::detector::{self, ClusterGraph};
use crate::engine::error::EngineError;
use crate::engine::leaflet;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::stats::{self, AnalysisResult};
use crate::core::models::cluster::ClusterClass;
use tracing::{info, instrument, warn};

/// Supplier of trajectory frames, decoupling the analysis from any specific
/// trajectory format or reader.
///
/// `nb_frames` must return the exact number of frames `next_frame` will
/// yield; a mismatch aborts the run after the loop.
pub trait FrameSource {
    fn nb_frames(&self) -> usize;

    /// Returns the next frame, or `None` once the trajectory is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>, EngineError>;
}

/// A trajectory held entirely in memory. Suitable for tests and for callers
/// that already materialized their frames.
pub struct InMemoryTrajectory {
    frames: std::vec::IntoIter<Frame>,
    total: usize,
}

impl InMemoryTrajectory {
    pub fn new(frames: Vec<Frame>) -> Self {
        let total = frames.len();
        Self {
            frames: frames.into_iter(),
            total,
        }
    }
}

impl FrameSource for InMemoryTrajectory {
    fn nb_frames(&self) -> usize {
        self.total
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, EngineError> {
        Ok(self.frames.next())
    }
}

/// Checks configured COG residue subsets against the realized topology.
/// Fatal before any frame is processed.
fn validate_cog_subsets(
    subsets: &ResidueSubsets,
    topology: &SystemTopology,
) -> Result<(), EngineError> {
    for (species, resids) in subsets.iter() {
        if species >= topology.nb_species() {
            return Err(ConfigError::InvalidParameter {
                name: "cog_subsets",
                message: format!("species index {} out of range", species),
            }
            .into());
        }
        let length = topology.species()[species].full_length();
        for &resid in resids {
            if resid == 0 || resid > length {
                return Err(ConfigError::InvalidParameter {
                    name: "cog_subsets",
                    message: format!(
                        "resid {} outside 1..={} for species {}",
                        resid, length, species
                    ),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn detect_frame(
    frame: &Frame,
    topology: &SystemTopology,
    config: &AnalysisConfig,
) -> ClusterGraph {
    match &config.algorithm {
        ClusterAlgorithm::Connectivity { method, cutoff } => {
            let dist = match method {
                DistanceMethod::MinPair => {
                    geometry::min_pair_distance_matrix(&frame.protein_atoms, &frame.box_dim)
                }
                DistanceMethod::CenterOfGeometry => {
                    geometry::centroid_distance_matrix(&frame.cog_atoms, &frame.box_dim)
                }
            };
            detector::detect_connectivity(&dist, topology, cutoff)
        }
        ClusterAlgorithm::Density { eps, min_samples } => {
            let dist = geometry::centroid_distance_matrix(&frame.cog_atoms, &frame.box_dim);
            detector::detect_density(&dist, *eps, *min_samples)
        }
    }
}

/// Runs the full clustering analysis over a trajectory.
///
/// Per frame: validate shapes, re-wrap coordinates into the periodic box,
/// detect clusters, classify them against the bilayer leaflets (when leaflet
/// data is present) and fold everything into the contact accumulator. After
/// the last frame, oligomer contact matrices are folded to monomer length
/// and the accumulated data is normalized into an [`AnalysisResult`].
#[instrument(skip_all, name = "clustering_workflow")]
pub fn run<S: FrameSource>(
    topology: &SystemTopology,
    source: &mut S,
    config: &AnalysisConfig,
    reporter: &ProgressReporter,
) -> Result<AnalysisResult, EngineError> {
    config.validate(topology.nb_species())?;
    if let Some(subsets) = &config.cog_subsets {
        validate_cog_subsets(subsets, topology)?;
    }

    let total_frames = source.nb_frames();
    info!(
        nb_proteins = topology.nb_proteins(),
        nb_species = topology.nb_species(),
        total_frames,
        "Starting clustering analysis"
    );
    reporter.report(Progress::TrajectoryStart {
        total_frames: total_frames as u64,
    });

    let mut acc = ContactAccumulator::new(topology, total_frames);
    let mut f_index = 0usize;
    while let Some(mut frame) = source.next_frame()? {
        if f_index >= total_frames {
            return Err(EngineError::FrameCountMismatch {
                expected: total_frames,
                processed: f_index + 1,
            });
        }
        reporter.report(Progress::FrameStart {
            index: f_index as u64,
        });
        frame.validate(topology)?;
        if let Some(subsets) = &config.cog_subsets {
            // The subset replaces the supplied COG selection with the chosen
            // residue centroids (1-based positions).
            for p in 0..topology.nb_proteins() {
                if let Some(resids) = subsets.get(topology.species_of(p)) {
                    frame.cog_atoms[p] = resids
                        .iter()
                        .map(|&resid| frame.residue_centroids[p][resid - 1])
                        .collect();
                }
            }
        }
        for selections in [&mut frame.protein_atoms, &mut frame.cog_atoms] {
            for atoms in selections.iter_mut() {
                geometry::wrap_into_box(atoms, &frame.box_dim);
            }
        }

        let graph = detect_frame(&frame, topology, config);
        reporter.report(Progress::ClustersDetected {
            count: graph.clusters().len() as u64,
        });

        let classes: Vec<ClusterClass> = match &frame.leaflets {
            Some(leaflets) => graph
                .clusters()
                .iter()
                .map(|members| {
                    leaflet::classify_cluster(
                        members,
                        &frame.protein_atoms,
                        leaflets,
                        &frame.box_dim,
                    )
                })
                .collect(),
            None => vec![ClusterClass::Transmembrane; graph.clusters().len()],
        };

        acc.record_frame(f_index, &frame, &graph, &classes, topology, config)?;
        reporter.report(Progress::FrameFinish);
        f_index += 1;
    }

    if f_index != total_frames {
        return Err(EngineError::FrameCountMismatch {
            expected: total_frames,
            processed: f_index,
        });
    }

    if topology.has_oligomers() {
        info!("Folding oligomer contact matrices to monomer length");
        acc.fold_oligomers(topology);
    }

    let result = stats::finalize(&acc, topology, config)?;
    for warning in &result.warnings {
        match warning {
            stats::AnalysisWarning::DegenerateSampling { status } => {
                warn!(
                    ?status,
                    "Only one cluster status sampled over the whole trajectory"
                );
            }
        }
    }
    reporter.report(Progress::TrajectoryFinish);
    info!("Clustering analysis complete");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::BoxDimensions;
    use crate::core::models::cluster::ClusterStatus;
    use crate::core::models::frame::LeafletHeadgroups;
    use crate::core::models::species::Species;
    use crate::engine::config::{AnalysisConfigBuilder, CutoffPolicy};
    use nalgebra::Point3;
    use std::sync::Mutex;

    fn topology(nb_proteins: usize) -> SystemTopology {
        let species = vec![Species::new("A", "A", 1, "auto").unwrap()];
        SystemTopology::new(species, &vec![0; nb_proteins]).unwrap()
    }

    fn frame_at(positions: &[(f64, f64)]) -> Frame {
        let centroids: Vec<Vec<Point3<f64>>> = positions
            .iter()
            .map(|&(x, y)| vec![Point3::new(x, y, 30.0)])
            .collect();
        Frame {
            box_dim: BoxDimensions::new(200.0, 200.0, 60.0),
            protein_atoms: centroids.clone(),
            cog_atoms: centroids.clone(),
            residue_centroids: centroids,
            leaflets: None,
        }
    }

    fn connectivity_config(cutoff: f64) -> AnalysisConfig {
        AnalysisConfigBuilder::new()
            .algorithm(ClusterAlgorithm::Connectivity {
                method: DistanceMethod::CenterOfGeometry,
                cutoff: CutoffPolicy::Uniform(cutoff),
            })
            .residue_contact_cutoff(8.0)
            .build()
            .unwrap()
    }

    #[test]
    fn four_proteins_in_two_pairs_sample_only_dimers() {
        let topology = topology(4);
        let frame = frame_at(&[(10.0, 10.0), (14.0, 10.0), (80.0, 80.0), (84.0, 80.0)]);
        let mut source = InMemoryTrajectory::new(vec![frame.clone(), frame]);
        let result = run(
            &topology,
            &mut source,
            &connectivity_config(8.0),
            &ProgressReporter::new(),
        )
        .unwrap();

        assert_eq!(result.sizes_sampled, vec![2]);
        for row in &result.statuses {
            assert_eq!(row, &vec![ClusterStatus::Transmembrane(2); 4]);
        }
        let series = &result.series_by_status[&ClusterStatus::Transmembrane(2)];
        assert_eq!(series.counts, vec![2.0, 2.0]);
        assert_eq!(series.percents, vec![100.0, 100.0]);
    }

    #[test]
    fn density_workflow_emits_noise_as_singletons() {
        let topology = topology(5);
        // Three mutually close proteins and two isolated ones.
        let frame = frame_at(&[
            (50.0, 50.0),
            (60.0, 50.0),
            (55.0, 58.0),
            (120.0, 120.0),
            (170.0, 30.0),
        ]);
        let config = AnalysisConfigBuilder::new()
            .algorithm(ClusterAlgorithm::Density {
                eps: 20.0,
                min_samples: 3,
            })
            .residue_contact_cutoff(8.0)
            .build()
            .unwrap();
        let mut source = InMemoryTrajectory::new(vec![frame]);
        let result = run(&topology, &mut source, &config, &ProgressReporter::new()).unwrap();

        assert_eq!(result.sizes_sampled, vec![1, 3]);
        assert_eq!(
            result.statuses[0][..3],
            [ClusterStatus::Transmembrane(3); 3]
        );
        assert_eq!(result.statuses[0][3], ClusterStatus::Transmembrane(1));
    }

    #[test]
    fn leaflet_data_routes_clusters_to_interfacial_series() {
        let topology = topology(2);
        let mut frame = frame_at(&[(10.0, 10.0), (14.0, 10.0)]);
        // Proteins at z = 30 sit closer to the upper leaflet at z = 40.
        frame.leaflets = Some(LeafletHeadgroups {
            lower: vec![Point3::new(12.0, 10.0, 5.0)],
            upper: vec![Point3::new(12.0, 10.0, 40.0)],
        });
        let mut source = InMemoryTrajectory::new(vec![frame]);
        let result = run(
            &topology,
            &mut source,
            &connectivity_config(8.0),
            &ProgressReporter::new(),
        )
        .unwrap();

        assert!(result.interfacial_upper_sampled);
        assert!(result.sizes_sampled.is_empty());
        assert_eq!(
            result.statuses[0],
            vec![ClusterStatus::InterfacialUpper; 2]
        );
        // No transmembrane cluster, so no contacts were accumulated.
        assert_eq!(result.res_contact_percent[&(0, 0)].sum(), 0.0);
    }

    #[test]
    fn coordinates_outside_the_box_are_wrapped_before_detection() {
        let topology = topology(2);
        // Second protein shifted by one full box length in x: same wrapped
        // position, so the pair still clusters.
        let frame = frame_at(&[(10.0, 10.0), (214.0, 10.0)]);
        let mut source = InMemoryTrajectory::new(vec![frame]);
        let result = run(
            &topology,
            &mut source,
            &connectivity_config(8.0),
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(result.sizes_sampled, vec![2]);
    }

    #[test]
    fn invalid_configuration_fails_before_any_frame() {
        let topology = topology(2);
        let mut source = InMemoryTrajectory::new(vec![frame_at(&[(10.0, 10.0), (14.0, 10.0)])]);
        let err = run(
            &topology,
            &mut source,
            &connectivity_config(-1.0),
            &ProgressReporter::new(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        // The frame was not consumed.
        assert!(source.next_frame().unwrap().is_some());
    }

    #[test]
    fn malformed_frame_aborts_the_run() {
        let topology = topology(3);
        let frame = frame_at(&[(10.0, 10.0), (14.0, 10.0)]);
        let mut source = InMemoryTrajectory::new(vec![frame]);
        let err = run(
            &topology,
            &mut source,
            &connectivity_config(8.0),
            &ProgressReporter::new(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Frame(_)));
    }

    #[test]
    fn progress_events_bracket_every_frame() {
        let topology = topology(2);
        let frame = frame_at(&[(10.0, 10.0), (14.0, 10.0)]);
        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            events.lock().unwrap().push(format!("{:?}", event));
        }));
        let mut source = InMemoryTrajectory::new(vec![frame.clone(), frame]);
        run(&topology, &mut source, &connectivity_config(8.0), &reporter).unwrap();
        drop(reporter);

        let events = events.into_inner().unwrap();
        assert_eq!(events[0], "TrajectoryStart { total_frames: 2 }");
        assert_eq!(events.last().unwrap(), "TrajectoryFinish");
        assert_eq!(
            events.iter().filter(|e| *e == "FrameFinish").count(),
            2
        );
    }

    #[test]
    fn cog_residue_subsets_override_the_supplied_selection() {
        // Residue 2 of the second protein sits across the periodic boundary,
        // pulling its full COG ~20 A away; restricted to residue 1 the two
        // proteins are 4 A apart and cluster.
        let species = vec![Species::new("A", "AG", 1, "auto").unwrap()];
        let topology = SystemTopology::new(species, &[0, 0]).unwrap();
        let centroids = vec![
            vec![Point3::new(10.0, 10.0, 30.0), Point3::new(10.0, 30.0, 30.0)],
            vec![Point3::new(14.0, 10.0, 30.0), Point3::new(14.0, 190.0, 30.0)],
        ];
        let frame = Frame {
            box_dim: BoxDimensions::new(200.0, 200.0, 60.0),
            protein_atoms: centroids.clone(),
            cog_atoms: centroids.clone(),
            residue_centroids: centroids,
            leaflets: None,
        };

        let mut source = InMemoryTrajectory::new(vec![frame.clone()]);
        let result = run(
            &topology,
            &mut source,
            &connectivity_config(8.0),
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(result.sizes_sampled, vec![1]);

        let subsets =
            crate::core::io::tables::ResidueSubsets::from_reader("0,1\n".as_bytes()).unwrap();
        let config = AnalysisConfigBuilder::new()
            .algorithm(ClusterAlgorithm::Connectivity {
                method: DistanceMethod::CenterOfGeometry,
                cutoff: CutoffPolicy::Uniform(8.0),
            })
            .residue_contact_cutoff(8.0)
            .cog_subsets(subsets)
            .build()
            .unwrap();
        let mut source = InMemoryTrajectory::new(vec![frame]);
        let result = run(&topology, &mut source, &config, &ProgressReporter::new()).unwrap();
        assert_eq!(result.sizes_sampled, vec![2]);
    }

    #[test]
    fn out_of_range_cog_subset_fails_before_any_frame() {
        let topology = topology(2);
        // Species has one residue; resid 5 cannot exist.
        let subsets =
            crate::core::io::tables::ResidueSubsets::from_reader("0,5\n".as_bytes()).unwrap();
        let config = AnalysisConfigBuilder::new()
            .algorithm(ClusterAlgorithm::Connectivity {
                method: DistanceMethod::CenterOfGeometry,
                cutoff: CutoffPolicy::Uniform(8.0),
            })
            .residue_contact_cutoff(8.0)
            .cog_subsets(subsets)
            .build()
            .unwrap();
        let mut source = InMemoryTrajectory::new(vec![frame_at(&[(10.0, 10.0), (14.0, 10.0)])]);
        let err = run(&topology, &mut source, &config, &ProgressReporter::new()).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(source.next_frame().unwrap().is_some());
    }

    #[test]
    fn oligomer_contact_maps_are_monomer_length() {
        // One dimer species (unit length 1, full length 2), two proteins.
        let species = vec![Species::new("dimer", "AG", 2, "auto").unwrap()];
        let topology = SystemTopology::new(species, &[0, 0]).unwrap();
        let centroids = vec![
            vec![Point3::new(10.0, 10.0, 30.0), Point3::new(10.0, 14.0, 30.0)],
            vec![Point3::new(14.0, 10.0, 30.0), Point3::new(14.0, 14.0, 30.0)],
        ];
        let frame = Frame {
            box_dim: BoxDimensions::new(200.0, 200.0, 60.0),
            protein_atoms: centroids.clone(),
            cog_atoms: centroids.clone(),
            residue_centroids: centroids,
            leaflets: None,
        };
        let mut source = InMemoryTrajectory::new(vec![frame]);
        let result = run(
            &topology,
            &mut source,
            &connectivity_config(8.0),
            &ProgressReporter::new(),
        )
        .unwrap();

        let map = &result.res_contact_percent[&(0, 0)];
        assert_eq!(map.nrows(), 1);
        assert_eq!(map.ncols(), 1);
        assert_eq!(map[(0, 0)], 100.0);
    }
}
