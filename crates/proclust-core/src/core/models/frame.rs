use super::topology::SystemTopology;
use crate::core::geometry::BoxDimensions;
use nalgebra::Point3;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum FrameError {
    #[error("Frame supplies coordinates for {got} proteins but the topology declares {expected}")]
    ProteinCountMismatch { expected: usize, got: usize },

    #[error(
        "Frame supplies {got} residue centroids for protein {protein} but its species has {expected} residues"
    )]
    ResidueCountMismatch {
        protein: usize,
        expected: usize,
        got: usize,
    },

    #[error("Protein {0} has an empty atom selection")]
    EmptySelection(usize),
}

/// Lipid headgroup coordinates partitioned by leaflet, as supplied by the
/// external leaflet-detection layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafletHeadgroups {
    pub lower: Vec<Point3<f64>>,
    pub upper: Vec<Point3<f64>>,
}

/// Per-frame input to the analysis: atomic coordinates, box dimensions and
/// optional leaflet information, produced by the external trajectory layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub box_dim: BoxDimensions,
    /// Full atom selection per protein, indexed by global protein index.
    pub protein_atoms: Vec<Vec<Point3<f64>>>,
    /// Atom subset used for center-of-geometry computation per protein
    /// (may be restricted by a residue-range filter).
    pub cog_atoms: Vec<Vec<Point3<f64>>>,
    /// Residue centroids per protein, ordered by residue.
    pub residue_centroids: Vec<Vec<Point3<f64>>>,
    /// Leaflet headgroup coordinates; `None` disables leaflet classification.
    pub leaflets: Option<LeafletHeadgroups>,
}

impl Frame {
    /// Checks the frame's shape against the topology. Called once per frame
    /// before any geometry is computed.
    pub fn validate(&self, topology: &SystemTopology) -> Result<(), FrameError> {
        let expected = topology.nb_proteins();
        for arrays in [&self.protein_atoms, &self.cog_atoms, &self.residue_centroids] {
            if arrays.len() != expected {
                return Err(FrameError::ProteinCountMismatch {
                    expected,
                    got: arrays.len(),
                });
            }
        }
        for p in 0..expected {
            if self.protein_atoms[p].is_empty() || self.cog_atoms[p].is_empty() {
                return Err(FrameError::EmptySelection(p));
            }
            let residues = topology.residue_count(p);
            if self.residue_centroids[p].len() != residues {
                return Err(FrameError::ResidueCountMismatch {
                    protein: p,
                    expected: residues,
                    got: self.residue_centroids[p].len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::species::Species;

    fn simple_topology() -> SystemTopology {
        let species = vec![Species::new("A", "AG", 1, "auto").unwrap()];
        SystemTopology::new(species, &[0, 0]).unwrap()
    }

    fn valid_frame() -> Frame {
        Frame {
            box_dim: BoxDimensions::new(100.0, 100.0, 100.0),
            protein_atoms: vec![vec![Point3::origin(); 4]; 2],
            cog_atoms: vec![vec![Point3::origin(); 4]; 2],
            residue_centroids: vec![vec![Point3::origin(); 2]; 2],
            leaflets: None,
        }
    }

    #[test]
    fn well_formed_frame_passes_validation() {
        assert!(valid_frame().validate(&simple_topology()).is_ok());
    }

    #[test]
    fn protein_count_mismatch_is_reported() {
        let mut frame = valid_frame();
        frame.protein_atoms.pop();
        let err = frame.validate(&simple_topology()).unwrap_err();
        assert!(matches!(err, FrameError::ProteinCountMismatch { .. }));
    }

    #[test]
    fn residue_count_mismatch_is_reported() {
        let mut frame = valid_frame();
        frame.residue_centroids[1].pop();
        let err = frame.validate(&simple_topology()).unwrap_err();
        assert_eq!(
            err,
            FrameError::ResidueCountMismatch {
                protein: 1,
                expected: 2,
                got: 1
            }
        );
    }

    #[test]
    fn empty_atom_selection_is_reported() {
        let mut frame = valid_frame();
        frame.cog_atoms[0].clear();
        let err = frame.validate(&simple_topology()).unwrap_err();
        assert_eq!(err, FrameError::EmptySelection(0));
    }
}
