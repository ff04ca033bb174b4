use super::species::{Species, SpeciesError};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TopologyError {
    #[error(transparent)]
    Species(#[from] SpeciesError),

    #[error("System contains no proteins")]
    Empty,

    #[error(
        "Protein {index} of species {species} is not contiguous with its species block; proteins must be ordered sequentially by species"
    )]
    NonSequentialSpecies { index: usize, species: usize },
}

/// A single protein instance, identified by its global index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protein {
    /// Global 0-based index, sequential by species.
    pub index: usize,
    /// Index of the species this protein belongs to.
    pub species: usize,
    /// Index of this protein within its species.
    pub relative_index: usize,
}

/// Immutable description of the protein content of the simulated system:
/// the species present and the per-protein species assignment.
///
/// Proteins are ordered sequentially by species, i.e. the first protein of
/// species 1 has a global index equal to the number of proteins of species 0.
#[derive(Debug, Clone)]
pub struct SystemTopology {
    species: Vec<Species>,
    proteins: Vec<Protein>,
    /// Half-open global index range `[start, end)` per species.
    boundaries: Vec<(usize, usize)>,
}

impl SystemTopology {
    /// Builds a topology from the ordered per-protein species assignment.
    pub fn new(species: Vec<Species>, species_of: &[usize]) -> Result<Self, TopologyError> {
        if species_of.is_empty() {
            return Err(TopologyError::Empty);
        }
        let mut proteins = Vec::with_capacity(species_of.len());
        let mut boundaries = vec![(0usize, 0usize); species.len()];
        let mut counts = vec![0usize; species.len()];
        let mut last_species: Option<usize> = None;
        let mut seen = vec![false; species.len()];
        for (index, &s) in species_of.iter().enumerate() {
            if Some(s) != last_species {
                if seen[s] {
                    return Err(TopologyError::NonSequentialSpecies { index, species: s });
                }
                seen[s] = true;
                boundaries[s].0 = index;
                last_species = Some(s);
            }
            boundaries[s].1 = index + 1;
            proteins.push(Protein {
                index,
                species: s,
                relative_index: counts[s],
            });
            counts[s] += 1;
        }
        Ok(Self {
            species,
            proteins,
            boundaries,
        })
    }

    /// Builds a topology by scanning per-protein residue-name sequences,
    /// grouping identical sequences into species in order of first appearance.
    pub fn from_residue_sequences<S: AsRef<str>>(
        sequences: &[Vec<S>],
    ) -> Result<Self, TopologyError> {
        let mut species: Vec<Species> = Vec::new();
        let mut keys: Vec<Vec<String>> = Vec::new();
        let mut species_of = Vec::with_capacity(sequences.len());
        for residues in sequences {
            let key: Vec<String> = residues.iter().map(|r| r.as_ref().to_string()).collect();
            let s = match keys.iter().position(|k| *k == key) {
                Some(s) => s,
                None => {
                    let s = species.len();
                    species.push(Species::from_residues(residues, s)?);
                    keys.push(key);
                    s
                }
            };
            species_of.push(s);
        }
        Self::new(species, &species_of)
    }

    pub fn nb_proteins(&self) -> usize {
        self.proteins.len()
    }

    pub fn nb_species(&self) -> usize {
        self.species.len()
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn proteins(&self) -> &[Protein] {
        &self.proteins
    }

    pub fn species_of(&self, protein: usize) -> usize {
        self.proteins[protein].species
    }

    /// Half-open global protein index range of a species.
    pub fn species_range(&self, species: usize) -> (usize, usize) {
        self.boundaries[species]
    }

    /// Residue count of a protein, over the full oligomer.
    pub fn residue_count(&self, protein: usize) -> usize {
        self.species[self.species_of(protein)].full_length()
    }

    pub fn has_oligomers(&self) -> bool {
        self.species.iter().any(|s| s.is_oligomer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_species() -> Vec<Species> {
        vec![
            Species::new("A", "AGW", 1, "auto").unwrap(),
            Species::new("B", "KLKL", 1, "auto").unwrap(),
        ]
    }

    #[test]
    fn topology_assigns_sequential_relative_indices() {
        let topo = SystemTopology::new(two_species(), &[0, 0, 1, 1, 1]).unwrap();
        assert_eq!(topo.nb_proteins(), 5);
        assert_eq!(topo.nb_species(), 2);
        assert_eq!(topo.species_of(2), 1);
        assert_eq!(topo.proteins()[3].relative_index, 1);
        assert_eq!(topo.species_range(0), (0, 2));
        assert_eq!(topo.species_range(1), (2, 5));
    }

    #[test]
    fn interleaved_species_are_rejected() {
        let err = SystemTopology::new(two_species(), &[0, 1, 0]).unwrap_err();
        assert!(matches!(err, TopologyError::NonSequentialSpecies { .. }));
    }

    #[test]
    fn empty_system_is_rejected() {
        let err = SystemTopology::new(two_species(), &[]).unwrap_err();
        assert_eq!(err, TopologyError::Empty);
    }

    #[test]
    fn residue_sequences_group_into_species_by_first_appearance() {
        let sequences = vec![
            vec!["ALA", "GLY"],
            vec!["ALA", "GLY"],
            vec!["LYS", "LYS", "LYS"],
        ];
        let topo = SystemTopology::from_residue_sequences(&sequences).unwrap();
        assert_eq!(topo.nb_species(), 2);
        assert_eq!(topo.species()[0].name, "A");
        assert_eq!(topo.species()[1].name, "B");
        assert_eq!(topo.species_of(1), 0);
        assert_eq!(topo.proteins()[1].relative_index, 1);
        assert_eq!(topo.species_of(2), 1);
    }
}
