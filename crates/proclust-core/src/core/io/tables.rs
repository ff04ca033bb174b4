//! Loaders for the plain-text definition tables consumed by the analysis:
//! per-species-pair contact cutoffs, cluster size groups, user species
//! definitions and per-species residue subsets.
//!
//! All tables are comma-separated records without headers. Every structural
//! problem is a fatal error raised at load time, before any frame is
//! processed.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to read table: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed table: {0}")]
    Csv(#[from] csv::Error),

    #[error("Line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Line {line}: could not parse field '{value}'")]
    Parse { line: usize, value: String },

    #[error("Species indexing must start at 0 (lowest index found: {0})")]
    SpeciesIndexNotZeroBased(usize),

    #[error("Cutoff not specified for species pair ({0}, {1})")]
    MissingCutoff(usize, usize),

    #[error("Size group {index} has max {max} smaller than min {min}")]
    InvertedGroup { index: usize, min: usize, max: usize },

    #[error(
        "Size groups {a_min}-{a_max} and {b_min}-{b_max} overlap or are not in ascending order"
    )]
    OverlappingGroups {
        a_min: usize,
        a_max: usize,
        b_min: usize,
        b_max: usize,
    },

    #[error("Species '{0}' is defined more than once")]
    DuplicateSpecies(String),

    #[error("Species {0} has more than one residue subset defined")]
    DuplicateResidueSubset(usize),

    #[error("Species {0} has an empty residue subset")]
    EmptyResidueSubset(usize),
}

fn reader_from<R: Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source)
}

fn parse_field<T: std::str::FromStr>(field: &str, line: usize) -> Result<T, TableError> {
    field.parse().map_err(|_| TableError::Parse {
        line,
        value: field.to_string(),
    })
}

/// Symmetric per-species-pair contact cutoff table, fully specified for
/// every pair of a contiguous 0..N-1 species index range.
#[derive(Debug, Clone, PartialEq)]
pub struct PairCutoffTable {
    nb_species: usize,
    values: Vec<f64>,
}

impl PairCutoffTable {
    /// Builds and validates the table from `(s1, s2, cutoff)` records.
    pub fn from_records(records: &[(usize, usize, f64)]) -> Result<Self, TableError> {
        let mut sparse: HashMap<(usize, usize), f64> = HashMap::new();
        let mut max_index = 0usize;
        let mut min_index = usize::MAX;
        for &(s1, s2, cutoff) in records {
            sparse.insert((s1, s2), cutoff);
            sparse.insert((s2, s1), cutoff);
            max_index = max_index.max(s1).max(s2);
            min_index = min_index.min(s1).min(s2);
        }
        if min_index != 0 {
            return Err(TableError::SpeciesIndexNotZeroBased(min_index));
        }
        let nb_species = max_index + 1;
        let mut values = vec![0.0; nb_species * nb_species];
        for s1 in 0..nb_species {
            for s2 in 0..nb_species {
                match sparse.get(&(s1, s2)) {
                    Some(&cutoff) => values[s1 * nb_species + s2] = cutoff,
                    None => return Err(TableError::MissingCutoff(s1.min(s2), s1.max(s2))),
                }
            }
        }
        Ok(Self { nb_species, values })
    }

    pub fn from_reader<R: Read>(source: R) -> Result<Self, TableError> {
        let mut records = Vec::new();
        for (line, record) in reader_from(source).records().enumerate() {
            let record = record?;
            let line = line + 1;
            if record.len() != 3 {
                return Err(TableError::FieldCount {
                    line,
                    expected: 3,
                    found: record.len(),
                });
            }
            records.push((
                parse_field(&record[0], line)?,
                parse_field(&record[1], line)?,
                parse_field(&record[2], line)?,
            ));
        }
        Self::from_records(&records)
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    pub fn nb_species(&self) -> usize {
        self.nb_species
    }

    pub fn get(&self, s1: usize, s2: usize) -> f64 {
        self.values[s1 * self.nb_species + s2]
    }
}

/// One user-defined inclusive cluster size range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeGroup {
    pub min: usize,
    /// `None` marks an open-ended ("max") upper bound.
    pub max: Option<usize>,
    pub colour: String,
}

impl SizeGroup {
    pub fn label(&self) -> String {
        match self.max {
            None => format!("{}+", self.min),
            Some(max) if max == self.min => format!("{}", self.min),
            Some(max) => format!("{}-{}", self.min, max),
        }
    }

    fn contains(&self, size: usize) -> bool {
        size >= self.min && self.max.is_none_or(|max| size <= max)
    }
}

/// Ordered, non-overlapping cluster size groups plus the implicit "other"
/// catch-all for sizes outside every defined range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeGroups {
    groups: Vec<SizeGroup>,
}

impl SizeGroups {
    pub fn new(groups: Vec<SizeGroup>) -> Result<Self, TableError> {
        for (index, g) in groups.iter().enumerate() {
            if let Some(max) = g.max
                && max < g.min
            {
                return Err(TableError::InvertedGroup {
                    index,
                    min: g.min,
                    max,
                });
            }
        }
        for pair in groups.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            match a.max {
                Some(a_max) if b.min > a_max => {}
                _ => {
                    return Err(TableError::OverlappingGroups {
                        a_min: a.min,
                        a_max: a.max.unwrap_or(usize::MAX),
                        b_min: b.min,
                        b_max: b.max.unwrap_or(usize::MAX),
                    });
                }
            }
        }
        Ok(Self { groups })
    }

    pub fn from_reader<R: Read>(source: R) -> Result<Self, TableError> {
        let mut groups = Vec::new();
        for (line, record) in reader_from(source).records().enumerate() {
            let record = record?;
            let line = line + 1;
            if record.len() != 3 {
                return Err(TableError::FieldCount {
                    line,
                    expected: 3,
                    found: record.len(),
                });
            }
            let min = parse_field(&record[0], line)?;
            let max = if &record[1] == "max" {
                None
            } else {
                Some(parse_field(&record[1], line)?)
            };
            groups.push(SizeGroup {
                min,
                max,
                colour: record[2].to_string(),
            });
        }
        Self::new(groups)
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    /// Number of user-defined groups, excluding the catch-all.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[SizeGroup] {
        &self.groups
    }

    /// Index of the catch-all group collecting sizes outside every range.
    pub fn other_index(&self) -> usize {
        self.groups.len()
    }

    /// Maps a cluster size (≥ 1) to exactly one group index.
    pub fn group_of(&self, size: usize) -> usize {
        self.groups
            .iter()
            .position(|g| g.contains(size))
            .unwrap_or(self.other_index())
    }

    pub fn label_of(&self, group: usize) -> String {
        if group == self.other_index() {
            "other".to_string()
        } else {
            self.groups[group].label()
        }
    }
}

/// A user-supplied species definition: `name,multiplicity,sequence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesDefinition {
    pub name: String,
    pub multiplicity: usize,
    /// Monomer unit sequence as given; the full oligomer sequence is the
    /// unit repeated `multiplicity` times.
    pub unit_sequence: String,
}

impl SpeciesDefinition {
    pub fn full_sequence(&self) -> String {
        self.unit_sequence.repeat(self.multiplicity)
    }
}

/// Loads species definitions, rejecting duplicate names.
pub fn load_species_definitions<R: Read>(source: R) -> Result<Vec<SpeciesDefinition>, TableError> {
    let mut definitions: Vec<SpeciesDefinition> = Vec::new();
    for (line, record) in reader_from(source).records().enumerate() {
        let record = record?;
        let line = line + 1;
        if record.len() != 3 {
            return Err(TableError::FieldCount {
                line,
                expected: 3,
                found: record.len(),
            });
        }
        let name = record[0].to_string();
        if definitions.iter().any(|d| d.name == name) {
            return Err(TableError::DuplicateSpecies(name));
        }
        definitions.push(SpeciesDefinition {
            name,
            multiplicity: parse_field(&record[1], line)?,
            unit_sequence: record[2].to_string(),
        });
    }
    Ok(definitions)
}

/// Per-species residue subsets restricting which residues count toward the
/// center-of-geometry selection: `species_index,resid,resid,...`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResidueSubsets {
    subsets: HashMap<usize, Vec<usize>>,
}

impl ResidueSubsets {
    pub fn from_reader<R: Read>(source: R) -> Result<Self, TableError> {
        let mut subsets: HashMap<usize, Vec<usize>> = HashMap::new();
        for (line, record) in reader_from(source).records().enumerate() {
            let record = record?;
            let line = line + 1;
            if record.len() < 2 {
                return Err(TableError::FieldCount {
                    line,
                    expected: 2,
                    found: record.len(),
                });
            }
            let species: usize = parse_field(&record[0], line)?;
            if subsets.contains_key(&species) {
                return Err(TableError::DuplicateResidueSubset(species));
            }
            let resids = record
                .iter()
                .skip(1)
                .map(|f| parse_field(f, line))
                .collect::<Result<Vec<usize>, _>>()?;
            if resids.is_empty() {
                return Err(TableError::EmptyResidueSubset(species));
            }
            subsets.insert(species, resids);
        }
        Ok(Self { subsets })
    }

    pub fn load(path: &Path) -> Result<Self, TableError> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    pub fn get(&self, species: usize) -> Option<&[usize]> {
        self.subsets.get(&species).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[usize])> {
        self.subsets.iter().map(|(&s, resids)| (s, resids.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn pair_cutoff_table_is_completed_symmetrically() {
        let table =
            PairCutoffTable::from_records(&[(0, 0, 8.0), (0, 1, 10.0), (1, 1, 12.0)]).unwrap();
        assert_eq!(table.nb_species(), 2);
        assert_eq!(table.get(1, 0), 10.0);
        assert_eq!(table.get(0, 1), 10.0);
        assert_eq!(table.get(1, 1), 12.0);
    }

    #[test]
    fn missing_pair_cutoff_is_a_load_time_error() {
        let err = PairCutoffTable::from_records(&[(0, 0, 8.0), (1, 1, 12.0)]).unwrap_err();
        assert!(matches!(err, TableError::MissingCutoff(0, 1)));
    }

    #[test]
    fn non_zero_based_species_indices_are_rejected() {
        let err = PairCutoffTable::from_records(&[(1, 1, 8.0), (1, 2, 9.0), (2, 2, 9.0)])
            .unwrap_err();
        assert!(matches!(err, TableError::SpeciesIndexNotZeroBased(1)));
    }

    #[test]
    fn pair_cutoffs_parse_from_csv_text() {
        let text = "0,0,8.0\n0,1,10.0\n1,1,12.0\n";
        let table = PairCutoffTable::from_reader(text.as_bytes()).unwrap();
        assert_eq!(table.get(0, 1), 10.0);
    }

    #[test]
    fn pair_cutoffs_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cutoffs.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "0,0,7.5").unwrap();
        let table = PairCutoffTable::load(&path).unwrap();
        assert_eq!(table.get(0, 0), 7.5);
    }

    #[test]
    fn size_groups_map_sizes_to_group_indices() {
        let text = "1,1,red\n2,5,blue\n6,max,green\n";
        let groups = SizeGroups::from_reader(text.as_bytes()).unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.group_of(1), 0);
        assert_eq!(groups.group_of(3), 1);
        assert_eq!(groups.group_of(7), 2);
        assert_eq!(groups.label_of(2), "6+");
    }

    #[test]
    fn gap_sizes_fall_into_the_catch_all_group() {
        let text = "1,1,red\n4,6,blue\n";
        let groups = SizeGroups::from_reader(text.as_bytes()).unwrap();
        assert_eq!(groups.group_of(2), groups.other_index());
        assert_eq!(groups.group_of(100), groups.other_index());
        assert_eq!(groups.label_of(groups.other_index()), "other");
    }

    #[test]
    fn overlapping_size_groups_are_rejected() {
        let text = "1,3,red\n3,5,blue\n";
        let err = SizeGroups::from_reader(text.as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::OverlappingGroups { .. }));
    }

    #[test]
    fn descending_size_groups_are_rejected() {
        let text = "4,6,red\n1,2,blue\n";
        let err = SizeGroups::from_reader(text.as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::OverlappingGroups { .. }));
    }

    #[test]
    fn inverted_size_group_bounds_are_rejected() {
        let text = "5,2,red\n";
        let err = SizeGroups::from_reader(text.as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::InvertedGroup { index: 0, .. }));
    }

    #[test]
    fn species_definitions_repeat_the_unit_sequence() {
        let text = "toy,3,AGW\n";
        let defs = load_species_definitions(text.as_bytes()).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].full_sequence(), "AGWAGWAGW");
    }

    #[test]
    fn duplicate_species_definitions_are_rejected() {
        let text = "toy,1,AGW\ntoy,2,KL\n";
        let err = load_species_definitions(text.as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::DuplicateSpecies(name) if name == "toy"));
    }

    #[test]
    fn residue_subsets_parse_variable_length_records() {
        let text = "0,1,2,3\n1,10\n";
        let subsets = ResidueSubsets::from_reader(text.as_bytes()).unwrap();
        assert_eq!(subsets.get(0), Some(&[1, 2, 3][..]));
        assert_eq!(subsets.get(1), Some(&[10][..]));
        assert_eq!(subsets.get(2), None);
    }

    #[test]
    fn duplicate_residue_subsets_are_rejected() {
        let text = "0,1\n0,2\n";
        let err = ResidueSubsets::from_reader(text.as_bytes()).unwrap_err();
        assert!(matches!(err, TableError::DuplicateResidueSubset(0)));
    }
}
