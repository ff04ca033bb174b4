use crate::core::io::tables::{PairCutoffTable, ResidueSubsets, SizeGroups, TableError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter {
        name: &'static str,
        message: String,
    },

    #[error("Cutoff table covers {table} species but the system has {system}")]
    CutoffSpeciesMismatch { table: usize, system: usize },

    #[error("Unknown clustering algorithm '{0}' (expected 'min', 'cog' or 'density')")]
    UnknownAlgorithm(String),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed settings file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// How a protein's representative point (or point set) is chosen for the
/// inter-protein distance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMethod {
    /// Minimum distance over all atom pairs of the two proteins.
    MinPair,
    /// Distance between periodic centers of geometry.
    CenterOfGeometry,
}

/// Connectivity cutoff: one global value or a per-species-pair table.
#[derive(Debug, Clone, PartialEq)]
pub enum CutoffPolicy {
    Uniform(f64),
    PerSpeciesPair(PairCutoffTable),
}

impl CutoffPolicy {
    pub fn cutoff(&self, s1: usize, s2: usize) -> f64 {
        match self {
            CutoffPolicy::Uniform(value) => *value,
            CutoffPolicy::PerSpeciesPair(table) => table.get(s1, s2),
        }
    }

    /// Checks the policy against the realized species set. Fatal before any
    /// frame is processed.
    pub fn validate(&self, nb_species: usize) -> Result<(), ConfigError> {
        match self {
            CutoffPolicy::Uniform(value) => {
                if *value <= 0.0 {
                    return Err(ConfigError::InvalidParameter {
                        name: "cutoff",
                        message: format!("must be positive, got {}", value),
                    });
                }
            }
            CutoffPolicy::PerSpeciesPair(table) => {
                if table.nb_species() != nb_species {
                    return Err(ConfigError::CutoffSpeciesMismatch {
                        table: table.nb_species(),
                        system: nb_species,
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClusterAlgorithm {
    /// Connected components of the contact graph under the cutoff policy.
    Connectivity {
        method: DistanceMethod,
        cutoff: CutoffPolicy,
    },
    /// Density clustering (radius + minimum neighbour count) over the
    /// center-of-geometry distance matrix; noise points become singletons.
    Density { eps: f64, min_samples: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub algorithm: ClusterAlgorithm,
    /// Residue centroid distance below which two residues are in contact.
    pub residue_contact_cutoff: f64,
    pub size_groups: Option<SizeGroups>,
    /// Per-species residue subsets (1-based positions) overriding the
    /// supplied center-of-geometry selection.
    pub cog_subsets: Option<ResidueSubsets>,
}

impl AnalysisConfig {
    /// Validates the configuration against the realized species set.
    pub fn validate(&self, nb_species: usize) -> Result<(), ConfigError> {
        if self.residue_contact_cutoff <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "residue_contact_cutoff",
                message: format!("must be positive, got {}", self.residue_contact_cutoff),
            });
        }
        match &self.algorithm {
            ClusterAlgorithm::Connectivity { cutoff, .. } => cutoff.validate(nb_species)?,
            ClusterAlgorithm::Density { eps, min_samples } => {
                if *eps <= 0.0 {
                    return Err(ConfigError::InvalidParameter {
                        name: "eps",
                        message: format!("must be positive, got {}", eps),
                    });
                }
                if *min_samples == 0 {
                    return Err(ConfigError::InvalidParameter {
                        name: "min_samples",
                        message: "must be at least 1".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Loads a configuration from a TOML settings file, resolving referenced
    /// definition tables relative to the settings file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let settings: AnalysisSettings = toml::from_str(&text)?;
        let base = path.parent().unwrap_or(Path::new("."));
        settings.into_config(base)
    }

    pub fn from_toml_str(text: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let settings: AnalysisSettings = toml::from_str(text)?;
        settings.into_config(base_dir)
    }
}

#[derive(Default)]
pub struct AnalysisConfigBuilder {
    algorithm: Option<ClusterAlgorithm>,
    residue_contact_cutoff: Option<f64>,
    size_groups: Option<SizeGroups>,
    cog_subsets: Option<ResidueSubsets>,
}

impl AnalysisConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn algorithm(mut self, algorithm: ClusterAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }
    pub fn residue_contact_cutoff(mut self, cutoff: f64) -> Self {
        self.residue_contact_cutoff = Some(cutoff);
        self
    }
    pub fn size_groups(mut self, groups: SizeGroups) -> Self {
        self.size_groups = Some(groups);
        self
    }
    pub fn cog_subsets(mut self, subsets: ResidueSubsets) -> Self {
        self.cog_subsets = Some(subsets);
        self
    }

    pub fn build(self) -> Result<AnalysisConfig, ConfigError> {
        Ok(AnalysisConfig {
            algorithm: self
                .algorithm
                .ok_or(ConfigError::MissingParameter("algorithm"))?,
            residue_contact_cutoff: self
                .residue_contact_cutoff
                .ok_or(ConfigError::MissingParameter("residue_contact_cutoff"))?,
            size_groups: self.size_groups,
            cog_subsets: self.cog_subsets,
        })
    }
}

/// On-disk settings model.
#[derive(Debug, Deserialize)]
struct AnalysisSettings {
    /// "min", "cog" or "density".
    algorithm: String,
    cutoff: Option<f64>,
    cutoff_table: Option<PathBuf>,
    eps: Option<f64>,
    min_samples: Option<usize>,
    residue_contact_cutoff: f64,
    size_groups_file: Option<PathBuf>,
    residue_subsets_file: Option<PathBuf>,
}

impl AnalysisSettings {
    fn into_config(self, base_dir: &Path) -> Result<AnalysisConfig, ConfigError> {
        let cutoff_policy = || -> Result<CutoffPolicy, ConfigError> {
            if let Some(table_path) = &self.cutoff_table {
                Ok(CutoffPolicy::PerSpeciesPair(PairCutoffTable::load(
                    &base_dir.join(table_path),
                )?))
            } else {
                Ok(CutoffPolicy::Uniform(
                    self.cutoff.ok_or(ConfigError::MissingParameter("cutoff"))?,
                ))
            }
        };
        let algorithm = match self.algorithm.as_str() {
            "min" => ClusterAlgorithm::Connectivity {
                method: DistanceMethod::MinPair,
                cutoff: cutoff_policy()?,
            },
            "cog" => ClusterAlgorithm::Connectivity {
                method: DistanceMethod::CenterOfGeometry,
                cutoff: cutoff_policy()?,
            },
            "density" => ClusterAlgorithm::Density {
                eps: self.eps.ok_or(ConfigError::MissingParameter("eps"))?,
                min_samples: self
                    .min_samples
                    .ok_or(ConfigError::MissingParameter("min_samples"))?,
            },
            other => return Err(ConfigError::UnknownAlgorithm(other.to_string())),
        };
        let size_groups = match &self.size_groups_file {
            Some(path) => Some(SizeGroups::load(&base_dir.join(path))?),
            None => None,
        };
        let cog_subsets = match &self.residue_subsets_file {
            Some(path) => Some(ResidueSubsets::load(&base_dir.join(path))?),
            None => None,
        };
        let config = AnalysisConfigBuilder::new()
            .algorithm(algorithm)
            .residue_contact_cutoff(self.residue_contact_cutoff)
            .build()?;
        Ok(AnalysisConfig {
            size_groups,
            cog_subsets,
            ..config
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builder_requires_algorithm_and_contact_cutoff() {
        let err = AnalysisConfigBuilder::new().build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingParameter("algorithm")));

        let err = AnalysisConfigBuilder::new()
            .algorithm(ClusterAlgorithm::Density {
                eps: 20.0,
                min_samples: 3,
            })
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingParameter("residue_contact_cutoff")
        ));
    }

    #[test]
    fn uniform_cutoff_must_be_positive() {
        let config = AnalysisConfigBuilder::new()
            .algorithm(ClusterAlgorithm::Connectivity {
                method: DistanceMethod::CenterOfGeometry,
                cutoff: CutoffPolicy::Uniform(-1.0),
            })
            .residue_contact_cutoff(8.0)
            .build()
            .unwrap();
        assert!(config.validate(1).is_err());
    }

    #[test]
    fn cutoff_table_species_count_is_checked_against_system() {
        let table = PairCutoffTable::from_records(&[(0, 0, 8.0)]).unwrap();
        let policy = CutoffPolicy::PerSpeciesPair(table);
        assert!(policy.validate(1).is_ok());
        let err = policy.validate(2).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::CutoffSpeciesMismatch {
                table: 1,
                system: 2
            }
        ));
    }

    #[test]
    fn density_parameters_are_validated() {
        let config = AnalysisConfigBuilder::new()
            .algorithm(ClusterAlgorithm::Density {
                eps: 20.0,
                min_samples: 0,
            })
            .residue_contact_cutoff(8.0)
            .build()
            .unwrap();
        let err = config.validate(1).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidParameter {
                name: "min_samples",
                ..
            }
        ));
    }

    #[test]
    fn settings_file_parses_connectivity_with_uniform_cutoff() {
        let text = "algorithm = \"cog\"\ncutoff = 8.0\nresidue_contact_cutoff = 8.0\n";
        let config = AnalysisConfig::from_toml_str(text, Path::new(".")).unwrap();
        assert_eq!(
            config.algorithm,
            ClusterAlgorithm::Connectivity {
                method: DistanceMethod::CenterOfGeometry,
                cutoff: CutoffPolicy::Uniform(8.0),
            }
        );
        assert!(config.size_groups.is_none());
    }

    #[test]
    fn settings_file_resolves_referenced_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut groups = std::fs::File::create(dir.path().join("groups.txt")).unwrap();
        write!(groups, "1,1,red\n2,max,blue\n").unwrap();
        let mut subsets = std::fs::File::create(dir.path().join("subsets.txt")).unwrap();
        write!(subsets, "0,1,2\n").unwrap();
        let settings_path = dir.path().join("analysis.toml");
        let mut settings = std::fs::File::create(&settings_path).unwrap();
        write!(
            settings,
            "algorithm = \"density\"\neps = 20.0\nmin_samples = 3\nresidue_contact_cutoff = 8.0\nsize_groups_file = \"groups.txt\"\nresidue_subsets_file = \"subsets.txt\"\n"
        )
        .unwrap();
        let config = AnalysisConfig::load(&settings_path).unwrap();
        let groups = config.size_groups.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.group_of(5), 1);
        let subsets = config.cog_subsets.unwrap();
        assert_eq!(subsets.get(0), Some(&[1, 2][..]));
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let text = "algorithm = \"voronoi\"\nresidue_contact_cutoff = 8.0\n";
        let err = AnalysisConfig::from_toml_str(text, Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAlgorithm(name) if name == "voronoi"));
    }
}
