use phf::phf_map;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum SpeciesError {
    #[error("Multiplicity must be at least 1 for species '{0}'")]
    ZeroMultiplicity(String),

    #[error(
        "Sequence length {length} of species '{name}' is not a multiple of its multiplicity {multiplicity}"
    )]
    IndivisibleSequence {
        name: String,
        length: usize,
        multiplicity: usize,
    },
}

/// Three-letter to one-letter amino acid code map.
static RES_CODE_3TO1: phf::Map<&'static str, char> = phf_map! {
    "ALA" => 'A', "ARG" => 'R', "ASN" => 'N', "ASP" => 'D',
    "CYS" => 'C', "GLU" => 'E', "GLN" => 'Q', "GLY" => 'G',
    "HIS" => 'H', "ILE" => 'I', "LEU" => 'L', "LYS" => 'K',
    "MET" => 'M', "PHE" => 'F', "PRO" => 'P', "SER" => 'S',
    "THR" => 'T', "TRP" => 'W', "TYR" => 'Y', "VAL" => 'V',
};

/// Converts a three-letter residue name sequence to a one-letter string,
/// skipping (and warning about) unknown codes.
pub fn one_letter_sequence<S: AsRef<str>>(residues: &[S]) -> String {
    let mut seq = String::with_capacity(residues.len());
    for r in residues {
        match RES_CODE_3TO1.get(r.as_ref()) {
            Some(&c) => seq.push(c),
            None => warn!(residue = r.as_ref(), "Unknown residue code, skipping"),
        }
    }
    seq
}

pub struct KnownSpecies {
    /// Full (oligomer) one-letter sequence, i.e. the monomer unit repeated
    /// `multiplicity` times.
    pub sequence: &'static str,
    pub multiplicity: usize,
    pub colour: &'static str,
}

/// Built-in database of membrane protein species recognized by sequence.
static KNOWN_SPECIES: phf::Map<&'static str, KnownSpecies> = phf_map! {
    "OmpF" => KnownSpecies {
        sequence: "AEIYNKDGNKVDLYGKAVGLHYFSKGNGENSYGGNGDMTYARLGFKGETQINSDLTGYGQWEYNFQGNNSEGADAQTGNKTRLAFAGLKYADVGSFDYGRNYGVVYDALGYTDMLPEFGGDTAYSDDFFVGRVGGVATYRNSNFFGLVDGLNFAVQYLGKNERDTARRSNGDGVGGSISYEYEGFGIVGAYGAADRTNLQEAQPLGNGKKAEQWATGLKYDANNIYLAANYGETRNATPITNKFTNTSGFANKTQDVLLVAQYQFDFGLRPSIAYTKSKAKDVEGIGDVDLVNYFEVGATYYFNKNMSTYVDYIINQIDSDNKLGVGSDDTVAVGIVYQFAEIYNKDGNKVDLYGKAVGLHYFSKGNGENSYGGNGDMTYARLGFKGETQINSDLTGYGQWEYNFQGNNSEGADAQTGNKTRLAFAGLKYADVGSFDYGRNYGVVYDALGYTDMLPEFGGDTAYSDDFFVGRVGGVATYRNSNFFGLVDGLNFAVQYLGKNERDTARRSNGDGVGGSISYEYEGFGIVGAYGAADRTNLQEAQPLGNGKKAEQWATGLKYDANNIYLAANYGETRNATPITNKFTNTSGFANKTQDVLLVAQYQFDFGLRPSIAYTKSKAKDVEGIGDVDLVNYFEVGATYYFNKNMSTYVDYIINQIDSDNKLGVGSDDTVAVGIVYQFAEIYNKDGNKVDLYGKAVGLHYFSKGNGENSYGGNGDMTYARLGFKGETQINSDLTGYGQWEYNFQGNNSEGADAQTGNKTRLAFAGLKYADVGSFDYGRNYGVVYDALGYTDMLPEFGGDTAYSDDFFVGRVGGVATYRNSNFFGLVDGLNFAVQYLGKNERDTARRSNGDGVGGSISYEYEGFGIVGAYGAADRTNLQEAQPLGNGKKAEQWATGLKYDANNIYLAANYGETRNATPITNKFTNTSGFANKTQDVLLVAQYQFDFGLRPSIAYTKSKAKDVEGIGDVDLVNYFEVGATYYFNKNMSTYVDYIINQIDSDNKLGVGSDDTVAVGIVYQF",
        multiplicity: 3,
        colour: "c",
    },
    "BtuB" => KnownSpecies {
        sequence: "QDTSPDTLVVTANRFEQPRSTVLAPTTVVTRQDIDRWQSTSVNDVLRRLPGVDITQNGGSGQLSSIFIRGTNASHVLVLIDGVRLNLAGVSGSADLSQFPIALVQRVEYIRGPRSAVYGSDAIGGVVNIITTRDEPGTEISAGWGSNSYQNYDVSTQQQLGDKTRVTLLGDYAHTHGYDVVAYGNTGTQAQTDNDGFLSKTLYGALEHNFTDAWSGFVRGYGYDNRTNYDAYYSPGSPLLDTRKLYSQSWDAGLRYNGELIKSQLITSYSHSKDYNYDPHYGRYDSSATLDEMKQYTVQWANNVIVGHGSIGAGVDWQKQTTTPGTGYVEDGYDQRNTGIYLTGLQQVGDFTFEGAARSDDNSQFGRHGTWQTSAGWEFIEGYRFIASYGTSYKAPNLGQLYGFYGNPNLDPEKSKQWEGAFEGLTAGVNWRISGYRNDVSDLIDYDDHTLKYYNEGKARIKGVEATANFDTGPLTHTVSYDYVDARNAITDTPLLRRAKQQVKYQLDWQLYDFDWGITYQYLGTRYDKDYSSYPYQTVKMGGVSLWDLAVAYPVTSHLTVRGKIANLFDKDYETVYGYQTAGREYTLSGSYTF",
        multiplicity: 1,
        colour: "y",
    },
    "transportan" => KnownSpecies {
        sequence: "GWTLNSAGYLLGKINLKALAALAKKIL",
        multiplicity: 1,
        colour: "y",
    },
};

/// Looks up a known species by its full one-letter sequence.
pub fn lookup_known_species(sequence: &str) -> Option<(&'static str, &'static KnownSpecies)> {
    KNOWN_SPECIES
        .entries()
        .find(|(_, sp)| sp.sequence == sequence)
        .map(|(name, sp)| (*name, sp))
}

/// A class of proteins sharing an identical residue-composition sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Species {
    pub name: String,
    /// Full one-letter sequence, covering all oligomer repeats.
    pub sequence: String,
    /// Number of repeated identical subunits (1 for a monomer).
    pub multiplicity: usize,
    pub colour: String,
    monomer_length: usize,
}

impl Species {
    pub fn new(
        name: impl Into<String>,
        sequence: impl Into<String>,
        multiplicity: usize,
        colour: impl Into<String>,
    ) -> Result<Self, SpeciesError> {
        let name = name.into();
        let sequence = sequence.into();
        if multiplicity == 0 {
            return Err(SpeciesError::ZeroMultiplicity(name));
        }
        if !sequence.len().is_multiple_of(multiplicity) {
            return Err(SpeciesError::IndivisibleSequence {
                name,
                length: sequence.len(),
                multiplicity,
            });
        }
        // Derived once at registration, so the full length never needs to be
        // rewritten during oligomer folding.
        let monomer_length = sequence.len() / multiplicity;
        Ok(Self {
            name,
            sequence,
            multiplicity,
            colour: colour.into(),
            monomer_length,
        })
    }

    /// Number of residues over the full oligomer.
    pub fn full_length(&self) -> usize {
        self.sequence.len()
    }

    /// Number of residues of the monomer unit.
    pub fn monomer_length(&self) -> usize {
        self.monomer_length
    }

    pub fn is_oligomer(&self) -> bool {
        self.multiplicity > 1
    }

    /// Builds a species from a user-supplied definition record, expanding
    /// the monomer unit to the full oligomer sequence.
    pub fn from_definition(
        definition: &crate::core::io::tables::SpeciesDefinition,
    ) -> Result<Self, SpeciesError> {
        Self::new(
            definition.name.clone(),
            definition.full_sequence(),
            definition.multiplicity,
            "auto",
        )
    }

    /// Builds a species from a residue-name sequence, resolving it against
    /// the built-in database or auto-labelling it alphabetically.
    pub fn from_residues<S: AsRef<str>>(
        residues: &[S],
        auto_index: usize,
    ) -> Result<Self, SpeciesError> {
        let seq = one_letter_sequence(residues);
        match lookup_known_species(&seq) {
            Some((name, known)) => Self::new(name, seq, known.multiplicity, known.colour),
            None => {
                let label = auto_label(auto_index);
                Self::new(label, seq, 1, "auto")
            }
        }
    }
}

fn auto_label(index: usize) -> String {
    let letter = (b'A' + (index % 26) as u8) as char;
    if index < 26 {
        letter.to_string()
    } else {
        format!("{}{}", letter, index / 26)
    }
}
