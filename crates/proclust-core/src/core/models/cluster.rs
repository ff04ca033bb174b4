/// Membrane placement of a detected cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterClass {
    /// The cluster footprint spans both leaflets.
    Transmembrane,
    /// Every cluster atom is strictly closer to the lower leaflet headgroups.
    InterfacialLower,
    /// No cluster atom is strictly closer to the lower leaflet headgroups.
    InterfacialUpper,
}

/// Per-frame cluster assignment of a single protein.
///
/// Variant order gives the conventional sort order: lower-interfacial
/// proteins first, transmembrane sizes ascending, upper-interfacial last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClusterStatus {
    InterfacialLower,
    /// Member of a transmembrane cluster of the given size.
    Transmembrane(usize),
    InterfacialUpper,
}

impl ClusterStatus {
    pub fn is_transmembrane(&self) -> bool {
        matches!(self, ClusterStatus::Transmembrane(_))
    }

    /// Cluster size for transmembrane assignments, `None` for interfacial.
    pub fn size(&self) -> Option<usize> {
        match self {
            ClusterStatus::Transmembrane(n) => Some(*n),
            _ => None,
        }
    }

    /// Historical integer encoding used by downstream file writers:
    /// -1 for lower-interfacial, 99999 for upper-interfacial, the size
    /// otherwise. Output layers only; the analysis itself never relies on it.
    pub fn legacy_size_code(&self) -> i64 {
        match self {
            ClusterStatus::InterfacialLower => -1,
            ClusterStatus::Transmembrane(n) => *n as i64,
            ClusterStatus::InterfacialUpper => 99999,
        }
    }

    /// Historical group encoding: -1 for lower-interfacial,
    /// `group_count + 1` for upper-interfacial, the group index otherwise.
    pub fn legacy_group_code(&self, group_index: usize, group_count: usize) -> i64 {
        match self {
            ClusterStatus::InterfacialLower => -1,
            ClusterStatus::Transmembrane(_) => group_index as i64,
            ClusterStatus::InterfacialUpper => (group_count + 1) as i64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_ordering_places_interfacial_at_the_extremes() {
        let mut statuses = vec![
            ClusterStatus::InterfacialUpper,
            ClusterStatus::Transmembrane(3),
            ClusterStatus::InterfacialLower,
            ClusterStatus::Transmembrane(1),
        ];
        statuses.sort();
        assert_eq!(
            statuses,
            vec![
                ClusterStatus::InterfacialLower,
                ClusterStatus::Transmembrane(1),
                ClusterStatus::Transmembrane(3),
                ClusterStatus::InterfacialUpper,
            ]
        );
    }

    #[test]
    fn legacy_codes_match_historical_sentinels() {
        assert_eq!(ClusterStatus::InterfacialLower.legacy_size_code(), -1);
        assert_eq!(ClusterStatus::InterfacialUpper.legacy_size_code(), 99999);
        assert_eq!(ClusterStatus::Transmembrane(4).legacy_size_code(), 4);
        assert_eq!(
            ClusterStatus::InterfacialUpper.legacy_group_code(0, 3),
            4
        );
        assert_eq!(ClusterStatus::Transmembrane(4).legacy_group_code(1, 3), 1);
    }
}
