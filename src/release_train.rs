//! Maps project release versions to the release train (bill-of-materials
//! codename) they ship in.

use std::collections::BTreeMap;

/// Immutable version → release train table with a fallback for versions the
/// table does not know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTrains {
    versions: BTreeMap<String, String>,
    default: String,
}

impl ReleaseTrains {
    pub fn new(versions: BTreeMap<String, String>, default: impl Into<String>) -> Self {
        Self {
            versions,
            default: default.into(),
        }
    }

    /// Returns the release train for `version`, or the default when the
    /// version is not in the table. Never fails.
    pub fn resolve(&self, version: &str) -> &str {
        self.lookup(version).unwrap_or(&self.default)
    }

    /// Exact table hit only.
    pub fn lookup(&self, version: &str) -> Option<&str> {
        self.versions.get(version).map(String::as_str)
    }

    pub fn default_train(&self) -> &str {
        &self.default
    }
}

impl Default for ReleaseTrains {
    fn default() -> Self {
        Self::new(default_versions(), DEFAULT_TRAIN)
    }
}

pub const DEFAULT_TRAIN: &str = "Angel.SR3";

pub fn default_versions() -> BTreeMap<String, String> {
    [("1.0.2.RELEASE", "Angel.SR2")]
        .into_iter()
        .map(|(version, train)| (version.to_string(), train.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn known_version_resolves_to_its_train() {
        let trains = ReleaseTrains::default();
        assert_eq!(trains.resolve("1.0.2.RELEASE"), "Angel.SR2");
        assert_eq!(trains.lookup("1.0.2.RELEASE"), Some("Angel.SR2"));
        assert_eq!(default_versions().len(), 1);
    }

    #[test]
    fn unknown_version_falls_back_to_default() {
        let trains = ReleaseTrains::default();
        assert_eq!(trains.resolve("9.9.9.UNKNOWN"), "Angel.SR3");
        assert_eq!(trains.resolve(""), "Angel.SR3");
        assert_eq!(trains.lookup("9.9.9.UNKNOWN"), None);
    }

    #[test]
    fn resolve_is_repeatable_and_leaves_table_alone() {
        let trains = ReleaseTrains::default();
        let before = trains.clone();
        let first = trains.resolve("1.0.2.RELEASE").to_string();
        let second = trains.resolve("1.0.2.RELEASE").to_string();
        assert_eq!(first, second);
        trains.resolve("not-a-version");
        assert_eq!(trains, before);
    }

    #[test]
    fn custom_table_uses_its_own_default() {
        let versions = BTreeMap::from([("2.0.0".to_string(), "Brixton.RELEASE".to_string())]);
        let trains = ReleaseTrains::new(versions, "Brixton.SR1");
        assert_eq!(trains.resolve("2.0.0"), "Brixton.RELEASE");
        assert_eq!(trains.resolve("1.0.2.RELEASE"), "Brixton.SR1");
        assert_eq!(trains.default_train(), "Brixton.SR1");
    }
}
