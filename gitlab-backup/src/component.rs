//! Backup components and the skip filter.
//!
//! A component is one independently backed-up subsystem. Each has a fixed
//! artifact name inside the backup archive and a skip name accepted in the
//! `SKIP` directive.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    #[serde(rename = "db", alias = "database")]
    Database,
    Repositories,
    Uploads,
    Builds,
    Artifacts,
    Lfs,
    Registry,
}

impl Component {
    /// Order in which components are dumped into the staging directory.
    pub const BACKUP_ORDER: [Component; 7] = [
        Component::Database,
        Component::Repositories,
        Component::Uploads,
        Component::Builds,
        Component::Artifacts,
        Component::Lfs,
        Component::Registry,
    ];

    /// Order in which components are restored.
    pub const RESTORE_ORDER: [Component; 7] = [
        Component::Database,
        Component::Repositories,
        Component::Builds,
        Component::Uploads,
        Component::Artifacts,
        Component::Lfs,
        Component::Registry,
    ];

    /// Name used in the skip directive and in the manifest.
    pub fn name(self) -> &'static str {
        match self {
            Component::Database => "db",
            Component::Repositories => "repositories",
            Component::Uploads => "uploads",
            Component::Builds => "builds",
            Component::Artifacts => "artifacts",
            Component::Lfs => "lfs",
            Component::Registry => "registry",
        }
    }

    /// Entry name of this component's artifact at the archive root.
    pub fn artifact_name(self) -> &'static str {
        match self {
            Component::Database => "db",
            Component::Repositories => "repositories",
            Component::Uploads => "uploads.tar.gz",
            Component::Builds => "builds.tar.gz",
            Component::Artifacts => "artifacts.tar.gz",
            Component::Lfs => "lfs.tar.gz",
            Component::Registry => "registry.tar.gz",
        }
    }

    /// Whether the artifact is a directory rather than a single file.
    pub fn artifact_is_dir(self) -> bool {
        matches!(self, Component::Database | Component::Repositories)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Component {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "db" | "database" => Ok(Component::Database),
            "repositories" | "repo" => Ok(Component::Repositories),
            "uploads" => Ok(Component::Uploads),
            "builds" => Ok(Component::Builds),
            "artifacts" => Ok(Component::Artifacts),
            "lfs" => Ok(Component::Lfs),
            "registry" => Ok(Component::Registry),
            other => Err(format!("unknown backup component '{}'", other)),
        }
    }
}

/// Set of components excluded from a backup or restore run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipSet(BTreeSet<Component>);

impl SkipSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated skip directive such as `repositories,uploads`.
    ///
    /// Empty items are ignored; unknown names are logged and ignored.
    pub fn parse(value: &str) -> Self {
        let mut set = BTreeSet::new();
        for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item.parse::<Component>() {
                Ok(component) => {
                    set.insert(component);
                }
                Err(e) => warn!("Ignoring skip entry: {}", e),
            }
        }
        Self(set)
    }

    pub fn should_skip(&self, component: Component) -> bool {
        self.0.contains(&component)
    }

    pub fn insert(&mut self, component: Component) {
        self.0.insert(component);
    }

    /// Union of two skip sets.
    pub fn union(&self, other: &SkipSet) -> SkipSet {
        SkipSet(self.0.union(&other.0).copied().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Component> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Component> for SkipSet {
    fn from_iter<I: IntoIterator<Item = Component>>(iter: I) -> Self {
        SkipSet(iter.into_iter().collect())
    }
}

impl fmt::Display for SkipSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|c| c.name()).collect();
        f.write_str(&names.join(","))
    }
}
