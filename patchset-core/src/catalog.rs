//! Plugin catalog: a simple name → descriptor index.
//!
//! # Storage layout
//!
//! ```text
//! ~/.patchset/
//!   catalog.yaml     (mode 0600, rewritten atomically on every mutation)
//! ```
//!
//! # API pattern
//!
//! Path-taking functions come in two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// Command group a plugin is listed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PluginGroup {
    #[default]
    Run,
    Manage,
    Build,
    Observe,
    System,
    Version,
    Admin,
    Extra,
}

impl fmt::Display for PluginGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginGroup::Run => "Run",
            PluginGroup::Manage => "Manage",
            PluginGroup::Build => "Build",
            PluginGroup::Observe => "Observe",
            PluginGroup::System => "System",
            PluginGroup::Version => "Version",
            PluginGroup::Admin => "Admin",
            PluginGroup::Extra => "Extra",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for PluginGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "run" => Ok(Self::Run),
            "manage" => Ok(Self::Manage),
            "build" => Ok(Self::Build),
            "observe" => Ok(Self::Observe),
            "system" => Ok(Self::System),
            "version" => Ok(Self::Version),
            "admin" => Ok(Self::Admin),
            "extra" => Ok(Self::Extra),
            other => Err(format!(
                "unknown plugin group '{other}'; expected: run, manage, build, observe, system, version, admin, extra"
            )),
        }
    }
}

/// Describes an installed plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_sha: Option<String>,
    #[serde(default)]
    pub group: PluginGroup,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_url: Option<String>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_path: Option<PathBuf>,
    /// Discovery source the plugin was installed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog trait
// ---------------------------------------------------------------------------

/// Index of installed plugins.
pub trait Catalog {
    /// Inserts or replaces the descriptor with the same name.
    fn upsert(&mut self, plugin: PluginDescriptor) -> Result<(), CatalogError>;

    fn get(&self, name: &str) -> Option<PluginDescriptor>;

    /// All descriptors, sorted by name.
    fn list(&self) -> Vec<PluginDescriptor>;

    /// Removes a descriptor. Absent names are ignored.
    fn delete(&mut self, name: &str) -> Result<(), CatalogError>;
}

/// Catalog kept in memory only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCatalog {
    #[serde(default)]
    plugins: BTreeMap<String, PluginDescriptor>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Catalog for MemoryCatalog {
    fn upsert(&mut self, plugin: PluginDescriptor) -> Result<(), CatalogError> {
        self.plugins.insert(plugin.name.clone(), plugin);
        Ok(())
    }

    fn get(&self, name: &str) -> Option<PluginDescriptor> {
        self.plugins.get(name).cloned()
    }

    fn list(&self) -> Vec<PluginDescriptor> {
        self.plugins.values().cloned().collect()
    }

    fn delete(&mut self, name: &str) -> Result<(), CatalogError> {
        self.plugins.remove(name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed catalog
// ---------------------------------------------------------------------------

/// `<home>/.patchset/catalog.yaml`. Pure, no I/O.
pub fn catalog_path_at(home: &Path) -> PathBuf {
    home.join(".patchset").join("catalog.yaml")
}

/// Catalog persisted to a YAML file after every mutation.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
    inner: MemoryCatalog,
}

impl FileCatalog {
    /// Open the catalog under `home`. A missing file yields an empty catalog.
    ///
    /// Returns `CatalogError::Parse` (with path) if the file is malformed.
    pub fn open_at(home: &Path) -> Result<Self, CatalogError> {
        let path = catalog_path_at(home);
        let inner = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_yaml::from_str(&contents)
                .map_err(|e| CatalogError::Parse { path: path.clone(), source: e })?
        } else {
            MemoryCatalog::new()
        };
        Ok(Self { path, inner })
    }

    /// `open_at` convenience wrapper.
    pub fn open() -> Result<Self, CatalogError> {
        Self::open_at(&home()?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
    fn save(&self) -> Result<(), CatalogError> {
        if let Some(dir) = self.path.parent() {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
                set_dir_permissions(dir)?;
            }
        }
        let tmp_path = self.path.with_extension("yaml.tmp");
        let yaml = serde_yaml::to_string(&self.inner)?;
        std::fs::write(&tmp_path, yaml)?;
        set_file_permissions(&tmp_path)?;
        if let Err(e) = std::fs::rename(&tmp_path, &self.path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

impl Catalog for FileCatalog {
    fn upsert(&mut self, plugin: PluginDescriptor) -> Result<(), CatalogError> {
        self.inner.upsert(plugin)?;
        self.save()
    }

    fn get(&self, name: &str) -> Option<PluginDescriptor> {
        self.inner.get(name)
    }

    fn list(&self) -> Vec<PluginDescriptor> {
        self.inner.list()
    }

    fn delete(&mut self, name: &str) -> Result<(), CatalogError> {
        if self.inner.get(name).is_none() {
            return Ok(());
        }
        self.inner.delete(name)?;
        self.save()
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, CatalogError> {
    dirs::home_dir().ok_or(CatalogError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CatalogError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CatalogError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CatalogError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CatalogError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
