//! Domain loader
//!
//! Discovers `<name>.toml` files in the domains directory.

use std::path::{Path, PathBuf};
use tokio::fs;

use super::definition::DomainDefinition;
use crate::config::Config;
use crate::{Error, Result};

pub struct DomainLoader {
    dir: PathBuf,
}

impl DomainLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of the available domains, sorted
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| {
            Error::Domain(format!(
                "Failed to read domains directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Load and validate a domain by name
    pub async fn load(&self, name: &str) -> Result<DomainDefinition> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(Error::Domain(format!("Invalid domain name '{}'", name)));
        }

        let path = self.dir.join(format!("{}.toml", name));
        if !fs::try_exists(&path).await.unwrap_or(false) {
            let available = self.list().await.unwrap_or_default();
            return Err(Error::Domain(format!(
                "Unknown domain '{}' (available: {})",
                name,
                available.join(", ")
            )));
        }

        self.load_file(&path).await
    }

    /// Load and validate a domain file
    pub async fn load_file(&self, path: &Path) -> Result<DomainDefinition> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::Domain(format!("Failed to read domain file {}: {}", path.display(), e))
        })?;

        let definition = DomainDefinition::from_toml_str(&Config::expand_env_vars(&content))
            .map_err(|e| Error::Domain(format!("{}: {}", path.display(), e)))?;

        tracing::info!(
            domain = %definition.domain.name,
            path = %path.display(),
            supervisors = definition.supervisors.len(),
            specialists = definition.specialists.len(),
            "Loaded domain"
        );

        Ok(definition)
    }
}
