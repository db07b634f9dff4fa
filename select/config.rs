//! # Run Configuration
//!
//! A run is described by a [`RunConfig`], read from a TOML file and/or filled in
//! from command-line flags. Every field is optional at this stage; [`RunConfig::resolve`]
//! applies the defaults and checks that the values which have none are present.

use crate::reduce::Execution;
use crate::selector::DEFAULT_PROGRESS_INTERVAL;
use crate::types::DatasetPreset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Output path used when neither the file nor the flags name one.
pub const DEFAULT_OUTPUT: &str = "selected_features.txt";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    UnknownDataset(String),

    #[error("Missing required setting '{0}'.")]
    Missing(&'static str),

    #[error(
        "Dataset '{dataset}' has {expected} features, but num_features = {found} was given."
    )]
    ConflictingDimension {
        dataset: DatasetPreset,
        expected: usize,
        found: usize,
    },

    #[error("Setting '{0}' must be at least 1.")]
    NotPositive(&'static str),
}

/// Partially specified run parameters, as they appear in a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Dataset preset name, e.g. `"ads"` or `"dorothea"`.
    pub dataset: Option<String>,
    /// Explicit feature-space size; used when no preset is named.
    pub num_features: Option<usize>,
    /// Number of features to select.
    pub select: Option<usize>,
    pub partitions: Option<usize>,
    pub output: Option<PathBuf>,
    pub progress_interval: Option<usize>,
    pub execution: Option<Execution>,
}

/// Fully resolved run parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub dataset: Option<DatasetPreset>,
    pub dimension: usize,
    pub target: usize,
    pub partitions: usize,
    pub output: PathBuf,
    pub progress_interval: usize,
    pub execution: Execution,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Overlays `overrides` on top of `self`: any value set there wins.
    pub fn merge(self, overrides: RunConfig) -> Self {
        Self {
            dataset: overrides.dataset.or(self.dataset),
            num_features: overrides.num_features.or(self.num_features),
            select: overrides.select.or(self.select),
            partitions: overrides.partitions.or(self.partitions),
            output: overrides.output.or(self.output),
            progress_interval: overrides.progress_interval.or(self.progress_interval),
            execution: overrides.execution.or(self.execution),
        }
    }

    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let dataset = self
            .dataset
            .as_deref()
            .map(str::parse::<DatasetPreset>)
            .transpose()
            .map_err(ConfigError::UnknownDataset)?;

        let dimension = match (dataset, self.num_features) {
            (Some(preset), Some(found)) if found != preset.dimension() => {
                return Err(ConfigError::ConflictingDimension {
                    dataset: preset,
                    expected: preset.dimension(),
                    found,
                });
            }
            (Some(preset), _) => preset.dimension(),
            (None, Some(found)) => found,
            (None, None) => return Err(ConfigError::Missing("dataset or num_features")),
        };
        if dimension == 0 {
            return Err(ConfigError::NotPositive("num_features"));
        }

        let target = self.select.ok_or(ConfigError::Missing("select"))?;
        if target == 0 {
            return Err(ConfigError::NotPositive("select"));
        }

        let partitions = self.partitions.unwrap_or_else(num_cpus::get);
        if partitions == 0 {
            return Err(ConfigError::NotPositive("partitions"));
        }

        Ok(ResolvedConfig {
            dataset,
            dimension,
            target,
            partitions,
            output: self
                .output
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            progress_interval: self
                .progress_interval
                .unwrap_or(DEFAULT_PROGRESS_INTERVAL),
            execution: self.execution.unwrap_or_default(),
        })
    }
}
