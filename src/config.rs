//! ### Config
//! Run configuration, read from a TOML file.

use crate::{
    error::{AnalysisError, Result},
    horizon::Horizons,
    score::Cadence,
};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct CommunityConfig {
    pub name: String,
    /// `start,end` table of the community's alerts, in local time.
    pub alerts: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_interval")]
    pub sample_interval_minutes: u32,
    #[serde(default = "default_horizons")]
    pub horizons_hours: Vec<u32>,
    pub manifest: PathBuf,
    #[serde(rename = "community")]
    pub communities: Vec<CommunityConfig>,
}

fn default_timezone() -> String {
    "Europe/Brussels".to_owned()
}

fn default_interval() -> u32 {
    15
}

fn default_horizons() -> Vec<u32> {
    vec![3, 6, 12]
}

impl AnalysisConfig {
    /// Reads, validates and resolves relative paths against the file's
    /// directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if self.manifest.is_relative() {
            self.manifest = base.join(&self.manifest);
        }
        for community in &mut self.communities {
            if community.alerts.is_relative() {
                community.alerts = base.join(&community.alerts);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.tz()?;
        self.cadence()?;
        let horizons = self.horizons()?;
        if horizons.count() == 0 {
            return Err(AnalysisError::config("at least one horizon is required"));
        }
        if self.communities.is_empty() {
            return Err(AnalysisError::config("no community configured"));
        }
        for (idx, community) in self.communities.iter().enumerate() {
            if self.communities[..idx]
                .iter()
                .any(|other| other.name == community.name)
            {
                return Err(AnalysisError::config(format!(
                    "community {} configured twice",
                    community.name
                )));
            }
        }
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| AnalysisError::config(format!("timezone {}: {e}", self.timezone)))
    }

    pub fn cadence(&self) -> Result<Cadence> {
        Cadence::from_minutes(self.sample_interval_minutes)
    }

    pub fn horizons(&self) -> Result<Horizons> {
        Horizons::from_hours(&self.horizons_hours)
    }
}
