// src/config.rs - Analysis settings loaded from TOML

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use crate::central_nucleation::{default_erosion_levels, validate_erosion_levels};
use crate::errors::{FiberSightError, Result};
use crate::fiber_typing::{HybridFlags, DEFAULT_POSITIVITY_THRESHOLD};
use crate::point_analysis::DEFAULT_CANDIDATES;

/// Configuration for FiberSight
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub input_path: String,
    pub output_base_dir: String,

    /// Nearest fibers (by centroid) tested per nucleus
    #[serde(default = "default_nearest_fiber_candidates")]
    pub nearest_fiber_candidates: usize,

    /// Fractional areas removed when probing nucleus depth
    #[serde(default = "default_erosion_levels")]
    pub erosion_levels: Vec<f64>,

    /// Percent positive area a marker needs to count
    #[serde(default = "default_positivity_threshold")]
    pub positivity_threshold: f64,

    // Edge exclusion
    #[serde(default = "default_separate_touching_fibers")]
    pub separate_touching_fibers: bool,

    /// Fibers at or below this area are dropped; 0 disables the filter
    #[serde(default)]
    pub minimum_fiber_area: f64,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,

    /// Report co-expressing neighbours as hybrids
    #[serde(default)]
    pub hybrid: HybridFlags,
}

fn default_nearest_fiber_candidates() -> usize {
    DEFAULT_CANDIDATES
}

fn default_positivity_threshold() -> f64 {
    DEFAULT_POSITIVITY_THRESHOLD
}

fn default_separate_touching_fibers() -> bool {
    true
}

fn default_parallel() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            FiberSightError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| {
            FiberSightError::Config(format!("Failed to parse config file '{}': {}", path.display(), e))
        })?;

        Ok(config)
    }

    /// Create default configuration
    pub fn default() -> Self {
        Self {
            input_path: "./input".to_string(),
            output_base_dir: "./output".to_string(),
            nearest_fiber_candidates: DEFAULT_CANDIDATES,
            erosion_levels: default_erosion_levels(),
            positivity_threshold: DEFAULT_POSITIVITY_THRESHOLD,
            hybrid: HybridFlags::default(),
            separate_touching_fibers: true,
            minimum_fiber_area: 0.0,
            use_parallel: true,
        }
    }

    /// Check the analysis parameters, without touching the filesystem
    pub fn validate_parameters(&self) -> Result<()> {
        if self.nearest_fiber_candidates == 0 {
            return Err(FiberSightError::Config(
                "nearest_fiber_candidates must be > 0".to_string(),
            ));
        }

        validate_erosion_levels(&self.erosion_levels)
            .map_err(|e| FiberSightError::Config(format!("erosion_levels: {}", e)))?;

        if !(0.0..=100.0).contains(&self.positivity_threshold) {
            return Err(FiberSightError::Config(
                "positivity_threshold must be between 0.0 and 100.0".to_string(),
            ));
        }

        if self.minimum_fiber_area.is_nan() || self.minimum_fiber_area < 0.0 {
            return Err(FiberSightError::Config(
                "minimum_fiber_area must be >= 0.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate configuration and prepare the output directories
    pub fn validate(&self) -> Result<()> {
        // Check input path exists
        let input_path = PathBuf::from(&self.input_path);
        if !input_path.exists() {
            return Err(FiberSightError::InvalidPath(input_path));
        }

        self.validate_parameters()?;

        let base_dir = PathBuf::from(&self.output_base_dir);
        for sub_dir in ["Results", "Central"] {
            fs::create_dir_all(base_dir.join(sub_dir)).map_err(|e| {
                FiberSightError::Io(io::Error::new(
                    ErrorKind::Other,
                    format!("Failed to create {} output directory: {}", sub_dir, e),
                ))
            })?;
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            FiberSightError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content).map_err(FiberSightError::Io)?;

        Ok(())
    }
}
