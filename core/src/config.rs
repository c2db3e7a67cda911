use crate::bm25::Bm25Params;
use crate::error::{Error, Result};
use crate::fusion::FusionStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Defaults for hybrid fusion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub alpha: f64,
    pub rrf_k: f64,
    /// Each side is asked for `limit * overfetch` candidates before fusing.
    pub overfetch: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self { alpha: 0.5, rrf_k: 60.0, overfetch: 5 }
    }
}

impl FusionConfig {
    pub fn weighted(&self) -> FusionStrategy {
        FusionStrategy::Weighted { alpha: self.alpha }
    }

    pub fn reciprocal(&self) -> FusionStrategy {
        FusionStrategy::Reciprocal { k: self.rrf_k }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub bm25: Bm25Params,
    pub fusion: FusionConfig,
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { bm25: Bm25Params::default(), fusion: FusionConfig::default(), default_limit: 5 }
    }
}

impl SearchConfig {
    /// Reads a JSON config; fields left out keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: SearchConfig =
            serde_json::from_str(&text).map_err(|source| Error::Json { path: path.to_path_buf(), source })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.bm25.validate()?;
        self.fusion.weighted().validate()?;
        self.fusion.reciprocal().validate()?;
        if self.fusion.overfetch == 0 {
            return Err(Error::InvalidParameter { name: "overfetch", reason: "must be at least 1".into() });
        }
        Ok(())
    }
}
