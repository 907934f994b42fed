//! Pipeline configuration loading.
//!
//! A config file holds a [`PipelineConfig`] in YAML or JSON. Missing fields
//! take their defaults; command-line flags override whatever the file says.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use boundq::{PipelineConfig, Strategy};

/// Command-line values that override the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub capacity: Option<usize>,
    pub items: Option<usize>,
    pub producers: Option<usize>,
    pub consumers: Option<usize>,
    pub strategy: Option<Strategy>,
    pub produce_delay_ms: Option<u64>,
    pub consume_delay_ms: Option<u64>,
}

impl Overrides {
    /// Applies every set value onto `cfg`.
    pub fn apply(&self, cfg: &mut PipelineConfig) {
        if let Some(v) = self.capacity {
            cfg.capacity = v;
        }
        if let Some(v) = self.items {
            cfg.items = v;
        }
        if let Some(v) = self.producers {
            cfg.producers = v;
        }
        if let Some(v) = self.consumers {
            cfg.consumers = v;
        }
        if let Some(v) = self.strategy {
            cfg.strategy = v;
        }
        if let Some(v) = self.produce_delay_ms {
            cfg.produce_delay_ms = v;
        }
        if let Some(v) = self.consume_delay_ms {
            cfg.consume_delay_ms = v;
        }
    }
}

/// Loads a config file, choosing the format by extension.
///
/// `.json` is parsed as JSON; anything else as YAML (which also accepts
/// JSON documents).
pub fn load_file(path: &Path) -> Result<PipelineConfig> {
    let data = fs::read(path).with_context(|| format!("failed to read config {}", path.display()))?;
    parse(&data, path)
}

fn parse(data: &[u8], path: &Path) -> Result<PipelineConfig> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    let cfg = match ext.as_deref() {
        Some("json") => serde_json::from_slice(data)
            .with_context(|| format!("failed to parse JSON config {}", path.display()))?,
        _ => {
            // An empty YAML file is a null document, not an empty mapping.
            if data.iter().all(u8::is_ascii_whitespace) {
                PipelineConfig::default()
            } else {
                serde_yaml::from_slice(data)
                    .with_context(|| format!("failed to parse YAML config {}", path.display()))?
            }
        }
    };
    Ok(cfg)
}

/// Builds the effective config: defaults, then the file, then overrides.
pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> Result<PipelineConfig> {
    let mut cfg = match path {
        Some(path) => load_file(path)?,
        None => PipelineConfig::default(),
    };
    overrides.apply(&mut cfg);
    cfg.validate().context("invalid pipeline configuration")?;
    Ok(cfg)
}
