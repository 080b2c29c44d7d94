use crate::direction::RowOrigin;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShBackendKind {
    #[default]
    Cpu,
    Gpu,
}

impl ShBackendKind {
    pub fn label(self) -> &'static str {
        match self {
            ShBackendKind::Cpu => "cpu",
            ShBackendKind::Gpu => "gpu",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cpu" => Some(ShBackendKind::Cpu),
            "gpu" => Some(ShBackendKind::Gpu),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BakeConfig {
    #[serde(default)]
    pub backend: ShBackendKind,
    /// Worker threads for the CPU backend; `None` uses the available parallelism.
    #[serde(default)]
    pub worker_threads: Option<usize>,
    #[serde(default)]
    pub row_origin: RowOrigin,
}

#[derive(Debug, Clone, Default)]
pub struct BakeConfigOverrides {
    pub backend: Option<ShBackendKind>,
    pub worker_threads: Option<usize>,
    pub row_origin: Option<RowOrigin>,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self { backend: ShBackendKind::default(), worker_threads: None, row_origin: RowOrigin::default() }
    }
}

impl BakeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
            .filter(|count| *count > 0)
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
    }

    pub fn apply_overrides(&mut self, overrides: &BakeConfigOverrides) {
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }
        if let Some(workers) = overrides.worker_threads {
            self.worker_threads = Some(workers);
        }
        if let Some(row_origin) = overrides.row_origin {
            self.row_origin = row_origin;
        }
    }
}

impl BakeConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.backend.is_none() && self.worker_threads.is_none() && self.row_origin.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.backend.is_some() {
            fields.push("backend");
        }
        if self.worker_threads.is_some() {
            fields.push("worker_threads");
        }
        if self.row_origin.is_some() {
            fields.push("row_origin");
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_fields_use_defaults() {
        let cfg: BakeConfig = serde_json::from_str(r#"{ "backend": "gpu" }"#).expect("parse");
        assert_eq!(cfg.backend, ShBackendKind::Gpu);
        assert_eq!(cfg.row_origin, RowOrigin::TopLeft);
        assert!(cfg.worker_threads.is_none());
        assert!(cfg.worker_threads() >= 1);
    }

    #[test]
    fn load_reads_row_origin_and_workers() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("bake.json");
        fs::write(&path, r#"{ "worker_threads": 3, "row_origin": "bottom_left" }"#).expect("write config");
        let cfg = BakeConfig::load(&path).expect("load config");
        assert_eq!(cfg.worker_threads(), 3);
        assert_eq!(cfg.row_origin, RowOrigin::BottomLeft);
        assert_eq!(cfg.backend, ShBackendKind::Cpu);
    }

    #[test]
    fn load_or_default_falls_back_on_bad_json() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").expect("write config");
        let cfg = BakeConfig::load_or_default(&path);
        assert_eq!(cfg.backend, ShBackendKind::Cpu);
    }

    #[test]
    fn overrides_replace_loaded_values() {
        let mut cfg = BakeConfig::default();
        let overrides = BakeConfigOverrides {
            backend: Some(ShBackendKind::Gpu),
            worker_threads: Some(1),
            row_origin: None,
        };
        cfg.apply_overrides(&overrides);
        assert_eq!(cfg.backend, ShBackendKind::Gpu);
        assert_eq!(cfg.worker_threads(), 1);
        assert_eq!(overrides.applied_fields(), vec!["backend", "worker_threads"]);
        assert!(!overrides.is_empty());
    }
}
