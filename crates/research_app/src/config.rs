//! Deployment configuration: an optional RON file, overridden by
//! environment variables and command-line flags.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use research_engine::{HttpInferenceSettings, ResearchSettings};
use research_logging::{research_info, research_warn};
use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_CONFIG_FILENAME: &str = "research.ron";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    /// Root of the evidence store (jobs, evidence, reports).
    pub evidence_path: PathBuf,
    /// Root of the ingested documents: one directory per document id.
    pub documents_path: PathBuf,
    pub inference: HttpInferenceSettings,
    pub research: ResearchSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            evidence_path: PathBuf::from("research_data"),
            documents_path: PathBuf::from("documents"),
            inference: HttpInferenceSettings::default(),
            research: ResearchSettings::default(),
        }
    }
}

/// Deployment values that may come from the environment or the command line; `None` keeps
/// the file value. Run limits travel with the job request instead.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConfigOverrides {
    pub evidence_path: Option<PathBuf>,
    pub documents_path: Option<PathBuf>,
    pub llm_endpoint: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
}

impl AppConfig {
    pub(crate) fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(path) = overrides.evidence_path {
            self.evidence_path = path;
        }
        if let Some(path) = overrides.documents_path {
            self.documents_path = path;
        }
        if let Some(endpoint) = overrides.llm_endpoint {
            self.inference.endpoint = endpoint;
        }
        if let Some(model) = overrides.llm_model {
            self.inference.model = model;
        }
        if let Some(key) = overrides.llm_api_key {
            self.inference.api_key = Some(key);
        }
    }
}

/// A missing file yields defaults. So does an unreadable or malformed one, with a warning.
pub(crate) fn load_config(path: &Path) -> AppConfig {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return AppConfig::default();
        }
        Err(err) => {
            research_warn!("Failed to read config from {:?}: {}", path, err);
            return AppConfig::default();
        }
    };

    match ron::from_str::<AppConfig>(&content) {
        Ok(config) => {
            research_info!("Loaded config from {:?}", path);
            config
        }
        Err(err) => {
            research_warn!("Failed to parse config from {:?}: {}", path, err);
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config(&dir.path().join(DEFAULT_CONFIG_FILENAME));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILENAME);
        fs::write(
            &path,
            r#"(
                evidence_path: "/var/lib/research",
                research: (batch_size: 10, call_timeout: 30.0, limits: (max_total_cost: 2.5)),
                inference: (model: "local-model"),
            )"#,
        )
        .unwrap();

        let config = load_config(&path);
        assert_eq!(config.evidence_path, PathBuf::from("/var/lib/research"));
        assert_eq!(config.documents_path, PathBuf::from("documents"));
        assert_eq!(config.research.batch_size, 10);
        assert_eq!(config.research.call_timeout, Duration::from_secs(30));
        assert_eq!(config.research.limits.max_total_cost, 2.5);
        assert_eq!(config.research.limits.max_input_tokens, 500_000);
        assert_eq!(config.inference.model, "local-model");
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILENAME);
        fs::write(&path, "(batch_size: ").unwrap();
        assert_eq!(load_config(&path), AppConfig::default());
    }

    #[test]
    fn overrides_win_over_file_values() {
        let mut config = AppConfig::default();
        config.apply(ConfigOverrides {
            evidence_path: Some(PathBuf::from("/tmp/evidence")),
            llm_api_key: Some("key".into()),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.evidence_path, PathBuf::from("/tmp/evidence"));
        assert_eq!(config.inference.api_key.as_deref(), Some("key"));
        assert_eq!(config.inference.model, "default");
    }
}
