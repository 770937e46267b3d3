use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classifier::heuristic::HeuristicThresholds;

pub const DEFAULT_CONFIG_PATH: &str = "config/service.yaml";
pub const DEFAULT_ARTIFACT_FILE: &str = "sneaker_model_production.safetensors";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub artifact: ArtifactConfig,
    pub preprocessing: PreprocessingConfig,
    pub heuristics: HeuristicThresholds,
    pub memory: MemoryConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub file_name: String,
    /// Checked in order; empty means the default candidates for `file_name`.
    pub search_paths: Vec<PathBuf>,
    pub remote_url: Option<String>,
    /// Where a remote artifact is stored; defaults to `file_name` in the working directory.
    pub download_path: Option<PathBuf>,
    pub download_buffer_bytes: usize,
    /// Longest wait for any read of the download response.
    pub download_read_timeout_secs: u64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_ARTIFACT_FILE.to_string(),
            search_paths: Vec::new(),
            remote_url: None,
            download_path: None,
            download_buffer_bytes: 8192,
            download_read_timeout_secs: 60,
        }
    }
}

impl ArtifactConfig {
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let name = self.file_name.as_str();
        vec![
            PathBuf::from(name),
            Path::new("/opt/render/project/src").join(name),
            Path::new("/app").join(name),
            Path::new("..").join(name),
        ]
    }

    pub fn resolved_download_path(&self) -> PathBuf {
        self.download_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.file_name))
    }
}

/// Input geometry and per-channel normalization the classifier was trained with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    pub input_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            input_size: 224,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub ceiling_mb: f64,
    pub critical_mb: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            ceiling_mb: 400.0,
            critical_mb: 450.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 50 * 1024 * 1024,
        }
    }
}

impl ServiceConfig {
    /// Reads the YAML file named by `SERVICE_CONFIG` (or the default path when
    /// it exists), then applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("SERVICE_CONFIG").ok().map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(url) = lookup("MODEL_URL").filter(|url| !url.trim().is_empty()) {
            self.artifact.remote_url = Some(url.trim().to_string());
        }
        if let Some(file_name) = lookup("MODEL_FILE") {
            self.artifact.file_name = file_name;
        }
        if let Some(paths) = lookup("MODEL_SEARCH_PATHS") {
            self.artifact.search_paths = paths
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(path) = lookup("MODEL_DOWNLOAD_PATH") {
            self.artifact.download_path = Some(PathBuf::from(path));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_resnet_preprocessing() {
        let config = ServiceConfig::default();
        assert_eq!(config.preprocessing.input_size, 224);
        assert_eq!(config.preprocessing.mean, [0.485, 0.456, 0.406]);
        assert_eq!(config.memory.ceiling_mb, 400.0);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = r#"
server:
  port: 9100
artifact:
  remote_url: "https://example.com/model.safetensors"
heuristics:
  contrast_min: 25.0
"#;
        let config = ServiceConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(
            config.artifact.remote_url.as_deref(),
            Some("https://example.com/model.safetensors")
        );
        assert_eq!(config.heuristics.contrast_min, 25.0);
        assert_eq!(config.heuristics.brightness_min, 50.0);
        assert_eq!(config.artifact.file_name, DEFAULT_ARTIFACT_FILE);
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8081"),
            ("MODEL_URL", "https://example.com/weights"),
            ("MODEL_SEARCH_PATHS", "a.safetensors, /models/b.safetensors,"),
        ]
        .into_iter()
        .collect();

        let mut config = ServiceConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 8081);
        assert_eq!(
            config.artifact.remote_url.as_deref(),
            Some("https://example.com/weights")
        );
        assert_eq!(
            config.artifact.candidate_paths(),
            vec![
                PathBuf::from("a.safetensors"),
                PathBuf::from("/models/b.safetensors")
            ]
        );
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut config = ServiceConfig::default();
        let err = config
            .apply_overrides(|key| (key == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn shipped_config_file_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/service.yaml");
        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.heuristics, HeuristicThresholds::default());
        assert_eq!(config.upload.max_bytes, UploadConfig::default().max_bytes);
        assert!(config.artifact.remote_url.is_none());
        assert_eq!(config.artifact.download_read_timeout_secs, 60);
    }

    #[test]
    fn default_candidates_start_in_working_directory() {
        let config = ArtifactConfig::default();
        let candidates = config.candidate_paths();
        assert_eq!(candidates[0], PathBuf::from(DEFAULT_ARTIFACT_FILE));
        assert_eq!(candidates.last(), Some(&Path::new("..").join(DEFAULT_ARTIFACT_FILE)));
        assert_eq!(config.resolved_download_path(), PathBuf::from(DEFAULT_ARTIFACT_FILE));
    }
}
