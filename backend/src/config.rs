use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::analysis::ProbabilityVector;
use crate::analysis::aggregator::DEFAULT_UNCERTAINTY_THRESHOLD;
use crate::inference::FallbackProfile;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub batch: BatchConfig,
    pub classification: ClassificationConfig,
    pub model: ModelConfig,
    pub fallback: FallbackConfig,
    pub verification: VerificationConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_images: usize,
    pub max_image_bytes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_images: 10,
            max_image_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub uncertainty_threshold: f32,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            uncertainty_threshold: DEFAULT_UNCERTAINTY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[default]
    Cpu,
    CudaIfAvailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub weights_dir: PathBuf,
    pub weights_file: String,
    pub device: DeviceKind,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights_dir: PathBuf::from("models"),
            weights_file: "pneumonia_resnet18.safetensors".to_string(),
            device: DeviceKind::Cpu,
        }
    }
}

impl ModelConfig {
    /// Nested location first, then the working directory root.
    pub fn weight_candidates(&self) -> Vec<PathBuf> {
        vec![
            self.weights_dir.join(&self.weights_file),
            PathBuf::from(&self.weights_file),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub profile: FallbackProfile,
    pub probabilities: Option<[f32; 3]>,
    pub delay_ms: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            profile: FallbackProfile::Primary,
            probabilities: None,
            delay_ms: 1500,
        }
    }
}

impl FallbackConfig {
    pub fn distribution(&self) -> Result<ProbabilityVector, ConfigError> {
        let values = self.profile.distribution(self.probabilities).ok_or_else(|| {
            ConfigError::Invalid("fallback.profile is custom but fallback.probabilities is missing".into())
        })?;
        ProbabilityVector::try_new(values)
            .map_err(|e| ConfigError::Invalid(format!("fallback.probabilities: {}", e)))
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub rejection_sentinel: String,
    /// Never read from the file; filled from `VERIFICATION_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 200,
            timeout_secs: 30,
            rejection_sentinel: "ERROR_NOT_XRAY".to_string(),
            api_key: None,
        }
    }
}

impl VerificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
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
            port: 8081,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl TriageConfig {
    /// Reads `TRIAGE_CONFIG`, or `config/triage.yaml` next to the workspace,
    /// then applies environment overrides. A missing default file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("TRIAGE_CONFIG").ok().map(PathBuf::from);
        let path = explicit.clone().unwrap_or_else(default_config_path);

        let mut config = if explicit.is_some() || path.exists() {
            log::info!("Loading configuration from {}", path.display());
            Self::from_file(&path)?
        } else {
            log::info!("No configuration file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&config_str)
    }

    pub fn from_yaml_str(config_str: &str) -> Result<Self, ConfigError> {
        let config: TriageConfig = serde_yaml::from_str(config_str)?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT is not a port number: {}", port)))?;
        }
        if let Some(max) = lookup("TRIAGE_MAX_IMAGES") {
            self.batch.max_images = max.parse().map_err(|_| {
                ConfigError::Invalid(format!("TRIAGE_MAX_IMAGES is not a number: {}", max))
            })?;
        }
        if let Some(key) = lookup("VERIFICATION_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.verification.api_key = Some(key);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.max_images == 0 {
            return Err(ConfigError::Invalid("batch.max_images must be at least 1".into()));
        }
        if self.batch.max_image_bytes == 0 {
            return Err(ConfigError::Invalid("batch.max_image_bytes must be positive".into()));
        }

        let threshold = self.classification.uncertainty_threshold;
        if !threshold.is_finite() || threshold <= 0.0 || threshold > 100.0 {
            return Err(ConfigError::Invalid(format!(
                "classification.uncertainty_threshold must be in (0, 100], got {}",
                threshold
            )));
        }

        self.fallback.distribution()?;

        if self.verification.enabled {
            let endpoint = Url::parse(&self.verification.endpoint).map_err(|e| {
                ConfigError::Invalid(format!("verification.endpoint: {}", e))
            })?;
            if !matches!(endpoint.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "verification.endpoint must be http(s), got {}",
                    endpoint.scheme()
                )));
            }
            if self.verification.rejection_sentinel.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "verification.rejection_sentinel must not be empty".into(),
                ));
            }
            if self.verification.timeout_secs == 0 {
                return Err(ConfigError::Invalid(
                    "verification.timeout_secs must be positive".into(),
                ));
            }
        }
        Ok(())
    }
}

fn default_config_path() -> PathBuf {
    match std::env::var("CARGO_MANIFEST_DIR") {
        Ok(manifest_dir) => PathBuf::from(format!("{}/../config/triage.yaml", manifest_dir)),
        Err(_) => PathBuf::from("config/triage.yaml"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_document_uses_defaults() {
        let config = TriageConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.batch.max_images, 10);
        assert_eq!(config.classification.uncertainty_threshold, 60.0);
        assert_eq!(config.fallback.profile, FallbackProfile::Primary);
        assert_eq!(config.fallback.delay(), Duration::from_millis(1500));
        assert!(!config.verification.enabled);
        assert_eq!(config.verification.rejection_sentinel, "ERROR_NOT_XRAY");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_sections() {
        let yaml = r#"
batch:
  max_images: 2
classification:
  uncertainty_threshold: 75.5
fallback:
  profile: alternate
  delay_ms: 0
model:
  weights_dir: weights
  device: cuda_if_available
"#;
        let config = TriageConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.batch.max_images, 2);
        assert_eq!(config.batch.max_image_bytes, 50 * 1024 * 1024);
        assert_eq!(config.classification.uncertainty_threshold, 75.5);
        assert_eq!(
            config.fallback.distribution().unwrap().values(),
            [10.5, 85.0, 4.5]
        );
        assert_eq!(config.model.device, DeviceKind::CudaIfAvailable);
        assert_eq!(
            config.model.weight_candidates(),
            vec![
                PathBuf::from("weights/pneumonia_resnet18.safetensors"),
                PathBuf::from("pneumonia_resnet18.safetensors"),
            ]
        );
    }

    #[test]
    fn custom_fallback_must_be_a_distribution() {
        let yaml = "fallback:\n  profile: custom\n  probabilities: [50.0, 20.0, 10.0]\n";
        let config = TriageConfig::from_yaml_str(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let yaml = "fallback:\n  profile: custom\n";
        let config = TriageConfig::from_yaml_str(yaml).unwrap();
        assert!(config.validate().is_err());

        let yaml = "fallback:\n  profile: custom\n  probabilities: [20.0, 70.0, 10.0]\n";
        let config = TriageConfig::from_yaml_str(yaml).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_invalid_limits() {
        let mut config = TriageConfig::default();
        config.batch.max_images = 0;
        assert!(config.validate().is_err());

        let mut config = TriageConfig::default();
        config.classification.uncertainty_threshold = 0.0;
        assert!(config.validate().is_err());
        config.classification.uncertainty_threshold = 100.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn verification_endpoint_is_checked_only_when_enabled() {
        let mut config = TriageConfig::default();
        config.verification.endpoint = "not a url".into();
        assert!(config.validate().is_ok());
        config.verification.enabled = true;
        assert!(config.validate().is_err());
        config.verification.endpoint = "ftp://example.com/v1".into();
        assert!(config.validate().is_err());
        config.verification.endpoint = "http://localhost:9000/v1/chat/completions".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PORT", "9090"),
            ("TRIAGE_MAX_IMAGES", "2"),
            ("VERIFICATION_API_KEY", "secret"),
        ]);
        let mut config = TriageConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.batch.max_images, 2);
        assert_eq!(config.verification.api_key.as_deref(), Some("secret"));
        assert_eq!(config.server.bind_address(), "0.0.0.0:9090");
    }

    #[test]
    fn bad_override_is_reported() {
        let mut config = TriageConfig::default();
        let result = config.apply_overrides(|key| (key == "PORT").then(|| "eighty".to_string()));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn unknown_profile_is_a_yaml_error() {
        let result = TriageConfig::from_yaml_str("fallback:\n  profile: random\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = TriageConfig::from_file(Path::new("/nonexistent/triage.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
