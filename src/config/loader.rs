//! Configuration Loader
//!
//! Reads [`RelaySettings`] from environment variables, loads the YAML queue list
//! they point at, and resolves every queue into a validated [`PipelineConfig`].

use super::error::{ConfigResult, ConfigurationError};
use super::{BackendKind, ClientBackend, PipelineConfig, QueueDefinition, RelaySettings};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Keys whose environment value is a comma-separated list
const LIST_KEYS: [&str; 1] = ["metrics_buckets_latency"];

/// Queue lists larger than this are rejected before parsing
const MAX_QUEUE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Loaded relay configuration: global settings plus one resolved config per queue
#[derive(Debug, Clone)]
pub struct ConfigManager {
    settings: RelaySettings,
    pipelines: Vec<PipelineConfig>,
}

impl ConfigManager {
    /// Load settings from the process environment and the queue list they name
    pub fn load() -> ConfigResult<ConfigManager> {
        let settings = Self::settings_from_env()?;
        Self::load_with_settings(settings)
    }

    /// Load the queue list named by already-read settings
    pub fn load_with_settings(settings: RelaySettings) -> ConfigResult<ConfigManager> {
        let definitions = Self::load_queue_definitions(Path::new(&settings.queues))?;
        let pipelines = Self::resolve(&settings, &definitions)?;

        info!(
            queues_file = %settings.queues,
            pipelines = pipelines.len(),
            "Configuration loaded successfully"
        );

        Ok(ConfigManager {
            settings,
            pipelines,
        })
    }

    /// Read settings from the process environment
    pub fn settings_from_env() -> ConfigResult<RelaySettings> {
        Self::settings_from_source(None)
    }

    /// Read settings from an explicit variable map instead of the process
    /// environment. Useful for testing without modifying global state.
    pub fn settings_from_source(
        source: Option<::config::Map<String, String>>,
    ) -> ConfigResult<RelaySettings> {
        let mut environment = ::config::Environment::default()
            .try_parsing(true)
            .list_separator(",")
            .source(source);
        for key in LIST_KEYS {
            environment = environment.with_list_parse_key(key);
        }

        let settings: RelaySettings = ::config::Config::builder()
            .add_source(environment)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigurationError::environment_variable_error("environment", e))?;

        if settings.readers == 0 {
            return Err(ConfigurationError::invalid_value(
                "READERS",
                "0",
                "at least one reader is required",
            ));
        }
        if settings.metrics_buckets_latency.is_empty() {
            return Err(ConfigurationError::invalid_value(
                "METRICS_BUCKETS_LATENCY",
                "",
                "at least one bucket is required",
            ));
        }

        debug!(
            "Settings loaded: {}",
            serde_json::to_string(&settings).unwrap_or_else(|_| "[serialization error]".to_string())
        );
        Ok(settings)
    }

    /// Read and parse a YAML queue list file
    pub fn load_queue_definitions(path: &Path) -> ConfigResult<Vec<QueueDefinition>> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_QUEUE_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                format!(
                    "Queue list too large ({}MB > {}MB limit)",
                    metadata.len() / (1024 * 1024),
                    MAX_QUEUE_FILE_SIZE / (1024 * 1024)
                ),
            ));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        Self::parse_queue_definitions(&content, &path.display().to_string())
    }

    /// Parse queue definitions from YAML text; an empty document means no queues
    pub fn parse_queue_definitions(content: &str, source_name: &str) -> ConfigResult<Vec<QueueDefinition>> {
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let definitions: Option<Vec<QueueDefinition>> = serde_yaml::from_str(content)
            .map_err(|e| ConfigurationError::invalid_yaml(source_name, e))?;

        Ok(definitions.unwrap_or_default())
    }

    /// Resolve every definition against the settings defaults and validate
    pub fn resolve(
        settings: &RelaySettings,
        definitions: &[QueueDefinition],
    ) -> ConfigResult<Vec<PipelineConfig>> {
        let mut seen = HashSet::new();
        let mut pipelines = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let pipeline = Self::resolve_definition(settings, definition)?;
            if !seen.insert(pipeline.id.clone()) {
                return Err(ConfigurationError::duplicate_queue_id(&pipeline.id));
            }

            info!(
                queue_id = %pipeline.id,
                config = %serde_json::to_string(&pipeline).unwrap_or_else(|_| "[serialization error]".to_string()),
                "Queue configuration resolved"
            );
            pipelines.push(pipeline);
        }

        Ok(pipelines)
    }

    /// Resolve a single definition
    pub fn resolve_definition(
        settings: &RelaySettings,
        definition: &QueueDefinition,
    ) -> ConfigResult<PipelineConfig> {
        let backend = match definition.backend.unwrap_or(settings.backend) {
            BackendKind::Memory => ClientBackend::Memory,
            BackendKind::Pgmq => {
                let database_url = definition
                    .database_url
                    .clone()
                    .or_else(|| settings.database_url.clone())
                    .ok_or_else(|| {
                        ConfigurationError::missing_required_field(
                            "database_url",
                            format!("queue definition '{}' (pgmq backend)", definition.id),
                        )
                    })?;
                ClientBackend::Pgmq { database_url }
            }
        };

        let pipeline = PipelineConfig::with_defaults(definition, settings, backend);
        pipeline.validate()?;
        Ok(pipeline)
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn pipelines(&self) -> &[PipelineConfig] {
        &self.pipelines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn env(pairs: &[(&str, &str)]) -> Option<::config::Map<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_settings_defaults_without_environment() {
        let settings = ConfigManager::settings_from_source(env(&[])).unwrap();
        assert_eq!(settings, RelaySettings::default());
    }

    #[test]
    fn test_settings_from_environment() {
        let settings = ConfigManager::settings_from_source(env(&[
            ("QUEUES", "/etc/relay/queues.yaml"),
            ("HEALTH_ADDR", ":9999"),
            ("READERS", "3"),
            ("WRITERS", "5"),
            ("READ_ERROR_COOLDOWN", "250ms"),
            ("COPY_ATTRIBUTES", "false"),
            ("BACKEND", "memory"),
            ("METRICS_BUCKETS_LATENCY", "0.01,0.1,1"),
        ]))
        .unwrap();

        assert_eq!(settings.queues, "/etc/relay/queues.yaml");
        assert_eq!(settings.health_addr, ":9999");
        assert_eq!(settings.readers, 3);
        assert_eq!(settings.writers, 5);
        assert_eq!(settings.read_error_cooldown, Duration::from_millis(250));
        assert!(!settings.copy_attributes);
        assert_eq!(settings.backend, BackendKind::Memory);
        assert_eq!(settings.metrics_buckets_latency, vec![0.01, 0.1, 1.0]);
    }

    #[test]
    fn test_settings_reject_zero_readers() {
        let result = ConfigManager::settings_from_source(env(&[("READERS", "0")]));
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_parse_empty_queue_list() {
        assert!(ConfigManager::parse_queue_definitions("", "queues.yaml")
            .unwrap()
            .is_empty());
        assert!(ConfigManager::parse_queue_definitions("  \n", "queues.yaml")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_parse_queue_list() {
        let yaml = r#"
- id: orders
  queue: orders_queue
  topic: orders_topic
  readers: 2
  error_cooldown_read: 5s
- id: invoices
  queue: invoices_queue
  topic: invoices_topic
  copy_attributes: false
"#;
        let definitions = ConfigManager::parse_queue_definitions(yaml, "queues.yaml").unwrap();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].readers, Some(2));
        assert_eq!(definitions[0].error_cooldown_read, Some(Duration::from_secs(5)));
        assert_eq!(definitions[1].copy_attributes, Some(false));
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = ConfigManager::parse_queue_definitions("- id: [unterminated", "queues.yaml");
        assert!(matches!(result, Err(ConfigurationError::InvalidYaml { .. })));
    }

    #[test]
    fn test_resolve_rejects_duplicate_ids() {
        let settings = RelaySettings {
            backend: BackendKind::Memory,
            ..RelaySettings::default()
        };
        let definitions = vec![
            QueueDefinition::new("orders", "q1", "t1"),
            QueueDefinition::new("orders", "q2", "t2"),
        ];
        let result = ConfigManager::resolve(&settings, &definitions);
        assert!(matches!(result, Err(ConfigurationError::DuplicateQueueId { .. })));
    }

    #[test]
    fn test_resolve_rejects_missing_topic() {
        let settings = RelaySettings {
            backend: BackendKind::Memory,
            ..RelaySettings::default()
        };
        let definitions = vec![QueueDefinition::new("orders", "q1", "")];
        let result = ConfigManager::resolve(&settings, &definitions);
        assert!(matches!(
            result,
            Err(ConfigurationError::MissingRequiredField { .. })
        ));
    }

    #[test]
    fn test_resolve_pgmq_requires_database_url() {
        let definitions = vec![QueueDefinition::new("orders", "q1", "t1")];
        let result = ConfigManager::resolve(&RelaySettings::default(), &definitions);
        assert!(matches!(
            result,
            Err(ConfigurationError::MissingRequiredField { .. })
        ));

        let settings = RelaySettings {
            database_url: Some("postgresql://localhost/relay".to_string()),
            ..RelaySettings::default()
        };
        let pipelines = ConfigManager::resolve(&settings, &definitions).unwrap();
        assert_eq!(
            pipelines[0].backend,
            ClientBackend::Pgmq {
                database_url: "postgresql://localhost/relay".to_string()
            }
        );
    }

    #[test]
    fn test_definition_backend_overrides_settings() {
        let mut definition = QueueDefinition::new("orders", "q1", "t1");
        definition.backend = Some(BackendKind::Memory);

        let pipeline = ConfigManager::resolve_definition(&RelaySettings::default(), &definition).unwrap();
        assert_eq!(pipeline.backend, ClientBackend::Memory);
    }
}
