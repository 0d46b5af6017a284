//! Configuration for the benchmark harness.
//!
//! Supports both environment variables and a YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{BenchError, Result};
use crate::metrics::AnswerSimilarity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the QnA API token.
pub const TOKEN_ENV: &str = "DATAWORKZ_API_TOKEN";
/// Environment variable holding the QnA service base URL.
pub const SERVICE_URL_ENV: &str = "DATAWORKZ_SERVICE_URL";
/// Environment variable holding the default LLM provider id.
pub const LLM_PROVIDER_ENV: &str = "RAG_BENCH_LLM_PROVIDER_ID";
/// Environment variable overriding run concurrency.
pub const CONCURRENCY_ENV: &str = "RAG_BENCH_CONCURRENCY";

/// Connection settings for the QnA service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the QnA service (e.g., "https://acme.dataworkz.com")
    pub service_url: String,

    /// API token sent in the Authorization header
    pub api_token: String,

    /// Authorization scheme placed before the token
    pub auth_scheme: String,

    /// Timeout for a single HTTP request, in seconds
    pub request_timeout_secs: u64,

    /// Retries after a transport failure
    pub max_retries: u32,

    /// Pause between retries, in seconds
    pub retry_delay_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_url: String::new(),
            api_token: String::new(),
            auth_scheme: "SSWS".to_string(),
            request_timeout_secs: 2400,
            max_retries: 15,
            retry_delay_secs: 10,
        }
    }
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Settings for a single benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of (row, pipeline) pairs in flight at once
    pub concurrency: usize,

    /// Minimum gap between the start of two pipeline calls, in milliseconds
    pub throttle_ms: u64,

    /// Upper bound for one pair including client retries, in seconds
    pub call_timeout_secs: u64,

    /// Only evaluate the first N rows
    pub limit: Option<usize>,

    /// LLM provider used by pipelines that do not name their own
    pub llm_provider_id: Option<String>,

    /// Which similarity feeds the headline answer-correctness score
    pub answer_similarity: AnswerSimilarity,

    /// ROUGE-L score at which a retrieved passage counts as relevant
    pub chunk_match_threshold: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            throttle_ms: 0,
            call_timeout_secs: 3 * 3600,
            limit: None,
            llm_provider_id: None,
            answer_similarity: AnswerSimilarity::default(),
            chunk_match_threshold: 0.7,
        }
    }
}

impl RunConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// One QA pipeline under comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Display name used in result tables
    pub name: String,

    /// QnA system id of the pipeline
    pub pipeline_id: String,

    /// LLM provider id; empty means "use the run default"
    #[serde(default)]
    pub llm_provider_id: String,
}

impl PipelineSpec {
    pub fn new(
        name: impl Into<String>,
        pipeline_id: impl Into<String>,
        llm_provider_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pipeline_id: pipeline_id.into(),
            llm_provider_id: llm_provider_id.into(),
        }
    }
}

/// How dataset rows are assigned to pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RoutingPolicy {
    /// Every row goes to every configured pipeline.
    #[default]
    All,
    /// Rows go to the pipelines listed for their `source`; unlisted sources go nowhere.
    BySource(BTreeMap<String, Vec<String>>),
}

impl RoutingPolicy {
    /// Pipelines a row with this source is sent to.
    pub fn route<'a>(&self, source: &str, pipelines: &'a [PipelineSpec]) -> Vec<&'a PipelineSpec> {
        self.route_slots(source, pipelines)
            .into_iter()
            .map(|slot| &pipelines[slot])
            .collect()
    }

    /// Positions in `pipelines` of the pipelines a row with this source is sent to.
    pub fn route_slots(&self, source: &str, pipelines: &[PipelineSpec]) -> Vec<usize> {
        let names = match self {
            RoutingPolicy::All => return (0..pipelines.len()).collect(),
            RoutingPolicy::BySource(routes) => match routes.get(source) {
                Some(names) => names,
                None => return Vec::new(),
            },
        };
        pipelines
            .iter()
            .enumerate()
            .filter(|(_, p)| names.iter().any(|n| n == &p.name))
            .map(|(slot, _)| slot)
            .collect()
    }

    /// Check that every route names a configured pipeline.
    pub fn validate(&self, pipelines: &[PipelineSpec]) -> Result<()> {
        if let RoutingPolicy::BySource(routes) = self {
            for (source, names) in routes {
                for name in names {
                    if !pipelines.iter().any(|p| &p.name == name) {
                        return Err(BenchError::Config(format!(
                            "Route for source '{}' names unknown pipeline '{}'",
                            source, name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// QnA service settings
    pub service: ServiceConfig,

    /// Run settings
    pub run: RunConfig,

    /// Pipelines under comparison
    pub pipelines: Vec<PipelineSpec>,

    /// Optional source -> pipeline names routing table
    pub routes: Option<BTreeMap<String, Vec<String>>>,
}

impl Config {
    /// Load configuration from environment variables and the default config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (DATAWORKZ_API_TOKEN, DATAWORKZ_SERVICE_URL, ...)
    /// 2. Config file (~/.config/rag-bench/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Same as [`Config::load`], reading an explicit file when given.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::config_file_path() {
                Some(default_path) if default_path.exists() => {
                    Self::load_from_file(&default_path)?
                }
                _ => Config::default(),
            },
        };

        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| BenchError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Override values from an environment lookup.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(TOKEN_ENV) {
            self.service.api_token = token;
        }

        if let Some(url) = lookup(SERVICE_URL_ENV) {
            self.service.service_url = url;
        }

        if let Some(provider) = lookup(LLM_PROVIDER_ENV) {
            self.run.llm_provider_id = Some(provider);
        }

        if let Some(concurrency) = lookup(CONCURRENCY_ENV) {
            if let Ok(n) = concurrency.parse() {
                self.run.concurrency = n;
            }
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-bench")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that the service credentials are present.
    pub fn validate_service(&self) -> Result<()> {
        if self.service.service_url.trim().is_empty() {
            return Err(BenchError::Config(format!(
                "QnA service URL is required. Set {} or add service.service_url to the config file.",
                SERVICE_URL_ENV
            )));
        }

        if self.service.api_token.trim().is_empty() {
            return Err(BenchError::Config(format!(
                "QnA API token is required. Set {} or add service.api_token to the config file.",
                TOKEN_ENV
            )));
        }

        Ok(())
    }

    /// Validate everything a benchmark run needs.
    pub fn validate(&self) -> Result<()> {
        self.validate_service()?;

        if self.run.concurrency == 0 {
            return Err(BenchError::Config("run.concurrency must be at least 1".to_string()));
        }

        if !(0.0..=1.0).contains(&self.run.chunk_match_threshold) {
            return Err(BenchError::Config(
                "run.chunk_match_threshold must be within [0, 1]".to_string(),
            ));
        }

        let pipelines = self.resolved_pipelines()?;
        self.routing().validate(&pipelines)
    }

    /// Pipelines with the run-wide LLM provider filled in.
    pub fn resolved_pipelines(&self) -> Result<Vec<PipelineSpec>> {
        if self.pipelines.is_empty() {
            return Err(BenchError::Config(
                "At least one pipeline must be configured under `pipelines`".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(self.pipelines.len());

        for pipeline in &self.pipelines {
            if pipeline.name.trim().is_empty() {
                return Err(BenchError::Config("Pipeline name must not be empty".to_string()));
            }
            if !seen.insert(pipeline.name.as_str()) {
                return Err(BenchError::Config(format!(
                    "Duplicate pipeline name '{}'",
                    pipeline.name
                )));
            }
            if pipeline.pipeline_id.trim().is_empty() {
                return Err(BenchError::Config(format!(
                    "Pipeline '{}' has no pipeline_id",
                    pipeline.name
                )));
            }

            let mut pipeline = pipeline.clone();
            if pipeline.llm_provider_id.trim().is_empty() {
                match &self.run.llm_provider_id {
                    Some(default) if !default.trim().is_empty() => {
                        pipeline.llm_provider_id = default.clone();
                    }
                    _ => {
                        return Err(BenchError::Config(format!(
                            "Pipeline '{}' has no llm_provider_id and no run.llm_provider_id (or {}) is set",
                            pipeline.name, LLM_PROVIDER_ENV
                        )));
                    }
                }
            }
            resolved.push(pipeline);
        }

        Ok(resolved)
    }

    /// Routing policy described by the `routes` table.
    pub fn routing(&self) -> RoutingPolicy {
        match &self.routes {
            Some(routes) => RoutingPolicy::BySource(routes.clone()),
            None => RoutingPolicy::All,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE_YAML: &str = r#"
service:
  service_url: https://qna.example.com
  api_token: secret
run:
  llm_provider_id: provider-1
  throttle_ms: 5000
pipelines:
  - name: maud_qna_v1
    pipeline_id: 04d1b00f
  - name: maud_qna_rerank
    pipeline_id: fc0f4993
    llm_provider_id: provider-2
routes:
  maud: [maud_qna_v1, maud_qna_rerank]
"#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.service.service_url.is_empty());
        assert!(config.service.api_token.is_empty());
        assert_eq!(config.service.auth_scheme, "SSWS");
        assert_eq!(config.service.max_retries, 15);
        assert_eq!(config.run.concurrency, 1);
        assert_eq!(config.run.chunk_match_threshold, 0.7);
        assert_eq!(config.routing(), RoutingPolicy::All);
    }

    #[test]
    fn test_validate_fails_without_required_fields() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(BenchError::Config(_))));

        let mut config = Config::default();
        config.service.service_url = "https://qna.example.com".to_string();
        config.service.api_token = "token".to_string();
        // No pipelines configured.
        assert!(matches!(config.validate(), Err(BenchError::Config(_))));
    }

    #[test]
    fn test_parse_yaml_and_resolve_providers() {
        let config = Config::from_yaml(SAMPLE_YAML).unwrap();
        config.validate().unwrap();

        let pipelines = config.resolved_pipelines().unwrap();
        assert_eq!(pipelines[0].llm_provider_id, "provider-1");
        assert_eq!(pipelines[1].llm_provider_id, "provider-2");
        assert_eq!(config.run.throttle().as_millis(), 5000);
    }

    #[test]
    fn test_missing_provider_is_config_error() {
        let mut config = Config::from_yaml(SAMPLE_YAML).unwrap();
        config.run.llm_provider_id = None;
        let err = config.resolved_pipelines().unwrap_err();
        assert!(err.to_string().contains("maud_qna_v1"));
    }

    #[test]
    fn test_duplicate_pipeline_names_rejected() {
        let mut config = Config::from_yaml(SAMPLE_YAML).unwrap();
        config.pipelines[1].name = "maud_qna_v1".to_string();
        assert!(config.resolved_pipelines().is_err());
    }

    #[test]
    fn test_unknown_route_target_rejected() {
        let mut config = Config::from_yaml(SAMPLE_YAML).unwrap();
        config
            .routes
            .as_mut()
            .unwrap()
            .insert("cuad".to_string(), vec!["cuad_qna_v2".to_string()]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cuad_qna_v2"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::from_yaml(SAMPLE_YAML).unwrap();
        let vars: HashMap<&str, &str> = [
            (TOKEN_ENV, "env-token"),
            (SERVICE_URL_ENV, "https://env.example.com"),
            (CONCURRENCY_ENV, "4"),
        ]
        .into_iter()
        .collect();

        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.service.api_token, "env-token");
        assert_eq!(config.service.service_url, "https://env.example.com");
        assert_eq!(config.run.concurrency, 4);
        assert_eq!(config.run.llm_provider_id.as_deref(), Some("provider-1"));
    }

    #[test]
    fn test_routing_by_source() {
        let config = Config::from_yaml(SAMPLE_YAML).unwrap();
        let pipelines = config.resolved_pipelines().unwrap();
        let routing = config.routing();

        assert_eq!(routing.route("maud", &pipelines).len(), 2);
        assert!(routing.route("cuad", &pipelines).is_empty());
        assert_eq!(RoutingPolicy::All.route("anything", &pipelines).len(), 2);
    }

    #[test]
    fn test_route_slots_follow_pipeline_order() {
        let pipelines = vec![
            PipelineSpec::new("a", "id-a", "p"),
            PipelineSpec::new("b", "id-b", "p"),
            PipelineSpec::new("c", "id-c", "p"),
        ];
        let routes = [("s".to_string(), vec!["c".to_string(), "b".to_string()])]
            .into_iter()
            .collect();
        let routing = RoutingPolicy::BySource(routes);

        assert_eq!(routing.route_slots("s", &pipelines), vec![1, 2]);
        assert!(routing.route_slots("other", &pipelines).is_empty());
        assert_eq!(RoutingPolicy::All.route_slots("s", &pipelines), vec![0, 1, 2]);
    }
}
