//! Stream configuration, deserialised from JSON.
//!
//! ```json
//! {
//!   "input": { "type": "stdin" },
//!   "buffer": { "type": "memory", "limit": 524288000 },
//!   "pipeline": { "max_in_flight": 1 },
//!   "output": {
//!     "type": "fallback",
//!     "outputs": [
//!       { "type": "http_client", "url": "http://localhost:4195/post" },
//!       { "type": "file", "path": "/var/log/undelivered.jsonl" }
//!     ]
//!   }
//! }
//! ```

use crate::error::{PipelineError, PipelineResult};
use memory_buffer::{BufferConfig, DEFAULT_LIMIT_BYTES, DEFAULT_RETRY_DELAY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Full configuration of one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub buffer: BufferSection,

    #[serde(default)]
    pub pipeline: PipelineSection,

    pub output: OutputConfig,
}

impl StreamConfig {
    pub fn from_json(json: &str) -> PipelineResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Check constraints serde cannot express.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.pipeline.max_in_flight == 0 {
            return Err(PipelineError::config("pipeline.max_in_flight must be at least 1"));
        }
        if let BufferSection::Memory { limit, .. } = self.buffer {
            if limit == 0 {
                return Err(PipelineError::config("buffer.limit must be greater than zero"));
            }
        }

        if let OutputKind::Fallback { outputs } = &self.output.kind {
            if outputs.is_empty() {
                return Err(PipelineError::config("fallback requires at least one output"));
            }
            if !self.output.processors.is_empty() {
                return Err(PipelineError::config(
                    "processors on a fallback output are not supported, set them on its outputs",
                ));
            }
            if outputs
                .iter()
                .any(|child| matches!(child.kind, OutputKind::Fallback { .. }))
            {
                return Err(PipelineError::config("fallback outputs cannot be nested"));
            }
        }
        Ok(())
    }
}

/// Where a stream reads its messages from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputConfig {
    /// Messages are only delivered through the pipeline's input handle
    #[default]
    None,
    /// One message per line of standard input
    Stdin,
    /// One message per line of a file
    File { path: PathBuf },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BufferSection {
    #[default]
    None,
    Memory {
        #[serde(default = "default_buffer_limit")]
        limit: usize,
        #[serde(default = "default_retry_delay_ms")]
        retry_delay_ms: u64,
    },
}

impl BufferSection {
    pub fn to_buffer_config(&self) -> Option<BufferConfig> {
        match self {
            BufferSection::None => None,
            BufferSection::Memory {
                limit,
                retry_delay_ms,
            } => Some(BufferConfig {
                limit: *limit,
                retry_delay: Duration::from_millis(*retry_delay_ms),
            }),
        }
    }
}

fn default_buffer_limit() -> usize {
    DEFAULT_LIMIT_BYTES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Messages routed to the output concurrently
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
        }
    }
}

fn default_max_in_flight() -> usize {
    fallback_output::DEFAULT_MAX_IN_FLIGHT
}

/// An output plus the processors applied before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Name used in logs and metrics; derived from the type when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(flatten)]
    pub kind: OutputKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processors: Vec<ProcessorConfig>,
}

impl OutputConfig {
    pub fn new(kind: OutputKind) -> Self {
        Self {
            label: None,
            kind,
            processors: Vec::new(),
        }
    }

    pub fn with_processors(mut self, processors: Vec<ProcessorConfig>) -> Self {
        self.processors = processors;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputKind {
    Fallback { outputs: Vec<OutputConfig> },
    File { path: PathBuf },
    Files { path: String },
    HttpClient(HttpClientConfig),
    Stdout,
    Drop,
    Reject {
        #[serde(default = "default_reject_reason")]
        reason: String,
    },
}

impl OutputKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            OutputKind::Fallback { .. } => "fallback",
            OutputKind::File { .. } => "file",
            OutputKind::Files { .. } => "files",
            OutputKind::HttpClient(_) => "http_client",
            OutputKind::Stdout => "stdout",
            OutputKind::Drop => "drop",
            OutputKind::Reject { .. } => "reject",
        }
    }
}

fn default_reject_reason() -> String {
    "rejected by configuration".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpClientConfig {
    pub url: String,

    #[serde(default = "default_verb")]
    pub verb: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_verb() -> String {
    "POST".to_string()
}

fn default_http_timeout_secs() -> u64 {
    5
}

/// Retry settings for a single target, applied before the router moves on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Extra attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_retry_delay_ms: default_initial_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    1000
}

fn default_max_retry_delay_ms() -> u64 {
    60000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessorConfig {
    Text {
        operator: TextOperator,
        #[serde(default)]
        value: String,
    },
    Metadata {
        operator: MetadataOperator,
        key: String,
        #[serde(default)]
        value: String,
    },
    Filter {
        value: String,
        #[serde(default)]
        invert: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOperator {
    Prepend,
    Append,
    Set,
    ToUpper,
    ToLower,
    Trim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataOperator {
    Set,
    Delete,
}

/// Load every `*.json` stream config below `dir`.
///
/// A stream's ID is its path relative to `dir`, without the extension and
/// with separators replaced by `_`: `bar/test.json` becomes `bar_test`.
pub fn load_stream_configs_from_directory(dir: &Path) -> PipelineResult<BTreeMap<String, StreamConfig>> {
    let mut configs = BTreeMap::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let id = stream_id(dir, &path)?;
            let config = StreamConfig::from_file(&path).map_err(|e| {
                PipelineError::config(format!("{}: {}", path.display(), e))
            })?;
            debug!(stream = %id, path = %path.display(), "Loaded stream config");

            if configs.insert(id.clone(), config).is_some() {
                return Err(PipelineError::config(format!("duplicate stream id '{}'", id)));
            }
        }
    }

    Ok(configs)
}

fn stream_id(root: &Path, path: &Path) -> PipelineResult<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| PipelineError::config(format!("{} is outside {}", path.display(), root.display())))?;

    let id = relative
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("_");
    Ok(id)
}
