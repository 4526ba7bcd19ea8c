//! Configuration schema for Snaplog.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root config for the diary pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SnaplogConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub timeline: TimelineConfig,
}

impl SnaplogConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> SnaplogConfigBuilder {
        SnaplogConfigBuilder::new()
    }

    /// Validate configuration invariants that cannot be expressed in serde.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let generation = &self.generation;
        if generation.base_url.trim().is_empty() {
            return Err(ConfigError::field("generation.base_url", "must not be empty"));
        }
        for (path, model) in [
            ("generation.vision_model", &generation.vision_model),
            ("generation.text_model", &generation.text_model),
        ] {
            if model.trim().is_empty() {
                return Err(ConfigError::field(path, "must not be empty"));
            }
        }
        if generation.max_tokens == 0 {
            return Err(ConfigError::field("generation.max_tokens", "must be positive"));
        }
        for (path, value) in generation.temperatures.entries() {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::field(path, "must be within [0, 2]"));
            }
        }
        if let Some(top_p) = generation.draft_top_p
            && !(top_p > 0.0 && top_p <= 1.0)
        {
            return Err(ConfigError::field(
                "generation.draft_top_p",
                "must be within (0, 1]",
            ));
        }

        let throttle = &self.throttle;
        if throttle.min_interval_ms == 0 {
            return Err(ConfigError::field(
                "throttle.min_interval_ms",
                "must be positive",
            ));
        }
        if throttle.max_wait_ms < throttle.min_interval_ms {
            return Err(ConfigError::field(
                "throttle.max_wait_ms",
                "must be at least throttle.min_interval_ms",
            ));
        }
        if throttle.backoff_cap_multiplier == 0 {
            return Err(ConfigError::field(
                "throttle.backoff_cap_multiplier",
                "must be at least 1",
            ));
        }

        let pipeline = &self.pipeline;
        if pipeline.max_images == 0 {
            return Err(ConfigError::field("pipeline.max_images", "must be positive"));
        }
        let min_score = pipeline.cross_validation.min_score;
        if !(0.0..=1.0).contains(&min_score) {
            return Err(ConfigError::field(
                "pipeline.cross_validation.min_score",
                "must be within [0, 1]",
            ));
        }

        if self.timeline.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::field(
                "timeline.utc_offset_minutes",
                "must be within one day of UTC",
            ));
        }

        Ok(())
    }
}

/// Builder for assembling a `SnaplogConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct SnaplogConfigBuilder {
    config: SnaplogConfig,
}

impl SnaplogConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: SnaplogConfig::default(),
        }
    }

    /// Replace the generation service configuration.
    pub fn generation(mut self, generation: GenerationConfig) -> Self {
        self.config.generation = generation;
        self
    }

    /// Replace the throttle configuration.
    pub fn throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.config.throttle = throttle;
        self
    }

    /// Replace the pipeline policy configuration.
    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.config.pipeline = pipeline;
        self
    }

    /// Replace the timeline configuration.
    pub fn timeline(mut self, timeline: TimelineConfig) -> Self {
        self.config.timeline = timeline;
        self
    }

    /// Finalize and return the built `SnaplogConfig`.
    pub fn build(self) -> SnaplogConfig {
        self.config
    }
}

/// Endpoint, models and sampling for the generation service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_model")]
    pub vision_model: String,
    #[serde(default = "default_model")]
    pub text_model: String,
    /// Second model used for cross-validation; disabled when unset.
    #[serde(default = "default_alt_text_model")]
    pub alt_text_model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperatures: TemperatureConfig,
    #[serde(default = "default_draft_top_p")]
    pub draft_top_p: Option<f32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            vision_model: default_model(),
            text_model: default_model(),
            alt_text_model: default_alt_text_model(),
            max_tokens: default_max_tokens(),
            temperatures: TemperatureConfig::default(),
            draft_top_p: default_draft_top_p(),
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Alternate model, only when it is set and differs from the primary.
    pub fn distinct_alt_model(&self) -> Option<&str> {
        self.alt_text_model
            .as_deref()
            .map(str::trim)
            .filter(|alt| !alt.is_empty() && *alt != self.text_model)
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_alt_text_model() -> Option<String> {
    Some("gpt-4o".to_string())
}

fn default_max_tokens() -> u32 {
    700
}

fn default_draft_top_p() -> Option<f32> {
    Some(0.8)
}

/// Sampling temperature per pipeline stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TemperatureConfig {
    #[serde(default = "default_observation_temperature")]
    pub observation: f32,
    #[serde(default = "default_draft_temperature")]
    pub draft: f32,
    #[serde(default = "default_refine_temperature")]
    pub refine: f32,
    #[serde(default = "default_summary_lines_temperature")]
    pub summary_lines: f32,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            observation: default_observation_temperature(),
            draft: default_draft_temperature(),
            refine: default_refine_temperature(),
            summary_lines: default_summary_lines_temperature(),
        }
    }
}

impl TemperatureConfig {
    fn entries(&self) -> [(&'static str, f32); 4] {
        [
            ("generation.temperatures.observation", self.observation),
            ("generation.temperatures.draft", self.draft),
            ("generation.temperatures.refine", self.refine),
            ("generation.temperatures.summary_lines", self.summary_lines),
        ]
    }
}

fn default_observation_temperature() -> f32 {
    0.0
}

fn default_draft_temperature() -> f32 {
    0.15
}

fn default_refine_temperature() -> f32 {
    0.15
}

fn default_summary_lines_temperature() -> f32 {
    0.35
}

/// Pacing and retry budget for calls to the generation service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThrottleConfig {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    /// Backoff ceiling as a multiple of the minimum interval.
    #[serde(default = "default_backoff_cap_multiplier")]
    pub backoff_cap_multiplier: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            max_wait_ms: default_max_wait_ms(),
            backoff_cap_multiplier: default_backoff_cap_multiplier(),
        }
    }
}

impl ThrottleConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        self.min_interval() * self.backoff_cap_multiplier.max(1)
    }
}

fn default_min_interval_ms() -> u64 {
    500
}

fn default_max_wait_ms() -> u64 {
    30_000
}

fn default_backoff_cap_multiplier() -> u32 {
    16
}

/// Stage policy for the diary pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Photos beyond this count are ignored.
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    #[serde(default = "default_tone")]
    pub default_tone: String,
    #[serde(default)]
    pub cross_validation: CrossValidationConfig,
    #[serde(default)]
    pub refine: RefineConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_images: default_max_images(),
            default_tone: default_tone(),
            cross_validation: CrossValidationConfig::default(),
            refine: RefineConfig::default(),
        }
    }
}

fn default_max_images() -> usize {
    10
}

fn default_tone() -> String {
    "neutral".to_string()
}

/// When to run a second model over the same draft inputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrossValidationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum heuristic score in `[0, 1]` for the alternate call to run.
    #[serde(default)]
    pub min_score: f32,
    /// Keywords counted by the heuristic score.
    #[serde(default = "default_cross_validation_keywords")]
    pub keywords: Vec<String>,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_score: 0.0,
            keywords: default_cross_validation_keywords(),
        }
    }
}

fn default_cross_validation_keywords() -> Vec<String> {
    [
        "cafe",
        "coffee",
        "restaurant",
        "meal",
        "lunch",
        "dinner",
        "dessert",
        "street",
        "park",
        "station",
        "sign",
        "menu",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Final stylistic rewrite policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefineConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Stitched drafts shorter than this skip the rewrite.
    #[serde(default = "default_refine_min_chars")]
    pub min_chars: usize,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_chars: default_refine_min_chars(),
        }
    }
}

fn default_refine_min_chars() -> usize {
    40
}

/// How zone-less timestamps are interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TimelineConfig {
    /// Reference offset from UTC in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn default_true() -> bool {
    true
}
