use std::collections::HashMap;

use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Connection settings for the external code-execution service.
#[derive(Debug, Deserialize, Clone)]
pub struct JudgeClientConfig {
    /// Whether submissions are sent to the judge. Default: true.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Base URL of a Judge0-compatible API. Default: "http://localhost:2358".
    #[serde(default = "default_url")]
    pub url: String,
    /// Sent as `X-Auth-Token` / `X-RapidAPI-Key` when present.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sent as `X-RapidAPI-Host` when present.
    #[serde(default)]
    pub api_host: Option<String>,
    /// Per-request timeout in seconds. Default: 10.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry policy for creating the batch.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Delay between result polls in milliseconds. Default: 500.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Polls before giving up on a batch. Default: 40.
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    /// Most cases sent in one batch request. Default: 20.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Largest CPU time limit the judge accepts, in milliseconds. Default: 15000.
    #[serde(default = "default_max_cpu_time_ms")]
    pub max_cpu_time_ms: u32,
    /// Smallest memory limit the judge accepts, in kilobytes. Default: 2048.
    #[serde(default = "default_min_memory_kb")]
    pub min_memory_kb: i32,
    /// Largest memory limit the judge accepts, in kilobytes. Default: 512000.
    #[serde(default = "default_max_memory_kb")]
    pub max_memory_kb: i32,
    /// API language key -> judge language id.
    #[serde(default = "default_languages")]
    pub languages: HashMap<String, i32>,
}

fn default_enabled() -> bool {
    true
}
fn default_url() -> String {
    "http://localhost:2358".into()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_max_polls() -> u32 {
    40
}
fn default_max_batch_size() -> usize {
    20
}
fn default_max_cpu_time_ms() -> u32 {
    15_000
}
fn default_min_memory_kb() -> i32 {
    2048
}
fn default_max_memory_kb() -> i32 {
    512_000
}
fn default_languages() -> HashMap<String, i32> {
    HashMap::from([
        ("c".to_string(), 50),
        ("cpp".to_string(), 54),
        ("java".to_string(), 62),
        ("javascript".to_string(), 63),
        ("python".to_string(), 71),
        ("rust".to_string(), 73),
        ("go".to_string(), 60),
    ])
}

impl Default for JudgeClientConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            url: default_url(),
            api_key: None,
            api_host: None,
            timeout_secs: default_timeout_secs(),
            retry: RetryPolicy::default(),
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
            max_batch_size: default_max_batch_size(),
            max_cpu_time_ms: default_max_cpu_time_ms(),
            min_memory_kb: default_min_memory_kb(),
            max_memory_kb: default_max_memory_kb(),
            languages: default_languages(),
        }
    }
}

impl JudgeClientConfig {
    pub fn language_id(&self, language: &str) -> Option<i32> {
        self.languages.get(language).copied()
    }

    /// CPU time limit in seconds, clamped to what the judge accepts.
    pub fn cpu_time_limit_secs(&self, time_limit_ms: i32) -> f64 {
        let cap = i32::try_from(self.max_cpu_time_ms).unwrap_or(i32::MAX);
        f64::from(time_limit_ms.clamp(1, cap.max(1))) / 1000.0
    }

    /// Memory limit in kilobytes, clamped to what the judge accepts.
    pub fn memory_limit_kb(&self, memory_limit_kb: i32) -> i32 {
        memory_limit_kb.clamp(self.min_memory_kb, self.max_memory_kb.max(self.min_memory_kb))
    }

    /// Supported language keys, sorted.
    pub fn language_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.languages.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}
