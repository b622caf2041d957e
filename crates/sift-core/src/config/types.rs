use serde::Deserialize;
use sift_corpus::AggregationConfig;
use sift_index::Bm25Params;
use sift_llm::RetryPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub index: Bm25Params,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".into()
}

fn default_model() -> String {
    "qwen2.5:7b-instruct".into()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.2
}

/// OpenAI-compatible endpoint used for summarization, planning and reasoning.
#[derive(Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Usually supplied through `SIFT_LLM_API_KEY` rather than the file.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Enables the in-memory vector index when set.
    #[serde(default)]
    pub embedding_model: Option<String>,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            embedding_model: None,
        }
    }
}

fn default_max_iterations() -> usize {
    8
}

fn default_context_budget_tokens() -> usize {
    6_000
}

fn default_history_window() -> usize {
    6
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on reasoning calls per question.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Token allocation for retrieved context in the reasoning prompt.
    #[serde(default = "default_context_budget_tokens")]
    pub context_budget_tokens: usize,
    /// Number of most recent tool calls shown to the reasoning step.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            context_budget_tokens: default_context_budget_tokens(),
            history_window: default_history_window(),
        }
    }
}

fn default_max_rounds() -> usize {
    3
}

fn default_fallback_groups() -> usize {
    3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Groups fetched by the heuristic fallback.
    #[serde(default = "default_fallback_groups")]
    pub fallback_groups: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            fallback_groups: default_fallback_groups(),
        }
    }
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_tool_timeout() -> u64 {
    30
}

fn default_vector_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_llm_timeout")]
    pub llm_seconds: u64,
    #[serde(default = "default_tool_timeout")]
    pub tool_seconds: u64,
    #[serde(default = "default_vector_timeout")]
    pub vector_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_seconds: default_llm_timeout(),
            tool_seconds: default_tool_timeout(),
            vector_seconds: default_vector_timeout(),
        }
    }
}
