use super::Config;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_llm();
        self.apply_env_overrides_retrieval();
    }

    fn apply_env_overrides_llm(&mut self) {
        if let Ok(v) = std::env::var("SIFT_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("SIFT_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("SIFT_LLM_API_KEY")
            && !v.is_empty()
        {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("SIFT_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = (!v.is_empty()).then_some(v);
        }
        if let Ok(v) = std::env::var("SIFT_LLM_MAX_TOKENS")
            && let Ok(n) = v.parse::<u32>()
        {
            self.llm.max_tokens = n;
        }
        if let Ok(v) = std::env::var("SIFT_LLM_TEMPERATURE") {
            if let Ok(t) = v.parse::<f32>() {
                self.llm.temperature = t;
            } else {
                tracing::warn!("ignoring invalid SIFT_LLM_TEMPERATURE value: {v}");
            }
        }
        if let Ok(v) = std::env::var("SIFT_TIMEOUT_LLM")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.llm_seconds = secs;
        }
        if let Ok(v) = std::env::var("SIFT_RETRY_MAX_ATTEMPTS")
            && let Ok(n) = v.parse::<u32>()
        {
            self.retry.max_attempts = n;
        }
    }

    fn apply_env_overrides_retrieval(&mut self) {
        if let Ok(v) = std::env::var("SIFT_AGGREGATION_MAX_CHARS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.aggregation.max_chars = n;
        }
        if let Ok(v) = std::env::var("SIFT_AGGREGATION_CONCURRENCY")
            && let Ok(n) = v.parse::<usize>()
        {
            self.aggregation.concurrency = n;
        }
        if let Ok(v) = std::env::var("SIFT_INDEX_K1")
            && let Ok(k1) = v.parse::<f64>()
        {
            self.index.k1 = k1;
        }
        if let Ok(v) = std::env::var("SIFT_INDEX_B")
            && let Ok(b) = v.parse::<f64>()
        {
            self.index.b = b;
        }
        if let Ok(v) = std::env::var("SIFT_AGENT_MAX_ITERATIONS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.agent.max_iterations = n;
        }
        if let Ok(v) = std::env::var("SIFT_AGENT_CONTEXT_BUDGET_TOKENS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.agent.context_budget_tokens = n;
        }
        if let Ok(v) = std::env::var("SIFT_PLANNER_MAX_ROUNDS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.planner.max_rounds = n;
        }
        if let Ok(v) = std::env::var("SIFT_TIMEOUT_TOOL")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.tool_seconds = secs;
        }
        if let Ok(v) = std::env::var("SIFT_TIMEOUT_VECTOR")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.vector_seconds = secs;
        }
    }
}
