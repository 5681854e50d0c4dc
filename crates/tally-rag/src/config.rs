use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    pub services: ServiceConfig,
    pub timeouts: TimeoutConfig,
    pub generation: GenerationConfig,
    pub scan: ScanConfig,
    pub search: SearchConfig,
    pub labels: StatementLabels,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Ollama base URL, used for both embeddings and generation.
    pub ollama_url: String,
    /// Qdrant REST base URL.
    pub qdrant_url: String,
    pub embed_model: String,
    pub gen_model: String,
    pub collection: String,
}

/// Per-service request timeouts, in seconds. Every outbound call is bounded by one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    pub embed_secs: u64,
    pub vector_store_secs: u64,
    pub generation_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    /// Maximum tokens to generate (Ollama `num_predict`).
    pub num_predict: usize,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_top_k: usize,
    /// Hits whose display text shares this many leading characters are duplicates.
    pub dedupe_prefix_chars: usize,
    /// Payload field holding the synthesized free-text blob.
    pub text_field: String,
    /// Sentence the generator must use when CONTEXT does not hold the answer.
    pub not_found_reply: String,
}

/// Wording of the numeric statement placed at the head of aggregation answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementLabels {
    pub value: String,
    pub entity: String,
    pub entities: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub history_turns: usize,
    pub preamble: String,
}

impl TallyConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        for (name, url) in [
            ("services.ollama_url", &self.services.ollama_url),
            ("services.qdrant_url", &self.services.qdrant_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("{} must be an http(s) URL, got '{}'", name, url));
            }
        }
        if self.services.collection.trim().is_empty() {
            return Err("services.collection must not be empty".into());
        }
        if self.services.embed_model.trim().is_empty()
            || self.services.gen_model.trim().is_empty()
        {
            return Err("services.embed_model and services.gen_model must not be empty".into());
        }
        if self.timeouts.embed_secs == 0
            || self.timeouts.vector_store_secs == 0
            || self.timeouts.generation_secs == 0
            || self.timeouts.connect_secs == 0
        {
            return Err("timeouts must all be > 0".into());
        }
        if self.scan.batch_size == 0 {
            return Err("scan.batch_size must be > 0".into());
        }
        if self.search.default_top_k == 0 {
            return Err("search.default_top_k must be > 0".into());
        }
        if self.search.dedupe_prefix_chars == 0 {
            return Err("search.dedupe_prefix_chars must be > 0".into());
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err("generation.temperature must be in [0.0, 2.0]".into());
        }
        if !(0.0..=1.0).contains(&self.generation.top_p) {
            return Err("generation.top_p must be in [0.0, 1.0]".into());
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.normalize();
        Ok(config)
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration the way the server does at startup:
    /// `TALLY_CONFIG` file, else `<config_dir>/tally-rag/config.json` if present,
    /// else defaults; environment overrides apply last.
    pub fn load() -> Result<Self, String> {
        let path = std::env::var("TALLY_CONFIG")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Self::default_path().filter(|p| p.exists()));
        Self::load_from(path.as_deref(), |key| std::env::var(key).ok())
    }

    /// File (if any), then overrides, then a single validation of the result.
    pub fn load_from<F>(path: Option<&Path>, lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                tracing::info!("Loading config from {}", path.display());
                Self::read_file(path)?
            }
            None => Self::default(),
        };
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tally-rag").join("config.json"))
    }

    /// Apply overrides from a key lookup. Split out from `from_env` so it can be
    /// exercised without touching the real environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let number = |key: &str| -> Result<Option<u64>, String> {
            match text(key) {
                Some(v) => v
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|e| format!("{} must be a non-negative integer: {}", key, e)),
                None => Ok(None),
            }
        };

        if let Some(v) = text("OLLAMA_URL") {
            self.services.ollama_url = v;
        }
        if let Some(v) = text("QDRANT_URL") {
            self.services.qdrant_url = v;
        }
        if let Some(v) = text("EMBED_MODEL") {
            self.services.embed_model = v;
        }
        if let Some(v) = text("GEN_MODEL") {
            self.services.gen_model = v;
        }
        if let Some(v) = text("QDRANT_COLLECTION") {
            self.services.collection = v;
        }
        if let Some(v) = number("EMBED_TIMEOUT")? {
            self.timeouts.embed_secs = v;
        }
        if let Some(v) = number("QDRANT_TIMEOUT")? {
            self.timeouts.vector_store_secs = v;
        }
        if let Some(v) = number("GEN_TIMEOUT")? {
            self.timeouts.generation_secs = v;
        }
        if let Some(v) = number("SCAN_BATCH_SIZE")? {
            self.scan.batch_size = v as usize;
        }
        if let Some(v) = number("TOP_K")? {
            self.search.default_top_k = v as usize;
        }
        self.normalize();
        Ok(())
    }

    fn normalize(&mut self) {
        let trim = |url: &mut String| {
            let trimmed = url.trim().trim_end_matches('/').to_string();
            *url = trimmed;
        };
        trim(&mut self.services.ollama_url);
        trim(&mut self.services.qdrant_url);
    }
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            services: ServiceConfig::default(),
            timeouts: TimeoutConfig::default(),
            generation: GenerationConfig::default(),
            scan: ScanConfig::default(),
            search: SearchConfig::default(),
            labels: StatementLabels::default(),
            chat: ChatConfig::default(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            qdrant_url: "http://localhost:6333".to_string(),
            embed_model: "nomic-embed-text:latest".to_string(),
            gen_model: "qwen2.5:1.5b".to_string(),
            collection: "dw_text".to_string(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 15,
            embed_secs: 220,
            vector_store_secs: 90,
            generation_secs: 900,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.9,
            num_predict: 280,
            system_prompt: "You are a helpful assistant.".to_string(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { batch_size: 200 }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 6,
            dedupe_prefix_chars: 220,
            text_field: "prompt".to_string(),
            not_found_reply: "I could not find the answer in the provided context.".to_string(),
        }
    }
}

impl Default for StatementLabels {
    fn default() -> Self {
        Self {
            value: "basic salary".to_string(),
            entity: "Employee".to_string(),
            entities: "employees".to_string(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_turns: 6,
            preamble: "You are a helpful assistant running privately on-prem.\n\
                       Answer clearly and concisely."
                .to_string(),
        }
    }
}
