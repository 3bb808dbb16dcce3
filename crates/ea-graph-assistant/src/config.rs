// ea-graph-assistant/src/config.rs

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::graph_session::{StdioToolOptions, TargetConfig, TargetConfigs};
use crate::llm::LlmConfig;
use crate::pipeline::PipelineConfig;
use crate::reset::ResetConfig;
use crate::schema::LayerRules;
use crate::target::DatastoreTarget;
use crate::turn_store::TurnCacheConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub request_timeout_seconds: u64,
    pub targets: TargetConfigs,
    pub tool_options: StdioToolOptions,
    pub llm: LlmConfig,
    pub reset: ResetConfig,
    pub turn_cache: TurnCacheConfig,
    pub pipeline: PipelineConfig,
    pub layer_rules: LayerRules,
    pub upload_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. `from_env` is the
    /// production caller; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup: &lookup };

        let targets = TargetConfigs {
            primary: vars.target(DatastoreTarget::Primary, "PRIMARY")?,
            workspace: vars.target(DatastoreTarget::Workspace, "WORKSPACE")?,
        };

        let tool_options = StdioToolOptions {
            read_tool: vars.string("MCP_READ_TOOL", "read_neo4j_cypher"),
            write_tool: vars.string("MCP_WRITE_TOOL", "write_neo4j_cypher"),
            connect_timeout: Duration::from_secs(vars.parse("CONNECT_TIMEOUT_SECONDS", 30u64)?),
            call_timeout: Duration::from_secs(vars.parse("QUERY_TIMEOUT_SECONDS", 120u64)?),
        };

        let llm = LlmConfig {
            base_url: vars.string("LLM_BASE_URL", "https://api.openai.com"),
            api_key: vars.optional("LLM_API_KEY"),
            model: vars.string("LLM_MODEL", "gpt-4o-mini"),
            temperature: vars.parse("LLM_TEMPERATURE", 0.0f32)?,
            top_p: vars.parse_optional("LLM_TOP_P")?,
            max_tokens: vars.parse("LLM_MAX_TOKENS", 1024u32)?,
            timeout_seconds: vars.parse("LLM_TIMEOUT_SECONDS", 120u64)?,
        };

        let reset = ResetConfig {
            batch_size: vars.parse("RESET_BATCH_SIZE", 1000u32)?,
            max_batches: vars.parse("RESET_MAX_BATCHES", 10_000u32)?,
            preserve_labels: vars.list("RESET_PRESERVE_LABELS"),
        };
        if reset.batch_size == 0 || reset.max_batches == 0 {
            return Err(anyhow::anyhow!(
                "RESET_BATCH_SIZE and RESET_MAX_BATCHES must both be greater than zero"
            ));
        }

        let turn_cache = TurnCacheConfig {
            capacity: vars.parse("TURN_CACHE_CAPACITY", 10_000u64)?,
            idle_seconds: vars.parse("TURN_CACHE_IDLE_SECONDS", 3600u64)?,
        };

        let pipeline = PipelineConfig {
            search_param: vars.string("SEARCH_PARAM_NAME", "searchText"),
            retry_on_empty: vars.parse("RETRY_ON_EMPTY", false)?,
            max_question_chars: vars.parse("MAX_QUESTION_CHARS", 4000usize)?,
        };

        let layer_rules = match vars.optional("LAYER_RULES") {
            Some(raw) => LayerRules::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("Invalid LAYER_RULES: {}", e))?,
            None => LayerRules::default(),
        };

        Ok(Self {
            api_host: vars.string("API_HOST", "127.0.0.1"),
            api_port: vars.parse("API_PORT", 8000u16)?,
            request_timeout_seconds: vars.parse("REQUEST_TIMEOUT_SECONDS", 300u64)?,
            targets,
            tool_options,
            llm,
            reset,
            turn_cache,
            pipeline,
            layer_rules,
            upload_dir: PathBuf::from(vars.string("UPLOAD_DIR", "./uploads")),
        })
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- API: {}:{}", self.api_host, self.api_port);
        for target in DatastoreTarget::ALL {
            let t = self.targets.get(target);
            info!(
                "- Target {}: {} {} ({}, db: {})",
                target,
                t.command,
                t.args.join(" "),
                t.uri,
                t.database.as_deref().unwrap_or("default")
            );
        }
        info!("- Tools: read={}, write={}", self.tool_options.read_tool, self.tool_options.write_tool);
        info!(
            "- LLM: {} @ {} (temperature {}, top_p {:?}, max tokens {})",
            self.llm.model, self.llm.base_url, self.llm.temperature, self.llm.top_p, self.llm.max_tokens
        );
        info!(
            "- Reset: batch size {}, max batches {}, preserve {:?}",
            self.reset.batch_size, self.reset.max_batches, self.reset.preserve_labels
        );
        info!(
            "- Turn cache: capacity {}, idle {}s",
            self.turn_cache.capacity, self.turn_cache.idle_seconds
        );
        info!(
            "- Pipeline: search param ${}, retry on empty: {}",
            self.pipeline.search_param, self.pipeline.retry_on_empty
        );
        info!("- Layer rules: {}", self.layer_rules);
        info!("- Upload dir: {}", self.upload_dir.display());
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid API address {}:{}", self.api_host, self.api_port))
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<'a, F: Fn(&str) -> Option<String>> Vars<'a, F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)
            .with_context(|| format!("{} environment variable not set. Please set it in your .env file", key))
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.optional(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
            None => Ok(default),
        }
    }

    fn parse_optional<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.optional(key)
            .map(|raw| {
                raw.trim()
                    .parse()
                    .with_context(|| format!("Invalid value for {}: '{}'", key, raw))
            })
            .transpose()
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.optional(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn target(&self, target: DatastoreTarget, prefix: &str) -> Result<TargetConfig> {
        let key = |suffix: &str| format!("{}_{}", prefix, suffix);
        Ok(TargetConfig {
            target,
            command: self.string(&key("MCP_COMMAND"), "mcp-neo4j-cypher"),
            args: self
                .optional(&key("MCP_ARGS"))
                .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            uri: self.required(&key("NEO4J_URI"))?,
            username: self.string(&key("NEO4J_USERNAME"), "neo4j"),
            password: self.required(&key("NEO4J_PASSWORD"))?,
            database: self.optional(&key("NEO4J_DATABASE")),
            extra_env: HashMap::new(),
        })
    }
}
