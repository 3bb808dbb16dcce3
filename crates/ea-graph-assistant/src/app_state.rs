//! Process-wide application state
//!
//! Everything request handlers need, wired once at startup and shared
//! through cheap `Arc` clones.

use std::sync::Arc;
use tracing::info;

use crate::{
    config::Config,
    graph_session::{ConnectionManager, SessionFactory, StdioSessionFactory},
    import::GraphImporter,
    llm::{ChatCompletionsClient, TextGenerator},
    pipeline::QueryPipeline,
    reset::BatchedResetController,
    schema::SchemaSummarizer,
    turn_store::{InMemoryTurnStore, TurnStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub manager: Arc<ConnectionManager>,
    pub pipeline: Arc<QueryPipeline>,
    pub reset: Arc<BatchedResetController>,
    pub importer: Arc<GraphImporter>,
    pub turns: Arc<dyn TurnStore>,
}

impl AppState {
    /// Production wiring: stdio tool-server sessions and an OpenAI-compatible
    /// text-generation client.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let factory = Arc::new(StdioSessionFactory::new(config.tool_options.clone()));
        let generator = Arc::new(ChatCompletionsClient::new(config.llm.clone())?);
        Self::with_backends(config, factory, generator)
    }

    pub fn with_backends(
        config: Config,
        factory: Arc<dyn SessionFactory>,
        generator: Arc<dyn TextGenerator>,
    ) -> anyhow::Result<Self> {
        let manager = Arc::new(ConnectionManager::new(factory, config.targets.clone()));
        let turns: Arc<dyn TurnStore> = Arc::new(InMemoryTurnStore::new(&config.turn_cache));

        let pipeline = Arc::new(QueryPipeline::new(
            manager.clone(),
            generator,
            turns.clone(),
            SchemaSummarizer::new(config.layer_rules.clone()),
            config.pipeline.clone(),
        )?);
        let reset = Arc::new(BatchedResetController::new(manager.clone(), config.reset.clone()));
        let importer = Arc::new(GraphImporter::new(manager.clone(), config.upload_dir.clone()));

        info!("Application state initialized");
        Ok(Self {
            config: Arc::new(config),
            manager,
            pipeline,
            reset,
            importer,
            turns,
        })
    }
}
