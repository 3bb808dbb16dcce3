pub mod app_state;
pub mod config;
pub mod error;
pub mod graph_session;
pub mod import;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod reset;
pub mod schema;
pub mod target;
pub mod telemetry;
pub mod turn_store;

#[cfg(feature = "cli")]
pub mod api;
#[cfg(feature = "cli")]
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

// Public API exports
pub use app_state::AppState;
pub use config::Config;
pub use error::{AssistantError, AssistantResult};
pub use graph_session::{ConnectionManager, GraphSession, SessionFactory};
pub use import::{GraphImporter, GraphTranspiler, ImportOutcome};
pub use llm::TextGenerator;
pub use pipeline::{QueryAnswer, QueryPipeline};
pub use reset::{BatchedResetController, ResetReport};
pub use schema::{SchemaSummarizer, SchemaSummary};
pub use target::DatastoreTarget;
pub use turn_store::{InMemoryTurnStore, Turn, TurnStore};

#[cfg(feature = "cli")]
pub use server::run_server;
