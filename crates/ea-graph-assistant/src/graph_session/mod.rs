//! Graph backend sessions.
//!
//! Architecture:
//! - `GraphSession` is one live connection to a datastore target
//! - `SessionFactory` opens sessions; the stdio factory spawns a tool server
//!   subprocess per connect
//! - `ConnectionManager` owns the single live session and coalesces switches
pub mod session_trait;
pub mod stdio_session;
pub mod connection_manager;
pub use session_trait::{decode_rows, GraphSession, Params, Row, SessionFactory, TargetConfig, TargetConfigs};
pub use stdio_session::{StdioSessionFactory, StdioToolOptions, StdioToolSession};
pub use connection_manager::ConnectionManager;
