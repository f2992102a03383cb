//! Revision and template object-graph core of the ecological model editor.
//! This crate is the single source of truth for copy, template and link rules.

pub mod config;
pub mod db;
pub mod logging;
pub mod messages;
pub mod model;
pub mod repo;
pub mod script;
pub mod service;
pub mod template;

pub use config::{ConfigError, ModelPolicy};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError, LoggingStatus};
pub use messages::{Message, MessageLog};
pub use model::error::{ModelError, ModelResult};
pub use model::graph::{CopyMode, Handle, ModelGraph};
pub use model::links::LinkPolicy;
pub use model::object::{
    test_valid_name, ActionBody, ActionType, AttributeBody, ClassDefBody, DayMonth, DomainObject,
    ElementBody, ObjectBody, ObjectHeader, ObjectKind, Polygon, ReportBody, SpatialBody,
    TimestepBody, TrialBody, BROKEN_ID, NEW_ID,
};
pub use model::ordering::{ListOrdering, Presentation, SortKey};
pub use model::revision::{RevisionKey, RevisionParseError};
pub use model::tree::{RevisionTree, RevisionTreeBuilder, TreeNode};
pub use repo::graph_io::{record_from_object, GraphLoader};
pub use repo::model_store::{
    LinkRecord, ModelStore, ObjectRecord, RecordBody, StoreError, StoreResult, StoredSummary,
};
pub use repo::sqlite_store::SqliteModelStore;
pub use script::{NoScriptEngine, ScriptEngine};
pub use service::model_service::{ModelService, ENGINE_NOT_FOUND};
pub use template::pool::{KindSelector, TemplatePool};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
