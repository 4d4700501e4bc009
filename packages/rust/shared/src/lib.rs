//! Shared types, error model, and configuration for MeetNews.
//!
//! This crate is the foundation depended on by all other MeetNews crates.
//! It provides:
//! - [`MeetNewsError`], the unified error type
//! - Domain types ([`CandidateItem`], [`ProcessNewsRequest`], [`RankRequest`], [`TaskId`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatabaseConfig, FetchConfig, QueuesConfig, RankingConfig, RouteEntry,
    SearchConfig, SummarizeConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, read_secret,
};
pub use error::{MeetNewsError, Result};
pub use types::{
    CandidateItem, MESSAGE_SCHEMA_VERSION, MeetingRecord, MeetingSummaryRow, NewMeeting,
    ProcessNewsRequest, RankRequest, RankingMode, TaskId,
};
