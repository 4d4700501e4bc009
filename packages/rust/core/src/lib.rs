//! News enrichment pipeline for MeetNews.
//!
//! This crate ties search, fetching, ranking, summarization, and storage
//! together behind a two-pool task broker:
//! - [`router`] maps task kinds to the `default` and `dedicated` queues
//! - [`broker`] runs the worker pools and carries cross-pool delegation
//! - [`pipeline`] is the orchestrator task (search, fetch, rank, summarize, persist)
//! - [`service`] is the enqueue/retry surface used by the host process, plus the poller that picks up pending records

pub mod broker;
pub mod pipeline;
pub mod router;
pub mod service;
pub mod summarize;
pub mod worker;

pub use broker::{Broker, Dispatcher, PoolSizes, Task, TaskContext, TaskExecutor, TaskHandle};
pub use pipeline::{Orchestrator, PipelineOutcome, PipelineSettings, RankingStage};
pub use router::{QueueName, Router, TaskKind};
pub use service::{EnrichmentService, reset_for_retry};
pub use summarize::{GeminiSummarizer, Summarizer, summarize_items};
pub use worker::{NewsWorker, start_broker};
