//! Run orchestration and history for a goal-driven agent.
//!
//! A [`orchestrator::RunController`] executes one run at a time, either against the
//! Backend Agent Service or a local simulator, streaming ordered progress and settling
//! on a single [`model::RunResult`] or classified [`error::AgentError`]. Completed runs
//! go into a capped [`storage::HistoryStore`] and can be rendered by [`export`].

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod model;
pub mod orchestrator;
pub mod storage;
pub mod text_summary;
