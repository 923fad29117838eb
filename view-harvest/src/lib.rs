//! Automatic view-count collection for published collaboration videos.
//!
//! A batch of video records is routed to automation workflows by the age of
//! each video, turned into scrape tasks, and run either serially on the
//! client or as server-side jobs that are polled. Successful view counts are
//! written to the daily report store.

pub mod builder;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod executor;
pub mod logging;
pub mod orchestrator;
pub mod persister;
pub mod retry;
pub mod selector;
pub mod tracker;

pub use error::{Error, Result};
pub use orchestrator::{ScrapeBatch, ScrapeOrchestrator, build_orchestrator};
pub use tracker::SessionHandle;
