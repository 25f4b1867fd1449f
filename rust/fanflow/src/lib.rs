//! Bounded fan-out/fan-in task pipelines with cooperative shutdown.
//!
//! A run of a [`pipeline::Pipeline`] connects one producer of work items to K
//! worker threads through a bounded input channel, and the workers to a single
//! consumer through a bounded output channel. Any participant may ask the whole
//! run to stop early; when it does, every thread of the run exits and is joined.
//!
//! # Key Components
//!
//! ## Running
//!
//! - [`pipeline::Pipeline`] - Configured pipeline; starts independent runs
//! - [`pipeline::RunningPipeline`] - Handle for streaming results out of a run
//! - [`pipeline::PipelineOutput`] / [`pipeline::RunReport`] - What a finished
//!   run produced, and how it ended
//! - [`config::PipelineConfig`] - Worker count, channel capacities, deadline
//!
//! ## Stages
//!
//! - [`source`] - The only writer and closer of the input channel
//! - [`completion`] - Counts worker exits and closes the output channel exactly
//!   once, after the last worker has left
//! - [`sink`] - Consumes the output channel and decides when enough was seen
//!
//! ## Shutdown
//!
//! - [`shutdown::ShutdownController`] - Idempotent, broadcast stop request
//! - [`shutdown::StopSignal`] - The observing side, cheap to clone and `select!` on
//!
//! ## Utilities
//!
//! - [`sequenced`] - Tag items with their input position to restore order
//! - [`liveness::Liveness`] - Count of threads still running for a pipeline

pub mod completion;
pub mod config;
pub mod liveness;
pub mod pipeline;
pub mod sequenced;
pub mod shutdown;
pub mod sink;
pub mod source;
mod worker_pool;

pub use config::PipelineConfig;
pub use fanflow_common::{Result, error::Error};
pub use pipeline::{Pipeline, PipelineOutput, RunReport, RunningPipeline};
pub use shutdown::{ShutdownController, ShutdownReason, StopSignal};
pub use sink::StopCondition;
