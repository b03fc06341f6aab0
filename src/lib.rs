#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::return_self_not_must_use
)]

pub mod audit;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod provider;
pub mod queue;
pub mod scheduler;
pub mod sources;
pub mod store;

pub use config::Config;
pub use error::LookoutError;
pub use orchestrator::Orchestrator;
