//! EPS coordinator: sends prescription messages to Spine and turns its
//! replies into FHIR responses.
//!
//! - [`config`]: layered configuration (file, environment)
//! - [`coordinator`]: transport, envelope and dispatcher wiring
//! - [`polling`]: fixed-interval polling policy
//! - [`logging`]: tracing subscriber setup

pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod polling;

pub use config::Config;
pub use coordinator::Coordinator;
pub use error::{Error, Result};
pub use polling::FixedIntervalPolicy;
