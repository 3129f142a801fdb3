//! ctrack REST client
//!
//! [`HttpBackend`] implements [`AssessmentBackend`] against the tracker's
//! REST API: bearer authentication, `{"data": ...}` envelope unwrapping,
//! retries with exponential backoff on 5xx and connection errors, and
//! translation between the server's compliance enum and client labels.
//!
//! # Example
//!
//! ```rust,no_run
//! use ctrack_client::HttpBackend;
//! use ctrack_compliance::{Scope, Workspace};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = HttpBackend::from_profile(None)?;
//! let workspace = Workspace::new(Arc::new(backend));
//! workspace.load().await?;
//!
//! let summary = workspace.summary(&Scope::Root)?;
//! println!("overall score: {}", summary.compliance_score);
//! # Ok(())
//! # }
//! ```
//!
//! [`AssessmentBackend`]: ctrack_compliance::AssessmentBackend

pub mod client;
pub mod config;
pub mod dto;
pub mod error;

pub use client::HttpBackend;
pub use config::ClientConfig;
pub use error::{Error, Result};

/// Client version, sent in the user agent
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
