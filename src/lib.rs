//! grist - a build runner for front-end JavaScript libraries
//!
//! This crate provides both a CLI tool and a library for the classic
//! lint → test → concatenate → minify workflow.
//!
//! # Features
//!
//! - **Declarative TOML configuration** - one `grist.toml` per project
//! - **Banner templates** - `<%= meta.version %>` and `today("yyyy-mm-dd")` via Rhai
//! - **Self-hosted lint and minify** - jshint-style rules and a token minifier
//! - **Lint cache** - unchanged files are not re-linted
//! - **File watching** - re-run lint and tests on change
//!
//! # Example
//!
//! ```toml
//! # grist.toml
//!
//! [meta]
//! version = "0.1.0"
//! banner = "/*! lib - v<%= meta.version %> - <%= today(\"yyyy-mm-dd\") %> */"
//!
//! [lint]
//! files = ["lib/**/*.js"]
//!
//! [concat.dist]
//! src = ["<banner:meta.banner>", "<file_strip_banner:lib/lib.js>"]
//! dest = "dist/lib.js"
//!
//! [min.dist]
//! src = ["<banner:meta.banner>", "<config:concat.dist.dest>"]
//! dest = "dist/lib.min.js"
//! ```
//!
//! # Library Usage
//!
//! ```rust,ignore
//! use grist::{Config, TaskGraph, Executor, ExecutorConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (config, _) = Config::load(None)?;
//!     let graph = TaskGraph::from_config(&config)?;
//!     let steps = graph.expand("default")?;
//!
//!     let executor = Executor::new(config, ExecutorConfig::default(), None);
//!     executor.execute(&steps).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod concat;
pub mod config;
pub mod directive;
pub mod error;
pub mod executor;
pub mod graph;
pub mod js;
pub mod lint;
pub mod minify;
pub mod qunit;
pub mod template;
pub mod watch;

// Re-export main types
pub use cache::Cache;
pub use config::Config;
pub use error::{GristError, Result};
pub use executor::{Executor, ExecutorConfig, StepResult};
pub use graph::{BuiltinTask, TaskGraph, TaskInvocation, TaskNode};
pub use template::{RenderContext, TemplateEngine};
