//! Error types for grist
//!
//! Uses `miette` for pretty error reporting with codes and help text.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for grist operations
#[derive(Error, Diagnostic, Debug)]
pub enum GristError {
    #[error("Configuration file not found")]
    #[diagnostic(
        code(grist::config::not_found),
        help("Create a grist.toml in your project root (`grist init`), or specify one with --config")
    )]
    ConfigNotFound { searched: Vec<PathBuf> },

    #[error("Failed to parse configuration {path}")]
    #[diagnostic(code(grist::config::parse))]
    ConfigParse {
        #[source]
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("Invalid configuration: {reason}")]
    #[diagnostic(code(grist::config::invalid))]
    InvalidConfig { reason: String },

    #[error("Task '{name}' not found")]
    #[diagnostic(
        code(grist::task::not_found),
        help("Run `grist list` to see available tasks")
    )]
    TaskNotFound { name: String, available: Vec<String> },

    #[error("Target '{target}' not found for task '{task}'")]
    #[diagnostic(code(grist::task::target_not_found))]
    TargetNotFound { task: String, target: String },

    #[error("Circular task alias detected: {cycle}")]
    #[diagnostic(
        code(grist::task::cycle),
        help("Check the alias lists in the [tasks] section")
    )]
    CyclicAlias { cycle: String },

    #[error("Lint found {count} problem(s) in {files} file(s)")]
    #[diagnostic(
        code(grist::lint::failed),
        help("Fix the reported problems or relax the [jshint.options] flags")
    )]
    LintFailed { count: usize, files: usize },

    #[error("{failed} of {total} test page(s) failed")]
    #[diagnostic(code(grist::qunit::failed))]
    TestsFailed { failed: usize, total: usize },

    #[error("Command not found: {command}")]
    #[diagnostic(
        code(grist::exec::command_not_found),
        help("Ensure the command is installed and in your PATH")
    )]
    CommandNotFound { command: String },

    #[error("Template expression `{expr}` failed")]
    #[diagnostic(code(grist::template::eval))]
    Template {
        expr: String,
        #[source]
        source: Box<rhai::EvalAltResult>,
    },

    #[error("Unterminated template tag in `{template}`")]
    #[diagnostic(code(grist::template::syntax), help("Close every `<%=` with `%>`"))]
    TemplateSyntax { template: String },

    #[error("Directive `{directive}` failed: {reason}")]
    #[diagnostic(code(grist::directive))]
    Directive { directive: String, reason: String },

    #[error("Invalid glob pattern '{pattern}': {message}")]
    #[diagnostic(code(grist::glob))]
    Glob { pattern: String, message: String },

    #[error("Syntax error in {path} at {line}:{column}: {message}")]
    #[diagnostic(code(grist::js::syntax))]
    JsSyntax {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("I/O error")]
    #[diagnostic(code(grist::io))]
    Io(#[from] std::io::Error),

    #[error("Cache error: {message}")]
    #[diagnostic(code(grist::cache))]
    Cache { message: String },

    #[error("Watch error")]
    #[diagnostic(code(grist::watch))]
    Watch {
        #[source]
        source: notify::Error,
    },
}

/// Result type alias for grist operations
pub type Result<T> = std::result::Result<T, GristError>;
