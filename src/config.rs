//! Configuration parsing for grist.toml
//!
//! Handles loading and validating the build configuration. The parsed
//! document is kept alongside the typed view so `<config:…>` directives can
//! address any value by its dotted path.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{GristError, Result};

/// Default config file names to search for
pub const CONFIG_FILES: &[&str] = &["grist.toml", "Grist.toml"];

/// Tasks implemented by grist itself, in default run order
pub const BUILTIN_TASKS: &[&str] = &["lint", "qunit", "concat", "min"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Free-form project metadata, visible to templates as `meta.*`
    #[serde(default)]
    pub meta: toml::Table,

    #[serde(default)]
    pub lint: Option<LintConfig>,

    #[serde(default)]
    pub qunit: Option<QunitConfig>,

    /// Concatenation targets by name
    #[serde(default)]
    pub concat: BTreeMap<String, BuildTarget>,

    /// Minification targets by name
    #[serde(default)]
    pub min: BTreeMap<String, BuildTarget>,

    #[serde(default)]
    pub watch: Option<WatchConfig>,

    #[serde(default)]
    pub jshint: JshintConfig,

    #[serde(default)]
    pub uglify: MinifyOptions,

    /// Task aliases
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskList>,

    #[serde(default)]
    pub settings: Settings,

    #[serde(skip)]
    raw: toml::Table,
}

/// Global settings for grist behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Run external commands through `sh -c`
    #[serde(default)]
    pub shell: bool,

    /// Reuse lint results for unchanged files
    #[serde(default = "default_true")]
    pub cache: bool,

    /// Cache directory (`~` and `$VARS` are expanded)
    #[serde(default)]
    pub cache_dir: Option<String>,

    /// Watch debounce delay in milliseconds
    #[serde(default = "default_debounce")]
    pub watch_debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shell: false,
            cache: true,
            cache_dir: None,
            watch_debounce_ms: default_debounce(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_debounce() -> u64 {
    300
}

fn default_separator() -> String {
    "\n".to_string()
}

/// A single pattern or an ordered list of them
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PatternList {
    One(String),
    Many(Vec<String>),
}

impl PatternList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            PatternList::One(p) => vec![p.clone()],
            PatternList::Many(ps) => ps.clone(),
        }
    }
}

/// Task names, either as a space separated string or a list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TaskList {
    Spaced(String),
    List(Vec<String>),
}

impl TaskList {
    pub fn names(&self) -> Vec<String> {
        match self {
            TaskList::Spaced(s) => s.split_whitespace().map(str::to_string).collect(),
            TaskList::List(v) => v
                .iter()
                .flat_map(|s| s.split_whitespace())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LintConfig {
    pub files: PatternList,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QunitConfig {
    pub files: PatternList,

    /// Headless runner command; `{file}` is replaced with each page path
    #[serde(default)]
    pub runner: Option<String>,

    /// Per-page timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// A concat or min target
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildTarget {
    pub src: PatternList,
    pub dest: String,
    #[serde(default = "default_separator")]
    pub separator: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    #[serde(default)]
    pub files: Option<PatternList>,
    #[serde(default)]
    pub tasks: Option<TaskList>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JshintConfig {
    #[serde(default)]
    pub options: LintOptions,

    /// Permitted global identifiers; `false` marks them read-only
    #[serde(default)]
    pub globals: BTreeMap<String, bool>,
}

/// Lint rule flags
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LintOptions {
    #[serde(default)]
    pub curly: bool,
    #[serde(default)]
    pub eqeqeq: bool,
    #[serde(default)]
    pub immed: bool,
    #[serde(default)]
    pub latedef: bool,
    #[serde(default)]
    pub newcap: bool,
    #[serde(default)]
    pub noarg: bool,
    #[serde(default)]
    pub sub: bool,
    #[serde(default)]
    pub undef: bool,
    #[serde(default)]
    pub boss: bool,
    #[serde(default)]
    pub eqnull: bool,
    #[serde(default)]
    pub browser: bool,

    /// Flags grist does not implement; reported once at load
    #[serde(flatten)]
    pub unsupported: BTreeMap<String, toml::Value>,
}

impl LintOptions {
    /// Stable textual fingerprint of the enabled rules
    pub fn fingerprint(&self) -> String {
        let flags = [
            ("curly", self.curly),
            ("eqeqeq", self.eqeqeq),
            ("immed", self.immed),
            ("latedef", self.latedef),
            ("newcap", self.newcap),
            ("noarg", self.noarg),
            ("sub", self.sub),
            ("undef", self.undef),
            ("boss", self.boss),
            ("eqnull", self.eqnull),
            ("browser", self.browser),
        ];
        flags
            .iter()
            .map(|(name, on)| format!("{}={}", name, on))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Minifier options
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MinifyOptions {
    /// Keep `/*! … */` comments inside the minified body
    #[serde(default)]
    pub preserve_license: bool,
}

impl Config {
    /// Load configuration from the specified path or search for it
    pub fn load(path: Option<&Path>) -> Result<(Self, PathBuf)> {
        let config_path = match path {
            Some(p) => {
                if p.exists() {
                    p.to_path_buf()
                } else {
                    return Err(GristError::ConfigNotFound {
                        searched: vec![p.to_path_buf()],
                    });
                }
            }
            None => Self::find_config()?,
        };

        let content = std::fs::read_to_string(&config_path)?;
        let config = Self::parse(&content).map_err(|e| match e {
            GristError::ConfigParse { source, .. } => GristError::ConfigParse {
                source,
                path: config_path.clone(),
            },
            other => other,
        })?;

        Ok((config, config_path))
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let to_err = |source| GristError::ConfigParse {
            source,
            path: PathBuf::new(),
        };
        let raw: toml::Table = toml::from_str(content).map_err(to_err)?;
        let mut config: Config = toml::from_str(content).map_err(to_err)?;
        config.raw = raw;

        config.validate()?;

        for flag in config.jshint.options.unsupported.keys() {
            tracing::warn!("jshint option '{}' is not supported and will be ignored", flag);
        }

        Ok(config)
    }

    /// Search for config file starting from current directory
    fn find_config() -> Result<PathBuf> {
        let mut current = std::env::current_dir()?;
        let mut searched = Vec::new();

        loop {
            for name in CONFIG_FILES {
                let candidate = current.join(name);
                searched.push(candidate.clone());
                if candidate.exists() {
                    return Ok(candidate);
                }
            }

            if !current.pop() {
                break;
            }
        }

        Err(GristError::ConfigNotFound { searched })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        for (name, list) in &self.tasks {
            let invalid = |reason: &str| GristError::InvalidConfig {
                reason: format!("alias '{}': {}", name, reason),
            };

            if BUILTIN_TASKS.contains(&name.as_str()) {
                return Err(invalid("cannot shadow a built-in task"));
            }

            let names = list.names();
            if names.is_empty() {
                return Err(invalid("alias must list at least one task"));
            }

            if names.iter().any(|n| n == name) {
                return Err(invalid("alias cannot reference itself"));
            }
        }

        for (section, targets) in [("concat", &self.concat), ("min", &self.min)] {
            for (target, build) in targets {
                if build.src.to_vec().is_empty() {
                    return Err(GristError::InvalidConfig {
                        reason: format!("{}.{}: 'src' must list at least one source", section, target),
                    });
                }
                if build.dest.trim().is_empty() {
                    return Err(GristError::InvalidConfig {
                        reason: format!("{}.{}: 'dest' must not be empty", section, target),
                    });
                }
            }
        }

        Ok(())
    }

    /// Resolve a dotted path (`concat.dist.dest`) against the raw document
    pub fn lookup(&self, path: &str) -> Option<&toml::Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        let mut current = self.raw.get(first)?;

        for part in parts {
            current = match current {
                toml::Value::Table(t) => t.get(part)?,
                toml::Value::Array(a) => a.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    /// Task list of an alias; `default` falls back to the configured built-ins
    pub fn alias(&self, name: &str) -> Option<Vec<String>> {
        if let Some(list) = self.tasks.get(name) {
            return Some(list.names());
        }

        if name == "default" {
            return Some(
                BUILTIN_TASKS
                    .iter()
                    .filter(|t| self.has_section(t))
                    .map(|t| t.to_string())
                    .collect(),
            );
        }

        None
    }

    /// All alias names, including the implicit `default`
    pub fn alias_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.keys().cloned().collect();
        if !self.tasks.contains_key("default") {
            names.push("default".to_string());
        }
        names.sort();
        names
    }

    /// Whether the section behind a built-in task is configured
    pub fn has_section(&self, task: &str) -> bool {
        match task {
            "lint" => self.lint.is_some(),
            "qunit" => self.qunit.is_some(),
            "concat" => !self.concat.is_empty(),
            "min" => !self.min.is_empty(),
            _ => false,
        }
    }

    /// Target names of a multi-target task
    pub fn targets(&self, task: &str) -> Vec<String> {
        match task {
            "concat" => self.concat.keys().cloned().collect(),
            "min" => self.min.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Watch patterns, defaulting to the lint file set
    pub fn watch_files(&self) -> Vec<String> {
        self.watch
            .as_ref()
            .and_then(|w| w.files.as_ref())
            .or_else(|| self.lint.as_ref().map(|l| &l.files))
            .map(PatternList::to_vec)
            .unwrap_or_default()
    }

    /// Tasks re-run on change, defaulting to `lint qunit`
    pub fn watch_tasks(&self) -> Vec<String> {
        self.watch
            .as_ref()
            .and_then(|w| w.tasks.as_ref())
            .map(TaskList::names)
            .unwrap_or_else(|| vec!["lint".to_string(), "qunit".to_string()])
    }

    /// Cache directory with `~` and environment variables expanded
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.settings.cache_dir.as_ref().map(|dir| {
            let expanded = shellexpand::full(dir)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| dir.clone());
            PathBuf::from(expanded)
        })
    }
}
