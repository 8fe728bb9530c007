//! Source list directives and file pattern expansion
//!
//! A source entry written as `<name:arg>` is a directive that expands to
//! content (`<banner:meta.banner>`, `<file_strip_banner:lib/a.js>`) or to
//! more entries (`<config:lint.files>`). Everything else is a glob pattern
//! matched relative to the project root.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{GristError, Result};
use crate::template::TemplateEngine;

/// A parsed `<name:arg>` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive<'s> {
    pub name: &'s str,
    pub arg: Option<&'s str>,
}

impl<'s> Directive<'s> {
    /// Parse an entry; `None` if it is a plain pattern
    pub fn parse(entry: &'s str) -> Option<Self> {
        let inner = entry.strip_prefix('<')?.strip_suffix('>')?;
        let (name, arg) = match inner.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (inner, None),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
            return None;
        }
        Some(Self { name, arg })
    }

    pub fn is_banner(&self) -> bool {
        self.name == "banner"
    }
}

/// One expanded piece of a source list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Directive text or file path it came from
    pub origin: String,
    pub content: String,
    pub is_banner: bool,
}

/// Expands directives and patterns against one project
pub struct Resolver<'c> {
    config: &'c Config,
    base: &'c Path,
    templates: &'c TemplateEngine,
}

impl<'c> Resolver<'c> {
    pub fn new(config: &'c Config, base: &'c Path, templates: &'c TemplateEngine) -> Self {
        Self {
            config,
            base,
            templates,
        }
    }

    /// Render the banner template at a config path, followed by a linefeed
    pub fn banner(&self, path: Option<&str>) -> Result<String> {
        let path = path.unwrap_or("meta.banner");
        let template = self
            .config
            .lookup(path)
            .and_then(|v| v.as_str())
            .ok_or_else(|| GristError::Directive {
                directive: format!("<banner:{}>", path),
                reason: format!("no string at config path '{}'", path),
            })?;
        let mut banner = self.templates.render(template)?;
        banner.push('\n');
        Ok(banner)
    }

    /// Resolve `<config:…>` entries down to plain patterns
    pub fn patterns(&self, entries: &[String]) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in entries {
            self.collect_patterns(entry, &mut out, 0)?;
        }
        Ok(out)
    }

    fn collect_patterns(&self, entry: &str, out: &mut Vec<String>, depth: usize) -> Result<()> {
        let Some(directive) = Directive::parse(entry) else {
            out.push(entry.to_string());
            return Ok(());
        };

        if directive.name != "config" {
            return Err(GristError::Directive {
                directive: entry.to_string(),
                reason: "only <config:…> may appear in a file list".to_string(),
            });
        }

        for value in self.config_values(entry, directive.arg, depth)? {
            self.collect_patterns(&value, out, depth + 1)?;
        }
        Ok(())
    }

    /// String values behind a `<config:path>` directive
    fn config_values(&self, entry: &str, arg: Option<&str>, depth: usize) -> Result<Vec<String>> {
        let fail = |reason: String| GristError::Directive {
            directive: entry.to_string(),
            reason,
        };

        if depth > 8 {
            return Err(fail("config directives nest too deeply".to_string()));
        }
        let path = arg.ok_or_else(|| fail("missing config path".to_string()))?;
        let value = self
            .config
            .lookup(path)
            .ok_or_else(|| fail(format!("no value at config path '{}'", path)))?;

        match value {
            toml::Value::String(s) => Ok(vec![s.clone()]),
            toml::Value::Array(items) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| fail(format!("'{}' must contain only strings", path)))
                })
                .collect(),
            _ => Err(fail(format!("'{}' is not a string or list of strings", path))),
        }
    }

    /// Expand patterns to existing files, relative to the project root.
    /// Order follows the patterns; matches of one glob are sorted; duplicates
    /// are dropped.
    pub fn expand_files(&self, entries: &[String]) -> Result<Vec<PathBuf>> {
        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for pattern in self.patterns(entries)? {
            for path in self.expand_pattern(&pattern)? {
                if seen.insert(path.clone()) {
                    files.push(path);
                }
            }
        }

        Ok(files)
    }

    fn expand_pattern(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        if !is_glob(pattern) {
            let path = PathBuf::from(pattern);
            if self.base.join(&path).is_file() {
                return Ok(vec![path]);
            }
            warn!("no file matches '{}'", pattern);
            return Ok(Vec::new());
        }

        let matcher = compile_glob(pattern)?;
        let mut matches: Vec<PathBuf> = WalkDir::new(self.base)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.path().strip_prefix(self.base).ok().map(Path::to_path_buf))
            .filter(|rel| matcher.is_match(rel))
            .collect();

        matches.sort();
        debug!("'{}' matched {} file(s)", pattern, matches.len());
        Ok(matches)
    }

    /// Expand a source list into content pieces, in order
    pub fn expand_sources(&self, entries: &[String]) -> Result<Vec<Source>> {
        let mut sources = Vec::new();

        for entry in entries {
            match Directive::parse(entry) {
                Some(directive) => self.expand_directive(entry, directive, &mut sources, 0)?,
                None => self.push_files(entry, &mut sources)?,
            }
        }

        Ok(sources)
    }

    fn push_files(&self, pattern: &str, sources: &mut Vec<Source>) -> Result<()> {
        let files = self.expand_pattern(pattern)?;
        if files.is_empty() && !is_glob(pattern) {
            return Err(GristError::Directive {
                directive: pattern.to_string(),
                reason: "file not found".to_string(),
            });
        }
        for file in files {
            sources.push(Source {
                content: self.read(pattern, &file)?,
                origin: file.display().to_string(),
                is_banner: false,
            });
        }
        Ok(())
    }

    fn expand_directive(
        &self,
        entry: &str,
        directive: Directive<'_>,
        sources: &mut Vec<Source>,
        depth: usize,
    ) -> Result<()> {
        let file_arg = || {
            directive.arg.map(PathBuf::from).ok_or_else(|| GristError::Directive {
                directive: entry.to_string(),
                reason: "missing file path".to_string(),
            })
        };

        match directive.name {
            "banner" => sources.push(Source {
                origin: entry.to_string(),
                content: self.banner(directive.arg)?,
                is_banner: true,
            }),
            "file" => {
                let path = file_arg()?;
                sources.push(Source {
                    origin: entry.to_string(),
                    content: self.read(entry, &path)?,
                    is_banner: false,
                });
            }
            "file_strip_banner" => {
                let path = file_arg()?;
                sources.push(Source {
                    origin: entry.to_string(),
                    content: strip_banner(&self.read(entry, &path)?).to_string(),
                    is_banner: false,
                });
            }
            "json" => {
                let path = file_arg()?;
                let raw = self.read(entry, &path)?;
                let value: serde_json::Value =
                    serde_json::from_str(&raw).map_err(|e| GristError::Directive {
                        directive: entry.to_string(),
                        reason: e.to_string(),
                    })?;
                sources.push(Source {
                    origin: entry.to_string(),
                    content: value.to_string(),
                    is_banner: false,
                });
            }
            "config" => {
                for value in self.config_values(entry, directive.arg, depth)? {
                    match Directive::parse(&value) {
                        Some(inner) => self.expand_directive(&value, inner, sources, depth + 1)?,
                        None => self.push_files(&value, sources)?,
                    }
                }
            }
            other => {
                return Err(GristError::Directive {
                    directive: entry.to_string(),
                    reason: format!("unknown directive '{}'", other),
                })
            }
        }

        Ok(())
    }

    fn read(&self, entry: &str, path: &Path) -> Result<String> {
        std::fs::read_to_string(self.base.join(path)).map_err(|e| GristError::Directive {
            directive: entry.to_string(),
            reason: format!("cannot read {}: {}", path.display(), e),
        })
    }
}

/// Whether a pattern contains glob syntax
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

/// Compile a pattern where `*` stays within one path segment and `**` spans many
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| GristError::Glob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// Remove a leading `/* … */` comment, keeping `/*! … */` license banners
pub fn strip_banner(src: &str) -> &str {
    let trimmed = src.trim_start();
    let Some(body) = trimmed.strip_prefix("/*") else {
        return src;
    };
    if body.starts_with('!') {
        return src;
    }
    match body.find("*/") {
        Some(end) => body[end + 2..].trim_start(),
        None => src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::RenderContext;
    use chrono::NaiveDate;
    use std::fs;

    fn setup() -> (tempfile::TempDir, Config, TemplateEngine) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("lib/sub")).unwrap();
        fs::write(dir.path().join("lib/a.js"), "/* dev notes */\nvar a = 1;\n").unwrap();
        fs::write(dir.path().join("lib/b.js"), "/*! keep */\nvar b = 2;\n").unwrap();
        fs::write(dir.path().join("lib/sub/c.js"), "var c = 3;\n").unwrap();
        fs::write(dir.path().join("pkg.json"), "{ \"name\" : \"x\" }").unwrap();

        let config = Config::parse(
            r#"
            [meta]
            version = "1.2.3"
            banner = '/*! v<%= meta.version %> <%= today("yyyy-mm-dd") %> */'

            [lint]
            files = ["lib/*.js", "lib/**/*.js"]

            [concat.dist]
            src = ["lib/a.js"]
            dest = "dist/out.js"
            "#,
        )
        .unwrap();

        let now = NaiveDate::from_ymd_opt(2013, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let templates = TemplateEngine::new(RenderContext::at(config.meta.clone(), now));
        (dir, config, templates)
    }

    #[test]
    fn test_parse_directive() {
        assert_eq!(
            Directive::parse("<banner:meta.banner>"),
            Some(Directive {
                name: "banner",
                arg: Some("meta.banner")
            })
        );
        assert_eq!(
            Directive::parse("<banner>"),
            Some(Directive {
                name: "banner",
                arg: None
            })
        );
        assert_eq!(Directive::parse("lib/*.js"), None);
    }

    #[test]
    fn test_strip_banner() {
        assert_eq!(strip_banner("/* x */\n\ncode();"), "code();");
        assert_eq!(strip_banner("/*! x */\ncode();"), "/*! x */\ncode();");
        assert_eq!(strip_banner("code(); /* x */"), "code(); /* x */");
    }

    #[test]
    fn test_expand_files_order_and_dedup() {
        let (dir, config, templates) = setup();
        let resolver = Resolver::new(&config, dir.path(), &templates);
        let files = resolver
            .expand_files(&["<config:lint.files>".to_string()])
            .unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("lib/a.js"),
                PathBuf::from("lib/b.js"),
                PathBuf::from("lib/sub/c.js"),
            ]
        );
    }

    #[test]
    fn test_expand_sources_with_banner() {
        let (dir, config, templates) = setup();
        let resolver = Resolver::new(&config, dir.path(), &templates);
        let sources = resolver
            .expand_sources(&[
                "<banner:meta.banner>".to_string(),
                "<file_strip_banner:lib/a.js>".to_string(),
                "<file_strip_banner:lib/b.js>".to_string(),
            ])
            .unwrap();

        assert_eq!(sources.len(), 3);
        assert!(sources[0].is_banner);
        assert_eq!(sources[0].content, "/*! v1.2.3 2013-01-02 */\n");
        assert_eq!(sources[1].content, "var a = 1;\n");
        assert_eq!(sources[2].content, "/*! keep */\nvar b = 2;\n");
    }

    #[test]
    fn test_config_directive_reads_file() {
        let (dir, config, templates) = setup();
        let resolver = Resolver::new(&config, dir.path(), &templates);
        let sources = resolver
            .expand_sources(&["<config:concat.dist.src>".to_string()])
            .unwrap();
        assert_eq!(sources[0].content, "/* dev notes */\nvar a = 1;\n");
    }

    #[test]
    fn test_json_directive_is_compacted() {
        let (dir, config, templates) = setup();
        let resolver = Resolver::new(&config, dir.path(), &templates);
        let sources = resolver.expand_sources(&["<json:pkg.json>".to_string()]).unwrap();
        assert_eq!(sources[0].content, r#"{"name":"x"}"#);
    }

    #[test]
    fn test_missing_file_and_unknown_directive() {
        let (dir, config, templates) = setup();
        let resolver = Resolver::new(&config, dir.path(), &templates);
        assert!(matches!(
            resolver.expand_sources(&["lib/missing.js".to_string()]),
            Err(GristError::Directive { .. })
        ));
        assert!(matches!(
            resolver.expand_sources(&["<nope:x>".to_string()]),
            Err(GristError::Directive { .. })
        ));
    }
}
