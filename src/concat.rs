//! Ordered concatenation of sources into one artifact

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::BuildTarget;
use crate::directive::{Resolver, Source};
use crate::error::Result;

/// Join expanded sources. A banner already ends with a linefeed and is not
/// followed by the separator.
pub fn join(sources: &[Source], separator: &str) -> String {
    let mut out = String::new();
    let mut need_separator = false;

    for source in sources {
        if source.is_banner {
            out.push_str(&source.content);
            need_separator = false;
            continue;
        }

        if need_separator {
            out.push_str(separator);
        }
        out.push_str(&source.content);
        need_separator = true;
    }

    out
}

/// Build one concat target, returning the written path and byte count
pub async fn build(resolver: &Resolver<'_>, base: &Path, target: &BuildTarget) -> Result<(PathBuf, usize)> {
    let sources = resolver.expand_sources(&target.src.to_vec())?;
    debug!("concatenating {} source(s) into {}", sources.len(), target.dest);

    let output = join(&sources, &target.separator);
    let dest = write_output(base, &target.dest, output.as_bytes()).await?;

    Ok((dest, output.len()))
}

/// Write an artifact, creating parent directories and replacing any old copy
pub async fn write_output(base: &Path, dest: &str, data: &[u8]) -> Result<PathBuf> {
    let path = base.join(dest);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, data).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::template::{RenderContext, TemplateEngine};

    fn piece(content: &str, is_banner: bool) -> Source {
        Source {
            origin: String::new(),
            content: content.to_string(),
            is_banner,
        }
    }

    #[test]
    fn test_join_with_banner() {
        let sources = [piece("/*! b */\n", true), piece("a();", false), piece("b();", false)];
        assert_eq!(join(&sources, "\n"), "/*! b */\na();\nb();");
    }

    #[test]
    fn test_join_custom_separator() {
        let sources = [piece("a", false), piece("b", false), piece("c", false)];
        assert_eq!(join(&sources, ";\n"), "a;\nb;\nc");
        assert_eq!(join(&[], "\n"), "");
    }

    #[tokio::test]
    async fn test_build_writes_dest_in_declared_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/z.js"), "z();").unwrap();
        std::fs::write(dir.path().join("src/a.js"), "a();").unwrap();

        let config = Config::parse(
            r#"
            [meta]
            banner = "/*! top */"

            [concat.dist]
            src = ["<banner>", "src/z.js", "src/a.js"]
            dest = "out/nested/all.js"
            "#,
        )
        .unwrap();
        let templates = TemplateEngine::new(RenderContext::new(config.meta.clone()));
        let resolver = Resolver::new(&config, dir.path(), &templates);

        let (path, len) = build(&resolver, dir.path(), &config.concat["dist"]).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "/*! top */\nz();\na();");
        assert_eq!(len, written.len());

        // rebuild overwrites rather than appends
        build(&resolver, dir.path(), &config.concat["dist"]).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), written);
    }
}
