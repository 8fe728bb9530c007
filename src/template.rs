//! Banner template rendering
//!
//! `<%= expr %>` placeholders are evaluated by a sandboxed Rhai engine with
//! the `[meta]` table in scope as `meta` and a `today(mask)` date helper.
//! The run date is fixed per [`RenderContext`] so every artifact produced by
//! one invocation carries the same date.

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use rhai::{Dynamic, Engine, EvalAltResult, Scope};

use crate::error::{GristError, Result};

const OPEN_TAG: &str = "<%=";
const CLOSE_TAG: &str = "%>";

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const DAY_NAMES: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

/// Date mask tokens, longest first so `yyyy` wins over `yy`
const MASK_TOKENS: &[&str] = &[
    "yyyy", "mmmm", "dddd", "mmm", "ddd", "yy", "mm", "dd", "HH", "hh", "MM", "ss", "TT", "tt",
    "m", "d", "H", "h", "M", "s",
];

/// Everything a template can see
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub meta: toml::Table,
    pub now: NaiveDateTime,
}

impl RenderContext {
    /// Context stamped with the current local time
    pub fn new(meta: toml::Table) -> Self {
        Self {
            meta,
            now: Local::now().naive_local(),
        }
    }

    pub fn at(meta: toml::Table, now: NaiveDateTime) -> Self {
        Self { meta, now }
    }
}

/// Template engine
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    ctx: RenderContext,
}

impl TemplateEngine {
    pub fn new(ctx: RenderContext) -> Self {
        Self { ctx }
    }

    /// Create a configured engine instance
    fn create_engine(&self) -> Engine {
        let mut engine = Engine::new();

        // Configure sandboxing
        engine.set_max_expr_depths(32, 32);
        engine.set_max_operations(10_000);
        engine.set_max_modules(0);
        engine.set_max_string_size(64 * 1024);

        let now = self.ctx.now;
        engine.register_fn("today", move |mask: &str| -> String { format_date(&now, mask) });

        // `grunt.template.today(mask)` from classic banners
        engine.register_fn("today", move |_ns: &mut rhai::Map, mask: &str| -> String {
            format_date(&now, mask)
        });

        engine
    }

    fn create_scope(&self) -> std::result::Result<Scope<'static>, Box<EvalAltResult>> {
        let mut scope = Scope::new();
        scope.push("meta", rhai::serde::to_dynamic(&self.ctx.meta)?);

        let mut template_ns = rhai::Map::new();
        template_ns.insert("template".into(), Dynamic::from(rhai::Map::new()));
        scope.push("grunt", template_ns);

        Ok(scope)
    }

    /// Render every `<%= … %>` placeholder in `template`
    pub fn render(&self, template: &str) -> Result<String> {
        let engine = self.create_engine();
        let mut scope = self.create_scope().map_err(|e| GristError::Template {
            expr: "meta".to_string(),
            source: e,
        })?;

        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find(OPEN_TAG) {
            out.push_str(&rest[..start]);
            let after = &rest[start + OPEN_TAG.len()..];
            let end = after.find(CLOSE_TAG).ok_or_else(|| GristError::TemplateSyntax {
                template: template.to_string(),
            })?;

            let expr = after[..end].trim();
            let value = engine
                .eval_with_scope::<Dynamic>(&mut scope, expr)
                .map_err(|e| GristError::Template {
                    expr: expr.to_string(),
                    source: e,
                })?;

            if !value.is_unit() {
                out.push_str(&value.to_string());
            }

            rest = &after[end + CLOSE_TAG.len()..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

/// Format a date with a classic dateformat mask (`yyyy-mm-dd`, `HH:MM:ss`)
pub fn format_date(now: &NaiveDateTime, mask: &str) -> String {
    let mut out = String::new();
    let mut rest = mask;

    'outer: while let Some(c) = rest.chars().next() {
        if c == '\'' || c == '"' {
            if let Some(end) = rest[1..].find(c) {
                out.push_str(&rest[1..1 + end]);
                rest = &rest[end + 2..];
                continue;
            }
        }

        for token in MASK_TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(&expand_token(now, token));
                rest = tail;
                continue 'outer;
            }
        }

        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    out
}

fn expand_token(now: &NaiveDateTime, token: &str) -> String {
    let hour12 = match now.hour() % 12 {
        0 => 12,
        h => h,
    };
    let month = now.month0() as usize;
    let weekday = now.weekday().num_days_from_monday() as usize;

    match token {
        "yyyy" => format!("{:04}", now.year()),
        "yy" => format!("{:02}", now.year().rem_euclid(100)),
        "mmmm" => MONTH_NAMES[month].to_string(),
        "mmm" => MONTH_NAMES[month][..3].to_string(),
        "mm" => format!("{:02}", now.month()),
        "m" => now.month().to_string(),
        "dddd" => DAY_NAMES[weekday].to_string(),
        "ddd" => DAY_NAMES[weekday][..3].to_string(),
        "dd" => format!("{:02}", now.day()),
        "d" => now.day().to_string(),
        "HH" => format!("{:02}", now.hour()),
        "H" => now.hour().to_string(),
        "hh" => format!("{:02}", hour12),
        "h" => hour12.to_string(),
        "MM" => format!("{:02}", now.minute()),
        "M" => now.minute().to_string(),
        "ss" => format!("{:02}", now.second()),
        "s" => now.second().to_string(),
        "TT" => String::from(if now.hour() < 12 { "AM" } else { "PM" }),
        "tt" => String::from(if now.hour() < 12 { "am" } else { "pm" }),
        other => other.to_string(),
    }
}
