//! Static analysis of JavaScript sources
//!
//! Implements the jshint rule flags configured under `[jshint.options]` on
//! top of the [`crate::js`] tokenizer. Name resolution is function-scoped:
//! `var`, `let`, `const`, function names, parameters and `catch` bindings
//! are hoisted to the enclosing function.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use console::style;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::config::{JshintConfig, LintOptions};
use crate::error::Result;
use crate::js::{self, Token, TokenKind};

/// ECMAScript globals that are always defined
static BUILTINS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "Array", "ArrayBuffer", "Boolean", "DataView", "Date", "decodeURI", "decodeURIComponent",
        "encodeURI", "encodeURIComponent", "Error", "escape", "eval", "EvalError", "Float32Array",
        "Float64Array", "Function", "hasOwnProperty", "Infinity", "Int8Array", "Int16Array",
        "Int32Array", "isFinite", "isNaN", "JSON", "Map", "Math", "NaN", "Number", "Object",
        "parseFloat", "parseInt", "Promise", "Proxy", "RangeError", "ReferenceError", "Reflect",
        "RegExp", "Set", "String", "Symbol", "SyntaxError", "TypeError", "Uint8Array",
        "Uint8ClampedArray", "Uint16Array", "Uint32Array", "undefined", "unescape", "URIError",
        "WeakMap", "WeakSet", "arguments",
    ]
    .into_iter()
    .collect()
});

/// Globals predefined by the `browser` flag
static BROWSER_GLOBALS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "addEventListener", "alert", "atob", "blur", "btoa", "Blob", "cancelAnimationFrame",
        "clearInterval", "clearTimeout", "close", "closed", "confirm", "CustomEvent",
        "devicePixelRatio", "document", "DOMParser", "Element", "Event", "event", "File",
        "FileReader", "focus", "FormData", "frames", "getComputedStyle", "history",
        "HTMLElement", "Image", "innerHeight", "innerWidth", "length", "localStorage", "location",
        "matchMedia", "MutationObserver", "name", "navigator", "Node", "NodeList", "open",
        "opener", "Option", "parent", "performance", "postMessage", "print", "prompt",
        "removeEventListener", "requestAnimationFrame", "screen", "scroll", "scrollBy",
        "scrollTo", "self", "sessionStorage", "setInterval", "setTimeout", "status", "top", "URL",
        "WebSocket", "window", "Worker", "XMLHttpRequest",
    ]
    .into_iter()
    .collect()
});

/// Capitalized functions that are fine to call without `new`
const CONSTRUCTOR_EXEMPT: &[&str] = &[
    "Array", "Boolean", "Date", "Error", "EvalError", "Function", "Number", "Object", "RangeError",
    "ReferenceError", "RegExp", "String", "Symbol", "SyntaxError", "TypeError", "URIError",
];

const ASSIGNMENT_OPS: &[&str] = &[
    "=", "+=", "-=", "*=", "/=", "%=", "<<=", ">>=", ">>>=", "&=", "|=", "^=", "**=",
];

/// A single rule violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub line: usize,
    pub column: usize,
    pub rule: String,
    pub message: String,
}

impl Violation {
    fn at(tok: &Token<'_>, rule: &str, message: impl Into<String>) -> Self {
        Self {
            line: tok.line,
            column: tok.column,
            rule: rule.to_string(),
            message: message.into(),
        }
    }
}

/// Violations found in one file
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub violations: Vec<Violation>,
    pub cached: bool,
}

/// Outcome of linting a file set
#[derive(Debug, Clone, Default)]
pub struct LintReport {
    pub files: Vec<FileReport>,
}

impl LintReport {
    pub fn problem_count(&self) -> usize {
        self.files.iter().map(|f| f.violations.len()).sum()
    }

    pub fn failing_files(&self) -> usize {
        self.files.iter().filter(|f| !f.violations.is_empty()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.problem_count() == 0
    }
}

/// Lint a single source text
pub fn lint_source(src: &str, jshint: &JshintConfig) -> Vec<Violation> {
    match js::significant_tokens(src) {
        Ok(tokens) => Analysis::new(&tokens, &jshint.options, &jshint.globals).run(),
        Err(e) => vec![Violation {
            line: e.line,
            column: e.column,
            rule: "syntax".to_string(),
            message: e.message,
        }],
    }
}

/// Lint every file, reusing cached results for unchanged content
pub async fn lint_files(
    files: &[PathBuf],
    base: &Path,
    jshint: &JshintConfig,
    cache: Option<&Cache>,
) -> Result<LintReport> {
    let mut report = LintReport::default();

    for path in files {
        let full = base.join(path);
        let content = match tokio::fs::read_to_string(&full).await {
            Ok(c) => c,
            Err(e) => {
                report.files.push(FileReport {
                    path: path.clone(),
                    violations: vec![Violation {
                        line: 0,
                        column: 0,
                        rule: "syntax".to_string(),
                        message: format!("Unable to read file: {}", e),
                    }],
                    cached: false,
                });
                continue;
            }
        };

        let cached = match cache {
            Some(cache) => cache.get(path, &content, jshint).await.unwrap_or_else(|e| {
                warn!("ignoring lint cache entry for {}: {}", path.display(), e);
                None
            }),
            None => None,
        };

        let (violations, was_cached) = match cached {
            Some(v) => (v, true),
            None => {
                let v = lint_source(&content, jshint);
                if let Some(cache) = cache {
                    let _ = cache.put(path, &content, jshint, &v).await;
                }
                (v, false)
            }
        };

        debug!(
            "linted {} ({} problem(s){})",
            path.display(),
            violations.len(),
            if was_cached { ", cached" } else { "" }
        );

        report.files.push(FileReport {
            path: path.clone(),
            violations,
            cached: was_cached,
        });
    }

    Ok(report)
}

/// Print every violation, grouped by file
pub fn print_report(report: &LintReport) {
    for file in report.files.iter().filter(|f| !f.violations.is_empty()) {
        println!(
            "{} {}",
            style("Linting").bold(),
            style(file.path.display()).underlined()
        );
        for v in &file.violations {
            println!(
                "  {} {} {}",
                style(format!("[L{}:C{}]", v.line, v.column)).yellow(),
                v.message,
                style(format!("({})", v.rule)).dim()
            );
        }
    }
}

#[derive(Debug)]
struct Scope {
    parent: Option<usize>,
    /// name -> index of the declaring token
    declared: HashMap<String, usize>,
}

/// Parts of a function literal, as token indices
#[derive(Debug, Clone, Copy)]
struct FunctionParts {
    name: Option<usize>,
    params_open: usize,
    params_close: usize,
    body_close: usize,
}

struct Analysis<'t, 'a> {
    toks: &'t [Token<'a>],
    brackets: Vec<Option<usize>>,
    openers: HashMap<usize, usize>,
    options: &'t LintOptions,
    globals: &'t BTreeMap<String, bool>,
    scopes: Vec<Scope>,
    scope_of: Vec<usize>,
    decl_sites: HashSet<usize>,
    out: Vec<Violation>,
}

impl<'t, 'a> Analysis<'t, 'a> {
    fn new(
        toks: &'t [Token<'a>],
        options: &'t LintOptions,
        globals: &'t BTreeMap<String, bool>,
    ) -> Self {
        let brackets = js::match_brackets(toks);
        let openers = brackets
            .iter()
            .enumerate()
            .filter_map(|(open, close)| close.map(|c| (c, open)))
            .collect();

        Self {
            toks,
            brackets,
            openers,
            options,
            globals,
            scopes: vec![Scope {
                parent: None,
                declared: HashMap::new(),
            }],
            scope_of: vec![0; toks.len()],
            decl_sites: HashSet::new(),
            out: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Violation> {
        self.collect_scopes();

        for i in 0..self.toks.len() {
            let tok = self.toks[i];
            match tok.kind {
                TokenKind::Keyword => self.check_keyword(i),
                TokenKind::Punct => self.check_punct(i),
                TokenKind::Identifier => self.check_identifier(i),
                _ => {}
            }
        }

        self.out.sort_by_key(|v| (v.line, v.column));
        self.out
    }

    fn tok(&self, i: usize) -> Option<&Token<'a>> {
        self.toks.get(i)
    }

    fn prev(&self, i: usize) -> Option<&Token<'a>> {
        i.checked_sub(1).and_then(|p| self.toks.get(p))
    }

    fn is_punct_at(&self, i: usize, p: &str) -> bool {
        self.tok(i).map_or(false, |t| t.is_punct(p))
    }

    fn report(&mut self, i: usize, rule: &str, message: impl Into<String>) {
        let v = Violation::at(&self.toks[i], rule, message);
        self.out.push(v);
    }

    // ----- scopes -----

    fn function_parts(&self, i: usize) -> Option<FunctionParts> {
        let mut j = i + 1;
        let name = match self.tok(j) {
            Some(t) if t.kind == TokenKind::Identifier => {
                j += 1;
                Some(j - 1)
            }
            _ => None,
        };
        if !self.is_punct_at(j, "(") {
            return None;
        }
        let params_close = self.brackets[j]?;
        if !self.is_punct_at(params_close + 1, "{") {
            return None;
        }
        let body_close = self.brackets[params_close + 1]?;
        Some(FunctionParts {
            name,
            params_open: j,
            params_close,
            body_close,
        })
    }

    /// Whether token `i` begins a statement
    fn at_statement_start(&self, i: usize) -> bool {
        match self.prev(i) {
            None => true,
            Some(p) if p.kind == TokenKind::Punct && matches!(p.text, ";" | "{" | "}") => true,
            Some(p) => self.toks[i].newline_before && p.can_end_statement() && p.text != ")",
        }
    }

    fn declare(&mut self, scope: usize, name_idx: usize) {
        let name = self.toks[name_idx].text.to_string();
        self.scopes[scope].declared.entry(name).or_insert(name_idx);
        self.decl_sites.insert(name_idx);
    }

    fn collect_scopes(&mut self) {
        let mut stack: Vec<(usize, usize)> = vec![(0, usize::MAX)];

        for i in 0..self.toks.len() {
            while stack.last().map_or(false, |(_, end)| *end < i) {
                stack.pop();
            }
            let current = stack.last().map_or(0, |(s, _)| *s);
            self.scope_of[i] = current;

            let tok = self.toks[i];
            if tok.kind != TokenKind::Keyword {
                continue;
            }

            match tok.text {
                "function" => {
                    let Some(parts) = self.function_parts(i) else {
                        continue;
                    };
                    let inner = self.scopes.len();
                    self.scopes.push(Scope {
                        parent: Some(current),
                        declared: HashMap::new(),
                    });

                    if let Some(name) = parts.name {
                        let owner = if self.at_statement_start(i) { current } else { inner };
                        self.declare(owner, name);
                    }

                    for k in parts.params_open + 1..parts.params_close {
                        let after_sep = self
                            .prev(k)
                            .map_or(false, |p| p.is_punct("(") || p.is_punct(","));
                        if self.toks[k].kind == TokenKind::Identifier && after_sep {
                            self.declare(inner, k);
                        }
                    }

                    stack.push((inner, parts.body_close));
                }
                "var" | "let" | "const" => self.declare_list(i, current),
                "catch" => {
                    if self.is_punct_at(i + 1, "(")
                        && self.tok(i + 2).map_or(false, |t| t.kind == TokenKind::Identifier)
                    {
                        self.declare(current, i + 2);
                    }
                }
                _ => {}
            }
        }
    }

    /// Declare every binding of a `var a = 1, b, c = f()` list
    fn declare_list(&mut self, start: usize, scope: usize) {
        let mut expect_name = true;
        let mut k = start + 1;

        while k < self.toks.len() {
            let t = self.toks[k];

            if expect_name {
                if t.kind == TokenKind::Identifier {
                    self.declare(scope, k);
                    expect_name = false;
                    k += 1;
                    continue;
                }
                break;
            }

            if t.kind == TokenKind::Punct {
                match t.text {
                    "(" | "[" | "{" => {
                        k = self.brackets[k].map_or(self.toks.len(), |c| c + 1);
                        continue;
                    }
                    ")" | "]" | "}" | ";" => break,
                    "," => {
                        expect_name = true;
                        k += 1;
                        continue;
                    }
                    _ => {}
                }
            }

            if t.is_keyword("in") || (t.kind == TokenKind::Identifier && t.text == "of") {
                break;
            }

            if t.newline_before && self.toks[k - 1].can_end_statement() && t.can_start_statement() {
                break;
            }

            k += 1;
        }
    }

    fn resolve(&self, mut scope: usize, name: &str) -> Option<(usize, usize)> {
        loop {
            if let Some(&idx) = self.scopes[scope].declared.get(name) {
                return Some((scope, idx));
            }
            scope = self.scopes[scope].parent?;
        }
    }

    // ----- rules -----

    fn check_keyword(&mut self, i: usize) {
        let text = self.toks[i].text;
        match text {
            "if" | "while" | "for" => {
                let Some(close) = self.is_punct_at(i + 1, "(").then(|| self.brackets[i + 1]).flatten()
                else {
                    return;
                };
                if text == "while" && self.is_do_while_tail(i) {
                    self.check_assignment_condition(i + 1, close);
                    return;
                }
                if self.options.curly {
                    self.expect_block(close + 1);
                }
                if text == "for" {
                    self.check_for_condition(i + 1, close);
                } else {
                    self.check_assignment_condition(i + 1, close);
                }
            }
            "else" => {
                if self.options.curly && !self.tok(i + 1).map_or(true, |t| t.is_keyword("if")) {
                    self.expect_block(i + 1);
                }
            }
            "do" => {
                if self.options.curly {
                    self.expect_block(i + 1);
                }
            }
            "function" => {
                if self.options.immed {
                    self.check_immediate_invocation(i);
                }
            }
            "new" => {
                if self.options.newcap {
                    self.check_constructor_name(i);
                }
            }
            _ => {}
        }
    }

    fn expect_block(&mut self, body: usize) {
        if let Some(t) = self.tok(body) {
            if !t.is_punct("{") {
                let msg = format!("Expected '{{' and instead saw '{}'.", t.text);
                self.report(body, "curly", msg);
            }
        }
    }

    fn is_do_while_tail(&self, i: usize) -> bool {
        let Some(p) = i.checked_sub(1) else {
            return false;
        };
        if self.toks[p].is_punct("}") {
            return self
                .openers
                .get(&p)
                .and_then(|open| open.checked_sub(1))
                .map_or(false, |before| self.toks[before].is_keyword("do"));
        }
        if !self.toks[p].is_punct(";") {
            return false;
        }

        // braceless `do stmt; while (x);`
        let mut k = p;
        while k > 0 {
            k -= 1;
            let t = self.toks[k];
            if t.is_keyword("do") {
                return true;
            }
            if t.kind == TokenKind::Punct {
                match t.text {
                    ")" | "]" => {
                        if let Some(&open) = self.openers.get(&k) {
                            k = open;
                        }
                    }
                    ";" | "{" | "}" => return false,
                    _ => {}
                }
            }
        }
        false
    }

    /// `if (a = b)` unless `boss`; `if ((a = b))` is deliberate
    fn check_assignment_condition(&mut self, open: usize, close: usize) {
        if self.options.boss {
            return;
        }
        self.check_top_level_assignment(open + 1, close);
    }

    fn check_for_condition(&mut self, open: usize, close: usize) {
        if self.options.boss {
            return;
        }
        let semis: Vec<usize> = self.top_level(open + 1, close)
            .into_iter()
            .filter(|&k| self.toks[k].is_punct(";"))
            .collect();
        if let [first, second, ..] = semis[..] {
            self.check_top_level_assignment(first + 1, second);
        }
    }

    fn check_top_level_assignment(&mut self, from: usize, to: usize) {
        for k in self.top_level(from, to) {
            if self.toks[k].is_punct("=") {
                self.report(
                    k,
                    "boss",
                    "Expected a conditional expression and instead saw an assignment.",
                );
            }
        }
    }

    /// Token indices in `from..to` not nested inside brackets
    fn top_level(&self, from: usize, to: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut k = from;
        while k < to {
            out.push(k);
            let t = self.toks[k];
            if t.kind == TokenKind::Punct && matches!(t.text, "(" | "[" | "{") {
                k = self.brackets[k].map_or(to, |c| c + 1);
            } else {
                k += 1;
            }
        }
        out
    }

    fn check_immediate_invocation(&mut self, i: usize) {
        let Some(parts) = self.function_parts(i) else {
            return;
        };
        if self.at_statement_start(i) {
            return;
        }
        let after = parts.body_close + 1;
        let wrapped = self.prev(i).map_or(false, |p| p.is_punct("("));

        if self.is_punct_at(after, "(") && !wrapped {
            self.report(i, "immed", "Wrap an immediate function invocation in parentheses.");
        } else if wrapped
            && self.brackets[i - 1] == Some(after)
            && self.is_punct_at(after + 1, "(")
        {
            self.report(
                i,
                "immed",
                "Move the invocation into the parens that contain the function.",
            );
        }
    }

    fn check_constructor_name(&mut self, i: usize) {
        let mut j = i + 1;
        if self.tok(j).map_or(true, |t| t.kind != TokenKind::Identifier) {
            return;
        }
        while self.is_punct_at(j + 1, ".")
            && self.tok(j + 2).map_or(false, |t| t.kind == TokenKind::Identifier)
        {
            j += 2;
        }
        let name = self.toks[j].text;
        if name.chars().next().map_or(false, |c| c.is_lowercase()) {
            self.report(
                j,
                "newcap",
                "A constructor name should start with an uppercase letter.",
            );
        }
    }

    fn check_punct(&mut self, i: usize) {
        let text = self.toks[i].text;
        match text {
            "==" | "!=" => self.check_equality(i),
            "[" if !self.options.sub => self.check_subscript(i),
            _ => {}
        }
    }

    fn check_equality(&mut self, i: usize) {
        let op = self.toks[i].text;
        let strict = format!("{}=", op);
        let against = [self.prev(i), self.tok(i + 1)]
            .into_iter()
            .flatten()
            .find(|t| is_loose_literal(t))
            .map(|t| t.text.to_string());

        if let Some(lit) = &against {
            if lit == "null" && self.options.eqnull {
                return;
            }
        }

        if self.options.eqeqeq {
            self.report(
                i,
                "eqeqeq",
                format!("Expected '{}' and instead saw '{}'.", strict, op),
            );
        } else if let Some(lit) = against {
            self.report(
                i,
                "eqeqeq",
                format!("Use '{}' to compare with '{}'.", strict, lit),
            );
        }
    }

    fn check_subscript(&mut self, i: usize) {
        let indexes_value = self.prev(i).map_or(false, |p| {
            p.kind == TokenKind::Identifier
                || p.is_keyword("this")
                || p.is_punct(")")
                || p.is_punct("]")
        });
        if !indexes_value || !self.is_punct_at(i + 2, "]") {
            return;
        }
        let Some(key) = self.tok(i + 1).filter(|t| t.kind == TokenKind::String) else {
            return;
        };
        let inner = &key.text[1..key.text.len() - 1];
        if js::is_identifier_name(inner) && !js::is_keyword(inner) {
            let msg = format!("['{}'] is better written in dot notation.", inner);
            self.report(i + 1, "sub", msg);
        }
    }

    fn is_reference(&self, i: usize) -> bool {
        if self.decl_sites.contains(&i) {
            return false;
        }
        let prev = self.prev(i);
        if prev.map_or(false, |p| p.is_punct(".") || p.is_keyword("break") || p.is_keyword("continue")) {
            return false;
        }
        // object key or label
        if self.is_punct_at(i + 1, ":") {
            let key_position = prev.map_or(true, |p| {
                p.kind == TokenKind::Punct && matches!(p.text, "{" | "," | ";" | "}")
            });
            if key_position {
                return false;
            }
        }
        true
    }

    fn check_identifier(&mut self, i: usize) {
        let tok = self.toks[i];

        if self.options.noarg
            && tok.text == "arguments"
            && self.is_punct_at(i + 1, ".")
            && self
                .tok(i + 2)
                .map_or(false, |t| t.text == "callee" || t.text == "caller")
        {
            let msg = format!("Avoid arguments.{}.", self.toks[i + 2].text);
            self.report(i, "noarg", msg);
        }

        if self.options.newcap {
            self.check_missing_new(i);
        }

        if !self.is_reference(i) {
            return;
        }

        let name = tok.text;
        match self.resolve(self.scope_of[i], name) {
            Some((scope, decl)) => {
                if self.options.latedef && scope == self.scope_of[i] && decl > i {
                    let first_use = (0..i).all(|k| {
                        self.toks[k].text != name || !self.is_reference(k) || self.scope_of[k] != scope
                    });
                    if first_use {
                        let msg = format!("'{}' was used before it was defined.", name);
                        self.report(i, "latedef", msg);
                    }
                }
            }
            None => {
                if self.globals.get(name) == Some(&false)
                    && self
                        .tok(i + 1)
                        .map_or(false, |t| t.kind == TokenKind::Punct && ASSIGNMENT_OPS.contains(&t.text))
                {
                    self.report(i, "readonly", format!("Read only: '{}'.", name));
                    return;
                }

                let known = BUILTINS.contains(name)
                    || self.globals.contains_key(name)
                    || (self.options.browser && BROWSER_GLOBALS.contains(name));
                let typeof_guard = self.prev(i).map_or(false, |p| p.is_keyword("typeof"));

                if self.options.undef && !known && !typeof_guard {
                    self.report(i, "undef", format!("'{}' is not defined.", name));
                }
            }
        }
    }

    fn check_missing_new(&mut self, i: usize) {
        let name = self.toks[i].text;
        let capitalized = name.chars().next().map_or(false, |c| c.is_uppercase());
        let has_lowercase = name.chars().any(|c| c.is_lowercase());
        if !capitalized || !has_lowercase || !self.is_punct_at(i + 1, "(") {
            return;
        }
        let excused = self.prev(i).map_or(false, |p| {
            p.is_keyword("new") || p.is_keyword("function") || p.is_punct(".")
        });
        if excused || CONSTRUCTOR_EXEMPT.contains(&name) {
            return;
        }
        self.report(i, "newcap", "Missing 'new' prefix when invoking a constructor.");
    }
}

/// Literals jshint warns about in loose comparisons even without `eqeqeq`
fn is_loose_literal(tok: &Token<'_>) -> bool {
    match tok.kind {
        TokenKind::Keyword => matches!(tok.text, "null" | "true" | "false"),
        TokenKind::Number => tok.text == "0",
        TokenKind::String => tok.text.len() == 2,
        TokenKind::Identifier => tok.text == "undefined",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml_opts: &str) -> JshintConfig {
        toml::from_str(toml_opts).unwrap()
    }

    fn rules(src: &str, jshint: &JshintConfig) -> Vec<String> {
        lint_source(src, jshint).into_iter().map(|v| v.rule).collect()
    }

    fn classic() -> JshintConfig {
        config(
            r#"
            [options]
            curly = true
            eqeqeq = true
            immed = true
            latedef = true
            newcap = true
            noarg = true
            sub = true
            undef = true
            boss = true
            eqnull = true
            browser = true

            [globals]
            jQuery = true
            "#,
        )
    }

    #[test]
    fn test_clean_plugin_passes() {
        let src = r#"
            /*! banner */
            (function($) {
              'use strict';
              var counter = 0;
              function Widget(el) {
                this.el = el;
              }
              Widget.prototype.bump = function() {
                if (this.el == null) {
                  return;
                }
                counter += 1;
                window.setTimeout(function() { document.title = String(counter); }, 10);
              };
              $.fn.widget = function() {
                return this.each(function() { new Widget(this).bump(); });
              };
            }(jQuery));
        "#;
        assert_eq!(lint_source(src, &classic()), Vec::<Violation>::new());
    }

    #[test]
    fn test_division_after_postfix_update_is_valid() {
        let jshint = config("[options]\ncurly = true\neqeqeq = true");
        assert!(rules("var count = 4;\nvar half = count++ / 2;", &jshint).is_empty());
    }

    #[test]
    fn test_curly_flags_each_form() {
        let jshint = config("[options]\ncurly = true");
        let src = "if (x) y();\nwhile (x) y();\nfor (;;) y();\nif (x) { y(); } else y();\ndo y(); while (x);";
        let found = rules(src, &jshint);
        assert_eq!(found.iter().filter(|r| *r == "curly").count(), 5);
    }

    #[test]
    fn test_curly_accepts_do_while_and_else_if() {
        let jshint = config("[options]\ncurly = true");
        let src = "do { y(); } while (x);\nif (a) { b(); } else if (c) { d(); }";
        assert!(rules(src, &jshint).is_empty());
    }

    #[test]
    fn test_eqeqeq_and_eqnull() {
        let jshint = config("[options]\neqeqeq = true\neqnull = true");
        assert_eq!(rules("a == b;", &jshint), vec!["eqeqeq"]);
        assert_eq!(rules("a != b;", &jshint), vec!["eqeqeq"]);
        assert!(rules("a == null;", &jshint).is_empty());
        assert!(rules("a === b;", &jshint).is_empty());

        let loose = config("[options]");
        assert!(rules("a == b;", &loose).is_empty());
        assert_eq!(rules("a == 0;", &loose), vec!["eqeqeq"]);
    }

    #[test]
    fn test_undef_and_globals() {
        let jshint = classic();
        let found = lint_source("var a = b + jQuery + window.x;", &jshint);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule, "undef");
        assert_eq!(found[0].message, "'b' is not defined.");

        // no browser flag: window is unknown
        let bare = config("[options]\nundef = true");
        assert_eq!(rules("window.x = 1;", &bare), vec!["undef"]);
    }

    #[test]
    fn test_undef_ignores_properties_keys_and_typeof() {
        let jshint = config("[options]\nundef = true");
        let src = "var o = { key: 1 };\no.other = o.key;\nif (typeof missing === 'undefined') { o = null; }";
        assert!(rules(src, &jshint).is_empty());
    }

    #[test]
    fn test_undef_sees_params_and_hoisting() {
        let jshint = config("[options]\nundef = true");
        let src = "function f(a, b) { return a + b + c + later(); function later() { return 1; } var c; }";
        assert!(rules(src, &jshint).is_empty());
    }

    #[test]
    fn test_latedef() {
        let jshint = config("[options]\nlatedef = true");
        let found = lint_source("x = 1;\nvar x;", &jshint);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule, "latedef");
        assert_eq!(found[0].line, 1);

        // use inside a nested function is fine
        assert!(rules("function f() { return g(); }\nfunction g() {}", &jshint).is_empty());
    }

    #[test]
    fn test_immed() {
        let jshint = config("[options]\nimmed = true");
        assert_eq!(rules("var x = function () { return 1; }();", &jshint), vec!["immed"]);
        assert_eq!(rules("(function () {})();", &jshint), vec!["immed"]);
        assert!(rules("(function () {}());", &jshint).is_empty());
        assert!(rules("function f() {}\n(g)();", &jshint).is_empty());
    }

    #[test]
    fn test_newcap() {
        let jshint = config("[options]\nnewcap = true");
        assert_eq!(rules("var w = new widget();", &jshint), vec!["newcap"]);
        assert_eq!(rules("var w = Widget();", &jshint), vec!["newcap"]);
        assert!(rules("var w = new ns.Widget(); var d = Date(); var k = KEY();", &jshint).is_empty());
    }

    #[test]
    fn test_noarg() {
        let jshint = config("[options]\nnoarg = true");
        assert_eq!(rules("function f() { return arguments.callee; }", &jshint), vec!["noarg"]);
    }

    #[test]
    fn test_sub() {
        let strict = config("[options]");
        assert_eq!(rules("a['name'] = 1;", &strict), vec!["sub"]);
        assert!(rules("a['not-ident'] = 1; a['class'] = 2; a[k] = 3;", &strict).is_empty());

        let relaxed = config("[options]\nsub = true");
        assert!(rules("a['name'] = 1;", &relaxed).is_empty());
    }

    #[test]
    fn test_boss() {
        let strict = config("[options]");
        assert_eq!(rules("if (a = b) { c(); }", &strict), vec!["boss"]);
        assert!(rules("if ((a = b)) { c(); }", &strict).is_empty());
        assert!(rules("for (i = 0; i < 3; i++) { c(); }", &strict).is_empty());

        let relaxed = config("[options]\nboss = true");
        assert!(rules("if (a = b) { c(); }", &relaxed).is_empty());
    }

    #[test]
    fn test_readonly_global() {
        let jshint = config("[globals]\nVERSION = false");
        assert_eq!(rules("VERSION = 2;", &jshint), vec!["readonly"]);
        assert!(rules("var v = VERSION;", &jshint).is_empty());
    }

    #[test]
    fn test_syntax_error_reported_as_violation() {
        let found = lint_source("var s = 'open;", &classic());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule, "syntax");
    }

    #[tokio::test]
    async fn test_lint_files_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.js"), "a == b;").unwrap();
        let cache = Cache::new(Some(dir.path().join("cache"))).unwrap();
        let jshint = config("[options]\neqeqeq = true");
        let files = vec![PathBuf::from("a.js")];

        let first = lint_files(&files, dir.path(), &jshint, Some(&cache)).await.unwrap();
        assert_eq!(first.problem_count(), 1);
        assert!(!first.files[0].cached);

        let second = lint_files(&files, dir.path(), &jshint, Some(&cache)).await.unwrap();
        assert_eq!(second.problem_count(), 1);
        assert!(second.files[0].cached);
    }
}
