use std::collections::HashMap;
use std::fmt;

use ariadne::{Cache, Color, ColorGenerator, Config, IndexType, Label, Report, ReportKind, Source};

use crate::span::{SourceId, SourceMap, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn report_kind(self) -> ReportKind<'static> {
        match self {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        }
    }

    fn color(self) -> Color {
        match self {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

/// A secondary span attached to a diagnostic, e.g. the "previously defined
/// here" site of a redefinition error.
#[derive(Debug, Clone)]
pub struct SpanLabel {
    pub span: Span,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub primary: Span,
    pub labels: Vec<SpanLabel>,
    pub helps: Vec<String>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    fn new(severity: Severity, primary: Span, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            primary,
            labels: Vec::new(),
            helps: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn error(primary: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, primary, message)
    }

    pub fn warning(primary: Span, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, primary, message)
    }

    pub fn with_label(mut self, span: Span, text: impl Into<String>) -> Self {
        self.labels.push(SpanLabel {
            span,
            text: text.into(),
        });
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.helps.push(help.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// The distinguished unwind signal of the pass pipeline.
///
/// `Failed` is a normal outcome: the build stopped because user errors
/// accrued (or a single fatal one occurred). `Internal` means the pipeline
/// detected an inconsistency in its own output, e.g. a label whose address
/// moved between the reservation pass and the emission pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    Failed,
    Internal,
}

/// Accumulating diagnostic sink for one build.
///
/// Non-fatal errors pile up until `verify()` is called between passes;
/// fatal errors and an exceeded error budget abort immediately by returning
/// an [`Abort`] the caller propagates with `?`.
#[derive(Debug)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    max_errors: usize,
    log: Vec<String>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter {
    pub const MAX_ERRORS: usize = 64;

    pub fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
            error_count: 0,
            max_errors: Self::MAX_ERRORS,
            log: Vec::new(),
        }
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    /// Record a non-fatal error. Aborts only once the error budget is spent.
    pub fn error(&mut self, diagnostic: Diagnostic) -> Result<(), Abort> {
        self.diagnostics.push(diagnostic);
        self.error_count += 1;
        if self.error_count >= self.max_errors {
            return Err(self.abort());
        }
        Ok(())
    }

    /// Record an error that ends the build on the spot.
    pub fn fatal(&mut self, diagnostic: Diagnostic) -> Abort {
        self.diagnostics.push(diagnostic);
        self.error_count += 1;
        self.abort()
    }

    /// Record an internal-consistency failure. These indicate a compiler
    /// bug, never a user error, and surface as a distinct outcome.
    pub fn internal(&mut self, diagnostic: Diagnostic) -> Abort {
        self.diagnostics.push(diagnostic);
        self.error_count += 1;
        self.notice("internal consistency failure, aborting");
        Abort::Internal
    }

    /// Abort if any errors are pending. Called between passes so later
    /// passes never operate on a known-bad tree.
    pub fn verify(&mut self) -> Result<(), Abort> {
        if self.error_count > 0 {
            Err(self.abort())
        } else {
            Ok(())
        }
    }

    fn abort(&mut self) -> Abort {
        self.notice(format!("failed with {} error(s)", self.error_count));
        Abort::Failed
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.log.push(message.into());
    }

    pub fn notice(&mut self, message: impl Into<String>) {
        self.log.push(format!("* boron: {}", message.into()));
    }

    pub fn log_lines(&self) -> &[String] {
        &self.log
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub color: bool,
}

impl RenderOptions {
    pub const fn plain() -> Self {
        Self { color: false }
    }

    pub const fn colored() -> Self {
        Self { color: true }
    }
}

/// Adapter feeding registered sources to the ariadne renderer on demand.
struct RenderCache<'a> {
    source_map: &'a SourceMap,
    loaded: HashMap<SourceId, Source<&'a str>>,
}

impl<'a> Cache<SourceId> for RenderCache<'a> {
    type Storage = &'a str;

    fn fetch(&mut self, id: &SourceId) -> Result<&Source<Self::Storage>, impl fmt::Debug> {
        if !self.loaded.contains_key(id) {
            let file = self
                .source_map
                .get(*id)
                .ok_or_else(|| format!("missing source for id {id:?}"))?;
            self.loaded
                .insert(*id, Source::from(file.text.as_str()));
        }
        Ok::<_, String>(&self.loaded[id])
    }

    fn display<'b>(&self, id: &'b SourceId) -> Option<impl fmt::Display + 'b> {
        self.source_map.get(*id).map(|file| file.name.clone())
    }
}

pub fn render_diagnostic(source_map: &SourceMap, diagnostic: &Diagnostic) -> String {
    render_diagnostic_with_options(source_map, diagnostic, RenderOptions::plain())
}

pub fn render_diagnostic_with_options(
    source_map: &SourceMap,
    diagnostic: &Diagnostic,
    options: RenderOptions,
) -> String {
    let Some(primary_file) = source_map.get(diagnostic.primary.source_id) else {
        // Spans minted by the platform strategy have no backing source.
        return plain_fallback(diagnostic, "<builtin>", 0, 0);
    };

    let primary = (diagnostic.primary.source_id, diagnostic.primary.as_range());
    let mut builder = Report::build(diagnostic.severity.report_kind(), primary.clone())
        .with_config(
            Config::default()
                .with_index_type(IndexType::Byte)
                .with_color(options.color),
        )
        .with_message(&diagnostic.message)
        .with_label(
            Label::new(primary)
                .with_color(diagnostic.severity.color())
                .with_priority(100)
                .with_order(0)
                .with_message("here"),
        );

    let mut colors = ColorGenerator::new();
    for (index, label) in diagnostic.labels.iter().enumerate() {
        if source_map.get(label.span.source_id).is_none() {
            continue;
        }
        builder = builder.with_label(
            Label::new((label.span.source_id, label.span.as_range()))
                .with_color(colors.next())
                .with_order((index + 1) as i32)
                .with_message(&label.text),
        );
    }
    for help in &diagnostic.helps {
        builder = builder.with_help(help);
    }
    for note in &diagnostic.notes {
        builder = builder.with_note(note);
    }

    let mut cache = RenderCache {
        source_map,
        loaded: HashMap::new(),
    };
    let mut output = Vec::new();
    if builder.finish().write(&mut cache, &mut output).is_ok() {
        return String::from_utf8_lossy(&output).into_owned();
    }

    let (line, col) = primary_file.line_col(diagnostic.primary.start);
    plain_fallback(diagnostic, &primary_file.name, line, col)
}

fn plain_fallback(diagnostic: &Diagnostic, name: &str, line: usize, col: usize) -> String {
    let mut fallback = format!(
        "{}: {}\n --> {name}:{line}:{col}",
        diagnostic.severity.name(),
        diagnostic.message,
    );
    for help in &diagnostic.helps {
        fallback.push_str(&format!("\nHelp: {help}"));
    }
    for note in &diagnostic.notes {
        fallback.push_str(&format!("\nNote: {note}"));
    }
    fallback
}

pub fn render_diagnostics(source_map: &SourceMap, diagnostics: &[Diagnostic]) -> String {
    render_diagnostics_with_options(source_map, diagnostics, RenderOptions::plain())
}

pub fn render_diagnostics_with_options(
    source_map: &SourceMap,
    diagnostics: &[Diagnostic],
    options: RenderOptions,
) -> String {
    diagnostics
        .iter()
        .map(|diag| render_diagnostic_with_options(source_map, diag, options))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SourceId;

    fn span() -> Span {
        Span::new(SourceId(0), 0, 1)
    }

    #[test]
    fn verify_aborts_when_errors_accrued() {
        let mut reporter = Reporter::new();
        assert!(reporter.verify().is_ok());
        reporter
            .error(Diagnostic::error(span(), "nope"))
            .expect("one error fits the budget");
        assert_eq!(reporter.verify(), Err(Abort::Failed));
    }

    #[test]
    fn exceeding_error_budget_aborts() {
        let mut reporter = Reporter::new();
        let mut aborted = false;
        for _ in 0..Reporter::MAX_ERRORS {
            if reporter.error(Diagnostic::error(span(), "nope")).is_err() {
                aborted = true;
                break;
            }
        }
        assert!(aborted);
    }

    #[test]
    fn internal_errors_are_distinguished() {
        let mut reporter = Reporter::new();
        let abort = reporter.internal(Diagnostic::error(span(), "pass mismatch"));
        assert_eq!(abort, Abort::Internal);
    }

    #[test]
    fn renders_spans_with_file_context() {
        let mut map = SourceMap::default();
        let source_id = map.add_source("main.bor", "let x = 5\nlet x = 6\n");
        let rendered = render_diagnostic(
            &map,
            &Diagnostic::error(Span::new(source_id, 14, 15), "redefinition of symbol 'x'")
                .with_label(Span::new(source_id, 4, 5), "previously defined here"),
        );
        assert!(rendered.contains("redefinition of symbol 'x'"));
        assert!(rendered.contains("main.bor"));
    }

    #[test]
    fn renders_builtin_span_without_source() {
        let map = SourceMap::default();
        let rendered = render_diagnostic(
            &map,
            &Diagnostic::error(Span::builtin(), "redefinition of symbol 'a'"),
        );
        assert!(rendered.contains("<builtin>"));
    }
}
