//! Tracing setup: stdout formatting plus an optional append-only log file.

use std::fmt::Write as FmtWrite;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use supabase_migrate::{MigrateError, Result};
use tracing::level_filters::LevelFilter;
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Fields recorded on a span at creation, rendered as `name{k=v}`.
struct SpanFields(String);

/// A tracing layer appending one timestamped line per event to a file.
pub struct FileLogLayer {
    file: Mutex<File>,
}

impl FileLogLayer {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S> Layer<S> for FileLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        attrs.record(&mut visitor);
        let fields = visitor.finish();
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut line = format_line(
            &chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event.metadata().level(),
            &span_path(event, &ctx),
        );

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        line.push_str(&visitor.finish());
        line.push('\n');

        // A failing log file must not take the migration down with it.
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(line.as_bytes());
        }
    }
}

fn span_path<S>(event: &Event<'_>, ctx: &Context<'_, S>) -> String
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    ctx.event_scope(event)
        .map(|scope| {
            scope
                .from_root()
                .map(|span| {
                    let extensions = span.extensions();
                    let rendered = match extensions.get::<SpanFields>() {
                        Some(SpanFields(fields)) if !fields.is_empty() => {
                            format!("{}{{{}}}", span.name(), fields)
                        }
                        _ => span.name().to_string(),
                    };
                    rendered
                })
                .collect::<Vec<_>>()
                .join(":")
        })
        .unwrap_or_default()
}

fn format_line(timestamp: &str, level: &tracing::Level, spans: &str) -> String {
    let mut line = String::new();
    let _ = write!(line, "{} [{:5}] ", timestamp, level);
    if !spans.is_empty() {
        let _ = write!(line, "{}: ", spans);
    }
    line
}

/// Visitor collecting the message and any extra fields of an event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl MessageVisitor {
    fn finish(self) -> String {
        let mut out = self.message;
        for field in self.fields {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&field);
        }
        out
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }
}

/// Parse a `--verbosity` value.
pub fn parse_level(verbosity: &str) -> Result<LevelFilter> {
    match verbosity.to_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        other => Err(MigrateError::Config(format!(
            "Invalid verbosity '{}'. Valid values: trace, debug, info, warn, error",
            other
        ))),
    }
}

/// Install the global subscriber.
///
/// With `to_stderr` the stdout stream stays free for machine-readable output.
pub fn setup_logging(
    verbosity: &str,
    format: &str,
    log_file: Option<&Path>,
    to_stderr: bool,
) -> Result<()> {
    let level = parse_level(verbosity)?;

    let stdout_layer = match (format, to_stderr) {
        ("json", false) => tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(false)
            .boxed(),
        ("json", true) => tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        ("text", false) => tracing_subscriber::fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(false)
            .boxed(),
        ("text", true) => tracing_subscriber::fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        (other, _) => {
            return Err(MigrateError::Config(format!(
                "Invalid log format '{}'. Valid values: text, json",
                other
            )))
        }
    };

    let file_layer = log_file.map(FileLogLayer::open).transpose()?;

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(level)
        .try_init()
        .map_err(|e| MigrateError::Config(format!("failed to install logger: {}", e)))?;

    Ok(())
}
