//! Log capture for asserting on what the activation layer reports.
//!
//! ```ignore
//! let capture = LogCapture::new().strip_colors(true);
//! let _default = capture.install();
//! tracing::warn!("Upload failed");
//! assert!(capture.contents().contains("warn: Upload failed"));
//! ```

use regex::Regex;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, Once, OnceLock};
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

static TEST_LOGGING_INIT: Once = Once::new();

/// Install a test-writer subscriber once per process.
///
/// Level comes from `TCS_TEST_LOG_LEVEL` (default `debug` for the tcs crates
/// and the `test` target used by integration tests).
pub fn init_test_logging() {
    TEST_LOGGING_INIT.call_once(|| {
        let level = std::env::var("TCS_TEST_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
        let filter =
            tracing_subscriber::EnvFilter::try_new(format!(
                "warn,tcs={level},tcs_common={level},test={level}"
            ))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .try_init();
    });
}

fn ansi_pattern() -> Option<&'static Regex> {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    ANSI.get_or_init(|| Regex::new(r"\x1b\[(\d+(;\d+)*)?m").ok())
        .as_ref()
}

/// Remove ANSI color escape sequences.
pub fn strip_ansi(message: &str) -> String {
    match ansi_pattern() {
        Some(pattern) => pattern.replace_all(message, "").into_owned(),
        None => message.to_string(),
    }
}

/// Tracing layer recording events as `level: message` lines.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    output: Arc<Mutex<String>>,
    strip_colors: bool,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strip ANSI color codes from captured messages.
    #[must_use]
    pub fn strip_colors(mut self, strip: bool) -> Self {
        self.strip_colors = strip;
        self
    }

    /// Make this capture the current thread's default subscriber.
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::set_default(subscriber)
    }

    /// Everything captured so far, one event per line.
    pub fn contents(&self) -> String {
        self.output
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Captured lines.
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }

    fn record(&self, level: &str, message: &str) {
        let message = if self.strip_colors {
            strip_ansi(message)
        } else {
            message.to_string()
        };
        let mut output = self
            .output
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !output.is_empty() {
            output.push('\n');
        }
        let _ = write!(output, "{level}: {message}");
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push(format!("{}={:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let mut line = visitor.message;
        for field in visitor.fields {
            line.push(' ');
            line.push_str(&field);
        }
        let level = event.metadata().level().as_str().to_lowercase();
        self.record(&level, &line);
    }
}
