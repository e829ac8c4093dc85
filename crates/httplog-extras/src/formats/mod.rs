//! Log line formatters
//!
//! A [`LogFormatter`] turns an [`ExchangeRecord`] into one line of text.
//! [`FormattingSink`] plugs any formatter into the recorder, writing each
//! line through `tracing` or to a writer of your choice.
//!
//! # Example
//!
//! ```rust
//! use httplog_core::{ExchangeRecorder, LoggingConfig};
//! use httplog_extras::formats::{FormattingSink, TextFormatter};
//!
//! let config = LoggingConfig::builder().log_bodies(true).build().unwrap();
//! let sink = FormattingSink::new(TextFormatter::new()).with_entry_lines(true);
//! let recorder = ExchangeRecorder::new(config, sink);
//! ```

mod logfmt;
mod text;

pub use logfmt::LogfmtFormatter;
pub use text::TextFormatter;

use httplog_core::{ExchangeRecord, ExchangeStart, LogSink, SinkError};
use std::fmt;
use std::io::Write;
use std::sync::Mutex;

/// Renders records as single log lines
pub trait LogFormatter: Send + Sync {
    /// Render a completed exchange
    fn format(&self, record: &ExchangeRecord) -> Result<String, SinkError>;

    /// Render the start of an exchange, if the format has an entry line
    fn format_start(&self, _start: &ExchangeStart<'_>) -> Option<String> {
        None
    }
}

/// One JSON object per record
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Compact output
    pub fn new() -> Self {
        Self::default()
    }

    /// Indented output spanning several lines
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl LogFormatter for JsonFormatter {
    fn format(&self, record: &ExchangeRecord) -> Result<String, SinkError> {
        let line = if self.pretty {
            serde_json::to_string_pretty(record)?
        } else {
            serde_json::to_string(record)?
        };
        Ok(line)
    }
}

enum Output {
    Tracing,
    Writer(Mutex<Box<dyn Write + Send>>),
}

/// Sink writing formatted lines
///
/// By default lines go to `tracing` on the `httplog` target: 5xx and
/// exchanges that did not complete at `ERROR`, 4xx at `WARN`, the rest at
/// `INFO`. Entry lines, when enabled, go out at `INFO`.
pub struct FormattingSink<F> {
    formatter: F,
    output: Output,
    entry_lines: bool,
}

impl<F: LogFormatter> FormattingSink<F> {
    /// Write lines through `tracing`
    pub fn new(formatter: F) -> Self {
        Self {
            formatter,
            output: Output::Tracing,
            entry_lines: false,
        }
    }

    /// Write lines to `writer`, one per record
    pub fn with_writer(formatter: F, writer: impl Write + Send + 'static) -> Self {
        Self {
            formatter,
            output: Output::Writer(Mutex::new(Box::new(writer))),
            entry_lines: false,
        }
    }

    /// Also write a line when an exchange starts
    pub fn with_entry_lines(mut self, enabled: bool) -> Self {
        self.entry_lines = enabled;
        self
    }

    /// The formatter
    pub fn formatter(&self) -> &F {
        &self.formatter
    }

    fn write_line(&self, level: tracing::Level, line: &str) -> Result<(), SinkError> {
        match &self.output {
            Output::Tracing => {
                if level == tracing::Level::ERROR {
                    tracing::error!(target: "httplog", "{}", line);
                } else if level == tracing::Level::WARN {
                    tracing::warn!(target: "httplog", "{}", line);
                } else {
                    tracing::info!(target: "httplog", "{}", line);
                }
                Ok(())
            }
            Output::Writer(writer) => {
                let mut writer = writer
                    .lock()
                    .map_err(|e| SinkError::Failed(format!("failed to acquire lock: {}", e)))?;
                writeln!(writer, "{}", line).map_err(|e| SinkError::Failed(e.to_string()))
            }
        }
    }
}

impl<F: LogFormatter> LogSink for FormattingSink<F> {
    fn emit(&self, record: ExchangeRecord) -> Result<(), SinkError> {
        let line = self.formatter.format(&record)?;
        let level = if record.is_failure() {
            tracing::Level::ERROR
        } else if record.is_client_error() {
            tracing::Level::WARN
        } else {
            tracing::Level::INFO
        };
        self.write_line(level, &line)
    }

    fn exchange_started(&self, start: &ExchangeStart<'_>) {
        if !self.entry_lines {
            return;
        }
        if let Some(line) = self.formatter.format_start(start) {
            if let Err(e) = self.write_line(tracing::Level::INFO, &line) {
                tracing::warn!(exchange_id = %start.id, error = %e, "failed to write entry line");
            }
        }
    }
}

impl<F: fmt::Debug> fmt::Debug for FormattingSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let output = match self.output {
            Output::Tracing => "tracing",
            Output::Writer(_) => "writer",
        };
        f.debug_struct("FormattingSink")
            .field("formatter", &self.formatter)
            .field("output", &output)
            .field("entry_lines", &self.entry_lines)
            .finish()
    }
}

/// Quote `value` if it contains anything that would break a `key=value` pair
fn quote(value: &str) -> String {
    if !value.is_empty() && !value.contains(|c: char| c.is_whitespace() || c == '"' || c == '=') {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes::Bytes;
    use httplog_core::redact::RedactionNote;
    use httplog_core::{ExchangeId, HeaderLog, LoggedBody, Outcome};
    use std::sync::Arc;
    use std::time::{Duration, UNIX_EPOCH};

    pub(crate) fn record() -> ExchangeRecord {
        ExchangeRecord {
            id: ExchangeId::new(),
            started_at: UNIX_EPOCH + Duration::from_secs(1),
            ended_at: UNIX_EPOCH + Duration::from_millis(1_012),
            duration: Duration::from_millis(12),
            method: "POST".to_string(),
            uri: "/users?page=2".to_string(),
            client_ip: Some("10.0.0.7".to_string()),
            session_id: None,
            username: None,
            request_headers: HeaderLog::new(),
            request_body: Some(LoggedBody {
                content: Bytes::from_static(br#"{"password":"***"}"#),
                content_type: Some("application/json".to_string()),
                total_len: 22,
                truncation: None,
                redaction: RedactionNote::Masked { matches: 1 },
            }),
            status: Some(201),
            response_headers: HeaderLog::new(),
            response_body: Some(LoggedBody {
                content: Bytes::from_static(b"created"),
                content_type: Some("text/plain".to_string()),
                total_len: 7,
                truncation: None,
                redaction: RedactionNote::NotJson,
            }),
            outcome: Outcome::Completed,
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_json_formatter() {
        let line = JsonFormatter::new().format(&record()).unwrap();
        assert!(!line.contains('\n'));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["status"], 201);
        assert_eq!(value["request_body"]["content"], r#"{"password":"***"}"#);
        assert_eq!(value["outcome"]["kind"], "completed");

        let pretty = JsonFormatter::pretty().format(&record()).unwrap();
        assert!(pretty.contains('\n'));
    }

    #[test]
    fn test_writer_sink_writes_one_line_per_record() {
        let buffer = SharedBuffer::default();
        let sink = FormattingSink::with_writer(TextFormatter::new(), buffer.clone()).with_entry_lines(true);

        sink.exchange_started(&ExchangeStart {
            id: ExchangeId::new(),
            method: "POST",
            uri: "/users?page=2",
            client_ip: Some("10.0.0.7"),
            session_id: None,
            username: None,
            headers: &HeaderLog::new(),
        });
        sink.emit(record()).unwrap();

        let contents = buffer.contents();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[+] POST /users?page=2"));
        assert!(lines[1].starts_with("[-] <201:12ms> POST /users?page=2"));
    }

    #[test]
    fn test_entry_lines_off_by_default() {
        let buffer = SharedBuffer::default();
        let sink = FormattingSink::with_writer(TextFormatter::new(), buffer.clone());
        sink.exchange_started(&ExchangeStart {
            id: ExchangeId::new(),
            method: "GET",
            uri: "/",
            client_ip: None,
            session_id: None,
            username: None,
            headers: &HeaderLog::new(),
        });
        assert!(buffer.contents().is_empty());
    }

    #[test]
    fn test_tracing_sink_output() {
        let sink = FormattingSink::new(LogfmtFormatter::new());
        assert!(sink.emit(record()).is_ok());
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote(""), "\"\"");
        assert_eq!(quote("a b"), "\"a b\"");
        assert_eq!(quote(r#"{"k":"v"}"#), r#""{\"k\":\"v\"}""#);
        assert_eq!(quote("line\nbreak"), "\"line\\nbreak\"");
    }
}
