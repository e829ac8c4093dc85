use super::LogFormatter;
use httplog_core::{ExchangeRecord, ExchangeStart, HeaderLog, LoggedBody, SinkError};

/// Human-readable lines with entry and exit decorations
///
/// ```text
/// [+] POST /users?page=2, ip=10.0.0.7, sessionId=abc123, username=ann
/// [-] <201:12ms> POST /users?page=2, ip=10.0.0.7, sessionId=abc123, username=ann, requestBody={"password":"***"}, responseBody=created
/// ```
///
/// Exchanges without a status show their outcome in its place. Client
/// details, headers and bodies appear only when present in the record.
#[derive(Debug, Clone)]
pub struct TextFormatter {
    enter_decor: String,
    exit_decor: String,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            enter_decor: "[+] ".to_string(),
            exit_decor: "[-] ".to_string(),
        }
    }
}

impl TextFormatter {
    /// `[+] ` / `[-] ` decorations
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix of entry lines
    pub fn enter_decor(mut self, decor: impl Into<String>) -> Self {
        self.enter_decor = decor.into();
        self
    }

    /// Prefix of exit lines
    pub fn exit_decor(mut self, decor: impl Into<String>) -> Self {
        self.exit_decor = decor.into();
        self
    }
}

fn push_client(line: &mut String, ip: Option<&str>, session_id: Option<&str>, username: Option<&str>) {
    for (key, value) in [("ip", ip), ("sessionId", session_id), ("username", username)] {
        if let Some(value) = value {
            line.push_str(&format!(", {}={}", key, value));
        }
    }
}

fn push_headers(line: &mut String, key: &str, headers: &HeaderLog) {
    if headers.is_empty() {
        return;
    }

    let rendered: Vec<String> = headers
        .iter()
        .map(|(name, values)| format!("{}=[{}]", name, values.join(", ")))
        .collect();
    line.push_str(&format!(", {}={{{}}}", key, rendered.join(", ")));
}

fn push_body(line: &mut String, key: &str, body: &Option<LoggedBody>) {
    let Some(body) = body else {
        return;
    };
    if body.content.is_empty() {
        return;
    }

    line.push_str(&format!(", {}={}", key, body.text()));
    if let Some(truncation) = &body.truncation {
        line.push_str(&format!(" [truncated: {}, {} bytes total]", truncation, body.total_len));
    }
}

impl LogFormatter for TextFormatter {
    fn format(&self, record: &ExchangeRecord) -> Result<String, SinkError> {
        let head = match record.status {
            Some(status) => status.to_string(),
            None => record.outcome.to_string(),
        };

        let mut line = format!(
            "{}<{}:{}ms> {} {}",
            self.exit_decor,
            head,
            record.duration.as_millis(),
            record.method,
            record.uri
        );

        push_client(
            &mut line,
            record.client_ip.as_deref(),
            record.session_id.as_deref(),
            record.username.as_deref(),
        );
        if record.status.is_some() && !record.outcome.is_completed() {
            line.push_str(&format!(", outcome={}", record.outcome));
        }
        push_headers(&mut line, "requestHeaders", &record.request_headers);
        push_headers(&mut line, "responseHeaders", &record.response_headers);
        push_body(&mut line, "requestBody", &record.request_body);
        push_body(&mut line, "responseBody", &record.response_body);

        Ok(line)
    }

    fn format_start(&self, start: &ExchangeStart<'_>) -> Option<String> {
        let mut line = format!("{}{} {}", self.enter_decor, start.method, start.uri);
        push_client(&mut line, start.client_ip, start.session_id, start.username);
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::tests::record;
    use httplog_core::{ExchangeId, Outcome, Side, Truncation};

    #[test]
    fn test_exit_line() {
        let line = TextFormatter::new().format(&record()).unwrap();
        assert_eq!(
            line,
            r#"[-] <201:12ms> POST /users?page=2, ip=10.0.0.7, requestBody={"password":"***"}, responseBody=created"#
        );
    }

    #[test]
    fn test_entry_line_and_custom_decor() {
        let formatter = TextFormatter::new().enter_decor(">> ").exit_decor("<< ");
        let start = ExchangeStart {
            id: ExchangeId::new(),
            method: "GET",
            uri: "/health",
            client_ip: None,
            session_id: None,
            username: None,
            headers: &HeaderLog::new(),
        };
        assert_eq!(formatter.format_start(&start).unwrap(), ">> GET /health");
        assert!(formatter.format(&record()).unwrap().starts_with("<< <201:12ms>"));
    }

    #[test]
    fn test_client_details() {
        let mut record = record();
        record.session_id = Some("abc123".to_string());
        record.username = Some("ann".to_string());
        let line = TextFormatter::new().format(&record).unwrap();
        assert!(line.contains(", ip=10.0.0.7, sessionId=abc123, username=ann, requestBody="));

        let headers = HeaderLog::new();
        let start = ExchangeStart {
            id: record.id,
            method: "POST",
            uri: "/users",
            client_ip: None,
            session_id: Some("abc123"),
            username: Some("ann"),
            headers: &headers,
        };
        assert_eq!(
            TextFormatter::new().format_start(&start).unwrap(),
            "[+] POST /users, sessionId=abc123, username=ann"
        );
    }

    #[test]
    fn test_failed_exchange_shows_outcome() {
        let mut failed = record();
        failed.status = None;
        failed.client_ip = None;
        failed.response_body = None;
        failed.outcome = Outcome::HandlerError {
            message: "db down".to_string(),
        };
        let line = TextFormatter::new().format(&failed).unwrap();
        assert!(line.starts_with("[-] <handler error: db down:12ms> POST /users?page=2"));

        let mut cancelled = record();
        cancelled.outcome = Outcome::Cancelled {
            side: Some(Side::Response),
        };
        let line = TextFormatter::new().format(&cancelled).unwrap();
        assert!(line.contains(", outcome=cancelled during response"));
    }

    #[test]
    fn test_headers_and_truncation() {
        let mut record = record();
        record
            .request_headers
            .insert("accept".to_string(), vec!["a".to_string(), "b".to_string()]);
        if let Some(body) = record.response_body.as_mut() {
            body.truncation = Some(Truncation::Limit);
            body.total_len = 4096;
        }

        let line = TextFormatter::new().format(&record).unwrap();
        assert!(line.contains(", requestHeaders={accept=[a, b]}"));
        assert!(!line.contains("responseHeaders"));
        assert!(line.ends_with("responseBody=created [truncated: limit, 4096 bytes total]"));
    }

    #[test]
    fn test_empty_bodies_are_omitted() {
        let mut record = record();
        if let Some(body) = record.request_body.as_mut() {
            body.content = bytes::Bytes::new();
        }
        let line = TextFormatter::new().format(&record).unwrap();
        assert!(!line.contains("requestBody"));
        assert!(line.contains("responseBody=created"));
    }
}
