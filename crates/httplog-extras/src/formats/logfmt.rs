use super::{quote, LogFormatter};
use httplog_core::{ExchangeRecord, ExchangeStart, LoggedBody, SinkError};

/// `key=value` pairs, one record per line
///
/// Values containing whitespace, quotes or `=` are quoted and escaped, so a
/// body never spills onto a second line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogfmtFormatter {
    headers: bool,
}

impl LogfmtFormatter {
    /// Pairs for the exchange and its bodies
    pub fn new() -> Self {
        Self::default()
    }

    /// Also emit one pair per logged header, as `req.<name>` / `res.<name>`
    pub fn with_headers(mut self, enabled: bool) -> Self {
        self.headers = enabled;
        self
    }
}

fn pair(line: &mut String, key: &str, value: &str) {
    if !line.is_empty() {
        line.push(' ');
    }
    line.push_str(key);
    line.push('=');
    line.push_str(&quote(value));
}

fn client_pairs(line: &mut String, ip: Option<&str>, session_id: Option<&str>, username: Option<&str>) {
    for (key, value) in [("client_ip", ip), ("session_id", session_id), ("username", username)] {
        if let Some(value) = value {
            pair(line, key, value);
        }
    }
}

fn body_pairs(line: &mut String, prefix: &str, body: &Option<LoggedBody>) {
    let Some(body) = body else {
        return;
    };
    pair(line, prefix, &body.text());
    pair(line, &format!("{}_len", prefix), &body.total_len.to_string());
    if let Some(truncation) = &body.truncation {
        pair(line, &format!("{}_truncated", prefix), &truncation.to_string());
    }
}

impl LogFormatter for LogfmtFormatter {
    fn format(&self, record: &ExchangeRecord) -> Result<String, SinkError> {
        let mut line = String::new();
        pair(&mut line, "exchange_id", &record.id.to_string());
        pair(&mut line, "method", &record.method);
        pair(&mut line, "uri", &record.uri);
        if let Some(status) = record.status {
            pair(&mut line, "status", &status.to_string());
        }
        pair(&mut line, "duration_ms", &record.duration.as_millis().to_string());
        client_pairs(
            &mut line,
            record.client_ip.as_deref(),
            record.session_id.as_deref(),
            record.username.as_deref(),
        );
        pair(&mut line, "outcome", &record.outcome.to_string());

        if self.headers {
            for (prefix, headers) in [("req", &record.request_headers), ("res", &record.response_headers)] {
                for (name, values) in headers {
                    pair(&mut line, &format!("{}.{}", prefix, name), &values.join(", "));
                }
            }
        }

        body_pairs(&mut line, "request_body", &record.request_body);
        body_pairs(&mut line, "response_body", &record.response_body);
        Ok(line)
    }

    fn format_start(&self, start: &ExchangeStart<'_>) -> Option<String> {
        let mut line = String::new();
        pair(&mut line, "exchange_id", &start.id.to_string());
        pair(&mut line, "event", "start");
        pair(&mut line, "method", start.method);
        pair(&mut line, "uri", start.uri);
        client_pairs(&mut line, start.client_ip, start.session_id, start.username);
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::tests::record;
    use httplog_core::Outcome;
    use proptest::prelude::*;

    #[test]
    fn test_record_line() {
        let record = record();
        let line = LogfmtFormatter::new().format(&record).unwrap();
        let expected = format!(
            r#"exchange_id={} method=POST uri="/users?page=2" status=201 duration_ms=12 client_ip=10.0.0.7 outcome=completed request_body="{{\"password\":\"***\"}}" request_body_len=22 response_body=created response_body_len=7"#,
            record.id
        );
        assert_eq!(line, expected);
    }

    #[test]
    fn test_client_pairs() {
        let mut record = record();
        record.session_id = Some("abc123".to_string());
        record.username = Some("ann lee".to_string());
        let line = LogfmtFormatter::new().format(&record).unwrap();
        assert!(line.contains(r#" client_ip=10.0.0.7 session_id=abc123 username="ann lee" outcome=completed "#));
    }

    #[test]
    fn test_headers_and_failures() {
        let mut record = record();
        record.status = None;
        record.outcome = Outcome::Aborted;
        record
            .response_headers
            .insert("content-type".to_string(), vec!["text/plain".to_string()]);

        let line = LogfmtFormatter::new().with_headers(true).format(&record).unwrap();
        assert!(!line.contains("status="));
        assert!(line.contains(" outcome=aborted "));
        assert!(line.contains(" res.content-type=text/plain "));

        let without = LogfmtFormatter::new().format(&record).unwrap();
        assert!(!without.contains("res.content-type"));
    }

    proptest! {
        #[test]
        fn prop_body_never_breaks_the_line(text in "\\PC*") {
            let mut record = record();
            if let Some(body) = record.response_body.as_mut() {
                body.content = bytes::Bytes::from(format!("{}\n{}", text, text));
            }
            let line = LogfmtFormatter::new().format(&record).unwrap();
            prop_assert!(!line.contains('\n'));
        }
    }
}
