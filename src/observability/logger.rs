//! Structured JSON logger
//!
//! - One log line = one event
//! - `event` first, `severity` second, then `ts`, then fields sorted by key
//! - A logger carries bound fields; [`Logger::with`] derives a scoped child
//! - Synchronous, no buffering

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Diagnostic detail
    Debug = 0,
    /// Normal operations
    Info = 1,
    /// Recoverable issues
    Warn = 2,
    /// Operation failures
    Error = 3,
}

impl Severity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// Where log lines end up
enum LogTarget {
    Stdout,
    File(Mutex<File>),
    Memory(Mutex<Vec<String>>),
    Discard,
}

impl LogTarget {
    fn emit(&self, line: &str) {
        match self {
            LogTarget::Stdout => {
                let mut out = io::stdout().lock();
                let _ = out.write_all(line.as_bytes());
                let _ = out.flush();
            }
            LogTarget::File(file) => {
                let mut file = file.lock().unwrap_or_else(|e| e.into_inner());
                let _ = file.write_all(line.as_bytes());
            }
            LogTarget::Memory(lines) => {
                lines
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(line.trim_end().to_string());
            }
            LogTarget::Discard => {}
        }
    }
}

/// A structured logger with bound fields
///
/// Cloning is cheap; clones share the same target.
#[derive(Clone)]
pub struct Logger {
    target: Arc<LogTarget>,
    level: Severity,
    fields: Arc<Vec<(String, String)>>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level)
            .field("fields", &self.fields)
            .finish()
    }
}

impl Logger {
    fn with_target(target: LogTarget, level: Severity) -> Self {
        Self {
            target: Arc::new(target),
            level,
            fields: Arc::new(Vec::new()),
        }
    }

    /// Log to stdout
    pub fn stdout(level: Severity) -> Self {
        Self::with_target(LogTarget::Stdout, level)
    }

    /// Append to a log file, creating it and its parent directory if needed
    pub fn file(path: &Path, level: Severity) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::with_target(LogTarget::File(Mutex::new(file)), level))
    }

    /// Keep lines in memory (see [`Logger::lines`])
    pub fn memory(level: Severity) -> Self {
        Self::with_target(LogTarget::Memory(Mutex::new(Vec::new())), level)
    }

    /// Drop everything
    pub fn discard() -> Self {
        Self::with_target(LogTarget::Discard, Severity::Error)
    }

    /// Derive a logger that adds `fields` to every line
    pub fn with(&self, fields: &[(&str, &str)]) -> Logger {
        let mut merged = (*self.fields).clone();
        merged.extend(fields.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        Logger {
            target: Arc::clone(&self.target),
            level: self.level,
            fields: Arc::new(merged),
        }
    }

    /// Minimum severity written by this logger
    pub fn level(&self) -> Severity {
        self.level
    }

    /// Lines captured by a memory logger, oldest first
    pub fn lines(&self) -> Vec<String> {
        match self.target.as_ref() {
            LogTarget::Memory(lines) => lines.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            _ => Vec::new(),
        }
    }

    /// Log an event with the given severity and fields
    pub fn log(&self, severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity < self.level {
            return;
        }
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.target.emit(&self.render(severity, event, &ts, fields));
    }

    fn render(&self, severity: Severity, event: &str, ts: &str, fields: &[(&str, &str)]) -> String {
        // call-site fields win over bound ones with the same key
        let mut sorted: BTreeMap<&str, &str> = BTreeMap::new();
        for (k, v) in self.fields.iter() {
            sorted.insert(k.as_str(), v.as_str());
        }
        for (k, v) in fields {
            sorted.insert(k, v);
        }

        let mut output = String::with_capacity(256);
        output.push_str("{\"event\":\"");
        escape_json_string(&mut output, event);
        output.push_str("\",\"severity\":\"");
        output.push_str(severity.as_str());
        output.push_str("\",\"ts\":\"");
        output.push_str(ts);
        output.push('"');

        for (key, value) in sorted {
            output.push_str(",\"");
            escape_json_string(&mut output, key);
            output.push_str("\":\"");
            escape_json_string(&mut output, value);
            output.push('"');
        }

        output.push_str("}\n");
        output
    }

    /// Log at DEBUG level
    pub fn debug(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Debug, event, fields);
    }

    /// Log at INFO level
    pub fn info(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Info, event, fields);
    }

    /// Log at WARN level
    pub fn warn(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Warn, event, fields);
    }

    /// Log at ERROR level
    pub fn error(&self, event: &str, fields: &[(&str, &str)]) {
        self.log(Severity::Error, event, fields);
    }
}

/// Escape special characters for JSON strings
fn escape_json_string(output: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c.is_control() => {
                output.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => output.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(logger: &Logger, event: &str, fields: &[(&str, &str)]) -> String {
        logger.render(Severity::Info, event, "2024-01-01T00:00:00.000Z", fields)
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("INFO".parse::<Severity>().unwrap(), Severity::Info);
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warn);
        assert!("verbose".parse::<Severity>().is_err());
    }

    #[test]
    fn test_log_json_format() {
        let logger = Logger::discard();
        let output = render(&logger, "TEST_EVENT", &[("key1", "value1")]);

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["event"], "TEST_EVENT");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["key1"], "value1");
        assert!(output.starts_with("{\"event\""));
        assert_eq!(output.chars().filter(|c| *c == '\n').count(), 1);
    }

    #[test]
    fn test_log_deterministic_ordering() {
        let logger = Logger::discard();
        let output1 = render(&logger, "TEST", &[("zebra", "1"), ("apple", "2"), ("mango", "3")]);
        let output2 = render(&logger, "TEST", &[("apple", "2"), ("mango", "3"), ("zebra", "1")]);
        assert_eq!(output1, output2);

        let apple_pos = output1.find("apple").unwrap();
        let zebra_pos = output1.find("zebra").unwrap();
        assert!(apple_pos < zebra_pos);
    }

    #[test]
    fn test_log_escapes_special_chars() {
        let logger = Logger::discard();
        let output = render(&logger, "TEST", &[("message", "hello \"world\"\nline2")]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["message"], "hello \"world\"\nline2");
    }

    #[test]
    fn test_scoped_fields_are_inherited() {
        let logger = Logger::memory(Severity::Debug);
        let scoped = logger.with(&[("request.id", "r:1")]);
        scoped.info("stats", &[("request.status", "200")]);

        let lines = logger.lines();
        assert_eq!(lines.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed["request.id"], "r:1");
        assert_eq!(parsed["request.status"], "200");
    }

    #[test]
    fn test_call_site_field_overrides_bound_field() {
        let logger = Logger::memory(Severity::Debug).with(&[("id", "bound")]);
        logger.info("TEST", &[("id", "call")]);
        let parsed: serde_json::Value = serde_json::from_str(&logger.lines()[0]).unwrap();
        assert_eq!(parsed["id"], "call");
    }

    #[test]
    fn test_level_filters_lines() {
        let logger = Logger::memory(Severity::Warn);
        logger.info("DROPPED", &[]);
        logger.error("KEPT", &[]);
        let lines = logger.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("KEPT"));
    }
}
