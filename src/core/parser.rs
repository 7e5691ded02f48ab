use chrono::{DateTime, FixedOffset, NaiveDateTime};
use regex::Regex;
use tracing::debug;

use crate::error::{LogHistoryError, Result};

/// Combined-log grammar: ip, time, path, status, bytes, referrer, user agent
const LOG_LINE_PATTERN: &str = concat!(
    r"([0-9]+.[0-9]+.[0-9]+.[0-9]+)\s-\s-\s",
    r"\[(.+)\]\s",
    r#""GET\s(.+)\s\w+/.+"\s"#,
    r"([0-9]+)\s",
    r"([0-9]+)\s",
    r#""(.+)"\s"#,
    r#""(.+)""#,
);

/// Timestamp layout inside the brackets, without the zone suffix
const LOG_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S";

/// Same layout with the numeric zone, e.g. `10/Oct/2026:13:55:36 +0200`
const LOG_ZONED_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Width of the ` +hhmm` suffix dropped by the fast parse
const ZONE_SUFFIX_LEN: usize = 6;

/// One GET request recovered from an access log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// 1-based line number in the log
    pub line: usize,

    /// Requesting client, used as the session key
    pub client_address: String,

    /// Bracketed timestamp exactly as logged
    pub raw_time: String,

    /// Timestamp with the zone suffix discarded
    pub timestamp: NaiveDateTime,

    pub path: String,
    pub status: u16,
    pub bytes_sent: u64,

    /// Referrer header, `-` when absent
    pub referrer: String,

    pub user_agent: String,
}

impl Request {
    /// Zone-aware parse of the raw timestamp, used where elapsed time must be exact
    pub fn zoned_timestamp(&self) -> Result<DateTime<FixedOffset>> {
        DateTime::parse_from_str(&self.raw_time, LOG_ZONED_TIME_FORMAT).map_err(|e| {
            LogHistoryError::MalformedLine {
                line: self.line,
                reason: format!("timestamp '{}': {}", self.raw_time, e),
            }
        })
    }
}

/// Turns raw access log lines into [`Request`]s
pub struct LogLineParser {
    line_regex: Regex,
}

impl LogLineParser {
    pub fn new() -> Self {
        Self {
            line_regex: Regex::new(LOG_LINE_PATTERN).expect("Invalid log line regex"),
        }
    }

    /// Parse one line.
    ///
    /// Lines that do not fit the grammar yield `Ok(None)`, and so do lines whose status or byte
    /// count does not fit its integer type. A line that fits but carries an unreadable timestamp
    /// is an error.
    pub fn parse_line(&self, line: &str, line_number: usize) -> Result<Option<Request>> {
        let Some(caps) = self.line_regex.captures(line) else {
            return Ok(None);
        };

        let (Ok(status), Ok(bytes_sent)) = (caps[4].parse::<u16>(), caps[5].parse::<u64>()) else {
            debug!(line = line_number, "skipping line with out of range status or byte count");
            return Ok(None);
        };

        let raw_time = caps[2].to_string();
        let timestamp = parse_log_time(&raw_time).map_err(|reason| LogHistoryError::MalformedLine {
            line: line_number,
            reason,
        })?;

        Ok(Some(Request {
            line: line_number,
            client_address: caps[1].to_string(),
            raw_time,
            timestamp,
            path: caps[3].to_string(),
            status,
            bytes_sent,
            referrer: caps[6].to_string(),
            user_agent: caps[7].to_string(),
        }))
    }
}

impl Default for LogLineParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Fast parse: cut the fixed-width zone suffix and read the rest as local wall time
fn parse_log_time(raw: &str) -> std::result::Result<NaiveDateTime, String> {
    let cut = raw
        .len()
        .checked_sub(ZONE_SUFFIX_LEN)
        .and_then(|end| raw.get(..end))
        .ok_or_else(|| format!("timestamp '{}' is too short", raw))?;

    NaiveDateTime::parse_from_str(cut, LOG_TIME_FORMAT)
        .map_err(|e| format!("timestamp '{}': {}", raw, e))
}
