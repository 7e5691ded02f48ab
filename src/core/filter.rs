use chrono::{Duration, NaiveDateTime};

use crate::config::FilterConfig;
use crate::error::{LogHistoryError, Result};
use super::Request;

/// Layout accepted for `--start`/`--end`, e.g. `24/12/2026@18:30:00`
pub const WINDOW_BOUND_FORMAT: &str = "%d/%m/%Y@%H:%M:%S";

/// Inclusive analysis interval, compared against zone-less log timestamps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if start > end {
            return Err(LogHistoryError::Window(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// The hour leading up to `now`
    pub fn trailing_hour(now: NaiveDateTime) -> Self {
        Self {
            start: now - Duration::hours(1),
            end: now,
        }
    }

    /// Build a window from two command-line bounds
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_bound(start)?, parse_bound(end)?)
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

fn parse_bound(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, WINDOW_BOUND_FORMAT).map_err(|e| {
        LogHistoryError::Window(format!(
            "'{}' does not match {}: {}",
            value, WINDOW_BOUND_FORMAT, e
        ))
    })
}

/// Decides which parsed requests take part in the analysis
#[derive(Debug, Clone)]
pub struct RequestFilter {
    window: TimeWindow,
    whitelist_extensions: Vec<String>,
    blacklist_folders: Vec<String>,
}

impl RequestFilter {
    pub fn new(window: TimeWindow, config: &FilterConfig) -> Self {
        Self {
            window,
            whitelist_extensions: config.whitelist_extensions.clone(),
            blacklist_folders: config.blacklist_folders.clone(),
        }
    }

    /// In window, not blacklisted, and either a page, a directory or extensionless
    pub fn admits(&self, request: &Request) -> bool {
        self.window.contains(request.timestamp) && self.admits_path(&request.path)
    }

    pub fn admits_path(&self, path: &str) -> bool {
        if self.is_blacklisted(path) {
            return false;
        }

        contains_any(path, &self.whitelist_extensions)
            || path.ends_with('/')
            || !path.contains('.')
    }

    /// True when any blacklisted folder occurs anywhere in `text`
    pub fn is_blacklisted(&self, text: &str) -> bool {
        contains_any(text, &self.blacklist_folders)
    }
}

/// True when any of `needles` occurs in `text`
pub fn contains_any(text: &str, needles: &[String]) -> bool {
    needles.iter().any(|needle| text.contains(needle.as_str()))
}
