use std::collections::HashMap;

use crate::error::Result;
use super::{BotClassifier, Request};

/// Everything known about one client address within a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub ip: String,

    /// User agent of the first request
    pub user_agent: String,

    /// Raw timestamp of the first request
    pub datetime: String,

    /// Decided on first sighting and never revisited
    pub is_bot: bool,

    pub hit_count: usize,
}

impl Session {
    fn open(request: &Request, bots: &BotClassifier) -> Self {
        Self {
            ip: request.client_address.clone(),
            user_agent: request.user_agent.clone(),
            datetime: request.raw_time.clone(),
            is_bot: bots.is_bot(request),
            hit_count: 0,
        }
    }
}

/// A session plus the builder-specific state hanging off it
#[derive(Debug, Clone)]
pub struct SessionEntry<T> {
    pub session: Session,
    pub data: T,
}

/// Sessions in first-sighting order, looked up by client address
#[derive(Debug, Clone)]
pub struct SessionTable<T> {
    entries: Vec<SessionEntry<T>>,
    by_ip: HashMap<String, usize>,
}

impl<T> SessionTable<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_ip: HashMap::new(),
        }
    }

    /// Fetch the session for `request`, opening it with `init` on first sighting.
    /// The flag is true when the session was just created.
    pub fn entry(
        &mut self,
        request: &Request,
        bots: &BotClassifier,
        init: impl FnOnce() -> T,
    ) -> (&mut SessionEntry<T>, bool) {
        match self.by_ip.get(&request.client_address) {
            Some(&index) => (&mut self.entries[index], false),
            None => {
                let index = self.entries.len();
                self.entries.push(SessionEntry {
                    session: Session::open(request, bots),
                    data: init(),
                });
                self.by_ip.insert(request.client_address.clone(), index);
                (&mut self.entries[index], true)
            }
        }
    }

    pub fn get(&self, ip: &str) -> Option<&SessionEntry<T>> {
        self.by_ip.get(ip).map(|&index| &self.entries[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionEntry<T>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bot_count(&self) -> usize {
        self.entries.iter().filter(|e| e.session.is_bot).count()
    }
}

impl<T> Default for SessionTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Folds the in-window request sequence into one navigation view
pub trait NavigationBuilder {
    type Output;

    /// Consume the next request, in log order
    fn ingest(&mut self, request: &Request) -> Result<()>;

    /// Hand over the finished structure
    fn finish(self) -> Result<Self::Output>;
}

/// Run `builder` over `requests` in order
pub fn build<B: NavigationBuilder>(mut builder: B, requests: &[Request]) -> Result<B::Output> {
    for request in requests {
        builder.ingest(request)?;
    }
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;
    use chrono::NaiveDateTime;

    fn request(ip: &str, agent: &str) -> Request {
        Request {
            line: 1,
            client_address: ip.to_string(),
            raw_time: "10/Oct/2026:13:55:36 +0200".to_string(),
            timestamp: NaiveDateTime::default(),
            path: "/".to_string(),
            status: 200,
            bytes_sent: 0,
            referrer: "-".to_string(),
            user_agent: agent.to_string(),
        }
    }

    #[test]
    fn test_sessions_keep_first_sighting_order() {
        let bots = BotClassifier::new(&BotConfig::default());
        let mut table: SessionTable<()> = SessionTable::new();
        assert!(table.is_empty());

        for ip in ["9.9.9.9", "1.1.1.1", "9.9.9.9", "5.5.5.5"] {
            table.entry(&request(ip, "Mozilla"), &bots, || ());
        }

        let order: Vec<&str> = table.iter().map(|e| e.session.ip.as_str()).collect();
        assert_eq!(order, vec!["9.9.9.9", "1.1.1.1", "5.5.5.5"]);
        assert!(!table.is_empty());
    }

    #[test]
    fn test_bot_flag_is_fixed_at_first_sighting() {
        let bots = BotClassifier::new(&BotConfig::default());
        let mut table: SessionTable<()> = SessionTable::new();

        let (_, created) = table.entry(&request("1.2.3.4", "Mozilla/5.0"), &bots, || ());
        assert!(created);
        let (entry, created) = table.entry(&request("1.2.3.4", "Googlebot/2.1"), &bots, || ());
        assert!(!created);
        assert!(!entry.session.is_bot);
        assert_eq!(entry.session.user_agent, "Mozilla/5.0");

        table.entry(&request("5.6.7.8", "Googlebot/2.1"), &bots, || ());
        table.entry(&request("5.6.7.8", "Mozilla/5.0"), &bots, || ());
        assert!(table.get("5.6.7.8").unwrap().session.is_bot);
        assert_eq!(table.bot_count(), 1);
    }
}
