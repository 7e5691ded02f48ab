use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use super::filter::contains_any;
use super::{BotClassifier, FolderClassifier, NavigationBuilder, Request, SessionTable};

/// Minimum gap, in seconds, between two recorded points for a transition to be inferred
const SYNTHESIS_MIN_GAP: f64 = 2.0;

/// Sparse timeline of the folders one visitor was in
///
/// Keys are seconds since the run origin. Points keep insertion order; writing an existing key
/// replaces its folder without moving it.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRow {
    pub ip: String,
    points: Vec<(f64, String)>,
}

impl FlowRow {
    pub fn new(ip: &str, at: f64, folder: String) -> Self {
        Self {
            ip: ip.to_string(),
            points: vec![(at, folder)],
        }
    }

    pub fn insert(&mut self, at: f64, folder: String) {
        match self.points.iter_mut().find(|(key, _)| *key == at) {
            Some(point) => point.1 = folder,
            None => self.points.push((at, folder)),
        }
    }

    /// Most recently inserted point
    pub fn last(&self) -> Option<(f64, &str)> {
        self.points.last().map(|(key, folder)| (*key, folder.as_str()))
    }

    pub fn points(&self) -> &[(f64, String)] {
        &self.points
    }
}

/// All flow rows of a run plus the instant they are measured from
#[derive(Debug, Clone, Default)]
pub struct FlowTable {
    rows: SessionTable<FlowRow>,
    origin: Option<DateTime<FixedOffset>>,
    synthesized: usize,
}

impl FlowTable {
    pub fn rows(&self) -> impl Iterator<Item = &FlowRow> {
        self.rows.iter().map(|entry| &entry.data)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, ip: &str) -> Option<&FlowRow> {
        self.rows.get(ip).map(|entry| &entry.data)
    }

    /// Timestamp of the first in-window request, `None` for an empty run
    pub fn origin(&self) -> Option<DateTime<FixedOffset>> {
        self.origin
    }

    pub fn synthesized(&self) -> usize {
        self.synthesized
    }
}

/// Builds per-visitor folder timelines, inferring folders passed through via the referrer
pub struct FlowTableBuilder {
    site_prefix: String,
    blacklist_folders: Vec<String>,
    folders: FolderClassifier,
    bots: BotClassifier,
    table: FlowTable,
}

impl FlowTableBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            site_prefix: config.site_prefix(),
            blacklist_folders: config.filters.blacklist_folders.clone(),
            folders: FolderClassifier::new(config.folders.depth),
            bots: BotClassifier::new(&config.bots),
            table: FlowTable::default(),
        }
    }

    /// Folder of the same-site page the request came from, if any
    fn referrer_folder(&self, request: &Request) -> Option<String> {
        request
            .referrer
            .strip_prefix(self.site_prefix.as_str())
            .map(|path| self.folders.classify(path))
    }
}

impl NavigationBuilder for FlowTableBuilder {
    type Output = FlowTable;

    fn ingest(&mut self, request: &Request) -> Result<()> {
        let at = request.zoned_timestamp()?;
        let origin = *self.table.origin.get_or_insert(at);
        let elapsed = at.signed_duration_since(origin).num_seconds() as f64;

        let folder = self.folders.classify(&request.path);
        let referrer_folder = self.referrer_folder(request);

        let (entry, created) = self.table.rows.entry(request, &self.bots, || {
            FlowRow::new(&request.client_address, elapsed, folder.clone())
        });
        entry.session.hit_count += 1;
        if created {
            return Ok(());
        }

        let row = &mut entry.data;
        if let Some(referrer_folder) = referrer_folder {
            let blacklist = &self.blacklist_folders;
            let midpoint_after = row.last().and_then(|(last_key, last_folder)| {
                let passed_through = referrer_folder != last_folder
                    && referrer_folder != folder
                    && elapsed - SYNTHESIS_MIN_GAP >= last_key
                    && !contains_any(&referrer_folder, blacklist);
                passed_through.then_some(last_key)
            });

            if let Some(last_key) = midpoint_after {
                row.insert((last_key + elapsed) / 2.0, referrer_folder);
                self.table.synthesized += 1;
            }
        }
        row.insert(elapsed, folder);

        Ok(())
    }

    fn finish(self) -> Result<Self::Output> {
        debug!(
            rows = self.table.rows.len(),
            bots = self.table.rows.bot_count(),
            synthesized = self.table.synthesized,
            "flow table built"
        );
        Ok(self.table)
    }
}
