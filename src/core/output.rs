use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{LogHistoryError, Result};
use super::tree::PageNode;
use super::{FlowRow, FlowTable, NavigationTree, NodeId, SessionEntry};

/// Label of the tree document root
pub const TREE_ROOT_NAME: &str = "root_log";

/// Which view a run produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Navigation tree, selector 0
    Tree,
    /// Flow rows, selector 1
    Flow,
    /// Flow rows with their start time, selector 2
    Stack,
}

impl OutputMode {
    pub fn file_name(self) -> &'static str {
        match self {
            OutputMode::Tree => "tree.json",
            OutputMode::Flow => "flow.json",
            OutputMode::Stack => "stack.json",
        }
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "0" | "tree" => Ok(OutputMode::Tree),
            "1" | "flow" => Ok(OutputMode::Flow),
            "2" | "stack" => Ok(OutputMode::Stack),
            other => Err(format!(
                "unknown output mode '{}' (expected 0/tree, 1/flow or 2/stack)",
                other
            )),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputMode::Tree => "tree",
            OutputMode::Flow => "flow",
            OutputMode::Stack => "stack",
        };
        f.write_str(name)
    }
}

/// Render the navigation tree document
pub fn render_tree(tree: &NavigationTree) -> Result<String> {
    Ok(serde_json::to_string(&TreeDocument(tree))?)
}

/// Render the bare array of flow rows
pub fn render_flow(table: &FlowTable) -> Result<String> {
    Ok(serde_json::to_string(&FlowRows(table))?)
}

/// Render flow rows wrapped with the run start in epoch milliseconds
pub fn render_stack(table: &FlowTable) -> Result<String> {
    let origin = table.origin().ok_or(LogHistoryError::NoFlowOrigin)?;

    #[derive(Serialize)]
    struct StackDocument<'a> {
        start_time: i64,
        data: FlowRows<'a>,
    }

    Ok(serde_json::to_string(&StackDocument {
        start_time: origin.timestamp_millis(),
        data: FlowRows(table),
    })?)
}

/// Write `contents` to `path` through a sibling temporary file, so a failed run leaves no
/// partial artifact behind
pub async fn write_artifact(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let staging = staging_path(path);
    tokio::fs::write(&staging, contents).await?;
    if let Err(e) = tokio::fs::rename(&staging, path).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e.into());
    }
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Time keys print like the chart expects: `15` for whole seconds, `15.5` otherwise
fn format_key(key: f64) -> String {
    if key.fract() == 0.0 && key.abs() < 1e15 {
        format!("{}", key as i64)
    } else {
        format!("{}", key)
    }
}

struct TreeDocument<'a>(&'a NavigationTree);

impl Serialize for TreeDocument<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let tree = self.0;
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("name", TREE_ROOT_NAME)?;
        map.serialize_entry("children", &SessionNodes(tree))?;
        map.end()
    }
}

struct SessionNodes<'a>(&'a NavigationTree);

impl Serialize for SessionNodes<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let tree = self.0;
        serializer.collect_seq(tree.sessions().iter().map(|entry| SessionNode { tree, entry }))
    }
}

struct SessionNode<'a> {
    tree: &'a NavigationTree,
    entry: &'a SessionEntry<Vec<NodeId>>,
}

impl Serialize for SessionNode<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let session = &self.entry.session;
        let mut map = serializer.serialize_map(Some(6))?;
        map.serialize_entry("name", &session.ip)?;
        map.serialize_entry("UA", &session.user_agent)?;
        map.serialize_entry("datetime", &session.datetime)?;
        map.serialize_entry(
            "children",
            &PageChildren { tree: self.tree, ids: &self.entry.data, arrivals: true },
        )?;
        map.serialize_entry("count", &session.hit_count)?;
        map.serialize_entry("is_bot", &session.is_bot)?;
        map.end()
    }
}

struct PageChildren<'a> {
    tree: &'a NavigationTree,
    ids: &'a [NodeId],
    /// Session roots list `children` ahead of `datetime`; attached pages the other way round
    arrivals: bool,
}

impl Serialize for PageChildren<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.ids.len()))?;
        for &id in self.ids {
            seq.serialize_element(&PageEntry {
                tree: self.tree,
                node: self.tree.node(id),
                arrival: self.arrivals,
            })?;
        }
        seq.end()
    }
}

struct PageEntry<'a> {
    tree: &'a NavigationTree,
    node: &'a PageNode,
    arrival: bool,
}

impl Serialize for PageEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let node = self.node;
        let children = PageChildren { tree: self.tree, ids: &node.children, arrivals: false };

        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("name", &node.name)?;
        map.serialize_entry("ref", &node.referrer)?;
        if self.arrival {
            map.serialize_entry("children", &children)?;
            map.serialize_entry("datetime", &node.datetime)?;
        } else {
            map.serialize_entry("datetime", &node.datetime)?;
            map.serialize_entry("children", &children)?;
        }
        map.end()
    }
}

struct FlowRows<'a>(&'a FlowTable);

impl Serialize for FlowRows<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.rows())
    }
}

impl Serialize for FlowRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.points().len() + 2))?;
        map.serialize_entry("name", &self.ip)?;
        map.serialize_entry("team", &self.ip)?;
        for (key, folder) in self.points() {
            map.serialize_entry(&format_key(*key), folder)?;
        }
        map.end()
    }
}
