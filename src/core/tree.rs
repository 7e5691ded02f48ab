use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use super::{BotClassifier, NavigationBuilder, Request, SessionTable};

/// Index of a page node inside [`NavigationTree`]
pub type NodeId = usize;

/// One page view placed in a visitor's navigation tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageNode {
    /// Requested path
    pub name: String,
    pub referrer: String,
    /// Raw log timestamp
    pub datetime: String,
    pub children: Vec<NodeId>,
}

/// Per-visitor page trees; nodes live in one arena and link to children by index
#[derive(Debug, Clone, Default)]
pub struct NavigationTree {
    nodes: Vec<PageNode>,
    /// Session roots: the top-level page nodes of each visitor
    sessions: SessionTable<Vec<NodeId>>,
    /// Requests whose same-site referrer matched no recorded page
    dropped: usize,
}

impl NavigationTree {
    pub fn sessions(&self) -> &SessionTable<Vec<NodeId>> {
        &self.sessions
    }

    pub fn node(&self, id: NodeId) -> &PageNode {
        &self.nodes[id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

fn push_node(nodes: &mut Vec<PageNode>, request: &Request) -> NodeId {
    nodes.push(PageNode {
        name: request.path.clone(),
        referrer: request.referrer.clone(),
        datetime: request.raw_time.clone(),
        children: Vec::new(),
    });
    nodes.len() - 1
}

/// Threads each request onto the page its referrer points at
pub struct SessionTreeBuilder {
    site_name: String,
    site_prefix: String,
    bots: BotClassifier,
    tree: NavigationTree,
}

impl SessionTreeBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            site_name: config.site.name.clone(),
            site_prefix: config.site_prefix(),
            bots: BotClassifier::new(&config.bots),
            tree: NavigationTree::default(),
        }
    }

    /// Attach a node for `request` under the page its referrer names.
    ///
    /// Levels are searched depth first starting at the session roots. At each level the last
    /// matching page receives the new child and the search stops descending there; a level
    /// without a match hands each child's subtree to the search in order. Returns the number
    /// of nodes created, 0 when the referrer matches nothing recorded.
    fn attach(&mut self, roots: &[NodeId], request: &Request) -> usize {
        let mut attached = 0;
        let mut pending: Vec<Vec<NodeId>> = vec![roots.to_vec()];

        while let Some(level) = pending.pop() {
            let parent = level
                .iter()
                .rev()
                .copied()
                .find(|&id| self.is_referrer_of(id, request));

            match parent {
                Some(parent) => {
                    let child = push_node(&mut self.tree.nodes, request);
                    self.tree.nodes[parent].children.push(child);
                    attached += 1;
                }
                None => {
                    for &id in level.iter().rev() {
                        let children = &self.tree.nodes[id].children;
                        if !children.is_empty() {
                            pending.push(children.clone());
                        }
                    }
                }
            }
        }

        attached
    }

    fn is_referrer_of(&self, id: NodeId, request: &Request) -> bool {
        request.referrer.strip_prefix(self.site_prefix.as_str())
            == Some(self.tree.nodes[id].name.as_str())
    }
}

impl NavigationBuilder for SessionTreeBuilder {
    type Output = NavigationTree;

    fn ingest(&mut self, request: &Request) -> Result<()> {
        let NavigationTree { nodes, sessions, .. } = &mut self.tree;
        let (entry, _) = sessions.entry(request, &self.bots, Vec::new);
        entry.session.hit_count += 1;

        if !request.referrer.contains(self.site_name.as_str()) {
            // arrival from outside the site
            let id = push_node(nodes, request);
            entry.data.push(id);
            return Ok(());
        }

        let roots = entry.data.clone();
        if self.attach(&roots, request) == 0 {
            self.tree.dropped += 1;
        }
        Ok(())
    }

    fn finish(self) -> Result<Self::Output> {
        debug!(
            sessions = self.tree.sessions.len(),
            bots = self.tree.sessions.bot_count(),
            nodes = self.tree.node_count(),
            dropped = self.tree.dropped,
            "navigation tree built"
        );
        Ok(self.tree)
    }
}
