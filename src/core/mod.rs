mod engine;
mod parser;
mod filter;
mod folder;
mod bot;
mod session;
mod tree;
mod flow;
mod output;

pub use parser::{LogLineParser, Request};
pub use filter::{RequestFilter, TimeWindow};
pub use folder::FolderClassifier;
pub use bot::BotClassifier;
pub use session::{build, NavigationBuilder, SessionEntry, SessionTable};
pub use tree::{NavigationTree, NodeId, SessionTreeBuilder};
pub use flow::{FlowRow, FlowTable, FlowTableBuilder};
pub use output::{render_flow, render_stack, render_tree, write_artifact, OutputMode};

// Export the main engine
pub use engine::Engine;
