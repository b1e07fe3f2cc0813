// 下载模块

pub mod engine;
pub mod resolver;
pub mod tree;

pub use engine::{resolve_destination, DownloadEngine, DownloadSummary};
pub use resolver::RemoteTreeResolver;
pub use tree::{NodeId, NodeKind, RemoteNode, RemoteTree, RemoteTreeBuilder};
