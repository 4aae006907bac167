//! stackflow core
//!
//! 宣言モデル、KDLローダー、リソースグラフ構築を提供します。
//! このクレートは副作用を持たず、プロビジョニングは stackflow-cloud が担当します。

pub mod discovery;
pub mod error;
pub mod graph;
pub mod loader;
pub mod model;
pub mod parser;
pub mod template;

pub use discovery::{DiscoveredFiles, discover_files, find_project_root, find_project_root_from};
pub use error::{Result, StackError};
pub use graph::{
    DataBinding, Edge, EdgeKind, ExportBinding, Graph, GraphBuilder, NodeId, ResourceNode,
};
pub use loader::{load_stack, load_stack_from_root};
pub use model::*;
pub use parser::{parse_kdl_file, parse_kdl_string, parse_kdl_string_with_environment};
