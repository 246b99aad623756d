//! The analysis framework (spec §4.2-§4.5): CFG, dominator tree, data-flow
//! graph, liveness, and loop detection, plus the cache that memoizes them
//! per function for the pass manager (spec §4.6).

pub mod cache;
pub mod cfg;
pub mod dfg;
pub mod dominator_tree;
pub mod liveness;
pub mod loops;

pub use cache::{AnalysisCache, AnalysisKind};
pub use cfg::ControlFlowGraph;
pub use dfg::DataFlowGraph;
pub use dominator_tree::DominatorTree;
pub use liveness::Liveness;
pub use loops::{Loop, LoopForest};
