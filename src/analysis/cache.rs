//! Analysis cache (spec §4.6): memoizes derived analyses keyed by
//! (analysis-kind, function), recomputing only what a pass actually declares
//! as `required_analyses` and dropping everything a mutating pass does not
//! explicitly `preserved_analyses`.
//!
//! Grounded on `cranelift-codegen`'s per-function analysis recomputation
//! pattern (`ControlFlowGraph`/`DominatorTree` held alongside a `Context` and
//! explicitly recomputed after legalization); this crate makes the
//! memoization explicit as its own type since the spec calls it out as a
//! first-class component (§4.6) rather than leaving it implicit in the pass
//! manager.

use crate::analysis::cfg::ControlFlowGraph;
use crate::analysis::dfg::DataFlowGraph;
use crate::analysis::dominator_tree::DominatorTree;
use crate::analysis::liveness::Liveness;
use crate::analysis::loops::LoopForest;
use crate::ir::function::Function;

/// The set of analysis kinds a pass may require or preserve (spec §4.6).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum AnalysisKind {
    Cfg,
    DominatorTree,
    Dfg,
    Liveness,
    Loops,
}

/// Every analysis kind, for passes that invalidate everything.
pub const ALL_KINDS: &[AnalysisKind] = &[
    AnalysisKind::Cfg,
    AnalysisKind::DominatorTree,
    AnalysisKind::Dfg,
    AnalysisKind::Liveness,
    AnalysisKind::Loops,
];

/// Memoized analyses for a single function. `DominatorTree`/`Liveness`/
/// `LoopForest` each depend on `ControlFlowGraph` being present; this cache
/// recomputes the dependency chain transparently.
#[derive(Default)]
pub struct AnalysisCache {
    cfg: Option<ControlFlowGraph>,
    domtree: Option<DominatorTree>,
    dfg: Option<DataFlowGraph>,
    liveness: Option<Liveness>,
    loops: Option<LoopForest>,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate exactly the analyses named, used by a pass's
    /// `preserved_analyses` contract (everything not preserved is dropped by
    /// the pass manager via this call with the complement set).
    pub fn invalidate(&mut self, kinds: &[AnalysisKind]) {
        for kind in kinds {
            match kind {
                AnalysisKind::Cfg => self.cfg = None,
                AnalysisKind::DominatorTree => self.domtree = None,
                AnalysisKind::Dfg => self.dfg = None,
                AnalysisKind::Liveness => self.liveness = None,
                AnalysisKind::Loops => self.loops = None,
            }
        }
    }

    /// Invalidate every analysis (the default after a pass that does not
    /// declare `preserved_analyses`).
    pub fn invalidate_all(&mut self) {
        self.invalidate(ALL_KINDS);
    }

    /// Borrow the CFG, computing it if stale.
    pub fn cfg(&mut self, func: &Function) -> &ControlFlowGraph {
        if self.cfg.is_none() {
            self.cfg = Some(ControlFlowGraph::compute(func));
        }
        self.cfg.as_ref().unwrap()
    }

    /// Borrow the dominator tree, computing it (and its CFG dependency) if
    /// stale.
    pub fn dominator_tree(&mut self, func: &Function) -> &DominatorTree {
        if self.domtree.is_none() {
            let cfg = self.cfg(func);
            self.domtree = Some(DominatorTree::compute(func, cfg));
        }
        self.domtree.as_ref().unwrap()
    }

    /// Borrow the data-flow graph, computing it if stale.
    pub fn dfg(&mut self, func: &Function) -> &DataFlowGraph {
        if self.dfg.is_none() {
            self.dfg = Some(DataFlowGraph::compute(func));
        }
        self.dfg.as_ref().unwrap()
    }

    /// Mutably borrow the data-flow graph (for passes that rewrite uses
    /// in-place via `replace_all_uses_with` and want to keep it live).
    pub fn dfg_mut(&mut self, func: &Function) -> &mut DataFlowGraph {
        if self.dfg.is_none() {
            self.dfg = Some(DataFlowGraph::compute(func));
        }
        self.dfg.as_mut().unwrap()
    }

    /// Borrow liveness, computing it (and its CFG dependency) if stale.
    pub fn liveness(&mut self, func: &Function) -> &Liveness {
        if self.liveness.is_none() {
            let cfg = ControlFlowGraph::compute(func);
            self.liveness = Some(Liveness::compute(func, &cfg));
            self.cfg.get_or_insert(cfg);
        }
        self.liveness.as_ref().unwrap()
    }

    /// Borrow the loop forest, computing it (and its CFG/dominator-tree
    /// dependencies) if stale.
    pub fn loops(&mut self, func: &Function) -> &LoopForest {
        if self.loops.is_none() {
            let cfg = self.cfg(func).clone();
            let domtree = DominatorTree::compute(func, &cfg);
            self.loops = Some(LoopForest::compute(func, &cfg, &domtree));
            self.domtree.get_or_insert(domtree);
        }
        self.loops.as_ref().unwrap()
    }
}
