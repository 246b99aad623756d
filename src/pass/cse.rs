//! Common Subexpression Elimination (spec §4.7 CSE): value-number pure
//! instructions by `(opcode, canonicalized operands)` and rewrite a later
//! duplicate into a use of the earlier, dominating result.
//!
//! Grounded on `cranelift-codegen/src/scoped_hash_map.rs` — a hash map whose
//! entries can be popped back out as control flow exits a scope, the exact
//! shape a dominator-scoped value-numbering table needs (push entries on
//! entry to a block, pop them on the way back out of its dominator subtree).

use crate::analysis::cache::AnalysisCache;
use crate::analysis::dfg::DataFlowGraph;
use crate::analysis::dominator_tree::DominatorTree;
use crate::analysis::AnalysisKind;
use crate::error::CompilerError;
use crate::ir::entities::{Block, Variable};
use crate::ir::function::Function;
use crate::ir::instruction::Operand;
use crate::ir::opcode::Opcode;
use crate::pass::FunctionPass;
use cranelift_entity::EntityRef;
use rustc_hash::FxHashMap;

/// A value number: the opcode plus its canonicalized operand list.
#[derive(Clone, PartialEq, Eq, Hash)]
struct ValueKey {
    opcode: Opcode,
    operands: Vec<Operand>,
}

fn value_key(opcode: Opcode, operands: &[Operand]) -> ValueKey {
    let mut operands = operands.to_vec();
    if opcode.is_commutative() && operands.len() == 2 {
        operands.sort_by_key(operand_sort_key);
    }
    ValueKey { opcode, operands }
}

fn operand_sort_key(op: &Operand) -> (u8, u64) {
    match op {
        Operand::Var(v) => (0, v.index() as u64),
        Operand::Imm(l) => (1, l.0.as_u64()),
        Operand::Label(b) => (2, b.index() as u64),
    }
}

/// Deduplicates pure instructions that compute the same value, scoped to the
/// dominator tree so a replacement is always available at its use site
/// (spec §4.7: "only within the dominator-scoped table").
#[derive(Default)]
pub struct Cse;

impl FunctionPass for Cse {
    fn name(&self) -> &'static str {
        "cse"
    }

    fn required_analyses(&self) -> &'static [AnalysisKind] {
        &[AnalysisKind::Cfg, AnalysisKind::DominatorTree, AnalysisKind::Dfg]
    }

    fn preserved_analyses(&self) -> &'static [AnalysisKind] {
        &[]
    }

    fn run(&mut self, func: &mut Function, cache: &mut AnalysisCache) -> Result<bool, CompilerError> {
        let cfg = cache.cfg(func).clone();
        let domtree = DominatorTree::compute(func, &cfg);
        let mut dfg = DataFlowGraph::compute(func);

        let Some(entry) = func.entry else {
            return Ok(false);
        };

        let mut table: FxHashMap<ValueKey, Variable> = FxHashMap::default();
        let mut changed = false;

        walk(entry, &domtree, func, &mut dfg, &mut table, &mut changed);

        Ok(changed)
    }
}

fn walk(
    block: Block,
    domtree: &DominatorTree,
    func: &mut Function,
    dfg: &mut DataFlowGraph,
    table: &mut FxHashMap<ValueKey, Variable>,
    changed: &mut bool,
) {
    let mut inserted_keys: Vec<ValueKey> = Vec::new();

    for &inst in func.block_insts(block).to_vec().iter() {
        let data = func.inst(inst).clone();
        if !data.opcode.is_pure() {
            continue;
        }
        let Some(result) = data.result else { continue };
        let key = value_key(data.opcode, &data.args);
        if let Some(&existing) = table.get(&key) {
            if existing != result {
                dfg.replace_all_uses_with(func, result, existing);
                *changed = true;
            }
            continue;
        }
        table.insert(key.clone(), result);
        inserted_keys.push(key);
    }

    for &child in domtree.children(block) {
        walk(child, domtree, func, dfg, table, changed);
    }

    for key in inserted_keys {
        table.remove(&key);
    }
}
