//! Data-flow graph analysis (spec §4.3): def/use tracking decoupled from the
//! `Variable` handle itself (spec §9: "defining instruction is discovered
//! through the DFG analysis, not by embedding a pointer in the variable").
//!
//! Grounded on `cranelift-codegen`'s `DataFlowGraph` (`value_def`/`uses`
//! query shape), adapted here as a standalone derived analysis over
//! `Function` rather than the primary storage (this crate's `Function`
//! already owns instructions directly; see `ir::function` module doc).

use crate::ir::entities::{Inst, Variable};
use crate::ir::function::Function;
use cranelift_entity::SecondaryMap;

#[derive(Clone, Debug, Default)]
struct UseSite {
    uses: Vec<Inst>,
}

/// Def/use queries over a function's current instruction set. Must be
/// recomputed (or the consuming pass must maintain it directly) after any
/// mutation that adds, removes, or rewrites instruction operands.
#[derive(Clone, Debug)]
pub struct DataFlowGraph {
    uses: SecondaryMap<Variable, UseSite>,
}

impl DataFlowGraph {
    /// Build the def/use graph in a single pass over every instruction in
    /// `func` (spec §4.3: "Built in a single pass over all instructions").
    pub fn compute(func: &Function) -> Self {
        let mut uses: SecondaryMap<Variable, UseSite> = SecondaryMap::new();
        for block in func.blocks_in_order() {
            for &inst in func.block_insts(block) {
                for var in func.inst(inst).used_vars() {
                    uses[var].uses.push(inst);
                }
            }
        }
        DataFlowGraph { uses }
    }

    /// The instruction that defines `var`, if it has been built.
    pub fn def_of(&self, func: &Function, var: Variable) -> Option<Inst> {
        func.def_of(var)
    }

    /// Every instruction that reads `var`, including phi incoming edges.
    pub fn uses_of(&self, var: Variable) -> &[Inst] {
        &self.uses[var].uses
    }

    /// `true` iff `var` has no remaining uses (spec §4.7 DCE's trigger
    /// condition).
    pub fn is_unused(&self, var: Variable) -> bool {
        self.uses[var].uses.is_empty()
    }

    /// Rewrite every use of `old` to read `new` instead, including phi
    /// operand slots (spec §4.3: "must also rewrite phi operand slots").
    /// Updates this analysis's own use-list incrementally so it stays valid
    /// without a full recompute.
    pub fn replace_all_uses_with(&mut self, func: &mut Function, old: Variable, new: Variable) {
        let sites = std::mem::take(&mut self.uses[old].uses);
        for &inst in &sites {
            let data = func.inst_mut(inst);
            for arg in data.args.iter_mut() {
                if arg.as_var() == Some(old) {
                    *arg = crate::ir::instruction::Operand::Var(new);
                }
            }
            for edge in data.phi_edges.iter_mut() {
                if edge.value.as_var() == Some(old) {
                    edge.value = crate::ir::instruction::Operand::Var(new);
                }
            }
        }
        self.uses[new].uses.extend(sites);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::instruction::Operand;
    use crate::ir::literal::Literal;
    use crate::ir::opcode::Opcode;

    #[test]
    fn tracks_uses_across_instructions() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let a = b
            .emit(Opcode::Add, vec![Operand::Imm(Literal::from_u64(1)), Operand::Imm(Literal::from_u64(2))])
            .unwrap()
            .unwrap();
        let c = b.emit(Opcode::Mul, vec![Operand::Var(a), Operand::Var(a)]).unwrap().unwrap();
        b.terminate_block(Opcode::Ret, vec![Operand::Var(c)]).unwrap();

        let dfg = DataFlowGraph::compute(&func);
        assert_eq!(dfg.uses_of(a).len(), 2);
        assert!(dfg.is_unused(c) == false);
    }

    #[test]
    fn replace_all_uses_with_rewrites_args() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let a = b
            .emit(Opcode::Add, vec![Operand::Imm(Literal::from_u64(1)), Operand::Imm(Literal::from_u64(2))])
            .unwrap()
            .unwrap();
        let replacement = b.emit(Opcode::Add, vec![Operand::Imm(Literal::ZERO), Operand::Imm(Literal::ZERO)]).unwrap().unwrap();
        b.terminate_block(Opcode::Ret, vec![Operand::Var(a)]).unwrap();

        let mut dfg = DataFlowGraph::compute(&func);
        dfg.replace_all_uses_with(&mut func, a, replacement);
        let term = func.terminator(entry).unwrap();
        assert_eq!(func.inst(term).args[0], Operand::Var(replacement));
    }
}
