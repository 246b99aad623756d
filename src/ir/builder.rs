//! The IR builder: the sole path from (out-of-scope) typed HIR into an
//! unoptimized SSA `Function` (spec §4.1).
//!
//! Grounded on `cranelift-frontend`'s `FunctionBuilder`/`SSABuilder`
//! (`cranelift-frontend/src/frontend.rs`: `create_ebb`, `switch_to_block`,
//! `use_var`/`def_var`, `seal_block`). That crate's `SSABuilder` itself
//! wasn't retrieved in the pack, so the construction algorithm below is
//! reimplemented directly from the well-known "simple and efficient
//! construction of SSA form" approach its public API implies: each surface
//! (non-SSA) variable has, per block, a current reaching definition; reading
//! an unassigned variable in a sealed block with one predecessor recurses
//! into that predecessor, with multiple predecessors inserting a phi and
//! recursively filling its incoming edges, and reading in an unsealed block
//! (a loop header whose back edge hasn't been emitted yet) parks an
//! incomplete phi that is wired up once the block is sealed.

use crate::ir::entities::{Block, Inst, Variable};
use crate::ir::function::Function;
use crate::ir::instruction::{InstructionData, Operand, PhiEdge};
use crate::ir::opcode::{Arity, Opcode};
use crate::error::IrError;
use rustc_hash::FxHashMap;
use std::collections::HashSet;

/// A source-level (pre-SSA) variable name, as assigned by the HIR lowering
/// that drives this builder. Opaque handle chosen by the caller — typically
/// an index into the HIR's own symbol table.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SourceVar(pub u32);

/// Builds one [`Function`] by repeated `create_block`/`emit`/`terminate_block`
/// calls, in the order the upstream HIR lowering visits the source tree.
pub struct IrBuilder<'f> {
    func: &'f mut Function,
    position: Option<Block>,
    /// Per-(block, source-variable) current reaching SSA definition.
    current_def: FxHashMap<(Block, SourceVar), Variable>,
    /// Phis inserted speculatively in unsealed blocks, awaiting predecessors.
    incomplete_phis: FxHashMap<Block, Vec<(SourceVar, Variable)>>,
    /// CFG predecessors declared so far (the builder runs before
    /// `analysis::cfg` exists, so it tracks its own incrementally).
    preds: FxHashMap<Block, Vec<Block>>,
    sealed: HashSet<Block>,
}

impl<'f> IrBuilder<'f> {
    /// Start building into an already-allocated (but empty) function.
    pub fn new(func: &'f mut Function) -> Self {
        IrBuilder {
            func,
            position: None,
            current_def: FxHashMap::default(),
            incomplete_phis: FxHashMap::default(),
            preds: FxHashMap::default(),
            sealed: HashSet::new(),
        }
    }

    /// Allocate a fresh SSA variable, optionally tagged with a debug name.
    pub fn create_variable(&mut self, debug_name: Option<String>) -> Variable {
        self.func.make_variable(debug_name)
    }

    /// Allocate a fresh, empty block. Does not switch to it.
    pub fn create_block(&mut self) -> Block {
        let block = self.func.make_block();
        if self.func.entry.is_none() {
            self.func.entry = Some(block);
        }
        block
    }

    /// Move the insertion point to `block`. Subsequent `emit`/`terminate_block`
    /// calls append to it.
    pub fn switch_to_block(&mut self, block: Block) {
        self.position = Some(block);
    }

    /// Record that `pred` is a control-flow predecessor of `block`, then
    /// refill any incomplete phis in `block` if it is sealed. HIR lowering
    /// calls this once per edge it creates (normally implied by
    /// `terminate_block`, but exposed directly for forward edges created
    /// ahead of the branch that realizes them, e.g. a loop's back edge).
    pub fn declare_predecessor(&mut self, block: Block, pred: Block) {
        let list = self.preds.entry(block).or_default();
        if !list.contains(&pred) {
            list.push(pred);
        }
    }

    /// Mark `block` as having no further predecessors. Required before
    /// `block` is sealed so that any variable read inside it (directly, or
    /// transitively through blocks that reach it) resolves to a concrete
    /// phi rather than parking an incomplete one — every loop header must be
    /// sealed once its back edge has been declared.
    pub fn seal_block(&mut self, block: Block) {
        if let Some(pending) = self.incomplete_phis.remove(&block) {
            for (var, phi_val) in pending {
                self.add_phi_operands(var, phi_val, block);
            }
        }
        self.sealed.insert(block);
    }

    /// Record the reaching definition of `var` at the current block.
    pub fn def_var(&mut self, var: SourceVar, value: Variable) {
        let block = self.position.expect("def_var with no current block");
        self.current_def.insert((block, var), value);
    }

    /// Resolve `var`'s reaching definition at the current block, inserting
    /// phis across merge points as needed (spec §4.1: "sole mechanism by
    /// which phi nodes are initially created").
    pub fn use_var(&mut self, var: SourceVar) -> Variable {
        let block = self.position.expect("use_var with no current block");
        self.read_variable(var, block)
    }

    fn read_variable(&mut self, var: SourceVar, block: Block) -> Variable {
        if let Some(&val) = self.current_def.get(&(block, var)) {
            return val;
        }
        let val = self.read_variable_recursive(var, block);
        self.current_def.insert((block, var), val);
        val
    }

    fn read_variable_recursive(&mut self, var: SourceVar, block: Block) -> Variable {
        if !self.sealed.contains(&block) {
            // Park an incomplete phi; it is wired up when `block` is sealed.
            let phi_val = self.func.make_variable(None);
            self.incomplete_phis.entry(block).or_default().push((var, phi_val));
            self.emit_empty_phi(block, phi_val);
            return phi_val;
        }
        let preds = self.preds.get(&block).cloned().unwrap_or_default();
        match preds.as_slice() {
            [] => {
                // No predecessors and sealed: this is the entry block: the
                // variable is undefined here. Upstream HIR lowering
                // guarantees every read is dominated by a write (spec §3),
                // so this path is only reached for builder misuse.
                self.func.make_variable(None)
            }
            [single] => self.read_variable(var, *single),
            _ => {
                let phi_val = self.func.make_variable(None);
                self.emit_empty_phi(block, phi_val);
                // Write eagerly to stop infinite recursion on loop-carried
                // reads of `var` that flow back into this same phi.
                self.current_def.insert((block, var), phi_val);
                self.add_phi_operands(var, phi_val, block);
                phi_val
            }
        }
    }

    fn emit_empty_phi(&mut self, block: Block, phi_val: Variable) {
        let inst = self.func.make_inst(InstructionData {
            opcode: Opcode::Phi,
            args: Default::default(),
            phi_edges: Default::default(),
            result: Some(phi_val),
            parent: block,
            callee: None,
        });
        // Phis live at the top of the block (spec §4.8 post-condition).
        self.func.block_insts_mut(block).insert(0, inst);
    }

    fn add_phi_operands(&mut self, var: SourceVar, phi_val: Variable, block: Block) {
        let preds = self.preds.get(&block).cloned().unwrap_or_default();
        let edges: Vec<PhiEdge> = preds
            .into_iter()
            .map(|pred| PhiEdge {
                from: pred,
                value: Operand::Var(self.read_variable(var, pred)),
            })
            .collect();
        let inst = self
            .func
            .def_of(phi_val)
            .expect("phi placeholder must already have a defining instruction");
        self.func.inst_mut(inst).phi_edges = edges.into();
    }

    /// Append an instruction to the current block, returning its output
    /// variable if the opcode produces one.
    ///
    /// Fails with [`IrError::BlockClosed`] if the current block is already
    /// terminated.
    pub fn emit(
        &mut self,
        opcode: Opcode,
        args: Vec<Operand>,
    ) -> Result<Option<Variable>, IrError> {
        let block = self.position.expect("emit with no current block");
        if self.func.is_terminated(block) {
            return Err(IrError::BlockClosed(format!("{block}")));
        }
        self.check_arity(opcode, &args);
        let result = if opcode.signature().produces_output {
            Some(self.func.make_variable(None))
        } else {
            None
        };
        let inst = InstructionData {
            opcode,
            args: args.into(),
            phi_edges: Default::default(),
            result,
            parent: block,
            callee: None,
        };
        let inst = self.func.make_inst(inst);
        self.func.append_inst(block, inst);
        Ok(result)
    }

    /// Append an `invoke` of another function in the same context, returning
    /// its output variable (spec §4.7 Function Inlining's substitution
    /// target; distinct from `emit`, which never names a callee).
    pub fn emit_invoke(
        &mut self,
        callee: impl Into<String>,
        args: Vec<Operand>,
    ) -> Result<Option<Variable>, IrError> {
        let block = self.position.expect("emit_invoke with no current block");
        if self.func.is_terminated(block) {
            return Err(IrError::BlockClosed(format!("{block}")));
        }
        let result = Some(self.func.make_variable(None));
        let inst = InstructionData {
            opcode: Opcode::Invoke,
            args: args.into(),
            phi_edges: Default::default(),
            result,
            parent: block,
            callee: Some(callee.into()),
        };
        let inst = self.func.make_inst(inst);
        self.func.append_inst(block, inst);
        Ok(result)
    }

    /// Append a terminator instruction, closing the block. Also declares
    /// CFG predecessor edges for every label operand, so later `use_var`
    /// calls into those targets see this block as a predecessor.
    pub fn terminate_block(
        &mut self,
        opcode: Opcode,
        args: Vec<Operand>,
    ) -> Result<Inst, IrError> {
        let block = self.position.expect("terminate_block with no current block");
        if self.func.is_terminated(block) {
            return Err(IrError::BlockClosed(format!("{block}")));
        }
        assert!(opcode.is_terminator(), "{opcode} is not a terminator");
        self.check_arity(opcode, &args);
        for target in args.iter().filter_map(|op| op.as_label()) {
            self.declare_predecessor(target, block);
        }
        let inst_data = InstructionData {
            opcode,
            args: args.into(),
            phi_edges: Default::default(),
            result: None,
            parent: block,
            callee: None,
        };
        let inst = self.func.make_inst(inst_data);
        self.func.append_inst(block, inst);
        Ok(inst)
    }

    fn check_arity(&self, opcode: Opcode, args: &[Operand]) {
        let value_args = args.iter().filter(|op| !matches!(op, Operand::Label(_))).count();
        match opcode.signature().value_operands {
            Arity::Fixed(n) => assert_eq!(
                value_args, n as usize,
                "{opcode} expects {n} value operands, got {value_args}"
            ),
            Arity::AtLeast(n) => assert!(
                value_args >= n as usize,
                "{opcode} expects at least {n} value operands, got {value_args}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::literal::Literal;

    #[test]
    fn straight_line_function_builds() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let x = b.emit(Opcode::Add, vec![Operand::Imm(Literal::from_u64(1)), Operand::Imm(Literal::from_u64(2))])
            .unwrap()
            .unwrap();
        b.terminate_block(Opcode::Ret, vec![Operand::Var(x)]).unwrap();
        assert!(func.is_terminated(entry));
    }

    #[test]
    fn diamond_merge_inserts_phi() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        let left = b.create_block();
        let right = b.create_block();
        let join = b.create_block();
        let v = SourceVar(0);

        b.switch_to_block(entry);
        b.terminate_block(
            Opcode::Jnz,
            vec![Operand::Imm(Literal::ONE), Operand::Label(left), Operand::Label(right)],
        )
        .unwrap();
        b.seal_block(entry);

        b.switch_to_block(left);
        let left_val = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
        b.def_var(v, left_val);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(join)]).unwrap();
        b.seal_block(left);

        b.switch_to_block(right);
        let right_val = b.emit(Opcode::Param, vec![]).unwrap().unwrap();
        b.def_var(v, right_val);
        b.terminate_block(Opcode::Jmp, vec![Operand::Label(join)]).unwrap();
        b.seal_block(right);

        b.switch_to_block(join);
        b.seal_block(join);
        let merged = b.use_var(v);
        let def = func.def_of(merged).unwrap();
        assert_eq!(func.inst(def).opcode, Opcode::Phi);
        assert_eq!(func.inst(def).phi_edges.len(), 2);
    }

    #[test]
    fn emit_into_closed_block_errors() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        b.terminate_block(Opcode::Stop, vec![]).unwrap();
        let err = b.emit(Opcode::Nop, vec![]).unwrap_err();
        assert!(matches!(err, IrError::BlockClosed(_)));
    }
}
