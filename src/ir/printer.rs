//! Textual IR printer (spec §6): `function <name> { label: ... }`, with
//! `%var = opcode op1, op2, ...` instruction lines, `@label` block
//! references, and `;` comments. Paired with [`crate::ir::parser`] for the
//! print/parse round-trip property required by spec §8.
//!
//! Grounded on the format spec §6 spells out verbatim; `cranelift-reader`'s
//! existence in the teacher family is the architectural precedent for
//! shipping a reader alongside the writer; its body was not retrieved in
//! this pack.

use crate::ir::entities::Block;
use crate::ir::function::Function;
use crate::ir::opcode::Opcode;
use std::fmt::{self, Write as _};

/// Render `func` into `f` in the spec §6 textual format.
pub fn write_function(f: &mut fmt::Formatter<'_>, func: &Function) -> fmt::Result {
    writeln!(f, "function {} {{", func.name)?;
    for block in func.blocks_in_order() {
        write_block(f, func, block)?;
    }
    writeln!(f, "}}")
}

fn write_block(f: &mut fmt::Formatter<'_>, func: &Function, block: Block) -> fmt::Result {
    writeln!(f, "{block}:")?;
    for &inst in func.block_insts(block) {
        let data = func.inst(inst);
        let mut line = String::new();
        if let Some(out) = data.result {
            write!(line, "%{out} = ").unwrap();
        }
        write!(line, "{}", data.opcode).unwrap();
        let mut parts: Vec<String> = Vec::new();
        if let Some(callee) = &data.callee {
            parts.push(callee.clone());
        }
        if data.opcode == Opcode::Phi {
            for edge in &data.phi_edges {
                parts.push(format!("@{} {}", edge.from, edge.value));
            }
        } else {
            for arg in &data.args {
                parts.push(format!("{arg}"));
            }
        }
        if !parts.is_empty() {
            write!(line, " {}", parts.join(", ")).unwrap();
        }
        writeln!(f, "    {line}")?;
    }
    Ok(())
}

/// Render `func` to an owned `String` (convenience over the `Display` impl).
pub fn print_function(func: &Function) -> String {
    format!("{func}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::IrBuilder;
    use crate::ir::instruction::Operand;
    use crate::ir::literal::Literal;

    #[test]
    fn prints_instruction_with_output() {
        let mut func = Function::new("f");
        let mut b = IrBuilder::new(&mut func);
        let entry = b.create_block();
        b.switch_to_block(entry);
        let a = b
            .emit(Opcode::Add, vec![Operand::Imm(Literal::from_u64(1)), Operand::Imm(Literal::from_u64(2))])
            .unwrap()
            .unwrap();
        b.terminate_block(Opcode::Ret, vec![Operand::Var(a)]).unwrap();

        let text = print_function(&func);
        assert!(text.contains("function f {"));
        assert!(text.contains("= add 1, 2"));
        assert!(text.contains("ret %"));
    }
}
