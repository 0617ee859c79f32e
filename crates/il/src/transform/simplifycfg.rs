//! Control-flow graph simplification
//!
//! Three rewrites to a fixpoint: fold `cbr` on a constant condition into
//! `br`, merge a block into its unique predecessor when the edge is an
//! argument-free unconditional branch, and delete unreachable blocks.

use crate::analysis::FuncCfg;
use crate::func::Function;
use crate::instr::{Instr, Opcode};
use crate::module::Module;

pub fn run(module: &mut Module) {
    for function in &mut module.functions {
        while fold_constant_cbr(function) | merge_trivial_edge(function) | drop_unreachable(function)
        {
        }
    }
}

fn fold_constant_cbr(function: &mut Function) -> bool {
    let mut changed = false;
    for block in &mut function.blocks {
        let Some(term) = block.instructions.last_mut() else {
            continue;
        };
        if term.op != Opcode::CBr {
            continue;
        }
        let Some(cond) = term.operands[0].as_const_int() else {
            continue;
        };
        let keep = if cond != 0 { 0 } else { 1 };
        *term = Instr {
            op: Opcode::Br,
            labels: vec![term.labels[keep].clone()],
            br_args: vec![term.br_args[keep].clone()],
            loc: term.loc,
            ..Instr::default()
        };
        changed = true;
    }
    changed
}

/// Merge `B` into `A` when `A: ... br B` (no arguments), `B` has no
/// parameters, and `A` is `B`'s only predecessor.
fn merge_trivial_edge(function: &mut Function) -> bool {
    let cfg = FuncCfg::build(function);
    for a in 0..function.blocks.len() {
        let Some(term) = function.blocks[a].terminator() else {
            continue;
        };
        if term.op != Opcode::Br || !term.br_args[0].is_empty() {
            continue;
        }
        let Some(b) = cfg.index_of(&term.labels[0]) else {
            continue;
        };
        if b == a || b == 0 {
            continue;
        }
        if cfg.predecessors[b].len() != 1 || !function.blocks[b].params.is_empty() {
            continue;
        }
        let mut donor = std::mem::take(&mut function.blocks[b].instructions);
        let a_block = &mut function.blocks[a];
        a_block.instructions.pop(); // the br
        a_block.instructions.append(&mut donor);
        function.blocks.remove(b);
        return true;
    }
    false
}

fn drop_unreachable(function: &mut Function) -> bool {
    let cfg = FuncCfg::build(function);
    let reachable = cfg.reachable();
    let before = function.blocks.len();
    let mut idx = 0;
    function.blocks.retain(|_| {
        let keep = reachable[idx];
        idx += 1;
        keep
    });
    function.blocks.len() != before
}
