//! Stack-home assignment and frame construction.
//!
//! Every pseudo still standing after register allocation gets a 16-byte
//! aligned home below rbp (32 bytes for 8-wide values and the scratch
//! area). The prologue saves rbx and parks the argument-array pointer in
//! it; epilogues are expanded at every `ret`.

use std::collections::HashMap;

use super::asm_ast::*;
use super::regalloc::for_each_operand;
use crate::ir::{IrFunction, SlotId};

#[cfg(windows)]
const ARG_REG: Gp = Gp::Rcx;
#[cfg(not(windows))]
const ARG_REG: Gp = Gp::Rdi;

pub fn assign_stack(asm: &mut AsmFunction, ir: &IrFunction) {
    // Deterministic home order: first appearance in the instruction stream.
    let mut order: Vec<SlotId> = vec![];
    let mut seen: HashMap<SlotId, ()> = HashMap::new();
    for inst in &mut asm.instructions {
        for_each_operand(inst, &mut |operand| {
            let slot = match *operand {
                Operand::Pseudo(slot) | Operand::PseudoMem(slot, _) => slot,
                _ => return,
            };
            if seen.insert(slot, ()).is_none() {
                order.push(slot);
            }
        });
    }

    let mut offsets: HashMap<SlotId, i32> = HashMap::new();
    let mut acc: i32 = 16;
    for &slot in &order {
        let size = if slot >= ir.slots.len() || ir.slots[slot].type_info.width() == 8 {
            32
        } else {
            16
        };
        acc += size;
        offsets.insert(slot, -acc);
    }

    for inst in &mut asm.instructions {
        for_each_operand(inst, &mut |operand| match *operand {
            Operand::Pseudo(slot) => *operand = Operand::Stack(offsets[&slot]),
            Operand::PseudoMem(slot, at) => *operand = Operand::Stack(offsets[&slot] + at),
            _ => {}
        });
    }

    // Keep rsp 16-byte aligned at call sites: frame ≡ 8 (mod 16) on top of
    // the pushed rbp/rbx pair.
    let frame = ((acc - 8 + 15) & !15) + 8;

    let prologue = [
        Inst::Push(Gp::Rbp),
        Inst::Mov(AsmType::Qword, Operand::Gp(Gp::Rsp), Operand::Gp(Gp::Rbp)),
        Inst::Push(Gp::Rbx),
        Inst::Mov(AsmType::Qword, Operand::Gp(ARG_REG), Operand::Gp(Gp::Rbx)),
        Inst::Binary(
            AsmType::Qword,
            BinOp::Sub,
            Operand::Imm(frame as i64),
            Operand::Gp(Gp::Rsp),
        ),
    ];

    let mut out = Vec::with_capacity(asm.instructions.len() + 16);
    out.extend(prologue);
    for inst in asm.instructions.drain(..) {
        if inst == Inst::Ret {
            out.push(Inst::Mov(
                AsmType::Qword,
                Operand::Stack(-8),
                Operand::Gp(Gp::Rbx),
            ));
            out.push(Inst::Mov(
                AsmType::Qword,
                Operand::Gp(Gp::Rbp),
                Operand::Gp(Gp::Rsp),
            ));
            out.push(Inst::Pop(Gp::Rbp));
            out.push(Inst::Ret);
        } else {
            out.push(inst);
        }
    }
    asm.instructions = out;
}
