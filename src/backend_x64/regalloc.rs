//! Linear-scan register allocation.
//!
//! Intervals are first-to-last appearance over the linear instruction list.
//! Only slots the IR pass left register-candidate (not memory-backed) take
//! part; anything that does not get a register keeps its pseudo and falls
//! through to stack assignment.

use std::collections::HashMap;

use super::asm_ast::*;
use super::translate::is_gp;
use crate::ir::{IrFunction, SlotId};

pub fn for_each_operand(inst: &mut Inst, f: &mut impl FnMut(&mut Operand)) {
    match inst {
        Inst::Mov(_, a, b)
        | Inst::Binary(_, _, a, b)
        | Inst::Cmp(_, a, b)
        | Inst::Cmov(_, _, a, b)
        | Inst::XmmMov(_, a, b)
        | Inst::XmmBinary(_, a, b)
        | Inst::XmmImm(_, _, a, b)
        | Inst::XmmCvt(_, a, b) => {
            f(a);
            f(b);
        }
        Inst::Unary(_, _, a) | Inst::Idiv(a) | Inst::Call(a) => f(a),
        _ => {}
    }
}

#[derive(Clone, Copy)]
struct Interval {
    slot: SlotId,
    start: usize,
    end: usize,
    gp: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum Assigned {
    Gp(Gp),
    Xmm(Xmm),
}

pub fn allocate_registers(asm: &mut AsmFunction, ir: &IrFunction) {
    let mut first: HashMap<SlotId, usize> = HashMap::new();
    let mut last: HashMap<SlotId, usize> = HashMap::new();

    for (index, inst) in asm.instructions.iter_mut().enumerate() {
        for_each_operand(inst, &mut |operand| {
            if let Operand::Pseudo(slot) = *operand {
                if slot < ir.slots.len() && !ir.slots[slot].spilled {
                    first.entry(slot).or_insert(index);
                    last.insert(slot, index);
                }
            }
        });
    }

    let mut intervals: Vec<Interval> = first
        .iter()
        .map(|(&slot, &start)| Interval {
            slot,
            start,
            end: last[&slot],
            gp: is_gp(ir.slots[slot].type_info),
        })
        .collect();
    intervals.sort_by_key(|i| (i.start, i.slot));

    let mut gp_pool: Vec<Gp> = Gp::ALLOCATABLE.to_vec();
    let mut xmm_pool: Vec<Xmm> = Xmm::ALLOCATABLE.to_vec();
    let mut active: Vec<(usize, Assigned)> = vec![];
    let mut assignment: HashMap<SlotId, Assigned> = HashMap::new();

    for interval in intervals {
        active.retain(|&(end, reg)| {
            if end < interval.start {
                match reg {
                    Assigned::Gp(r) => gp_pool.push(r),
                    Assigned::Xmm(r) => xmm_pool.push(r),
                }
                false
            } else {
                true
            }
        });

        let reg = if interval.gp {
            gp_pool.pop().map(Assigned::Gp)
        } else {
            xmm_pool.pop().map(Assigned::Xmm)
        };

        // Pool exhausted: the slot spills to its stack home instead.
        let Some(reg) = reg else {
            continue;
        };
        active.push((interval.end, reg));
        assignment.insert(interval.slot, reg);
    }

    for inst in &mut asm.instructions {
        for_each_operand(inst, &mut |operand| {
            if let Operand::Pseudo(slot) = *operand {
                match assignment.get(&slot) {
                    Some(Assigned::Gp(r)) => *operand = Operand::Gp(*r),
                    Some(Assigned::Xmm(r)) => *operand = Operand::Xmm(*r),
                    None => {}
                }
            }
        });
    }
}
