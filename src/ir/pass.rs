//! IR cleanup: unreachable-block removal, copy propagation across moves,
//! dead-definition elimination, and the liveness scan that decides which
//! slots get stack homes in the backend.

use std::collections::{HashMap, HashSet};

use super::*;

fn reachable_blocks(func: &IrFunction) -> Vec<BlockId> {
    let mut seen = HashSet::new();
    let mut work = vec![0];
    while let Some(block) = work.pop() {
        if seen.insert(block) {
            work.extend(func.blocks[block].term.successors());
        }
    }
    let mut order: Vec<BlockId> = seen.into_iter().collect();
    order.sort_unstable();
    order
}

fn drop_unreachable(func: &mut IrFunction) {
    let order = reachable_blocks(func);
    if order.len() == func.blocks.len() {
        return;
    }

    let remap: HashMap<BlockId, BlockId> = order
        .iter()
        .enumerate()
        .map(|(new, &old)| (old, new))
        .collect();

    let mut blocks = Vec::with_capacity(order.len());
    for &old in &order {
        let mut block = std::mem::replace(
            &mut func.blocks[old],
            IrBlock {
                insts: vec![],
                term: IrTerm::Ret,
            },
        );
        block.term = match block.term {
            IrTerm::Jmp(b) => IrTerm::Jmp(remap[&b]),
            IrTerm::Branch(c, t, e) => IrTerm::Branch(c, remap[&t], remap[&e]),
            IrTerm::Ret => IrTerm::Ret,
        };
        blocks.push(block);
    }
    func.blocks = blocks;
}

fn def_counts(func: &IrFunction) -> Vec<u32> {
    let mut defs = vec![0u32; func.slots.len()];
    for block in &func.blocks {
        for inst in &block.insts {
            if let Some(dst) = inst.dst() {
                defs[dst] += 1;
            }
        }
    }
    defs
}

fn use_counts(func: &IrFunction) -> Vec<u32> {
    let mut uses = vec![0u32; func.slots.len()];
    for block in &func.blocks {
        for inst in &block.insts {
            for src in inst.sources() {
                uses[src] += 1;
            }
        }
        if let IrTerm::Branch(cond, ..) = block.term {
            uses[cond] += 1;
        }
    }
    uses
}

// Single-definition move chains collapse onto their source; the moves left
// behind die in the dead-definition sweep.
fn propagate_copies(func: &mut IrFunction) {
    let defs = def_counts(func);

    for block in &mut func.blocks {
        let mut alias: HashMap<SlotId, SlotId> = HashMap::new();
        let resolve = |alias: &HashMap<SlotId, SlotId>, mut slot: SlotId| {
            while let Some(&next) = alias.get(&slot) {
                slot = next;
            }
            slot
        };

        for inst in &mut block.insts {
            inst.replace_sources(&|s| resolve(&alias, s));
            if let IrInst::Mov(dst, src) = *inst {
                if defs[dst] == 1 && defs[src] == 1 {
                    alias.insert(dst, src);
                }
            }
        }
        if let IrTerm::Branch(cond, t, e) = block.term {
            block.term = IrTerm::Branch(resolve(&alias, cond), t, e);
        }
    }
}

fn eliminate_dead_definitions(func: &mut IrFunction) {
    loop {
        let uses = use_counts(func);
        let mut changed = false;

        for block in &mut func.blocks {
            let before = block.insts.len();
            block.insts.retain(|inst| {
                inst.has_side_effect()
                    || inst
                        .dst()
                        .map(|dst| uses[dst] > 0)
                        .unwrap_or(true)
            });
            changed |= block.insts.len() != before;
        }

        if !changed {
            return;
        }
    }
}

// Memory-backed slots: live across a block boundary, written more than
// once, live across a runtime call, or too wide for one register.
fn mark_spills(func: &mut IrFunction) {
    let defs = def_counts(func);
    let mut def_block: Vec<Option<BlockId>> = vec![None; func.slots.len()];
    let mut crosses = vec![false; func.slots.len()];

    for (id, block) in func.blocks.iter().enumerate() {
        for inst in &block.insts {
            for src in inst.sources() {
                if def_block[src] != Some(id) {
                    crosses[src] = true;
                }
            }
            if let Some(dst) = inst.dst() {
                if def_block[dst].is_none() {
                    def_block[dst] = Some(id);
                }
            }
        }
        if let IrTerm::Branch(cond, ..) = block.term {
            if def_block[cond] != Some(id) {
                crosses[cond] = true;
            }
        }
    }

    for (slot, info) in func.slots.iter_mut().enumerate() {
        if crosses[slot] || defs[slot] > 1 || info.type_info.width() == 8 {
            info.spilled = true;
        }
    }

    // Values alive across a call lose every caller-saved register; pin them
    // to memory so the call sequence cannot clobber them.
    for block in &func.blocks {
        let mut call_sites = vec![];
        for (index, inst) in block.insts.iter().enumerate() {
            if matches!(inst, IrInst::Call(..)) {
                call_sites.push(index);
            }
        }
        if call_sites.is_empty() {
            continue;
        }

        let mut first_def: HashMap<SlotId, usize> = HashMap::new();
        let mut last_use: HashMap<SlotId, usize> = HashMap::new();
        for (index, inst) in block.insts.iter().enumerate() {
            if let Some(dst) = inst.dst() {
                first_def.entry(dst).or_insert(index);
            }
            for src in inst.sources() {
                last_use.insert(src, index);
            }
        }

        for (&slot, &def) in &first_def {
            let Some(&use_at) = last_use.get(&slot) else {
                continue;
            };
            if call_sites.iter().any(|&call| def < call && call < use_at) {
                func.slots[slot].spilled = true;
            }
        }
    }
}

pub fn run_pass(func: &mut IrFunction) {
    drop_unreachable(func);
    propagate_copies(func);
    eliminate_dead_definitions(func);
    mark_spills(func);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::TypeInfo;

    fn slot(func: &mut IrFunction, type_info: TypeInfo) -> SlotId {
        func.slots.push(SlotInfo {
            type_info,
            spilled: false,
        });
        func.slots.len() - 1
    }

    fn empty_function() -> IrFunction {
        IrFunction {
            blocks: vec![],
            slots: vec![],
            num_args: 1,
        }
    }

    #[test]
    fn test_copy_chains_collapse() {
        let mut func = empty_function();
        let a = slot(&mut func, TypeInfo::int());
        let b = slot(&mut func, TypeInfo::int());
        let c = slot(&mut func, TypeInfo::int());
        let ptr = slot(&mut func, TypeInfo::ptr());
        func.blocks.push(IrBlock {
            insts: vec![
                IrInst::Imm(a, crate::common::Constant::int(5)),
                IrInst::Mov(b, a),
                IrInst::Mov(c, b),
                IrInst::FetchArg(ptr, 0),
                IrInst::Store(ptr, 0, c),
            ],
            term: IrTerm::Ret,
        });

        run_pass(&mut func);

        let insts = &func.blocks[0].insts;
        assert_eq!(insts.len(), 3);
        assert!(matches!(insts[2], IrInst::Store(_, 0, s) if s == a));
    }

    #[test]
    fn test_dead_definitions_are_removed() {
        let mut func = empty_function();
        let a = slot(&mut func, TypeInfo::int());
        let b = slot(&mut func, TypeInfo::int());
        func.blocks.push(IrBlock {
            insts: vec![
                IrInst::Imm(a, crate::common::Constant::int(5)),
                IrInst::Unary(IrUnaryOp::Neg, b, a),
            ],
            term: IrTerm::Ret,
        });

        run_pass(&mut func);
        assert!(func.blocks[0].insts.is_empty());
    }

    #[test]
    fn test_cross_block_slots_are_spilled() {
        let mut func = empty_function();
        let a = slot(&mut func, TypeInfo::int());
        let cond = slot(&mut func, TypeInfo::bool_());
        let ptr = slot(&mut func, TypeInfo::ptr());
        func.blocks.push(IrBlock {
            insts: vec![
                IrInst::Imm(a, crate::common::Constant::int(5)),
                IrInst::Imm(cond, crate::common::Constant::bool_(true)),
            ],
            term: IrTerm::Branch(cond, 1, 1),
        });
        func.blocks.push(IrBlock {
            insts: vec![
                IrInst::FetchArg(ptr, 0),
                IrInst::Store(ptr, 0, a),
            ],
            term: IrTerm::Ret,
        });

        run_pass(&mut func);
        assert!(func.slots[a].spilled);
        assert!(!func.slots[ptr].spilled);
    }

    #[test]
    fn test_unreachable_blocks_are_dropped() {
        let mut func = empty_function();
        func.blocks.push(IrBlock {
            insts: vec![],
            term: IrTerm::Ret,
        });
        func.blocks.push(IrBlock {
            insts: vec![],
            term: IrTerm::Ret,
        });

        run_pass(&mut func);
        assert_eq!(func.blocks.len(), 1);
    }
}
