//! Operand legalization.
//!
//! Rewrites instruction forms x86 cannot encode (memory-to-memory moves and
//! arithmetic, over-wide immediates, xmm ops with memory destinations)
//! through the scratch registers r10/r11 and xmm14/xmm15.

use super::asm_ast::*;

fn too_large(n: i64) -> bool {
    n > i32::MAX as i64 || n < i32::MIN as i64
}

fn is_imm64(op: &Operand) -> bool {
    matches!(op, Operand::Imm(n) if too_large(*n))
}

fn fixup_instruction(inst: Inst) -> Vec<Inst> {
    match inst {
        Inst::Mov(t, src, dst) if src.is_memory() && dst.is_memory() => {
            vec![mov(t, src, Gp::R10), mov(t, Gp::R10, dst)]
        }
        Inst::Mov(AsmType::Qword, src @ Operand::Imm(_), dst)
            if is_imm64(&src) && dst.is_memory() =>
        {
            vec![
                mov(AsmType::Qword, src, Gp::R10),
                mov(AsmType::Qword, Gp::R10, dst),
            ]
        }
        Inst::Binary(t, BinOp::Mult, src, dst) if !dst.is_register() => {
            let mut out = vec![mov(t, dst, Gp::R11)];
            let src = if src.is_imm() {
                out.push(mov(t, src, Gp::R10));
                Operand::Gp(Gp::R10)
            } else {
                src
            };
            out.push(binary(t, BinOp::Mult, src, Gp::R11));
            out.push(mov(t, Gp::R11, dst));
            out
        }
        Inst::Binary(t, BinOp::Mult, src @ Operand::Imm(_), dst) => {
            vec![
                mov(t, src, Gp::R10),
                binary(t, BinOp::Mult, Gp::R10, dst),
            ]
        }
        Inst::Binary(t, op, src, dst)
            if src.is_memory() && dst.is_memory() =>
        {
            vec![mov(t, src, Gp::R10), binary(t, op, Gp::R10, dst)]
        }
        Inst::Binary(t, op, src @ Operand::Imm(_), dst) if is_imm64(&src) => {
            vec![mov(t, src, Gp::R10), binary(t, op, Gp::R10, dst)]
        }
        Inst::Cmp(t, src, dst) if src.is_memory() && dst.is_memory() => {
            vec![mov(t, src, Gp::R10), Inst::Cmp(t, Operand::Gp(Gp::R10), dst)]
        }
        Inst::Cmp(t, src, dst @ Operand::Imm(_)) => {
            vec![mov(t, dst, Gp::R11), Inst::Cmp(t, src, Operand::Gp(Gp::R11))]
        }
        Inst::Idiv(op @ Operand::Imm(_)) => {
            vec![
                mov(AsmType::Dword, op, Gp::R10),
                Inst::Idiv(Operand::Gp(Gp::R10)),
            ]
        }

        // Integer-lane xmm traffic whose operands both ended up on the
        // general-purpose side is plain data movement.
        Inst::XmmMov(XMove::D, src, dst)
            if !src.is_xmm() && !dst.is_xmm() =>
        {
            fixup_instruction(mov(AsmType::Dword, src, dst))
        }
        Inst::XmmMov(XMove::Q64, src, dst)
            if !src.is_xmm() && !dst.is_xmm() =>
        {
            fixup_instruction(mov(AsmType::Qword, src, dst))
        }
        Inst::XmmMov(kind, src, dst) if src.is_memory() && dst.is_memory() => {
            let scratch = if kind == XMove::Dq { XMM14 } else { XMM15 };
            vec![xmov(kind, src, scratch), xmov(kind, scratch, dst)]
        }
        Inst::XmmBinary(op, src, dst) if !dst.is_xmm() => {
            let mut out = vec![xmov(XMove::Dq, dst, XMM15)];
            out.push(Inst::XmmBinary(op, src, Operand::Xmm(XMM15)));
            if !matches!(op, XOp::Ucomiss | XOp::Ucomisd) {
                out.push(xmov(XMove::Dq, XMM15, dst));
            }
            out
        }
        Inst::XmmImm(op, imm, src, dst) if !dst.is_xmm() => {
            match op {
                XImmOp::Pshufd => vec![
                    Inst::XmmImm(op, imm, src, Operand::Xmm(XMM15)),
                    xmov(XMove::Dq, XMM15, dst),
                ],
                _ => vec![
                    xmov(XMove::Dq, dst, XMM15),
                    Inst::XmmImm(op, imm, src, Operand::Xmm(XMM15)),
                    xmov(XMove::Dq, XMM15, dst),
                ],
            }
        }
        Inst::XmmCvt(kind, src, dst) if !dst.is_register() => {
            let (scratch, store): (Operand, Inst) = match kind {
                CvtKind::Ss2si | CvtKind::Sd2si => (
                    Operand::Gp(Gp::R10),
                    mov(AsmType::Dword, Gp::R10, dst),
                ),
                CvtKind::Si2ss | CvtKind::Sd2ss => {
                    (Operand::Xmm(XMM15), xmov(XMove::Ss, XMM15, dst))
                }
                CvtKind::Si2sd | CvtKind::Ss2sd => {
                    (Operand::Xmm(XMM15), xmov(XMove::Sd, XMM15, dst))
                }
                _ => (Operand::Xmm(XMM15), xmov(XMove::Dq, XMM15, dst)),
            };
            vec![Inst::XmmCvt(kind, src, scratch), store]
        }
        inst => vec![inst],
    }
}

pub fn fixup_instructions(asm: &mut AsmFunction) {
    let instructions = std::mem::take(&mut asm.instructions);
    asm.instructions = instructions
        .into_iter()
        .flat_map(fixup_instruction)
        .collect();
}
