//! IR to x86-64 instruction selection.
//!
//! Operands are slot pseudos at this stage; register allocation and stack
//! assignment make them concrete later. Sequences lean on the fixed scratch
//! registers (r10/r11, xmm14/xmm15, and xmm0 where a third vector temp is
//! needed), so allocatable registers never appear implicitly.

use super::asm_ast::*;
use super::math;
use crate::common::{TypeInfo, TypeKind};
use crate::ir::*;

/// Machine class of a slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Class {
    /// int/bool/qbool scalar, 0/1 for the mask kinds
    GpI32,
    /// pointer
    GpI64,
    /// float scalar
    X32,
    /// double scalar
    X64,
    /// one-register vector
    V128,
    /// 8-wide vector, always memory-resident as two halves
    V256,
}

pub fn class_of(t: TypeInfo) -> Class {
    if t.width() == 8 {
        return Class::V256;
    }
    if t.width() > 1 {
        return Class::V128;
    }
    match t.kind() {
        TypeKind::Float => Class::X32,
        TypeKind::Double => Class::X64,
        TypeKind::Ptr => Class::GpI64,
        _ => Class::GpI32,
    }
}

/// Lane flavor for packed operations.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Pack {
    F32,
    F64,
    I32,
}

pub fn pack_of(t: TypeInfo) -> Pack {
    match t.kind() {
        TypeKind::Float => Pack::F32,
        TypeKind::Double | TypeKind::QBool => Pack::F64,
        _ => Pack::I32,
    }
}

pub fn is_gp(t: TypeInfo) -> bool {
    matches!(class_of(t), Class::GpI32 | Class::GpI64)
}

struct Translator<'a> {
    func: &'a IrFunction,
    out: Vec<Inst>,
    sse41: bool,
    block_labels: Vec<Label>,
    label_count: usize,
    scratch: SlotId,
}

impl<'a> Translator<'a> {
    fn emit(&mut self, inst: Inst) {
        self.out.push(inst);
    }

    fn ty(&self, slot: SlotId) -> TypeInfo {
        self.func.slot_type(slot)
    }

    fn op(&self, slot: SlotId) -> Operand {
        Operand::Pseudo(slot)
    }

    // ----- small building blocks -------------------------------------

    /// Loads a 32-bit pattern splatted across xmm `dst`.
    fn splat_pattern32(&mut self, bits: u32, dst: Xmm) {
        self.emit(mov(AsmType::Dword, Operand::Imm(bits as i64), Gp::R10));
        self.emit(xmov(XMove::D, Gp::R10, dst));
        self.emit(Inst::XmmImm(
            XImmOp::Pshufd,
            0x00,
            Operand::Xmm(dst),
            Operand::Xmm(dst),
        ));
    }

    /// Loads a 64-bit pattern splatted across both qword lanes of `dst`.
    fn splat_pattern64(&mut self, bits: u64, dst: Xmm) {
        self.emit(mov(AsmType::Qword, Operand::Imm(bits as i64), Gp::R10));
        self.emit(xmov(XMove::Q64, Gp::R10, dst));
        self.emit(Inst::XmmImm(
            XImmOp::Pshufd,
            0x44,
            Operand::Xmm(dst),
            Operand::Xmm(dst),
        ));
    }

    fn ones(&mut self, dst: Xmm) {
        self.emit(xop(XOp::Pcmpeqd, dst, dst));
    }

    fn store_vec(&mut self, src: Xmm, dst: Operand) {
        self.emit(xmov(XMove::Dq, src, dst));
    }

    // ----- instruction emitters --------------------------------------

    fn imm(&mut self, dst: SlotId, value: &crate::common::Constant) {
        let t = self.ty(dst);
        match class_of(t) {
            Class::GpI32 => {
                let bits = value.lane_bits(0) as u32 as i64;
                self.emit(mov(AsmType::Dword, Operand::Imm(bits), self.op(dst)));
            }
            Class::GpI64 => {
                self.emit(mov(
                    AsmType::Qword,
                    Operand::Imm(value.lane_bits(0) as i64),
                    self.op(dst),
                ));
            }
            Class::X32 => {
                self.emit(mov(
                    AsmType::Dword,
                    Operand::Imm(value.lane_bits(0) as u32 as i64),
                    Gp::R10,
                ));
                self.emit(xmov(XMove::D, Gp::R10, XMM15));
                self.emit(xmov(XMove::Ss, XMM15, self.op(dst)));
            }
            Class::X64 => {
                self.emit(mov(
                    AsmType::Qword,
                    Operand::Imm(value.lane_bits(0) as i64),
                    Gp::R10,
                ));
                self.emit(xmov(XMove::Q64, Gp::R10, XMM15));
                self.emit(xmov(XMove::Sd, XMM15, self.op(dst)));
            }
            Class::V128 | Class::V256 => {
                let lane_size = t.kind().lane_size();
                let width = t.width() as usize;
                // Build the constant in the scratch area, then copy it over.
                for lane in 0..width {
                    let bits = self.lane_store_bits(value, lane);
                    let at = (lane * lane_size) as i32;
                    if lane_size == 4 {
                        self.emit(mov(
                            AsmType::Dword,
                            Operand::Imm(bits as u32 as i64),
                            Operand::PseudoMem(self.scratch, at),
                        ));
                    } else {
                        self.emit(mov(AsmType::Qword, Operand::Imm(bits as i64), Gp::R10));
                        self.emit(mov(
                            AsmType::Qword,
                            Gp::R10,
                            Operand::PseudoMem(self.scratch, at),
                        ));
                    }
                }
                let halves = if class_of(t) == Class::V256 { 2 } else { 1 };
                for half in 0..halves {
                    self.emit(xmov(
                        XMove::Dq,
                        Operand::PseudoMem(self.scratch, half * 16),
                        XMM14,
                    ));
                    let dst = self.part(dst, half * 16);
                    self.store_vec(XMM14, dst);
                }
            }
        }
    }

    // Mask lanes are stored as all-ones so vector selects and blends see
    // their sign bits.
    fn lane_store_bits(&mut self, value: &crate::common::Constant, lane: usize) -> u64 {
        if value.kind().is_mask() {
            if value.get_bool(lane) {
                u64::MAX
            } else {
                0
            }
        } else {
            value.lane_bits(lane)
        }
    }

    fn part(&self, slot: SlotId, offset: i32) -> Operand {
        if offset == 0 && class_of(self.ty(slot)) != Class::V256 {
            Operand::Pseudo(slot)
        } else {
            Operand::PseudoMem(slot, offset)
        }
    }

    fn mov_slot(&mut self, dst: SlotId, src: SlotId) {
        match class_of(self.ty(dst)) {
            Class::GpI32 => self.emit(mov(AsmType::Dword, self.op(src), self.op(dst))),
            Class::GpI64 => self.emit(mov(AsmType::Qword, self.op(src), self.op(dst))),
            Class::X32 => self.emit(xmov(XMove::Ss, self.op(src), self.op(dst))),
            Class::X64 => self.emit(xmov(XMove::Sd, self.op(src), self.op(dst))),
            Class::V128 => self.emit(xmov(XMove::Dq, self.op(src), self.op(dst))),
            Class::V256 => {
                for half in [0, 16] {
                    let s = self.part(src, half);
                    let d = self.part(dst, half);
                    self.emit(xmov(XMove::Dq, s, d));
                }
            }
        }
    }

    fn fetch_arg(&mut self, dst: SlotId, index: u32) {
        self.emit(mov(
            AsmType::Qword,
            Operand::Mem(Gp::Rbx, index as i32 * 8),
            self.op(dst),
        ));
    }

    fn load(&mut self, dst: SlotId, ptr: SlotId, offset: i32) {
        self.emit(mov(AsmType::Qword, self.op(ptr), Gp::R11));
        let t = self.ty(dst);
        let mem = |at: i32| Operand::Mem(Gp::R11, offset + at);

        match class_of(t) {
            Class::GpI32 => match t.kind() {
                TypeKind::Bool => {
                    self.emit(mov(AsmType::Dword, mem(0), Gp::R10));
                    self.emit(binary(AsmType::Dword, BinOp::And, Operand::Imm(1), Gp::R10));
                    self.emit(mov(AsmType::Dword, Gp::R10, self.op(dst)));
                }
                TypeKind::QBool => {
                    self.emit(mov(AsmType::Qword, mem(0), Gp::R10));
                    self.emit(mov(AsmType::Dword, Operand::Imm(0), Gp::R11));
                    self.emit(Inst::Cmp(AsmType::Qword, Operand::Imm(0), Operand::Gp(Gp::R10)));
                    self.emit(Inst::SetCC(Cond::NE, Gp::R11));
                    self.emit(mov(AsmType::Dword, Gp::R11, self.op(dst)));
                }
                _ => {
                    self.emit(mov(AsmType::Dword, mem(0), self.op(dst)));
                }
            },
            Class::GpI64 => self.emit(mov(AsmType::Qword, mem(0), self.op(dst))),
            Class::X32 => self.emit(xmov(XMove::Ss, mem(0), self.op(dst))),
            Class::X64 => self.emit(xmov(XMove::Sd, mem(0), self.op(dst))),
            Class::V128 => match t.size() {
                8 => self.emit(xmov(XMove::Sd, mem(0), self.op(dst))),
                12 => {
                    self.emit(xmov(XMove::Sd, mem(0), XMM14));
                    self.emit(xmov(XMove::Ss, mem(8), XMM15));
                    self.emit(xop(XOp::Movlhps, XMM15, XMM14));
                    self.store_vec(XMM14, self.op(dst));
                }
                _ => self.emit(xmov(XMove::Dq, mem(0), self.op(dst))),
            },
            Class::V256 => {
                for half in [0, 16] {
                    self.emit(xmov(XMove::Dq, mem(half), XMM14));
                    let d = self.part(dst, half);
                    self.store_vec(XMM14, d);
                }
            }
        }
    }

    fn store(&mut self, ptr: SlotId, offset: i32, src: SlotId) {
        self.emit(mov(AsmType::Qword, self.op(ptr), Gp::R11));
        let t = self.ty(src);
        let mem = |at: i32| Operand::Mem(Gp::R11, offset + at);

        match class_of(t) {
            Class::GpI32 => match t.kind() {
                TypeKind::Bool => {
                    self.emit(mov(AsmType::Dword, self.op(src), Gp::R10));
                    self.emit(Inst::Unary(AsmType::Dword, UnaryOp::Neg, Operand::Gp(Gp::R10)));
                    self.emit(mov(AsmType::Dword, Gp::R10, mem(0)));
                }
                TypeKind::QBool => {
                    self.emit(mov(AsmType::Dword, self.op(src), Gp::R10));
                    self.emit(Inst::Unary(AsmType::Qword, UnaryOp::Neg, Operand::Gp(Gp::R10)));
                    self.emit(mov(AsmType::Qword, Gp::R10, mem(0)));
                }
                _ => {
                    self.emit(mov(AsmType::Dword, self.op(src), Gp::R10));
                    self.emit(mov(AsmType::Dword, Gp::R10, mem(0)));
                }
            },
            Class::GpI64 => {
                self.emit(mov(AsmType::Qword, self.op(src), Gp::R10));
                self.emit(mov(AsmType::Qword, Gp::R10, mem(0)));
            }
            Class::X32 => {
                self.emit(xmov(XMove::Ss, self.op(src), XMM15));
                self.emit(xmov(XMove::Ss, XMM15, mem(0)));
            }
            Class::X64 => {
                self.emit(xmov(XMove::Sd, self.op(src), XMM15));
                self.emit(xmov(XMove::Sd, XMM15, mem(0)));
            }
            Class::V128 => match t.size() {
                8 => {
                    self.emit(xmov(XMove::Sd, self.op(src), XMM15));
                    self.emit(xmov(XMove::Sd, XMM15, mem(0)));
                }
                12 => {
                    self.emit(xmov(XMove::Dq, self.op(src), XMM14));
                    self.emit(xmov(XMove::Sd, XMM14, mem(0)));
                    self.emit(xop(XOp::Movhlps, XMM14, XMM15));
                    self.emit(xmov(XMove::Ss, XMM15, mem(8)));
                }
                _ => {
                    self.emit(xmov(XMove::Dq, self.op(src), XMM14));
                    self.emit(xmov(XMove::Dq, XMM14, mem(0)));
                }
            },
            Class::V256 => {
                for half in [0, 16] {
                    let s = self.part(src, half);
                    self.emit(xmov(XMove::Dq, s, XMM14));
                    self.emit(xmov(XMove::Dq, XMM14, mem(half)));
                }
            }
        }
    }

    fn unary(&mut self, op: IrUnaryOp, dst: SlotId, src: SlotId) {
        let t = self.ty(dst);
        match class_of(t) {
            Class::GpI32 => self.gp_unary(op, dst, src),
            Class::X32 | Class::X64 => self.scalar_float_unary(op, dst, src, t),
            Class::V128 => self.vec_unary(op, self.op(dst), self.op(src), t),
            Class::V256 => {
                for half in [0, 16] {
                    let d = self.part(dst, half);
                    let s = self.part(src, half);
                    self.vec_unary(op, d, s, t);
                }
            }
            Class::GpI64 => unreachable!("no pointer unary ops"),
        }
    }

    fn gp_unary(&mut self, op: IrUnaryOp, dst: SlotId, src: SlotId) {
        self.emit(mov(AsmType::Dword, self.op(src), Gp::R10));
        match op {
            IrUnaryOp::Neg => {
                self.emit(Inst::Unary(AsmType::Dword, UnaryOp::Neg, Operand::Gp(Gp::R10)))
            }
            IrUnaryOp::Not => {
                self.emit(Inst::Unary(AsmType::Dword, UnaryOp::Not, Operand::Gp(Gp::R10)))
            }
            IrUnaryOp::Abs => {
                self.emit(mov(AsmType::Dword, Gp::R10, Gp::R11));
                self.emit(binary(AsmType::Dword, BinOp::Sar, Operand::Imm(31), Gp::R11));
                self.emit(binary(AsmType::Dword, BinOp::Xor, Gp::R11, Gp::R10));
                self.emit(binary(AsmType::Dword, BinOp::Sub, Gp::R11, Gp::R10));
            }
            IrUnaryOp::Sqrt => unreachable!("no integer sqrt"),
        }
        self.emit(mov(AsmType::Dword, Gp::R10, self.op(dst)));
    }

    fn scalar_float_unary(&mut self, op: IrUnaryOp, dst: SlotId, src: SlotId, t: TypeInfo) {
        let double = t.kind() == TypeKind::Double;
        let mv = if double { XMove::Sd } else { XMove::Ss };
        match op {
            IrUnaryOp::Neg | IrUnaryOp::Abs => {
                if double {
                    let bits = if op == IrUnaryOp::Neg {
                        0x8000_0000_0000_0000u64
                    } else {
                        0x7FFF_FFFF_FFFF_FFFFu64
                    };
                    self.splat_pattern64(bits, XMM14);
                } else {
                    let bits = if op == IrUnaryOp::Neg {
                        0x8000_0000u32
                    } else {
                        0x7FFF_FFFFu32
                    };
                    self.splat_pattern32(bits, XMM14);
                }
                self.emit(xmov(mv, self.op(src), XMM15));
                let bitop = if op == IrUnaryOp::Neg {
                    XOp::Xorps
                } else {
                    XOp::Andps
                };
                self.emit(xop(bitop, XMM14, XMM15));
                self.emit(xmov(mv, XMM15, self.op(dst)));
            }
            IrUnaryOp::Sqrt => {
                let sqrt = if double { XOp::Sqrtsd } else { XOp::Sqrtss };
                self.emit(Inst::XmmBinary(sqrt, self.op(src), Operand::Xmm(XMM15)));
                self.emit(xmov(mv, XMM15, self.op(dst)));
            }
            IrUnaryOp::Not => unreachable!("no float complement"),
        }
    }

    fn vec_unary(&mut self, op: IrUnaryOp, dst: Operand, src: Operand, t: TypeInfo) {
        match (op, pack_of(t)) {
            (IrUnaryOp::Neg, Pack::I32) => {
                self.emit(xop(XOp::Pxor, XMM14, XMM14));
                self.emit(xop(XOp::Psubd, src, XMM14));
                self.store_vec(XMM14, dst);
            }
            (IrUnaryOp::Neg, Pack::F32) => {
                self.splat_pattern32(0x8000_0000, XMM14);
                self.emit(xmov(XMove::Dq, src, XMM15));
                self.emit(xop(XOp::Xorps, XMM14, XMM15));
                self.store_vec(XMM15, dst);
            }
            (IrUnaryOp::Neg, Pack::F64) => {
                self.splat_pattern64(0x8000_0000_0000_0000, XMM14);
                self.emit(xmov(XMove::Dq, src, XMM15));
                self.emit(xop(XOp::Xorps, XMM14, XMM15));
                self.store_vec(XMM15, dst);
            }
            (IrUnaryOp::Not, Pack::I32) => {
                self.emit(xmov(XMove::Dq, src, XMM14));
                self.ones(XMM15);
                self.emit(xop(XOp::Pxor, XMM15, XMM14));
                self.store_vec(XMM14, dst);
            }
            (IrUnaryOp::Abs, Pack::I32) => {
                self.emit(xmov(XMove::Dq, src, XMM14));
                self.emit(xmov(XMove::Dq, XMM14, XMM15));
                self.emit(Inst::XmmImm(
                    XImmOp::PsradImm,
                    31,
                    Operand::Xmm(XMM15),
                    Operand::Xmm(XMM15),
                ));
                self.emit(xop(XOp::Pxor, XMM15, XMM14));
                self.emit(xop(XOp::Psubd, XMM15, XMM14));
                self.store_vec(XMM14, dst);
            }
            (IrUnaryOp::Abs, Pack::F32) => {
                self.splat_pattern32(0x7FFF_FFFF, XMM14);
                self.emit(xmov(XMove::Dq, src, XMM15));
                self.emit(xop(XOp::Andps, XMM14, XMM15));
                self.store_vec(XMM15, dst);
            }
            (IrUnaryOp::Abs, Pack::F64) => {
                self.splat_pattern64(0x7FFF_FFFF_FFFF_FFFF, XMM14);
                self.emit(xmov(XMove::Dq, src, XMM15));
                self.emit(xop(XOp::Andps, XMM14, XMM15));
                self.store_vec(XMM15, dst);
            }
            (IrUnaryOp::Sqrt, Pack::F32) => {
                self.emit(xmov(XMove::Dq, src, XMM14));
                self.emit(Inst::XmmBinary(
                    XOp::Sqrtps,
                    Operand::Xmm(XMM14),
                    Operand::Xmm(XMM14),
                ));
                self.store_vec(XMM14, dst);
            }
            (IrUnaryOp::Sqrt, Pack::F64) => {
                self.emit(xmov(XMove::Dq, src, XMM14));
                self.emit(Inst::XmmBinary(
                    XOp::Sqrtpd,
                    Operand::Xmm(XMM14),
                    Operand::Xmm(XMM14),
                ));
                self.store_vec(XMM14, dst);
            }
            _ => unreachable!("invalid vector unary"),
        }
    }

    fn binary_inst(&mut self, op: IrBinaryOp, dst: SlotId, a: SlotId, b: SlotId) {
        let t = self.ty(dst);
        match class_of(t) {
            Class::GpI32 => self.gp_binary(op, dst, a, b),
            Class::X32 | Class::X64 => self.scalar_float_binary(op, dst, a, b, t),
            Class::V128 => {
                let (d, aa, bb) = (self.op(dst), self.op(a), self.op(b));
                self.vec_binary(op, d, aa, bb, t, b)
            }
            Class::V256 => {
                for half in [0, 16] {
                    let d = self.part(dst, half);
                    let aa = self.part(a, half);
                    let bb = self.part(b, half);
                    self.vec_binary(op, d, aa, bb, t, b);
                }
            }
            Class::GpI64 => unreachable!("no pointer arithmetic"),
        }
    }

    fn gp_binary(&mut self, op: IrBinaryOp, dst: SlotId, a: SlotId, b: SlotId) {
        use IrBinaryOp::*;
        match op {
            Add | Sub | Mul | And | Or | Xor => {
                let bin = match op {
                    Add => BinOp::Add,
                    Sub => BinOp::Sub,
                    Mul => BinOp::Mult,
                    And => BinOp::And,
                    Or => BinOp::Or,
                    _ => BinOp::Xor,
                };
                self.emit(mov(AsmType::Dword, self.op(a), Gp::R10));
                self.emit(binary(AsmType::Dword, bin, self.op(b), Gp::R10));
                self.emit(mov(AsmType::Dword, Gp::R10, self.op(dst)));
            }
            Shl | Shr => {
                self.emit(mov(AsmType::Dword, self.op(b), Gp::Rcx));
                self.emit(mov(AsmType::Dword, self.op(a), Gp::R10));
                let bin = if op == Shl { BinOp::Shl } else { BinOp::Sar };
                self.emit(binary(AsmType::Dword, bin, Gp::Rcx, Gp::R10));
                self.emit(mov(AsmType::Dword, Gp::R10, self.op(dst)));
            }
            Div | Rem => {
                self.emit(mov(AsmType::Dword, self.op(a), Gp::Rax));
                self.emit(Inst::Cdq);
                self.emit(Inst::Idiv(self.op(b)));
                let result = if op == Div { Gp::Rax } else { Gp::Rdx };
                self.emit(mov(AsmType::Dword, result, self.op(dst)));
            }
            Min | Max => {
                self.emit(mov(AsmType::Dword, self.op(a), Gp::R10));
                self.emit(mov(AsmType::Dword, self.op(b), Gp::R11));
                self.emit(Inst::Cmp(AsmType::Dword, Operand::Gp(Gp::R11), Operand::Gp(Gp::R10)));
                let cond = if op == Min { Cond::G } else { Cond::L };
                self.emit(Inst::Cmov(
                    AsmType::Dword,
                    cond,
                    Operand::Gp(Gp::R11),
                    Operand::Gp(Gp::R10),
                ));
                self.emit(mov(AsmType::Dword, Gp::R10, self.op(dst)));
            }
        }
    }

    fn scalar_float_binary(
        &mut self,
        op: IrBinaryOp,
        dst: SlotId,
        a: SlotId,
        b: SlotId,
        t: TypeInfo,
    ) {
        use IrBinaryOp::*;
        let double = t.kind() == TypeKind::Double;
        let mv = if double { XMove::Sd } else { XMove::Ss };
        let xo = match (op, double) {
            (Add, false) => XOp::Addss,
            (Add, true) => XOp::Addsd,
            (Sub, false) => XOp::Subss,
            (Sub, true) => XOp::Subsd,
            (Mul, false) => XOp::Mulss,
            (Mul, true) => XOp::Mulsd,
            (Div, false) => XOp::Divss,
            (Div, true) => XOp::Divsd,
            (Min, false) => XOp::Minss,
            (Min, true) => XOp::Minsd,
            (Max, false) => XOp::Maxss,
            (Max, true) => XOp::Maxsd,
            _ => unreachable!("invalid scalar float binary"),
        };
        self.emit(xmov(mv, self.op(a), XMM15));
        self.emit(xop(xo, self.op(b), XMM15));
        self.emit(xmov(mv, XMM15, self.op(dst)));
    }

    // `count_slot` is only meaningful for the shift ops, whose second IR
    // operand is a scalar count rather than a vector.
    fn vec_binary(
        &mut self,
        op: IrBinaryOp,
        dst: Operand,
        a: Operand,
        b: Operand,
        t: TypeInfo,
        count_slot: SlotId,
    ) {
        use IrBinaryOp::*;
        let pack = pack_of(t);

        if let Some(xo) = packed_simple(op, pack) {
            self.emit(xmov(XMove::Dq, a, XMM14));
            self.emit(xop(xo, b, XMM14));
            self.store_vec(XMM14, dst);
            return;
        }

        match (op, pack) {
            (Mul, Pack::I32) => {
                if self.sse41 {
                    self.emit(xmov(XMove::Dq, a, XMM14));
                    self.emit(xop(XOp::Pmulld, b, XMM14));
                    self.store_vec(XMM14, dst);
                } else {
                    // pmuludq gives the even-lane products; shuffle the odd
                    // lanes down, multiply, and interleave the lows.
                    self.emit(xmov(XMove::Dq, a, XMM14));
                    self.emit(xmov(XMove::Dq, b, XMM15));
                    self.emit(Inst::XmmImm(
                        XImmOp::Pshufd,
                        0xB1,
                        Operand::Xmm(XMM14),
                        Operand::Xmm(XMM0),
                    ));
                    self.emit(xop(XOp::Pmuludq, XMM15, XMM14));
                    self.emit(Inst::XmmImm(
                        XImmOp::Pshufd,
                        0xB1,
                        Operand::Xmm(XMM15),
                        Operand::Xmm(XMM15),
                    ));
                    self.emit(xop(XOp::Pmuludq, XMM15, XMM0));
                    self.emit(Inst::XmmImm(
                        XImmOp::Pshufd,
                        0x08,
                        Operand::Xmm(XMM14),
                        Operand::Xmm(XMM14),
                    ));
                    self.emit(Inst::XmmImm(
                        XImmOp::Pshufd,
                        0x08,
                        Operand::Xmm(XMM0),
                        Operand::Xmm(XMM0),
                    ));
                    self.emit(xop(XOp::Punpckldq, XMM0, XMM14));
                    self.store_vec(XMM14, dst);
                }
            }
            (Min | Max, Pack::I32) => {
                if self.sse41 {
                    let xo = if op == Min { XOp::Pminsd } else { XOp::Pmaxsd };
                    self.emit(xmov(XMove::Dq, a, XMM14));
                    self.emit(xop(xo, b, XMM14));
                    self.store_vec(XMM14, dst);
                } else {
                    self.emit(xmov(XMove::Dq, a, XMM14));
                    self.emit(xmov(XMove::Dq, b, XMM15));
                    self.emit(xmov(XMove::Dq, XMM14, XMM0));
                    self.emit(xop(XOp::Pcmpgtd, XMM15, XMM0));
                    if op == Min {
                        self.emit(xop(XOp::Pand, XMM0, XMM15));
                        self.emit(xop(XOp::Pandn, XMM14, XMM0));
                        self.emit(xop(XOp::Por, XMM0, XMM15));
                        self.store_vec(XMM15, dst);
                    } else {
                        self.emit(xop(XOp::Pand, XMM0, XMM14));
                        self.emit(xop(XOp::Pandn, XMM15, XMM0));
                        self.emit(xop(XOp::Por, XMM0, XMM14));
                        self.store_vec(XMM14, dst);
                    }
                }
            }
            (Shl | Shr, Pack::I32) => {
                self.emit(xmov(XMove::D, self.op(count_slot), XMM15));
                self.emit(xmov(XMove::Dq, a, XMM14));
                let xo = if op == Shl { XOp::Pslld } else { XOp::Psrad };
                self.emit(xop(xo, XMM15, XMM14));
                self.store_vec(XMM14, dst);
            }
            _ => unreachable!("invalid vector binary {:?} {:?}", op, pack),
        }
    }

    fn cmp(&mut self, op: IrCmpOp, dst: SlotId, a: SlotId, b: SlotId) {
        let t = self.ty(a);
        match class_of(t) {
            Class::GpI32 => self.gp_cmp(op, dst, a, b),
            Class::X32 | Class::X64 => self.scalar_float_cmp(op, dst, a, b, t),
            Class::V128 => {
                let (d, aa, bb) = (self.op(dst), self.op(a), self.op(b));
                self.vec_cmp(op, d, aa, bb, t);
            }
            Class::V256 => {
                for half in [0, 16] {
                    let d = self.part(dst, half);
                    let aa = self.part(a, half);
                    let bb = self.part(b, half);
                    self.vec_cmp(op, d, aa, bb, t);
                }
            }
            Class::GpI64 => unreachable!("no pointer compare"),
        }
    }

    fn gp_cmp(&mut self, op: IrCmpOp, dst: SlotId, a: SlotId, b: SlotId) {
        let cond = match op {
            IrCmpOp::Eq => Cond::E,
            IrCmpOp::Ne => Cond::NE,
            IrCmpOp::Lt => Cond::L,
            IrCmpOp::Le => Cond::LE,
            IrCmpOp::Gt => Cond::G,
            IrCmpOp::Ge => Cond::GE,
        };
        self.emit(mov(AsmType::Dword, Operand::Imm(0), Gp::R10));
        self.emit(mov(AsmType::Dword, self.op(a), Gp::R11));
        self.emit(Inst::Cmp(AsmType::Dword, self.op(b), Operand::Gp(Gp::R11)));
        self.emit(Inst::SetCC(cond, Gp::R10));
        self.emit(mov(AsmType::Dword, Gp::R10, self.op(dst)));
    }

    fn scalar_float_cmp(&mut self, op: IrCmpOp, dst: SlotId, a: SlotId, b: SlotId, t: TypeInfo) {
        let double = t.kind() == TypeKind::Double;
        let mv = if double { XMove::Sd } else { XMove::Ss };
        let ucomi = if double { XOp::Ucomisd } else { XOp::Ucomiss };

        self.emit(mov(AsmType::Dword, Operand::Imm(0), Gp::R10));
        match op {
            IrCmpOp::Eq | IrCmpOp::Ne => {
                self.emit(mov(AsmType::Dword, Operand::Imm(0), Gp::R11));
                self.emit(xmov(mv, self.op(a), XMM15));
                self.emit(xop(ucomi, self.op(b), XMM15));
                if op == IrCmpOp::Eq {
                    self.emit(Inst::SetCC(Cond::E, Gp::R10));
                    self.emit(Inst::SetCC(Cond::NP, Gp::R11));
                    self.emit(binary(AsmType::Dword, BinOp::And, Gp::R11, Gp::R10));
                } else {
                    self.emit(Inst::SetCC(Cond::NE, Gp::R10));
                    self.emit(Inst::SetCC(Cond::P, Gp::R11));
                    self.emit(binary(AsmType::Dword, BinOp::Or, Gp::R11, Gp::R10));
                }
            }
            IrCmpOp::Lt | IrCmpOp::Le => {
                // a < b  is  b > a; `above` is false on unordered.
                self.emit(xmov(mv, self.op(b), XMM15));
                self.emit(xop(ucomi, self.op(a), XMM15));
                let cond = if op == IrCmpOp::Lt { Cond::A } else { Cond::AE };
                self.emit(Inst::SetCC(cond, Gp::R10));
            }
            IrCmpOp::Gt | IrCmpOp::Ge => {
                self.emit(xmov(mv, self.op(a), XMM15));
                self.emit(xop(ucomi, self.op(b), XMM15));
                let cond = if op == IrCmpOp::Gt { Cond::A } else { Cond::AE };
                self.emit(Inst::SetCC(cond, Gp::R10));
            }
        }
        self.emit(mov(AsmType::Dword, Gp::R10, self.op(dst)));
    }

    fn vec_cmp(&mut self, op: IrCmpOp, dst: Operand, a: Operand, b: Operand, t: TypeInfo) {
        use IrCmpOp::*;
        // Mask operands compare as bit patterns; an all-ones qbool lane
        // would read as NaN on the float side.
        let pack = if t.kind().is_mask() {
            Pack::I32
        } else {
            pack_of(t)
        };
        match pack {
            Pack::I32 => {
                let (first, second, invert) = match op {
                    Eq => (a, b, false),
                    Ne => (a, b, true),
                    Gt => (a, b, false),
                    Le => (a, b, true),
                    Lt => (b, a, false),
                    Ge => (b, a, true),
                };
                let xo = if matches!(op, Eq | Ne) {
                    XOp::Pcmpeqd
                } else {
                    XOp::Pcmpgtd
                };
                self.emit(xmov(XMove::Dq, first, XMM14));
                self.emit(xop(xo, second, XMM14));
                if invert {
                    self.ones(XMM15);
                    self.emit(xop(XOp::Pxor, XMM15, XMM14));
                }
                self.store_vec(XMM14, dst);
            }
            pack => {
                let cmp = if pack == Pack::F64 {
                    XImmOp::Cmppd
                } else {
                    XImmOp::Cmpps
                };
                // Predicates 0/1/2/4 are quiet-NaN-correct; gt/ge swap sides.
                let (first, second, imm) = match op {
                    Eq => (a, b, 0u8),
                    Lt => (a, b, 1),
                    Le => (a, b, 2),
                    Ne => (a, b, 4),
                    Gt => (b, a, 1),
                    Ge => (b, a, 2),
                };
                self.emit(xmov(XMove::Dq, first, XMM14));
                self.emit(Inst::XmmImm(cmp, imm, second, Operand::Xmm(XMM14)));
                self.store_vec(XMM14, dst);
            }
        }
    }

    fn select(&mut self, dst: SlotId, mask: SlotId, a: SlotId, b: SlotId) {
        let t = self.ty(dst);
        let halves: &[i32] = if class_of(t) == Class::V256 {
            &[0, 16]
        } else {
            &[0]
        };
        for &half in halves {
            let d = self.part(dst, half);
            let m = self.part(mask, half);
            let aa = self.part(a, half);
            let bb = self.part(b, half);

            if self.sse41 {
                let blend = if pack_of(t) == Pack::F64 {
                    XOp::Blendvpd
                } else {
                    XOp::Blendvps
                };
                self.emit(xmov(XMove::Dq, m, XMM0));
                self.emit(xmov(XMove::Dq, bb, XMM14));
                self.emit(xop(blend, aa, XMM14));
                self.store_vec(XMM14, d);
            } else {
                self.emit(xmov(XMove::Dq, m, XMM0));
                self.emit(xmov(XMove::Dq, aa, XMM14));
                self.emit(xop(XOp::Pand, XMM0, XMM14));
                self.emit(xmov(XMove::Dq, m, XMM0));
                self.emit(xop(XOp::Pandn, bb, XMM0));
                self.emit(xop(XOp::Por, XMM0, XMM14));
                self.store_vec(XMM14, d);
            }
        }
    }

    fn shuffle(&mut self, dst: SlotId, src: SlotId, selector: u32) {
        let src_t = self.ty(src);
        let imm = if pack_of(src_t) == Pack::F64 {
            // Map the 64-bit lane picks onto dword pairs.
            let l0 = selector & 3;
            let l1 = (selector >> 2) & 3;
            ((2 * l0) | (2 * l0 + 1) << 2 | (2 * l1) << 4 | (2 * l1 + 1) << 6) as u8
        } else {
            (selector & 0xFF) as u8
        };
        self.emit(Inst::XmmImm(
            XImmOp::Pshufd,
            imm,
            self.op(src),
            Operand::Xmm(XMM14),
        ));
        self.store_vec(XMM14, self.op(dst));
    }

    fn splat(&mut self, dst: SlotId, src: SlotId) {
        let dst_t = self.ty(dst);
        let src_t = self.ty(src);

        match src_t.kind() {
            TypeKind::Int => {
                self.emit(xmov(XMove::D, self.op(src), XMM14));
                self.emit(Inst::XmmImm(
                    XImmOp::Pshufd,
                    0x00,
                    Operand::Xmm(XMM14),
                    Operand::Xmm(XMM14),
                ));
            }
            TypeKind::Bool => {
                self.emit(mov(AsmType::Dword, self.op(src), Gp::R10));
                self.emit(Inst::Unary(AsmType::Dword, UnaryOp::Neg, Operand::Gp(Gp::R10)));
                self.emit(xmov(XMove::D, Gp::R10, XMM14));
                self.emit(Inst::XmmImm(
                    XImmOp::Pshufd,
                    0x00,
                    Operand::Xmm(XMM14),
                    Operand::Xmm(XMM14),
                ));
            }
            TypeKind::QBool => {
                self.emit(mov(AsmType::Dword, self.op(src), Gp::R10));
                self.emit(Inst::Unary(AsmType::Qword, UnaryOp::Neg, Operand::Gp(Gp::R10)));
                self.emit(xmov(XMove::Q64, Gp::R10, XMM14));
                self.emit(Inst::XmmImm(
                    XImmOp::Pshufd,
                    0x44,
                    Operand::Xmm(XMM14),
                    Operand::Xmm(XMM14),
                ));
            }
            TypeKind::Float => {
                self.emit(xmov(XMove::Ss, self.op(src), XMM14));
                self.emit(Inst::XmmImm(
                    XImmOp::Pshufd,
                    0x00,
                    Operand::Xmm(XMM14),
                    Operand::Xmm(XMM14),
                ));
            }
            TypeKind::Double => {
                self.emit(xmov(XMove::Sd, self.op(src), XMM14));
                self.emit(Inst::XmmImm(
                    XImmOp::Pshufd,
                    0x44,
                    Operand::Xmm(XMM14),
                    Operand::Xmm(XMM14),
                ));
            }
            _ => unreachable!("invalid splat source"),
        }

        if class_of(dst_t) == Class::V256 {
            for half in [0, 16] {
                let d = self.part(dst, half);
                self.store_vec(XMM14, d);
            }
        } else {
            let d = self.op(dst);
            self.store_vec(XMM14, d);
        }
    }

    fn first(&mut self, dst: SlotId, src: SlotId) {
        let dst_t = self.ty(dst);
        match class_of(dst_t) {
            Class::X32 => {
                self.emit(xmov(XMove::Ss, self.op(src), XMM15));
                self.emit(xmov(XMove::Ss, XMM15, self.op(dst)));
            }
            Class::X64 => {
                self.emit(xmov(XMove::Sd, self.op(src), XMM15));
                self.emit(xmov(XMove::Sd, XMM15, self.op(dst)));
            }
            Class::GpI32 => {
                self.emit(xmov(XMove::D, self.op(src), Gp::R10));
                if dst_t.kind().is_mask() {
                    self.emit(binary(AsmType::Dword, BinOp::And, Operand::Imm(1), Gp::R10));
                }
                self.emit(mov(AsmType::Dword, Gp::R10, self.op(dst)));
            }
            _ => unreachable!("invalid lane extraction"),
        }
    }

    fn call(&mut self, dst: SlotId, func: MathFn, args: &[SlotId]) {
        let double = self.ty(dst).kind() == TypeKind::Double;
        let mv = if double { XMove::Sd } else { XMove::Ss };

        self.emit(xmov(mv, self.op(args[0]), XMM0));
        if args.len() > 1 {
            self.emit(xmov(mv, self.op(args[1]), Xmm(1)));
        }
        let address = math::address(func, double);
        self.emit(mov(AsmType::Qword, Operand::Imm(address as i64), Gp::R10));
        self.emit(Inst::Call(Operand::Gp(Gp::R10)));
        self.emit(xmov(mv, XMM0, self.op(dst)));
    }

    fn terminator(&mut self, term: &IrTerm) {
        match term {
            IrTerm::Jmp(b) => {
                let label = self.block_labels[*b];
                self.emit(Inst::Jmp(label));
            }
            IrTerm::Branch(cond, then_b, else_b) => {
                self.emit(Inst::Cmp(AsmType::Dword, Operand::Imm(0), self.op(*cond)));
                let then_label = self.block_labels[*then_b];
                let else_label = self.block_labels[*else_b];
                self.emit(Inst::JmpCC(Cond::NE, then_label));
                self.emit(Inst::Jmp(else_label));
            }
            IrTerm::Ret => self.emit(Inst::Ret),
        }
    }

    fn inst(&mut self, inst: &IrInst) {
        match inst {
            IrInst::Imm(d, c) => self.imm(*d, c),
            IrInst::Mov(d, s) => self.mov_slot(*d, *s),
            IrInst::FetchArg(d, i) => self.fetch_arg(*d, *i),
            IrInst::Load(d, p, off) => self.load(*d, *p, *off),
            IrInst::Store(p, off, s) => self.store(*p, *off, *s),
            IrInst::Unary(op, d, s) => self.unary(*op, *d, *s),
            IrInst::Binary(op, d, a, b) => self.binary_inst(*op, *d, *a, *b),
            IrInst::Cmp(op, d, a, b) => self.cmp(*op, *d, *a, *b),
            IrInst::Select(d, m, a, b) => self.select(*d, *m, *a, *b),
            IrInst::Shuffle(d, s, sel) => self.shuffle(*d, *s, *sel),
            IrInst::Splat(d, s) => self.splat(*d, *s),
            IrInst::First(d, s) => self.first(*d, *s),
            IrInst::Cast(d, s) => self.cast(*d, *s),
            IrInst::Call(d, f, args) => self.call(*d, *f, args),
        }
    }

    // Conversion selection by (source type, destination type). Widths are
    // equal here; splats were split off during lowering.
    fn cast(&mut self, dst: SlotId, src: SlotId) {
        use TypeKind::*;
        let from = self.ty(src);
        let to = self.ty(dst);

        if from.width() == 1 {
            return self.cast_scalar(dst, src, from, to);
        }

        let halves: &[i32] = if from.width() == 8 { &[0, 16] } else { &[0] };
        for &half in halves {
            let s = self.part(src, half);
            let d = self.part(dst, half);

            match (from.kind(), to.kind()) {
                (Int, Float) => {
                    self.emit(Inst::XmmCvt(CvtKind::Dq2ps, s, Operand::Xmm(XMM14)));
                    self.store_vec(XMM14, d);
                }
                (Float, Int) => {
                    self.emit(Inst::XmmCvt(CvtKind::Ps2dq, s, Operand::Xmm(XMM14)));
                    self.store_vec(XMM14, d);
                }
                (Int, Double) => {
                    self.emit(Inst::XmmCvt(CvtKind::Dq2pd, s, Operand::Xmm(XMM14)));
                    self.store_vec(XMM14, d);
                }
                (Double, Int) => {
                    self.emit(Inst::XmmCvt(CvtKind::Pd2dq, s, Operand::Xmm(XMM14)));
                    self.store_vec(XMM14, d);
                }
                (Float, Double) => {
                    self.emit(Inst::XmmCvt(CvtKind::Ps2pd, s, Operand::Xmm(XMM14)));
                    self.store_vec(XMM14, d);
                }
                (Double, Float) => {
                    self.emit(Inst::XmmCvt(CvtKind::Pd2ps, s, Operand::Xmm(XMM14)));
                    self.store_vec(XMM14, d);
                }
                // Mask to numeric: keep the wanted value's bits under the
                // all-ones lanes.
                (Bool, Int) => {
                    self.splat_pattern32(1, XMM14);
                    self.emit(xop(XOp::Pand, s, XMM14));
                    self.store_vec(XMM14, d);
                }
                (Bool, Float) => {
                    self.splat_pattern32(1.0f32.to_bits(), XMM14);
                    self.emit(xop(XOp::Pand, s, XMM14));
                    self.store_vec(XMM14, d);
                }
                (QBool, Double) => {
                    self.splat_pattern64(1.0f64.to_bits(), XMM14);
                    self.emit(xop(XOp::Pand, s, XMM14));
                    self.store_vec(XMM14, d);
                }
                // Numeric to mask: lane-wise "is non-zero".
                (Int, Bool) => {
                    self.emit(xmov(XMove::Dq, s, XMM14));
                    self.emit(xop(XOp::Pxor, XMM15, XMM15));
                    self.emit(xop(XOp::Pcmpeqd, XMM15, XMM14));
                    self.ones(XMM15);
                    self.emit(xop(XOp::Pxor, XMM15, XMM14));
                    self.store_vec(XMM14, d);
                }
                (Float, Bool) => {
                    self.emit(xmov(XMove::Dq, s, XMM14));
                    self.emit(xop(XOp::Xorps, XMM15, XMM15));
                    self.emit(Inst::XmmImm(
                        XImmOp::Cmpps,
                        4,
                        Operand::Xmm(XMM15),
                        Operand::Xmm(XMM14),
                    ));
                    self.store_vec(XMM14, d);
                }
                (Double, QBool) => {
                    self.emit(xmov(XMove::Dq, s, XMM14));
                    self.emit(xop(XOp::Xorps, XMM15, XMM15));
                    self.emit(Inst::XmmImm(
                        XImmOp::Cmppd,
                        4,
                        Operand::Xmm(XMM15),
                        Operand::Xmm(XMM14),
                    ));
                    self.store_vec(XMM14, d);
                }
                // Mask width changes between 32- and 64-bit lanes.
                (Bool, QBool) => {
                    self.emit(Inst::XmmImm(XImmOp::Pshufd, 0x50, s, Operand::Xmm(XMM14)));
                    self.store_vec(XMM14, d);
                }
                (QBool, Bool) => {
                    self.emit(Inst::XmmImm(XImmOp::Pshufd, 0x08, s, Operand::Xmm(XMM14)));
                    self.store_vec(XMM14, d);
                }
                (a, b) if a == b => self.mov_slot(dst, src),
                _ => unreachable!("invalid vector cast"),
            }
        }
    }

    fn cast_scalar(&mut self, dst: SlotId, src: SlotId, from: TypeInfo, to: TypeInfo) {
        use TypeKind::*;
        match (from.kind(), to.kind()) {
            (a, b) if a == b => self.mov_slot(dst, src),
            // 0/1 representations move freely between the mask kinds and int.
            (Bool | QBool, Int) | (Bool, QBool) | (QBool, Bool) => self.mov_slot(dst, src),
            (Int, Bool | QBool) => {
                self.emit(mov(AsmType::Dword, Operand::Imm(0), Gp::R10));
                self.emit(Inst::Cmp(AsmType::Dword, Operand::Imm(0), self.op(src)));
                self.emit(Inst::SetCC(Cond::NE, Gp::R10));
                self.emit(mov(AsmType::Dword, Gp::R10, self.op(dst)));
            }
            (Int | Bool | QBool, Float) => {
                self.emit(Inst::XmmCvt(CvtKind::Si2ss, self.op(src), Operand::Xmm(XMM15)));
                self.emit(xmov(XMove::Ss, XMM15, self.op(dst)));
            }
            (Int | Bool | QBool, Double) => {
                self.emit(Inst::XmmCvt(CvtKind::Si2sd, self.op(src), Operand::Xmm(XMM15)));
                self.emit(xmov(XMove::Sd, XMM15, self.op(dst)));
            }
            (Float, Int) => {
                self.emit(Inst::XmmCvt(CvtKind::Ss2si, self.op(src), Operand::Gp(Gp::R10)));
                self.emit(mov(AsmType::Dword, Gp::R10, self.op(dst)));
            }
            (Double, Int) => {
                self.emit(Inst::XmmCvt(CvtKind::Sd2si, self.op(src), Operand::Gp(Gp::R10)));
                self.emit(mov(AsmType::Dword, Gp::R10, self.op(dst)));
            }
            (Float, Double) => {
                self.emit(Inst::XmmCvt(CvtKind::Ss2sd, self.op(src), Operand::Xmm(XMM15)));
                self.emit(xmov(XMove::Sd, XMM15, self.op(dst)));
            }
            (Double, Float) => {
                self.emit(Inst::XmmCvt(CvtKind::Sd2ss, self.op(src), Operand::Xmm(XMM15)));
                self.emit(xmov(XMove::Ss, XMM15, self.op(dst)));
            }
            (Float | Double, Bool | QBool) => {
                let double = from.kind() == Double;
                let mv = if double { XMove::Sd } else { XMove::Ss };
                let ucomi = if double { XOp::Ucomisd } else { XOp::Ucomiss };
                self.emit(mov(AsmType::Dword, Operand::Imm(0), Gp::R10));
                self.emit(mov(AsmType::Dword, Operand::Imm(0), Gp::R11));
                self.emit(xmov(mv, self.op(src), XMM15));
                self.emit(xop(XOp::Xorps, XMM14, XMM14));
                self.emit(xop(ucomi, XMM14, XMM15));
                self.emit(Inst::SetCC(Cond::NE, Gp::R10));
                self.emit(Inst::SetCC(Cond::P, Gp::R11));
                self.emit(binary(AsmType::Dword, BinOp::Or, Gp::R11, Gp::R10));
                self.emit(mov(AsmType::Dword, Gp::R10, self.op(dst)));
            }
            _ => unreachable!("invalid scalar cast"),
        }
    }
}

fn packed_simple(op: IrBinaryOp, pack: Pack) -> Option<XOp> {
    use IrBinaryOp::*;
    Some(match (op, pack) {
        (Add, Pack::F32) => XOp::Addps,
        (Add, Pack::F64) => XOp::Addpd,
        (Add, Pack::I32) => XOp::Paddd,
        (Sub, Pack::F32) => XOp::Subps,
        (Sub, Pack::F64) => XOp::Subpd,
        (Sub, Pack::I32) => XOp::Psubd,
        (Mul, Pack::F32) => XOp::Mulps,
        (Mul, Pack::F64) => XOp::Mulpd,
        (Div, Pack::F32) => XOp::Divps,
        (Div, Pack::F64) => XOp::Divpd,
        (Min, Pack::F32) => XOp::Minps,
        (Min, Pack::F64) => XOp::Minpd,
        (Max, Pack::F32) => XOp::Maxps,
        (Max, Pack::F64) => XOp::Maxpd,
        (And, _) => XOp::Pand,
        (Or, _) => XOp::Por,
        (Xor, _) => XOp::Pxor,
        _ => return None,
    })
}

pub fn translate(func: &IrFunction, sse41: bool) -> AsmFunction {
    let mut translator = Translator {
        func,
        out: vec![],
        sse41,
        block_labels: (0..func.blocks.len()).collect(),
        label_count: func.blocks.len(),
        scratch: func.slots.len(),
    };

    for (id, block) in func.blocks.iter().enumerate() {
        let label = translator.block_labels[id];
        translator.emit(Inst::Label(label));
        for inst in &block.insts {
            translator.inst(inst);
        }
        translator.terminator(&block.term);
    }

    let scratch = translator.scratch;
    AsmFunction {
        instructions: translator.out,
        label_count: translator.label_count,
        scratch,
    }
}
