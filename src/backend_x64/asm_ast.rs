use derive_more::{Display, From, IsVariant};

use crate::ir::SlotId;

pub type Label = usize;

/// General-purpose registers the backend touches. r10/r11 (and rcx for
/// shift counts, rax/rdx for division) are scratch; rsi/rdi/r8/r9 are the
/// allocatable bank; rbx holds the argument-array base.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Display, PartialOrd, Ord)]
pub enum Gp {
    Rax,
    Rcx,
    Rdx,
    Rbx,
    Rsp,
    Rbp,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
}

impl Gp {
    pub const ALLOCATABLE: [Gp; 4] = [Gp::Rsi, Gp::Rdi, Gp::R8, Gp::R9];

    pub fn encoding(&self) -> u8 {
        match self {
            Gp::Rax => 0,
            Gp::Rcx => 1,
            Gp::Rdx => 2,
            Gp::Rbx => 3,
            Gp::Rsp => 4,
            Gp::Rbp => 5,
            Gp::Rsi => 6,
            Gp::Rdi => 7,
            Gp::R8 => 8,
            Gp::R9 => 9,
            Gp::R10 => 10,
            Gp::R11 => 11,
        }
    }
}

/// XMM registers. xmm0 is the call/blend register, xmm14/xmm15 are scratch,
/// xmm1..xmm13 are the allocatable bank.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Display, PartialOrd, Ord)]
pub struct Xmm(pub u8);

impl Xmm {
    pub const ALLOCATABLE: [Xmm; 13] = [
        Xmm(1),
        Xmm(2),
        Xmm(3),
        Xmm(4),
        Xmm(5),
        Xmm(6),
        Xmm(7),
        Xmm(8),
        Xmm(9),
        Xmm(10),
        Xmm(11),
        Xmm(12),
        Xmm(13),
    ];

    pub fn encoding(&self) -> u8 {
        self.0
    }
}

pub const XMM0: Xmm = Xmm(0);
pub const XMM14: Xmm = Xmm(14);
pub const XMM15: Xmm = Xmm(15);

#[derive(Clone, Copy, PartialEq, Eq, Debug, From, Display, IsVariant)]
pub enum Operand {
    /// Virtual slot, replaced by a register or stack home after allocation.
    #[display("%{_0}")]
    #[from(ignore)]
    Pseudo(SlotId),
    /// Byte offset into a (spilled) slot's stack home.
    #[display("%{_0}+{_1}")]
    #[from(ignore)]
    PseudoMem(SlotId, i32),
    Gp(Gp),
    Xmm(Xmm),
    /// `[rbp + disp]`
    #[display("[rbp{_0:+}]")]
    #[from(ignore)]
    Stack(i32),
    /// `[base + disp]`
    #[display("[{_0}{_1:+}]")]
    #[from(ignore)]
    Mem(Gp, i32),
    #[display("${_0}")]
    Imm(i64),
}

impl Operand {
    pub fn is_memory(&self) -> bool {
        matches!(
            self,
            Operand::Stack(_) | Operand::Mem(..) | Operand::PseudoMem(..)
        )
    }

    pub fn is_register(&self) -> bool {
        matches!(self, Operand::Gp(_) | Operand::Xmm(_))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum AsmType {
    Dword,
    Qword,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum UnaryOp {
    #[display("neg")]
    Neg,
    #[display("not")]
    Not,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum BinOp {
    #[display("add")]
    Add,
    #[display("sub")]
    Sub,
    #[display("imul")]
    Mult,
    #[display("and")]
    And,
    #[display("or")]
    Or,
    #[display("xor")]
    Xor,
    #[display("shl")]
    Shl,
    #[display("sar")]
    Sar,
    #[display("shr")]
    Shr,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Display)]
pub enum Cond {
    E,
    NE,
    L,
    LE,
    G,
    GE,
    A,
    AE,
    B,
    BE,
    P,
    NP,
}

impl Cond {
    pub fn encoding(&self) -> u8 {
        match self {
            Cond::E => 0x4,
            Cond::NE => 0x5,
            Cond::L => 0xC,
            Cond::LE => 0xE,
            Cond::G => 0xF,
            Cond::GE => 0xD,
            Cond::A => 0x7,
            Cond::AE => 0x3,
            Cond::B => 0x2,
            Cond::BE => 0x6,
            Cond::P => 0xA,
            Cond::NP => 0xB,
        }
    }
}

/// XMM data movement flavors; direction comes from the operands.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum XMove {
    /// 4-byte float lane (movss)
    Ss,
    /// 8 bytes (movsd; also used for int pairs)
    Sd,
    /// 16 bytes (movups / movaps for reg-reg)
    Dq,
    /// 4-byte int between xmm and gp/memory (movd)
    D,
    /// 8-byte int between xmm and gp (movq)
    Q64,
}

/// Two-address XMM computation: `dst = dst op src`. After fixup `dst` is
/// always an XMM register; `src` may be an aligned memory operand.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum XOp {
    Addss,
    Addsd,
    Addps,
    Addpd,
    Subss,
    Subsd,
    Subps,
    Subpd,
    Mulss,
    Mulsd,
    Mulps,
    Mulpd,
    Divss,
    Divsd,
    Divps,
    Divpd,
    Minss,
    Minsd,
    Minps,
    Minpd,
    Maxss,
    Maxsd,
    Maxps,
    Maxpd,
    Sqrtss,
    Sqrtsd,
    Sqrtps,
    Sqrtpd,
    Andps,
    Andnps,
    Orps,
    Xorps,
    Pand,
    Pandn,
    Por,
    Pxor,
    Paddd,
    Psubd,
    Pmulld,
    Pmuludq,
    Pcmpeqd,
    Pcmpgtd,
    Pminsd,
    Pmaxsd,
    Pslld,
    Psrld,
    Psrad,
    Punpckldq,
    Punpcklqdq,
    Movlhps,
    Movhlps,
    Blendvps,
    Blendvpd,
    Ucomiss,
    Ucomisd,
}

/// XMM ops carrying an 8-bit immediate; `dst` is a register, and pshufd is
/// non-destructive (`dst = shuffle(src)`).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum XImmOp {
    Pshufd,
    Cmpps,
    Cmppd,
    PslldImm,
    PsrldImm,
    PsradImm,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum CvtKind {
    /// int32 -> f32
    Si2ss,
    /// int32 -> f64
    Si2sd,
    /// f32 -> int32 (truncating)
    Ss2si,
    /// f64 -> int32 (truncating)
    Sd2si,
    /// f32 -> f64
    Ss2sd,
    /// f64 -> f32
    Sd2ss,
    /// 4 x int32 -> 4 x f32
    Dq2ps,
    /// 4 x f32 -> 4 x int32 (truncating)
    Ps2dq,
    /// low 2 x int32 -> 2 x f64
    Dq2pd,
    /// 2 x f64 -> low 2 x int32 (truncating)
    Pd2dq,
    /// low 2 x f32 -> 2 x f64
    Ps2pd,
    /// 2 x f64 -> low 2 x f32
    Pd2ps,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Inst {
    /// mov src -> dst
    Mov(AsmType, Operand, Operand),
    Unary(AsmType, UnaryOp, Operand),
    /// dst = dst op src
    Binary(AsmType, BinOp, Operand, Operand),
    /// flags of (dst - src)
    Cmp(AsmType, Operand, Operand),
    /// conditional move src -> dst (registers)
    Cmov(AsmType, Cond, Operand, Operand),
    /// sets the low byte of a scratch register
    SetCC(Cond, Gp),
    Cdq,
    Idiv(Operand),
    Jmp(Label),
    JmpCC(Cond, Label),
    Label(Label),
    Call(Operand),
    Push(Gp),
    Pop(Gp),
    Ret,

    XmmMov(XMove, Operand, Operand),
    XmmBinary(XOp, Operand, Operand),
    XmmImm(XImmOp, u8, Operand, Operand),
    XmmCvt(CvtKind, Operand, Operand),
}

pub fn mov(asm_type: AsmType, src: impl Into<Operand>, dst: impl Into<Operand>) -> Inst {
    Inst::Mov(asm_type, src.into(), dst.into())
}

pub fn binary(
    asm_type: AsmType,
    op: BinOp,
    src: impl Into<Operand>,
    dst: impl Into<Operand>,
) -> Inst {
    Inst::Binary(asm_type, op, src.into(), dst.into())
}

pub fn xmov(kind: XMove, src: impl Into<Operand>, dst: impl Into<Operand>) -> Inst {
    Inst::XmmMov(kind, src.into(), dst.into())
}

pub fn xop(op: XOp, src: impl Into<Operand>, dst: impl Into<Operand>) -> Inst {
    Inst::XmmBinary(op, src.into(), dst.into())
}

impl std::fmt::Display for Inst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Inst::Mov(t, src, dst) => write!(f, "\tmov.{} {}, {}", t, dst, src),
            Inst::Unary(t, op, operand) => write!(f, "\t{}.{} {}", op, t, operand),
            Inst::Binary(t, op, src, dst) => write!(f, "\t{}.{} {}, {}", op, t, dst, src),
            Inst::Cmp(t, src, dst) => write!(f, "\tcmp.{} {}, {}", t, dst, src),
            Inst::Cmov(t, cond, src, dst) => {
                write!(f, "\tcmov{:?}.{} {}, {}", cond, t, dst, src)
            }
            Inst::SetCC(cond, gp) => write!(f, "\tset{:?} {}b", cond, gp),
            Inst::Cdq => write!(f, "\tcdq"),
            Inst::Idiv(operand) => write!(f, "\tidiv {}", operand),
            Inst::Jmp(label) => write!(f, "\tjmp .L{}", label),
            Inst::JmpCC(cond, label) => write!(f, "\tj{:?} .L{}", cond, label),
            Inst::Label(label) => write!(f, ".L{}:", label),
            Inst::Call(operand) => write!(f, "\tcall {}", operand),
            Inst::Push(gp) => write!(f, "\tpush {}", gp),
            Inst::Pop(gp) => write!(f, "\tpop {}", gp),
            Inst::Ret => write!(f, "\tret"),
            Inst::XmmMov(kind, src, dst) => write!(f, "\tmov{} {}, {}", kind, dst, src),
            Inst::XmmBinary(op, src, dst) => write!(f, "\t{} {}, {}", op, dst, src),
            Inst::XmmImm(op, imm, src, dst) => {
                write!(f, "\t{} {}, {}, {:#x}", op, dst, src, imm)
            }
            Inst::XmmCvt(kind, src, dst) => write!(f, "\tcvt.{} {}, {}", kind, dst, src),
        }
    }
}

/// One compiled function body before encoding.
#[derive(Clone, Debug)]
pub struct AsmFunction {
    pub instructions: Vec<Inst>,
    /// Number of labels handed out (labels are dense from 0).
    pub label_count: usize,
    /// Virtual slot id of the 32-byte scratch area used for vector
    /// constant materialization.
    pub scratch: SlotId,
}
