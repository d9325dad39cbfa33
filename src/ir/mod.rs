mod lower;
mod pass;

pub use lower::lower_program;
pub use pass::run_pass;

use derive_more::Display;
use serde::Serialize;

use crate::common::{Constant, TypeInfo};

pub type SlotId = usize;
pub type BlockId = usize;

/// A typed virtual register. Slots marked `spilled` get a stack home in the
/// backend; the rest are register candidates.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct SlotInfo {
    pub type_info: TypeInfo,
    pub spilled: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Serialize)]
pub enum IrUnaryOp {
    #[display("neg")]
    Neg,
    #[display("not")]
    Not,
    #[display("abs")]
    Abs,
    #[display("sqrt")]
    Sqrt,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Serialize)]
pub enum IrBinaryOp {
    #[display("add")]
    Add,
    #[display("sub")]
    Sub,
    #[display("mul")]
    Mul,
    #[display("div")]
    Div,
    #[display("rem")]
    Rem,
    #[display("and")]
    And,
    #[display("or")]
    Or,
    #[display("xor")]
    Xor,
    #[display("shl")]
    Shl,
    #[display("shr")]
    Shr,
    #[display("min")]
    Min,
    #[display("max")]
    Max,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Serialize)]
pub enum IrCmpOp {
    #[display("eq")]
    Eq,
    #[display("ne")]
    Ne,
    #[display("lt")]
    Lt,
    #[display("le")]
    Le,
    #[display("gt")]
    Gt,
    #[display("ge")]
    Ge,
}

/// Math-library functions reached through the runtime call table.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Serialize)]
pub enum MathFn {
    #[display("pow")]
    Pow,
    #[display("exp")]
    Exp,
    #[display("log")]
    Log,
    #[display("sin")]
    Sin,
    #[display("cos")]
    Cos,
}

#[derive(Clone, Debug, Serialize)]
pub enum IrInst {
    /// dst = constant
    Imm(SlotId, Constant),
    /// dst = src
    Mov(SlotId, SlotId),
    /// dst = args[index]
    FetchArg(SlotId, u32),
    /// dst = *(ptr + offset), typed by dst
    Load(SlotId, SlotId, i32),
    /// *(ptr + offset) = src
    Store(SlotId, i32, SlotId),
    Unary(IrUnaryOp, SlotId, SlotId),
    Binary(IrBinaryOp, SlotId, SlotId, SlotId),
    /// dst = lane mask of a <op> b
    Cmp(IrCmpOp, SlotId, SlotId, SlotId),
    /// dst = mask ? a : b, lane-wise
    Select(SlotId, SlotId, SlotId, SlotId),
    /// dst lane i = src lane ((selector >> 2i) & 3)
    Shuffle(SlotId, SlotId, u32),
    /// dst vector = scalar src in every lane
    Splat(SlotId, SlotId),
    /// dst scalar = lane 0 of src
    First(SlotId, SlotId),
    /// dst = convert(src), conversion chosen by the slot types
    Cast(SlotId, SlotId),
    /// dst = fn(args...) through the runtime table
    Call(SlotId, MathFn, Vec<SlotId>),
}

impl IrInst {
    pub fn dst(&self) -> Option<SlotId> {
        match self {
            IrInst::Imm(d, _)
            | IrInst::Mov(d, _)
            | IrInst::FetchArg(d, _)
            | IrInst::Load(d, _, _)
            | IrInst::Unary(_, d, _)
            | IrInst::Binary(_, d, _, _)
            | IrInst::Cmp(_, d, _, _)
            | IrInst::Select(d, _, _, _)
            | IrInst::Shuffle(d, _, _)
            | IrInst::Splat(d, _)
            | IrInst::First(d, _)
            | IrInst::Cast(d, _)
            | IrInst::Call(d, _, _) => Some(*d),
            IrInst::Store(..) => None,
        }
    }

    pub fn sources(&self) -> Vec<SlotId> {
        match self {
            IrInst::Imm(..) | IrInst::FetchArg(..) => vec![],
            IrInst::Mov(_, s)
            | IrInst::Load(_, s, _)
            | IrInst::Unary(_, _, s)
            | IrInst::Shuffle(_, s, _)
            | IrInst::Splat(_, s)
            | IrInst::First(_, s)
            | IrInst::Cast(_, s) => vec![*s],
            IrInst::Store(p, _, s) => vec![*p, *s],
            IrInst::Binary(_, _, a, b) | IrInst::Cmp(_, _, a, b) => vec![*a, *b],
            IrInst::Select(_, m, a, b) => vec![*m, *a, *b],
            IrInst::Call(_, _, args) => args.clone(),
        }
    }

    pub fn replace_sources(&mut self, replace: &impl Fn(SlotId) -> SlotId) {
        match self {
            IrInst::Imm(..) | IrInst::FetchArg(..) => {}
            IrInst::Mov(_, s)
            | IrInst::Load(_, s, _)
            | IrInst::Unary(_, _, s)
            | IrInst::Shuffle(_, s, _)
            | IrInst::Splat(_, s)
            | IrInst::First(_, s)
            | IrInst::Cast(_, s) => *s = replace(*s),
            IrInst::Store(p, _, s) => {
                *p = replace(*p);
                *s = replace(*s);
            }
            IrInst::Binary(_, _, a, b) | IrInst::Cmp(_, _, a, b) => {
                *a = replace(*a);
                *b = replace(*b);
            }
            IrInst::Select(_, m, a, b) => {
                *m = replace(*m);
                *a = replace(*a);
                *b = replace(*b);
            }
            IrInst::Call(_, _, args) => {
                for arg in args {
                    *arg = replace(*arg);
                }
            }
        }
    }

    /// Instructions that stay even when their result is unread.
    pub fn has_side_effect(&self) -> bool {
        matches!(self, IrInst::Store(..))
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
pub enum IrTerm {
    Jmp(BlockId),
    /// Scalar condition: zero falls through to the second target.
    Branch(SlotId, BlockId, BlockId),
    Ret,
}

#[derive(Clone, Debug, Serialize)]
pub struct IrBlock {
    pub insts: Vec<IrInst>,
    pub term: IrTerm,
}

impl IrTerm {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            IrTerm::Jmp(b) => vec![*b],
            IrTerm::Branch(_, t, e) => vec![*t, *e],
            IrTerm::Ret => vec![],
        }
    }
}

/// The whole program lowered to one linear function. Block 0 is the entry.
#[derive(Clone, Debug, Serialize)]
pub struct IrFunction {
    pub blocks: Vec<IrBlock>,
    pub slots: Vec<SlotInfo>,
    pub num_args: u32,
}

impl IrFunction {
    pub fn slot_type(&self, slot: SlotId) -> TypeInfo {
        self.slots[slot].type_info
    }

    /// True when any block ends in a conditional branch.
    pub fn has_branches(&self) -> bool {
        self.blocks
            .iter()
            .any(|b| matches!(b.term, IrTerm::Branch(..)))
    }
}

impl std::fmt::Display for IrFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (id, block) in self.blocks.iter().enumerate() {
            writeln!(f, "b{}:", id)?;
            for inst in &block.insts {
                writeln!(f, "  {}", self.format_inst(inst))?;
            }
            match block.term {
                IrTerm::Jmp(b) => writeln!(f, "  jmp b{}", b)?,
                IrTerm::Branch(c, t, e) => {
                    writeln!(f, "  branch {}, b{}, b{}", self.slot(c), t, e)?
                }
                IrTerm::Ret => writeln!(f, "  ret")?,
            }
        }
        Ok(())
    }
}

impl IrFunction {
    fn slot(&self, slot: SlotId) -> String {
        let info = &self.slots[slot];
        format!(
            "%{}:{}{}",
            slot,
            info.type_info.strip(),
            if info.spilled { "!" } else { "" }
        )
    }

    fn format_inst(&self, inst: &IrInst) -> String {
        match inst {
            IrInst::Imm(d, c) => format!("{} = imm {}", self.slot(*d), c),
            IrInst::Mov(d, s) => format!("{} = mov {}", self.slot(*d), self.slot(*s)),
            IrInst::FetchArg(d, i) => format!("{} = arg[{}]", self.slot(*d), i),
            IrInst::Load(d, p, off) => {
                format!("{} = load [{} + {}]", self.slot(*d), self.slot(*p), off)
            }
            IrInst::Store(p, off, s) => {
                format!("store [{} + {}], {}", self.slot(*p), off, self.slot(*s))
            }
            IrInst::Unary(op, d, s) => {
                format!("{} = {} {}", self.slot(*d), op, self.slot(*s))
            }
            IrInst::Binary(op, d, a, b) => format!(
                "{} = {} {}, {}",
                self.slot(*d),
                op,
                self.slot(*a),
                self.slot(*b)
            ),
            IrInst::Cmp(op, d, a, b) => format!(
                "{} = cmp.{} {}, {}",
                self.slot(*d),
                op,
                self.slot(*a),
                self.slot(*b)
            ),
            IrInst::Select(d, m, a, b) => format!(
                "{} = select {}, {}, {}",
                self.slot(*d),
                self.slot(*m),
                self.slot(*a),
                self.slot(*b)
            ),
            IrInst::Shuffle(d, s, sel) => format!(
                "{} = shuffle {}, {:#x}",
                self.slot(*d),
                self.slot(*s),
                sel
            ),
            IrInst::Splat(d, s) => format!("{} = splat {}", self.slot(*d), self.slot(*s)),
            IrInst::First(d, s) => format!("{} = first {}", self.slot(*d), self.slot(*s)),
            IrInst::Cast(d, s) => format!("{} = cast {}", self.slot(*d), self.slot(*s)),
            IrInst::Call(d, func, args) => format!(
                "{} = call {}({})",
                self.slot(*d),
                func,
                args.iter()
                    .map(|a| self.slot(*a))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}
