//! x86-64 machine-code emission.
//!
//! Accepts the legalized instruction stream plus labels and produces
//! position-independent bytes (all branches are rel32, runtime calls go
//! through absolute addresses in a register). This is the assembler side of
//! the backend/runtime boundary.

use super::asm_ast::*;
use crate::errors::Error;

struct Encoder {
    buf: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<(usize, Label)>,
}

#[derive(Clone, Copy)]
enum Rm<'a> {
    Reg(u8),
    Mem(&'a Operand),
}

fn gp_enc(gp: Gp) -> u8 {
    gp.encoding()
}

impl Encoder {
    fn new(label_count: usize) -> Self {
        Self {
            buf: vec![],
            labels: vec![None; label_count],
            fixups: vec![],
        }
    }

    fn byte(&mut self, b: u8) {
        self.buf.push(b);
    }

    fn bytes(&mut self, bs: &[u8]) {
        self.buf.extend_from_slice(bs);
    }

    fn imm32(&mut self, v: i32) {
        self.bytes(&v.to_le_bytes());
    }

    fn imm64(&mut self, v: i64) {
        self.bytes(&v.to_le_bytes());
    }

    fn rm_of(operand: &Operand) -> Result<Rm, Error> {
        match operand {
            Operand::Gp(g) => Ok(Rm::Reg(gp_enc(*g))),
            Operand::Xmm(x) => Ok(Rm::Reg(x.encoding())),
            Operand::Stack(_) | Operand::Mem(..) => Ok(Rm::Mem(operand)),
            _ => Err(Error::JITFailed),
        }
    }

    fn rm_base_bits(operand: &Operand) -> (u8, i32) {
        match operand {
            Operand::Stack(disp) => (gp_enc(Gp::Rbp), *disp),
            Operand::Mem(base, disp) => (gp_enc(*base), *disp),
            _ => unreachable!(),
        }
    }

    /// prefix + REX + opcode + modrm + disp. `reg` is the modrm reg field.
    fn op_rm(
        &mut self,
        prefix: Option<u8>,
        rex_w: bool,
        opcode: &[u8],
        reg: u8,
        rm: Rm,
    ) -> Result<(), Error> {
        if let Some(p) = prefix {
            self.byte(p);
        }

        let (rm_low, rex_b, mode): (u8, bool, u8) = match rm {
            Rm::Reg(enc) => (enc & 7, enc >= 8, 0b11),
            Rm::Mem(operand) => {
                let (base, disp) = Self::rm_base_bits(operand);
                let mode = if disp == 0 && base & 7 != 5 {
                    0b00
                } else if i8::try_from(disp).is_ok() {
                    0b01
                } else {
                    0b10
                };
                (base & 7, base >= 8, mode)
            }
        };

        let rex_r = reg >= 8;
        if rex_w || rex_r || rex_b {
            self.byte(0x40 | (rex_w as u8) << 3 | (rex_r as u8) << 2 | (rex_b as u8));
        }
        self.bytes(opcode);
        self.byte(mode << 6 | (reg & 7) << 3 | rm_low);

        if let Rm::Mem(operand) = rm {
            let (_, disp) = Self::rm_base_bits(operand);
            match mode {
                0b01 => self.byte(disp as i8 as u8),
                0b10 => self.imm32(disp),
                _ => {}
            }
        }
        Ok(())
    }

    // REX handling for setcc/push/pop style +r or /n byte ops.
    fn rex_b_only(&mut self, enc: u8, force: bool) {
        if enc >= 8 {
            self.byte(0x41);
        } else if force {
            self.byte(0x40);
        }
    }

    fn mov(&mut self, t: AsmType, src: &Operand, dst: &Operand) -> Result<(), Error> {
        let w = t == AsmType::Qword;
        match (src, dst) {
            (Operand::Imm(n), Operand::Gp(g)) if w && (i32::try_from(*n).is_err()) => {
                // movabs
                let enc = gp_enc(*g);
                self.rex_b_only(enc, true);
                // REX.W already needed:
                let last = self.buf.len() - 1;
                self.buf[last] |= 0x48;
                self.byte(0xB8 + (enc & 7));
                self.imm64(*n);
                Ok(())
            }
            (Operand::Imm(n), dst) => {
                let rm = Self::rm_of(dst)?;
                self.op_rm(None, w, &[0xC7], 0, rm)?;
                self.imm32(*n as i32);
                Ok(())
            }
            (Operand::Gp(g), dst) => {
                let rm = Self::rm_of(dst)?;
                self.op_rm(None, w, &[0x89], gp_enc(*g), rm)
            }
            (src, Operand::Gp(g)) => {
                let rm = Self::rm_of(src)?;
                self.op_rm(None, w, &[0x8B], gp_enc(*g), rm)
            }
            _ => Err(Error::JITFailed),
        }
    }

    fn binary(&mut self, t: AsmType, op: BinOp, src: &Operand, dst: &Operand) -> Result<(), Error> {
        let w = t == AsmType::Qword;
        match op {
            BinOp::Shl | BinOp::Sar | BinOp::Shr => {
                let ext = match op {
                    BinOp::Shl => 4,
                    BinOp::Shr => 5,
                    _ => 7,
                };
                match src {
                    Operand::Imm(n) => {
                        let rm = Self::rm_of(dst)?;
                        self.op_rm(None, w, &[0xC1], ext, rm)?;
                        self.byte(*n as u8);
                        Ok(())
                    }
                    Operand::Gp(Gp::Rcx) => {
                        let rm = Self::rm_of(dst)?;
                        self.op_rm(None, w, &[0xD3], ext, rm)
                    }
                    _ => Err(Error::JITFailed),
                }
            }
            BinOp::Mult => {
                let Operand::Gp(g) = dst else {
                    return Err(Error::JITFailed);
                };
                let rm = Self::rm_of(src)?;
                self.op_rm(None, w, &[0x0F, 0xAF], gp_enc(*g), rm)
            }
            _ => {
                let (store, load, ext): (u8, u8, u8) = match op {
                    BinOp::Add => (0x01, 0x03, 0),
                    BinOp::Sub => (0x29, 0x2B, 5),
                    BinOp::And => (0x21, 0x23, 4),
                    BinOp::Or => (0x09, 0x0B, 1),
                    BinOp::Xor => (0x31, 0x33, 6),
                    _ => unreachable!(),
                };
                match (src, dst) {
                    (Operand::Imm(n), dst) => {
                        let rm = Self::rm_of(dst)?;
                        self.op_rm(None, w, &[0x81], ext, rm)?;
                        self.imm32(*n as i32);
                        Ok(())
                    }
                    (Operand::Gp(g), dst) => {
                        let rm = Self::rm_of(dst)?;
                        self.op_rm(None, w, &[store], gp_enc(*g), rm)
                    }
                    (src, Operand::Gp(g)) => {
                        let rm = Self::rm_of(src)?;
                        self.op_rm(None, w, &[load], gp_enc(*g), rm)
                    }
                    _ => Err(Error::JITFailed),
                }
            }
        }
    }

    fn cmp(&mut self, t: AsmType, src: &Operand, dst: &Operand) -> Result<(), Error> {
        let w = t == AsmType::Qword;
        match (src, dst) {
            (Operand::Imm(n), dst) => {
                let rm = Self::rm_of(dst)?;
                self.op_rm(None, w, &[0x81], 7, rm)?;
                self.imm32(*n as i32);
                Ok(())
            }
            (Operand::Gp(g), dst) => {
                let rm = Self::rm_of(dst)?;
                self.op_rm(None, w, &[0x39], gp_enc(*g), rm)
            }
            (src, Operand::Gp(g)) => {
                let rm = Self::rm_of(src)?;
                self.op_rm(None, w, &[0x3B], gp_enc(*g), rm)
            }
            _ => Err(Error::JITFailed),
        }
    }

    fn xmm_mov(&mut self, kind: XMove, src: &Operand, dst: &Operand) -> Result<(), Error> {
        match kind {
            XMove::Ss | XMove::Sd => {
                let prefix = if kind == XMove::Ss { 0xF3 } else { 0xF2 };
                match (src, dst) {
                    (src, Operand::Xmm(x)) => {
                        let rm = Self::rm_of(src)?;
                        self.op_rm(Some(prefix), false, &[0x0F, 0x10], x.encoding(), rm)
                    }
                    (Operand::Xmm(x), dst) => {
                        let rm = Self::rm_of(dst)?;
                        self.op_rm(Some(prefix), false, &[0x0F, 0x11], x.encoding(), rm)
                    }
                    _ => Err(Error::JITFailed),
                }
            }
            XMove::Dq => match (src, dst) {
                (Operand::Xmm(a), Operand::Xmm(b)) => {
                    // movaps dst, src
                    self.op_rm(None, false, &[0x0F, 0x28], b.encoding(), Rm::Reg(a.encoding()))
                }
                (src, Operand::Xmm(x)) => {
                    let rm = Self::rm_of(src)?;
                    self.op_rm(None, false, &[0x0F, 0x10], x.encoding(), rm)
                }
                (Operand::Xmm(x), dst) => {
                    let rm = Self::rm_of(dst)?;
                    self.op_rm(None, false, &[0x0F, 0x11], x.encoding(), rm)
                }
                _ => Err(Error::JITFailed),
            },
            XMove::D | XMove::Q64 => {
                let w = kind == XMove::Q64;
                match (src, dst) {
                    (src, Operand::Xmm(x)) => {
                        let rm = Self::rm_of(src)?;
                        self.op_rm(Some(0x66), w, &[0x0F, 0x6E], x.encoding(), rm)
                    }
                    (Operand::Xmm(x), dst) => {
                        let rm = Self::rm_of(dst)?;
                        self.op_rm(Some(0x66), w, &[0x0F, 0x7E], x.encoding(), rm)
                    }
                    _ => Err(Error::JITFailed),
                }
            }
        }
    }

    fn xmm_binary(&mut self, op: XOp, src: &Operand, dst: &Operand) -> Result<(), Error> {
        let Operand::Xmm(d) = dst else {
            return Err(Error::JITFailed);
        };
        let (prefix, opcode): (Option<u8>, &[u8]) = match op {
            XOp::Addss => (Some(0xF3), &[0x0F, 0x58]),
            XOp::Addsd => (Some(0xF2), &[0x0F, 0x58]),
            XOp::Addps => (None, &[0x0F, 0x58]),
            XOp::Addpd => (Some(0x66), &[0x0F, 0x58]),
            XOp::Subss => (Some(0xF3), &[0x0F, 0x5C]),
            XOp::Subsd => (Some(0xF2), &[0x0F, 0x5C]),
            XOp::Subps => (None, &[0x0F, 0x5C]),
            XOp::Subpd => (Some(0x66), &[0x0F, 0x5C]),
            XOp::Mulss => (Some(0xF3), &[0x0F, 0x59]),
            XOp::Mulsd => (Some(0xF2), &[0x0F, 0x59]),
            XOp::Mulps => (None, &[0x0F, 0x59]),
            XOp::Mulpd => (Some(0x66), &[0x0F, 0x59]),
            XOp::Divss => (Some(0xF3), &[0x0F, 0x5E]),
            XOp::Divsd => (Some(0xF2), &[0x0F, 0x5E]),
            XOp::Divps => (None, &[0x0F, 0x5E]),
            XOp::Divpd => (Some(0x66), &[0x0F, 0x5E]),
            XOp::Minss => (Some(0xF3), &[0x0F, 0x5D]),
            XOp::Minsd => (Some(0xF2), &[0x0F, 0x5D]),
            XOp::Minps => (None, &[0x0F, 0x5D]),
            XOp::Minpd => (Some(0x66), &[0x0F, 0x5D]),
            XOp::Maxss => (Some(0xF3), &[0x0F, 0x5F]),
            XOp::Maxsd => (Some(0xF2), &[0x0F, 0x5F]),
            XOp::Maxps => (None, &[0x0F, 0x5F]),
            XOp::Maxpd => (Some(0x66), &[0x0F, 0x5F]),
            XOp::Sqrtss => (Some(0xF3), &[0x0F, 0x51]),
            XOp::Sqrtsd => (Some(0xF2), &[0x0F, 0x51]),
            XOp::Sqrtps => (None, &[0x0F, 0x51]),
            XOp::Sqrtpd => (Some(0x66), &[0x0F, 0x51]),
            XOp::Andps => (None, &[0x0F, 0x54]),
            XOp::Andnps => (None, &[0x0F, 0x55]),
            XOp::Orps => (None, &[0x0F, 0x56]),
            XOp::Xorps => (None, &[0x0F, 0x57]),
            XOp::Pand => (Some(0x66), &[0x0F, 0xDB]),
            XOp::Pandn => (Some(0x66), &[0x0F, 0xDF]),
            XOp::Por => (Some(0x66), &[0x0F, 0xEB]),
            XOp::Pxor => (Some(0x66), &[0x0F, 0xEF]),
            XOp::Paddd => (Some(0x66), &[0x0F, 0xFE]),
            XOp::Psubd => (Some(0x66), &[0x0F, 0xFA]),
            XOp::Pmulld => (Some(0x66), &[0x0F, 0x38, 0x40]),
            XOp::Pmuludq => (Some(0x66), &[0x0F, 0xF4]),
            XOp::Pcmpeqd => (Some(0x66), &[0x0F, 0x76]),
            XOp::Pcmpgtd => (Some(0x66), &[0x0F, 0x66]),
            XOp::Pminsd => (Some(0x66), &[0x0F, 0x38, 0x39]),
            XOp::Pmaxsd => (Some(0x66), &[0x0F, 0x38, 0x3D]),
            XOp::Pslld => (Some(0x66), &[0x0F, 0xF2]),
            XOp::Psrld => (Some(0x66), &[0x0F, 0xD2]),
            XOp::Psrad => (Some(0x66), &[0x0F, 0xE2]),
            XOp::Punpckldq => (Some(0x66), &[0x0F, 0x62]),
            XOp::Punpcklqdq => (Some(0x66), &[0x0F, 0x6C]),
            XOp::Movlhps => (None, &[0x0F, 0x16]),
            XOp::Movhlps => (None, &[0x0F, 0x12]),
            XOp::Blendvps => (Some(0x66), &[0x0F, 0x38, 0x14]),
            XOp::Blendvpd => (Some(0x66), &[0x0F, 0x38, 0x15]),
            XOp::Ucomiss => (None, &[0x0F, 0x2E]),
            XOp::Ucomisd => (Some(0x66), &[0x0F, 0x2E]),
        };
        let rm = Self::rm_of(src)?;
        self.op_rm(prefix, false, opcode, d.encoding(), rm)
    }

    fn xmm_imm(&mut self, op: XImmOp, imm: u8, src: &Operand, dst: &Operand) -> Result<(), Error> {
        let Operand::Xmm(d) = dst else {
            return Err(Error::JITFailed);
        };
        match op {
            XImmOp::Pshufd => {
                let rm = Self::rm_of(src)?;
                self.op_rm(Some(0x66), false, &[0x0F, 0x70], d.encoding(), rm)?;
                self.byte(imm);
                Ok(())
            }
            XImmOp::Cmpps | XImmOp::Cmppd => {
                let prefix = if op == XImmOp::Cmppd { Some(0x66) } else { None };
                let rm = Self::rm_of(src)?;
                self.op_rm(prefix, false, &[0x0F, 0xC2], d.encoding(), rm)?;
                self.byte(imm);
                Ok(())
            }
            XImmOp::PslldImm | XImmOp::PsrldImm | XImmOp::PsradImm => {
                let ext = match op {
                    XImmOp::PslldImm => 6,
                    XImmOp::PsrldImm => 2,
                    _ => 4,
                };
                self.op_rm(Some(0x66), false, &[0x0F, 0x72], ext, Rm::Reg(d.encoding()))?;
                self.byte(imm);
                Ok(())
            }
        }
    }

    fn xmm_cvt(&mut self, kind: CvtKind, src: &Operand, dst: &Operand) -> Result<(), Error> {
        let (prefix, opcode): (Option<u8>, [u8; 2]) = match kind {
            CvtKind::Si2ss => (Some(0xF3), [0x0F, 0x2A]),
            CvtKind::Si2sd => (Some(0xF2), [0x0F, 0x2A]),
            CvtKind::Ss2si => (Some(0xF3), [0x0F, 0x2C]),
            CvtKind::Sd2si => (Some(0xF2), [0x0F, 0x2C]),
            CvtKind::Ss2sd => (Some(0xF3), [0x0F, 0x5A]),
            CvtKind::Sd2ss => (Some(0xF2), [0x0F, 0x5A]),
            CvtKind::Dq2ps => (None, [0x0F, 0x5B]),
            CvtKind::Ps2dq => (Some(0xF3), [0x0F, 0x5B]),
            CvtKind::Dq2pd => (Some(0xF3), [0x0F, 0xE6]),
            CvtKind::Pd2dq => (Some(0x66), [0x0F, 0xE6]),
            CvtKind::Ps2pd => (None, [0x0F, 0x5A]),
            CvtKind::Pd2ps => (Some(0x66), [0x0F, 0x5A]),
        };
        let reg = match dst {
            Operand::Xmm(x) => x.encoding(),
            Operand::Gp(g) => gp_enc(*g),
            _ => return Err(Error::JITFailed),
        };
        let rm = Self::rm_of(src)?;
        self.op_rm(prefix, false, &opcode, reg, rm)
    }

    fn inst(&mut self, inst: &Inst) -> Result<(), Error> {
        match inst {
            Inst::Mov(t, src, dst) => self.mov(*t, src, dst),
            Inst::Unary(t, op, operand) => {
                let ext = if *op == UnaryOp::Neg { 3 } else { 2 };
                let rm = Self::rm_of(operand)?;
                self.op_rm(None, *t == AsmType::Qword, &[0xF7], ext, rm)
            }
            Inst::Binary(t, op, src, dst) => self.binary(*t, *op, src, dst),
            Inst::Cmp(t, src, dst) => self.cmp(*t, src, dst),
            Inst::Cmov(t, cond, src, dst) => {
                let Operand::Gp(g) = dst else {
                    return Err(Error::JITFailed);
                };
                let rm = Self::rm_of(src)?;
                self.op_rm(
                    None,
                    *t == AsmType::Qword,
                    &[0x0F, 0x40 + cond.encoding()],
                    gp_enc(*g),
                    rm,
                )
            }
            Inst::SetCC(cond, gp) => {
                let rm = Rm::Reg(gp_enc(*gp));
                self.op_rm(None, false, &[0x0F, 0x90 + cond.encoding()], 0, rm)
            }
            Inst::Cdq => {
                self.byte(0x99);
                Ok(())
            }
            Inst::Idiv(operand) => {
                let rm = Self::rm_of(operand)?;
                self.op_rm(None, false, &[0xF7], 7, rm)
            }
            Inst::Jmp(label) => {
                self.byte(0xE9);
                self.fixups.push((self.buf.len(), *label));
                self.imm32(0);
                Ok(())
            }
            Inst::JmpCC(cond, label) => {
                self.bytes(&[0x0F, 0x80 + cond.encoding()]);
                self.fixups.push((self.buf.len(), *label));
                self.imm32(0);
                Ok(())
            }
            Inst::Label(label) => {
                self.labels[*label] = Some(self.buf.len());
                Ok(())
            }
            Inst::Call(operand) => {
                let rm = Self::rm_of(operand)?;
                self.op_rm(None, false, &[0xFF], 2, rm)
            }
            Inst::Push(gp) => {
                self.rex_b_only(gp_enc(*gp), false);
                self.byte(0x50 + (gp_enc(*gp) & 7));
                Ok(())
            }
            Inst::Pop(gp) => {
                self.rex_b_only(gp_enc(*gp), false);
                self.byte(0x58 + (gp_enc(*gp) & 7));
                Ok(())
            }
            Inst::Ret => {
                self.byte(0xC3);
                Ok(())
            }
            Inst::XmmMov(kind, src, dst) => self.xmm_mov(*kind, src, dst),
            Inst::XmmBinary(op, src, dst) => self.xmm_binary(*op, src, dst),
            Inst::XmmImm(op, imm, src, dst) => self.xmm_imm(*op, *imm, src, dst),
            Inst::XmmCvt(kind, src, dst) => self.xmm_cvt(*kind, src, dst),
        }
    }

    fn finish(mut self) -> Result<Vec<u8>, Error> {
        for (at, label) in std::mem::take(&mut self.fixups) {
            let Some(target) = self.labels[label] else {
                return Err(Error::JITFailed);
            };
            let rel = target as i64 - (at as i64 + 4);
            let rel = i32::try_from(rel).map_err(|_| Error::JITFailed)?;
            self.buf[at..at + 4].copy_from_slice(&rel.to_le_bytes());
        }
        Ok(self.buf)
    }
}

/// Encodes a legalized function into raw machine code.
pub fn encode_function(asm: &AsmFunction) -> Result<Vec<u8>, Error> {
    let mut encoder = Encoder::new(asm.label_count);
    for inst in &asm.instructions {
        encoder.inst(inst)?;
    }
    encoder.finish()
}

#[cfg(test)]
mod test {
    use super::*;

    fn enc(instructions: Vec<Inst>) -> Vec<u8> {
        encode_function(&AsmFunction {
            instructions,
            label_count: 0,
            scratch: 0,
        })
        .unwrap()
    }

    #[test]
    fn test_gp_moves() {
        // mov eax, 7
        assert_eq!(
            enc(vec![mov(AsmType::Dword, Operand::Imm(7), Gp::Rax)]),
            vec![0xC7, 0xC0, 7, 0, 0, 0]
        );
        // mov [rbp-16], esi
        assert_eq!(
            enc(vec![mov(AsmType::Dword, Gp::Rsi, Operand::Stack(-16))]),
            vec![0x89, 0x75, 0xF0]
        );
        // mov r10, [rbx+8]
        assert_eq!(
            enc(vec![mov(AsmType::Qword, Operand::Mem(Gp::Rbx, 8), Gp::R10)]),
            vec![0x4C, 0x8B, 0x53, 0x08]
        );
    }

    #[test]
    fn test_movabs() {
        let bytes = enc(vec![mov(
            AsmType::Qword,
            Operand::Imm(0x1122334455667788),
            Gp::R10,
        )]);
        assert_eq!(bytes[0], 0x49);
        assert_eq!(bytes[1], 0xBA);
        assert_eq!(&bytes[2..], &0x1122334455667788u64.to_le_bytes());
    }

    #[test]
    fn test_sse_arithmetic() {
        // addss xmm15, [rbp-32]
        assert_eq!(
            enc(vec![xop(XOp::Addss, Operand::Stack(-32), XMM15)]),
            vec![0xF3, 0x44, 0x0F, 0x58, 0x7D, 0xE0]
        );
        // movups xmm14, [r11+4]
        assert_eq!(
            enc(vec![xmov(XMove::Dq, Operand::Mem(Gp::R11, 4), XMM14)]),
            vec![0x45, 0x0F, 0x10, 0x73, 0x04]
        );
        // paddd xmm14, xmm15
        assert_eq!(
            enc(vec![xop(XOp::Paddd, XMM15, XMM14)]),
            vec![0x66, 0x45, 0x0F, 0xFE, 0xF7]
        );
    }

    #[test]
    fn test_branches_patch() {
        let bytes = enc_with_labels();
        // jmp over one ret to the label: e9 01 00 00 00 c3 c3
        assert_eq!(bytes, vec![0xE9, 0x01, 0x00, 0x00, 0x00, 0xC3, 0xC3]);
    }

    fn enc_with_labels() -> Vec<u8> {
        encode_function(&AsmFunction {
            instructions: vec![Inst::Jmp(0), Inst::Ret, Inst::Label(0), Inst::Ret],
            label_count: 1,
            scratch: 0,
        })
        .unwrap()
    }

    #[test]
    fn test_setcc_uses_rex() {
        // sete r10b
        assert_eq!(
            enc(vec![Inst::SetCC(Cond::E, Gp::R10)]),
            vec![0x41, 0x0F, 0x94, 0xC2]
        );
    }
}
