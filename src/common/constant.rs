use serde::Serialize;

use super::type_info::{TypeInfo, TypeKind};

/// A typed literal: scalar or vector, with one 64-bit payload per lane.
///
/// Lane payloads are stored untyped; `TypeInfo` decides the interpretation
/// (`bool`/`qbool` lanes hold 0 or 1, `int` lanes the zero-extended i32 bit
/// pattern, `float`/`double` lanes the IEEE bit pattern).
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Constant {
    type_info: TypeInfo,
    bits: [u64; 8],
}

impl Constant {
    pub fn bool_(value: bool) -> Self {
        Self::mask(TypeKind::Bool, value)
    }

    pub fn mask(kind: TypeKind, value: bool) -> Self {
        debug_assert!(kind.is_mask());
        Self::from_lane_bits(TypeInfo::scalar(kind), value as u64)
    }

    pub fn int(value: i32) -> Self {
        Self::from_lane_bits(TypeInfo::int(), value as u32 as u64)
    }

    pub fn float(value: f32) -> Self {
        Self::from_lane_bits(TypeInfo::float(), value.to_bits() as u64)
    }

    pub fn double(value: f64) -> Self {
        Self::from_lane_bits(TypeInfo::double(), value.to_bits())
    }

    fn from_lane_bits(type_info: TypeInfo, lane: u64) -> Self {
        Self {
            type_info,
            bits: [lane, 0, 0, 0, 0, 0, 0, 0],
        }
    }

    /// Builds a vector constant out of per-lane scalar constants of the
    /// target's kind.
    pub fn from_lanes(type_info: TypeInfo, lanes: &[Constant]) -> Self {
        debug_assert_eq!(type_info.width() as usize, lanes.len());
        let mut bits = [0u64; 8];
        for (slot, lane) in bits.iter_mut().zip(lanes) {
            debug_assert_eq!(lane.kind(), type_info.kind());
            *slot = lane.bits[0];
        }
        Self { type_info, bits }
    }

    pub fn type_info(&self) -> TypeInfo {
        self.type_info
    }

    pub fn kind(&self) -> TypeKind {
        self.type_info.kind()
    }

    pub fn width(&self) -> u32 {
        self.type_info.width()
    }

    pub fn lane_bits(&self, lane: usize) -> u64 {
        self.bits[lane]
    }

    pub fn get_bool(&self, lane: usize) -> bool {
        self.bits[lane] != 0
    }

    pub fn get_int(&self, lane: usize) -> i32 {
        self.bits[lane] as u32 as i32
    }

    pub fn get_float(&self, lane: usize) -> f32 {
        f32::from_bits(self.bits[lane] as u32)
    }

    pub fn get_double(&self, lane: usize) -> f64 {
        f64::from_bits(self.bits[lane])
    }

    /// Scalar lane extraction, keeping the kind.
    pub fn lane(&self, lane: usize) -> Constant {
        Self::from_lane_bits(TypeInfo::scalar(self.kind()), self.bits[lane])
    }

    pub fn lanes(&self) -> impl Iterator<Item = Constant> + '_ {
        (0..self.width() as usize).map(|i| self.lane(i))
    }

    /// True when every lane is numerically zero (or false).
    pub fn is_zero(&self) -> bool {
        self.lanes().all(|l| match l.kind() {
            TypeKind::Float => l.get_float(0) == 0.0,
            TypeKind::Double => l.get_double(0) == 0.0,
            _ => l.bits[0] == 0,
        })
    }

    /// True when every lane is numerically one (or true).
    pub fn is_one(&self) -> bool {
        self.lanes().all(|l| match l.kind() {
            TypeKind::Float => l.get_float(0) == 1.0,
            TypeKind::Double => l.get_double(0) == 1.0,
            _ => l.bits[0] == 1,
        })
    }

    /// Scalar boolean truth value, used for folded conditions.
    pub fn truth(&self) -> bool {
        !self.is_zero()
    }

    /// Converts along the numeric lattice, splatting a scalar across a
    /// vector target. The caller guarantees the conversion is legal.
    pub fn convert_to(&self, target: TypeInfo) -> Constant {
        let target = target.strip();
        let mut bits = [0u64; 8];
        let splat = self.width() == 1 && target.width() > 1;
        debug_assert!(splat || self.width() == target.width());

        for (i, slot) in bits.iter_mut().enumerate().take(target.width() as usize) {
            let src = if splat { self.lane(0) } else { self.lane(i) };
            *slot = convert_lane(&src, target.kind());
        }

        Constant {
            type_info: target,
            bits,
        }
    }

    fn zip(&self, other: &Constant, f: impl Fn(u64, u64) -> u64) -> Constant {
        debug_assert_eq!(self.type_info.strip(), other.type_info.strip());
        let mut bits = [0u64; 8];
        for (i, slot) in bits.iter_mut().enumerate().take(self.width() as usize) {
            *slot = f(self.bits[i], other.bits[i]);
        }
        Constant {
            type_info: self.type_info.strip(),
            bits,
        }
    }

    fn map(&self, f: impl Fn(u64) -> u64) -> Constant {
        let mut bits = [0u64; 8];
        for (i, slot) in bits.iter_mut().enumerate().take(self.width() as usize) {
            *slot = f(self.bits[i]);
        }
        Constant {
            type_info: self.type_info.strip(),
            bits,
        }
    }

    fn compare(&self, other: &Constant, f: impl Fn(&u64, &u64) -> bool) -> Constant {
        let mask = self.type_info.mask_type();
        let mut bits = [0u64; 8];
        for (i, slot) in bits.iter_mut().enumerate().take(self.width() as usize) {
            *slot = f(&self.bits[i], &other.bits[i]) as u64;
        }
        Constant {
            type_info: mask,
            bits,
        }
    }

    pub fn add(&self, other: &Constant) -> Constant {
        match self.kind() {
            TypeKind::Int => self.zip(other, |a, b| int_op(a, b, i32::wrapping_add)),
            TypeKind::Float => self.zip(other, |a, b| f32_op(a, b, |x, y| x + y)),
            TypeKind::Double => self.zip(other, |a, b| f64_op(a, b, |x, y| x + y)),
            _ => unreachable!("non-arithmetic add"),
        }
    }

    pub fn sub(&self, other: &Constant) -> Constant {
        match self.kind() {
            TypeKind::Int => self.zip(other, |a, b| int_op(a, b, i32::wrapping_sub)),
            TypeKind::Float => self.zip(other, |a, b| f32_op(a, b, |x, y| x - y)),
            TypeKind::Double => self.zip(other, |a, b| f64_op(a, b, |x, y| x - y)),
            _ => unreachable!("non-arithmetic sub"),
        }
    }

    pub fn mul(&self, other: &Constant) -> Constant {
        match self.kind() {
            TypeKind::Int => self.zip(other, |a, b| int_op(a, b, i32::wrapping_mul)),
            TypeKind::Float => self.zip(other, |a, b| f32_op(a, b, |x, y| x * y)),
            TypeKind::Double => self.zip(other, |a, b| f64_op(a, b, |x, y| x * y)),
            _ => unreachable!("non-arithmetic mul"),
        }
    }

    /// `None` signals an integer division by zero (a compile-time error at
    /// the folding site).
    pub fn div(&self, other: &Constant) -> Option<Constant> {
        match self.kind() {
            TypeKind::Int => {
                if other.lanes().any(|l| l.get_int(0) == 0) {
                    return None;
                }
                Some(self.zip(other, |a, b| int_op(a, b, i32::wrapping_div)))
            }
            TypeKind::Float => Some(self.zip(other, |a, b| f32_op(a, b, |x, y| x / y))),
            TypeKind::Double => Some(self.zip(other, |a, b| f64_op(a, b, |x, y| x / y))),
            _ => unreachable!("non-arithmetic div"),
        }
    }

    pub fn rem(&self, other: &Constant) -> Option<Constant> {
        match self.kind() {
            TypeKind::Int => {
                if other.lanes().any(|l| l.get_int(0) == 0) {
                    return None;
                }
                Some(self.zip(other, |a, b| int_op(a, b, i32::wrapping_rem)))
            }
            TypeKind::Float => Some(self.zip(other, |a, b| f32_op(a, b, |x, y| x % y))),
            TypeKind::Double => Some(self.zip(other, |a, b| f64_op(a, b, |x, y| x % y))),
            _ => unreachable!("non-arithmetic rem"),
        }
    }

    pub fn bit_and(&self, other: &Constant) -> Constant {
        self.zip(other, |a, b| a & b)
    }

    pub fn bit_or(&self, other: &Constant) -> Constant {
        self.zip(other, |a, b| a | b)
    }

    pub fn bit_xor(&self, other: &Constant) -> Constant {
        // Mask lanes hold 0/1, so plain xor stays canonical for them too.
        self.zip(other, |a, b| a ^ b)
    }

    pub fn shl(&self, other: &Constant) -> Constant {
        // One scalar count applies to every lane.
        let count = other.convert_to(self.type_info);
        self.zip(&count, |a, b| {
            int_op(a, b, |x, y| x.wrapping_shl(y as u32 & 31))
        })
    }

    pub fn shr(&self, other: &Constant) -> Constant {
        let count = other.convert_to(self.type_info);
        self.zip(&count, |a, b| {
            int_op(a, b, |x, y| x.wrapping_shr(y as u32 & 31))
        })
    }

    pub fn neg(&self) -> Constant {
        match self.kind() {
            TypeKind::Int => self.map(|a| (a as u32 as i32).wrapping_neg() as u32 as u64),
            TypeKind::Float => self.map(|a| (-f32::from_bits(a as u32)).to_bits() as u64),
            TypeKind::Double => self.map(|a| (-f64::from_bits(a)).to_bits()),
            _ => unreachable!("non-arithmetic neg"),
        }
    }

    pub fn complement(&self) -> Constant {
        self.map(|a| !(a as u32 as i32) as u32 as u64)
    }

    pub fn logical_not(&self) -> Constant {
        let mut bits = [0u64; 8];
        for (i, slot) in bits.iter_mut().enumerate().take(self.width() as usize) {
            *slot = (!self.lane(i).truth_lane()) as u64;
        }
        Constant {
            type_info: self.type_info.mask_type(),
            bits,
        }
    }

    fn truth_lane(&self) -> bool {
        match self.kind() {
            TypeKind::Float => self.get_float(0) != 0.0,
            TypeKind::Double => self.get_double(0) != 0.0,
            _ => self.bits[0] != 0,
        }
    }

    pub fn eq(&self, other: &Constant) -> Constant {
        match self.kind() {
            TypeKind::Float => self.fcompare(other, |x, y| x == y),
            TypeKind::Double => self.dcompare(other, |x, y| x == y),
            _ => self.compare(other, |a, b| a == b),
        }
    }

    pub fn ne(&self, other: &Constant) -> Constant {
        match self.kind() {
            TypeKind::Float => self.fcompare(other, |x, y| x != y),
            TypeKind::Double => self.dcompare(other, |x, y| x != y),
            _ => self.compare(other, |a, b| a != b),
        }
    }

    pub fn lt(&self, other: &Constant) -> Constant {
        self.ordered(other, |o| o == std::cmp::Ordering::Less)
    }

    pub fn le(&self, other: &Constant) -> Constant {
        self.ordered(other, |o| o != std::cmp::Ordering::Greater)
    }

    pub fn gt(&self, other: &Constant) -> Constant {
        self.ordered(other, |o| o == std::cmp::Ordering::Greater)
    }

    pub fn ge(&self, other: &Constant) -> Constant {
        self.ordered(other, |o| o != std::cmp::Ordering::Less)
    }

    fn ordered(&self, other: &Constant, pick: impl Fn(std::cmp::Ordering) -> bool) -> Constant {
        match self.kind() {
            TypeKind::Int => self.compare(other, |a, b| {
                pick((*a as u32 as i32).cmp(&(*b as u32 as i32)))
            }),
            TypeKind::Float => self.fcompare(other, |x, y| {
                x.partial_cmp(&y).map(&pick).unwrap_or(false)
            }),
            TypeKind::Double => self.dcompare(other, |x, y| {
                x.partial_cmp(&y).map(&pick).unwrap_or(false)
            }),
            _ => unreachable!("unordered kind"),
        }
    }

    fn fcompare(&self, other: &Constant, f: impl Fn(f32, f32) -> bool) -> Constant {
        self.compare(other, |a, b| {
            f(f32::from_bits(*a as u32), f32::from_bits(*b as u32))
        })
    }

    fn dcompare(&self, other: &Constant, f: impl Fn(f64, f64) -> bool) -> Constant {
        self.compare(other, |a, b| f(f64::from_bits(*a), f64::from_bits(*b)))
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        self.type_info.strip() == other.type_info.strip()
            && self.bits[..self.width() as usize] == other.bits[..other.width() as usize]
    }
}

fn int_op(a: u64, b: u64, f: impl Fn(i32, i32) -> i32) -> u64 {
    f(a as u32 as i32, b as u32 as i32) as u32 as u64
}

fn f32_op(a: u64, b: u64, f: impl Fn(f32, f32) -> f32) -> u64 {
    f(f32::from_bits(a as u32), f32::from_bits(b as u32)).to_bits() as u64
}

fn f64_op(a: u64, b: u64, f: impl Fn(f64, f64) -> f64) -> u64 {
    f(f64::from_bits(a), f64::from_bits(b)).to_bits()
}

fn convert_lane(src: &Constant, to: TypeKind) -> u64 {
    use TypeKind::*;
    match (src.kind(), to) {
        (a, b) if a == b => src.bits[0],
        (Bool | QBool, Bool | QBool) => src.bits[0],
        (Bool | QBool, Int) => src.bits[0],
        (Bool | QBool, Float) => (src.bits[0] as u32 as f32).to_bits() as u64,
        (Bool | QBool, Double) => (src.bits[0] as f64).to_bits(),
        (Int, Bool | QBool) => (src.get_int(0) != 0) as u64,
        (Int, Float) => (src.get_int(0) as f32).to_bits() as u64,
        (Int, Double) => (src.get_int(0) as f64).to_bits(),
        (Float, Bool | QBool) => (src.get_float(0) != 0.0) as u64,
        (Float, Int) => (src.get_float(0) as i32) as u32 as u64,
        (Float, Double) => (src.get_float(0) as f64).to_bits(),
        (Double, Bool | QBool) => (src.get_double(0) != 0.0) as u64,
        (Double, Int) => (src.get_double(0) as i32) as u32 as u64,
        (Double, Float) => (src.get_double(0) as f32).to_bits() as u64,
        _ => unreachable!("invalid constant conversion"),
    }
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.width() > 1 {
            write!(f, "{}(", self.type_info.strip())?;
            for i in 0..self.width() as usize {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", self.lane(i))?;
            }
            return write!(f, ")");
        }

        match self.kind() {
            TypeKind::Void => write!(f, "void"),
            TypeKind::Bool | TypeKind::QBool => {
                write!(f, "{}", if self.get_bool(0) { "true" } else { "false" })
            }
            TypeKind::Int => write!(f, "{}", self.get_int(0)),
            TypeKind::Float => {
                let v = self.get_float(0);
                if v.is_nan() {
                    write!(f, "float(NAN)")
                } else if v.is_infinite() {
                    write!(f, "float({}INFINITY)", if v < 0.0 { "-" } else { "" })
                } else {
                    write!(f, "{:?}f", v)
                }
            }
            TypeKind::Double => {
                let v = self.get_double(0);
                if v.is_nan() {
                    write!(f, "NAN")
                } else if v.is_infinite() {
                    write!(f, "{}INFINITY", if v < 0.0 { "-" } else { "" })
                } else {
                    write!(f, "{:?}", v)
                }
            }
            TypeKind::Ptr => write!(f, "ptr"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_int_folding_wraps() {
        let a = Constant::int(i32::MAX);
        let b = Constant::int(1);
        assert_eq!(a.add(&b).get_int(0), i32::MIN);
    }

    #[test]
    fn test_division_by_zero_is_detected() {
        assert!(Constant::int(5).div(&Constant::int(0)).is_none());
        assert!(Constant::float(5.0).div(&Constant::float(0.0)).is_some());
    }

    #[test]
    fn test_comparison_produces_matching_mask() {
        let a = Constant::double(1.0).convert_to(TypeInfo::new(TypeKind::Double, 2));
        let b = Constant::double(2.0).convert_to(TypeInfo::new(TypeKind::Double, 2));
        let m = a.lt(&b);
        assert_eq!(m.type_info(), TypeInfo::new(TypeKind::QBool, 2));
        assert!(m.get_bool(0) && m.get_bool(1));
    }

    #[test]
    fn test_splat_conversion() {
        let v = Constant::int(3).convert_to(TypeInfo::new(TypeKind::Float, 4));
        assert_eq!(v.width(), 4);
        assert!((0..4).all(|i| v.get_float(i) == 3.0));
    }

    #[test]
    fn test_display_round_trip_forms() {
        assert_eq!(format!("{}", Constant::float(3.5)), "3.5f");
        assert_eq!(format!("{}", Constant::double(3.0)), "3.0");
        assert_eq!(format!("{}", Constant::int(-7)), "-7");
    }
}
