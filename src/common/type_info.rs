use std::{collections::HashMap, sync::LazyLock};

use derive_more::Display;
use serde::Serialize;

/// Primitive kind of a value.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Display, PartialOrd, Ord, Serialize)]
pub enum TypeKind {
    #[display("void")]
    Void,
    #[display("bool")]
    Bool,
    #[display("qbool")]
    QBool,
    #[display("int")]
    Int,
    #[display("float")]
    Float,
    #[display("double")]
    Double,
    #[display("ptr")]
    Ptr,
}

impl TypeKind {
    fn from_bits(bits: u32) -> Self {
        match bits {
            0 => Self::Void,
            1 => Self::Bool,
            2 => Self::QBool,
            3 => Self::Int,
            4 => Self::Float,
            5 => Self::Double,
            6 => Self::Ptr,
            _ => unreachable!(),
        }
    }

    /// Vector widths this kind may be declared at.
    pub fn valid_widths(&self) -> &'static [u32] {
        match self {
            Self::Void | Self::Ptr => &[1],
            Self::Bool | Self::Int | Self::Float => &[1, 2, 3, 4, 8],
            Self::QBool | Self::Double => &[1, 2],
        }
    }

    /// Bytes occupied by one lane.
    pub fn lane_size(&self) -> usize {
        match self {
            Self::Void => 0,
            Self::Bool | Self::Int | Self::Float => 4,
            Self::QBool | Self::Double | Self::Ptr => 8,
        }
    }

    pub fn is_mask(&self) -> bool {
        matches!(self, Self::Bool | Self::QBool)
    }

    /// The mask kind produced by comparing values of this kind.
    pub fn mask_kind(&self) -> Self {
        match self {
            Self::Double | Self::QBool => Self::QBool,
            _ => Self::Bool,
        }
    }
}

/// Packed type descriptor: primitive kind, vector width and attribute bits.
///
/// Layout of the word:
///   bits 0..=2   kind
///   bits 4..=7   vector width (1, 2, 3, 4 or 8)
///   bit  8       ref (by-reference l-value)
///   bit  9       ro  (read-only)
///   bit  10      assign (compound-assignment target marker)
///   bit  11      array
///   bits 16..=27 array dimension
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize)]
pub struct TypeInfo(u32);

const KIND_MASK: u32 = 0x0000_0007;
const WIDTH_SHIFT: u32 = 4;
const WIDTH_MASK: u32 = 0x0000_00F0;
const FLAG_REF: u32 = 1 << 8;
const FLAG_RO: u32 = 1 << 9;
const FLAG_ASSIGN: u32 = 1 << 10;
const FLAG_ARRAY: u32 = 1 << 11;
const DIM_SHIFT: u32 = 16;
const DIM_MASK: u32 = 0x0FFF_0000;

impl TypeInfo {
    pub const VOID: Self = Self(0);

    pub fn new(kind: TypeKind, width: u32) -> Self {
        debug_assert!(kind.valid_widths().contains(&width));
        Self(kind as u32 | (width << WIDTH_SHIFT))
    }

    pub fn scalar(kind: TypeKind) -> Self {
        Self::new(kind, 1)
    }

    pub fn bool_() -> Self {
        Self::scalar(TypeKind::Bool)
    }

    pub fn int() -> Self {
        Self::scalar(TypeKind::Int)
    }

    pub fn float() -> Self {
        Self::scalar(TypeKind::Float)
    }

    pub fn double() -> Self {
        Self::scalar(TypeKind::Double)
    }

    pub fn ptr() -> Self {
        Self::scalar(TypeKind::Ptr)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Rebuilds a descriptor from its packed word (layout storage).
    pub fn from_value(value: u32) -> Self {
        Self(value)
    }

    pub fn kind(&self) -> TypeKind {
        TypeKind::from_bits(self.0 & KIND_MASK)
    }

    pub fn width(&self) -> u32 {
        (self.0 & WIDTH_MASK) >> WIDTH_SHIFT
    }

    pub fn is_void(&self) -> bool {
        self.kind() == TypeKind::Void
    }

    pub fn is_scalar(&self) -> bool {
        self.width() == 1 && !self.is_array()
    }

    pub fn is_vector(&self) -> bool {
        self.width() > 1
    }

    pub fn is_ref(&self) -> bool {
        self.0 & FLAG_REF != 0
    }

    pub fn is_ro(&self) -> bool {
        self.0 & FLAG_RO != 0
    }

    pub fn is_assign(&self) -> bool {
        self.0 & FLAG_ASSIGN != 0
    }

    pub fn is_array(&self) -> bool {
        self.0 & FLAG_ARRAY != 0
    }

    pub fn dimension(&self) -> u32 {
        (self.0 & DIM_MASK) >> DIM_SHIFT
    }

    pub fn with_ref(self) -> Self {
        Self(self.0 | FLAG_REF)
    }

    pub fn with_ro(self) -> Self {
        Self(self.0 | FLAG_RO)
    }

    pub fn with_assign(self) -> Self {
        Self(self.0 | FLAG_ASSIGN)
    }

    pub fn array_of(self, dimension: u32) -> Self {
        debug_assert!(dimension <= DIM_MASK >> DIM_SHIFT);
        Self(self.0 | FLAG_ARRAY | (dimension << DIM_SHIFT))
    }

    /// Kind and width only, attribute bits cleared.
    pub fn strip(&self) -> Self {
        Self(self.0 & (KIND_MASK | WIDTH_MASK))
    }

    pub fn with_width(&self, width: u32) -> Self {
        Self::new(self.kind(), width)
    }

    /// The boolean type matching this type's lanes (`bool4` for `float4`,
    /// `qbool2` for `double2`, ...).
    pub fn mask_type(&self) -> Self {
        Self::new(self.kind().mask_kind(), self.width())
    }

    /// Total size in bytes of one value of this type (arrays multiply).
    pub fn size(&self) -> usize {
        let one = self.kind().lane_size() * self.width() as usize;
        if self.is_array() {
            one * self.dimension() as usize
        } else {
            one
        }
    }
}

/// Every declarable type name (`int`, `float4`, `qbool2`, ...). The parser
/// uses this to split declarations from expression statements; the analyzer
/// registers the same names as built-in type symbols.
pub static TYPE_NAMES: LazyLock<HashMap<String, TypeInfo>> = LazyLock::new(|| {
    let mut names = HashMap::new();
    for kind in [
        TypeKind::Void,
        TypeKind::Bool,
        TypeKind::QBool,
        TypeKind::Int,
        TypeKind::Float,
        TypeKind::Double,
    ] {
        for &width in kind.valid_widths() {
            let type_info = TypeInfo::new(kind, width);
            names.insert(format!("{}", type_info), type_info);
        }
    }
    names
});

impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind())?;
        if self.width() > 1 {
            write!(f, "{}", self.width())?;
        }
        if self.is_array() {
            write!(f, "[{}]", self.dimension())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_packing_round_trip() {
        let t = TypeInfo::new(TypeKind::Float, 4).with_ro().with_ref();
        assert_eq!(t.kind(), TypeKind::Float);
        assert_eq!(t.width(), 4);
        assert!(t.is_ro());
        assert!(t.is_ref());
        assert!(!t.is_assign());
        assert_eq!(t.strip(), TypeInfo::new(TypeKind::Float, 4));
    }

    #[test]
    fn test_mask_types() {
        assert_eq!(
            TypeInfo::new(TypeKind::Float, 4).mask_type(),
            TypeInfo::new(TypeKind::Bool, 4)
        );
        assert_eq!(
            TypeInfo::new(TypeKind::Double, 2).mask_type(),
            TypeInfo::new(TypeKind::QBool, 2)
        );
        assert_eq!(TypeInfo::int().mask_type(), TypeInfo::bool_());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", TypeInfo::new(TypeKind::Int, 8)), "int8");
        assert_eq!(format!("{}", TypeInfo::double()), "double");
        assert_eq!(format!("{}", TypeInfo::int().array_of(16)), "int[16]");
    }

    #[test]
    fn test_sizes() {
        assert_eq!(TypeInfo::new(TypeKind::Float, 3).size(), 12);
        assert_eq!(TypeInfo::new(TypeKind::Double, 2).size(), 16);
        assert_eq!(TypeInfo::new(TypeKind::Int, 8).size(), 32);
    }
}
