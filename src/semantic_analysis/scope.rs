use std::collections::HashMap;

use derive_more::{Display, IsVariant};
use serde::Serialize;

use crate::common::type_info::TYPE_NAMES;
use crate::common::{Constant, TypeInfo};
use crate::errors::Error;
use crate::layout::Layout;

/// Predeclared functions the backend knows how to lower.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Display, Serialize)]
pub enum Intrinsic {
    #[display("abs")]
    Abs,
    #[display("min")]
    Min,
    #[display("max")]
    Max,
    #[display("sqrt")]
    Sqrt,
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
    #[display("dot")]
    Dot,
    #[display("cross")]
    Cross,
    #[display("length")]
    Length,
    #[display("isnan")]
    IsNan,
    #[display("isinf")]
    IsInf,
}

const INTRINSICS: [Intrinsic; 14] = [
    Intrinsic::Abs,
    Intrinsic::Min,
    Intrinsic::Max,
    Intrinsic::Sqrt,
    Intrinsic::Pow,
    Intrinsic::Exp,
    Intrinsic::Log,
    Intrinsic::Sin,
    Intrinsic::Cos,
    Intrinsic::Dot,
    Intrinsic::Cross,
    Intrinsic::Length,
    Intrinsic::IsNan,
    Intrinsic::IsInf,
];

impl Intrinsic {
    /// True for the math-library intrinsics lowered as runtime calls.
    pub fn is_runtime_call(&self) -> bool {
        use Intrinsic::*;
        matches!(self, Pow | Exp | Log | Sin | Cos)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct VarData {
    pub is_const: bool,
    /// Recorded for `const` symbols with constant initializers.
    pub value: Option<Constant>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ArgData {
    pub slot: u32,
    pub members: HashMap<String, (TypeInfo, i32)>,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct MemberData {
    pub slot: u32,
    pub offset: i32,
}

#[derive(Clone, Debug, Serialize, IsVariant)]
#[serde(tag = "kind")]
pub enum SymbolData {
    Type,
    Constant(Constant),
    Intrinsic(Intrinsic),
    Variable(VarData),
    /// A host argument object, named after its layout.
    Argument(ArgData),
    /// A direct alias for one member of an argument object.
    Member(MemberData),
    Function(usize),
}

#[derive(Clone, Debug, Serialize)]
pub struct Symbol {
    pub name: String,
    pub type_info: TypeInfo,
    pub data: SymbolData,
    pub assign_count: u32,
}

impl Symbol {
    pub fn new(name: impl Into<String>, type_info: TypeInfo, data: SymbolData) -> Self {
        Self {
            name: name.into(),
            type_info,
            data,
            assign_count: 0,
        }
    }
}

pub type SymbolId = usize;
pub type ScopeId = usize;

#[derive(Debug, Default, Serialize)]
struct Scope {
    symbols: HashMap<String, SymbolId>,
    parent: Option<ScopeId>,
}

/// Lexically nested scopes over a flat symbol arena. Scope 0 is the program
/// scope holding every built-in; declarations never shadow it.
#[derive(Debug, Serialize)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub const ROOT: ScopeId = 0;

    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            symbols: vec![],
        }
    }

    pub fn push_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.push(Scope {
            symbols: HashMap::new(),
            parent: Some(parent),
        });
        self.scopes.len() - 1
    }

    pub fn lookup(&self, mut scope: ScopeId, name: &str) -> Option<SymbolId> {
        loop {
            if let Some(&id) = self.scopes[scope].symbols.get(name) {
                return Some(id);
            }
            scope = self.scopes[scope].parent?;
        }
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id]
    }

    /// Declares into a scope. Redeclaring within the scope or shadowing a
    /// built-in fails with `AlreadyExists`.
    pub fn declare(&mut self, scope: ScopeId, symbol: Symbol) -> Result<SymbolId, Error> {
        if self.scopes[scope].symbols.contains_key(&symbol.name) {
            return Err(Error::AlreadyExists);
        }
        if scope != Self::ROOT && self.scopes[Self::ROOT].symbols.contains_key(&symbol.name) {
            return Err(Error::AlreadyExists);
        }

        let id = self.symbols.len();
        let name = symbol.name.clone();
        self.symbols.push(symbol);
        self.scopes[scope].symbols.insert(name, id);
        Ok(id)
    }

    // Root-scope insertion for built-ins; a collision here is the host's
    // fault, not the program's.
    fn inject(&mut self, symbol: Symbol) -> Result<SymbolId, Error> {
        if self.scopes[Self::ROOT].symbols.contains_key(&symbol.name) {
            return Err(Error::SymbolCollision);
        }
        let id = self.symbols.len();
        let name = symbol.name.clone();
        self.symbols.push(symbol);
        self.scopes[Self::ROOT].symbols.insert(name, id);
        Ok(id)
    }

    /// Populates type names, built-in constants and intrinsics. Called once
    /// per compilation, before parsing.
    pub fn add_builtins(&mut self) {
        for (name, &type_info) in TYPE_NAMES.iter() {
            self.inject(Symbol::new(name, type_info, SymbolData::Type))
                .expect("built-in type registered twice");
        }

        let constants: [(&str, Constant); 9] = [
            ("M_E", Constant::double(std::f64::consts::E)),
            ("M_PI", Constant::double(std::f64::consts::PI)),
            ("M_SQRT2", Constant::double(std::f64::consts::SQRT_2)),
            ("INFINITY", Constant::float(f32::INFINITY)),
            ("NAN", Constant::float(f32::NAN)),
            ("FLT_MIN", Constant::float(f32::MIN_POSITIVE)),
            ("FLT_MAX", Constant::float(f32::MAX)),
            ("DBL_MIN", Constant::double(f64::MIN_POSITIVE)),
            ("DBL_MAX", Constant::double(f64::MAX)),
        ];
        for (name, value) in constants {
            self.inject(Symbol::new(
                name,
                value.type_info(),
                SymbolData::Constant(value),
            ))
            .expect("built-in constant registered twice");
        }

        for intrinsic in INTRINSICS {
            self.inject(Symbol::new(
                format!("{}", intrinsic),
                TypeInfo::VOID,
                SymbolData::Intrinsic(intrinsic),
            ))
            .expect("built-in intrinsic registered twice");
        }
    }

    /// Injects one host argument: the object symbol (named after the layout)
    /// plus one direct alias per member. On a name collision the offending
    /// name is returned alongside `SymbolCollision`.
    pub fn add_argument_object(
        &mut self,
        slot: u32,
        layout: &Layout,
    ) -> Result<(), (Error, String)> {
        let Some(name) = layout.name() else {
            return Err((Error::InvalidArgument, String::new()));
        };
        let name = name.to_owned();

        let mut members = HashMap::new();
        for member in layout.members() {
            members.insert(member.name.clone(), (member.type_info, member.offset));
        }

        self.inject(Symbol::new(
            name.clone(),
            TypeInfo::ptr(),
            SymbolData::Argument(ArgData { slot, members }),
        ))
        .map_err(|e| (e, name))?;

        for member in layout.members() {
            // A member sharing its name with a member of an earlier layout
            // simply loses its unqualified alias; access stays available
            // through the object. Colliding with any other built-in is a
            // hard error.
            if let Some(existing) = self.scopes[Self::ROOT].symbols.get(&member.name) {
                if self.symbols[*existing].data.is_member() {
                    continue;
                }
                return Err((Error::SymbolCollision, member.name.clone()));
            }
            self.inject(Symbol::new(
                member.name.clone(),
                member.type_info,
                SymbolData::Member(MemberData {
                    slot,
                    offset: member.offset,
                }),
            ))
            .map_err(|e| (e, member.name.clone()))?;
        }

        Ok(())
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lookup_walks_parents() {
        let mut table = SymbolTable::new();
        let inner = table.push_scope(SymbolTable::ROOT);
        let id = table
            .declare(
                inner,
                Symbol::new(
                    "x",
                    TypeInfo::int(),
                    SymbolData::Variable(VarData {
                        is_const: false,
                        value: None,
                    }),
                ),
            )
            .unwrap();
        let deeper = table.push_scope(inner);
        assert_eq!(table.lookup(deeper, "x"), Some(id));
        assert_eq!(table.lookup(SymbolTable::ROOT, "x"), None);
    }

    #[test]
    fn test_builtins_cannot_be_shadowed() {
        let mut table = SymbolTable::new();
        table.add_builtins();
        let scope = table.push_scope(SymbolTable::ROOT);
        let result = table.declare(
            scope,
            Symbol::new(
                "M_PI",
                TypeInfo::int(),
                SymbolData::Variable(VarData {
                    is_const: false,
                    value: None,
                }),
            ),
        );
        assert_eq!(result, Err(Error::AlreadyExists));
    }

    #[test]
    fn test_member_collision_with_builtin() {
        let mut table = SymbolTable::new();
        table.add_builtins();

        let mut layout = Layout::new();
        layout.configure("in").unwrap();
        layout.add("M_PI", TypeInfo::double(), 0).unwrap();

        let err = table.add_argument_object(0, &layout).unwrap_err();
        assert_eq!(err.0, Error::SymbolCollision);
        assert_eq!(err.1, "M_PI");
    }
}
