mod constant;
pub mod type_info;

pub use constant::Constant;
pub use type_info::{TypeInfo, TypeKind};

use std::fmt::Display;
use std::hash::Hash;

use derive_more::Display;
use serde::Serialize;

use crate::lexer::token::Token;

/// Hard limits shared with the embedding API.
pub const MAX_ARGUMENTS_COUNT: usize = 4;
pub const MAX_MEMBERS_COUNT: usize = 512;
pub const MAX_IDENTIFIER_LENGTH: usize = 64;

/// A name together with the byte position it was written at.
///
/// Positions index the original source body; the error reporter turns them
/// into line/column pairs on demand.
#[derive(Clone, Debug, Serialize, Display)]
#[display("{name}")]
pub struct Ident {
    pub name: String,
    pub position: u32,
}

impl Ident {
    pub fn new(name: impl Into<String>, position: u32) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }
}

impl PartialEq for Ident {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Ident {}

impl Hash for Ident {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state)
    }
}

impl From<Token> for Ident {
    fn from(value: Token) -> Self {
        Self {
            name: value.value.unwrap(),
            position: value.position,
        }
    }
}

impl From<&str> for Ident {
    fn from(value: &str) -> Self {
        Self {
            name: value.to_owned(),
            position: 0,
        }
    }
}

pub fn print_option<T: Display>(option: &Option<T>) -> String {
    option
        .as_ref()
        .map(|inner| format!("{}", inner))
        .unwrap_or_default()
}

pub fn print_vec<T: Display>(vector: &[T], separator: &str) -> String {
    vector
        .iter()
        .map(|item| format!("{}", item))
        .collect::<Vec<_>>()
        .join(separator)
}
