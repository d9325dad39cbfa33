use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::common::print_option;

#[derive(
    Clone, Copy, PartialEq, Eq, Debug, Hash, Display, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum TokenType {
    Identifier,
    IntConstant,
    HexConstant,
    UnsignedConstant,
    FloatConstant,
    DoubleConstant,

    BreakKeyword,
    ConstKeyword,
    ContinueKeyword,
    DoKeyword,
    ElseKeyword,
    FalseKeyword,
    ForKeyword,
    IfKeyword,
    ReturnKeyword,
    TrueKeyword,
    WhileKeyword,

    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,

    Semicolon,

    And,
    AndAnd,
    AndEqual,
    Arrow,
    Bang,
    BangEqual,
    Colon,
    Comma,
    Dot,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    GreaterGreater,
    GreaterGreaterEqual,
    Hat,
    HatEqual,
    Less,
    LessEqual,
    LessLess,
    LessLessEqual,
    Minus,
    MinusEqual,
    MinusMinus,
    Percent,
    PercentEqual,
    Pipe,
    PipeEqual,
    PipePipe,
    Plus,
    PlusEqual,
    PlusPlus,
    Question,
    QuestionQuestion,
    Slash,
    SlashEqual,
    Star,
    StarEqual,
    Tilde,

    EOF,
}

impl TokenType {
    pub fn is_constant(&self) -> bool {
        use TokenType::*;
        matches!(
            self,
            IntConstant
                | HexConstant
                | UnsignedConstant
                | FloatConstant
                | DoubleConstant
                | TrueKeyword
                | FalseKeyword
        )
    }

    pub fn is_integer_constant(&self) -> bool {
        use TokenType::*;
        matches!(self, IntConstant | HexConstant | UnsignedConstant)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Hash, Display, Serialize, Deserialize)]
#[display("{token_type:?} \"{}\" at byte {position}", print_option(value))]
pub struct Token {
    pub token_type: TokenType,
    pub value: Option<String>,
    #[serde(default)]
    pub position: u32,
}

impl Token {
    pub fn new(token_type: TokenType, value: Option<String>, position: u32) -> Self {
        Self {
            token_type,
            value,
            position,
        }
    }
}
