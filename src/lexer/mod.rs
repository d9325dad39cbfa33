mod logos_lexer;
pub mod token;

pub use logos_lexer::{lex_input, LexerError};
