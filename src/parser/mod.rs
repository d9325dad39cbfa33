pub mod ast;
mod parser;
mod precedence;
mod printer;

pub use parser::{parse_tokens, ParserError};
pub use precedence::{Precedence, BINARY_PRECEDENCES};
