use logos::{Lexer, Logos, Skip};

use super::token::{Token, TokenType};

// The lexer uses the `logos` crate rather than a hand-rolled scanner. Its
// limited regex engine needs some external logic for anything requiring
// lookahead, hence the callbacks below.

/// Lexical failure: the byte position and the character nothing matched at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexerError {
    pub position: u32,
    pub character: char,
}

fn is_ascii_word_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

// Ensure that we only accept a token when it's followed by a word break.
fn word_break_callback(lex: &mut Lexer<LogosToken>) -> Option<String> {
    let Some(next_char) = lex.remainder().as_bytes().first() else {
        return Some(lex.slice().to_owned());
    };
    if is_ascii_word_char(*next_char) {
        None
    } else {
        Some(lex.slice().to_owned())
    }
}

fn number_break_callback(lex: &mut Lexer<LogosToken>) -> Option<String> {
    let Some(next_char) = lex.remainder().as_bytes().first() else {
        return Some(lex.slice().to_owned());
    };
    if is_ascii_word_char(*next_char) || *next_char == b'.' {
        None
    } else {
        Some(lex.slice().to_owned())
    }
}

// As above, dropping a one-character suffix (`u`, `f`).
fn number_break_one_callback(lex: &mut Lexer<LogosToken>) -> Option<String> {
    let s = lex.slice();
    let stripped = s[..(s.len() - 1)].to_owned();
    match lex.remainder().as_bytes().first() {
        Some(c) if is_ascii_word_char(*c) || *c == b'.' => None,
        _ => Some(stripped),
    }
}

// Hex constants drop the `0x` prefix and an optional `u` suffix.
fn hex_callback(lex: &mut Lexer<LogosToken>) -> Option<String> {
    if let Some(c) = lex.remainder().as_bytes().first() {
        if is_ascii_word_char(*c) || *c == b'.' {
            return None;
        }
    }
    let s = &lex.slice()[2..];
    let s = if s.ends_with(['u', 'U']) {
        &s[..s.len() - 1]
    } else {
        s
    };
    Some(s.to_owned())
}

// `/*` skips forward to the matching `*/`.
fn block_comment_callback(lex: &mut Lexer<LogosToken>) -> Skip {
    match lex.remainder().find("*/") {
        Some(end) => lex.bump(end + 2),
        None => lex.bump(lex.remainder().len()),
    }
    Skip
}

#[derive(Logos, Debug)]
#[logos(skip(r"[ \t\r\n]+"))]
#[logos(skip(r"//[^\n]*"))]
#[logos(skip(r"/\*", block_comment_callback))]
enum LogosToken {
    #[regex(r"[a-zA-Z_][0-9a-zA-Z_]*", word_break_callback)]
    Identifier(String),
    #[regex(r"[0-9]+", number_break_callback)]
    IntConstant(String),
    #[regex(r"0[xX][0-9a-fA-F]+[uU]?", hex_callback)]
    HexConstant(String),
    #[regex(r"[0-9]+[uU]", number_break_one_callback)]
    UnsignedConstant(String),
    #[regex(
        r"(([0-9]*\.[0-9]+|[0-9]+\.?)([eE][+-]?[0-9]+)?|[0-9]+)[fF]",
        number_break_one_callback
    )]
    FloatConstant(String),
    #[regex(
        r"(([0-9]*\.[0-9]+|[0-9]+\.?)[eE][+-]?[0-9]+|[0-9]*\.[0-9]+|[0-9]+\.)",
        number_break_callback
    )]
    DoubleConstant(String),

    #[token("break")]
    BreakKeyword,
    #[token("const")]
    ConstKeyword,
    #[token("continue")]
    ContinueKeyword,
    #[token("do")]
    DoKeyword,
    #[token("else")]
    ElseKeyword,
    #[token("false")]
    FalseKeyword,
    #[token("for")]
    ForKeyword,
    #[token("if")]
    IfKeyword,
    #[token("return")]
    ReturnKeyword,
    #[token("true")]
    TrueKeyword,
    #[token("while")]
    WhileKeyword,

    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,
    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,

    #[token(";")]
    Semicolon,

    #[token("&")]
    And,
    #[token("&&")]
    AndAnd,
    #[token("&=")]
    AndEqual,
    #[token("->")]
    Arrow,
    #[token("!")]
    Bang,
    #[token("!=")]
    BangEqual,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("=")]
    Equal,
    #[token("==")]
    EqualEqual,
    #[token(">")]
    Greater,
    #[token(">=")]
    GreaterEqual,
    #[token(">>")]
    GreaterGreater,
    #[token(">>=")]
    GreaterGreaterEqual,
    #[token("^")]
    Hat,
    #[token("^=")]
    HatEqual,
    #[token("<")]
    Less,
    #[token("<=")]
    LessEqual,
    #[token("<<")]
    LessLess,
    #[token("<<=")]
    LessLessEqual,
    #[token("-")]
    Minus,
    #[token("-=")]
    MinusEqual,
    #[token("--")]
    MinusMinus,
    #[token("%")]
    Percent,
    #[token("%=")]
    PercentEqual,
    #[token("|")]
    Pipe,
    #[token("|=")]
    PipeEqual,
    #[token("||")]
    PipePipe,
    #[token("+")]
    Plus,
    #[token("+=")]
    PlusEqual,
    #[token("++")]
    PlusPlus,
    #[token("?")]
    Question,
    #[token("??")]
    QuestionQuestion,
    #[token("/")]
    Slash,
    #[token("/=")]
    SlashEqual,
    #[token("*")]
    Star,
    #[token("*=")]
    StarEqual,
    #[token("~")]
    Tilde,
}

impl LogosToken {
    fn get_string(self) -> Option<String> {
        match self {
            Self::Identifier(s)
            | Self::IntConstant(s)
            | Self::HexConstant(s)
            | Self::UnsignedConstant(s)
            | Self::FloatConstant(s)
            | Self::DoubleConstant(s) => Some(s),
            _ => None,
        }
    }

    fn get_token_type(&self) -> TokenType {
        match self {
            Self::Identifier(_) => TokenType::Identifier,
            Self::IntConstant(_) => TokenType::IntConstant,
            Self::HexConstant(_) => TokenType::HexConstant,
            Self::UnsignedConstant(_) => TokenType::UnsignedConstant,
            Self::FloatConstant(_) => TokenType::FloatConstant,
            Self::DoubleConstant(_) => TokenType::DoubleConstant,

            Self::BreakKeyword => TokenType::BreakKeyword,
            Self::ConstKeyword => TokenType::ConstKeyword,
            Self::ContinueKeyword => TokenType::ContinueKeyword,
            Self::DoKeyword => TokenType::DoKeyword,
            Self::ElseKeyword => TokenType::ElseKeyword,
            Self::FalseKeyword => TokenType::FalseKeyword,
            Self::ForKeyword => TokenType::ForKeyword,
            Self::IfKeyword => TokenType::IfKeyword,
            Self::ReturnKeyword => TokenType::ReturnKeyword,
            Self::TrueKeyword => TokenType::TrueKeyword,
            Self::WhileKeyword => TokenType::WhileKeyword,

            Self::OpenParen => TokenType::OpenParen,
            Self::CloseParen => TokenType::CloseParen,
            Self::OpenBrace => TokenType::OpenBrace,
            Self::CloseBrace => TokenType::CloseBrace,
            Self::OpenBracket => TokenType::OpenBracket,
            Self::CloseBracket => TokenType::CloseBracket,

            Self::Semicolon => TokenType::Semicolon,

            Self::And => TokenType::And,
            Self::AndAnd => TokenType::AndAnd,
            Self::AndEqual => TokenType::AndEqual,
            Self::Arrow => TokenType::Arrow,
            Self::Bang => TokenType::Bang,
            Self::BangEqual => TokenType::BangEqual,
            Self::Colon => TokenType::Colon,
            Self::Comma => TokenType::Comma,
            Self::Dot => TokenType::Dot,
            Self::Equal => TokenType::Equal,
            Self::EqualEqual => TokenType::EqualEqual,
            Self::Greater => TokenType::Greater,
            Self::GreaterEqual => TokenType::GreaterEqual,
            Self::GreaterGreater => TokenType::GreaterGreater,
            Self::GreaterGreaterEqual => TokenType::GreaterGreaterEqual,
            Self::Hat => TokenType::Hat,
            Self::HatEqual => TokenType::HatEqual,
            Self::Less => TokenType::Less,
            Self::LessEqual => TokenType::LessEqual,
            Self::LessLess => TokenType::LessLess,
            Self::LessLessEqual => TokenType::LessLessEqual,
            Self::Minus => TokenType::Minus,
            Self::MinusEqual => TokenType::MinusEqual,
            Self::MinusMinus => TokenType::MinusMinus,
            Self::Percent => TokenType::Percent,
            Self::PercentEqual => TokenType::PercentEqual,
            Self::Pipe => TokenType::Pipe,
            Self::PipeEqual => TokenType::PipeEqual,
            Self::PipePipe => TokenType::PipePipe,
            Self::Plus => TokenType::Plus,
            Self::PlusEqual => TokenType::PlusEqual,
            Self::PlusPlus => TokenType::PlusPlus,
            Self::Question => TokenType::Question,
            Self::QuestionQuestion => TokenType::QuestionQuestion,
            Self::Slash => TokenType::Slash,
            Self::SlashEqual => TokenType::SlashEqual,
            Self::Star => TokenType::Star,
            Self::StarEqual => TokenType::StarEqual,
            Self::Tilde => TokenType::Tilde,
        }
    }
}

pub fn lex_input(input: &str) -> Result<Vec<Token>, LexerError> {
    let mut lex = LogosToken::lexer(input);

    let mut result = vec![];

    while let Some(token) = lex.next() {
        let position = lex.span().start as u32;
        match token {
            Ok(token) => {
                result.push(Token::new(
                    token.get_token_type(),
                    token.get_string(),
                    position,
                ));
            }
            Err(_) => {
                return Err(LexerError {
                    position,
                    character: lex.slice().chars().next().unwrap_or('\0'),
                });
            }
        }
    }

    result.push(Token::new(TokenType::EOF, None, input.len() as u32));

    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;
    use TokenType::*;

    fn types(input: &str) -> Vec<TokenType> {
        lex_input(input)
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn test_literal_classes() {
        let tokens = lex_input("12 12u 0x1F 1.5 1.5f 2e3 3f").unwrap();
        assert_eq!(
            tokens.iter().map(|t| t.token_type).collect::<Vec<_>>(),
            vec![
                IntConstant,
                UnsignedConstant,
                HexConstant,
                DoubleConstant,
                FloatConstant,
                DoubleConstant,
                FloatConstant,
                EOF
            ]
        );
        assert_eq!(tokens[1].value.as_deref(), Some("12"));
        assert_eq!(tokens[2].value.as_deref(), Some("1F"));
        assert_eq!(tokens[4].value.as_deref(), Some("1.5"));
        assert_eq!(tokens[6].value.as_deref(), Some("3"));
    }

    #[test]
    fn test_compound_operators() {
        assert_eq!(
            types("<<= >>= && || ?? -> ++ --"),
            vec![
                LessLessEqual,
                GreaterGreaterEqual,
                AndAnd,
                PipePipe,
                QuestionQuestion,
                Arrow,
                PlusPlus,
                MinusMinus,
                EOF
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            types("a // line\n/* block\n * more */ b"),
            vec![Identifier, Identifier, EOF]
        );
    }

    #[test]
    fn test_positions_are_byte_offsets() {
        let tokens = lex_input("ab\ncd").unwrap();
        assert_eq!(tokens[0].position, 0);
        assert_eq!(tokens[1].position, 3);
    }

    #[test]
    fn test_unknown_character_fails() {
        let err = lex_input("a @ b").unwrap_err();
        assert_eq!(err.position, 2);
        assert_eq!(err.character, '@');
    }
}
