use std::{
    collections::{HashMap, VecDeque},
    sync::LazyLock,
};

use thiserror::Error;

use super::ast::*;
use super::precedence::{Precedence, BINARY_PRECEDENCES};
use crate::common::type_info::TYPE_NAMES;
use crate::common::{Constant, TypeInfo};
use crate::lexer::token::{
    Token,
    TokenType::{self, *},
};

static COMPOUND_ASSIGNMENT_OPERATORS: LazyLock<HashMap<TokenType, BinaryOperator>> =
    LazyLock::new(|| {
        [
            (PlusEqual, BinaryOperator::Add),
            (MinusEqual, BinaryOperator::Subtract),
            (StarEqual, BinaryOperator::Multiply),
            (SlashEqual, BinaryOperator::Divide),
            (PercentEqual, BinaryOperator::Remainder),
            (AndEqual, BinaryOperator::BitwiseAnd),
            (PipeEqual, BinaryOperator::BitwiseOr),
            (HatEqual, BinaryOperator::BitwiseXor),
            (LessLessEqual, BinaryOperator::LeftShift),
            (GreaterGreaterEqual, BinaryOperator::RightShift),
        ]
        .into()
    });

#[derive(Clone, Error, PartialEq, Eq, Debug)]
pub enum ParserError {
    #[error("Expected {expected} and found {found}")]
    UnexpectedToken {
        expected: TokenType,
        found: TokenType,
        position: u32,
    },
    #[error("Expected a type name")]
    ExpectedTypeName(u32),
    #[error("Invalid unary operator {0}")]
    InvalidUnaryOperator(TokenType, u32),
    #[error("Invalid binary operator {0}")]
    InvalidBinaryOperator(TokenType, u32),
    #[error("Malformed expression")]
    MalformedExpression(u32),
    #[error("Constant does not fit its type")]
    ConstantTooLarge(u32),
}

impl ParserError {
    pub fn position(&self) -> u32 {
        match self {
            Self::UnexpectedToken { position, .. } => *position,
            Self::ExpectedTypeName(p)
            | Self::InvalidUnaryOperator(_, p)
            | Self::InvalidBinaryOperator(_, p)
            | Self::MalformedExpression(p)
            | Self::ConstantTooLarge(p) => *p,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParserError>;

pub(crate) struct Parser {
    tokens: VecDeque<Token>,
}

impl Parser {
    pub(crate) fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into(),
        }
    }

    fn take(&mut self) -> Token {
        self.tokens.pop_front().unwrap()
    }

    fn peek(&self) -> &Token {
        &self.tokens[0]
    }

    fn peek_next(&self) -> &Token {
        &self.tokens[1]
    }

    fn peek_at(&self, index: usize) -> &Token {
        &self.tokens[index.min(self.tokens.len() - 1)]
    }

    fn seeing(&self, token_type: TokenType) -> bool {
        self.peek().token_type == token_type
    }

    fn expect(&mut self, token_type: TokenType) -> Result<Token> {
        let token = self.take();
        if token.token_type == token_type {
            Ok(token)
        } else {
            Err(ParserError::UnexpectedToken {
                expected: token_type,
                found: token.token_type,
                position: token.position,
            })
        }
    }

    fn type_of(token: &Token) -> Option<TypeInfo> {
        if token.token_type != Identifier {
            return None;
        }
        token
            .value
            .as_ref()
            .and_then(|name| TYPE_NAMES.get(name))
            .copied()
    }

    // A declaration begins with `const` or a type name followed by an
    // identifier; `float(x)` stays an expression statement.
    fn seeing_declaration(&self) -> bool {
        if self.seeing(ConstKeyword) {
            return true;
        }
        Self::type_of(self.peek()).is_some() && self.peek_next().token_type == Identifier
    }

    fn consume_type(&mut self) -> Result<TypeInfo> {
        let token = self.take();
        Self::type_of(&token).ok_or(ParserError::ExpectedTypeName(token.position))
    }

    fn unary_operator(&mut self) -> Result<UnaryOperator> {
        use UnaryOperator::*;

        let token = self.take();
        match token.token_type {
            Tilde => Ok(Complement),
            Minus => Ok(Negate),
            Bang => Ok(Not),
            PlusPlus => Ok(PreIncrement),
            MinusMinus => Ok(PreDecrement),
            t => Err(ParserError::InvalidUnaryOperator(t, token.position)),
        }
    }

    fn binary_operator(&mut self) -> Result<BinaryOperator> {
        use BinaryOperator::*;
        let token = self.take();
        match token.token_type {
            Plus => Ok(Add),
            Minus => Ok(Subtract),
            Star => Ok(Multiply),
            Slash => Ok(Divide),
            Percent => Ok(Remainder),
            TokenType::And => Ok(BitwiseAnd),
            Pipe => Ok(BitwiseOr),
            Hat => Ok(BitwiseXor),
            LessLess => Ok(LeftShift),
            Less => Ok(LessThan),
            LessEqual => Ok(LessOrEqual),
            GreaterGreater => Ok(RightShift),
            Greater => Ok(GreaterThan),
            GreaterEqual => Ok(GreaterOrEqual),
            EqualEqual => Ok(Equal),
            BangEqual => Ok(NotEqual),
            AndAnd => Ok(BinaryOperator::And),
            PipePipe => Ok(Or),
            t => Err(ParserError::InvalidBinaryOperator(t, token.position)),
        }
    }

    fn argument_list(&mut self) -> Result<Vec<Expression>> {
        let mut args = vec![];
        if self.seeing(CloseParen) {
            return Ok(args);
        }

        args.push(self.expression(Precedence::Minimum)?);

        while self.seeing(Comma) {
            self.take();
            args.push(self.expression(Precedence::Minimum)?);
        }

        Ok(args)
    }

    pub(crate) fn constant(&mut self) -> Result<Constant> {
        let token = self.take();
        let position = token.position;

        match token.token_type {
            TrueKeyword => return Ok(Constant::bool_(true)),
            FalseKeyword => return Ok(Constant::bool_(false)),
            _ => {}
        }

        let value = token.value.unwrap();
        match token.token_type {
            IntConstant => {
                let n: u64 = value
                    .parse()
                    .map_err(|_| ParserError::ConstantTooLarge(position))?;
                if n > i32::MAX as u64 {
                    return Err(ParserError::ConstantTooLarge(position));
                }
                Ok(Constant::int(n as i32))
            }
            UnsignedConstant => {
                let n: u64 = value
                    .parse()
                    .map_err(|_| ParserError::ConstantTooLarge(position))?;
                if n > u32::MAX as u64 {
                    return Err(ParserError::ConstantTooLarge(position));
                }
                Ok(Constant::int(n as u32 as i32))
            }
            HexConstant => {
                let n = u32::from_str_radix(&value, 16)
                    .map_err(|_| ParserError::ConstantTooLarge(position))?;
                Ok(Constant::int(n as i32))
            }
            FloatConstant => {
                let n: f32 = value
                    .parse()
                    .map_err(|_| ParserError::ConstantTooLarge(position))?;
                if !n.is_finite() {
                    return Err(ParserError::ConstantTooLarge(position));
                }
                Ok(Constant::float(n))
            }
            DoubleConstant => {
                let n: f64 = value
                    .parse()
                    .map_err(|_| ParserError::ConstantTooLarge(position))?;
                if !n.is_finite() {
                    return Err(ParserError::ConstantTooLarge(position));
                }
                Ok(Constant::double(n))
            }
            _ => unreachable!(),
        }
    }

    fn primary(&mut self) -> Result<Expression> {
        let next_token = self.peek();
        let position = next_token.position;
        match next_token.token_type {
            t if t.is_constant() => Ok(Expr::Imm(self.constant()?).at_position(position)),
            OpenParen => {
                self.take();

                let inner = self.expression(Precedence::Minimum)?;
                self.expect(CloseParen)?;
                Ok(inner)
            }
            Identifier => {
                let name = self.take();

                if self.seeing(OpenParen) {
                    self.take();
                    let args = self.argument_list()?;

                    self.expect(CloseParen)?;

                    Ok(Expr::Call(name.into(), args).at_position(position))
                } else {
                    Ok(Expr::Var(name.into()).at_position(position))
                }
            }
            _ => Err(ParserError::MalformedExpression(position)),
        }
    }

    fn postfix(&mut self) -> Result<Expression> {
        let mut expr = self.primary()?;
        loop {
            match self.peek().token_type {
                PlusPlus | MinusMinus => {
                    let token = self.take();
                    expr = Expr::Postfix(
                        if token.token_type == PlusPlus {
                            PostfixOperator::Increment
                        } else {
                            PostfixOperator::Decrement
                        },
                        expr,
                    )
                    .at_position(token.position);
                }
                Dot => {
                    let token = self.take();
                    let name = self.expect(Identifier)?;
                    expr = Expr::Member(expr, name.into()).at_position(token.position);
                }
                _ => {
                    break;
                }
            }
        }
        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expression> {
        let next_token = self.peek();
        let position = next_token.position;
        match next_token.token_type {
            Tilde | Minus | Bang | PlusPlus | MinusMinus => {
                let operator = self.unary_operator()?;
                let inner = self.factor()?;
                Ok(Expr::Unary(operator, inner).at_position(position))
            }
            _ => self.postfix(),
        }
    }

    fn conditional_middle(&mut self) -> Result<Expression> {
        self.take();
        let expression = self.expression(Precedence::Minimum)?;
        self.expect(Colon)?;

        Ok(expression)
    }

    fn expression(&mut self, min_prec: Precedence) -> Result<Expression> {
        let mut left = self.factor()?;
        let mut next_token = self.peek();

        while let Some(precedence) = BINARY_PRECEDENCES.get(&next_token.token_type).copied() {
            if precedence < min_prec {
                break;
            }
            match next_token.token_type {
                Equal => {
                    let token = self.take();
                    let right = self.expression(precedence)?;
                    left = Expr::Assignment(left, right).at_position(token.position);
                }
                Question => {
                    let position = next_token.position;
                    let middle = self.conditional_middle()?;
                    let right = self.expression(precedence)?;
                    left = Expr::Conditional(left, middle, right).at_position(position);
                }
                QuestionQuestion => {
                    let token = self.take();
                    let right = self.expression(precedence)?;
                    left = Expr::Coalesce(left, right).at_position(token.position);
                }
                t if COMPOUND_ASSIGNMENT_OPERATORS.contains_key(&t) => {
                    let operator = COMPOUND_ASSIGNMENT_OPERATORS.get(&t).copied().unwrap();
                    let token = self.take();
                    let right = self.expression(precedence)?;
                    left = Expr::CompoundAssignment(operator, left, right)
                        .at_position(token.position);
                }
                _ => {
                    let position = next_token.position;
                    let operator = self.binary_operator()?;
                    let right = self.expression(precedence.increment())?;
                    left = Expr::Binary(operator, left, right).at_position(position);
                }
            }

            next_token = self.peek();
        }
        Ok(left)
    }

    fn optional_expression(
        &mut self,
        precedence: Precedence,
        delimiter: TokenType,
    ) -> Result<Option<Expression>> {
        if self.seeing(delimiter) {
            self.take();
            return Ok(None);
        }

        let expr = self.expression(precedence)?;
        self.expect(delimiter)?;

        Ok(Some(expr))
    }

    // `const? type ident (= expr)? (, ident (= expr)?)* ;`
    fn var_declarations(&mut self) -> Result<Vec<VarDeclaration>> {
        let is_const = if self.seeing(ConstKeyword) {
            self.take();
            true
        } else {
            false
        };

        let var_type = self.consume_type()?;
        let mut declarations = vec![];

        loop {
            let name = self.expect(Identifier)?;
            let init = if self.seeing(Equal) {
                self.take();
                Some(self.expression(Precedence::Assignment)?)
            } else {
                None
            };

            declarations.push(VarDeclaration {
                name: name.into(),
                var_type,
                init,
                is_const,
            });

            if self.seeing(Comma) {
                self.take();
            } else {
                break;
            }
        }

        self.expect(Semicolon)?;
        Ok(declarations)
    }

    fn for_init(&mut self) -> Result<ForInit> {
        Ok(if self.seeing_declaration() {
            self.var_declarations()?.into()
        } else {
            self.optional_expression(Precedence::Minimum, Semicolon)?
                .into()
        })
    }

    fn statement(&mut self) -> Result<Statement> {
        Ok(match self.peek().token_type {
            ReturnKeyword => {
                self.take();
                let return_value = self.optional_expression(Precedence::Minimum, Semicolon)?;
                Statement::Return(return_value)
            }
            IfKeyword => {
                self.take();
                self.expect(OpenParen)?;
                let condition = self.expression(Precedence::Minimum)?;
                self.expect(CloseParen)?;

                let then_stmt = self.statement()?;

                let else_stmt = if self.peek().token_type == ElseKeyword {
                    self.take();
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };

                Statement::If(condition, Box::new(then_stmt), else_stmt)
            }
            BreakKeyword => {
                self.take();
                self.expect(Semicolon)?;
                Statement::Break
            }
            ContinueKeyword => {
                self.take();
                self.expect(Semicolon)?;
                Statement::Continue
            }
            DoKeyword => {
                self.take();

                let body = self.statement()?;

                self.expect(WhileKeyword)?;
                self.expect(OpenParen)?;
                let condition = self.expression(Precedence::Minimum)?;
                self.expect(CloseParen)?;
                self.expect(Semicolon)?;

                Statement::DoWhile(Box::new(body), condition)
            }
            ForKeyword => {
                self.take();
                self.expect(OpenParen)?;
                let initializer = self.for_init()?;
                let condition = self.optional_expression(Precedence::Minimum, Semicolon)?;
                let increment = self.optional_expression(Precedence::Minimum, CloseParen)?;

                let body = self.statement()?;

                Statement::For(
                    Box::new(initializer),
                    condition,
                    increment,
                    Box::new(body),
                )
            }
            WhileKeyword => {
                self.take();
                self.expect(OpenParen)?;
                let condition = self.expression(Precedence::Minimum)?;
                self.expect(CloseParen)?;
                let body = self.statement()?;

                Statement::While(condition, Box::new(body))
            }
            OpenBrace => {
                self.take();

                Statement::Compound(self.block()?)
            }
            _ => self
                .optional_expression(Precedence::Minimum, Semicolon)?
                .map(Statement::Expression)
                .unwrap_or(Statement::Null),
        })
    }

    fn params(&mut self) -> Result<Vec<Param>> {
        let mut params = vec![];
        if self.seeing(CloseParen) {
            return Ok(params);
        }

        loop {
            let type_info = self.consume_type()?;
            let name = self.expect(Identifier)?;
            params.push(Param {
                name: name.into(),
                type_info,
            });
            if self.seeing(Comma) {
                self.take();
            } else {
                break;
            }
        }

        Ok(params)
    }

    fn block(&mut self) -> Result<Block> {
        let mut body = vec![];

        while !self.seeing(CloseBrace) {
            if self.seeing_declaration() {
                body.extend(self.var_declarations()?.into_iter().map(BlockItem::D));
            } else {
                body.push(self.statement()?.into());
            }
        }
        self.take();

        Ok(body.into())
    }

    fn declarations(&mut self) -> Result<Vec<Declaration>> {
        // `type ident (` opens a function definition, anything else is a
        // variable declaration list.
        if !self.seeing(ConstKeyword) && self.peek_at(2).token_type == OpenParen {
            let ret = self.consume_type()?;
            let name = self.expect(Identifier)?;
            self.expect(OpenParen)?;
            let params = self.params()?;
            self.expect(CloseParen)?;
            self.expect(OpenBrace)?;
            let body = self.block()?;

            return Ok(vec![FunctionDeclaration {
                name: name.into(),
                ret,
                params,
                body,
            }
            .into()]);
        }

        Ok(self
            .var_declarations()?
            .into_iter()
            .map(Declaration::Var)
            .collect())
    }

    fn program(mut self) -> Result<Program> {
        let mut declarations = vec![];

        while !self.seeing(EOF) {
            if !self.seeing_declaration() {
                let token = self.peek();
                return Err(ParserError::UnexpectedToken {
                    expected: Identifier,
                    found: token.token_type,
                    position: token.position,
                });
            }
            declarations.extend(self.declarations()?);
        }

        Ok(declarations.into())
    }
}

pub fn parse_tokens(tokens: Vec<Token>) -> Result<Program> {
    Parser::new(tokens).program()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lexer::lex_input;

    fn parse(input: &str) -> Program {
        parse_tokens(lex_input(input).unwrap()).unwrap()
    }

    #[test]
    fn test_function_and_variable_declarations() {
        let program = parse("const float k = 1.5f;\nfloat main() { return k; }");
        assert_eq!(program.declarations.len(), 2);
        assert!(program.declarations[0].is_var());
        let main = program.function("main").unwrap();
        assert_eq!(main.ret, TypeInfo::float());
        assert!(main.params.is_empty());
    }

    #[test]
    fn test_conversion_call_is_not_a_declaration() {
        let program = parse("void main() { float x = float(1); x = float(x); }");
        let main = program.function("main").unwrap();
        assert_eq!(main.body.0.len(), 2);
        assert!(main.body.0[0].is_d());
        assert!(main.body.0[1].is_s());
    }

    #[test]
    fn test_precedence() {
        let program = parse("void main() { int x = 1 + 2 * 3 < 7 ? 1 : 0; }");
        let main = program.function("main").unwrap();
        let BlockItem::D(decl) = &main.body.0[0] else {
            panic!("expected declaration");
        };
        let Expr::Conditional(cond, ..) = decl.init.as_ref().unwrap().as_ref() else {
            panic!("expected conditional at top");
        };
        let Expr::Binary(BinaryOperator::LessThan, ..) = cond.as_ref() else {
            panic!("expected comparison under conditional");
        };
    }

    #[test]
    fn test_multi_declarator_list() {
        let program = parse("void main() { int a = 1, b, c = 3; }");
        let main = program.function("main").unwrap();
        assert_eq!(main.body.0.len(), 3);
    }

    #[test]
    fn test_constant_overflow_is_an_error() {
        let tokens = lex_input("void main() { int x = 99999999999; }").unwrap();
        let err = parse_tokens(tokens).unwrap_err();
        assert!(matches!(err, ParserError::ConstantTooLarge(_)));
    }

    #[test]
    fn test_loops_and_jumps() {
        parse(
            "void main() {\n\
             int i;\n\
             for (i = 0; i < 8; ++i) { if (i == 3) continue; }\n\
             while (i > 0) { i -= 1; }\n\
             do { i++; } while (i < 4);\n\
             }",
        );
    }
}
