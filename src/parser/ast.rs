use derive_more::{Display, From, IsVariant};
use serde::Serialize;

use crate::common::{Constant, Ident, TypeInfo};

#[derive(Clone, Debug, PartialEq, From, Serialize)]
pub struct Program {
    pub declarations: Vec<Declaration>,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDeclaration> {
        self.declarations.iter().filter_map(|d| match d {
            Declaration::Fn(f) => Some(f),
            _ => None,
        })
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDeclaration> {
        self.functions().find(|f| f.name.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, From, Serialize, IsVariant)]
#[serde(tag = "type")]
pub enum Declaration {
    Fn(FunctionDeclaration),
    Var(VarDeclaration),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    pub name: Ident,
    pub ret: TypeInfo,
    pub params: Vec<Param>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq, Serialize, Display)]
#[display("{type_info} {name}")]
pub struct Param {
    pub name: Ident,
    pub type_info: TypeInfo,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VarDeclaration {
    pub name: Ident,
    pub var_type: TypeInfo,
    pub init: Option<Expression>,
    pub is_const: bool,
}

#[derive(Clone, Debug, PartialEq, From, Serialize, Default)]
pub struct Block(pub Vec<BlockItem>);

#[derive(Clone, Debug, PartialEq, From, Serialize, IsVariant)]
#[serde(untagged)]
pub enum BlockItem {
    S(Statement),
    D(VarDeclaration),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Statement {
    Return(Option<Expression>),
    Expression(Expression),
    If(Expression, Box<Statement>, Option<Box<Statement>>),
    Compound(Block),
    Break,
    Continue,
    While(Expression, Box<Statement>),
    DoWhile(Box<Statement>, Expression),
    For(
        Box<ForInit>,
        Option<Expression>,
        Option<Expression>,
        Box<Statement>,
    ),
    Null,
}

#[derive(Clone, Debug, PartialEq, From, Serialize)]
pub enum ForInit {
    Decl(Vec<VarDeclaration>),
    Exp(Option<Expression>),
}

#[derive(Clone, Debug, PartialEq, Default, Serialize)]
pub struct ExpressionMetadata {
    pub position: u32,
    pub value_type: Option<TypeInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expression {
    pub(crate) metadata: ExpressionMetadata,
    content: Box<Expr>,
}

impl Expression {
    pub fn get_type(&self) -> TypeInfo {
        self.metadata
            .value_type
            .expect("expression type assigned by analysis")
    }

    pub fn try_type(&self) -> Option<TypeInfo> {
        self.metadata.value_type
    }

    pub fn set_type(&mut self, value_type: TypeInfo) {
        self.metadata.value_type = Some(value_type);
    }

    pub fn get_position(&self) -> u32 {
        self.metadata.position
    }

    pub fn is_imm(&self) -> bool {
        matches!(*self.content, Expr::Imm(_))
    }

    pub fn get_imm(&self) -> Option<Constant> {
        match *self.content {
            Expr::Imm(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(*self.content, Expr::Var(_))
    }

    pub fn get_var_name(&self) -> Option<&str> {
        match self.content.as_ref() {
            Expr::Var(ident) => Some(&ident.name),
            _ => None,
        }
    }

    pub fn unwrap(self) -> Expr {
        *self.content
    }

    /// Rewrites the content in place, keeping the metadata.
    pub fn map<E>(self, transform: impl FnOnce(Expr) -> Result<Expr, E>) -> Result<Self, E> {
        Ok(Self {
            metadata: self.metadata,
            content: Box::new(transform(*self.content)?),
        })
    }
}

impl AsRef<Expr> for Expression {
    fn as_ref(&self) -> &Expr {
        &self.content
    }
}

impl AsMut<Expr> for Expression {
    fn as_mut(&mut self) -> &mut Expr {
        &mut self.content
    }
}

impl From<Expr> for Expression {
    fn from(value: Expr) -> Self {
        Self {
            metadata: Default::default(),
            content: Box::new(value),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, IsVariant)]
pub enum Expr {
    Imm(Constant),
    Var(Ident),
    Member(Expression, Ident),
    Cast(TypeInfo, Expression),
    Unary(UnaryOperator, Expression),
    Binary(BinaryOperator, Expression, Expression),
    Postfix(PostfixOperator, Expression),
    Assignment(Expression, Expression),
    CompoundAssignment(BinaryOperator, Expression, Expression),
    Conditional(Expression, Expression, Expression),
    Coalesce(Expression, Expression),
    Call(Ident, Vec<Expression>),
}

impl Expr {
    pub fn at_position(self, position: u32) -> Expression {
        let mut expression: Expression = self.into();
        expression.metadata.position = position;
        expression
    }

    pub fn with_type(self, value_type: TypeInfo) -> Expression {
        let mut expression: Expression = self.into();
        expression.set_type(value_type);
        expression
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Serialize)]
pub enum UnaryOperator {
    #[display("~")]
    Complement,
    #[display("-")]
    Negate,
    #[display("!")]
    Not,
    #[display("++")]
    PreIncrement,
    #[display("--")]
    PreDecrement,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Serialize)]
pub enum BinaryOperator {
    #[display("+")]
    Add,
    #[display("-")]
    Subtract,
    #[display("*")]
    Multiply,
    #[display("/")]
    Divide,
    #[display("%")]
    Remainder,
    #[display("&")]
    BitwiseAnd,
    #[display("|")]
    BitwiseOr,
    #[display("^")]
    BitwiseXor,
    #[display("<<")]
    LeftShift,
    #[display(">>")]
    RightShift,
    #[display("&&")]
    And,
    #[display("||")]
    Or,
    #[display("==")]
    Equal,
    #[display("!=")]
    NotEqual,
    #[display("<")]
    LessThan,
    #[display("<=")]
    LessOrEqual,
    #[display(">")]
    GreaterThan,
    #[display(">=")]
    GreaterOrEqual,
}

impl BinaryOperator {
    pub fn is_arithmetic(&self) -> bool {
        use BinaryOperator::*;
        matches!(self, Add | Subtract | Multiply | Divide | Remainder)
    }

    pub fn is_bitwise(&self) -> bool {
        use BinaryOperator::*;
        matches!(
            self,
            BitwiseAnd | BitwiseOr | BitwiseXor | LeftShift | RightShift
        )
    }

    pub fn is_shift(&self) -> bool {
        use BinaryOperator::*;
        matches!(self, LeftShift | RightShift)
    }

    pub fn is_logical(&self) -> bool {
        use BinaryOperator::*;
        matches!(self, And | Or)
    }

    pub fn is_comparison(&self) -> bool {
        use BinaryOperator::*;
        matches!(
            self,
            Equal | NotEqual | LessThan | LessOrEqual | GreaterThan | GreaterOrEqual
        )
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Serialize)]
pub enum PostfixOperator {
    #[display("++")]
    Increment,
    #[display("--")]
    Decrement,
}
