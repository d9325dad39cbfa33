use std::collections::{HashMap, HashSet};

use super::scope::{
    Intrinsic, ScopeId, Symbol, SymbolData, SymbolTable, VarData,
};
use crate::common::{Constant, Ident, TypeInfo, TypeKind};
use crate::errors::Error;
use crate::output_log::ErrorReporter;
use crate::parser::ast::*;

type Result<T> = std::result::Result<T, Error>;

/// Rank along the implicit-conversion lattice `bool < int < float < double`.
fn kind_rank(kind: TypeKind) -> Option<u32> {
    match kind {
        TypeKind::Bool | TypeKind::QBool => Some(0),
        TypeKind::Int => Some(1),
        TypeKind::Float => Some(2),
        TypeKind::Double => Some(3),
        _ => None,
    }
}

fn is_numeric(kind: TypeKind) -> bool {
    matches!(kind, TypeKind::Int | TypeKind::Float | TypeKind::Double)
}

/// Common operand type: kinds join along the lattice, widths must match
/// exactly except for a scalar splatting across a vector.
pub fn common_type(a: TypeInfo, b: TypeInfo) -> Option<TypeInfo> {
    let (a, b) = (a.strip(), b.strip());
    let ra = kind_rank(a.kind())?;
    let rb = kind_rank(b.kind())?;
    let kind = if ra >= rb { a.kind() } else { b.kind() };
    // Joining a mask with a mask keeps a mask; anything else lands on the
    // numeric kind of the higher rank.
    let kind = match kind {
        TypeKind::QBool if a.kind() != b.kind() => TypeKind::Bool,
        k => k,
    };

    let width = match (a.width(), b.width()) {
        (w1, w2) if w1 == w2 => w1,
        (1, w) | (w, 1) => w,
        _ => return None,
    };

    if !kind.valid_widths().contains(&width) {
        return None;
    }
    Some(TypeInfo::new(kind, width))
}

fn convert_to(expr: Expression, target: TypeInfo) -> Expression {
    let target = target.strip();
    if expr.get_type().strip() == target {
        return expr;
    }
    if let Some(imm) = expr.get_imm() {
        let position = expr.get_position();
        let mut folded: Expression = Expr::Imm(imm.convert_to(target)).at_position(position);
        folded.set_type(target);
        return folded;
    }
    let position = expr.get_position();
    let mut cast: Expression = Expr::Cast(target, expr).at_position(position);
    cast.set_type(target);
    cast
}

fn structurally_lvalue(expr: &Expression) -> bool {
    match expr.as_ref() {
        Expr::Var(_) => true,
        Expr::Member(base, _) => {
            // Argument-object member access; swizzles carry a vector-typed
            // base and are rvalues.
            matches!(base.as_ref(), Expr::Var(_)) && base.get_type().kind() == TypeKind::Ptr
        }
        _ => false,
    }
}

const SWIZZLE_ALPHABETS: [&str; 3] = ["xyzw", "rgba", "stpq"];

/// Lane indices selected by a swizzle like `.xyz` or `.bgra`, if valid for
/// the given source width.
pub fn swizzle_lanes(selector: &str, base_width: u32) -> Option<Vec<u32>> {
    if selector.is_empty() || selector.len() > 4 {
        return None;
    }
    let mut lanes = vec![];
    for c in selector.chars() {
        let lane = SWIZZLE_ALPHABETS
            .iter()
            .find_map(|alphabet| alphabet.find(c))? as u32;
        if lane >= base_width {
            return None;
        }
        lanes.push(lane);
    }
    Some(lanes)
}

pub struct AstAnalysis<'a, 'b> {
    symbols: &'a mut SymbolTable,
    reporter: &'a mut ErrorReporter<'b>,
    current_ret: TypeInfo,
    current_function: String,
    loop_depth: u32,
    call_edges: HashMap<String, HashSet<String>>,
    function_signatures: HashMap<String, (TypeInfo, Vec<TypeInfo>)>,
}

impl<'a, 'b> AstAnalysis<'a, 'b> {
    pub fn new(symbols: &'a mut SymbolTable, reporter: &'a mut ErrorReporter<'b>) -> Self {
        Self {
            symbols,
            reporter,
            current_ret: TypeInfo::VOID,
            current_function: String::new(),
            loop_depth: 0,
            call_edges: HashMap::new(),
            function_signatures: HashMap::new(),
        }
    }

    fn error<T>(&mut self, code: Error, position: u32, message: impl Into<String>) -> Result<T> {
        Err(self.reporter.on_error(code, position, message))
    }

    pub fn on_program(&mut self, program: Program) -> Result<Program> {
        // Register every function signature first so bodies can call in any
        // declaration order.
        for (index, declaration) in program.declarations.iter().enumerate() {
            if let Declaration::Fn(function) = declaration {
                let params: Vec<TypeInfo> =
                    function.params.iter().map(|p| p.type_info.strip()).collect();
                self.function_signatures
                    .insert(function.name.name.clone(), (function.ret.strip(), params));
                if self
                    .symbols
                    .declare(
                        SymbolTable::ROOT,
                        Symbol::new(
                            function.name.name.clone(),
                            function.ret.strip(),
                            SymbolData::Function(index),
                        ),
                    )
                    .is_err()
                {
                    return self.error(
                        Error::AlreadyExists,
                        function.name.position,
                        format!("function '{}' is already defined", function.name),
                    );
                }
            }
        }

        let declarations = program
            .declarations
            .into_iter()
            .map(|declaration| match declaration {
                Declaration::Fn(function) => Ok(self.on_function(function)?.into()),
                Declaration::Var(decl) => {
                    Ok(self.on_var_declaration(decl, SymbolTable::ROOT)?.into())
                }
            })
            .collect::<Result<Vec<Declaration>>>()?;

        let program = Program { declarations };

        if program.function("main").is_none() {
            return self.error(Error::InvalidState, 0, "program has no 'main' function");
        }

        self.check_recursion()?;

        Ok(program)
    }

    fn check_recursion(&mut self) -> Result<()> {
        fn reaches(
            edges: &HashMap<String, HashSet<String>>,
            from: &str,
            target: &str,
            seen: &mut HashSet<String>,
        ) -> bool {
            let Some(callees) = edges.get(from) else {
                return false;
            };
            for callee in callees {
                if callee == target {
                    return true;
                }
                if seen.insert(callee.clone()) && reaches(edges, callee, target, seen) {
                    return true;
                }
            }
            false
        }

        let names: Vec<String> = self.call_edges.keys().cloned().collect();
        for name in names {
            if reaches(&self.call_edges, &name, &name, &mut HashSet::new()) {
                return self.error(
                    Error::RecursionNotAllowed,
                    0,
                    format!("function '{}' calls itself", name),
                );
            }
        }
        Ok(())
    }

    fn on_function(&mut self, function: FunctionDeclaration) -> Result<FunctionDeclaration> {
        if function.name.name == "main" && !function.params.is_empty() {
            return self.error(
                Error::InvalidArgument,
                function.name.position,
                "'main' takes no parameters; inputs come from the argument layouts",
            );
        }

        let scope = self.symbols.push_scope(SymbolTable::ROOT);
        self.current_ret = function.ret.strip();
        self.current_function = function.name.name.clone();
        self.loop_depth = 0;

        for param in &function.params {
            if param.type_info.is_void() {
                return self.error(
                    Error::InvalidArgument,
                    param.name.position,
                    format!("parameter '{}' has void type", param.name),
                );
            }
            if self
                .symbols
                .declare(
                    scope,
                    Symbol::new(
                        param.name.name.clone(),
                        param.type_info.strip(),
                        SymbolData::Variable(VarData {
                            is_const: false,
                            value: None,
                        }),
                    ),
                )
                .is_err()
            {
                return self.error(
                    Error::AlreadyExists,
                    param.name.position,
                    format!("duplicate parameter '{}'", param.name),
                );
            }
        }

        let mut body = self.on_block(function.body, scope)?;

        if !block_always_returns(&body) {
            if function.ret.is_void() {
                body.0.push(Statement::Return(None).into());
            } else {
                return self.error(
                    Error::InvalidState,
                    function.name.position,
                    format!("function '{}' does not return on all paths", function.name),
                );
            }
        }

        Ok(FunctionDeclaration {
            name: function.name,
            ret: function.ret,
            params: function.params,
            body,
        })
    }

    fn on_block(&mut self, block: Block, scope: ScopeId) -> Result<Block> {
        let items = block
            .0
            .into_iter()
            .map(|item| match item {
                BlockItem::D(decl) => Ok(self.on_var_declaration(decl, scope)?.into()),
                BlockItem::S(stmt) => Ok(self.on_statement(stmt, scope)?.into()),
            })
            .collect::<Result<Vec<BlockItem>>>()?;
        Ok(items.into())
    }

    fn on_var_declaration(
        &mut self,
        decl: VarDeclaration,
        scope: ScopeId,
    ) -> Result<VarDeclaration> {
        let position = decl.name.position;
        let var_type = decl.var_type.strip();

        if var_type.is_void() {
            return self.error(
                Error::InvalidArgument,
                position,
                format!("variable '{}' has void type", decl.name),
            );
        }

        let init = decl
            .init
            .map(|init| {
                let init = self.on_expression(init, scope)?;
                self.convert_by_assignment(init, var_type, position)
            })
            .transpose()?;

        if decl.is_const && init.is_none() {
            return self.error(
                Error::InvalidState,
                position,
                format!("const variable '{}' has no initializer", decl.name),
            );
        }

        let value = if decl.is_const {
            init.as_ref().and_then(|e| e.get_imm())
        } else {
            None
        };

        let symbol_type = if decl.is_const {
            var_type.with_ro()
        } else {
            var_type
        };

        if self
            .symbols
            .declare(
                scope,
                Symbol::new(
                    decl.name.name.clone(),
                    symbol_type,
                    SymbolData::Variable(VarData {
                        is_const: decl.is_const,
                        value,
                    }),
                ),
            )
            .is_err()
        {
            return self.error(
                Error::AlreadyExists,
                position,
                format!("'{}' is already declared in this scope", decl.name),
            );
        }

        Ok(VarDeclaration {
            name: decl.name,
            var_type,
            init,
            is_const: decl.is_const,
        })
    }

    fn on_statement(&mut self, stmt: Statement, scope: ScopeId) -> Result<Statement> {
        Ok(match stmt {
            Statement::Return(value) => {
                let value = match (value, self.current_ret.is_void()) {
                    (None, true) => None,
                    (None, false) => {
                        return self.error(
                            Error::InvalidCast,
                            0,
                            format!(
                                "function '{}' must return {}",
                                self.current_function, self.current_ret
                            ),
                        );
                    }
                    (Some(value), true) => {
                        let position = value.get_position();
                        return self.error(
                            Error::InvalidCast,
                            position,
                            "void function cannot return a value",
                        );
                    }
                    (Some(value), false) => {
                        let value = self.on_expression(value, scope)?;
                        let position = value.get_position();
                        Some(self.convert_by_assignment(value, self.current_ret, position)?)
                    }
                };
                Statement::Return(value)
            }
            Statement::Expression(expr) => {
                Statement::Expression(self.on_expression(expr, scope)?)
            }
            Statement::If(cond, then_stmt, else_stmt) => {
                let cond = self.condition(cond, scope)?;
                let then_stmt = Box::new(self.on_statement(*then_stmt, scope)?);
                let else_stmt = else_stmt
                    .map(|s| Ok::<_, Error>(Box::new(self.on_statement(*s, scope)?)))
                    .transpose()?;
                Statement::If(cond, then_stmt, else_stmt)
            }
            Statement::Compound(block) => {
                let inner = self.symbols.push_scope(scope);
                Statement::Compound(self.on_block(block, inner)?)
            }
            Statement::Break => {
                if self.loop_depth == 0 {
                    return self.error(Error::InvalidState, 0, "break outside of a loop");
                }
                Statement::Break
            }
            Statement::Continue => {
                if self.loop_depth == 0 {
                    return self.error(Error::InvalidState, 0, "continue outside of a loop");
                }
                Statement::Continue
            }
            Statement::While(cond, body) => {
                let cond = self.condition(cond, scope)?;
                self.loop_depth += 1;
                let body = Box::new(self.on_statement(*body, scope)?);
                self.loop_depth -= 1;
                Statement::While(cond, body)
            }
            Statement::DoWhile(body, cond) => {
                self.loop_depth += 1;
                let body = Box::new(self.on_statement(*body, scope)?);
                self.loop_depth -= 1;
                let cond = self.condition(cond, scope)?;
                Statement::DoWhile(body, cond)
            }
            Statement::For(init, cond, increment, body) => {
                let inner = self.symbols.push_scope(scope);
                let init = Box::new(match *init {
                    ForInit::Decl(decls) => ForInit::Decl(
                        decls
                            .into_iter()
                            .map(|d| self.on_var_declaration(d, inner))
                            .collect::<Result<Vec<_>>>()?,
                    ),
                    ForInit::Exp(expr) => ForInit::Exp(
                        expr.map(|e| self.on_expression(e, inner)).transpose()?,
                    ),
                });
                let cond = cond.map(|c| self.condition(c, inner)).transpose()?;
                let increment = increment
                    .map(|e| self.on_expression(e, inner))
                    .transpose()?;
                self.loop_depth += 1;
                let body = Box::new(self.on_statement(*body, inner)?);
                self.loop_depth -= 1;
                Statement::For(init, cond, increment, body)
            }
            Statement::Null => Statement::Null,
        })
    }

    /// Control-flow conditions are scalar `bool` after implicit conversion;
    /// numeric scalars convert, vectors are rejected.
    fn condition(&mut self, cond: Expression, scope: ScopeId) -> Result<Expression> {
        let cond = self.on_expression(cond, scope)?;
        let position = cond.get_position();
        let cond_type = cond.get_type().strip();

        if cond_type.is_vector() {
            return self.error(
                Error::InvalidCast,
                position,
                "condition must be a scalar boolean",
            );
        }
        if kind_rank(cond_type.kind()).is_none() {
            return self.error(
                Error::InvalidCast,
                position,
                "condition must be a scalar boolean",
            );
        }
        Ok(convert_to(cond, TypeInfo::bool_()))
    }

    /// Implicit conversion for initializers, returns and call arguments:
    /// upward along the lattice only, widths equal or scalar-splat.
    fn convert_by_assignment(
        &mut self,
        expr: Expression,
        target: TypeInfo,
        position: u32,
    ) -> Result<Expression> {
        let target = target.strip();
        let from = expr.get_type().strip();
        if from == target {
            return Ok(expr);
        }

        let legal_kinds = match (kind_rank(from.kind()), kind_rank(target.kind())) {
            (Some(a), Some(b)) => a <= b,
            _ => false,
        };
        let legal_width = from.width() == target.width() || from.width() == 1;

        if !legal_kinds || !legal_width {
            return self.error(
                Error::InvalidCast,
                position,
                format!("cannot implicitly convert {} to {}", from, target),
            );
        }
        Ok(convert_to(expr, target))
    }

    fn bump_assign_count(&mut self, target: &Expression, scope: ScopeId) {
        if let Expr::Var(ident) = target.as_ref() {
            if let Some(id) = self.symbols.lookup(scope, &ident.name) {
                self.symbols.get_mut(id).assign_count += 1;
            }
        }
    }

    fn check_assignable(&mut self, target: &Expression, position: u32) -> Result<()> {
        if !structurally_lvalue(target) {
            return self.error(
                Error::InvalidAssignment,
                position,
                "target of assignment is not an l-value",
            );
        }
        if target.get_type().is_ro() {
            return self.error(
                Error::InvalidAssignment,
                position,
                "target of assignment is read-only",
            );
        }
        Ok(())
    }

    fn on_expression(&mut self, expr: Expression, scope: ScopeId) -> Result<Expression> {
        let position = expr.get_position();
        match expr.unwrap() {
            Expr::Imm(value) => {
                let mut e: Expression = Expr::Imm(value).at_position(position);
                e.set_type(value.type_info().strip());
                Ok(e)
            }
            Expr::Var(ident) => self.on_var(ident, position, scope),
            Expr::Member(base, member) => self.on_member(base, member, position, scope),
            Expr::Cast(target, inner) => {
                // Only produced by earlier analysis; keep it typed.
                let inner = self.on_expression(inner, scope)?;
                let mut e: Expression = Expr::Cast(target, inner).at_position(position);
                e.set_type(target.strip());
                Ok(e)
            }
            Expr::Unary(op, inner) => self.on_unary(op, inner, position, scope),
            Expr::Binary(op, left, right) => self.on_binary(op, left, right, position, scope),
            Expr::Postfix(op, inner) => {
                let inner = self.on_expression(inner, scope)?;
                self.check_assignable(&inner, position)?;
                let inner_type = inner.get_type().strip();
                if !is_numeric(inner_type.kind()) {
                    return self.error(
                        Error::InvalidArgument,
                        position,
                        format!("{}{} is not numeric", inner_type, op),
                    );
                }
                self.bump_assign_count(&inner, scope);
                let mut e: Expression = Expr::Postfix(op, inner).at_position(position);
                e.set_type(inner_type);
                Ok(e)
            }
            Expr::Assignment(target, value) => {
                let target = self.on_expression(target, scope)?;
                self.check_assignable(&target, position)?;
                self.bump_assign_count(&target, scope);
                let target_type = target.get_type().strip();
                let value = self.on_expression(value, scope)?;
                let value = self.convert_by_assignment(value, target_type, position)?;
                let mut e: Expression = Expr::Assignment(target, value).at_position(position);
                e.set_type(target_type);
                Ok(e)
            }
            Expr::CompoundAssignment(op, target, value) => {
                let target = self.on_expression(target, scope)?;
                self.check_assignable(&target, position)?;
                self.bump_assign_count(&target, scope);
                let target_type = target.get_type().strip();
                let value = self.on_expression(value, scope)?;
                // Validate the underlying operation at the promoted type.
                let compute =
                    self.binary_type(op, target_type, value.get_type().strip(), position)?;
                let value = if op.is_shift() {
                    value
                } else {
                    self.convert_by_assignment(value, value_type_for(compute), position)?
                };
                let mut e: Expression =
                    Expr::CompoundAssignment(op, target, value).at_position(position);
                e.set_type(target_type);
                Ok(e)
            }
            Expr::Conditional(cond, then_arm, else_arm) => {
                self.on_conditional(cond, then_arm, else_arm, position, scope)
            }
            Expr::Coalesce(left, _) => {
                let position = left.get_position().max(position);
                self.error(
                    Error::InvalidArgument,
                    position,
                    "the '??' operator is reserved",
                )
            }
            Expr::Call(name, args) => self.on_call(name, args, position, scope),
        }
    }

    fn on_var(&mut self, ident: Ident, position: u32, scope: ScopeId) -> Result<Expression> {
        let Some(id) = self.symbols.lookup(scope, &ident.name) else {
            return self.error(
                Error::SymbolNotDefined,
                position,
                format!("symbol '{}' is not defined", ident),
            );
        };

        let symbol = self.symbols.get(id);
        match &symbol.data {
            SymbolData::Constant(value) => {
                let value = *value;
                let mut e: Expression = Expr::Imm(value).at_position(position);
                e.set_type(value.type_info().strip());
                Ok(e)
            }
            SymbolData::Variable(var) => {
                if let Some(value) = var.value {
                    let mut e: Expression = Expr::Imm(value).at_position(position);
                    e.set_type(value.type_info().strip());
                    return Ok(e);
                }
                let type_info = symbol.type_info;
                let mut e: Expression = Expr::Var(ident).at_position(position);
                e.set_type(type_info);
                Ok(e)
            }
            SymbolData::Member(_) => {
                if symbol.type_info.is_array() {
                    return self.error(
                        Error::InvalidArgument,
                        position,
                        format!("array member '{}' cannot be used as a value", ident),
                    );
                }
                let type_info = symbol.type_info;
                let mut e: Expression = Expr::Var(ident).at_position(position);
                e.set_type(type_info);
                Ok(e)
            }
            SymbolData::Argument(_) => {
                let mut e: Expression = Expr::Var(ident).at_position(position);
                e.set_type(TypeInfo::ptr());
                Ok(e)
            }
            SymbolData::Type | SymbolData::Intrinsic(_) | SymbolData::Function(_) => self.error(
                Error::InvalidArgument,
                position,
                format!("'{}' cannot be used as a value", ident),
            ),
        }
    }

    fn on_member(
        &mut self,
        base: Expression,
        member: Ident,
        position: u32,
        scope: ScopeId,
    ) -> Result<Expression> {
        let base = self.on_expression(base, scope)?;
        let base_type = base.get_type();

        // Argument-object member: `obj.field`.
        if base_type.kind() == TypeKind::Ptr {
            let object = base
                .get_var_name()
                .and_then(|name| self.symbols.lookup(scope, name));
            let member_info = object.and_then(|id| match &self.symbols.get(id).data {
                SymbolData::Argument(arg) => arg.members.get(&member.name).copied(),
                _ => None,
            });
            let Some((type_info, _)) = member_info else {
                return self.error(
                    Error::SymbolNotDefined,
                    position,
                    format!("no member '{}' on this argument", member),
                );
            };
            if type_info.is_array() {
                return self.error(
                    Error::InvalidArgument,
                    position,
                    format!("array member '{}' cannot be used as a value", member),
                );
            }
            let mut e: Expression = Expr::Member(base, member).at_position(position);
            e.set_type(type_info);
            return Ok(e);
        }

        // Swizzle on a vector value.
        if base_type.is_vector() && base_type.width() <= 4 {
            let Some(lanes) = swizzle_lanes(&member.name, base_type.width()) else {
                return self.error(
                    Error::InvalidArgument,
                    position,
                    format!("invalid swizzle '.{}' on {}", member, base_type.strip()),
                );
            };
            let result = if lanes.len() == 1 {
                TypeInfo::scalar(base_type.kind())
            } else {
                TypeInfo::new(base_type.kind(), lanes.len() as u32)
            };
            let mut e: Expression = Expr::Member(base, member).at_position(position);
            e.set_type(result);
            return Ok(e);
        }

        self.error(
            Error::InvalidArgument,
            position,
            format!("{} has no member '{}'", base_type.strip(), member),
        )
    }

    fn on_unary(
        &mut self,
        op: UnaryOperator,
        inner: Expression,
        position: u32,
        scope: ScopeId,
    ) -> Result<Expression> {
        let inner = self.on_expression(inner, scope)?;
        let inner_type = inner.get_type().strip();

        match op {
            UnaryOperator::Not => {
                if kind_rank(inner_type.kind()).is_none() {
                    return self.error(
                        Error::InvalidArgument,
                        position,
                        format!("cannot apply '!' to {}", inner_type),
                    );
                }
                let result = inner_type.mask_type();
                let mut e: Expression = Expr::Unary(op, inner).at_position(position);
                e.set_type(result);
                Ok(e)
            }
            UnaryOperator::Negate => {
                if !is_numeric(inner_type.kind()) {
                    return self.error(
                        Error::InvalidArgument,
                        position,
                        format!("cannot negate {}", inner_type),
                    );
                }
                let mut e: Expression = Expr::Unary(op, inner).at_position(position);
                e.set_type(inner_type);
                Ok(e)
            }
            UnaryOperator::Complement => {
                if inner_type.kind() != TypeKind::Int {
                    return self.error(
                        Error::InvalidArgument,
                        position,
                        format!("cannot apply '~' to {}", inner_type),
                    );
                }
                let mut e: Expression = Expr::Unary(op, inner).at_position(position);
                e.set_type(inner_type);
                Ok(e)
            }
            UnaryOperator::PreIncrement | UnaryOperator::PreDecrement => {
                self.check_assignable(&inner, position)?;
                if !is_numeric(inner_type.kind()) {
                    return self.error(
                        Error::InvalidArgument,
                        position,
                        format!("{} is not numeric", inner_type),
                    );
                }
                self.bump_assign_count(&inner, scope);
                let mut e: Expression = Expr::Unary(op, inner).at_position(position);
                e.set_type(inner_type);
                Ok(e)
            }
        }
    }

    /// Result type of a binary operation at already-stripped operand types.
    fn binary_type(
        &mut self,
        op: BinaryOperator,
        left: TypeInfo,
        right: TypeInfo,
        position: u32,
    ) -> Result<TypeInfo> {
        use BinaryOperator::*;

        let common = common_type(left, right);

        match op {
            Add | Subtract | Multiply | Divide | Remainder => {
                let Some(common) = common else {
                    return self.error(
                        Error::InvalidCast,
                        position,
                        format!("no common type for {} and {}", left, right),
                    );
                };
                if !is_numeric(common.kind()) {
                    return self.error(
                        Error::InvalidArgument,
                        position,
                        format!("'{}' needs numeric operands", op),
                    );
                }
                if op == Remainder && common.kind() != TypeKind::Int {
                    return self.error(
                        Error::InvalidArgument,
                        position,
                        "'%' is defined on integers only",
                    );
                }
                if matches!(op, Divide | Remainder)
                    && common.kind() == TypeKind::Int
                    && common.is_vector()
                {
                    return self.error(
                        Error::InvalidArgument,
                        position,
                        "integer vector division is not supported",
                    );
                }
                Ok(common)
            }
            BitwiseAnd | BitwiseOr | BitwiseXor => {
                let Some(common) = common else {
                    return self.error(
                        Error::InvalidCast,
                        position,
                        format!("no common type for {} and {}", left, right),
                    );
                };
                if !matches!(common.kind(), TypeKind::Int | TypeKind::Bool | TypeKind::QBool) {
                    return self.error(
                        Error::InvalidArgument,
                        position,
                        format!("'{}' needs integer or boolean operands", op),
                    );
                }
                Ok(common)
            }
            LeftShift | RightShift => {
                if left.kind() != TypeKind::Int || right.kind() != TypeKind::Int {
                    return self.error(
                        Error::InvalidArgument,
                        position,
                        "shift operands must be integers",
                    );
                }
                // One count for every lane; per-lane shifts have no SSE form.
                if right.width() != 1 {
                    return self.error(
                        Error::InvalidArgument,
                        position,
                        "shift count must be a scalar",
                    );
                }
                Ok(left)
            }
            And | Or => {
                let Some(common) = common else {
                    return self.error(
                        Error::InvalidCast,
                        position,
                        format!("no common type for {} and {}", left, right),
                    );
                };
                Ok(common.mask_type())
            }
            Equal | NotEqual | LessThan | LessOrEqual | GreaterThan | GreaterOrEqual => {
                let Some(common) = common else {
                    return self.error(
                        Error::InvalidCast,
                        position,
                        format!("no common type for {} and {}", left, right),
                    );
                };
                Ok(common.mask_type())
            }
        }
    }

    fn on_binary(
        &mut self,
        op: BinaryOperator,
        left: Expression,
        right: Expression,
        position: u32,
        scope: ScopeId,
    ) -> Result<Expression> {
        use BinaryOperator::*;

        let left = self.on_expression(left, scope)?;
        let right = self.on_expression(right, scope)?;
        let lt = left.get_type().strip();
        let rt = right.get_type().strip();

        let result = self.binary_type(op, lt, rt, position)?;

        let (left, right) = match op {
            // The shifted value keeps its own type, the count stays scalar.
            LeftShift | RightShift => (left, right),
            And | Or => {
                // Operands become lane masks of the result's shape.
                (convert_to(left, result), convert_to(right, result))
            }
            Equal | NotEqual | LessThan | LessOrEqual | GreaterThan | GreaterOrEqual => {
                let operand = value_type_for(result);
                let common = common_type(lt, rt).unwrap_or(operand);
                (convert_to(left, common), convert_to(right, common))
            }
            _ => (convert_to(left, result), convert_to(right, result)),
        };

        let mut e: Expression = Expr::Binary(op, left, right).at_position(position);
        e.set_type(result);
        Ok(e)
    }

    fn on_conditional(
        &mut self,
        cond: Expression,
        then_arm: Expression,
        else_arm: Expression,
        position: u32,
        scope: ScopeId,
    ) -> Result<Expression> {
        let cond = self.on_expression(cond, scope)?;
        let then_arm = self.on_expression(then_arm, scope)?;
        let else_arm = self.on_expression(else_arm, scope)?;

        let Some(common) = common_type(then_arm.get_type(), else_arm.get_type()) else {
            return self.error(
                Error::InvalidCast,
                position,
                format!(
                    "no common type for {} and {}",
                    then_arm.get_type().strip(),
                    else_arm.get_type().strip()
                ),
            );
        };

        let cond_type = cond.get_type().strip();
        let cond = if cond_type.is_vector() {
            // Lane-wise select: the mask has to match the arms lane for lane.
            if !cond_type.kind().is_mask() {
                return self.error(
                    Error::InvalidCast,
                    position,
                    "vector condition must be a boolean mask",
                );
            }
            if cond_type.width() != common.width() {
                return self.error(
                    Error::InvalidCast,
                    position,
                    "condition width does not match the selected values",
                );
            }
            convert_to(cond, common.mask_type())
        } else {
            if kind_rank(cond_type.kind()).is_none() {
                return self.error(
                    Error::InvalidCast,
                    position,
                    "condition must be a scalar boolean",
                );
            }
            convert_to(cond, TypeInfo::bool_())
        };

        let then_arm = convert_to(then_arm, common);
        let else_arm = convert_to(else_arm, common);

        let mut e: Expression =
            Expr::Conditional(cond, then_arm, else_arm).at_position(position);
        e.set_type(common);
        Ok(e)
    }

    fn on_call(
        &mut self,
        name: Ident,
        args: Vec<Expression>,
        position: u32,
        scope: ScopeId,
    ) -> Result<Expression> {
        let Some(id) = self.symbols.lookup(scope, &name.name) else {
            return self.error(
                Error::SymbolNotDefined,
                position,
                format!("symbol '{}' is not defined", name),
            );
        };

        match self.symbols.get(id).data.clone() {
            SymbolData::Type => {
                let target = self.symbols.get(id).type_info.strip();
                self.on_constructor(name, target, args, position, scope)
            }
            SymbolData::Intrinsic(intrinsic) => {
                self.on_intrinsic(name, intrinsic, args, position, scope)
            }
            SymbolData::Function(_) => {
                let (ret, params) = self.function_signatures[&name.name].clone();
                if args.len() > params.len() {
                    return self.error(
                        Error::TooManyArguments,
                        position,
                        format!("too many arguments to '{}'", name),
                    );
                }
                if args.len() < params.len() {
                    return self.error(
                        Error::InvalidArgument,
                        position,
                        format!("not enough arguments to '{}'", name),
                    );
                }

                let args = args
                    .into_iter()
                    .zip(&params)
                    .map(|(arg, &param)| {
                        let arg = self.on_expression(arg, scope)?;
                        let position = arg.get_position();
                        self.convert_by_assignment(arg, param, position)
                    })
                    .collect::<Result<Vec<_>>>()?;

                self.call_edges
                    .entry(self.current_function.clone())
                    .or_default()
                    .insert(name.name.clone());

                let mut e: Expression = Expr::Call(name, args).at_position(position);
                e.set_type(ret);
                Ok(e)
            }
            _ => self.error(
                Error::InvalidArgument,
                position,
                format!("'{}' is not callable", name),
            ),
        }
    }

    // Type names double as conversions (one argument) and vector
    // constructors (one argument per lane, constants only).
    fn on_constructor(
        &mut self,
        name: Ident,
        target: TypeInfo,
        args: Vec<Expression>,
        position: u32,
        scope: ScopeId,
    ) -> Result<Expression> {
        if target.is_void() {
            return self.error(Error::InvalidArgument, position, "cannot construct void");
        }

        let args = args
            .into_iter()
            .map(|a| self.on_expression(a, scope))
            .collect::<Result<Vec<_>>>()?;

        if args.len() == 1 {
            let arg = args.into_iter().next().unwrap();
            let from = arg.get_type().strip();
            if kind_rank(from.kind()).is_none() {
                return self.error(
                    Error::InvalidCast,
                    position,
                    format!("cannot convert {} to {}", from, target),
                );
            }
            if from.width() != target.width() && from.width() != 1 {
                return self.error(
                    Error::InvalidCast,
                    position,
                    format!("cannot convert {} to {}", from, target),
                );
            }
            return Ok(convert_to(arg, target));
        }

        if target.is_vector() && args.len() == target.width() as usize {
            let scalar = TypeInfo::scalar(target.kind());
            let mut lanes = vec![];
            for arg in &args {
                let from = arg.get_type().strip();
                if kind_rank(from.kind()).is_none() || from.is_vector() {
                    return self.error(
                        Error::InvalidCast,
                        position,
                        format!("cannot convert {} to {}", from, scalar),
                    );
                }
                let Some(imm) = arg.get_imm() else {
                    return self.error(
                        Error::InvalidArgument,
                        position,
                        format!(
                            "'{}' constructor components must be constants",
                            name
                        ),
                    );
                };
                lanes.push(imm.convert_to(scalar));
            }
            let value = Constant::from_lanes(target, &lanes);
            let mut e: Expression = Expr::Imm(value).at_position(position);
            e.set_type(target);
            return Ok(e);
        }

        if args.len() > target.width() as usize {
            return self.error(
                Error::TooManyArguments,
                position,
                format!("too many components for {}", target),
            );
        }
        self.error(
            Error::InvalidArgument,
            position,
            format!("wrong number of components for {}", target),
        )
    }

    fn on_intrinsic(
        &mut self,
        name: Ident,
        intrinsic: Intrinsic,
        args: Vec<Expression>,
        position: u32,
        scope: ScopeId,
    ) -> Result<Expression> {
        use Intrinsic::*;

        let arity = match intrinsic {
            Min | Max | Pow | Dot | Cross => 2,
            _ => 1,
        };
        if args.len() > arity {
            return self.error(
                Error::TooManyArguments,
                position,
                format!("too many arguments to '{}'", name),
            );
        }
        if args.len() < arity {
            return self.error(
                Error::InvalidArgument,
                position,
                format!("not enough arguments to '{}'", name),
            );
        }

        let mut args = args
            .into_iter()
            .map(|a| self.on_expression(a, scope))
            .collect::<Result<Vec<_>>>()?;

        let first = args[0].get_type().strip();

        let result = match intrinsic {
            Abs => {
                if !is_numeric(first.kind()) {
                    return self.intrinsic_type_error(name, first, position);
                }
                first
            }
            Min | Max => {
                let second = args[1].get_type().strip();
                let Some(common) = common_type(first, second) else {
                    return self.intrinsic_type_error(name, first, position);
                };
                if !is_numeric(common.kind()) {
                    return self.intrinsic_type_error(name, common, position);
                }
                for arg in &mut args {
                    take_convert(arg, common);
                }
                common
            }
            Sqrt => {
                if !matches!(first.kind(), TypeKind::Float | TypeKind::Double) {
                    return self.intrinsic_type_error(name, first, position);
                }
                first
            }
            Pow => {
                let second = args[1].get_type().strip();
                let Some(common) = common_type(first, second) else {
                    return self.intrinsic_type_error(name, first, position);
                };
                if !matches!(common.kind(), TypeKind::Float | TypeKind::Double)
                    || common.is_vector()
                {
                    return self.intrinsic_type_error(name, common, position);
                }
                for arg in &mut args {
                    take_convert(arg, common);
                }
                common
            }
            Exp | Log | Sin | Cos => {
                if !matches!(first.kind(), TypeKind::Float | TypeKind::Double)
                    || first.is_vector()
                {
                    return self.intrinsic_type_error(name, first, position);
                }
                first
            }
            Dot | Cross => {
                let second = args[1].get_type().strip();
                if first != second
                    || !matches!(first.kind(), TypeKind::Float | TypeKind::Double)
                    || !first.is_vector()
                {
                    return self.intrinsic_type_error(name, first, position);
                }
                if intrinsic == Cross && (first.kind() != TypeKind::Float || first.width() != 3) {
                    return self.intrinsic_type_error(name, first, position);
                }
                if first.width() > 4 {
                    return self.intrinsic_type_error(name, first, position);
                }
                if intrinsic == Cross {
                    first
                } else {
                    TypeInfo::scalar(first.kind())
                }
            }
            Length => {
                if !matches!(first.kind(), TypeKind::Float | TypeKind::Double)
                    || !first.is_vector()
                    || first.width() > 4
                {
                    return self.intrinsic_type_error(name, first, position);
                }
                TypeInfo::scalar(first.kind())
            }
            IsNan | IsInf => {
                if !matches!(first.kind(), TypeKind::Float | TypeKind::Double) {
                    return self.intrinsic_type_error(name, first, position);
                }
                first.mask_type()
            }
        };

        let mut e: Expression = Expr::Call(name, args).at_position(position);
        e.set_type(result);
        Ok(e)
    }

    fn intrinsic_type_error(
        &mut self,
        name: Ident,
        type_info: TypeInfo,
        position: u32,
    ) -> Result<Expression> {
        self.error(
            Error::InvalidArgument,
            position,
            format!("'{}' is not defined on {}", name, type_info.strip()),
        )
    }
}

/// Numeric type with the same lanes as a mask (`bool4` compares as `int4`
/// unless the operands said otherwise).
fn value_type_for(mask: TypeInfo) -> TypeInfo {
    match mask.kind() {
        TypeKind::Bool => TypeInfo::new(TypeKind::Int, mask.width()),
        TypeKind::QBool => TypeInfo::new(TypeKind::Double, mask.width()),
        _ => mask,
    }
}

fn take_convert(slot: &mut Expression, target: TypeInfo) {
    let expr = std::mem::replace(slot, Expr::Imm(Constant::int(0)).into());
    *slot = convert_to(expr, target);
}

fn stmt_always_returns(stmt: &Statement) -> bool {
    match stmt {
        Statement::Return(_) => true,
        Statement::Compound(block) => block_always_returns(block),
        Statement::If(_, then_stmt, Some(else_stmt)) => {
            stmt_always_returns(then_stmt) && stmt_always_returns(else_stmt)
        }
        Statement::DoWhile(body, _) => stmt_always_returns(body),
        _ => false,
    }
}

fn block_always_returns(block: &Block) -> bool {
    block.0.iter().any(|item| match item {
        BlockItem::S(stmt) => stmt_always_returns(stmt),
        BlockItem::D(_) => false,
    })
}

pub fn analyze_program(
    program: Program,
    symbols: &mut SymbolTable,
    reporter: &mut ErrorReporter,
) -> Result<Program> {
    AstAnalysis::new(symbols, reporter).on_program(program)
}
