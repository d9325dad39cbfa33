mod constant_folding;

use constant_folding::ConstantFolder;

use crate::errors::Error;
use crate::output_log::ErrorReporter;
use crate::parser::ast::*;
use crate::semantic_analysis::SymbolTable;

type Result<T> = std::result::Result<T, Error>;

/// AST optimizer: bottom-up constant folding and algebraic identities,
/// plus dead-code elimination on statements. Runs to a fixpoint, so running
/// it twice is the same as running it once.
pub struct AstOptimizer<'a, 'b> {
    folder: ConstantFolder<'a, 'b>,
}

impl<'a, 'b> AstOptimizer<'a, 'b> {
    pub fn new(symbols: &'a SymbolTable, reporter: &'a mut ErrorReporter<'b>) -> Self {
        Self {
            folder: ConstantFolder::new(symbols, reporter),
        }
    }

    pub fn on_program(&mut self, mut program: Program) -> Result<Program> {
        loop {
            let before = format!("{}", program);
            program = self.pass(program)?;
            if format!("{}", program) == before {
                return Ok(program);
            }
        }
    }

    fn pass(&mut self, program: Program) -> Result<Program> {
        let declarations = program
            .declarations
            .into_iter()
            .map(|declaration| {
                Ok(match declaration {
                    Declaration::Fn(f) => Declaration::Fn(FunctionDeclaration {
                        name: f.name,
                        ret: f.ret,
                        params: f.params,
                        body: self.on_block(f.body)?,
                    }),
                    Declaration::Var(v) => Declaration::Var(self.on_var_declaration(v)?),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Program { declarations })
    }

    fn on_var_declaration(&mut self, decl: VarDeclaration) -> Result<VarDeclaration> {
        Ok(VarDeclaration {
            init: decl
                .init
                .map(|e| self.folder.fold_expression(e))
                .transpose()?,
            ..decl
        })
    }

    fn on_block(&mut self, block: Block) -> Result<Block> {
        let mut items = vec![];
        let total = block.0.len();
        for (index, item) in block.0.into_iter().enumerate() {
            match item {
                BlockItem::D(decl) => items.push(self.on_var_declaration(decl)?.into()),
                BlockItem::S(stmt) => {
                    if let Some(stmt) = self.on_statement(stmt)? {
                        let terminates = always_terminates(&stmt);
                        items.push(BlockItem::S(stmt));
                        // Anything after an unconditional jump in the same
                        // block is unreachable.
                        if terminates {
                            if index + 1 < total {
                                self.folder
                                    .reporter
                                    .on_warning(0, "unreachable code removed");
                            }
                            break;
                        }
                    }
                }
            }
        }
        Ok(Block(items))
    }

    fn on_statement(&mut self, stmt: Statement) -> Result<Option<Statement>> {
        Ok(match stmt {
            Statement::Return(value) => Some(Statement::Return(
                value.map(|e| self.folder.fold_expression(e)).transpose()?,
            )),
            Statement::Expression(expr) => {
                let expr = self.folder.fold_expression(expr)?;
                if self.folder.is_pure(&expr) {
                    None
                } else {
                    Some(Statement::Expression(expr))
                }
            }
            Statement::If(cond, then_stmt, else_stmt) => {
                let cond = self.folder.fold_expression(cond)?;
                let then_stmt = self.on_statement(*then_stmt)?;
                let else_stmt = else_stmt
                    .map(|s| self.on_statement(*s))
                    .transpose()?
                    .flatten();

                if let Some(value) = cond.get_imm() {
                    // The branch is decided at compile time.
                    return Ok(if value.truth() { then_stmt } else { else_stmt });
                }

                match (then_stmt, else_stmt) {
                    (None, None) => {
                        if self.folder.is_pure(&cond) {
                            None
                        } else {
                            Some(Statement::Expression(cond))
                        }
                    }
                    (None, Some(else_stmt)) => Some(Statement::If(
                        negate_condition(cond),
                        Box::new(else_stmt),
                        None,
                    )),
                    (Some(then_stmt), else_stmt) => Some(Statement::If(
                        cond,
                        Box::new(then_stmt),
                        else_stmt.map(Box::new),
                    )),
                }
            }
            Statement::Compound(block) => {
                let block = self.on_block(block)?;
                if block.0.is_empty() {
                    None
                } else {
                    Some(Statement::Compound(block))
                }
            }
            Statement::Break => Some(Statement::Break),
            Statement::Continue => Some(Statement::Continue),
            Statement::While(cond, body) => {
                let cond = self.folder.fold_expression(cond)?;
                if cond.get_imm().map(|c| !c.truth()).unwrap_or(false) {
                    return Ok(None);
                }
                let body = self.on_statement(*body)?.unwrap_or(Statement::Null);
                Some(Statement::While(cond, Box::new(body)))
            }
            Statement::DoWhile(body, cond) => {
                let cond = self.folder.fold_expression(cond)?;
                let body = self.on_statement(*body)?.unwrap_or(Statement::Null);
                // `do s while (false)` is s, once, unless s breaks out of
                // the loop itself.
                if cond.get_imm().map(|c| !c.truth()).unwrap_or(false)
                    && has_no_loop_jumps(&body)
                {
                    return Ok(Some(body));
                }
                Some(Statement::DoWhile(Box::new(body), cond))
            }
            Statement::For(init, cond, increment, body) => {
                let init = match *init {
                    ForInit::Decl(decls) => ForInit::Decl(
                        decls
                            .into_iter()
                            .map(|d| self.on_var_declaration(d))
                            .collect::<Result<Vec<_>>>()?,
                    ),
                    ForInit::Exp(e) => ForInit::Exp(
                        e.map(|e| self.folder.fold_expression(e)).transpose()?,
                    ),
                };
                let cond = cond
                    .map(|e| self.folder.fold_expression(e))
                    .transpose()?;
                let increment = increment
                    .map(|e| self.folder.fold_expression(e))
                    .transpose()?;
                let body = self.on_statement(*body)?.unwrap_or(Statement::Null);

                if cond
                    .as_ref()
                    .and_then(|c| c.get_imm())
                    .map(|c| !c.truth())
                    .unwrap_or(false)
                {
                    // The body never runs; only an initializer with effects
                    // survives.
                    return Ok(match init {
                        ForInit::Exp(Some(e)) if !self.folder.is_pure(&e) => {
                            Some(Statement::Expression(e))
                        }
                        _ => None,
                    });
                }

                Some(Statement::For(
                    Box::new(init),
                    cond,
                    increment,
                    Box::new(body),
                ))
            }
            Statement::Null => None,
        })
    }
}

fn always_terminates(stmt: &Statement) -> bool {
    match stmt {
        Statement::Return(_) | Statement::Break | Statement::Continue => true,
        Statement::Compound(block) => block.0.iter().any(|item| match item {
            BlockItem::S(s) => always_terminates(s),
            BlockItem::D(_) => false,
        }),
        Statement::If(_, then_stmt, Some(else_stmt)) => {
            always_terminates(then_stmt) && always_terminates(else_stmt)
        }
        _ => false,
    }
}

// A reduced do-while body may only replace the loop when it contains no
// break/continue that targeted it.
fn has_no_loop_jumps(stmt: &Statement) -> bool {
    match stmt {
        Statement::Break | Statement::Continue => false,
        Statement::Compound(block) => block.0.iter().all(|item| match item {
            BlockItem::S(s) => has_no_loop_jumps(s),
            BlockItem::D(_) => true,
        }),
        Statement::If(_, then_stmt, else_stmt) => {
            has_no_loop_jumps(then_stmt)
                && else_stmt
                    .as_ref()
                    .map(|s| has_no_loop_jumps(s))
                    .unwrap_or(true)
        }
        // Nested loops own their break/continue.
        _ => true,
    }
}

fn negate_condition(cond: Expression) -> Expression {
    let position = cond.get_position();
    let mask = cond.get_type().mask_type();
    let mut negated: Expression =
        Expr::Unary(UnaryOperator::Not, cond).at_position(position);
    negated.set_type(mask);
    negated
}

pub fn optimize_program(
    program: Program,
    symbols: &SymbolTable,
    reporter: &mut ErrorReporter,
) -> Result<Program> {
    AstOptimizer::new(symbols, reporter).on_program(program)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lexer::lex_input;
    use crate::parser::parse_tokens;
    use crate::semantic_analysis::analyze_program;

    fn optimized(source: &str) -> String {
        let mut symbols = SymbolTable::new();
        symbols.add_builtins();
        let mut reporter = ErrorReporter::new(source, None);
        let program = parse_tokens(lex_input(source).unwrap()).unwrap();
        let program = analyze_program(program, &mut symbols, &mut reporter).unwrap();
        let program = optimize_program(program, &symbols, &mut reporter).unwrap();
        format!("{}", program)
    }

    fn optimize_fails(source: &str) -> Error {
        let mut symbols = SymbolTable::new();
        symbols.add_builtins();
        let mut reporter = ErrorReporter::new(source, None);
        let program = parse_tokens(lex_input(source).unwrap()).unwrap();
        let program = analyze_program(program, &mut symbols, &mut reporter).unwrap();
        optimize_program(program, &symbols, &mut reporter).unwrap_err()
    }

    #[test]
    fn test_constant_branch_collapses() {
        let out = optimized("int main() { if (1 + 1 == 2) return 7; else return 9; }");
        assert!(out.contains("return 7;"));
        assert!(!out.contains("if"));
        assert!(!out.contains("9"));
    }

    #[test]
    fn test_folding_wraps_two_complement() {
        let out = optimized(&format!("int main() {{ return {} + 1; }}", i32::MAX));
        assert!(out.contains(&format!("return {};", i32::MIN)));
    }

    #[test]
    fn test_constant_division_by_zero_is_a_source_error() {
        assert_eq!(
            optimize_fails("int main() { return 1 / 0; }"),
            Error::InvalidArgument
        );
    }

    #[test]
    fn test_algebraic_identities() {
        let out = optimized(
            "int f(int x) { int a = x + 0; int b = a * 1; int c = b - b; return c; }\n\
             int main() { return f(3); }",
        );
        assert!(out.contains("int a = x;"));
        assert!(out.contains("int b = a;"));
        assert!(out.contains("int c = 0;"));
    }

    #[test]
    fn test_while_false_is_removed() {
        let out = optimized("int main() { int x = 1; while (false) { x = 2; } return x; }");
        assert!(!out.contains("while"));
        assert!(!out.contains("2"));
    }

    #[test]
    fn test_do_while_false_runs_once() {
        let out = optimized("int main() { int x = 1; do { x = x + 1; } while (false); return x; }");
        assert!(!out.contains("while"));
        assert!(out.contains("(x = (x + 1));"));
    }

    #[test]
    fn test_code_after_return_is_dropped() {
        let out = optimized("int main() { return 1; return 2; }");
        assert!(!out.contains("2"));
    }

    #[test]
    fn test_optimizer_is_idempotent() {
        let source = "int main() { int x = 3 * 4; if (x > 10) return x - 0; return 0; }";
        let mut symbols = SymbolTable::new();
        symbols.add_builtins();
        let mut reporter = ErrorReporter::new(source, None);
        let program = parse_tokens(lex_input(source).unwrap()).unwrap();
        let program = analyze_program(program, &mut symbols, &mut reporter).unwrap();
        let once = optimize_program(program, &symbols, &mut reporter).unwrap();
        let first = format!("{}", once);
        let twice = optimize_program(once, &symbols, &mut reporter).unwrap();
        assert_eq!(first, format!("{}", twice));
    }
}
