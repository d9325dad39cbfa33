//! Source-form printing of the AST.
//!
//! The output re-parses to the same tree (up to positions), which is what
//! the AST debug dumps and the reparse tests rely on. Compound expressions
//! are printed fully parenthesized so no precedence reasoning is needed.

use std::fmt::{self, Display, Formatter, Write};

use super::ast::*;

fn is_primary(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Imm(_) | Expr::Var(_) | Expr::Member(..) | Expr::Call(..) | Expr::Cast(..)
    )
}

fn write_operand(f: &mut Formatter<'_>, expr: &Expression) -> fmt::Result {
    if is_primary(expr.as_ref()) {
        write!(f, "{}", expr)
    } else {
        write!(f, "({})", expr)
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Imm(c) => write!(f, "{}", c),
            Expr::Var(ident) => write!(f, "{}", ident),
            Expr::Member(base, member) => {
                write_operand(f, base)?;
                write!(f, ".{}", member)
            }
            Expr::Cast(target, inner) => write!(f, "{}({})", target.strip(), inner),
            Expr::Unary(op, inner) => {
                write!(f, "{}", op)?;
                write_operand(f, inner)
            }
            Expr::Binary(op, left, right) => write!(f, "({} {} {})", left, op, right),
            Expr::Postfix(op, inner) => {
                write_operand(f, inner)?;
                write!(f, "{}", op)
            }
            Expr::Assignment(target, value) => write!(f, "({} = {})", target, value),
            Expr::CompoundAssignment(op, target, value) => {
                write!(f, "({} {}= {})", target, op, value)
            }
            Expr::Conditional(cond, then, other) => {
                write!(f, "({} ? {} : {})", cond, then, other)
            }
            Expr::Coalesce(left, right) => write!(f, "({} ?? {})", left, right),
            Expr::Call(name, args) => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn write_var_declaration(out: &mut String, decl: &VarDeclaration) {
    if decl.is_const {
        out.push_str("const ");
    }
    let _ = write!(out, "{} {}", decl.var_type.strip(), decl.name);
    if let Some(init) = &decl.init {
        let _ = write!(out, " = {}", init);
    }
}

fn write_block(out: &mut String, block: &Block, depth: usize) {
    out.push_str("{\n");
    for item in &block.0 {
        indent(out, depth + 1);
        match item {
            BlockItem::D(decl) => {
                write_var_declaration(out, decl);
                out.push_str(";\n");
            }
            BlockItem::S(stmt) => {
                write_statement(out, stmt, depth + 1);
                out.push('\n');
            }
        }
    }
    indent(out, depth);
    out.push('}');
}

fn write_statement(out: &mut String, stmt: &Statement, depth: usize) {
    match stmt {
        Statement::Return(Some(value)) => {
            let _ = write!(out, "return {};", value);
        }
        Statement::Return(None) => out.push_str("return;"),
        Statement::Expression(expr) => {
            let _ = write!(out, "{};", expr);
        }
        Statement::If(cond, then_stmt, else_stmt) => {
            let _ = write!(out, "if ({}) ", cond);
            write_statement(out, then_stmt, depth);
            if let Some(else_stmt) = else_stmt {
                out.push_str(" else ");
                write_statement(out, else_stmt, depth);
            }
        }
        Statement::Compound(block) => write_block(out, block, depth),
        Statement::Break => out.push_str("break;"),
        Statement::Continue => out.push_str("continue;"),
        Statement::While(cond, body) => {
            let _ = write!(out, "while ({}) ", cond);
            write_statement(out, body, depth);
        }
        Statement::DoWhile(body, cond) => {
            out.push_str("do ");
            write_statement(out, body, depth);
            let _ = write!(out, " while ({});", cond);
        }
        Statement::For(init, cond, increment, body) => {
            out.push_str("for (");
            match init.as_ref() {
                ForInit::Decl(decls) => {
                    for (i, decl) in decls.iter().enumerate() {
                        if i == 0 {
                            write_var_declaration(out, decl);
                        } else {
                            let _ = write!(out, ", {}", decl.name);
                            if let Some(init) = &decl.init {
                                let _ = write!(out, " = {}", init);
                            }
                        }
                    }
                    out.push(';');
                }
                ForInit::Exp(Some(expr)) => {
                    let _ = write!(out, "{};", expr);
                }
                ForInit::Exp(None) => out.push(';'),
            }
            if let Some(cond) = cond {
                let _ = write!(out, " {}", cond);
            }
            out.push(';');
            if let Some(increment) = increment {
                let _ = write!(out, " {}", increment);
            }
            out.push_str(") ");
            write_statement(out, body, depth);
        }
        Statement::Null => out.push(';'),
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        write_statement(&mut out, self, 0);
        f.write_str(&out)
    }
}

impl Display for FunctionDeclaration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.ret.strip(), self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        let mut out = String::new();
        write_block(&mut out, &self.body, 0);
        write!(f, ") {}", out)
    }
}

impl Display for Declaration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Declaration::Fn(function) => write!(f, "{}", function),
            Declaration::Var(decl) => {
                let mut out = String::new();
                write_var_declaration(&mut out, decl);
                write!(f, "{};", out)
            }
        }
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, declaration) in self.declarations.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", declaration)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::lexer::lex_input;
    use crate::parser::parse_tokens;

    fn round_trip(input: &str) -> (String, String) {
        let first = parse_tokens(lex_input(input).unwrap()).unwrap();
        let printed = format!("{}", first);
        let second = parse_tokens(lex_input(&printed).unwrap()).unwrap();
        (printed, format!("{}", second))
    }

    #[test]
    fn test_print_reparse_fixpoint() {
        let (first, second) = round_trip(
            "const float k = 0.5f;\n\
             float blend(float a, float b) { return a * k + b * (1.0f - k); }\n\
             void main() {\n\
             float t = 0f;\n\
             for (int i = 0; i < 4; ++i) { t += blend(t, 1.0f); }\n\
             while (t > 2.0f) { t -= 1.0f; }\n\
             if (t < 0.5f) t = -t; else t = t * 2.0f;\n\
             }",
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_nested_negation_stays_distinct() {
        let (first, second) = round_trip("void main() { int x = -(-3); int y = x-- - --x; }");
        assert_eq!(first, second);
        assert!(first.contains("-(-3)"));
    }
}
