mod analyzer;
pub mod scope;

pub use analyzer::{analyze_program, common_type, swizzle_lanes};
pub use scope::{Intrinsic, Symbol, SymbolData, SymbolTable};

#[cfg(test)]
mod test {
    use super::scope::SymbolTable;
    use super::*;
    use crate::common::{TypeInfo, TypeKind};
    use crate::errors::Error;
    use crate::layout::Layout;
    use crate::lexer::lex_input;
    use crate::output_log::ErrorReporter;
    use crate::parser::ast::{Expr, Program};
    use crate::parser::parse_tokens;

    fn float4_layout(name: &str) -> Layout {
        let mut layout = Layout::new();
        layout.configure(name).unwrap();
        layout.add("x", TypeInfo::float(), 0).unwrap();
        layout
            .add("v", TypeInfo::new(TypeKind::Float, 4), 16)
            .unwrap();
        layout
    }

    fn analyze(source: &str) -> Result<Program, Error> {
        let mut symbols = SymbolTable::new();
        symbols.add_builtins();
        symbols.add_argument_object(0, &float4_layout("in")).unwrap();
        let mut reporter = ErrorReporter::new(source, None);
        let program = parse_tokens(lex_input(source).unwrap())
            .map_err(|_| Error::InvalidArgument)?;
        analyze_program(program, &mut symbols, &mut reporter)
    }

    #[test]
    fn test_undefined_symbol() {
        assert_eq!(
            analyze("float main() { return q; }"),
            Err(Error::SymbolNotDefined)
        );
    }

    #[test]
    fn test_implicit_casts_are_inserted() {
        let program = analyze("double main() { int a = 2; return a + 0.5; }").unwrap();
        let main = program.function("main").unwrap();
        use crate::parser::ast::{BlockItem, Statement};
        let BlockItem::S(Statement::Return(Some(value))) = &main.body.0[1] else {
            panic!("expected return");
        };
        assert_eq!(value.get_type(), TypeInfo::double());
        let Expr::Binary(_, left, _) = value.as_ref() else {
            panic!("expected binary return value");
        };
        assert!(matches!(left.as_ref(), Expr::Cast(..)));
    }

    #[test]
    fn test_downward_conversion_is_rejected() {
        assert_eq!(
            analyze("int main() { return 1.5; }"),
            Err(Error::InvalidCast)
        );
    }

    #[test]
    fn test_vector_widths_must_match() {
        assert_eq!(
            analyze("void main() { float4 a = float4(in.x); float2 b = float2(0f); float4 c = a + b; }"),
            Err(Error::InvalidCast)
        );
    }

    #[test]
    fn test_scalar_splats_across_vectors() {
        let program = analyze("void main() { float4 a = in.v + 1.0f; in.v = a; }").unwrap();
        assert!(program.function("main").is_some());
    }

    #[test]
    fn test_swizzle_types() {
        let program =
            analyze("float2 main() { return in.v.wx; }").unwrap();
        assert!(program.function("main").is_some());
        assert_eq!(
            analyze("void main() { float q = in.v.q; }"),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn test_swizzle_is_not_an_lvalue() {
        assert_eq!(
            analyze("void main() { float4 a = in.v; a.xy = float2(0f); }"),
            Err(Error::InvalidAssignment)
        );
    }

    #[test]
    fn test_const_is_not_assignable() {
        assert_eq!(
            analyze("void main() { const int k = 1; k = 2; }"),
            Err(Error::InvalidAssignment)
        );
    }

    #[test]
    fn test_recursion_is_rejected() {
        assert_eq!(
            analyze(
                "int f(int n) { return g(n); }\n\
                 int g(int n) { return f(n); }\n\
                 void main() { int x = f(1); }"
            ),
            Err(Error::RecursionNotAllowed)
        );
    }

    #[test]
    fn test_coalesce_is_reserved() {
        assert_eq!(
            analyze("void main() { int a = 1; int b = a ?? 2; }"),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn test_missing_return_is_rejected() {
        assert_eq!(
            analyze("int main() { int x = 1; }"),
            Err(Error::InvalidState)
        );
    }
}
