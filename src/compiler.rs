//! The compilation pipeline driver.
//!
//! Source text runs through the lexer, parser, semantic analysis, the AST
//! optimizer, IR lowering and cleanup, and the x86-64 backend; the resulting
//! code is installed into the target `Program`. Every stage consumes the
//! previous stage's output completely and all intermediate artifacts are
//! dropped when compilation ends, successfully or not.

use crate::backend_x64::compile_function;
use crate::common::MAX_ARGUMENTS_COUNT;
use crate::errors::{Error, Result};
use crate::ir::{lower_program, run_pass};
use crate::layout::Layout;
use crate::lexer::lex_input;
use crate::optimizer::optimize_program;
use crate::output_log::{ErrorReporter, MessageKind, OutputLog};
use crate::parser::parse_tokens;
use crate::runtime::{Isolate, Program};
use crate::semantic_analysis::{analyze_program, SymbolTable};

/// Compilation option bits. Unknown bits are silently masked off.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Options(u32);

impl Options {
    pub const NONE: Options = Options(0);
    /// Human-readable stage progress to the log.
    pub const VERBOSE: Options = Options(0x01);
    /// Log the AST before and after optimization.
    pub const DEBUG_AST: Options = Options(0x02);
    /// Log the IR before and after the IR pass.
    pub const DEBUG_IR: Options = Options(0x04);
    /// Log the backend's assembly listing.
    pub const DEBUG_ASM: Options = Options(0x08);
    /// Restrict the backend to SSE2.
    pub const DISABLE_SSE4_1: Options = Options(0x10);
    /// Skip the AST optimizer (the IR cleanup pass still runs).
    pub const DISABLE_OPTIMIZATIONS: Options = Options(0x20);

    const MASK: u32 = 0x3F;
    const DEBUG_BITS: u32 = 0x0F;

    pub fn contains(&self, other: Options) -> bool {
        self.0 & other.0 == other.0
    }

    fn masked(&self) -> Options {
        Options(self.0 & Self::MASK)
    }

    fn without_debug(&self) -> Options {
        Options(self.0 & !Self::DEBUG_BITS)
    }
}

impl std::ops::BitOr for Options {
    type Output = Options;
    fn bitor(self, rhs: Options) -> Options {
        Options(self.0 | rhs.0)
    }
}

/// Everything `compile` needs besides the target program: the source body,
/// one layout per argument slot, and options.
pub struct CompileArgs<'a> {
    pub body: &'a str,
    pub layouts: &'a [&'a Layout],
    pub options: Options,
}

impl<'a> CompileArgs<'a> {
    pub fn new(body: &'a str, layouts: &'a [&'a Layout]) -> Self {
        Self {
            body,
            layouts,
            options: Options::NONE,
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }
}

impl Isolate {
    /// Compiles `args.body` against the argument layouts and installs the
    /// result into `program`. On any error the program is left untouched.
    ///
    /// Handles may be shared across threads, but compiling into a program
    /// that another thread is concurrently running or compiling requires
    /// external synchronization; the handle swap itself is atomic.
    pub fn compile<'a>(
        &self,
        program: &Program,
        args: &CompileArgs<'a>,
        log: Option<&'a mut dyn OutputLog>,
    ) -> Result<()> {
        if self.is_none() {
            return Err(Error::InvalidState);
        }
        if args.layouts.is_empty() || args.layouts.len() > MAX_ARGUMENTS_COUNT {
            return Err(Error::InvalidArgument);
        }

        let options = if log.is_some() {
            args.options.masked()
        } else {
            args.options.masked().without_debug()
        };

        // Built-ins exist before parsing; argument objects are injected
        // here so collisions surface before any source is read.
        let mut symbols = SymbolTable::new();
        symbols.add_builtins();

        let mut reporter = ErrorReporter::new(args.body, log);

        for (slot, layout) in args.layouts.iter().enumerate() {
            if let Err((code, name)) = symbols.add_argument_object(slot as u32, layout) {
                if code == Error::SymbolCollision {
                    reporter.info(
                        MessageKind::Error,
                        format!("Built-in symbol collision: '{}' already defined", name),
                    );
                }
                return Err(code);
            }
        }

        let verbose = options.contains(Options::VERBOSE);
        if verbose {
            reporter.info(MessageKind::Info, "[mpsl] parsing");
        }

        let tokens = lex_input(args.body).map_err(|e| {
            reporter.on_error(
                Error::InvalidArgument,
                e.position,
                format!("unexpected character '{}'", e.character),
            )
        })?;

        let program_ast = parse_tokens(tokens).map_err(|e| {
            reporter.on_error(Error::InvalidArgument, e.position(), e.to_string())
        })?;

        if verbose {
            reporter.info(MessageKind::Info, "[mpsl] analyzing");
        }

        let program_ast = analyze_program(program_ast, &mut symbols, &mut reporter)?;

        if options.contains(Options::DEBUG_AST) {
            reporter.info(MessageKind::AstInitial, format!("{}", program_ast));
        }

        let program_ast = if options.contains(Options::DISABLE_OPTIMIZATIONS) {
            program_ast
        } else {
            if verbose {
                reporter.info(MessageKind::Info, "[mpsl] optimizing");
            }
            optimize_program(program_ast, &symbols, &mut reporter)?
        };

        if options.contains(Options::DEBUG_AST) {
            reporter.info(MessageKind::AstFinal, format!("{}", program_ast));
        }

        if verbose {
            reporter.info(MessageKind::Info, "[mpsl] lowering");
        }

        let mut ir = lower_program(&program_ast, &symbols, args.layouts.len() as u32)?;

        if options.contains(Options::DEBUG_IR) {
            reporter.info(MessageKind::IrInitial, format!("{}", ir));
        }

        run_pass(&mut ir);

        if options.contains(Options::DEBUG_IR) {
            reporter.info(MessageKind::IrFinal, format!("{}", ir));
        }

        if verbose {
            reporter.info(MessageKind::Info, "[mpsl] emitting machine code");
        }

        let sse41 = !options.contains(Options::DISABLE_SSE4_1);
        let (code, listing) = compile_function(&ir, sse41)?;

        if options.contains(Options::DEBUG_ASM) {
            reporter.info(MessageKind::Asm, listing);
        }

        program.install(self.runtime_data(), &code)
    }
}
