use clap::Parser;
use std::{fs, process};

use mpsl::{BufferedLog, CompileArgs, Isolate, Layout, Options, Program, TypeInfo, TypeKind};

/// Compiles an MPSL source file against a demo layout and prints the
/// requested stage dumps.
#[derive(Debug, Parser)]
struct Cli {
    source_name: String,

    /// Log the AST before and after optimization.
    #[arg(long)]
    ast: bool,

    /// Log the IR before and after the IR pass.
    #[arg(long)]
    ir: bool,

    /// Log the generated assembly.
    #[arg(long)]
    asm: bool,

    #[arg(long)]
    verbose: bool,

    /// Restrict the backend to SSE2.
    #[arg(long)]
    no_sse41: bool,

    /// Skip the AST optimizer.
    #[arg(long)]
    no_optimize: bool,
}

fn demo_layout() -> Layout {
    let mut layout = Layout::new();
    layout.configure("in").unwrap();
    layout.add("x", TypeInfo::float(), 0).unwrap();
    layout.add("y", TypeInfo::float(), 4).unwrap();
    layout.add("z", TypeInfo::float(), 8).unwrap();
    layout.add("w", TypeInfo::float(), 12).unwrap();
    layout
        .add("v", TypeInfo::new(TypeKind::Float, 4), 16)
        .unwrap();
    layout
}

fn main() {
    let cli = Cli::parse();

    let source = fs::read_to_string(&cli.source_name).unwrap_or_else(|e| {
        eprintln!("{}: {}", cli.source_name, e);
        process::exit(1);
    });

    let mut options = Options::NONE;
    if cli.ast {
        options = options | Options::DEBUG_AST;
    }
    if cli.ir {
        options = options | Options::DEBUG_IR;
    }
    if cli.asm {
        options = options | Options::DEBUG_ASM;
    }
    if cli.verbose {
        options = options | Options::VERBOSE;
    }
    if cli.no_sse41 {
        options = options | Options::DISABLE_SSE4_1;
    }
    if cli.no_optimize {
        options = options | Options::DISABLE_OPTIMIZATIONS;
    }

    let layout = demo_layout();
    let layouts = [&layout];
    let args = CompileArgs::new(&source, &layouts).with_options(options);

    let isolate = Isolate::create();
    let program = Program::new();
    let mut log = BufferedLog::new();

    let result = isolate.compile(&program, &args, Some(&mut log));

    for message in &log.messages {
        println!("{}", message);
    }

    if let Err(code) = result {
        eprintln!("error: {}", code);
        process::exit(1);
    }
}
