//! Compile-and-run scenarios against the host-facing API.

use std::ffi::c_void;

use mpsl::{
    BufferedLog, CompileArgs, Error, Isolate, Layout, MessageKind, Options, Program, TypeInfo,
    TypeKind,
};

fn float_layout(name: &str) -> Layout {
    let mut layout = Layout::new();
    layout.configure(name).unwrap();
    layout.add("x", TypeInfo::float(), 0).unwrap();
    layout.add("y", TypeInfo::float(), 4).unwrap();
    layout
        .add("v", TypeInfo::new(TypeKind::Float, 4), 16)
        .unwrap();
    layout.add("n", TypeInfo::int(), 32).unwrap();
    layout.add("d", TypeInfo::double(), 40).unwrap();
    layout
}

#[repr(C)]
#[derive(Default, Clone, Copy, Debug)]
struct Record {
    x: f32,
    y: f32,
    _pad: [f32; 2],
    v: [f32; 4],
    n: i32,
    _pad2: i32,
    d: f64,
}

fn compile(source: &str, options: Options) -> Result<(Isolate, Program), Error> {
    let layout = float_layout("in");
    let layouts = [&layout];
    let isolate = Isolate::create();
    let program = Program::new();
    let args = CompileArgs::new(source, &layouts).with_options(options);
    isolate.compile(&program, &args, None)?;
    Ok((isolate, program))
}

unsafe fn run1(program: &Program, record: &mut Record, out: *mut c_void) {
    let mut args: [*mut c_void; 2] = [record as *mut Record as *mut c_void, out];
    program.run(args.as_mut_ptr());
}

fn run_f32(program: &Program, record: &mut Record) -> f32 {
    let mut out = 0.0f32;
    unsafe { run1(program, record, &mut out as *mut f32 as *mut c_void) };
    out
}

fn run_i32(program: &Program, record: &mut Record) -> i32 {
    let mut out = 0i32;
    unsafe { run1(program, record, &mut out as *mut i32 as *mut c_void) };
    out
}

fn run_f64(program: &Program, record: &mut Record) -> f64 {
    let mut out = 0.0f64;
    unsafe { run1(program, record, &mut out as *mut f64 as *mut c_void) };
    out
}

#[test]
fn test_identity() {
    let (_isolate, program) = compile("float main() { return in.x; }", Options::NONE).unwrap();
    let mut record = Record {
        x: 3.5,
        ..Default::default()
    };
    assert_eq!(run_f32(&program, &mut record), 3.5);
}

#[test]
fn test_vector_add_two_arguments() {
    let layout_a = {
        let mut l = Layout::new();
        l.configure("a").unwrap();
        l.add("v", TypeInfo::new(TypeKind::Float, 4), 0).unwrap();
        l
    };
    let layout_b = {
        let mut l = Layout::new();
        l.configure("b").unwrap();
        l.add("v", TypeInfo::new(TypeKind::Float, 4), 0).unwrap();
        l
    };
    let layouts = [&layout_a, &layout_b];
    let isolate = Isolate::create();
    let program = Program::new();
    let args = CompileArgs::new("float4 main() { return a.v + b.v; }", &layouts);
    isolate.compile(&program, &args, None).unwrap();

    let mut a = [1.0f32, 2.0, 3.0, 4.0];
    let mut b = [10.0f32, 20.0, 30.0, 40.0];
    let mut out = [0.0f32; 4];
    let mut ptrs: [*mut c_void; 3] = [
        a.as_mut_ptr() as *mut c_void,
        b.as_mut_ptr() as *mut c_void,
        out.as_mut_ptr() as *mut c_void,
    ];
    unsafe { program.run(ptrs.as_mut_ptr()) };
    assert_eq!(out, [11.0, 22.0, 33.0, 44.0]);
}

#[test]
fn test_constant_folded_branch_has_no_branches() {
    let layout = float_layout("in");
    let layouts = [&layout];
    let isolate = Isolate::create();
    let program = Program::new();
    let mut log = BufferedLog::new();
    let args = CompileArgs::new(
        "int main() { if (1 + 1 == 2) return 7; else return 9; }",
        &layouts,
    )
    .with_options(Options::DEBUG_IR);
    isolate.compile(&program, &args, Some(&mut log)).unwrap();

    let final_ir = log
        .of_kind(MessageKind::IrFinal)
        .next()
        .expect("IR dump requested");
    assert!(!final_ir.body.contains("branch"));

    let mut record = Record::default();
    assert_eq!(run_i32(&program, &mut record), 7);
}

#[test]
fn test_symbol_collision() {
    let mut layout = Layout::new();
    layout.configure("in").unwrap();
    layout.add("M_PI", TypeInfo::double(), 0).unwrap();
    let layouts = [&layout];

    let isolate = Isolate::create();
    let program = Program::new();
    let mut log = BufferedLog::new();
    let args = CompileArgs::new("void main() { }", &layouts);
    let result = isolate.compile(&program, &args, Some(&mut log));

    assert_eq!(result, Err(Error::SymbolCollision));
    assert!(log
        .of_kind(MessageKind::Error)
        .any(|m| m.body.contains("M_PI")));
    assert!(program.is_none());
}

#[test]
fn test_undefined_symbol_leaves_program_unchanged() {
    let result = compile("float main() { return q; }", Options::NONE);
    assert_eq!(result.err(), Some(Error::SymbolNotDefined));

    // Explicitly: the program handle still holds the previous (empty) state.
    let layout = float_layout("in");
    let layouts = [&layout];
    let isolate = Isolate::create();
    let program = Program::new();
    let args = CompileArgs::new("float main() { return q; }", &layouts);
    assert!(isolate.compile(&program, &args, None).is_err());
    assert!(program.is_none());
}

#[test]
fn test_num_args_bounds() {
    let isolate = Isolate::create();
    let program = Program::new();
    let args = CompileArgs::new("void main() { }", &[]);
    assert_eq!(
        isolate.compile(&program, &args, None),
        Err(Error::InvalidArgument)
    );

    let layout = float_layout("in");
    let too_many = [&layout; 5];
    let args = CompileArgs::new("void main() { }", &too_many);
    assert_eq!(
        isolate.compile(&program, &args, None),
        Err(Error::InvalidArgument)
    );
}

#[test]
fn test_determinism() {
    let (_isolate, program) = compile(
        "float main() { return sqrt(in.x * in.x + in.y * in.y); }",
        Options::NONE,
    )
    .unwrap();
    let mut record = Record {
        x: 3.0,
        y: 4.0,
        ..Default::default()
    };
    let first = run_f32(&program, &mut record).to_bits();
    let second = run_f32(&program, &mut record).to_bits();
    assert_eq!(first, second);
    assert_eq!(f32::from_bits(first), 5.0);
}

#[test]
fn test_optimizer_soundness() {
    let source = "float main() {\n\
                  float acc = 0f;\n\
                  for (int i = 0; i < 4; ++i) { acc += in.v.x + float(i) * 2.0f; }\n\
                  if (1 == 2) acc = 100.0f;\n\
                  return acc * 1.0f + 0.0f;\n\
                  }";
    let (_i1, optimized) = compile(source, Options::NONE).unwrap();
    let (_i2, unoptimized) = compile(source, Options::DISABLE_OPTIMIZATIONS).unwrap();

    for x in [0.0f32, 1.5, -2.25, 100.0] {
        let mut record = Record {
            v: [x, 0.0, 0.0, 0.0],
            ..Default::default()
        };
        let a = run_f32(&optimized, &mut record).to_bits();
        let b = run_f32(&unoptimized, &mut record).to_bits();
        assert_eq!(a, b, "diverged at {}", x);
    }
}

#[test]
fn test_loops_and_integer_ops() {
    let (_isolate, program) = compile(
        "int main() {\n\
         int total = 0;\n\
         for (int i = 1; i <= in.n; ++i) {\n\
         if (i % 3 == 0) continue;\n\
         total += i * i;\n\
         }\n\
         int sh = total << 1;\n\
         return sh / 2 - total % 7;\n\
         }",
        Options::NONE,
    )
    .unwrap();

    let mut record = Record {
        n: 10,
        ..Default::default()
    };
    // Sum of i*i for i in 1..=10 skipping multiples of 3: 1+4+16+25+49+64+100 = 259.
    assert_eq!(run_i32(&program, &mut record), 259 - 259 % 7);
}

#[test]
fn test_while_and_do_while() {
    let (_isolate, program) = compile(
        "int main() {\n\
         int n = in.n;\n\
         int steps = 0;\n\
         while (n > 1) {\n\
         if (n % 2 == 0) n = n / 2; else n = 3 * n + 1;\n\
         steps = steps + 1;\n\
         }\n\
         do { steps = steps + 100; } while (false);\n\
         return steps;\n\
         }",
        Options::NONE,
    )
    .unwrap();

    let mut record = Record {
        n: 6,
        ..Default::default()
    };
    // 6 -> 3 -> 10 -> 5 -> 16 -> 8 -> 4 -> 2 -> 1 is 8 steps.
    assert_eq!(run_i32(&program, &mut record), 108);
}

#[test]
fn test_swizzles_and_writeback() {
    let layout = float_layout("in");
    let layouts = [&layout];
    let isolate = Isolate::create();
    let program = Program::new();
    let args = CompileArgs::new(
        "void main() { float4 t = in.v.wzyx; in.v = t * 2.0f; }",
        &layouts,
    );
    isolate.compile(&program, &args, None).unwrap();

    let mut record = Record {
        v: [1.0, 2.0, 3.0, 4.0],
        ..Default::default()
    };
    let mut ptrs: [*mut c_void; 1] = [&mut record as *mut Record as *mut c_void];
    unsafe { program.run(ptrs.as_mut_ptr()) };
    assert_eq!(record.v, [8.0, 6.0, 4.0, 2.0]);
}

#[test]
fn test_intrinsics() {
    let (_isolate, program) = compile(
        "float main() {\n\
         float4 a = float4(1.0f, 2.0f, 3.0f, 4.0f);\n\
         float4 b = float4(0.5f, 0.5f, 0.5f, 0.5f);\n\
         float d = dot(a, b);\n\
         float m = max(abs(0f - in.x), min(in.y, 2.0f));\n\
         return d + m + pow(2.0f, 3.0f);\n\
         }",
        Options::NONE,
    )
    .unwrap();

    let mut record = Record {
        x: -1.5,
        y: 7.0,
        ..Default::default()
    };
    // dot = 5, max(1.5, 2) = 2, pow = 8.
    assert_eq!(run_f32(&program, &mut record), 15.0);
}

#[test]
fn test_cross_and_length() {
    let (_isolate, program) = compile(
        "float main() {\n\
         float3 a = float3(1.0f, 0.0f, 0.0f);\n\
         float3 b = float3(0.0f, 1.0f, 0.0f);\n\
         float3 c = cross(a, b);\n\
         return length(c) + c.z;\n\
         }",
        Options::NONE,
    )
    .unwrap();
    let mut record = Record::default();
    assert_eq!(run_f32(&program, &mut record), 2.0);
}

#[test]
fn test_double_arithmetic() {
    let (_isolate, program) = compile(
        "double main() { return in.d * 2.0 + 0.25; }",
        Options::NONE,
    )
    .unwrap();
    let mut record = Record {
        d: 1.5,
        ..Default::default()
    };
    assert_eq!(run_f64(&program, &mut record), 3.25);
}

#[test]
fn test_vector_select() {
    for options in [Options::NONE, Options::DISABLE_SSE4_1] {
        let (_isolate, program) = compile(
            "float4 main() {\n\
             float4 v = in.v;\n\
             float4 hi = float4(1.0f, 1.0f, 1.0f, 1.0f);\n\
             return v < hi ? v : hi;\n\
             }",
            options,
        )
        .unwrap();

        let mut record = Record {
            v: [0.5, 3.0, -1.0, 1.0],
            ..Default::default()
        };
        let mut out = [0.0f32; 4];
        let mut ptrs: [*mut c_void; 2] = [
            &mut record as *mut Record as *mut c_void,
            out.as_mut_ptr() as *mut c_void,
        ];
        unsafe { program.run(ptrs.as_mut_ptr()) };
        assert_eq!(out, [0.5, 1.0, -1.0, 1.0]);
    }
}

#[test]
fn test_sse2_only_integer_multiply() {
    for options in [Options::NONE, Options::DISABLE_SSE4_1] {
        let layout = {
            let mut l = Layout::new();
            l.configure("io").unwrap();
            l.add("v", TypeInfo::new(TypeKind::Int, 4), 0).unwrap();
            l
        };
        let layouts = [&layout];
        let isolate = Isolate::create();
        let program = Program::new();
        let args = CompileArgs::new("void main() { io.v = io.v * io.v; }", &layouts)
            .with_options(options);
        isolate.compile(&program, &args, None).unwrap();

        let mut v = [3i32, -4, 100000, 7];
        let mut ptrs: [*mut c_void; 1] = [v.as_mut_ptr() as *mut c_void];
        unsafe { program.run(ptrs.as_mut_ptr()) };
        assert_eq!(v, [9, 16, 10000000000i64 as i32, 49]);
    }
}

#[test]
fn test_user_functions_are_inlined() {
    let (_isolate, program) = compile(
        "float scale(float v, float k) { return v * k; }\n\
         float shift(float v) { return scale(v, 2.0f) + 1.0f; }\n\
         float main() { return shift(in.x); }",
        Options::NONE,
    )
    .unwrap();
    let mut record = Record {
        x: 4.0,
        ..Default::default()
    };
    assert_eq!(run_f32(&program, &mut record), 9.0);
}

#[test]
fn test_recursion_is_rejected() {
    let result = compile(
        "int f(int n) { return n <= 1 ? 1 : n * f(n - 1); }\n\
         int main() { return f(5); }",
        Options::NONE,
    );
    assert_eq!(result.err(), Some(Error::RecursionNotAllowed));
}

#[test]
fn test_read_only_member_rejects_writes() {
    let mut layout = Layout::new();
    layout.configure("in").unwrap();
    layout.add("k", TypeInfo::float().with_ro(), 0).unwrap();
    let layouts = [&layout];
    let isolate = Isolate::create();
    let program = Program::new();
    let args = CompileArgs::new("void main() { in.k = 1.0f; }", &layouts);
    assert_eq!(
        isolate.compile(&program, &args, None),
        Err(Error::InvalidAssignment)
    );
}

#[test]
fn test_recompile_reuses_program_handle() {
    let layout = float_layout("in");
    let layouts = [&layout];
    let isolate = Isolate::create();
    let program = Program::new();

    let args = CompileArgs::new("int main() { return 1; }", &layouts);
    isolate.compile(&program, &args, None).unwrap();
    let mut record = Record::default();
    assert_eq!(run_i32(&program, &mut record), 1);

    let args = CompileArgs::new("int main() { return 2; }", &layouts);
    isolate.compile(&program, &args, None).unwrap();
    assert_eq!(run_i32(&program, &mut record), 2);
}

#[test]
fn test_shared_programs_run_concurrently() {
    let (_isolate, program) = compile(
        "float main() { return in.x * in.x; }",
        Options::NONE,
    )
    .unwrap();

    let threads: Vec<_> = (0..4)
        .map(|i| {
            let copy = program.clone();
            std::thread::spawn(move || {
                let mut record = Record {
                    x: i as f32,
                    ..Default::default()
                };
                run_f32(&copy, &mut record)
            })
        })
        .collect();

    for (i, thread) in threads.into_iter().enumerate() {
        assert_eq!(thread.join().unwrap(), (i * i) as f32);
    }
}
