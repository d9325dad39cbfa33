//! Runtime math table.
//!
//! The JIT calls these shims through an absolute address loaded into a
//! register; they follow the C ABI, so the emitted call sequence is an
//! ordinary indirect call with xmm argument registers.

use crate::ir::MathFn;

pub extern "C" fn mpsl_powf(a: f32, b: f32) -> f32 {
    a.powf(b)
}

pub extern "C" fn mpsl_pow(a: f64, b: f64) -> f64 {
    a.powf(b)
}

pub extern "C" fn mpsl_expf(a: f32) -> f32 {
    a.exp()
}

pub extern "C" fn mpsl_exp(a: f64) -> f64 {
    a.exp()
}

pub extern "C" fn mpsl_logf(a: f32) -> f32 {
    a.ln()
}

pub extern "C" fn mpsl_log(a: f64) -> f64 {
    a.ln()
}

pub extern "C" fn mpsl_sinf(a: f32) -> f32 {
    a.sin()
}

pub extern "C" fn mpsl_sin(a: f64) -> f64 {
    a.sin()
}

pub extern "C" fn mpsl_cosf(a: f32) -> f32 {
    a.cos()
}

pub extern "C" fn mpsl_cos(a: f64) -> f64 {
    a.cos()
}

/// Entry address for a math function at the requested precision.
pub fn address(func: MathFn, double: bool) -> usize {
    match (func, double) {
        (MathFn::Pow, false) => mpsl_powf as extern "C" fn(f32, f32) -> f32 as usize,
        (MathFn::Pow, true) => mpsl_pow as extern "C" fn(f64, f64) -> f64 as usize,
        (MathFn::Exp, false) => mpsl_expf as extern "C" fn(f32) -> f32 as usize,
        (MathFn::Exp, true) => mpsl_exp as extern "C" fn(f64) -> f64 as usize,
        (MathFn::Log, false) => mpsl_logf as extern "C" fn(f32) -> f32 as usize,
        (MathFn::Log, true) => mpsl_log as extern "C" fn(f64) -> f64 as usize,
        (MathFn::Sin, false) => mpsl_sinf as extern "C" fn(f32) -> f32 as usize,
        (MathFn::Sin, true) => mpsl_sin as extern "C" fn(f64) -> f64 as usize,
        (MathFn::Cos, false) => mpsl_cosf as extern "C" fn(f32) -> f32 as usize,
        (MathFn::Cos, true) => mpsl_cos as extern "C" fn(f64) -> f64 as usize,
    }
}
