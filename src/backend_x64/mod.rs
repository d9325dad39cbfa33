pub mod asm_ast;
mod encode;
mod fixup;
pub mod math;
mod regalloc;
mod stack;
mod translate;

use crate::errors::{Error, Result};
use crate::ir::IrFunction;

/// Lowers cleaned IR to machine code: instruction selection, linear-scan
/// register allocation, stack-frame assignment, operand legalization and
/// byte encoding. Returns the code bytes plus a listing for `DebugASM`.
pub fn compile_function(func: &IrFunction, sse41: bool) -> Result<(Vec<u8>, String)> {
    let mut asm = translate::translate(func, sse41);
    regalloc::allocate_registers(&mut asm, func);
    stack::assign_stack(&mut asm, func);
    fixup::fixup_instructions(&mut asm);

    let listing = asm
        .instructions
        .iter()
        .map(|inst| format!("{}", inst))
        .collect::<Vec<_>>()
        .join("\n");

    let code = encode::encode_function(&asm)?;
    if code.is_empty() {
        return Err(Error::JITFailed);
    }
    Ok((code, listing))
}
