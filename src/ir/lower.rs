//! AST to IR lowering.
//!
//! The whole program becomes one linear function. User function calls are
//! inlined (the analyzer has already rejected recursion), so the IR contains
//! no calls apart from runtime math functions. `main`'s return value, when it
//! has one, is stored through the hidden output pointer `args[num_args]`.

use std::collections::HashMap;

use super::*;
use crate::common::{Constant, TypeInfo, TypeKind};
use crate::errors::Error;
use crate::parser::ast::*;
use crate::semantic_analysis::{swizzle_lanes, Intrinsic, SymbolData, SymbolTable};

type Result<T> = std::result::Result<T, Error>;

// Inlining depth backstop; the analyzer's recursion check makes this
// unreachable for accepted programs.
const MAX_INLINE_DEPTH: usize = 32;

fn sel(l0: u32, l1: u32, l2: u32, l3: u32) -> u32 {
    l0 | (l1 << 2) | (l2 << 4) | (l3 << 6)
}

enum Place {
    Local(SlotId),
    Mem(u32, i32, TypeInfo),
}

struct Lowerer<'a> {
    program: &'a Program,
    symbols: &'a SymbolTable,
    func: IrFunction,
    current: BlockId,
    terminated: bool,
    vars: Vec<HashMap<String, SlotId>>,
    /// (continue target, break target) of the innermost loops.
    loops: Vec<(BlockId, BlockId)>,
    /// (result slot, join block) of active inline expansions.
    inline: Vec<(Option<SlotId>, BlockId)>,
}

impl<'a> Lowerer<'a> {
    fn new(program: &'a Program, symbols: &'a SymbolTable, num_args: u32) -> Self {
        Self {
            program,
            symbols,
            func: IrFunction {
                blocks: vec![IrBlock {
                    insts: vec![],
                    term: IrTerm::Ret,
                }],
                slots: vec![],
                num_args,
            },
            current: 0,
            terminated: false,
            vars: vec![HashMap::new()],
            loops: vec![],
            inline: vec![],
        }
    }

    fn new_slot(&mut self, type_info: TypeInfo) -> SlotId {
        self.func.slots.push(SlotInfo {
            type_info: type_info.strip(),
            spilled: false,
        });
        self.func.slots.len() - 1
    }

    fn new_block(&mut self) -> BlockId {
        self.func.blocks.push(IrBlock {
            insts: vec![],
            term: IrTerm::Ret,
        });
        self.func.blocks.len() - 1
    }

    fn start(&mut self, block: BlockId) {
        self.current = block;
        self.terminated = false;
    }

    fn emit(&mut self, inst: IrInst) {
        if self.terminated {
            // Unreachable source code still lowers somewhere; the IR pass
            // sweeps the orphan block away.
            let block = self.new_block();
            self.start(block);
        }
        self.func.blocks[self.current].insts.push(inst);
    }

    fn set_term(&mut self, term: IrTerm) {
        if !self.terminated {
            self.func.blocks[self.current].term = term;
            self.terminated = true;
        }
    }

    fn imm(&mut self, value: Constant) -> SlotId {
        let slot = self.new_slot(value.type_info());
        self.emit(IrInst::Imm(slot, value));
        slot
    }

    fn lookup_var(&self, name: &str) -> Option<SlotId> {
        self.vars.iter().rev().find_map(|scope| scope.get(name)).copied()
    }

    fn place(&mut self, expr: &Expression) -> Result<Place> {
        match expr.as_ref() {
            Expr::Var(ident) => {
                if let Some(slot) = self.lookup_var(&ident.name) {
                    return Ok(Place::Local(slot));
                }
                match self
                    .symbols
                    .lookup(SymbolTable::ROOT, &ident.name)
                    .map(|id| self.symbols.get(id))
                {
                    Some(symbol) => match &symbol.data {
                        SymbolData::Member(member) => Ok(Place::Mem(
                            member.slot,
                            member.offset,
                            symbol.type_info.strip(),
                        )),
                        _ => Err(Error::InvalidState),
                    },
                    None => Err(Error::InvalidState),
                }
            }
            Expr::Member(base, member) => {
                let Some(object) = base.get_var_name() else {
                    return Err(Error::InvalidState);
                };
                let Some(id) = self.symbols.lookup(SymbolTable::ROOT, object) else {
                    return Err(Error::InvalidState);
                };
                match &self.symbols.get(id).data {
                    SymbolData::Argument(arg) => {
                        let &(type_info, offset) = arg
                            .members
                            .get(&member.name)
                            .ok_or(Error::InvalidState)?;
                        Ok(Place::Mem(arg.slot, offset, type_info.strip()))
                    }
                    _ => Err(Error::InvalidState),
                }
            }
            _ => Err(Error::InvalidState),
        }
    }

    fn read_place(&mut self, place: &Place) -> SlotId {
        match place {
            Place::Local(slot) => *slot,
            Place::Mem(index, offset, type_info) => {
                let ptr = self.new_slot(TypeInfo::ptr());
                self.emit(IrInst::FetchArg(ptr, *index));
                let dst = self.new_slot(*type_info);
                self.emit(IrInst::Load(dst, ptr, *offset));
                dst
            }
        }
    }

    fn write_place(&mut self, place: &Place, value: SlotId) {
        match place {
            Place::Local(slot) => self.emit(IrInst::Mov(*slot, value)),
            Place::Mem(index, offset, _) => {
                let ptr = self.new_slot(TypeInfo::ptr());
                self.emit(IrInst::FetchArg(ptr, *index));
                self.emit(IrInst::Store(ptr, *offset, value));
            }
        }
    }

    /// Kind and width changes between slot types; splats go through a
    /// scalar conversion first.
    fn convert(&mut self, src: SlotId, to: TypeInfo) -> SlotId {
        let from = self.func.slot_type(src).strip();
        let to = to.strip();
        if from == to {
            return src;
        }

        if from.width() == 1 && to.width() > 1 {
            let scalar = TypeInfo::scalar(to.kind());
            let src = if from.kind() != to.kind() {
                let converted = self.new_slot(scalar);
                self.emit(IrInst::Cast(converted, src));
                converted
            } else {
                src
            };
            let dst = self.new_slot(to);
            self.emit(IrInst::Splat(dst, src));
            return dst;
        }

        let dst = self.new_slot(to);
        self.emit(IrInst::Cast(dst, src));
        dst
    }

    // ----- statements -------------------------------------------------

    fn block(&mut self, block: &'a Block) -> Result<()> {
        self.vars.push(HashMap::new());
        for item in &block.0 {
            match item {
                BlockItem::D(decl) => self.var_declaration(decl)?,
                BlockItem::S(stmt) => self.statement(stmt)?,
            }
        }
        self.vars.pop();
        Ok(())
    }

    fn var_declaration(&mut self, decl: &'a VarDeclaration) -> Result<()> {
        let type_info = decl.var_type.strip();
        let slot = self.new_slot(type_info);

        let value = match &decl.init {
            Some(init) => self.expression(init)?,
            None => {
                let zero = Constant::int(0).convert_to(type_info);
                self.imm(zero)
            }
        };
        self.emit(IrInst::Mov(slot, value));

        self.vars
            .last_mut()
            .unwrap()
            .insert(decl.name.name.clone(), slot);
        Ok(())
    }

    fn statement(&mut self, stmt: &'a Statement) -> Result<()> {
        match stmt {
            Statement::Null => {}
            Statement::Expression(expr) => {
                self.expression(expr)?;
            }
            Statement::Return(value) => self.lower_return(value.as_ref())?,
            Statement::Compound(block) => self.block(block)?,
            Statement::If(cond, then_stmt, else_stmt) => {
                let cond = self.expression(cond)?;
                let then_block = self.new_block();
                let join = self.new_block();
                let else_block = match else_stmt {
                    Some(_) => self.new_block(),
                    None => join,
                };

                self.set_term(IrTerm::Branch(cond, then_block, else_block));

                self.start(then_block);
                self.statement(then_stmt)?;
                self.set_term(IrTerm::Jmp(join));

                if let Some(else_stmt) = else_stmt {
                    self.start(else_block);
                    self.statement(else_stmt)?;
                    self.set_term(IrTerm::Jmp(join));
                }

                self.start(join);
            }
            Statement::While(cond, body) => {
                let cond_block = self.new_block();
                let body_block = self.new_block();
                let exit = self.new_block();

                self.set_term(IrTerm::Jmp(cond_block));
                self.start(cond_block);
                let cond = self.expression(cond)?;
                self.set_term(IrTerm::Branch(cond, body_block, exit));

                self.loops.push((cond_block, exit));
                self.start(body_block);
                self.statement(body)?;
                self.set_term(IrTerm::Jmp(cond_block));
                self.loops.pop();

                self.start(exit);
            }
            Statement::DoWhile(body, cond) => {
                let body_block = self.new_block();
                let cond_block = self.new_block();
                let exit = self.new_block();

                self.set_term(IrTerm::Jmp(body_block));

                self.loops.push((cond_block, exit));
                self.start(body_block);
                self.statement(body)?;
                self.set_term(IrTerm::Jmp(cond_block));
                self.loops.pop();

                self.start(cond_block);
                let cond = self.expression(cond)?;
                self.set_term(IrTerm::Branch(cond, body_block, exit));

                self.start(exit);
            }
            Statement::For(init, cond, increment, body) => {
                self.vars.push(HashMap::new());
                match init.as_ref() {
                    ForInit::Decl(decls) => {
                        for decl in decls {
                            self.var_declaration(decl)?;
                        }
                    }
                    ForInit::Exp(Some(expr)) => {
                        self.expression(expr)?;
                    }
                    ForInit::Exp(None) => {}
                }

                let cond_block = self.new_block();
                let body_block = self.new_block();
                let increment_block = self.new_block();
                let exit = self.new_block();

                self.set_term(IrTerm::Jmp(cond_block));
                self.start(cond_block);
                match cond {
                    Some(cond) => {
                        let cond = self.expression(cond)?;
                        self.set_term(IrTerm::Branch(cond, body_block, exit));
                    }
                    None => self.set_term(IrTerm::Jmp(body_block)),
                }

                self.loops.push((increment_block, exit));
                self.start(body_block);
                self.statement(body)?;
                self.set_term(IrTerm::Jmp(increment_block));
                self.loops.pop();

                self.start(increment_block);
                if let Some(increment) = increment {
                    self.expression(increment)?;
                }
                self.set_term(IrTerm::Jmp(cond_block));

                self.vars.pop();
                self.start(exit);
            }
            Statement::Break => {
                let (_, exit) = *self.loops.last().ok_or(Error::InvalidState)?;
                self.set_term(IrTerm::Jmp(exit));
            }
            Statement::Continue => {
                let (target, _) = *self.loops.last().ok_or(Error::InvalidState)?;
                self.set_term(IrTerm::Jmp(target));
            }
        }
        Ok(())
    }

    fn lower_return(&mut self, value: Option<&'a Expression>) -> Result<()> {
        if let Some(&(result, join)) = self.inline.last() {
            if let (Some(result), Some(value)) = (result, value) {
                let slot = self.expression(value)?;
                self.emit(IrInst::Mov(result, slot));
            }
            self.set_term(IrTerm::Jmp(join));
            return Ok(());
        }

        if let Some(value) = value {
            let slot = self.expression(value)?;
            let ptr = self.new_slot(TypeInfo::ptr());
            self.emit(IrInst::FetchArg(ptr, self.func.num_args));
            self.emit(IrInst::Store(ptr, 0, slot));
        }
        self.set_term(IrTerm::Ret);
        Ok(())
    }

    // ----- expressions ------------------------------------------------

    fn expression(&mut self, expr: &'a Expression) -> Result<SlotId> {
        let result_type = expr.get_type().strip();
        match expr.as_ref() {
            Expr::Imm(value) => Ok(self.imm(*value)),
            Expr::Var(_) => {
                let place = self.place(expr)?;
                Ok(self.read_place(&place))
            }
            Expr::Member(base, member) => {
                // Argument member access loads from the host record; any
                // other member is a swizzle of a vector value.
                if base.get_type().kind() == TypeKind::Ptr {
                    let place = self.place(expr)?;
                    return Ok(self.read_place(&place));
                }
                let src = self.expression(base)?;
                let lanes = swizzle_lanes(&member.name, base.get_type().width())
                    .ok_or(Error::InvalidState)?;
                Ok(self.swizzle(src, &lanes, result_type))
            }
            Expr::Cast(target, inner) => {
                let src = self.expression(inner)?;
                Ok(self.convert(src, *target))
            }
            Expr::Unary(op, inner) => self.unary(*op, inner, result_type),
            Expr::Binary(op, left, right) => self.binary(*op, left, right, result_type),
            Expr::Postfix(op, inner) => {
                let place = self.place(inner)?;
                let old = self.read_place(&place);
                let kept = self.new_slot(result_type);
                self.emit(IrInst::Mov(kept, old));

                let one = self.one_for(result_type);
                let new = self.new_slot(result_type);
                let ir_op = match op {
                    PostfixOperator::Increment => IrBinaryOp::Add,
                    PostfixOperator::Decrement => IrBinaryOp::Sub,
                };
                self.emit(IrInst::Binary(ir_op, new, old, one));
                self.write_place(&place, new);
                Ok(kept)
            }
            Expr::Assignment(target, value) => {
                let place = self.place(target)?;
                let value = self.expression(value)?;
                self.write_place(&place, value);
                Ok(value)
            }
            Expr::CompoundAssignment(op, target, value) => {
                let place = self.place(target)?;
                let target_type = target.get_type().strip();
                let old = self.read_place(&place);
                let value_slot = self.expression(value)?;

                let compute = if op.is_shift() {
                    target_type
                } else {
                    self.func.slot_type(value_slot).strip()
                };
                let old = self.convert(old, compute);
                let result = self.new_slot(compute);
                self.emit(IrInst::Binary(binary_op(*op)?, result, old, value_slot));
                let stored = self.convert(result, target_type);
                self.write_place(&place, stored);
                Ok(stored)
            }
            Expr::Conditional(cond, then_arm, else_arm) => {
                if cond.get_type().is_vector() {
                    let mask = self.expression(cond)?;
                    let a = self.expression(then_arm)?;
                    let b = self.expression(else_arm)?;
                    let dst = self.new_slot(result_type);
                    self.emit(IrInst::Select(dst, mask, a, b));
                    return Ok(dst);
                }

                let cond = self.expression(cond)?;
                let result = self.new_slot(result_type);
                let then_block = self.new_block();
                let else_block = self.new_block();
                let join = self.new_block();

                self.set_term(IrTerm::Branch(cond, then_block, else_block));

                self.start(then_block);
                let a = self.expression(then_arm)?;
                self.emit(IrInst::Mov(result, a));
                self.set_term(IrTerm::Jmp(join));

                self.start(else_block);
                let b = self.expression(else_arm)?;
                self.emit(IrInst::Mov(result, b));
                self.set_term(IrTerm::Jmp(join));

                self.start(join);
                Ok(result)
            }
            Expr::Coalesce(..) => Err(Error::InvalidState),
            Expr::Call(name, args) => self.call(name, args, result_type),
        }
    }

    fn one_for(&mut self, type_info: TypeInfo) -> SlotId {
        let one = Constant::int(1).convert_to(type_info);
        self.imm(one)
    }

    fn swizzle(&mut self, src: SlotId, lanes: &[u32], result_type: TypeInfo) -> SlotId {
        if lanes.len() == 1 {
            let src = if lanes[0] != 0 {
                let moved = self.new_slot(self.func.slot_type(src));
                self.emit(IrInst::Shuffle(moved, src, sel(lanes[0], 0, 0, 0)));
                moved
            } else {
                src
            };
            let dst = self.new_slot(result_type);
            self.emit(IrInst::First(dst, src));
            return dst;
        }

        let mut packed = [0u32; 4];
        for (i, &lane) in lanes.iter().enumerate() {
            packed[i] = lane;
        }
        let dst = self.new_slot(result_type);
        self.emit(IrInst::Shuffle(
            dst,
            src,
            sel(packed[0], packed[1], packed[2], packed[3]),
        ));
        dst
    }

    fn unary(
        &mut self,
        op: UnaryOperator,
        inner: &'a Expression,
        result_type: TypeInfo,
    ) -> Result<SlotId> {
        match op {
            UnaryOperator::Negate => {
                let src = self.expression(inner)?;
                let dst = self.new_slot(result_type);
                self.emit(IrInst::Unary(IrUnaryOp::Neg, dst, src));
                Ok(dst)
            }
            UnaryOperator::Complement => {
                let src = self.expression(inner)?;
                let dst = self.new_slot(result_type);
                self.emit(IrInst::Unary(IrUnaryOp::Not, dst, src));
                Ok(dst)
            }
            UnaryOperator::Not => {
                let src = self.expression(inner)?;
                let zero = Constant::int(0).convert_to(inner.get_type());
                let zero = self.imm(zero);
                let dst = self.new_slot(result_type);
                self.emit(IrInst::Cmp(IrCmpOp::Eq, dst, src, zero));
                Ok(dst)
            }
            UnaryOperator::PreIncrement | UnaryOperator::PreDecrement => {
                let place = self.place(inner)?;
                let old = self.read_place(&place);
                let one = self.one_for(result_type);
                let new = self.new_slot(result_type);
                let ir_op = if op == UnaryOperator::PreIncrement {
                    IrBinaryOp::Add
                } else {
                    IrBinaryOp::Sub
                };
                self.emit(IrInst::Binary(ir_op, new, old, one));
                self.write_place(&place, new);
                Ok(new)
            }
        }
    }

    fn binary(
        &mut self,
        op: BinaryOperator,
        left: &'a Expression,
        right: &'a Expression,
        result_type: TypeInfo,
    ) -> Result<SlotId> {
        use BinaryOperator::*;

        let a = self.expression(left)?;
        let b = self.expression(right)?;
        let dst = self.new_slot(result_type);

        match op {
            Equal | NotEqual | LessThan | LessOrEqual | GreaterThan | GreaterOrEqual => {
                self.emit(IrInst::Cmp(cmp_op(op), dst, a, b));
            }
            And => self.emit(IrInst::Binary(IrBinaryOp::And, dst, a, b)),
            Or => self.emit(IrInst::Binary(IrBinaryOp::Or, dst, a, b)),
            _ => self.emit(IrInst::Binary(binary_op(op)?, dst, a, b)),
        }
        Ok(dst)
    }

    fn call(
        &mut self,
        name: &crate::common::Ident,
        args: &'a [Expression],
        result_type: TypeInfo,
    ) -> Result<SlotId> {
        let id = self
            .symbols
            .lookup(SymbolTable::ROOT, &name.name)
            .ok_or(Error::InvalidState)?;

        match self.symbols.get(id).data.clone() {
            SymbolData::Intrinsic(intrinsic) => self.intrinsic(intrinsic, args, result_type),
            SymbolData::Function(_) => {
                let function = self
                    .program
                    .function(&name.name)
                    .ok_or(Error::InvalidState)?;
                let arg_slots = args
                    .iter()
                    .map(|a| self.expression(a))
                    .collect::<Result<Vec<_>>>()?;
                let result = self.inline_call(function, arg_slots)?;
                result.ok_or(Error::InvalidState).or_else(|e| {
                    if result_type.is_void() {
                        // A void call still needs a slot to stand in for the
                        // expression; it is never read.
                        Ok(self.imm(Constant::int(0)))
                    } else {
                        Err(e)
                    }
                })
            }
            _ => Err(Error::InvalidState),
        }
    }

    fn inline_call(
        &mut self,
        function: &'a FunctionDeclaration,
        args: Vec<SlotId>,
    ) -> Result<Option<SlotId>> {
        if self.inline.len() >= MAX_INLINE_DEPTH {
            return Err(Error::RecursionNotAllowed);
        }

        self.vars.push(HashMap::new());
        for (param, arg) in function.params.iter().zip(args) {
            let slot = self.new_slot(param.type_info.strip());
            self.emit(IrInst::Mov(slot, arg));
            self.vars
                .last_mut()
                .unwrap()
                .insert(param.name.name.clone(), slot);
        }

        let result = if function.ret.is_void() {
            None
        } else {
            Some(self.new_slot(function.ret.strip()))
        };
        let join = self.new_block();

        self.inline.push((result, join));
        self.block(&function.body)?;
        self.inline.pop();
        self.vars.pop();

        // A void body may fall off its end.
        self.set_term(IrTerm::Jmp(join));
        self.start(join);

        Ok(result)
    }

    fn intrinsic(
        &mut self,
        intrinsic: Intrinsic,
        args: &'a [Expression],
        result_type: TypeInfo,
    ) -> Result<SlotId> {
        use Intrinsic::*;

        match intrinsic {
            Abs | Sqrt => {
                let src = self.expression(&args[0])?;
                let dst = self.new_slot(result_type);
                let op = if intrinsic == Abs {
                    IrUnaryOp::Abs
                } else {
                    IrUnaryOp::Sqrt
                };
                self.emit(IrInst::Unary(op, dst, src));
                Ok(dst)
            }
            Min | Max => {
                let a = self.expression(&args[0])?;
                let b = self.expression(&args[1])?;
                let dst = self.new_slot(result_type);
                let op = if intrinsic == Min {
                    IrBinaryOp::Min
                } else {
                    IrBinaryOp::Max
                };
                self.emit(IrInst::Binary(op, dst, a, b));
                Ok(dst)
            }
            Pow => {
                let a = self.expression(&args[0])?;
                let b = self.expression(&args[1])?;
                let dst = self.new_slot(result_type);
                self.emit(IrInst::Call(dst, MathFn::Pow, vec![a, b]));
                Ok(dst)
            }
            Exp | Log | Sin | Cos => {
                let a = self.expression(&args[0])?;
                let dst = self.new_slot(result_type);
                let func = match intrinsic {
                    Exp => MathFn::Exp,
                    Log => MathFn::Log,
                    Sin => MathFn::Sin,
                    _ => MathFn::Cos,
                };
                self.emit(IrInst::Call(dst, func, vec![a]));
                Ok(dst)
            }
            Dot => {
                let a = self.expression(&args[0])?;
                let b = self.expression(&args[1])?;
                Ok(self.dot(a, b, args[0].get_type().strip(), result_type))
            }
            Cross => {
                let a = self.expression(&args[0])?;
                let b = self.expression(&args[1])?;
                Ok(self.cross(a, b, result_type))
            }
            Length => {
                let v = self.expression(&args[0])?;
                let vec_type = args[0].get_type().strip();
                let squared = self.dot(v, v, vec_type, result_type);
                let dst = self.new_slot(result_type);
                self.emit(IrInst::Unary(IrUnaryOp::Sqrt, dst, squared));
                Ok(dst)
            }
            IsNan => {
                let v = self.expression(&args[0])?;
                let dst = self.new_slot(result_type);
                self.emit(IrInst::Cmp(IrCmpOp::Ne, dst, v, v));
                Ok(dst)
            }
            IsInf => {
                let v = self.expression(&args[0])?;
                let v_type = self.func.slot_type(v);
                let magnitude = self.new_slot(v_type);
                self.emit(IrInst::Unary(IrUnaryOp::Abs, magnitude, v));
                let infinity = if v_type.kind() == TypeKind::Double {
                    Constant::double(f64::INFINITY)
                } else {
                    Constant::float(f32::INFINITY)
                }
                .convert_to(v_type);
                let infinity = self.imm(infinity);
                let dst = self.new_slot(result_type);
                self.emit(IrInst::Cmp(IrCmpOp::Eq, dst, magnitude, infinity));
                Ok(dst)
            }
        }
    }

    // Lane-sum via shuffles; the result lands in lane 0 and is extracted.
    fn dot(
        &mut self,
        a: SlotId,
        b: SlotId,
        vec_type: TypeInfo,
        result_type: TypeInfo,
    ) -> SlotId {
        let product = self.new_slot(vec_type);
        self.emit(IrInst::Binary(IrBinaryOp::Mul, product, a, b));

        let sum = match vec_type.width() {
            2 => {
                let swapped = self.new_slot(vec_type);
                self.emit(IrInst::Shuffle(swapped, product, sel(1, 0, 0, 0)));
                let sum = self.new_slot(vec_type);
                self.emit(IrInst::Binary(IrBinaryOp::Add, sum, product, swapped));
                sum
            }
            3 => {
                let lane1 = self.new_slot(vec_type);
                self.emit(IrInst::Shuffle(lane1, product, sel(1, 1, 1, 1)));
                let lane2 = self.new_slot(vec_type);
                self.emit(IrInst::Shuffle(lane2, product, sel(2, 2, 2, 2)));
                let partial = self.new_slot(vec_type);
                self.emit(IrInst::Binary(IrBinaryOp::Add, partial, product, lane1));
                let sum = self.new_slot(vec_type);
                self.emit(IrInst::Binary(IrBinaryOp::Add, sum, partial, lane2));
                sum
            }
            _ => {
                let high = self.new_slot(vec_type);
                self.emit(IrInst::Shuffle(high, product, sel(2, 3, 0, 1)));
                let partial = self.new_slot(vec_type);
                self.emit(IrInst::Binary(IrBinaryOp::Add, partial, product, high));
                let swapped = self.new_slot(vec_type);
                self.emit(IrInst::Shuffle(swapped, partial, sel(1, 0, 3, 2)));
                let sum = self.new_slot(vec_type);
                self.emit(IrInst::Binary(IrBinaryOp::Add, sum, partial, swapped));
                sum
            }
        };

        let dst = self.new_slot(result_type);
        self.emit(IrInst::First(dst, sum));
        dst
    }

    // cross(a, b) = a.yzx * b.zxy - a.zxy * b.yzx
    fn cross(&mut self, a: SlotId, b: SlotId, result_type: TypeInfo) -> SlotId {
        let a_yzx = self.new_slot(result_type);
        self.emit(IrInst::Shuffle(a_yzx, a, sel(1, 2, 0, 0)));
        let b_zxy = self.new_slot(result_type);
        self.emit(IrInst::Shuffle(b_zxy, b, sel(2, 0, 1, 0)));
        let left = self.new_slot(result_type);
        self.emit(IrInst::Binary(IrBinaryOp::Mul, left, a_yzx, b_zxy));

        let a_zxy = self.new_slot(result_type);
        self.emit(IrInst::Shuffle(a_zxy, a, sel(2, 0, 1, 0)));
        let b_yzx = self.new_slot(result_type);
        self.emit(IrInst::Shuffle(b_yzx, b, sel(1, 2, 0, 0)));
        let right = self.new_slot(result_type);
        self.emit(IrInst::Binary(IrBinaryOp::Mul, right, a_zxy, b_yzx));

        let dst = self.new_slot(result_type);
        self.emit(IrInst::Binary(IrBinaryOp::Sub, dst, left, right));
        dst
    }
}

fn binary_op(op: BinaryOperator) -> Result<IrBinaryOp> {
    use BinaryOperator::*;
    Ok(match op {
        Add => IrBinaryOp::Add,
        Subtract => IrBinaryOp::Sub,
        Multiply => IrBinaryOp::Mul,
        Divide => IrBinaryOp::Div,
        Remainder => IrBinaryOp::Rem,
        BitwiseAnd => IrBinaryOp::And,
        BitwiseOr => IrBinaryOp::Or,
        BitwiseXor => IrBinaryOp::Xor,
        LeftShift => IrBinaryOp::Shl,
        RightShift => IrBinaryOp::Shr,
        And => IrBinaryOp::And,
        Or => IrBinaryOp::Or,
        _ => return Err(Error::InvalidState),
    })
}

fn cmp_op(op: BinaryOperator) -> IrCmpOp {
    use BinaryOperator::*;
    match op {
        Equal => IrCmpOp::Eq,
        NotEqual => IrCmpOp::Ne,
        LessThan => IrCmpOp::Lt,
        LessOrEqual => IrCmpOp::Le,
        GreaterThan => IrCmpOp::Gt,
        _ => IrCmpOp::Ge,
    }
}

/// Lowers an analyzed program. Top-level variables become locals of the
/// single emitted function, initialized before `main`'s body runs.
pub fn lower_program(
    program: &Program,
    symbols: &SymbolTable,
    num_args: u32,
) -> Result<IrFunction> {
    let mut lowerer = Lowerer::new(program, symbols, num_args);

    for declaration in &program.declarations {
        if let Declaration::Var(decl) = declaration {
            lowerer.var_declaration(decl)?;
        }
    }

    let main = program.function("main").ok_or(Error::InvalidState)?;
    lowerer.block(&main.body)?;
    lowerer.set_term(IrTerm::Ret);

    Ok(lowerer.func)
}
