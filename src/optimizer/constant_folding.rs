use crate::common::{Constant, TypeKind};
use crate::errors::Error;
use crate::output_log::ErrorReporter;
use crate::parser::ast::*;
use crate::semantic_analysis::SymbolTable;

type Result<T> = std::result::Result<T, Error>;

pub struct ConstantFolder<'a, 'b> {
    symbols: &'a SymbolTable,
    pub(crate) reporter: &'a mut ErrorReporter<'b>,
}

/// No assignments, no increments, no user calls: evaluating it twice or not
/// at all is unobservable.
fn is_pure(expr: &Expression, symbols: &SymbolTable) -> bool {
    match expr.as_ref() {
        Expr::Imm(_) | Expr::Var(_) => true,
        Expr::Member(base, _) => is_pure(base, symbols),
        Expr::Cast(_, inner) | Expr::Unary(UnaryOperator::Not, inner) => is_pure(inner, symbols),
        Expr::Unary(UnaryOperator::Negate | UnaryOperator::Complement, inner) => {
            is_pure(inner, symbols)
        }
        Expr::Unary(_, _) | Expr::Postfix(..) => false,
        Expr::Binary(_, left, right) | Expr::Coalesce(left, right) => {
            is_pure(left, symbols) && is_pure(right, symbols)
        }
        Expr::Assignment(..) | Expr::CompoundAssignment(..) => false,
        Expr::Conditional(cond, a, b) => {
            is_pure(cond, symbols) && is_pure(a, symbols) && is_pure(b, symbols)
        }
        Expr::Call(name, args) => {
            let intrinsic = symbols
                .lookup(SymbolTable::ROOT, &name.name)
                .map(|id| symbols.get(id).data.is_intrinsic())
                .unwrap_or(false);
            intrinsic && args.iter().all(|a| is_pure(a, symbols))
        }
    }
}

impl<'a, 'b> ConstantFolder<'a, 'b> {
    pub fn new(symbols: &'a SymbolTable, reporter: &'a mut ErrorReporter<'b>) -> Self {
        Self { symbols, reporter }
    }

    pub fn is_pure(&self, expr: &Expression) -> bool {
        is_pure(expr, self.symbols)
    }

    // Reflexive comparisons fold only for integer-kind variables written at
    // most once; floats stay untouched because of NaN.
    fn reflexive_var(&self, left: &Expression, right: &Expression) -> bool {
        let (Some(a), Some(b)) = (left.get_var_name(), right.get_var_name()) else {
            return false;
        };
        if a != b {
            return false;
        }
        if !matches!(
            left.get_type().kind(),
            TypeKind::Int | TypeKind::Bool | TypeKind::QBool
        ) {
            return false;
        }
        self.symbols
            .lookup(SymbolTable::ROOT, a)
            .map(|id| {
                let symbol = self.symbols.get(id);
                symbol.data.is_member() || symbol.assign_count <= 1
            })
            .unwrap_or(true)
    }

    pub fn fold_expression(&mut self, expr: Expression) -> Result<Expression> {
        let position = expr.get_position();
        let value_type = expr.try_type();

        let rebuilt = match expr.unwrap() {
            Expr::Cast(target, inner) => {
                let inner = self.fold_expression(inner)?;
                if let Some(imm) = inner.get_imm() {
                    Expr::Imm(imm.convert_to(target))
                } else if inner.get_type().strip() == target.strip() {
                    return Ok(inner);
                } else {
                    Expr::Cast(target, inner)
                }
            }
            Expr::Unary(op, inner) => {
                let inner = self.fold_expression(inner)?;
                self.fold_unary(op, inner)?
            }
            Expr::Binary(op, left, right) => {
                let left = self.fold_expression(left)?;
                let right = self.fold_expression(right)?;
                self.fold_binary(op, left, right, position)?
            }
            Expr::Conditional(cond, then_arm, else_arm) => {
                let cond = self.fold_expression(cond)?;
                let then_arm = self.fold_expression(then_arm)?;
                let else_arm = self.fold_expression(else_arm)?;

                if let Some(value) = cond.get_imm() {
                    if value.width() == 1 {
                        return Ok(if value.truth() { then_arm } else { else_arm });
                    }
                    if (0..value.width() as usize).all(|i| value.get_bool(i)) {
                        return Ok(then_arm);
                    }
                    if value.is_zero() {
                        return Ok(else_arm);
                    }
                }
                Expr::Conditional(cond, then_arm, else_arm)
            }
            Expr::Member(base, member) => Expr::Member(self.fold_expression(base)?, member),
            Expr::Assignment(target, value) => {
                Expr::Assignment(target, self.fold_expression(value)?)
            }
            Expr::CompoundAssignment(op, target, value) => {
                Expr::CompoundAssignment(op, target, self.fold_expression(value)?)
            }
            Expr::Postfix(op, inner) => Expr::Postfix(op, inner),
            Expr::Call(name, args) => Expr::Call(
                name,
                args.into_iter()
                    .map(|a| self.fold_expression(a))
                    .collect::<Result<Vec<_>>>()?,
            ),
            other => other,
        };

        let mut out: Expression = rebuilt.at_position(position);
        if let Some(imm) = out.get_imm() {
            out.set_type(imm.type_info().strip());
        } else if let Some(value_type) = value_type {
            out.set_type(value_type);
        }
        Ok(out)
    }

    fn fold_unary(&mut self, op: UnaryOperator, inner: Expression) -> Result<Expr> {
        use UnaryOperator::*;

        if let Some(imm) = inner.get_imm() {
            let folded = match op {
                Negate => Some(imm.neg()),
                Complement => Some(imm.complement()),
                Not => Some(imm.logical_not()),
                _ => None,
            };
            if let Some(folded) = folded {
                return Ok(Expr::Imm(folded));
            }
        }

        // Double negation and double complement cancel.
        if matches!(op, Negate | Complement) {
            if let Expr::Unary(inner_op, grand) = inner.as_ref() {
                if *inner_op == op {
                    return Ok(grand.clone().unwrap());
                }
            }
        }

        Ok(Expr::Unary(op, inner))
    }

    fn fold_binary(
        &mut self,
        op: BinaryOperator,
        left: Expression,
        right: Expression,
        position: u32,
    ) -> Result<Expr> {
        use BinaryOperator::*;

        if let (Some(a), Some(b)) = (left.get_imm(), right.get_imm()) {
            let folded = match op {
                Add => a.add(&b),
                Subtract => a.sub(&b),
                Multiply => a.mul(&b),
                Divide => match a.div(&b) {
                    Some(v) => v,
                    None => {
                        return Err(self.reporter.on_error(
                            Error::InvalidArgument,
                            position,
                            "division by zero in a constant expression",
                        ));
                    }
                },
                Remainder => match a.rem(&b) {
                    Some(v) => v,
                    None => {
                        return Err(self.reporter.on_error(
                            Error::InvalidArgument,
                            position,
                            "division by zero in a constant expression",
                        ));
                    }
                },
                BitwiseAnd | And => a.bit_and(&b),
                BitwiseOr | Or => a.bit_or(&b),
                BitwiseXor => a.bit_xor(&b),
                LeftShift => a.shl(&b),
                RightShift => a.shr(&b),
                Equal => a.eq(&b),
                NotEqual => a.ne(&b),
                LessThan => a.lt(&b),
                LessOrEqual => a.le(&b),
                GreaterThan => a.gt(&b),
                GreaterOrEqual => a.ge(&b),
            };
            return Ok(Expr::Imm(folded));
        }

        let int_kind = left.get_type().kind() == TypeKind::Int;
        let left_pure = self.is_pure(&left);
        let right_pure = self.is_pure(&right);

        match op {
            // x + 0, x - 0, x * 1, x / 1 are exact; the zero-absorbing
            // rules hold for integers only (floats keep NaN behavior).
            Add if int_kind => {
                if right.get_imm().map(|c| c.is_zero()).unwrap_or(false) {
                    return Ok(left.unwrap());
                }
                if left.get_imm().map(|c| c.is_zero()).unwrap_or(false) {
                    return Ok(right.unwrap());
                }
            }
            Subtract if int_kind => {
                if right.get_imm().map(|c| c.is_zero()).unwrap_or(false) {
                    return Ok(left.unwrap());
                }
                if left_pure
                    && right_pure
                    && left.is_var()
                    && right.is_var()
                    && left.get_var_name() == right.get_var_name()
                {
                    let zero = Constant::int(0).convert_to(left.get_type().strip());
                    return Ok(Expr::Imm(zero));
                }
            }
            Multiply => {
                if right.get_imm().map(|c| c.is_one()).unwrap_or(false) {
                    return Ok(left.unwrap());
                }
                if left.get_imm().map(|c| c.is_one()).unwrap_or(false) {
                    return Ok(right.unwrap());
                }
                if int_kind {
                    if right.get_imm().map(|c| c.is_zero()).unwrap_or(false) && left_pure {
                        let zero = Constant::int(0).convert_to(left.get_type().strip());
                        return Ok(Expr::Imm(zero));
                    }
                    if left.get_imm().map(|c| c.is_zero()).unwrap_or(false) && right_pure {
                        let zero = Constant::int(0).convert_to(right.get_type().strip());
                        return Ok(Expr::Imm(zero));
                    }
                }
            }
            Divide => {
                if right.get_imm().map(|c| c.is_one()).unwrap_or(false) {
                    return Ok(left.unwrap());
                }
            }
            And => {
                if let Some(imm) = right.get_imm() {
                    if imm.is_zero() && left_pure {
                        return Ok(Expr::Imm(imm));
                    }
                    if !imm.is_zero() {
                        return Ok(left.unwrap());
                    }
                }
                if let Some(imm) = left.get_imm() {
                    if imm.is_zero() && right_pure {
                        return Ok(Expr::Imm(imm));
                    }
                    if !imm.is_zero() {
                        return Ok(right.unwrap());
                    }
                }
            }
            Or => {
                if let Some(imm) = right.get_imm() {
                    if !imm.is_zero() && left_pure {
                        return Ok(Expr::Imm(imm));
                    }
                    if imm.is_zero() {
                        return Ok(left.unwrap());
                    }
                }
                if let Some(imm) = left.get_imm() {
                    if !imm.is_zero() && right_pure {
                        return Ok(Expr::Imm(imm));
                    }
                    if imm.is_zero() {
                        return Ok(right.unwrap());
                    }
                }
            }
            Equal | LessOrEqual | GreaterOrEqual if self.reflexive_var(&left, &right) => {
                let mask = left.get_type().mask_type();
                let truth = Constant::bool_(true).convert_to(mask);
                return Ok(Expr::Imm(truth));
            }
            NotEqual | LessThan | GreaterThan if self.reflexive_var(&left, &right) => {
                let mask = left.get_type().mask_type();
                let falsity = Constant::bool_(false).convert_to(mask);
                return Ok(Expr::Imm(falsity));
            }
            _ => {}
        }

        Ok(Expr::Binary(op, left, right))
    }
}
