//! The symbolic interpreter.
//!
//! Executes a normalized instruction sequence over a stack of QIR
//! expressions instead of runtime values. Straight-line opcodes have a
//! purely symbolic effect; branch and loop opcodes are handled by
//! structural recognition of the jump shapes the host compiler emits for
//! ternaries, short-circuit operators and comprehensions. Branch arms run
//! as isolated sub-interpretations over instruction sub-ranges, each on
//! its own stack copy. Any jump shape outside that set fails translation;
//! unknown branches are never collapsed or guessed at.

use std::cell::Cell;
use std::collections::HashMap;

use quarry_bytecode::{adapt, CodeObject, Const, Function, Inst, InstSeq, Opcode};
use quarry_qir::{Expression, Lambda};

use crate::error::TranslateError;
use crate::resolve::{encode_scalar, Bindings, Resolution, Resolver};

/// Translation options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Upper bound on the number of instructions processed across one
    /// translation, nested functions included. Guards against
    /// pathological closures.
    pub instruction_limit: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            instruction_limit: 10_000,
        }
    }
}

/// A symbolic stack element.
///
/// Almost everything on the stack is a QIR expression; the one exception
/// is a code object between its `LOAD_CONST` and the `CALL` that inlines
/// it.
enum Sym {
    Expr(Expression),
    Code(CodeObject),
}

/// One interpretation frame: the symbolic stack plus the current bindings
/// of local slots.
struct Frame {
    stack: Vec<Sym>,
    locals: HashMap<String, Expression>,
}

impl Frame {
    fn new() -> Self {
        Self {
            stack: Vec::new(),
            locals: HashMap::new(),
        }
    }

    fn push(&mut self, expr: Expression) {
        self.stack.push(Sym::Expr(expr));
    }

    fn pop(&mut self, offset: u32) -> Result<Sym, TranslateError> {
        self.stack
            .pop()
            .ok_or(TranslateError::StackUnderflow(offset))
    }

    fn pop_expr(&mut self, offset: u32) -> Result<Expression, TranslateError> {
        match self.pop(offset)? {
            Sym::Expr(expr) => Ok(expr),
            Sym::Code(_) => Err(TranslateError::UnsupportedControlFlow(offset)),
        }
    }

    /// Pop `n` expressions, restoring their push order.
    fn pop_many(&mut self, n: u32, offset: u32) -> Result<Vec<Expression>, TranslateError> {
        let mut items = Vec::with_capacity(n as usize);
        for _ in 0..n {
            items.push(self.pop_expr(offset)?);
        }
        items.reverse();
        Ok(items)
    }
}

/// How a sub-interpretation ended.
enum Outcome {
    /// Reached the end of the range.
    Fell,
    /// Hit `RETURN_VALUE`; the payload is the function result.
    Returned(Expression),
    /// Hit a backward conditional jump to the enclosing loop header: a
    /// comprehension guard. `next` is the index after the jump.
    Guard { cond: Expression, next: usize },
    /// Hit the terminal `LIST_APPEND`/`MAP_ADD` of a comprehension;
    /// the payload is the projected row expression.
    Append { body: Expression, next: usize },
    /// Hit a `FOR_ITER` at index `at`; the iterable is on the stack.
    EnterLoop { at: usize },
}

/// Everything a sub-interpretation needs to see: the instruction
/// sequence being executed and the function whose cells and globals are
/// in scope. Comprehension bodies execute their own sequence against the
/// enclosing function's environment.
struct Ctx<'a> {
    function: &'a Function,
    seq: &'a InstSeq,
}

pub(crate) struct Interpreter<'a> {
    bindings: &'a Bindings,
    fuel: Cell<u64>,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(bindings: &'a Bindings, options: &Options) -> Self {
        Self {
            bindings,
            fuel: Cell::new(options.instruction_limit),
        }
    }

    /// Translate a whole function object into a QIR term. Parameters
    /// become a curried lambda chain around the translated body.
    pub(crate) fn translate_function(
        &self,
        function: &Function,
    ) -> Result<Expression, TranslateError> {
        let seq = adapt(&function.code)?;
        let ctx = Ctx {
            function,
            seq: &seq,
        };

        let mut frame = Frame::new();
        for param in &function.code.params {
            frame
                .locals
                .insert(param.clone(), Expression::ident(param.clone()));
        }

        let body = match self.run(&ctx, &mut frame, 0, seq.len(), true, None)? {
            Outcome::Returned(expr) => expr,
            // A loop here is a `for` statement, which is outside the
            // accepted fragment.
            Outcome::EnterLoop { at } => {
                return Err(TranslateError::UnsupportedControlFlow(offset_at(&seq, at)));
            }
            _ => return Err(TranslateError::UnbalancedJump(last_offset(&seq))),
        };

        Ok(function
            .code
            .params
            .iter()
            .rev()
            .fold(body, |acc, param| Expression::lambda(param.clone(), acc)))
    }

    /// Translate a comprehension body applied to `source`, lifting the
    /// loop into a SELECT/PROJECT tree over it.
    fn translate_comprehension(
        &self,
        function: &Function,
        code: &CodeObject,
        source: Expression,
    ) -> Result<Expression, TranslateError> {
        tracing::trace!(body = %code.name, "lifting comprehension");
        let seq = adapt(code)?;
        let ctx = Ctx {
            function,
            seq: &seq,
        };

        let param = code.params.first().ok_or_else(|| {
            TranslateError::NotIntrospectable(format!(
                "comprehension body {} takes no iterable parameter",
                code.name
            ))
        })?;

        let mut frame = Frame::new();
        frame.locals.insert(param.clone(), source);

        match self.run(&ctx, &mut frame, 0, seq.len(), true, None)? {
            Outcome::EnterLoop { at } => {
                let offset = offset_at(&seq, at);
                let input = frame.pop_expr(offset)?;

                // Discard the empty accumulator pushed by BUILD_LIST 0 or
                // BUILD_MAP 0; the operator tree replaces it.
                if matches!(
                    frame.stack.last(),
                    Some(Sym::Expr(Expression::ListNil | Expression::TupleNil))
                ) {
                    frame.stack.pop();
                }

                let (tree, after) = self.drive_loop(&ctx, &mut frame, at, input)?;
                frame.push(tree);

                match self.run(&ctx, &mut frame, after, seq.len(), true, None)? {
                    Outcome::Returned(expr) => Ok(expr),
                    _ => Err(TranslateError::UnbalancedJump(offset)),
                }
            }
            // A body without a loop behaves like a plain inlined call.
            Outcome::Returned(expr) => Ok(expr),
            _ => Err(TranslateError::UnsupportedControlFlow(0)),
        }
    }

    /// Interpret one `FOR_ITER` loop. Guards wrap the input in SELECTs;
    /// the appended row becomes the PROJECT lambda; a nested loop becomes
    /// the projection of the outer one.
    fn drive_loop(
        &self,
        ctx: &Ctx<'_>,
        frame: &mut Frame,
        at: usize,
        input: Expression,
    ) -> Result<(Expression, usize), TranslateError> {
        let for_off = offset_at(ctx.seq, at);
        let var = match ctx.seq.get(at + 1).map(|inst| &inst.op) {
            Some(Opcode::StoreFast(name)) => name.clone(),
            _ => return Err(TranslateError::UnsupportedControlFlow(for_off)),
        };
        frame
            .locals
            .insert(var.clone(), Expression::ident(var.clone()));

        let mut input = input;
        let mut i = at + 2;
        loop {
            match self.run(ctx, frame, i, ctx.seq.len(), false, Some(for_off))? {
                Outcome::Guard { cond, next } => {
                    input = Expression::select(input, Lambda::new(var.clone(), cond));
                    i = next;
                }
                Outcome::Append { body, next } => {
                    self.expect_back_jump(ctx, next, for_off)?;
                    let tree = Expression::project(input, Lambda::new(var.clone(), body));
                    return Ok((tree, next + 1));
                }
                Outcome::EnterLoop { at: inner } => {
                    let inner_off = offset_at(ctx.seq, inner);
                    let iterable = frame.pop_expr(inner_off)?;
                    let (inner_tree, after) = self.drive_loop(ctx, frame, inner, iterable)?;
                    self.expect_back_jump(ctx, after, for_off)?;
                    let tree = Expression::project(input, Lambda::new(var.clone(), inner_tree));
                    return Ok((tree, after + 1));
                }
                Outcome::Fell | Outcome::Returned(_) => {
                    return Err(TranslateError::UnsupportedControlFlow(for_off));
                }
            }
        }
    }

    fn expect_back_jump(
        &self,
        ctx: &Ctx<'_>,
        at: usize,
        for_off: u32,
    ) -> Result<(), TranslateError> {
        match ctx.seq.get(at) {
            Some(Inst {
                op: Opcode::Jump(target),
                ..
            }) if *target == for_off => Ok(()),
            Some(inst) => Err(TranslateError::UnsupportedControlFlow(inst.offset)),
            None => Err(TranslateError::UnbalancedJump(for_off)),
        }
    }

    /// Execute instructions in `[start, end)` linearly until the range is
    /// exhausted or a terminating shape is met.
    fn run(
        &self,
        ctx: &Ctx<'_>,
        frame: &mut Frame,
        start: usize,
        end: usize,
        allow_return: bool,
        in_loop: Option<u32>,
    ) -> Result<Outcome, TranslateError> {
        let mut i = start;
        while i < end {
            let Some(inst) = ctx.seq.get(i) else {
                return Ok(Outcome::Fell);
            };
            let offset = inst.offset;
            self.burn(offset)?;

            match &inst.op {
                Opcode::LoadConst(value) => match value {
                    Const::Code(code) => frame.stack.push(Sym::Code(code.clone())),
                    scalar => match encode_scalar(scalar) {
                        Some(expr) => frame.push(expr),
                        None => return Err(TranslateError::UnsupportedControlFlow(offset)),
                    },
                },

                Opcode::LoadFast(name) => {
                    let bound = frame.locals.get(name).cloned().ok_or_else(|| {
                        TranslateError::UnresolvedName {
                            name: name.clone(),
                            offset,
                        }
                    })?;
                    frame.push(bound);
                }

                Opcode::StoreFast(name) => {
                    let value = frame.pop_expr(offset)?;
                    frame.locals.insert(name.clone(), value);
                }

                // Closures are specialized per call: the cell's current
                // value is inlined as a literal.
                Opcode::LoadDeref(name) => {
                    let cell = ctx.function.cell(name).ok_or_else(|| {
                        TranslateError::UnresolvedName {
                            name: name.clone(),
                            offset,
                        }
                    })?;
                    let expr =
                        encode_scalar(cell).ok_or_else(|| TranslateError::UnresolvedName {
                            name: name.clone(),
                            offset,
                        })?;
                    frame.push(expr);
                }

                Opcode::LoadGlobal(name) => {
                    let resolver = Resolver::new(self.bindings, ctx.function);
                    match resolver.resolve(name, &frame.locals, offset)? {
                        Resolution::Expr(expr) => frame.push(expr),
                        Resolution::UserFunction(function) => {
                            let translated = self.translate_function(&function)?;
                            frame.push(translated);
                        }
                    }
                }

                Opcode::LoadAttr(attr) => {
                    let target = frame.pop_expr(offset)?;
                    let expr = match target {
                        // Identifiers only ever name lambda parameters and
                        // iteration variables, i.e. row variables.
                        Expression::Identifier(row) => Expression::reference(row, attr.clone()),
                        other => {
                            Expression::tuple_destr(other, Expression::string(attr.clone()))
                        }
                    };
                    frame.push(expr);
                }

                Opcode::CompareOp(op) => {
                    let right = frame.pop_expr(offset)?;
                    let left = frame.pop_expr(offset)?;
                    frame.push(Expression::apply2(
                        Expression::builtin("operator", op.builtin_name()),
                        left,
                        right,
                    ));
                }

                Opcode::BinaryOp(op) => {
                    let right = frame.pop_expr(offset)?;
                    let left = frame.pop_expr(offset)?;
                    frame.push(Expression::apply2(
                        Expression::builtin("operator", op.builtin_name()),
                        left,
                        right,
                    ));
                }

                Opcode::UnaryNot => {
                    let value = frame.pop_expr(offset)?;
                    frame.push(Expression::apply(
                        Expression::builtin("operator", "not"),
                        value,
                    ));
                }

                Opcode::BuildList(n) | Opcode::BuildTuple(n) => {
                    let items = frame.pop_many(*n, offset)?;
                    frame.push(Expression::list(items));
                }

                Opcode::BuildMap(n) => {
                    let flat = frame.pop_many(2 * n, offset)?;
                    let mut pairs = Vec::with_capacity(*n as usize);
                    let mut iter = flat.into_iter();
                    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                        pairs.push((key, value));
                    }
                    frame.push(Expression::record(pairs));
                }

                Opcode::ListAppend(_) => {
                    if in_loop.is_none() {
                        return Err(TranslateError::UnsupportedControlFlow(offset));
                    }
                    let body = frame.pop_expr(offset)?;
                    return Ok(Outcome::Append { body, next: i + 1 });
                }

                Opcode::MapAdd(_) => {
                    if in_loop.is_none() {
                        return Err(TranslateError::UnsupportedControlFlow(offset));
                    }
                    let value = frame.pop_expr(offset)?;
                    let key = frame.pop_expr(offset)?;
                    let body = Expression::tuple_cons(key, value, Expression::TupleNil);
                    return Ok(Outcome::Append { body, next: i + 1 });
                }

                Opcode::Call(n) => {
                    let args = frame.pop_many(*n, offset)?;
                    match frame.pop(offset)? {
                        Sym::Code(code) => {
                            let result = if code.has_loop() {
                                let mut args = args;
                                if args.len() != 1 {
                                    return Err(TranslateError::UnsupportedControlFlow(offset));
                                }
                                let source = args.remove(0);
                                self.translate_comprehension(ctx.function, &code, source)?
                            } else {
                                // A plain inner function: translate it to
                                // a lambda chain and apply the arguments.
                                let inner = Function {
                                    code,
                                    cells: ctx.function.cells.clone(),
                                    globals: ctx.function.globals.clone(),
                                };
                                let callee = self.translate_function(&inner)?;
                                args.into_iter().fold(callee, Expression::apply)
                            };
                            frame.push(result);
                        }
                        Sym::Expr(callee) => {
                            frame.push(args.into_iter().fold(callee, Expression::apply));
                        }
                    }
                }

                Opcode::MakeFunction => match frame.stack.last() {
                    // The code constant stands for the function value.
                    Some(Sym::Code(_)) => {}
                    _ => return Err(TranslateError::UnsupportedControlFlow(offset)),
                },

                Opcode::GetIter => match frame.stack.last() {
                    // Iteration is symbolic; the iterable stands for its
                    // own iterator.
                    Some(Sym::Expr(_)) => {}
                    _ => return Err(TranslateError::UnsupportedControlFlow(offset)),
                },

                Opcode::ReturnValue => {
                    if !allow_return {
                        return Err(TranslateError::UnsupportedControlFlow(offset));
                    }
                    let result = frame.pop_expr(offset)?;
                    return Ok(Outcome::Returned(result));
                }

                Opcode::ForIter(_) => return Ok(Outcome::EnterLoop { at: i }),

                Opcode::Jump(_) => {
                    // Forward jumps are consumed by branch recognition and
                    // loop back-edges by drive_loop; a jump met here fits
                    // no recognized shape.
                    return Err(TranslateError::UnsupportedControlFlow(offset));
                }

                Opcode::JumpIfTrue { target, pop } | Opcode::JumpIfFalse { target, pop } => {
                    let jump_on_true = matches!(inst.op, Opcode::JumpIfTrue { .. });
                    match self.branch(
                        ctx,
                        frame,
                        i,
                        end,
                        *target,
                        *pop,
                        jump_on_true,
                        allow_return,
                        in_loop,
                    )? {
                        BranchFlow::Continue(next) => {
                            i = next;
                            continue;
                        }
                        BranchFlow::Done(outcome) => return Ok(outcome),
                    }
                }

                Opcode::Unsupported(opname) => {
                    return Err(TranslateError::UnsupportedOpcode {
                        opname: opname.clone(),
                        offset,
                    });
                }
            }

            i += 1;
        }

        Ok(Outcome::Fell)
    }

    /// Recognize the jump shape starting at a conditional branch:
    /// a comprehension guard (backward, popping), a ternary (forward,
    /// popping, joined by a jump or a pair of returns), or a
    /// short-circuit `and`/`or` (forward, non-popping).
    #[allow(clippy::too_many_arguments)]
    fn branch(
        &self,
        ctx: &Ctx<'_>,
        frame: &mut Frame,
        i: usize,
        end: usize,
        target: u32,
        pop: bool,
        jump_on_true: bool,
        allow_return: bool,
        in_loop: Option<u32>,
    ) -> Result<BranchFlow, TranslateError> {
        let offset = offset_at(ctx.seq, i);
        let cond = frame.pop_expr(offset)?;

        if target <= offset {
            // Backward conditional jumps only occur as comprehension
            // guards targeting the enclosing loop header.
            return match in_loop {
                Some(for_off) if for_off == target && pop => {
                    let cond = if jump_on_true {
                        // Guard of the `if not ...` form: the row is kept
                        // when the condition is false.
                        Expression::apply(Expression::builtin("operator", "not"), cond)
                    } else {
                        cond
                    };
                    Ok(BranchFlow::Done(Outcome::Guard { cond, next: i + 1 }))
                }
                _ => Err(TranslateError::UnsupportedControlFlow(offset)),
            };
        }

        let t_idx = ctx
            .seq
            .index_of(target)
            .ok_or(TranslateError::UnbalancedJump(offset))?;

        if !pop {
            // Short-circuit: the controlling value doubles as one arm.
            let rest = self.eval_arm(ctx, frame, i + 1, t_idx)?;
            let expr = if jump_on_true {
                Expression::conditional(cond.clone(), cond, rest)
            } else {
                Expression::conditional(cond.clone(), rest, cond)
            };
            frame.push(expr);
            return Ok(BranchFlow::Continue(t_idx));
        }

        // Popping forward branch: a ternary. The fallthrough arm either
        // ends with a jump over the other arm, or both arms return.
        match ctx.seq.get(t_idx.wrapping_sub(1)).map(|inst| &inst.op) {
            Some(Opcode::Jump(after)) if *after > target => {
                let after_idx = ctx
                    .seq
                    .index_of(*after)
                    .ok_or(TranslateError::UnbalancedJump(offset))?;
                let fall = self.eval_arm(ctx, frame, i + 1, t_idx - 1)?;
                let jumped = self.eval_arm(ctx, frame, t_idx, after_idx)?;
                let (on_true, on_false) = if jump_on_true {
                    (jumped, fall)
                } else {
                    (fall, jumped)
                };
                frame.push(Expression::conditional(cond, on_true, on_false));
                Ok(BranchFlow::Continue(after_idx))
            }
            Some(Opcode::ReturnValue) if allow_return => {
                let fall = self.eval_returned(ctx, frame, i + 1, t_idx)?;
                let jumped = self.eval_returned(ctx, frame, t_idx, end)?;
                let (on_true, on_false) = if jump_on_true {
                    (jumped, fall)
                } else {
                    (fall, jumped)
                };
                Ok(BranchFlow::Done(Outcome::Returned(Expression::conditional(
                    cond, on_true, on_false,
                ))))
            }
            _ => Err(TranslateError::UnsupportedControlFlow(offset)),
        }
    }

    /// Evaluate a branch arm on an independent stack copy, expecting it
    /// to produce exactly one value.
    fn eval_arm(
        &self,
        ctx: &Ctx<'_>,
        frame: &Frame,
        start: usize,
        end: usize,
    ) -> Result<Expression, TranslateError> {
        let offset = offset_at(ctx.seq, start);
        let mut arm = Frame {
            stack: Vec::new(),
            locals: frame.locals.clone(),
        };
        match self.run(ctx, &mut arm, start, end, false, None)? {
            Outcome::Fell if arm.stack.len() == 1 => arm.pop_expr(offset),
            _ => Err(TranslateError::UnbalancedJump(offset)),
        }
    }

    /// Evaluate a branch arm that ends in `RETURN_VALUE`.
    fn eval_returned(
        &self,
        ctx: &Ctx<'_>,
        frame: &Frame,
        start: usize,
        end: usize,
    ) -> Result<Expression, TranslateError> {
        let offset = offset_at(ctx.seq, start);
        let mut arm = Frame {
            stack: Vec::new(),
            locals: frame.locals.clone(),
        };
        match self.run(ctx, &mut arm, start, end, true, None)? {
            Outcome::Returned(expr) => Ok(expr),
            _ => Err(TranslateError::UnbalancedJump(offset)),
        }
    }

    fn burn(&self, offset: u32) -> Result<(), TranslateError> {
        let left = self.fuel.get();
        if left == 0 {
            return Err(TranslateError::TranslationLimitExceeded(offset));
        }
        self.fuel.set(left - 1);
        Ok(())
    }
}

enum BranchFlow {
    Continue(usize),
    Done(Outcome),
}

fn offset_at(seq: &InstSeq, index: usize) -> u32 {
    seq.get(index).map(|inst| inst.offset).unwrap_or(0)
}

fn last_offset(seq: &InstSeq) -> u32 {
    seq.len()
        .checked_sub(1)
        .and_then(|i| seq.get(i))
        .map(|inst| inst.offset)
        .unwrap_or(0)
}
