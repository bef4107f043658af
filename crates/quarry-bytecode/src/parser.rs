//! Assembler for the dis-style text format.
//!
//! The format is line-oriented. A file holds `source` directives and `fn`
//! blocks; a block holds `cell`/`global` declarations, labels, and
//! instructions. The assembler builds the constant pool and name tables,
//! resolves labels to instruction offsets (offsets advance by two, the
//! host's instruction width) and `@name` references to inner code
//! objects.
//!
//! ```text
//! source employees
//!
//! fn names_paid_less()
//!   cell salary = 1500
//!
//!     LOAD_CONST @row
//!     MAKE_FUNCTION
//!     LOAD_GLOBAL employees
//!     GET_ITER
//!     CALL_FUNCTION 1
//!     RETURN_VALUE
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::code::{CodeObject, Const, Function, RawInst};
use crate::error::AsmError;
use crate::lexer::{lex, Span, Token};
use crate::token::TokenKind;

/// An assembled file: declared collection sources plus the functions in
/// definition order.
#[derive(Debug, Clone)]
pub struct Program {
    pub sources: Vec<String>,
    pub functions: Vec<Function>,
}

impl Program {
    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.code.name == name)
    }

    /// The entry function: the last one defined.
    pub fn entry(&self) -> Option<&Function> {
        self.functions.last()
    }
}

/// Assemble source text into a program.
pub fn assemble(source: &str) -> Result<Program, Vec<AsmError>> {
    let tokens = lex(source);
    let mut parser = Parser::new(tokens, source);
    parser.parse_program()
}

/// How an opcode's textual argument is interpreted.
enum ArgKind {
    /// A literal or `@fn` reference, interned into the constant pool.
    ConstArg,
    /// A local slot name.
    LocalArg,
    /// A global or attribute name.
    NameArg,
    /// A free-variable name.
    DerefArg,
    /// A plain count.
    CountArg,
    /// A label, resolved to an absolute offset.
    JumpArg,
    /// A comparison symbol.
    CmpArg,
    /// Unknown opcode: optional numeric argument, passed through.
    FreeForm,
}

fn arg_kind(opname: &str) -> ArgKind {
    match opname {
        "LOAD_CONST" => ArgKind::ConstArg,
        "LOAD_FAST" | "STORE_FAST" => ArgKind::LocalArg,
        "LOAD_GLOBAL" | "LOAD_NAME" | "STORE_NAME" | "LOAD_ATTR" => ArgKind::NameArg,
        "LOAD_DEREF" | "LOAD_CLOSURE" => ArgKind::DerefArg,
        "BUILD_LIST" | "BUILD_TUPLE" | "BUILD_SET" | "BUILD_MAP" | "LIST_APPEND" | "SET_ADD"
        | "MAP_ADD" | "CALL" | "CALL_FUNCTION" | "MAKE_FUNCTION" => ArgKind::CountArg,
        "COMPARE_OP" => ArgKind::CmpArg,
        "JUMP_FORWARD" | "JUMP_ABSOLUTE" | "CONTINUE_LOOP" | "POP_JUMP_IF_TRUE"
        | "POP_JUMP_IF_FALSE" | "JUMP_IF_TRUE_OR_POP" | "JUMP_IF_FALSE_OR_POP" | "FOR_ITER" => {
            ArgKind::JumpArg
        }
        _ => ArgKind::FreeForm,
    }
}

#[derive(Debug, Clone)]
enum Arg {
    Literal(Const),
    CodeRef { name: String, span: Span },
    Name(String),
    Count(u32),
    LabelRef { name: String, span: Span },
    Cmp(u32),
}

#[derive(Debug, Clone)]
enum Line {
    Label { name: String, span: Span },
    Inst { opname: String, arg: Option<Arg> },
}

#[derive(Debug, Clone)]
struct RawFn {
    name: String,
    params: Vec<String>,
    cells: Vec<(String, Const)>,
    globals: Vec<(String, Const)>,
    lines: Vec<Line>,
}

/// The parser state.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<AsmError>,
    source: String,
}

impl Parser {
    fn new(tokens: Vec<Token>, source: &str) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
            source: source.to_string(),
        }
    }

    fn parse_program(&mut self) -> Result<Program, Vec<AsmError>> {
        let mut sources = Vec::new();
        let mut raws = Vec::new();

        self.skip_newlines();
        while !self.is_at_end() {
            let result = match self.peek_kind() {
                Some(TokenKind::Source) => self.parse_source().map(|name| sources.push(name)),
                Some(TokenKind::Fn) => self.parse_fn().map(|raw| raws.push(raw)),
                Some(_) => {
                    let token = self.peek().unwrap().clone();
                    Err(AsmError::unexpected_token(
                        token.span,
                        "fn or source",
                        format!("{}", token.kind),
                    ))
                }
                None => break,
            };

            if let Err(e) = result {
                self.errors.push(e);
                self.synchronize();
            }
            self.skip_newlines();
        }

        let functions = if self.errors.is_empty() {
            self.build(&raws)
        } else {
            Vec::new()
        };

        if self.errors.is_empty() {
            Ok(Program { sources, functions })
        } else {
            // Attach source code to errors for better reporting
            let errors_with_source: Vec<AsmError> = self
                .errors
                .iter()
                .map(|e| e.clone().with_source(&self.source))
                .collect();
            Err(errors_with_source)
        }
    }

    fn parse_source(&mut self) -> Result<String, AsmError> {
        self.expect(&TokenKind::Source)?;
        let (name, _) = self.parse_ident()?;
        self.end_line()?;
        Ok(name)
    }

    fn parse_fn(&mut self) -> Result<RawFn, AsmError> {
        self.expect(&TokenKind::Fn)?;
        let (name, _) = self.parse_ident()?;
        self.expect(&TokenKind::LParen)?;

        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let (param, _) = self.parse_ident()?;
            params.push(param);
            if self.check(&TokenKind::Comma) {
                self.advance();
            }
        }
        self.expect(&TokenKind::RParen)?;
        self.end_line()?;

        let mut cells = Vec::new();
        let mut globals = Vec::new();
        let mut lines = Vec::new();

        loop {
            self.skip_newlines();
            match self.peek_kind() {
                None | Some(TokenKind::Fn) | Some(TokenKind::Source) => break,

                Some(TokenKind::Cell) => {
                    self.advance();
                    let (cell, _) = self.parse_ident()?;
                    self.expect(&TokenKind::Assign)?;
                    let value = self.parse_literal()?;
                    self.end_line()?;
                    cells.push((cell, value));
                }

                Some(TokenKind::Global) => {
                    self.advance();
                    let (global, _) = self.parse_ident()?;
                    self.expect(&TokenKind::Assign)?;
                    let value = self.parse_literal()?;
                    self.end_line()?;
                    globals.push((global, value));
                }

                Some(TokenKind::Ident(_)) => {
                    let (word, span) = self.parse_ident()?;
                    if self.check(&TokenKind::Colon) {
                        self.advance();
                        self.end_line()?;
                        lines.push(Line::Label { name: word, span });
                    } else {
                        let arg = self.parse_arg(&word)?;
                        self.end_line()?;
                        lines.push(Line::Inst { opname: word, arg });
                    }
                }

                Some(_) => {
                    let token = self.peek().unwrap().clone();
                    return Err(AsmError::unexpected_token(
                        token.span,
                        "an instruction, label, cell, or global",
                        format!("{}", token.kind),
                    ));
                }
            }
        }

        Ok(RawFn {
            name,
            params,
            cells,
            globals,
            lines,
        })
    }

    fn parse_arg(&mut self, opname: &str) -> Result<Option<Arg>, AsmError> {
        match arg_kind(opname) {
            ArgKind::ConstArg => {
                if self.check(&TokenKind::At) {
                    self.advance();
                    let (name, span) = self.parse_ident()?;
                    Ok(Some(Arg::CodeRef { name, span }))
                } else {
                    Ok(Some(Arg::Literal(self.parse_literal()?)))
                }
            }
            ArgKind::LocalArg | ArgKind::NameArg | ArgKind::DerefArg => {
                let (name, _) = self.parse_ident()?;
                Ok(Some(Arg::Name(name)))
            }
            ArgKind::CountArg => {
                // MAKE_FUNCTION takes no meaningful argument in this
                // stream; allow it to be omitted.
                if opname == "MAKE_FUNCTION" && self.at_line_end() {
                    return Ok(None);
                }
                Ok(Some(Arg::Count(self.parse_count()?)))
            }
            ArgKind::JumpArg => {
                let (name, span) = self.parse_ident()?;
                Ok(Some(Arg::LabelRef { name, span }))
            }
            ArgKind::CmpArg => {
                let index = match self.peek_kind() {
                    Some(TokenKind::Lt) => 0,
                    Some(TokenKind::Le) => 1,
                    Some(TokenKind::EqEq) => 2,
                    Some(TokenKind::Ne) => 3,
                    Some(TokenKind::Gt) => 4,
                    Some(TokenKind::Ge) => 5,
                    _ => {
                        return Err(self.mismatch("a comparison symbol"));
                    }
                };
                self.advance();
                Ok(Some(Arg::Cmp(index)))
            }
            ArgKind::FreeForm => {
                if self.at_line_end() {
                    Ok(None)
                } else {
                    Ok(Some(Arg::Count(self.parse_count()?)))
                }
            }
        }
    }

    fn parse_count(&mut self) -> Result<u32, AsmError> {
        match self.peek_kind() {
            Some(TokenKind::Int(n)) if n >= 0 => {
                self.advance();
                Ok(n as u32)
            }
            _ => Err(self.mismatch("a non-negative count")),
        }
    }

    fn parse_literal(&mut self) -> Result<Const, AsmError> {
        let value = match self.peek_kind() {
            Some(TokenKind::Int(n)) => Const::Int(n),
            Some(TokenKind::Float(f)) => Const::Float(f),
            Some(TokenKind::String(s)) => Const::Str(s),
            Some(TokenKind::True) => Const::Bool(true),
            Some(TokenKind::False) => Const::Bool(false),
            Some(TokenKind::None) => Const::None,
            _ => return Err(self.mismatch("a literal")),
        };
        self.advance();
        Ok(value)
    }

    fn parse_ident(&mut self) -> Result<(String, Span), AsmError> {
        match self.peek() {
            Some(token) => match &token.kind {
                TokenKind::Ident(name) => {
                    let result = (name.clone(), token.span);
                    self.advance();
                    Ok(result)
                }
                other => Err(AsmError::unexpected_token(
                    token.span,
                    "an identifier",
                    format!("{}", other),
                )),
            },
            None => Err(AsmError::unexpected_eof("an identifier")),
        }
    }

    // Second pass: resolve labels, pools and code references.

    fn build(&mut self, raws: &[RawFn]) -> Vec<Function> {
        let index: HashMap<&str, usize> = raws
            .iter()
            .enumerate()
            .map(|(i, raw)| (raw.name.as_str(), i))
            .collect();

        let mut built: Vec<Option<CodeObject>> = vec![None; raws.len()];
        let mut functions = Vec::new();

        for i in 0..raws.len() {
            let mut visiting = Vec::new();
            match build_code(i, raws, &index, &mut built, &mut visiting) {
                Ok(code) => {
                    let raw = &raws[i];
                    functions.push(Function {
                        code,
                        cells: raw.cells.clone(),
                        globals: raw.globals.iter().cloned().collect::<BTreeMap<_, _>>(),
                    });
                }
                Err(e) => self.errors.push(e.with_source(&self.source)),
            }
        }

        functions
    }

    // Token helpers

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind.clone())
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek_kind()
            .map(|k| std::mem::discriminant(&k) == std::mem::discriminant(kind))
            .unwrap_or(false)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, AsmError> {
        if self.check(kind) {
            let token = self.peek().unwrap().clone();
            self.advance();
            Ok(token)
        } else {
            Err(self.mismatch(&format!("{}", kind)))
        }
    }

    fn mismatch(&self, expected: &str) -> AsmError {
        match self.peek() {
            Some(token) => {
                AsmError::unexpected_token(token.span, expected, format!("{}", token.kind))
            }
            None => AsmError::unexpected_eof(expected),
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(self.peek_kind(), None | Some(TokenKind::Newline))
    }

    fn end_line(&mut self) -> Result<(), AsmError> {
        if self.is_at_end() {
            return Ok(());
        }
        self.expect(&TokenKind::Newline)?;
        Ok(())
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek_kind(), Some(TokenKind::Newline)) {
            self.advance();
        }
    }

    fn synchronize(&mut self) {
        while let Some(kind) = self.peek_kind() {
            if matches!(kind, TokenKind::Fn | TokenKind::Source) {
                return;
            }
            self.advance();
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

fn build_code(
    i: usize,
    raws: &[RawFn],
    index: &HashMap<&str, usize>,
    built: &mut Vec<Option<CodeObject>>,
    visiting: &mut Vec<usize>,
) -> Result<CodeObject, AsmError> {
    if let Some(code) = &built[i] {
        return Ok(code.clone());
    }
    visiting.push(i);

    let raw = &raws[i];

    // Labels map to the offset of the next instruction.
    let mut labels: HashMap<&str, u32> = HashMap::new();
    let mut inst_count = 0u32;
    for line in &raw.lines {
        match line {
            Line::Label { name, span } => {
                if labels.insert(name, 2 * inst_count).is_some() {
                    return Err(AsmError::DuplicateLabel {
                        src: String::new(),
                        span: (span.start, span.len()).into(),
                        name: name.clone(),
                    });
                }
            }
            Line::Inst { .. } => inst_count += 1,
        }
    }

    let mut consts: Vec<Const> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    let mut varnames: Vec<String> = raw.params.clone();
    let mut freevars: Vec<String> = raw.cells.iter().map(|(name, _)| name.clone()).collect();
    let mut instructions = Vec::new();

    let mut offset = 0u32;
    for line in &raw.lines {
        let Line::Inst { opname, arg } = line else {
            continue;
        };

        let raw_arg = match arg {
            None => None,
            Some(Arg::Count(n)) | Some(Arg::Cmp(n)) => Some(*n),
            Some(Arg::Literal(value)) => Some(intern_const(&mut consts, value.clone())),
            Some(Arg::CodeRef { name, span }) => {
                let Some(&j) = index.get(name.as_str()) else {
                    return Err(AsmError::UnknownFunction {
                        src: String::new(),
                        span: (span.start, span.len()).into(),
                        name: name.clone(),
                    });
                };
                if visiting.contains(&j) {
                    return Err(AsmError::RecursiveFunction {
                        src: String::new(),
                        span: (span.start, span.len()).into(),
                        name: name.clone(),
                    });
                }
                let code = build_code(j, raws, index, built, visiting)?;
                Some(intern_const(&mut consts, Const::Code(code)))
            }
            Some(Arg::Name(name)) => {
                let table = match arg_kind(opname) {
                    ArgKind::LocalArg => &mut varnames,
                    ArgKind::DerefArg => &mut freevars,
                    _ => &mut names,
                };
                Some(intern_name(table, name))
            }
            Some(Arg::LabelRef { name, span }) => match labels.get(name.as_str()) {
                Some(&target) => Some(target),
                None => {
                    return Err(AsmError::UnknownLabel {
                        src: String::new(),
                        span: (span.start, span.len()).into(),
                        name: name.clone(),
                    });
                }
            },
        };

        instructions.push(RawInst::new(offset, opname.clone(), raw_arg));
        offset += 2;
    }

    let code = CodeObject {
        name: raw.name.clone(),
        params: raw.params.clone(),
        consts,
        names,
        varnames,
        freevars,
        instructions,
    };

    visiting.pop();
    built[i] = Some(code.clone());
    Ok(code)
}

fn intern_const(consts: &mut Vec<Const>, value: Const) -> u32 {
    match consts.iter().position(|c| *c == value) {
        Some(i) => i as u32,
        None => {
            consts.push(value);
            (consts.len() - 1) as u32
        }
    }
}

fn intern_name(table: &mut Vec<String>, name: &str) -> u32 {
    match table.iter().position(|n| n == name) {
        Some(i) => i as u32,
        None => {
            table.push(name.to_string());
            (table.len() - 1) as u32
        }
    }
}
