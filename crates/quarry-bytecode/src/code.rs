//! Host function and code-object model.
//!
//! Mirrors the shape of a compiled function in a dynamic host: a code
//! object carrying pools and a raw instruction stream, wrapped together
//! with the closure snapshot and the global environment taken at the
//! moment of translation.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// A constant in a code object's pool.
#[derive(Debug, Clone)]
pub enum Const {
    None,
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    /// An inner code object, the operand of `MAKE_FUNCTION`.
    Code(CodeObject),
}

// Floats compare and hash by bit pattern so closure snapshots can key a
// cache.
impl PartialEq for Const {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Const::None, Const::None) => true,
            (Const::Int(a), Const::Int(b)) => a == b,
            (Const::Float(a), Const::Float(b)) => a.to_bits() == b.to_bits(),
            (Const::Str(a), Const::Str(b)) => a == b,
            (Const::Bool(a), Const::Bool(b)) => a == b,
            (Const::Code(a), Const::Code(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Const {}

impl Hash for Const {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Const::None => {}
            Const::Int(v) => v.hash(state),
            Const::Float(v) => v.to_bits().hash(state),
            Const::Str(v) => v.hash(state),
            Const::Bool(v) => v.hash(state),
            Const::Code(v) => v.hash(state),
        }
    }
}

/// One raw instruction as the host compiler emitted it.
///
/// `opname` is the host-specific mnemonic; `arg` is a pool index, a count,
/// or an absolute jump-target offset depending on the opcode. The adapter
/// normalizes both away.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawInst {
    pub offset: u32,
    pub opname: String,
    pub arg: Option<u32>,
}

impl RawInst {
    pub fn new(offset: u32, opname: impl Into<String>, arg: Option<u32>) -> Self {
        Self {
            offset,
            opname: opname.into(),
            arg,
        }
    }
}

/// A compiled function body: pools, name tables and the raw instruction
/// stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeObject {
    pub name: String,
    /// Parameter names, in declaration order. Always a prefix of
    /// `varnames`.
    pub params: Vec<String>,
    /// The constant pool, indexed by `LOAD_CONST` arguments.
    pub consts: Vec<Const>,
    /// Global and attribute names.
    pub names: Vec<String>,
    /// Local slot names.
    pub varnames: Vec<String>,
    /// Free-variable names resolved against the enclosing closure.
    pub freevars: Vec<String>,
    pub instructions: Vec<RawInst>,
}

impl CodeObject {
    /// Whether this code object contains a loop, i.e. is a comprehension
    /// body rather than a plain nested function.
    pub fn has_loop(&self) -> bool {
        self.instructions.iter().any(|i| i.opname == "FOR_ITER")
    }
}

/// A function object: code plus the captured environment.
///
/// The closure snapshot is the tuple of values held in the function's
/// cells at the moment of translation; the translator inlines them as
/// literals.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub code: CodeObject,
    /// Free-variable cells, name to captured value, in cell order.
    pub cells: Vec<(String, Const)>,
    /// The global environment visible to the function.
    pub globals: BTreeMap<String, Const>,
}

impl Function {
    pub fn new(code: CodeObject) -> Self {
        Self {
            code,
            cells: Vec::new(),
            globals: BTreeMap::new(),
        }
    }

    /// Look up a captured cell by name.
    pub fn cell(&self, name: &str) -> Option<&Const> {
        self.cells
            .iter()
            .find(|(cell, _)| cell == name)
            .map(|(_, value)| value)
    }

    /// Look up a global by name.
    pub fn global(&self, name: &str) -> Option<&Const> {
        self.globals.get(name)
    }
}
