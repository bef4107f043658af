//! Name resolution.
//!
//! Every free name the interpreter meets is classified here, consulting
//! in fixed order: local slots, captured cells, the injected table of
//! sources and user functions, the builtin table, and finally globals.
//! The first match wins; a name matching nothing is `UnresolvedName`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use quarry_bytecode::{Const, Function};
use quarry_qir::Expression;

use crate::error::TranslateError;

/// The injected translation context: known collection sources, registered
/// user functions, and the builtin table.
#[derive(Debug, Clone)]
pub struct Bindings {
    sources: BTreeSet<String>,
    functions: BTreeMap<String, Function>,
    builtins: BTreeMap<String, (String, String)>,
}

impl Default for Bindings {
    fn default() -> Self {
        Self::new()
    }
}

impl Bindings {
    /// Bindings with the default builtin table.
    pub fn new() -> Self {
        let mut builtins = BTreeMap::new();
        for name in [
            "add", "sub", "mul", "truediv", "mod", "pow", "and_", "or_", "not", "lt", "le",
            "eq", "ne", "ge", "gt",
        ] {
            builtins.insert(name.to_string(), ("operator".to_string(), name.to_string()));
        }
        for name in ["len", "range", "sum", "min", "max", "abs"] {
            builtins.insert(name.to_string(), ("builtins".to_string(), name.to_string()));
        }

        Self {
            sources: BTreeSet::new(),
            functions: BTreeMap::new(),
            builtins,
        }
    }

    /// Register a collection source; references to it become scans.
    pub fn add_source(&mut self, name: impl Into<String>) {
        self.sources.insert(name.into());
    }

    pub fn with_source(mut self, name: impl Into<String>) -> Self {
        self.add_source(name);
        self
    }

    /// Register a user-defined function; references to it are translated
    /// recursively and inlined.
    pub fn add_function(&mut self, function: Function) {
        self.functions
            .insert(function.code.name.clone(), function);
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.add_function(function);
        self
    }

    /// Register an extra builtin name.
    pub fn add_builtin(
        &mut self,
        name: impl Into<String>,
        module: impl Into<String>,
        symbol: impl Into<String>,
    ) {
        self.builtins
            .insert(name.into(), (module.into(), symbol.into()));
    }

    /// The source names, the expected free identifiers of any translated
    /// term.
    pub fn source_names(&self) -> &BTreeSet<String> {
        &self.sources
    }
}

/// What a name resolved to.
#[derive(Debug)]
pub(crate) enum Resolution {
    /// A finished QIR term.
    Expr(Expression),
    /// A user function to be translated recursively by the interpreter.
    UserFunction(Function),
}

pub(crate) struct Resolver<'a> {
    bindings: &'a Bindings,
    function: &'a Function,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(bindings: &'a Bindings, function: &'a Function) -> Self {
        Self { bindings, function }
    }

    pub(crate) fn resolve(
        &self,
        name: &str,
        locals: &HashMap<String, Expression>,
        offset: u32,
    ) -> Result<Resolution, TranslateError> {
        if let Some(bound) = locals.get(name) {
            return Ok(Resolution::Expr(bound.clone()));
        }

        if let Some(cell) = self.function.cell(name) {
            return encode_scalar(cell)
                .map(Resolution::Expr)
                .ok_or_else(|| unresolved(name, offset));
        }

        if self.bindings.sources.contains(name) {
            return Ok(Resolution::Expr(Expression::scan(name)));
        }

        if let Some(function) = self.bindings.functions.get(name) {
            return Ok(Resolution::UserFunction(function.clone()));
        }

        if let Some((module, symbol)) = self.bindings.builtins.get(name) {
            return Ok(Resolution::Expr(Expression::builtin(module, symbol)));
        }

        if let Some(global) = self.function.global(name) {
            return encode_scalar(global)
                .map(Resolution::Expr)
                .ok_or_else(|| unresolved(name, offset));
        }

        Err(unresolved(name, offset))
    }
}

fn unresolved(name: &str, offset: u32) -> TranslateError {
    TranslateError::UnresolvedName {
        name: name.to_string(),
        offset,
    }
}

/// Map a host scalar to its QIR literal. Integers that fit in 32 bits
/// become `Number`; wider ones become `Double`. Code objects are not
/// scalars.
pub(crate) fn encode_scalar(value: &Const) -> Option<Expression> {
    Some(match value {
        Const::None => Expression::null(),
        Const::Bool(b) => Expression::boolean(*b),
        Const::Int(i) => match i32::try_from(*i) {
            Ok(n) => Expression::number(n),
            Err(_) => Expression::double(*i as f64),
        },
        Const::Float(f) => Expression::double(*f),
        Const::Str(s) => Expression::string(s.clone()),
        Const::Code(_) => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_bytecode::CodeObject;

    fn empty_function() -> Function {
        Function::new(CodeObject {
            name: "f".to_string(),
            params: vec![],
            consts: vec![],
            names: vec![],
            varnames: vec![],
            freevars: vec![],
            instructions: vec![],
        })
    }

    #[test]
    fn test_locals_shadow_everything() {
        let bindings = Bindings::new().with_source("len");
        let function = empty_function();
        let resolver = Resolver::new(&bindings, &function);

        let mut locals = HashMap::new();
        locals.insert("len".to_string(), Expression::ident("len"));

        match resolver.resolve("len", &locals, 0).unwrap() {
            Resolution::Expr(Expression::Identifier(name)) => assert_eq!(name, "len"),
            _ => panic!("expected the local binding"),
        }
    }

    #[test]
    fn test_cell_resolves_to_literal() {
        let bindings = Bindings::new();
        let mut function = empty_function();
        function.cells.push(("salary".to_string(), Const::Int(1500)));
        let resolver = Resolver::new(&bindings, &function);

        match resolver.resolve("salary", &HashMap::new(), 0).unwrap() {
            Resolution::Expr(expr) => assert_eq!(expr, Expression::number(1500)),
            _ => panic!("expected a literal"),
        }
    }

    #[test]
    fn test_source_resolves_to_scan() {
        let bindings = Bindings::new().with_source("employees");
        let function = empty_function();
        let resolver = Resolver::new(&bindings, &function);

        match resolver.resolve("employees", &HashMap::new(), 0).unwrap() {
            Resolution::Expr(expr) => assert_eq!(expr, Expression::scan("employees")),
            _ => panic!("expected a scan"),
        }
    }

    #[test]
    fn test_builtin_table() {
        let bindings = Bindings::new();
        let function = empty_function();
        let resolver = Resolver::new(&bindings, &function);

        match resolver.resolve("len", &HashMap::new(), 0).unwrap() {
            Resolution::Expr(expr) => {
                assert_eq!(expr, Expression::builtin("builtins", "len"))
            }
            _ => panic!("expected a builtin"),
        }
    }

    #[test]
    fn test_unknown_name_fails_with_offset() {
        let bindings = Bindings::new();
        let function = empty_function();
        let resolver = Resolver::new(&bindings, &function);

        let err = resolver.resolve("ghost", &HashMap::new(), 12).unwrap_err();
        assert_eq!(
            err,
            TranslateError::UnresolvedName {
                name: "ghost".to_string(),
                offset: 12
            }
        );
    }

    #[test]
    fn test_wide_integers_become_doubles() {
        assert_eq!(
            encode_scalar(&Const::Int(5_000_000_000)),
            Some(Expression::double(5_000_000_000.0))
        );
        assert_eq!(
            encode_scalar(&Const::Int(i64::from(i32::MAX))),
            Some(Expression::number(i32::MAX))
        );
    }
}
