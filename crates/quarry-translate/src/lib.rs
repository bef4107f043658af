//! Quarry Translate
//!
//! Lifts a host function object into a QIR term by symbolic abstract
//! interpretation of its bytecode. The accepted fragment is
//! expression-oriented: comparisons, arithmetic, attribute access,
//! container construction, boolean and conditional expressions, and
//! comprehensions over registered collection sources.

pub mod error;
pub mod resolve;
pub mod cache;
mod interp;

pub use cache::TranslationCache;
pub use error::TranslateError;
pub use interp::Options;
pub use resolve::Bindings;

use quarry_bytecode::Function;
use quarry_qir::Expression;

use crate::interp::Interpreter;

/// Translate a function object against the injected bindings.
pub fn translate(function: &Function, bindings: &Bindings) -> Result<Expression, TranslateError> {
    translate_with(function, bindings, &Options::default())
}

/// Translate with explicit options.
pub fn translate_with(
    function: &Function,
    bindings: &Bindings,
    options: &Options,
) -> Result<Expression, TranslateError> {
    tracing::debug!(function = %function.code.name, "translating");
    let interpreter = Interpreter::new(bindings, options);
    let term = interpreter.translate_function(function)?;
    tracing::debug!(function = %function.code.name, term = %term, "translated");
    Ok(term)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_bytecode::assemble;
    use quarry_qir::{validate, Expression, Lambda};

    // Test helpers: assemble a file, register its sources and its
    // non-entry functions, translate the entry.

    fn setup(source: &str) -> (Function, Bindings) {
        let program = assemble(source).expect("assembly failed");
        let entry = program.entry().expect("no functions").clone();

        let mut bindings = Bindings::new();
        for name in &program.sources {
            bindings.add_source(name.clone());
        }
        for function in &program.functions {
            if function.code.name != entry.code.name {
                bindings.add_function(function.clone());
            }
        }

        (entry, bindings)
    }

    fn translate_source(source: &str) -> Result<Expression, TranslateError> {
        let (entry, bindings) = setup(source);
        translate(&entry, &bindings)
    }

    fn op(name: &str) -> Expression {
        Expression::builtin("operator", name)
    }

    #[test]
    fn test_constant_addition() {
        let term = translate_source(
            "fn one_plus_two()\n\
             \x20   LOAD_CONST 1\n\
             \x20   LOAD_CONST 2\n\
             \x20   BINARY_ADD\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(
            term,
            Expression::apply2(op("add"), Expression::number(1), Expression::number(2))
        );
    }

    #[test]
    fn test_parameter_becomes_lambda() {
        let term = translate_source(
            "fn double(x)\n\
             \x20   LOAD_FAST x\n\
             \x20   LOAD_CONST 2\n\
             \x20   BINARY_MULTIPLY\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(
            term,
            Expression::lambda(
                "x",
                Expression::apply2(op("mul"), Expression::ident("x"), Expression::number(2)),
            )
        );
    }

    #[test]
    fn test_multiple_parameters_curry() {
        let term = translate_source(
            "fn add(x, y)\n\
             \x20   LOAD_FAST x\n\
             \x20   LOAD_FAST y\n\
             \x20   BINARY_ADD\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(
            term,
            Expression::lambda(
                "x",
                Expression::lambda(
                    "y",
                    Expression::apply2(op("add"), Expression::ident("x"), Expression::ident("y")),
                ),
            )
        );
    }

    const FILTERED_NAMES: &str = "source employees\n\
         \n\
         fn row(.0)\n\
         \x20   BUILD_LIST 0\n\
         \x20   LOAD_FAST .0\n\
         loop:\n\
         \x20   FOR_ITER end\n\
         \x20   STORE_FAST e\n\
         \x20   LOAD_FAST e\n\
         \x20   LOAD_ATTR salary\n\
         \x20   LOAD_CONST 1000\n\
         \x20   COMPARE_OP <\n\
         \x20   POP_JUMP_IF_FALSE loop\n\
         \x20   LOAD_CONST \"name\"\n\
         \x20   LOAD_FAST e\n\
         \x20   LOAD_ATTR name\n\
         \x20   BUILD_MAP 1\n\
         \x20   LIST_APPEND 2\n\
         \x20   JUMP_ABSOLUTE loop\n\
         end:\n\
         \x20   RETURN_VALUE\n\
         \n\
         fn cheap_names()\n\
         \x20   LOAD_CONST @row\n\
         \x20   MAKE_FUNCTION\n\
         \x20   LOAD_GLOBAL employees\n\
         \x20   GET_ITER\n\
         \x20   CALL_FUNCTION 1\n\
         \x20   RETURN_VALUE\n";

    #[test]
    fn test_comprehension_lifts_to_select_project() {
        let term = translate_source(FILTERED_NAMES).unwrap();

        let expected = Expression::project(
            Expression::select(
                Expression::scan("employees"),
                Lambda::new(
                    "e",
                    Expression::apply2(
                        op("lt"),
                        Expression::reference("e", "salary"),
                        Expression::number(1000),
                    ),
                ),
            ),
            Lambda::new(
                "e",
                Expression::record(vec![(
                    Expression::string("name"),
                    Expression::reference("e", "name"),
                )]),
            ),
        );

        assert_eq!(term, expected);
    }

    #[test]
    fn test_translated_terms_are_well_formed() {
        let (entry, bindings) = setup(FILTERED_NAMES);
        let term = translate(&entry, &bindings).unwrap();
        validate(&term, bindings.source_names()).unwrap();
    }

    #[test]
    fn test_closure_capture_inlines_cell_value() {
        let term = translate_source(
            "source employees\n\
             \n\
             fn row(.0)\n\
             \x20   BUILD_LIST 0\n\
             \x20   LOAD_FAST .0\n\
             loop:\n\
             \x20   FOR_ITER end\n\
             \x20   STORE_FAST e\n\
             \x20   LOAD_FAST e\n\
             \x20   LOAD_ATTR salary\n\
             \x20   LOAD_DEREF salary\n\
             \x20   COMPARE_OP <\n\
             \x20   POP_JUMP_IF_FALSE loop\n\
             \x20   LOAD_FAST e\n\
             \x20   LOAD_ATTR name\n\
             \x20   LIST_APPEND 2\n\
             \x20   JUMP_ABSOLUTE loop\n\
             end:\n\
             \x20   RETURN_VALUE\n\
             \n\
             fn at_least()\n\
             \x20 cell salary = 1500\n\
             \x20   LOAD_CONST @row\n\
             \x20   MAKE_FUNCTION\n\
             \x20   LOAD_GLOBAL employees\n\
             \x20   GET_ITER\n\
             \x20   CALL_FUNCTION 1\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        let expected = Expression::project(
            Expression::select(
                Expression::scan("employees"),
                Lambda::new(
                    "e",
                    Expression::apply2(
                        op("lt"),
                        Expression::reference("e", "salary"),
                        Expression::number(1500),
                    ),
                ),
            ),
            Lambda::new("e", Expression::reference("e", "name")),
        );

        assert_eq!(term, expected);
    }

    #[test]
    fn test_conditional_expression() {
        let term = translate_source(
            "fn pick(x)\n\
             \x20   LOAD_FAST x\n\
             \x20   POP_JUMP_IF_FALSE alt\n\
             \x20   LOAD_CONST 1\n\
             \x20   JUMP_FORWARD done\n\
             alt:\n\
             \x20   LOAD_CONST 0\n\
             done:\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(
            term,
            Expression::lambda(
                "x",
                Expression::conditional(
                    Expression::ident("x"),
                    Expression::number(1),
                    Expression::number(0),
                ),
            )
        );
    }

    #[test]
    fn test_conditional_with_both_arms_returning() {
        let term = translate_source(
            "fn sign(x)\n\
             \x20   LOAD_FAST x\n\
             \x20   POP_JUMP_IF_FALSE alt\n\
             \x20   LOAD_CONST 1\n\
             \x20   RETURN_VALUE\n\
             alt:\n\
             \x20   LOAD_CONST 0\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(
            term,
            Expression::lambda(
                "x",
                Expression::conditional(
                    Expression::ident("x"),
                    Expression::number(1),
                    Expression::number(0),
                ),
            )
        );
    }

    #[test]
    fn test_short_circuit_and() {
        let term = translate_source(
            "fn both(x, y)\n\
             \x20   LOAD_FAST x\n\
             \x20   JUMP_IF_FALSE_OR_POP done\n\
             \x20   LOAD_FAST y\n\
             done:\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(
            term,
            Expression::lambda(
                "x",
                Expression::lambda(
                    "y",
                    Expression::conditional(
                        Expression::ident("x"),
                        Expression::ident("y"),
                        Expression::ident("x"),
                    ),
                ),
            )
        );
    }

    #[test]
    fn test_short_circuit_or() {
        let term = translate_source(
            "fn either(x, y)\n\
             \x20   LOAD_FAST x\n\
             \x20   JUMP_IF_TRUE_OR_POP done\n\
             \x20   LOAD_FAST y\n\
             done:\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(
            term,
            Expression::lambda(
                "x",
                Expression::lambda(
                    "y",
                    Expression::conditional(
                        Expression::ident("x"),
                        Expression::ident("x"),
                        Expression::ident("y"),
                    ),
                ),
            )
        );
    }

    #[test]
    fn test_unsupported_opcode_fails_with_offset() {
        let err = translate_source(
            "fn risky()\n\
             \x20   SETUP_FINALLY 8\n\
             \x20   LOAD_CONST 1\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap_err();

        assert_eq!(
            err,
            TranslateError::UnsupportedOpcode {
                opname: "SETUP_FINALLY".to_string(),
                offset: 0,
            }
        );
    }

    #[test]
    fn test_unreached_unsupported_opcode_is_fine() {
        // The dead arm after the returns is never interpreted.
        let term = translate_source(
            "fn fine(x)\n\
             \x20   LOAD_FAST x\n\
             \x20   RETURN_VALUE\n\
             \x20   SETUP_FINALLY 2\n",
        )
        .unwrap();
        assert_eq!(term, Expression::lambda("x", Expression::ident("x")));
    }

    #[test]
    fn test_empty_comprehension_source() {
        let term = translate_source(
            "fn body(.0)\n\
             \x20   BUILD_LIST 0\n\
             \x20   LOAD_FAST .0\n\
             loop:\n\
             \x20   FOR_ITER end\n\
             \x20   STORE_FAST x\n\
             \x20   LOAD_FAST x\n\
             \x20   LIST_APPEND 2\n\
             \x20   JUMP_ABSOLUTE loop\n\
             end:\n\
             \x20   RETURN_VALUE\n\
             \n\
             fn nothing()\n\
             \x20   LOAD_CONST @body\n\
             \x20   MAKE_FUNCTION\n\
             \x20   BUILD_LIST 0\n\
             \x20   GET_ITER\n\
             \x20   CALL_FUNCTION 1\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        // A comprehension over an empty literal list with zero guards.
        assert_eq!(
            term,
            Expression::project(
                Expression::ListNil,
                Lambda::new("x", Expression::ident("x")),
            )
        );
    }

    #[test]
    fn test_nested_for_composes_projections() {
        let term = translate_source(
            "source matrix\n\
             \n\
             fn rows(.0)\n\
             \x20   BUILD_LIST 0\n\
             \x20   LOAD_FAST .0\n\
             outer:\n\
             \x20   FOR_ITER end\n\
             \x20   STORE_FAST row\n\
             \x20   LOAD_FAST row\n\
             \x20   GET_ITER\n\
             inner:\n\
             \x20   FOR_ITER inner_end\n\
             \x20   STORE_FAST x\n\
             \x20   LOAD_FAST x\n\
             \x20   LIST_APPEND 3\n\
             \x20   JUMP_ABSOLUTE inner\n\
             inner_end:\n\
             \x20   JUMP_ABSOLUTE outer\n\
             end:\n\
             \x20   RETURN_VALUE\n\
             \n\
             fn flatten()\n\
             \x20   LOAD_CONST @rows\n\
             \x20   MAKE_FUNCTION\n\
             \x20   LOAD_GLOBAL matrix\n\
             \x20   GET_ITER\n\
             \x20   CALL_FUNCTION 1\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(
            term,
            Expression::project(
                Expression::scan("matrix"),
                Lambda::new(
                    "row",
                    Expression::project(
                        Expression::ident("row"),
                        Lambda::new("x", Expression::ident("x")),
                    ),
                ),
            )
        );
    }

    #[test]
    fn test_conditional_inside_projection() {
        let term = translate_source(
            "source employees\n\
             \n\
             fn row(.0)\n\
             \x20   BUILD_LIST 0\n\
             \x20   LOAD_FAST .0\n\
             loop:\n\
             \x20   FOR_ITER end\n\
             \x20   STORE_FAST e\n\
             \x20   LOAD_FAST e\n\
             \x20   LOAD_ATTR senior\n\
             \x20   POP_JUMP_IF_FALSE alt\n\
             \x20   LOAD_CONST 1\n\
             \x20   JUMP_FORWARD emit\n\
             alt:\n\
             \x20   LOAD_CONST 0\n\
             emit:\n\
             \x20   LIST_APPEND 2\n\
             \x20   JUMP_ABSOLUTE loop\n\
             end:\n\
             \x20   RETURN_VALUE\n\
             \n\
             fn flags()\n\
             \x20   LOAD_CONST @row\n\
             \x20   MAKE_FUNCTION\n\
             \x20   LOAD_GLOBAL employees\n\
             \x20   GET_ITER\n\
             \x20   CALL_FUNCTION 1\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(
            term,
            Expression::project(
                Expression::scan("employees"),
                Lambda::new(
                    "e",
                    Expression::conditional(
                        Expression::reference("e", "senior"),
                        Expression::number(1),
                        Expression::number(0),
                    ),
                ),
            )
        );
    }

    #[test]
    fn test_negated_guard() {
        let term = translate_source(
            "source employees\n\
             \n\
             fn row(.0)\n\
             \x20   BUILD_LIST 0\n\
             \x20   LOAD_FAST .0\n\
             loop:\n\
             \x20   FOR_ITER end\n\
             \x20   STORE_FAST e\n\
             \x20   LOAD_FAST e\n\
             \x20   LOAD_ATTR retired\n\
             \x20   POP_JUMP_IF_TRUE loop\n\
             \x20   LOAD_FAST e\n\
             \x20   LIST_APPEND 2\n\
             \x20   JUMP_ABSOLUTE loop\n\
             end:\n\
             \x20   RETURN_VALUE\n\
             \n\
             fn actives()\n\
             \x20   LOAD_CONST @row\n\
             \x20   MAKE_FUNCTION\n\
             \x20   LOAD_GLOBAL employees\n\
             \x20   GET_ITER\n\
             \x20   CALL_FUNCTION 1\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(
            term,
            Expression::project(
                Expression::select(
                    Expression::scan("employees"),
                    Lambda::new(
                        "e",
                        Expression::apply(
                            op("not"),
                            Expression::reference("e", "retired"),
                        ),
                    ),
                ),
                Lambda::new("e", Expression::ident("e")),
            )
        );
    }

    #[test]
    fn test_dict_comprehension_uses_map_add() {
        let term = translate_source(
            "source employees\n\
             \n\
             fn kv(.0)\n\
             \x20   BUILD_MAP 0\n\
             \x20   LOAD_FAST .0\n\
             loop:\n\
             \x20   FOR_ITER end\n\
             \x20   STORE_FAST e\n\
             \x20   LOAD_FAST e\n\
             \x20   LOAD_ATTR id\n\
             \x20   LOAD_FAST e\n\
             \x20   LOAD_ATTR name\n\
             \x20   MAP_ADD 2\n\
             \x20   JUMP_ABSOLUTE loop\n\
             end:\n\
             \x20   RETURN_VALUE\n\
             \n\
             fn index_names()\n\
             \x20   LOAD_CONST @kv\n\
             \x20   MAKE_FUNCTION\n\
             \x20   LOAD_GLOBAL employees\n\
             \x20   GET_ITER\n\
             \x20   CALL_FUNCTION 1\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(
            term,
            Expression::project(
                Expression::scan("employees"),
                Lambda::new(
                    "e",
                    Expression::tuple_cons(
                        Expression::reference("e", "id"),
                        Expression::reference("e", "name"),
                        Expression::TupleNil,
                    ),
                ),
            )
        );
    }

    #[test]
    fn test_user_function_is_translated_and_applied() {
        let term = translate_source(
            "fn double(x)\n\
             \x20   LOAD_FAST x\n\
             \x20   LOAD_CONST 2\n\
             \x20   BINARY_MULTIPLY\n\
             \x20   RETURN_VALUE\n\
             \n\
             fn use_double()\n\
             \x20   LOAD_GLOBAL double\n\
             \x20   LOAD_CONST 21\n\
             \x20   CALL_FUNCTION 1\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(
            term,
            Expression::apply(
                Expression::lambda(
                    "x",
                    Expression::apply2(op("mul"), Expression::ident("x"), Expression::number(2)),
                ),
                Expression::number(21),
            )
        );
    }

    #[test]
    fn test_builtin_call_curries() {
        let term = translate_source(
            "fn measure(x)\n\
             \x20   LOAD_GLOBAL len\n\
             \x20   LOAD_FAST x\n\
             \x20   CALL_FUNCTION 1\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(
            term,
            Expression::lambda(
                "x",
                Expression::apply(
                    Expression::builtin("builtins", "len"),
                    Expression::ident("x"),
                ),
            )
        );
    }

    #[test]
    fn test_captured_string_with_quote() {
        let term = translate_source(
            "fn quoted()\n\
             \x20 cell tag = \"say \\\"hi\\\"\"\n\
             \x20   LOAD_DEREF tag\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(term, Expression::string("say \"hi\""));
    }

    #[test]
    fn test_wide_integer_literal_becomes_double() {
        let term = translate_source(
            "fn wide()\n\
             \x20   LOAD_CONST 5000000000\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        assert_eq!(term, Expression::double(5_000_000_000.0));
    }

    #[test]
    fn test_translation_is_deterministic() {
        let (entry, bindings) = setup(FILTERED_NAMES);
        let first = translate(&entry, &bindings).unwrap();
        let second = translate(&entry, &bindings).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unresolved_name_carries_offset() {
        let err = translate_source(
            "fn lost()\n\
             \x20   LOAD_GLOBAL ghost\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap_err();

        assert_eq!(
            err,
            TranslateError::UnresolvedName {
                name: "ghost".to_string(),
                offset: 0,
            }
        );
    }

    #[test]
    fn test_stack_underflow_detected() {
        let err = translate_source(
            "fn broken()\n\
             \x20   BINARY_ADD\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap_err();

        assert_eq!(err, TranslateError::StackUnderflow(0));
    }

    #[test]
    fn test_instruction_limit() {
        let (entry, bindings) = setup(
            "fn spin()\n\
             \x20   LOAD_CONST 1\n\
             \x20   LOAD_CONST 2\n\
             \x20   BINARY_ADD\n\
             \x20   RETURN_VALUE\n",
        );

        let options = Options {
            instruction_limit: 2,
        };
        let err = translate_with(&entry, &bindings, &options).unwrap_err();
        assert!(matches!(err, TranslateError::TranslationLimitExceeded(_)));
    }

    #[test]
    fn test_bare_loop_statement_is_unsupported() {
        // A `for` statement outside a comprehension call is not in the
        // accepted fragment.
        let err = translate_source(
            "fn stmt(xs)\n\
             \x20   LOAD_FAST xs\n\
             \x20   GET_ITER\n\
             loop:\n\
             \x20   FOR_ITER end\n\
             \x20   STORE_FAST x\n\
             \x20   JUMP_ABSOLUTE loop\n\
             end:\n\
             \x20   LOAD_CONST none\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap_err();

        assert!(matches!(err, TranslateError::UnsupportedControlFlow(_)));
    }

    #[test]
    fn test_cache_returns_structurally_equal_terms() {
        let (entry, bindings) = setup(FILTERED_NAMES);
        let cache = TranslationCache::new();

        let first = cache.translate(&entry, &bindings).unwrap();
        let second = cache.translate(&entry, &bindings).unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_no_number_exceeds_i32() {
        let term = translate_source(
            "fn mixed()\n\
             \x20   LOAD_CONST 2147483647\n\
             \x20   LOAD_CONST 5000000000\n\
             \x20   BINARY_ADD\n\
             \x20   RETURN_VALUE\n",
        )
        .unwrap();

        term.walk(&mut |node| {
            if let Expression::Value(quarry_qir::Value::Number(n)) = node {
                assert!(*n <= i32::MAX);
            }
        });
    }
}
