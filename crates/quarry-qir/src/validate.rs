//! Structural well-formedness checks.
//!
//! A term is well-formed when every `Identifier` occurrence (and every
//! `Reference` row variable) is bound by an enclosing lambda or appears in
//! the caller's set of expected free names.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::expr::{Expression, Lambda, Operator};

/// A well-formedness violation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidateError {
    #[error("unbound identifier: {0}")]
    UnboundIdentifier(String),

    #[error("unbound row variable: {0}")]
    UnboundRowVariable(String),
}

/// Check that `expr` is well-formed given the allowed free names.
pub fn validate(expr: &Expression, free: &BTreeSet<String>) -> Result<(), ValidateError> {
    let mut bound = Vec::new();
    check(expr, free, &mut bound)
}

fn is_bound(name: &str, free: &BTreeSet<String>, bound: &[String]) -> bool {
    bound.iter().any(|b| b == name) || free.contains(name)
}

fn check_lambda(
    lambda: &Lambda,
    free: &BTreeSet<String>,
    bound: &mut Vec<String>,
) -> Result<(), ValidateError> {
    bound.push(lambda.parameter.clone());
    let result = check(&lambda.body, free, bound);
    bound.pop();
    result
}

fn check(
    expr: &Expression,
    free: &BTreeSet<String>,
    bound: &mut Vec<String>,
) -> Result<(), ValidateError> {
    match expr {
        Expression::Value(_)
        | Expression::ListNil
        | Expression::TupleNil
        | Expression::Builtin { .. } => Ok(()),

        Expression::Identifier(name) => {
            if is_bound(name, free, bound) {
                Ok(())
            } else {
                Err(ValidateError::UnboundIdentifier(name.clone()))
            }
        }

        Expression::Reference { input, .. } => {
            if is_bound(input, free, bound) {
                Ok(())
            } else {
                Err(ValidateError::UnboundRowVariable(input.clone()))
            }
        }

        Expression::Lambda(lambda) => check_lambda(lambda, free, bound),

        Expression::Application { function, argument } => {
            check(function, free, bound)?;
            check(argument, free, bound)
        }

        Expression::Conditional {
            condition,
            on_true,
            on_false,
        } => {
            check(condition, free, bound)?;
            check(on_true, free, bound)?;
            check(on_false, free, bound)
        }

        Expression::ListCons { head, tail } => {
            check(head, free, bound)?;
            check(tail, free, bound)
        }

        Expression::ListDestr {
            input,
            on_nil,
            on_cons,
        } => {
            check(input, free, bound)?;
            check(on_nil, free, bound)?;
            check(on_cons, free, bound)
        }

        Expression::TupleCons { key, value, tail } => {
            check(key, free, bound)?;
            check(value, free, bound)?;
            check(tail, free, bound)
        }

        Expression::TupleDestr { input, key } => {
            check(input, free, bound)?;
            check(key, free, bound)
        }

        Expression::Operator(op) => match op {
            Operator::Scan { table } => {
                // The scanned name is an injected source, not a lambda
                // binding; it must be among the expected free names.
                check(table, free, bound)
            }
            Operator::Select { input, filter } => {
                check(input, free, bound)?;
                check_lambda(filter, free, bound)
            }
            Operator::Project { input, format } => {
                check(input, free, bound)?;
                check_lambda(format, free, bound)
            }
            Operator::Sort { input, comp } => {
                check(input, free, bound)?;
                check_lambda(comp, free, bound)
            }
            Operator::Limit { input, count } => {
                check(input, free, bound)?;
                check(count, free, bound)
            }
            Operator::Group { input, agg } => {
                check(input, free, bound)?;
                check_lambda(agg, free, bound)
            }
            Operator::Join {
                left,
                right,
                filter,
            } => {
                check(left, free, bound)?;
                check(right, free, bound)?;
                check_lambda(filter, free, bound)
            }
        },
    }
}
