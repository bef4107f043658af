//! Compact one-line rendering of QIR terms.

use std::fmt;

use crate::expr::{Expression, Operator, Value};

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Value(v) => write!(f, "{}", v),
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::Lambda(lambda) => {
                write!(f, "\u{03bb}{}. {}", lambda.parameter, lambda.body)
            }
            Expression::Application { .. } => {
                // Flatten curried application chains into f(a, b, ...).
                let mut args = Vec::new();
                let mut callee = self;
                while let Expression::Application { function, argument } = callee {
                    args.push(argument.as_ref());
                    callee = function.as_ref();
                }
                write!(f, "{}(", callee)?;
                for (i, arg) in args.iter().rev().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expression::Conditional {
                condition,
                on_true,
                on_false,
            } => write!(f, "if {} then {} else {}", condition, on_true, on_false),
            Expression::ListNil => write!(f, "[]"),
            Expression::ListCons { .. } => {
                write!(f, "[")?;
                let mut node = self;
                let mut first = true;
                loop {
                    match node {
                        Expression::ListCons { head, tail } => {
                            if !first {
                                write!(f, ", ")?;
                            }
                            first = false;
                            write!(f, "{}", head)?;
                            node = tail.as_ref();
                        }
                        Expression::ListNil => break,
                        other => {
                            // Improper tail, render it explicitly.
                            write!(f, " :: {}", other)?;
                            break;
                        }
                    }
                }
                write!(f, "]")
            }
            Expression::ListDestr {
                input,
                on_nil,
                on_cons,
            } => write!(f, "ListDestr({}, {}, {})", input, on_nil, on_cons),
            Expression::TupleNil => write!(f, "{{}}"),
            Expression::TupleCons { .. } => {
                write!(f, "{{")?;
                let mut node = self;
                let mut first = true;
                loop {
                    match node {
                        Expression::TupleCons { key, value, tail } => {
                            if !first {
                                write!(f, ", ")?;
                            }
                            first = false;
                            write!(f, "{}: {}", key, value)?;
                            node = tail.as_ref();
                        }
                        Expression::TupleNil => break,
                        other => {
                            write!(f, " :: {}", other)?;
                            break;
                        }
                    }
                }
                write!(f, "}}")
            }
            Expression::TupleDestr { input, key } => write!(f, "{}[{}]", input, key),
            Expression::Operator(op) => match op {
                Operator::Scan { table } => write!(f, "Scan({})", table),
                Operator::Select { input, filter } => {
                    write!(f, "Select({}, \u{03bb}{}. {})", input, filter.parameter, filter.body)
                }
                Operator::Project { input, format } => {
                    write!(f, "Project({}, \u{03bb}{}. {})", input, format.parameter, format.body)
                }
                Operator::Sort { input, comp } => {
                    write!(f, "Sort({}, \u{03bb}{}. {})", input, comp.parameter, comp.body)
                }
                Operator::Limit { input, count } => write!(f, "Limit({}, {})", input, count),
                Operator::Group { input, agg } => {
                    write!(f, "Group({}, \u{03bb}{}. {})", input, agg.parameter, agg.body)
                }
                Operator::Join {
                    left,
                    right,
                    filter,
                } => write!(
                    f,
                    "Join({}, {}, \u{03bb}{}. {})",
                    left, right, filter.parameter, filter.body
                ),
            },
            Expression::Builtin { module, name } => write!(f, "{}.{}", module, name),
            Expression::Reference { input, field } => write!(f, "{}.{}", input, field),
        }
    }
}
