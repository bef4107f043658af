//! Conversions between the in-memory QIR tree and the wire messages.
//!
//! Encoding is infallible. Decoding validates what the schema cannot
//! express: required operands must be present, operator codes must be
//! known, and operands that the data model types as lambdas must decode
//! to lambdas.

use quarry_qir as qir;
use thiserror::Error;

use crate::proto;

/// A wire decoding error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("empty expression node")]
    EmptyNode,

    #[error("empty value")]
    EmptyValue,

    #[error("unknown operator code: {0}")]
    UnknownOperator(i32),

    #[error("operator operand must be a lambda")]
    ExpectedLambda,
}

trait FromOptionalField<T> {
    fn required(self, field: &'static str) -> Result<T, WireError>;
}

impl<T> FromOptionalField<T> for Option<T> {
    fn required(self, field: &'static str) -> Result<T, WireError> {
        self.ok_or(WireError::MissingField(field))
    }
}

// Encoding

impl From<&qir::Value> for proto::Value {
    fn from(value: &qir::Value) -> Self {
        use proto::value::Kind;
        let kind = match value {
            qir::Value::Null => Kind::Null(proto::Null {}),
            qir::Value::Number(n) => Kind::Number(*n),
            qir::Value::Double(d) => Kind::Double(*d),
            qir::Value::String(s) => Kind::String(s.clone()),
            qir::Value::Boolean(b) => Kind::Boolean(*b),
        };
        proto::Value { kind: Some(kind) }
    }
}

fn boxed(expr: &qir::Expression) -> Option<Box<proto::Expression>> {
    Some(Box::new(expr.into()))
}

fn encode_lambda(lambda: &qir::Lambda) -> proto::Lambda {
    proto::Lambda {
        parameter: lambda.parameter.clone(),
        body: boxed(&lambda.body),
    }
}

/// A lambda operand in an expression slot.
fn lambda_slot(lambda: &qir::Lambda) -> Option<Box<proto::Expression>> {
    Some(Box::new(proto::Expression {
        node: Some(proto::expression::Node::Lambda(Box::new(encode_lambda(
            lambda,
        )))),
    }))
}

fn encode_operator(op: &qir::Operator) -> proto::Operator {
    use proto::OperatorType;
    let (code, first, second, third) = match op {
        qir::Operator::Scan { table } => (OperatorType::Scan, boxed(table), None, None),
        qir::Operator::Select { input, filter } => {
            (OperatorType::Select, boxed(input), lambda_slot(filter), None)
        }
        qir::Operator::Project { input, format } => {
            (OperatorType::Project, boxed(input), lambda_slot(format), None)
        }
        qir::Operator::Sort { input, comp } => {
            (OperatorType::Sort, boxed(input), lambda_slot(comp), None)
        }
        qir::Operator::Limit { input, count } => {
            (OperatorType::Limit, boxed(input), boxed(count), None)
        }
        qir::Operator::Group { input, agg } => {
            (OperatorType::Group, boxed(input), lambda_slot(agg), None)
        }
        qir::Operator::Join {
            left,
            right,
            filter,
        } => (
            OperatorType::Join,
            boxed(left),
            boxed(right),
            lambda_slot(filter),
        ),
    };

    proto::Operator {
        op: code as i32,
        first,
        second,
        third,
    }
}

impl From<&qir::Expression> for proto::Expression {
    fn from(expr: &qir::Expression) -> Self {
        use proto::expression::Node;
        let node = match expr {
            qir::Expression::Value(value) => Node::Value(value.into()),
            qir::Expression::Identifier(name) => Node::Identifier(proto::Identifier {
                name: name.clone(),
            }),
            qir::Expression::Lambda(lambda) => Node::Lambda(Box::new(encode_lambda(lambda))),
            qir::Expression::Application { function, argument } => {
                Node::Application(Box::new(proto::Application {
                    function: boxed(function),
                    argument: boxed(argument),
                }))
            }
            qir::Expression::Conditional {
                condition,
                on_true,
                on_false,
            } => Node::Conditional(Box::new(proto::Conditional {
                condition: boxed(condition),
                on_true: boxed(on_true),
                on_false: boxed(on_false),
            })),
            qir::Expression::ListNil => Node::ListConstr(Box::new(proto::ListConstr {
                is_nil: true,
                head: None,
                tail: None,
            })),
            qir::Expression::ListCons { head, tail } => {
                Node::ListConstr(Box::new(proto::ListConstr {
                    is_nil: false,
                    head: boxed(head),
                    tail: boxed(tail),
                }))
            }
            qir::Expression::ListDestr {
                input,
                on_nil,
                on_cons,
            } => Node::ListDestr(Box::new(proto::ListDestr {
                input: boxed(input),
                on_nil: boxed(on_nil),
                on_cons: boxed(on_cons),
            })),
            qir::Expression::TupleNil => Node::TupleConstr(Box::new(proto::TupleConstr {
                is_nil: true,
                key: None,
                value: None,
                tail: None,
            })),
            qir::Expression::TupleCons { key, value, tail } => {
                Node::TupleConstr(Box::new(proto::TupleConstr {
                    is_nil: false,
                    key: boxed(key),
                    value: boxed(value),
                    tail: boxed(tail),
                }))
            }
            qir::Expression::TupleDestr { input, key } => {
                Node::TupleDestr(Box::new(proto::TupleDestr {
                    input: boxed(input),
                    key: boxed(key),
                }))
            }
            qir::Expression::Operator(op) => Node::Operator(Box::new(encode_operator(op))),
            qir::Expression::Builtin { module, name } => Node::Builtin(proto::Builtin {
                module: module.clone(),
                name: name.clone(),
            }),
            qir::Expression::Reference { input, field } => Node::Reference(proto::Reference {
                input: input.clone(),
                identifier: field.clone(),
            }),
        };

        proto::Expression { node: Some(node) }
    }
}

// Decoding

fn decode_slot(
    slot: Option<Box<proto::Expression>>,
    field: &'static str,
) -> Result<qir::Expression, WireError> {
    (*slot.required(field)?).try_into()
}

fn decode_lambda(lambda: proto::Lambda) -> Result<qir::Lambda, WireError> {
    Ok(qir::Lambda {
        parameter: lambda.parameter,
        body: Box::new(decode_slot(lambda.body, "Lambda.body")?),
    })
}

fn expect_lambda(expr: qir::Expression) -> Result<qir::Lambda, WireError> {
    match expr {
        qir::Expression::Lambda(lambda) => Ok(lambda),
        _ => Err(WireError::ExpectedLambda),
    }
}

fn lambda_operand(
    slot: Option<Box<proto::Expression>>,
    field: &'static str,
) -> Result<qir::Lambda, WireError> {
    expect_lambda(decode_slot(slot, field)?)
}

fn decode_operator(op: proto::Operator) -> Result<qir::Operator, WireError> {
    use proto::OperatorType;
    let code =
        OperatorType::try_from(op.op).map_err(|_| WireError::UnknownOperator(op.op))?;

    Ok(match code {
        OperatorType::Unspecified => return Err(WireError::UnknownOperator(op.op)),
        OperatorType::Scan => qir::Operator::Scan {
            table: Box::new(decode_slot(op.first, "Operator.first")?),
        },
        OperatorType::Select => qir::Operator::Select {
            input: Box::new(decode_slot(op.first, "Operator.first")?),
            filter: lambda_operand(op.second, "Operator.second")?,
        },
        OperatorType::Project => qir::Operator::Project {
            input: Box::new(decode_slot(op.first, "Operator.first")?),
            format: lambda_operand(op.second, "Operator.second")?,
        },
        OperatorType::Sort => qir::Operator::Sort {
            input: Box::new(decode_slot(op.first, "Operator.first")?),
            comp: lambda_operand(op.second, "Operator.second")?,
        },
        OperatorType::Limit => qir::Operator::Limit {
            input: Box::new(decode_slot(op.first, "Operator.first")?),
            count: Box::new(decode_slot(op.second, "Operator.second")?),
        },
        OperatorType::Group => qir::Operator::Group {
            input: Box::new(decode_slot(op.first, "Operator.first")?),
            agg: lambda_operand(op.second, "Operator.second")?,
        },
        OperatorType::Join => qir::Operator::Join {
            left: Box::new(decode_slot(op.first, "Operator.first")?),
            right: Box::new(decode_slot(op.second, "Operator.second")?),
            filter: lambda_operand(op.third, "Operator.third")?,
        },
    })
}

impl TryFrom<proto::Value> for qir::Value {
    type Error = WireError;

    fn try_from(value: proto::Value) -> Result<Self, WireError> {
        use proto::value::Kind;
        Ok(match value.kind.ok_or(WireError::EmptyValue)? {
            Kind::Null(_) => qir::Value::Null,
            Kind::Number(n) => qir::Value::Number(n),
            Kind::Double(d) => qir::Value::Double(d),
            Kind::String(s) => qir::Value::String(s),
            Kind::Boolean(b) => qir::Value::Boolean(b),
        })
    }
}

impl TryFrom<proto::Expression> for qir::Expression {
    type Error = WireError;

    fn try_from(message: proto::Expression) -> Result<Self, WireError> {
        use proto::expression::Node;
        Ok(match message.node.ok_or(WireError::EmptyNode)? {
            Node::Value(value) => qir::Expression::Value(value.try_into()?),
            Node::Identifier(ident) => qir::Expression::Identifier(ident.name),
            Node::Lambda(lambda) => qir::Expression::Lambda(decode_lambda(*lambda)?),
            Node::Application(app) => {
                let app = *app;
                qir::Expression::Application {
                    function: Box::new(decode_slot(app.function, "Application.function")?),
                    argument: Box::new(decode_slot(app.argument, "Application.argument")?),
                }
            }
            Node::Conditional(cond) => {
                let cond = *cond;
                qir::Expression::Conditional {
                    condition: Box::new(decode_slot(cond.condition, "Conditional.condition")?),
                    on_true: Box::new(decode_slot(cond.on_true, "Conditional.on_true")?),
                    on_false: Box::new(decode_slot(cond.on_false, "Conditional.on_false")?),
                }
            }
            Node::ListConstr(list) => {
                let list = *list;
                if list.is_nil {
                    qir::Expression::ListNil
                } else {
                    qir::Expression::ListCons {
                        head: Box::new(decode_slot(list.head, "ListConstr.head")?),
                        tail: Box::new(decode_slot(list.tail, "ListConstr.tail")?),
                    }
                }
            }
            Node::ListDestr(destr) => {
                let destr = *destr;
                qir::Expression::ListDestr {
                    input: Box::new(decode_slot(destr.input, "ListDestr.input")?),
                    on_nil: Box::new(decode_slot(destr.on_nil, "ListDestr.on_nil")?),
                    on_cons: Box::new(decode_slot(destr.on_cons, "ListDestr.on_cons")?),
                }
            }
            Node::TupleConstr(tuple) => {
                let tuple = *tuple;
                if tuple.is_nil {
                    qir::Expression::TupleNil
                } else {
                    qir::Expression::TupleCons {
                        key: Box::new(decode_slot(tuple.key, "TupleConstr.key")?),
                        value: Box::new(decode_slot(tuple.value, "TupleConstr.value")?),
                        tail: Box::new(decode_slot(tuple.tail, "TupleConstr.tail")?),
                    }
                }
            }
            Node::TupleDestr(destr) => {
                let destr = *destr;
                qir::Expression::TupleDestr {
                    input: Box::new(decode_slot(destr.input, "TupleDestr.input")?),
                    key: Box::new(decode_slot(destr.key, "TupleDestr.key")?),
                }
            }
            Node::Operator(op) => qir::Expression::Operator(decode_operator(*op)?),
            Node::Builtin(builtin) => qir::Expression::Builtin {
                module: builtin.module,
                name: builtin.name,
            },
            Node::Reference(reference) => qir::Expression::Reference {
                input: reference.input,
                field: reference.identifier,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_qir::{Expression, Lambda};

    fn round_trip(expr: &Expression) -> Expression {
        let message: proto::Expression = expr.into();
        message.try_into().expect("decoding failed")
    }

    #[test]
    fn test_round_trip_scalars() {
        for expr in [
            Expression::null(),
            Expression::number(42),
            Expression::double(2.5),
            Expression::string("hello"),
            Expression::boolean(true),
        ] {
            assert_eq!(round_trip(&expr), expr);
        }
    }

    #[test]
    fn test_round_trip_string_with_quote() {
        let expr = Expression::string("say \"hi\"");
        assert_eq!(round_trip(&expr), expr);
    }

    #[test]
    fn test_round_trip_operator_tree() {
        let expr = Expression::project(
            Expression::select(
                Expression::scan("employees"),
                Lambda::new(
                    "e",
                    Expression::apply2(
                        Expression::builtin("operator", "lt"),
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
        assert_eq!(round_trip(&expr), expr);
    }

    #[test]
    fn test_round_trip_conditional_and_lists() {
        let expr = Expression::conditional(
            Expression::ident("x"),
            Expression::list(vec![Expression::number(1), Expression::number(2)]),
            Expression::ListNil,
        );
        assert_eq!(round_trip(&expr), expr);
    }

    #[test]
    fn test_round_trip_destructors() {
        let expr = Expression::list_destr(
            Expression::list(vec![Expression::number(1)]),
            Expression::number(0),
            Expression::lambda(
                "h",
                Expression::lambda("t", Expression::ident("h")),
            ),
        );
        assert_eq!(round_trip(&expr), expr);

        let expr = Expression::tuple_destr(
            Expression::record(vec![(Expression::string("k"), Expression::number(1))]),
            Expression::string("k"),
        );
        assert_eq!(round_trip(&expr), expr);
    }

    #[test]
    fn test_round_trip_remaining_operators() {
        let row = Lambda::new("r", Expression::reference("r", "age"));
        for expr in [
            Expression::sort(Expression::scan("users"), row.clone()),
            Expression::limit(Expression::scan("users"), Expression::number(10)),
            Expression::group(Expression::scan("users"), row.clone()),
            Expression::join(
                Expression::scan("users"),
                Expression::scan("orders"),
                Lambda::new("pair", Expression::boolean(true)),
            ),
        ] {
            assert_eq!(round_trip(&expr), expr);
        }
    }

    #[test]
    fn test_operator_codes_match_kinds() {
        let scan: proto::Expression = (&Expression::scan("t")).into();
        match scan.node {
            Some(proto::expression::Node::Operator(op)) => {
                assert_eq!(op.op, quarry_qir::OperatorKind::Scan.code());
            }
            other => panic!("expected operator node, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_operand_is_rejected() {
        let message = proto::Expression {
            node: Some(proto::expression::Node::Operator(Box::new(
                proto::Operator {
                    op: proto::OperatorType::Scan as i32,
                    first: None,
                    second: None,
                    third: None,
                },
            ))),
        };
        let result: Result<Expression, _> = message.try_into();
        assert_eq!(result, Err(WireError::MissingField("Operator.first")));
    }

    #[test]
    fn test_non_lambda_operand_is_rejected() {
        let message = proto::Expression {
            node: Some(proto::expression::Node::Operator(Box::new(
                proto::Operator {
                    op: proto::OperatorType::Select as i32,
                    first: Some(Box::new((&Expression::scan("t")).into())),
                    second: Some(Box::new((&Expression::number(1)).into())),
                    third: None,
                },
            ))),
        };
        let result: Result<Expression, _> = message.try_into();
        assert_eq!(result, Err(WireError::ExpectedLambda));
    }

    #[test]
    fn test_unknown_operator_code_is_rejected() {
        let message = proto::Expression {
            node: Some(proto::expression::Node::Operator(Box::new(
                proto::Operator {
                    op: 99,
                    first: None,
                    second: None,
                    third: None,
                },
            ))),
        };
        let result: Result<Expression, _> = message.try_into();
        assert_eq!(result, Err(WireError::UnknownOperator(99)));
    }

    #[test]
    fn test_wire_bytes_round_trip() {
        use prost::Message;

        let expr = Expression::apply2(
            Expression::builtin("operator", "add"),
            Expression::number(1),
            Expression::number(2),
        );
        let message: proto::Expression = (&expr).into();
        let bytes = message.encode_to_vec();
        let decoded = proto::Expression::decode(bytes.as_slice()).unwrap();
        let back: Expression = decoded.try_into().unwrap();
        assert_eq!(back, expr);
    }
}
