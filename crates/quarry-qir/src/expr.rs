//! QIR node definitions.

/// A QIR expression.
///
/// All variants are immutable value trees; ownership is tree-structured
/// and equality is structural.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A literal constant.
    Value(Value),
    /// An occurrence of a bound variable.
    Identifier(String),
    /// A one-parameter anonymous function.
    ///
    /// Multi-argument functions are curried into nested lambdas.
    Lambda(Lambda),
    /// A function application.
    Application {
        function: Box<Expression>,
        argument: Box<Expression>,
    },
    /// An eager ternary.
    Conditional {
        condition: Box<Expression>,
        on_true: Box<Expression>,
        on_false: Box<Expression>,
    },
    /// The empty list constructor.
    ListNil,
    /// The (::) list constructor.
    ListCons {
        head: Box<Expression>,
        tail: Box<Expression>,
    },
    /// The list destructor.
    ///
    /// `on_cons` is a function of two arguments (head, tail), curried.
    ListDestr {
        input: Box<Expression>,
        on_nil: Box<Expression>,
        on_cons: Box<Expression>,
    },
    /// The empty tuple constructor.
    TupleNil,
    /// The (::) tuple constructor.
    ///
    /// Tuples are linked lists of (key, value) pairs ordered by insertion,
    /// so lists and tuples share their cons structure.
    TupleCons {
        key: Box<Expression>,
        value: Box<Expression>,
        tail: Box<Expression>,
    },
    /// The tuple key accessor.
    TupleDestr {
        input: Box<Expression>,
        key: Box<Expression>,
    },
    /// A relational-algebra operator.
    Operator(Operator),
    /// A reference to a known external function, e.g. `operator.add`.
    Builtin { module: String, name: String },
    /// A column reference inside a row variable, e.g. `e.name`.
    Reference { input: String, field: String },
}

/// A one-parameter anonymous function.
///
/// Kept as its own struct so operator constructors can require a lambda
/// operand by type.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub parameter: String,
    pub body: Box<Expression>,
}

impl Lambda {
    pub fn new(parameter: impl Into<String>, body: Expression) -> Self {
        Self {
            parameter: parameter.into(),
            body: Box::new(body),
        }
    }
}

/// A QIR scalar value.
///
/// Values are the basic building blocks of the QIR data model, independent
/// of both the host language and the target database. Integers are 32-bit;
/// wider host integers are represented as `Double`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Number(i32),
    Double(f64),
    String(String),
    Boolean(bool),
}

/// A relational-algebra operator.
///
/// Operators represent computations on collections. Arities are fixed per
/// variant: filtering and projecting operators pair an input with a lambda
/// from a row to a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// The unordered contents of a named collection.
    Scan { table: Box<Expression> },
    /// Rows of `input` for which `filter` reduces to true.
    Select {
        input: Box<Expression>,
        filter: Lambda,
    },
    /// `format` applied to every row of `input`.
    Project {
        input: Box<Expression>,
        format: Lambda,
    },
    /// Rows of `input` ordered by `comp` ascending.
    Sort {
        input: Box<Expression>,
        comp: Lambda,
    },
    /// The first `count` rows of `input`.
    Limit {
        input: Box<Expression>,
        count: Box<Expression>,
    },
    /// Rows of `input` partitioned and aggregated by `agg`.
    Group {
        input: Box<Expression>,
        agg: Lambda,
    },
    /// Pairs from `left` x `right` for which `filter` reduces to true.
    Join {
        left: Box<Expression>,
        right: Box<Expression>,
        filter: Lambda,
    },
}

/// Operator discriminants, with the stable wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Scan,
    Select,
    Project,
    Sort,
    Limit,
    Group,
    Join,
}

impl OperatorKind {
    /// The wire enumeration code for this operator.
    pub fn code(self) -> i32 {
        match self {
            OperatorKind::Scan => 1,
            OperatorKind::Select => 2,
            OperatorKind::Project => 3,
            OperatorKind::Sort => 4,
            OperatorKind::Limit => 5,
            OperatorKind::Group => 6,
            OperatorKind::Join => 7,
        }
    }
}

impl Operator {
    pub fn kind(&self) -> OperatorKind {
        match self {
            Operator::Scan { .. } => OperatorKind::Scan,
            Operator::Select { .. } => OperatorKind::Select,
            Operator::Project { .. } => OperatorKind::Project,
            Operator::Sort { .. } => OperatorKind::Sort,
            Operator::Limit { .. } => OperatorKind::Limit,
            Operator::Group { .. } => OperatorKind::Group,
            Operator::Join { .. } => OperatorKind::Join,
        }
    }
}

impl Expression {
    pub fn null() -> Self {
        Expression::Value(Value::Null)
    }

    pub fn number(value: i32) -> Self {
        Expression::Value(Value::Number(value))
    }

    pub fn double(value: f64) -> Self {
        Expression::Value(Value::Double(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::Value(Value::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Expression::Value(Value::Boolean(value))
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expression::Identifier(name.into())
    }

    pub fn lambda(parameter: impl Into<String>, body: Expression) -> Self {
        Expression::Lambda(Lambda::new(parameter, body))
    }

    pub fn apply(function: Expression, argument: Expression) -> Self {
        Expression::Application {
            function: Box::new(function),
            argument: Box::new(argument),
        }
    }

    /// Curried two-argument application, the shape every binary builtin
    /// takes.
    pub fn apply2(function: Expression, left: Expression, right: Expression) -> Self {
        Expression::apply(Expression::apply(function, left), right)
    }

    pub fn conditional(condition: Expression, on_true: Expression, on_false: Expression) -> Self {
        Expression::Conditional {
            condition: Box::new(condition),
            on_true: Box::new(on_true),
            on_false: Box::new(on_false),
        }
    }

    pub fn cons(head: Expression, tail: Expression) -> Self {
        Expression::ListCons {
            head: Box::new(head),
            tail: Box::new(tail),
        }
    }

    /// Fold items right-to-left into a cons chain, preserving order.
    pub fn list(items: Vec<Expression>) -> Self {
        items
            .into_iter()
            .rev()
            .fold(Expression::ListNil, |tail, head| Expression::cons(head, tail))
    }

    pub fn tuple_cons(key: Expression, value: Expression, tail: Expression) -> Self {
        Expression::TupleCons {
            key: Box::new(key),
            value: Box::new(value),
            tail: Box::new(tail),
        }
    }

    /// Fold key/value pairs right-to-left so the first pair is outermost,
    /// preserving declaration order.
    pub fn record(pairs: Vec<(Expression, Expression)>) -> Self {
        pairs
            .into_iter()
            .rev()
            .fold(Expression::TupleNil, |tail, (key, value)| {
                Expression::tuple_cons(key, value, tail)
            })
    }

    pub fn list_destr(input: Expression, on_nil: Expression, on_cons: Expression) -> Self {
        Expression::ListDestr {
            input: Box::new(input),
            on_nil: Box::new(on_nil),
            on_cons: Box::new(on_cons),
        }
    }

    pub fn tuple_destr(input: Expression, key: Expression) -> Self {
        Expression::TupleDestr {
            input: Box::new(input),
            key: Box::new(key),
        }
    }

    pub fn builtin(module: impl Into<String>, name: impl Into<String>) -> Self {
        Expression::Builtin {
            module: module.into(),
            name: name.into(),
        }
    }

    pub fn reference(input: impl Into<String>, field: impl Into<String>) -> Self {
        Expression::Reference {
            input: input.into(),
            field: field.into(),
        }
    }

    /// A scan of a named collection source.
    pub fn scan(table: impl Into<String>) -> Self {
        Expression::Operator(Operator::Scan {
            table: Box::new(Expression::ident(table)),
        })
    }

    pub fn select(input: Expression, filter: Lambda) -> Self {
        Expression::Operator(Operator::Select {
            input: Box::new(input),
            filter,
        })
    }

    pub fn project(input: Expression, format: Lambda) -> Self {
        Expression::Operator(Operator::Project {
            input: Box::new(input),
            format,
        })
    }

    pub fn sort(input: Expression, comp: Lambda) -> Self {
        Expression::Operator(Operator::Sort {
            input: Box::new(input),
            comp,
        })
    }

    pub fn limit(input: Expression, count: Expression) -> Self {
        Expression::Operator(Operator::Limit {
            input: Box::new(input),
            count: Box::new(count),
        })
    }

    pub fn group(input: Expression, agg: Lambda) -> Self {
        Expression::Operator(Operator::Group {
            input: Box::new(input),
            agg,
        })
    }

    pub fn join(left: Expression, right: Expression, filter: Lambda) -> Self {
        Expression::Operator(Operator::Join {
            left: Box::new(left),
            right: Box::new(right),
            filter,
        })
    }

    /// Pre-order traversal over the expression tree.
    pub fn walk(&self, visit: &mut impl FnMut(&Expression)) {
        visit(self);
        match self {
            Expression::Value(_)
            | Expression::Identifier(_)
            | Expression::ListNil
            | Expression::TupleNil
            | Expression::Builtin { .. }
            | Expression::Reference { .. } => {}
            Expression::Lambda(lambda) => lambda.body.walk(visit),
            Expression::Application { function, argument } => {
                function.walk(visit);
                argument.walk(visit);
            }
            Expression::Conditional {
                condition,
                on_true,
                on_false,
            } => {
                condition.walk(visit);
                on_true.walk(visit);
                on_false.walk(visit);
            }
            Expression::ListCons { head, tail } => {
                head.walk(visit);
                tail.walk(visit);
            }
            Expression::ListDestr {
                input,
                on_nil,
                on_cons,
            } => {
                input.walk(visit);
                on_nil.walk(visit);
                on_cons.walk(visit);
            }
            Expression::TupleCons { key, value, tail } => {
                key.walk(visit);
                value.walk(visit);
                tail.walk(visit);
            }
            Expression::TupleDestr { input, key } => {
                input.walk(visit);
                key.walk(visit);
            }
            Expression::Operator(op) => match op {
                Operator::Scan { table } => table.walk(visit),
                Operator::Select { input, filter } => {
                    input.walk(visit);
                    filter.body.walk(visit);
                }
                Operator::Project { input, format } => {
                    input.walk(visit);
                    format.body.walk(visit);
                }
                Operator::Sort { input, comp } => {
                    input.walk(visit);
                    comp.body.walk(visit);
                }
                Operator::Limit { input, count } => {
                    input.walk(visit);
                    count.walk(visit);
                }
                Operator::Group { input, agg } => {
                    input.walk(visit);
                    agg.body.walk(visit);
                }
                Operator::Join {
                    left,
                    right,
                    filter,
                } => {
                    left.walk(visit);
                    right.walk(visit);
                    filter.body.walk(visit);
                }
            },
        }
    }
}
