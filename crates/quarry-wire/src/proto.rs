//! Wire message definitions.
//!
//! Written directly with prost derives so the tag assignments live in
//! the source rather than behind a codegen step. Tags are stable:
//! `Expression` is a union over 12 cases in data-model order, `Value`
//! over 5 scalar cases, and operator operands occupy fixed positional
//! slots. Do not renumber.

/// A QIR expression node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Expression {
    #[prost(oneof = "expression::Node", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12")]
    pub node: Option<expression::Node>,
}

pub mod expression {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Node {
        #[prost(message, tag = "1")]
        Value(super::Value),
        #[prost(message, tag = "2")]
        Identifier(super::Identifier),
        #[prost(message, tag = "3")]
        Lambda(Box<super::Lambda>),
        #[prost(message, tag = "4")]
        Application(Box<super::Application>),
        #[prost(message, tag = "5")]
        Conditional(Box<super::Conditional>),
        #[prost(message, tag = "6")]
        ListConstr(Box<super::ListConstr>),
        #[prost(message, tag = "7")]
        ListDestr(Box<super::ListDestr>),
        #[prost(message, tag = "8")]
        TupleConstr(Box<super::TupleConstr>),
        #[prost(message, tag = "9")]
        TupleDestr(Box<super::TupleDestr>),
        #[prost(message, tag = "10")]
        Operator(Box<super::Operator>),
        #[prost(message, tag = "11")]
        Builtin(super::Builtin),
        #[prost(message, tag = "12")]
        Reference(super::Reference),
    }
}

/// A scalar literal.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Value {
    #[prost(oneof = "value::Kind", tags = "1, 2, 3, 4, 5")]
    pub kind: Option<value::Kind>,
}

pub mod value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "1")]
        Null(super::Null),
        #[prost(int32, tag = "2")]
        Number(i32),
        #[prost(double, tag = "3")]
        Double(f64),
        #[prost(string, tag = "4")]
        String(String),
        #[prost(bool, tag = "5")]
        Boolean(bool),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Null {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Identifier {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Lambda {
    #[prost(string, tag = "1")]
    pub parameter: String,
    #[prost(message, optional, boxed, tag = "2")]
    pub body: Option<Box<Expression>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Application {
    #[prost(message, optional, boxed, tag = "1")]
    pub function: Option<Box<Expression>>,
    #[prost(message, optional, boxed, tag = "2")]
    pub argument: Option<Box<Expression>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Conditional {
    #[prost(message, optional, boxed, tag = "1")]
    pub condition: Option<Box<Expression>>,
    #[prost(message, optional, boxed, tag = "2")]
    pub on_true: Option<Box<Expression>>,
    #[prost(message, optional, boxed, tag = "3")]
    pub on_false: Option<Box<Expression>>,
}

/// List constructor. When `is_nil` is set, head and tail are absent.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListConstr {
    #[prost(bool, tag = "1")]
    pub is_nil: bool,
    #[prost(message, optional, boxed, tag = "2")]
    pub head: Option<Box<Expression>>,
    #[prost(message, optional, boxed, tag = "3")]
    pub tail: Option<Box<Expression>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListDestr {
    #[prost(message, optional, boxed, tag = "1")]
    pub input: Option<Box<Expression>>,
    #[prost(message, optional, boxed, tag = "2")]
    pub on_nil: Option<Box<Expression>>,
    #[prost(message, optional, boxed, tag = "3")]
    pub on_cons: Option<Box<Expression>>,
}

/// Tuple constructor. When `is_nil` is set, key, value and tail are
/// absent.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TupleConstr {
    #[prost(bool, tag = "1")]
    pub is_nil: bool,
    #[prost(message, optional, boxed, tag = "2")]
    pub key: Option<Box<Expression>>,
    #[prost(message, optional, boxed, tag = "3")]
    pub value: Option<Box<Expression>>,
    #[prost(message, optional, boxed, tag = "4")]
    pub tail: Option<Box<Expression>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TupleDestr {
    #[prost(message, optional, boxed, tag = "1")]
    pub input: Option<Box<Expression>>,
    #[prost(message, optional, boxed, tag = "2")]
    pub key: Option<Box<Expression>>,
}

/// A relational operator with fixed positional operand slots; unused
/// slots are absent.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Operator {
    #[prost(enumeration = "OperatorType", tag = "1")]
    pub op: i32,
    #[prost(message, optional, boxed, tag = "2")]
    pub first: Option<Box<Expression>>,
    #[prost(message, optional, boxed, tag = "3")]
    pub second: Option<Box<Expression>>,
    #[prost(message, optional, boxed, tag = "4")]
    pub third: Option<Box<Expression>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OperatorType {
    Unspecified = 0,
    Scan = 1,
    Select = 2,
    Project = 3,
    Sort = 4,
    Limit = 5,
    Group = 6,
    Join = 7,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Builtin {
    #[prost(string, tag = "1")]
    pub module: String,
    #[prost(string, tag = "2")]
    pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Reference {
    #[prost(string, tag = "1")]
    pub input: String,
    #[prost(string, tag = "2")]
    pub identifier: String,
}

/// The evaluator's answer: a reduced expression or a server-side error.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EvaluateReply {
    #[prost(oneof = "evaluate_reply::Result", tags = "1, 2")]
    pub result: Option<evaluate_reply::Result>,
}

pub mod evaluate_reply {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "1")]
        Expression(super::Expression),
        #[prost(string, tag = "2")]
        Error(String),
    }
}
