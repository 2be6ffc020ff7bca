use std::fmt;

use crate::source::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Ptr,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Ptr => f.write_str("ptr"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Block(Block),
    Asm(String),
    If(If),
    While(While),
    Function(FunctionDefinition),
    Prototype(Prototype),
    Definition {
        identifier: String,
        ty: Type,
    },
    Assignment {
        identifier: String,
        value: Expression,
    },
    Movement {
        identifier: String,
        value: Expression,
    },
    MovementString {
        identifier: String,
        value: String,
    },
    Assumption(Assumption),
    Free(Expression),
    Call(FunctionCall),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    /// Only the first branch is ever taken into account; the rest is
    /// reserved syntax.
    pub branches: Vec<(Expression, Block)>,
    pub else_body: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct While {
    pub condition: Expression,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub metavariables: Vec<String>,
    pub signature: FunctionSignature,
    pub body: Block,
    pub external: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub name: String,
    pub metavariables: Vec<String>,
    pub signature: FunctionSignature,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
    pub constant: bool,
    pub size_in: Expression,
    pub size_out: Expression,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignatureEvaluated {
    pub parameters: Vec<ParameterEvaluated>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterEvaluated {
    pub name: String,
    pub ty: Type,
    pub constant: bool,
    pub size_in: i64,
    pub size_out: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Assumption {
    Condition(Expression),
    Guard {
        condition: Expression,
        body: Block,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub metavariables: Vec<Expression>,
    pub arguments: Vec<(String, Span)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Identifier(String),
    Integer(i64),
    Alloc(Box<Expression>),
    Dereference(Box<Expression>),
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Less,
    Equal,
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinaryOperator::Addition => "+",
            BinaryOperator::Subtraction => "-",
            BinaryOperator::Multiplication => "*",
            BinaryOperator::Division => "/",
            BinaryOperator::Less => "<",
            BinaryOperator::Equal => "=",
        })
    }
}

impl Expression {
    pub fn integer(value: i64, span: Span) -> Self {
        Expression {
            kind: ExpressionKind::Integer(value),
            span,
        }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExpressionKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match &self.kind {
            ExpressionKind::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Matches `id`, `id + k` and `id - k` with a literal `k`, returning the
    /// identifier and the signed offset.
    pub fn as_offset_of(&self) -> Option<(&str, i64)> {
        match &self.kind {
            ExpressionKind::Identifier(name) => Some((name, 0)),
            ExpressionKind::Binary {
                operator: operator @ (BinaryOperator::Addition | BinaryOperator::Subtraction),
                left,
                right,
            } => {
                let name = left.as_identifier()?;
                let k = right.as_integer()?;
                match operator {
                    BinaryOperator::Addition => Some((name, k)),
                    _ => Some((name, -k)),
                }
            }
            _ => None,
        }
    }
}
