use crate::ast::{
    BinaryOperator, Expression, ExpressionKind, FunctionSignature, FunctionSignatureEvaluated,
    ParameterEvaluated,
};
use crate::error::{Error, ErrorKind};

/// Stack of compile-time integer bindings used to instantiate generic
/// signatures. Lookups search from the top, so inner bindings shadow outer ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metavariables {
    bindings: Vec<(String, i64)>,
}

impl Metavariables {
    pub fn new() -> Self {
        Metavariables::default()
    }

    pub fn from_bindings(names: &[String], values: &[i64]) -> Self {
        Metavariables {
            bindings: names.iter().cloned().zip(values.iter().copied()).collect(),
        }
    }

    pub fn push(&mut self, name: String, value: i64) {
        self.bindings.push((name, value));
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.bindings.truncate(len);
    }

    pub fn lookup(&self, name: &str) -> Option<i64> {
        self.bindings
            .iter()
            .rev()
            .find(|(bound, _)| bound == name)
            .map(|(_, value)| *value)
    }

    pub fn values(&self) -> Vec<i64> {
        self.bindings.iter().map(|(_, value)| *value).collect()
    }

    pub fn evaluate(&self, expression: &Expression) -> Result<i64, Error> {
        let overflow = || {
            Error::new(
                ErrorKind::Metavariable,
                "Overflow while evaluating metavariable expression",
                expression.span.clone(),
            )
        };

        match &expression.kind {
            ExpressionKind::Integer(value) => Ok(*value),
            ExpressionKind::Identifier(name) => self.lookup(name).ok_or_else(|| {
                Error::new(
                    ErrorKind::Metavariable,
                    format!("Metavariable {} is not bound here", name),
                    expression.span.clone(),
                )
            }),
            ExpressionKind::Binary {
                operator,
                left,
                right,
            } => {
                let l = self.evaluate(left)?;
                let r = self.evaluate(right)?;
                match operator {
                    BinaryOperator::Addition => l.checked_add(r).ok_or_else(overflow),
                    BinaryOperator::Subtraction => l.checked_sub(r).ok_or_else(overflow),
                    BinaryOperator::Multiplication => l.checked_mul(r).ok_or_else(overflow),
                    _ => Err(Error::new(
                        ErrorKind::Metavariable,
                        format!("Operator {} cannot be evaluated at compile time", operator),
                        expression.span.clone(),
                    )),
                }
            }
            ExpressionKind::Alloc(_) | ExpressionKind::Dereference(_) => Err(Error::new(
                ErrorKind::Metavariable,
                "Expression cannot be evaluated at compile time",
                expression.span.clone(),
            )),
        }
    }

    pub fn evaluate_signature(
        &self,
        signature: &FunctionSignature,
    ) -> Result<FunctionSignatureEvaluated, Error> {
        let parameters = signature
            .parameters
            .iter()
            .map(|parameter| {
                let size_in = self.evaluate(&parameter.size_in)?;
                let size_out = self.evaluate(&parameter.size_out)?;
                if size_in < 0 || size_out < 0 {
                    return Err(Error::new(
                        ErrorKind::Contract,
                        format!(
                            "Parameter {} has a negative size ({}:{})",
                            parameter.name, size_in, size_out
                        ),
                        parameter.span.clone(),
                    ));
                }
                Ok(ParameterEvaluated {
                    name: parameter.name.clone(),
                    ty: parameter.ty,
                    constant: parameter.constant,
                    size_in,
                    size_out,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(FunctionSignatureEvaluated { parameters })
    }
}
