use crate::ast::{
    Expression, FunctionCall, FunctionDefinition, FunctionSignature, Parameter, Prototype,
    Statement, StatementKind, Type,
};
use crate::error::{Error, ErrorKind};
use crate::lexer::Token;
use crate::parser::Parser;
use crate::source::Span;

pub const FUNCTION_SYNTAX: &str =
    "func ^name[M, N](const a int, src ptr[N:0], dst ptr[0:M]) { ... }";

impl Parser<'_> {
    /// `func '^'? name metavars? '(' params ')' block`
    pub fn parse_function(&mut self) -> Result<Statement, Error> {
        let start = self.next("func expected")?.span;
        let external = self.eat(&Token::Caret).is_some();
        let (name, _) = self.expect_identifier(&format!(
            "Function name expected after func (syntax: {})",
            FUNCTION_SYNTAX
        ))?;
        let metavariables = self.parse_metavariable_list()?;
        let signature = self.parse_signature()?;
        let body = self.parse_block()?;
        let span = start.to(&body.span);

        Ok(Statement {
            kind: StatementKind::Function(FunctionDefinition {
                name,
                metavariables,
                signature,
                body,
                external,
            }),
            span,
        })
    }

    /// `proto name metavars? '(' params ')'`
    pub fn parse_prototype(&mut self) -> Result<Statement, Error> {
        let start = self.next("proto expected")?.span;
        let (name, _) = self.expect_identifier("Function name expected after proto")?;
        let metavariables = self.parse_metavariable_list()?;
        let signature = self.parse_signature()?;
        let span = start.to(&self.last_span);

        Ok(Statement {
            kind: StatementKind::Prototype(Prototype {
                name,
                metavariables,
                signature,
            }),
            span,
        })
    }

    /// `call name ('[' expr, ... ']')? '(' ident, ... ')'`
    pub fn parse_call(&mut self) -> Result<Statement, Error> {
        let start = self.next("call expected")?.span;
        let (name, _) = self.expect_identifier("Function name expected after call")?;

        let mut metavariables = vec![];
        if self.eat(&Token::LBracket).is_some() {
            loop {
                metavariables.push(self.parse_expression()?);
                if self.eat(&Token::Comma).is_none() {
                    break;
                }
            }
            self.expect(Token::RBracket, "] expected after metavariable bindings")?;
        }

        self.expect(Token::LParen, "( expected in function call")?;
        let mut arguments = vec![];
        if self.eat(&Token::RParen).is_none() {
            loop {
                arguments.push(self.expect_identifier("Identifier expected as call argument")?);
                if self.eat(&Token::Comma).is_none() {
                    break;
                }
            }
            self.expect(Token::RParen, ") expected at end of call arguments")?;
        }

        Ok(Statement {
            kind: StatementKind::Call(FunctionCall {
                name,
                metavariables,
                arguments,
            }),
            span: start.to(&self.last_span),
        })
    }

    fn parse_metavariable_list(&mut self) -> Result<Vec<String>, Error> {
        let mut metavariables = vec![];
        if self.eat(&Token::LBracket).is_none() {
            return Ok(metavariables);
        }
        loop {
            let (name, span) = self.expect_identifier("Metavariable name expected")?;
            if metavariables.contains(&name) {
                return Err(Error::new(
                    ErrorKind::Syntax,
                    format!("Metavariable {} declared twice", name),
                    span,
                ));
            }
            metavariables.push(name);
            if self.eat(&Token::Comma).is_none() {
                break;
            }
        }
        self.expect(Token::RBracket, "] expected after metavariable list")?;
        Ok(metavariables)
    }

    fn parse_signature(&mut self) -> Result<FunctionSignature, Error> {
        self.expect(Token::LParen, "( expected after function name")?;
        let mut parameters: Vec<Parameter> = vec![];
        if self.eat(&Token::RParen).is_some() {
            return Ok(FunctionSignature { parameters });
        }
        loop {
            let parameter = self.parse_parameter()?;
            if parameters.iter().any(|p| p.name == parameter.name) {
                return Err(Error::new(
                    ErrorKind::Syntax,
                    format!("Parameter {} declared twice", parameter.name),
                    parameter.span,
                ));
            }
            parameters.push(parameter);
            if self.eat(&Token::Comma).is_none() {
                break;
            }
        }
        self.expect(Token::RParen, ") expected at end of parameter list")?;
        Ok(FunctionSignature { parameters })
    }

    /// `const? name type ('[' in (':' out)? ']')?`
    fn parse_parameter(&mut self) -> Result<Parameter, Error> {
        let const_span = self.eat(&Token::KeywordConst);
        let constant = const_span.is_some();
        let (name, name_span) = self.expect_identifier("Parameter name expected")?;
        let start = const_span.unwrap_or(name_span);
        let (ty, type_span) = self.parse_type("Type expected after parameter name")?;

        let zero = || Expression::integer(0, type_span.clone());
        let Some(bracket) = self.eat(&Token::LBracket) else {
            return Ok(Parameter {
                name,
                ty,
                constant,
                size_in: zero(),
                size_out: zero(),
                span: start.to(&type_span),
            });
        };

        if ty != Type::Ptr {
            return Err(Error::new(
                ErrorKind::Syntax,
                "Size bounds are only allowed on ptr parameters",
                bracket,
            ));
        }

        let size_in = self.parse_expression()?;
        let size_out = if self.eat(&Token::Colon).is_some() {
            self.parse_expression()?
        } else {
            size_in.clone()
        };
        let end: Span = self.expect(Token::RBracket, "] expected after parameter sizes")?;

        Ok(Parameter {
            name,
            ty,
            constant,
            size_in,
            size_out,
            span: start.to(&end),
        })
    }
}
