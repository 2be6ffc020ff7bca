use crate::ast::{BinaryOperator, Expression, ExpressionKind};
use crate::error::{Error, ErrorKind};
use crate::lexer::Token;
use crate::parser::Parser;

impl Parser<'_> {
    pub fn parse_expression(&mut self) -> Result<Expression, Error> {
        let left = self.parse_additive()?;
        let operator = match self.peek() {
            Some(Token::Less) => BinaryOperator::Less,
            Some(Token::Equal) => BinaryOperator::Equal,
            _ => return Ok(left),
        };
        self.next("operator expected")?;
        let right = self.parse_additive()?;
        Ok(binary(operator, left, right))
    }

    fn parse_additive(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_term()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Plus) => BinaryOperator::Addition,
                Some(Token::Minus) => BinaryOperator::Subtraction,
                _ => return Ok(left),
            };
            self.next("operator expected")?;
            let right = self.parse_term()?;
            left = binary(operator, left, right);
        }
    }

    fn parse_term(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_unary()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Mul) => BinaryOperator::Multiplication,
                Some(Token::Div) => BinaryOperator::Division,
                _ => return Ok(left),
            };
            self.next("operator expected")?;
            let right = self.parse_unary()?;
            left = binary(operator, left, right);
        }
    }

    // Only literals may be negated: `-` followed by an integer.
    fn parse_unary(&mut self) -> Result<Expression, Error> {
        let Some(minus) = self.eat(&Token::Minus) else {
            return self.parse_primary();
        };
        let lexeme = self.next("Integer expected after unary minus")?;
        match lexeme.token {
            Token::Integer(value) => Ok(Expression::integer(-value, minus.to(&lexeme.span))),
            _ => Err(Error::new(
                ErrorKind::Syntax,
                "Integer expected after unary minus",
                lexeme.span,
            )),
        }
    }

    pub fn parse_primary(&mut self) -> Result<Expression, Error> {
        let lexeme = self.next("Identifier expected in primary expression")?;
        let span = lexeme.span;

        match lexeme.token {
            Token::Identifier(name) => Ok(Expression {
                kind: ExpressionKind::Identifier(name),
                span,
            }),
            Token::Integer(value) => Ok(Expression::integer(value, span)),
            Token::KeywordAlloc => {
                self.expect(Token::LParen, "( expected in alloc expression")?;
                let size = self.parse_expression()?;
                let end = self.expect(Token::RParen, ") expected in alloc expression")?;
                Ok(Expression {
                    kind: ExpressionKind::Alloc(Box::new(size)),
                    span: span.to(&end),
                })
            }
            Token::Dereference => {
                let operand = self.parse_primary()?;
                let span = span.to(&operand.span);
                Ok(Expression {
                    kind: ExpressionKind::Dereference(Box::new(operand)),
                    span,
                })
            }
            Token::LParen => {
                let inner = self.parse_expression()?;
                self.expect(Token::RParen, ") expected after expression")?;
                Ok(inner)
            }
            other => Err(Error::new(
                ErrorKind::Syntax,
                format!("Identifier expected in primary expression, found `{}`", other),
                span,
            )),
        }
    }
}

fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
    let span = left.span.to(&right.span);
    Expression {
        kind: ExpressionKind::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    }
}
