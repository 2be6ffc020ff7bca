use crate::ast::{Assumption, If, Statement, StatementKind, Type, While};
use crate::error::{Error, ErrorKind};
use crate::lexer::{Lexeme, Token};
use crate::parser::Parser;
use crate::source::Span;

impl Parser<'_> {
    pub fn parse_statement_into(&mut self, statements: &mut Vec<Statement>) -> Result<(), Error> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error_at_eof("Statement expected"));
        };

        match token {
            Token::Semicolon => {
                self.next("Statement expected")?;
            }
            Token::KeywordInclude => {
                let start = self.next("include expected")?.span;
                let (name, span) = self.expect_string("File name expected in include statement")?;
                let included = self.parse_include(&name, &start.to(&span))?;
                statements.extend(included.statements);
            }
            _ => statements.push(self.parse_statement()?),
        }
        Ok(())
    }

    pub fn parse_statement(&mut self) -> Result<Statement, Error> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error_at_eof("Statement expected"));
        };

        match token {
            Token::LBrace => {
                let block = self.parse_block()?;
                let span = block.span.clone();
                Ok(Statement {
                    kind: StatementKind::Block(block),
                    span,
                })
            }
            Token::KeywordAsm => {
                let start = self.next("asm expected")?.span;
                let (code, end) = self.expect_string("String expected in asm statement")?;
                Ok(Statement {
                    kind: StatementKind::Asm(code),
                    span: start.to(&end),
                })
            }
            Token::KeywordIf => self.parse_if(),
            Token::KeywordWhile => self.parse_while(),
            Token::KeywordDef => self.parse_definition(),
            Token::KeywordFunc => self.parse_function(),
            Token::KeywordProto => self.parse_prototype(),
            Token::KeywordAssume => self.parse_assumption(),
            Token::KeywordFree => {
                let start = self.next("free expected")?.span;
                self.expect(Token::LParen, "( expected in free statement")?;
                let argument = self.parse_expression()?;
                let end = self.expect(Token::RParen, ") expected in free statement")?;
                Ok(Statement {
                    kind: StatementKind::Free(argument),
                    span: start.to(&end),
                })
            }
            Token::KeywordCall => self.parse_call(),
            Token::Dereference => {
                let expression = self.parse_expression()?;
                let span = expression.span.clone();
                Ok(Statement {
                    kind: StatementKind::Expression(expression),
                    span,
                })
            }
            Token::Identifier(_) => self.parse_assignment_or_movement(),
            _ => {
                let lexeme = self.next("Statement expected")?;
                Err(Error::new(
                    ErrorKind::Syntax,
                    format!("Statement expected, found `{}`", lexeme.token),
                    lexeme.span,
                ))
            }
        }
    }

    fn parse_if(&mut self) -> Result<Statement, Error> {
        let start = self.next("if expected")?.span;
        self.expect(Token::LParen, "( expected in if condition")?;
        let condition = self.parse_expression()?;
        self.expect(Token::RParen, ") expected in if condition")?;
        let then_body = self.parse_block()?;
        let mut end = then_body.span.clone();

        let else_body = if self.eat(&Token::KeywordElse).is_some() {
            let body = self.parse_block()?;
            end = body.span.clone();
            Some(body)
        } else {
            None
        };

        Ok(Statement {
            kind: StatementKind::If(If {
                branches: vec![(condition, then_body)],
                else_body,
            }),
            span: start.to(&end),
        })
    }

    fn parse_while(&mut self) -> Result<Statement, Error> {
        let start = self.next("while expected")?.span;
        self.expect(Token::LParen, "( expected in while condition")?;
        let condition = self.parse_expression()?;
        self.expect(Token::RParen, ") expected in while condition")?;
        let body = self.parse_block()?;
        let span = start.to(&body.span);
        Ok(Statement {
            kind: StatementKind::While(While { condition, body }),
            span,
        })
    }

    fn parse_definition(&mut self) -> Result<Statement, Error> {
        let start = self.next("def expected")?.span;
        let (identifier, _) =
            self.expect_identifier("Identifier expected in definition statement")?;
        let (ty, end) = self.parse_type("Type expected in definition statement")?;
        Ok(Statement {
            kind: StatementKind::Definition { identifier, ty },
            span: start.to(&end),
        })
    }

    pub(super) fn parse_type(&mut self, message: &str) -> Result<(Type, Span), Error> {
        let lexeme = self.next(message)?;
        match lexeme.token {
            Token::KeywordInt => Ok((Type::Int, lexeme.span)),
            Token::KeywordPtr => Ok((Type::Ptr, lexeme.span)),
            _ => Err(Error::new(ErrorKind::Syntax, message, lexeme.span)),
        }
    }

    fn parse_assumption(&mut self) -> Result<Statement, Error> {
        let start = self.next("assume expected")?.span;
        self.expect(Token::LParen, "( expected in assume condition")?;
        let condition = self.parse_expression()?;
        let end = self.expect(Token::RParen, ") expected in assume condition")?;

        if self.peek() == Some(&Token::LBrace) {
            let body = self.parse_block()?;
            let span = start.to(&body.span);
            return Ok(Statement {
                kind: StatementKind::Assumption(Assumption::Guard { condition, body }),
                span,
            });
        }

        Ok(Statement {
            kind: StatementKind::Assumption(Assumption::Condition(condition)),
            span: start.to(&end),
        })
    }

    fn parse_assignment_or_movement(&mut self) -> Result<Statement, Error> {
        let (identifier, start) = self.expect_identifier("Identifier expected")?;
        let lexeme = self.next(":= or <- expected in assignment or movement statement")?;

        match lexeme.token {
            Token::Assign => {
                let value = self.parse_expression()?;
                let span = start.to(&value.span);
                Ok(Statement {
                    kind: StatementKind::Assignment { identifier, value },
                    span,
                })
            }
            Token::Move => {
                if let Some(Lexeme {
                    token: Token::String(_),
                    ..
                }) = self.tokens.peek()
                {
                    let (value, end) = self.expect_string("String expected")?;
                    return Ok(Statement {
                        kind: StatementKind::MovementString { identifier, value },
                        span: start.to(&end),
                    });
                }
                let value = self.parse_expression()?;
                let span = start.to(&value.span);
                Ok(Statement {
                    kind: StatementKind::Movement { identifier, value },
                    span,
                })
            }
            _ => Err(Error::new(
                ErrorKind::Syntax,
                ":= or <- expected in assignment or movement statement",
                lexeme.span,
            )),
        }
    }

    fn expect_string(&mut self, message: &str) -> Result<(String, Span), Error> {
        let lexeme = self.next(message)?;
        match lexeme.token {
            Token::String(value) => Ok((value, lexeme.span)),
            _ => Err(Error::new(ErrorKind::Syntax, message, lexeme.span)),
        }
    }
}
