pub mod expression;
pub mod function;
pub mod statement;


use crate::ast::Block;
use crate::error::{Error, ErrorKind};
use crate::lexer::{Lexeme, Token, lex};
use crate::source::{SourceFile, SourceMap, Span};

use std::iter::Peekable;
use std::path::Path;
use std::sync::Arc;
use std::vec::IntoIter;

type TokenIter = Peekable<IntoIter<Lexeme>>;

pub struct Parser<'m> {
    tokens: TokenIter,
    source: Arc<SourceFile>,
    sources: &'m mut SourceMap,
    // Files currently being parsed, outermost first. Guards against include cycles.
    include_stack: Vec<Arc<str>>,
    last_span: Span,
}

pub fn parse_file(sources: &mut SourceMap, name: &str) -> Result<Block, Error> {
    let source = sources.load(name, &Span::dummy())?;
    let mut parser = Parser::new(source, sources, vec![])?;
    parser.parse_program()
}

impl<'m> Parser<'m> {
    pub fn new(
        source: Arc<SourceFile>,
        sources: &'m mut SourceMap,
        mut include_stack: Vec<Arc<str>>,
    ) -> Result<Self, Error> {
        let tokens = lex(&source)?;
        include_stack.push(source.name.clone());
        let last_span = source.span(0..0);
        Ok(Parser {
            tokens: tokens.into_iter().peekable(),
            source,
            sources,
            include_stack,
            last_span,
        })
    }

    pub fn parse_program(&mut self) -> Result<Block, Error> {
        let start = self.source.span(0..0);
        let mut statements = vec![];
        while self.tokens.peek().is_some() {
            self.parse_statement_into(&mut statements)?;
        }
        Ok(Block {
            statements,
            span: start.to(&self.source.eof_span()),
        })
    }

    pub fn parse_block(&mut self) -> Result<Block, Error> {
        let start = self.expect(Token::LBrace, "{ expected at start of block")?;
        let mut statements = vec![];
        loop {
            match self.tokens.peek() {
                Some(Lexeme {
                    token: Token::RBrace,
                    ..
                }) => break,
                Some(_) => self.parse_statement_into(&mut statements)?,
                None => {
                    return Err(self.error_at_eof("} expected at end of block"));
                }
            }
        }
        let end = self.expect(Token::RBrace, "} expected at end of block")?;
        Ok(Block {
            statements,
            span: start.to(&end),
        })
    }

    fn parse_include(&mut self, name: &str, span: &Span) -> Result<Block, Error> {
        let resolved = match Path::new(&*self.source.name).parent() {
            Some(dir) => dir.join(name).to_string_lossy().into_owned(),
            None => name.to_string(),
        };
        if self.include_stack.iter().any(|f| **f == *resolved) {
            return Err(Error::new(
                ErrorKind::Include,
                format!("File {} includes itself", resolved),
                span.clone(),
            ));
        }
        let source = self.sources.load(&resolved, span)?;
        log::debug!("including {} from {}", resolved, self.source.name);
        let mut parser = Parser::new(source, self.sources, self.include_stack.clone())?;
        parser.parse_program()
    }

    fn next(&mut self, expected: &str) -> Result<Lexeme, Error> {
        match self.tokens.next() {
            Some(lexeme) => {
                self.last_span = lexeme.span.clone();
                Ok(lexeme)
            }
            None => Err(self.error_at_eof(expected)),
        }
    }

    fn peek(&mut self) -> Option<&Token> {
        self.tokens.peek().map(|lexeme| &lexeme.token)
    }

    fn eat(&mut self, token: &Token) -> Option<Span> {
        if self.peek() == Some(token) {
            let lexeme = self.tokens.next()?;
            self.last_span = lexeme.span.clone();
            Some(lexeme.span)
        } else {
            None
        }
    }

    fn expect(&mut self, token: Token, message: &str) -> Result<Span, Error> {
        let lexeme = self.next(message)?;
        if lexeme.token == token {
            Ok(lexeme.span)
        } else {
            Err(Error::new(ErrorKind::Syntax, message, lexeme.span))
        }
    }

    fn expect_identifier(&mut self, message: &str) -> Result<(String, Span), Error> {
        let lexeme = self.next(message)?;
        match lexeme.token {
            Token::Identifier(name) => Ok((name, lexeme.span)),
            _ => Err(Error::new(ErrorKind::Syntax, message, lexeme.span)),
        }
    }

    fn error_at_eof(&self, expected: &str) -> Error {
        Error::new(
            ErrorKind::Syntax,
            format!("{} but reached end of file", expected),
            self.source.eof_span(),
        )
    }
}
