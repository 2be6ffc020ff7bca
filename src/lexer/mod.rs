use logos::Logos;

use std::fmt;

use crate::error::{Error, ErrorKind};
use crate::source::{SourceFile, Span};

#[cfg(test)]
pub mod test;

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \n\r\t\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
#[derive(Clone)]
pub enum Token {
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    String(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    #[token("int")]
    KeywordInt,

    #[token("ptr")]
    KeywordPtr,

    #[token("if")]
    KeywordIf,

    #[token("else")]
    KeywordElse,

    #[token("while")]
    KeywordWhile,

    #[token("func")]
    KeywordFunc,

    #[token("proto")]
    KeywordProto,

    #[token("def")]
    KeywordDef,

    #[token("const")]
    KeywordConst,

    #[token("assume")]
    KeywordAssume,

    #[token("alloc")]
    KeywordAlloc,

    #[token("free")]
    KeywordFree,

    #[token("call")]
    KeywordCall,

    #[token("asm")]
    KeywordAsm,

    #[token("include")]
    KeywordInclude,

    #[token(":=")]
    Assign,

    #[token("<-")]
    Move,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[token(":")]
    Colon,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("$")]
    Dereference,

    #[token("^")]
    Caret,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Mul,

    #[token("/")]
    Div,

    #[token("<")]
    Less,

    #[token("=")]
    Equal,
}

fn unescape(literal: &str) -> String {
    let body = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Integer(i) => write!(f, "{}", i),
            Token::String(s) => write!(f, "{:?}", s),
            Token::Identifier(name) => write!(f, "{}", name),
            Token::KeywordInt => f.write_str("int"),
            Token::KeywordPtr => f.write_str("ptr"),
            Token::KeywordIf => f.write_str("if"),
            Token::KeywordElse => f.write_str("else"),
            Token::KeywordWhile => f.write_str("while"),
            Token::KeywordFunc => f.write_str("func"),
            Token::KeywordProto => f.write_str("proto"),
            Token::KeywordDef => f.write_str("def"),
            Token::KeywordConst => f.write_str("const"),
            Token::KeywordAssume => f.write_str("assume"),
            Token::KeywordAlloc => f.write_str("alloc"),
            Token::KeywordFree => f.write_str("free"),
            Token::KeywordCall => f.write_str("call"),
            Token::KeywordAsm => f.write_str("asm"),
            Token::KeywordInclude => f.write_str("include"),
            Token::Assign => f.write_str(":="),
            Token::Move => f.write_str("<-"),
            Token::Comma => f.write_str(","),
            Token::Semicolon => f.write_str(";"),
            Token::Colon => f.write_str(":"),
            Token::LBrace => f.write_str("{"),
            Token::RBrace => f.write_str("}"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::LBracket => f.write_str("["),
            Token::RBracket => f.write_str("]"),
            Token::Dereference => f.write_str("$"),
            Token::Caret => f.write_str("^"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Mul => f.write_str("*"),
            Token::Div => f.write_str("/"),
            Token::Less => f.write_str("<"),
            Token::Equal => f.write_str("="),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub token: Token,
    pub span: Span,
}

pub fn lex(source: &SourceFile) -> Result<Vec<Lexeme>, Error> {
    let mut lexer = Token::lexer(&source.text);
    let mut lexemes = vec![];

    while let Some(token) = lexer.next() {
        let span = source.span(lexer.span());
        match token {
            Ok(token) => lexemes.push(Lexeme { token, span }),
            Err(()) => {
                let slice = lexer.slice();
                let message = if slice.starts_with('"') {
                    "Non closed string"
                } else if slice.chars().all(|c| c.is_ascii_digit()) {
                    "Integer literal out of range"
                } else {
                    "Unexpected symbol"
                };
                return Err(Error::new(ErrorKind::Lexer, message, span));
            }
        }
    }

    Ok(lexemes)
}
