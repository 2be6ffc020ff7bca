use super::*;
use crate::source::SourceFile;
use logos::Logos;

fn tokens(input: &str) -> Vec<Token> {
    let source = SourceFile::new("test", input.to_string());
    lex(&source).unwrap().into_iter().map(|l| l.token).collect()
}

#[test]
fn test_basic_tokens() {
    let input = "
    def p ptr;
    p := alloc(4)
    ";
    let mut lexer = Token::lexer(input);

    assert_eq!(lexer.next(), Some(Ok(Token::KeywordDef)));
    assert_eq!(lexer.next(), Some(Ok(Token::Identifier("p".to_string()))));
    assert_eq!(lexer.next(), Some(Ok(Token::KeywordPtr)));
    assert_eq!(lexer.next(), Some(Ok(Token::Semicolon)));
    assert_eq!(lexer.next(), Some(Ok(Token::Identifier("p".to_string()))));
    assert_eq!(lexer.next(), Some(Ok(Token::Assign)));
    assert_eq!(lexer.next(), Some(Ok(Token::KeywordAlloc)));
    assert_eq!(lexer.next(), Some(Ok(Token::LParen)));
    assert_eq!(lexer.next(), Some(Ok(Token::Integer(4))));
    assert_eq!(lexer.next(), Some(Ok(Token::RParen)));
    assert_eq!(lexer.next(), None);
}

#[test]
fn test_move_and_less_are_distinct() {
    assert_eq!(
        tokens("p <- 1 < 2"),
        vec![
            Token::Identifier("p".to_string()),
            Token::Move,
            Token::Integer(1),
            Token::Less,
            Token::Integer(2),
        ]
    );
}

#[test]
fn test_keyword_prefix_is_identifier() {
    assert_eq!(
        tokens("integer freed pointer"),
        vec![
            Token::Identifier("integer".to_string()),
            Token::Identifier("freed".to_string()),
            Token::Identifier("pointer".to_string()),
        ]
    );
}

#[test]
fn test_string_token() {
    let input = r#"p <- "hello\nworld""#;
    assert_eq!(
        tokens(input)[2],
        Token::String("hello\nworld".to_string())
    );
}

#[test]
fn test_comments_are_skipped() {
    let input = "
    // line comment
    def /* inline
    block */ x int
    ";
    assert_eq!(
        tokens(input),
        vec![
            Token::KeywordDef,
            Token::Identifier("x".to_string()),
            Token::KeywordInt,
        ]
    );
}

#[test]
fn test_spans_have_lines_and_columns() {
    let source = SourceFile::new("spans", "def x int\n  free(x)".to_string());
    let lexemes = lex(&source).unwrap();

    let free = &lexemes[3];
    assert_eq!(free.token, Token::KeywordFree);
    assert_eq!(free.span.start.line, 2);
    assert_eq!(free.span.start.column, 3);
    assert_eq!(free.span.end.column, 6);
    assert_eq!(&*free.span.file, "spans");
}

#[test]
fn test_unexpected_symbol() {
    let source = SourceFile::new("bad", "def x @ int".to_string());
    let err = lex(&source).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Lexer);
    assert_eq!(err.message, "Unexpected symbol");
    assert_eq!(err.span.start.column, 7);
}

#[test]
fn test_non_closed_string() {
    let source = SourceFile::new("bad", "p <- \"abc".to_string());
    let err = lex(&source).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Lexer);
    assert_eq!(err.message, "Non closed string");
}
