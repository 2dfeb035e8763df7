use crate::error::LangError;
use crate::lexer::{tokenize, Token};

fn kinds(source: &str) -> Vec<Token> {
    tokenize(source).unwrap().into_iter().map(|t| t.token).collect()
}

fn ident(name: &str) -> Token {
    Token::Identifier(name.to_string())
}

#[test]
fn test_indent_and_dedent() {
    assert_eq!(
        kinds("if x:\n    y\nz\n"),
        vec![
            Token::If,
            ident("x"),
            Token::Colon,
            Token::Newline,
            Token::Indent,
            ident("y"),
            Token::Newline,
            Token::Dedent,
            ident("z"),
            Token::Newline,
            Token::Eof,
        ]
    );
}

#[test]
fn test_brackets_join_lines() {
    assert_eq!(
        kinds("f(1,\n      2)\n"),
        vec![
            ident("f"),
            Token::LParen,
            Token::IntLiteral(1),
            Token::Comma,
            Token::IntLiteral(2),
            Token::RParen,
            Token::Newline,
            Token::Eof,
        ]
    );
}

#[test]
fn test_blank_lines_and_comments_are_ignored() {
    assert_eq!(
        kinds("x = 1\n\n# comment\ny = 2  # trailing\n"),
        vec![
            ident("x"),
            Token::Eq,
            Token::IntLiteral(1),
            Token::Newline,
            ident("y"),
            Token::Eq,
            Token::IntLiteral(2),
            Token::Newline,
            Token::Eof,
        ]
    );
}

#[test]
fn test_dedents_closed_at_end_of_input() {
    let tokens = kinds("def f():\n    pass");
    assert_eq!(
        &tokens[tokens.len() - 4..],
        &[Token::Pass, Token::Newline, Token::Dedent, Token::Eof]
    );
}

#[test]
fn test_inconsistent_dedent() {
    let err = tokenize("if x:\n    y\n  z\n").unwrap_err();
    match err {
        LangError::LexerError { loc, message } => {
            assert_eq!(loc.line, 3);
            assert_eq!(message, "unindent does not match any outer indentation level");
        }
        other => panic!("Expected lexer error, got {:?}", other),
    }
}

#[test]
fn test_operators() {
    assert_eq!(
        kinds("a // b ** c -> @"),
        vec![
            ident("a"),
            Token::SlashSlash,
            ident("b"),
            Token::StarStar,
            ident("c"),
            Token::Arrow,
            Token::At,
            Token::Newline,
            Token::Eof,
        ]
    );
}

#[test]
fn test_number_literals() {
    assert_eq!(
        kinds("42 2.5"),
        vec![Token::IntLiteral(42), Token::FloatLiteral(2.5), Token::Newline, Token::Eof]
    );
}
