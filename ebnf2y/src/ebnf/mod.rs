//! EBNF Reader
//!
//! Reads grammars written in the notation of the Go language specification:
//!
//! ```text
//! Production  = production_name "=" [ Expression ] "." .
//! Expression  = Alternative { "|" Alternative } .
//! Alternative = Term { Term } .
//! Term        = production_name | token [ "…" token ] | Group | Option | Repetition .
//! Group       = "(" Expression ")" .
//! Option      = "[" Expression "]" .
//! Repetition  = "{" Expression "}" .
//! ```
//!
//! Reading is done in two steps: [`parse`] produces a syntax tree borrowing
//! from the source, which is then resolved into a [`Grammar`].

pub mod ast;
mod parser;
mod resolve;

use nom::error::{
    ErrorKind,
    VerboseError,
    VerboseErrorKind,
};

use self::resolve::Resolver;
use crate::grammar::{
    self,
    Grammar,
    Name,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("syntax error at {position}: expected {expected}")]
    Syntax { position: Position, expected: String },

    #[error("production '{name}' is undefined (referenced by '{production}')")]
    Undefined { name: Name, production: Name },

    #[error("invalid range \"{from}\" … \"{to}\" in production '{production}': both ends must be single characters")]
    InvalidRange {
        production: Name,
        from: String,
        to: String,
    },

    #[error(transparent)]
    Grammar(#[from] grammar::Error),
}

/// 1-based line and column in the source text.
#[derive(Copy, Clone, Debug, PartialEq, Eq, derive_more::Display)]
#[display(fmt = "{}:{}", line, column)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// Position of the byte `offset` in `source`. Columns count characters.
    pub fn at(source: &str, offset: usize) -> Self {
        let before = source.get(..offset).unwrap_or(source);
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);

        Self {
            line: before.matches('\n').count() + 1,
            column: before[line_start..].chars().count() + 1,
        }
    }
}

pub fn parse(input: &str) -> Result<ast::Grammar<'_>, Error> {
    match parser::parse_grammar_complete(input) {
        Ok((_, ast)) => Ok(ast),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(syntax_error(input, e)),
        _ => unreachable!(),
    }
}

/// Builds the [`Error::Syntax`] from the innermost error nom reported.
fn syntax_error(input: &str, error: VerboseError<&str>) -> Error {
    let remaining = error
        .errors
        .first()
        .map_or("", |(remaining, _)| *remaining);
    let position = Position::at(input, input.len().saturating_sub(remaining.len()));

    let expected = error
        .errors
        .iter()
        .find_map(|(_, kind)| {
            match kind {
                VerboseErrorKind::Char(c) => Some(format!("'{c}'")),
                VerboseErrorKind::Context(context) => Some((*context).to_owned()),
                VerboseErrorKind::Nom(ErrorKind::Eof) => Some("end of input".to_owned()),
                VerboseErrorKind::Nom(_) => None,
            }
        })
        .unwrap_or_else(|| "valid input".to_owned());

    Error::Syntax { position, expected }
}

pub fn resolve(ast: &ast::Grammar<'_>) -> Result<Grammar, Error> {
    let mut resolver = Resolver::default();
    resolver.push_ast(ast)?;
    Ok(resolver.finish())
}

/// Parses and resolves EBNF source text.
pub fn read(source: &str) -> Result<Grammar, Error> {
    let ast = parse(source)?;
    let grammar = resolve(&ast)?;
    tracing::debug!(productions = grammar.len(), "read grammar");
    Ok(grammar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test::DEMO;

    fn syntax_error(source: &str) -> (Position, String) {
        match read(source) {
            Err(Error::Syntax { position, expected }) => (position, expected),
            other => panic!("expected syntax error, got: {other:?}"),
        }
    }

    #[test]
    fn it_reads_demo_grammar() {
        let g = read(DEMO).unwrap();
        assert_eq!(g.len(), 16);
        assert!(g.lookup("Expression").is_some());
        assert!(g.lookup("andnot").unwrap().index() < g.lookup("Expression").unwrap().index());
    }

    #[test]
    fn it_reports_position_of_syntax_errors() {
        assert_eq!(
            syntax_error("A = b\nC = d ."),
            (Position { line: 2, column: 1 }, "'.'".to_owned())
        );
        assert_eq!(
            syntax_error("A b ."),
            (Position { line: 1, column: 3 }, "'='".to_owned())
        );
        assert_eq!(
            syntax_error("Start = ( a\n  | b ."),
            (Position { line: 2, column: 7 }, "')'".to_owned())
        );
        assert_eq!(
            syntax_error("A = \"abc"),
            (Position { line: 1, column: 9 }, "'\"'".to_owned())
        );
        assert_eq!(
            syntax_error("A = b . )"),
            (Position { line: 1, column: 9 }, "end of input".to_owned())
        );
    }

    #[test]
    fn it_counts_columns_in_characters() {
        assert_eq!(Position::at("a\n…b", 5), Position { line: 2, column: 2 });
        assert_eq!(Position::at("", 0), Position { line: 1, column: 1 });
    }

    #[test]
    fn it_displays_positions() {
        assert_eq!(Position { line: 3, column: 14 }.to_string(), "3:14");
    }
}
