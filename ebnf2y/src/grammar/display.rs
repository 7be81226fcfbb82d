//! Pretty printer
//!
//! Prints a grammar in the notation the [reader](crate::ebnf) accepts, one
//! production per line. Empty alternatives are written as `/* empty */`, which
//! the reader skips as a comment.

use std::fmt::{
    self,
    Display,
    Write,
};

use super::{
    Expression,
    Grammar,
    Term,
};
use crate::utils::IsLast;

impl Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, production) in self.iter() {
            write!(f, "{} =", production.name)?;

            // `Foo = .` is the conventional spelling of a token defined elsewhere
            let body = &production.body;
            let is_empty = body.0.len() == 1 && body.0[0].is_empty();
            if !is_empty {
                f.write_char(' ')?;
                self.fmt_expression(f, body)?;
            }

            writeln!(f, " .")?;
        }

        Ok(())
    }
}

impl Grammar {
    fn fmt_expression(&self, f: &mut fmt::Formatter<'_>, expression: &Expression) -> fmt::Result {
        for (alternative, is_last) in IsLast::new(expression.0.iter()) {
            if alternative.is_empty() {
                f.write_str("/* empty */")?;
            }
            for (term, is_last_term) in IsLast::new(alternative.0.iter()) {
                self.fmt_term(f, term)?;
                if !is_last_term {
                    f.write_char(' ')?;
                }
            }
            if !is_last {
                f.write_str(" | ")?;
            }
        }

        Ok(())
    }

    fn fmt_term(&self, f: &mut fmt::Formatter<'_>, term: &Term) -> fmt::Result {
        match term {
            Term::Ref(id) => {
                match self.name(*id) {
                    Some(name) => write!(f, "{name}"),
                    None => write!(f, "__removed{}", id.index()),
                }
            }
            Term::Token(literal) => {
                f.write_str(&quote(&literal.text))?;
                if let Some(until) = &literal.until {
                    write!(f, " … {}", quote(until))?;
                }
                Ok(())
            }
            Term::Group(expression) => self.fmt_nested(f, '(', expression, ')'),
            Term::Option(expression) => self.fmt_nested(f, '[', expression, ']'),
            Term::Repetition(expression) => self.fmt_nested(f, '{', expression, '}'),
        }
    }

    fn fmt_nested(
        &self,
        f: &mut fmt::Formatter<'_>,
        open: char,
        expression: &Expression,
        close: char,
    ) -> fmt::Result {
        write!(f, "{open} ")?;
        self.fmt_expression(f, expression)?;
        write!(f, " {close}")
    }
}

/// Quotes a token with double quotes, escaping it such that the reader
/// restores the exact text.
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');

    for c in text.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c.is_control() => {
                // writing to a string can't fail
                let _ = write!(quoted, "\\u{:04x}", c as u32);
            }
            c => quoted.push(c),
        }
    }

    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test::{
        lines,
        read,
        DEMO,
    };

    #[test]
    fn it_prints_one_production_per_line() {
        let g = read(
            r#"
Start = A { "," A } [ "x" | "y" ] ( "p" "q" ) .
A = "a" | A "b" | .
digit = "0" … "9" .
float = .
            "#,
        );
        assert_eq!(
            lines(&g),
            vec![
                r#"Start = A { "," A } [ "x" | "y" ] ( "p" "q" ) ."#,
                r#"A = "a" | A "b" | /* empty */ ."#,
                r#"digit = "0" … "9" ."#,
                "float = .",
            ]
        );
    }

    #[test]
    fn it_quotes_literals() {
        assert_eq!(quote("abc"), r#""abc""#);
        assert_eq!(quote("a\"b\\c"), r#""a\"b\\c""#);
        assert_eq!(quote("\n\t\u{1}"), r#""\n\t\u0001""#);
    }

    #[test]
    fn it_reads_back_what_it_prints() {
        for source in [
            DEMO,
            r#"A = "\"" `raw\` "\u0007" | { [ ( /* empty */ | "x" ) ] } ."#,
        ] {
            let g = read(source);
            let printed = g.to_string();
            let reread = read(&printed);

            assert_eq!(reread.to_string(), printed);
            assert_eq!(reread.len(), g.len());
            for (id, production) in g.iter() {
                let other = reread.get(id).unwrap();
                assert_eq!(other.name, production.name);
                assert_eq!(other.body, production.body);
            }
        }
    }
}
