//! Desugarer
//!
//! Lowers groups, options and repetitions into synthetic productions, so that
//! the resulting grammar only contains references and tokens:
//!
//! - `( a )` is spliced in place, `( a | b )` becomes `P = a | b .`,
//! - `[ E ]` becomes `P = /* empty */ | E .`,
//! - `{ E }` becomes the left-recursive `P = /* empty */ | P E .`.
//!
//! Synthetic productions are named after the production they were lowered
//! from, with an ordinal suffix (`Foo1`, `Foo2`, ...). Inner terms are lowered
//! first and get the smaller ordinals. Synthetic productions are appended after
//! the declared ones.

use std::collections::HashMap;

use crate::grammar::{
    Alternative,
    Error,
    Expression,
    Grammar,
    Name,
    Production,
    ProductionId,
    Provenance,
    Term,
};

/// How many ordinals are tried for a synthetic production before giving up.
pub const MAX_NAME_RETRIES: usize = 1024;

/// Lowers `grammar` into BNF form. The ids of the declared productions are
/// kept.
pub fn desugar(grammar: &Grammar, start: &str) -> Result<Grammar, Error> {
    grammar.start(start)?;

    let mut desugarer = Desugarer {
        output: grammar.clone(),
        next_ordinals: HashMap::new(),
    };

    for (id, production) in grammar.iter() {
        let origin = Origin {
            id,
            name: &production.name,
        };
        let body = desugarer.lower_expression(&origin, &production.body)?;
        desugarer.finish_production(id, body);
    }

    let output = desugarer.output;
    assert!(output.is_bnf(), "desugared grammar is not in BNF form");

    tracing::debug!(
        productions = output.len(),
        synthetic = output.len() - grammar.len(),
        "desugared grammar"
    );
    tracing::trace!("desugared grammar:\n{output}");

    Ok(output)
}

/// The declared production whose body is being lowered.
struct Origin<'a> {
    id: ProductionId,
    name: &'a Name,
}

struct Desugarer {
    output: Grammar,
    next_ordinals: HashMap<ProductionId, usize>,
}

impl Desugarer {
    fn lower_expression(&mut self, origin: &Origin, expression: &Expression) -> Result<Expression, Error> {
        let alternatives = expression
            .alternatives()
            .iter()
            .map(|alternative| self.lower_alternative(origin, alternative))
            .collect::<Result<_, _>>()?;
        Ok(Expression(alternatives))
    }

    fn lower_alternative(
        &mut self,
        origin: &Origin,
        alternative: &Alternative,
    ) -> Result<Alternative, Error> {
        let mut terms = Vec::with_capacity(alternative.terms().len());

        for term in alternative.terms() {
            match term {
                Term::Ref(_) | Term::Token(_) => terms.push(term.clone()),
                Term::Group(expression) => {
                    terms.extend(self.lower_group(origin, expression)?);
                }
                Term::Option(expression) => {
                    // P = /* empty */ | E .
                    let body = self.lower_group(origin, expression)?;
                    let id = self.new_placeholder(origin)?;
                    self.finish_production(
                        id,
                        Expression(vec![Alternative::default(), Alternative(body)]),
                    );
                    terms.push(Term::Ref(id));
                }
                Term::Repetition(expression) => {
                    // P = /* empty */ | P E .
                    let body = self.lower_group(origin, expression)?;
                    let id = self.new_placeholder(origin)?;
                    let mut recursive = Vec::with_capacity(body.len() + 1);
                    recursive.push(Term::Ref(id));
                    recursive.extend(body);
                    self.finish_production(
                        id,
                        Expression(vec![Alternative::default(), Alternative(recursive)]),
                    );
                    terms.push(Term::Ref(id));
                }
            }
        }

        Ok(Alternative(terms))
    }

    /// Lowers a parenthesized expression into the terms that replace it.
    fn lower_group(&mut self, origin: &Origin, expression: &Expression) -> Result<Vec<Term>, Error> {
        let mut lowered = self.lower_expression(origin, expression)?;

        if lowered.0.len() == 1 {
            Ok(lowered.0.pop().unwrap_or_default().0)
        }
        else {
            let id = self.new_placeholder(origin)?;
            self.finish_production(id, lowered);
            Ok(vec![Term::Ref(id)])
        }
    }

    /// Adds an empty synthetic production with the next free name for
    /// `origin`.
    fn new_placeholder(&mut self, origin: &Origin) -> Result<ProductionId, Error> {
        let first = self.next_ordinals.get(&origin.id).copied().unwrap_or(1);

        for ordinal in first..first + MAX_NAME_RETRIES {
            let name = Name::from(format!("{}{ordinal}", origin.name));
            if self.output.lookup(name.as_str()).is_some() {
                continue;
            }

            self.next_ordinals.insert(origin.id, ordinal + 1);
            return self.output.push(Production {
                name,
                body: Expression::empty(),
                provenance: Some(Provenance {
                    origin: origin.id,
                    ordinal,
                }),
            });
        }

        Err(Error::NameCollision {
            origin: origin.name.clone(),
            retries: MAX_NAME_RETRIES,
        })
    }

    fn finish_production(&mut self, id: ProductionId, body: Expression) {
        let production = self
            .output
            .get_mut(id)
            .unwrap_or_else(|| panic!("invalid production id: {id:?}"));
        production.body = body;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test::{
        lines,
        read,
        DEMO,
        DIGITS,
        OPTIONAL,
    };

    #[test]
    fn it_lowers_repetition_left_recursive() {
        let g = read(DIGITS);
        let bnf = desugar(&g, "Digits").unwrap();

        assert_eq!(
            lines(&bnf),
            vec![
                "Digits = digit Digits1 .",
                r#"digit = "0" … "9" ."#,
                "Digits1 = /* empty */ | Digits1 digit .",
            ]
        );

        let digits1 = bnf.get(bnf.lookup("Digits1").unwrap()).unwrap();
        assert_eq!(
            digits1.provenance,
            Some(Provenance {
                origin: g.lookup("Digits").unwrap(),
                ordinal: 1,
            })
        );
        assert!(bnf.is_self_referential(bnf.lookup("Digits1").unwrap()));
    }

    #[test]
    fn it_lowers_options() {
        let bnf = desugar(&read(OPTIONAL), "Opt").unwrap();
        assert_eq!(
            lines(&bnf),
            vec![r#"Opt = "a" Opt1 "c" ."#, r#"Opt1 = /* empty */ | "b" ."#]
        );
    }

    #[test]
    fn it_splices_single_alternative_groups() {
        let g = read(r#"A = "x" ( "y" B ) ( ) . B = ."#);
        let bnf = desugar(&g, "A").unwrap();
        assert_eq!(lines(&bnf), vec![r#"A = "x" "y" B ."#, "B = ."]);
    }

    #[test]
    fn it_lowers_innermost_first() {
        let bnf = desugar(&read(r#"A = { "x" | "y" } [ "a" { "b" } ] ."#), "A").unwrap();
        assert_eq!(
            lines(&bnf),
            vec![
                "A = A2 A4 .",
                r#"A1 = "x" | "y" ."#,
                "A2 = /* empty */ | A2 A1 .",
                r#"A3 = /* empty */ | A3 "b" ."#,
                r#"A4 = /* empty */ | "a" A3 ."#,
            ]
        );
    }

    #[test]
    fn it_lowers_alternatives_of_options_through_a_group() {
        let bnf = desugar(&read(r#"A = [ "x" | "y" ] ."#), "A").unwrap();
        assert_eq!(
            lines(&bnf),
            vec!["A = A2 .", r#"A1 = "x" | "y" ."#, "A2 = /* empty */ | A1 ."]
        );
    }

    #[test]
    fn it_bumps_ordinal_on_collision() {
        let bnf = desugar(&read(r#"A = [ "x" ] A1 . A1 = ."#), "A").unwrap();
        assert_eq!(
            lines(&bnf),
            vec!["A = A2 A1 .", "A1 = .", r#"A2 = /* empty */ | "x" ."#]
        );

        let a2 = bnf.get(bnf.lookup("A2").unwrap()).unwrap();
        assert_eq!(a2.provenance.unwrap().ordinal, 2);
    }

    #[test]
    fn it_fails_when_no_name_is_free() {
        let mut g = read(r#"A = [ "x" ] ."#);
        for ordinal in 1..=MAX_NAME_RETRIES {
            g.push(Production::new(format!("A{ordinal}"), Expression::empty()))
                .unwrap();
        }

        assert!(matches!(
            desugar(&g, "A"),
            Err(Error::NameCollision { origin, retries })
                if origin.as_str() == "A" && retries == MAX_NAME_RETRIES
        ));
    }

    #[test]
    fn it_produces_bnf_with_intact_references() {
        let g = read(DEMO);
        let bnf = desugar(&g, "Expression").unwrap();

        assert!(bnf.is_bnf());
        bnf.check_references().unwrap();
        for (id, production) in g.iter() {
            assert_eq!(bnf.name(id), Some(&production.name));
        }
        assert!(bnf
            .iter()
            .skip(g.len())
            .all(|(_, production)| production.is_synthetic()));
    }

    #[test]
    fn it_fails_for_missing_start() {
        assert!(matches!(
            desugar(&read(DIGITS), "SourceFile"),
            Err(Error::StartNotFound(_))
        ));
    }
}
