//! Inliner
//!
//! Substitutes the alternatives of a production at every place it is
//! referenced and removes it. A reference inside an alternative with `n`
//! alternatives in the substituted production yields `n` copies of that
//! alternative. This works on EBNF grammars as well, where references nested
//! in groups, options and repetitions are expanded inside the alternative that
//! encloses them.
//!
//! The start production, token productions and self-referential productions
//! are never inlined.

use std::{
    fmt,
    str::FromStr,
};

use itertools::Itertools;

use crate::grammar::{
    Alternative,
    Error,
    Expression,
    Grammar,
    ProductionId,
    ReferenceCounts,
    Term,
};

/// Which productions are inlined.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum InlineLevel {
    #[default]
    None,

    /// Productions that are referenced exactly once.
    UsedOnce,

    /// Every production, until nothing is left to inline.
    All,
}

impl fmt::Display for InlineLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InlineLevel::None => "none",
            InlineLevel::UsedOnce => "once",
            InlineLevel::All => "all",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid inline level '{0}'. expected one of: 0, 1, 2, none, once, all")]
pub struct ParseInlineLevelError(String);

impl FromStr for InlineLevel {
    type Err = ParseInlineLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "0" | "none" => Ok(InlineLevel::None),
            "1" | "once" => Ok(InlineLevel::UsedOnce),
            "2" | "all" => Ok(InlineLevel::All),
            _ => Err(ParseInlineLevelError(s.to_owned())),
        }
    }
}

/// Inlines productions of `grammar` until no production is eligible under
/// `level`.
pub fn inline(grammar: &Grammar, level: InlineLevel, start: &str) -> Result<Grammar, Error> {
    let start = grammar.start(start)?;
    let mut output = grammar.clone();

    if level == InlineLevel::None {
        return Ok(output);
    }

    loop {
        let counts = output.reference_counts();
        let next = output
            .ids()
            .find(|id| is_eligible(&output, *id, start, &counts, level));
        let Some(id) = next
        else {
            break;
        };

        substitute(&mut output, id);
    }

    tracing::debug!(
        %level,
        before = grammar.len(),
        after = output.len(),
        "inlined grammar"
    );

    Ok(output)
}

/// Productions the minimizer may choose to inline or keep, ordered by name.
pub fn candidates(grammar: &Grammar, start: ProductionId) -> Vec<ProductionId> {
    let counts = grammar.reference_counts();
    grammar
        .ids()
        .filter(|id| is_candidate(grammar, *id, start, &counts))
        .sorted_by_key(|id| grammar.name(*id).cloned())
        .collect()
}

/// Inlines the `selected` productions in the given order. A production that
/// has become self-referential by an earlier substitution is kept.
///
/// Returns the new grammar and the productions that were actually inlined.
pub fn inline_selected(grammar: &Grammar, selected: &[ProductionId]) -> (Grammar, Vec<ProductionId>) {
    let mut output = grammar.clone();
    let mut inlined = Vec::with_capacity(selected.len());

    for id in selected {
        if output.get(*id).is_none() || output.is_self_referential(*id) {
            continue;
        }
        substitute(&mut output, *id);
        inlined.push(*id);
    }

    (output, inlined)
}

fn is_candidate(grammar: &Grammar, id: ProductionId, start: ProductionId, counts: &ReferenceCounts) -> bool {
    id != start
        && counts.get(id) > 0
        && grammar
            .get(id)
            .map_or(false, |production| !production.is_token())
        && !grammar.is_self_referential(id)
}

fn is_eligible(
    grammar: &Grammar,
    id: ProductionId,
    start: ProductionId,
    counts: &ReferenceCounts,
    level: InlineLevel,
) -> bool {
    let by_level = match level {
        InlineLevel::None => false,
        InlineLevel::UsedOnce => counts.get(id) == 1,
        InlineLevel::All => true,
    };
    by_level && is_candidate(grammar, id, start, counts)
}

/// Removes the production `id` and substitutes its body at every reference.
fn substitute(grammar: &mut Grammar, id: ProductionId) {
    let Some(production) = grammar.remove(id)
    else {
        return;
    };
    tracing::trace!(name = %production.name, "inlining production");

    let callers = grammar
        .iter()
        .filter(|(_, caller)| caller.body.references(id))
        .map(|(caller, _)| caller)
        .collect::<Vec<_>>();

    for caller in callers {
        if let Some(caller) = grammar.get_mut(caller) {
            caller.body = substitute_expression(&caller.body, id, &production.body);
        }
    }
}

fn substitute_expression(expression: &Expression, id: ProductionId, replacement: &Expression) -> Expression {
    Expression(
        expression
            .alternatives()
            .iter()
            .flat_map(|alternative| substitute_alternative(alternative, id, replacement))
            .collect(),
    )
}

/// Expands every reference to `id` in `alternative` into each alternative of
/// `replacement`.
fn substitute_alternative(
    alternative: &Alternative,
    id: ProductionId,
    replacement: &Expression,
) -> Vec<Alternative> {
    let mut expanded = vec![Vec::with_capacity(alternative.terms().len())];

    for term in alternative.terms() {
        let choices = match term {
            Term::Ref(other) if *other == id => {
                replacement
                    .alternatives()
                    .iter()
                    .map(|alternative| alternative.0.clone())
                    .collect()
            }
            Term::Group(expression) => {
                vec![vec![Term::Group(substitute_expression(expression, id, replacement))]]
            }
            Term::Option(expression) => {
                vec![vec![Term::Option(substitute_expression(expression, id, replacement))]]
            }
            Term::Repetition(expression) => {
                vec![vec![Term::Repetition(substitute_expression(
                    expression,
                    id,
                    replacement,
                ))]]
            }
            _ => vec![vec![term.clone()]],
        };

        expanded = expanded
            .into_iter()
            .cartesian_product(choices)
            .map(|(mut prefix, suffix): (Vec<Term>, Vec<Term>)| {
                prefix.extend(suffix);
                prefix
            })
            .collect();
    }

    expanded.into_iter().map(Alternative).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        desugar::desugar,
        utils::test::{
            lines,
            read,
            DEMO,
            DIGITS,
            OPTIONAL,
        },
    };

    #[test]
    fn it_parses_levels() {
        assert_eq!("0".parse::<InlineLevel>().unwrap(), InlineLevel::None);
        assert_eq!("1".parse::<InlineLevel>().unwrap(), InlineLevel::UsedOnce);
        assert_eq!("2".parse::<InlineLevel>().unwrap(), InlineLevel::All);
        assert_eq!("Once".parse::<InlineLevel>().unwrap(), InlineLevel::UsedOnce);
        assert_eq!("all".parse::<InlineLevel>().unwrap(), InlineLevel::All);
        assert!("3".parse::<InlineLevel>().is_err());
        assert_eq!(InlineLevel::UsedOnce.to_string(), "once");
    }

    #[test]
    fn it_expands_cross_product() {
        let bnf = desugar(&read(OPTIONAL), "Opt").unwrap();
        let inlined = inline(&bnf, InlineLevel::UsedOnce, "Opt").unwrap();

        assert_eq!(lines(&inlined), vec![r#"Opt = "a" "c" | "a" "b" "c" ."#]);
        assert!(inlined.lookup("Opt1").is_none());
    }

    #[test]
    fn it_never_inlines_repetitions() {
        let bnf = desugar(&read(DIGITS), "Digits").unwrap();

        for level in [InlineLevel::UsedOnce, InlineLevel::All] {
            let inlined = inline(&bnf, level, "Digits").unwrap();
            assert_eq!(lines(&inlined), lines(&bnf));
        }
        assert!(candidates(&bnf, bnf.lookup("Digits").unwrap()).is_empty());
    }

    #[test]
    fn it_inlines_used_once_to_fixed_point() {
        let bnf = desugar(&read(DEMO), "Expression").unwrap();
        let inlined = inline(&bnf, InlineLevel::UsedOnce, "Expression").unwrap();
        let start = inlined.lookup("Expression").unwrap();
        let counts = inlined.reference_counts();

        assert!(inlined.len() < bnf.len());
        inlined.check_references().unwrap();
        for (id, production) in inlined.iter() {
            if id == start || production.is_token() || inlined.is_self_referential(id) {
                continue;
            }
            assert_ne!(counts.get(id), 1, "{} is used once", production.name);
        }
    }

    #[test]
    fn it_distinguishes_levels() {
        let g = read(
            r#"
S = A B .
A = "a" | "b" .
B = C "c" .
C = "d" .
            "#,
        );

        assert_eq!(lines(&inline(&g, InlineLevel::None, "S").unwrap()), lines(&g));

        // inlining A first leaves B referenced twice
        let once = inline(&g, InlineLevel::UsedOnce, "S").unwrap();
        assert_eq!(
            lines(&once),
            vec![r#"S = "a" B | "b" B ."#, r#"B = "d" "c" ."#]
        );
        let start = once.lookup("S").unwrap();
        let counts = once.reference_counts();
        for id in once.ids().filter(|id| *id != start) {
            assert_ne!(counts.get(id), 1);
        }

        assert_eq!(
            lines(&inline(&g, InlineLevel::All, "S").unwrap()),
            vec![r#"S = "a" "d" "c" | "b" "d" "c" ."#]
        );
    }

    #[test]
    fn it_terminates_on_cycles() {
        let g = read(
            r#"
S = A .
A = "a" B | .
B = "b" A | .
            "#,
        );
        let inlined = inline(&g, InlineLevel::All, "S").unwrap();
        assert_eq!(
            lines(&inlined),
            vec![
                r#"S = "a" B | /* empty */ ."#,
                r#"B = "b" "a" B | "b" | /* empty */ ."#,
            ]
        );
    }

    #[test]
    fn it_protects_start_and_tokens() {
        let g = read(
            r#"
S = A ident .
A = S "x" | .
ident = "i" .
            "#,
        );
        let inlined = inline(&g, InlineLevel::All, "S").unwrap();
        assert_eq!(
            lines(&inlined),
            vec![r#"S = S "x" ident | ident ."#, r#"ident = "i" ."#]
        );
    }

    #[test]
    fn it_inlines_into_nested_expressions() {
        let g = read(r#"S = { A "," } [ "x" ] . A = "x" | "y" ."#);
        let inlined = inline(&g, InlineLevel::UsedOnce, "S").unwrap();
        assert_eq!(
            lines(&inlined),
            vec![r#"S = { "x" "," | "y" "," } [ "x" ] ."#]
        );
    }

    #[test]
    fn it_orders_candidates_by_name() {
        let g = read(
            r#"
S = Zeta Alpha Mid .
Zeta = "z" .
Alpha = "a" .
Mid = "m" .
            "#,
        );
        let names = candidates(&g, g.lookup("S").unwrap())
            .into_iter()
            .map(|id| g.name(id).unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Alpha", "Mid", "Zeta"]);
    }

    #[test]
    fn it_skips_selected_productions_that_became_recursive() {
        let g = read(
            r#"
S = A B .
A = "a" B | .
B = "b" A | .
            "#,
        );
        let a = g.lookup("A").unwrap();
        let b = g.lookup("B").unwrap();
        assert_eq!(candidates(&g, g.lookup("S").unwrap()), vec![a, b]);

        let (inlined, substituted) = inline_selected(&g, &[a, b]);
        assert_eq!(substituted, vec![a]);
        assert_eq!(
            lines(&inlined),
            vec![
                r#"S = "a" B B | B ."#,
                r#"B = "b" "a" B | "b" | /* empty */ ."#,
            ]
        );
    }
}
