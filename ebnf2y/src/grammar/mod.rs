//! Grammar model
//!
//! A [`Grammar`] owns its productions in an arena. A production gets a
//! [`ProductionId`] when it's pushed and keeps it for the lifetime of the
//! grammar, also across clones. Removing a production leaves a hole, so the ids
//! of the other productions don't change. Terms reference productions by id,
//! names are only needed to read and print grammars.
//!
//! Grammars are rewritten by replacement: [`desugar`](crate::desugar),
//! [`inline`](crate::inline) and [`magic`](crate::magic) take a `&Grammar` and
//! return a new one.

mod display;

use std::{
    borrow::Borrow,
    collections::{
        HashMap,
        HashSet,
    },
    sync::Arc,
};

pub use self::display::quote;

/// Grammar model errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("production '{0}' is declared more than once")]
    Duplicate(Name),

    #[error("start production '{0}' not found")]
    StartNotFound(Name),

    #[error("no free name for synthetic production of '{origin}' after {retries} attempts")]
    NameCollision { origin: Name, retries: usize },

    #[error("production '{production}' references a removed production")]
    Dangling { production: Name },
}

/// Name of a production.
///
/// Lower-case names denote lexical tokens, CamelCase names nonterminals.
#[derive(
    Clone,
    Debug,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    derive_more::Display,
    derive_more::From,
)]
pub struct Name(Arc<str>);

impl Name {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this names a lexical token, i.e. starts with a
    /// lower-case letter.
    pub fn is_token(&self) -> bool {
        self.0.chars().next().map_or(false, char::is_lowercase)
    }
}

impl<'a> From<&'a str> for Name {
    fn from(value: &'a str) -> Self {
        Self(value.into())
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stable identity of a production inside its [`Grammar`].
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProductionId(usize);

impl ProductionId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Where a synthetic production came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Provenance {
    /// The production whose body was lowered.
    pub origin: ProductionId,

    /// 1-based ordinal among the productions synthesized for `origin`. This is
    /// the suffix of the synthetic name, unless that name was already taken.
    pub ordinal: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Production {
    pub name: Name,
    pub body: Expression,
    pub provenance: Option<Provenance>,
}

impl Production {
    pub fn new(name: impl Into<Name>, body: Expression) -> Self {
        Self {
            name: name.into(),
            body,
            provenance: None,
        }
    }

    pub fn is_token(&self) -> bool {
        self.name.is_token()
    }

    pub fn is_synthetic(&self) -> bool {
        self.provenance.is_some()
    }
}

/// Ordered, non-empty list of alternatives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Expression(pub Vec<Alternative>);

impl Expression {
    /// An expression matching only the empty string.
    pub fn empty() -> Self {
        Self(vec![Alternative::default()])
    }

    pub fn alternatives(&self) -> &[Alternative] {
        &self.0
    }

    /// Returns `true` if no term at any depth is a group, option or repetition.
    pub fn is_bnf(&self) -> bool {
        self.0
            .iter()
            .all(|alternative| alternative.0.iter().all(Term::is_bnf))
    }

    pub fn references(&self, id: ProductionId) -> bool {
        let mut found = false;
        self.visit_refs(&mut |other| found |= other == id);
        found
    }

    pub fn visit_refs(&self, f: &mut impl FnMut(ProductionId)) {
        for alternative in &self.0 {
            for term in &alternative.0 {
                term.visit_refs(f);
            }
        }
    }
}

/// Sequence of terms. May be empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Alternative(pub Vec<Term>);

impl Alternative {
    pub fn terms(&self) -> &[Term] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    Ref(ProductionId),
    Token(Literal),
    Group(Expression),
    Option(Expression),
    Repetition(Expression),
}

impl Term {
    pub fn is_bnf(&self) -> bool {
        matches!(self, Term::Ref(_) | Term::Token(_))
    }

    pub fn visit_refs(&self, f: &mut impl FnMut(ProductionId)) {
        match self {
            Term::Ref(id) => f(*id),
            Term::Token(_) => {}
            Term::Group(expression) | Term::Option(expression) | Term::Repetition(expression) => {
                expression.visit_refs(f)
            }
        }
    }
}

/// A quoted token, or a range of characters if `until` is set.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Literal {
    pub text: String,
    pub until: Option<String>,
}

impl Literal {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            until: None,
        }
    }

    pub fn range(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            text: from.into(),
            until: Some(to.into()),
        }
    }
}

/// Number of references to every production of a grammar.
#[derive(Clone, Debug)]
pub struct ReferenceCounts(Vec<usize>);

impl ReferenceCounts {
    pub fn get(&self, id: ProductionId) -> usize {
        self.0.get(id.0).copied().unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default)]
pub struct Grammar {
    productions: Vec<Option<Production>>,
    names: HashMap<Name, ProductionId>,
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a production and returns its id.
    pub fn push(&mut self, production: Production) -> Result<ProductionId, Error> {
        if self.names.contains_key(&production.name) {
            return Err(Error::Duplicate(production.name));
        }

        let id = ProductionId(self.productions.len());
        self.names.insert(production.name.clone(), id);
        self.productions.push(Some(production));
        Ok(id)
    }

    /// Number of productions.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, id: ProductionId) -> Option<&Production> {
        self.productions.get(id.0)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: ProductionId) -> Option<&mut Production> {
        self.productions.get_mut(id.0)?.as_mut()
    }

    pub fn name(&self, id: ProductionId) -> Option<&Name> {
        self.get(id).map(|production| &production.name)
    }

    pub fn lookup(&self, name: &str) -> Option<ProductionId> {
        self.names.get(name).copied()
    }

    /// Looks up the start production.
    pub fn start(&self, name: &str) -> Result<ProductionId, Error> {
        self.lookup(name)
            .ok_or_else(|| Error::StartNotFound(name.into()))
    }

    /// Productions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (ProductionId, &Production)> {
        self.productions
            .iter()
            .enumerate()
            .filter_map(|(i, production)| Some((ProductionId(i), production.as_ref()?)))
    }

    pub fn ids(&self) -> impl Iterator<Item = ProductionId> + '_ {
        self.iter().map(|(id, _)| id)
    }

    /// Removes a production. Its id is never reused.
    pub(crate) fn remove(&mut self, id: ProductionId) -> Option<Production> {
        let production = self.productions.get_mut(id.0)?.take()?;
        self.names.remove(&production.name);
        Some(production)
    }

    /// Counts the terms referencing each production, at any nesting depth.
    pub fn reference_counts(&self) -> ReferenceCounts {
        let mut counts = vec![0; self.productions.len()];
        for (_, production) in self.iter() {
            production.body.visit_refs(&mut |id| {
                if let Some(count) = counts.get_mut(id.0) {
                    *count += 1;
                }
            });
        }
        ReferenceCounts(counts)
    }

    /// Returns `true` if the body of the production references the production
    /// itself.
    pub fn is_self_referential(&self, id: ProductionId) -> bool {
        self.get(id)
            .map_or(false, |production| production.body.references(id))
    }

    pub fn is_bnf(&self) -> bool {
        self.iter().all(|(_, production)| production.body.is_bnf())
    }

    /// Checks that every reference points to a production of this grammar.
    pub fn check_references(&self) -> Result<(), Error> {
        for (_, production) in self.iter() {
            let mut dangling = false;
            production
                .body
                .visit_refs(&mut |id| dangling |= self.get(id).is_none());
            if dangling {
                return Err(Error::Dangling {
                    production: production.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Productions reachable from `start`. Token productions are included when
    /// referenced, but their bodies are not followed, except for `start`'s.
    pub fn reachable(&self, start: ProductionId) -> HashSet<ProductionId> {
        let mut reachable = HashSet::new();
        let mut stack = vec![start];

        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            let Some(production) = self.get(id)
            else {
                continue;
            };
            if production.is_token() && id != start {
                continue;
            }
            production.body.visit_refs(&mut |id| {
                if !reachable.contains(&id) {
                    stack.push(id);
                }
            });
        }

        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar(source: &str) -> Grammar {
        crate::ebnf::read(source).unwrap()
    }

    #[test]
    fn it_counts_references_at_any_depth() {
        let g = grammar(
            r#"
Start = A { A [ B ] } ( B | "x" ) .
A = "a" .
B = "b" B | .
Unused = .
            "#,
        );
        let counts = g.reference_counts();
        assert_eq!(counts.get(g.lookup("Start").unwrap()), 0);
        assert_eq!(counts.get(g.lookup("A").unwrap()), 2);
        assert_eq!(counts.get(g.lookup("B").unwrap()), 3);
        assert_eq!(counts.get(g.lookup("Unused").unwrap()), 0);
    }

    #[test]
    fn it_detects_self_references() {
        let g = grammar(
            r#"
List = Item { "," List } .
Item = "i" .
            "#,
        );
        assert!(g.is_self_referential(g.lookup("List").unwrap()));
        assert!(!g.is_self_referential(g.lookup("Item").unwrap()));
    }

    #[test]
    fn it_keeps_ids_stable_on_removal() {
        let mut g = grammar(
            r#"
A = B C .
B = "b" .
C = "c" .
            "#,
        );
        let b = g.lookup("B").unwrap();
        let c = g.lookup("C").unwrap();

        let removed = g.remove(b).unwrap();
        assert_eq!(removed.name.as_str(), "B");
        assert_eq!(g.len(), 2);
        assert_eq!(g.lookup("C"), Some(c));
        assert_eq!(g.name(c).unwrap().as_str(), "C");
        assert!(g.get(b).is_none());
        assert!(matches!(g.check_references(), Err(Error::Dangling { .. })));

        let d = g.push(Production::new("D", Expression::empty())).unwrap();
        assert_ne!(d, b);
    }

    #[test]
    fn it_rejects_duplicate_names() {
        let mut g = Grammar::new();
        g.push(Production::new("A", Expression::empty())).unwrap();
        assert!(matches!(
            g.push(Production::new("A", Expression::empty())),
            Err(Error::Duplicate(name)) if name.as_str() == "A"
        ));
    }

    #[test]
    fn it_fails_for_missing_start() {
        let g = grammar("A = .");
        assert!(g.start("A").is_ok());
        assert!(matches!(g.start("SourceFile"), Err(Error::StartNotFound(_))));
    }

    #[test]
    fn it_recognizes_token_names() {
        assert!(Name::from("identifier").is_token());
        assert!(!Name::from("Identifier").is_token());
        assert!(!Name::from("_x").is_token());
    }

    #[test]
    fn it_does_not_follow_token_bodies() {
        let g = grammar(
            r#"
Start = ident Rest .
Rest = .
ident = letter { letter } .
letter = "a" … "z" .
Other = .
            "#,
        );
        let reachable = g.reachable(g.lookup("Start").unwrap());
        assert!(reachable.contains(&g.lookup("ident").unwrap()));
        assert!(reachable.contains(&g.lookup("Rest").unwrap()));
        assert!(!reachable.contains(&g.lookup("letter").unwrap()));
        assert!(!reachable.contains(&g.lookup("Other").unwrap()));
    }
}
