//! Syntax tree of an EBNF source, borrowing identifiers from it.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grammar<'source>(pub Vec<Production<'source>>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Production<'source> {
    pub lhs: Id<'source>,
    pub rhs: Alternatives<'source>,
}

#[derive(
    Copy,
    Clone,
    Debug,
    Hash,
    PartialEq,
    Eq,
    derive_more::Display,
    derive_more::From,
    derive_more::AsRef,
)]
pub struct Id<'source>(pub(super) &'source str);

impl<'source> Id<'source> {
    pub fn as_str(&self) -> &'source str {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alternatives<'source>(pub Vec<Sequence<'source>>);

/// Juxtaposed terms. Empty for an empty alternative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sequence<'source>(pub Vec<Term<'source>>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term<'source> {
    Literal(Literal),
    /// `"a" … "z"`
    Range(Literal, Literal),
    Group(Alternatives<'source>),
    Option(Alternatives<'source>),
    Repetition(Alternatives<'source>),
    Rule(Id<'source>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Literal(pub String);

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal(value)
    }
}

impl<'a> From<&'a str> for Literal {
    fn from(value: &'a str) -> Self {
        value.to_owned().into()
    }
}
