use std::iter::Peekable;

pub struct IsLast<I: Iterator>(Peekable<I>);

impl<I: Iterator> IsLast<I> {
    pub fn new(iter: I) -> Self {
        Self(iter.peekable())
    }
}

impl<I: Iterator> Iterator for IsLast<I> {
    type Item = (I::Item, bool);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.0.next()?;
        let is_last = self.0.peek().is_none();
        Some((item, is_last))
    }
}

#[cfg(test)]
pub mod test {
    use crate::grammar::Grammar;

    /// The expression grammar of the `ebnf2y` demo.
    pub const DEMO: &str = include_str!("../../data/demo.ebnf");

    pub const DIGITS: &str = include_str!("../../data/digits.ebnf");

    pub const OPTIONAL: &str = include_str!("../../data/optional.ebnf");

    pub fn read(source: &str) -> Grammar {
        crate::ebnf::read(source).expect("fixture doesn't parse")
    }

    /// Prints the productions of a grammar one per line, in the EBNF notation.
    pub fn lines(grammar: &Grammar) -> Vec<String> {
        grammar
            .to_string()
            .lines()
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }
}
