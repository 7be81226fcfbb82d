use super::{
    ast::{
        self,
        Alternatives,
        Id,
        Sequence,
    },
    Error,
};
use crate::grammar::{
    Alternative,
    Expression,
    Grammar,
    Literal,
    Production,
    ProductionId,
    Term,
};

/// Turns the syntax tree into a [`Grammar`], resolving production names to ids.
///
/// All productions are registered as placeholders first, so references may
/// point forward.
#[derive(Debug, Default)]
pub(super) struct Resolver {
    grammar: Grammar,
}

impl Resolver {
    pub fn push_ast(&mut self, ast: &ast::Grammar<'_>) -> Result<(), Error> {
        let mut ids = Vec::with_capacity(ast.0.len());
        for production in &ast.0 {
            ids.push(self.new_placeholder(production.lhs)?);
        }

        for (production, id) in ast.0.iter().zip(ids) {
            let body = production.rhs.resolve(self, production.lhs)?;
            self.finish_production(id, body);
        }

        Ok(())
    }

    pub fn finish(self) -> Grammar {
        self.grammar
    }

    fn new_placeholder(&mut self, name: Id<'_>) -> Result<ProductionId, Error> {
        let id = self
            .grammar
            .push(Production::new(name.as_str(), Expression::empty()))?;
        Ok(id)
    }

    fn finish_production(&mut self, id: ProductionId, body: Expression) {
        let production = self
            .grammar
            .get_mut(id)
            .unwrap_or_else(|| panic!("invalid production id: {id:?}"));
        production.body = body;
    }

    fn get_production_id(&self, name: Id<'_>, referenced_by: Id<'_>) -> Result<ProductionId, Error> {
        self.grammar
            .lookup(name.as_str())
            .ok_or_else(|| {
                Error::Undefined {
                    name: name.as_str().into(),
                    production: referenced_by.as_str().into(),
                }
            })
    }
}

trait Resolve<'source> {
    type Output;

    /// Resolves a part of the body of `production`.
    fn resolve(&self, resolver: &Resolver, production: Id<'source>) -> Result<Self::Output, Error>;
}

impl<'source> Resolve<'source> for Alternatives<'source> {
    type Output = Expression;

    fn resolve(&self, resolver: &Resolver, production: Id<'source>) -> Result<Expression, Error> {
        let alternatives = self
            .0
            .iter()
            .map(|sequence| sequence.resolve(resolver, production))
            .collect::<Result<_, _>>()?;
        Ok(Expression(alternatives))
    }
}

impl<'source> Resolve<'source> for Sequence<'source> {
    type Output = Alternative;

    fn resolve(&self, resolver: &Resolver, production: Id<'source>) -> Result<Alternative, Error> {
        let terms = self
            .0
            .iter()
            .map(|term| term.resolve(resolver, production))
            .collect::<Result<_, _>>()?;
        Ok(Alternative(terms))
    }
}

impl<'source> Resolve<'source> for ast::Term<'source> {
    type Output = Term;

    fn resolve(&self, resolver: &Resolver, production: Id<'source>) -> Result<Term, Error> {
        let term = match self {
            ast::Term::Literal(literal) => Term::Token(Literal::new(literal.0.clone())),
            ast::Term::Range(from, to) => {
                let is_char = |literal: &ast::Literal| literal.0.chars().count() == 1;
                if !is_char(from) || !is_char(to) {
                    return Err(Error::InvalidRange {
                        production: production.as_str().into(),
                        from: from.0.clone(),
                        to: to.0.clone(),
                    });
                }
                Term::Token(Literal::range(from.0.clone(), to.0.clone()))
            }
            ast::Term::Group(alternatives) => Term::Group(alternatives.resolve(resolver, production)?),
            ast::Term::Option(alternatives) => Term::Option(alternatives.resolve(resolver, production)?),
            ast::Term::Repetition(alternatives) => {
                Term::Repetition(alternatives.resolve(resolver, production)?)
            }
            ast::Term::Rule(id) => Term::Ref(resolver.get_production_id(*id, production)?),
        };

        Ok(term)
    }
}
