//! Converts EBNF grammars into yacc/bison grammar skeletons.
//!
//! The input is written in the EBNF dialect of the Go language specification.
//! Lower-case production names are lexical tokens, CamelCase names are
//! nonterminals. The conversion runs these stages:
//!
//!  - [`ebnf`] reads the source into a [`grammar::Grammar`].
//!  - [`inline`] optionally substitutes productions at their references.
//!  - [`desugar`] replaces groups, options and repetitions by synthetic
//!    productions.
//!  - [`magic`] optionally searches for the inlining with the least
//!    conflicts, as reported by an external LALR tool.
//!  - [`skeleton`] renders the result with actions that build a parse tree.
//!
//! [`Pipeline`] runs all of them.
//!
//! # Example
//!
//! ```
//! # use ebnf2y::{Pipeline, Parameters, Error};
//! # fn main() -> Result<(), Error> {
//! let source = r#"
//! Digits = digit { digit } .
//! digit  = "0" … "9" .
//! "#;
//!
//! let pipeline = Pipeline::new(Parameters {
//!     start: "Digits".to_owned(),
//!     ..Default::default()
//! })?;
//!
//! let transformed = pipeline.transform(source)?;
//! let skeleton = pipeline.skeleton().render(&transformed.bnf)?;
//! print!("{skeleton}");
//! # Ok(())
//! # }
//! ```

pub mod desugar;
pub mod ebnf;
pub mod grammar;
pub mod inline;
pub mod magic;
pub mod parameters;
pub mod pipeline;
pub mod skeleton;
mod utils;

pub use crate::{
    inline::InlineLevel,
    parameters::{
        MagicParameters,
        Parameters,
    },
    pipeline::{
        Generated,
        Pipeline,
    },
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("invalid EBNF")]
    Ebnf(#[from] crate::ebnf::Error),

    #[error("grammar error")]
    Grammar(#[from] crate::grammar::Error),

    #[error("invalid parameters")]
    Check(#[from] crate::parameters::CheckError),

    #[error("LALR tool error")]
    Tool(#[from] crate::magic::ToolError),
}
