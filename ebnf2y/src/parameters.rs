use std::time::Duration;

use crate::{
    inline::InlineLevel,
    magic::{
        ToolCommand,
        Weights,
        DEFAULT_EXHAUSTIVE_LIMIT,
        MAX_EXHAUSTIVE_LIMIT,
    },
};

pub const DEFAULT_START: &str = "SourceFile";

/// The [`Parameters`] are invalid.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("magic search can't be combined with inlining level 'all' on the {0} level")]
    MagicWithInlineAll(&'static str),

    #[error("invalid magic parameters")]
    Magic(#[from] MagicCheckError),

    #[error("no start production name")]
    NoStart,
}

/// The [`MagicParameters`] are invalid.
#[derive(Debug, thiserror::Error)]
pub enum MagicCheckError {
    #[error("invalid number of workers: {0}")]
    Workers(usize),

    #[error("exhaustive limit {0} is larger than {MAX_EXHAUSTIVE_LIMIT}")]
    ExhaustiveLimit(usize),
}

/// Parameters of a conversion
#[derive(Clone, Debug)]
pub struct Parameters {
    /// Name of the start production. It's never inlined.
    pub start: String,

    /// Prefix of token names in the generated grammar.
    pub prefix: String,

    /// Inlining before desugaring.
    pub ebnf_inline: InlineLevel,

    /// Inlining after desugaring.
    pub bnf_inline: InlineLevel,

    /// Search for the inlining with the least conflicts. `None` to disable.
    pub magic: Option<MagicParameters>,
}

impl Parameters {
    /// Checks if the parameters are valid.
    pub fn check(&self) -> Result<(), CheckError> {
        if self.start.is_empty() {
            return Err(CheckError::NoStart);
        }

        if let Some(magic) = &self.magic {
            if self.ebnf_inline == InlineLevel::All {
                return Err(CheckError::MagicWithInlineAll("EBNF"));
            }
            if self.bnf_inline == InlineLevel::All {
                return Err(CheckError::MagicWithInlineAll("BNF"));
            }
            magic.check()?;
        }

        Ok(())
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            start: DEFAULT_START.to_owned(),
            prefix: String::new(),
            ebnf_inline: InlineLevel::None,
            bnf_inline: InlineLevel::None,
            magic: None,
        }
    }
}

/// Parameters of the conflict minimizer
#[derive(Clone, Debug)]
pub struct MagicParameters {
    pub weights: Weights,

    /// Print every evaluated configuration to stderr.
    pub verbose: bool,

    /// Candidate count up to which all configurations are evaluated.
    pub exhaustive_limit: usize,

    /// Number of concurrent tool runs. If set to `None`, the number of CPUs is
    /// used.
    pub workers: Option<usize>,

    /// Stops the search after this time and uses the best configuration found
    /// so far.
    pub time_limit: Option<Duration>,

    pub tool: ToolCommand,
}

impl MagicParameters {
    pub fn check(&self) -> Result<(), MagicCheckError> {
        if let Some(workers) = self.workers {
            if workers == 0 {
                return Err(MagicCheckError::Workers(workers));
            }
        }

        if self.exhaustive_limit > MAX_EXHAUSTIVE_LIMIT {
            return Err(MagicCheckError::ExhaustiveLimit(self.exhaustive_limit));
        }

        Ok(())
    }

    pub fn workers(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }
}

impl Default for MagicParameters {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            verbose: false,
            exhaustive_limit: DEFAULT_EXHAUSTIVE_LIMIT,
            workers: None,
            time_limit: None,
            tool: ToolCommand::default(),
        }
    }
}
