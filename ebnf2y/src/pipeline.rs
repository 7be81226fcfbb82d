//! Runs all stages of a conversion:
//!
//! 1. read the EBNF source,
//! 2. inline on the EBNF level,
//! 3. desugar,
//! 4. inline on the BNF level,
//! 5. optionally minimize conflicts,
//! 6. render the skeleton.

use crate::{
    desugar::desugar,
    ebnf,
    grammar::Grammar,
    inline::inline,
    magic::{
        ConflictChecker,
        Minimizer,
        Outcome,
        YaccTool,
    },
    parameters::{
        CheckError,
        MagicParameters,
        Parameters,
    },
    skeleton::Skeleton,
    Error,
};

/// Grammars after the synchronous stages.
#[derive(Clone, Debug)]
pub struct Transformed {
    /// The grammar as read, after EBNF-level inlining.
    pub ebnf: Grammar,

    /// The desugared grammar, after BNF-level inlining.
    pub bnf: Grammar,
}

#[derive(Clone, Debug)]
pub struct Generated {
    pub ebnf: Grammar,

    /// The grammar the skeleton was rendered from.
    pub bnf: Grammar,

    /// The yacc grammar.
    pub skeleton: String,

    /// Result of the conflict minimizer, if it was run.
    pub magic: Option<Outcome>,
}

#[derive(Clone, Debug)]
pub struct Pipeline {
    parameters: Parameters,
}

impl Pipeline {
    /// Fails if the parameters are invalid.
    pub fn new(parameters: Parameters) -> Result<Self, CheckError> {
        parameters.check()?;
        Ok(Self { parameters })
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn skeleton(&self) -> Skeleton {
        Skeleton::new(&self.parameters.start, &self.parameters.prefix)
    }

    pub fn transform(&self, source: &str) -> Result<Transformed, Error> {
        let start = &self.parameters.start;

        let grammar = ebnf::read(source)?;
        let ebnf = inline(&grammar, self.parameters.ebnf_inline, start)?;
        let bnf = desugar(&ebnf, start)?;
        let bnf = inline(&bnf, self.parameters.bnf_inline, start)?;

        Ok(Transformed { ebnf, bnf })
    }

    /// Runs all stages. The minimizer uses the tool configured in the
    /// parameters.
    pub async fn run(&self, source: &str) -> Result<Generated, Error> {
        let tool = self
            .parameters
            .magic
            .as_ref()
            .map(|magic| YaccTool::new(magic.tool.clone()))
            .unwrap_or_default();
        self.run_with(source, tool).await
    }

    /// Runs all stages, checking conflicts with `checker`.
    pub async fn run_with<C: ConflictChecker>(&self, source: &str, checker: C) -> Result<Generated, Error> {
        let Transformed { ebnf, bnf } = self.transform(source)?;

        let (bnf, magic) = match &self.parameters.magic {
            Some(parameters) => {
                let outcome = self.minimizer(checker, parameters).minimize(&bnf).await?;
                (outcome.grammar.clone(), Some(outcome))
            }
            None => (bnf, None),
        };

        let skeleton = self.skeleton().render(&bnf)?;

        Ok(Generated {
            ebnf,
            bnf,
            skeleton,
            magic,
        })
    }

    fn minimizer<C: ConflictChecker>(&self, checker: C, parameters: &MagicParameters) -> Minimizer<C> {
        let minimizer = Minimizer::new(checker, self.skeleton())
            .with_weights(parameters.weights)
            .with_exhaustive_limit(parameters.exhaustive_limit)
            .with_workers(parameters.workers())
            .with_time_limit(parameters.time_limit);

        if parameters.verbose {
            minimizer.with_reporter(|evaluation| eprintln!("{evaluation}"))
        }
        else {
            minimizer
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        grammar,
        inline::InlineLevel,
        magic::{
            Conflicts,
            ToolError,
            Verdict,
        },
        utils::test::{
            lines,
            DEMO,
            OPTIONAL,
        },
    };

    /// Counts the rules in the rendered grammar as shift/reduce conflicts.
    struct CountRules;

    impl ConflictChecker for CountRules {
        fn check<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<Verdict, ToolError>> {
            let rules = source.lines().filter(|line| line.ends_with(':')).count();
            Box::pin(async move {
                Ok(Verdict::Conflicts(Conflicts {
                    shift_reduce: rules as u64,
                    reduce_reduce: 0,
                }))
            })
        }
    }

    fn parameters(start: &str) -> Parameters {
        Parameters {
            start: start.to_owned(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn it_generates_a_skeleton() {
        let pipeline = Pipeline::new(Parameters {
            bnf_inline: InlineLevel::UsedOnce,
            ..parameters("Opt")
        })
        .unwrap();
        let generated = pipeline.run(OPTIONAL).await.unwrap();

        assert!(generated.magic.is_none());
        assert_eq!(lines(&generated.ebnf), vec![r#"Opt = "a" [ "b" ] "c" ."#]);
        assert_eq!(lines(&generated.bnf), vec![r#"Opt = "a" "c" | "a" "b" "c" ."#]);
        assert!(generated
            .skeleton
            .contains("\t| 'a' 'b' 'c'\n\t\t{ $$ = node(\"Opt1\", 3, $1, $2, $3); }\n"));
    }

    #[test]
    fn it_inlines_on_the_ebnf_level() {
        let pipeline = Pipeline::new(Parameters {
            ebnf_inline: InlineLevel::UsedOnce,
            ..parameters("S")
        })
        .unwrap();
        let transformed = pipeline
            .transform(r#"S = { A } . A = "x" | "y" ."#)
            .unwrap();

        assert_eq!(lines(&transformed.ebnf), vec![r#"S = { "x" | "y" } ."#]);
        assert_eq!(
            lines(&transformed.bnf),
            vec![
                "S = S2 .",
                r#"S1 = "x" | "y" ."#,
                "S2 = /* empty */ | S2 S1 .",
            ]
        );
    }

    #[tokio::test]
    async fn it_minimizes_conflicts() {
        let pipeline = Pipeline::new(Parameters {
            magic: Some(MagicParameters {
                workers: Some(2),
                ..Default::default()
            }),
            ..parameters("Expression")
        })
        .unwrap();
        let generated = pipeline.run_with(DEMO, CountRules).await.unwrap();
        let outcome = generated.magic.unwrap();

        assert!(outcome.evaluated > 1);
        assert_eq!(outcome.grammar.len(), generated.bnf.len());
        assert!(generated.skeleton.contains("%start\tExpression\n"));
        assert_eq!(
            generated.skeleton,
            pipeline.skeleton().render(&generated.bnf).unwrap()
        );
    }

    #[test]
    fn it_checks_parameters_first() {
        let result = Pipeline::new(Parameters {
            ebnf_inline: InlineLevel::All,
            magic: Some(MagicParameters::default()),
            ..Default::default()
        });
        assert!(matches!(result, Err(CheckError::MagicWithInlineAll(_))));
    }

    #[tokio::test]
    async fn it_fails_for_missing_start() {
        let pipeline = Pipeline::new(Parameters::default()).unwrap();
        assert!(matches!(
            pipeline.run(OPTIONAL).await,
            Err(Error::Grammar(grammar::Error::StartNotFound(_)))
        ));
    }
}
