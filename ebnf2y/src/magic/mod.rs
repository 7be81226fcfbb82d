//! Conflict minimizer
//!
//! Searches for the set of productions to inline that minimizes the weighted
//! number of conflicts the LALR tool reports for the rendered grammar.
//!
//! The candidates are the productions [`inline::candidates`] returns. A
//! [`Configuration`] decides for each candidate whether it's inlined. With up
//! to [`Minimizer::with_exhaustive_limit`] candidates all `2^k`
//! configurations are evaluated. Above that a steepest descent starting from
//! "inline nothing" is done, which may miss the optimum.
//!
//! Configurations are evaluated concurrently, but results are folded into the
//! best result by a single loop. Ties are broken by the number of productions,
//! then by the enumeration order.

mod tool;

use std::{
    collections::HashSet,
    fmt,
    time::Duration,
};

use derivative::Derivative;
use futures::stream::{
    self,
    StreamExt,
};
use itertools::Itertools;
use tokio::time::Instant;

pub use self::tool::{
    parse_report,
    Conflicts,
    ConflictChecker,
    ParseToolCommandError,
    ToolCommand,
    ToolError,
    Verdict,
    YaccTool,
    GRAMMAR_FILE,
};
use crate::{
    grammar::{
        Grammar,
        Name,
        ProductionId,
    },
    inline,
    skeleton::Skeleton,
    Error,
};

/// Exhaustive search is never done above this number of candidates.
pub const MAX_EXHAUSTIVE_LIMIT: usize = 24;

pub const DEFAULT_EXHAUSTIVE_LIMIT: usize = 10;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Weights {
    pub reduce_reduce: u64,
    pub shift_reduce: u64,
}

impl Weights {
    pub fn score(&self, conflicts: &Conflicts) -> u64 {
        self.reduce_reduce
            .saturating_mul(conflicts.reduce_reduce)
            .saturating_add(self.shift_reduce.saturating_mul(conflicts.shift_reduce))
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            reduce_reduce: 1,
            shift_reduce: 1,
        }
    }
}

/// Which candidates are inlined. Bit `j` is candidate `j`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Configuration(Vec<bool>);

impl Configuration {
    /// Inlines none of `k` candidates.
    pub fn none(k: usize) -> Self {
        Self(vec![false; k])
    }

    /// The configuration with number `index` in the exhaustive enumeration.
    pub fn from_index(index: u64, k: usize) -> Self {
        Self((0..k).map(|j| (index >> j) & 1 == 1).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_inlined(&self, candidate: usize) -> bool {
        self.0.get(candidate).copied().unwrap_or_default()
    }

    /// Indices of the inlined candidates.
    pub fn inlined(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().positions(|inlined| *inlined)
    }

    pub fn toggled(&self, candidate: usize) -> Self {
        let mut toggled = self.clone();
        if let Some(inlined) = toggled.0.get_mut(candidate) {
            *inlined = !*inlined;
        }
        toggled
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for inlined in &self.0 {
            f.write_str(if *inlined { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Result of checking one configuration.
#[derive(Clone, Debug)]
pub struct Evaluation {
    /// Position in the enumeration.
    pub order: u64,
    pub configuration: Configuration,
    pub inlined: Vec<Name>,

    /// Number of productions of the inlined grammar.
    pub productions: usize,
    pub verdict: Verdict,

    /// Weighted conflicts. `None` if the tool rejected the grammar, which
    /// ranks behind any score.
    pub score: Option<u64>,
}

impl Evaluation {
    pub fn is_rejected(&self) -> bool {
        self.score.is_none()
    }

    fn quality(&self) -> (bool, u64, usize) {
        (
            self.is_rejected(),
            self.score.unwrap_or_default(),
            self.productions,
        )
    }

    fn rank(&self) -> (bool, u64, usize, u64) {
        let (rejected, score, productions) = self.quality();
        (rejected, score, productions, self.order)
    }

    /// Returns `true` if this is better than `other`, not considering the
    /// enumeration order.
    fn improves(&self, other: &Evaluation) -> bool {
        self.quality() < other.quality()
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}] inline {{", self.order, self.configuration)?;
        for (i, name) in self.inlined.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}")?;
        }
        write!(f, "}} ({} productions): ", self.productions)?;

        match (&self.verdict, self.score) {
            (Verdict::Conflicts(conflicts), Some(score)) => {
                write!(
                    f,
                    "{} shift/reduce, {} reduce/reduce, score {score}",
                    conflicts.shift_reduce, conflicts.reduce_reduce
                )
            }
            _ => f.write_str("rejected"),
        }
    }
}

/// Best configuration found.
#[derive(Clone, Debug)]
pub struct Outcome {
    /// The grammar with the chosen productions inlined.
    pub grammar: Grammar,
    pub configuration: Configuration,
    pub inlined: Vec<Name>,
    pub conflicts: Conflicts,
    pub score: u64,

    /// `false` if not every configuration was evaluated, so better ones might
    /// exist.
    pub exhaustive: bool,

    /// Number of configurations evaluated.
    pub evaluated: usize,
}

/// Receives every evaluation when it's finished.
pub type Reporter = Box<dyn Fn(&Evaluation) + Send + Sync>;

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Minimizer<C> {
    checker: C,
    skeleton: Skeleton,
    weights: Weights,
    exhaustive_limit: usize,
    workers: usize,
    time_limit: Option<Duration>,

    #[derivative(Debug = "ignore")]
    reporter: Option<Reporter>,
}

impl<C: ConflictChecker> Minimizer<C> {
    /// `skeleton` renders the grammars for the checker. Its start production is
    /// never inlined.
    pub fn new(checker: C, skeleton: Skeleton) -> Self {
        Self {
            checker,
            skeleton,
            weights: Weights::default(),
            exhaustive_limit: DEFAULT_EXHAUSTIVE_LIMIT,
            workers: num_cpus::get(),
            time_limit: None,
            reporter: None,
        }
    }

    pub fn with_weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    /// Search exhaustively up to this many candidates. Capped at
    /// [`MAX_EXHAUSTIVE_LIMIT`].
    pub fn with_exhaustive_limit(mut self, exhaustive_limit: usize) -> Self {
        self.exhaustive_limit = exhaustive_limit.min(MAX_EXHAUSTIVE_LIMIT);
        self
    }

    /// Maximum number of concurrent checks.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_time_limit(mut self, time_limit: Option<Duration>) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_reporter(mut self, reporter: impl Fn(&Evaluation) + Send + Sync + 'static) -> Self {
        self.reporter = Some(Box::new(reporter));
        self
    }

    pub fn checker(&self) -> &C {
        &self.checker
    }

    pub async fn minimize(&self, grammar: &Grammar) -> Result<Outcome, Error> {
        let start = grammar.start(&self.skeleton.start)?;
        let candidates = inline::candidates(grammar, start);
        let k = candidates.len();

        let mut search = Search {
            minimizer: self,
            grammar,
            candidates: &candidates,
            deadline: self.time_limit.map(|limit| Instant::now() + limit),
            best: None,
            evaluated: 0,
            rejection: None,
            next_order: 0,
        };

        let exhaustive = if k <= self.exhaustive_limit {
            tracing::debug!(candidates = k, configurations = 1u64 << k, "exhaustive search");
            search
                .evaluate_all((0..1u64 << k).map(|index| Configuration::from_index(index, k)))
                .await?
                .complete
        }
        else {
            tracing::debug!(candidates = k, "local search");
            search.descend(k).await?;
            false
        };

        let evaluated = search.evaluated;
        let Some(best) = search.best.filter(|best| !best.is_rejected())
        else {
            let error = match search.rejection {
                Some(diagnostic) => ToolError::AllRejected { evaluated, diagnostic },
                None => ToolError::TimedOut,
            };
            return Err(error.into());
        };

        let Verdict::Conflicts(conflicts) = best.verdict
        else {
            unreachable!("evaluation with a score has conflicts");
        };
        let selected = best
            .configuration
            .inlined()
            .map(|j| candidates[j])
            .collect::<Vec<_>>();

        tracing::info!(
            score = best.score,
            shift_reduce = conflicts.shift_reduce,
            reduce_reduce = conflicts.reduce_reduce,
            evaluated,
            exhaustive,
            "minimized conflicts"
        );

        let (grammar, _) = inline::inline_selected(grammar, &selected);

        Ok(Outcome {
            grammar,
            configuration: best.configuration,
            inlined: best.inlined,
            conflicts,
            score: best.score.unwrap_or_default(),
            exhaustive,
            evaluated,
        })
    }

    async fn evaluate(
        &self,
        grammar: &Grammar,
        candidates: &[ProductionId],
        order: u64,
        configuration: Configuration,
    ) -> Result<Evaluation, Error> {
        let selected = configuration
            .inlined()
            .map(|j| candidates[j])
            .collect::<Vec<_>>();
        let (output, substituted) = inline::inline_selected(grammar, &selected);
        let inlined = substituted
            .iter()
            .filter_map(|id| grammar.name(*id).cloned())
            .collect();

        let grammar = output;
        let source = self.skeleton.render(&grammar)?;
        let verdict = self.checker.check(&source).await?;

        let score = match &verdict {
            Verdict::Conflicts(conflicts) => Some(self.weights.score(conflicts)),
            Verdict::Rejected(_) => None,
        };

        Ok(Evaluation {
            order,
            configuration,
            inlined,
            productions: grammar.len(),
            verdict,
            score,
        })
    }
}

/// State of one run of [`Minimizer::minimize`].
struct Search<'a, C> {
    minimizer: &'a Minimizer<C>,
    grammar: &'a Grammar,
    candidates: &'a [ProductionId],
    deadline: Option<Instant>,
    best: Option<Evaluation>,
    evaluated: usize,

    /// Diagnostic of the last rejected grammar.
    rejection: Option<String>,
    next_order: u64,
}

/// Result of evaluating a batch of configurations.
struct Batch {
    best: Option<Evaluation>,

    /// `false` if the deadline passed before all were evaluated.
    complete: bool,
}

impl<'a, C: ConflictChecker> Search<'a, C> {
    async fn evaluate_all(
        &mut self,
        configurations: impl Iterator<Item = Configuration>,
    ) -> Result<Batch, Error> {
        let minimizer = self.minimizer;
        let grammar = self.grammar;
        let candidates = self.candidates;

        let first = self.next_order;
        let mut count = 0;
        let configurations = configurations
            .enumerate()
            .map(|(i, configuration)| (first + i as u64, configuration))
            .inspect(|_| count += 1);

        let mut evaluations = stream::iter(configurations)
            .map(|(order, configuration)| {
                minimizer.evaluate(grammar, candidates, order, configuration)
            })
            .buffer_unordered(minimizer.workers);

        let mut batch = Batch {
            best: None,
            complete: true,
        };

        loop {
            let next = match self.deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, evaluations.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            tracing::debug!("time limit exceeded");
                            batch.complete = false;
                            break;
                        }
                    }
                }
                None => evaluations.next().await,
            };
            let Some(evaluation) = next
            else {
                break;
            };

            let evaluation = evaluation?;
            if batch
                .best
                .as_ref()
                .map_or(true, |best| evaluation.rank() < best.rank())
            {
                batch.best = Some(evaluation.clone());
            }
            self.record(evaluation);
        }

        // drops pending checks, which kills their tools
        drop(evaluations);
        self.next_order = first + count;

        Ok(batch)
    }

    /// Steepest descent over single candidate toggles, starting with nothing
    /// inlined.
    async fn descend(&mut self, k: usize) -> Result<(), Error> {
        let initial = Configuration::none(k);
        let mut visited = HashSet::new();
        visited.insert(initial.clone());

        let batch = self.evaluate_all(std::iter::once(initial)).await?;
        let Some(mut current) = batch.best
        else {
            return Ok(());
        };
        if !batch.complete {
            return Ok(());
        }

        loop {
            let neighbors = (0..k)
                .map(|j| current.configuration.toggled(j))
                .filter(|configuration| visited.insert(configuration.clone()))
                .collect::<Vec<_>>();
            if neighbors.is_empty() {
                break;
            }

            let batch = self.evaluate_all(neighbors.into_iter()).await?;
            match batch.best {
                Some(next) if next.improves(&current) => current = next,
                _ => break,
            }
            if !batch.complete {
                break;
            }
        }

        Ok(())
    }

    fn record(&mut self, evaluation: Evaluation) {
        self.evaluated += 1;

        tracing::debug!(
            order = evaluation.order,
            configuration = %evaluation.configuration,
            productions = evaluation.productions,
            score = ?evaluation.score,
            "evaluated configuration"
        );
        if let Some(reporter) = &self.minimizer.reporter {
            reporter(&evaluation);
        }

        if let Verdict::Rejected(diagnostic) = &evaluation.verdict {
            self.rejection = Some(diagnostic.clone());
        }

        if self
            .best
            .as_ref()
            .map_or(true, |best| evaluation.rank() < best.rank())
        {
            self.best = Some(evaluation);
        }
    }
}
