//! The external LALR tool.

use std::{
    fmt,
    io::ErrorKind,
    path::{
        Path,
        PathBuf,
    },
    process::Stdio,
    str::FromStr,
    sync::atomic::{
        AtomicU64,
        Ordering,
    },
};

use futures::future::BoxFuture;
use itertools::Itertools;
use tokio::process::Command;

/// Name of the grammar file passed to the tool.
pub const GRAMMAR_FILE: &str = "grammar.y";

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to run LALR tool '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("the LALR tool rejected all {evaluated} grammars. last diagnostic:\n{diagnostic}")]
    AllRejected { evaluated: usize, diagnostic: String },

    #[error("time limit exceeded before any grammar was evaluated")]
    TimedOut,
}

/// Conflicts the tool reported for a grammar.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Conflicts {
    pub shift_reduce: u64,
    pub reduce_reduce: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Conflicts(Conflicts),

    /// The tool failed on the grammar. Contains its diagnostic output.
    Rejected(String),
}

/// Counts the conflicts of a rendered grammar.
///
/// Errors are reserved for failures to run the check at all. A grammar the
/// checker doesn't accept is a [`Verdict::Rejected`].
pub trait ConflictChecker: Send + Sync {
    fn check<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<Verdict, ToolError>>;
}

/// Command line of the tool. An argument `{}` is replaced by the name of the
/// grammar file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ToolCommand {
    fn default() -> Self {
        Self {
            program: "bison".to_owned(),
            args: vec!["-o".to_owned(), "y.tab.c".to_owned(), "{}".to_owned()],
        }
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("empty tool command")]
pub struct ParseToolCommandError;

impl FromStr for ToolCommand {
    type Err = ParseToolCommandError;

    /// Splits at whitespace. If no argument contains `{}`, the grammar file is
    /// passed as last argument.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace().map(ToOwned::to_owned);
        let program = words.next().ok_or(ParseToolCommandError)?;
        let mut args = words.collect::<Vec<_>>();

        if !args.iter().any(|arg| arg.contains("{}")) {
            args.push("{}".to_owned());
        }

        Ok(Self { program, args })
    }
}

/// Runs a yacc-like tool as a subprocess.
///
/// Every check runs in its own scratch directory, which is removed when the
/// check finishes or is cancelled. Dropping a pending check kills the tool.
#[derive(Debug)]
pub struct YaccTool {
    command: ToolCommand,
    scratch: PathBuf,
    sequence: AtomicU64,
}

impl YaccTool {
    pub fn new(command: ToolCommand) -> Self {
        Self {
            command,
            scratch: std::env::temp_dir(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates the scratch directories in `dir` instead of the system's
    /// temporary directory.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch = dir.into();
        self
    }

    pub fn command(&self) -> &ToolCommand {
        &self.command
    }

    async fn run(&self, source: &str) -> Result<Verdict, ToolError> {
        let dir = self.scratch_dir().await?;
        tokio::fs::write(dir.path().join(GRAMMAR_FILE), source).await?;

        let args = self
            .command
            .args
            .iter()
            .map(|arg| arg.replace("{}", GRAMMAR_FILE));

        let output = Command::new(&self.command.program)
            .args(args)
            .current_dir(dir.path())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| {
                ToolError::Spawn {
                    program: self.command.program.clone(),
                    source,
                }
            })?;

        let mut report = String::from_utf8_lossy(&output.stdout).into_owned();
        report.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(Verdict::Conflicts(parse_report(&report)))
        }
        else {
            tracing::trace!(status = %output.status, "tool rejected grammar");
            Ok(Verdict::Rejected(report))
        }
    }

    async fn scratch_dir(&self) -> Result<ScratchDir, ToolError> {
        loop {
            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
            let path = self
                .scratch
                .join(format!("ebnf2y-{}-{sequence}", std::process::id()));

            match tokio::fs::create_dir(&path).await {
                Ok(()) => return Ok(ScratchDir { path }),
                // another tool instance of this process got there first
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Default for YaccTool {
    fn default() -> Self {
        Self::new(ToolCommand::default())
    }
}

impl ConflictChecker for YaccTool {
    fn check<'a>(&'a self, source: &'a str) -> BoxFuture<'a, Result<Verdict, ToolError>> {
        Box::pin(self.run(source))
    }
}

/// Directory that is removed when dropped.
#[derive(Debug)]
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!(path = %self.path.display(), "failed to remove scratch directory: {e}");
        }
    }
}

/// Reads conflict counts from the output of bison, byacc or goyacc.
///
/// Looks for `N shift/reduce` and `N reduce/reduce` anywhere in the report. If
/// a count is reported more than once, the largest one is taken.
pub fn parse_report(report: &str) -> Conflicts {
    let mut conflicts = Conflicts::default();

    for (count, kind) in report.split_whitespace().tuple_windows() {
        let Ok(count) = count.parse::<u64>()
        else {
            continue;
        };

        if kind.starts_with("shift/reduce") {
            conflicts.shift_reduce = conflicts.shift_reduce.max(count);
        }
        else if kind.starts_with("reduce/reduce") {
            conflicts.reduce_reduce = conflicts.reduce_reduce.max(count);
        }
    }

    conflicts
}
