use std::{
    path::PathBuf,
    time::Duration,
};

use color_eyre::eyre::Error;
use ebnf2y::{
    magic::{
        ToolCommand,
        Weights,
    },
    InlineLevel,
    MagicParameters,
    Parameters,
    Pipeline,
};
use structopt::StructOpt;
use tokio::io::{
    AsyncReadExt,
    AsyncWriteExt,
};

/// Converts an EBNF grammar into a yacc skeleton grammar.
///
/// The EBNF is read from FILE, or stdin if no file is given.
#[derive(Debug, StructOpt)]
#[structopt(name = "ebnf2y")]
struct Args {
    /// Inline productions before desugaring: 0 (none), 1 (used once) or 2
    /// (all).
    #[structopt(long = "ie", default_value = "0")]
    ebnf_inline: InlineLevel,

    /// Inline productions after desugaring: 0 (none), 1 (used once) or 2
    /// (all).
    #[structopt(long = "iy", default_value = "0")]
    bnf_inline: InlineLevel,

    /// Search for the inlining minimizing wr * reduce/reduce + ws *
    /// shift/reduce conflicts.
    #[structopt(short = "m", long = "magic")]
    magic: bool,

    /// Like -m, but also prints every evaluated configuration to stderr.
    #[structopt(short = "M", long = "magic-report")]
    magic_report: bool,

    /// Write the yacc grammar to this file instead of stdout.
    #[structopt(short, long)]
    output: Option<PathBuf>,

    /// Write the (inlined) EBNF grammar to this file.
    #[structopt(long = "oe")]
    output_ebnf: Option<PathBuf>,

    /// Prefix of token names.
    #[structopt(short, long, default_value = "")]
    prefix: String,

    /// Name of the start production.
    #[structopt(long, default_value = "SourceFile")]
    start: String,

    /// Weight of reduce/reduce conflicts.
    #[structopt(long = "wr", default_value = "1")]
    reduce_reduce_weight: u64,

    /// Weight of shift/reduce conflicts.
    #[structopt(long = "ws", default_value = "1")]
    shift_reduce_weight: u64,

    /// LALR tool command. `{}` is replaced by the grammar file.
    #[structopt(long, default_value = "bison -o y.tab.c {}")]
    yacc: ToolCommand,

    /// Number of concurrent tool runs. Defaults to the number of CPUs.
    #[structopt(short = "j", long)]
    jobs: Option<usize>,

    /// Stop searching after this many seconds.
    #[structopt(long)]
    time_limit: Option<u64>,

    /// Search exhaustively up to this many candidates.
    #[structopt(long, default_value = "10")]
    exhaustive_limit: usize,

    /// EBNF source file.
    #[structopt(name = "FILE")]
    file: Option<PathBuf>,
}

impl Args {
    fn parameters(&self) -> Parameters {
        let magic = (self.magic || self.magic_report).then(|| {
            MagicParameters {
                weights: Weights {
                    reduce_reduce: self.reduce_reduce_weight,
                    shift_reduce: self.shift_reduce_weight,
                },
                verbose: self.magic_report,
                exhaustive_limit: self.exhaustive_limit,
                workers: self.jobs,
                time_limit: self.time_limit.map(Duration::from_secs),
                tool: self.yacc.clone(),
            }
        });

        Parameters {
            start: self.start.clone(),
            prefix: self.prefix.clone(),
            ebnf_inline: self.ebnf_inline,
            bnf_inline: self.bnf_inline,
            magic,
        }
    }

    pub async fn run(self) -> Result<(), Error> {
        // fails before anything is read
        let pipeline = Pipeline::new(self.parameters())?;

        let source = match &self.file {
            Some(path) => tokio::fs::read_to_string(path).await?,
            None => {
                let mut source = String::new();
                tokio::io::stdin().read_to_string(&mut source).await?;
                source
            }
        };

        let generated = pipeline.run(&source).await?;

        if let Some(outcome) = &generated.magic {
            tracing::info!(
                score = outcome.score,
                inlined = outcome.inlined.len(),
                exhaustive = outcome.exhaustive,
                "magic search done"
            );
            if !outcome.exhaustive {
                tracing::warn!(
                    evaluated = outcome.evaluated,
                    "search was not exhaustive, a better configuration might exist"
                );
            }
        }

        if let Some(path) = &self.output_ebnf {
            tokio::fs::write(path, generated.ebnf.to_string()).await?;
        }

        match &self.output {
            Some(path) => tokio::fs::write(path, &generated.skeleton).await?,
            None => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(generated.skeleton.as_bytes()).await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::from_args();
    args.run().await?;

    Ok(())
}
