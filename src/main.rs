use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use glob::glob;
use ledgergrid::{
    ingest::{load_table, SourceFormat},
    merge_named_tables,
    output::{
        default_output_path, merged_output_path, write_regularized, write_table, OutputFormat,
    },
    process::diagnostics::Diagnostics,
    regularize_table,
    staging::{stage_reader, StagedFile},
    EngineConfig,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Regularize trading-report balances onto a fixed grid and merge paired exports"
)]
struct Cli {
    /// YAML engine config; built-in defaults otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Turn each report into a `DateTime,Balance` series on the cadence grid
    Regularize {
        /// Files, glob patterns, or `-` for stdin
        #[arg(required = true)]
        inputs: Vec<String>,
        /// Output file (single input) or directory (several inputs)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
        /// How to read `-`
        #[arg(long, value_enum, default_value = "delimited")]
        stdin_format: SourceFormat,
    },
    /// Left-join a secondary export onto a primary one by timestamp
    Merge {
        primary: PathBuf,
        secondary: PathBuf,
        /// Output file; defaults to the generated merged name next to the primary
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
}

/// A regularize input, either on disk or staged from stdin.
enum Input {
    File(PathBuf),
    Stdin(StagedFile),
}

impl Input {
    fn path(&self) -> &Path {
        match self {
            Input::File(p) => p,
            Input::Stdin(staged) => staged.path(),
        }
    }

    fn label(&self) -> String {
        match self {
            Input::File(p) => p.display().to_string(),
            Input::Stdin(staged) => staged.original_name().to_string(),
        }
    }
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // ─── 2) load config ──────────────────────────────────────────────
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    debug!(?config, "engine config");

    match cli.command {
        Command::Regularize {
            inputs,
            output,
            format,
            stdin_format,
        } => run_regularize(&config, &inputs, output.as_deref(), format, stdin_format),
        Command::Merge {
            primary,
            secondary,
            output,
            format,
        } => run_merge(&config, &primary, &secondary, output.as_deref(), format),
    }
}

/// Expand globs; literal paths that match nothing are kept so the read reports them.
fn expand_inputs(patterns: &[String], stdin_format: SourceFormat) -> Result<Vec<Input>> {
    let mut inputs = Vec::new();
    for pattern in patterns {
        if pattern == "-" {
            // the staged name's extension tells load_table how to parse it
            let name = format!("stdin.{}", stdin_format.extension());
            let staged = stage_reader(std::io::stdin().lock(), &name)?;
            inputs.push(Input::Stdin(staged));
            continue;
        }
        let matches: Vec<PathBuf> = glob(pattern)
            .with_context(|| format!("bad glob pattern {}", pattern))?
            .filter_map(|r| r.map_err(|e| warn!("glob error: {}", e)).ok())
            .collect();
        if matches.is_empty() {
            inputs.push(Input::File(PathBuf::from(pattern)));
        } else {
            inputs.extend(matches.into_iter().map(Input::File));
        }
    }
    Ok(inputs)
}

fn output_path_for(
    input: &Input,
    output: Option<&Path>,
    many: bool,
    format: OutputFormat,
) -> PathBuf {
    let default_name = match input {
        Input::File(p) => default_output_path(p, format),
        Input::Stdin(_) => PathBuf::from(format!("stdin_BD.{}", format.extension())),
    };
    match output {
        Some(dir) if many => dir.join(default_name.file_name().unwrap_or_default()),
        Some(file) => file.to_path_buf(),
        None => default_name,
    }
}

fn run_regularize(
    config: &EngineConfig,
    patterns: &[String],
    output: Option<&Path>,
    format: Option<OutputFormat>,
    stdin_format: SourceFormat,
) -> Result<()> {
    let inputs = expand_inputs(patterns, stdin_format)?;
    let many = inputs.len() > 1;
    if many {
        if let Some(dir) = output {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
    }

    let mut failed = 0usize;
    for input in &inputs {
        let label = input.label();
        let format = format
            .or_else(|| output.filter(|_| !many).map(OutputFormat::from_path))
            .unwrap_or(OutputFormat::Csv);
        let out_path = output_path_for(input, output, many, format);

        // each input stands alone: one bad file does not stop the rest
        let result = load_table(input.path(), false)
            .and_then(|table| Ok(regularize_table(&table, config)?))
            .and_then(|out| {
                report(&label, &out.diagnostics);
                write_regularized(&out.series, &out_path, format)
            });
        match result {
            Ok(bytes) => info!(input = %label, output = %out_path.display(), bytes, "done"),
            Err(e) => {
                error!(input = %label, "{:#}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} inputs failed", failed, inputs.len());
    }
    Ok(())
}

fn run_merge(
    config: &EngineConfig,
    primary: &Path,
    secondary: &Path,
    output: Option<&Path>,
    format: Option<OutputFormat>,
) -> Result<()> {
    let name = |p: &Path| {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    let (primary_name, secondary_name) = (name(primary), name(secondary));

    let primary_table = load_table(primary, true)?;
    let secondary_table = load_table(secondary, true)?;
    let merged = merge_named_tables(
        &primary_name,
        &primary_table,
        &secondary_name,
        &secondary_table,
        config,
    )?;
    report(&primary_name, &merged.diagnostics);

    let format = format
        .or_else(|| output.map(OutputFormat::from_path))
        .unwrap_or(OutputFormat::Csv);
    let out_path = match output {
        Some(p) => p.to_path_buf(),
        None => merged_output_path(primary, &merged.file_name, format),
    };
    let bytes = write_table(&merged.table.to_table(), &out_path, format)?;
    info!(output = %out_path.display(), rows = merged.table.len(), bytes, "merged");
    Ok(())
}

fn report(label: &str, diagnostics: &Diagnostics) {
    if diagnostics.is_empty() {
        return;
    }
    let s = diagnostics.summary();
    info!(
        input = label,
        structural = s.structural,
        unparsable_timestamps = s.unparsable_timestamps,
        missing_values = s.missing_values,
        duplicates = s.duplicates,
        off_grid = s.off_grid,
        unparsable_keys = s.unparsable_keys,
        "rows recovered"
    );
    for d in diagnostics {
        debug!(input = label, "{}", d);
    }
}
