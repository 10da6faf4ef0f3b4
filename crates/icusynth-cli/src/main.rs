mod config;
mod logging;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand, ValueEnum};
use icusynth_core::{Error as CoreError, GeneratorConfig};
use icusynth_eval::{EvalError, VerificationEngine, VerifyOptions};
use icusynth_generate::{GenerateOptions, GenerationEngine, GenerationError, Variant};
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("generation error: {0}")]
    Generate(#[from] GenerationError),
    #[error("verification error: {0}")]
    Eval(#[from] EvalError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging error: {0}")]
    Logging(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
}

#[derive(Parser, Debug)]
#[command(name = "icusynth", version, about = "Synthetic ICU dataset generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate and publish one or all variants.
    Generate(GenerateArgs),
    /// Print the JSON schema of the configuration file.
    Schema(SchemaArgs),
    /// Re-read a published variant directory and check its integrity.
    Verify(VerifyArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    A,
    B,
    C,
    All,
}

impl FormatArg {
    fn variants(self) -> Vec<Variant> {
        match self {
            FormatArg::A => vec![Variant::FormatA],
            FormatArg::B => vec![Variant::FormatB],
            FormatArg::C => vec![Variant::FormatC],
            FormatArg::All => Variant::ALL.to_vec(),
        }
    }
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Variant to generate.
    #[arg(long, value_enum, default_value_t = FormatArg::All)]
    format: FormatArg,
    /// Output root; each variant gets its own directory below it.
    #[arg(long, default_value = "output")]
    out: PathBuf,
    /// Override the configured seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Override the configured population size.
    #[arg(long, value_name = "N")]
    patients: Option<usize>,
    /// TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Append JSON log lines to this file.
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Write the schema here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// Variant the directory was published as.
    #[arg(long, value_enum)]
    format: FormatArg,
    /// Published variant directory, e.g. output/mimic_format.
    dir: PathBuf,
    /// Where verification.json and verification.md go (default: DIR).
    #[arg(long)]
    report_dir: Option<PathBuf>,
    /// Report violations without failing.
    #[arg(long, default_value_t = false)]
    lenient: bool,
    /// Violations listed in the markdown report.
    #[arg(long, default_value_t = 20)]
    max_examples: usize,
    /// Also write every violation to violations.json.
    #[arg(long, default_value_t = false)]
    write_violations: bool,
    /// Append JSON log lines to this file.
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Schema(args) => run_schema(args),
        Command::Verify(args) => run_verify(args),
    }
}

fn run_generate(args: GenerateArgs) -> Result<(), CliError> {
    logging::init_logging(args.log_file.as_deref())?;
    let config = config::resolve_config(args.config.as_deref(), args.seed, args.patients)?;

    tracing::info!(
        out = %args.out.display(),
        seed = config.seed,
        n_patients = config.n_patients,
        "run started"
    );
    let timer = Instant::now();

    let engine = GenerationEngine::new(GenerateOptions {
        out_dir: args.out,
        config,
    });
    for result in engine.run_all(&args.format.variants())? {
        println!(
            "{}\t{} rows\t{}",
            result.summary.variant,
            result.summary.total_rows,
            result.output_dir.display()
        );
    }

    let duration_ms = timer.elapsed().as_millis();
    tracing::info!(status = "success", duration_ms = duration_ms, "run finished");
    Ok(())
}

fn run_schema(args: SchemaArgs) -> Result<(), CliError> {
    let schema = schemars::schema_for!(GeneratorConfig);
    let mut json = serde_json::to_string_pretty(&schema)?;
    json.push('\n');
    match args.out {
        Some(path) => std::fs::write(path, json)?,
        None => print!("{json}"),
    }
    Ok(())
}

fn run_verify(args: VerifyArgs) -> Result<(), CliError> {
    logging::init_logging(args.log_file.as_deref())?;
    let variant = match args.format {
        FormatArg::A => Variant::FormatA,
        FormatArg::B => Variant::FormatB,
        FormatArg::C => Variant::FormatC,
        FormatArg::All => {
            return Err(CliError::InvalidArgs(
                "verify needs a single format: a, b or c".to_string(),
            ));
        }
    };

    let engine = VerificationEngine::new(VerifyOptions {
        strict: !args.lenient,
        max_examples: args.max_examples,
        write_violations: args.write_violations,
        out_dir: args.report_dir,
    });
    let result = engine.run(variant, &args.dir)?;
    println!(
        "{}\t{} violations\t{}",
        variant,
        result.violations.len(),
        result.markdown_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_defaults_to_every_variant() {
        let cli = Cli::try_parse_from(["icusynth", "generate"]).expect("parse");
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.format.variants(), Variant::ALL.to_vec());
        assert_eq!(args.out, PathBuf::from("output"));
        assert!(args.seed.is_none());
    }

    #[test]
    fn generate_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "icusynth",
            "generate",
            "--format",
            "b",
            "--seed",
            "7",
            "--patients",
            "25",
            "--out",
            "/tmp/icu",
        ])
        .expect("parse");
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.format.variants(), vec![Variant::FormatB]);
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.patients, Some(25));
    }

    #[test]
    fn verify_requires_a_format_and_directory() {
        assert!(Cli::try_parse_from(["icusynth", "verify", "output/mimic_format"]).is_err());
        let cli = Cli::try_parse_from([
            "icusynth",
            "verify",
            "--format",
            "c",
            "--lenient",
            "output/omop_format",
        ])
        .expect("parse");
        let Command::Verify(args) = cli.command else {
            panic!("expected verify");
        };
        assert_eq!(args.format, FormatArg::C);
        assert!(args.lenient);
        assert_eq!(args.dir, PathBuf::from("output/omop_format"));
    }

    #[test]
    fn schema_lists_config_fields() {
        let schema = schemars::schema_for!(GeneratorConfig);
        let json = serde_json::to_string(&schema).expect("serialize schema");
        assert!(json.contains("n_patients"));
        assert!(json.contains("icu_stay_rate"));
    }

    #[test]
    fn schema_command_writes_a_file() {
        let path = std::env::temp_dir()
            .join(format!("icusynth_schema_{}.json", uuid::Uuid::new_v4()));
        run_schema(SchemaArgs {
            out: Some(path.clone()),
        })
        .expect("write schema");
        let contents = std::fs::read_to_string(&path).expect("read schema");
        assert!(contents.contains("\"format_b\""));
        std::fs::remove_file(&path).ok();
    }
}
