use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_diffexpr::app::{App, LogSink, RunSettings};
use kira_diffexpr::command;
use kira_diffexpr::config::{ConfigLoader, RunParams, default_threads};
use kira_diffexpr::diff_output;
use kira_diffexpr::domain::ConditionGroup;
use kira_diffexpr::error::DiffExprError;
use kira_diffexpr::output::JsonOutput;
use kira_diffexpr::platform::PlatformClient;
use kira_diffexpr::runner::{SystemToolRunner, ToolInvocation, resolve_program};

#[derive(Parser)]
#[command(name = "kira-de")]
#[command(about = "Run cuffmerge + cuffdiff over a platform expression set and save the results")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the full differential expression pipeline")]
    Run(RunArgs),
    #[command(about = "Print the cuffdiff command line for the given inputs")]
    Command(CommandArgs),
    #[command(about = "Summarize a cuffdiff gene_exp.diff file")]
    Parse(ParseArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    params: String,
}

#[derive(Args)]
struct CommandArgs {
    #[arg(long)]
    params: Option<String>,

    #[arg(long)]
    merged_gtf: Utf8PathBuf,

    #[arg(long)]
    output_dir: Utf8PathBuf,

    /// `LABEL=replicate.bam[,replicate.bam...]`, once per condition.
    #[arg(long = "condition", required = true)]
    conditions: Vec<String>,

    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, default_value = "cuffdiff")]
    program: String,
}

#[derive(Args)]
struct ParseArgs {
    path: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<DiffExprError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &DiffExprError) -> u8 {
    match error {
        DiffExprError::Validation(_)
        | DiffExprError::UnsupportedShape { .. }
        | DiffExprError::MissingConfig
        | DiffExprError::ConfigRead(_)
        | DiffExprError::ConfigParse(_) => 2,
        DiffExprError::ToolExecution { .. }
        | DiffExprError::MissingTool(_)
        | DiffExprError::ServiceHttp(_)
        | DiffExprError::ServiceStatus { .. }
        | DiffExprError::ServiceCall { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_pipeline(args),
        Commands::Command(args) => print_command(args),
        Commands::Parse(args) => {
            let table = diff_output::parse_diff_file(&args.path)?;
            JsonOutput::print_table(&table).into_diagnostic()?;
            Ok(())
        }
    }
}

fn run_pipeline(args: RunArgs) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let params = RunParams::load(&args.params)?;

    let mut settings = RunSettings::from(&config);
    settings.tools.cuffmerge = resolve_program(&settings.tools.cuffmerge)?;
    settings.tools.cuffdiff = resolve_program(&settings.tools.cuffdiff)?;

    let platform = PlatformClient::new(&config)?;
    let app = App::new(platform, SystemToolRunner, settings);
    let result = app.run(&params, &LogSink)?;
    JsonOutput::print_run(&result).into_diagnostic()?;
    Ok(())
}

fn print_command(args: CommandArgs) -> miette::Result<()> {
    let params = match args.params.as_deref() {
        Some(path) => RunParams::load(path)?,
        None => RunParams::default(),
    };
    let groups = args
        .conditions
        .iter()
        .map(|value| parse_condition(value))
        .collect::<Result<Vec<_>, DiffExprError>>()?;

    let invocation = ToolInvocation::new(
        args.program,
        command::cuffdiff_args(
            args.threads.unwrap_or_else(default_threads),
            &args.output_dir,
            &args.merged_gtf,
            &groups,
            &params.advanced(),
        ),
    );
    println!("{}", invocation.command_line());
    Ok(())
}

fn parse_condition(value: &str) -> Result<ConditionGroup, DiffExprError> {
    let (label, files) = value.split_once('=').ok_or_else(|| {
        DiffExprError::Validation(format!("condition must be LABEL=bam[,bam...]: {value}"))
    })?;
    let alignments: Vec<Utf8PathBuf> = files
        .split(',')
        .filter(|path| !path.is_empty())
        .map(Utf8PathBuf::from)
        .collect();
    if label.is_empty() || alignments.is_empty() {
        return Err(DiffExprError::Validation(format!(
            "condition must be LABEL=bam[,bam...]: {value}"
        )));
    }
    Ok(ConditionGroup {
        label: label.to_string(),
        alignments,
    })
}
