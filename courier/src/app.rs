use clap::{value_parser, Arg, ArgAction, Command as ClapCommand};
use console::Term;
use eyre::WrapErr;
use itertools::Itertools;
use std::{collections::HashMap, path::Path, str::FromStr, time::Duration};

use courier_core::{
    collection::Collection,
    executor::Executor,
    options::{Bail, BailModifier, RunOptions, Selector, SuppressPatterns},
    plan::{Planner, StepKind},
    reporter::{ConsoleReporter, NullReporter, ReporterType},
    runner::Runner,
    scope::Layer,
};

use crate::export::{export_layer, resolve_export_path};

/// Build the CLI with clap's builder pattern
fn build_cli<'a>(third_party_reporters: impl Iterator<Item = &'a String>) -> ClapCommand {
    let mut reporter_choices = vec![
        ReporterType::Console.to_string(),
        ReporterType::Null.to_string(),
    ];
    reporter_choices.extend(third_party_reporters.cloned());
    ClapCommand::new("courier")
        .about("courier CLI offers commands for executing and inspecting collection runs")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .subcommand(
            ClapCommand::new("run")
                .about("Run a collection")
                .arg(Arg::new("collection")
                    .required(true)
                    .help("Path to the collection JSON file"))
                .arg(Arg::new("environment")
                    .short('e')
                    .long("environment")
                    .help("Path to an environment JSON file"))
                .arg(Arg::new("globals")
                    .short('g')
                    .long("globals")
                    .help("Path to a globals JSON file"))
                .arg(Arg::new("iteration-data")
                    .short('d')
                    .long("iteration-data")
                    .help("Path to a JSON array of data rows, one per iteration"))
                .arg(Arg::new("iteration-count")
                    .short('n')
                    .long("iteration-count")
                    .help("Number of iterations to run. Defaults to the data row count, else 1")
                    .value_parser(value_parser!(usize)))
                .arg(Arg::new("folder")
                    .long("folder")
                    .help("Run only the named folders or requests. e.g. --folder auth,users")
                    .value_delimiter(',')
                    .action(ArgAction::Append))
                .arg(Arg::new("exclude-folder")
                    .long("exclude-folder")
                    .help("Exclude the named folders from the run. Exclusion wins over --folder")
                    .value_delimiter(',')
                    .action(ArgAction::Append))
                .arg(Arg::new("bail")
                    .long("bail")
                    .help("Stop the run on the first failure. Optional comma-separated modifiers: folder, failure")
                    .num_args(0..=2)
                    .default_missing_value("on")
                    .value_delimiter(','))
                .arg(Arg::new("suppress-exit-code")
                    .long("suppress-exit-code")
                    .help("Always exit with code 0, regardless of failures")
                    .action(ArgAction::SetTrue))
                .arg(Arg::new("suppress-request-errors")
                    .long("suppress-request-errors")
                    .help("Comma-separated request names or hosts whose network errors are recorded as non-failing"))
                .arg(Arg::new("no-executions-summary")
                    .long("no-executions-summary")
                    .help("Do not retain individual execution records on the summary (stats are kept)")
                    .action(ArgAction::SetTrue))
                .arg(Arg::new("timeout")
                    .long("timeout")
                    .help("Global run timeout in milliseconds")
                    .value_parser(value_parser!(u64)))
                .arg(Arg::new("timeout-request")
                    .long("timeout-request")
                    .help("Per-request timeout in milliseconds")
                    .value_parser(value_parser!(u64)))
                .arg(Arg::new("timeout-script")
                    .long("timeout-script")
                    .help("Per-script timeout in milliseconds")
                    .value_parser(value_parser!(u64)))
                .arg(Arg::new("export-environment")
                    .long("export-environment")
                    .help("Write the post-run environment snapshot to this path"))
                .arg(Arg::new("export-globals")
                    .long("export-globals")
                    .help("Write the post-run globals snapshot to this path"))
                .arg(Arg::new("reporters")
                    .long("reporters")
                    .help(format!("Specify the reporters to use in comma-separated string. Default is \"console\". [possible values: {}]", reporter_choices.iter().join(", ")))
                    .value_delimiter(',')
                    .action(ArgAction::Append))
                .arg(Arg::new("capture-rust")
                    .long("capture-rust")
                    .help("Capture Rust \"tracing\" based logs. Useful when courier itself misbehaves")
                    .action(ArgAction::SetTrue))
                .arg(Arg::new("color")
                    .long("color")
                    .help("Produce color output. Default is \"auto\"")
                    .value_parser(["auto", "always", "never"]))
        )
        .subcommand(
            ClapCommand::new("ls")
                .about("List the planned item sequence without executing it")
                .arg(Arg::new("collection")
                    .required(true)
                    .help("Path to the collection JSON file"))
                .arg(Arg::new("folder")
                    .long("folder")
                    .value_delimiter(',')
                    .action(ArgAction::Append))
                .arg(Arg::new("exclude-folder")
                    .long("exclude-folder")
                    .value_delimiter(',')
                    .action(ArgAction::Append))
        )
}

/// courier CLI.
#[derive(Default)]
pub struct App {
    third_party_reporters:
        HashMap<String, Box<dyn courier_core::reporter::Reporter + 'static + Send>>,
}

impl App {
    pub fn new() -> App {
        App {
            third_party_reporters: HashMap::new(),
        }
    }

    /// Install a third-party reporter.
    pub fn install_reporter(
        &mut self,
        name: impl Into<String>,
        reporter: impl courier_core::reporter::Reporter + 'static + Send,
    ) {
        self.third_party_reporters
            .insert(name.into(), Box::new(reporter));
    }

    /// Parse command-line args and run the courier CLI sub command.
    /// Returns the process exit code the caller should exit with; courier
    /// itself never terminates the process.
    pub async fn run(mut self, executor: impl Executor + 'static) -> eyre::Result<i32> {
        let matches = build_cli(self.third_party_reporters.keys()).get_matches();
        let term = Term::stdout();

        match matches.subcommand() {
            Some(("run", run_matches)) => {
                match run_matches.get_one::<String>("color").map(String::as_str) {
                    Some("always") => console::set_colors_enabled(true),
                    Some("never") => console::set_colors_enabled(false),
                    _ => {}
                }

                let collection: Collection =
                    load_json(run_matches.get_one::<String>("collection").unwrap())?;
                let options = build_options(run_matches)?;

                let mut runner = Runner::with_options(executor, options);
                if run_matches.get_flag("capture-rust") {
                    runner.capture_rust();
                }

                let reporters = run_matches
                    .get_many::<String>("reporters")
                    .map(|vals| vals.cloned().collect::<Vec<_>>())
                    .unwrap_or_else(|| vec![ReporterType::Console.to_string()]);
                for name in reporters {
                    match ReporterType::from_str(&name) {
                        Ok(ReporterType::Console) => runner.add_reporter(ConsoleReporter::new()),
                        Ok(ReporterType::Null) => runner.add_reporter(NullReporter),
                        Err(_) => match self.third_party_reporters.remove(&name) {
                            Some(reporter) => runner.add_reporter_boxed(reporter),
                            None => eyre::bail!("unknown reporter \"{name}\""),
                        },
                    }
                }

                let report = runner.run(collection).await;

                let working_dir = std::env::current_dir()
                    .wrap_err("failed to resolve the working directory")?;
                if let Some(path) = run_matches.get_one::<String>("export-environment") {
                    let path = resolve_export_path(Path::new(path), &working_dir)?;
                    export_layer(&path, &report.summary.environment)?;
                }
                if let Some(path) = run_matches.get_one::<String>("export-globals") {
                    let path = resolve_export_path(Path::new(path), &working_dir)?;
                    export_layer(&path, &report.summary.globals)?;
                }

                Ok(if report.summary.failed() { 1 } else { 0 })
            }
            Some(("ls", ls_matches)) => {
                let collection: Collection =
                    load_json(ls_matches.get_one::<String>("collection").unwrap())?;
                let include = selector_arg(ls_matches, "folder");
                let exclude = selector_arg(ls_matches, "exclude-folder");

                let steps = Planner::new(&collection, &include, &exclude).plan(false)?;
                for step in steps {
                    let path = step
                        .folder_path
                        .iter()
                        .map(String::as_str)
                        .chain([step.name.as_str()])
                        .join(" / ");
                    let line = match step.kind {
                        StepKind::Request => path,
                        StepKind::FolderEnter => format!("{path} (folder pre-request)"),
                        StepKind::FolderExit => format!("{path} (folder test)"),
                    };
                    term.write_line(&line)
                        .wrap_err("failed to write on terminal")?;
                }
                Ok(0)
            }
            _ => unreachable!("subcommand is required"),
        }
    }
}

fn selector_arg(matches: &clap::ArgMatches, id: &str) -> Selector {
    matches
        .get_many::<String>(id)
        .map(|vals| Selector::from(vals.cloned().collect::<Vec<_>>()))
        .unwrap_or_default()
}

fn build_options(run_matches: &clap::ArgMatches) -> eyre::Result<RunOptions> {
    let environment: Layer = match run_matches.get_one::<String>("environment") {
        Some(path) => load_json(path)?,
        None => Layer::default(),
    };
    let globals: Layer = match run_matches.get_one::<String>("globals") {
        Some(path) => load_json(path)?,
        None => Layer::default(),
    };
    let iteration_data: Option<Vec<Layer>> = run_matches
        .get_one::<String>("iteration-data")
        .map(|path| load_json(path))
        .transpose()?;

    let bail = match run_matches.get_many::<String>("bail") {
        None => Bail::default(),
        Some(vals) => {
            // A bare `--bail` carries the placeholder "on" and no
            // modifiers.
            let modifiers: Vec<BailModifier> = vals
                .filter(|v| v.as_str() != "on")
                .map(|v| {
                    BailModifier::from_str(v)
                        .map_err(|_| eyre::eyre!("unknown bail modifier \"{v}\""))
                })
                .collect::<eyre::Result<_>>()?;
            if modifiers.is_empty() {
                Bail::on()
            } else {
                Bail::with_modifiers(&modifiers)
            }
        }
    };

    Ok(RunOptions {
        iteration_count: run_matches.get_one::<usize>("iteration-count").copied(),
        iteration_data,
        folder: selector_arg(run_matches, "folder"),
        exclude_folder: selector_arg(run_matches, "exclude-folder"),
        bail,
        suppress_exit_code: run_matches.get_flag("suppress-exit-code"),
        suppress_request_errors: run_matches
            .get_one::<String>("suppress-request-errors")
            .map(|raw| SuppressPatterns::parse(raw))
            .unwrap_or_default(),
        executions_summary: !run_matches.get_flag("no-executions-summary"),
        timeout: run_matches
            .get_one::<u64>("timeout")
            .map(|ms| Duration::from_millis(*ms)),
        timeout_request: run_matches
            .get_one::<u64>("timeout-request")
            .map(|ms| Duration::from_millis(*ms)),
        timeout_script: run_matches
            .get_one::<u64>("timeout-script")
            .map(|ms| Duration::from_millis(*ms)),
        globals,
        environment,
        ..Default::default()
    })
}

fn load_json<T: serde::de::DeserializeOwned>(path: &str) -> eyre::Result<T> {
    let raw = std::fs::read_to_string(path).wrap_err_with(|| format!("failed to read {path}"))?;
    serde_json::from_str(&raw).wrap_err_with(|| format!("failed to parse {path}"))
}
