use clap::{arg, command, value_parser, ArgAction, ArgMatches, Command};
use schematic::{Config, ConfigLoader};
use std::{env, path::PathBuf};

use crate::errors::GraderInputError;

const CONFIGS: &[&str] = &[
    "pagegrade.json",
    "pagegrade.yml",
    "pagegrade.yaml",
    "pagegrade.toml",
];

/// What the binary was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum GraderCommand {
    /// Host side: launch the tester container for one exercise.
    Run {
        exercise: String,
        build: bool,
        remove: bool,
    },
    /// Inside the container: run the flat, process-backed tests.
    Schedule { config: PathBuf, output: PathBuf },
    /// Inside the container: run the structured page tests in a browser.
    Pages {
        spec: PathBuf,
        output: PathBuf,
        base_url: Option<String>,
        echo_spec: bool,
    },
}

pub fn configure() -> Result<(GraderContext, GraderCommand), GraderInputError> {
    let working_directory = env::current_dir().map_err(|e| GraderInputError::Config {
        msg: format!("unable to read the working directory: {e}"),
    })?;

    configure_from(cli().get_matches(), working_directory)
}

pub fn configure_from(
    cli_matches: ArgMatches,
    working_directory: PathBuf,
) -> Result<(GraderContext, GraderCommand), GraderInputError> {
    let configs: Vec<PathBuf> = CONFIGS
        .iter()
        .map(|c| working_directory.join(c))
        .filter(|c| c.exists())
        .collect();
    if configs.len() > 1 {
        return Err(GraderInputError::MultipleConfigs {
            files: configs
                .iter()
                .map(|c| c.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    let mut loader = ConfigLoader::<GraderParams>::new();
    for config in configs {
        loader.file(config.clone()).map_err(|e| GraderInputError::Config {
            msg: format!("failed to load {}: {e}", config.display()),
        })?;
    }

    let mut params = loader
        .load()
        .map_err(|e| GraderInputError::Config { msg: e.to_string() })?
        .config;

    let command = params.override_from_cli(&cli_matches)?;

    Ok((GraderContext::load(params, working_directory), command))
}

pub fn cli() -> Command {
    command!()
        .subcommand_required(true)
        .arg(
            arg!(
                -v --verbose "Print progress for every test while running"
            )
            .action(ArgAction::SetTrue)
            .global(true),
        )
        .arg(
            arg!(
                --porcelain "Reduce logging to be stable"
            )
            .action(ArgAction::SetTrue)
            .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Grade an exercise inside the tester container")
                .arg(arg!(<EXERCISE> "The exercise directory to grade"))
                .arg(
                    arg!(--build "Rebuild the tester image before running")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"max-runtime" <SECONDS> "How long to wait for the tester container")
                        .required(false)
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    arg!(--rm "Remove the tester container once it has finished")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("schedule")
                .about("Run process-backed tests in dependency order")
                .arg(
                    arg!(--config <FILE> "The flat test configuration")
                        .required(false)
                        .default_value("testConfig.json")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--output <FILE> "Where to write the results")
                        .required(false)
                        .default_value("result.json")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--seed <SEED> "Seed for shuffling the launch order")
                        .required(false)
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("pages")
                .about("Run structured page tests against a live application")
                .arg(
                    arg!(--spec <FILE> "The structured test specification")
                        .required(false)
                        .default_value("testSpec.json")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--output <FILE> "Where to write the results")
                        .required(false)
                        .default_value("result.json")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"base-url" <URL> "Override the base url of the specification")
                        .required(false),
                )
                .arg(
                    arg!(--"echo-spec" "Print the loaded specification before running")
                        .action(ArgAction::SetTrue),
                ),
        )
}

#[derive(Config, Debug, Clone)]
#[config(rename_all = "snake_case")]
pub struct GraderParams {
    /// The tester image to launch
    #[setting(env = "PAGEGRADE_IMAGE")]
    #[setting(default = "new_flask_tester")]
    pub image: String,

    /// Seconds to wait for the tester container before killing it
    #[setting(env = "PAGEGRADE_MAX_RUNTIME")]
    #[setting(default = 30)]
    pub max_runtime: u64,

    /// Host directory that receives result files
    #[setting(env = "PAGEGRADE_RESULTS_DIR")]
    #[setting(default = "results")]
    pub results_dir: String,

    /// Name of this binary inside the tester image
    #[setting(env = "PAGEGRADE_CONTAINER_BINARY")]
    #[setting(default = "pagegrade")]
    pub container_binary: String,

    /// Container runtime CLI
    #[setting(env = "PAGEGRADE_RUNTIME")]
    #[setting(default = "docker")]
    pub runtime: String,

    /// Command used for a single flat test, {file}, {class} and {test} are replaced
    #[setting(env = "PAGEGRADE_TEST_COMMAND")]
    #[setting(default = "python3 -m unittest {file}.{class}.{test}")]
    pub test_command: String,

    /// Shuffle the launch order of flat tests
    #[setting(env = "PAGEGRADE_SHUFFLE")]
    #[setting(default = true)]
    pub shuffle: bool,

    /// Seed for the launch order shuffle
    #[setting(env = "PAGEGRADE_SEED")]
    pub seed: Option<u64>,

    /// Run the browser without a window
    #[setting(env = "PAGEGRADE_HEADLESS")]
    #[setting(default = true)]
    pub headless: bool,

    /// Explicit browser executable
    #[setting(env = "PAGEGRADE_CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Milliseconds to wait after performing a page action
    #[setting(env = "PAGEGRADE_ACTION_SETTLE_MS")]
    #[setting(default = 250)]
    pub action_settle_ms: u64,

    /// Print progress for every test while running
    #[setting(env = "PAGEGRADE_VERBOSE")]
    pub verbose: bool,

    /// Reduce logging to be stable
    #[setting(env = "PAGEGRADE_PORCELAIN")]
    pub porcelain: bool,
}

// The configuration object used internally
#[derive(Debug, Clone)]
pub struct GraderContext {
    pub version: &'static str,
    pub working_directory: PathBuf,
    pub results_dir: PathBuf,
    pub params: GraderParams,
}

impl GraderContext {
    fn load(config: GraderParams, working_directory: PathBuf) -> Self {
        Self {
            results_dir: working_directory.join(&config.results_dir),
            working_directory,
            version: env!("CARGO_PKG_VERSION"),
            params: config,
        }
    }
}

impl GraderParams {
    fn override_from_cli(
        &mut self,
        cli_matches: &ArgMatches,
    ) -> Result<GraderCommand, GraderInputError> {
        if cli_matches.get_flag("verbose") {
            self.verbose = true;
        }

        if cli_matches.get_flag("porcelain") {
            self.porcelain = true;
        }

        match cli_matches.subcommand() {
            Some(("run", sub)) => {
                if let Some(max_runtime) = sub.get_one::<u64>("max-runtime") {
                    self.max_runtime = *max_runtime;
                }

                let exercise = sub
                    .get_one::<String>("EXERCISE")
                    .cloned()
                    .unwrap_or_default();

                Ok(GraderCommand::Run {
                    exercise,
                    build: sub.get_flag("build"),
                    remove: sub.get_flag("rm"),
                })
            }
            Some(("schedule", sub)) => {
                if let Some(seed) = sub.get_one::<u64>("seed") {
                    self.seed = Some(*seed);
                }

                Ok(GraderCommand::Schedule {
                    config: path_arg(sub, "config"),
                    output: path_arg(sub, "output"),
                })
            }
            Some(("pages", sub)) => Ok(GraderCommand::Pages {
                spec: path_arg(sub, "spec"),
                output: path_arg(sub, "output"),
                base_url: sub.get_one::<String>("base-url").cloned(),
                echo_spec: sub.get_flag("echo-spec"),
            }),
            other => Err(GraderInputError::Config {
                msg: format!("unknown command {:?}", other.map(|(name, _)| name)),
            }),
        }
    }
}

fn path_arg(matches: &ArgMatches, id: &str) -> PathBuf {
    matches.get_one::<PathBuf>(id).cloned().unwrap_or_default()
}
