use crate::cli::command_parser::parse_commands;
use crate::core::settings_resolver::{CommandLine, SettingsLayer};
use crate::errors::ConfigError;
use crate::models::EngineCommands;
use clap::Parser;
use std::path::PathBuf;

pub mod command_parser;
pub mod dispatcher;
pub mod help;

/// Builds the color-aware help string from the `cli.help.template` message.
fn build_help_string() -> &'static str {
    let use_colors = colored::control::SHOULD_COLORIZE.should_colorize();

    let template = t!("cli.help.template");

    let title = if use_colors { "\x1b[1;33m" } else { "" }; // Bold Yellow
    let hl = if use_colors { "\x1b[1;36m" } else { "" }; // Bold Cyan
    let cmd = if use_colors { "\x1b[36m" } else { "" }; // Cyan
    let group = if use_colors { "\x1b[1;32m" } else { "" }; // Bold Green
    let dim = if use_colors { "\x1b[2m" } else { "" };
    let reset = if use_colors { "\x1b[0m" } else { "" };

    let formatted_string = template
        .replace("<title>", title)
        .replace("</title>", reset)
        .replace("<hl>", hl)
        .replace("</hl>", reset)
        .replace("<cmd>", cmd)
        .replace("</cmd>", reset)
        .replace("<group>", group)
        .replace("</group>", reset)
        .replace("<dim>", dim)
        .replace("</dim>", reset);

    Box::leak(formatted_string.into_boxed_str())
}

/// keel: bootstraps a build definition and runs its commands.
#[derive(Parser, Debug, Default)]
#[command(
    author,
    version,
    about,
    help_template = { build_help_string() },
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// Deletes the content of the output area before running commands.
    #[arg(short = 'c', long = "clean")]
    pub clean_output: bool,

    /// Deletes the content of the work area before running commands.
    #[arg(short = 'w', long)]
    pub clean_work: bool,

    /// The plugin targeted by commands without an explicit `target:`.
    #[arg(short, long, value_name = "KBEAN")]
    pub kbean: Option<String>,

    /// Uses the existing build-definition output without compiling.
    #[arg(short, long)]
    pub skip_compile: bool,

    /// Keeps going when the build definition does not compile.
    #[arg(short = 'f', long = "force")]
    pub ignore_compile_failure: bool,

    /// Shows help instead of running commands. Without a topic, shows general help.
    #[arg(long, value_name = "TOPIC", num_args = 0..=1, default_missing_value = "")]
    pub doc: Option<String>,

    /// Extra classpath entries, placed before every other entry.
    #[arg(short = 'p', long, value_name = "ENTRY", value_delimiter = ',')]
    pub classpath: Vec<String>,

    /// Project root. Defaults to the nearest directory holding a `keel.toml`.
    #[arg(short, long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[arg(short, long)]
    pub verbose: bool,

    /// `[target:] [key=value ...] [action[#arg...] ...]`, repeated.
    #[arg(allow_hyphen_values = true)]
    pub commands: Vec<String>,
}

impl Cli {
    /// The command-line settings layer. Flags only count when given.
    pub fn settings_layer(&self) -> SettingsLayer<CommandLine> {
        let given = |flag: bool| flag.then_some(true);
        let mut layer = SettingsLayer::new();
        layer.kbean = self.kbean.clone();
        layer.clean_work = given(self.clean_work);
        layer.clean_output = given(self.clean_output);
        layer.ignore_compile_failure = given(self.ignore_compile_failure);
        layer.skip_compile = given(self.skip_compile);
        layer.command_help = self.doc.clone();
        layer
    }

    pub fn engine_commands(&self) -> Result<EngineCommands, ConfigError> {
        parse_commands(&self.commands)
    }
}
