// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use stowage::{
    commands::{self, Base, NewAssets, Selection},
    config::Settings,
    inventory::{CommitOutcome, RemoveMode},
    path::expand,
};

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::{
    env::current_dir,
    fs::read_to_string,
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "stowage [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Answer every confirmation with yes.
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Do not show diffs, and only log warnings.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log debug information.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Run as if started in this directory.
    #[arg(short = 'C', value_name = "dir", global = true)]
    pub directory: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let base = match &self.directory {
            Some(directory) => current_dir()?.join(expand(directory)?),
            None => current_dir()?,
        };
        let settings = Settings {
            yes: self.yes,
            quiet: self.quiet,
        };

        match self.command {
            Command::Init(opts) => run_init(&base, opts),
            Command::Mkdir(opts) => run_mkdir(&base, settings, opts),
            Command::New(opts) => run_new(&base, settings, opts),
            Command::Rm(opts) => run_rm(&base, settings, opts),
            Command::Mv(opts) => run_mv(&base, settings, opts),
            Command::Set(opts) => run_set(&base, settings, opts),
            Command::Unset(opts) => run_unset(&base, settings, opts),
            Command::Get(opts) => run_get(&base, settings, opts),
            Command::Fsck(opts) => run_fsck(&base, settings, opts),
            Command::Config(opts) => run_config(&base, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Initialize new inventory.
    #[command(override_usage = "stowage init [<path>]")]
    Init(InitOptions),

    /// Create inventory directories.
    #[command(override_usage = "stowage mkdir [options] <path>...")]
    Mkdir(MkdirOptions),

    /// Create new asset from key=value pairs.
    #[command(override_usage = "stowage new [options] [-k <key=value>]... [<directory>]")]
    New(NewOptions),

    /// Remove assets and directories.
    #[command(override_usage = "stowage rm [options] <path>...")]
    Rm(RmOptions),

    /// Move assets and directories, or rename a directory.
    #[command(override_usage = "stowage mv [options] <source>... <destination>")]
    Mv(MvOptions),

    /// Set fields of selected assets.
    #[command(override_usage = "stowage set [options] -k <key=value>... [<path>]...")]
    Set(SetOptions),

    /// Remove fields from selected assets.
    #[command(override_usage = "stowage unset [options] -k <key>... [<path>]...")]
    Unset(UnsetOptions),

    /// Show fields of selected assets.
    #[command(override_usage = "stowage get [options] [<path>]...")]
    Get(GetOptions),

    /// Check integrity of the inventory.
    #[command(override_usage = "stowage fsck [<check>]...")]
    Fsck(FsckOptions),

    /// Read or write configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Directory to turn into an inventory.
    #[arg(value_name = "path")]
    pub path: Option<PathBuf>,
}

#[derive(Args, Clone, Debug)]
struct MessageOptions {
    /// Commit subject to use instead of the generated one.
    #[arg(short, long, value_name = "message")]
    pub message: Option<String>,
}

#[derive(Args, Clone, Debug)]
struct SelectionOptions {
    /// Only select assets matching key=value, where value may be a glob.
    #[arg(short, long = "filter", value_name = "key=value")]
    pub filters: Vec<String>,

    /// How deep to look below each path, zero being unlimited.
    #[arg(short, long, default_value_t = 0, value_name = "n")]
    pub depth: usize,

    /// Paths to look at or below, defaulting to the whole inventory.
    #[arg(value_name = "path")]
    pub paths: Vec<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct MkdirOptions {
    #[command(flatten)]
    pub message: MessageOptions,

    /// Directories to create.
    #[arg(required = true, value_name = "path")]
    pub paths: Vec<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct NewOptions {
    #[command(flatten)]
    pub message: MessageOptions,

    /// Field of every new asset.
    #[arg(
        short = 'k',
        long = "key",
        required_unless_present_any = ["tsv", "template"],
        value_name = "key=value"
    )]
    pub fields: Vec<String>,

    /// Start from a record template in .stowage/templates.
    #[arg(short, long, value_name = "name", conflicts_with = "clone")]
    pub template: Option<String>,

    /// Start from the record of an existing asset.
    #[arg(short, long, value_name = "asset")]
    pub clone: Option<PathBuf>,

    /// Tab-separated table with one new asset per row.
    #[arg(long, value_name = "file")]
    pub tsv: Option<PathBuf>,

    /// Directory to create assets in, defaulting to the current one.
    #[arg(value_name = "directory")]
    pub directory: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RmOptions {
    #[command(flatten)]
    pub message: MessageOptions,

    /// What to remove: asset, dir, or all.
    #[arg(long, default_value = "all", value_name = "mode")]
    pub mode: String,

    /// Paths to remove.
    #[arg(required = true, value_name = "path")]
    pub paths: Vec<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct MvOptions {
    #[command(flatten)]
    pub message: MessageOptions,

    /// Sources followed by the destination.
    #[arg(required = true, num_args = 2.., value_name = "path")]
    pub paths: Vec<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SetOptions {
    #[command(flatten)]
    pub message: MessageOptions,

    #[command(flatten)]
    pub selection: SelectionOptions,

    /// Allow renaming assets by changing naming fields.
    #[arg(short, long)]
    pub rename: bool,

    /// Field to set.
    #[arg(short = 'k', long = "key", required = true, value_name = "key=value")]
    pub fields: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct UnsetOptions {
    #[command(flatten)]
    pub message: MessageOptions,

    #[command(flatten)]
    pub selection: SelectionOptions,

    /// Allow renaming assets by removing naming fields.
    #[arg(short, long)]
    pub rename: bool,

    /// Field to remove.
    #[arg(short = 'k', long = "key", required = true, value_name = "key")]
    pub keys: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct GetOptions {
    #[command(flatten)]
    pub selection: SelectionOptions,

    /// Field to show, defaulting to the naming fields and path.
    #[arg(short = 'k', long = "key", value_name = "key")]
    pub keys: Vec<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct FsckOptions {
    /// Checks to run, defaulting to all of them.
    #[arg(value_name = "check")]
    pub checks: Vec<String>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Show configuration value.
    Get {
        /// Dotted name like assets.filename.
        #[arg(value_name = "name")]
        name: String,
    },

    /// Write configuration value.
    Set {
        /// Where to write: inventory, local, or global.
        #[arg(short, long, default_value = "inventory", value_name = "location")]
        location: String,

        /// Dotted name like assets.filename.
        #[arg(value_name = "name")]
        name: String,

        /// New value.
        #[arg(value_name = "value")]
        value: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.debug {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn resolve(base: &Path, paths: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    paths.into_iter().map(|path| base.join(path)).collect()
}

fn selection(base: &Path, opts: SelectionOptions) -> Result<Selection> {
    let paths = if opts.paths.is_empty() {
        Vec::new()
    } else {
        resolve(base, opts.paths)
    };

    Ok(Selection::new(paths)
        .with_depth(opts.depth)
        .with_filters(&opts.filters)?)
}

fn report(outcome: CommitOutcome) {
    match outcome {
        CommitOutcome::Committed { hexsha, .. } => info!("saved changes as {hexsha}"),
        CommitOutcome::NothingToCommit => info!("nothing to do"),
        CommitOutcome::Declined => info!("no changes made"),
    }
}

fn run_init(base: &Path, opts: InitOptions) -> Result<()> {
    let path = match opts.path {
        Some(path) => base.join(path),
        None => base.to_path_buf(),
    };
    commands::init(path)?;

    Ok(())
}

fn run_mkdir(base: &Path, settings: Settings, opts: MkdirOptions) -> Result<()> {
    let mut inventory = commands::open(base, settings)?;
    let paths = resolve(base, opts.paths);
    report(commands::mkdir(
        &mut inventory,
        &paths,
        opts.message.message.as_deref(),
    )?);

    Ok(())
}

fn run_new(base: &Path, settings: Settings, opts: NewOptions) -> Result<()> {
    let rows = match &opts.tsv {
        Some(tsv) => commands::parse_table(&read_to_string(base.join(tsv))?)?,
        None => Vec::new(),
    };

    // INVARIANT: Rows naming their own directory must not get a default one.
    let names_directory = rows.iter().any(|row| row.get("directory").is_some());
    let directory = match opts.directory {
        Some(directory) => Some(base.join(directory)),
        None if names_directory => None,
        None => Some(base.to_path_buf()),
    };
    let base_record = match (opts.template, opts.clone) {
        (Some(name), _) => Base::Template(name),
        (None, Some(source)) => Base::Clone(base.join(source)),
        (None, None) => Base::Empty,
    };
    let spec = NewAssets {
        directory,
        base: base_record,
        assignments: opts.fields,
        rows,
    };

    let mut inventory = commands::open(base, settings)?;
    let (paths, outcome) =
        commands::new_assets(&mut inventory, &spec, opts.message.message.as_deref())?;
    if let CommitOutcome::Committed { .. } = outcome {
        for path in &paths {
            println!("{}", path.display());
        }
    }
    report(outcome);

    Ok(())
}

fn run_rm(base: &Path, settings: Settings, opts: RmOptions) -> Result<()> {
    let mode = opts.mode.parse::<RemoveMode>()?;
    let mut inventory = commands::open(base, settings)?;
    let paths = resolve(base, opts.paths);
    report(commands::rm(
        &mut inventory,
        &paths,
        mode,
        opts.message.message.as_deref(),
    )?);

    Ok(())
}

fn run_mv(base: &Path, settings: Settings, opts: MvOptions) -> Result<()> {
    let mut paths = resolve(base, opts.paths);
    let Some(destination) = paths.pop() else {
        bail!("missing destination");
    };

    let mut inventory = commands::open(base, settings)?;
    report(commands::mv(
        &mut inventory,
        &paths,
        destination,
        opts.message.message.as_deref(),
    )?);

    Ok(())
}

fn run_set(base: &Path, settings: Settings, opts: SetOptions) -> Result<()> {
    let mut inventory = commands::open(base, settings)?;
    let selection = selection(base, opts.selection)?;
    report(commands::set(
        &mut inventory,
        &selection,
        &opts.fields,
        opts.rename,
        opts.message.message.as_deref(),
    )?);

    Ok(())
}

fn run_unset(base: &Path, settings: Settings, opts: UnsetOptions) -> Result<()> {
    let mut inventory = commands::open(base, settings)?;
    let selection = selection(base, opts.selection)?;
    report(commands::unset(
        &mut inventory,
        &selection,
        &opts.keys,
        opts.rename,
        opts.message.message.as_deref(),
    )?);

    Ok(())
}

fn run_get(base: &Path, settings: Settings, opts: GetOptions) -> Result<()> {
    let inventory = commands::open(base, settings)?;
    let selection = selection(base, opts.selection)?;
    let rows = commands::get(&inventory, &opts.keys, &selection)?;

    let Some(first) = rows.first() else {
        info!("no assets selected");
        return Ok(());
    };

    let header = first
        .values
        .iter()
        .map(|(key, _)| key.as_str())
        .collect::<Vec<_>>();
    println!("{}", header.join("\t"));
    for row in &rows {
        let values = row
            .values
            .iter()
            .map(|(_, value)| value.as_str())
            .collect::<Vec<_>>();
        println!("{}", values.join("\t"));
    }

    Ok(())
}

fn run_fsck(base: &Path, settings: Settings, opts: FsckOptions) -> Result<()> {
    let inventory = commands::open(base, settings)?;
    let report = commands::fsck(inventory.repo(), &opts.checks)?;
    for failure in &report.failures {
        println!("{failure}");
    }

    if !report.is_ok() {
        bail!("{} integrity problems found", report.failures.len());
    }

    info!("inventory is healthy");
    Ok(())
}

fn run_config(base: &Path, opts: ConfigCommand) -> Result<()> {
    let mut repo = stowage::InventoryRepo::open(base)?;
    match opts {
        ConfigCommand::Get { name } => match commands::config_get(&repo, &name)? {
            Some(value) => println!("{value}"),
            None => bail!("{name} is not set"),
        },
        ConfigCommand::Set {
            location,
            name,
            value,
        } => commands::config_set(&mut repo, &name, &value, &location)?,
    }

    Ok(())
}
