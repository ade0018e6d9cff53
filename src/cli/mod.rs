use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::Panel;
use crate::config::{ConfigLoader, CONFIG_ENV, HOME_ENV};
use crate::host::HostBridge;

pub mod commands;

use self::commands::{
    AddArgs, DeleteArgs, EditArgs, ListArgs, SettingsArgs, SetupArgs, TagArgs,
};

pub const PROJECT_ENV: &str = "MEMO_PANEL_PROJECT";

#[derive(Parser, Debug)]
#[command(
    name = "memo",
    version,
    about = "Quick notes kept per project or globally"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file location (takes precedence over MEMO_PANEL_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the preferences home folder (takes precedence over MEMO_PANEL_HOME)
    #[arg(long)]
    pub home: Option<PathBuf>,

    /// Project file whose notes the project scope shows (takes precedence over MEMO_PANEL_PROJECT)
    #[arg(long)]
    pub project: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Choose where notes are stored (first run)
    Setup(SetupArgs),
    /// List notes, optionally filtered by content or tag
    List(ListArgs),
    /// Add a note; reads stdin when no content is given
    Add(AddArgs),
    /// Replace a note's content and tags
    Edit(EditArgs),
    /// Delete a note
    Delete(DeleteArgs),
    /// Manage the available tags
    Tag(TagArgs),
    /// Show or change display and storage settings
    Settings(SettingsArgs),
    /// Record current note counts for the settings window
    Counts,
    /// List editor drafts left behind by an interrupted session
    Drafts,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.home {
        env::set_var(HOME_ENV, path);
    }

    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    let config = Arc::new(loader.load_or_init()?);

    let project = cli
        .project
        .clone()
        .or_else(|| env::var_os(PROJECT_ENV).map(PathBuf::from));
    let host = Arc::new(CliHost::new(project));
    let mut panel = Panel::open(config, paths, host).context("opening notes")?;

    if let Some(folder) = panel.unavailable_folder() {
        eprintln!(
            "Cannot use {}; showing notes from {}. Run `memo settings storage` to pick another folder.",
            folder.display(),
            panel.data_folder().display()
        );
    }
    if panel.needs_setup() && !matches!(cli.command, Commands::Setup(_)) {
        eprintln!(
            "Storage has not been set up yet; using {}. Run `memo setup` to choose.",
            panel.data_folder().display()
        );
    }

    match cli.command {
        Commands::Setup(args) => commands::setup(&mut panel, args),
        Commands::List(args) => commands::list_notes(&mut panel, args),
        Commands::Add(args) => commands::add_note(&mut panel, args),
        Commands::Edit(args) => commands::edit_note(&mut panel, args),
        Commands::Delete(args) => commands::delete_note(&mut panel, args),
        Commands::Tag(args) => commands::handle_tag_command(&mut panel, args),
        Commands::Settings(args) => commands::handle_settings_command(&mut panel, args),
        Commands::Counts => commands::publish_counts(&mut panel),
        Commands::Drafts => commands::list_drafts(&panel),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}

/// Host for terminal use: the project comes from `--project` or the
/// environment, and folder picks are typed on stdin.
#[derive(Debug, Clone, Default)]
pub struct CliHost {
    project: Option<PathBuf>,
}

impl CliHost {
    pub fn new(project: Option<PathBuf>) -> Self {
        Self { project }
    }
}

impl HostBridge for CliHost {
    fn current_project_path(&self) -> Option<PathBuf> {
        self.project.clone()
    }

    fn select_folder(&self) -> Option<PathBuf> {
        let mut stdout = io::stdout();
        if write!(stdout, "Folder for notes (empty to cancel): ")
            .and_then(|_| stdout.flush())
            .is_err()
        {
            return None;
        }
        let mut input = String::new();
        if let Err(err) = io::stdin().lock().read_line(&mut input) {
            tracing::warn!(%err, "reading folder choice");
            return None;
        }
        let input = input.trim();
        (!input.is_empty()).then(|| PathBuf::from(input))
    }
}
