use std::fmt::Write as _;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use time::OffsetDateTime;

use crate::app::{DeleteOutcome, NoteListing, Panel};
use crate::display::{preview, relative_time};
use crate::journaling::RecoverySnapshot;
use crate::notes::{Note, NoteId};
use crate::preferences::{Preferences, SettingsPatch, StorageChoice, StorageMode};
use crate::scope::{Scope, ScopeKind};

#[derive(Args, Debug, Clone)]
pub struct SetupArgs {
    /// Store notes in this folder instead of the default one
    #[arg(long, conflicts_with = "pick")]
    pub custom: Option<PathBuf>,
    /// Prompt for a custom folder
    #[arg(long)]
    pub pick: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Note space to list (global or project)
    #[arg(long, default_value_t = ScopeKind::Global)]
    pub scope: ScopeKind,
    /// Case-insensitive text matched against content and tags
    #[arg()]
    pub filter: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(long, default_value_t = ScopeKind::Global)]
    pub scope: ScopeKind,
    /// Tag to attach (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Note content. If omitted, reads from stdin.
    #[arg()]
    pub content: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Note identifier
    pub id: String,
    #[arg(long, default_value_t = ScopeKind::Global)]
    pub scope: ScopeKind,
    /// Replace the note's tags (repeatable); tags are kept when omitted
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    /// Drop every tag from the note
    #[arg(long, conflicts_with = "tags")]
    pub clear_tags: bool,
    /// New content. If omitted, reads from stdin.
    #[arg()]
    pub content: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Note identifier
    pub id: String,
    #[arg(long, default_value_t = ScopeKind::Global)]
    pub scope: ScopeKind,
    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TagCommand {
    /// List the available tags
    List,
    /// Make a tag available
    Add { name: String },
    /// Remove a tag from the list; notes keep it
    Remove { name: String },
}

#[derive(Args, Debug, Clone)]
pub struct TagArgs {
    #[command(subcommand)]
    pub command: TagCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommand {
    /// Print the stored preferences
    Show,
    /// Change one setting, e.g. `noteFontSize 18`
    Set { key: String, value: String },
    /// Move note storage to another folder
    Storage(StorageArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Folder to store notes in
    #[arg(conflicts_with_all = ["pick", "default"])]
    pub folder: Option<PathBuf>,
    /// Prompt for the folder
    #[arg(long)]
    pub pick: bool,
    /// Go back to the default folder
    #[arg(long, conflicts_with = "pick")]
    pub default: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: SettingsCommand,
}

pub fn setup(panel: &mut Panel, args: SetupArgs) -> Result<()> {
    if args.pick {
        match panel.choose_storage_folder()? {
            Some(folder) => println!("Notes will be stored in {}", folder.display()),
            None => println!("Setup cancelled."),
        }
        return Ok(());
    }
    let choice = match args.custom {
        Some(folder) => StorageChoice::Custom(folder),
        None => StorageChoice::Default,
    };
    panel
        .complete_setup(choice)
        .context("saving storage choice")?;
    println!("Notes will be stored in {}", panel.data_folder().display());
    Ok(())
}

pub fn list_notes(panel: &mut Panel, args: ListArgs) -> Result<()> {
    panel.switch_scope(args.scope)?;
    let filter = args.filter.join(" ");
    let out = render_listing(
        &panel.list_notes(&filter),
        panel.project_name().as_deref(),
        panel.settings().show_timestamp_enabled,
        panel.config().preview_chars,
        OffsetDateTime::now_utc(),
    );
    print!("{out}");
    Ok(())
}

pub fn add_note(panel: &mut Panel, args: AddArgs) -> Result<()> {
    panel.switch_scope(args.scope)?;
    let content = content_or_stdin(args.content)?;
    let note = panel
        .create_note(&content, &args.tags)
        .context("adding note")?;
    println!("Added note #{} to {} notes", note.id, args.scope);
    Ok(())
}

pub fn edit_note(panel: &mut Panel, args: EditArgs) -> Result<()> {
    panel.switch_scope(args.scope)?;
    let id = NoteId::new(args.id);
    let Some(existing) = panel.note(&id).cloned() else {
        bail!("note #{id} not found in {} notes", args.scope);
    };
    let content = content_or_stdin(args.content)?;
    let tags = if args.clear_tags {
        Vec::new()
    } else if args.tags.is_empty() {
        existing.tags
    } else {
        args.tags
    };
    panel
        .update_note(&id, &content, &tags)
        .with_context(|| format!("updating note #{id}"))?;
    println!("Updated note #{id}");
    Ok(())
}

pub fn delete_note(panel: &mut Panel, args: DeleteArgs) -> Result<()> {
    panel.switch_scope(args.scope)?;
    let id = NoteId::new(args.id);
    let outcome = panel.delete_note(&id, |note| {
        args.yes || confirm(&format!("Delete \"{}\"?", preview(&note.content, 40)))
    })?;
    match outcome {
        DeleteOutcome::Deleted(note) => println!("Deleted note #{}", note.id),
        DeleteOutcome::Cancelled => println!("Kept note #{id}"),
    }
    Ok(())
}

pub fn handle_tag_command(panel: &mut Panel, args: TagArgs) -> Result<()> {
    match args.command {
        TagCommand::List => {
            for tag in panel.tags() {
                println!("- {tag}");
            }
        }
        TagCommand::Add { name } => {
            let added = panel
                .add_tag(&name)
                .with_context(|| format!("adding tag '{}'", name.trim()))?;
            println!("Added tag '{added}'");
        }
        TagCommand::Remove { name } => {
            if panel.remove_tag(&name)? {
                println!("Removed tag '{}'", name.trim());
            } else {
                println!("No tag named '{}'", name.trim());
            }
        }
    }
    Ok(())
}

pub fn handle_settings_command(panel: &mut Panel, args: SettingsArgs) -> Result<()> {
    match args.command {
        SettingsCommand::Show => {
            let prefs = panel.reload_preferences().clone();
            print!("{}", render_preferences(&prefs));
        }
        SettingsCommand::Set { key, value } => {
            let patch = parse_setting(&key, &value)?;
            panel
                .update_settings(patch)
                .with_context(|| format!("saving setting {key}"))?;
            println!("{key} = {}", value.trim());
        }
        SettingsCommand::Storage(args) => {
            if args.default {
                panel.use_default_storage()?;
            } else if let Some(folder) = args.folder {
                panel.relocate(StorageMode::Custom, folder)?;
            } else if args.pick {
                if panel.choose_storage_folder()?.is_none() {
                    println!("Storage folder unchanged.");
                    return Ok(());
                }
            } else {
                println!(
                    "{} ({})",
                    panel.data_folder().display(),
                    panel.preferences().storage_mode
                );
                return Ok(());
            }
            println!("Notes are now stored in {}", panel.data_folder().display());
        }
    }
    Ok(())
}

pub fn publish_counts(panel: &mut Panel) -> Result<()> {
    let counts = panel.publish_note_counts().context("saving note counts")?;
    println!("global: {}\nproject: {}", counts.global, counts.project);
    Ok(())
}

pub fn list_drafts(panel: &Panel) -> Result<()> {
    let drafts = panel.recovery_drafts()?;
    print!(
        "{}",
        render_drafts(&drafts, panel.config().preview_chars, OffsetDateTime::now_utc())
    );
    Ok(())
}

fn render_listing(
    listing: &NoteListing<'_>,
    project_name: Option<&str>,
    show_timestamps: bool,
    preview_chars: usize,
    now: OffsetDateTime,
) -> String {
    let mut out = String::new();
    let heading = match (&listing.scope, project_name) {
        (Scope::Global, _) => "Global notes".to_string(),
        (_, Some(name)) => format!("Notes for {name}"),
        (_, None) => "Project notes".to_string(),
    };
    let _ = writeln!(&mut out, "{heading} ({})", listing.notes.len());
    if listing.needs_project {
        out.push_str("Save the project file to keep notes for it.\n");
        return out;
    }
    if listing.notes.is_empty() {
        out.push_str("No notes.\n");
        return out;
    }
    for note in &listing.notes {
        let _ = writeln!(&mut out, "{}", headline(note, show_timestamps, now));
        for line in preview(&note.content, preview_chars).lines() {
            let _ = writeln!(&mut out, "    {line}");
        }
    }
    out
}

fn headline(note: &Note, show_timestamp: bool, now: OffsetDateTime) -> String {
    let mut line = format!("#{}", note.id);
    if show_timestamp {
        let _ = write!(&mut line, "  {}", relative_time(note.edited_at(), now));
    }
    if !note.tags.is_empty() {
        let _ = write!(&mut line, "  {}", format_tags(&note.tags));
    }
    line
}

fn render_drafts(drafts: &[RecoverySnapshot], preview_chars: usize, now: OffsetDateTime) -> String {
    if drafts.is_empty() {
        return "No drafts to recover.\n".to_string();
    }
    let mut out = String::new();
    for draft in drafts {
        let target = match &draft.note_id {
            Some(id) => format!("note #{id}"),
            None => "new note".to_string(),
        };
        let _ = writeln!(
            &mut out,
            "{} {target}  {}",
            draft.scope,
            relative_time(draft.saved_at, now)
        );
        let _ = writeln!(&mut out, "    {}", preview(&draft.content, preview_chars));
    }
    out
}

fn render_preferences(prefs: &Preferences) -> String {
    let settings = &prefs.settings;
    let mut out = String::new();
    let _ = writeln!(&mut out, "setupCompleted        {}", prefs.setup_completed);
    let _ = writeln!(&mut out, "storageMode           {}", prefs.storage_mode);
    let _ = writeln!(&mut out, "dataFolderPath        {}", prefs.data_folder_path);
    let _ = writeln!(&mut out, "noteFontSize          {}", settings.note_font_size);
    let _ = writeln!(&mut out, "editorFontSize        {}", settings.editor_font_size);
    let _ = writeln!(&mut out, "noteLineHeight        {}", settings.note_line_height);
    let _ = writeln!(&mut out, "autoSaveEnabled       {}", settings.auto_save_enabled);
    let _ = writeln!(&mut out, "confirmDeleteEnabled  {}", settings.confirm_delete_enabled);
    let _ = writeln!(&mut out, "showTimestampEnabled  {}", settings.show_timestamp_enabled);
    let _ = writeln!(
        &mut out,
        "noteCounts            global {} / project {}",
        prefs.note_counts.global, prefs.note_counts.project
    );
    out
}

fn parse_setting(key: &str, value: &str) -> Result<SettingsPatch> {
    let value = value.trim();
    let mut patch = SettingsPatch::default();
    match key {
        "noteFontSize" => patch.note_font_size = Some(parse_value(key, value)?),
        "editorFontSize" => patch.editor_font_size = Some(parse_value(key, value)?),
        "noteLineHeight" => {
            let height: f64 = parse_value(key, value)?;
            if !height.is_finite() || height <= 0.0 {
                bail!("noteLineHeight must be a positive number");
            }
            patch.note_line_height = Some(height);
        }
        "autoSaveEnabled" => patch.auto_save_enabled = Some(parse_value(key, value)?),
        "confirmDeleteEnabled" => patch.confirm_delete_enabled = Some(parse_value(key, value)?),
        "showTimestampEnabled" => patch.show_timestamp_enabled = Some(parse_value(key, value)?),
        other => bail!("unknown setting '{other}'"),
    }
    Ok(patch)
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid value '{value}' for {key}"))
}

fn format_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| format!("#{}", tag))
        .collect::<Vec<_>>()
        .join(" ")
}

fn content_or_stdin(content: Option<String>) -> Result<String> {
    if let Some(content) = content {
        return Ok(content);
    }
    if atty::is(atty::Stream::Stdin) {
        bail!("no content given; pass it as an argument or pipe it in");
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading note content from stdin")?;
    Ok(buf)
}

fn confirm(question: &str) -> bool {
    use std::io::Write;
    let mut stdout = io::stdout();
    if write!(stdout, "{question} [y/N] ")
        .and_then(|_| stdout.flush())
        .is_err()
    {
        return false;
    }
    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    matches!(input.trim(), "y" | "Y" | "yes")
}
