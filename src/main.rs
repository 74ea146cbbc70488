//! guten - EPUB project editor

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tempfile::TempDir;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use guten::{Error, ExportOptions, HookIndex, NavOptions, NewProject, Project, Result, Severity};

#[derive(Parser)]
#[command(name = "guten")]
#[command(version, about = "Edit unpacked EPUB projects", long_about = None)]
#[command(after_help = "EXAMPLES:
    guten new my-book --title \"My Book\"     Scaffold a project
    guten unpack book.epub my-book           Unpack an EPUB for editing
    guten nav my-book --overwrite            Rebuild the table of contents
    guten export my-book book.epub           Package the project")]
struct Cli {
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new project directory
    New {
        dir: PathBuf,
        #[arg(long, default_value = "Untitled")]
        title: String,
        #[arg(long, default_value = "en")]
        lang: String,
        #[arg(long)]
        author: Option<String>,
    },
    /// Unpack an .epub into a project directory
    Unpack { epub: PathBuf, dir: PathBuf },
    /// Show publication metadata
    Info { project: PathBuf },
    /// List manifest items
    Ls { project: PathBuf },
    /// Copy a file into the project and register it
    Add {
        project: PathBuf,
        file: PathBuf,
        /// Folder relative to the package document (default depends on type)
        #[arg(long)]
        folder: Option<String>,
        /// Manifest properties, e.g. "svg scripted"
        #[arg(long)]
        properties: Option<String>,
        /// Make the file the cover image
        #[arg(long)]
        cover: bool,
        /// Append the file to the reading order
        #[arg(long)]
        spine: bool,
    },
    /// Change publication metadata
    Meta {
        project: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        lang: Option<String>,
        /// Replaces all creators; repeat for several
        #[arg(long = "author")]
        authors: Vec<String>,
    },
    /// Remove an item and delete its file
    Remove { project: PathBuf, item: String },
    /// Rename an item's file
    Rename {
        project: PathBuf,
        item: String,
        new_name: String,
        /// Leave links to the old name untouched
        #[arg(long)]
        no_update_refs: bool,
    },
    /// Show or edit the reading order
    Spine {
        project: PathBuf,
        #[command(subcommand)]
        action: Option<SpineAction>,
    },
    /// Generate the navigation document from headings
    Nav {
        project: PathBuf,
        /// Replace an existing navigation document
        #[arg(long)]
        overwrite: bool,
        /// Deepest heading level to include
        #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=6))]
        depth: u8,
        /// Skip headings without an id instead of adding one
        #[arg(long)]
        no_ids: bool,
    },
    /// List element ids usable as link targets
    Hooks {
        project: PathBuf,
        /// Only this file
        file: Option<String>,
    },
    /// Check manifest, spine and files for consistency
    Check { project: PathBuf },
    /// Package the project as an .epub
    Export {
        project: PathBuf,
        output: PathBuf,
        /// Include files the manifest does not list
        #[arg(long)]
        include_unreferenced: bool,
        /// Deflate level 0-9
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: Option<u32>,
    },
}

#[derive(Subcommand)]
enum SpineAction {
    /// Append an item
    Append { item: String },
    /// Insert an item at a position
    Insert { index: usize, item: String },
    /// Remove an item from the reading order
    Remove { item: String },
    /// Move the entry at FROM to TO
    Move { from: usize, to: usize },
}

#[derive(Serialize)]
struct InfoView {
    path: String,
    version: String,
    title: Option<String>,
    creators: Vec<String>,
    language: Option<String>,
    identifier: Option<String>,
    modified: Option<String>,
    items: usize,
    spine: usize,
}

#[derive(Serialize)]
struct ItemView<'a> {
    id: &'a str,
    href: &'a str,
    media_type: &'a str,
    properties: &'a [String],
    in_spine: bool,
}

#[derive(Serialize)]
struct HookView<'a> {
    file: &'a str,
    id: &'a str,
    tag: &'a str,
    context: &'a str,
}

#[derive(Serialize)]
struct IssueView<'a> {
    severity: String,
    message: &'a str,
    href: Option<&'a str>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,guten={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(io::Error::from)?;
    println!("{text}");
    Ok(())
}

fn is_epub_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"))
}

/// Open a project directory, or a temporary unpacked copy of an `.epub`.
/// The returned directory guard must outlive the project.
fn open_readonly(path: &Path) -> Result<(Project, Option<TempDir>)> {
    if is_epub_file(path) {
        let scratch = TempDir::new()?;
        debug!(epub = %path.display(), dir = %scratch.path().display(), "unpacking to scratch dir");
        let project = Project::open_epub(path, scratch.path())?;
        Ok((project, Some(scratch)))
    } else {
        Ok((Project::open_folder(path)?, None))
    }
}

fn open_writable(path: &Path) -> Result<Project> {
    if is_epub_file(path) {
        return Err(Error::InvalidEpub(format!(
            "{} is a packed EPUB; run `guten unpack` first",
            path.display()
        )));
    }
    Project::open_folder(path)
}

fn run(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Command::New {
            dir,
            title,
            lang,
            author,
        } => {
            let settings = NewProject {
                title: title.clone(),
                language: lang.clone(),
                author: author.clone(),
            };
            let project = Project::new_project(dir, &settings)?;
            println!("Created {}", project.workdir().display());
        }
        Command::Unpack { epub, dir } => {
            let project = Project::open_epub(epub, dir)?;
            println!(
                "Unpacked {} items into {}",
                project.manifest().len(),
                project.workdir().display()
            );
        }
        Command::Info { project } => {
            let (project, _scratch) = open_readonly(project)?;
            show_info(&project, cli.json)?;
        }
        Command::Ls { project } => {
            let (project, _scratch) = open_readonly(project)?;
            list_items(&project, cli.json)?;
        }
        Command::Add {
            project,
            file,
            folder,
            properties,
            cover,
            spine,
        } => {
            let mut project = open_writable(project)?;
            let mut item = project.add_file(file, folder.as_deref())?;
            if let Some(properties) = properties {
                item = project.set_properties(&item.id, properties)?;
            }
            if *cover {
                item = project.set_cover_image(&item.id)?;
            }
            if *spine {
                project.spine_append(&item.id)?;
            }
            println!("Added {} ({}) as {}", item.href, item.media_type, item.id);
        }
        Command::Meta {
            project,
            title,
            lang,
            authors,
        } => {
            let mut project = open_writable(project)?;
            if let Some(title) = title {
                project.set_title(title)?;
            }
            if let Some(lang) = lang {
                project.set_language(lang)?;
            }
            if !authors.is_empty() {
                project.set_creators(authors)?;
            }
            if project.package().is_epub3() {
                project.touch_modified()?;
            }
            show_info(&project, cli.json)?;
        }
        Command::Remove { project, item } => {
            let mut project = open_writable(project)?;
            let removed = project.remove_from_manifest(item)?;
            println!("Removed {}", removed.href);
        }
        Command::Rename {
            project,
            item,
            new_name,
            no_update_refs,
        } => {
            let mut project = open_writable(project)?;
            let outcome = project.rename_item(item, new_name, !no_update_refs)?;
            println!("Renamed {} -> {}", outcome.old_href, outcome.new_href);
            for href in &outcome.files_updated {
                println!("  updated links in {href}");
            }
        }
        Command::Spine { project, action } => match action {
            None => {
                let (project, _scratch) = open_readonly(project)?;
                show_spine(&project, cli.json)?;
            }
            Some(action) => {
                let mut project = open_writable(project)?;
                match action {
                    SpineAction::Append { item } => project.spine_append(item)?,
                    SpineAction::Insert { index, item } => project.spine_insert(*index, item)?,
                    SpineAction::Remove { item } => {
                        if !project.spine_remove(item)? {
                            println!("{item} was not in the spine");
                        }
                    }
                    SpineAction::Move { from, to } => project.spine_move(*from, *to)?,
                }
                show_spine(&project, cli.json)?;
            }
        },
        Command::Nav {
            project,
            overwrite,
            depth,
            no_ids,
        } => {
            let mut project = open_writable(project)?;
            let options = NavOptions {
                levels: 1..=*depth,
                overwrite: *overwrite,
                add_missing_ids: !no_ids,
                ..NavOptions::default()
            };
            let report = project.generate_nav_from_headings(&options)?;
            let entries: usize = report.outline.iter().map(|h| h.count()).sum();
            println!("Wrote {} ({entries} entries)", report.nav_href);
            if let Some(ncx) = &report.ncx_href {
                println!("Wrote {ncx}");
            }
            for href in &report.modified_files {
                println!("  added heading ids in {href}");
            }
        }
        Command::Hooks { project, file } => {
            let (project, _scratch) = open_readonly(project)?;
            list_hooks(&project, file.as_deref(), cli.json)?;
        }
        Command::Check { project } => {
            let (project, _scratch) = open_readonly(project)?;
            return check(&project, cli.json);
        }
        Command::Export {
            project,
            output,
            include_unreferenced,
            level,
        } => {
            let (project, _scratch) = open_readonly(project)?;
            let options = ExportOptions {
                include_unreferenced: *include_unreferenced,
                compression_level: level.or(ExportOptions::default().compression_level),
            };
            let report = project.export_epub(output, &options)?;
            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }
            println!(
                "Wrote {} ({} entries)",
                report.path.display(),
                report.entries.len()
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn show_info(project: &Project, json: bool) -> Result<()> {
    let package = project.package();
    let view = InfoView {
        path: project.workdir().display().to_string(),
        version: package.version().unwrap_or("?").to_string(),
        title: package.title().map(str::to_string),
        creators: package.creators().into_iter().map(str::to_string).collect(),
        language: package.language().map(str::to_string),
        identifier: package.identifier().map(str::to_string),
        modified: package.modified().map(str::to_string),
        items: package.manifest.len(),
        spine: package.spine.items.len(),
    };
    if json {
        return print_json(&view);
    }

    println!("Project: {}", view.path);
    println!("EPUB version: {}", view.version);
    println!("Title: {}", view.title.as_deref().unwrap_or("(none)"));
    if !view.creators.is_empty() {
        println!("Creators: {}", view.creators.join(", "));
    }
    if let Some(language) = &view.language {
        println!("Language: {language}");
    }
    if let Some(identifier) = &view.identifier {
        println!("Identifier: {identifier}");
    }
    if let Some(modified) = &view.modified {
        println!("Modified: {modified}");
    }
    println!("Manifest items: {}", view.items);
    println!("Spine entries: {}", view.spine);
    Ok(())
}

fn list_items(project: &Project, json: bool) -> Result<()> {
    let spine = project.spine_ids();
    let rows: Vec<ItemView<'_>> = project
        .manifest()
        .iter()
        .map(|item| ItemView {
            id: &item.id,
            href: &item.href,
            media_type: &item.media_type,
            properties: &item.properties,
            in_spine: spine.contains(&item.id.as_str()),
        })
        .collect();
    if json {
        return print_json(&rows);
    }

    for row in &rows {
        let marker = if row.in_spine { "*" } else { " " };
        let props = if row.properties.is_empty() {
            String::new()
        } else {
            format!(" [{}]", row.properties.join(" "))
        };
        println!("{marker} {:<24} {:<40} {}{props}", row.id, row.href, row.media_type);
    }
    Ok(())
}

fn show_spine(project: &Project, json: bool) -> Result<()> {
    let ids = project.spine_ids();
    if json {
        return print_json(&ids);
    }
    for (i, id) in ids.iter().enumerate() {
        let href = project.item_by_id(id).map(|item| item.href.as_str()).unwrap_or("?");
        println!("{i:>3}  {id:<24} {href}");
    }
    Ok(())
}

fn list_hooks(project: &Project, file: Option<&str>, json: bool) -> Result<()> {
    let mut index = HookIndex::new();
    let files: Vec<String> = match file {
        Some(file) => {
            let item = project
                .find_item(file)
                .ok_or_else(|| Error::ItemNotFound(file.to_string()))?;
            index.index_file(project, &item.href)?;
            vec![item.href.clone()]
        }
        None => {
            index.build_full_index(project)?;
            index.files().into_iter().map(str::to_string).collect()
        }
    };

    let rows: Vec<HookView<'_>> = files
        .iter()
        .flat_map(|href| index.hooks_in(href))
        .map(|hook| HookView {
            file: &hook.file_href,
            id: &hook.hook_id,
            tag: &hook.tag_name,
            context: &hook.context_text,
        })
        .collect();
    if json {
        return print_json(&rows);
    }

    for href in &files {
        println!("{href}");
        for hook in index.hooks_in(href) {
            println!("  #{:<20} <{}> {}", hook.hook_id, hook.tag_name, hook.context_text);
        }
        for id in index.duplicates_in(href) {
            println!("  duplicate id: {id}");
        }
    }
    Ok(())
}

fn check(project: &Project, json: bool) -> Result<ExitCode> {
    let issues = project.validate();
    if json {
        let rows: Vec<IssueView<'_>> = issues
            .iter()
            .map(|issue| IssueView {
                severity: issue.severity.to_string(),
                message: &issue.message,
                href: issue.href.as_deref(),
            })
            .collect();
        print_json(&rows)?;
    } else if issues.is_empty() {
        println!("No problems found");
    } else {
        for issue in &issues {
            println!("{issue}");
        }
    }

    if issues.iter().any(|i| i.severity == Severity::Error) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
