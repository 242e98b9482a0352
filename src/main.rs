//! Headless front end: create projects, regenerate exports, re-sync folders.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use boxlabel::format::ExportSummary;
use boxlabel::{EditorConfig, LogLevel, Session};

#[derive(Parser, Debug)]
#[command(name = "boxlabel", version, about = "Bounding-box annotation projects")]
struct Args {
    /// Log verbosity (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Configuration file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Scan an image folder, import existing exports and save the project
    Init {
        folder: PathBuf,

        /// Project file location (default: project.json next to the folder)
        #[arg(long)]
        project: Option<PathBuf>,

        /// Starting classes (replaces the configured defaults)
        #[arg(long = "class")]
        classes: Vec<String>,
    },
    /// Load a project and regenerate its exports
    Export { project: PathBuf },
    /// Pick up added and removed images, then save and export
    Sync { project: PathBuf },
    /// Print per-class and per-image counts
    Info { project: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EditorConfig::load(path)?,
        None => EditorConfig::load_from_default_path().unwrap_or_default(),
    };
    let level = args.log_level.unwrap_or(config.preferences.log_level);
    env_logger::builder()
        .filter_level(level.to_level_filter())
        .init();

    match args.command {
        Cmd::Init {
            folder,
            project,
            classes,
        } => {
            let mut config = config;
            if !classes.is_empty() {
                config.classes.defaults = classes;
            }
            let (mut session, report) = Session::open_folder(&folder, project, config)?;
            if let Some(imported) = &report.imported {
                println!(
                    "Imported {} boxes from existing {} exports",
                    imported.boxes_imported, imported.format
                );
            }
            save(&mut session)?;
        }
        Cmd::Export { project } => {
            let (mut session, _) = open(&project, config)?;
            save(&mut session)?;
        }
        Cmd::Sync { project } => {
            let (mut session, report) = open(&project, config)?;
            // Opening already syncs when the folder exists
            match report.sync {
                Some(sync) => println!(
                    "{} images added, {} removed",
                    sync.added.len(),
                    sync.removed.len()
                ),
                None => println!("Image folder not found; nothing synced"),
            }
            save(&mut session)?;
        }
        Cmd::Info { project } => {
            let (session, _) = open(&project, config)?;
            print_info(&session);
        }
    }
    Ok(())
}

fn open(
    path: &Path,
    config: EditorConfig,
) -> Result<(Session, boxlabel::OpenReport), Box<dyn std::error::Error>> {
    let (session, report) = Session::open(path, config)?;
    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
    if report.recovered_from_backup {
        eprintln!("warning: {:?} was unreadable, loaded the backup", path);
    }
    Ok((session, report))
}

fn save(session: &mut Session) -> Result<(), Box<dyn std::error::Error>> {
    let summary = session.save_now()?;
    println!(
        "Saved {} ({} images, {} boxes)",
        summary.save.path.display(),
        session.project().image_count(),
        session.project().total_boxes()
    );
    report_exports(&summary.exports, session.exports_dir());
    if summary.exports.is_complete() {
        Ok(())
    } else {
        Err("some exports failed".into())
    }
}

fn report_exports(summary: &ExportSummary, dir: &Path) {
    for (id, result) in summary.succeeded() {
        println!(
            "  {}: {} annotations in {} files",
            id,
            result.annotations_exported,
            result.files_created.len()
        );
        for warning in &result.warnings {
            println!("    {}", warning);
        }
        if result.has_errors() {
            eprintln!("  {}: some images were left out", id);
        }
    }
    for (id, e) in summary.failed() {
        eprintln!("  {}: failed ({})", id, e);
    }
    println!("Exports written to {}", dir.display());
}

fn print_info(session: &Session) {
    let project = session.project();
    println!("Project: {}", session.project_path().display());
    println!("Images:  {} in {}", project.image_count(), project.root_folder().display());
    println!("Boxes:   {}", project.total_boxes());
    println!();

    println!("Classes:");
    for class in project.classes() {
        println!(
            "  [{}] {:<20} {} boxes",
            class.id,
            class.name,
            project.class_usages(class.id).len()
        );
    }
    let unlabeled: usize = project
        .images()
        .map(|image| {
            image
                .boxes()
                .iter()
                .filter(|b| project.resolve_class(b.class_id).is_none())
                .count()
        })
        .sum();
    if unlabeled > 0 {
        println!("  (unlabeled)            {} boxes", unlabeled);
    }
    println!();

    println!("Images:");
    for image in project.images() {
        println!(
            "  {:<30} {}x{}  {} boxes",
            image.image_path,
            image.width,
            image.height,
            image.len()
        );
    }
}
