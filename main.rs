use clap::{Parser, Subcommand};
use photo_gallery::config::{AppPaths, Settings};
use photo_gallery::error::Result;
use photo_gallery::session::Session;
use photo_gallery::{albums, db, export, search, tree};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "photo-gallery")]
#[command(version)]
#[command(about = "Inspect the album tree and what a visitor can see", long_about = None)]
struct Cli {
    /// Act as this user instead of an anonymous visitor
    #[arg(long = "as", value_name = "USER_ID", global = true)]
    as_user: Option<i64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report nested-set defects
    Check,
    /// Rebuild nested-set bounds from parent links
    Fix,
    /// List top-level albums
    Top,
    /// Show one album with children and photos
    Album { id: i64 },
    /// Search albums and photos
    Search {
        #[arg(required = true)]
        terms: Vec<String>,
    },
    /// Plan the download archive of an album
    Export { id: i64 },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let paths = AppPaths::discover()?;
    let pool = db::init_database(&paths.db_path)?;
    let conn = pool.get()?;
    let settings = Settings::load(&conn)?;

    let session = match cli.as_user {
        Some(user_id) => Session::for_user(&conn, user_id)?,
        None => Session::anonymous(),
    };

    match cli.command {
        Command::Check => {
            let defects = tree::check_tree(&conn)?;
            if defects.is_empty() {
                log::info!("Album tree is consistent");
            }
            print_json(&defects)
        }
        Command::Fix => {
            let changed = tree::fix_tree(&conn)?;
            println!("{changed} album(s) repositioned");
            Ok(())
        }
        Command::Top => print_json(&albums::top_albums(&conn, &session, &settings)?),
        Command::Album { id } => print_json(&albums::get_album(&conn, &session, &settings, id)?),
        Command::Search { terms } => {
            let terms = search::parse_terms(&terms.join(" "));
            let found = search::search_albums(&conn, &session, settings.album_sorting, &terms)?;
            let photos = search::search_photos(&conn, &session, settings.photo_sorting, &terms)?;
            print_json(&serde_json::json!({ "albums": found, "photos": photos }))
        }
        Command::Export { id } => print_json(&export::plan_archive(&conn, &session, &settings, id)?),
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        log::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
