//! Interactive entry point: open the library, bind the device transport, and
//! run the command loop until quit or end of input.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use console::style;
use tracing::debug;

use librarian::device::HttpTransport;
use librarian::error::{LibrarianError, Result};
use librarian::grammar;
use librarian::input::LineEditor;
use librarian::logging::init_logging;
use librarian::prompt::Prompter;
use librarian::session::{Flow, Session};
use librarian::store::{Library, default_db_path};

#[derive(Parser, Debug)]
#[command(
    name = "librarian",
    version,
    about = "Terminal librarian for LED controller preset records"
)]
struct Cli {
    /// Path to the library database (default: platform data directory)
    #[arg(long, env = "LIBRARIAN_DB")]
    db: Option<PathBuf>,

    /// Controller hostname or URL for device import/export
    #[arg(long, env = "LIBRARIAN_HOST", default_value = "wled.local")]
    host: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Disable colored output
    #[arg(long, env = "NO_COLOR")]
    no_color: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if cli.no_color {
        console::set_colors_enabled(false);
    }

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            output_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => default_db_path()?,
    };

    let mut editor = LineEditor::new();

    // A fresh path means creating a datastore; make that explicit
    if !Library::schema_present(&db_path)? {
        let question = format!(
            "No library at {}. Create it? [Y/n] ",
            db_path.display()
        );
        if !editor.confirm(&question)? {
            return Err(LibrarianError::SchemaMissing {
                path: db_path.display().to_string(),
            });
        }
    }

    let db = Library::open(&db_path)?;
    let transport = HttpTransport::new(&cli.host);
    let mut session = Session::new(db, Box::new(transport));
    debug!(db = %db_path.display(), host = %cli.host, "Session ready");

    println!(
        "{} (library: {}, device: {})",
        style("preset librarian").cyan().bold(),
        db_path.display(),
        cli.host
    );
    println!("Type 'help' for commands, 'quit' to leave.");

    loop {
        let Some(line) = editor.read_line("preset> ")? else {
            // End of input stream
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let flow = grammar::parse(&line)
            .and_then(|cmd| session.dispatch(&cmd, &mut editor));
        match flow {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) if e.is_user_recoverable() => output_error(&e),
            Err(e @ (LibrarianError::DeviceUnreachable { .. } | LibrarianError::DeviceStatus { .. })) => {
                // The device being away should not end the session
                output_error(&e);
            }
            Err(e) => return Err(e),
        }
    }

    println!("Bye.");
    Ok(ExitCode::SUCCESS)
}

fn output_error(e: &LibrarianError) {
    eprintln!("{} {e}", style("Error:").red().bold());
    if let Some(suggestion) = e.suggestion() {
        eprintln!("{} {suggestion}", style("Hint:").yellow());
    }
}
