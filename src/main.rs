use std::path::PathBuf;

use clap::{Parser, Subcommand};
use snip2excel_lib::{OutputMode, Region, SnipOptions, TableDimensions};

/// Snip a screen region and turn it into spreadsheet-ready cells with a vision model.
#[derive(Parser, Debug)]
#[command(name = "snip2excel", version)]
#[command(about = "Turn a screenshot of a table into tab-separated cells")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive session (default)
    Session,
    /// Capture once and print the result
    Snip {
        /// Read an image file instead of capturing the screen
        #[arg(long, value_name = "FILE")]
        image: Option<PathBuf>,

        /// Crop the image to x,y,width,height
        #[arg(long, value_name = "X,Y,W,H", requires = "image")]
        region: Option<Region>,

        /// Output mode: excel (table) or docs (plain text)
        #[arg(long)]
        mode: Option<OutputMode>,

        /// Model display name or raw OpenRouter model id
        #[arg(long)]
        model: Option<String>,

        /// Exact number of table columns
        #[arg(long, requires = "rows", value_parser = clap::value_parser!(u32).range(1..))]
        columns: Option<u32>,

        /// Exact number of table rows
        #[arg(long, requires = "columns", value_parser = clap::value_parser!(u32).range(1..))]
        rows: Option<u32>,

        /// Also copy the result to the clipboard
        #[arg(long)]
        copy: bool,
    },
    /// Show API credit usage
    Usage,
    /// List available models
    Models,
    /// Enter and store a new API key
    SetKey,
    /// Print the config file location
    ConfigPath,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Command::Session) {
        Command::Session => snip2excel_lib::run_session(),
        Command::Snip {
            image,
            region,
            mode,
            model,
            columns,
            rows,
            copy,
        } => snip2excel_lib::run_snip(SnipOptions {
            image,
            region,
            mode,
            model,
            dimensions: columns.zip(rows).and_then(|(c, r)| TableDimensions::new(c, r)),
            copy,
        }),
        Command::Usage => snip2excel_lib::run_usage(),
        Command::Models => snip2excel_lib::run_models(),
        Command::SetKey => snip2excel_lib::run_set_key(),
        Command::ConfigPath => snip2excel_lib::run_config_path(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
