use clap::Parser;
use mffio::archive::pack_directory;
use std::path::PathBuf;
use std::process::ExitCode;

/// Package a .mff recording directory into a store-only .mfz archive.
#[derive(Parser)]
#[command(name = "mff2mfz", version, about = "Package a .mff directory into a .mfz archive")]
struct Cli {
    /// Path to the .mff recording directory
    input: PathBuf,
    /// Output path (defaults to the input with a .mfz extension)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Replace an existing output file
    #[arg(short, long)]
    force: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if !cli.input.is_dir() || cli.input.extension().and_then(|e| e.to_str()) != Some("mff") {
        eprintln!("error: '{}' is not a .mff directory", cli.input.display());
        return ExitCode::FAILURE;
    }
    let output = cli
        .output
        .unwrap_or_else(|| cli.input.with_extension("mfz"));
    if output.exists() && !cli.force {
        eprintln!(
            "error: '{}' exists already (use --force to replace)",
            output.display()
        );
        return ExitCode::FAILURE;
    }

    match pack_directory(&cli.input, &output) {
        Ok(()) => {
            println!("{} -> {}", cli.input.display(), output.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
