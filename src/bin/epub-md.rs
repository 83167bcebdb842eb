use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use epub_md::{
    ConversionOutcome, ConvertOptions, LogDiagnostics,
    convert::{convert, parse},
};
use log::error;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};

/// Convert EPUB ebooks to Markdown
#[derive(Parser, Debug)]
#[command(name = "epub-md", version, about)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an EPUB file to Markdown
    Convert {
        /// Path to the EPUB file
        input: PathBuf,

        /// Output directory (default: the directory of the input file)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        #[command(flatten)]
        mode: ModeArgs,
    },

    /// Show the metadata and chapters of an EPUB file
    Info {
        /// Path to the EPUB file
        input: PathBuf,
    },

    /// Convert every EPUB file of a directory
    Batch {
        /// Directory containing EPUB files
        directory: PathBuf,

        /// Output directory, one subdirectory per book
        #[arg(short, long, default_value = "batch_output")]
        output_dir: PathBuf,

        #[command(flatten)]
        mode: ModeArgs,
    },
}

#[derive(Args, Debug)]
struct ModeArgs {
    /// Write an index plus one Markdown file per chapter
    #[arg(short, long, default_value_t = false)]
    multiple_files: bool,

    /// Do not extract images (only effective with --multiple-files)
    #[arg(long, default_value_t = false)]
    no_images: bool,
}

impl ModeArgs {
    fn options(&self, output_dir: &Path) -> ConvertOptions {
        let mut options = ConvertOptions::new();
        options
            .output_dir(output_dir)
            .single_file(!self.multiple_files)
            .extract_images(!self.no_images);
        options
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    TermLogger::init(
        level,
        ConfigBuilder::new()
            .add_filter_ignore_str("html5ever")
            .add_filter_ignore_str("selectors")
            .build(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;

    match cli.command {
        Command::Convert {
            input,
            output_dir,
            mode,
        } => run_convert(&input, output_dir, &mode),
        Command::Info { input } => run_info(&input),
        Command::Batch {
            directory,
            output_dir,
            mode,
        } => run_batch(&directory, &output_dir, &mode),
    }
}

fn check_extension(input: &Path) -> Result<()> {
    let is_epub = input
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("epub"));
    if !is_epub {
        bail!("{} does not appear to be an EPUB file", input.display());
    }
    Ok(())
}

fn run_convert(input: &Path, output_dir: Option<PathBuf>, mode: &ModeArgs) -> Result<ExitCode> {
    check_extension(input)?;

    let output_dir = match output_dir {
        Some(output_dir) => output_dir,
        None => input
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", input.display()))?
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let options = mode.options(&output_dir);

    println!("Converting EPUB file: {}", input.display());
    println!("Output directory: {}", output_dir.display());
    println!(
        "Output mode: {}",
        if mode.multiple_files {
            "Multiple files"
        } else {
            "Single file"
        }
    );
    if !mode.no_images && !mode.multiple_files {
        println!("Note: image extraction is only available in multiple files mode");
    }
    println!(
        "Extract images: {}",
        if options.images_enabled() { "Yes" } else { "No" }
    );
    println!();

    let outcome = convert(input, &options, &LogDiagnostics)
        .with_context(|| format!("Failed to convert {}", input.display()))?;

    match outcome {
        ConversionOutcome::NoContent => {
            error!("No chapters found in the EPUB file");
            Ok(ExitCode::FAILURE)
        }
        ConversionOutcome::Converted {
            files,
            chapters,
            images,
        } => {
            println!("Conversion completed: {} chapters", chapters);
            if images > 0 {
                println!(
                    "Created {} file(s) and extracted {} image(s):",
                    files.len(),
                    images
                );
            } else {
                println!("Created {} file(s):", files.len());
            }
            for file in &files {
                println!("  - {}", file.display());
            }
            if images > 0 {
                println!("  - images/ directory with {} processed image(s)", images);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_info(input: &Path) -> Result<ExitCode> {
    check_extension(input)?;

    let mut options = ConvertOptions::new();
    options.extract_images(false);
    let (metadata, chapters) = parse(input, &options, &LogDiagnostics)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    println!("BOOK INFORMATION");
    println!("{}", "=".repeat(50));
    println!("Title: {}", metadata.title);
    println!("Author: {}", metadata.author);
    println!("Language: {}", metadata.language);
    println!("Identifier: {}", metadata.identifier);
    if let Some(publisher) = &metadata.publisher {
        println!("Publisher: {}", publisher);
    }
    if let Some(description) = &metadata.description {
        let preview = description.chars().take(200).collect::<String>();
        let ellipsis = if description.chars().count() > 200 {
            "..."
        } else {
            ""
        };
        println!("Description: {}{}", preview, ellipsis);
    }
    if let Some(rights) = &metadata.rights {
        println!("Rights: {}", rights);
    }

    println!();
    println!("CHAPTERS");
    println!("{}", "=".repeat(50));
    println!("Total chapters: {}", chapters.len());
    println!();

    for chapter in &chapters {
        println!("{:2}. {}", chapter.page_number(), chapter.title);
        println!("    File: {}", chapter.source_file_name);
        println!("    Words: ~{}", chapter.word_count());
        println!();
    }

    Ok(ExitCode::SUCCESS)
}

fn run_batch(directory: &Path, output_dir: &Path, mode: &ModeArgs) -> Result<ExitCode> {
    let mut books = fs::read_dir(directory)
        .with_context(|| format!("Failed to read directory {}", directory.display()))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| path.is_file() && check_extension(path).is_ok())
        .collect::<Vec<_>>();
    books.sort();

    if books.is_empty() {
        error!("No EPUB files found in directory: {}", directory.display());
        return Ok(ExitCode::FAILURE);
    }

    println!("Found {} EPUB file(s) to convert", books.len());
    println!("Output directory: {}", output_dir.display());
    println!();

    let mut successful = 0;
    let mut failed = 0;
    for book in &books {
        let name = book
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        println!("Converting: {}", name);

        let options = mode.options(&output_dir.join(&name));
        match convert(book, &options, &LogDiagnostics) {
            Ok(ConversionOutcome::Converted { files, .. }) => {
                println!("  Success: created {} file(s)", files.len());
                successful += 1;
            }
            Ok(ConversionOutcome::NoContent) => {
                println!("  Failed: no chapters found");
                failed += 1;
            }
            Err(err) => {
                println!("  Failed: {}", err);
                failed += 1;
            }
        }
    }

    println!();
    println!("Batch conversion completed:");
    println!("  Successful: {}", successful);
    println!("  Failed: {}", failed);

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
