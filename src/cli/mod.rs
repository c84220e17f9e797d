use clap::{Parser, Subcommand};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use crate::archive::{read_archive, ArchiveWriter};
use crate::common::Archive;
use crate::error::TarError;
use crate::extract::{list_entries, Extractor};

/// Environment variable holding the log filter (`env_logger` syntax).
pub const LOG_ENV: &str = "WYTAR_LOG";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Report each archived or extracted entry; list in long format.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Create an archive from files and directories.
    #[command(alias = "c")]
    Create {
        /// The archive file to write.
        #[arg(short = 'f', long = "file")]
        archive: PathBuf,

        /// Resolve input paths relative to this directory.
        #[arg(short = 'C', long)]
        directory: Option<PathBuf>,

        /// Add the inputs to the end of an existing archive instead of replacing it.
        #[arg(long)]
        append: bool,

        /// Files and directories to archive; directories are added recursively.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Extract entries from an archive.
    #[command(alias = "x")]
    Extract {
        /// The archive file to read.
        #[arg(short = 'f', long = "file")]
        archive: PathBuf,

        /// Extract into this directory instead of the current one.
        #[arg(short = 'C', long)]
        directory: Option<PathBuf>,

        /// Entry names to extract. If empty, all entries are extracted.
        names: Vec<String>,
    },

    /// List the entries of an archive.
    #[command(alias = "t")]
    List {
        /// The archive file to read.
        #[arg(short = 'f', long = "file")]
        archive: PathBuf,
    },
}

/// Runs the parsed command.
pub fn run(args: Args) -> Result<(), TarError> {
    match args.command {
        Commands::Create { archive, directory, append, inputs } => {
            let root = directory.unwrap_or_else(|| PathBuf::from("."));
            let (mut file, existing) = if append {
                let mut file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&archive)
                    .map_err(|e| TarError::io(&archive, e))?;
                let existing = read_archive(&mut file)?;
                (file, existing)
            } else {
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(0o600)
                    .open(&archive)
                    .map_err(|e| TarError::io(&archive, e))?;
                (file, Archive::new())
            };

            let mut stream = BufWriter::new(&mut file);
            let (written, bytes) = ArchiveWriter::new(&mut stream).root(root).write(existing, &inputs)?;
            if args.verbose {
                list_entries(&written, false, &mut io::stdout()).map_err(|e| TarError::io("<stdout>", e))?;
            }
            tracing::info!(archive = %archive.display(), bytes, "created");
        }
        Commands::Extract { archive, directory, names } => {
            let mut file = File::open(&archive).map_err(|e| TarError::io(&archive, e))?;
            let chain = read_archive(&mut file)?;
            let root = directory.unwrap_or_else(|| PathBuf::from("."));
            let summary = Extractor::new(&mut file).root(root).extract(&chain, &names)?;
            if args.verbose {
                let wanted = |name: &[u8]| names.is_empty() || names.iter().any(|n| n.as_bytes() == name);
                let extracted: Archive = chain.iter().filter(|e| wanted(&e.name)).cloned().collect::<Vec<_>>().into();
                list_entries(&extracted, false, &mut io::stdout()).map_err(|e| TarError::io("<stdout>", e))?;
            }
            tracing::info!(extracted = summary.extracted, skipped = summary.skipped, "extracted");
        }
        Commands::List { archive } => {
            let mut file = File::open(&archive).map_err(|e| TarError::io(&archive, e))?;
            let chain = read_archive(&mut file)?;
            list_entries(&chain, args.verbose, &mut io::stdout()).map_err(|e| TarError::io("<stdout>", e))?;
        }
    }
    Ok(())
}
