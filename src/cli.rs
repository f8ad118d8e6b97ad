use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tempfile::NamedTempFile;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{run as run_job, Error, Job};

#[derive(Parser, Debug)]
#[command(
    name = "kicad-wire",
    version,
    about = "Synthesize wires and traces into a KiCad schematic or board"
)]
pub struct Args {
    /// Job description (JSON)
    #[arg(short = 'j', long = "job")]
    pub job: PathBuf,

    /// Schematic or board to rewrite
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Where to write the result. Defaults to the input file.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Also write the generated artifacts as JSON
    #[arg(short = 'a', long = "artifacts")]
    pub artifacts: Option<PathBuf>,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,

    /// Run everything but leave the document untouched
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// More output per occurrence
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Replaces `path` through a temporary file in the same directory.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("creating a temporary file in {}", dir.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("writing {}", tmp.path().display()))?;
    tmp.persist(path)
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let job_text = fs::read_to_string(&args.job)
        .with_context(|| format!("reading job {}", args.job.display()))?;
    let job = Job::from_json(&job_text).with_context(|| format!("loading job {}", args.job.display()))?;
    let input = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    let output = match run_job(&job, &input, args.strict) {
        Ok(output) => output,
        Err(Error::Validation(issues)) => {
            for issue in &issues {
                eprintln!("{issue}");
            }
            return Err(Error::Validation(issues).into());
        }
        Err(Error::Conflicts(conflicts)) => {
            for conflict in &conflicts {
                eprintln!("conflict: {conflict}");
            }
            return Err(Error::Conflicts(conflicts).into());
        }
        Err(e) => return Err(e.into()),
    };
    for issue in &output.issues {
        eprintln!("{issue}");
    }

    if let Some(path) = &args.artifacts {
        let json = serde_json::to_string_pretty(&output.artifacts)?;
        write_atomic(path, &json)?;
    }

    let target = args.output.as_ref().unwrap_or(&args.input);
    if args.dry_run {
        println!(
            "{}: {} segments, {} vias, {} junctions, {} labels, {} no-connects (dry run)",
            target.display(),
            output.artifacts.segments.len(),
            output.artifacts.vias.len(),
            output.artifacts.junctions.len(),
            output.artifacts.labels.len(),
            output.artifacts.no_connects.len(),
        );
        return Ok(());
    }
    write_atomic(target, &output.document)?;
    info!(path = %target.display(), "document written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.kicad_sch");
        fs::write(&path, "(kicad_sch)").unwrap();
        write_atomic(&path, "(kicad_sch (version 1))").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "(kicad_sch (version 1))");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn arguments_parse() {
        let args = Args::parse_from([
            "kicad-wire", "--job", "job.json", "-i", "board.kicad_pcb", "--strict", "-vv",
        ]);
        assert_eq!(args.input, PathBuf::from("board.kicad_pcb"));
        assert!(args.strict && !args.dry_run);
        assert_eq!(args.verbose, 2);
        assert!(args.output.is_none());
    }
}
