//! Netlist-driven wire and trace synthesis for KiCad schematics and boards.
//!
//! A [`Job`] names the nets to connect and how to route them. [`run`] places
//! the connection points, synthesizes Manhattan paths net by net, checks the
//! result and splices it into the document text, replacing whatever the
//! previous run generated.

pub mod artifact;
#[cfg(feature = "cli")]
pub mod cli;
pub mod diagnostics;
pub mod document;
mod emit;
mod error;
pub mod geometry;
pub mod load;
pub mod model;
mod parse;
mod raw;
pub mod resolve;
pub mod sexpr;
pub mod synth;
pub mod validate;

use tracing::{info, info_span};

pub use artifact::ArtifactSet;
pub use diagnostics::{IssueSet, Severity};
pub use document::{rewrite, Document};
pub use emit::{emit, NetCodes};
pub use error::{ConfigurationError, DocumentStructureError, Error, GeometryConflict, ParseError};
pub use model::{Layer, Representation};
pub use parse::Job;
pub use validate::{Cause, Issue};

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// The rewritten document.
    pub document: String,
    pub artifacts: ArtifactSet,
    /// Non-fatal findings; errors never reach here.
    pub issues: IssueSet<Issue>,
}

/// Runs the whole pipeline on `document`, the text of the persisted
/// schematic or board.
///
/// Any geometry conflict aborts before validation. Validation errors abort
/// before the rewrite, and so do warnings when `strict` is set.
pub fn run(job: &Job, document: &str, strict: bool) -> Result<RunOutput, Error> {
    let _guard = info_span!("run", representation = ?job.representation).entered();

    let doc = Document::parse(document, job.representation)?;
    let design = job.design(Some(&doc))?;
    design.check()?;
    let pins = resolve::resolve_all(&design)?;

    let synthesis = synth::synthesize_all(&design, &pins, &job.plan)?;
    if !synthesis.is_clean() {
        return Err(Error::Conflicts(synthesis.conflicts));
    }
    let artifacts = synthesis.artifacts;

    let issues = validate::validate(&design, &pins, &artifacts, &job.validation_options());
    if issues.has_error() || (strict && issues.has_warning()) {
        return Err(Error::Validation(issues));
    }

    let document = doc.rewrite(&artifacts)?;
    info!(
        replaced = doc.generated_count(),
        issues = issues.len(),
        "run finished"
    );
    Ok(RunOutput {
        document,
        artifacts,
        issues,
    })
}
