use std::{fmt, io, path::PathBuf};

use thiserror::Error;

use crate::{ContentHash, ModuleId};

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveFailure {
    NotFound,
    /// Equally ranked candidates without a tie-break rule.
    Ambiguous(Vec<PathBuf>),
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveFailure::NotFound => f.write_str("not found"),
            ResolveFailure::Ambiguous(candidates) => {
                f.write_str("ambiguous between ")?;
                let candidates = candidates
                    .iter()
                    .map(|candidate| candidate.display().to_string())
                    .collect::<Vec<_>>();
                f.write_str(&candidates.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot resolve {specifier:?} from {}: {reason}", importer_display(.importer))]
pub struct ResolutionError {
    pub specifier: String,
    /// `None` for entry points.
    pub importer: Option<ModuleId>,
    pub reason: ResolveFailure,
}

fn importer_display(importer: &Option<ModuleId>) -> String {
    importer
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "<entry>".to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transform {transform_name:?} failed on {module_id}: {message}")]
pub struct TransformError {
    pub module_id: ModuleId,
    pub transform_name: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("failed to load {id}: {message}")]
    Load { id: ModuleId, message: String },
    #[error("plugin {plugin:?} failed: {message}")]
    Plugin { plugin: String, message: String },
    #[error("circular dependency: {}", format_cycle(.cycle))]
    CycleViolation { cycle: Vec<ModuleId> },
    #[error("internal error: module {module} was not assigned to any chunk")]
    ChunkSplitInvariant { module: ModuleId },
    #[error("failed to write cache entry {hash}: {message}")]
    CacheWrite { hash: ContentHash, message: String },
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("more than one chunk would be written to {file_name:?}")]
    FileNameConflict { file_name: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{}", format_aggregate(.0))]
    Aggregate(Vec<BuildError>),
}

impl BuildError {
    /// Collapses collected errors into one, sorted so reports are stable.
    pub fn from_errors(mut errors: Vec<BuildError>) -> Self {
        if errors.len() == 1 {
            return errors.remove(0);
        }
        errors.sort_by_cached_key(ToString::to_string);
        BuildError::Aggregate(errors)
    }

    /// Flattened view over aggregated errors.
    pub fn errors(&self) -> Vec<&BuildError> {
        match self {
            BuildError::Aggregate(errors) => errors.iter().flat_map(BuildError::errors).collect(),
            other => vec![other],
        }
    }
}

fn format_cycle(cycle: &[ModuleId]) -> String {
    let mut path = cycle.iter().map(ToString::to_string).collect::<Vec<_>>();
    if let Some(first) = cycle.first() {
        path.push(first.to_string());
    }
    path.join(" -> ")
}

fn format_aggregate(errors: &[BuildError]) -> String {
    let mut out = format!("build failed with {} errors:", errors.len());
    for err in errors {
        out.push_str("\n  - ");
        out.push_str(&err.to_string());
    }
    out
}
