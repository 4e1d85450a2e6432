//! Batch symbol demangling.
//!
//! The engine issues a single request per analysis: the ground-truth symbol
//! of every run (in run order), followed by every found symbol whose
//! demangled field is still a placeholder. Results are matched back by
//! position.

use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, info};

use crate::pipeline::PipelineError;
use crate::run::{PendingRun, Run};

#[derive(Debug, Error)]
pub enum DemangleError {
    #[error("demangler I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("demangler not found: {0}")]
    NotFound(String),
    #[error("demangler '{command}' exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("demangler output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("demangler returned {returned} names for {requested} requested symbols")]
    LengthMismatch { requested: usize, returned: usize },
}

/// Translates mangled linker names into readable signatures.
pub trait Demangler {
    /// Demangle `mangled` in one call.
    ///
    /// Implementations return one name per input, in input order. The
    /// engine checks the count and treats a mismatch as fatal.
    fn demangle(&mut self, mangled: &[&str]) -> Result<Vec<String>, DemangleError>;
}

/// Demangles by piping names through `c++filt`.
#[derive(Debug, Clone)]
pub struct CxxFilt {
    command: String,
}

impl CxxFilt {
    pub fn new() -> Self {
        Self::with_command("c++filt")
    }

    pub fn with_command(cmd: impl Into<String>) -> Self {
        Self {
            command: cmd.into(),
        }
    }
}

impl Default for CxxFilt {
    fn default() -> Self {
        Self::new()
    }
}

impl Demangler for CxxFilt {
    fn demangle(&mut self, mangled: &[&str]) -> Result<Vec<String>, DemangleError> {
        if mangled.is_empty() {
            return Ok(Vec::new());
        }

        // Feed stdin from a file so large batches cannot deadlock on pipes.
        let mut input = tempfile::tempfile()?;
        for name in mangled {
            writeln!(input, "{name}")?;
        }
        input.flush()?;
        input.seek(SeekFrom::Start(0))?;

        let output = Command::new(&self.command)
            .stdin(Stdio::from(input))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => DemangleError::NotFound(format!("{}: {e}", self.command)),
                _ => DemangleError::Io(e),
            })?;

        if !output.status.success() {
            return Err(DemangleError::Failed {
                command: self.command.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8(output.stdout)?;
        Ok(stdout.lines().map(str::to_owned).collect())
    }
}

/// Returns every name unchanged. Useful when the log holds symbols that are
/// already readable, or when comparing by mangled name only.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityDemangler;

impl Demangler for IdentityDemangler {
    fn demangle(&mut self, mangled: &[&str]) -> Result<Vec<String>, DemangleError> {
        Ok(mangled.iter().map(|s| s.to_string()).collect())
    }
}

/// Demangle a batch and fail on any count mismatch.
pub fn demangle_batch<D: Demangler + ?Sized>(
    demangler: &mut D,
    mangled: &[&str],
) -> Result<Vec<String>, DemangleError> {
    let names = demangler.demangle(mangled)?;
    if names.len() != mangled.len() {
        return Err(DemangleError::LengthMismatch {
            requested: mangled.len(),
            returned: names.len(),
        });
    }
    Ok(names)
}

/// Resolve pending runs with one demangling call.
pub fn resolve_runs<D: Demangler + ?Sized>(
    demangler: &mut D,
    pending: Vec<PendingRun>,
) -> Result<Vec<Run>, PipelineError> {
    let placeholder_counts: Vec<usize> = pending
        .iter()
        .map(|p| p.placeholder_symbols().count())
        .collect();

    let names = {
        let mut request: Vec<&str> = pending.iter().map(PendingRun::corrupt_symbol).collect();
        request.extend(pending.iter().flat_map(PendingRun::placeholder_symbols));
        info!(
            runs = pending.len(),
            symbols = request.len(),
            "demangling symbol batch"
        );
        demangle_batch(demangler, &request)?
    };

    let mut names = names.into_iter();
    let truths: Vec<String> = names.by_ref().take(pending.len()).collect();
    let runs = pending
        .into_iter()
        .zip(truths)
        .zip(placeholder_counts)
        .map(|((run, truth), count)| {
            let placeholders: Vec<String> = names.by_ref().take(count).collect();
            debug!(
                test_id = run.test_id(),
                placeholders = placeholders.len(),
                "resolved run"
            );
            run.resolve(truth, placeholders)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(runs)
}
