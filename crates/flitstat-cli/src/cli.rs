//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use flitstat_engine::{AnalysisOptions, SymbolMatch};

#[derive(Parser, Debug)]
#[command(name = "flitstat")]
#[command(about = "Statistical report over FLiT fault-injection bisect logs")]
#[command(version)]
pub(crate) struct Cli {
    /// Directory holding the bisect log
    #[arg(short = 'C', long, default_value = ".")]
    pub(crate) directory: PathBuf,

    /// Bisect log, relative to --directory
    #[arg(short, long, default_value = "auto-bisect.csv")]
    pub(crate) input: PathBuf,

    /// Symbol representation compared against the injected symbol: demangled | mangled
    #[arg(long, default_value_t = SymbolMatch::Demangled)]
    pub(crate) match_by: SymbolMatch,

    /// Count runs whose symbol scores contain this value as located error
    /// cases (the bisect tooling writes 1500000.0)
    #[arg(long)]
    pub(crate) error_sentinel: Option<f64>,

    /// Demangling backend
    #[arg(long, value_enum, default_value_t = DemanglerChoice::Cxxfilt)]
    pub(crate) demangler: DemanglerChoice,

    /// c++filt executable used by the cxxfilt backend
    #[arg(long, default_value = "c++filt")]
    pub(crate) cxxfilt: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub(crate) format: OutputFormat,
}

impl Cli {
    pub(crate) fn log_path(&self) -> PathBuf {
        self.directory.join(&self.input)
    }

    pub(crate) fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            match_mode: self.match_by,
            error_sentinel: self.error_sentinel,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum DemanglerChoice {
    /// Pipe names through c++filt
    Cxxfilt,
    /// Leave names as they are
    Identity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}
