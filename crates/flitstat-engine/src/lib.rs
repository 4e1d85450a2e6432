#![doc = include_str!("../README.md")]

//! FLiT bisect result engine.
//!
//! This crate loads a bisect log, validates and decodes each run,
//! demangles the injected and found symbols in one batch, classifies every
//! run and aggregates the outcomes into histograms.

pub mod classify;
pub mod demangle;
pub mod histogram;
pub mod pipeline;
pub mod rows;
pub mod run;

pub use classify::{classify, Outcome, SymbolMatch};
pub use demangle::{CxxFilt, Demangler, IdentityDemangler};
pub use histogram::{Histogram, Summary};
pub use pipeline::{
    analyze_path, analyze_reader, analyze_rows, AnalysisOptions, PipelineError,
    DEFAULT_ERROR_SENTINEL,
};
