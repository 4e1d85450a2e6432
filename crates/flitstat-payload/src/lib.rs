#![doc = include_str!("../README.md")]

pub mod ast;
pub mod errors;
pub mod parser;

pub use ast::{format_file_score, format_symbol_score, SymbolDescriptor};
pub use errors::PayloadError;
pub use parser::{parse_file_score, parse_payload, parse_symbol_score};
