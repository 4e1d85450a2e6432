#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

use crate::ast::Span;

const PAYLOAD_SOURCE_NAME: &str = "payload";

#[derive(Debug, Error, Diagnostic)]
pub enum PayloadError {
    #[error("Syntax error: {message}")]
    #[diagnostic(code(flitstat::payload::syntax))]
    Syntax {
        message: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Unexpected payload shape: expected {expected}, found {found}")]
    #[diagnostic(
        code(flitstat::payload::shape),
        help("src rows carry ('file', score); sym rows carry ((origin, mangled, demangled, file, line), score)")
    )]
    UnexpectedShape {
        expected: String,
        found: String,
        #[label("this key")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Invalid number '{text}': {reason}")]
    #[diagnostic(code(flitstat::payload::number))]
    InvalidNumber {
        text: String,
        reason: String,
        #[label("not representable")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },
}

fn source_span(span: Span) -> miette::SourceSpan {
    (span.start, span.end.saturating_sub(span.start)).into()
}

fn named_source(source: &str) -> miette::NamedSource<String> {
    miette::NamedSource::new(PAYLOAD_SOURCE_NAME, source.to_owned())
}

impl PayloadError {
    pub fn syntax(message: impl Into<String>, span: Span, source: &str) -> Self {
        PayloadError::Syntax {
            message: message.into(),
            span: source_span(span),
            src: named_source(source),
        }
    }

    pub fn shape(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
        source: &str,
    ) -> Self {
        PayloadError::UnexpectedShape {
            expected: expected.into(),
            found: found.into(),
            span: source_span(span),
            src: named_source(source),
        }
    }

    pub fn number(
        text: impl Into<String>,
        reason: impl Into<String>,
        span: Span,
        source: &str,
    ) -> Self {
        PayloadError::InvalidNumber {
            text: text.into(),
            reason: reason.into(),
            span: source_span(span),
            src: named_source(source),
        }
    }
}
