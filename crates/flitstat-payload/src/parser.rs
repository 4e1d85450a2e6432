#![allow(clippy::result_large_err)]

use pest::Parser;
use pest_derive::Parser;

use crate::ast::*;
use crate::errors::PayloadError;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct PayloadParser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;

fn span_from(pair: &Pair<'_>) -> Span {
    let s = pair.as_span();
    Span::new(s.start(), s.end())
}

fn whole(source: &str) -> Span {
    Span::new(0, source.len())
}

/// Parse a `(key, score)` payload without interpreting the key.
pub fn parse_payload(source: &str) -> Result<Payload, PayloadError> {
    let pairs = PayloadParser::parse(Rule::payload, source).map_err(|e| {
        let (start, end) = match e.location {
            pest::error::InputLocation::Pos(p) => (p, (p + 1).min(source.len())),
            pest::error::InputLocation::Span((s, e)) => (s, e),
        };
        PayloadError::syntax(format!("{e}"), Span::new(start, end), source)
    })?;

    let pair = pairs
        .into_iter()
        .next()
        .and_then(|payload| payload.into_inner().find(|p| p.as_rule() == Rule::pair))
        .ok_or_else(|| PayloadError::syntax("Empty payload", whole(source), source))?;
    let span = span_from(&pair);

    let mut inner = pair.into_inner();
    let key_pair = inner
        .next()
        .ok_or_else(|| PayloadError::syntax("Missing payload key", span, source))?;
    let key_span = span_from(&key_pair);
    let key = parse_key(key_pair, source)?;

    let score_pair = inner
        .next()
        .ok_or_else(|| PayloadError::syntax("Missing payload score", span, source))?;
    let score = parse_score(&score_pair, source)?;

    Ok(Payload {
        key,
        score,
        key_span,
        span,
    })
}

/// Parse a `src` row payload: `('file', score)`.
pub fn parse_file_score(source: &str) -> Result<(String, f64), PayloadError> {
    let payload = parse_payload(source)?;
    match payload.key {
        PayloadKey::Str(file) => Ok((file, payload.score)),
        other => Err(PayloadError::shape(
            "a quoted file name",
            other.describe(),
            payload.key_span,
            source,
        )),
    }
}

/// Parse a `sym` row payload: `((origin, mangled, demangled, file, line), score)`.
pub fn parse_symbol_score(source: &str) -> Result<(SymbolDescriptor, f64), PayloadError> {
    const EXPECTED: &str = "a (origin, mangled, demangled, file, line) tuple";

    let payload = parse_payload(source)?;
    let atoms = match payload.key {
        PayloadKey::Tuple(atoms) => atoms,
        other => {
            return Err(PayloadError::shape(
                EXPECTED,
                other.describe(),
                payload.key_span,
                source,
            ))
        }
    };
    let found = format!("a {}-element tuple", atoms.len());

    match <[Atom; 5]>::try_from(atoms) {
        Ok([Atom::Str(origin), Atom::Str(symbol), Atom::Str(demangled), Atom::Str(file), Atom::Int(line)]) => {
            let line = u64::try_from(line).map_err(|_| {
                PayloadError::number(
                    line.to_string(),
                    "line numbers are unsigned",
                    payload.key_span,
                    source,
                )
            })?;
            Ok((
                SymbolDescriptor {
                    origin,
                    symbol,
                    demangled,
                    file,
                    line,
                },
                payload.score,
            ))
        }
        Ok(_) => Err(PayloadError::shape(
            EXPECTED,
            "a 5-element tuple with mistyped components",
            payload.key_span,
            source,
        )),
        Err(_) => Err(PayloadError::shape(
            EXPECTED,
            found,
            payload.key_span,
            source,
        )),
    }
}

fn parse_key(pair: Pair<'_>, source: &str) -> Result<PayloadKey, PayloadError> {
    match pair.as_rule() {
        Rule::string => Ok(PayloadKey::Str(parse_string(pair))),
        Rule::tuple => {
            let mut atoms = Vec::new();
            for atom in pair.into_inner() {
                match atom.as_rule() {
                    Rule::string => atoms.push(Atom::Str(parse_string(atom))),
                    Rule::integer => {
                        let text = atom.as_str();
                        let value = text.parse::<i64>().map_err(|e| {
                            PayloadError::number(text, e.to_string(), span_from(&atom), source)
                        })?;
                        atoms.push(Atom::Int(value));
                    }
                    _ => {}
                }
            }
            Ok(PayloadKey::Tuple(atoms))
        }
        other => Err(PayloadError::syntax(
            format!("Unexpected key rule {other:?}"),
            span_from(&pair),
            source,
        )),
    }
}

fn parse_score(pair: &Pair<'_>, source: &str) -> Result<f64, PayloadError> {
    let text = pair.as_str();
    let value = text
        .parse::<f64>()
        .map_err(|e| PayloadError::number(text, e.to_string(), span_from(pair), source))?;
    if !value.is_finite() {
        return Err(PayloadError::number(
            text,
            "score overflows a 64-bit float",
            span_from(pair),
            source,
        ));
    }
    Ok(value)
}

fn parse_string(pair: Pair<'_>) -> String {
    let raw = pair
        .into_inner()
        .next()
        .map(|inner| inner.as_str())
        .unwrap_or("");
    unescape(raw)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(c @ ('\\' | '\'' | '"')) => out.push(c),
            // Unknown escapes are kept verbatim.
            Some(c) => {
                out.push('\\');
                out.push(c);
            }
            None => out.push('\\'),
        }
    }
    out
}
