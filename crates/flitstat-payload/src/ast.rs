use std::fmt;

/// Byte span inside a payload string, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// One element of a key tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    Str(String),
    Int(i64),
}

/// The first element of a payload pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadKey {
    /// `'lulesh.cc'`
    Str(String),
    /// `('src', '_Z1fv', 'f()', 'a.cc', 10)`
    Tuple(Vec<Atom>),
}

impl PayloadKey {
    /// Short description of the key's shape, used in shape errors.
    pub fn describe(&self) -> String {
        match self {
            PayloadKey::Str(_) => "a quoted string".into(),
            PayloadKey::Tuple(atoms) => format!("a {}-element tuple", atoms.len()),
        }
    }
}

/// A decoded `(key, score)` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub key: PayloadKey,
    pub score: f64,
    pub key_span: Span,
    pub span: Span,
}

/// Identifies a symbol reported by the symbol bisect phase.
///
/// Ordering is lexicographic over the fields in declaration order, which
/// matches the order of the tuple in the log. A `demangled` value of `""`
/// marks a placeholder still waiting for the demangling pass.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolDescriptor {
    /// Origin tag of the symbol, `src` for symbols found in source objects.
    pub origin: String,
    /// Mangled linker name.
    pub symbol: String,
    /// Human-readable signature.
    pub demangled: String,
    /// Source file defining the symbol.
    pub file: String,
    pub line: u64,
}

impl SymbolDescriptor {
    pub fn new(
        origin: impl Into<String>,
        symbol: impl Into<String>,
        demangled: impl Into<String>,
        file: impl Into<String>,
        line: u64,
    ) -> Self {
        Self {
            origin: origin.into(),
            symbol: symbol.into(),
            demangled: demangled.into(),
            file: file.into(),
            line,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.demangled.is_empty()
    }

    pub fn with_demangled(self, demangled: impl Into<String>) -> Self {
        Self {
            demangled: demangled.into(),
            ..self
        }
    }
}

/// Quote a string the way a Python `repr` does, so the output re-parses.
pub fn quote(s: &str) -> String {
    let delim = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(delim);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delim);
    out
}

/// Format a finite score so that it re-parses to the same `f64`.
///
/// Non-finite values render as `inf`/`NaN`, which the payload grammar does
/// not accept; the decoders never produce them.
pub fn format_score(score: f64) -> String {
    format!("{score:?}")
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Str(s) => f.write_str(&quote(s)),
            Atom::Int(n) => write!(f, "{n}"),
        }
    }
}

impl fmt::Display for PayloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKey::Str(s) => f.write_str(&quote(s)),
            PayloadKey::Tuple(atoms) => {
                f.write_str("(")?;
                for (i, atom) in atoms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{atom}")?;
                }
                if atoms.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.key, format_score(self.score))
    }
}

impl fmt::Display for SymbolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {})",
            quote(&self.origin),
            quote(&self.symbol),
            quote(&self.demangled),
            quote(&self.file),
            self.line
        )
    }
}

/// Render a `src` row payload.
pub fn format_file_score(file: &str, score: f64) -> String {
    format!("({}, {})", quote(file), format_score(score))
}

/// Render a `sym` row payload.
pub fn format_symbol_score(symbol: &SymbolDescriptor, score: f64) -> String {
    format!("({symbol}, {})", format_score(score))
}
