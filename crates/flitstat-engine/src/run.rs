//! One bisect experiment, built from all log rows sharing a run identifier.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use flitstat_payload::{parse_file_score, parse_symbol_score, PayloadError, SymbolDescriptor};
use thiserror::Error;

use crate::rows::{LogRow, RowKind};

#[derive(Debug, Error)]
pub enum SwitchesError {
    #[error("switches '{switches}' have no corruption descriptor token")]
    MissingDescriptor { switches: String },
    #[error("corruption descriptor '{descriptor}' has {found} components, expected 5")]
    ComponentCount { descriptor: String, found: usize },
    #[error("corrupted instruction index '{value}' is not an integer")]
    InvalidInstruction { value: String },
    #[error("injected value '{value}' is not a number")]
    InvalidValue { value: String },
    #[error("unknown corruption operation '{value}' (expected ADD, SUB, DIV or MUL)")]
    UnknownOp { value: String },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("run {run}: no log rows")]
    Empty { run: String },
    #[error("run {run}: expected exactly one completed row, found {found}")]
    CompletionRows { run: String, found: usize },
    #[error("run {run}: column '{column}' differs between rows ('{expected}' vs '{found}')")]
    InconsistentField {
        run: String,
        column: &'static str,
        expected: String,
        found: String,
    },
    #[error("run {run}: column '{column}' value '{value}' is not an integer")]
    InvalidInteger {
        run: String,
        column: &'static str,
        value: String,
    },
    #[error("run {run}: completed row has no return code")]
    MissingReturnCode { run: String },
    #[error("run {run}: {source}")]
    Switches {
        run: String,
        #[source]
        source: SwitchesError,
    },
    #[error("run {run}: bad {kind} payload '{payload}': {source}")]
    Payload {
        run: String,
        kind: &'static str,
        payload: String,
        #[source]
        source: PayloadError,
    },
    #[error("run {run}: test id {test_id} is also used by run {other}")]
    DuplicateTestId {
        run: String,
        other: String,
        test_id: u64,
    },
    #[error("run {run}: {kind} suspect {key} reported more than once")]
    DuplicateKey {
        run: String,
        kind: &'static str,
        key: String,
    },
}

/// Arithmetic applied at the injection site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorruptOp {
    Add,
    Sub,
    Div,
    Mul,
}

impl CorruptOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CorruptOp::Add => "ADD",
            CorruptOp::Sub => "SUB",
            CorruptOp::Div => "DIV",
            CorruptOp::Mul => "MUL",
        }
    }
}

impl FromStr for CorruptOp {
    type Err = SwitchesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADD" => Ok(CorruptOp::Add),
            "SUB" => Ok(CorruptOp::Sub),
            "DIV" => Ok(CorruptOp::Div),
            "MUL" => Ok(CorruptOp::Mul),
            other => Err(SwitchesError::UnknownOp {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CorruptOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ground truth of one injection.
#[derive(Debug, Clone, PartialEq)]
pub struct Corruption {
    pub file: String,
    /// Mangled name of the corrupted function.
    pub symbol: String,
    pub instruction: u64,
    pub value: f64,
    pub op: CorruptOp,
}

/// Decode the injection descriptor carried by the `switches` column.
///
/// The second whitespace-separated token holds
/// `file,mangled_symbol,instruction_index,injected_value,operation`.
/// Any leading `--flag=` prefix on that token is stripped.
pub fn parse_switches(switches: &str) -> Result<Corruption, SwitchesError> {
    let token = switches
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| SwitchesError::MissingDescriptor {
            switches: switches.to_string(),
        })?;
    let descriptor = match token.split_once('=') {
        Some((flag, rest)) if flag.starts_with("--") => rest,
        _ => token,
    };
    let parts: Vec<&str> = descriptor.split(',').collect();
    let [file, symbol, instruction, value, op] = parts.as_slice() else {
        return Err(SwitchesError::ComponentCount {
            descriptor: descriptor.to_string(),
            found: parts.len(),
        });
    };

    let instruction = instruction
        .parse::<u64>()
        .map_err(|_| SwitchesError::InvalidInstruction {
            value: instruction.to_string(),
        })?;
    let value = value
        .parse::<f64>()
        .map_err(|_| SwitchesError::InvalidValue {
            value: value.to_string(),
        })?;
    let op = op.parse::<CorruptOp>()?;

    Ok(Corruption {
        file: file.to_string(),
        symbol: symbol.to_string(),
        instruction,
        value,
        op,
    })
}

/// Configuration shared by every row of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub test_id: u64,
    pub bisect_num: u32,
    pub compiler: String,
    pub optl: String,
    pub switches: String,
    pub precision: String,
    pub testcase: String,
}

/// How far the bisect run got, read off the `completed` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub succeeded_lib: bool,
    pub succeeded_src: bool,
    pub succeeded_sym: bool,
    /// All phases succeeded (return code zero).
    pub succeeded_all: bool,
    pub return_code: i32,
}

/// A fully resolved bisect run, ready for classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub config: RunConfig,
    pub completion: Completion,
    pub corruption: Corruption,
    /// Demangled signature of `corruption.symbol`.
    pub corrupt_demangled: String,
    pub file_scores: BTreeMap<String, f64>,
    pub symbol_scores: BTreeMap<SymbolDescriptor, f64>,
    /// Sorted.
    pub found_libs: Vec<String>,
}

impl Run {
    pub fn test_id(&self) -> u64 {
        self.config.test_id
    }

    /// Directory holding this run's bisect artifacts, e.g. `bisect-07`.
    pub fn bisect_dir(&self) -> String {
        format!("bisect-{:02}", self.config.bisect_num)
    }

    /// Found files in sorted order.
    pub fn found_files(&self) -> impl Iterator<Item = &str> {
        self.file_scores.keys().map(String::as_str)
    }

    /// Found symbols in sorted order.
    pub fn found_symbols(&self) -> impl Iterator<Item = &SymbolDescriptor> {
        self.symbol_scores.keys()
    }

    /// Whether any found symbol carries exactly `score`.
    pub fn has_symbol_score(&self, score: f64) -> bool {
        self.symbol_scores.values().any(|&s| s == score)
    }
}

/// A run whose demangled names have not been filled in yet.
///
/// Built from a row group by [`PendingRun::build`]; turned into a [`Run`] by
/// [`PendingRun::resolve`] once the demangling batch has returned.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRun {
    run: Run,
}

impl PendingRun {
    /// Validate a row group and decode it.
    pub fn build(run_id: &str, rows: &[LogRow]) -> Result<Self, RunError> {
        let run = || run_id.to_string();

        let first = rows.first().ok_or_else(|| RunError::Empty { run: run() })?;

        let completed: Vec<&LogRow> = rows
            .iter()
            .filter(|r| r.kind == RowKind::Completed)
            .collect();
        let [completed] = completed.as_slice() else {
            return Err(RunError::CompletionRows {
                run: run(),
                found: completed.len(),
            });
        };

        let reference = first.config_fields();
        for row in rows {
            for (&(column, expected), (_, found)) in reference.iter().zip(row.config_fields()) {
                if expected != found {
                    return Err(RunError::InconsistentField {
                        run: run(),
                        column,
                        expected: expected.to_string(),
                        found: found.to_string(),
                    });
                }
            }
        }

        let config = RunConfig {
            test_id: parse_integer(run_id, "testid", &first.testid)?,
            bisect_num: parse_integer(run_id, "bisectnum", &first.bisectnum)?,
            compiler: first.compiler.clone(),
            optl: first.optl.clone(),
            switches: first.switches.clone(),
            precision: first.precision.clone(),
            testcase: first.testcase.clone(),
        };

        let return_code = completed
            .return_code
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RunError::MissingReturnCode { run: run() })?;
        let return_code: i32 = parse_integer(run_id, "return", return_code)?;
        let completion = Completion {
            succeeded_lib: completed.name.contains("lib"),
            succeeded_src: completed.name.contains("src"),
            succeeded_sym: completed.name.contains("sym"),
            succeeded_all: return_code == 0,
            return_code,
        };

        let corruption = parse_switches(&config.switches)
            .map_err(|source| RunError::Switches { run: run(), source })?;

        let mut file_scores = BTreeMap::new();
        let mut symbol_scores = BTreeMap::new();
        let mut found_libs = Vec::new();
        for row in rows {
            match row.kind {
                RowKind::Src => {
                    let (file, score) = parse_file_score(&row.name)
                        .map_err(|source| payload_error(run_id, row, source))?;
                    if file_scores.contains_key(&file) {
                        return Err(RunError::DuplicateKey {
                            run: run(),
                            kind: RowKind::Src.as_str(),
                            key: file,
                        });
                    }
                    file_scores.insert(file, score);
                }
                RowKind::Sym => {
                    let (symbol, score) = parse_symbol_score(&row.name)
                        .map_err(|source| payload_error(run_id, row, source))?;
                    if symbol_scores.contains_key(&symbol) {
                        return Err(RunError::DuplicateKey {
                            run: run(),
                            kind: RowKind::Sym.as_str(),
                            key: symbol.to_string(),
                        });
                    }
                    symbol_scores.insert(symbol, score);
                }
                RowKind::Lib => found_libs.push(row.name.clone()),
                RowKind::Completed => {}
            }
        }
        found_libs.sort();

        Ok(Self {
            run: Run {
                config,
                completion,
                corruption,
                corrupt_demangled: String::new(),
                file_scores,
                symbol_scores,
                found_libs,
            },
        })
    }

    pub fn test_id(&self) -> u64 {
        self.run.config.test_id
    }

    /// The mangled name of the injected symbol.
    pub fn corrupt_symbol(&self) -> &str {
        &self.run.corruption.symbol
    }

    /// Mangled names of found symbols whose demangled field is a placeholder,
    /// in descriptor order.
    pub fn placeholder_symbols(&self) -> impl Iterator<Item = &str> {
        self.run
            .symbol_scores
            .keys()
            .filter(|s| s.is_placeholder())
            .map(|s| s.symbol.as_str())
    }

    /// Merge in the demangled names and finish the run.
    ///
    /// `placeholders` must be aligned with [`PendingRun::placeholder_symbols`];
    /// callers check the count. A filled-in placeholder that equals another
    /// found symbol of the run is rejected.
    pub fn resolve(
        self,
        corrupt_demangled: String,
        placeholders: Vec<String>,
    ) -> Result<Run, RunError> {
        let mut run = self.run;
        run.corrupt_demangled = corrupt_demangled;

        let mut names = placeholders.into_iter();
        let mut resolved = BTreeMap::new();
        for (symbol, score) in std::mem::take(&mut run.symbol_scores) {
            let symbol = if symbol.is_placeholder() {
                match names.next() {
                    Some(name) => symbol.with_demangled(name),
                    None => symbol,
                }
            } else {
                symbol
            };
            match resolved.entry(symbol) {
                Entry::Occupied(entry) => {
                    return Err(RunError::DuplicateKey {
                        run: run.config.test_id.to_string(),
                        kind: RowKind::Sym.as_str(),
                        key: entry.key().to_string(),
                    });
                }
                Entry::Vacant(entry) => {
                    entry.insert(score);
                }
            }
        }
        run.symbol_scores = resolved;
        Ok(run)
    }
}

fn parse_integer<T: FromStr>(
    run_id: &str,
    column: &'static str,
    value: &str,
) -> Result<T, RunError> {
    value.trim().parse::<T>().map_err(|_| RunError::InvalidInteger {
        run: run_id.to_string(),
        column,
        value: value.to_string(),
    })
}

fn payload_error(run_id: &str, row: &LogRow, source: PayloadError) -> RunError {
    RunError::Payload {
        run: run_id.to_string(),
        kind: row.kind.as_str(),
        payload: row.name.clone(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::tests::row;

    fn exact_find_rows(id: &str) -> Vec<LogRow> {
        vec![
            row(id, RowKind::Src, "('a.cc', 0.25)", None),
            row(id, RowKind::Sym, "(('src', '_Z1fv', 'f()', 'a.cc', 10), 0.25)", None),
            row(id, RowKind::Completed, "sym", Some("1")),
        ]
    }

    // ---------------------------------------------------------------
    // parse_switches
    // ---------------------------------------------------------------

    #[test]
    fn parses_corruption_descriptor() {
        let c = parse_switches("-fPIC --corrupt=lulesh.cc,_ZL8AreaFacedddddddddddd,12,0.001,MUL")
            .unwrap();
        assert_eq!(c.file, "lulesh.cc");
        assert_eq!(c.symbol, "_ZL8AreaFacedddddddddddd");
        assert_eq!(c.instruction, 12);
        assert_eq!(c.value, 0.001);
        assert_eq!(c.op, CorruptOp::Mul);
    }

    #[test]
    fn parses_descriptor_without_flag_prefix() {
        let c = parse_switches("-O2 a.cc,_Z1fv,0,-2.5,SUB").unwrap();
        assert_eq!(c.file, "a.cc");
        assert_eq!(c.value, -2.5);
        assert_eq!(c.op, CorruptOp::Sub);
    }

    #[test]
    fn missing_descriptor_token() {
        assert!(matches!(
            parse_switches("--corrupt=a.cc,_Z1fv,0,1,ADD").unwrap_err(),
            SwitchesError::MissingDescriptor { .. }
        ));
    }

    #[test]
    fn wrong_component_count() {
        match parse_switches("-O2 a.cc,_Z1fv,0,1").unwrap_err() {
            SwitchesError::ComponentCount { found, .. } => assert_eq!(found, 4),
            other => panic!("expected ComponentCount, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_fields_are_rejected() {
        assert!(matches!(
            parse_switches("-O2 a.cc,_Z1fv,x,1,ADD").unwrap_err(),
            SwitchesError::InvalidInstruction { .. }
        ));
        assert!(matches!(
            parse_switches("-O2 a.cc,_Z1fv,1,one,ADD").unwrap_err(),
            SwitchesError::InvalidValue { .. }
        ));
    }

    #[test]
    fn unknown_operation_is_rejected() {
        assert!(matches!(
            parse_switches("-O2 a.cc,_Z1fv,1,1.0,POW").unwrap_err(),
            SwitchesError::UnknownOp { .. }
        ));
    }

    // ---------------------------------------------------------------
    // PendingRun::build
    // ---------------------------------------------------------------

    #[test]
    fn builds_run_from_consistent_group() {
        let pending = PendingRun::build("7", &exact_find_rows("7")).unwrap();
        assert_eq!(pending.test_id(), 7);
        assert_eq!(pending.corrupt_symbol(), "_Z1fv");
        let run = pending.resolve("f()".into(), vec![]).unwrap();
        assert_eq!(run.config.compiler, "./corrupt_clang.py");
        assert_eq!(run.config.optl, "-O2");
        assert_eq!(run.config.precision, "d");
        assert_eq!(run.config.testcase, "LuleshTest");
        assert_eq!(run.bisect_dir(), "bisect-01");
        assert_eq!(run.found_files().collect::<Vec<_>>(), ["a.cc"]);
        assert_eq!(run.file_scores["a.cc"], 0.25);
        assert_eq!(run.corrupt_demangled, "f()");
        assert!(!run.completion.succeeded_all);
        assert!(run.completion.succeeded_sym);
        assert!(!run.completion.succeeded_lib);
        assert_eq!(run.completion.return_code, 1);
    }

    #[test]
    fn empty_group_is_rejected() {
        assert!(matches!(
            PendingRun::build("1", &[]).unwrap_err(),
            RunError::Empty { .. }
        ));
    }

    #[test]
    fn zero_or_two_completion_rows_are_rejected() {
        let rows = vec![row("1", RowKind::Src, "('a.cc', 0.25)", None)];
        match PendingRun::build("1", &rows).unwrap_err() {
            RunError::CompletionRows { found, .. } => assert_eq!(found, 0),
            other => panic!("expected CompletionRows, got {other:?}"),
        }

        let mut rows = exact_find_rows("1");
        rows.push(row("1", RowKind::Completed, "", Some("0")));
        match PendingRun::build("1", &rows).unwrap_err() {
            RunError::CompletionRows { found, .. } => assert_eq!(found, 2),
            other => panic!("expected CompletionRows, got {other:?}"),
        }
    }

    #[test]
    fn heterogeneous_configuration_is_rejected() {
        let mut rows = exact_find_rows("1");
        rows[1].optl = "-O3".into();
        match PendingRun::build("1", &rows).unwrap_err() {
            RunError::InconsistentField {
                column,
                expected,
                found,
                ..
            } => {
                assert_eq!(column, "optl");
                assert_eq!(expected, "-O2");
                assert_eq!(found, "-O3");
            }
            other => panic!("expected InconsistentField, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_return_code_is_rejected() {
        let mut rows = exact_find_rows("1");
        rows[2].return_code = Some("ok".into());
        assert!(matches!(
            PendingRun::build("1", &rows).unwrap_err(),
            RunError::InvalidInteger { column: "return", .. }
        ));
    }

    #[test]
    fn missing_return_code_is_rejected() {
        let mut rows = exact_find_rows("1");
        rows[2].return_code = None;
        assert!(matches!(
            PendingRun::build("1", &rows).unwrap_err(),
            RunError::MissingReturnCode { .. }
        ));
    }

    #[test]
    fn malformed_payload_names_the_run() {
        let mut rows = exact_find_rows("12");
        rows[0].name = "('a.cc', 0.25, 3)".into();
        let err = PendingRun::build("12", &rows).unwrap_err();
        assert!(matches!(err, RunError::Payload { kind: "src", .. }));
        assert!(err.to_string().starts_with("run 12:"));
    }

    #[test]
    fn duplicate_found_file_is_rejected() {
        let mut rows = exact_find_rows("1");
        rows.insert(0, row("1", RowKind::Src, "('a.cc', 0.5)", None));
        assert!(matches!(
            PendingRun::build("1", &rows).unwrap_err(),
            RunError::DuplicateKey { kind: "src", .. }
        ));
    }

    #[test]
    fn malformed_switches_abort_the_run() {
        let mut rows = exact_find_rows("1");
        for r in &mut rows {
            r.switches = "-O2 a.cc,_Z1fv".into();
        }
        assert!(matches!(
            PendingRun::build("1", &rows).unwrap_err(),
            RunError::Switches { .. }
        ));
    }

    #[test]
    fn found_libs_are_sorted() {
        let mut rows = exact_find_rows("1");
        rows.push(row("1", RowKind::Lib, "libz.so", None));
        rows.push(row("1", RowKind::Lib, "liba.so", None));
        let run = PendingRun::build("1", &rows)
            .unwrap()
            .resolve("f()".into(), vec![])
            .unwrap();
        assert_eq!(run.found_libs, ["liba.so", "libz.so"]);
    }

    // ---------------------------------------------------------------
    // PendingRun::resolve
    // ---------------------------------------------------------------

    #[test]
    fn resolve_fills_placeholders_in_descriptor_order() {
        let rows = vec![
            row("1", RowKind::Sym, "(('src', '_Z2gv', '', 'a.cc', 3), 1.0)", None),
            row("1", RowKind::Sym, "(('src', '_Z1fv', '', 'a.cc', 9), 2.0)", None),
            row("1", RowKind::Sym, "(('src', '_Z3hv', 'h()', 'a.cc', 1), 3.0)", None),
            row("1", RowKind::Completed, "", Some("0")),
        ];
        let pending = PendingRun::build("1", &rows).unwrap();
        assert_eq!(
            pending.placeholder_symbols().collect::<Vec<_>>(),
            ["_Z1fv", "_Z2gv"]
        );
        let run = pending
            .resolve("f()".into(), vec!["f()".into(), "g()".into()])
            .unwrap();
        let names: Vec<(&str, &str)> = run
            .found_symbols()
            .map(|s| (s.symbol.as_str(), s.demangled.as_str()))
            .collect();
        assert_eq!(names, [("_Z1fv", "f()"), ("_Z2gv", "g()"), ("_Z3hv", "h()")]);
        assert_eq!(
            run.symbol_scores[&SymbolDescriptor::new("src", "_Z2gv", "g()", "a.cc", 3)],
            1.0
        );
    }

    #[test]
    fn placeholder_colliding_with_demangled_symbol_is_rejected() {
        let rows = vec![
            row("4", RowKind::Sym, "(('src', '_Z2gv', '', 'a.cc', 3), 1.0)", None),
            row("4", RowKind::Sym, "(('src', '_Z2gv', 'g()', 'a.cc', 3), 2.0)", None),
            row("4", RowKind::Completed, "sym", Some("0")),
        ];
        let pending = PendingRun::build("4", &rows).unwrap();
        assert_eq!(pending.placeholder_symbols().collect::<Vec<_>>(), ["_Z2gv"]);
        match pending.resolve("f()".into(), vec!["g()".into()]).unwrap_err() {
            RunError::DuplicateKey { run, kind, key } => {
                assert_eq!(run, "4");
                assert_eq!(kind, "sym");
                assert!(key.contains("'g()'"), "key={key}");
            }
            other => panic!("expected DuplicateKey, got {other:?}"),
        }
    }

    #[test]
    fn distinct_placeholders_resolve_without_loss() {
        let rows = vec![
            row("4", RowKind::Sym, "(('src', '_Z2gv', '', 'a.cc', 3), 1.0)", None),
            row("4", RowKind::Sym, "(('src', '_Z2gv', 'g()', 'a.cc', 4), 2.0)", None),
            row("4", RowKind::Completed, "sym", Some("0")),
        ];
        let run = PendingRun::build("4", &rows)
            .unwrap()
            .resolve("f()".into(), vec!["g()".into()])
            .unwrap();
        assert_eq!(run.symbol_scores.len(), 2);
    }
}
