//! Loading `auto-bisect.csv` and grouping its rows by run.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// Columns every bisect log must carry.
pub const REQUIRED_COLUMNS: [&str; 10] = [
    "testid",
    "bisectnum",
    "compiler",
    "optl",
    "switches",
    "precision",
    "testcase",
    "type",
    "name",
    "return",
];

#[derive(Debug, Error)]
pub enum RowError {
    #[error("Cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed bisect log: {0}")]
    Csv(#[from] csv::Error),
    #[error("Bisect log is missing required column '{column}'")]
    MissingColumn { column: &'static str },
}

/// What a log row reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    /// Final row of a run, carrying the return code.
    Completed,
    /// A library found by the library bisect phase.
    Lib,
    /// A `(file, score)` found by the source bisect phase.
    Src,
    /// A `(symbol, score)` found by the symbol bisect phase.
    Sym,
}

impl RowKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RowKind::Completed => "completed",
            RowKind::Lib => "lib",
            RowKind::Src => "src",
            RowKind::Sym => "sym",
        }
    }
}

/// One line of the bisect log.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogRow {
    pub testid: String,
    pub bisectnum: String,
    pub compiler: String,
    pub optl: String,
    pub switches: String,
    pub precision: String,
    pub testcase: String,
    #[serde(rename = "type")]
    pub kind: RowKind,
    pub name: String,
    /// Only present on the `completed` row.
    #[serde(rename = "return", default)]
    pub return_code: Option<String>,
}

impl LogRow {
    /// The columns that must agree across all rows of one run.
    pub fn config_fields(&self) -> [(&'static str, &str); 7] {
        [
            ("testid", self.testid.as_str()),
            ("bisectnum", self.bisectnum.as_str()),
            ("compiler", self.compiler.as_str()),
            ("optl", self.optl.as_str()),
            ("switches", self.switches.as_str()),
            ("precision", self.precision.as_str()),
            ("testcase", self.testcase.as_str()),
        ]
    }
}

/// Read every row of a bisect log.
pub fn read_rows<R: Read>(input: R) -> Result<Vec<LogRow>, RowError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(input);
    let headers = reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(RowError::MissingColumn { column });
        }
    }
    let rows = reader
        .deserialize::<LogRow>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Read a bisect log from disk.
pub fn load_rows(path: &Path) -> Result<Vec<LogRow>, RowError> {
    let file = File::open(path).map_err(|source| RowError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let rows = read_rows(file)?;
    info!(path = %path.display(), rows = rows.len(), "loaded bisect log");
    Ok(rows)
}

/// Partition rows by run identifier.
///
/// Groups appear in order of first occurrence and keep the original row
/// order inside each group.
pub fn group_rows<I>(rows: I) -> IndexMap<String, Vec<LogRow>>
where
    I: IntoIterator<Item = LogRow>,
{
    let mut groups: IndexMap<String, Vec<LogRow>> = IndexMap::new();
    for row in rows {
        groups.entry(row.testid.clone()).or_default().push(row);
    }
    groups
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const HEADER: &str =
        "testid,bisectnum,compiler,optl,switches,precision,testcase,type,name,return";

    pub(crate) fn row(testid: &str, kind: RowKind, name: &str, ret: Option<&str>) -> LogRow {
        LogRow {
            testid: testid.into(),
            bisectnum: "1".into(),
            compiler: "./corrupt_clang.py".into(),
            optl: "-O2".into(),
            switches: "--corrupt a.cc,_Z1fv,3,0.5,ADD".into(),
            precision: "d".into(),
            testcase: "LuleshTest".into(),
            kind,
            name: name.into(),
            return_code: ret.map(str::to_owned),
        }
    }

    // ---------------------------------------------------------------
    // read_rows
    // ---------------------------------------------------------------

    #[test]
    fn reads_quoted_payload_columns() {
        let csv = format!(
            "{HEADER}\n\
             1,1,gcc,-O2,\"--corrupt a.cc,_Z1fv,3,0.5,ADD\",d,T,src,\"('a.cc', 0.25)\",\n\
             1,1,gcc,-O2,\"--corrupt a.cc,_Z1fv,3,0.5,ADD\",d,T,completed,sym,0\n"
        );
        let rows = read_rows(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, RowKind::Src);
        assert_eq!(rows[0].name, "('a.cc', 0.25)");
        assert_eq!(rows[0].return_code, None);
        assert_eq!(rows[1].kind, RowKind::Completed);
        assert_eq!(rows[1].return_code.as_deref(), Some("0"));
        assert_eq!(rows[1].switches, "--corrupt a.cc,_Z1fv,3,0.5,ADD");
    }

    #[test]
    fn missing_column_is_reported_by_name() {
        let csv = "testid,bisectnum,compiler,optl,switches,precision,testcase,type,name\n";
        let err = read_rows(csv.as_bytes()).unwrap_err();
        match err {
            RowError::MissingColumn { column } => assert_eq!(column, "return"),
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn unknown_row_type_is_a_parse_error() {
        let csv = format!("{HEADER}\n1,1,gcc,-O2,x,d,T,bogus,n,\n");
        assert!(matches!(
            read_rows(csv.as_bytes()).unwrap_err(),
            RowError::Csv(_)
        ));
    }

    #[test]
    fn load_rows_reports_missing_file() {
        let err = load_rows(Path::new("/nonexistent/auto-bisect.csv")).unwrap_err();
        assert!(matches!(err, RowError::Open { .. }));
        assert!(err.to_string().contains("/nonexistent/auto-bisect.csv"));
    }

    // ---------------------------------------------------------------
    // group_rows
    // ---------------------------------------------------------------

    #[test]
    fn grouping_preserves_every_row_and_its_order() {
        let rows = vec![
            row("2", RowKind::Lib, "libm", None),
            row("1", RowKind::Src, "a", None),
            row("2", RowKind::Completed, "lib", Some("1")),
            row("1", RowKind::Completed, "sym", Some("0")),
        ];
        let groups = group_rows(rows.clone());
        assert_eq!(groups.keys().collect::<Vec<_>>(), ["2", "1"]);
        assert_eq!(groups["2"], vec![rows[0].clone(), rows[2].clone()]);
        assert_eq!(groups["1"], vec![rows[1].clone(), rows[3].clone()]);
        assert_eq!(groups.values().map(Vec::len).sum::<usize>(), rows.len());
    }

    #[test]
    fn grouping_empty_input_yields_no_groups() {
        assert!(group_rows(Vec::new()).is_empty());
    }
}
