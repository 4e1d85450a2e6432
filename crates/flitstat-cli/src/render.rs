//! Report rendering.

use std::fmt::Write as _;

use flitstat_engine::{Histogram, Outcome, Summary};

const LABEL_WIDTH: usize = 33;

fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::ExactFind => "1. success: exact finds:",
        Outcome::IndirectFind => "2. success: indirect finds:",
        Outcome::BadFind => "3. failure: bad finds:",
        Outcome::NoFind => "4. failure: no finds:",
        Outcome::NotMeasurable => "5. n/a:     not measurable:",
    }
}

fn line(out: &mut String, label: &str, value: u64) {
    let _ = writeln!(out, "{label:<LABEL_WIDTH$} {value}");
}

fn histogram(out: &mut String, title: &str, histogram: &Histogram) {
    let _ = writeln!(out, "  {title}:");
    for (size, count) in histogram.iter() {
        line(out, &format!("    {size} found:"), count);
    }
}

/// Plain-text statistical report.
pub(crate) fn render_text(summary: &Summary) -> String {
    let mut out = String::new();
    out.push_str("Statistical Report:\n");
    line(&mut out, "  Total #:", summary.total);
    for outcome in Outcome::ALL {
        line(
            &mut out,
            &format!("    {}", outcome_label(outcome)),
            summary.outcomes.get(outcome),
        );
    }
    histogram(&mut out, "File histogram", &summary.file_histogram);
    histogram(&mut out, "Symbol histogram", &summary.symbol_histogram);
    histogram(
        &mut out,
        "Symbol histogram when not an exact find",
        &summary.indirect_histogram,
    );
    if let (Some(located), Some(not_located)) =
        (summary.error_cases, summary.error_cases_not_located())
    {
        line(&mut out, "  Error cases located:", located);
        line(&mut out, "  Error cases not located:", not_located);
    }
    out
}

pub(crate) fn render_json(summary: &Summary) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(summary)
}
