#![doc = include_str!("../README.md")]

mod cli;
mod render;

use clap::Parser;
use miette::{Context, IntoDiagnostic};
use tracing::info;
use tracing_subscriber::EnvFilter;

use flitstat_engine::{analyze_path, CxxFilt, Demangler, IdentityDemangler};

use crate::cli::{Cli, DemanglerChoice, OutputFormat};

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let path = cli.log_path();
    let options = cli.analysis_options();

    let mut demangler: Box<dyn Demangler> = match cli.demangler {
        DemanglerChoice::Cxxfilt => Box::new(CxxFilt::with_command(cli.cxxfilt.clone())),
        DemanglerChoice::Identity => Box::new(IdentityDemangler),
    };
    info!(
        log = %path.display(),
        match_by = %options.match_mode,
        demangler = ?cli.demangler,
        "analyzing bisect log"
    );

    let summary = analyze_path(&path, demangler.as_mut(), &options)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to analyze {}", path.display()))?;

    let report = match cli.format {
        OutputFormat::Text => render::render_text(&summary),
        OutputFormat::Json => render::render_json(&summary).into_diagnostic()? + "\n",
    };
    print!("{report}");
    Ok(())
}
