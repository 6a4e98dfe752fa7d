//! twb2lookml
//!
//! Translates one or more Tableau workbooks into a consolidated LookML
//! project on disk.
//!
//! Usage:
//!   twb2lookml sales.twb operations.twb --output ./enterprise_migration
//!   twb2lookml sales.twb --config run.yaml --model-name sales_analytics
//!   twb2lookml sales.twb --json

mod layout;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use twb2lookml_core::{translate_batch, RunConfig, TranslationOutcome, WorkbookInput};

use crate::layout::ProjectLayout;

/// Tableau workbook to LookML migration
#[derive(Parser, Debug)]
#[command(name = "twb2lookml")]
#[command(about = "Translate Tableau workbooks (.twb) into a consolidated LookML project")]
struct Args {
    /// Workbook files; non-.twb inputs are skipped
    #[arg(required = true)]
    workbooks: Vec<PathBuf>,

    /// Output directory
    #[arg(long, short = 'o', default_value = "./enterprise_migration")]
    output: PathBuf,

    /// Run configuration (YAML)
    #[arg(long, short = 'c', env = "TWB2LOOKML_CONFIG")]
    config: Option<PathBuf>,

    /// Model name (overrides the configuration file)
    #[arg(long, short = 'm')]
    model_name: Option<String>,

    /// Print the consolidation report as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("twb"))
}

/// Read the `.twb` inputs as `(document name, bytes)`, skipping the rest.
fn read_workbooks(paths: &[PathBuf]) -> Result<Vec<(String, Vec<u8>)>> {
    let mut documents = Vec::new();
    for path in paths {
        if !is_workbook(path) {
            warn!("Skipping {}: not a .twb workbook", path.display());
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("Workbook path has no usable name: {}", path.display()))?
            .to_string();
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        documents.push((name, bytes));
    }
    if documents.is_empty() {
        bail!("no .twb workbooks among the inputs");
    }
    Ok(documents)
}

fn print_summary(outcome: &TranslationOutcome, layout: &ProjectLayout) {
    let s = &outcome.report.summary;

    println!("\n{} {}", "Model:".cyan().bold(), outcome.model_name);
    println!("{} {}", "Workbooks analyzed:".cyan(), s.workbooks_analyzed);
    println!(
        "{} {} -> {} ({} eliminated)",
        "Views:".cyan(),
        s.views_before_consolidation,
        s.views_after_consolidation,
        s.views_eliminated
    );
    println!(
        "{} {}",
        "Views requiring manual review:".cyan(),
        s.views_requiring_manual_review
    );
    println!("{} {}", "Field conflicts:".cyan(), s.conflicts);

    let warnings: Vec<_> = outcome.warnings().collect();
    if !warnings.is_empty() {
        println!("\n{} ({})", "Warnings".yellow().bold(), warnings.len());
        for diagnostic in warnings {
            println!("  {} {}", "-".yellow(), diagnostic);
        }
    }

    println!("\n{} {}", "Output:".green().bold(), layout.lookml_dir().display());
    if s.views_requiring_manual_review > 0 || s.conflicts > 0 {
        println!(
            "\n{} Review {} before deploying",
            "IMPORTANT:".red().bold(),
            layout.lookml_dir().join("GOVERNANCE_REVIEW.md").display()
        );
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(name) = args.model_name {
        config.model_name = Some(name);
    }

    let documents = read_workbooks(&args.workbooks)?;
    let inputs: Vec<WorkbookInput<'_>> = documents
        .iter()
        .map(|(name, bytes)| WorkbookInput::new(name, bytes))
        .collect();

    let outcome = translate_batch(&inputs, config).context("Translation failed")?;

    let layout = ProjectLayout::new(&args.output);
    layout.write(&outcome)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    } else {
        print_summary(&outcome, &layout);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_twb_files_are_workbooks() {
        assert!(is_workbook(Path::new("sales.twb")));
        assert!(is_workbook(Path::new("dir/SALES.TWB")));
        assert!(!is_workbook(Path::new("sales.twbx")));
        assert!(!is_workbook(Path::new("notes.txt")));
        assert!(!is_workbook(Path::new("twb")));
    }

    #[test]
    fn non_workbooks_are_skipped_and_empty_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        std::fs::write(&notes, "not a workbook").unwrap();
        assert!(read_workbooks(&[notes.clone()]).is_err());

        let book = dir.path().join("sales.twb");
        std::fs::write(&book, "<workbook/>").unwrap();
        let documents = read_workbooks(&[notes, book]).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].0, "sales");
        assert_eq!(documents[0].1, b"<workbook/>".to_vec());
    }

    #[test]
    fn args_parse() {
        let args = Args::try_parse_from([
            "twb2lookml",
            "a.twb",
            "b.twb",
            "-o",
            "out",
            "--model-name",
            "sales",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.workbooks.len(), 2);
        assert_eq!(args.output, PathBuf::from("out"));
        assert_eq!(args.model_name.as_deref(), Some("sales"));
        assert!(args.json);

        assert!(Args::try_parse_from(["twb2lookml"]).is_err());
    }
}
