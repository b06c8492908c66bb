//! `pnpmd preprocess` command implementation.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use clap::Args;
use console::Style;
use pnpmd_config::{CliSettings, Config};
use pnpmd_core::{Change, Metadata, Pipeline, Preprocessed, RenderHints};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};

use super::{load_rules, pipeline_options};
use crate::error::CliError;
use crate::output::Output;

/// `name.suffix.md`, an intermediate left by an earlier run.
static INTERMEDIATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.[A-Za-z0-9_-]+\.md$").unwrap());

/// Arguments for the preprocess command.
#[derive(Args)]
pub(crate) struct PreprocessArgs {
    /// Documents to preprocess (default: the only `.md` file in the current directory).
    files: Vec<PathBuf>,

    /// Output path (single document only; default: `<stem>.<suffix>` next to the source).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the result to stdout instead of a file.
    #[arg(long, conflicts_with = "output")]
    stdout: bool,

    /// Do not insert a table of contents.
    #[arg(long)]
    omit_toc: bool,

    /// Ask the renderer not to number sections.
    #[arg(long)]
    omit_numbering: bool,

    /// Skip all rewriting; only extract metadata and render hints.
    #[arg(long)]
    as_is: bool,

    /// Section the table of contents follows (overrides config).
    #[arg(long)]
    toc_section: Option<String>,

    /// Symbol map to apply (overrides config and `pnpmd.map` discovery).
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover pnpmd.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the change log.
    #[arg(long, conflicts_with = "stdout")]
    changes: bool,

    /// Print a unified diff between source and result.
    #[arg(long, conflicts_with = "stdout")]
    diff: bool,

    /// Print a JSON report per document.
    #[arg(long, conflicts_with_all = ["stdout", "changes", "diff"])]
    json: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub(crate) verbose: bool,
}

/// One processed document.
struct Processed {
    source: PathBuf,
    input: String,
    result: Preprocessed,
}

/// Machine-readable summary of one document.
#[derive(Serialize)]
struct Report<'a> {
    source: &'a Path,
    output: Option<&'a Path>,
    metadata: &'a Metadata,
    hints: RenderHints,
    changes: Vec<&'a Change>,
    warnings: &'a [String],
}

impl PreprocessArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            toc_enabled: self.omit_toc.then_some(false),
            number_sections: self.omit_numbering.then_some(false),
            bypass: self.as_is.then_some(true),
            toc_section: self.toc_section.clone(),
            rules_path: self.rules.clone(),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let files = if self.files.is_empty() {
            vec![discover_document(&std::env::current_dir()?)?]
        } else {
            self.files.clone()
        };
        if files.len() > 1 && (self.output.is_some() || self.stdout) {
            return Err(CliError::Validation(
                "--output and --stdout need exactly one document".to_owned(),
            ));
        }

        let (pipelines, jobs) = plan(&config, &files)?;
        let processed = jobs
            .par_iter()
            .map(|&(source, pipeline)| process(source, &pipelines[pipeline]))
            .collect::<Result<Vec<_>, _>>()?;

        let mut reports = String::new();
        let mut json = Vec::with_capacity(processed.len());
        for doc in &processed {
            for warning in &doc.result.warnings {
                output.document_warning(&doc.source, warning);
            }

            let target = if self.stdout {
                io::stdout().write_all(doc.result.markdown.as_bytes())?;
                None
            } else {
                let target = self
                    .output
                    .clone()
                    .unwrap_or_else(|| config.output.output_path(&doc.source));
                write_output(&doc.source, &target, &doc.result.markdown)?;
                output.written(&doc.source, &target);
                Some(target)
            };

            if self.changes {
                change_report(&mut reports, &doc.source, &doc.result);
            }
            if self.diff {
                let target = target.as_deref().unwrap_or(&doc.source);
                unified_diff(&mut reports, &doc.source, target, &doc.input, &doc.result.markdown);
            }
            if self.json {
                json.push((doc, target));
            }
        }

        if self.json {
            let json: Vec<Report<'_>> = json
                .iter()
                .map(|(doc, target)| Report {
                    source: &doc.source,
                    output: target.as_deref(),
                    metadata: &doc.result.metadata,
                    hints: doc.result.hints,
                    changes: doc.result.changes.iter().collect(),
                    warnings: &doc.result.warnings,
                })
                .collect();
            reports.push_str(&serde_json::to_string_pretty(&json)?);
            reports.push('\n');
        }
        io::stdout().write_all(reports.as_bytes())?;

        if processed.len() > 1 {
            output.summary(processed.len());
        }
        Ok(())
    }
}

/// Build one pipeline per distinct symbol map and assign each file to one.
fn plan<'f>(
    config: &Config,
    files: &'f [PathBuf],
) -> Result<(Vec<Pipeline>, Vec<(&'f Path, usize)>), CliError> {
    let options = pipeline_options(config);
    let mut pipelines = Vec::new();
    let mut by_rules: HashMap<Option<PathBuf>, usize> = HashMap::new();
    let mut jobs = Vec::with_capacity(files.len());

    for file in files {
        let rules_path = config.rules_file(document_dir(file));
        let index = if let Some(&index) = by_rules.get(&rules_path) {
            index
        } else {
            let rules = load_rules(rules_path.as_deref())?;
            pipelines.push(Pipeline::new(options.clone(), rules));
            by_rules.insert(rules_path, pipelines.len() - 1);
            pipelines.len() - 1
        };
        jobs.push((file.as_path(), index));
    }

    Ok((pipelines, jobs))
}

fn process(source: &Path, pipeline: &Pipeline) -> Result<Processed, CliError> {
    let input = std::fs::read_to_string(source).map_err(|e| CliError::File {
        path: source.to_path_buf(),
        source: e,
    })?;
    let result = pipeline.run(&input);
    tracing::info!(
        source = %source.display(),
        changes = result.changes.len(),
        warnings = result.warnings.len(),
        "Preprocessed document"
    );
    Ok(Processed {
        source: source.to_path_buf(),
        input,
        result,
    })
}

fn write_output(source: &Path, target: &Path, markdown: &str) -> Result<(), CliError> {
    if same_file(source, target) {
        return Err(CliError::Validation(format!(
            "refusing to overwrite the source document {}",
            source.display()
        )));
    }
    std::fs::write(target, markdown).map_err(|e| CliError::File {
        path: target.to_path_buf(),
        source: e,
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Directory a document lives in, `.` for bare file names.
fn document_dir(file: &Path) -> &Path {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Whether `name` is a source document rather than a hidden file or an
/// intermediate.
fn is_source_document(name: &str) -> bool {
    name.ends_with(".md") && !name.starts_with('.') && !INTERMEDIATE_RE.is_match(name)
}

/// Find the only source document in `dir`.
fn discover_document(dir: &Path) -> Result<PathBuf, CliError> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_candidate = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(is_source_document);
        if is_candidate && path.is_file() {
            candidates.push(path);
        }
    }
    candidates.sort();

    match candidates.len() {
        0 => Err(CliError::Validation(format!(
            "no Markdown document found in {}",
            dir.display()
        ))),
        1 => Ok(candidates.swap_remove(0)),
        _ => {
            let names: Vec<_> = candidates
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy())
                .collect();
            Err(CliError::Validation(format!(
                "several Markdown documents found ({}), name one explicitly",
                names.join(", ")
            )))
        }
    }
}

fn change_report(out: &mut String, source: &Path, result: &Preprocessed) {
    let _ = writeln!(
        out,
        "{}: {} change(s)",
        source.display(),
        result.changes.len()
    );
    for change in &result.changes {
        let _ = writeln!(out, "  {change}");
    }
}

fn unified_diff(out: &mut String, source: &Path, target: &Path, before: &str, after: &str) {
    if before == after {
        return;
    }
    let diff = TextDiff::from_lines(before, after);

    let red = Style::new().red();
    let green = Style::new().green();
    let cyan = Style::new().cyan();
    let plain = Style::new();

    let _ = writeln!(out, "--- {}", source.display());
    let _ = writeln!(out, "+++ {}", target.display());
    let mut unified = diff.unified_diff();
    unified.context_radius(3);
    for hunk in unified.iter_hunks() {
        let _ = writeln!(out, "{}", cyan.apply_to(hunk.header()));
        for change in hunk.iter_changes() {
            let (sign, style) = match change.tag() {
                ChangeTag::Delete => ("-", &red),
                ChangeTag::Insert => ("+", &green),
                ChangeTag::Equal => (" ", &plain),
            };
            let _ = write!(out, "{}", style.apply_to(format!("{sign}{}", change.value())));
            if change.missing_newline() {
                out.push('\n');
            }
        }
    }
}
