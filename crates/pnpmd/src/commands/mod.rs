//! CLI command implementations.

pub(crate) mod preprocess;
pub(crate) mod rules;

pub(crate) use preprocess::PreprocessArgs;
pub(crate) use rules::RulesArgs;

use std::path::Path;

use pnpmd_config::Config;
use pnpmd_core::{PipelineOptions, RuleSet, TocOptions};

use crate::error::CliError;

/// Read and compile the symbol map at `path`; no path means no rules.
pub(crate) fn load_rules(path: Option<&Path>) -> Result<RuleSet, CliError> {
    let Some(path) = path else {
        return Ok(RuleSet::new());
    };
    let source = std::fs::read_to_string(path).map_err(|source| CliError::File {
        path: path.to_path_buf(),
        source,
    })?;
    let rules = RuleSet::parse(&source, &path.display().to_string())?;
    tracing::info!(path = %path.display(), rules = rules.len(), "Loaded symbol map");
    Ok(rules)
}

/// Pipeline options derived from the loaded configuration.
pub(crate) fn pipeline_options(config: &Config) -> PipelineOptions {
    PipelineOptions {
        toc: TocOptions {
            enabled: config.toc.enabled,
            section: config.toc.section.clone(),
            marker: config.toc.marker.clone(),
            directive: config.toc.directive.clone(),
        },
        number_sections: config.output.number_sections,
        bypass: config.bypass,
        namespaces: config.references.namespaces.clone(),
        nameref_command: config.references.nameref_command.clone(),
    }
}
