//! `pnpmd rules` command implementation.

use std::fmt::Write as _;
use std::io::{self, Write as _};
use std::path::PathBuf;

use clap::Args;
use pnpmd_config::{CliSettings, Config};
use pnpmd_core::RuleSet;

use super::load_rules;
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the rules command.
#[derive(Args)]
pub(crate) struct RulesArgs {
    /// Symbol map to check (default: configured or discovered `pnpmd.map`).
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover pnpmd.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl RulesArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            rules_path: self.rules,
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let Some(path) = config.rules_file(&std::env::current_dir()?) else {
            output.missing_rules();
            return Ok(());
        };
        let rules = load_rules(Some(&path))?;

        output.rules_header(&path, rules.len());
        io::stdout().write_all(listing(&rules).as_bytes())?;
        Ok(())
    }
}

/// One line per rule in application order, prefixed with its source line.
fn listing(rules: &RuleSet) -> String {
    let mut out = String::new();
    for rule in rules {
        let _ = writeln!(out, "{:>5}  {rule}", rule.line());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_listing_in_application_order() {
        let rules = RuleSet::parse("# Greek\nα=\\alpha\n\n/β+/=\\beta\n", "pnpmd.map").unwrap();
        assert_eq!(listing(&rules), "    4  /β+/ -> $\\beta$\n    2  α -> $\\alpha$\n");
    }

    #[test]
    fn test_empty_listing() {
        assert_eq!(listing(&RuleSet::new()), "");
    }
}
