//! PNPMD preprocessing pipeline.
//!
//! Rewrites the author-facing PNPMD dialect into Markdown a publishing
//! renderer can consume, without ever touching code or math.
//!
//! # Architecture
//!
//! Every pass masks protected regions before it runs:
//! - [`Protected`]: code fences, code spans and math replaced by sentinels
//! - [`RuleSet`]: symbol map substitutions
//! - [`AnchorResolver`]: `{#id}` normalization and the label/anchor index
//! - [`ReferenceExpander`], [`NamedReferences`], [`bare_hash`]: reference sugar
//! - [`normalize_heading_spacing`], [`apply_toc`]: layout
//!
//! [`Pipeline`] runs them in order and returns the final text together with
//! a [`ChangeLog`] and the [`RenderHints`] for the renderer.
//!
//! # Example
//!
//! ```
//! use pnpmd_core::{Pipeline, PipelineOptions, RuleSet};
//!
//! let rules = RuleSet::parse("α=\\alpha\n", "pnpmd.map")?;
//! let pipeline = Pipeline::new(PipelineOptions::default(), rules);
//! let out = pipeline.run("[Intro]{#intro}\n\nSee @intro, where α matters.\n");
//!
//! assert!(out.markdown.contains("See [Intro](#intro), where $\\alpha$ matters."));
//! # Ok::<(), pnpmd_core::RuleError>(())
//! ```

mod anchors;
mod changes;
pub(crate) mod fence;
mod heading;
mod layout;
mod metadata;
mod pipeline;
mod protect;
mod references;
mod region;
mod rules;

pub use anchors::{AnchorIndex, AnchorResolver, KnownAnchors, LabelMap};
pub use changes::{Change, ChangeKind, ChangeLog, Location};
pub use heading::{
    Heading, heading_shift, is_heading_line, min_heading_level, parse_heading, shift_headings,
    slugify,
};
pub use layout::{TocOptions, apply_toc, normalize_heading_spacing};
pub use metadata::{Metadata, Split, split_metadata};
pub use pipeline::{Pipeline, PipelineOptions, Preprocessed, RenderHints};
pub use protect::{Locator, Protected};
pub use references::{
    DEFAULT_NAMEREF_COMMAND, DEFAULT_NAMESPACES, NamedReferences, ReferenceExpander, bare_hash,
    normalize_link_destinations,
};
pub use region::{Region, RegionKind, Token, scan_regions, tokenize};
pub use rules::{Rule, RuleError, RuleKind, RuleSet};
