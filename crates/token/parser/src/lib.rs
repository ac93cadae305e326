//! Placeholder scanner for Tokenflow templates.
//!
//! Template text embeds typed placeholders of the form `{TYPE:a:b:c}`
//! where `TYPE` is one of `CONTEXT`, `DATA`, `STATE`, `METRICS`, or
//! `TEMPORAL`. The scanner walks the text exactly once, tagging every
//! match with its [`TokenType`](token_types::TokenType) as it goes; a
//! malformed placeholder yields an issue scoped to that region and
//! scanning continues, so one bad placeholder never hides the rest.
//!
//! Matches carry byte spans into the original text; [`splice`] rebuilds
//! the template from those spans once values exist.

#![deny(unsafe_code)]

pub mod scanner;

pub use scanner::{match_placeholder, scan, splice, PlaceholderMatch, ScanIssue, Scanner, TemplateScan};
