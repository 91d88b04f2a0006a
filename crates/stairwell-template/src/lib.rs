//! Templated SQL handling
//!
//! This crate handles:
//! - Scanning `{{ ... }}` placeholder blocks and the parameter tokens inside them
//! - Looking up, merging and nesting parameter values
//! - Rendering templates with minijinja (strict undefined handling)

pub mod error;
pub mod placeholder;
pub mod params;
pub mod renderer;

pub use error::TemplateError;
pub use placeholder::{
    get_parameter_tokens, lines_containing, protect_ignored, scan_blocks, token_lines,
    PlaceholderBlock, TemplateLine,
};
pub use params::{
    insert_path, is_bound, lookup, merge_parameters, qualify_table_name, table_binding,
};
pub use renderer::TemplateRenderer;
