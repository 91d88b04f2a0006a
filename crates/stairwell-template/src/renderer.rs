//! Template rendering with minijinja

use minijinja::{Environment, UndefinedBehavior};
use stairwell_core::Parameters;

use crate::error::TemplateError;
use crate::placeholder::protect_ignored;

/// Renders `{{ expr }}` placeholders from parameter values.
///
/// Undefined values are errors; nothing is silently rendered as empty.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);

        Self { env }
    }

    /// Render `text`, leaving blocks that mention `ignored` parameters verbatim
    pub fn render(
        &self,
        text: &str,
        params: &Parameters,
        ignored: &[String],
    ) -> Result<String, TemplateError> {
        let source = protect_ignored(text, ignored)?;
        Ok(self.env.render_str(&source, params)?)
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}
