//! Matching templates against mapping entries

use stairwell_core::{MappingConfig, TableDeclaration};

use crate::template::Template;

/// Resolves which declared tables a template defines
pub struct MappingResolver<'a> {
    mapping: &'a MappingConfig,
}

impl<'a> MappingResolver<'a> {
    pub fn new(mapping: &'a MappingConfig) -> Self {
        Self { mapping }
    }

    /// Tables declared by every entry matching `template`, in configured order
    pub fn mapped_tables<'t>(
        &self,
        template: &'t Template,
    ) -> impl Iterator<Item = &'a TableDeclaration> + 't
    where
        'a: 't,
    {
        let mapping = self.mapping;
        mapping
            .mapping
            .iter()
            .filter(move |entry| {
                entry.source_type == template.source_type()
                    && entry.rule.matches(template.key(), template.uri())
            })
            .flat_map(|entry| entry.tables.iter())
    }

    /// True when at least one table is declared for `template`
    pub fn is_mapped(&self, template: &Template) -> bool {
        self.mapped_tables(template).next().is_some()
    }
}
