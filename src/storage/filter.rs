//! Flat predicate filter applied to in-memory `Memory` rows after a
//! listing query. Each field is an optional AND-ed constraint; `None`
//! means "don't filter on this".

use crate::types::{Category, Memory, MemoryType, Scope};

#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub project: Option<String>,
    pub category: Option<Category>,
    pub memory_type: Option<MemoryType>,
    pub min_salience: Option<f32>,
    pub tags_any: Vec<String>,
    pub include_global: bool,
}

impl MemoryFilter {
    pub fn matches(&self, memory: &Memory) -> bool {
        if let Some(project) = &self.project {
            let same_project = memory.project.as_deref() == Some(project.as_str());
            let visible_global = self.include_global && memory.scope == Scope::Global;
            if !same_project && !visible_global {
                return false;
            }
        }
        if let Some(category) = self.category {
            if memory.category != category {
                return false;
            }
        }
        if let Some(memory_type) = self.memory_type {
            if memory.memory_type != memory_type {
                return false;
            }
        }
        if let Some(min_salience) = self.min_salience {
            if memory.salience < min_salience {
                return false;
            }
        }
        if !self.tags_any.is_empty()
            && !self
                .tags_any
                .iter()
                .any(|t| memory.tags.iter().any(|mt| mt.eq_ignore_ascii_case(t)))
        {
            return false;
        }
        true
    }
}
