use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// A proposed edit: replace `dest[start..end)` (character offsets) with `source`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TextEdit<'a> {
    pub dest: &'a str,
    pub start: usize,
    pub end: usize,
    pub source: &'a str,
}

impl<'a> TextEdit<'a> {
    pub fn new(dest: &'a str, start: usize, end: usize, source: &'a str) -> Self {
        let len = dest.chars().count();
        let start = start.min(len);
        let end = end.min(len).max(start);
        Self {
            dest,
            start,
            end,
            source,
        }
    }

    /// Whole-buffer replacement, as produced by a programmatic set or a select-all paste.
    pub fn replace_all(dest: &'a str, source: &'a str) -> Self {
        Self::new(dest, 0, dest.chars().count(), source)
    }

    pub fn with_source(self, source: &'a str) -> Self {
        Self { source, ..self }
    }

    /// Characters of `dest` left once the replaced range is removed.
    pub fn remaining(&self) -> Vec<char> {
        self.dest
            .chars()
            .enumerate()
            .filter(|(index, _)| *index < self.start || *index >= self.end)
            .map(|(_, ch)| ch)
            .collect()
    }

    /// Buffer contents after applying `replacement` at the edit range.
    pub fn apply(&self, replacement: &str) -> String {
        let mut out = String::with_capacity(self.dest.len() + replacement.len());
        out.extend(self.dest.chars().take(self.start));
        out.push_str(replacement);
        out.extend(self.dest.chars().skip(self.end));
        out
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FilterDecision {
    Accept,
    Replace(String),
}

impl FilterDecision {
    pub fn reject() -> Self {
        Self::Replace(String::new())
    }

    pub fn resolve(self, source: &str) -> String {
        match self {
            FilterDecision::Accept => source.to_string(),
            FilterDecision::Replace(replacement) => replacement,
        }
    }
}

pub trait InputFilter: Send + Sync {
    fn filter(&self, edit: &TextEdit<'_>) -> FilterDecision;
}

impl<F> InputFilter for F
where
    F: Fn(&TextEdit<'_>) -> FilterDecision + Send + Sync,
{
    fn filter(&self, edit: &TextEdit<'_>) -> FilterDecision {
        (self)(edit)
    }
}

/// Caps the buffer length; the source is truncated to whatever still fits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LengthFilter {
    max: usize,
}

impl LengthFilter {
    pub fn new(max: usize) -> Self {
        Self { max }
    }
}

impl InputFilter for LengthFilter {
    fn filter(&self, edit: &TextEdit<'_>) -> FilterDecision {
        let keep = self.max.saturating_sub(edit.remaining().len());
        let source_len = edit.source.chars().count();
        if source_len <= keep {
            return FilterDecision::Accept;
        }
        FilterDecision::Replace(edit.source.chars().take(keep).collect())
    }
}

#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn InputFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: Arc<dyn InputFilter>) {
        self.filters.push(filter);
    }

    pub fn remove(&mut self, filter: &Arc<dyn InputFilter>) -> bool {
        let before = self.filters.len();
        self.filters
            .retain(|candidate| !Arc::ptr_eq(candidate, filter));
        self.filters.len() != before
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Runs every filter in order; each one sees the previous filter's output as its source.
    pub fn apply(&self, edit: &TextEdit<'_>) -> String {
        let mut source = edit.source.to_string();
        for filter in &self.filters {
            let step = edit.with_source(&source);
            source = filter.filter(&step).resolve(&source);
        }
        source
    }
}

impl InputFilter for FilterChain {
    fn filter(&self, edit: &TextEdit<'_>) -> FilterDecision {
        if self.filters.is_empty() {
            return FilterDecision::Accept;
        }
        FilterDecision::Replace(self.apply(edit))
    }
}

impl Debug for FilterChain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.filters.len())
            .finish()
    }
}
