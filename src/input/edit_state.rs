use super::filter::{InputFilter, TextEdit};

/// Text buffer with a caret and an optional selection, addressed in characters.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EditState {
    pub value: String,
    pub caret: usize,
    pub anchor: usize,
    pub selection: Option<(usize, usize)>,
}

impl EditState {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let caret = value.chars().count();
        Self {
            value,
            caret,
            anchor: caret,
            selection: None,
        }
    }

    pub fn with_selection(mut self, start: usize, end: usize) -> Self {
        self.set_selection(start, end);
        self
    }

    pub fn len(&self) -> usize {
        self.value.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn selected_text(&self) -> String {
        let Some((start, end)) = self.selection else {
            return String::new();
        };
        self.value
            .chars()
            .skip(start)
            .take(end.saturating_sub(start))
            .collect()
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
        self.anchor = self.caret;
    }

    pub fn set_caret(&mut self, next_caret: usize, extend: bool) {
        let next_caret = next_caret.min(self.len());
        self.caret = next_caret;
        if extend {
            self.selection = Self::selection_from_anchor(self.anchor, self.caret);
        } else {
            self.clear_selection();
        }
    }

    pub fn set_selection(&mut self, start: usize, end: usize) {
        let len = self.len();
        self.anchor = start.min(len);
        self.caret = end.min(len);
        self.selection = Self::selection_from_anchor(self.anchor, self.caret);
    }

    pub fn move_left(&mut self, extend: bool) {
        if !extend && let Some((start, _)) = self.selection {
            self.set_caret(start, false);
            return;
        }
        self.set_caret(self.caret.saturating_sub(1), extend);
    }

    pub fn move_right(&mut self, extend: bool) {
        if !extend && let Some((_, end)) = self.selection {
            self.set_caret(end, false);
            return;
        }
        self.set_caret((self.caret + 1).min(self.len()), extend);
    }

    /// Range an insertion would replace: the selection, or the empty range at the caret.
    pub fn edit_range(&self) -> (usize, usize) {
        self.selection.unwrap_or((self.caret, self.caret))
    }

    pub fn delete_backward(&mut self) -> bool {
        let Some((start, end)) = self.backward_range() else {
            return false;
        };
        self.replace_char_range(start, end, "");
        true
    }

    pub fn delete_forward(&mut self) -> bool {
        let Some((start, end)) = self.forward_range() else {
            return false;
        };
        self.replace_char_range(start, end, "");
        true
    }

    pub fn insert_text(&mut self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let (start, end) = self.edit_range();
        self.replace_char_range(start, end, text);
        true
    }

    /// Inserts `text` after passing it through `filter`. Returns `false` when
    /// the filter rejected everything and the buffer stayed untouched.
    pub fn insert_filtered(&mut self, text: &str, filter: &dyn InputFilter) -> bool {
        let (start, end) = self.edit_range();
        let replacement = self.filtered(start, end, text, filter);
        if replacement.is_empty() && start == end {
            return false;
        }
        self.replace_char_range(start, end, &replacement);
        true
    }

    pub fn delete_backward_filtered(&mut self, filter: &dyn InputFilter) -> bool {
        let Some((start, end)) = self.backward_range() else {
            return false;
        };
        let replacement = self.filtered(start, end, "", filter);
        self.replace_char_range(start, end, &replacement);
        true
    }

    pub fn delete_forward_filtered(&mut self, filter: &dyn InputFilter) -> bool {
        let Some((start, end)) = self.forward_range() else {
            return false;
        };
        let replacement = self.filtered(start, end, "", filter);
        self.replace_char_range(start, end, &replacement);
        true
    }

    pub fn replace_char_range(&mut self, start: usize, end: usize, insert: &str) {
        let len = self.len();
        let start = start.min(len);
        let end = end.min(len).max(start);
        let byte_start = Self::byte_index_at_char(&self.value, start);
        let byte_end = Self::byte_index_at_char(&self.value, end);
        self.value.replace_range(byte_start..byte_end, insert);
        self.caret = (start + insert.chars().count()).min(self.len());
        self.clear_selection();
    }

    pub fn byte_index_at_char(value: &str, char_index: usize) -> usize {
        value
            .char_indices()
            .nth(char_index)
            .map(|(index, _)| index)
            .unwrap_or(value.len())
    }

    fn filtered(&self, start: usize, end: usize, text: &str, filter: &dyn InputFilter) -> String {
        let edit = TextEdit::new(&self.value, start, end, text);
        filter.filter(&edit).resolve(text)
    }

    fn backward_range(&self) -> Option<(usize, usize)> {
        if let Some(selection) = self.selection {
            return Some(selection);
        }
        (self.caret > 0).then(|| (self.caret - 1, self.caret))
    }

    fn forward_range(&self) -> Option<(usize, usize)> {
        if let Some(selection) = self.selection {
            return Some(selection);
        }
        (self.caret < self.len()).then(|| (self.caret, self.caret + 1))
    }

    fn selection_from_anchor(anchor: usize, caret: usize) -> Option<(usize, usize)> {
        if anchor == caret {
            None
        } else if anchor < caret {
            Some((anchor, caret))
        } else {
            Some((caret, anchor))
        }
    }
}
