use std::ops::Range;

use super::filter::{FilterDecision, InputFilter, TextEdit};

pub const DEFAULT_FRACTION_DIGITS: usize = 18;

/// Keeps a text buffer a valid partial or complete decimal number.
///
/// The filter is stateless: every call looks only at the current buffer and the
/// proposed edit. Rejected input yields an empty replacement.
///
/// Input that replaces the whole buffer (paste over everything, programmatic
/// set) is processed as if it had been typed one character at a time, so the
/// typed and pasted paths always agree. Multi-character input pasted into the
/// middle of an existing value loses its dots and is truncated to the fraction
/// digits still available.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DecimalInputFilter {
    max_fraction_digits: Option<usize>,
}

impl Default for DecimalInputFilter {
    fn default() -> Self {
        Self::new(DEFAULT_FRACTION_DIGITS)
    }
}

/// Outcome of feeding one normalized character into the buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Step {
    Reject,
    Insert(char),
    /// A leading `0` or `.` on a dot-less buffer becomes `0.`.
    LeadingZero,
    /// A digit typed after a lone `0` gets the implied point: `.d`.
    PointThen(char),
}

impl Step {
    fn push_into(self, buffer: &mut Vec<char>, cursor: usize, out: &mut String) -> usize {
        let inserted: &[char] = match self {
            Step::Reject => &[],
            Step::Insert(ch) => &[ch],
            Step::LeadingZero => &['0', '.'],
            Step::PointThen(ch) => &['.', ch],
        };
        for (offset, ch) in inserted.iter().enumerate() {
            buffer.insert(cursor + offset, *ch);
            out.push(*ch);
        }
        inserted.len()
    }
}

impl DecimalInputFilter {
    pub fn new(max_fraction_digits: usize) -> Self {
        Self {
            max_fraction_digits: Some(max_fraction_digits),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            max_fraction_digits: None,
        }
    }

    /// Builds the filter from a signed limit where `-1` means unlimited.
    pub fn from_signed(max_fraction_digits: i32) -> Self {
        match usize::try_from(max_fraction_digits) {
            Ok(limit) => Self::new(limit),
            Err(_) => Self::unlimited(),
        }
    }

    pub fn max_fraction_digits(&self) -> Option<usize> {
        self.max_fraction_digits
    }

    /// Computes the text to insert in place of `source` at `range` of `current`.
    ///
    /// Returns `None` when there is no proposal at all.
    pub fn filter_text(
        &self,
        current: &str,
        range: Range<usize>,
        source: Option<&str>,
    ) -> Option<String> {
        let source = source?;
        let edit = TextEdit::new(current, range.start, range.end, source);
        Some(self.replacement(&edit))
    }

    /// Filters `raw` as if it replaced an empty buffer.
    pub fn sanitize(&self, raw: &str) -> String {
        self.replacement(&TextEdit::replace_all("", raw))
    }

    fn replacement(&self, edit: &TextEdit<'_>) -> String {
        let mut buffer = edit.remaining();
        let bulk = buffer.is_empty();
        let mut typed = edit
            .source
            .chars()
            .filter_map(normalize_char)
            .collect::<Vec<_>>();
        if !bulk && typed.len() > 1 {
            typed.retain(|ch| *ch != '.');
        }

        let mut out = String::with_capacity(typed.len() + 1);
        let mut cursor = edit.start;
        for ch in typed {
            let step = self.step(&buffer, cursor, ch);
            cursor += step.push_into(&mut buffer, cursor, &mut out);
        }
        out
    }

    fn step(&self, buffer: &[char], cursor: usize, ch: char) -> Step {
        let len = buffer.len();
        let dot = buffer.iter().position(|c| *c == '.');

        if let Some(dot) = dot
            && cursor > dot
            && !self.fits_fraction(len - dot)
        {
            return Step::Reject;
        }

        let lone_zero = buffer == ['0'];
        let zero_integer = dot == Some(1) && buffer[0] == '0';

        match ch {
            '.' => {
                if dot.is_some() || self.max_fraction_digits == Some(0) {
                    Step::Reject
                } else if cursor == 0 {
                    self.leading_zero(len)
                } else if self.fits_fraction(len - cursor) {
                    Step::Insert('.')
                } else {
                    Step::Reject
                }
            }
            '0' => {
                if cursor == 0 {
                    if dot.is_some() {
                        Step::Reject
                    } else if self.max_fraction_digits == Some(0) {
                        if len == 0 {
                            Step::Insert('0')
                        } else {
                            Step::Reject
                        }
                    } else {
                        self.leading_zero(len)
                    }
                } else if zero_integer && cursor <= 1 {
                    Step::Reject
                } else if lone_zero {
                    self.point_then('0')
                } else {
                    Step::Insert('0')
                }
            }
            digit => {
                if lone_zero {
                    if cursor == 1 {
                        self.point_then(digit)
                    } else {
                        Step::Reject
                    }
                } else if zero_integer && cursor <= 1 {
                    Step::Reject
                } else {
                    Step::Insert(digit)
                }
            }
        }
    }

    /// `0.` in front of `len` existing characters, which all become fraction digits.
    fn leading_zero(&self, len: usize) -> Step {
        if self.max_fraction_digits == Some(0) || !self.fits_fraction(len) {
            Step::Reject
        } else {
            Step::LeadingZero
        }
    }

    fn point_then(&self, digit: char) -> Step {
        if self.fits_fraction(1) {
            Step::PointThen(digit)
        } else {
            Step::Reject
        }
    }

    fn fits_fraction(&self, digits: usize) -> bool {
        self.max_fraction_digits.is_none_or(|limit| digits <= limit)
    }
}

fn normalize_char(ch: char) -> Option<char> {
    match ch {
        '0'..='9' | '.' => Some(ch),
        ',' => Some('.'),
        _ => None,
    }
}

impl InputFilter for DecimalInputFilter {
    fn filter(&self, edit: &TextEdit<'_>) -> FilterDecision {
        FilterDecision::Replace(self.replacement(edit))
    }
}
