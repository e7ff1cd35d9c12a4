pub const DEFAULT_MASK_CHAR: char = '#';
pub const DEFAULT_PLACEHOLDER_CHAR: char = '_';

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MaskToken {
    Placeholder,
    Literal(char),
}

/// Characters a placeholder position accepts.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum CharClass {
    #[default]
    Digit,
    Letter,
    Alphanumeric,
    Any,
}

impl CharClass {
    pub fn accepts(self, ch: char) -> bool {
        match self {
            CharClass::Digit => ch.is_ascii_digit(),
            CharClass::Letter => ch.is_alphabetic(),
            CharClass::Alphanumeric => ch.is_alphanumeric(),
            CharClass::Any => !ch.is_control(),
        }
    }
}

/// Formats raw input through a fixed literal/placeholder pattern such as `(###) ###-####`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SimpleMaskFormatter {
    mask: String,
    mask_char: char,
    stable_placeholders: bool,
    placeholder_char: char,
    char_class: CharClass,
}

impl SimpleMaskFormatter {
    pub fn new(mask: impl Into<String>) -> Self {
        Self {
            mask: mask.into(),
            mask_char: DEFAULT_MASK_CHAR,
            stable_placeholders: false,
            placeholder_char: DEFAULT_PLACEHOLDER_CHAR,
            char_class: CharClass::Digit,
        }
    }

    pub fn mask_char(mut self, value: char) -> Self {
        self.mask_char = value;
        self
    }

    pub fn stable_placeholders(mut self, value: bool) -> Self {
        self.stable_placeholders = value;
        self
    }

    pub fn placeholder_char(mut self, value: char) -> Self {
        self.placeholder_char = value;
        self
    }

    pub fn char_class(mut self, value: CharClass) -> Self {
        self.char_class = value;
        self
    }

    pub fn mask(&self) -> &str {
        &self.mask
    }

    pub fn tokens(&self) -> Vec<MaskToken> {
        self.mask
            .chars()
            .map(|ch| {
                if ch == self.mask_char {
                    MaskToken::Placeholder
                } else {
                    MaskToken::Literal(ch)
                }
            })
            .collect()
    }

    pub fn placeholder_count(&self) -> usize {
        self.mask.chars().filter(|ch| *ch == self.mask_char).count()
    }

    pub fn format(&self, raw: &str) -> String {
        let mut input = self.data_chars(raw).into_iter();
        let mut out = String::with_capacity(self.mask.len());
        for token in self.tokens() {
            match token {
                MaskToken::Literal(ch) => out.push(ch),
                MaskToken::Placeholder => match input.next() {
                    Some(ch) => out.push(ch),
                    None if self.stable_placeholders => out.push(self.placeholder_char),
                    None => break,
                },
            }
        }
        out
    }

    /// Extracts the data characters from formatted text, dropping literals and filler.
    pub fn unmask(&self, formatted: &str) -> String {
        self.data_chars(formatted)
            .into_iter()
            .take(self.placeholder_count())
            .collect()
    }

    /// True when every placeholder of the mask is filled with data.
    pub fn is_complete(&self, text: &str) -> bool {
        self.data_chars(text).len() >= self.placeholder_count()
    }

    /// Walks `raw` against the mask. A character equal to the literal at the current
    /// mask position is formatting; anything else the char class accepts is data.
    fn data_chars(&self, raw: &str) -> Vec<char> {
        let tokens = self.tokens();
        let mut pos = 0;
        let mut data = Vec::new();
        for ch in raw.chars() {
            match tokens.get(pos) {
                Some(MaskToken::Literal(literal)) if *literal == ch => {
                    pos += 1;
                    continue;
                }
                Some(MaskToken::Placeholder)
                    if self.stable_placeholders && ch == self.placeholder_char =>
                {
                    pos += 1;
                    continue;
                }
                _ => {}
            }
            if self.stable_placeholders && ch == self.placeholder_char {
                continue;
            }
            if !self.char_class.accepts(ch) {
                continue;
            }
            data.push(ch);
            pos = tokens[pos..]
                .iter()
                .position(|token| *token == MaskToken::Placeholder)
                .map_or(tokens.len(), |offset| pos + offset + 1);
        }
        data
    }
}
