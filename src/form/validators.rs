use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use rust_decimal::Decimal;

use super::controller::FieldKey;
use super::validation::{FieldValues, Message, Validator};

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^[a-zA-Z0-9+._%\-]{1,256}",
        r"@",
        r"[a-zA-Z0-9][a-zA-Z0-9\-]{0,64}",
        r"(\.[a-zA-Z0-9][a-zA-Z0-9\-]{0,25})+$",
    ))
    .expect("Invalid email regex")
});

static PHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\+[0-9]+[\- .]*)?(\([0-9]+\)[\- .]*)?([0-9][0-9\- .]+[0-9])$")
        .expect("Invalid phone regex")
});

static DECIMAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d*)([.,])?(\d{1,18})$").expect("Invalid decimal regex")
});

/// Adds the `message` / `warning` builders shared by every built-in validator.
macro_rules! impl_validator_meta {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $ty {
                pub fn message(mut self, message: impl Into<Message>) -> Self {
                    self.message = Some(message.into());
                    self
                }

                pub fn warning(mut self, warning: bool) -> Self {
                    self.warning = warning;
                    self
                }

                fn error(&self) -> Message {
                    self.message
                        .clone()
                        .unwrap_or_else(|| self.default_message())
                }
            }
        )+
    };
}

fn check(valid: bool, error: impl FnOnce() -> Message) -> Result<(), Message> {
    if valid { Ok(()) } else { Err(error()) }
}

#[derive(Clone, Debug, Default)]
pub struct EmptyValidator {
    message: Option<Message>,
    warning: bool,
}

impl EmptyValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn default_message(&self) -> Message {
        Message::key("validator.empty")
    }
}

impl Validator for EmptyValidator {
    fn validate(&self, value: &str, _fields: &FieldValues) -> Result<(), Message> {
        check(!value.is_empty(), || self.error())
    }

    fn is_warning(&self) -> bool {
        self.warning
    }
}

/// Character-count bounds. A zero minimum lets the empty string through.
#[derive(Clone, Debug)]
pub struct LengthValidator {
    min: usize,
    max: Option<usize>,
    message: Option<Message>,
    warning: bool,
}

impl LengthValidator {
    pub fn min(min: usize) -> Self {
        Self {
            min,
            max: None,
            message: None,
            warning: false,
        }
    }

    pub fn range(min: usize, max: usize) -> Self {
        Self {
            max: Some(max),
            ..Self::min(min)
        }
    }

    fn default_message(&self) -> Message {
        match self.max {
            Some(max) => Message::key("validator.length.range")
                .with_param("min", self.min)
                .with_param("max", max),
            None => Message::key("validator.length.min").with_param("min", self.min),
        }
    }
}

impl Validator for LengthValidator {
    fn validate(&self, value: &str, _fields: &FieldValues) -> Result<(), Message> {
        if self.min == 0 && value.is_empty() {
            return Ok(());
        }
        let len = value.chars().count();
        check(
            len >= self.min && self.max.is_none_or(|max| len <= max),
            || self.error(),
        )
    }

    fn is_warning(&self) -> bool {
        self.warning
    }
}

/// Whole-value match against a pattern.
#[derive(Clone, Debug)]
pub struct RegexValidator {
    pattern: Regex,
    message: Option<Message>,
    warning: bool,
}

impl RegexValidator {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::from_regex(Regex::new(&format!("^(?:{pattern})$"))?))
    }

    /// Uses `pattern` as is; anchor it yourself if partial matches must fail.
    pub fn from_regex(pattern: Regex) -> Self {
        Self {
            pattern,
            message: None,
            warning: false,
        }
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    fn default_message(&self) -> Message {
        Message::key("validator.regex")
    }
}

impl Validator for RegexValidator {
    fn validate(&self, value: &str, _fields: &FieldValues) -> Result<(), Message> {
        check(self.pattern.is_match(value), || self.error())
    }

    fn is_warning(&self) -> bool {
        self.warning
    }
}

#[derive(Clone, Debug, Default)]
pub struct EmailValidator {
    message: Option<Message>,
    warning: bool,
}

impl EmailValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn default_message(&self) -> Message {
        Message::key("validator.email")
    }
}

impl Validator for EmailValidator {
    fn validate(&self, value: &str, _fields: &FieldValues) -> Result<(), Message> {
        check(EMAIL_REGEX.is_match(value), || self.error())
    }

    fn is_warning(&self) -> bool {
        self.warning
    }
}

#[derive(Clone, Debug, Default)]
pub struct PhoneValidator {
    message: Option<Message>,
    warning: bool,
}

impl PhoneValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn default_message(&self) -> Message {
        Message::key("validator.phone")
    }
}

impl Validator for PhoneValidator {
    fn validate(&self, value: &str, _fields: &FieldValues) -> Result<(), Message> {
        check(PHONE_REGEX.is_match(value), || self.error())
    }

    fn is_warning(&self) -> bool {
        self.warning
    }
}

/// Integer in `[min, max]`; the default range is every non-negative `i64`.
#[derive(Clone, Debug)]
pub struct NumberValidator {
    min: i64,
    max: i64,
    message: Option<Message>,
    warning: bool,
}

impl Default for NumberValidator {
    fn default() -> Self {
        Self::range(0, i64::MAX)
    }
}

impl NumberValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn range(min: i64, max: i64) -> Self {
        Self {
            min,
            max,
            message: None,
            warning: false,
        }
    }

    fn default_message(&self) -> Message {
        Message::key("validator.number")
    }
}

impl Validator for NumberValidator {
    fn validate(&self, value: &str, _fields: &FieldValues) -> Result<(), Message> {
        let parsed = value.parse::<i64>().ok();
        check(
            parsed.is_some_and(|number| (self.min..=self.max).contains(&number)),
            || self.error(),
        )
    }

    fn is_warning(&self) -> bool {
        self.warning
    }
}

/// Decimal with up to 18 fraction digits, `,` or `.` as the point, optionally bounded.
#[derive(Clone, Debug, Default)]
pub struct DecimalValidator {
    min: Option<Decimal>,
    max: Option<Decimal>,
    message: Option<Message>,
    warning: bool,
}

impl DecimalValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: Decimal) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: Decimal) -> Self {
        self.max = Some(max);
        self
    }

    fn default_message(&self) -> Message {
        Message::key("validator.decimal")
    }

    fn in_bounds(&self, value: &str) -> bool {
        if self.min.is_none() && self.max.is_none() {
            return true;
        }
        let Ok(number) = Decimal::from_str(&value.replace(',', ".")) else {
            return false;
        };
        self.min.is_none_or(|min| number >= min) && self.max.is_none_or(|max| number <= max)
    }
}

impl Validator for DecimalValidator {
    fn validate(&self, value: &str, _fields: &FieldValues) -> Result<(), Message> {
        check(DECIMAL_REGEX.is_match(value) && self.in_bounds(value), || {
            self.error()
        })
    }

    fn is_warning(&self) -> bool {
        self.warning
    }
}

#[derive(Clone)]
enum Comparable {
    Value(String),
    Field(FieldKey),
    Lazy(Arc<dyn Fn() -> String + Send + Sync>),
}

/// Equality with a fixed value, another field's current text, or a lazily produced value.
#[derive(Clone)]
pub struct CompareValidator {
    comparable: Comparable,
    message: Option<Message>,
    warning: bool,
}

impl CompareValidator {
    pub fn value(value: impl Into<String>) -> Self {
        Self::with(Comparable::Value(value.into()))
    }

    pub fn field(name: impl Into<FieldKey>) -> Self {
        Self::with(Comparable::Field(name.into()))
    }

    pub fn lazy(source: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self::with(Comparable::Lazy(Arc::new(source)))
    }

    fn with(comparable: Comparable) -> Self {
        Self {
            comparable,
            message: None,
            warning: false,
        }
    }

    fn default_message(&self) -> Message {
        Message::key("validator.compare")
    }
}

impl Validator for CompareValidator {
    fn validate(&self, value: &str, fields: &FieldValues) -> Result<(), Message> {
        let equal = match &self.comparable {
            Comparable::Value(expected) => expected == value,
            Comparable::Field(key) => fields.get(key.as_str()) == Some(value),
            Comparable::Lazy(source) => source() == value,
        };
        check(equal, || self.error())
    }

    fn is_warning(&self) -> bool {
        self.warning
    }
}

/// Wraps a plain predicate.
#[derive(Clone)]
pub struct CustomValidator {
    predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    message: Option<Message>,
    warning: bool,
}

impl CustomValidator {
    pub fn new(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Arc::new(predicate),
            message: None,
            warning: false,
        }
    }

    fn default_message(&self) -> Message {
        Message::key("validator.default")
    }
}

impl Validator for CustomValidator {
    fn validate(&self, value: &str, _fields: &FieldValues) -> Result<(), Message> {
        check((self.predicate)(value), || self.error())
    }

    fn is_warning(&self) -> bool {
        self.warning
    }
}

impl_validator_meta!(
    EmptyValidator,
    LengthValidator,
    RegexValidator,
    EmailValidator,
    PhoneValidator,
    NumberValidator,
    DecimalValidator,
    CompareValidator,
    CustomValidator,
);
