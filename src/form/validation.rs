use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{Either, select};
use futures_timer::Delay;

use super::controller::FieldKey;
use crate::i18n::I18nManager;

/// Text shown to the user: either literal or a catalog key resolved at display time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    Text(String),
    Key {
        key: &'static str,
        params: Vec<(&'static str, String)>,
    },
}

impl Message {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn key(key: &'static str) -> Self {
        Self::Key {
            key,
            params: Vec::new(),
        }
    }

    pub fn with_param(self, name: &'static str, value: impl ToString) -> Self {
        match self {
            Self::Key { key, mut params } => {
                params.push((name, value.to_string()));
                Self::Key { key, params }
            }
            text => text,
        }
    }

    pub fn resolve(&self, i18n: &I18nManager) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Key { key, params } => {
                let params = params
                    .iter()
                    .map(|(name, value)| (*name, value.as_str()))
                    .collect::<Vec<_>>();
                i18n.t_with(key, &params)
            }
        }
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidationState {
    Valid,
    Invalid(String),
    Warning(String),
}

impl ValidationState {
    /// Warnings surface a message but never block the form.
    pub fn is_acceptable(&self) -> bool {
        matches!(self, Self::Valid | Self::Warning(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Valid => None,
            Self::Invalid(message) | Self::Warning(message) => Some(message),
        }
    }

    pub fn validity(&self) -> Validity {
        if self.is_acceptable() {
            Validity::Valid
        } else {
            Validity::Invalid
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Validity {
    #[default]
    Unknown,
    Valid,
    Invalid,
}

/// Current text of every field in the group, for cross-field checks.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldValues {
    values: BTreeMap<FieldKey, String>,
}

impl FieldValues {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &str)> {
        self.values.iter().map(|(key, value)| (key, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(FieldKey, String)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (FieldKey, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

pub trait Validator: Send + Sync {
    fn validate(&self, value: &str, fields: &FieldValues) -> Result<(), Message>;

    fn is_warning(&self) -> bool {
        false
    }
}

impl<F> Validator for F
where
    F: Fn(&str, &FieldValues) -> Result<(), Message> + Send + Sync,
{
    fn validate(&self, value: &str, fields: &FieldValues) -> Result<(), Message> {
        (self)(value, fields)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidatorFailure {
    Rejected(Message),
    Error(String),
    TimedOut,
}

impl Display for ValidatorFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidatorFailure::Rejected(message) => write!(f, "value rejected: {message:?}"),
            ValidatorFailure::Error(error) => write!(f, "validator failed: {error}"),
            ValidatorFailure::TimedOut => f.write_str("validator timed out"),
        }
    }
}

impl std::error::Error for ValidatorFailure {}

pub type BoxedValidationFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), ValidatorFailure>> + Send + 'a>>;

pub trait AsyncValidator: Send + Sync {
    type Fut<'a>: Future<Output = Result<(), ValidatorFailure>> + Send + 'a
    where
        Self: 'a;

    fn validate<'a>(&'a self, value: &'a str, fields: &'a FieldValues) -> Self::Fut<'a>;
}

impl<F> AsyncValidator for F
where
    F: for<'a> Fn(&'a str, &'a FieldValues) -> BoxedValidationFuture<'a> + Send + Sync,
{
    type Fut<'a>
        = BoxedValidationFuture<'a>
    where
        Self: 'a;

    fn validate<'a>(&'a self, value: &'a str, fields: &'a FieldValues) -> Self::Fut<'a> {
        (self)(value, fields)
    }
}

/// Adapts a closure over owned inputs, e.g. one that calls a remote service.
pub struct AsyncFnValidator<F> {
    check: F,
}

pub fn async_validator<F, Fut>(check: F) -> AsyncFnValidator<F>
where
    F: Fn(String, FieldValues) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ValidatorFailure>> + Send + 'static,
{
    AsyncFnValidator { check }
}

impl<F, Fut> AsyncValidator for AsyncFnValidator<F>
where
    F: Fn(String, FieldValues) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ValidatorFailure>> + Send + 'static,
{
    type Fut<'a>
        = Fut
    where
        Self: 'a;

    fn validate<'a>(&'a self, value: &'a str, fields: &'a FieldValues) -> Self::Fut<'a> {
        (self.check)(value.to_string(), fields.clone())
    }
}

/// Fails with [`ValidatorFailure::TimedOut`] when the inner validator misses its deadline.
pub struct TimeoutValidator<V> {
    inner: V,
    timeout: Duration,
}

impl<V> TimeoutValidator<V> {
    pub fn new(inner: V, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<V> AsyncValidator for TimeoutValidator<V>
where
    V: AsyncValidator,
{
    type Fut<'a>
        = BoxedValidationFuture<'a>
    where
        Self: 'a;

    fn validate<'a>(&'a self, value: &'a str, fields: &'a FieldValues) -> Self::Fut<'a> {
        Box::pin(async move {
            let check = Box::pin(self.inner.validate(value, fields));
            match select(check, Delay::new(self.timeout)).await {
                Either::Left((result, _)) => result,
                Either::Right(_) => Err(ValidatorFailure::TimedOut),
            }
        })
    }
}

pub(super) type AsyncValidatorFn =
    Arc<dyn Fn(String, FieldValues) -> BoxedValidationFuture<'static> + Send + Sync>;

pub(super) fn erase_async_validator<V>(validator: V) -> AsyncValidatorFn
where
    V: AsyncValidator + 'static,
{
    let validator = Arc::new(validator);
    Arc::new(move |value: String, fields: FieldValues| -> BoxedValidationFuture<'static> {
        let validator = validator.clone();
        Box::pin(async move { validator.validate(&value, &fields).await })
    })
}
