use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures::future::{AbortHandle, Abortable, join_all};
use futures_timer::Delay;
use tracing::{debug, warn};

use super::binding::{ErrorTarget, FieldHandle, FormBinding, FormModel};
use super::convert::ConverterRegistry;
use super::validation::{
    AsyncValidator, AsyncValidatorFn, FieldValues, ValidationState, Validator, ValidatorFailure,
    Validity, erase_async_validator,
};
use super::validators::CompareValidator;
use crate::i18n::I18nManager;
use crate::input::{FilterChain, InputFilter, TextEdit};

static LISTENER_ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(Arc<str>);

impl FieldKey {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for FieldKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for FieldKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FieldKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

impl ValidationTicket {
    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ListenerId(pub u64);

impl ListenerId {
    pub fn next() -> Self {
        Self(LISTENER_ID_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

/// Result of a text change once its validation settles.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeOutcome {
    Applied { valid: bool },
    /// A newer change for the same field finished first; this result was dropped.
    Superseded,
    /// A newer change, a reset or a release aborted this one before it settled.
    Cancelled,
}

impl ChangeOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn is_valid(self) -> bool {
        matches!(self, Self::Applied { valid: true })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupOptions {
    /// Quiet period before a text change is validated. Zero validates immediately.
    pub debounce: Duration,
    /// Appended to the label of required fields, e.g. `*`.
    pub required_label_suffix: Option<String>,
}

impl Default for GroupOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            required_label_suffix: None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldMeta {
    pub key: FieldKey,
    pub label: Option<String>,
    pub text: String,
    pub required: bool,
    pub validity: Validity,
    pub message: Option<String>,
    pub warning: bool,
    pub touched: bool,
    pub validating: bool,
    pub related: Option<FieldKey>,
    pub filters: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupSnapshot {
    pub fields: Vec<FieldMeta>,
    pub values: BTreeMap<FieldKey, String>,
    pub is_valid: bool,
}

impl GroupSnapshot {
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|meta| meta.key.as_str() == name)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FormError {
    StatePoisoned(&'static str),
    MissingFieldName,
    UnknownField(String),
    DuplicateField(String),
    Released,
    NoConverter(&'static str),
    Conversion { field: String, message: String },
}

impl Display for FormError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormError::StatePoisoned(context) => {
                write!(f, "input group state lock poisoned while {context}")
            }
            FormError::MissingFieldName => f.write_str("input field has no field name"),
            FormError::UnknownField(name) => write!(f, "input with name {name} not found"),
            FormError::DuplicateField(name) => {
                write!(f, "input with name {name} is already registered")
            }
            FormError::Released => f.write_str("input group has been released"),
            FormError::NoConverter(type_name) => write!(f, "no converter found for type {type_name}"),
            FormError::Conversion { field, message } => {
                write!(f, "failed to convert value of {field}: {message}")
            }
        }
    }
}

impl std::error::Error for FormError {}

pub type FormResult<T> = Result<T, FormError>;

type FormValidateListener = Arc<dyn Fn(bool) + Send + Sync>;
type TextChangedListener = Arc<dyn Fn(&str, &str, bool) + Send + Sync>;

/// Registration data for one field.
pub struct FieldSpec {
    key: Option<FieldKey>,
    label: Option<String>,
    text: Option<String>,
    required: bool,
    validators: Vec<Arc<dyn Validator>>,
    async_validators: Vec<AsyncValidatorFn>,
    handle: Option<Arc<dyn FieldHandle>>,
    error_target: Option<Arc<dyn ErrorTarget>>,
    filters: FilterChain,
}

impl FieldSpec {
    pub fn new(name: impl Into<FieldKey>) -> Self {
        Self::with_key(Some(name.into()))
    }

    /// Takes the key, label and text from the host field.
    pub fn from_handle(handle: Arc<dyn FieldHandle>) -> Self {
        let key = handle.field_name().map(FieldKey::from);
        Self::with_key(key).handle(handle)
    }

    fn with_key(key: Option<FieldKey>) -> Self {
        Self {
            key,
            label: None,
            text: None,
            required: false,
            validators: Vec::new(),
            async_validators: Vec::new(),
            handle: None,
            error_target: None,
            filters: FilterChain::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn validators(mut self, validators: impl IntoIterator<Item = Arc<dyn Validator>>) -> Self {
        self.validators.extend(validators);
        self
    }

    pub fn async_validator(mut self, validator: impl AsyncValidator + 'static) -> Self {
        self.async_validators.push(erase_async_validator(validator));
        self
    }

    pub fn handle(mut self, handle: Arc<dyn FieldHandle>) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn error_target(mut self, target: Arc<dyn ErrorTarget>) -> Self {
        self.error_target = Some(target);
        self
    }

    pub fn filter(mut self, filter: Arc<dyn InputFilter>) -> Self {
        self.filters.push(filter);
        self
    }
}

struct FieldEntry {
    key: FieldKey,
    text: String,
    label: Option<String>,
    validators: Vec<Arc<dyn Validator>>,
    async_validators: Vec<AsyncValidatorFn>,
    required: bool,
    handle: Option<Arc<dyn FieldHandle>>,
    error_target: Option<Arc<dyn ErrorTarget>>,
    validity: Validity,
    message: Option<String>,
    warning: bool,
    touched: bool,
    validating: bool,
    related: Option<FieldKey>,
    filters: FilterChain,
}

impl FieldEntry {
    fn presenter(&self) -> Presenter {
        Presenter {
            handle: self.handle.clone(),
            error_target: self.error_target.clone(),
        }
    }

    fn meta(&self) -> FieldMeta {
        FieldMeta {
            key: self.key.clone(),
            label: self.label.clone(),
            text: self.text.clone(),
            required: self.required,
            validity: self.validity,
            message: self.message.clone(),
            warning: self.warning,
            touched: self.touched,
            validating: self.validating,
            related: self.related.clone(),
            filters: self.filters.len(),
        }
    }

    fn counts_as_valid(&self) -> bool {
        if self.required {
            self.validity == Validity::Valid
        } else {
            self.validity != Validity::Invalid
        }
    }
}

#[derive(Default)]
struct GroupState {
    fields: Vec<FieldEntry>,
    values: BTreeMap<FieldKey, String>,
    tickets: HashMap<FieldKey, ValidationTicket>,
    in_flight: HashMap<FieldKey, AbortHandle>,
    released: bool,
}

impl GroupState {
    fn live(&self) -> FormResult<()> {
        if self.released {
            Err(FormError::Released)
        } else {
            Ok(())
        }
    }

    fn field(&self, name: &str) -> FormResult<&FieldEntry> {
        self.live()?;
        self.fields
            .iter()
            .find(|entry| entry.key.as_str() == name)
            .ok_or_else(|| FormError::UnknownField(name.to_string()))
    }

    fn field_mut(&mut self, name: &str) -> FormResult<&mut FieldEntry> {
        self.live()?;
        self.fields
            .iter_mut()
            .find(|entry| entry.key.as_str() == name)
            .ok_or_else(|| FormError::UnknownField(name.to_string()))
    }

    fn field_values(&self) -> FieldValues {
        self.fields
            .iter()
            .map(|entry| (entry.key.clone(), entry.text.clone()))
            .collect()
    }

    fn is_valid(&self) -> bool {
        self.fields.iter().all(FieldEntry::counts_as_valid)
    }

    fn ticket(&self, key: &FieldKey) -> ValidationTicket {
        self.tickets.get(key).copied().unwrap_or_default()
    }
}

#[derive(Default)]
struct Listeners {
    form_validate: Vec<(ListenerId, FormValidateListener)>,
    text_changed: Vec<(ListenerId, TextChangedListener)>,
}

/// Where a field's error is displayed: the dedicated target if any, else the field itself.
#[derive(Clone)]
struct Presenter {
    handle: Option<Arc<dyn FieldHandle>>,
    error_target: Option<Arc<dyn ErrorTarget>>,
}

impl Presenter {
    fn show(&self, key: &FieldKey, message: Option<&str>) {
        if let Some(target) = &self.error_target {
            match message {
                Some(message) => target.show_error(message),
                None => target.hide_error(),
            }
        } else if let Some(handle) = &self.handle {
            handle.set_error(message);
        } else if let Some(message) = message {
            debug!(field = %key, message, "field has no error display");
        }
    }
}

struct ValidationPlan {
    key: FieldKey,
    value: String,
    required: bool,
    label: Option<String>,
    validators: Vec<Arc<dyn Validator>>,
    async_validators: Vec<AsyncValidatorFn>,
    fields: FieldValues,
}

impl ValidationPlan {
    async fn run(self, i18n: &I18nManager) -> ValidationState {
        if self.value.is_empty() {
            if !self.required {
                return ValidationState::Valid;
            }
            let label = self
                .label
                .unwrap_or_else(|| i18n.t("input_group.default_label"));
            return ValidationState::Invalid(
                i18n.t_with("input_group.value_required", &[("label", label.as_str())]),
            );
        }

        let mut warning = None;
        for validator in &self.validators {
            let Err(message) = validator.validate(&self.value, &self.fields) else {
                continue;
            };
            let message = message.resolve(i18n);
            if !validator.is_warning() {
                return ValidationState::Invalid(message);
            }
            warning.get_or_insert(message);
        }

        for validator in &self.async_validators {
            match validator(self.value.clone(), self.fields.clone()).await {
                Ok(()) => {}
                Err(ValidatorFailure::Rejected(message)) => {
                    return ValidationState::Invalid(message.resolve(i18n));
                }
                Err(failure) => {
                    warn!(field = %self.key, error = %failure, "async validator failed");
                    return ValidationState::Invalid(i18n.t("validator.failed"));
                }
            }
        }

        warning.map_or(ValidationState::Valid, ValidationState::Warning)
    }
}

struct Settled {
    presenter: Presenter,
    message: Option<String>,
    valid: bool,
    related: Option<FieldKey>,
}

/// What a settled validation writes besides the field state.
enum Record<'a> {
    State,
    /// Text of a related-field re-check.
    Value(&'a str),
    /// Text of the change that owns the field's in-flight slot.
    Change(&'a str),
}

enum Finish {
    Applied(Settled),
    Stale,
    Released,
}

/// Owns a set of named fields, validates their text and aggregates form validity.
#[derive(Clone)]
pub struct InputGroup {
    options: GroupOptions,
    i18n: I18nManager,
    converters: Arc<ConverterRegistry>,
    state: Arc<RwLock<GroupState>>,
    listeners: Arc<RwLock<Listeners>>,
}

impl Default for InputGroup {
    fn default() -> Self {
        Self::new(GroupOptions::default())
    }
}

impl InputGroup {
    pub fn new(options: GroupOptions) -> Self {
        Self::with_context(options, I18nManager::new(), ConverterRegistry::default())
    }

    pub fn with_context(
        options: GroupOptions,
        i18n: I18nManager,
        converters: ConverterRegistry,
    ) -> Self {
        Self {
            options,
            i18n,
            converters: Arc::new(converters),
            state: Arc::new(RwLock::new(GroupState::default())),
            listeners: Arc::new(RwLock::new(Listeners::default())),
        }
    }

    pub fn options(&self) -> &GroupOptions {
        &self.options
    }

    pub fn i18n(&self) -> &I18nManager {
        &self.i18n
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn add(&self, spec: FieldSpec) -> FormResult<()> {
        let key = spec
            .key
            .filter(|key| !key.as_str().is_empty())
            .ok_or(FormError::MissingFieldName)?;
        let text = match (spec.text, &spec.handle) {
            (Some(text), _) => text,
            (None, Some(handle)) => handle.text(),
            (None, None) => String::new(),
        };
        let label = spec
            .label
            .or_else(|| spec.handle.as_ref().and_then(|handle| handle.label()));
        let handle = spec.handle.clone();

        {
            let mut state = write_lock(&self.state, "registering field")?;
            state.live()?;
            if state.fields.iter().any(|entry| entry.key == key) {
                return Err(FormError::DuplicateField(key.to_string()));
            }
            state.tickets.insert(key.clone(), ValidationTicket::default());
            state.fields.push(FieldEntry {
                key: key.clone(),
                text,
                label,
                validators: spec.validators,
                async_validators: spec.async_validators,
                required: spec.required,
                handle: spec.handle,
                error_target: spec.error_target,
                validity: Validity::Unknown,
                message: None,
                warning: false,
                touched: false,
                validating: false,
                related: None,
                filters: spec.filters,
            });
        }

        if spec.required
            && let Some(handle) = &handle
        {
            self.update_label_suffix(handle.as_ref(), true);
        }
        debug!(field = %key, required = spec.required, "field registered");
        Ok(())
    }

    /// Registers a host field; its name becomes the field key.
    pub fn add_input(
        &self,
        handle: Arc<dyn FieldHandle>,
        validators: Vec<Arc<dyn Validator>>,
        required: bool,
        error_target: Option<Arc<dyn ErrorTarget>>,
    ) -> FormResult<()> {
        let mut spec = FieldSpec::from_handle(handle)
            .validators(validators)
            .required(required);
        if let Some(target) = error_target {
            spec = spec.error_target(target);
        }
        self.add(spec)
    }

    pub fn add_field(
        &self,
        name: impl Into<FieldKey>,
        validators: Vec<Arc<dyn Validator>>,
        required: bool,
    ) -> FormResult<()> {
        self.add(
            FieldSpec::new(name)
                .validators(validators)
                .required(required),
        )
    }

    pub fn add_validator(&self, name: &str, validator: impl Validator + 'static) -> FormResult<()> {
        let mut state = write_lock(&self.state, "adding validator")?;
        state.field_mut(name)?.validators.push(Arc::new(validator));
        Ok(())
    }

    pub fn add_async_validator(
        &self,
        name: &str,
        validator: impl AsyncValidator + 'static,
    ) -> FormResult<()> {
        let mut state = write_lock(&self.state, "adding async validator")?;
        state
            .field_mut(name)?
            .async_validators
            .push(erase_async_validator(validator));
        Ok(())
    }

    /// Makes two fields equal-valued partners; editing either re-validates the other.
    pub fn add_validate_relation(&self, first: &str, second: &str) -> FormResult<()> {
        let mut state = write_lock(&self.state, "adding validate relation")?;
        let first_key = state.field(first)?.key.clone();
        let second_key = state.field(second)?.key.clone();

        let entry = state.field_mut(first)?;
        entry
            .validators
            .push(Arc::new(CompareValidator::field(second_key.clone())));
        entry.related = Some(second_key.clone());

        let entry = state.field_mut(second)?;
        entry
            .validators
            .push(Arc::new(CompareValidator::field(first_key.clone())));
        entry.related = Some(first_key);
        Ok(())
    }

    pub async fn set_input_required(&self, name: &str, required: bool) -> FormResult<bool> {
        let handle = {
            let mut state = write_lock(&self.state, "changing required flag")?;
            let entry = state.field_mut(name)?;
            entry.required = required;
            entry.validity = if required {
                Validity::Unknown
            } else {
                Validity::Valid
            };
            entry.handle.clone()
        };
        if let Some(handle) = handle {
            self.update_label_suffix(handle.as_ref(), required);
        }
        self.validate_field(name, true).await
    }

    pub fn add_filter(&self, name: &str, filter: Arc<dyn InputFilter>) -> FormResult<()> {
        let mut state = write_lock(&self.state, "adding input filter")?;
        state.field_mut(name)?.filters.push(filter);
        Ok(())
    }

    pub fn remove_filter(&self, name: &str, filter: &Arc<dyn InputFilter>) -> FormResult<bool> {
        let mut state = write_lock(&self.state, "removing input filter")?;
        Ok(state.field_mut(name)?.filters.remove(filter))
    }

    pub fn remove_all_filters(&self, name: &str) -> FormResult<()> {
        let mut state = write_lock(&self.state, "clearing input filters")?;
        state.field_mut(name)?.filters.clear();
        Ok(())
    }

    /// Replaces `range` (character offsets) of the field text with `source` after the
    /// field's filters have seen it. Returns the new text; nothing is validated.
    pub fn apply_edit(&self, name: &str, range: Range<usize>, source: &str) -> FormResult<String> {
        let (text, handle) = {
            let mut state = write_lock(&self.state, "applying edit")?;
            let entry = state.field_mut(name)?;
            let text = {
                let edit = TextEdit::new(&entry.text, range.start, range.end, source);
                edit.apply(&entry.filters.apply(&edit))
            };
            entry.text = text.clone();
            (text, entry.handle.clone())
        };
        if let Some(handle) = handle {
            handle.set_text(&text);
        }
        Ok(text)
    }

    pub async fn edit(
        &self,
        name: &str,
        range: Range<usize>,
        source: &str,
    ) -> FormResult<ChangeOutcome> {
        let text = self.apply_edit(name, range, source)?;
        self.on_input_changed(name, text).await
    }

    /// Debounced validation of a new field text. A newer change to the same field
    /// aborts this one; only the latest change updates the field. The related field,
    /// if any, is re-checked and its accepted value recorded as well.
    pub async fn on_input_changed(
        &self,
        name: &str,
        value: impl Into<String>,
    ) -> FormResult<ChangeOutcome> {
        let value = value.into();
        let (key, ticket, registration) = {
            let mut state = write_lock(&self.state, "starting input change")?;
            let entry = state.field_mut(name)?;
            entry.text = value.clone();
            entry.touched = true;
            let key = entry.key.clone();
            let ticket = state.ticket(&key).next();
            state.tickets.insert(key.clone(), ticket);
            let (abort, registration) = AbortHandle::new_pair();
            if let Some(previous) = state.in_flight.insert(key.clone(), abort) {
                previous.abort();
            }
            (key, ticket, registration)
        };

        let debounce = self.options.debounce;
        let task = async {
            if !debounce.is_zero() {
                Delay::new(debounce).await;
            }
            let plan = self.plan(&key)?;
            Ok::<_, FormError>(plan.run(&self.i18n).await)
        };
        let result = match Abortable::new(task, registration).await {
            Ok(result) => result?,
            Err(_aborted) => {
                debug!(field = %key, ticket = ticket.0, "input change cancelled");
                return Ok(ChangeOutcome::Cancelled);
            }
        };

        let settled = match self.finish(&key, ticket, Record::Change(&value), result)? {
            Finish::Applied(settled) => settled,
            Finish::Stale => {
                debug!(field = %key, ticket = ticket.0, "stale validation result dropped");
                return Ok(ChangeOutcome::Superseded);
            }
            Finish::Released => return Ok(ChangeOutcome::Cancelled),
        };
        settled.presenter.show(&key, settled.message.as_deref());

        if let Some(related) = &settled.related {
            self.check_field(related.as_str(), false, true).await?;
        }
        self.notify_text_changed(&key, &value, settled.valid)?;
        self.notify_form_validity()?;
        Ok(ChangeOutcome::Applied {
            valid: settled.valid,
        })
    }

    /// Re-checks one field against its current text, without debounce.
    pub async fn validate_field(&self, name: &str, notify: bool) -> FormResult<bool> {
        self.check_field(name, notify, false).await
    }

    async fn check_field(&self, name: &str, notify: bool, record_value: bool) -> FormResult<bool> {
        let (key, ticket) = {
            let state = read_lock(&self.state, "reading validation ticket")?;
            let key = state.field(name)?.key.clone();
            let ticket = state.ticket(&key);
            (key, ticket)
        };
        let plan = self.plan(&key)?;
        let text = plan.value.clone();
        let result = plan.run(&self.i18n).await;
        let record = if record_value {
            Record::Value(&text)
        } else {
            Record::State
        };
        let valid = match self.finish(&key, ticket, record, result)? {
            Finish::Applied(settled) => {
                settled.presenter.show(&key, settled.message.as_deref());
                settled.valid
            }
            Finish::Stale => {
                read_lock(&self.state, "reading field validity")?
                    .field(name)?
                    .validity
                    != Validity::Invalid
            }
            Finish::Released => return Err(FormError::Released),
        };
        if notify {
            self.notify_form_validity()?;
        }
        Ok(valid)
    }

    /// Re-checks every field; true when none of them is invalid.
    pub async fn validate(&self, notify: bool) -> FormResult<bool> {
        let keys = self.field_keys()?;
        let results = join_all(
            keys.iter()
                .map(|key| self.validate_field(key.as_str(), false)),
        )
        .await;
        let mut all_valid = true;
        for result in results {
            all_valid &= result?;
        }
        if notify {
            self.notify_form_validity()?;
        }
        Ok(all_valid)
    }

    /// Replays every field's current text as a change event.
    pub async fn trigger_changed(&self) -> FormResult<bool> {
        let texts = {
            let state = read_lock(&self.state, "collecting field texts")?;
            state.live()?;
            state
                .fields
                .iter()
                .map(|entry| (entry.key.clone(), entry.text.clone()))
                .collect::<Vec<_>>()
        };
        let outcomes = join_all(
            texts
                .into_iter()
                .map(|(key, text)| async move { self.on_input_changed(key.as_str(), text).await }),
        )
        .await;
        for outcome in outcomes {
            outcome?;
        }
        self.is_valid_form(false)
    }

    pub fn is_valid_form(&self, notify: bool) -> FormResult<bool> {
        let valid = {
            let state = read_lock(&self.state, "reading form validity")?;
            state.live()?;
            state.is_valid()
        };
        if notify {
            self.emit_form_validity(valid)?;
        }
        Ok(valid)
    }

    /// Clears every text, value and error. Required fields fall back to unknown
    /// and therefore block the form until edited again.
    pub fn reset(&self) -> FormResult<()> {
        let cleared = {
            let mut state = write_lock(&self.state, "resetting group")?;
            state.live()?;
            for (_, abort) in state.in_flight.drain() {
                abort.abort();
            }
            for ticket in state.tickets.values_mut() {
                *ticket = ticket.next();
            }
            state.values.clear();
            state
                .fields
                .iter_mut()
                .map(|entry| {
                    entry.text.clear();
                    entry.validity = Validity::Unknown;
                    entry.message = None;
                    entry.warning = false;
                    entry.touched = false;
                    entry.validating = false;
                    (entry.key.clone(), entry.presenter())
                })
                .collect::<Vec<_>>()
        };
        for (key, presenter) in cleared {
            if let Some(handle) = &presenter.handle {
                handle.set_text("");
            }
            presenter.show(&key, None);
        }
        self.notify_form_validity()
    }

    /// Shows an externally produced error (e.g. from a server) without touching validity.
    pub fn set_error(&self, name: &str, error: Option<&str>) -> FormResult<()> {
        let (key, presenter) = {
            let mut state = write_lock(&self.state, "setting field error")?;
            let entry = state.field_mut(name)?;
            entry.message = error.map(str::to_string);
            entry.warning = false;
            (entry.key.clone(), entry.presenter())
        };
        presenter.show(&key, error);
        Ok(())
    }

    pub fn set_error_from(&self, name: &str, error: &dyn std::error::Error) -> FormResult<()> {
        self.set_error(name, Some(&error.to_string()))
    }

    /// Focuses the first invalid field in registration order.
    pub fn focus_first_error(&self) -> FormResult<bool> {
        let handle = {
            let state = read_lock(&self.state, "finding first error")?;
            state.live()?;
            state
                .fields
                .iter()
                .find(|entry| entry.validity == Validity::Invalid)
                .and_then(|entry| entry.handle.clone())
        };
        let Some(handle) = handle else {
            return Ok(false);
        };
        handle.focus();
        Ok(true)
    }

    pub fn snapshot(&self) -> FormResult<GroupSnapshot> {
        let state = read_lock(&self.state, "creating group snapshot")?;
        state.live()?;
        Ok(GroupSnapshot {
            fields: state.fields.iter().map(FieldEntry::meta).collect(),
            values: state.values.clone(),
            is_valid: state.is_valid(),
        })
    }

    pub fn field_meta(&self, name: &str) -> FormResult<FieldMeta> {
        Ok(read_lock(&self.state, "reading field meta")?
            .field(name)?
            .meta())
    }

    pub fn field_keys(&self) -> FormResult<Vec<FieldKey>> {
        let state = read_lock(&self.state, "reading field keys")?;
        state.live()?;
        Ok(state.fields.iter().map(|entry| entry.key.clone()).collect())
    }

    /// Last accepted value of every field that passed validation.
    pub fn values(&self) -> FormResult<BTreeMap<FieldKey, String>> {
        let state = read_lock(&self.state, "reading values")?;
        state.live()?;
        Ok(state.values.clone())
    }

    pub fn value(&self, name: &str) -> FormResult<Option<String>> {
        let state = read_lock(&self.state, "reading value")?;
        state.live()?;
        Ok(state.values.get(name).cloned())
    }

    /// Pre-fills fields without validating them. Unknown keys are skipped.
    pub fn set_values<I, K, V>(&self, values: I) -> FormResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut updated = Vec::new();
        {
            let mut state = write_lock(&self.state, "setting values")?;
            state.live()?;
            for (name, value) in values {
                let name = name.as_ref();
                let value = value.into();
                let Ok(entry) = state.field_mut(name) else {
                    debug!(field = name, "skipping value for unknown field");
                    continue;
                };
                entry.text = value.clone();
                let key = entry.key.clone();
                if let Some(handle) = entry.handle.clone() {
                    updated.push((handle, value.clone()));
                }
                if value.is_empty() {
                    state.values.remove(&key);
                } else {
                    state.values.insert(key, value);
                }
            }
        }
        for (handle, value) in updated {
            handle.set_text(&value);
        }
        Ok(())
    }

    pub fn map_values_from<T: FormModel>(&self, model: &T) -> FormResult<()> {
        self.map_values_from_binding(&T::binding(), model)
    }

    pub fn map_values_into<T: FormModel>(&self, model: &mut T) -> FormResult<()> {
        self.map_values_into_binding(&T::binding(), model)
    }

    /// Builds a model from its default, filled from the accepted values.
    pub fn map_values_to<T: FormModel + Default>(&self) -> FormResult<T> {
        let mut model = T::default();
        self.map_values_into(&mut model)?;
        Ok(model)
    }

    pub fn map_values_from_binding<T>(&self, binding: &FormBinding<T>, model: &T) -> FormResult<()> {
        let known = self.field_keys()?.into_iter().collect::<BTreeSet<_>>();
        let mut values = Vec::with_capacity(binding.entries.len());
        for entry in binding.entries.iter().filter(|entry| known.contains(&entry.key)) {
            let text = (entry.read)(model, &self.converters)?.unwrap_or_default();
            values.push((entry.key.clone(), text));
        }
        self.set_values(values)
    }

    /// Writes accepted values into `model`. A bound field without an accepted value
    /// receives the converter's default (or `None` for optional properties).
    pub fn map_values_into_binding<T>(
        &self,
        binding: &FormBinding<T>,
        model: &mut T,
    ) -> FormResult<()> {
        let (known, values) = {
            let state = read_lock(&self.state, "reading values for mapping")?;
            state.live()?;
            let known = state
                .fields
                .iter()
                .map(|entry| entry.key.clone())
                .collect::<BTreeSet<_>>();
            (known, state.values.clone())
        };
        for entry in binding.entries.iter().filter(|entry| known.contains(&entry.key)) {
            let value = values.get(&entry.key).map(String::as_str);
            (entry.write)(model, value, &self.converters)?;
        }
        Ok(())
    }

    pub fn add_form_validate_listener(
        &self,
        listener: impl Fn(bool) + Send + Sync + 'static,
    ) -> FormResult<ListenerId> {
        read_lock(&self.state, "checking release before adding listener")?.live()?;
        let id = ListenerId::next();
        let listener: FormValidateListener = Arc::new(listener);
        write_lock(&self.listeners, "adding form validate listener")?
            .form_validate
            .push((id, listener));
        Ok(id)
    }

    pub fn remove_form_validate_listener(&self, id: ListenerId) -> FormResult<bool> {
        let mut listeners = write_lock(&self.listeners, "removing form validate listener")?;
        let before = listeners.form_validate.len();
        listeners.form_validate.retain(|(candidate, _)| *candidate != id);
        Ok(listeners.form_validate.len() != before)
    }

    /// The listener receives the field name, its new text and whether it passed.
    pub fn add_text_changed_listener(
        &self,
        listener: impl Fn(&str, &str, bool) + Send + Sync + 'static,
    ) -> FormResult<ListenerId> {
        read_lock(&self.state, "checking release before adding listener")?.live()?;
        let id = ListenerId::next();
        let listener: TextChangedListener = Arc::new(listener);
        write_lock(&self.listeners, "adding text changed listener")?
            .text_changed
            .push((id, listener));
        Ok(id)
    }

    pub fn remove_text_changed_listener(&self, id: ListenerId) -> FormResult<bool> {
        let mut listeners = write_lock(&self.listeners, "removing text changed listener")?;
        let before = listeners.text_changed.len();
        listeners.text_changed.retain(|(candidate, _)| *candidate != id);
        Ok(listeners.text_changed.len() != before)
    }

    /// Aborts pending changes and drops every field and listener. Idempotent.
    pub fn release(&self) -> FormResult<()> {
        {
            let mut state = write_lock(&self.state, "releasing group")?;
            if state.released {
                return Ok(());
            }
            state.released = true;
            for (_, abort) in state.in_flight.drain() {
                abort.abort();
            }
            state.fields.clear();
            state.values.clear();
            state.tickets.clear();
        }
        let mut listeners = write_lock(&self.listeners, "releasing listeners")?;
        listeners.form_validate.clear();
        listeners.text_changed.clear();
        debug!("input group released");
        Ok(())
    }

    pub fn is_released(&self) -> FormResult<bool> {
        Ok(read_lock(&self.state, "reading release flag")?.released)
    }

    fn plan(&self, key: &FieldKey) -> FormResult<ValidationPlan> {
        let mut state = write_lock(&self.state, "planning field validation")?;
        let fields = state.field_values();
        let entry = state.field_mut(key.as_str())?;
        entry.validating = true;
        Ok(ValidationPlan {
            key: entry.key.clone(),
            value: entry.text.clone(),
            required: entry.required,
            label: entry.label.clone(),
            validators: entry.validators.clone(),
            async_validators: entry.async_validators.clone(),
            fields,
        })
    }

    /// Applies a validation result unless a newer change for the field started since.
    fn finish(
        &self,
        key: &FieldKey,
        ticket: ValidationTicket,
        record: Record<'_>,
        result: ValidationState,
    ) -> FormResult<Finish> {
        let mut state = write_lock(&self.state, "finishing field validation")?;
        if state.released {
            return Ok(Finish::Released);
        }
        if state.ticket(key) != ticket {
            return Ok(Finish::Stale);
        }

        let valid = result.is_acceptable();
        let accepted = match record {
            Record::State => None,
            Record::Value(value) => Some(value),
            Record::Change(value) => {
                state.in_flight.remove(key);
                Some(value)
            }
        };
        if let Some(value) = accepted {
            if valid && !value.is_empty() {
                state.values.insert(key.clone(), value.to_string());
            } else {
                state.values.remove(key);
            }
        }

        let entry = state.field_mut(key.as_str())?;
        entry.validating = false;
        entry.validity = result.validity();
        entry.warning = matches!(result, ValidationState::Warning(_));
        entry.message = result.message().map(str::to_string);
        Ok(Finish::Applied(Settled {
            presenter: entry.presenter(),
            message: entry.message.clone(),
            valid,
            related: entry.related.clone(),
        }))
    }

    fn update_label_suffix(&self, handle: &dyn FieldHandle, required: bool) {
        let Some(suffix) = self
            .options
            .required_label_suffix
            .as_deref()
            .filter(|suffix| !suffix.trim().is_empty())
        else {
            return;
        };
        let Some(label) = handle.label() else {
            return;
        };
        if required && !label.contains(suffix) {
            handle.set_label(Some(&format!("{label} {suffix}")));
        } else if !required && label.contains(suffix) {
            handle.set_label(Some(&label.replace(&format!(" {suffix}"), "")));
        }
    }

    fn notify_text_changed(&self, key: &FieldKey, value: &str, valid: bool) -> FormResult<()> {
        let listeners = read_lock(&self.listeners, "reading text changed listeners")?
            .text_changed
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect::<Vec<_>>();
        for listener in listeners {
            listener(key.as_str(), value, valid);
        }
        Ok(())
    }

    fn notify_form_validity(&self) -> FormResult<()> {
        let valid = {
            let state = read_lock(&self.state, "reading form validity for listeners")?;
            if state.released {
                return Ok(());
            }
            state.is_valid()
        };
        self.emit_form_validity(valid)
    }

    fn emit_form_validity(&self, valid: bool) -> FormResult<()> {
        let listeners = read_lock(&self.listeners, "reading form validate listeners")?
            .form_validate
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect::<Vec<_>>();
        for listener in listeners {
            listener(valid);
        }
        Ok(())
    }
}

pub(super) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(super) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}
