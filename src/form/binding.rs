use std::fmt::{Debug, Formatter};
use std::sync::{Arc, PoisonError, RwLock};

use super::controller::{FieldKey, FormError, FormResult};
use super::convert::ConverterRegistry;

/// The widget side of a form field, implemented by the host toolkit.
pub trait FieldHandle: Send + Sync {
    /// Stable identifier used as the field key; `None` means the field cannot join a group.
    fn field_name(&self) -> Option<String>;
    fn text(&self) -> String;
    fn set_text(&self, text: &str);
    fn error(&self) -> Option<String>;
    fn set_error(&self, error: Option<&str>);
    fn label(&self) -> Option<String>;
    fn set_label(&self, label: Option<&str>);
    fn focus(&self) {}
}

/// A dedicated error display placed outside the field itself.
pub trait ErrorTarget: Send + Sync {
    fn show_error(&self, message: &str);
    fn hide_error(&self);
}

#[derive(Clone, Debug, Default)]
struct TextFieldState {
    text: String,
    error: Option<String>,
    label: Option<String>,
    focused: bool,
}

/// In-memory [`FieldHandle`], for headless use and tests.
#[derive(Debug)]
pub struct TextField {
    name: Option<String>,
    state: RwLock<TextFieldState>,
}

impl TextField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            state: RwLock::new(TextFieldState::default()),
        }
    }

    pub fn unnamed() -> Self {
        Self {
            name: None,
            state: RwLock::new(TextFieldState::default()),
        }
    }

    pub fn with_label(self, label: impl Into<String>) -> Self {
        self.write().label = Some(label.into());
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.write().text = text.into();
        self
    }

    pub fn is_focused(&self) -> bool {
        self.read().focused
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TextFieldState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, TextFieldState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FieldHandle for TextField {
    fn field_name(&self) -> Option<String> {
        self.name.clone()
    }

    fn text(&self) -> String {
        self.read().text.clone()
    }

    fn set_text(&self, text: &str) {
        self.write().text = text.to_string();
    }

    fn error(&self) -> Option<String> {
        self.read().error.clone()
    }

    fn set_error(&self, error: Option<&str>) {
        self.write().error = error.map(str::to_string);
    }

    fn label(&self) -> Option<String> {
        self.read().label.clone()
    }

    fn set_label(&self, label: Option<&str>) {
        self.write().label = label.map(str::to_string);
    }

    fn focus(&self) {
        self.write().focused = true;
    }
}

#[derive(Debug, Default)]
pub struct ErrorLabel {
    message: RwLock<Option<String>>,
}

impl ErrorLabel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> Option<String> {
        self.message
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_visible(&self) -> bool {
        self.text().is_some()
    }
}

impl ErrorTarget for ErrorLabel {
    fn show_error(&self, message: &str) {
        *self.message.write().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
    }

    fn hide_error(&self) {
        *self.message.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

pub trait FieldLens<T>: Copy + Send + Sync + 'static {
    type Value: Clone + PartialEq + Send + Sync + 'static;

    fn key(self) -> FieldKey;
    fn get<'a>(self, model: &'a T) -> &'a Self::Value;
    fn set(self, model: &mut T, value: Self::Value);
}

/// A model whose properties map onto group fields by name.
/// Usually derived with `#[derive(FormModel)]`.
pub trait FormModel: Sized + Send + Sync + 'static {
    type Fields;

    fn fields() -> Self::Fields;
    fn binding() -> FormBinding<Self>;
}

type ReadFn<T> = Arc<dyn Fn(&T, &ConverterRegistry) -> FormResult<Option<String>> + Send + Sync>;
type WriteFn<T> =
    Arc<dyn Fn(&mut T, Option<&str>, &ConverterRegistry) -> FormResult<()> + Send + Sync>;

pub(super) struct BindingEntry<T> {
    pub(super) key: FieldKey,
    pub(super) read: ReadFn<T>,
    pub(super) write: WriteFn<T>,
}

impl<T> Clone for BindingEntry<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            read: self.read.clone(),
            write: self.write.clone(),
        }
    }
}

/// Field-to-property table built at setup time.
pub struct FormBinding<T> {
    pub(super) entries: Vec<BindingEntry<T>>,
}

impl<T> Default for FormBinding<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> Clone for FormBinding<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T: 'static> FormBinding<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a property through the registry converter for its type.
    /// A field without an accepted value writes the converter's default.
    pub fn lens<L>(self, lens: L) -> Self
    where
        L: FieldLens<T>,
    {
        let key = lens.key();
        let field = key.clone();
        self.field(
            key,
            move |model: &T, converters: &ConverterRegistry| {
                let converter = converters.require::<L::Value>()?;
                Ok(Some(converter.to_text(lens.get(model))))
            },
            move |model: &mut T, text: Option<&str>, converters: &ConverterRegistry| {
                let converter = converters.require::<L::Value>()?;
                let value = match text {
                    Some(text) => converter
                        .from_text(text)
                        .map_err(|message| conversion_error(&field, message))?,
                    None => converter.default_value(),
                };
                lens.set(model, value);
                Ok(())
            },
        )
    }

    /// Binds an `Option` property; an empty field maps to `None` and back.
    pub fn optional_lens<L, V>(self, lens: L) -> Self
    where
        L: FieldLens<T, Value = Option<V>>,
        V: 'static,
    {
        let key = lens.key();
        let field = key.clone();
        self.field(
            key,
            move |model: &T, converters: &ConverterRegistry| {
                let Some(value) = lens.get(model) else {
                    return Ok(None);
                };
                Ok(Some(converters.require::<V>()?.to_text(value)))
            },
            move |model: &mut T, text: Option<&str>, converters: &ConverterRegistry| {
                let value = match text.filter(|text| !text.is_empty()) {
                    Some(text) => Some(
                        converters
                            .require::<V>()?
                            .from_text(text)
                            .map_err(|message| conversion_error(&field, message))?,
                    ),
                    None => None,
                };
                lens.set(model, value);
                Ok(())
            },
        )
    }

    pub fn field<R, W>(mut self, key: impl Into<FieldKey>, read: R, write: W) -> Self
    where
        R: Fn(&T, &ConverterRegistry) -> FormResult<Option<String>> + Send + Sync + 'static,
        W: Fn(&mut T, Option<&str>, &ConverterRegistry) -> FormResult<()> + Send + Sync + 'static,
    {
        let key = key.into();
        self.entries.retain(|entry| entry.key != key);
        self.entries.push(BindingEntry {
            key,
            read: Arc::new(read),
            write: Arc::new(write),
        });
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.entries.iter().map(|entry| &entry.key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Debug for FormBinding<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| entry.key.as_str()))
            .finish()
    }
}

fn conversion_error(field: &FieldKey, message: String) -> FormError {
    FormError::Conversion {
        field: field.to_string(),
        message,
    }
}
