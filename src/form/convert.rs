use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;

/// Converts a model property to and from the text shown in its field.
pub trait FormConverter<V>: Send + Sync {
    fn to_text(&self, value: &V) -> String;
    fn from_text(&self, text: &str) -> Result<V, String>;
    /// Used when the field holds no accepted value.
    fn default_value(&self) -> V;
}

struct ParseConverter<V> {
    _marker: PhantomData<fn() -> V>,
}

impl<V> ParseConverter<V> {
    fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<V> FormConverter<V> for ParseConverter<V>
where
    V: FromStr + ToString + Default,
    V::Err: Display,
{
    fn to_text(&self, value: &V) -> String {
        value.to_string()
    }

    fn from_text(&self, text: &str) -> Result<V, String> {
        text.trim().parse::<V>().map_err(|error| error.to_string())
    }

    fn default_value(&self) -> V {
        V::default()
    }
}

/// Field text is the value; nothing is trimmed.
struct StringConverter;

impl FormConverter<String> for StringConverter {
    fn to_text(&self, value: &String) -> String {
        value.clone()
    }

    fn from_text(&self, text: &str) -> Result<String, String> {
        Ok(text.to_string())
    }

    fn default_value(&self) -> String {
        String::new()
    }
}

struct BoolConverter;

impl FormConverter<bool> for BoolConverter {
    fn to_text(&self, value: &bool) -> String {
        value.to_string()
    }

    fn from_text(&self, text: &str) -> Result<bool, String> {
        Ok(text.trim().eq_ignore_ascii_case("true"))
    }

    fn default_value(&self) -> bool {
        false
    }
}

struct CharConverter;

impl FormConverter<char> for CharConverter {
    fn to_text(&self, value: &char) -> String {
        value.to_string()
    }

    fn from_text(&self, text: &str) -> Result<char, String> {
        text.chars()
            .next()
            .ok_or_else(|| "empty text has no first character".to_string())
    }

    fn default_value(&self) -> char {
        '\0'
    }
}

struct DecimalConverter;

impl FormConverter<Decimal> for DecimalConverter {
    fn to_text(&self, value: &Decimal) -> String {
        value.normalize().to_string()
    }

    fn from_text(&self, text: &str) -> Result<Decimal, String> {
        Decimal::from_str(&text.trim().replace(',', ".")).map_err(|error| error.to_string())
    }

    fn default_value(&self) -> Decimal {
        Decimal::ZERO
    }
}

/// Converters keyed by target type. Passed explicitly to the group that uses it.
#[derive(Clone)]
pub struct ConverterRegistry {
    converters: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register::<String>(StringConverter);
        registry.register::<bool>(BoolConverter);
        registry.register::<char>(CharConverter);
        registry.register::<i8>(ParseConverter::new());
        registry.register::<i16>(ParseConverter::new());
        registry.register::<i32>(ParseConverter::new());
        registry.register::<i64>(ParseConverter::new());
        registry.register::<u8>(ParseConverter::new());
        registry.register::<u16>(ParseConverter::new());
        registry.register::<u32>(ParseConverter::new());
        registry.register::<u64>(ParseConverter::new());
        registry.register::<usize>(ParseConverter::new());
        registry.register::<f32>(ParseConverter::new());
        registry.register::<f64>(ParseConverter::new());
        registry.register::<Decimal>(DecimalConverter);
        registry
    }
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            converters: HashMap::new(),
        }
    }

    /// Registers or replaces the converter for `V`.
    pub fn register<V: 'static>(&mut self, converter: impl FormConverter<V> + 'static) {
        let converter: Arc<dyn FormConverter<V>> = Arc::new(converter);
        self.converters
            .insert(TypeId::of::<V>(), Arc::new(converter));
    }

    pub fn with<V: 'static>(mut self, converter: impl FormConverter<V> + 'static) -> Self {
        self.register(converter);
        self
    }

    pub fn get<V: 'static>(&self) -> Option<Arc<dyn FormConverter<V>>> {
        self.converters
            .get(&TypeId::of::<V>())
            .and_then(|entry| entry.downcast_ref::<Arc<dyn FormConverter<V>>>())
            .cloned()
    }

    pub fn contains<V: 'static>(&self) -> bool {
        self.converters.contains_key(&TypeId::of::<V>())
    }

    pub(crate) fn require<V: 'static>(
        &self,
    ) -> Result<Arc<dyn FormConverter<V>>, super::FormError> {
        self.get::<V>()
            .ok_or(super::FormError::NoConverter(type_name::<V>()))
    }
}

impl Debug for ConverterRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("converters", &self.converters.len())
            .finish()
    }
}
