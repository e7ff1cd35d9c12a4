use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

mod catalog {
    pub const DEFAULT_LOCALE: &str = "en-US";

    pub const LOCALES: &[(&str, &[(&str, &str)])] = &[
        (
            "en-US",
            &[
                ("input_group.default_label", "Value"),
                ("input_group.value_required", "{label} is required"),
                ("validator.default", "Incorrect data"),
                ("validator.failed", "Unable to validate value"),
                ("validator.empty", "Value can't be empty"),
                ("validator.compare", "Values are not equals"),
                ("validator.email", "Invalid email"),
                ("validator.phone", "Invalid phone number"),
                ("validator.number", "Invalid number format"),
                ("validator.decimal", "Invalid number"),
                ("validator.regex", "Invalid data format"),
                ("validator.length.min", "Minimum length: {min}"),
                ("validator.length.range", "Minimum length: {min}, maximum: {max}"),
            ],
        ),
        (
            "ru-RU",
            &[
                ("input_group.default_label", "Значение"),
                ("input_group.value_required", "{label}: обязательное поле"),
                ("validator.default", "Некорректные данные"),
                ("validator.failed", "Не удалось проверить значение"),
                ("validator.empty", "Значение не может быть пустым"),
                ("validator.compare", "Значения не совпадают"),
                ("validator.email", "Некорректный email"),
                ("validator.phone", "Некорректный номер телефона"),
                ("validator.number", "Некорректный формат числа"),
                ("validator.decimal", "Некорректное число"),
                ("validator.regex", "Некорректный формат данных"),
                ("validator.length.min", "Минимальная длина: {min}"),
                (
                    "validator.length.range",
                    "Минимальная длина: {min}, максимальная: {max}",
                ),
            ],
        ),
    ];
}

#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub enum Locale {
    #[default]
    System,
    Tag(String),
}

impl From<String> for Locale {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("system") {
            return Self::System;
        }
        Self::Tag(value.trim().to_string())
    }
}

impl From<&str> for Locale {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

/// Resolves message keys against the built-in catalogs and per-app overrides.
#[derive(Clone)]
pub struct I18nManager {
    catalog: Arc<I18nCatalog>,
    locale: Arc<RwLock<Locale>>,
    overrides: Arc<RwLock<HashMap<String, String>>>,
}

impl Default for I18nManager {
    fn default() -> Self {
        Self::new()
    }
}

impl I18nManager {
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(I18nCatalog::load()),
            locale: Arc::new(RwLock::new(Locale::System)),
            overrides: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_locale(locale: impl Into<Locale>) -> Self {
        let manager = Self::new();
        manager.set_locale(locale);
        manager
    }

    pub fn locale(&self) -> Locale {
        self.locale
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_locale(&self, locale: impl Into<Locale>) {
        *self.locale.write().unwrap_or_else(PoisonError::into_inner) = locale.into();
    }

    /// Replaces the template for `key` regardless of the active locale.
    pub fn override_message(&self, key: impl Into<String>, template: impl Into<String>) {
        self.overrides
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), template.into());
    }

    pub fn default_locale(&self) -> &'static str {
        self.catalog.default_locale
    }

    pub fn resolved_locale(&self) -> &'static str {
        self.catalog
            .resolve_locale(self.requested_locale().as_deref())
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    pub fn t(&self, key: &str) -> String {
        self.lookup(key).unwrap_or_else(|| key.to_string())
    }

    pub fn t_with(&self, key: &str, params: &[(&str, &str)]) -> String {
        let template = self.t(key);
        if params.is_empty() {
            return template;
        }
        format_template(&template, params)
    }

    fn requested_locale(&self) -> Option<String> {
        match self.locale() {
            Locale::System => system_locale(),
            Locale::Tag(tag) => Some(tag),
        }
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if let Some(value) = self
            .overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Some(value.clone());
        }
        let resolved = self.resolved_locale();
        self.catalog
            .lookup(resolved, key)
            .or_else(|| self.catalog.lookup(self.catalog.default_locale, key))
            .map(str::to_string)
    }
}

#[cfg(feature = "i18n")]
fn system_locale() -> Option<String> {
    sys_locale::get_locale()
}

#[cfg(not(feature = "i18n"))]
fn system_locale() -> Option<String> {
    None
}

struct I18nCatalog {
    default_locale: &'static str,
    locales: HashMap<&'static str, HashMap<&'static str, &'static str>>,
    normalized_locale_lookup: HashMap<String, &'static str>,
    language_lookup: HashMap<String, &'static str>,
}

impl I18nCatalog {
    fn load() -> Self {
        let mut locales = HashMap::new();
        let mut normalized_locale_lookup = HashMap::new();
        let mut language_lookup = HashMap::new();
        let mut ambiguous_languages = HashSet::new();

        for (locale, entries) in catalog::LOCALES.iter().copied() {
            let normalized = normalize_locale_tag(locale);
            normalized_locale_lookup.insert(normalized.clone(), locale);

            let language = normalized.split('-').next().unwrap_or_default().to_string();
            if let Some(existing) = language_lookup.get(&language) {
                if *existing != locale {
                    ambiguous_languages.insert(language.clone());
                }
            } else {
                language_lookup.insert(language, locale);
            }

            locales.insert(locale, entries.iter().copied().collect::<HashMap<_, _>>());
        }

        for language in ambiguous_languages {
            language_lookup.remove(&language);
        }

        Self {
            default_locale: catalog::DEFAULT_LOCALE,
            locales,
            normalized_locale_lookup,
            language_lookup,
        }
    }

    fn resolve_locale(&self, requested: Option<&str>) -> &'static str {
        let Some(requested) = requested else {
            return self.default_locale;
        };

        let normalized = normalize_locale_tag(requested);
        if let Some(locale) = self.normalized_locale_lookup.get(&normalized) {
            return locale;
        }

        let language = normalized.split('-').next().unwrap_or_default();
        if let Some(locale) = self.language_lookup.get(language) {
            return locale;
        }

        self.default_locale
    }

    fn lookup(&self, locale: &'static str, key: &str) -> Option<&'static str> {
        self.locales
            .get(locale)
            .and_then(|entries| entries.get(key).copied())
    }
}

fn normalize_locale_tag(tag: &str) -> String {
    let trimmed = tag.trim();
    let without_encoding = trimmed.split('.').next().unwrap_or(trimmed);
    let without_variant = without_encoding
        .split('@')
        .next()
        .unwrap_or(without_encoding);
    without_variant
        .replace('_', "-")
        .split('-')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

pub(crate) fn format_template(template: &str, params: &[(&str, &str)]) -> String {
    let values = params.iter().copied().collect::<HashMap<&str, &str>>();
    let mut output = String::with_capacity(template.len());
    let mut cursor = 0;

    while cursor < template.len() {
        let tail = &template[cursor..];
        let Some(open_rel) = tail.find('{') else {
            output.push_str(tail);
            break;
        };

        let open = cursor + open_rel;
        output.push_str(&template[cursor..open]);

        let token_start = open + 1;
        let Some(close_rel) = template[token_start..].find('}') else {
            output.push_str(&template[open..]);
            break;
        };
        let close = token_start + close_rel;
        let token = &template[token_start..close];

        if let Some(value) = values.get(token) {
            output.push_str(value);
        } else {
            output.push_str(&template[open..=close]);
        }

        cursor = close + 1;
    }

    output
}

#[cfg(test)]
mod tests {
    use super::{I18nManager, Locale};

    #[test]
    fn missing_key_falls_back_to_key() {
        let i18n = I18nManager::with_locale("en-US");
        assert_eq!(i18n.t("demo.only_key"), "demo.only_key");
        assert!(!i18n.has_key("demo.only_key"));
    }

    #[test]
    fn supports_locale_tag_normalization() {
        let i18n = I18nManager::new();
        i18n.set_locale("ru_RU.UTF-8");
        assert_eq!(i18n.resolved_locale(), "ru-RU");
        assert_eq!(i18n.t("validator.compare"), "Значения не совпадают");

        i18n.set_locale("ru");
        assert_eq!(i18n.resolved_locale(), "ru-RU");

        i18n.set_locale("de-DE");
        assert_eq!(i18n.resolved_locale(), i18n.default_locale());
    }

    #[test]
    fn supports_placeholder_interpolation() {
        let i18n = I18nManager::with_locale("en-US");
        assert_eq!(
            i18n.t_with("validator.length.range", &[("min", "1"), ("max", "4")]),
            "Minimum length: 1, maximum: 4"
        );
        assert_eq!(
            i18n.t_with("input_group.value_required", &[("other", "x")]),
            "{label} is required"
        );
    }

    #[test]
    fn overrides_win_over_catalog() {
        let i18n = I18nManager::with_locale("ru-RU");
        i18n.override_message("input_group.value_required", "Fill in {label}");
        assert_eq!(
            i18n.t_with("input_group.value_required", &[("label", "Email")]),
            "Fill in Email"
        );
    }

    #[test]
    fn system_keyword_maps_to_system_locale() {
        assert_eq!(Locale::from(" System "), Locale::System);
        assert_eq!(Locale::from("en_GB"), Locale::Tag("en_GB".to_string()));
    }
}
