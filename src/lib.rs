pub mod form;
pub mod i18n;
pub mod input;
pub mod prelude;

#[cfg(test)]
mod test_public_api;

pub use form::{FormError, FormResult, InputGroup};
pub use i18n::{I18nManager, Locale};
