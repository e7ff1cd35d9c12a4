mod binding;
mod controller;
mod convert;
mod validation;
mod validators;

#[cfg(test)]
mod tests;

pub use binding::{ErrorLabel, ErrorTarget, FieldHandle, FieldLens, FormBinding, FormModel, TextField};
pub use calminput_form_derive::FormModel;
pub use controller::{
    ChangeOutcome, DEFAULT_DEBOUNCE, FieldKey, FieldMeta, FieldSpec, FormError, FormResult,
    GroupOptions, GroupSnapshot, InputGroup, ListenerId, ValidationTicket,
};
pub use convert::{ConverterRegistry, FormConverter};
pub use validation::{
    AsyncFnValidator, AsyncValidator, BoxedValidationFuture, FieldValues, Message,
    TimeoutValidator, ValidationState, Validator, ValidatorFailure, Validity, async_validator,
};
pub use validators::{
    CompareValidator, CustomValidator, DecimalValidator, EmailValidator, EmptyValidator,
    LengthValidator, NumberValidator, PhoneValidator, RegexValidator,
};
