pub use crate::form::{
    ChangeOutcome, CompareValidator, ConverterRegistry, CustomValidator, DecimalValidator,
    EmailValidator, EmptyValidator, ErrorLabel, ErrorTarget, FieldHandle, FieldKey, FieldLens,
    FieldSpec, FormBinding, FormConverter, FormError, FormModel, FormResult, GroupOptions,
    InputGroup, LengthValidator, Message, NumberValidator, PhoneValidator, RegexValidator,
    TextField, TimeoutValidator, ValidationState, Validator, ValidatorFailure, Validity,
    async_validator,
};
pub use crate::i18n::{I18nManager, Locale};
pub use crate::input::{
    CharClass, DecimalInputFilter, EditState, FilterChain, FilterDecision, InputFilter,
    LengthFilter, MaskToken, SimpleMaskFormatter, TextEdit,
};
