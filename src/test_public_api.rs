use std::sync::Arc;
use std::time::Duration;

use futures::executor::block_on;
use rust_decimal::Decimal;

#[derive(Clone, Debug, Default, PartialEq, crate::form::FormModel)]
struct Payment {
    amount: Decimal,
    #[form(rename = "cardHolder")]
    card_holder: String,
    comment: Option<String>,
}

#[test]
fn prelude_exports_group_building_blocks() {
    use crate::prelude::*;

    let group = InputGroup::with_context(
        GroupOptions {
            debounce: Duration::ZERO,
            required_label_suffix: None,
        },
        I18nManager::with_locale("en-US"),
        ConverterRegistry::default(),
    );
    let amount_filter: Arc<dyn InputFilter> = Arc::new(DecimalInputFilter::new(2));
    group
        .add(
            FieldSpec::new("amount")
                .required(true)
                .validator(DecimalValidator::new().min(Decimal::ONE))
                .filter(amount_filter),
        )
        .expect("amount");
    group
        .add(FieldSpec::new("cardHolder").validator(LengthValidator::min(2)))
        .expect("card holder");
    group.add(FieldSpec::new("comment")).expect("comment");

    let outcome = block_on(group.edit("amount", 0..0, "0,5")).expect("edit");
    assert_eq!(outcome, ChangeOutcome::Applied { valid: false });
    let outcome = block_on(group.edit("amount", 0..3, "25.5")).expect("edit");
    assert_eq!(outcome, ChangeOutcome::Applied { valid: true });
    block_on(group.on_input_changed("cardHolder", "Neo")).expect("change");

    let payment: Payment = group.map_values_to().expect("model");
    assert_eq!(payment.amount, Decimal::new(255, 1));
    assert_eq!(payment.card_holder, "Neo");
    assert_eq!(payment.comment, None);
    assert!(group.is_valid_form(false).expect("validity"));
}

#[test]
fn root_reexports_cover_common_entry_points() {
    let group = crate::InputGroup::default();
    assert_eq!(group.options().debounce, crate::form::DEFAULT_DEBOUNCE);
    assert!(group.field_keys().expect("keys").is_empty());

    let error: crate::FormResult<()> = Err(crate::FormError::MissingFieldName);
    assert_eq!(
        error.map_err(|error| error.to_string()),
        Err("input field has no field name".to_string())
    );
    assert_eq!(crate::Locale::from("system"), crate::Locale::System);
    assert_eq!(
        crate::I18nManager::with_locale("ru-RU").t("validator.email"),
        "Некорректный email"
    );
}

#[test]
fn prelude_exports_mask_builder_types() {
    use crate::prelude::*;

    let code = SimpleMaskFormatter::new("##-##").char_class(CharClass::Alphanumeric);
    assert_eq!(code.format("ab12"), "ab-12");
    assert_eq!(code.tokens()[2], MaskToken::Literal('-'));
}

#[test]
fn input_facade_formats_and_edits() {
    use crate::input::{EditState, SimpleMaskFormatter};

    let phone = SimpleMaskFormatter::new("(###) ###-####");
    assert_eq!(phone.format("916 123 4567"), "(916) 123-4567");

    let mut state = EditState::new("12.");
    assert!(state.insert_filtered("75", &crate::input::DecimalInputFilter::new(1)));
    assert_eq!(state.value, "12.7");
}
