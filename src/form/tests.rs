use super::*;
use futures::executor::block_on;
use futures::join;
use futures_timer::Delay;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::i18n::I18nManager;
use crate::input::{DecimalInputFilter, InputFilter};

#[derive(Clone, Debug, Default, PartialEq, FormModel)]
struct ProfileForm {
    email: String,
    age: u32,
    amount: Decimal,
    nickname: Option<String>,
    #[form(skip)]
    internal: bool,
}

fn group_with(debounce: Duration, locale: &str) -> InputGroup {
    InputGroup::with_context(
        GroupOptions {
            debounce,
            ..GroupOptions::default()
        },
        I18nManager::with_locale(locale),
        ConverterRegistry::default(),
    )
}

fn immediate_group() -> InputGroup {
    group_with(Duration::ZERO, "en-US")
}

fn profile_group() -> InputGroup {
    let group = immediate_group();
    group
        .add_field(
            "email",
            vec![Arc::new(EmailValidator::new())],
            true,
        )
        .expect("email field");
    group
        .add_field(
            "age",
            vec![Arc::new(NumberValidator::range(18, 130))],
            false,
        )
        .expect("age field");
    group
        .add_field(
            "amount",
            vec![Arc::new(DecimalValidator::new())],
            false,
        )
        .expect("amount field");
    group
        .add_field("nickname", Vec::new(), false)
        .expect("nickname field");
    group
}

#[test]
fn required_field_without_validators_tracks_emptiness() {
    let group = immediate_group();
    let field = Arc::new(TextField::new("name").with_label("Name"));
    group
        .add_input(field.clone(), Vec::new(), true, None)
        .expect("register field");
    assert!(!group.is_valid_form(false).expect("validity"));

    let outcome = block_on(group.on_input_changed("name", "")).expect("change");
    assert_eq!(outcome, ChangeOutcome::Applied { valid: false });
    assert_eq!(field.error().as_deref(), Some("Name is required"));
    assert_eq!(group.value("name").expect("value"), None);

    let outcome = block_on(group.on_input_changed("name", "Ada")).expect("change");
    assert_eq!(outcome, ChangeOutcome::Applied { valid: true });
    assert_eq!(field.error(), None);
    assert_eq!(group.value("name").expect("value").as_deref(), Some("Ada"));
    assert!(group.is_valid_form(false).expect("validity"));
}

#[test]
fn optional_field_skips_validators_when_empty() {
    let group = immediate_group();
    group
        .add_field(
            "age",
            vec![Arc::new(NumberValidator::range(18, 130))],
            false,
        )
        .expect("register field");
    assert!(group.is_valid_form(false).expect("untouched optional field"));

    let outcome = block_on(group.on_input_changed("age", "12")).expect("change");
    assert!(!outcome.is_valid());
    assert!(!group.is_valid_form(false).expect("validity"));
    assert_eq!(
        group.field_meta("age").expect("meta").message.as_deref(),
        Some("Invalid number format")
    );

    let outcome = block_on(group.on_input_changed("age", "")).expect("change");
    assert_eq!(outcome, ChangeOutcome::Applied { valid: true });
    assert!(group.is_valid_form(false).expect("validity"));
}

#[test]
fn first_failing_validator_message_wins() {
    let group = immediate_group();
    group
        .add(
            FieldSpec::new("login")
                .required(true)
                .validator(LengthValidator::range(3, 8))
                .validator(RegexValidator::new("[a-z]+").expect("pattern")),
        )
        .expect("register field");

    block_on(group.on_input_changed("login", "A")).expect("change");
    assert_eq!(
        group.field_meta("login").expect("meta").message.as_deref(),
        Some("Minimum length: 3, maximum: 8")
    );

    block_on(group.on_input_changed("login", "ABCD")).expect("change");
    assert_eq!(
        group.field_meta("login").expect("meta").message.as_deref(),
        Some("Invalid data format")
    );
}

#[test]
fn related_fields_flip_form_validity_once_both_match() {
    let group = immediate_group();
    group
        .add_field(
            "password",
            vec![Arc::new(LengthValidator::min(4))],
            true,
        )
        .expect("password");
    group
        .add_field("password_repeat", Vec::new(), true)
        .expect("repeat");
    group
        .add_validate_relation("password", "password_repeat")
        .expect("relation");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    group
        .add_form_validate_listener(move |valid| sink.lock().expect("listener lock").push(valid))
        .expect("listener");

    let outcome = block_on(group.on_input_changed("password", "secret")).expect("change");
    assert_eq!(outcome, ChangeOutcome::Applied { valid: false });
    assert_eq!(
        group.field_meta("password").expect("meta").message.as_deref(),
        Some("Values are not equals")
    );
    let repeat = group.field_meta("password_repeat").expect("meta");
    assert_eq!(repeat.validity, Validity::Invalid);
    assert_eq!(repeat.message.as_deref(), Some("Value is required"));

    let outcome = block_on(group.on_input_changed("password_repeat", "secret")).expect("change");
    assert_eq!(outcome, ChangeOutcome::Applied { valid: true });
    assert_eq!(
        group.field_meta("password").expect("meta").validity,
        Validity::Valid
    );
    assert!(group.is_valid_form(false).expect("validity"));
    assert_eq!(*seen.lock().expect("seen lock"), vec![false, true]);
    assert_eq!(
        group.value("password").expect("value").as_deref(),
        Some("secret")
    );
    assert_eq!(
        group.value("password_repeat").expect("value").as_deref(),
        Some("secret")
    );

    block_on(group.on_input_changed("password", "secret2")).expect("change");
    assert_eq!(
        group.field_meta("password_repeat").expect("meta").validity,
        Validity::Invalid
    );
    assert!(!group.is_valid_form(false).expect("validity"));
    assert_eq!(group.value("password").expect("value"), None);
    assert_eq!(group.value("password_repeat").expect("value"), None);
}

#[test]
fn warnings_surface_without_blocking() {
    let group = immediate_group();
    let field = Arc::new(TextField::new("password"));
    group
        .add_input(
            field.clone(),
            vec![Arc::new(
                CustomValidator::new(|value| value.len() >= 10)
                    .message("Consider a longer password")
                    .warning(true),
            )],
            true,
            None,
        )
        .expect("register field");

    let outcome = block_on(group.on_input_changed("password", "hunter2")).expect("change");
    assert_eq!(outcome, ChangeOutcome::Applied { valid: true });
    assert_eq!(field.error().as_deref(), Some("Consider a longer password"));
    let meta = group.field_meta("password").expect("meta");
    assert!(meta.warning);
    assert_eq!(meta.validity, Validity::Valid);
    assert_eq!(group.value("password").expect("value").as_deref(), Some("hunter2"));
}

#[test]
fn debounce_coalesces_rapid_changes() {
    let group = group_with(Duration::from_millis(60), "en-US");
    group
        .add_field("name", Vec::new(), true)
        .expect("register field");
    let changes = Arc::new(AtomicUsize::new(0));
    let counter = changes.clone();
    group
        .add_text_changed_listener(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("listener");

    let (first, second) = block_on(async {
        join!(group.on_input_changed("name", "A"), async {
            Delay::new(Duration::from_millis(10)).await;
            group.on_input_changed("name", "Ad").await
        })
    });
    assert_eq!(first.expect("first change"), ChangeOutcome::Cancelled);
    assert_eq!(
        second.expect("second change"),
        ChangeOutcome::Applied { valid: true }
    );
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert_eq!(group.value("name").expect("value").as_deref(), Some("Ad"));
}

#[test]
fn stale_async_result_is_dropped() {
    let group = immediate_group();
    group
        .add(
            FieldSpec::new("login")
                .text("taken")
                .async_validator(async_validator(|value: String, _fields| async move {
                    Delay::new(Duration::from_millis(30)).await;
                    if value == "taken" {
                        Err(ValidatorFailure::Rejected(Message::text("Login is taken")))
                    } else {
                        Ok(())
                    }
                })),
        )
        .expect("register field");

    let (validated, changed) = block_on(async {
        join!(group.validate_field("login", false), async {
            Delay::new(Duration::from_millis(5)).await;
            group.on_input_changed("login", "neo").await
        })
    });
    validated.expect("validate");
    assert_eq!(
        changed.expect("change"),
        ChangeOutcome::Applied { valid: true }
    );
    let meta = group.field_meta("login").expect("meta");
    assert_eq!(meta.validity, Validity::Valid);
    assert_eq!(meta.message, None);
    assert!(!meta.validating);
}

#[test]
fn async_rejections_errors_and_timeouts() {
    let group = immediate_group();
    group
        .add(
            FieldSpec::new("login")
                .required(true)
                .validator(LengthValidator::min(2))
                .async_validator(async_validator(|value: String, _fields| async move {
                    match value.as_str() {
                        "root" => Err(ValidatorFailure::Rejected(Message::text("Reserved"))),
                        "boom" => Err(ValidatorFailure::Error("connection reset".to_string())),
                        _ => Ok(()),
                    }
                })),
        )
        .expect("login field");
    group
        .add(
            FieldSpec::new("slow").async_validator(TimeoutValidator::new(
                async_validator(|_value, _fields| async {
                    Delay::new(Duration::from_millis(200)).await;
                    Ok(())
                }),
                Duration::from_millis(10),
            )),
        )
        .expect("slow field");

    block_on(group.on_input_changed("login", "root")).expect("change");
    assert_eq!(
        group.field_meta("login").expect("meta").message.as_deref(),
        Some("Reserved")
    );
    block_on(group.on_input_changed("login", "boom")).expect("change");
    assert_eq!(
        group.field_meta("login").expect("meta").message.as_deref(),
        Some("Unable to validate value")
    );
    let outcome = block_on(group.on_input_changed("login", "neo")).expect("change");
    assert!(outcome.is_valid());

    let outcome = block_on(group.on_input_changed("slow", "x")).expect("change");
    assert_eq!(outcome, ChangeOutcome::Applied { valid: false });
}

#[test]
fn release_cancels_in_flight_changes() {
    let group = group_with(Duration::from_millis(50), "en-US");
    group
        .add_field("name", Vec::new(), true)
        .expect("register field");

    let (outcome, released) = block_on(async {
        join!(group.on_input_changed("name", "Ada"), async {
            Delay::new(Duration::from_millis(5)).await;
            group.release()
        })
    });
    released.expect("release");
    assert_eq!(outcome.expect("change"), ChangeOutcome::Cancelled);
    assert!(group.is_released().expect("flag"));
    assert_eq!(
        block_on(group.on_input_changed("name", "Bob")),
        Err(FormError::Released)
    );
    assert_eq!(group.values(), Err(FormError::Released));
    assert_eq!(group.release(), Ok(()));
}

#[test]
fn reset_clears_values_and_blocks_required_fields() {
    let group = immediate_group();
    let field = Arc::new(TextField::new("email"));
    group
        .add_input(
            field.clone(),
            vec![Arc::new(EmailValidator::new())],
            true,
            None,
        )
        .expect("register field");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    group
        .add_form_validate_listener(move |valid| sink.lock().expect("listener lock").push(valid))
        .expect("listener");

    block_on(group.on_input_changed("email", "bad")).expect("change");
    block_on(group.on_input_changed("email", "neo@matrix.io")).expect("change");
    assert!(group.is_valid_form(false).expect("validity"));

    group.reset().expect("reset");
    assert_eq!(field.text(), "");
    assert_eq!(field.error(), None);
    assert!(group.values().expect("values").is_empty());
    assert_eq!(
        group.field_meta("email").expect("meta").validity,
        Validity::Unknown
    );
    assert!(!group.is_valid_form(false).expect("validity"));
    assert_eq!(*seen.lock().expect("seen lock"), vec![false, true, false]);
}

#[test]
fn edits_run_through_field_filters() {
    let group = immediate_group();
    let field = Arc::new(TextField::new("amount"));
    let decimal: Arc<dyn InputFilter> = Arc::new(DecimalInputFilter::new(2));
    group
        .add(
            FieldSpec::from_handle(field.clone())
                .validator(DecimalValidator::new())
                .filter(decimal.clone()),
        )
        .expect("register field");

    let outcome = block_on(group.edit("amount", 0..0, "12,345")).expect("edit");
    assert_eq!(outcome, ChangeOutcome::Applied { valid: true });
    assert_eq!(field.text(), "12.34");
    assert_eq!(group.value("amount").expect("value").as_deref(), Some("12.34"));

    assert_eq!(
        group.apply_edit("amount", 5..5, "9").expect("rejected edit"),
        "12.34"
    );
    assert_eq!(group.field_meta("amount").expect("meta").filters, 1);

    assert!(group.remove_filter("amount", &decimal).expect("remove"));
    assert!(!group.remove_filter("amount", &decimal).expect("remove again"));
    assert_eq!(
        group.apply_edit("amount", 5..5, "9").expect("free edit"),
        "12.349"
    );
    group.add_filter("amount", decimal).expect("add");
    group.remove_all_filters("amount").expect("clear");
    assert_eq!(group.field_meta("amount").expect("meta").filters, 0);
}

#[test]
fn registration_errors() {
    let group = immediate_group();
    assert_eq!(
        group.add_input(Arc::new(TextField::unnamed()), Vec::new(), false, None),
        Err(FormError::MissingFieldName)
    );
    assert_eq!(
        group.add_input(Arc::new(TextField::new("")), Vec::new(), false, None),
        Err(FormError::MissingFieldName)
    );
    group
        .add_field("email", Vec::new(), false)
        .expect("register field");
    assert_eq!(
        group.add_field("email", Vec::new(), true),
        Err(FormError::DuplicateField("email".to_string()))
    );
    assert_eq!(
        block_on(group.on_input_changed("phone", "1")),
        Err(FormError::UnknownField("phone".to_string()))
    );
    assert_eq!(
        group.add_validate_relation("email", "phone"),
        Err(FormError::UnknownField("phone".to_string()))
    );
}

#[test]
fn required_flag_maintains_label_suffix() {
    let group = InputGroup::with_context(
        GroupOptions {
            debounce: Duration::ZERO,
            required_label_suffix: Some("*".to_string()),
        },
        I18nManager::with_locale("en-US"),
        ConverterRegistry::default(),
    );
    let field = Arc::new(TextField::new("email").with_label("Email"));
    group
        .add_input(field.clone(), Vec::new(), true, None)
        .expect("register field");
    assert_eq!(field.label().as_deref(), Some("Email *"));

    block_on(group.on_input_changed("email", "")).expect("change");
    assert_eq!(field.error().as_deref(), Some("Email is required"));

    let valid = block_on(group.set_input_required("email", false)).expect("optional");
    assert!(valid);
    assert_eq!(field.label().as_deref(), Some("Email"));
    assert_eq!(field.error(), None);

    block_on(group.set_input_required("email", true)).expect("required");
    assert_eq!(field.label().as_deref(), Some("Email *"));
    assert!(!group.is_valid_form(false).expect("validity"));
}

#[test]
fn dedicated_error_target_and_focus() {
    let group = immediate_group();
    let email = Arc::new(TextField::new("email"));
    let email_error = Arc::new(ErrorLabel::new());
    let phone = Arc::new(TextField::new("phone"));
    group
        .add_input(
            email.clone(),
            vec![Arc::new(EmailValidator::new())],
            true,
            Some(email_error.clone()),
        )
        .expect("email");
    group
        .add_input(
            phone.clone(),
            vec![Arc::new(PhoneValidator::new())],
            true,
            None,
        )
        .expect("phone");

    assert!(!group.focus_first_error().expect("no errors yet"));
    block_on(group.on_input_changed("phone", "call me")).expect("change");
    block_on(group.on_input_changed("email", "nope")).expect("change");

    assert_eq!(email_error.text().as_deref(), Some("Invalid email"));
    assert_eq!(email.error(), None);
    assert!(group.focus_first_error().expect("focus"));
    assert!(email.is_focused());
    assert!(!phone.is_focused());

    block_on(group.on_input_changed("email", "neo@matrix.io")).expect("change");
    assert!(!email_error.is_visible());
}

#[test]
fn external_errors_are_displayed_verbatim() {
    let group = immediate_group();
    let field = Arc::new(TextField::new("login"));
    group
        .add_input(field.clone(), Vec::new(), false, None)
        .expect("register field");

    group
        .set_error("login", Some("Server rejected login"))
        .expect("set error");
    assert_eq!(field.error().as_deref(), Some("Server rejected login"));

    group
        .set_error_from("login", &FormError::UnknownField("login".to_string()))
        .expect("set error");
    assert_eq!(
        field.error().as_deref(),
        Some("input with name login not found")
    );
    group.set_error("login", None).expect("clear error");
    assert_eq!(field.error(), None);
}

#[test]
fn listeners_can_be_removed() {
    let group = immediate_group();
    group
        .add_field("name", Vec::new(), false)
        .expect("register field");
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let id = group
        .add_text_changed_listener(move |field, value, valid| {
            sink.lock()
                .expect("listener lock")
                .push((field.to_string(), value.to_string(), valid));
        })
        .expect("listener");

    block_on(group.on_input_changed("name", "Ada")).expect("change");
    assert!(group.remove_text_changed_listener(id).expect("remove"));
    assert!(!group.remove_text_changed_listener(id).expect("remove again"));
    block_on(group.on_input_changed("name", "Bob")).expect("change");

    assert_eq!(
        *events.lock().expect("events lock"),
        vec![("name".to_string(), "Ada".to_string(), true)]
    );
}

#[test]
fn validate_and_trigger_changed_cover_every_field() {
    let group = profile_group();
    group
        .set_values([("email", "neo@matrix.io"), ("age", "7")])
        .expect("prefill");

    assert!(!block_on(group.validate(true)).expect("validate"));
    let snapshot = group.snapshot().expect("snapshot");
    assert_eq!(
        snapshot.field("age").expect("age").validity,
        Validity::Invalid
    );
    assert_eq!(
        snapshot.field("email").expect("email").validity,
        Validity::Valid
    );
    assert!(!snapshot.is_valid);

    group.set_values([("age", "42")]).expect("fix age");
    assert!(block_on(group.trigger_changed()).expect("trigger"));
    let snapshot = group.snapshot().expect("snapshot");
    assert!(snapshot.fields.iter().all(|meta| meta.touched));
    assert_eq!(
        snapshot.values.get("age").map(String::as_str),
        Some("42")
    );
}

#[test]
fn model_binding_round_trips_through_fields() {
    let group = profile_group();
    let model = ProfileForm {
        email: "neo@matrix.io".to_string(),
        age: 37,
        amount: Decimal::new(1050, 2),
        nickname: None,
        internal: true,
    };
    group.map_values_from(&model).expect("map from model");

    let snapshot = group.snapshot().expect("snapshot");
    assert_eq!(snapshot.field("age").expect("age").text, "37");
    assert_eq!(snapshot.field("amount").expect("amount").text, "10.5");
    assert_eq!(snapshot.field("nickname").expect("nickname").text, "");
    assert!(!snapshot.values.contains_key("nickname"));

    let restored: ProfileForm = group.map_values_to().expect("map to model");
    assert_eq!(
        restored,
        ProfileForm {
            internal: false,
            ..model.clone()
        }
    );

    block_on(group.on_input_changed("nickname", "The One")).expect("change");
    block_on(group.on_input_changed("age", "abc")).expect("change");
    let mut updated = model.clone();
    group.map_values_into(&mut updated).expect("map into model");
    assert_eq!(updated.nickname.as_deref(), Some("The One"));
    assert_eq!(updated.age, 0);
    assert!(updated.internal);
}

#[test]
fn mapped_text_keeps_surrounding_whitespace() {
    let group = profile_group();
    block_on(group.on_input_changed("email", "neo@matrix.io")).expect("change");
    block_on(group.on_input_changed("nickname", "  The One ")).expect("change");

    let profile: ProfileForm = group.map_values_to().expect("map to model");
    assert_eq!(profile.nickname.as_deref(), Some("  The One "));

    group.reset().expect("reset");
    group.map_values_from(&profile).expect("map from model");
    assert_eq!(
        group.field_meta("nickname").expect("meta").text,
        "  The One "
    );
}

#[test]
fn unknown_keys_and_bad_values_while_mapping() {
    let group = profile_group();
    group
        .set_values([("email", "neo@matrix.io"), ("favourite_color", "green")])
        .expect("unknown keys are skipped");
    assert_eq!(group.values().expect("values").len(), 1);

    group.set_values([("age", "old")]).expect("prefill");
    assert!(matches!(
        group.map_values_to::<ProfileForm>(),
        Err(FormError::Conversion { ref field, .. }) if field == "age"
    ));
}

#[test]
fn messages_follow_group_locale() {
    let group = group_with(Duration::ZERO, "ru-RU");
    group
        .add(FieldSpec::new("email").label("Почта").required(true))
        .expect("register field");
    block_on(group.on_input_changed("email", "")).expect("change");
    assert_eq!(
        group.field_meta("email").expect("meta").message.as_deref(),
        Some("Почта: обязательное поле")
    );
}
