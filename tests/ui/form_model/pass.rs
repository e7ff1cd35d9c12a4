use calminput::form::{FieldLens, FormModel};

#[derive(Clone, Default, calminput::form::FormModel)]
struct SignupForm {
    email: String,
    #[form(rename = "referralCode")]
    referral_code: Option<String>,
    #[form(skip)]
    session: Vec<u8>,
}

fn main() {
    let fields = SignupForm::fields();
    let lens = fields.email();
    let mut model = SignupForm {
        email: "a@calm.input".to_string(),
        ..SignupForm::default()
    };
    lens.set(&mut model, "b@calm.input".to_string());
    assert_eq!(lens.key().as_str(), "email");
    assert_eq!(lens.get(&model), "b@calm.input");
    assert_eq!(fields.referral_code().key().as_str(), "referralCode");
    assert!(model.session.is_empty());

    let binding = SignupForm::binding();
    let keys = binding.keys().map(|key| key.as_str()).collect::<Vec<_>>();
    assert_eq!(keys, ["email", "referralCode"]);
}
