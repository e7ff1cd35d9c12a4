//! Keystroke-level input processing: edit buffers, input filters and masks.

mod decimal_filter;
mod edit_state;
mod filter;
mod mask;

pub use decimal_filter::{DEFAULT_FRACTION_DIGITS, DecimalInputFilter};
pub use edit_state::EditState;
pub use filter::{FilterChain, FilterDecision, InputFilter, LengthFilter, TextEdit};
pub use mask::{
    CharClass, DEFAULT_MASK_CHAR, DEFAULT_PLACEHOLDER_CHAR, MaskToken, SimpleMaskFormatter,
};
