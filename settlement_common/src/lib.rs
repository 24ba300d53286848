mod helpers;
mod paise;

pub mod op;
mod secret;

pub use helpers::parse_boolean_flag;
pub use paise::{Paise, PaiseConversionError, CURRENCY_CODE, CURRENCY_SYMBOL};
pub use secret::Secret;
