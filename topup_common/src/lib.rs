mod money;

pub mod helpers;
pub mod op;
mod secret;

pub use money::{Money, MoneyConversionError, DEFAULT_CURRENCY_CODE, MONEY_SCALE};
pub use rust_decimal::Decimal;
pub use secret::Secret;
