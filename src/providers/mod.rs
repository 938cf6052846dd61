pub mod currencyapi;

pub use currencyapi::{CurrencyApiError, CurrencyApiProvider};
