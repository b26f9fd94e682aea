//! ISO 4217 currency lookup for building asks.
//!
//! Terminals only understand the three-digit numeric code; hosts usually
//! know the alphabetic one.

use crate::error::{Result, TeliumError};

/// Resolves an alphabetic currency code to its ISO 4217 numeric form.
pub trait CurrencyResolver: Send + Sync {
    /// `"EUR"` → `"978"`. Case-insensitive.
    fn numeric_code(&self, alpha3: &str) -> Result<String>;
}

/// Built-in table of active ISO 4217 currencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct Iso4217;

const CURRENCIES: &[(&str, &str)] = &[
    ("AED", "784"),
    ("ARS", "032"),
    ("AUD", "036"),
    ("BAM", "977"),
    ("BGN", "975"),
    ("BRL", "986"),
    ("CAD", "124"),
    ("CHF", "756"),
    ("CLP", "152"),
    ("CNY", "156"),
    ("COP", "170"),
    ("CZK", "203"),
    ("DKK", "208"),
    ("DZD", "012"),
    ("EGP", "818"),
    ("EUR", "978"),
    ("GBP", "826"),
    ("HKD", "344"),
    ("HUF", "348"),
    ("IDR", "360"),
    ("ILS", "376"),
    ("INR", "356"),
    ("ISK", "352"),
    ("JPY", "392"),
    ("KRW", "410"),
    ("MAD", "504"),
    ("MKD", "807"),
    ("MXN", "484"),
    ("MYR", "458"),
    ("NOK", "578"),
    ("NZD", "554"),
    ("PHP", "608"),
    ("PLN", "985"),
    ("RON", "946"),
    ("RSD", "941"),
    ("SAR", "682"),
    ("SEK", "752"),
    ("SGD", "702"),
    ("THB", "764"),
    ("TND", "788"),
    ("TRY", "949"),
    ("TWD", "901"),
    ("UAH", "980"),
    ("USD", "840"),
    ("XAF", "950"),
    ("XOF", "952"),
    ("XPF", "953"),
    ("ZAR", "710"),
];

impl CurrencyResolver for Iso4217 {
    fn numeric_code(&self, alpha3: &str) -> Result<String> {
        let wanted = alpha3.trim().to_uppercase();
        CURRENCIES
            .iter()
            .find(|(code, _)| *code == wanted)
            .map(|(_, numeric)| (*numeric).to_string())
            .ok_or_else(|| TeliumError::UnknownCurrency(alpha3.to_string()))
    }
}
