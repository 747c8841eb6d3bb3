//! Kubernetes quantity helpers
//!
//! `k8s_openapi` keeps quantities as their serialized string. Resolution only
//! needs to know whether a quantity is zero, so this parses just enough of the
//! grammar (`<signedNumber><suffix>`) to answer that.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;
use tracing::warn;

const SUFFIXES: &[&str] = &[
    "", "n", "u", "m", "k", "M", "G", "T", "P", "E", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei",
];

/// Quantity string that does not follow the Kubernetes grammar
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid number in quantity {0:?}")]
    InvalidNumber(String),
    #[error("invalid suffix in quantity {0:?}")]
    InvalidSuffix(String),
}

/// Whether the quantity's numeric part is zero, e.g. `0`, `0Gi`, `0.0`, `-0m`.
pub fn parse_is_zero(raw: &str) -> Result<bool, QuantityError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(QuantityError::Empty);
    }

    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    let split = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(split);

    if !number.chars().any(|c| c.is_ascii_digit()) || number.matches('.').count() > 1 {
        return Err(QuantityError::InvalidNumber(raw.to_string()));
    }
    if !is_valid_suffix(suffix) {
        return Err(QuantityError::InvalidSuffix(raw.to_string()));
    }

    Ok(number.chars().all(|c| c == '0' || c == '.'))
}

fn is_valid_suffix(suffix: &str) -> bool {
    if SUFFIXES.contains(&suffix) {
        return true;
    }
    // decimal exponent: e3, E-2
    match suffix.strip_prefix(['e', 'E']) {
        Some(exp) => {
            let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Whether a quantity counts as unset.
///
/// Unparseable quantities are treated as unset so that resolution stays total.
pub fn is_zero(quantity: &Quantity) -> bool {
    match parse_is_zero(&quantity.0) {
        Ok(zero) => zero,
        Err(e) => {
            warn!("Ignoring resource quantity: {}", e);
            true
        }
    }
}

/// `Some` only for quantities that are present and non-zero
pub fn non_zero(quantity: Option<&Quantity>) -> Option<Quantity> {
    quantity.filter(|q| !is_zero(q)).cloned()
}
