//! Display formatting for amounts in Algerian dinars.

pub const CURRENCY_CODE: &str = "DZD";

/// Formats a whole-dinar amount as `"1 500 DZD"`.
pub fn format_dzd(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);

    if amount < 0 {
        grouped.push('-');
    }

    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(digit);
    }

    format!("{grouped} {CURRENCY_CODE}")
}
