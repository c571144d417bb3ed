//! Formatting helpers for prices and percentages.
//!
//! Prices use US conventions (`,` thousands, `.` decimal). Percentages are
//! shown signed with two decimals; undefined values render as `N/A`.

use rust_decimal::Decimal;

/// Placeholder shown for undefined values
pub const NOT_AVAILABLE: &str = "N/A";

/// Core formatting function with full control over output.
///
/// # Examples
/// ```
/// use marketsnap::utils::format_number_with_width;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_number_with_width(dec!(1234.5), 0), "1,234.50");
/// assert_eq!(format_number_with_width(dec!(-7), 8), "   -7.00");
/// ```
pub fn format_number_with_width(value: Decimal, width: usize) -> String {
    let is_negative = value < Decimal::ZERO;
    let formatted = format!("{:.2}", value.abs());
    let (integer_part, decimal_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let digits: Vec<char> = integer_part.chars().collect();
    let mut with_separators = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            with_separators.push(',');
        }
        with_separators.push(*c);
    }

    let sign = if is_negative { "-" } else { "" };
    let result = format!("{}{}.{}", sign, with_separators, decimal_part);

    if width > 0 && result.len() < width {
        format!("{:>width$}", result, width = width)
    } else {
        result
    }
}

/// Closing price for display: "42,120.55"
///
/// # Examples
/// ```
/// use marketsnap::utils::format_price;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_price(dec!(4742.83)), "4,742.83");
/// ```
pub fn format_price(value: Decimal) -> String {
    format_number_with_width(value, 0)
}

/// Signed percentage: "+4.76%", "-0.01%", "0.00%"
pub fn format_pct(value: Decimal) -> String {
    let sign = if value > Decimal::ZERO { "+" } else { "" };
    format!("{}{:.2}%", sign, value)
}

/// Percentage cell, `N/A` when undefined.
pub fn format_pct_cell(value: Option<Decimal>) -> String {
    value.map(format_pct).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// Plain two-decimal rendering for machine-readable output; empty when undefined.
pub fn format_pct_plain(value: Option<Decimal>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}
