//! Display formatting for amounts and volumes.
//!
//! Currency shows two decimals, litres show whole numbers; both use comma
//! thousands separators. Formatting is for display only and never feeds back
//! into the derivation chain.

pub const CURRENCY_SYMBOL: &str = "\u{20b5}";

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// `1234.5` → `"1,234.50"`.
pub fn amount(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{sign}{}.{frac_part}", group_thousands(int_part))
}

/// `1234.5` → `"₵1,234.50"`, `-80` → `"-₵80.00"`.
pub fn currency(value: f64) -> String {
    let formatted = amount(value);
    match formatted.strip_prefix('-') {
        Some(rest) => format!("-{CURRENCY_SYMBOL}{rest}"),
        None => format!("{CURRENCY_SYMBOL}{formatted}"),
    }
}

/// `17300.4` → `"17,300 L"`.
pub fn litres(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{}", rounded.abs() as u64);
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{sign}{} L", group_thousands(&digits))
}

/// Optional values render as a dash.
pub fn or_dash(value: Option<f64>, f: fn(f64) -> String) -> String {
    value.map(f).unwrap_or_else(|| "-".to_string())
}
