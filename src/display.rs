//! Formatting helpers for status output.

/// Shortens an account address to `0x1234...abcd` form.
///
/// Addresses of ten characters or fewer are returned unchanged.
pub fn short_address(address: &str) -> String {
    let address = address.trim();
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }

    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Formats a percentage with two decimals.
pub fn format_percent(ratio: f64) -> String {
    format!("{ratio:.2}%")
}
