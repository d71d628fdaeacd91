//! Display formatting helpers for multipliers, amounts, and elapsed time.
//! Used in log lines; UI collaborators may reuse them.

/// Format a multiplier as "2.50x".
pub fn format_multiplier(multiplier: f64) -> String {
    format!("{multiplier:.2}x")
}

/// Format a currency amount with two decimals.
pub fn format_amount(amount: f64) -> String {
    format!("{amount:.2}")
}

/// Format elapsed milliseconds as seconds, "4.00s".
pub fn format_elapsed(elapsed_ms: u64) -> String {
    format!("{:.2}s", elapsed_ms as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formats() {
        assert_eq!(format_multiplier(2.5), "2.50x");
        assert_eq!(format_multiplier(1.0), "1.00x");
        assert_eq!(format_amount(25.0), "25.00");
        assert_eq!(format_elapsed(4000), "4.00s");
        assert_eq!(format_elapsed(150), "0.15s");
    }
}
