//! Terminal output helpers

use serde::Serialize;

fn use_color() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Print a success line (green checkmark)
pub fn print_success(message: &str) {
    if use_color() {
        println!("\x1b[32m✓\x1b[0m {message}");
    } else {
        println!("OK: {message}");
    }
}

/// Print a failure line to stderr (red cross)
pub fn print_failure(message: &str) {
    if use_color() {
        eprintln!("\x1b[31m✗\x1b[0m {message}");
    } else {
        eprintln!("FAILED: {message}");
    }
}

/// Print a warning to stderr (yellow)
pub fn print_warning(message: &str) {
    if use_color() {
        eprintln!("\x1b[33mWarning:\x1b[0m {message}");
    } else {
        eprintln!("Warning: {message}");
    }
}

/// Print an aligned `key: value` pair
pub fn print_key_value(key: &str, value: &str) {
    println!("  {:<18} {}", format!("{key}:"), value);
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Truncate for table display on character boundaries.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_long_string() {
        assert_eq!(truncate("hello world this is long", 10), "hello w...");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }
}
