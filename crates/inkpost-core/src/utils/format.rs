/// Truncate a string to a maximum number of characters, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format a timestamp to a more readable date
pub fn format_date(date: &str) -> String {
    // Try to parse ISO format and convert to readable
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date) {
        dt.format("%b %d, %Y").to_string()
    } else if date.len() >= 10 && date.is_char_boundary(10) {
        // Fall back to the YYYY-MM-DD prefix
        date[..10].to_string()
    } else {
        date.to_string()
    }
}

/// Left-align `s` in a column `width` characters wide, truncating if longer
pub fn pad_display(s: &str, width: usize) -> String {
    let cell = truncate_string(s, width);
    let padding = width.saturating_sub(cell.chars().count());
    format!("{}{}", cell, " ".repeat(padding))
}
