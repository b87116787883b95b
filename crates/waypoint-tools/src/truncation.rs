//! Output truncation policy for tool results.
//!
//! Oversize tool outputs are clamped before entering the conversation. The
//! clamped text preserves a prefix, carries a marker containing the literal
//! word "truncated", and never exceeds the configured limit.

/// Clamp `output` to at most `max_bytes` bytes.
///
/// Returns the input unchanged when it fits. Otherwise the result is a
/// prefix plus a marker line, and `result.len() <= max_bytes` holds.
pub fn truncate_bytes(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }

    let marker = format!("\n[truncated: {} bytes total]", output.len());
    if marker.len() >= max_bytes {
        // Degenerate limit: the marker alone must fit
        return "[truncated]"
            .chars()
            .take(max_bytes)
            .collect();
    }

    let budget = max_bytes - marker.len();
    // Back off to a char boundary at or below the byte budget
    let mut cut = budget;
    while cut > 0 && !output.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &output[..cut], marker)
}

/// Clamp `output` to at most `max_lines` lines.
///
/// The marker occupies the final line, so at most `max_lines - 1` content
/// lines survive.
pub fn truncate_lines(output: &str, max_lines: usize) -> String {
    let total = output.lines().count();
    if total <= max_lines {
        return output.to_string();
    }

    let keep = max_lines.saturating_sub(1);
    let mut out = output.lines().take(keep).collect::<Vec<_>>().join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(&format!("[truncated: {} of {} lines shown]", keep, total));
    out
}
