//! Short human-readable renderings used in status lines.

/// Human-readable byte formatting.
pub fn simple_size(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;

    let b = bytes.max(0.0);
    if b >= GB {
        format!("{:.2} GB", b / GB)
    } else if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", b as u64)
    }
}

pub fn speed_text(bytes_per_sec: f64) -> String {
    format!("{}/s", simple_size(bytes_per_sec))
}

/// `45s`, `3m 25s`, `1h 02m`.
pub fn duration_to_short_text(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}h {:02}m", h, m)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Uppercases the first letter of every alphabetic run and lowercases the
/// rest: `"downloading"` becomes `"Downloading"`, `"post-processing"`
/// becomes `"Post-Processing"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// Hook for reshaping right-to-left text before display. Terminals and
/// native UIs shape bidi text themselves, so lines pass through untouched.
pub fn bidi_workaround(message: &str) -> &str {
    message
}
