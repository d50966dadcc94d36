/// Clean a span of reply text so it reads naturally when spoken.
///
/// Strips markdown (code fences, inline code ticks, links, emphasis,
/// headers, list markers), collapses whitespace and tidies spacing around
/// punctuation. Returns an empty string when nothing speakable is left.
pub fn clean_text_for_speech(text: &str) -> String {
    let mut cleaned = strip_code_fences(text);
    cleaned = strip_links(&cleaned);

    let lines: Vec<&str> = cleaned.lines().map(strip_line_marker).collect();
    cleaned = lines.join("\n");

    cleaned.retain(|c| !matches!(c, '`' | '*' | '~' | '#' | '_'));

    let mut spoken = String::with_capacity(cleaned.len());
    for word in cleaned.split_whitespace() {
        let attaches = word.starts_with([',', '.', '!', '?', ';', ':']);
        if !spoken.is_empty() && !attaches {
            spoken.push(' ');
        }
        spoken.push_str(word);
    }

    if spoken.chars().any(char::is_alphanumeric) {
        spoken
    } else {
        String::new()
    }
}

fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        out.push_str(&rest[..start]);
        match rest[start + 3..].find("```") {
            Some(end) => rest = &rest[start + 3 + end + 3..],
            // An unterminated fence (the block continues in a later span) is dropped.
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// `[text](url)` becomes `text`.
fn strip_links(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find("](") else {
            break;
        };
        let Some(paren) = after[close + 2..].find(')') else {
            break;
        };
        out.push_str(&rest[..open]);
        out.push_str(&after[..close]);
        rest = &after[close + 2 + paren + 1..];
    }
    out.push_str(rest);
    out
}

fn strip_line_marker(line: &str) -> &str {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("+ "))
        .or_else(|| trimmed.strip_prefix("> "))
    {
        return rest;
    }
    if let Some(dot) = trimmed.find(". ") {
        if dot > 0 && trimmed[..dot].chars().all(|c| c.is_ascii_digit()) {
            return &trimmed[dot + 2..];
        }
    }
    if trimmed.starts_with('#') {
        return trimmed.trim_start_matches('#').trim_start();
    }
    line
}
