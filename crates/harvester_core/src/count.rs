/// Parses a human-formatted count such as `"1.2K"`, `"3,400"` or `"2M likes"`.
///
/// Reads the first numeric token, strips thousands separators, applies an
/// optional `k`/`m`/`b` magnitude suffix and rounds to the nearest integer.
/// Anything unparsable yields `0`.
pub fn parse_count(raw: &str) -> u64 {
    let chars: Vec<char> = raw.chars().collect();
    let Some(start) = chars.iter().position(char::is_ascii_digit) else {
        return 0;
    };

    let mut end = start;
    while end < chars.len() && (chars[end].is_ascii_digit() || is_separator(chars[end])) {
        end += 1;
    }
    // Trailing separators are sentence punctuation, not part of the number.
    while end > start && !chars[end - 1].is_ascii_digit() {
        end -= 1;
    }

    let multiplier = magnitude_suffix(&chars[end..]);
    let normalized = normalize_separators(&chars[start..end], multiplier.is_some());
    let Ok(value) = normalized.parse::<f64>() else {
        return 0;
    };

    let scaled = (value * multiplier.unwrap_or(1) as f64).round();
    if !scaled.is_finite() || scaled <= 0.0 {
        0
    } else if scaled >= u64::MAX as f64 {
        u64::MAX
    } else {
        scaled as u64
    }
}

fn is_separator(c: char) -> bool {
    c == '.' || c == ',' || is_grouping(c)
}

/// Separators that only ever group thousands.
fn is_grouping(c: char) -> bool {
    matches!(c, '\'' | '\u{a0}' | '\u{202f}')
}

fn magnitude_suffix(rest: &[char]) -> Option<u64> {
    let mut iter = rest.iter().skip_while(|c| c.is_whitespace());
    let multiplier = match iter.next()?.to_ascii_lowercase() {
        'k' => 1_000,
        'm' => 1_000_000,
        'b' => 1_000_000_000,
        _ => return None,
    };
    // "5 books" is five, not five billion.
    if iter.next().is_some_and(|c| c.is_alphabetic()) {
        return None;
    }
    Some(multiplier)
}

fn normalize_separators(token: &[char], has_suffix: bool) -> String {
    let separators: Vec<(usize, char)> = token
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_ascii_digit())
        .map(|(idx, c)| (idx, *c))
        .collect();

    let decimal_at = separators.last().and_then(|&(idx, sep)| {
        let uniform = separators.iter().all(|&(_, c)| c == sep);
        if is_grouping(sep) {
            None
        } else if !uniform {
            Some(idx)
        } else if separators.len() > 1 {
            None
        } else {
            let digits_after = token.len() - idx - 1;
            if digits_after == 3 && !has_suffix {
                None
            } else {
                Some(idx)
            }
        }
    });

    token
        .iter()
        .enumerate()
        .filter_map(|(idx, c)| {
            if c.is_ascii_digit() {
                Some(*c)
            } else if Some(idx) == decimal_at {
                Some('.')
            } else {
                None
            }
        })
        .collect()
}
