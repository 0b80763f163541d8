use std::collections::HashSet;

/// Parses a group (hashtag/topic) list file.
///
/// Accepts one or more groups per line separated by commas or spaces, with or
/// without a leading `#`. Lines starting with `# `, `//`, `;`, `-- ` or `REM `
/// are comments. After content, ` # ` or ` //` starts an inline comment, while
/// ` #tag` is another group. Duplicates are dropped case-insensitively,
/// keeping the first spelling seen.
pub fn parse_group_list(text: &str) -> Vec<String> {
    let tokens = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_comment_line(line))
        .map(|line| strip_inline_comment(line).trim())
        .flat_map(|line| {
            line.split([',', ' ', '\t'])
                .map(|token| token.trim().trim_start_matches('#').trim().to_string())
                .collect::<Vec<_>>()
        });
    dedup_groups(tokens)
}

/// Drops blank and case-insensitively repeated groups, preserving order.
pub fn dedup_groups<I, S>(groups: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    groups
        .into_iter()
        .map(Into::into)
        .filter(|group| !group.trim().is_empty())
        .filter(|group| seen.insert(group.to_lowercase()))
        .collect()
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with("# ")
        || line.starts_with("//")
        || line.starts_with(';')
        || line.starts_with("-- ")
        || line
            .get(..4)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("rem "))
}

fn strip_inline_comment(line: &str) -> &str {
    let hash = line.match_indices(" #").map(|(idx, _)| idx).find(|&idx| {
        line[idx + 2..]
            .chars()
            .next()
            .is_none_or(char::is_whitespace)
    });
    let slashes = line.find(" //");
    let cut = match (hash, slashes) {
        (Some(a), Some(b)) => a.min(b),
        (a, b) => a.or(b).unwrap_or(line.len()),
    };
    &line[..cut]
}
