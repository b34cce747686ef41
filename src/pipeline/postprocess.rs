//! Deterministic tidy-up of the LLM's Markdown.
//!
//! Models sometimes wrap the answer in fences, open with a chatty preamble,
//! emit CRLF line endings or break tables with extra separator rows. Each
//! rule below is a pure `&str → String` pass.
//!
//! Order matters: fences and line endings first so later rules see clean
//! lines; the final-newline pass last.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every rule, in order:
///
/// 1. Strip an outer ```` ```markdown ```` fence
/// 2. CRLF / CR → LF
/// 3. Drop a one-line "Here is the content:" preamble
/// 4. Trim trailing whitespace per line
/// 5. Collapse runs of blank lines to one
/// 6. Remove separator rows in a table body
/// 7. Remove invisible Unicode (zero-width, BOM, soft hyphen)
/// 8. End with exactly one newline
pub fn tidy_markdown(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = drop_preamble(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_body_separators(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

// ── Rule 1: outer fence ──────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\r?\n(.*?)\r?\n```\s*$").unwrap());

/// Only when the whole answer is one fence: an inner fence line means the
/// outer backticks belong to real code blocks.
fn strip_outer_fence(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed) {
        Some(caps) if !caps[1].lines().any(|l| l.trim_start().starts_with("```")) => {
            caps[1].to_string()
        }
        _ => input.to_string(),
    }
}

// ── Rule 2: line endings ─────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: preamble ─────────────────────────────────────────────────────

static RE_PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:here is|here's|below is)\b[^\n]{0,120}:\s*$").unwrap()
});

fn drop_preamble(input: &str) -> String {
    match input.split_once('\n') {
        Some((first, rest)) if RE_PREAMBLE.is_match(first) => rest.to_string(),
        _ => input.to_string(),
    }
}

// ── Rule 4: trailing whitespace ──────────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

// ── Rule 5: blank lines ──────────────────────────────────────────────────

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}

// ── Rule 6: table body separators ────────────────────────────────────────

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|')
        && t.contains('-')
        && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// A GFM table has one separator, as its second row. Any other is dropped.
fn remove_body_separators(input: &str) -> String {
    let mut kept = Vec::new();
    let mut row = 0usize;
    for line in input.lines() {
        if !is_table_row(line) {
            row = 0;
            kept.push(line);
            continue;
        }
        row += 1;
        if is_separator_row(line) && row != 2 {
            continue;
        }
        kept.push(line);
    }
    kept.join("\n")
}

// ── Rule 7: invisible characters ─────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'],
        "",
    )
}

// ── Rule 8: final newline ────────────────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        "\n".to_string()
    } else {
        format!("{trimmed}\n")
    }
}
