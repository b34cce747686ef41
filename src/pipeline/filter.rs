//! Final clean-up of Markdown image references.
//!
//! Two passes, in order:
//!
//! 1. **Prune** every `![alt](url "title")` whose URL does not look like an
//!    image file (a PDF, an HTML page, a tracking endpoint…).
//! 2. **Drop** an `Images` heading left with nothing under it: followed only
//!    by blank lines and then the end of the document or another heading.
//!
//! The heading rule matches the literal heading text `Images` only.

use once_cell::sync::Lazy;
use regex::Regex;

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "tiff", "avif",
];

static RE_MARKDOWN_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"!\[[^\]]*\]\(([^\s)]+)(?:\s+"[^"]*")?\)"#).unwrap());

static RE_EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

static RE_IMAGES_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#{1,6}\s*Images\s*$").unwrap());

static RE_ANY_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+.*$").unwrap());

/// Run both passes over `markdown`.
pub fn filter_markdown(markdown: &str) -> String {
    if markdown.trim().is_empty() {
        return markdown.to_string();
    }
    let pruned = prune_non_image_refs(markdown);
    remove_empty_images_section(&pruned)
}

/// Whether `url` points at an image file, judged by path extension or a
/// `format=` query parameter.
pub fn is_likely_image_url(url: &str) -> bool {
    if url.trim().is_empty() {
        return false;
    }
    let lower = url.to_lowercase();
    let (path, query) = match lower.split_once('?') {
        Some((p, q)) => (p, q),
        None => (lower.as_str(), ""),
    };

    if IMAGE_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(&format!(".{ext}")))
    {
        return true;
    }
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| query.contains(&format!("format={ext}")))
}

fn collapse_newlines(s: &str) -> String {
    RE_EXCESS_NEWLINES.replace_all(s, "\n\n").into_owned()
}

// ── Pass 1: prune ────────────────────────────────────────────────────────

fn prune_non_image_refs(markdown: &str) -> String {
    let pruned = RE_MARKDOWN_IMAGE.replace_all(markdown, |caps: &regex::Captures| {
        if is_likely_image_url(&caps[1]) {
            caps[0].to_string()
        } else {
            String::new()
        }
    });
    collapse_newlines(&pruned)
}

// ── Pass 2: empty "Images" heading ───────────────────────────────────────

fn remove_empty_images_section(markdown: &str) -> String {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if RE_IMAGES_HEADING.is_match(line) {
            let mut j = i + 1;
            while j < lines.len() && lines[j].trim().is_empty() {
                j += 1;
            }
            if j >= lines.len() || RE_ANY_HEADING.is_match(lines[j]) {
                i = j;
                continue;
            }
        }
        kept.push(line);
        i += 1;
    }

    let mut out = kept.join("\n");
    if markdown.ends_with('\n') && !out.is_empty() {
        out.push('\n');
    }
    collapse_newlines(&out)
}
