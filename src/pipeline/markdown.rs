//! HTML → Markdown conversion that keeps images, links and tables intact.
//!
//! General-purpose converters flatten or mangle three things this pipeline
//! cares about: images (relative URLs, logos), links (relative URLs, empty
//! anchors) and tables (complex markup). Those elements are therefore turned
//! into finished Markdown fragments up front and replaced in the tree by
//! opaque tokens; `htmd` converts what remains, and the tokens are swapped
//! back afterwards.
//!
//! ## Token format
//!
//! `DCL<nonce>X<n>Z`, where `nonce` is 16 random hex digits drawn per
//! conversion. Tokens are purely alphanumeric so the converter never escapes
//! them, and the nonce makes a collision with page text practically
//! impossible.
//!
//! ## Order
//!
//! Images first, then links, then tables. A later element's recorded
//! fragment has any earlier tokens in its text expanded immediately, so a
//! linked image or a link inside a table cell comes out whole.

use crate::error::DeclutterError;
use dom_query::{Document, NodeRef, Selection};
use serde::Serialize;
use std::fmt::Write as _;
use tracing::debug;

const STRIPPED: &str = "script, style, iframe, object, embed, noscript";

/// How many fragments of each kind were protected during one conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FragmentCounts {
    pub images: usize,
    pub links: usize,
    pub tables: usize,
}

impl FragmentCounts {
    pub fn total(&self) -> usize {
        self.images + self.links + self.tables
    }
}

/// Output of [`convert_page`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedPage {
    pub markdown: String,
    pub hostname: String,
    pub counts: FragmentCounts,
}

#[derive(Debug, Clone, Copy)]
enum FragmentKind {
    Image,
    Link,
    Table,
}

/// Per-call placeholder bookkeeping.
///
/// Every token handed out by [`ConversionContext::record`] maps to exactly one
/// fragment; [`ConversionContext::resolve`] substitutes all of them and
/// asserts none survive.
#[derive(Debug)]
pub struct ConversionContext {
    hostname: String,
    prefix: String,
    fragments: Vec<String>,
    counts: FragmentCounts,
}

impl ConversionContext {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self::with_nonce(hostname, rand::random::<u64>())
    }

    fn with_nonce(hostname: impl Into<String>, nonce: u64) -> Self {
        Self {
            hostname: hostname.into(),
            prefix: format!("DCL{nonce:016x}X"),
            fragments: Vec::new(),
            counts: FragmentCounts::default(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn tokens_issued(&self) -> usize {
        self.fragments.len()
    }

    fn token(&self, id: usize) -> String {
        format!("{}{}Z", self.prefix, id)
    }

    fn record(&mut self, kind: FragmentKind, fragment: String) -> String {
        let id = self.fragments.len();
        self.fragments.push(fragment);
        match kind {
            FragmentKind::Image => self.counts.images += 1,
            FragmentKind::Link => self.counts.links += 1,
            FragmentKind::Table => self.counts.tables += 1,
        }
        self.token(id)
    }

    /// Replace every known token in `text` with its fragment.
    ///
    /// Fragments are stored already expanded, so one pass suffices.
    pub fn expand(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(pos) = rest.find(&self.prefix) {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + self.prefix.len()..];
            let digits = after.bytes().take_while(u8::is_ascii_digit).count();
            let fragment = after[..digits]
                .parse::<usize>()
                .ok()
                .filter(|_| after[digits..].starts_with('Z'))
                .and_then(|id| self.fragments.get(id));
            match fragment {
                Some(f) => {
                    out.push_str(f);
                    rest = &after[digits + 1..];
                }
                None => {
                    out.push_str(&self.prefix);
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Final substitution.
    ///
    /// # Panics
    /// If any text carrying this context's nonce survives substitution. That
    /// can only happen through a bookkeeping bug, never through input data.
    pub fn resolve(&self, markdown: &str) -> String {
        let out = self.expand(markdown);
        assert!(
            !out.contains(&self.prefix),
            "unresolved placeholder token left in converted markdown"
        );
        out
    }
}

/// Make a possibly relative URL absolute against `hostname`.
///
/// | input              | output                     |
/// |--------------------|----------------------------|
/// | `http(s)://…`      | unchanged                  |
/// | `//cdn/x.png`      | `https://cdn/x.png`        |
/// | `/a/b`             | `https://{hostname}/a/b`   |
/// | `a/b`              | `https://{hostname}/a/b`   |
///
/// Blank input is returned unchanged.
pub fn normalize_url(url: &str, hostname: &str) -> String {
    if url.trim().is_empty() || url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else if url.starts_with("//") {
        format!("https:{url}")
    } else if url.starts_with('/') {
        format!("https://{hostname}{url}")
    } else {
        format!("https://{hostname}/{url}")
    }
}

/// Convert raw page markup to Markdown. See [`convert_page`].
pub fn html_to_markdown(html: &str, hostname: &str) -> Result<String, DeclutterError> {
    convert_page(html, hostname).map(|p| p.markdown)
}

/// Convert raw page markup to Markdown, reporting how many fragments were
/// protected.
///
/// Blank input yields an empty document.
pub fn convert_page(html: &str, hostname: &str) -> Result<ConvertedPage, DeclutterError> {
    let mut ctx = ConversionContext::new(hostname);
    if html.trim().is_empty() {
        return Ok(ConvertedPage {
            markdown: String::new(),
            hostname: hostname.to_string(),
            counts: FragmentCounts::default(),
        });
    }

    let doc = Document::from(html);
    doc.select(STRIPPED).remove();

    protect_images(&doc, &mut ctx);
    protect_links(&doc, &mut ctx);
    protect_tables(&doc, &mut ctx);

    let body = doc.select("body");
    let residual = if body.length() > 0 {
        body.inner_html().to_string()
    } else {
        doc.html().to_string()
    };

    let converted = converter()
        .convert(&residual)
        .map_err(|e| DeclutterError::Internal(format!("HTML → Markdown conversion failed: {e}")))?;

    let markdown = ctx.resolve(&converted);
    debug!(
        "Converted {} bytes of HTML → {} bytes of Markdown ({} images, {} links, {} tables)",
        html.len(),
        markdown.len(),
        ctx.counts.images,
        ctx.counts.links,
        ctx.counts.tables
    );

    Ok(ConvertedPage {
        markdown,
        hostname: hostname.to_string(),
        counts: ctx.counts,
    })
}

fn converter() -> htmd::HtmlToMarkdown {
    use htmd::options::{CodeBlockStyle, HeadingStyle, LinkStyle, Options};
    let options = Options {
        heading_style: HeadingStyle::Atx,
        code_block_style: CodeBlockStyle::Fenced,
        link_style: LinkStyle::Inlined,
        ..Default::default()
    };
    htmd::HtmlToMarkdown::builder().options(options).build()
}

// ── Attribute helpers ────────────────────────────────────────────────────

fn attr(sel: &Selection, name: &str) -> String {
    sel.attr(name).map(|v| v.to_string()).unwrap_or_default()
}

fn normalized_text(sel: &Selection) -> String {
    sel.text().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn title_suffix(title: &str) -> String {
    if title.trim().is_empty() {
        String::new()
    } else {
        format!(" \"{title}\"")
    }
}

fn has_ancestor(sel: &Selection, tags: &[&str]) -> bool {
    let mut current = sel.parent();
    while current.length() > 0 {
        let tag = current
            .nodes()
            .first()
            .and_then(NodeRef::node_name)
            .map(|t| t.to_ascii_lowercase());
        if let Some(tag) = tag {
            if tags.contains(&tag.as_str()) {
                return true;
            }
        }
        current = current.parent();
    }
    false
}

// ── Images ───────────────────────────────────────────────────────────────

/// Logos and chrome images: never part of the article.
fn is_decorative_image(img: &Selection) -> bool {
    let alt = attr(img, "alt").to_lowercase();
    let title = attr(img, "title").to_lowercase();
    if alt.contains("logo") || title.contains("logo") {
        return true;
    }

    let src = attr(img, "src").to_lowercase();
    if ["logo", "branding", "masthead"].iter().any(|k| src.contains(k)) {
        return true;
    }

    let class = attr(img, "class").to_lowercase();
    let id = attr(img, "id").to_lowercase();
    if ["logo", "brand", "masthead"]
        .iter()
        .any(|k| class.contains(k) || id.contains(k))
    {
        return true;
    }

    has_ancestor(img, &["header", "footer", "nav"])
}

fn protect_images(doc: &Document, ctx: &mut ConversionContext) {
    let nodes: Vec<NodeRef> = doc.select("img").nodes().to_vec();
    for node in nodes {
        let img = Selection::from(node);
        if is_decorative_image(&img) {
            img.remove();
            continue;
        }

        let src = normalize_url(attr(&img, "src").trim(), ctx.hostname());
        let fragment = if src.trim().is_empty() {
            String::new()
        } else {
            format!(
                "![{}]({}{})",
                attr(&img, "alt"),
                src,
                title_suffix(&attr(&img, "title"))
            )
        };
        let token = ctx.record(FragmentKind::Image, fragment);
        img.replace_with_html(token);
    }
}

// ── Links ────────────────────────────────────────────────────────────────

fn protect_links(doc: &Document, ctx: &mut ConversionContext) {
    let nodes: Vec<NodeRef> = doc.select("a[href]").nodes().to_vec();
    for node in nodes {
        let link = Selection::from(node);
        let href = attr(&link, "href");
        let href = href.trim();
        let text = normalized_text(&link);

        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || text.is_empty()
        {
            // Keep the children, drop the anchor.
            let inner = link.inner_html();
            link.replace_with_html(inner);
            continue;
        }

        let fragment = format!(
            "[{}]({}{})",
            ctx.expand(&text),
            normalize_url(href, ctx.hostname()),
            title_suffix(&attr(&link, "title"))
        );
        let token = ctx.record(FragmentKind::Link, fragment);
        link.replace_with_html(token);
    }
}

// ── Tables ───────────────────────────────────────────────────────────────

/// Render a table as pipe rows with a `---` separator after the first row.
///
/// Rows of nested tables are flattened into the outer table.
fn table_to_markdown(table: &Selection, ctx: &ConversionContext) -> String {
    let mut out = String::new();
    let mut header_done = false;

    for row_node in table.select("tr").nodes() {
        let row = Selection::from(*row_node);
        let cells: Vec<String> = row
            .select("td, th")
            .nodes()
            .iter()
            .map(|c| {
                let text = normalized_text(&Selection::from(*c)).replace('|', "\\|");
                ctx.expand(&text)
            })
            .collect();
        if cells.is_empty() {
            continue;
        }

        let _ = writeln!(out, "| {} |", cells.join(" | "));
        if !header_done {
            let sep = vec!["---"; cells.len()].join(" | ");
            let _ = writeln!(out, "| {sep} |");
            header_done = true;
        }
    }

    if out.is_empty() {
        out
    } else {
        format!("\n{out}\n")
    }
}

fn protect_tables(doc: &Document, ctx: &mut ConversionContext) {
    let nodes: Vec<NodeRef> = doc.select("table").nodes().to_vec();
    for node in nodes {
        let table = Selection::from(node);
        if has_ancestor(&table, &["table"]) {
            continue;
        }
        let fragment = table_to_markdown(&table, ctx);
        let token = ctx.record(FragmentKind::Table, fragment);
        table.replace_with_html(format!("<p>{token}</p>"));
    }
}
