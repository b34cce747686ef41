//! Result types and on-disk layout.
//!
//! A decluttered page is written as two files under the output directory:
//!
//! ```text
//! <dir>/Decluttered/<site>/<prefix>.md            the Markdown
//! <dir>/Decluttered/<site>/<prefix>.metadata.md   a | Metadata | Value | table
//! ```
//!
//! `<site>` is the host without a leading `www.` and with dots turned into
//! dashes; `<prefix>` is the last non-empty path segment, or `index`.

use crate::error::DeclutterError;
use crate::pipeline::fetch::FetchSource;
use crate::pipeline::markdown::FragmentCounts;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Everything produced for one URL.
#[derive(Debug, Clone, Serialize)]
pub struct DeclutterOutput {
    pub url: String,
    pub hostname: String,
    pub source: FetchSource,
    pub markdown: String,
    pub fragments: FragmentCounts,
    pub stats: DeclutterStats,
    pub fetched_at: DateTime<Local>,
}

/// Provider, token and timing figures. Provider fields stay `None` when the
/// LLM stage was skipped.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeclutterStats {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub llm_retries: u32,
    pub fetch_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl DeclutterStats {
    pub fn total_tokens(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    pub fn llm_ran(&self) -> bool {
        self.provider.is_some()
    }
}

/// Paths of the files written by [`write_outputs`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenFiles {
    pub markdown: PathBuf,
    pub metadata: PathBuf,
}

/// `(site directory, file prefix)` for `url`.
pub fn path_parts(url: &Url) -> (String, String) {
    let host = url.host_str().unwrap_or("unknown");
    let host = host.strip_prefix("www.").unwrap_or(host);
    let site = host.replace('.', "-");

    let prefix = url
        .path_segments()
        .and_then(|mut segs| segs.rfind(|s| !s.is_empty()))
        .map(sanitize_segment)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "index".to_string());

    (site, prefix)
}

/// Keep a path segment usable as a file name on every platform.
fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

/// The `| Metadata | Value |` table written next to the Markdown.
pub fn metadata_table(output: &DeclutterOutput) -> String {
    let mut rows: Vec<(&str, String)> = vec![
        ("Url", output.url.clone()),
        ("Source", output.source.to_string()),
    ];
    let s = &output.stats;
    if s.llm_ran() {
        rows.push(("Provider", s.provider.clone().unwrap_or_default()));
        rows.push(("Model", s.model.clone().unwrap_or_default()));
        rows.push(("Input Tokens", s.input_tokens.to_string()));
        rows.push(("Output Tokens", s.output_tokens.to_string()));
        rows.push(("Total Tokens", s.total_tokens().to_string()));
    }
    rows.push((
        "Time",
        output.fetched_at.format("%B %d, %Y %H:%M").to_string(),
    ));

    let mut table = String::from("| Metadata | Value |\n|---|---|\n");
    for (k, v) in rows {
        table.push_str(&format!("| {} | {} |\n", k, v.replace('|', "\\|")));
    }
    table
}

/// Write the Markdown and metadata files for `output` under `dir`.
pub async fn write_outputs(
    dir: &Path,
    output: &DeclutterOutput,
) -> Result<WrittenFiles, DeclutterError> {
    let url = Url::parse(&output.url).map_err(|e| DeclutterError::InvalidUrl {
        input: output.url.clone(),
        reason: e.to_string(),
    })?;
    let (site, prefix) = path_parts(&url);
    let folder = dir.join("Decluttered").join(site);

    let files = WrittenFiles {
        markdown: folder.join(format!("{prefix}.md")),
        metadata: folder.join(format!("{prefix}.metadata.md")),
    };
    write_atomic(&files.markdown, output.markdown.as_bytes()).await?;
    write_atomic(&files.metadata, metadata_table(output).as_bytes()).await?;
    Ok(files)
}

/// Write to a sibling temp file, then rename over `path`. Parent
/// directories are created as needed.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DeclutterError> {
    let fail = |source| DeclutterError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await.map_err(fail)?;
    tokio::fs::rename(&tmp, path).await.map_err(fail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(url: &str, llm: bool) -> DeclutterOutput {
        let stats = if llm {
            DeclutterStats {
                provider: Some("openai".into()),
                model: Some("gpt-4.1-nano".into()),
                input_tokens: 1200,
                output_tokens: 300,
                ..Default::default()
            }
        } else {
            DeclutterStats::default()
        };
        DeclutterOutput {
            url: url.into(),
            hostname: "www.example.com".into(),
            source: FetchSource::Rendered,
            markdown: "# Title\n\nBody\n".into(),
            fragments: FragmentCounts::default(),
            stats,
            fetched_at: Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 0).unwrap(),
        }
    }

    fn parts(u: &str) -> (String, String) {
        path_parts(&Url::parse(u).unwrap())
    }

    #[test]
    fn site_drops_www_and_dashes_dots() {
        assert_eq!(parts("https://www.blog.example.co.uk/a").0, "blog-example-co-uk");
        assert_eq!(parts("http://example.com").0, "example-com");
    }

    #[test]
    fn prefix_is_last_segment_or_index() {
        assert_eq!(parts("https://a.test/posts/my-post").1, "my-post");
        assert_eq!(parts("https://a.test/posts/my-post/").1, "my-post");
        assert_eq!(parts("https://a.test/").1, "index");
        assert_eq!(parts("https://a.test").1, "index");
        assert_eq!(parts("https://a.test/..").1, "index");
    }

    #[test]
    fn metadata_with_llm() {
        let t = metadata_table(&sample("https://www.example.com/p", true));
        assert!(t.starts_with("| Metadata | Value |\n|---|---|\n"));
        assert!(t.contains("| Url | https://www.example.com/p |"));
        assert!(t.contains("| Source | rendered |"));
        assert!(t.contains("| Provider | openai |"));
        assert!(t.contains("| Total Tokens | 1500 |"));
        assert!(t.contains("| Time | March 05, 2024 14:07 |"), "{t}");
    }

    #[test]
    fn metadata_without_llm_omits_provider_rows() {
        let t = metadata_table(&sample("https://www.example.com/p", false));
        assert!(!t.contains("Provider"));
        assert!(!t.contains("Tokens"));
        assert!(t.contains("| Time |"));
    }

    #[tokio::test]
    async fn outputs_written_under_site_folder() {
        let dir = tempfile::tempdir().unwrap();
        let out = sample("https://www.example.com/news/story", true);
        let files = write_outputs(dir.path(), &out).await.unwrap();

        let folder = dir.path().join("Decluttered").join("example-com");
        assert_eq!(files.markdown, folder.join("story.md"));
        assert_eq!(files.metadata, folder.join("story.metadata.md"));
        assert_eq!(std::fs::read_to_string(&files.markdown).unwrap(), out.markdown);
        assert!(std::fs::read_to_string(&files.metadata)
            .unwrap()
            .contains("| Model | gpt-4.1-nano |"));
        assert!(!folder.join("story.md.tmp").exists());
    }
}
