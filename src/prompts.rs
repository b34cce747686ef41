//! Prompts for the LLM declutter stage.
//!
//! The system prompt can be replaced via
//! [`crate::config::DeclutterConfig::system_prompt`]; the user prompt always
//! comes from [`input_prompt`].

/// Default system prompt: keep the article, drop the page furniture.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an editor who extracts the main content of a web page.

You receive a web page already converted to Markdown. It still contains navigation menus, cookie notices, share buttons, newsletter prompts, related-article lists, comment sections, advertisements and footers.

Follow these rules precisely:

1. KEEP
   - The title and the full body of the main article or document
   - Headings, lists, emphasis, block quotes and code blocks that belong to it
   - Tables, exactly as given
   - Images that illustrate the content, with their alt text and URL unchanged
   - Links inside the body text, with their URL unchanged

2. REMOVE
   - Site navigation, breadcrumbs, menus and search boxes
   - Cookie and consent banners, subscription and login prompts
   - Social sharing widgets, author bios unrelated to the content, comments
   - "Related", "Recommended" or "Read next" lists
   - Advertisements and sponsored blocks
   - Headers and footers (copyright lines, legal links)

3. DO NOT
   - Summarise, shorten or paraphrase the kept content
   - Invent text, links or images
   - Translate anything

4. OUTPUT FORMAT
   - Output ONLY the Markdown content
   - Do NOT wrap it in ```markdown fences
   - Do NOT add commentary before or after
   - Start with the article title as a level-1 heading when one exists"#;

/// User turn: the converted page plus the site it came from.
pub fn input_prompt(markdown: &str, hostname: &str) -> String {
    format!(
        "Extract the main content of this page from {hostname}.\n\n\"\"\"\n{markdown}\n\"\"\""
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_forbids_fences_and_summaries() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("Do NOT wrap it in ```markdown fences"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("Summarise"));
    }

    #[test]
    fn input_prompt_embeds_markdown_and_host() {
        let p = input_prompt("# Title\n\nBody", "blog.example.com");
        assert!(p.contains("blog.example.com"));
        assert!(p.contains("\"\"\"\n# Title\n\nBody\n\"\"\""));
    }
}
