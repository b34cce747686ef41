//! Pipeline stages for web-page decluttering.
//!
//! Each submodule implements one transformation step and is testable on
//! its own; the browser-facing pieces sit behind small traits
//! ([`fetch::FastFetcher`], [`fetch::RenderedFetcher`],
//! [`interaction::InteractionTarget`]) so stubs can stand in for Chromium.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ fetch ──────────────▶ markdown ──▶ llm ──▶ postprocess ──▶ filter
//! (URL)     fast HTTP GET          (tokens,     (LLM)   (tidy)          (image refs)
//!           └─▶ browser render      htmd)
//!               (idle, evasion,
//!                interaction)
//! ```
//!
//! 1. [`input`]   : validate the URL, default the scheme to https
//! 2. [`fetch`]   : plain GET first; fall back to [`browser`] when the page
//!    is blocked, thin or unreachable
//! 3. [`markdown`]: HTML → Markdown with images, links and tables protected
//!    by placeholder tokens
//! 4. [`llm`]     : ask the model for the main content only (optional)
//! 5. [`postprocess`]: deterministic cleanup of the model's answer
//! 6. [`filter`]  : prune non-image `![..](..)` references

pub mod browser;
pub mod evasion;
pub mod fetch;
pub mod filter;
pub mod idle;
pub mod input;
pub mod interaction;
pub mod llm;
pub mod markdown;
pub mod postprocess;
