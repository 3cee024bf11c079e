//! # webpage-embed
//!
//! Resolve a rich embed for any URL: discover the metadata a page publishes
//! and turn it into a small, safe HTML fragment.
//!
//! ## Features
//!
//! - Streaming head scan of `<link>`, `<base>` and `<meta property>` elements,
//!   tolerant of any declared charset and of malformed markup
//! - `Link` response header discovery
//! - oEmbed client with JSON and XML content negotiation
//! - OpenGraph property trees with repeated values and metadata
//! - Lazy-loading facades for YouTube and Vimeo players
//! - Minimal HTML fragment parser and serialiser
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! #[tokio::main]
//! async fn main() {
//!     if let Some(markup) = webpage_embed::fetch_embed("https://vimeo.com/76979871").await {
//!         println!("{markup}");
//!     }
//! }
//! ```
//!
//! ## Custom HTTP Options
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use webpage_embed::{EmbedResolver, HttpOptions};
//!
//! #[tokio::main]
//! async fn main() -> webpage_embed::Result<()> {
//!     let options = HttpOptions::new()
//!         .timeout(Duration::from_secs(10))
//!         .user_agent("MyBlog/1.0");
//!
//!     let resolver = EmbedResolver::new(options)?.max_width(720);
//!     let markup = resolver.try_resolve("https://example.org/video").await?;
//!     println!("{markup:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Parsing Local HTML
//!
//! ```rust
//! use url::Url;
//! use webpage_embed::{OgpTree, PageMeta, markup_from_opengraph};
//!
//! let html = r#"<html><head>
//!     <meta property="og:video" content="https://example.org/player">
//!     <meta property="og:video:type" content="text/html">
//! </head></html>"#;
//! let base = Url::parse("https://example.org/").unwrap();
//! let meta = PageMeta::from_str(html, &base);
//! let tree = OgpTree::from_properties(&meta.properties);
//! assert!(markup_from_opengraph(&tree).unwrap().starts_with("<iframe"));
//! ```
//!
//! ## Without HTTP (parsing only)
//!
//! If you don't need network resolution, disable the default `http` feature:
//!
//! ```toml
//! [dependencies]
//! webpage-embed = { version = "0.1", default-features = false }
//! ```

mod decode;
mod discovery;
mod dom;
mod embed;
mod error;
mod header;
mod oembed;
mod opengraph;

#[cfg(feature = "http")]
mod http;

pub use decode::{ChunkDecoder, DecodedChunks, encoding_for_label};
pub use discovery::{HeadScanner, Link, MetaProperty, PageMeta, links_from_headers};
pub use dom::{Element, Node, escape, parse_fragment};
pub use embed::{
    VideoFacade, find_iframe, markup_from_oembed, markup_from_opengraph, vimeo_facade,
    youtube_facade,
};
pub use error::{Error, Result};
pub use header::{ParsedHeader, parse_header};
pub use oembed::{
    OEmbedDocument, OEmbedType, build_request_url, find_oembed_link, parse_document, parse_json,
    parse_xml,
};
pub use opengraph::{OgpNode, OgpTree};

#[cfg(feature = "http")]
pub use discovery::fetch_meta;
#[cfg(feature = "http")]
pub use embed::EmbedResolver;
#[cfg(feature = "http")]
pub use http::HttpOptions;
#[cfg(feature = "http")]
pub use oembed::OEmbedClient;

/// Resolve the embed for `url` with default options.
///
/// Returns `None` when the page publishes nothing embeddable or when
/// fetching fails.
#[cfg(feature = "http")]
pub async fn fetch_embed(url: &str) -> Option<String> {
    match EmbedResolver::new(HttpOptions::default()) {
        Ok(resolver) => resolver.resolve(url).await,
        Err(err) => {
            tracing::warn!(error = %err, "failed to build HTTP client");
            None
        }
    }
}
