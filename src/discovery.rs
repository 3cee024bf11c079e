//! Metadata discovery from `<link>`/`<meta>` elements and `Link` headers
//!
//! Only the document head is scanned: tokenizing stops at `</head>` (or the
//! start of `<body>`), so large pages are never read in full.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use encoding_rs::Encoding;
use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
    TokenizerResult,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::decode::DecodedChunks;
use crate::error::Result;
use crate::header::parse_header;

/// Attributes of a `<link>` element or `Link` header.
///
/// Attribute names are lower-cased, `rel` and `type` values are lower-cased,
/// and all values are trimmed. A present but empty attribute maps to an
/// empty string. `href` is absolute once discovery has finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub attrs: HashMap<String, String>,
}

impl Link {
    /// Build a link from raw attribute pairs, normalising them.
    pub fn from_attrs<K, V>(attrs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let attrs = attrs
            .into_iter()
            .map(|(name, value)| {
                let name = name.as_ref().to_lowercase();
                let value = value.as_ref().trim();
                let value = if name == "rel" || name == "type" {
                    value.to_lowercase()
                } else {
                    value.to_string()
                };
                (name, value)
            })
            .collect();
        Self { attrs }
    }

    /// Get an attribute value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn rel(&self) -> Option<&str> {
        self.get("rel")
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.get("type")
    }

    pub fn href(&self) -> Option<&str> {
        self.get("href")
    }

    fn resolve_href(&mut self, base: &Url) {
        if let Some(href) = self.attrs.get_mut("href")
            && let Ok(resolved) = base.join(href)
        {
            *href = resolved.to_string();
        }
    }
}

/// A `<meta property=… content=…>` pair, kept in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaProperty {
    pub property: String,
    pub content: String,
}

impl MetaProperty {
    pub fn new(property: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            content: content.into(),
        }
    }
}

/// Links and properties discovered for a page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// `Link` headers followed by `<link>` elements, in discovery order
    pub links: Vec<Link>,

    /// `<meta property>` values in document order
    pub properties: Vec<MetaProperty>,
}

impl PageMeta {
    /// Scan the head of an HTML document held in memory.
    ///
    /// # Example
    /// ```
    /// use url::Url;
    /// use webpage_embed::PageMeta;
    ///
    /// let html = r#"<head><link rel="alternate" href="/feed"></head>"#;
    /// let base = Url::parse("https://example.com/post").unwrap();
    /// let meta = PageMeta::from_str(html, &base);
    /// assert_eq!(meta.links[0].href(), Some("https://example.com/feed"));
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(html: &str, base: &Url) -> Self {
        let mut scanner = HeadScanner::new(base.clone());
        scanner.feed(html);
        scanner.finish()
    }

    /// Scan the head of an HTML document read from `reader`.
    pub fn from_reader<R: Read>(reader: R, base: &Url, encoding: &'static Encoding) -> Result<Self> {
        let mut scanner = HeadScanner::new(base.clone());
        for chunk in DecodedChunks::new(reader, encoding) {
            if !scanner.feed(&chunk?) {
                break;
            }
        }
        Ok(scanner.finish())
    }

    /// Scan the head of an HTML file.
    pub fn from_file(
        path: impl AsRef<Path>,
        base: &Url,
        encoding: &'static Encoding,
    ) -> Result<Self> {
        Self::from_reader(File::open(path)?, base, encoding)
    }
}

/// Streaming scanner collecting head metadata from decoded text chunks.
pub struct HeadScanner {
    tokenizer: Tokenizer<HeadSink>,
    input: BufferQueue,
}

impl HeadScanner {
    /// Create a scanner resolving hrefs against `base` until a `<base>`
    /// element says otherwise.
    pub fn new(base: Url) -> Self {
        let sink = HeadSink {
            base,
            links: Vec::new(),
            properties: Vec::new(),
            finished: false,
        };
        Self {
            tokenizer: Tokenizer::new(sink, TokenizerOpts::default()),
            input: BufferQueue::new(),
        }
    }

    /// Feed the next chunk of text.
    ///
    /// Returns `false` once the head has ended and no further input is
    /// needed.
    pub fn feed(&mut self, chunk: &str) -> bool {
        if self.tokenizer.sink.finished {
            return false;
        }
        self.input.push_back(StrTendril::from_slice(chunk));
        // The sink never yields a script handle, so one call drains the input.
        while let TokenizerResult::Script(()) = self.tokenizer.feed(&mut self.input) {}
        !self.tokenizer.sink.finished
    }

    /// Whether the end of the head has been seen.
    pub fn is_finished(&self) -> bool {
        self.tokenizer.sink.finished
    }

    /// Finish scanning and resolve every collected href against the final
    /// base URL.
    pub fn finish(mut self) -> PageMeta {
        if !self.tokenizer.sink.finished {
            self.tokenizer.end();
        }
        let sink = self.tokenizer.sink;
        let mut links = sink.links;
        for link in &mut links {
            link.resolve_href(&sink.base);
        }
        PageMeta {
            links,
            properties: sink.properties,
        }
    }
}

struct HeadSink {
    base: Url,
    links: Vec<Link>,
    properties: Vec<MetaProperty>,
    finished: bool,
}

impl HeadSink {
    fn start_tag(&mut self, tag: &Tag) -> TokenSinkResult<()> {
        match &*tag.name {
            "link" => self.links.push(Link::from_attrs(
                tag.attrs.iter().map(|a| (&*a.name.local, &*a.value)),
            )),
            "base" => {
                if let Some(href) = attr(tag, "href")
                    && let Ok(base) = self.base.join(href.trim())
                {
                    self.base = base;
                }
            }
            "meta" => {
                if let (Some(property), Some(content)) = (attr(tag, "property"), attr(tag, "content"))
                {
                    self.properties
                        .push(MetaProperty::new(property.trim(), content.trim()));
                }
            }
            "body" => self.finished = true,
            "script" => return TokenSinkResult::RawData(RawKind::ScriptData),
            "style" => return TokenSinkResult::RawData(RawKind::Rawtext),
            "title" => return TokenSinkResult::RawData(RawKind::Rcdata),
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

fn attr<'a>(tag: &'a Tag, name: &str) -> Option<&'a str> {
    tag.attrs
        .iter()
        .find(|a| (&*a.name.local).eq_ignore_ascii_case(name))
        .map(|a| &*a.value)
}

impl TokenSink for HeadSink {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        if self.finished {
            return TokenSinkResult::Continue;
        }
        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => return self.start_tag(&tag),
                TagKind::EndTag if &*tag.name == "head" => self.finished = true,
                TagKind::EndTag => {}
            },
            Token::ParseError(err) => tracing::debug!(error = %err, "HTML parse error in head"),
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

/// Parse `Link` header values of the form `<url>; rel=…; type=…`.
///
/// Each value describes one link. Values whose first token is not wrapped in
/// angle brackets are ignored. Relative URLs are resolved against `base`.
pub fn links_from_headers<'a>(values: impl IntoIterator<Item = &'a str>, base: &Url) -> Vec<Link> {
    values
        .into_iter()
        .filter_map(|value| {
            let header = parse_header(value);
            let target = header
                .value
                .strip_prefix('<')
                .and_then(|v| v.strip_suffix('>'))?;
            let mut link = Link::from_attrs(header.params);
            let href = base
                .join(target.trim())
                .map(|u| u.to_string())
                .unwrap_or_else(|_| target.trim().to_string());
            link.attrs.insert("href".to_string(), href);
            Some(link)
        })
        .collect()
}

#[cfg(feature = "http")]
pub use self::fetch::fetch_meta;

#[cfg(feature = "http")]
mod fetch {
    use futures_util::StreamExt;
    use reqwest::Client;
    use reqwest::header::{CONTENT_TYPE, LINK};
    use tokio::sync::mpsc;

    use super::{HeadScanner, PageMeta, links_from_headers};
    use crate::decode::{ChunkDecoder, encoding_for_label};
    use crate::error::{Error, Result};
    use crate::header::parse_header;
    use crate::http::{self, HttpOptions};

    /// Content types whose bodies are scanned for head metadata.
    const HTML_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

    // Decoded chunks buffered between the download and the scanner.
    const SCAN_QUEUE_DEPTH: usize = 4;

    /// Fetch `url` and discover its links and head properties.
    ///
    /// `Link` response headers are always read. The body is only scanned
    /// when it is HTML; any other content type yields no properties.
    pub async fn fetch_meta(client: &Client, url: &str, options: &HttpOptions) -> Result<PageMeta> {
        let response = http::get(client, url, options, None).await?;
        let base = response.url().clone();

        let link_headers: Vec<&str> = response
            .headers()
            .get_all(LINK)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let mut links = links_from_headers(link_headers, &base);

        let content_type = parse_header(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/octet-stream"),
        );
        if !HTML_CONTENT_TYPES.contains(&content_type.media_type().as_str()) {
            tracing::debug!(url = %base, content_type = %content_type.value, "not scanning non-HTML body");
            return Ok(PageMeta {
                links,
                properties: Vec::new(),
            });
        }
        let encoding = encoding_for_label(content_type.param("charset"));

        // The tokenizer is not Send, so it lives on a blocking thread and is
        // fed decoded text over a channel. Dropping the receiver once the
        // head has ended stops the download.
        let (tx, mut rx) = mpsc::channel::<String>(SCAN_QUEUE_DEPTH);
        let scan = tokio::task::spawn_blocking(move || {
            let mut scanner = HeadScanner::new(base);
            while let Some(chunk) = rx.blocking_recv() {
                if !scanner.feed(&chunk) {
                    break;
                }
            }
            scanner.finish()
        });

        let mut decoder = ChunkDecoder::new(encoding);
        let mut received = 0usize;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            let remaining = options.max_body_size.saturating_sub(received);
            let take = chunk.len().min(remaining);
            received += take;

            let text = decoder.decode(&chunk[..take])?;
            if tx.send(text).await.is_err() || take < chunk.len() {
                break;
            }
        }
        drop(tx);

        let head = scan.await.map_err(|e| Error::Task(e.to_string()))?;
        links.extend(head.links);
        tracing::debug!(
            url = %url,
            links = links.len(),
            properties = head.properties.len(),
            bytes = received,
            "discovered page metadata"
        );

        Ok(PageMeta {
            links,
            properties: head.properties,
        })
    }
}
