//! Embed markup from discovered metadata
//!
//! An oEmbed document takes precedence. Videos from providers with a known
//! player are rendered as a lazy-loading facade; other videos pass their
//! markup through. Without a usable oEmbed document, an `og:video` of type
//! `text/html` is rendered as a sandboxed iframe.

use std::sync::OnceLock;

use regex::Regex;

use crate::dom::{Element, parse_fragment};
use crate::oembed::{OEmbedDocument, OEmbedType};
use crate::opengraph::{OgpNode, OgpTree};

/// YouTube embeds narrower than this are scaled up.
const YOUTUBE_MIN_WIDTH: u32 = 560;

const PLAYER_SANDBOX: &str = "allow-same-origin allow-scripts";
const PLAYER_ALLOW: &str = "autoplay; clipboard-write; encrypted-media; picture-in-picture";

fn vimeo_thumb_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<prefix>.*/\d+_)(?P<width>\d+)x(?P<height>\d+)$").expect("valid regex")
    })
}

/// Placeholder standing in for a video player until the reader interacts
/// with it.
///
/// # Example
/// ```
/// use webpage_embed::VideoFacade;
///
/// let facade = VideoFacade {
///     src: Some("http://x/".to_string()),
///     ..Default::default()
/// };
/// assert_eq!(facade.render(), r#"<div class="facade" data-src="http://x/"></div>"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoFacade {
    /// Player URL
    pub src: Option<String>,
    pub title: Option<String>,
    /// Thumbnail URL
    pub thumb: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl VideoFacade {
    /// Render as `<div class="facade">`, omitting absent or empty fields.
    pub fn render(&self) -> String {
        let text = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
        Element::new("div")
            .with_attr("class", "facade")
            .with_attr_opt("title", text(&self.title))
            .with_attr_opt("data-src", text(&self.src))
            .with_attr_opt("data-thumb", text(&self.thumb))
            .with_attr_opt("data-width", self.width)
            .with_attr_opt("data-height", self.height)
            .serialize()
    }
}

/// The first `<iframe>` in `root`, depth first.
pub fn find_iframe(root: &Element) -> Option<&Element> {
    root.find("iframe")
}

/// Build a facade around the iframe in the document's `html`.
///
/// Falls back to the raw `html` when it contains no iframe.
fn provider_facade(
    doc: &OEmbedDocument,
    facade: impl FnOnce(&OEmbedDocument, &Element) -> VideoFacade,
) -> Option<String> {
    let html = doc.html.as_deref()?;
    let root = parse_fragment(html);
    match find_iframe(&root) {
        Some(iframe) => Some(facade(doc, iframe).render()),
        None => {
            tracing::debug!(provider = ?doc.provider_name, "no iframe in oEmbed markup");
            Some(html.to_string())
        }
    }
}

fn scale_to_width(width: Option<u32>, height: Option<u32>, min_width: u32) -> (Option<u32>, Option<u32>) {
    match (width, height) {
        (Some(w), Some(h)) if w > 0 && w < min_width => {
            let scaled = f64::from(h) * f64::from(min_width) / f64::from(w);
            (Some(min_width), Some(scaled.round() as u32))
        }
        other => other,
    }
}

/// Facade for a YouTube video, scaled up to at least 560 pixels wide.
pub fn youtube_facade(doc: &OEmbedDocument) -> Option<String> {
    provider_facade(doc, |doc, iframe| {
        let (width, height) = scale_to_width(doc.width, doc.height, YOUTUBE_MIN_WIDTH);
        VideoFacade {
            src: iframe.attr("src").map(str::to_string),
            title: doc.title.clone(),
            thumb: doc.thumbnail_url.clone(),
            width,
            height,
        }
    })
}

/// Facade for a Vimeo video.
///
/// Vimeo thumbnails end in `_<width>x<height>`; the suffix is rewritten to
/// the embed's size.
pub fn vimeo_facade(doc: &OEmbedDocument) -> Option<String> {
    provider_facade(doc, |doc, iframe| VideoFacade {
        src: iframe.attr("src").map(str::to_string),
        title: doc.title.clone(),
        thumb: doc
            .thumbnail_url
            .as_deref()
            .map(|thumb| resize_vimeo_thumb(thumb, doc.width, doc.height)),
        width: doc.width,
        height: doc.height,
    })
}

fn resize_vimeo_thumb(thumb: &str, width: Option<u32>, height: Option<u32>) -> String {
    let (Some(width), Some(height)) = (width, height) else {
        return thumb.to_string();
    };
    match vimeo_thumb_regex().captures(thumb) {
        Some(caps) => format!("{}{width}x{height}", &caps["prefix"]),
        None => thumb.to_string(),
    }
}

/// Markup for an oEmbed document.
///
/// Photos become an `<img>`, videos a provider facade or the provider's own
/// markup. Other types yield `None`.
pub fn markup_from_oembed(doc: &OEmbedDocument) -> Option<String> {
    match doc.kind {
        OEmbedType::Photo => Some(
            Element::new("img")
                .with_attr_opt("href", doc.url.as_deref())
                .with_attr_opt("width", doc.width)
                .with_attr_opt("height", doc.height)
                .with_attr_opt("title", doc.title.as_deref().filter(|t| !t.is_empty()))
                .serialize(),
        ),
        OEmbedType::Video => match doc.provider_name.as_deref() {
            Some("YouTube") => youtube_facade(doc),
            Some("Vimeo") => vimeo_facade(doc),
            _ => doc.html.clone(),
        },
        OEmbedType::Link | OEmbedType::Rich | OEmbedType::Unknown => None,
    }
}

/// A sandboxed player iframe for the first `og:video` of type `text/html`.
pub fn markup_from_opengraph(tree: &OgpTree) -> Option<String> {
    let meta = |video: &OgpNode, key: &str| video.get(key).and_then(OgpNode::content).map(str::to_string);

    let video = tree
        .get_all("og:video")
        .iter()
        .find(|video| video.get("type").and_then(OgpNode::content) == Some("text/html"))?;
    let src = video.content()?;

    Some(
        Element::new("iframe")
            .with_attr("src", src)
            .with_attr_opt("width", meta(video, "width"))
            .with_attr_opt("height", meta(video, "height"))
            .with_attr("frameborder", "0")
            .with_attr("sandbox", PLAYER_SANDBOX)
            .with_attr("allow", PLAYER_ALLOW)
            .with_attr("class", "player")
            .serialize(),
    )
}

#[cfg(feature = "http")]
pub use self::resolver::EmbedResolver;

#[cfg(feature = "http")]
mod resolver {
    use reqwest::Client;

    use super::{markup_from_oembed, markup_from_opengraph};
    use crate::discovery::fetch_meta;
    use crate::error::Result;
    use crate::http::HttpOptions;
    use crate::oembed::OEmbedClient;
    use crate::opengraph::OgpTree;

    /// Resolves the embed markup for a URL.
    ///
    /// Holds one connection pool; cloning is cheap and resolutions may run
    /// concurrently.
    ///
    /// # Example
    /// ```rust,no_run
    /// use webpage_embed::{EmbedResolver, HttpOptions};
    ///
    /// # async fn run() -> webpage_embed::Result<()> {
    /// let resolver = EmbedResolver::new(HttpOptions::new())?.max_width(720);
    /// if let Some(markup) = resolver.resolve("https://www.youtube.com/watch?v=dQw4w9WgXcQ").await {
    ///     println!("{markup}");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[derive(Debug, Clone)]
    pub struct EmbedResolver {
        client: Client,
        options: HttpOptions,
        oembed: OEmbedClient,
    }

    impl EmbedResolver {
        pub fn new(options: HttpOptions) -> Result<Self> {
            let client = options.build_client()?;
            Ok(Self {
                oembed: OEmbedClient::with_client(client.clone(), options.clone()),
                client,
                options,
            })
        }

        /// Ask oEmbed providers for embeds no wider than `width`.
        pub fn max_width(mut self, width: u32) -> Self {
            self.oembed = self.oembed.max_width(width);
            self
        }

        /// Ask oEmbed providers for embeds no taller than `height`.
        pub fn max_height(mut self, height: u32) -> Self {
            self.oembed = self.oembed.max_height(height);
            self
        }

        /// Resolve the embed for `url`, returning fetch errors.
        ///
        /// `Ok(None)` means the page publishes nothing embeddable.
        pub async fn try_resolve(&self, url: &str) -> Result<Option<String>> {
            let meta = fetch_meta(&self.client, url, &self.options).await?;

            if !meta.links.is_empty()
                && let Some(doc) = self.oembed.get_oembed(&meta.links).await?
            {
                if let Some(markup) = markup_from_oembed(&doc) {
                    return Ok(Some(markup));
                }
                tracing::debug!(url = %url, kind = %doc.kind, "no markup for oEmbed type, trying Open Graph");
            }

            Ok(markup_from_opengraph(&OgpTree::from_properties(
                &meta.properties,
            )))
        }

        /// Resolve the embed for `url`.
        ///
        /// Failures are logged and yield `None`.
        pub async fn resolve(&self, url: &str) -> Option<String> {
            match self.try_resolve(url).await {
                Ok(markup) => markup,
                Err(err) => {
                    tracing::warn!(url = %url, error = %err, "failed to resolve embed");
                    None
                }
            }
        }
    }
}
