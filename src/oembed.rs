//! [oEmbed](https://oembed.com/) discovery and document parsing
//!
//! Providers advertise their oEmbed endpoint with a
//! `<link rel="alternate" type="application/json+oembed">` element or the
//! equivalent `Link` header. The endpoint may answer in JSON or XML; both
//! are parsed into the same [`OEmbedDocument`].

use std::fmt;

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::discovery::Link;
use crate::error::{Error, Result};

/// Link types that point at an oEmbed endpoint.
pub const OEMBED_LINK_TYPES: &[&str] = &[
    "application/json+oembed",
    "application/xml+oembed",
    // Deprecated, but still published by some providers.
    "text/xml+oembed",
];

/// Response content types parsed as JSON.
pub const JSON_CONTENT_TYPES: &[&str] = &["application/json", "application/json+oembed"];

/// Response content types parsed as XML.
pub const XML_CONTENT_TYPES: &[&str] = &[
    "application/xml",
    "application/xml+oembed",
    "text/xml",
    "text/xml+oembed",
];

/// Elements read from an XML document; anything else is ignored.
const XML_FIELDS: &[&str] = &[
    "type",
    "version",
    "title",
    "cache_age",
    "author_name",
    "author_url",
    "provider_name",
    "provider_url",
    "thumbnail_url",
    "thumbnail_width",
    "thumbnail_height",
    "url",
    "width",
    "height",
    "html",
];

/// The `type` of an oEmbed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OEmbedType {
    Photo,
    Video,
    Link,
    Rich,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for OEmbedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Link => "link",
            Self::Rich => "rich",
            Self::Unknown => "unknown",
        })
    }
}

/// An oEmbed response.
///
/// Numeric fields accept JSON numbers as well as numeric strings, since XML
/// documents carry every value as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OEmbedDocument {
    #[serde(rename = "type")]
    pub kind: OEmbedType,

    #[serde(default, deserialize_with = "lenient_text")]
    pub version: Option<String>,

    pub title: Option<String>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub cache_age: Option<String>,

    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub provider_name: Option<String>,
    pub provider_url: Option<String>,

    pub thumbnail_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_dimension")]
    pub thumbnail_width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_dimension")]
    pub thumbnail_height: Option<u32>,

    /// Source of a `photo`
    pub url: Option<String>,

    #[serde(default, deserialize_with = "lenient_dimension")]
    pub width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_dimension")]
    pub height: Option<u32>,

    /// Embed markup of a `video` or `rich` document
    pub html: Option<String>,
}

impl OEmbedDocument {
    /// Check that the fields required by the document's type are present.
    pub fn validate(&self) -> Result<()> {
        let required: Vec<(&'static str, bool)> = match self.kind {
            OEmbedType::Photo => vec![
                ("url", self.url.is_some()),
                ("width", self.width.is_some()),
                ("height", self.height.is_some()),
            ],
            OEmbedType::Video | OEmbedType::Rich => vec![
                ("html", self.html.is_some()),
                ("width", self.width.is_some()),
                ("height", self.height.is_some()),
            ],
            OEmbedType::Link | OEmbedType::Unknown => Vec::new(),
        };
        match required.into_iter().find(|(_, present)| !present) {
            Some((field, _)) => Err(Error::MissingField {
                kind: self.kind.to_string(),
                field,
            }),
            None => Ok(()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrNumber {
    Text(String),
    Number(serde_json::Number),
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<TextOrNumber>::deserialize(deserializer)?.map(|value| match value {
        TextOrNumber::Text(text) => text,
        TextOrNumber::Number(number) => number.to_string(),
    }))
}

fn lenient_dimension<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u32>, D::Error> {
    let number = match Option::<TextOrNumber>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(TextOrNumber::Text(text)) => text.trim().parse::<f64>().ok(),
        Some(TextOrNumber::Number(number)) => number.as_f64(),
    };
    Ok(number
        .filter(|n| n.is_finite() && *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n.round() as u32))
}

/// Find the endpoint of the first oEmbed discovery link.
pub fn find_oembed_link(links: &[Link]) -> Option<&str> {
    links
        .iter()
        .filter(|link| link.rel() == Some("alternate"))
        .filter(|link| link.mime_type().is_some_and(|t| OEMBED_LINK_TYPES.contains(&t)))
        .find_map(Link::href)
}

/// Add `maxwidth`/`maxheight` query parameters for the limits that are set.
pub fn build_request_url(endpoint: &str, max_width: Option<u32>, max_height: Option<u32>) -> Result<Url> {
    let mut url = Url::parse(endpoint)?;
    if max_width.is_some() || max_height.is_some() {
        let mut query = url.query_pairs_mut();
        if let Some(width) = max_width {
            query.append_pair("maxwidth", &width.to_string());
        }
        if let Some(height) = max_height {
            query.append_pair("maxheight", &height.to_string());
        }
    }
    Ok(url)
}

/// Parse a JSON oEmbed document.
pub fn parse_json(body: &[u8]) -> Result<OEmbedDocument> {
    let doc: OEmbedDocument = serde_json::from_slice(body)?;
    doc.validate()?;
    Ok(doc)
}

/// Parse an XML oEmbed document.
///
/// Only direct children of the root element are read, and only those named
/// in the oEmbed field list. Text split by CDATA sections or entity
/// references is joined.
pub fn parse_xml(body: &[u8]) -> Result<OEmbedDocument> {
    let mut reader = Reader::from_reader(body);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<(String, String)> = None;
    let mut fields = Map::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                if depth == 2 {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    current = Some((name, String::new()));
                }
            }
            Event::Empty(e) => {
                if depth == 1 {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    insert_field(&mut fields, name, String::new());
                }
            }
            Event::End(_) => {
                if depth == 2
                    && let Some((name, value)) = current.take()
                {
                    insert_field(&mut fields, name, value);
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(e) => {
                if depth == 2
                    && let Some((_, value)) = current.as_mut()
                {
                    value.push_str(&e.decode().map_err(|err| Error::Xml(err.to_string()))?);
                }
            }
            Event::CData(e) => {
                if depth == 2
                    && let Some((_, value)) = current.as_mut()
                {
                    let text = reader
                        .decoder()
                        .decode(&e)
                        .map_err(|err| Error::Xml(err.to_string()))?;
                    value.push_str(&text);
                }
            }
            Event::GeneralRef(e) => {
                if depth == 2
                    && let Some((_, value)) = current.as_mut()
                {
                    let name = e.decode().map_err(|err| Error::Xml(err.to_string()))?;
                    let entity = format!("&{name};");
                    let resolved = quick_xml::escape::unescape(&entity)
                        .map_err(|err| Error::Xml(err.to_string()))?;
                    value.push_str(&resolved);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let doc: OEmbedDocument =
        serde_json::from_value(Value::Object(fields)).map_err(|err| Error::Xml(err.to_string()))?;
    doc.validate()?;
    Ok(doc)
}

fn insert_field(fields: &mut Map<String, Value>, name: String, value: String) {
    if XML_FIELDS.contains(&name.as_str()) {
        fields.insert(name, Value::String(value));
    }
}

/// Parse a document according to its response content type.
///
/// Returns `None` for content types that are not oEmbed documents.
pub fn parse_document(content_type: &str, body: &[u8]) -> Option<Result<OEmbedDocument>> {
    let content_type = content_type.to_ascii_lowercase();
    if JSON_CONTENT_TYPES.contains(&content_type.as_str()) {
        Some(parse_json(body))
    } else if XML_CONTENT_TYPES.contains(&content_type.as_str()) {
        Some(parse_xml(body))
    } else {
        None
    }
}

#[cfg(feature = "http")]
pub use self::client::OEmbedClient;

#[cfg(feature = "http")]
mod client {
    use std::sync::OnceLock;

    use reqwest::Client;
    use reqwest::header::CONTENT_TYPE;

    use super::{
        JSON_CONTENT_TYPES, OEmbedDocument, XML_CONTENT_TYPES, build_request_url,
        find_oembed_link, parse_document,
    };
    use crate::discovery::Link;
    use crate::error::Result;
    use crate::header::parse_header;
    use crate::http::{self, HttpOptions};

    fn accept_header() -> &'static str {
        static ACCEPT: OnceLock<String> = OnceLock::new();
        ACCEPT.get_or_init(|| [JSON_CONTENT_TYPES, XML_CONTENT_TYPES].concat().join(", "))
    }

    /// Fetches oEmbed documents with content negotiation.
    #[derive(Debug, Clone)]
    pub struct OEmbedClient {
        client: Client,
        options: HttpOptions,
        max_width: Option<u32>,
        max_height: Option<u32>,
    }

    impl OEmbedClient {
        /// Create a client with its own connection pool.
        pub fn new(options: HttpOptions) -> Result<Self> {
            Ok(Self::with_client(options.build_client()?, options))
        }

        pub(crate) fn with_client(client: Client, options: HttpOptions) -> Self {
            Self {
                client,
                options,
                max_width: None,
                max_height: None,
            }
        }

        /// Ask providers for embeds no wider than `width`.
        pub fn max_width(mut self, width: u32) -> Self {
            self.max_width = Some(width);
            self
        }

        /// Ask providers for embeds no taller than `height`.
        pub fn max_height(mut self, height: u32) -> Self {
            self.max_height = Some(height);
            self
        }

        /// Find the oEmbed link among `links` and fetch its document.
        ///
        /// Returns `Ok(None)` when there is no oEmbed link, when the provider
        /// answers with a 4xx status, or when the response is not a usable
        /// oEmbed document. Network failures and 5xx statuses are errors.
        pub async fn get_oembed(&self, links: &[Link]) -> Result<Option<OEmbedDocument>> {
            match find_oembed_link(links) {
                Some(endpoint) => self.fetch(endpoint).await,
                None => Ok(None),
            }
        }

        /// Fetch the oEmbed document at `endpoint`.
        pub async fn fetch(&self, endpoint: &str) -> Result<Option<OEmbedDocument>> {
            let url = build_request_url(endpoint, self.max_width, self.max_height)?;
            let response = match http::get(
                &self.client,
                url.as_str(),
                &self.options,
                Some(accept_header()),
            )
            .await
            {
                Ok(response) => response,
                Err(err) if err.is_client_error() => {
                    tracing::debug!(url = %url, error = %err, "no oEmbed document");
                    return Ok(None);
                }
                Err(err) => return Err(err),
            };

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(parse_header)
                .map(|header| header.media_type())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let body = http::read_body(response, self.options.max_body_size).await?;

            match parse_document(&content_type, &body) {
                Some(Ok(doc)) => Ok(Some(doc)),
                Some(Err(err)) => {
                    tracing::warn!(url = %url, error = %err, "invalid oEmbed document");
                    Ok(None)
                }
                None => {
                    tracing::debug!(url = %url, content_type = %content_type, "unsupported oEmbed content type");
                    Ok(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(rel: &str, mime_type: &str, href: &str) -> Link {
        Link::from_attrs([("rel", rel), ("type", mime_type), ("href", href)])
    }

    #[test]
    fn test_find_first_oembed_link() {
        let links = vec![
            link("stylesheet", "text/css", "https://example.com/style.css"),
            link("alternate", "application/rss+xml", "https://example.com/feed"),
            Link::from_attrs([("rel", "alternate"), ("type", "application/json+oembed")]),
            link("alternate", "text/xml+oembed", "https://example.com/oembed.xml"),
            link("alternate", "application/json+oembed", "https://example.com/oembed.json"),
        ];
        assert_eq!(
            find_oembed_link(&links),
            Some("https://example.com/oembed.xml")
        );
        assert_eq!(find_oembed_link(&links[..2]), None);
    }

    #[test]
    fn test_request_url_only_has_given_limits() {
        let url = build_request_url("https://example.com/oembed?url=x", None, None).unwrap();
        assert_eq!(url.as_str(), "https://example.com/oembed?url=x");

        let url = build_request_url("https://example.com/oembed?url=x", Some(640), None).unwrap();
        assert_eq!(url.as_str(), "https://example.com/oembed?url=x&maxwidth=640");

        let url = build_request_url("https://example.com/oembed", Some(640), Some(480)).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/oembed?maxwidth=640&maxheight=480"
        );
    }

    #[test]
    fn test_parse_json_video() {
        let doc = parse_json(
            br#"{
                "type": "video",
                "version": "1.0",
                "title": "Clip",
                "provider_name": "YouTube",
                "thumbnail_url": "https://i.example.com/t.jpg",
                "thumbnail_width": 480,
                "thumbnail_height": "360",
                "width": 200,
                "height": 113,
                "html": "<iframe src=\"https://example.com/embed/1\"></iframe>",
                "unknown": {"nested": true}
            }"#,
        )
        .unwrap();
        assert_eq!(doc.kind, OEmbedType::Video);
        assert_eq!(doc.version.as_deref(), Some("1.0"));
        assert_eq!(doc.provider_name.as_deref(), Some("YouTube"));
        assert_eq!(doc.thumbnail_width, Some(480));
        assert_eq!(doc.thumbnail_height, Some(360));
        assert_eq!(doc.width, Some(200));
        assert_eq!(doc.height, Some(113));
    }

    #[test]
    fn test_parse_json_numeric_version_and_unknown_type() {
        let doc = parse_json(br#"{"type": "slideshow", "version": 1.0, "cache_age": 3600}"#).unwrap();
        assert_eq!(doc.kind, OEmbedType::Unknown);
        assert_eq!(doc.version.as_deref(), Some("1.0"));
        assert_eq!(doc.cache_age.as_deref(), Some("3600"));
    }

    #[test]
    fn test_parse_json_requires_type_fields() {
        assert!(matches!(parse_json(br#"{"title": "x"}"#), Err(Error::Json(_))));
        let err = parse_json(br#"{"type": "video", "width": 1, "height": 1}"#).unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "html", .. }));
        let err = parse_json(br#"{"type": "photo", "url": "x.png", "width": 1}"#).unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "height", .. }));
        assert!(parse_json(br#"{"type": "link"}"#).is_ok());
    }

    #[test]
    fn test_parse_xml_document() {
        let doc = parse_xml(
            br#"<?xml version="1.0" encoding="utf-8"?>
            <oembed>
                <type>video</type>
                <version>1.0</version>
                <title>Fish &amp; Chips <![CDATA[<live>]]> show</title>
                <provider_name>Vimeo</provider_name>
                <author_name/>
                <width>640</width>
                <height>360</height>
                <html>&lt;iframe src="https://player.example.com/1"&gt;&lt;/iframe&gt;</html>
                <extra>ignored</extra>
                <thumbnail_url><nested>skipped</nested></thumbnail_url>
            </oembed>"#,
        )
        .unwrap();
        assert_eq!(doc.kind, OEmbedType::Video);
        assert_eq!(doc.title.as_deref(), Some("Fish & Chips <live> show"));
        assert_eq!(doc.provider_name.as_deref(), Some("Vimeo"));
        assert_eq!(doc.author_name.as_deref(), Some(""));
        assert_eq!(doc.width, Some(640));
        assert_eq!(doc.height, Some(360));
        assert_eq!(
            doc.html.as_deref(),
            Some(r#"<iframe src="https://player.example.com/1"></iframe>"#)
        );
        assert_eq!(doc.thumbnail_url.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_xml_malformed() {
        assert!(parse_xml(b"<oembed><type>video</oembed>").is_err());
        assert!(parse_xml(b"<oembed><title>no type</title></oembed>").is_err());
    }

    #[test]
    fn test_parse_document_dispatch() {
        let json = br#"{"type": "link"}"#;
        assert!(parse_document("application/json", json).unwrap().is_ok());
        assert!(parse_document("Application/JSON+oEmbed", json).unwrap().is_ok());
        assert!(parse_document("text/xml", b"<oembed><type>link</type></oembed>")
            .unwrap()
            .is_ok());
        assert!(parse_document("text/html", json).is_none());
    }
}
