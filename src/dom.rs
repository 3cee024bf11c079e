//! Minimal HTML tree parsing and serialisation
//!
//! This is deliberately not an HTML5 tree builder. Markup returned by oEmbed
//! providers is often not well-formed, so the parser keeps a simple stack of
//! open elements and recovers from mismatched end tags by ignoring them.

use std::borrow::Cow;

use html5ever::tendril::StrTendril;
use html5ever::tokenizer::states::RawKind;
use html5ever::tokenizer::{
    BufferQueue, Tag, TagKind, Token, TokenSink, TokenSinkResult, Tokenizer, TokenizerOpts,
    TokenizerResult,
};

/// Elements that never have content or a closing tag.
///
/// See <https://html.spec.whatwg.org/multipage/syntax.html#void-elements>.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "command", "embed", "hr", "img", "input", "keygen", "link",
    "meta", "param", "source", "track", "wbr",
];

/// Check whether `tag` is a void element.
pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Escape text for inclusion in HTML.
///
/// With `quote` set, `"` and `'` are escaped as well, which is required for
/// attribute values.
pub fn escape(text: &str, quote: bool) -> Cow<'_, str> {
    let needs_escape = |c: char| matches!(c, '&' | '<' | '>') || (quote && matches!(c, '"' | '\''));
    if !text.contains(needs_escape) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if quote => escaped.push_str("&quot;"),
            '\'' if quote => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// A child of an [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An HTML element with ordered attributes and children.
///
/// An element without a tag is a document root: it serialises only its
/// children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Tag name, or `None` for a document root
    pub tag: Option<String>,

    /// Attributes in document order; `None` marks a valueless attribute
    pub attrs: Vec<(String, Option<String>)>,

    /// Child elements and text
    pub children: Vec<Node>,
}

impl Element {
    /// Create an empty element with the given tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Default::default()
        }
    }

    /// Create an empty document root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Add an attribute with a value.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), Some(value.into())));
        self
    }

    /// Add an attribute only when `value` is present.
    pub fn with_attr_opt<V: ToString>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.with_attr(name, value.to_string()),
            None => self,
        }
    }

    /// Append a child element.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Append a text node.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text.into());
        self
    }

    /// Look up an attribute value. Valueless attributes yield `Some("")`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_deref().unwrap_or(""))
    }

    /// Whether this element is a void element.
    pub fn is_void(&self) -> bool {
        self.tag.as_deref().is_some_and(is_void_element)
    }

    /// Iterate over the child elements, skipping text.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(elem) => Some(elem),
            Node::Text(_) => None,
        })
    }

    /// Find the first descendant with the given tag, depth first.
    pub fn find(&self, tag: &str) -> Option<&Element> {
        self.elements().find_map(|elem| {
            if elem.tag.as_deref() == Some(tag) {
                Some(elem)
            } else {
                elem.find(tag)
            }
        })
    }

    /// Serialise the element and its descendants to HTML.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        if let Some(tag) = &self.tag {
            out.push('<');
            out.push_str(tag);
            for (name, value) in &self.attrs {
                out.push(' ');
                out.push_str(name);
                if let Some(value) = value {
                    out.push_str("=\"");
                    out.push_str(&escape(value, true));
                    out.push('"');
                }
            }
            out.push('>');
        }

        for child in &self.children {
            match child {
                Node::Element(elem) => elem.write_to(out),
                Node::Text(text) => out.push_str(&escape(text, false)),
            }
        }

        if let Some(tag) = &self.tag
            && !is_void_element(tag)
        {
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }

    fn push_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(&text);
        } else {
            self.children.push(Node::Text(text));
        }
    }
}

/// Parse a fragment of HTML into a tree under a document root.
///
/// Parsing never fails: tokenizer errors are logged and the markup is
/// recovered as well as the open-element stack allows.
///
/// # Example
/// ```
/// use webpage_embed::parse_fragment;
///
/// let root = parse_fragment("<div><span>a</span></div>");
/// assert_eq!(root.serialize(), "<div><span>a</span></div>");
/// ```
pub fn parse_fragment(markup: &str) -> Element {
    let mut tokenizer = Tokenizer::new(TreeSink::default(), TokenizerOpts::default());
    let mut input = BufferQueue::new();
    input.push_back(StrTendril::from_slice(markup));
    // The sink never yields a script handle, so one call drains the input.
    while let TokenizerResult::Script(()) = tokenizer.feed(&mut input) {}
    tokenizer.end();
    tokenizer.sink.into_root()
}

/// Token sink maintaining the stack of open elements.
struct TreeSink {
    stack: Vec<Element>,
}

impl Default for TreeSink {
    fn default() -> Self {
        Self {
            stack: vec![Element::root()],
        }
    }
}

impl TreeSink {
    fn top(&mut self) -> &mut Element {
        // The root is never popped.
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn start_tag(&mut self, tag: Tag) -> TokenSinkResult<()> {
        let name = tag.name.to_string();
        let mut elem = Element::new(name.clone());
        for attr in tag.attrs {
            elem.attrs
                .push((attr.name.local.to_string(), Some(attr.value.to_string())));
        }

        if tag.self_closing || is_void_element(&name) {
            self.top().children.push(Node::Element(elem));
            return TokenSinkResult::Continue;
        }

        self.stack.push(elem);
        match name.as_str() {
            "script" => TokenSinkResult::RawData(RawKind::ScriptData),
            "style" => TokenSinkResult::RawData(RawKind::Rawtext),
            _ => TokenSinkResult::Continue,
        }
    }

    fn end_tag(&mut self, name: &str) {
        if is_void_element(name) {
            return;
        }
        let Some(pos) = self
            .stack
            .iter()
            .rposition(|elem| elem.tag.as_deref() == Some(name))
        else {
            tracing::debug!(tag = %name, "ignoring unmatched end tag");
            return;
        };
        while self.stack.len() > pos {
            self.close_top();
        }
    }

    fn close_top(&mut self) {
        if self.stack.len() > 1
            && let Some(elem) = self.stack.pop()
        {
            self.top().children.push(Node::Element(elem));
        }
    }

    fn into_root(mut self) -> Element {
        while self.stack.len() > 1 {
            self.close_top();
        }
        self.stack.pop().unwrap_or_default()
    }
}

impl TokenSink for TreeSink {
    type Handle = ();

    fn process_token(&mut self, token: Token, _line_number: u64) -> TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) => match tag.kind {
                TagKind::StartTag => return self.start_tag(tag),
                TagKind::EndTag => self.end_tag(&tag.name),
            },
            Token::CharacterTokens(text) => self.top().push_text(text.to_string()),
            Token::ParseError(err) => tracing::debug!(error = %err, "HTML parse error"),
            _ => {}
        }
        TokenSinkResult::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let markup = "<div><span>a</span></div>";
        assert_eq!(parse_fragment(markup).serialize(), markup);
    }

    #[test]
    fn test_void_elements_are_not_closed() {
        let root = parse_fragment(r#"<p>one<br>two<img src="x.png"></p>"#);
        assert_eq!(root.serialize(), r#"<p>one<br>two<img src="x.png"></p>"#);

        let p = root.find("p").unwrap();
        assert_eq!(p.children.len(), 4);
    }

    #[test]
    fn test_self_closing_syntax_does_not_open() {
        let root = parse_fragment("<div/><span>x</span>");
        assert_eq!(root.elements().count(), 2);
        assert_eq!(root.serialize(), "<div></div><span>x</span>");
    }

    #[test]
    fn test_unclosed_elements_are_closed_at_end() {
        let root = parse_fragment(r#"<iframe src="https://example.com/embed">"#);
        let iframe = root.find("iframe").unwrap();
        assert_eq!(iframe.attr("src"), Some("https://example.com/embed"));
        assert_eq!(
            root.serialize(),
            r#"<iframe src="https://example.com/embed"></iframe>"#
        );
    }

    #[test]
    fn test_unmatched_end_tag_is_ignored() {
        let root = parse_fragment("<div><span>a</p>b</span></div>");
        assert_eq!(root.serialize(), "<div><span>ab</span></div>");
    }

    #[test]
    fn test_end_tag_closes_intervening_elements() {
        let root = parse_fragment("<div><span><em>a</div>b");
        assert_eq!(root.serialize(), "<div><span><em>a</em></span></div>b");
    }

    #[test]
    fn test_escaping() {
        let root = parse_fragment(r#"<a title="&quot;x&quot; &amp; 'y'">1 &lt; 2</a>"#);
        assert_eq!(
            root.serialize(),
            r#"<a title="&quot;x&quot; &amp; &#x27;y&#x27;">1 &lt; 2</a>"#
        );
        assert_eq!(escape("it's \"plain\"", false), "it's \"plain\"");
    }

    #[test]
    fn test_script_content_is_raw() {
        let root = parse_fragment("<script>if (a < b) { c(); }</script><p>x</p>");
        let script = root.find("script").unwrap();
        assert_eq!(
            script.children,
            vec![Node::Text("if (a < b) { c(); }".to_string())]
        );
        assert!(root.find("p").is_some());
    }

    #[test]
    fn test_find_is_depth_first() {
        let root = parse_fragment(
            r#"<blockquote><div><iframe src="first"></iframe></div></blockquote><iframe src="second"></iframe>"#,
        );
        assert_eq!(root.find("iframe").unwrap().attr("src"), Some("first"));
    }

    #[test]
    fn test_builder() {
        let elem = Element::new("div")
            .with_attr("class", "facade")
            .with_attr_opt::<&str>("title", None)
            .with_attr_opt("data-width", Some(640))
            .with_child(Element::new("input").with_attr("disabled", ""))
            .with_text("<ok>");
        assert_eq!(
            elem.serialize(),
            r#"<div class="facade" data-width="640"><input disabled="">&lt;ok&gt;</div>"#
        );
    }

    #[test]
    fn test_valueless_attribute() {
        let mut elem = Element::new("video");
        elem.attrs.push(("controls".to_string(), None));
        assert_eq!(elem.serialize(), "<video controls></video>");
        assert_eq!(elem.attr("controls"), Some(""));
    }
}
