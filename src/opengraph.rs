//! OpenGraph property trees
//!
//! Builds a tree from [OpenGraph](https://ogp.me/) `<meta property>` values.
//! A property is either `ns:name`, a value, or `ns:name:meta`, metadata
//! attached to the most recent value of `ns:name`. Values may repeat, so
//! every key maps to an ordered list of sibling nodes.

use serde::{Deserialize, Serialize};

use crate::discovery::MetaProperty;
use crate::dom::Element;

/// A value in the property tree, with its own metadata children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OgpNode {
    /// The value, absent on namespace nodes
    pub content: Option<String>,

    /// Children in first-insertion order; each key holds its sibling values
    children: Vec<(String, Vec<OgpNode>)>,
}

impl OgpNode {
    fn with_content(content: String) -> Self {
        Self {
            content: Some(content),
            children: Vec::new(),
        }
    }

    /// The value as a string slice.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// The most recent value under `key`.
    pub fn get(&self, key: &str) -> Option<&OgpNode> {
        self.get_all(key).last()
    }

    /// Every value under `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> &[OgpNode] {
        self.children
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, siblings)| siblings.as_slice())
            .unwrap_or_default()
    }

    /// Keys of the children, in first-insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|(k, _)| k.as_str())
    }

    /// Whether this node has neither a value nor children.
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.children.is_empty()
    }

    fn last_mut(&mut self, key: &str) -> Option<&mut OgpNode> {
        self.children
            .iter_mut()
            .find(|(k, _)| k == key)
            .and_then(|(_, siblings)| siblings.last_mut())
    }

    /// Get the most recent node under `key`, creating an empty one on first use.
    fn last_or_insert(&mut self, key: &str) -> &mut OgpNode {
        let index = match self.children.iter().position(|(k, _)| k == key) {
            Some(index) => index,
            None => {
                self.children.push((key.to_string(), vec![OgpNode::default()]));
                self.children.len() - 1
            }
        };
        let siblings = &mut self.children[index].1;
        if siblings.is_empty() {
            siblings.push(OgpNode::default());
        }
        let last = siblings.len() - 1;
        &mut siblings[last]
    }

    /// Append a value under `key`; an existing value gains a new sibling.
    fn push_value(&mut self, key: &str, content: String) {
        match self.children.iter_mut().find(|(k, _)| k == key) {
            Some((_, siblings)) => siblings.push(OgpNode::with_content(content)),
            None => self
                .children
                .push((key.to_string(), vec![OgpNode::with_content(content)])),
        }
    }
}

/// OpenGraph properties of a page as a tree of values.
///
/// # Example
/// ```
/// use webpage_embed::OgpTree;
///
/// let tree = OgpTree::parse([
///     ("og:video", "https://example.com/a"),
///     ("og:video:width", "640"),
///     ("og:video", "https://example.com/b"),
/// ]);
/// let videos = tree.get_all("og:video");
/// assert_eq!(videos.len(), 2);
/// assert_eq!(videos[0].get("width").and_then(|n| n.content()), Some("640"));
/// assert_eq!(tree.get("og:video").and_then(|n| n.content()), Some("https://example.com/b"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OgpTree {
    root: OgpNode,

    /// Accepted properties in insertion order
    entries: Vec<(String, String)>,
}

impl OgpTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from `(property, content)` pairs in document order.
    pub fn parse<I, P, C>(properties: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: Into<String>,
    {
        let mut tree = Self::new();
        for (property, content) in properties {
            tree.insert(property.as_ref(), content);
        }
        tree
    }

    /// Build a tree from discovered meta properties.
    pub fn from_properties(properties: &[MetaProperty]) -> Self {
        Self::parse(
            properties
                .iter()
                .map(|p| (p.property.as_str(), p.content.as_str())),
        )
    }

    /// Insert a property.
    ///
    /// Returns `false` when the property was discarded: a name without a
    /// namespace, or metadata with no preceding value to attach to.
    pub fn insert(&mut self, path: &str, content: impl Into<String>) -> bool {
        let mut segments = path.splitn(3, ':');
        let (Some(namespace), Some(name)) = (segments.next(), segments.next()) else {
            tracing::debug!(property = %path, "discarding property without a namespace");
            return false;
        };
        if namespace.is_empty() || name.is_empty() {
            tracing::debug!(property = %path, "discarding property with an empty segment");
            return false;
        }

        let content: String = content.into();
        match segments.next() {
            None => {
                self.root
                    .last_or_insert(namespace)
                    .push_value(name, content.clone());
            }
            Some(meta_key) => {
                let Some(value) = self
                    .root
                    .last_mut(namespace)
                    .and_then(|ns| ns.last_mut(name))
                else {
                    tracing::debug!(property = %path, "discarding metadata without a value");
                    return false;
                };
                value.push_value(meta_key, content.clone());
            }
        }
        self.entries.push((path.to_string(), content));
        true
    }

    /// The most recent node at `path`.
    pub fn get(&self, path: &str) -> Option<&OgpNode> {
        path.splitn(3, ':')
            .try_fold(&self.root, |node, key| node.get(key))
    }

    /// Every sibling node at `path`, in insertion order.
    pub fn get_all(&self, path: &str) -> &[OgpNode] {
        // Metadata keys may themselves contain colons.
        let mut segments: Vec<&str> = path.splitn(3, ':').collect();
        let key = segments.pop().unwrap_or_default();
        segments
            .into_iter()
            .try_fold(&self.root, |node, segment| node.get(segment))
            .map(|parent| parent.get_all(key))
            .unwrap_or_default()
    }

    /// Whether no properties have been inserted.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// The accepted `(property, content)` pairs, in insertion order.
    pub fn flatten(&self) -> Vec<(String, String)> {
        self.entries.clone()
    }

    /// Render the tree as `<meta>` elements, one per line.
    pub fn to_meta(&self) -> String {
        self.flatten()
            .into_iter()
            .map(|(property, content)| {
                Element::new("meta")
                    .with_attr("property", property)
                    .with_attr("content", content)
                    .serialize()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
