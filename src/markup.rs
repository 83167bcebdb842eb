//! Markup tree access
//!
//! The pipeline never touches the HTML parser directly. Content documents and
//! metadata fragments are wrapped in a [MarkupDocument], and elements are
//! queried through [MarkupNode] with a small set of capability-based lookups:
//! first element by tag names, all elements by tag name, attribute access,
//! parent and sibling navigation, and text extraction that skips non-content
//! nodes such as `script` and `style`.
//!
//! Parsing is backed by `scraper` (html5ever). The parser recovers from
//! malformed input, so building a document never fails.

use ego_tree::iter::Edge;
use scraper::{ElementRef, Html, Node};

/// Elements whose text is never part of the readable content
const NON_CONTENT_TAGS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Elements that start a new paragraph when extracting paragraph text
const BLOCK_TAGS: [&str; 29] = [
    "address",
    "article",
    "aside",
    "blockquote",
    "body",
    "caption",
    "dd",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
];

/// A parsed HTML/XHTML document or fragment
pub struct MarkupDocument {
    html: Html,
}

impl MarkupDocument {
    /// Parses a complete document, e.g. an XHTML content document
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    /// Parses a markup fragment, e.g. an HTML-bearing metadata value
    pub fn parse_fragment(source: &str) -> Self {
        Self {
            html: Html::parse_fragment(source),
        }
    }

    /// The root element of the tree (`<html>`)
    pub fn root(&self) -> MarkupNode<'_> {
        MarkupNode {
            element: self.html.root_element(),
        }
    }

    /// Returns the first element, in document order, whose name is in `tag_names`
    pub fn find_first(&self, tag_names: &[&str]) -> Option<MarkupNode<'_>> {
        let root = self.root();
        if tag_names.contains(&root.name()) {
            return Some(root);
        }
        root.find_first(tag_names)
    }

    /// Returns every element named `tag_name`, in document order
    pub fn find_all(&self, tag_name: &str) -> Vec<MarkupNode<'_>> {
        self.root()
            .element
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|element| element.value().name() == tag_name)
            .map(|element| MarkupNode { element })
            .collect()
    }

    /// Concatenated text of the whole document, without non-content nodes
    pub fn text(&self) -> String {
        self.root().text()
    }

    /// Text nodes of the whole document joined with `separator`
    pub fn text_with_separator(&self, separator: &str) -> String {
        let mut pieces = Vec::new();
        collect_text(self.root().element, &mut pieces);
        pieces.join(separator)
    }

    /// Text of the document body with paragraph boundaries kept
    ///
    /// Block-level elements are surrounded by blank lines and `<br>` becomes a
    /// line break; the document head is not part of the result. Whitespace is
    /// returned untouched, callers normalize it.
    pub fn paragraph_text(&self) -> String {
        let mut text = String::new();
        let root = self.root();
        match root.find_first(&["body"]) {
            Some(body) => collect_blocks(body.element, &mut text),
            None => {
                for child in root.element.children().filter_map(ElementRef::wrap) {
                    if child.value().name() != "head" {
                        collect_blocks(child, &mut text);
                    }
                }
            }
        }
        text
    }
}

/// An element of a [MarkupDocument]
#[derive(Clone, Copy)]
pub struct MarkupNode<'a> {
    element: ElementRef<'a>,
}

impl<'a> MarkupNode<'a> {
    /// The local tag name, lower-cased by the parser
    pub fn name(&self) -> &'a str {
        self.element.value().name()
    }

    /// Concatenated text of the element, without non-content nodes
    pub fn text(&self) -> String {
        let mut pieces = Vec::new();
        collect_text(self.element, &mut pieces);
        pieces.concat()
    }

    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    pub fn parent(&self) -> Option<MarkupNode<'a>> {
        self.element
            .parent()
            .and_then(ElementRef::wrap)
            .map(|element| MarkupNode { element })
    }

    /// Returns the first descendant, in document order, whose name is in `tag_names`
    pub fn find_first(&self, tag_names: &[&str]) -> Option<MarkupNode<'a>> {
        self.element
            .descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .find(|element| tag_names.contains(&element.value().name()))
            .map(|element| MarkupNode { element })
    }

    /// Text of the immediately preceding sibling node, which may be whitespace
    pub fn previous_sibling_text(&self) -> Option<String> {
        self.element
            .prev_sibling()
            .and_then(|node| node_text(node.value(), ElementRef::wrap(node)))
    }

    /// Text of the immediately following sibling node, which may be whitespace
    pub fn next_sibling_text(&self) -> Option<String> {
        self.element
            .next_sibling()
            .and_then(|node| node_text(node.value(), ElementRef::wrap(node)))
    }
}

fn is_non_content(name: &str) -> bool {
    NON_CONTENT_TAGS.contains(&name)
}

fn node_text(node: &Node, element: Option<ElementRef<'_>>) -> Option<String> {
    match node {
        Node::Text(text) => Some(text.to_string()),
        Node::Element(value) if !is_non_content(value.name()) => {
            element.map(|element| MarkupNode { element }.text())
        }
        _ => None,
    }
}

fn collect_text(element: ElementRef<'_>, pieces: &mut Vec<String>) {
    let root = element.id();
    let mut hidden_depth = 0usize;

    for edge in element.traverse() {
        match edge {
            Edge::Open(node) if node.id() != root => match node.value() {
                Node::Text(text) if hidden_depth == 0 => pieces.push(text.to_string()),
                Node::Element(value) if is_non_content(value.name()) => hidden_depth += 1,
                _ => {}
            },
            Edge::Close(node) if node.id() != root => {
                if let Node::Element(value) = node.value() {
                    if is_non_content(value.name()) {
                        hidden_depth -= 1;
                    }
                }
            }
            _ => {}
        }
    }
}

fn is_skipped_block(name: &str) -> bool {
    is_non_content(name) || name == "head"
}

fn collect_blocks(element: ElementRef<'_>, text: &mut String) {
    let root = element.id();
    let mut hidden_depth = 0usize;

    for edge in element.traverse() {
        match edge {
            Edge::Open(node) if node.id() != root => match node.value() {
                Node::Text(value) if hidden_depth == 0 => text.push_str(value),
                Node::Element(value) => {
                    let name = value.name();
                    if is_skipped_block(name) {
                        hidden_depth += 1;
                    } else if hidden_depth == 0 {
                        if name == "br" {
                            text.push('\n');
                        } else if BLOCK_TAGS.contains(&name) {
                            text.push_str("\n\n");
                        }
                    }
                }
                _ => {}
            },
            Edge::Close(node) if node.id() != root => {
                if let Node::Element(value) = node.value() {
                    let name = value.name();
                    if is_skipped_block(name) {
                        hidden_depth -= 1;
                    } else if hidden_depth == 0 && BLOCK_TAGS.contains(&name) {
                        text.push_str("\n\n");
                    }
                }
            }
            _ => {}
        }
    }
}
