//! Host page model.
//!
//! A page is a tree of documents: every `<iframe>`/`<frame>` element may carry
//! a nested document. Elements live in a per-document arena and are addressed
//! by [`ElementRef`], so the inspector only ever holds lookups into the page,
//! never ownership of its nodes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

impl Rect {
    pub fn translate(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub scroll_x: f64,
    #[serde(default)]
    pub scroll_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1366.0,
            height: 768.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }
}

/// Read access to an element's computed style.
pub trait StyleSource {
    fn value(&self, property: &str) -> Option<&str>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComputedStyle(pub BTreeMap<String, String>);

impl StyleSource for ComputedStyle {
    fn value(&self, property: &str) -> Option<&str> {
        self.0.get(property).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub usize);

/// Path of frame-hosting elements from the top document down.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FramePath(pub Vec<NodeId>);

impl FramePath {
    pub fn top() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, host: NodeId) -> Self {
        let mut path = self.0.clone();
        path.push(host);
        Self(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ElementRef {
    pub frame: FramePath,
    pub node: NodeId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSpec {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "classes")]
    pub class: Option<String>,
    #[serde(default, rename = "type")]
    pub input_type: Option<String>,
    #[serde(default)]
    pub rect: Rect,
    #[serde(default)]
    pub style: ComputedStyle,
    #[serde(default)]
    pub children: Vec<ElementSpec>,
    #[serde(default)]
    pub frame: Option<Box<DocumentSpec>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSpec {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub frameset: bool,
    #[serde(default)]
    pub viewport: Viewport,
    pub root: ElementSpec,
}

#[derive(Debug, Clone)]
pub struct Element {
    pub tag: String,
    pub html_id: Option<String>,
    pub classes: Vec<String>,
    pub input_type: Option<String>,
    pub rect: Rect,
    pub style: ComputedStyle,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub frame: Option<Box<Document>>,
}

impl Element {
    /// `tag#id.class[type=...]`, the popup title line.
    pub fn label(&self) -> String {
        let mut out = self.tag.clone();
        if let Some(id) = self.html_id.as_deref().filter(|v| !v.is_empty()) {
            out.push('#');
            out.push_str(id);
        }
        for class in &self.classes {
            out.push('.');
            out.push_str(class);
        }
        if let Some(kind) = self.input_type.as_deref().filter(|v| !v.is_empty()) {
            out.push_str(&format!("[type={kind}]"));
        }
        out
    }

    pub fn is_frame_host(&self) -> bool {
        matches!(self.tag.as_str(), "iframe" | "frame")
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub url: String,
    pub origin: String,
    pub frameset: bool,
    pub viewport: Viewport,
    nodes: Vec<Element>,
}

impl Document {
    pub fn from_spec(spec: DocumentSpec) -> Self {
        Self::build(spec, None)
    }

    fn build(spec: DocumentSpec, parent_origin: Option<&str>) -> Self {
        let url = spec.url.unwrap_or_else(|| match parent_origin {
            Some(_) => "about:blank".to_string(),
            None => UNTITLED_PAGE_URL.to_string(),
        });
        let origin = spec
            .origin
            .unwrap_or_else(|| origin_of(&url, parent_origin));
        let mut doc = Self {
            url,
            origin,
            frameset: spec.frameset,
            viewport: spec.viewport,
            nodes: Vec::new(),
        };
        doc.push_element(spec.root, None);
        doc
    }

    fn push_element(&mut self, spec: ElementSpec, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        let origin = self.origin.clone();
        let frame = spec
            .frame
            .map(|child| Box::new(Document::build(*child, Some(&origin))));
        self.nodes.push(Element {
            tag: spec.tag.trim().to_ascii_lowercase(),
            html_id: spec.id,
            classes: spec
                .class
                .as_deref()
                .unwrap_or_default()
                .split_whitespace()
                .map(ToString::to_string)
                .collect(),
            input_type: spec.input_type,
            rect: spec.rect,
            style: spec.style,
            parent,
            children: Vec::new(),
            frame,
        });
        for child in spec.children {
            let child_id = self.push_element(child, Some(id));
            self.nodes[id.0].children.push(child_id);
        }
        id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> Option<&Element> {
        self.nodes.get(id.0)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|el| el.parent)
    }

    /// The root holds a `<frameset>` where `<body>` would be.
    pub fn has_frameset_body(&self) -> bool {
        let Some(root) = self.get(self.root()) else {
            return false;
        };
        root.tag == "frameset"
            || root
                .children
                .iter()
                .filter_map(|id| self.get(*id))
                .any(|el| el.tag == "frameset")
    }

    pub fn find_by_html_id(&self, html_id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|el| el.html_id.as_deref() == Some(html_id))
            .map(NodeId)
    }
}

/// Address given to a top-level page description that names no URL.
pub const UNTITLED_PAGE_URL: &str = "http://localhost/";

/// Origin serialization used for the same-origin check. `about:blank` and
/// missing URLs inherit the embedding document's origin.
pub fn origin_of(url: &str, parent_origin: Option<&str>) -> String {
    if url == "about:blank" || url.is_empty() {
        if let Some(parent) = parent_origin {
            return parent.to_string();
        }
    }
    match url::Url::parse(url) {
        Ok(parsed) => parsed.origin().ascii_serialization(),
        Err(_) => "null".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameAccessError {
    #[error("cross-origin frame {frame} blocked from {host}")]
    CrossOrigin { host: String, frame: String },

    #[error("frame has no loaded document")]
    NotLoaded,

    #[error("element is not a frame")]
    NotAFrame,
}

/// Capability for reaching into a frame's document. Failures are values, so
/// traversal can skip a frame and keep going.
pub trait FrameAccessor {
    fn content_document<'a>(
        &self,
        host: &Document,
        frame_element: &'a Element,
    ) -> Result<&'a Document, FrameAccessError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SameOriginAccessor;

impl FrameAccessor for SameOriginAccessor {
    fn content_document<'a>(
        &self,
        host: &Document,
        frame_element: &'a Element,
    ) -> Result<&'a Document, FrameAccessError> {
        if !frame_element.is_frame_host() {
            return Err(FrameAccessError::NotAFrame);
        }
        let doc = frame_element
            .frame
            .as_deref()
            .ok_or(FrameAccessError::NotLoaded)?;
        if doc.origin != host.origin || doc.origin == "null" {
            return Err(FrameAccessError::CrossOrigin {
                host: host.origin.clone(),
                frame: doc.origin.clone(),
            });
        }
        Ok(doc)
    }
}

#[derive(Debug, Clone)]
pub struct Page {
    pub top: Document,
}

impl Page {
    pub fn from_spec(spec: DocumentSpec) -> Self {
        Self {
            top: Document::from_spec(spec),
        }
    }

    /// Structural lookup of a (possibly nested) document. Access policy is
    /// the session's concern, applied when listeners are attached.
    pub fn document(&self, frame: &FramePath) -> Option<&Document> {
        let mut doc = &self.top;
        for host in &frame.0 {
            doc = doc.get(*host)?.frame.as_deref()?;
        }
        Some(doc)
    }

    pub fn element(&self, target: &ElementRef) -> Option<&Element> {
        self.document(&target.frame)?.get(target.node)
    }

    /// Bounding rect in top-document coordinates.
    pub fn absolute_rect(&self, target: &ElementRef) -> Option<Rect> {
        let mut doc = &self.top;
        let (mut dx, mut dy) = (0.0, 0.0);
        for host in &target.frame.0 {
            let host_el = doc.get(*host)?;
            dx += host_el.rect.x - doc.viewport.scroll_x;
            dy += host_el.rect.y - doc.viewport.scroll_y;
            doc = host_el.frame.as_deref()?;
        }
        let rect = doc.get(target.node)?.rect;
        Some(rect.translate(dx, dy))
    }

    /// Resolves `id` or `hostId/.../id`, each segment an element id in the
    /// document reached so far.
    pub fn resolve(&self, selector: &str) -> Option<ElementRef> {
        let segments: Vec<&str> = selector
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let (last, hosts) = segments.split_last()?;
        let mut frame = FramePath::top();
        let mut doc = &self.top;
        for host_id in hosts {
            let host = doc.find_by_html_id(host_id)?;
            doc = doc.get(host)?.frame.as_deref()?;
            frame = frame.child(host);
        }
        let node = doc.find_by_html_id(last)?;
        Some(ElementRef { frame, node })
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for host in &self.frame.0 {
            write!(f, "{}/", host.0)?;
        }
        write!(f, "{}", self.node.0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample_page() -> Page {
        let spec: DocumentSpec = serde_json::from_value(json!({
            "url": "https://shop.example/",
            "viewport": {"width": 800, "height": 600},
            "root": {
                "tag": "html",
                "children": [{
                    "tag": "body",
                    "id": "body",
                    "rect": {"x": 0, "y": 0, "width": 800, "height": 1200},
                    "children": [
                        {"tag": "p", "id": "intro", "class": "lead  big", "rect": {"x": 10, "y": 10, "width": 300, "height": 40}},
                        {"tag": "a", "id": "buy", "rect": {"x": 10, "y": 60, "width": 120, "height": 32},
                         "children": [{"tag": "span", "id": "buy-label", "rect": {"x": 20, "y": 66, "width": 60, "height": 18}}]},
                        {"tag": "iframe", "id": "same", "rect": {"x": 400, "y": 100, "width": 300, "height": 200},
                         "frame": {"url": "https://shop.example/widget", "root": {"tag": "html", "children": [
                            {"tag": "body", "children": [{"tag": "button", "id": "inner", "rect": {"x": 5, "y": 5, "width": 50, "height": 30}}]}
                         ]}}},
                        {"tag": "iframe", "id": "ads", "rect": {"x": 400, "y": 400, "width": 300, "height": 100},
                         "frame": {"url": "https://ads.example/", "root": {"tag": "html", "children": [
                            {"tag": "body", "children": [{"tag": "a", "id": "ad", "rect": {"x": 0, "y": 0, "width": 300, "height": 100}}]}
                         ]}}}
                    ]
                }]
            }
        }))
        .unwrap();
        Page::from_spec(spec)
    }

    #[test]
    fn builds_arena_with_parents() {
        let page = sample_page();
        let span = page.resolve("buy-label").unwrap();
        let anchor = page.resolve("buy").unwrap();
        assert_eq!(page.top.parent(span.node), Some(anchor.node));
        assert_eq!(page.element(&span).unwrap().tag, "span");
    }

    #[test]
    fn label_includes_id_classes_and_type() {
        let page = sample_page();
        let intro = page.resolve("intro").unwrap();
        assert_eq!(page.element(&intro).unwrap().label(), "p#intro.lead.big");
    }

    #[test]
    fn resolves_into_frames_and_offsets_rects() {
        let page = sample_page();
        let inner = page.resolve("same/inner").unwrap();
        assert_eq!(inner.frame.0.len(), 1);
        let rect = page.absolute_rect(&inner).unwrap();
        assert_eq!((rect.x, rect.y), (405.0, 105.0));
        assert!(page.resolve("same/missing").is_none());
        assert!(page.resolve("intro/inner").is_none());
    }

    #[test]
    fn same_origin_accessor_blocks_cross_origin() {
        let page = sample_page();
        let accessor = SameOriginAccessor;
        let same = page.top.get(page.resolve("same").unwrap().node).unwrap();
        let ads = page.top.get(page.resolve("ads").unwrap().node).unwrap();
        let intro = page.top.get(page.resolve("intro").unwrap().node).unwrap();

        assert!(accessor.content_document(&page.top, same).is_ok());
        assert!(matches!(
            accessor.content_document(&page.top, ads),
            Err(FrameAccessError::CrossOrigin { .. })
        ));
        assert_eq!(
            accessor.content_document(&page.top, intro).unwrap_err(),
            FrameAccessError::NotAFrame
        );
    }

    #[test]
    fn blank_frames_inherit_origin() {
        assert_eq!(
            origin_of("about:blank", Some("https://a.example")),
            "https://a.example"
        );
        assert_eq!(origin_of("https://a.example:8443/x?y", None), "https://a.example:8443");
        assert_eq!(origin_of("not a url", None), "null");
    }

    #[test]
    fn untitled_pages_get_an_ordinary_origin() {
        let spec: DocumentSpec = serde_json::from_value(json!({
            "root": {"tag": "html", "children": [{"tag": "body", "children": [
                {"tag": "iframe", "id": "embed", "frame": {"root": {"tag": "html"}}}
            ]}]}
        }))
        .unwrap();
        let page = Page::from_spec(spec);
        assert_eq!(page.top.url, UNTITLED_PAGE_URL);
        assert_eq!(page.top.origin, "http://localhost");

        let host = page.top.get(page.resolve("embed").unwrap().node).unwrap();
        let child = SameOriginAccessor.content_document(&page.top, host).unwrap();
        assert_eq!(child.url, "about:blank");
        assert_eq!(child.origin, "http://localhost");
    }

    #[test]
    fn detects_frameset_in_place_of_body() {
        let frameset: DocumentSpec = serde_json::from_value(json!({
            "root": {"tag": "html", "children": [{"tag": "FRAMESET", "children": [{"tag": "frame"}]}]}
        }))
        .unwrap();
        assert!(Document::from_spec(frameset).has_frameset_body());
        assert!(!sample_page().top.has_frameset_body());
    }
}
