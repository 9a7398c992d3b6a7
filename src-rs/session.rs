use crate::dom::{Document, ElementRef, FrameAccessor, FramePath, NodeId, Page};
use crate::options::{InspectorOptions, DEFAULT_PAUSE_KEY};
use crate::overlay::{HoverOutcome, OverlayController};
use crate::surface::OverlaySurface;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

pub const NOTICE_DURATION_MS: u64 = 1500;

pub const PAUSED_NOTICE: &str = "Inspection paused";
pub const RESUMED_NOTICE: &str = "Inspection resumed";
pub const FRAMESET_NOTICE: &str = "Pages built with <frameset> cannot be inspected";
pub const RESTRICTED_NOTICE: &str = "Browser pages cannot be inspected";

const RESTRICTED_PREFIXES: [&str; 6] = [
    "chrome://",
    "chrome-extension://",
    "edge://",
    "about:",
    "https://chrome.google.com/webstore",
    "https://chromewebstore.google.com",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PauseKeyError {
    #[error("pause key unavailable: {0}")]
    Unavailable(String),
}

/// Where the pause key name comes from; the extension asks its background
/// page, here the settings answer directly.
pub trait PauseKeySource {
    fn request_pause_key(&self) -> Result<String, PauseKeyError>;
}

impl PauseKeySource for InspectorOptions {
    fn request_pause_key(&self) -> Result<String, PauseKeyError> {
        if self.pause_key.trim().is_empty() {
            return Err(PauseKeyError::Unavailable("empty key name".to_string()));
        }
        Ok(self.pause_key.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disabled,
    Enabled,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum EventOutcome {
    Enabled { listeners: usize, skipped_frames: usize },
    AlreadyEnabled,
    Unsupported { reason: String },
    Disabled,
    Paused,
    Resumed,
    Hover { result: HoverOutcome },
    Left,
    Scheduled,
    Throttled,
    Positioned,
    Ignored,
    Clock { now_ms: u64 },
}

/// Host page events, as replayed from an event script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HostEvent {
    Enable,
    Disable,
    Pause,
    Resume,
    Mouseover {
        target: String,
        #[serde(default)]
        related: Option<String>,
    },
    Mouseout {
        target: String,
        #[serde(default)]
        related: Option<String>,
    },
    Mousemove {
        x: f64,
        y: f64,
    },
    Frame,
    Keyup {
        key: String,
    },
    Elapse {
        ms: u64,
    },
}

/// One activation of the inspector on one page. Owns every piece of mutable
/// inspector state; nothing lives in globals.
pub struct InspectorSession<S: OverlaySurface, A: FrameAccessor> {
    page: Page,
    surface: S,
    accessor: A,
    options: InspectorOptions,
    state: SessionState,
    controller: Option<OverlayController>,
    listeners: BTreeSet<ElementRef>,
    key_listener: bool,
    pause_key: String,
    clock_ms: u64,
    notice_deadline: Option<u64>,
    blocked_notice_shown: bool,
}

impl<S: OverlaySurface, A: FrameAccessor> InspectorSession<S, A> {
    pub fn new(page: Page, surface: S, accessor: A, options: InspectorOptions) -> Self {
        Self {
            page,
            surface,
            accessor,
            options,
            state: SessionState::Disabled,
            controller: None,
            listeners: BTreeSet::new(),
            key_listener: false,
            pause_key: DEFAULT_PAUSE_KEY.to_string(),
            clock_ms: 0,
            notice_deadline: None,
            blocked_notice_shown: false,
        }
    }

    /// Entry point for repeated injection: reuses the session already in
    /// `slot` when there is one, then enables it.
    pub fn attach_or_reuse(
        slot: &mut Option<Self>,
        make: impl FnOnce() -> Self,
    ) -> (&mut Self, EventOutcome) {
        let session = slot.get_or_insert_with(make);
        let outcome = session.enable();
        (session, outcome)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn controller(&self) -> Option<&OverlayController> {
        self.controller.as_ref()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    #[cfg(test)]
    pub fn is_listening(&self, target: &ElementRef) -> bool {
        self.listeners.contains(target)
    }

    pub fn has_key_listener(&self) -> bool {
        self.key_listener
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    pub fn enable(&mut self) -> EventOutcome {
        if self.surface.has_root() {
            return EventOutcome::AlreadyEnabled;
        }
        if let Some(reason) = self.unsupported_reason() {
            if !self.blocked_notice_shown {
                self.blocked_notice_shown = true;
                self.show_notice(reason);
            }
            tracing::warn!(
                url = %self.page.top.url,
                reason,
                "inspection not available on this page"
            );
            return EventOutcome::Unsupported {
                reason: reason.to_string(),
            };
        }

        self.pause_key = match self.options.request_pause_key() {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(error = %err, "falling back to default pause key");
                DEFAULT_PAUSE_KEY.to_string()
            }
        };
        self.surface.create_root();
        self.controller = Some(OverlayController::new(self.options.clone()));
        let skipped_frames = self.attach_listeners();
        self.key_listener = true;
        self.state = SessionState::Enabled;
        tracing::info!(
            listeners = self.listeners.len(),
            skipped_frames,
            "inspector enabled"
        );
        EventOutcome::Enabled {
            listeners: self.listeners.len(),
            skipped_frames,
        }
    }

    pub fn disable(&mut self) -> EventOutcome {
        if self.state == SessionState::Disabled && !self.surface.has_root() {
            return EventOutcome::Ignored;
        }
        if let Some(controller) = self.controller.as_mut() {
            controller.clear(&mut self.surface);
        }
        self.surface.remove_tracking_indicator();
        self.surface.remove_root();
        self.listeners.clear();
        self.key_listener = false;
        self.controller = None;
        self.notice_deadline = None;
        self.state = SessionState::Disabled;
        tracing::info!("inspector disabled");
        EventOutcome::Disabled
    }

    /// Detaches element listeners. The overlay, the hovered element and the key
    /// listener are left as they are.
    pub fn pause(&mut self) -> EventOutcome {
        if self.state != SessionState::Enabled {
            return EventOutcome::Ignored;
        }
        self.listeners.clear();
        if let Some(controller) = self.controller.as_mut() {
            controller.set_paused(true);
        }
        self.state = SessionState::Paused;
        self.show_notice(PAUSED_NOTICE);
        EventOutcome::Paused
    }

    pub fn resume(&mut self) -> EventOutcome {
        if self.state != SessionState::Paused {
            return EventOutcome::Ignored;
        }
        self.attach_listeners();
        if let Some(controller) = self.controller.as_mut() {
            controller.set_paused(false);
        }
        self.state = SessionState::Enabled;
        self.show_notice(RESUMED_NOTICE);
        EventOutcome::Resumed
    }

    pub fn advance_clock(&mut self, ms: u64) -> EventOutcome {
        self.clock_ms = self.clock_ms.saturating_add(ms);
        if let Some(deadline) = self.notice_deadline {
            if self.clock_ms >= deadline {
                self.surface.dismiss_notice();
                self.notice_deadline = None;
            }
        }
        EventOutcome::Clock {
            now_ms: self.clock_ms,
        }
    }

    pub fn dispatch(&mut self, event: &HostEvent) -> EventOutcome {
        match event {
            HostEvent::Enable => self.enable(),
            HostEvent::Disable => self.disable(),
            HostEvent::Pause => self.pause(),
            HostEvent::Resume => self.resume(),
            HostEvent::Keyup { key } => self.on_key_up(key),
            HostEvent::Elapse { ms } => self.advance_clock(*ms),
            HostEvent::Mouseover { target, .. } => {
                let Some(target) = self.listened_target(target) else {
                    return EventOutcome::Ignored;
                };
                let Some(controller) = self.controller.as_mut() else {
                    return EventOutcome::Ignored;
                };
                EventOutcome::Hover {
                    result: controller.on_mouse_over(&self.page, &mut self.surface, &target),
                }
            }
            HostEvent::Mouseout { target, related } => {
                let Some(target) = self.listened_target(target) else {
                    return EventOutcome::Ignored;
                };
                let related = related.as_deref().and_then(|r| self.page.resolve(r));
                let Some(controller) = self.controller.as_mut() else {
                    return EventOutcome::Ignored;
                };
                let left =
                    controller.on_mouse_out(&self.page, &mut self.surface, &target, related.as_ref());
                if left {
                    EventOutcome::Left
                } else {
                    EventOutcome::Ignored
                }
            }
            HostEvent::Mousemove { x, y } => {
                if self.state != SessionState::Enabled {
                    return EventOutcome::Ignored;
                }
                let Some(controller) = self.controller.as_mut() else {
                    return EventOutcome::Ignored;
                };
                if controller.on_mouse_move(*x, *y) {
                    EventOutcome::Scheduled
                } else {
                    EventOutcome::Throttled
                }
            }
            HostEvent::Frame => {
                let Some(controller) = self.controller.as_mut() else {
                    return EventOutcome::Ignored;
                };
                if controller.on_animation_frame(&self.page, &mut self.surface) {
                    EventOutcome::Positioned
                } else {
                    EventOutcome::Ignored
                }
            }
        }
    }

    fn on_key_up(&mut self, key: &str) -> EventOutcome {
        if !self.key_listener || !key.eq_ignore_ascii_case(&self.pause_key) {
            return EventOutcome::Ignored;
        }
        match self.state {
            SessionState::Enabled => self.pause(),
            SessionState::Paused => self.resume(),
            SessionState::Disabled => EventOutcome::Ignored,
        }
    }

    fn listened_target(&self, selector: &str) -> Option<ElementRef> {
        let Some(target) = self.page.resolve(selector) else {
            tracing::warn!(selector, "event target not found on page");
            return None;
        };
        if !self.listeners.contains(&target) {
            tracing::debug!(selector, "no listener attached for target");
            return None;
        }
        Some(target)
    }

    fn unsupported_reason(&self) -> Option<&'static str> {
        let url = self.page.top.url.to_ascii_lowercase();
        if RESTRICTED_PREFIXES.iter().any(|p| url.starts_with(p)) {
            return Some(RESTRICTED_NOTICE);
        }
        if self.page.top.frameset || self.page.top.has_frameset_body() {
            return Some(FRAMESET_NOTICE);
        }
        None
    }

    fn show_notice(&mut self, message: &str) {
        self.surface.show_notice(message);
        self.notice_deadline = Some(self.clock_ms + NOTICE_DURATION_MS);
    }

    /// Returns how many frames were skipped.
    fn attach_listeners(&mut self) -> usize {
        let mut listeners = BTreeSet::new();
        let mut skipped = 0;
        let top = &self.page.top;
        attach_recursive(
            top,
            top.root(),
            &FramePath::top(),
            &self.accessor,
            &mut listeners,
            &mut skipped,
        );
        self.listeners = listeners;
        skipped
    }
}

fn attach_recursive(
    doc: &Document,
    node: NodeId,
    frame: &FramePath,
    accessor: &dyn FrameAccessor,
    listeners: &mut BTreeSet<ElementRef>,
    skipped: &mut usize,
) {
    let Some(element) = doc.get(node) else {
        return;
    };
    listeners.insert(ElementRef {
        frame: frame.clone(),
        node,
    });

    if element.is_frame_host() {
        match accessor.content_document(doc, element) {
            Ok(child) => {
                let child_frame = frame.child(node);
                attach_recursive(child, child.root(), &child_frame, accessor, listeners, skipped);
            }
            Err(err) => {
                *skipped += 1;
                tracing::warn!(
                    frame = element.html_id.as_deref().unwrap_or("<anonymous>"),
                    error = %err,
                    "skipping frame"
                );
            }
        }
    }

    for child in &element.children {
        attach_recursive(doc, *child, frame, accessor, listeners, skipped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::tests::sample_page;
    use crate::dom::{DocumentSpec, Element, FrameAccessError, SameOriginAccessor};
    use crate::surface::OverlayState;
    use serde_json::{json, Map};

    type TestSession = InspectorSession<OverlayState, SameOriginAccessor>;

    fn options(mode: &str) -> InspectorOptions {
        let mut settings = Map::new();
        settings.insert("interactionMode".to_string(), json!(mode));
        InspectorOptions::from_settings(&settings).unwrap()
    }

    fn session(mode: &str) -> TestSession {
        InspectorSession::new(
            sample_page(),
            OverlayState::default(),
            SameOriginAccessor,
            options(mode),
        )
    }

    fn hover(target: &str) -> HostEvent {
        HostEvent::Mouseover {
            target: target.to_string(),
            related: None,
        }
    }

    #[test]
    fn enable_attaches_same_origin_frames_only() {
        let mut s = session("0");
        let outcome = s.enable();
        assert_eq!(
            outcome,
            EventOutcome::Enabled {
                listeners: s.listener_count(),
                skipped_frames: 1
            }
        );
        assert!(s.is_listening(&s.page().resolve("same/inner").unwrap()));
        assert!(!s.is_listening(&s.page().resolve("ads/ad").unwrap()));
        assert!(s.is_listening(&s.page().resolve("ads").unwrap()));
        assert_eq!(s.state(), SessionState::Enabled);
    }

    #[test]
    fn enable_is_idempotent() {
        let mut s = session("0");
        s.enable();
        let count = s.listener_count();
        assert_eq!(s.enable(), EventOutcome::AlreadyEnabled);
        assert_eq!(s.listener_count(), count);
    }

    #[test]
    fn attach_or_reuse_keeps_one_session() {
        let mut slot: Option<TestSession> = None;
        let (_, first) = InspectorSession::attach_or_reuse(&mut slot, || session("0"));
        assert!(matches!(first, EventOutcome::Enabled { .. }));
        let (s, second) = InspectorSession::attach_or_reuse(&mut slot, || panic!("must reuse"));
        assert_eq!(second, EventOutcome::AlreadyEnabled);
        assert_eq!(s.state(), SessionState::Enabled);
    }

    #[test]
    fn cross_origin_frame_events_are_ignored() {
        let mut s = session("0");
        s.enable();
        assert_eq!(s.dispatch(&hover("ads/ad")), EventOutcome::Ignored);
        assert_eq!(
            s.dispatch(&hover("same/inner")),
            EventOutcome::Hover {
                result: HoverOutcome::Rendered
            }
        );
        assert_eq!(s.dispatch(&hover("no-such-id")), EventOutcome::Ignored);
    }

    #[test]
    fn pause_and_resume_toggle_listeners_and_show_notices() {
        let mut s = session("0");
        s.enable();
        s.dispatch(&hover("intro"));
        assert!(s.surface().block_visible());

        assert_eq!(s.dispatch(&HostEvent::Keyup { key: "escape".into() }), EventOutcome::Paused);
        assert_eq!(s.listener_count(), 0);
        assert!(s.surface().root, "overlay root survives a pause");
        assert!(s.surface().block_visible());
        let hovered = s.controller().unwrap().tracking().last_hovered.clone();
        assert_eq!(hovered, s.page().resolve("intro"));
        assert_eq!(s.surface().notice.as_deref(), Some(PAUSED_NOTICE));
        assert!(s.controller().unwrap().tracking().is_paused);
        assert_eq!(s.dispatch(&hover("intro")), EventOutcome::Ignored);

        s.advance_clock(NOTICE_DURATION_MS - 1);
        assert!(s.surface().notice.is_some());
        s.advance_clock(1);
        assert!(s.surface().notice.is_none());

        assert_eq!(s.dispatch(&HostEvent::Keyup { key: "Escape".into() }), EventOutcome::Resumed);
        assert!(s.listener_count() > 0);
        assert_eq!(s.surface().notice.as_deref(), Some(RESUMED_NOTICE));
        assert!(!s.controller().unwrap().tracking().is_paused);
        assert!(s.surface().block_visible());
        assert_eq!(
            s.dispatch(&hover("intro")),
            EventOutcome::Hover {
                result: HoverOutcome::Duplicate
            }
        );
    }

    #[test]
    fn retriggered_notice_restarts_timer() {
        let mut s = session("0");
        s.enable();
        s.pause();
        s.advance_clock(1000);
        s.resume();
        s.advance_clock(1000);
        assert_eq!(s.surface().notice.as_deref(), Some(RESUMED_NOTICE));
        s.advance_clock(500);
        assert!(s.surface().notice.is_none());
    }

    #[test]
    fn other_keys_do_nothing() {
        let mut s = session("0");
        s.enable();
        assert_eq!(s.dispatch(&HostEvent::Keyup { key: "a".into() }), EventOutcome::Ignored);
        assert_eq!(s.state(), SessionState::Enabled);
    }

    #[test]
    fn disable_tears_everything_down() {
        let mut s = session("tracking");
        s.enable();
        s.dispatch(&hover("buy-label"));
        assert!(s.surface().tracking_visible());

        assert_eq!(s.disable(), EventOutcome::Disabled);
        assert!(!s.surface().root);
        assert!(s.surface().tracking.is_none());
        assert!(s.surface().block.is_none());
        assert_eq!(s.listener_count(), 0);
        assert!(!s.has_key_listener());
        assert!(s.controller().is_none());
        assert_eq!(s.dispatch(&HostEvent::Keyup { key: "Escape".into() }), EventOutcome::Ignored);

        assert!(matches!(s.enable(), EventOutcome::Enabled { .. }));
    }

    fn page_from(value: serde_json::Value) -> Page {
        let spec: DocumentSpec = serde_json::from_value(value).unwrap();
        Page::from_spec(spec)
    }

    #[test]
    fn frameset_element_alone_blocks_activation() {
        let page = page_from(json!({
            "url": "https://legacy.example/",
            "root": {"tag": "html", "children": [{"tag": "frameset", "children": [{"tag": "frame"}]}]}
        }));
        let mut s = InspectorSession::new(page, OverlayState::default(), SameOriginAccessor, options("0"));
        assert_eq!(
            s.enable(),
            EventOutcome::Unsupported {
                reason: FRAMESET_NOTICE.to_string()
            }
        );
        assert_eq!(s.listener_count(), 0);
        assert!(!s.surface().root);
    }

    #[test]
    fn page_without_url_can_be_inspected() {
        let page = page_from(json!({
            "root": {"tag": "html", "children": [{"tag": "body", "children": [
                {"tag": "p", "id": "copy", "rect": {"x": 0, "y": 0, "width": 40, "height": 20}}
            ]}]}
        }));
        let mut s = InspectorSession::new(page, OverlayState::default(), SameOriginAccessor, options("0"));
        assert!(matches!(s.enable(), EventOutcome::Enabled { .. }));
        assert!(s.surface().notices_shown.is_empty());
        assert_eq!(
            s.dispatch(&hover("copy")),
            EventOutcome::Hover {
                result: HoverOutcome::Rendered
            }
        );
    }

    #[test]
    fn frameset_pages_show_one_notice_and_abort() {
        let page = page_from(json!({
            "url": "https://legacy.example/",
            "frameset": true,
            "root": {"tag": "html", "children": [{"tag": "frameset"}]}
        }));
        let mut s = InspectorSession::new(page, OverlayState::default(), SameOriginAccessor, options("0"));
        assert!(matches!(s.enable(), EventOutcome::Unsupported { .. }));
        assert!(matches!(s.enable(), EventOutcome::Unsupported { .. }));
        assert_eq!(s.surface().notices_shown, vec![FRAMESET_NOTICE.to_string()]);
        assert!(!s.surface().root);
        assert_eq!(s.state(), SessionState::Disabled);
    }

    #[test]
    fn restricted_pages_are_refused() {
        let page = page_from(json!({
            "url": "chrome://settings/",
            "root": {"tag": "html"}
        }));
        let mut s = InspectorSession::new(page, OverlayState::default(), SameOriginAccessor, options("0"));
        assert_eq!(
            s.enable(),
            EventOutcome::Unsupported {
                reason: RESTRICTED_NOTICE.to_string()
            }
        );
    }

    struct DenyAll;

    impl FrameAccessor for DenyAll {
        fn content_document<'a>(
            &self,
            _host: &Document,
            _frame_element: &'a Element,
        ) -> Result<&'a Document, FrameAccessError> {
            Err(FrameAccessError::NotLoaded)
        }
    }

    #[test]
    fn traversal_survives_denied_frames() {
        let mut s = InspectorSession::new(sample_page(), OverlayState::default(), DenyAll, options("0"));
        match s.enable() {
            EventOutcome::Enabled { skipped_frames, .. } => assert_eq!(skipped_frames, 2),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!s.is_listening(&s.page().resolve("same/inner").unwrap()));
        assert!(s.is_listening(&s.page().resolve("intro").unwrap()));
    }

    #[test]
    fn mousemove_while_paused_is_ignored() {
        let mut s = session("0");
        s.enable();
        s.pause();
        assert_eq!(s.dispatch(&HostEvent::Mousemove { x: 1.0, y: 1.0 }), EventOutcome::Ignored);
    }

    #[test]
    fn events_deserialize_from_script() {
        let events: Vec<HostEvent> = serde_json::from_value(json!([
            {"type": "enable"},
            {"type": "mouseover", "target": "buy"},
            {"type": "mouseout", "target": "buy", "related": "intro"},
            {"type": "mousemove", "x": 3, "y": 4.5},
            {"type": "frame"},
            {"type": "keyup", "key": "Escape"},
            {"type": "elapse", "ms": 1500}
        ]))
        .unwrap();
        assert_eq!(events.len(), 7);
        assert_eq!(
            events[2],
            HostEvent::Mouseout {
                target: "buy".into(),
                related: Some("intro".into())
            }
        );
    }

    #[test]
    fn empty_pause_key_falls_back() {
        let mut opts = options("0");
        opts.pause_key = " ".to_string();
        assert!(opts.request_pause_key().is_err());
        let mut s = InspectorSession::new(sample_page(), OverlayState::default(), SameOriginAccessor, opts);
        s.enable();
        assert_eq!(s.dispatch(&HostEvent::Keyup { key: DEFAULT_PAUSE_KEY.into() }), EventOutcome::Paused);
    }
}
