//! Moves oversized content out of the inline transcript into the panel.
//!
//! Two sources feed the panel: marker regions embedded in text parts and
//! invocations of the reserved `collapsible` tool. Both resolve to at most
//! one [`ContentPanelItem`] per message; the last candidate wins.

use crate::panel::{ContentPanel, ContentPanelItem, PanelItemType};
use parley_contract::{Message, Part, ToolInvocationState, COLLAPSIBLE_TOOL_NAME};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

const MARKER_PATTERN: &str = r"<!--COLLAPSIBLE:(.*?)-->([\s\S]*?)<!--/COLLAPSIBLE-->";
const DEFAULT_TITLE: &str = "Collapsible Content";
const PREVIEW_CHARS: usize = 100;

/// Result of scanning one text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Text with every extracted region replaced by its placeholder.
    pub text: String,
    /// Extracted items in order of appearance.
    pub items: Vec<ContentPanelItem>,
}

/// Finds panel content embedded in text.
pub trait ContentExtractor: Send + Sync {
    /// Scan `text`. Item ids are derived from `id_prefix` and numbered from
    /// `first_index`. Regions that cannot be parsed are left untouched.
    fn extract(&self, text: &str, id_prefix: &str, first_index: usize) -> Extraction;
}

#[derive(Debug, Deserialize)]
struct MarkerMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "type", default)]
    item_type: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// `<!--COLLAPSIBLE:{json}-->payload<!--/COLLAPSIBLE-->` scanner.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkerExtractor;

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MARKER_PATTERN).expect("marker pattern"))
}

/// First `PREVIEW_CHARS` characters, with `...` when truncated.
pub fn preview(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Compact inline stand-in for an extracted region.
pub fn placeholder(item: &ContentPanelItem, summary: Option<&str>) -> String {
    let mut out = format!(
        "[{}: {}]",
        item.item_type.label(item.language.as_deref()),
        item.title
    );
    if let Some(summary) = summary.filter(|s| !s.is_empty()) {
        out.push('\n');
        out.push_str(summary);
    }
    let preview = preview(&item.content);
    if !preview.is_empty() {
        out.push_str("\n> ");
        out.push_str(&preview.replace('\n', " "));
    }
    out
}

impl ContentExtractor for MarkerExtractor {
    fn extract(&self, text: &str, id_prefix: &str, first_index: usize) -> Extraction {
        let mut out = String::with_capacity(text.len());
        let mut items = Vec::new();
        let mut last_end = 0;

        for captures in marker_regex().captures_iter(text) {
            let (Some(whole), Some(meta), Some(payload)) =
                (captures.get(0), captures.get(1), captures.get(2))
            else {
                continue;
            };
            let metadata = match serde_json::from_str::<MarkerMetadata>(meta.as_str()) {
                Ok(metadata) => metadata,
                Err(e) => {
                    tracing::debug!(error = %e, "malformed marker metadata left inline");
                    continue;
                }
            };

            let item = ContentPanelItem {
                id: format!("{id_prefix}-collapsible-{}", first_index + items.len()),
                title: metadata
                    .title
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
                content: payload.as_str().to_string(),
                item_type: metadata
                    .item_type
                    .as_deref()
                    .map(PanelItemType::parse)
                    .unwrap_or_default(),
                language: metadata.language,
            };
            out.push_str(&text[last_end..whole.start()]);
            out.push_str(&placeholder(&item, metadata.summary.as_deref()));
            last_end = whole.end();
            items.push(item);
        }
        out.push_str(&text[last_end..]);

        Extraction { text: out, items }
    }
}

/// A message split into what stays inline and what goes to the panel.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedMessage {
    pub inline: Message,
    pub panel_item: Option<ContentPanelItem>,
}

pub struct ContentRouter {
    extractor: Box<dyn ContentExtractor>,
}

impl Default for ContentRouter {
    fn default() -> Self {
        Self::new(MarkerExtractor)
    }
}

impl std::fmt::Debug for ContentRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentRouter").finish_non_exhaustive()
    }
}

impl ContentRouter {
    pub fn new(extractor: impl ContentExtractor + 'static) -> Self {
        Self {
            extractor: Box::new(extractor),
        }
    }

    pub fn route(&self, message: &Message) -> RoutedMessage {
        let mut inline = message.clone();
        let mut panel_item = None;
        // Marker ids are numbered across the whole message, not per part.
        let mut extracted = 0;

        for part in &mut inline.parts {
            match part {
                Part::Text { text } => {
                    let extraction = self.extractor.extract(text, &message.id, extracted);
                    extracted += extraction.items.len();
                    if let Some(item) = extraction.items.into_iter().last() {
                        panel_item = Some(item);
                    }
                    *text = extraction.text;
                }
                Part::ToolInvocation {
                    tool_call_id,
                    tool_name,
                    state,
                    args,
                    ..
                } => {
                    if tool_name.as_str() != COLLAPSIBLE_TOOL_NAME
                        || !matches!(
                            state,
                            ToolInvocationState::Call | ToolInvocationState::Result
                        )
                    {
                        continue;
                    }
                    if let Some(item) = collapsible_tool_item(tool_call_id, args) {
                        panel_item = Some(item);
                    }
                }
            }
        }

        RoutedMessage { inline, panel_item }
    }

    /// Route and open the resulting item, unless the panel already shows it.
    pub fn route_into(&self, message: &Message, panel: &ContentPanel) -> Message {
        let routed = self.route(message);
        if let Some(item) = routed.panel_item {
            if panel.current().as_ref() != Some(&item) {
                panel.open(item);
            }
        }
        routed.inline
    }
}

fn collapsible_tool_item(tool_call_id: &str, args: &serde_json::Value) -> Option<ContentPanelItem> {
    let content = args.get("content")?.as_str()?;
    if content.is_empty() {
        return None;
    }
    let text_field = |key: &str| {
        args.get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    Some(ContentPanelItem {
        id: tool_call_id.to_string(),
        title: text_field("title")
            .or_else(|| text_field("summary"))
            .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        content: content.to_string(),
        item_type: PanelItemType::Text,
        language: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assistant_text(text: &str) -> Message {
        Message::assistant("m1").with_part(Part::text(text))
    }

    #[test]
    fn marker_region_round_trip() {
        let text = r#"Here you go. <!--COLLAPSIBLE:{"title":"Report","type":"text","summary":"Quarterly"}-->X<!--/COLLAPSIBLE--> Done."#;
        let routed = ContentRouter::default().route(&assistant_text(text));

        let item = routed.panel_item.expect("panel item");
        assert_eq!(item.content, "X");
        assert_eq!(item.title, "Report");
        assert_eq!(item.item_type, PanelItemType::Text);

        let inline = routed.inline.text();
        assert!(inline.starts_with("Here you go. [Text Content: Report]"));
        assert!(inline.contains("Quarterly"));
        assert!(inline.ends_with("> X Done."));
        assert!(!inline.contains("COLLAPSIBLE"));
    }

    #[test]
    fn malformed_metadata_fails_open() {
        let text = "before <!--COLLAPSIBLE:{title: nope}-->payload<!--/COLLAPSIBLE--> after";
        let routed = ContentRouter::default().route(&assistant_text(text));
        assert_eq!(routed.inline.text(), text);
        assert!(routed.panel_item.is_none());
    }

    #[test]
    fn preview_is_bounded() {
        let payload = "y".repeat(250);
        let text = format!(
            "<!--COLLAPSIBLE:{{\"title\":\"Code\",\"type\":\"code\",\"language\":\"rust\"}}-->{payload}<!--/COLLAPSIBLE-->"
        );
        let routed = ContentRouter::default().route(&assistant_text(&text));
        let inline = routed.inline.text();
        assert!(inline.starts_with("[RUST Code: Code]"));
        assert!(inline.contains(&format!("{}...", "y".repeat(100))));
        assert!(!inline.contains(&"y".repeat(101)));
        assert_eq!(routed.panel_item.map(|i| i.content), Some(payload));
    }

    #[test]
    fn defaults_apply_and_last_region_wins() {
        let text = "<!--COLLAPSIBLE:{}-->one<!--/COLLAPSIBLE--> and <!--COLLAPSIBLE:{\"type\":\"json\",\"title\":\"Data\"}-->{\"a\":1}<!--/COLLAPSIBLE-->";
        let routed = ContentRouter::default().route(&assistant_text(text));
        let inline = routed.inline.text();
        assert!(inline.contains("[Text Content: Collapsible Content]"));
        assert!(inline.contains("[JSON Data: Data]"));
        let item = routed.panel_item.unwrap();
        assert_eq!(item.content, "{\"a\":1}");
        assert_eq!(item.id, "m1-collapsible-1");
    }

    #[test]
    fn multiline_payload_is_captured() {
        let text = "<!--COLLAPSIBLE:{\"title\":\"T\",\"type\":\"table\"}-->\n| a | b |\n|---|---|\n<!--/COLLAPSIBLE-->";
        let routed = ContentRouter::default().route(&assistant_text(text));
        assert_eq!(
            routed.panel_item.map(|i| i.content),
            Some("\n| a | b |\n|---|---|\n".to_string())
        );
    }

    #[test]
    fn payload_whitespace_is_preserved() {
        let text = "<!--COLLAPSIBLE:{}-->  indented\n\tcode  <!--/COLLAPSIBLE-->";
        let routed = ContentRouter::default().route(&assistant_text(text));
        assert_eq!(
            routed.panel_item.map(|i| i.content),
            Some("  indented\n\tcode  ".to_string())
        );
    }

    #[test]
    fn marker_ids_are_unique_across_text_parts() {
        let msg = Message::assistant("m1")
            .with_part(Part::text("<!--COLLAPSIBLE:{\"title\":\"A\"}-->a<!--/COLLAPSIBLE-->"))
            .with_part(Part::tool_result("c1", "web_search", json!({}), json!({})))
            .with_part(Part::text("<!--COLLAPSIBLE:{\"title\":\"B\"}-->b<!--/COLLAPSIBLE-->"));
        let routed = ContentRouter::default().route(&msg);
        let item = routed.panel_item.unwrap();
        assert_eq!(item.title, "B");
        assert_eq!(item.id, "m1-collapsible-1");

        let first = MarkerExtractor.extract("<!--COLLAPSIBLE:{}-->a<!--/COLLAPSIBLE-->", "m1", 0);
        assert_eq!(first.items[0].id, "m1-collapsible-0");
    }

    #[test]
    fn collapsible_tool_call_becomes_text_item() {
        let msg = Message::assistant("m1").with_part(Part::ToolInvocation {
            tool_call_id: "call_7".into(),
            tool_name: COLLAPSIBLE_TOOL_NAME.into(),
            state: ToolInvocationState::Call,
            args: json!({"title": "Long answer", "content": "full text"}),
            result: None,
        });
        let routed = ContentRouter::default().route(&msg);
        let item = routed.panel_item.unwrap();
        assert_eq!(item.id, "call_7");
        assert_eq!(item.title, "Long answer");
        assert_eq!(item.item_type, PanelItemType::Text);
        assert_eq!(routed.inline, msg);
    }

    #[test]
    fn streaming_or_foreign_tool_parts_are_ignored() {
        let msg = Message::assistant("m1")
            .with_part(Part::ToolInvocation {
                tool_call_id: "c1".into(),
                tool_name: COLLAPSIBLE_TOOL_NAME.into(),
                state: ToolInvocationState::PartialCall,
                args: json!({"content": "partial"}),
                result: None,
            })
            .with_part(Part::tool_result("c2", "web_search", json!({"content": "x"}), json!({})));
        assert!(ContentRouter::default().route(&msg).panel_item.is_none());
    }

    #[test]
    fn route_into_opens_panel_once() {
        let panel = ContentPanel::new();
        let opened = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = opened.clone();
        panel.subscribe(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        let router = ContentRouter::default();
        let msg = assistant_text("<!--COLLAPSIBLE:{\"title\":\"A\"}-->body<!--/COLLAPSIBLE-->");
        router.route_into(&msg, &panel);
        router.route_into(&msg, &panel);
        assert_eq!(opened.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(panel.current().map(|i| i.title), Some("A".to_string()));
    }
}
