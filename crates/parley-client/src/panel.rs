//! Single-slot content panel.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PanelItemType {
    Code,
    #[default]
    Text,
    Table,
    Json,
}

impl PanelItemType {
    /// Parse a marker `type`; unknown values fall back to `Text`.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "code" => Self::Code,
            "table" => Self::Table,
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Human label shown in inline placeholders.
    pub fn label(self, language: Option<&str>) -> String {
        match self {
            Self::Code => match language {
                Some(lang) if !lang.is_empty() => format!("{} Code", lang.to_uppercase()),
                _ => "Code".to_string(),
            },
            Self::Json => "JSON Data".to_string(),
            Self::Table => "Table".to_string(),
            Self::Text => "Text Content".to_string(),
        }
    }
}

/// Content shown in the panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPanelItem {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub item_type: PanelItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Snapshot handed to observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelState {
    pub item: Option<ContentPanelItem>,
    pub open: bool,
}

type Observer = Arc<dyn Fn(&PanelState) + Send + Sync>;

/// Holds at most one item. Opening replaces the previous item unconditionally.
///
/// Observers are called synchronously, in subscription order, after each
/// change, with no lock held, so they may read, change or subscribe to the
/// panel. Observers added during a notification see the next change.
#[derive(Default)]
pub struct ContentPanel {
    state: Mutex<PanelState>,
    observers: Mutex<Vec<Observer>>,
}

impl std::fmt::Debug for ContentPanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentPanel")
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ContentPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: impl Fn(&PanelState) + Send + Sync + 'static) {
        lock(&self.observers).push(Arc::new(observer));
    }

    pub fn open(&self, item: ContentPanelItem) {
        let snapshot = {
            let mut state = lock(&self.state);
            if let Some(previous) = &state.item {
                if previous.id != item.id {
                    tracing::debug!(previous = %previous.id, next = %item.id, "panel item replaced");
                }
            }
            state.item = Some(item);
            state.open = true;
            state.clone()
        };
        self.notify(&snapshot);
    }

    /// Hide the panel and drop its item.
    pub fn close(&self) {
        let snapshot = {
            let mut state = lock(&self.state);
            if state.item.is_none() && !state.open {
                return;
            }
            *state = PanelState::default();
            state.clone()
        };
        self.notify(&snapshot);
    }

    pub fn snapshot(&self) -> PanelState {
        lock(&self.state).clone()
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    pub fn current(&self) -> Option<ContentPanelItem> {
        lock(&self.state).item.clone()
    }

    fn notify(&self, snapshot: &PanelState) {
        let observers = lock(&self.observers).clone();
        for observer in &observers {
            observer(snapshot);
        }
    }
}
