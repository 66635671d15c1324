//! Side effects produced by session transitions.
//! Transitions compute these as values; an `EffectSink` performs them.

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

/// Fire-and-forget user notification (a toast in the browser client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NoticeKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Success, message: message.into(), description: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Error, message: message.into(), description: None }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Info, message: message.into(), description: None }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigation {
    pub path: String,
    #[serde(default)]
    pub replace: bool,
    /// Originally requested path, so a login flow can return there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl Navigation {
    pub fn push(path: impl Into<String>) -> Self { Self { path: path.into(), replace: false, from: None } }
    pub fn replace(path: impl Into<String>) -> Self { Self { path: path.into(), replace: true, from: None } }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    Navigate(Navigation),
    Notify(Notification),
}

impl Effect {
    pub fn as_navigation(&self) -> Option<&Navigation> {
        match self { Effect::Navigate(n) => Some(n), _ => None }
    }

    pub fn as_notification(&self) -> Option<&Notification> {
        match self { Effect::Notify(n) => Some(n), _ => None }
    }
}

/// Navigation + notification boundary.
pub trait EffectSink: Send + Sync {
    fn navigate(&self, nav: &Navigation);
    fn notify(&self, note: &Notification);

    fn dispatch(&self, effects: &[Effect]) {
        for e in effects {
            match e {
                Effect::Navigate(n) => self.navigate(n),
                Effect::Notify(n) => self.notify(n),
            }
        }
    }
}

/// Logs effects. Used where the effects travel back to the caller as values
/// (the HTTP surface) and nothing else needs to observe them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EffectSink for TracingSink {
    fn navigate(&self, nav: &Navigation) {
        info!(target: "session", path = %nav.path, replace = nav.replace, from = ?nav.from, "navigate");
    }

    fn notify(&self, note: &Notification) {
        info!(target: "session", kind = ?note.kind, message = %note.message, "notify");
    }
}
