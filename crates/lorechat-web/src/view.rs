//! Page layout and view-model
//!
//! Handlers build a `PageView` from the session and hand it to the
//! `PageRenderer`; the template never sees core types directly.

use anyhow::{anyhow, Result};
use handlebars::Handlebars;
use lorechat_core::{
    render_message, ChatMessage, ChatRole, LorebookConfig, MessageBody, Notice, NoticeKind,
    Segment,
};
use serde::Serialize;

const PAGE_TEMPLATE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/index.hbs"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Settings and chat side by side
    Desktop,
    /// Settings and chat on separate tabs
    Mobile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    Chat,
    Settings,
}

impl Tab {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("settings") => Tab::Settings,
            _ => Tab::Chat,
        }
    }
}

/// Pick a layout from an explicit `layout` query value or the browser's user agent
pub fn detect_layout(requested: Option<&str>, user_agent: Option<&str>) -> Layout {
    match requested {
        Some("mobile") => return Layout::Mobile,
        Some("desktop") => return Layout::Desktop,
        _ => {}
    }

    let ua = user_agent.unwrap_or_default();
    if ["Mobi", "Android", "iPhone"].iter().any(|marker| ua.contains(marker)) {
        Layout::Mobile
    } else {
        Layout::Desktop
    }
}

#[derive(Debug, Serialize)]
pub struct NoticeView {
    pub kind: &'static str,
    pub text: String,
}

impl From<Notice> for NoticeView {
    fn from(notice: Notice) -> Self {
        let kind = match notice.kind {
            NoticeKind::Success => "success",
            NoticeKind::Warning => "warning",
            NoticeKind::Error => "error",
        };
        Self {
            kind,
            text: notice.text,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SegmentView {
    pub narrative: bool,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub role: &'static str,
    pub avatar: &'static str,
    pub verbatim: Option<String>,
    pub segments: Vec<SegmentView>,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        let avatar = match message.role {
            ChatRole::User => "🧑",
            ChatRole::Assistant => "🤖",
        };
        let (verbatim, segments) = match render_message(message) {
            MessageBody::Verbatim(text) => (Some(text), Vec::new()),
            MessageBody::Segments(segments) => (
                None,
                segments
                    .into_iter()
                    .map(|segment| match segment {
                        Segment::Narrative(text) => SegmentView {
                            narrative: true,
                            text,
                        },
                        Segment::Dialogue(text) => SegmentView {
                            narrative: false,
                            text,
                        },
                    })
                    .collect(),
            ),
        };

        Self {
            role: message.role.as_str(),
            avatar,
            verbatim,
            segments,
        }
    }
}

/// Everything the page template renders
#[derive(Debug, Serialize)]
pub struct PageView {
    pub title: &'static str,
    pub layout: Layout,
    pub mobile: bool,
    pub chat_tab: bool,
    pub settings_tab: bool,
    pub lorebook_rows: u8,
    pub user_info_rows: u8,
    pub notices: Vec<NoticeView>,
    pub messages: Vec<MessageView>,
    pub lorebook: String,
    pub user_info: String,
    pub processing: bool,
}

impl PageView {
    pub fn build(
        layout: Layout,
        tab: Tab,
        messages: &[ChatMessage],
        lorebook: &LorebookConfig,
        notices: Vec<Notice>,
        processing: bool,
    ) -> Self {
        let mobile = layout == Layout::Mobile;
        let (title, lorebook_rows, user_info_rows) = if mobile {
            ("🤖 RP AI Chat", 7, 5)
        } else {
            ("🤖 RP AI Role-play Chat", 12, 7)
        };

        Self {
            title,
            layout,
            mobile,
            chat_tab: !mobile || tab == Tab::Chat,
            settings_tab: !mobile || tab == Tab::Settings,
            lorebook_rows,
            user_info_rows,
            notices: notices.into_iter().map(NoticeView::from).collect(),
            messages: messages.iter().map(MessageView::from).collect(),
            lorebook: lorebook.lorebook.clone(),
            user_info: lorebook.user_info.clone(),
            processing,
        }
    }
}

pub struct PageRenderer {
    registry: Handlebars<'static>,
}

impl PageRenderer {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry
            .register_template_string("index", PAGE_TEMPLATE)
            .map_err(|e| anyhow!("Failed to parse page template: {}", e))?;
        Ok(Self { registry })
    }

    pub fn render(&self, view: &PageView) -> Result<String> {
        self.registry
            .render("index", view)
            .map_err(|e| anyhow!("Failed to render page: {}", e))
    }
}
