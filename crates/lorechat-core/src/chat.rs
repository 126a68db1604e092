//! Conversation orchestration
//!
//! A `ChatSession` owns the cached lorebook and history for one user session
//! and moves between two phases:
//!
//! - `Idle`: new user input may be submitted
//! - `AwaitingReply`: the last message is from the user and exactly one
//!   provider call must complete before more input is accepted
//!
//! The provider call is split into `begin_reply` / `finish_reply` so callers
//! that share the session behind a lock can release it while the request is
//! in flight. The `processing` flag keeps a second caller from starting a
//! duplicate call in the meantime. `reset` clears the flag and bumps the
//! generation, so a reply that lands after a reset is dropped.

use crate::ai::{ChatProvider, CompletionRequest, CompletionSettings, ContentBlock};
use crate::config::DataPaths;
use crate::prompt::compose_system_prompt;
use crate::state::{ChatMessage, ChatRole, LorebookConfig};
use crate::store::{load_json, save_json};
use anyhow::Result;
use std::fmt;

pub const EMPTY_REPLY: &str = "❌ No response (the API returned an empty reply)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingReply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Warning,
    Error,
}

/// A one-shot banner for the next rendered page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatError {
    /// The previous user message has not been answered yet
    AwaitingReply,
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::AwaitingReply => {
                write!(f, "A reply is still being generated; wait for it before sending more")
            }
        }
    }
}

impl std::error::Error for ChatError {}

/// How a reply cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Replied,
    Empty,
    Failed(String),
    /// The conversation was reset while the call was in flight
    Discarded,
}

/// A reply that has been claimed by `begin_reply` and not yet finished
#[derive(Debug, Clone)]
pub struct PendingReply {
    pub request: CompletionRequest,
    generation: u64,
}

pub struct ChatSession {
    paths: DataPaths,
    settings: CompletionSettings,
    lorebook: LorebookConfig,
    messages: Vec<ChatMessage>,
    processing: bool,
    generation: u64,
    notices: Vec<Notice>,
}

impl ChatSession {
    /// Load both documents from disk, queueing a warning for any that were malformed
    pub fn open(paths: DataPaths, settings: CompletionSettings) -> Result<Self> {
        let lorebook = load_json(&paths.lorebook, LorebookConfig::default())?;
        let messages = load_json(&paths.messages, Vec::<ChatMessage>::new())?;

        let notices = [lorebook.warning, messages.warning]
            .into_iter()
            .flatten()
            .map(|w| Notice::warning(format!("⚠️ {}", w)))
            .collect();

        tracing::info!(
            messages = messages.value.len(),
            lorebook = %paths.lorebook.display(),
            "chat session opened"
        );

        Ok(Self {
            paths,
            settings,
            lorebook: lorebook.value,
            messages: messages.value,
            processing: false,
            generation: 0,
            notices,
        })
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn lorebook(&self) -> &LorebookConfig {
        &self.lorebook
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn phase(&self) -> Phase {
        if self.processing || self.last_is_user() {
            Phase::AwaitingReply
        } else {
            Phase::Idle
        }
    }

    fn last_is_user(&self) -> bool {
        self.messages
            .last()
            .is_some_and(|m| m.role == ChatRole::User)
    }

    /// True when the last message is unanswered and nobody is answering it
    pub fn needs_reply(&self) -> bool {
        self.last_is_user() && !self.processing
    }

    pub fn push_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Append a user message and persist the history.
    ///
    /// Blank input is ignored and returns `Ok(false)`.
    pub fn submit(&mut self, input: &str) -> Result<bool> {
        if self.phase() == Phase::AwaitingReply {
            return Err(ChatError::AwaitingReply.into());
        }
        if input.trim().is_empty() {
            return Ok(false);
        }

        self.messages.push(ChatMessage::user(input));
        save_json(&self.paths.messages, &self.messages)?;
        tracing::info!(messages = self.messages.len(), "user message stored");
        Ok(true)
    }

    /// Claim the pending reply, if any, and build the provider request for it
    pub fn begin_reply(&mut self) -> Option<PendingReply> {
        if !self.needs_reply() {
            return None;
        }
        self.processing = true;

        let system = compose_system_prompt(&self.lorebook);
        let request = CompletionRequest::new(&self.settings, system, self.messages.clone());
        Some(PendingReply {
            request,
            generation: self.generation,
        })
    }

    /// Record the provider result, persist, and return to idle
    pub fn finish_reply(
        &mut self,
        pending: PendingReply,
        result: Result<Vec<ContentBlock>>,
    ) -> Result<ReplyOutcome> {
        if pending.generation != self.generation {
            tracing::info!("conversation was reset during the call; dropping reply");
            return Ok(ReplyOutcome::Discarded);
        }

        let (reply, outcome) = match result {
            Ok(blocks) => {
                let text: String = blocks
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        ContentBlock::Other => None,
                    })
                    .collect();
                let text = text.trim();
                if text.is_empty() {
                    tracing::warn!(blocks = blocks.len(), "provider returned no text");
                    (EMPTY_REPLY.to_string(), ReplyOutcome::Empty)
                } else {
                    (text.to_string(), ReplyOutcome::Replied)
                }
            }
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "provider call failed");
                self.notices
                    .push(Notice::error(format!("API call failed: {:#}", e)));
                (
                    format!("❌ API call error: {:#}", e),
                    ReplyOutcome::Failed(format!("{:#}", e)),
                )
            }
        };

        self.messages.push(ChatMessage::assistant(reply));
        self.processing = false;
        save_json(&self.paths.messages, &self.messages)?;
        Ok(outcome)
    }

    /// Run a whole reply cycle while holding exclusive access to the session
    pub async fn respond(&mut self, provider: &dyn ChatProvider) -> Result<Option<ReplyOutcome>> {
        let Some(pending) = self.begin_reply() else {
            return Ok(None);
        };
        let result = provider.complete(&pending.request).await;
        self.finish_reply(pending, result).map(Some)
    }

    /// Replace the lorebook and user info and persist them
    pub fn save_lorebook(&mut self, lorebook: LorebookConfig) -> Result<()> {
        self.lorebook = lorebook;
        save_json(&self.paths.lorebook, &self.lorebook)?;
        self.notices
            .push(Notice::success("✅ Lorebook & user info saved"));
        Ok(())
    }

    /// Drop the whole conversation and persist the empty history.
    ///
    /// Any reply still in flight is abandoned.
    pub fn reset(&mut self) -> Result<()> {
        self.messages.clear();
        self.processing = false;
        self.generation += 1;
        save_json(&self.paths.messages, &self.messages)?;
        self.notices
            .push(Notice::success("✅ Conversation cleared"));
        tracing::info!("conversation reset");
        Ok(())
    }
}
