//! One chat conversation: transcript, streamed turns and persistence

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use super::client::{ChatBackend, ChatRequest};
use super::context::site_content;
use super::ingest::StreamEvent;
use super::message::{apply_delta, ChatMessage, WireMessage};
use crate::db::repositories::conversation::Conversation;
use crate::db::ConversationRepository;
use crate::error::ChatError;
use crate::plan::ContentPlan;
use crate::store::ContentStore;

/// Tool arguments that did not form a valid plan, kept for display
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedPlan {
    pub raw: String,
    pub error: String,
}

#[derive(Debug)]
pub struct TurnOutcome {
    pub conversation_id: String,
    /// Assistant text of this turn (possibly partial)
    pub reply: String,
    pub plans: Vec<ContentPlan>,
    pub rejected: Vec<RejectedPlan>,
    /// Transport failure that cut the turn short
    pub error: Option<ChatError>,
}

pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn ContentStore>,
    conversations: ConversationRepository,
    conversation_id: Option<String>,
    messages: Vec<ChatMessage>,
    site_content_rows: usize,
}

impl ChatSession {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn ContentStore>,
        conversations: ConversationRepository,
    ) -> Self {
        Self {
            backend,
            store,
            conversations,
            conversation_id: None,
            messages: Vec::new(),
            site_content_rows: 20,
        }
    }

    pub fn with_site_content_rows(mut self, rows: usize) -> Self {
        self.site_content_rows = rows;
        self
    }

    /// Continue a stored conversation
    pub fn resume(mut self, conversation: Conversation) -> Self {
        self.conversation_id = Some(conversation.id);
        self.messages = conversation.messages;
        self
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Send a user message, stream the reply and persist the transcript.
    ///
    /// A transport failure ends the turn early but keeps any partial reply;
    /// the transcript is written either way.
    pub async fn send(&mut self, text: &str) -> Result<TurnOutcome> {
        self.messages.push(ChatMessage::user(text));
        let turn_start = self.messages.len();

        let site_content = match site_content(self.store.as_ref(), self.site_content_rows).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to build site content digest: {}", e);
                String::new()
            }
        };

        let request = ChatRequest {
            messages: self.messages.iter().map(WireMessage::from).collect(),
            site_content,
        };

        let backend = Arc::clone(&self.backend);
        let mut plans: Vec<ContentPlan> = Vec::new();
        let mut rejected: Vec<RejectedPlan> = Vec::new();

        let result = {
            let messages = &mut self.messages;
            let mut on_event = |event: StreamEvent| match event {
                StreamEvent::TextDelta(delta) => apply_delta(messages, &delta),
                StreamEvent::ToolCallStarted { name } => debug!("Tool call started: {}", name),
                StreamEvent::PlanReady(plan) => plans.push(plan),
                StreamEvent::PlanRejected { raw, error } => rejected.push(RejectedPlan { raw, error }),
                StreamEvent::Done => {}
            };
            backend.stream_reply(&request, &mut on_event).await
        };

        if !plans.is_empty() {
            if self.messages.len() == turn_start {
                self.messages.push(ChatMessage::assistant(""));
            }
            if let Some(last) = self.messages.last_mut() {
                last.plans.extend(plans.iter().cloned());
            }
        }

        let reply = if self.messages.len() > turn_start {
            self.messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default()
        } else {
            String::new()
        };

        let error = result.err();
        if let Some(e) = &error {
            warn!("Chat turn aborted: {}", e);
        }

        let conversation = self
            .conversations
            .upsert(self.conversation_id.as_deref(), &self.messages)
            .await?;
        self.conversation_id = Some(conversation.id.clone());

        Ok(TurnOutcome {
            conversation_id: conversation.id,
            reply,
            plans,
            rejected,
            error,
        })
    }
}
