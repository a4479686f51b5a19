//! Conversation list: every conversation the signed-in user takes part in,
//! newest activity first, with live peer presence.

use std::{
    future::{poll_fn, Future},
    sync::Arc,
    task::Poll,
};

use chrono::{DateTime, Utc};

use crate::{
    constants::DEFAULT_AVATAR_BASE,
    i18n::t,
    modules::{
        conversation::{
            presence::PresenceTracker,
            repository::ConversationRepository,
            repository_doc::ConversationDocRepository,
            schema::{ConversationEntity, LastMessage},
        },
        message::schema::MediaKind,
        user::{repository::UserRepository, repository_doc::UserDocRepository},
    },
    platform::{
        document::{poll_slot, QuerySnapshot, SnapshotResult, Subscription},
        Clock, Platform,
    },
    utils::time::format_time_ago,
};

/// Preview line for a list row.
pub fn preview_text(last: Option<&LastMessage>, me: &str) -> String {
    let Some(last) = last else {
        return "...".to_string();
    };
    let text_or = |fallback: &str| {
        if last.text.trim().is_empty() {
            t(fallback, &[])
        } else {
            last.text.clone()
        }
    };

    let body = match last.media_type {
        Some(MediaKind::Image) => format!("📷 {}", text_or("messages.media.photo")),
        Some(MediaKind::Video) => format!("📹 {}", text_or("messages.media.video")),
        Some(MediaKind::Audio) => format!("🎤 {}", t("messages.media.audio", &[])),
        Some(MediaKind::ForwardedPost) => format!("↪️ {}", t("messages.forwardedPost", &[])),
        None if last.text.is_empty() => "...".to_string(),
        None => last.text.clone(),
    };

    if last.sender_id == me {
        format!("{}: {body}", t("common.you", &[]))
    } else {
        body
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationRow {
    pub id: String,
    pub peer_id: String,
    pub username: String,
    pub avatar: String,
    pub preview: String,
    pub last_message_at: Option<DateTime<Utc>>,
    pub time_ago: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListEvent {
    Conversations,
    Presence(String),
}

enum Source {
    Conversations(SnapshotResult<QuerySnapshot>),
    Presence(String),
}

pub struct ConversationListView {
    me: String,
    user_repo: Arc<UserDocRepository>,
    clock: Arc<dyn Clock>,
    subscription: Option<Subscription<QuerySnapshot>>,
    presence: PresenceTracker<UserDocRepository>,
    rows: Vec<ConversationRow>,
    loading: bool,
}

impl ConversationListView {
    pub fn open(platform: &Platform, me: &str) -> Self {
        let conversations = ConversationDocRepository::new(platform.db.clone());
        let user_repo = Arc::new(UserDocRepository::new(platform.db.clone()));
        ConversationListView {
            me: me.to_string(),
            subscription: Some(conversations.watch_for_user(me)),
            presence: PresenceTracker::new(user_repo.clone(), platform.clock.clone()),
            user_repo,
            clock: platform.clock.clone(),
            rows: Vec::new(),
            loading: true,
        }
    }

    /// Drops the conversation and presence listeners.
    pub fn close(&mut self) {
        self.subscription = None;
        self.presence.clear();
        self.rows.clear();
        self.loading = false;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Placeholder text while the list has no rows to show.
    pub fn placeholder(&self) -> Option<String> {
        if self.loading {
            Some(t("messages.loading", &[]))
        } else if self.rows.is_empty() {
            Some(t("messages.noConversations", &[]))
        } else {
            None
        }
    }

    pub fn rows(&self) -> Vec<ConversationRow> {
        let now = self.clock.now();
        self.rows
            .iter()
            .map(|row| ConversationRow {
                online: self.presence.is_online(&row.peer_id),
                time_ago: row.last_message_at.map(|ts| format_time_ago(ts, now)),
                ..row.clone()
            })
            .collect()
    }

    /// Waits for the next conversation or presence snapshot and folds it into
    /// the view. `None` once the view is closed.
    pub async fn next_event(&mut self) -> Option<ListEvent> {
        if self.subscription.is_none() && self.presence.tracked() == 0 {
            return None;
        }

        let source = {
            let subscription = &mut self.subscription;
            let presence = self.presence.changed();
            tokio::pin!(presence);
            poll_fn(|cx| {
                if let Poll::Ready(result) = poll_slot(subscription, cx) {
                    return Poll::Ready(Source::Conversations(result));
                }
                presence.as_mut().poll(cx).map(Source::Presence)
            })
            .await
        };

        match source {
            Source::Conversations(Ok(snapshot)) => {
                self.apply(snapshot).await;
                Some(ListEvent::Conversations)
            }
            Source::Conversations(Err(err)) => {
                tracing::error!(error = ?err, "conversation list listener failed");
                self.rows.clear();
                self.presence.clear();
                self.loading = false;
                Some(ListEvent::Conversations)
            }
            Source::Presence(uid) => Some(ListEvent::Presence(uid)),
        }
    }

    async fn apply(&mut self, snapshot: QuerySnapshot) {
        let mut rows = Vec::with_capacity(snapshot.len());

        for doc in &snapshot.docs {
            let conversation = match ConversationEntity::from_snapshot(doc) {
                Ok(Some(conversation)) => conversation,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(conversation = %doc.id(), error = ?err, "skipping unreadable conversation");
                    continue;
                }
            };
            let Some(peer_id) = conversation.peer_of(&self.me).map(str::to_string) else {
                continue;
            };
            let Some((username, avatar)) = self.peer_display(&conversation, &peer_id).await else {
                continue;
            };

            rows.push(ConversationRow {
                id: conversation.id.clone(),
                preview: preview_text(conversation.last_message.as_ref(), &self.me),
                last_message_at: conversation.last_message.as_ref().and_then(|m| m.timestamp),
                time_ago: None,
                timestamp: conversation.timestamp,
                online: false,
                peer_id,
                username,
                avatar,
            });
        }

        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.presence.track(rows.iter().map(|row| row.peer_id.clone()));
        self.rows = rows;
        self.loading = false;
    }

    /// Cached participant info, or the peer's profile when the cache is
    /// incomplete. `None` drops the row: the peer no longer exists.
    async fn peer_display(
        &self,
        conversation: &ConversationEntity,
        peer_id: &str,
    ) -> Option<(String, String)> {
        if let Some(info) = conversation.participant_info.get(peer_id) {
            if !info.username.is_empty() && !info.avatar.is_empty() {
                return Some((info.username.clone(), info.avatar.clone()));
            }
        }

        match self.user_repo.find_by_id(peer_id).await {
            Ok(Some(user)) => {
                let avatar = if user.avatar.is_empty() {
                    format!("{DEFAULT_AVATAR_BASE}{peer_id}")
                } else {
                    user.avatar
                };
                Some((user.username, avatar))
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(peer = %peer_id, error = ?err, "peer lookup failed");
                None
            }
        }
    }
}
