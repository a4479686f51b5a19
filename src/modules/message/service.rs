/// Message Service
///
/// Sending, deleting and read receipts for direct messages:
/// - send commits the message, the conversation summary (last message,
///   activity, crystal) and the recipient's notification as one batch
/// - delete removes the message, then recomputes the summary in a second,
///   separate write
/// - read receipts move the reader's watermark forward, never back
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    api::error,
    modules::{
        conversation::{
            crystal::next_streak,
            model::ConversationActivity,
            repository::ConversationRepository,
            repository_doc::ConversationDocRepository,
            schema::LastMessage,
        },
        file_upload::MediaService,
        message::{
            model::{InsertMessage, SendMessage, Sender},
            repository::MessageRepository,
            repository_doc::MessageDocRepository,
            schema::{MediaKind, MessageEntity},
        },
        notification::{repository_doc::NotificationDocRepository, schema::NewNotification},
    },
    platform::{document::WriteBatch, Platform},
};

/// Id of my newest message if the peer's watermark has reached it.
pub fn seen_message_id<'a>(
    messages: &'a [MessageEntity],
    me: &str,
    peer_watermark: Option<DateTime<Utc>>,
) -> Option<&'a str> {
    let mine = messages.iter().rev().find(|message| message.sender_id == me)?;
    let sent_at = mine.timestamp?;
    (peer_watermark? >= sent_at).then_some(mine.id.as_str())
}

#[derive(Clone)]
pub struct MessageService<M, C>
where
    M: MessageRepository + Send + Sync,
    C: ConversationRepository + Send + Sync,
{
    message_repo: Arc<M>,
    conversation_repo: Arc<C>,
    notifications: NotificationDocRepository,
    media: MediaService,
    platform: Platform,
}

pub type MessageSvc = MessageService<MessageDocRepository, ConversationDocRepository>;

impl MessageSvc {
    pub fn from_platform(platform: &Platform, media: MediaService) -> Self {
        Self::with_dependencies(
            Arc::new(MessageDocRepository::new(platform.db.clone())),
            Arc::new(ConversationDocRepository::new(platform.db.clone())),
            media,
            platform.clone(),
        )
    }
}

impl<M, C> MessageService<M, C>
where
    M: MessageRepository + Send + Sync,
    C: ConversationRepository + Send + Sync,
{
    pub fn with_dependencies(
        message_repo: Arc<M>,
        conversation_repo: Arc<C>,
        media: MediaService,
        platform: Platform,
    ) -> Self {
        MessageService {
            notifications: NotificationDocRepository::new(platform.db.clone()),
            message_repo,
            conversation_repo,
            media,
            platform,
        }
    }

    /// Uploads any attachment, then commits message, summary and
    /// notification atomically. Returns the new message id.
    pub async fn send(
        &self,
        conversation_id: &str,
        sender: &Sender,
        recipient_id: &str,
        message: SendMessage,
    ) -> Result<String, error::SystemError> {
        if message.is_empty() {
            return Err(error::SystemError::bad_request("Message is empty"));
        }

        let conversation = self
            .conversation_repo
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| error::SystemError::not_found("Conversation not found"))?;

        let uploaded = match &message.media {
            Some(file) => Some(self.media.upload(&format!("chat_media/{conversation_id}"), file).await?),
            None => None,
        };
        let media_type = match (&uploaded, &message.forwarded_post) {
            (Some(media), _) => Some(media.kind),
            (None, Some(_)) => Some(MediaKind::ForwardedPost),
            (None, None) => None,
        };

        let now = self.platform.clock.now();
        let crystal = conversation.crystal.as_ref();
        let streak = next_streak(crystal, now, &self.platform.env.local_offset());
        let text = message.text;

        let mut batch = WriteBatch::new();
        let id = self.message_repo.stage_create(
            &mut batch,
            conversation_id,
            &InsertMessage {
                sender_id: sender.uid.clone(),
                text: text.clone(),
                reply_to: message.reply_to,
                media_url: uploaded.map(|media| media.url),
                media_type,
                forwarded_post_data: message.forwarded_post,
            },
        )?;
        self.conversation_repo.stage_activity(
            &mut batch,
            conversation_id,
            &ConversationActivity {
                text,
                sender_id: sender.uid.clone(),
                media_type,
                crystal_created_at: crystal.and_then(|c| c.created_at),
                streak,
            },
        );
        self.notifications.stage_create(
            &mut batch,
            &NewNotification {
                recipient_id: recipient_id.to_string(),
                from_user_id: sender.uid.clone(),
                from_username: sender.username.clone(),
                from_user_avatar: sender.avatar.clone(),
                conversation_id: conversation_id.to_string(),
            },
        );

        self.platform.db.commit(batch).await?;
        tracing::info!(conversation = %conversation_id, message = %id, streak, "message sent");
        Ok(id)
    }

    /// Deletes one of my messages and rewrites the conversation preview from
    /// whatever message is now newest. Returns the new preview.
    pub async fn delete(
        &self,
        conversation_id: &str,
        message_id: &str,
        me: &str,
    ) -> Result<Option<LastMessage>, error::SystemError> {
        let message = self
            .message_repo
            .find_by_id(conversation_id, message_id)
            .await?
            .ok_or_else(|| error::SystemError::not_found("Message not found"))?;
        if message.sender_id != me {
            return Err(error::SystemError::forbidden("Only the sender can delete a message"));
        }

        self.message_repo.delete(conversation_id, message_id).await?;

        // Separate write: a failure here leaves the old preview in place.
        let preview = self.message_repo.latest(conversation_id).await?.map(|latest| LastMessage {
            text: latest.text,
            sender_id: latest.sender_id,
            timestamp: latest.timestamp,
            media_type: latest.media_type,
        });
        self.conversation_repo.set_last_message(conversation_id, preview.as_ref()).await?;
        Ok(preview)
    }

    /// Moves my watermark up to the newest message the peer sent, if it is
    /// ahead of the stored one. Returns the new watermark when it moved.
    pub async fn mark_seen(
        &self,
        conversation_id: &str,
        me: &str,
        messages: &[MessageEntity],
    ) -> Result<Option<DateTime<Utc>>, error::SystemError> {
        let Some(newest) = messages
            .iter()
            .filter(|message| message.sender_id != me)
            .filter_map(|message| message.timestamp)
            .max()
        else {
            return Ok(None);
        };

        let conversation = self
            .conversation_repo
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| error::SystemError::not_found("Conversation not found"))?;
        if conversation.watermark_of(me).is_some_and(|seen| seen >= newest) {
            return Ok(None);
        }

        self.conversation_repo.set_watermark(conversation_id, me, newest).await?;
        Ok(Some(newest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{
        conversation::{schema::CrystalLevel, service::ConversationSvc},
        file_upload::MediaFile,
        message::schema::ReplyTo,
    };
    use crate::test::{message_service, platform_pair, seed_of, sender_of};
    use chrono::Duration;

    async fn open_u1_u2(platform: &Platform) -> String {
        ConversationSvc::from_platform(platform).get_or_create(&seed_of(platform).await, "u2").await.unwrap()
    }

    async fn streak_of(platform: &Platform, id: &str) -> u32 {
        ConversationSvc::from_platform(platform).get_by_id(id).await.unwrap().crystal.unwrap().streak
    }

    async fn messages(platform: &Platform, id: &str) -> Vec<MessageEntity> {
        let mut sub = MessageDocRepository::new(platform.db.clone()).watch_ordered(id);
        let snapshot = sub.recv().await.unwrap().unwrap();
        snapshot.docs.iter().filter_map(|doc| MessageEntity::from_snapshot(doc).unwrap()).collect()
    }

    #[tokio::test]
    async fn first_message_keeps_streak_and_fills_summary() {
        let (_, a, _) = platform_pair().await;
        let id = open_u1_u2(&a).await;
        let service = message_service(&a);

        service.send(&id, &sender_of(&a).await, "u2", SendMessage::text("oi")).await.unwrap();

        let conversation = ConversationSvc::from_platform(&a).get_by_id(&id).await.unwrap();
        let last = conversation.last_message.unwrap();
        assert_eq!((last.text.as_str(), last.sender_id.as_str()), ("oi", "u1"));
        assert_eq!(last.media_type, None);
        let crystal = conversation.crystal.unwrap();
        assert_eq!(crystal.streak, 1);
        assert_eq!(crystal.level, Some(CrystalLevel::Brilhante));
        assert_eq!(conversation.timestamp, last.timestamp);

        let inbox = NotificationDocRepository::new(a.db.clone()).list_for("u2").await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].from_username, "ana");
        assert!(!inbox[0].read);
        assert_eq!(inbox[0].text(), "ana te enviou uma mensagem.");
    }

    #[tokio::test]
    async fn text_is_stored_as_typed() {
        let (_, a, _) = platform_pair().await;
        let id = open_u1_u2(&a).await;
        let service = message_service(&a);
        let me = sender_of(&a).await;

        service.send(&id, &me, "u2", SendMessage::text("  oi, tudo bem?\n")).await.unwrap();
        service.send(&id, &me, "u2", SendMessage::text("__serverTimestamp__")).await.unwrap();

        let texts: Vec<String> = messages(&a, &id).await.into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["  oi, tudo bem?\n", "__serverTimestamp__"]);
        let conversation = ConversationSvc::from_platform(&a).get_by_id(&id).await.unwrap();
        assert_eq!(conversation.last_message.unwrap().text, "__serverTimestamp__");
    }

    #[tokio::test]
    async fn streak_tracks_consecutive_days() {
        let (fixture, a, _) = platform_pair().await;
        let id = open_u1_u2(&a).await;
        let service = message_service(&a);
        let me = sender_of(&a).await;

        service.send(&id, &me, "u2", SendMessage::text("dia 1")).await.unwrap();
        fixture.clock.advance(Duration::hours(1));
        service.send(&id, &me, "u2", SendMessage::text("dia 1 de novo")).await.unwrap();
        assert_eq!(streak_of(&a, &id).await, 1);

        fixture.clock.advance(Duration::days(1));
        service.send(&id, &me, "u2", SendMessage::text("dia 2")).await.unwrap();
        assert_eq!(streak_of(&a, &id).await, 2);

        fixture.clock.advance(Duration::days(3));
        service.send(&id, &me, "u2", SendMessage::text("voltei")).await.unwrap();
        assert_eq!(streak_of(&a, &id).await, 1);
    }

    #[tokio::test]
    async fn failed_commit_writes_nothing() {
        let (fixture, a, _) = platform_pair().await;
        let id = open_u1_u2(&a).await;
        let service = message_service(&a);

        fixture.backend.db.set_unavailable(Some("offline"));
        let err = service.send(&id, &sender_of(&a).await, "u2", SendMessage::text("oi")).await;
        assert!(matches!(err, Err(error::SystemError::Unavailable(_))));
        fixture.backend.db.set_unavailable(None);

        assert!(messages(&a, &id).await.is_empty());
        assert!(NotificationDocRepository::new(a.db.clone()).list_for("u2").await.unwrap().is_empty());
        let conversation = ConversationSvc::from_platform(&a).get_by_id(&id).await.unwrap();
        assert_eq!(conversation.last_message, None);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_any_write() {
        let (fixture, a, _) = platform_pair().await;
        let id = open_u1_u2(&a).await;
        let commits = fixture.backend.db.commit_count();

        let err = message_service(&a).send(&id, &sender_of(&a).await, "u2", SendMessage::text("   ")).await;
        assert!(matches!(err, Err(error::SystemError::BadRequest(_))));
        assert_eq!(fixture.backend.db.commit_count(), commits);
    }

    #[tokio::test]
    async fn media_and_reply_are_stored_on_the_message() {
        let (fixture, a, _) = platform_pair().await;
        let id = open_u1_u2(&a).await;
        let service = message_service(&a);
        let me = sender_of(&a).await;

        let first = service.send(&id, &me, "u2", SendMessage::text("olha")).await.unwrap();
        let reply = SendMessage {
            text: String::new(),
            media: Some(MediaFile::new("foto.png", vec![1, 2, 3])),
            reply_to: Some(ReplyTo {
                message_id: first.clone(),
                sender_id: "u1".into(),
                sender_username: "ana".into(),
                text: "olha".into(),
            }),
            forwarded_post: None,
        };
        service.send(&id, &me, "u2", reply).await.unwrap();

        let stored = messages(&a, &id).await;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].media_type, Some(MediaKind::Image));
        assert!(stored[1].media_url.as_deref().unwrap().contains("chat_media%2Fu1_u2%2F"));
        assert_eq!(stored[1].reply_to.as_ref().unwrap().message_id, first);
        assert_eq!(fixture.backend.storage.keys().len(), 1);
        assert!(fixture.backend.storage.keys()[0].starts_with("chat_media/u1_u2/"));
    }

    #[tokio::test]
    async fn delete_recomputes_preview() {
        let (fixture, a, b) = platform_pair().await;
        let id = open_u1_u2(&a).await;
        let service = message_service(&a);
        let me = sender_of(&a).await;

        let only = service.send(&id, &me, "u2", SendMessage::text("primeira")).await.unwrap();
        let err = message_service(&b).delete(&id, &only, "u2").await.unwrap_err();
        assert!(matches!(err, error::SystemError::Forbidden(_)));

        assert_eq!(service.delete(&id, &only, "u1").await.unwrap(), None);
        let conversation = ConversationSvc::from_platform(&a).get_by_id(&id).await.unwrap();
        assert_eq!(conversation.last_message, None);

        let older = service.send(&id, &me, "u2", SendMessage::text("um")).await.unwrap();
        fixture.clock.advance(Duration::seconds(5));
        service.send(&id, &me, "u2", SendMessage::text("dois")).await.unwrap();
        let before = ConversationSvc::from_platform(&a).get_by_id(&id).await.unwrap().last_message;

        service.delete(&id, &older, "u1").await.unwrap();
        let after = ConversationSvc::from_platform(&a).get_by_id(&id).await.unwrap().last_message;
        assert_eq!(before, after);
        assert_eq!(after.unwrap().text, "dois");
    }

    #[tokio::test]
    async fn watermark_only_moves_forward_and_drives_seen() {
        let (fixture, a, b) = platform_pair().await;
        let id = open_u1_u2(&a).await;
        let from_a = message_service(&a);
        let from_b = message_service(&b);

        let mine = from_a.send(&id, &sender_of(&a).await, "u2", SendMessage::text("oi")).await.unwrap();
        let list = messages(&a, &id).await;
        assert_eq!(seen_message_id(&list, "u1", None), None);

        let seen = from_b.mark_seen(&id, "u2", &list).await.unwrap();
        assert!(seen.is_some());
        assert_eq!(from_b.mark_seen(&id, "u2", &list).await.unwrap(), None);

        let watermark = ConversationSvc::from_platform(&a).get_by_id(&id).await.unwrap().watermark_of("u2");
        assert_eq!(seen_message_id(&list, "u1", watermark), Some(mine.as_str()));

        fixture.clock.advance(Duration::seconds(1));
        from_a.send(&id, &sender_of(&a).await, "u2", SendMessage::text("tá aí?")).await.unwrap();
        let list = messages(&a, &id).await;
        assert_eq!(seen_message_id(&list, "u1", watermark), None);

        // My own messages never move my watermark.
        assert_eq!(from_a.mark_seen(&id, "u1", &list).await.unwrap(), None);
    }
}
