//! One open conversation: messages, peer header, crystal and composer.

use std::{
    future::{poll_fn, Future},
    task::Poll,
};

use crate::{
    api::error,
    constants::DEFAULT_AVATAR_BASE,
    i18n::t,
    modules::{
        chat::composer::Composer,
        conversation::{
            crystal::{CrystalAnimation, CrystalView},
            repository::ConversationRepository,
            repository_doc::ConversationDocRepository,
            schema::ConversationEntity,
        },
        file_upload::{MediaFile, MediaService},
        message::{
            model::Sender,
            repository::MessageRepository,
            repository_doc::MessageDocRepository,
            schema::{MediaKind, MessageEntity, ReplyTo},
            service::{seen_message_id, MessageSvc},
        },
        user::{repository::UserRepository, repository_doc::UserDocRepository, schema::UserEntity},
    },
    platform::{
        document::{poll_slot, DocumentSnapshot, QuerySnapshot, SnapshotResult, Subscription},
        Platform,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Idle,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatEvent {
    Conversation,
    Messages,
    Peer,
    Crystal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeerHeader {
    pub id: String,
    pub username: String,
    pub avatar: String,
    pub online: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaViewer {
    pub url: String,
    pub kind: MediaKind,
}

enum Source {
    Conversation(SnapshotResult<DocumentSnapshot>),
    Messages(SnapshotResult<QuerySnapshot>),
    Peer(SnapshotResult<DocumentSnapshot>),
    Crystal,
}

pub struct ChatWindow {
    platform: Platform,
    me: Sender,
    messages_svc: MessageSvc,
    media: MediaService,
    conversation_repo: ConversationDocRepository,
    message_repo: MessageDocRepository,
    user_repo: UserDocRepository,

    state: WindowState,
    conversation_id: Option<String>,
    conversation: Option<ConversationEntity>,
    messages: Vec<MessageEntity>,
    peer_id: Option<String>,
    peer: Option<UserEntity>,

    conversation_sub: Option<Subscription<DocumentSnapshot>>,
    messages_sub: Option<Subscription<QuerySnapshot>>,
    peer_sub: Option<Subscription<DocumentSnapshot>>,

    crystal: CrystalAnimation,
    composer: Composer,
    viewer: Option<MediaViewer>,
    error: Option<error::Error>,
}

impl ChatWindow {
    pub fn new(platform: &Platform, me: Sender) -> Self {
        let media = MediaService::with_defaults(platform);
        ChatWindow {
            messages_svc: MessageSvc::from_platform(platform, media.clone()),
            conversation_repo: ConversationDocRepository::new(platform.db.clone()),
            message_repo: MessageDocRepository::new(platform.db.clone()),
            user_repo: UserDocRepository::new(platform.db.clone()),
            platform: platform.clone(),
            media,
            me,
            state: WindowState::Idle,
            conversation_id: None,
            conversation: None,
            messages: Vec::new(),
            peer_id: None,
            peer: None,
            conversation_sub: None,
            messages_sub: None,
            peer_sub: None,
            crystal: CrystalAnimation::default(),
            composer: Composer::default(),
            viewer: None,
            error: None,
        }
    }

    /// Subscribes to a conversation and its messages. Any previously open
    /// conversation is released first.
    pub fn open(&mut self, conversation_id: &str) {
        if self.conversation_id.as_deref() == Some(conversation_id) {
            return;
        }
        self.close();

        tracing::debug!(conversation = %conversation_id, "opening chat");
        self.conversation_sub = Some(self.conversation_repo.watch(conversation_id));
        self.messages_sub = Some(self.message_repo.watch_ordered(conversation_id));
        self.conversation_id = Some(conversation_id.to_string());
        self.state = WindowState::Loading;
    }

    pub fn close(&mut self) {
        self.conversation_sub = None;
        self.messages_sub = None;
        self.peer_sub = None;
        self.conversation_id = None;
        self.conversation = None;
        self.messages.clear();
        self.peer_id = None;
        self.peer = None;
        self.crystal.reset();
        self.composer = Composer::default();
        self.viewer = None;
        self.error = None;
        self.state = WindowState::Idle;
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[MessageEntity] {
        &self.messages
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn composer_mut(&mut self) -> &mut Composer {
        &mut self.composer
    }

    pub fn crystal(&self) -> &CrystalAnimation {
        &self.crystal
    }

    pub fn error(&self) -> Option<String> {
        self.error.as_ref().or(self.composer.error()).map(error::Error::localized)
    }

    pub fn peer(&self) -> Option<PeerHeader> {
        let peer_id = self.peer_id.as_ref()?;
        let info = self.conversation.as_ref().and_then(|c| c.participant_info.get(peer_id));
        let username = info
            .map(|info| info.username.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| t("common.user", &[]));
        let avatar = info
            .map(|info| info.avatar.clone())
            .filter(|avatar| !avatar.is_empty())
            .unwrap_or_else(|| format!("{DEFAULT_AVATAR_BASE}{peer_id}"));
        let online = self.peer.as_ref().is_some_and(|peer| peer.is_online(self.platform.clock.now()));

        Some(PeerHeader { id: peer_id.clone(), username, avatar, online })
    }

    pub fn crystal_view(&self) -> Option<CrystalView> {
        let record = self.conversation.as_ref()?.crystal.as_ref()?;
        CrystalView::derive(record, self.platform.clock.now())
    }

    /// My newest message, if the peer has read up to it.
    pub fn seen_message_id(&self) -> Option<&str> {
        let peer_id = self.peer_id.as_deref()?;
        let watermark = self.conversation.as_ref()?.watermark_of(peer_id);
        seen_message_id(&self.messages, &self.me.uid, watermark)
    }

    /// Waits for the next snapshot or crystal deadline and folds it into the
    /// window. `None` when nothing is open.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        let deadline = self
            .crystal
            .remaining(self.platform.clock.now())
            .map(|left| left.to_std().unwrap_or_default());
        if self.conversation_sub.is_none()
            && self.messages_sub.is_none()
            && self.peer_sub.is_none()
            && deadline.is_none()
        {
            return None;
        }

        let source = {
            let conversation = &mut self.conversation_sub;
            let messages = &mut self.messages_sub;
            let peer = &mut self.peer_sub;
            let timer = deadline.map(tokio::time::sleep);
            tokio::pin!(timer);
            poll_fn(|cx| {
                if let Poll::Ready(result) = poll_slot(conversation, cx) {
                    return Poll::Ready(Source::Conversation(result));
                }
                if let Poll::Ready(result) = poll_slot(messages, cx) {
                    return Poll::Ready(Source::Messages(result));
                }
                if let Poll::Ready(result) = poll_slot(peer, cx) {
                    return Poll::Ready(Source::Peer(result));
                }
                match timer.as_mut().as_pin_mut() {
                    Some(sleep) => sleep.poll(cx).map(|_| Source::Crystal),
                    None => Poll::Pending,
                }
            })
            .await
        };

        Some(match source {
            Source::Conversation(result) => {
                self.apply_conversation(result);
                ChatEvent::Conversation
            }
            Source::Messages(result) => {
                self.apply_messages(result).await;
                ChatEvent::Messages
            }
            Source::Peer(result) => {
                self.peer = match result.and_then(|snapshot| UserEntity::from_snapshot(&snapshot)) {
                    Ok(peer) => peer,
                    Err(err) => {
                        tracing::warn!(error = ?err, "peer status listener failed");
                        None
                    }
                };
                ChatEvent::Peer
            }
            Source::Crystal => {
                self.crystal.tick(self.platform.clock.now());
                ChatEvent::Crystal
            }
        })
    }

    fn apply_conversation(&mut self, result: SnapshotResult<DocumentSnapshot>) {
        let conversation = match result.and_then(|snapshot| ConversationEntity::from_snapshot(&snapshot)) {
            Ok(Some(conversation)) => conversation,
            Ok(None) => return,
            Err(err) => {
                tracing::error!(error = ?err, "conversation listener failed");
                return;
            }
        };

        if self.peer_id.is_none() {
            if let Some(peer_id) = conversation.peer_of(&self.me.uid) {
                self.peer_sub = Some(self.user_repo.watch(peer_id));
                self.peer_id = Some(peer_id.to_string());
            }
        }
        if self.crystal.observe(conversation.crystal.as_ref(), self.platform.clock.now()) {
            tracing::debug!(conversation = %conversation.id, "crystal forming");
        }
        self.conversation = Some(conversation);
    }

    async fn apply_messages(&mut self, result: SnapshotResult<QuerySnapshot>) {
        match result {
            Ok(snapshot) => {
                self.messages = snapshot
                    .docs
                    .iter()
                    .filter_map(|doc| match MessageEntity::from_snapshot(doc) {
                        Ok(message) => message,
                        Err(err) => {
                            tracing::warn!(message = %doc.id(), error = ?err, "skipping unreadable message");
                            None
                        }
                    })
                    .collect();
                self.mark_seen().await;
            }
            Err(err) => tracing::error!(error = ?err, "messages listener failed"),
        }
        self.state = WindowState::Ready;
    }

    async fn mark_seen(&self) {
        let Some(conversation_id) = self.conversation_id.as_deref() else {
            return;
        };
        if let Err(err) = self.messages_svc.mark_seen(conversation_id, &self.me.uid, &self.messages).await {
            tracing::warn!(conversation = %conversation_id, error = ?err, "read receipt failed");
        }
    }

    /// Validates a picked file and stages it for the next send. A rejected
    /// file clears the selection.
    pub fn select_media(&mut self, file: MediaFile) -> bool {
        match self.media.validate_attachment(&file) {
            Ok(kind) => {
                self.composer.set_media(file, kind);
                true
            }
            Err(err) => {
                tracing::debug!(file = %file.name, key = %err.key(), "attachment rejected");
                self.composer.clear_media();
                self.composer.set_error(err);
                false
            }
        }
    }

    pub fn clear_media(&mut self) {
        self.composer.clear_media();
    }

    /// Starts replying to a message, naming its author as the reader sees them.
    pub fn set_reply_target(&mut self, message_id: &str) -> bool {
        let Some(message) = self.messages.iter().find(|m| m.id == message_id) else {
            return false;
        };

        let sender_username = if message.sender_id == self.me.uid {
            Some(self.me.username.clone()).filter(|name| !name.is_empty()).unwrap_or_else(|| t("common.you", &[]))
        } else {
            self.peer()
                .map(|peer| peer.username)
                .unwrap_or_else(|| t("common.user", &[]))
        };

        self.composer.set_reply_to(ReplyTo {
            message_id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            sender_username,
            text: message.text.clone(),
        });
        true
    }

    pub fn cancel_reply(&mut self) {
        self.composer.clear_reply_to();
    }

    /// Sends the composer's draft. `Ok(false)` when there is nothing to send
    /// or no peer to send it to; a failed send puts the draft back.
    pub async fn send(&mut self) -> Result<bool, error::Error> {
        let (Some(conversation_id), Some(peer_id)) = (self.conversation_id.clone(), self.peer_id.clone()) else {
            return Ok(false);
        };
        if !self.composer.can_send() {
            return Ok(false);
        }

        self.error = None;
        let draft = self.composer.take();
        self.composer.set_uploading(true);
        let result = self.messages_svc.send(&conversation_id, &self.me, &peer_id, draft.to_message()).await;
        self.composer.set_uploading(false);

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = err.into_write("messages.media.uploadError");
                self.composer.restore(draft);
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    pub async fn delete_message(&mut self, message_id: &str) -> Result<(), error::Error> {
        let Some(conversation_id) = self.conversation_id.clone() else {
            return Ok(());
        };

        match self.messages_svc.delete(&conversation_id, message_id, &self.me.uid).await {
            Ok(_) => {
                self.error = None;
                Ok(())
            }
            Err(err) => {
                let err = err.into_write("messages.deleteError");
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Opens the full-screen viewer for a rendered photo or video.
    pub fn open_media(&mut self, message_id: &str) -> bool {
        let media = self.messages.iter().find(|m| m.id == message_id).and_then(|message| {
            match (&message.media_url, message.media_type) {
                (Some(url), Some(kind @ (MediaKind::Image | MediaKind::Video))) => {
                    Some(MediaViewer { url: url.clone(), kind })
                }
                _ => None,
            }
        });
        self.viewer = media;
        self.viewer.is_some()
    }

    pub fn media_viewer(&self) -> Option<&MediaViewer> {
        self.viewer.as_ref()
    }

    pub fn close_media(&mut self) {
        self.viewer = None;
    }

    /// The header finished absorbing the crystal.
    pub fn crystal_settled(&mut self) {
        self.crystal.settle_finished();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        modules::{
            conversation::{crystal::CrystalPhase, schema::CrystalLevel, service::ConversationSvc},
            file_upload::probe::tests::mp4,
            user::service::UserSvc,
        },
        test::{platform_pair, seed_of, sender_of},
    };
    use chrono::Duration;

    async fn drain(window: &mut ChatWindow) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(std::time::Duration::from_millis(50), window.next_event()).await
        {
            events.push(event);
        }
        events
    }

    async fn open_pair() -> (crate::test::Fixture, ChatWindow, ChatWindow) {
        let (fixture, a, b) = platform_pair().await;
        ConversationSvc::from_platform(&a).get_or_create(&seed_of(&a).await, "u2").await.unwrap();
        let mut left = ChatWindow::new(&a, sender_of(&a).await);
        let mut right = ChatWindow::new(&b, sender_of(&b).await);
        left.open("u1_u2");
        right.open("u1_u2");
        (fixture, left, right)
    }

    #[tokio::test]
    async fn open_loads_header_and_crystal() {
        let (_fixture, mut window, _) = open_pair().await;
        assert_eq!(window.state(), WindowState::Loading);

        let events = drain(&mut window).await;
        assert!(events.contains(&ChatEvent::Messages));
        assert_eq!(window.state(), WindowState::Ready);

        let peer = window.peer().unwrap();
        assert_eq!(peer.username, "bia");
        assert!(!peer.online);
        let crystal = window.crystal_view().unwrap();
        assert_eq!(crystal.level, CrystalLevel::Brilhante);
        assert_eq!(crystal.title(), "Cristal de Conexão: Brilhante");
        assert_eq!(crystal.streak_label(), None);
    }

    #[tokio::test]
    async fn fresh_crystal_forms_then_settles() {
        let (fixture, mut window, _) = open_pair().await;
        drain(&mut window).await;
        assert!(matches!(window.crystal().phase(), CrystalPhase::Forming { .. }));
        assert_eq!(window.crystal().message().as_deref(), Some("💎 Um novo Cristal de Conexão foi formado!"));

        fixture.clock.advance(Duration::seconds(4));
        assert_eq!(window.next_event().await, Some(ChatEvent::Crystal));
        assert_eq!(window.crystal().phase(), &CrystalPhase::Settling);
        window.crystal_settled();
        assert_eq!(window.crystal().phase(), &CrystalPhase::Idle);
    }

    #[tokio::test]
    async fn peer_heartbeat_shows_online() {
        let (fixture, mut window, right) = open_pair().await;
        drain(&mut window).await;

        UserSvc::from_platform(&right.platform).touch_last_seen("u2").await.unwrap();
        assert!(drain(&mut window).await.contains(&ChatEvent::Peer));
        assert!(window.peer().unwrap().online);

        let seen = UserDocRepository::new(fixture.backend.db.clone())
            .find_by_id("u2")
            .await
            .unwrap()
            .and_then(|user| user.last_seen)
            .unwrap();
        fixture.clock.set(seen + Duration::seconds(600) - Duration::microseconds(1));
        assert!(window.peer().unwrap().online);
        fixture.clock.set(seen + Duration::seconds(600));
        assert!(!window.peer().unwrap().online);
    }

    #[tokio::test]
    async fn sent_message_is_seen_once_peer_reads_it() {
        let (_fixture, mut left, mut right) = open_pair().await;
        drain(&mut left).await;
        drain(&mut right).await;

        left.composer_mut().set_text("oi");
        assert_eq!(left.send().await, Ok(true));
        assert_eq!(left.composer().text(), "");

        drain(&mut right).await;
        assert_eq!(right.messages().len(), 1);
        assert_eq!(right.messages()[0].text, "oi");

        drain(&mut left).await;
        let sent = left.messages()[0].id.clone();
        assert_eq!(left.seen_message_id(), Some(sent.as_str()));

        left.composer_mut().set_text("tudo bem?");
        left.send().await.unwrap();
        drain(&mut left).await;
        assert_eq!(left.seen_message_id(), None);
    }

    #[tokio::test]
    async fn empty_draft_is_not_sent() {
        let (fixture, mut window, _) = open_pair().await;
        drain(&mut window).await;
        let commits = fixture.backend.db.commit_count();

        window.composer_mut().set_text("  ");
        assert_eq!(window.send().await, Ok(false));
        assert_eq!(fixture.backend.db.commit_count(), commits);
    }

    #[tokio::test]
    async fn failed_send_restores_draft() {
        let (fixture, mut window, _) = open_pair().await;
        drain(&mut window).await;
        window.composer_mut().set_text("oi");

        fixture.backend.db.set_unavailable(Some("offline"));
        let err = window.send().await.unwrap_err();
        assert_eq!(err, error::Error::write("messages.media.uploadError"));
        assert_eq!(window.composer().text(), "oi");
        assert_eq!(window.error().as_deref(), Some("Falha ao enviar mídia."));
    }

    #[tokio::test]
    async fn long_video_is_rejected_and_cleared() {
        let (_fixture, mut window, _) = open_pair().await;
        drain(&mut window).await;

        assert!(window.select_media(MediaFile::new("ok.mp4", mp4(1000, 30_000))));
        assert_eq!(window.composer().media().map(|(_, kind)| kind), Some(MediaKind::Video));

        assert!(!window.select_media(MediaFile::new("long.mp4", mp4(1000, 30_001))));
        assert!(window.composer().media().is_none());
        assert_eq!(window.error().as_deref(), Some("O vídeo não pode ter mais de 30 segundos."));
    }

    #[tokio::test]
    async fn reply_target_names_each_author() {
        let (_fixture, mut left, mut right) = open_pair().await;
        drain(&mut left).await;
        drain(&mut right).await;
        left.composer_mut().set_text("oi");
        left.send().await.unwrap();
        drain(&mut left).await;
        drain(&mut right).await;

        let id = left.messages()[0].id.clone();
        assert!(left.set_reply_target(&id));
        assert_eq!(left.composer().reply_to().unwrap().sender_username, "ana");
        assert!(right.set_reply_target(&id));
        assert_eq!(right.composer().reply_to().unwrap().sender_username, "ana");
        assert_eq!(right.composer().reply_label("u2").as_deref(), Some("Respondendo a ana"));
        right.cancel_reply();
        assert!(right.composer().reply_to().is_none());
    }

    #[tokio::test]
    async fn only_sender_deletes() {
        let (_fixture, mut left, mut right) = open_pair().await;
        drain(&mut left).await;
        left.composer_mut().set_text("oi");
        left.send().await.unwrap();
        drain(&mut right).await;

        let id = right.messages()[0].id.clone();
        assert_eq!(right.delete_message(&id).await, Err(error::Error::write("messages.deleteError")));
        assert!(left.delete_message(&id).await.is_ok());
        drain(&mut left).await;
        assert!(left.messages().is_empty());
    }

    #[tokio::test]
    async fn photo_opens_in_viewer() {
        let (_fixture, mut window, _) = open_pair().await;
        drain(&mut window).await;
        assert!(window.select_media(MediaFile::new("foto.png", vec![0x89, b'P', b'N', b'G'])));
        window.send().await.unwrap();
        drain(&mut window).await;

        let id = window.messages()[0].id.clone();
        assert!(window.open_media(&id));
        assert_eq!(window.media_viewer().unwrap().kind, MediaKind::Image);
        window.close_media();
        assert!(window.media_viewer().is_none());
    }

    #[tokio::test]
    async fn close_releases_every_listener() {
        let (fixture, mut window, right) = open_pair().await;
        drop(right);
        drain(&mut window).await;
        assert_eq!(fixture.backend.db.listener_count(), 3);
        window.close();
        assert_eq!(window.state(), WindowState::Idle);
        assert!(window.peer().is_none());
        assert_eq!(fixture.backend.db.listener_count(), 0);
        assert_eq!(window.next_event().await, None);
    }
}
