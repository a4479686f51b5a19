/// Conversation Service
///
/// Deterministic direct-conversation ids and get-or-create. The id is derived
/// from the participant pair, so two concurrent creators write the same
/// document and the last write wins.
use std::sync::Arc;

use crate::{
    api::error,
    constants::DEFAULT_AVATAR_BASE,
    modules::{
        conversation::{
            model::{NewConversation, ParticipantSeed},
            repository::ConversationRepository,
            repository_doc::ConversationDocRepository,
            schema::ConversationEntity,
        },
        user::{repository::UserRepository, repository_doc::UserDocRepository},
    },
    platform::Platform,
};

/// `a_b` with the two uids sorted, so `conversation_id(a, b) == conversation_id(b, a)`.
pub fn conversation_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}

#[derive(Clone)]
pub struct ConversationService<C, U>
where
    C: ConversationRepository + Send + Sync,
    U: UserRepository + Send + Sync,
{
    conversation_repo: Arc<C>,
    user_repo: Arc<U>,
}

pub type ConversationSvc = ConversationService<ConversationDocRepository, UserDocRepository>;

impl ConversationSvc {
    pub fn from_platform(platform: &Platform) -> Self {
        Self::with_dependencies(
            Arc::new(ConversationDocRepository::new(platform.db.clone())),
            Arc::new(UserDocRepository::new(platform.db.clone())),
        )
    }
}

impl<C, U> ConversationService<C, U>
where
    C: ConversationRepository + Send + Sync,
    U: UserRepository + Send + Sync,
{
    pub fn with_dependencies(conversation_repo: Arc<C>, user_repo: Arc<U>) -> Self {
        ConversationService { conversation_repo, user_repo }
    }

    pub async fn get_by_id(&self, id: &str) -> Result<ConversationEntity, error::SystemError> {
        self.conversation_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| error::SystemError::not_found("Conversation not found"))
    }

    /// Returns the id of the conversation between `me` and `peer_id`,
    /// creating it with a fresh crystal when it does not exist yet.
    pub async fn get_or_create(
        &self,
        me: &ParticipantSeed,
        peer_id: &str,
    ) -> Result<String, error::SystemError> {
        if me.uid == peer_id {
            return Err(error::SystemError::bad_request("Cannot start a conversation with yourself"));
        }

        let id = conversation_id(&me.uid, peer_id);
        if self.conversation_repo.find_by_id(&id).await?.is_some() {
            self.conversation_repo.touch(&id).await?;
            return Ok(id);
        }

        let peer = self
            .user_repo
            .find_by_id(peer_id)
            .await?
            .ok_or_else(|| error::SystemError::not_found("User not found"))?;

        let peer_seed = ParticipantSeed {
            avatar: if peer.avatar.is_empty() {
                format!("{DEFAULT_AVATAR_BASE}{peer_id}")
            } else {
                peer.avatar
            },
            uid: peer.id,
            username: peer.username,
        };
        self.conversation_repo
            .create(&NewConversation { id: id.clone(), participants: [me.clone(), peer_seed] })
            .await?;

        tracing::info!(conversation = %id, "conversation created");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::conversation::schema::CrystalLevel;
    use crate::platform::document::{DocumentStore, Query};
    use crate::test::{platform_pair, seed_of};

    #[test]
    fn id_is_commutative() {
        assert_eq!(conversation_id("u1", "u2"), "u1_u2");
        assert_eq!(conversation_id("u2", "u1"), "u1_u2");
        assert_eq!(conversation_id("zeta", "alfa"), conversation_id("alfa", "zeta"));
    }

    #[tokio::test]
    async fn first_open_creates_fresh_crystal() {
        let (_, a, _) = platform_pair().await;
        let service = ConversationSvc::from_platform(&a);

        let id = service.get_or_create(&seed_of(&a).await, "u2").await.unwrap();
        assert_eq!(id, "u1_u2");

        let conversation = service.get_by_id(&id).await.unwrap();
        let crystal = conversation.crystal.clone().unwrap();
        assert_eq!(crystal.level, Some(CrystalLevel::Brilhante));
        assert_eq!(crystal.streak, 1);
        assert!(crystal.created_at.is_some());
        assert_eq!(conversation.participants, vec!["u1", "u2"]);
        assert_eq!(conversation.participant_info["u2"].username, "bia");
        assert_eq!(conversation.watermark_of("u1"), None);
    }

    #[tokio::test]
    async fn second_call_only_bumps_activity() {
        let (fixture, a, b) = platform_pair().await;
        let from_a = ConversationSvc::from_platform(&a);
        let from_b = ConversationSvc::from_platform(&b);

        let first = from_a.get_or_create(&seed_of(&a).await, "u2").await.unwrap();
        let created = from_a.get_by_id(&first).await.unwrap();

        fixture.clock.advance(chrono::Duration::minutes(1));
        let second = from_b.get_or_create(&seed_of(&b).await, "u1").await.unwrap();
        assert_eq!(first, second);

        let touched = from_b.get_by_id(&second).await.unwrap();
        assert!(touched.timestamp > created.timestamp);
        assert_eq!(touched.crystal, created.crystal);

        let all = fixture.backend.db.query(&Query::new("conversations")).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn unknown_peer_is_not_found() {
        let (_, a, _) = platform_pair().await;
        let service = ConversationSvc::from_platform(&a);
        let err = service.get_or_create(&seed_of(&a).await, "ghost").await.unwrap_err();
        assert!(matches!(err, error::SystemError::NotFound(_)));
    }
}
