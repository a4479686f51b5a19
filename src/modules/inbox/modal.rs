//! Messages modal: routes between the conversation list, the new-message
//! search and an open chat.

use crate::{
    api::error,
    modules::{
        chat::window::{ChatEvent, ChatWindow},
        conversation::{
            list::{ConversationListView, ListEvent},
            model::ParticipantSeed,
            service::ConversationSvc,
        },
        message::model::Sender,
        user::{model::UserResponse, service::UserSvc},
    },
    platform::Platform,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxView {
    List,
    New,
    Chat(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboxEvent {
    List(ListEvent),
    Chat(ChatEvent),
}

pub struct MessagesModal {
    platform: Platform,
    me: ParticipantSeed,
    conversations: ConversationSvc,
    users: UserSvc,
    is_open: bool,
    view: InboxView,
    list: Option<ConversationListView>,
    chat: ChatWindow,
    results: Vec<UserResponse>,
}

impl MessagesModal {
    pub fn new(platform: &Platform, me: ParticipantSeed) -> Self {
        let sender = Sender { uid: me.uid.clone(), username: me.username.clone(), avatar: me.avatar.clone() };
        MessagesModal {
            conversations: ConversationSvc::from_platform(platform),
            users: UserSvc::from_platform(platform),
            chat: ChatWindow::new(platform, sender),
            platform: platform.clone(),
            me,
            is_open: false,
            view: InboxView::List,
            list: None,
            results: Vec::new(),
        }
    }

    /// Opens the modal. A conversation id wins over a target user; with
    /// neither the list is shown.
    pub async fn open(&mut self, initial_target: Option<&str>, initial_conversation_id: Option<&str>) {
        self.is_open = true;
        if let Some(id) = initial_conversation_id {
            self.show_chat(id);
            return;
        }

        self.show_list();
        if let Some(target) = initial_target {
            self.start_conversation_with_user(target).await;
        }
    }

    pub fn close(&mut self) {
        self.is_open = false;
        self.view = InboxView::List;
        self.list = None;
        self.chat.close();
        self.results.clear();
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn view(&self) -> &InboxView {
        &self.view
    }

    pub fn list(&self) -> Option<&ConversationListView> {
        self.list.as_ref()
    }

    pub fn chat(&self) -> &ChatWindow {
        &self.chat
    }

    pub fn chat_mut(&mut self) -> &mut ChatWindow {
        &mut self.chat
    }

    pub fn show_list(&mut self) {
        self.chat.close();
        self.results.clear();
        if self.list.is_none() {
            self.list = Some(ConversationListView::open(&self.platform, &self.me.uid));
        }
        self.view = InboxView::List;
    }

    pub fn show_new(&mut self) {
        self.chat.close();
        self.list = None;
        self.view = InboxView::New;
    }

    pub fn show_chat(&mut self, conversation_id: &str) {
        self.list = None;
        self.results.clear();
        self.chat.open(conversation_id);
        self.view = InboxView::Chat(conversation_id.to_string());
    }

    /// Leaves the chat or the search for the list.
    pub fn back(&mut self) {
        self.show_list();
    }

    pub fn search_results(&self) -> &[UserResponse] {
        &self.results
    }

    pub async fn search(&mut self, prefix: &str) -> Result<&[UserResponse], error::Error> {
        self.results = self
            .users
            .search_users(prefix, &self.me.uid)
            .await
            .map_err(|err| err.into_read("common.error"))?;
        Ok(&self.results)
    }

    /// Makes sure the conversation with `peer_id` exists and opens it. On
    /// failure the current view is kept.
    pub async fn start_conversation_with_user(&mut self, peer_id: &str) -> bool {
        match self.conversations.get_or_create(&self.me, peer_id).await {
            Ok(id) => {
                self.show_chat(&id);
                true
            }
            Err(err) => {
                tracing::error!(peer = %peer_id, error = ?err, "could not start conversation");
                false
            }
        }
    }

    /// Waits on whichever view is showing.
    pub async fn next_event(&mut self) -> Option<InboxEvent> {
        if !self.is_open {
            return None;
        }
        match self.view {
            InboxView::Chat(_) => self.chat.next_event().await.map(InboxEvent::Chat),
            InboxView::List => match self.list.as_mut() {
                Some(list) => list.next_event().await.map(InboxEvent::List),
                None => None,
            },
            InboxView::New => None,
        }
    }
}
