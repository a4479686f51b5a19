use std::{sync::Arc, time::Duration};

use vibemp_client::{
    api::error,
    configs::connect_platform,
    constants::Env,
    modules::{
        conversation::{list::ConversationListView, model::ParticipantSeed},
        inbox::modal::MessagesModal,
        session::service::{AppSession, SessionEvent},
        user::{model::SignUpModel, service::UserSvc},
    },
    platform::{clock::SystemClock, AuthUser, Platform},
};

async fn sign_up(platform: &Platform, username: &str) -> Result<AuthUser, error::Error> {
    UserSvc::from_platform(platform)
        .sign_up(SignUpModel {
            email: format!("{username}@vibemp.dev"),
            username: username.to_string(),
            password: "secret123".to_string(),
        })
        .await
}

fn seed(user: &AuthUser) -> ParticipantSeed {
    ParticipantSeed {
        uid: user.uid.clone(),
        username: user.display_name.clone().unwrap_or_default(),
        avatar: user.photo_url.clone().unwrap_or_default(),
    }
}

/// Drains whatever the view has ready without waiting for more.
macro_rules! settle {
    ($view:expr) => {
        while let Ok(Some(_)) = tokio::time::timeout(Duration::from_millis(50), $view.next_event()).await {}
    };
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let env = Env::from_env()?;
    tracing::info!("Environment variables loaded");
    let backend = connect_platform(env, Arc::new(SystemClock));

    let ana_platform = backend.session();
    let mut ana_session = AppSession::from_platform(&ana_platform);
    if ana_session.take_welcome_animation().await? {
        tracing::info!("{}", vibemp_client::i18n::t("welcome.title", &[]));
    }
    let ana = sign_up(&ana_platform, "ana").await?;
    if let Some(SessionEvent::SignedIn(user)) = ana_session.next_event().await {
        tracing::info!(uid = %user.uid, toast = ?ana_session.take_toast(), "session ready");
    }

    let bia_platform = backend.session();
    let bia = sign_up(&bia_platform, "bia").await?;

    let mut inbox = MessagesModal::new(&ana_platform, seed(&ana));
    inbox.open(Some(&bia.uid), None).await;
    settle!(inbox);

    let chat = inbox.chat_mut();
    if let Some(crystal) = chat.crystal_view() {
        tracing::info!("{}", crystal.title());
    }
    chat.composer_mut().set_text("oi");
    chat.send().await?;
    settle!(inbox);

    let mut bia_list = ConversationListView::open(&bia_platform, &bia.uid);
    settle!(bia_list);
    for row in bia_list.rows() {
        tracing::info!(
            conversation = %row.id,
            with = %row.username,
            online = row.online,
            "{} ({})",
            row.preview,
            row.time_ago.unwrap_or_default()
        );
    }

    inbox.close();
    bia_list.close();
    Ok(())
}
