//! Full-screen pulse viewer: steps through one author's active pulses,
//! records views and shows the live view count to the author.

use std::future::poll_fn;

use crate::{
    api::error,
    i18n::t,
    modules::pulse::{schema::PulseEntity, service::PulseSvc},
    platform::document::{poll_slot, QuerySnapshot, Subscription},
};

pub struct PulseViewer {
    service: PulseSvc,
    me: String,
    pulses: Vec<PulseEntity>,
    index: usize,
    views: Option<Subscription<QuerySnapshot>>,
    view_count: usize,
    closed: bool,
    error: Option<error::Error>,
}

impl PulseViewer {
    /// Opens on `initial_index` and records a view of that pulse.
    pub async fn open(service: PulseSvc, me: &str, pulses: Vec<PulseEntity>, initial_index: usize) -> Self {
        let mut viewer = PulseViewer {
            service,
            me: me.to_string(),
            pulses: Vec::new(),
            index: initial_index,
            views: None,
            view_count: 0,
            closed: false,
            error: None,
        };
        viewer.set_pulses(pulses);
        viewer.show_current().await;
        viewer
    }

    pub fn current(&self) -> Option<&PulseEntity> {
        self.pulses.get(self.index)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn can_go_next(&self) -> bool {
        self.index + 1 < self.pulses.len()
    }

    pub fn can_go_prev(&self) -> bool {
        self.index > 0
    }

    pub fn is_owner(&self) -> bool {
        self.current().is_some_and(|pulse| pulse.author_id == self.me)
    }

    pub fn is_video(&self) -> bool {
        self.current().is_some_and(PulseEntity::is_video)
    }

    pub fn view_count(&self) -> usize {
        self.view_count
    }

    /// `"3 visualizações"`; `None` until someone has viewed the pulse.
    pub fn view_label(&self) -> Option<String> {
        let noun = match self.view_count {
            0 => return None,
            1 => t("pulseViewer.viewSingular", &[]),
            _ => t("pulseViewer.viewPlural", &[]),
        };
        Some(format!("{} {noun}", self.view_count))
    }

    pub fn error(&self) -> Option<String> {
        self.error.as_ref().map(error::Error::localized)
    }

    pub async fn next(&mut self) -> bool {
        if !self.can_go_next() {
            return false;
        }
        self.index += 1;
        self.show_current().await;
        true
    }

    pub async fn prev(&mut self) -> bool {
        if !self.can_go_prev() {
            return false;
        }
        self.index -= 1;
        self.show_current().await;
        true
    }

    /// Replaces the list, keeping the index in range. An empty list closes
    /// the viewer.
    pub fn set_pulses(&mut self, pulses: Vec<PulseEntity>) {
        self.pulses = pulses;
        if self.pulses.is_empty() {
            self.close();
        } else {
            self.index = self.index.min(self.pulses.len() - 1);
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.views = None;
        self.view_count = 0;
    }

    /// Deletes the pulse on screen and moves to whichever pulse takes its place.
    pub async fn delete_current(&mut self) -> Result<(), error::Error> {
        let Some(pulse) = self.current().cloned() else {
            return Ok(());
        };

        if let Err(err) = self.service.delete(&pulse, &self.me).await {
            self.error = Some(err.clone());
            return Err(err);
        }
        self.error = None;

        let mut remaining = std::mem::take(&mut self.pulses);
        remaining.retain(|p| p.id != pulse.id);
        self.set_pulses(remaining);
        if !self.closed {
            self.show_current().await;
        }
        Ok(())
    }

    /// Waits for the view count to change. `None` once closed.
    pub async fn next_event(&mut self) -> Option<usize> {
        if self.views.is_none() {
            return None;
        }
        let result = {
            let views = &mut self.views;
            poll_fn(|cx| poll_slot(views, cx)).await
        };
        match result {
            Ok(snapshot) => self.view_count = snapshot.len(),
            Err(err) => tracing::warn!(error = ?err, "pulse views listener failed"),
        }
        Some(self.view_count)
    }

    async fn show_current(&mut self) {
        let Some(pulse) = self.current().cloned() else {
            return;
        };
        self.view_count = 0;
        self.views = Some(self.service.watch_views(&pulse.id));
        self.service.record_view(&pulse, &self.me).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{modules::file_upload::MediaFile, test::platform_pair};
    use chrono::Duration;

    async fn publish(svc: &PulseSvc, fixture: &crate::test::Fixture, names: &[&str]) -> Vec<PulseEntity> {
        for name in names {
            svc.create("u1", &MediaFile::new(name, vec![1, 2, 3]), "").await.unwrap();
            fixture.clock.advance(Duration::minutes(1));
        }
        svc.list_active("u1").await.unwrap()
    }

    async fn settle(viewer: &mut PulseViewer) {
        while let Ok(Some(_)) =
            tokio::time::timeout(std::time::Duration::from_millis(50), viewer.next_event()).await
        {}
    }

    #[tokio::test]
    async fn navigation_respects_bounds() {
        let (fixture, a, b) = platform_pair().await;
        let pulses = publish(&PulseSvc::from_platform(&a), &fixture, &["a.jpg", "b.mp4", "c.png"]).await;

        let mut viewer = PulseViewer::open(PulseSvc::from_platform(&b), "u2", pulses, 0).await;
        assert!(!viewer.can_go_prev());
        assert!(viewer.can_go_next());
        assert!(!viewer.is_video());

        assert!(viewer.next().await);
        assert!(viewer.is_video());
        assert!(viewer.next().await);
        assert!(!viewer.next().await);
        assert_eq!(viewer.index(), 2);
        assert!(viewer.prev().await);
        assert_eq!(viewer.index(), 1);
        assert!(!viewer.is_owner());
    }

    #[tokio::test]
    async fn author_sees_live_view_count() {
        let (fixture, a, b) = platform_pair().await;
        let pulses = publish(&PulseSvc::from_platform(&a), &fixture, &["a.jpg"]).await;

        let mut own = PulseViewer::open(PulseSvc::from_platform(&a), "u1", pulses.clone(), 0).await;
        settle(&mut own).await;
        assert!(own.is_owner());
        assert_eq!(own.view_label(), None);

        let _other = PulseViewer::open(PulseSvc::from_platform(&b), "u2", pulses, 0).await;
        settle(&mut own).await;
        assert_eq!(own.view_count(), 1);
        assert_eq!(own.view_label().as_deref(), Some("1 visualização"));

        fixture.add_user("u3", "caio").await;
        let c = fixture.signed_in("caio").await;
        let pulses = PulseSvc::from_platform(&c).list_active("u1").await.unwrap();
        let _third = PulseViewer::open(PulseSvc::from_platform(&c), "u3", pulses, 0).await;
        settle(&mut own).await;
        assert_eq!(own.view_label().as_deref(), Some("2 visualizações"));
    }

    #[tokio::test]
    async fn shrinking_list_clamps_then_closes() {
        let (fixture, a, _) = platform_pair().await;
        let pulses = publish(&PulseSvc::from_platform(&a), &fixture, &["a.jpg", "b.jpg"]).await;

        let mut viewer = PulseViewer::open(PulseSvc::from_platform(&a), "u1", pulses.clone(), 5).await;
        assert_eq!(viewer.index(), 1);

        viewer.set_pulses(pulses[..1].to_vec());
        assert_eq!(viewer.index(), 0);
        viewer.set_pulses(Vec::new());
        assert!(viewer.is_closed());
        assert_eq!(viewer.next_event().await, None);
    }

    #[tokio::test]
    async fn deleting_last_pulse_closes_viewer() {
        let (fixture, a, b) = platform_pair().await;
        let pulses = publish(&PulseSvc::from_platform(&a), &fixture, &["a.jpg", "b.jpg"]).await;

        let mut stranger = PulseViewer::open(PulseSvc::from_platform(&b), "u2", pulses.clone(), 0).await;
        assert!(stranger.delete_current().await.is_err());
        assert_eq!(stranger.error().as_deref(), Some("Falha ao excluir o pulso."));

        let mut viewer = PulseViewer::open(PulseSvc::from_platform(&a), "u1", pulses, 1).await;
        viewer.delete_current().await.unwrap();
        assert_eq!(viewer.index(), 0);
        assert!(!viewer.is_closed());
        viewer.delete_current().await.unwrap();
        assert!(viewer.is_closed());
        assert!(PulseSvc::from_platform(&a).list_active("u1").await.unwrap().is_empty());
    }
}
