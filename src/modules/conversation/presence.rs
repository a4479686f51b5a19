/// Presence Tracker
///
/// Online/offline state of conversation peers, derived from each peer's
/// `users/{uid}.lastSeen` heartbeat:
///
/// - one live subscription per tracked peer
/// - `track` tears every subscription down and recreates the set, so peers
///   that left the list never keep a listener alive
/// - the last heartbeat of a peer that stays tracked survives re-tracking
/// - the online flag is recomputed against the clock on every read
use std::{
    collections::{BTreeSet, HashMap},
    future::poll_fn,
    sync::Arc,
    task::Poll,
};

use chrono::{DateTime, Utc};
use futures_util::StreamExt;

use crate::{
    constants::PRESENCE_WINDOW_SECS,
    modules::user::{repository::UserRepository, schema::UserEntity},
    platform::{
        document::{DocumentSnapshot, Subscription},
        Clock,
    },
};

pub struct PresenceTracker<U>
where
    U: UserRepository + Send + Sync,
{
    user_repo: Arc<U>,
    clock: Arc<dyn Clock>,
    subscriptions: HashMap<String, Subscription<DocumentSnapshot>>,
    last_seen: HashMap<String, DateTime<Utc>>,
}

impl<U> PresenceTracker<U>
where
    U: UserRepository + Send + Sync,
{
    pub fn new(user_repo: Arc<U>, clock: Arc<dyn Clock>) -> Self {
        Self { user_repo, clock, subscriptions: HashMap::new(), last_seen: HashMap::new() }
    }

    /// Replaces every presence subscription with one per distinct peer.
    pub fn track<I, S>(&mut self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscriptions.clear();
        let peers: BTreeSet<String> = peers.into_iter().map(Into::into).collect();
        self.last_seen.retain(|uid, _| peers.contains(uid));
        for peer in peers {
            let subscription = self.user_repo.watch(&peer);
            self.subscriptions.insert(peer, subscription);
        }
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
        self.last_seen.clear();
    }

    pub fn tracked(&self) -> usize {
        self.subscriptions.len()
    }

    /// Offline until a heartbeat for the peer has been observed.
    pub fn is_online(&self, uid: &str) -> bool {
        let now = self.clock.now();
        self.last_seen
            .get(uid)
            .is_some_and(|seen| (now - *seen).num_seconds() < PRESENCE_WINDOW_SECS)
    }

    /// Waits for the next heartbeat snapshot and returns whose it was.
    /// Pending forever while nothing is tracked.
    pub async fn changed(&mut self) -> String {
        poll_fn(|cx| {
            let mut ended = Vec::new();
            let mut ready = None;

            for (uid, subscription) in self.subscriptions.iter_mut() {
                loop {
                    match subscription.poll_next_unpin(cx) {
                        Poll::Ready(Some(Ok(snapshot))) => {
                            match UserEntity::from_snapshot(&snapshot) {
                                Ok(Some(UserEntity { last_seen: Some(seen), .. })) => {
                                    self.last_seen.insert(uid.clone(), seen);
                                }
                                Ok(_) => {
                                    self.last_seen.remove(uid);
                                }
                                Err(err) => {
                                    tracing::warn!(peer = %uid, error = ?err, "unreadable presence document");
                                }
                            }
                            ready = Some(uid.clone());
                            break;
                        }
                        Poll::Ready(Some(Err(err))) => {
                            tracing::error!(peer = %uid, error = ?err, "presence listener failed");
                        }
                        Poll::Ready(None) => {
                            ended.push(uid.clone());
                            break;
                        }
                        Poll::Pending => break,
                    }
                }
                if ready.is_some() {
                    break;
                }
            }

            for uid in ended {
                self.subscriptions.remove(&uid);
            }
            match ready {
                Some(uid) => Poll::Ready(uid),
                None => Poll::Pending,
            }
        })
        .await
    }
}
