//! Shared fixtures for the session store integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use medilink::identity::{
    DirectoryConfig, Effect, EffectSink, HashCost, IdentityDirectory, LocalIdentityProvider, MemoryProfileStore,
    Navigation, Notification, SessionStore, StoreConfig,
};
use medilink::portal::PortalData;

/// Sink that keeps every dispatched effect, in order.
#[derive(Default)]
pub struct RecordingSink {
    effects: Mutex<Vec<Effect>>,
}

impl RecordingSink {
    pub fn effects(&self) -> Vec<Effect> { self.effects.lock().clone() }

    pub fn navigations(&self) -> Vec<Navigation> {
        self.effects().iter().filter_map(Effect::as_navigation).cloned().collect()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.effects().iter().filter_map(Effect::as_notification).cloned().collect()
    }

    pub fn clear(&self) { self.effects.lock().clear(); }
}

impl EffectSink for RecordingSink {
    fn navigate(&self, nav: &Navigation) { self.effects.lock().push(Effect::Navigate(nav.clone())); }

    fn notify(&self, note: &Notification) { self.effects.lock().push(Effect::Notify(note.clone())); }
}

/// One seeded directory + profile table shared by any number of clients.
pub struct World {
    pub directory: Arc<IdentityDirectory>,
    pub profiles: Arc<MemoryProfileStore>,
}

/// A client's view: its provider slot, store and recorded effects.
pub struct Harness {
    pub provider: Arc<LocalIdentityProvider>,
    pub store: Arc<SessionStore>,
    pub sink: Arc<RecordingSink>,
}

impl World {
    pub fn seeded() -> Self { Self::with_config(DirectoryConfig { hash_cost: HashCost::Fast, ..Default::default() }) }

    pub fn with_config(config: DirectoryConfig) -> Self {
        let directory = Arc::new(IdentityDirectory::new(config));
        let profiles = Arc::new(MemoryProfileStore::new());
        medilink::seed::seed_demo(&directory, &profiles, &PortalData::demo()).expect("seed");
        World { directory, profiles }
    }

    pub fn client(&self) -> Harness { self.client_with(StoreConfig::default()) }

    pub fn client_with(&self, config: StoreConfig) -> Harness {
        let provider = Arc::new(LocalIdentityProvider::new(self.directory.clone()));
        let sink = Arc::new(RecordingSink::default());
        let store = SessionStore::create(provider.clone(), self.profiles.clone(), sink.clone(), config);
        Harness { provider, store, sink }
    }
}

impl Harness {
    /// Client whose initial session check has already resolved.
    pub async fn ready(world: &World) -> Self {
        let h = world.client();
        h.store.initialize().await;
        h
    }
}

/// Let the provider-event listener task catch up.
pub async fn settle() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub const PASSWORD: &str = medilink::seed::DEMO_PASSWORD;
