//! Voice resolver
//!
//! Process-wide cache of loaded voice models keyed by (language, voice).
//!
//! - Single-flight: concurrent misses on one key share a single load
//! - Failed loads are reported to every waiter and then forgotten, so the
//!   next request retries
//! - Handles are reference counted; an entry is evicted only when nobody
//!   holds it and it has been idle longer than the configured timeout

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::catalog::VoiceKey;
use crate::core::error::{Result, TtsError};
use crate::engine::{EngineGate, SynthesisEngine, VoiceModel};

/// Voice cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceCacheConfig {
    /// Idle time after which an unreferenced voice is unloaded
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// How often the background reaper looks for idle voices
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_reap_interval_secs() -> u64 {
    60
}

impl Default for VoiceCacheConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

impl VoiceCacheConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

/// A loaded voice shared by every handle to it
struct VoiceEntry {
    key: VoiceKey,
    model: Arc<dyn VoiceModel>,
    refs: AtomicUsize,
    last_used: Mutex<Instant>,
    loaded_at: Instant,
    pinned: AtomicBool,
}

impl VoiceEntry {
    fn new(key: VoiceKey, model: Arc<dyn VoiceModel>) -> Self {
        let now = Instant::now();
        Self {
            key,
            model,
            refs: AtomicUsize::new(0),
            last_used: Mutex::new(now),
            loaded_at: now,
            pinned: AtomicBool::new(false),
        }
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_used.lock() {
            *last = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }

    fn is_evictable(&self, idle_timeout: Duration) -> bool {
        !self.pinned.load(Ordering::Relaxed)
            && self.refs.load(Ordering::SeqCst) == 0
            && self.idle_for() >= idle_timeout
    }
}

/// Reference-counted handle to a loaded voice
///
/// Cloning takes another reference; dropping releases it.
pub struct VoiceHandle {
    entry: Arc<VoiceEntry>,
}

impl VoiceHandle {
    fn acquire(entry: Arc<VoiceEntry>) -> Self {
        entry.refs.fetch_add(1, Ordering::SeqCst);
        entry.touch();
        Self { entry }
    }

    pub fn key(&self) -> VoiceKey {
        self.entry.key
    }

    pub fn model(&self) -> &dyn VoiceModel {
        self.entry.model.as_ref()
    }

    /// Current number of live handles to this voice
    pub fn ref_count(&self) -> usize {
        self.entry.refs.load(Ordering::SeqCst)
    }
}

impl Clone for VoiceHandle {
    fn clone(&self) -> Self {
        Self::acquire(Arc::clone(&self.entry))
    }
}

impl Drop for VoiceHandle {
    fn drop(&mut self) {
        self.entry.touch();
        self.entry.refs.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for VoiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceHandle")
            .field("key", &self.entry.key)
            .field("refs", &self.ref_count())
            .finish()
    }
}

enum Slot {
    Ready(Arc<VoiceEntry>),
    Loading(watch::Receiver<Option<Result<()>>>),
}

/// Snapshot of one cached voice
#[derive(Debug, Clone, Serialize)]
pub struct CachedVoice {
    pub name: String,
    pub refs: usize,
    pub idle_secs: f64,
    pub loaded_secs_ago: f64,
    pub pinned: bool,
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct VoiceCacheStats {
    pub cached: usize,
    pub loading: usize,
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub failures: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

/// Process-wide voice cache in front of the engine
pub struct VoiceResolver {
    engine: Arc<dyn SynthesisEngine>,
    gate: Arc<EngineGate>,
    slots: DashMap<VoiceKey, Slot>,
    idle_timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

impl VoiceResolver {
    pub fn new(engine: Arc<dyn SynthesisEngine>, gate: Arc<EngineGate>, config: &VoiceCacheConfig) -> Self {
        Self {
            engine,
            gate,
            slots: DashMap::new(),
            idle_timeout: config.idle_timeout(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn engine(&self) -> &Arc<dyn SynthesisEngine> {
        &self.engine
    }

    pub fn gate(&self) -> &Arc<EngineGate> {
        &self.gate
    }

    /// Validate raw codes against the catalog, then resolve
    ///
    /// Unknown voices fail before the cache or the engine is touched.
    pub async fn resolve_codes(self: &Arc<Self>, language: &str, voice: &str) -> Result<VoiceHandle> {
        let key = VoiceKey::from_codes(language, voice)?;
        self.resolve(key).await
    }

    /// Get a handle to a loaded voice, loading it if needed
    pub async fn resolve(self: &Arc<Self>, key: VoiceKey) -> Result<VoiceHandle> {
        let mut first_pass = true;

        loop {
            let mut pending = match self.slots.entry(key) {
                Entry::Occupied(occupied) => match occupied.get() {
                    Slot::Ready(entry) => {
                        if first_pass {
                            self.hits.fetch_add(1, Ordering::Relaxed);
                        }
                        return Ok(VoiceHandle::acquire(Arc::clone(entry)));
                    }
                    Slot::Loading(rx) => rx.clone(),
                },
                Entry::Vacant(vacant) => {
                    let (tx, rx) = watch::channel(None);
                    vacant.insert(Slot::Loading(rx.clone()));
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    self.spawn_load(key, tx);
                    rx
                }
            };
            first_pass = false;

            let outcome = match pending.wait_for(Option::is_some).await {
                Ok(state) => state.clone(),
                Err(_) => None,
            };
            match outcome {
                // Loaded: take the handle from the map on the next pass
                Some(Ok(())) => continue,
                Some(Err(err)) => return Err(err),
                None => return Err(TtsError::internal(format!("load of voice {} was abandoned", key))),
            }
        }
    }

    fn spawn_load(self: &Arc<Self>, key: VoiceKey, tx: watch::Sender<Option<Result<()>>>) {
        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            let engine = Arc::clone(&resolver.engine);
            let loaded = resolver.gate.run(move || engine.load_voice(key)).await;

            let outcome = match loaded {
                Ok(model) => {
                    let entry = Arc::new(VoiceEntry::new(key, model));
                    resolver.slots.insert(key, Slot::Ready(entry));
                    resolver.loads.fetch_add(1, Ordering::Relaxed);
                    info!(
                        voice = %key,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "voice loaded"
                    );
                    Ok(())
                }
                Err(err) => {
                    resolver.slots.remove(&key);
                    resolver.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(voice = %key, error = %err, "voice load failed");
                    Err(err)
                }
            };
            tx.send_replace(Some(outcome));
        });
    }

    /// Load voices ahead of traffic and keep them resident
    pub async fn preload(self: &Arc<Self>, keys: &[VoiceKey]) -> Vec<(VoiceKey, Result<()>)> {
        let mut results = Vec::with_capacity(keys.len());
        for &key in keys {
            let outcome = self.resolve(key).await.map(|handle| {
                handle.entry.pinned.store(true, Ordering::Relaxed);
            });
            results.push((key, outcome));
        }
        results
    }

    /// Unload voices nobody holds that have been idle past the timeout
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_older_than(self.idle_timeout)
    }

    pub fn evict_idle_older_than(&self, idle_timeout: Duration) -> usize {
        let mut evicted = 0;
        self.slots.retain(|key, slot| match slot {
            Slot::Ready(entry) if entry.is_evictable(idle_timeout) => {
                debug!(voice = %key, "evicting idle voice");
                evicted += 1;
                false
            }
            _ => true,
        });
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            info!(evicted, "idle voices unloaded");
        }
        evicted
    }

    /// Periodically evict idle voices until the resolver is dropped
    pub fn spawn_reaper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let resolver = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(resolver) = resolver.upgrade() else {
                    break;
                };
                resolver.evict_idle();
            }
        })
    }

    pub fn is_cached(&self, key: &VoiceKey) -> bool {
        matches!(self.slots.get(key).as_deref(), Some(Slot::Ready(_)))
    }

    /// Loaded voices, sorted by name
    pub fn cached_voices(&self) -> Vec<CachedVoice> {
        let mut voices: Vec<CachedVoice> = self
            .slots
            .iter()
            .filter_map(|slot| match slot.value() {
                Slot::Ready(entry) => Some(CachedVoice {
                    name: entry.key.name(),
                    refs: entry.refs.load(Ordering::SeqCst),
                    idle_secs: entry.idle_for().as_secs_f64(),
                    loaded_secs_ago: entry.loaded_at.elapsed().as_secs_f64(),
                    pinned: entry.pinned.load(Ordering::Relaxed),
                }),
                Slot::Loading(_) => None,
            })
            .collect();
        voices.sort_by(|a, b| a.name.cmp(&b.name));
        voices
    }

    pub fn stats(&self) -> VoiceCacheStats {
        let (cached, loading) = self.slots.iter().fold((0, 0), |(ready, loading), slot| match slot.value() {
            Slot::Ready(_) => (ready + 1, loading),
            Slot::Loading(_) => (ready, loading + 1),
        });
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        VoiceCacheStats {
            cached,
            loading,
            hits,
            misses,
            loads: self.loads.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if lookups > 0 { hits as f64 / lookups as f64 } else { 0.0 },
        }
    }
}
