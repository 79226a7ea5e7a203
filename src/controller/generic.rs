//! Generic resource controller
//!
//! Watch events for one resource type are applied to a reflector store and
//! collapse into keys on a [`WorkQueue`]. Workers pop keys and run every
//! registered handler against the stored object (or `None` once the object
//! is gone). Handlers for one key never run concurrently; different keys run
//! in parallel up to the configured threadiness. A failing key is requeued with its own backoff and does not
//! affect any other key.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use kube::runtime::reflector::store::Writer;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::watcher::Event;
use kube::{Resource, ResourceExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::queue::WorkQueue;
use crate::config::ControllerConfig;
use crate::{Error, Result};

/// Label tying an object to a cluster for cluster-scoped handlers
pub const CLUSTER_NAME_LABEL: &str = "kontainer.dev/cluster-name";

/// Handler invoked with the key and the current object, `None` if it no longer exists
pub type Handler<K> =
    Arc<dyn Fn(String, Option<Arc<K>>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Decides whether an object belongs to a cluster
pub type MembershipPredicate<K> = Arc<dyn Fn(&K, &str) -> bool + Send + Sync>;

/// Queue key of an object: `namespace/name`, or `name` when cluster-scoped
pub fn object_key<K: Resource>(obj: &K) -> String {
    match obj.meta().namespace.as_deref() {
        Some(ns) if !ns.is_empty() => format!("{ns}/{}", obj.name_any()),
        _ => obj.name_any(),
    }
}

fn object_ref<K: Resource<DynamicType = ()>>(key: &str) -> ObjectRef<K> {
    match key.split_once('/') {
        Some((namespace, name)) => ObjectRef::new(name).within(namespace),
        None => ObjectRef::new(key),
    }
}

/// Default membership: the object's namespace or its cluster-name label matches
pub fn in_cluster<K: Resource>(obj: &K, cluster_name: &str) -> bool {
    obj.meta().namespace.as_deref() == Some(cluster_name)
        || obj.labels().get(CLUSTER_NAME_LABEL).map(String::as_str) == Some(cluster_name)
}

/// Writer side of the store plus the keys seen during a relist
struct Cache<K: Resource<DynamicType = ()> + Clone + 'static> {
    writer: Writer<K>,
    listing: Vec<String>,
}

/// Reconciler over one watched resource type
pub struct GenericController<K: Resource<DynamicType = ()> + Clone + 'static> {
    name: String,
    cache: Mutex<Cache<K>>,
    store: Store<K>,
    handlers: Mutex<Vec<(String, Handler<K>)>>,
    membership: MembershipPredicate<K>,
    queue: WorkQueue,
    config: ControllerConfig,
}

impl<K> GenericController<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    /// Create a controller named `name` (used in logs)
    pub fn new(name: impl Into<String>, config: ControllerConfig) -> Self {
        let writer = Writer::default();
        let store = writer.as_reader();
        Self {
            name: name.into(),
            cache: Mutex::new(Cache {
                writer,
                listing: Vec::new(),
            }),
            store,
            handlers: Mutex::new(Vec::new()),
            membership: Arc::new(in_cluster::<K>),
            queue: WorkQueue::new(config.backoff.clone()),
            config,
        }
    }

    /// Replace the predicate used by cluster-scoped handlers
    pub fn with_membership<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&K, &str) -> bool + Send + Sync + 'static,
    {
        self.membership = Arc::new(predicate);
        self
    }

    /// Name given at construction
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a handler that runs for every change
    ///
    /// Handlers run in registration order. Registering a name twice replaces
    /// the earlier handler.
    pub fn add_handler<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(String, Option<Arc<K>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler: Handler<K> = Arc::new(
            move |key: String, obj: Option<Arc<K>>| -> BoxFuture<'static, Result<()>> {
                Box::pin(handler(key, obj))
            },
        );
        let name = name.into();
        let mut handlers = self.handlers.lock();
        match handlers.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = handler,
            None => handlers.push((name, handler)),
        }
    }

    /// Register a handler that only runs for objects belonging to `cluster_name`
    ///
    /// Deliveries for objects that no longer exist are skipped, since
    /// membership cannot be decided without the object.
    pub fn add_cluster_scoped_handler<F, Fut>(
        &self,
        name: impl Into<String>,
        cluster_name: impl Into<String>,
        handler: F,
    ) where
        F: Fn(String, Option<Arc<K>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let cluster_name = cluster_name.into();
        let membership = self.membership.clone();
        let handler = Arc::new(handler);
        self.add_handler(name, move |key, obj: Option<Arc<K>>| {
            let run = match &obj {
                Some(o) => membership(&**o, cluster_name.as_str()),
                None => false,
            };
            let handler = handler.clone();
            async move {
                if run {
                    (*handler)(key, obj).await
                } else {
                    Ok(())
                }
            }
        });
    }

    /// Queue `key` for redelivery even without a change
    pub fn enqueue(&self, key: &str) {
        self.queue.add(key);
    }

    /// Stored object for `key`
    pub fn get(&self, key: &str) -> Option<Arc<K>> {
        self.store.get(&object_ref(key))
    }

    /// Every stored object
    pub fn list(&self) -> Vec<Arc<K>> {
        self.store.state()
    }

    /// Apply a watch event to the store and queue the affected keys
    ///
    /// A relist (`Init` .. `InitDone`) replaces the store once it completes
    /// and queues every listed key plus every key that disappeared.
    pub fn handle_event(&self, event: Event<K>) {
        let keys = {
            let mut cache = self.cache.lock();
            let keys = match &event {
                Event::Apply(obj) | Event::Delete(obj) => vec![object_key(obj)],
                Event::Init => {
                    cache.listing.clear();
                    Vec::new()
                }
                Event::InitApply(obj) => {
                    cache.listing.push(object_key(obj));
                    Vec::new()
                }
                Event::InitDone => {
                    let listed: HashSet<String> = cache.listing.drain(..).collect();
                    let stale = self
                        .store
                        .state()
                        .iter()
                        .map(|o| object_key(&**o))
                        .filter(|k| !listed.contains(k))
                        .collect::<Vec<_>>();
                    listed.into_iter().chain(stale).collect()
                }
            };
            cache.writer.apply_watcher_event(&event);
            keys
        };
        for key in keys {
            self.queue.add(&key);
        }
    }

    /// Run every handler for `key` against the stored object
    ///
    /// All handlers run even if an earlier one fails; failures are combined
    /// into one error.
    #[instrument(skip(self), fields(controller = %self.name))]
    pub async fn sync_key(&self, key: &str) -> Result<()> {
        let obj = self.get(key);
        let handlers: Vec<(String, Handler<K>)> = self.handlers.lock().clone();

        let mut failures = Vec::new();
        for (name, handler) in handlers {
            debug!(handler = %name, found = obj.is_some(), "running handler");
            if let Err(e) = handler(key.to_string(), obj.clone()).await {
                failures.push(format!("{name}: {e}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::handler(failures.join("; ")))
        }
    }

    async fn process(&self, key: String) {
        match self.sync_key(&key).await {
            Ok(()) => self.queue.forget(&key),
            Err(e) => {
                let delay = self.queue.add_rate_limited(&key);
                warn!(
                    controller = %self.name,
                    key = %key,
                    error = %e,
                    delay_ms = delay.as_millis(),
                    "handler failed, requeueing"
                );
            }
        }
        self.queue.done(&key);
    }

    async fn worker(self: Arc<Self>) {
        while let Some(key) = self.queue.next().await {
            self.process(key).await;
        }
    }

    /// Feed `events` into the controller with `threadiness` workers until
    /// the stream ends or `token` is cancelled
    ///
    /// Stream errors are logged and skipped; the watch is expected to recover
    /// on its own.
    pub async fn run<S>(self: Arc<Self>, events: S, token: CancellationToken)
    where
        S: Stream<Item = Result<Event<K>>> + Send,
    {
        let threadiness = self.config.threadiness.max(1);
        info!(controller = %self.name, threadiness, "starting controller");

        let workers: Vec<_> = (0..threadiness)
            .map(|_| tokio::spawn(self.clone().worker()))
            .collect();

        let mut events = std::pin::pin!(events);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = events.next() => match event {
                    Some(Ok(event)) => self.handle_event(event),
                    Some(Err(e)) => warn!(controller = %self.name, error = %e, "watch error"),
                    None => break,
                },
            }
        }

        self.queue.shutdown();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(controller = %self.name, error = %e, "worker panicked");
            }
        }
        info!(controller = %self.name, "controller stopped");
    }
}
