use crate::kubernetes::index::DynamicIndex;
use crate::kubernetes::{Cluster, ClusterError, with_type_meta};
use async_trait::async_trait;
use futures::StreamExt;
use kube::api::{Api, ApiResource, DynamicObject};
use kube::runtime::reflector::store::Writer;
use kube::runtime::reflector::{ObjectRef as ReflectorRef, Store};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Client, Resource};
use std::collections::{BTreeSet, HashMap};
use std::future::{Future, ready};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

type ObjectKey = (Option<String>, String);

fn object_key(object: &DynamicObject) -> Option<ObjectKey> {
    let name = object.metadata.name.clone()?;
    Some((object.metadata.namespace.clone(), name))
}

#[derive(Default)]
struct IndexEntries {
    by_value: HashMap<String, BTreeSet<ObjectKey>>,
    by_object: HashMap<ObjectKey, Vec<String>>,
}

impl IndexEntries {
    fn insert(&mut self, key: ObjectKey, values: Vec<String>) {
        self.remove(&key);
        for value in &values {
            self.by_value
                .entry(value.clone())
                .or_default()
                .insert(key.clone());
        }
        self.by_object.insert(key, values);
    }

    fn remove(&mut self, key: &ObjectKey) {
        let Some(values) = self.by_object.remove(key) else {
            return;
        };
        for value in values {
            if let Some(keys) = self.by_value.get_mut(&value) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_value.remove(&value);
                }
            }
        }
    }
}

struct FieldIndex {
    index: DynamicIndex,
    entries: RwLock<IndexEntries>,
}

impl FieldIndex {
    fn read(&self) -> RwLockReadGuard<'_, IndexEntries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexEntries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, value: &str) -> Vec<ObjectKey> {
        self.read()
            .by_value
            .get(value)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Keeps one index in step with the watch; a relist is buffered and swapped
/// in whole, like the store itself.
struct IndexWriter {
    index: Arc<FieldIndex>,
    buffer: IndexEntries,
}

impl IndexWriter {
    fn apply(&mut self, event: &watcher::Event<DynamicObject>) {
        match event {
            watcher::Event::Apply(object) => {
                if let Some(key) = object_key(object) {
                    let values = self.index.index.extract(object);
                    self.index.write().insert(key, values);
                }
            }
            watcher::Event::Delete(object) => {
                if let Some(key) = object_key(object) {
                    self.index.write().remove(&key);
                }
            }
            watcher::Event::Init => self.buffer = IndexEntries::default(),
            watcher::Event::InitApply(object) => {
                if let Some(key) = object_key(object) {
                    let values = self.index.index.extract(object);
                    self.buffer.insert(key, values);
                }
            }
            watcher::Event::InitDone => {
                *self.index.write() = std::mem::take(&mut self.buffer);
            }
        }
    }
}

/// Feeds watch events into an [`ObjectCache`].
pub struct CacheWriter {
    writer: Writer<DynamicObject>,
    indexes: Vec<IndexWriter>,
}

impl CacheWriter {
    pub fn apply(&mut self, event: &watcher::Event<DynamicObject>) {
        self.writer.apply_watcher_event(event);
        for index in &mut self.indexes {
            index.apply(event);
        }
    }
}

/// Watched objects of one kind, with the field indexes kept over them.
#[derive(Clone)]
pub struct ObjectCache {
    resource: ApiResource,
    namespace: Option<String>,
    store: Store<DynamicObject>,
    indexes: Vec<Arc<FieldIndex>>,
}

impl ObjectCache {
    /// `namespace` is the scope the cache is filled from; `None` is every
    /// namespace.
    pub fn new(
        resource: ApiResource,
        namespace: Option<String>,
        indexes: Vec<DynamicIndex>,
    ) -> (Self, CacheWriter) {
        let writer = Writer::new(resource.clone());
        let store = writer.as_reader();
        let indexes: Vec<_> = indexes
            .into_iter()
            .map(|index| {
                Arc::new(FieldIndex {
                    index,
                    entries: RwLock::default(),
                })
            })
            .collect();

        let cache = Self {
            resource,
            namespace,
            store,
            indexes: indexes.clone(),
        };
        let writer = CacheWriter {
            writer,
            indexes: indexes
                .into_iter()
                .map(|index| IndexWriter {
                    index,
                    buffer: IndexEntries::default(),
                })
                .collect(),
        };
        (cache, writer)
    }

    /// Watches `K` objects. The returned future keeps the cache current for as
    /// long as it is polled.
    pub fn watch<K>(
        client: Client,
        namespace: Option<&str>,
        indexes: Vec<DynamicIndex>,
    ) -> (Self, impl Future<Output = ()> + Send + 'static)
    where
        K: Resource<DynamicType = ()>,
    {
        let resource = ApiResource::erase::<K>(&());
        let api: Api<DynamicObject> = match namespace {
            Some(namespace) => Api::namespaced_with(client, namespace, &resource),
            None => Api::all_with(client, &resource),
        };
        let (cache, mut writer) =
            Self::new(resource.clone(), namespace.map(ToString::to_string), indexes);

        let kind = resource.kind;
        let driver = watcher(api, watcher::Config::default())
            .default_backoff()
            .for_each(move |event| {
                match event {
                    Ok(event) => writer.apply(&event),
                    Err(err) => warn!("Watch of {} objects failed: {}", kind, err),
                }
                ready(())
            });

        (cache, driver)
    }

    fn serves(&self, resource: &ApiResource, namespace: Option<&str>) -> bool {
        self.resource.api_version == resource.api_version
            && self.resource.kind == resource.kind
            && (self.namespace.is_none() || self.namespace.as_deref() == namespace)
    }

    fn get(&self, namespace: Option<&str>, name: &str) -> Option<DynamicObject> {
        let mut key = ReflectorRef::new_with(name, self.resource.clone());
        if let Some(namespace) = namespace {
            key = key.within(namespace);
        }
        self.store
            .get(&key)
            .map(|object| with_type_meta(&self.resource, object.as_ref().clone()))
    }

    fn list(&self, namespace: Option<&str>) -> Vec<DynamicObject> {
        let mut objects: Vec<_> = self
            .store
            .state()
            .into_iter()
            .filter(|object| {
                namespace.is_none_or(|ns| object.metadata.namespace.as_deref() == Some(ns))
            })
            .map(|object| with_type_meta(&self.resource, object.as_ref().clone()))
            .collect();
        objects.sort_by(|a, b| {
            (&a.metadata.namespace, &a.metadata.name)
                .cmp(&(&b.metadata.namespace, &b.metadata.name))
        });
        objects
    }

    /// `None` when no index named `index` is kept.
    fn lookup(
        &self,
        namespace: Option<&str>,
        index: &str,
        value: &str,
    ) -> Option<Vec<DynamicObject>> {
        let field_index = self
            .indexes
            .iter()
            .find(|field_index| field_index.index.name() == index)?;

        Some(
            field_index
                .lookup(value)
                .into_iter()
                .filter(|(object_namespace, _)| {
                    namespace.is_none_or(|ns| object_namespace.as_deref() == Some(ns))
                })
                .filter_map(|(object_namespace, name)| self.get(object_namespace.as_deref(), &name))
                .collect(),
        )
    }
}

/// Serves reads from watch caches where one covers the request, and sends
/// everything else to `live`.
///
/// Label-selected lists always go to `live`, so objects just created by a
/// reconcile are seen by the next one.
pub struct CachedCluster {
    live: Arc<dyn Cluster>,
    caches: Vec<ObjectCache>,
}

impl CachedCluster {
    pub fn new(live: Arc<dyn Cluster>) -> Self {
        Self {
            live,
            caches: vec![],
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: ObjectCache) -> Self {
        self.caches.push(cache);
        self
    }

    fn cache_for(&self, resource: &ApiResource, namespace: Option<&str>) -> Option<&ObjectCache> {
        self.caches
            .iter()
            .find(|cache| cache.serves(resource, namespace))
    }

    /// Resolves once every cache has seen its initial list.
    pub async fn wait_until_ready(&self) {
        for cache in &self.caches {
            match cache.store.wait_until_ready().await {
                Ok(()) => debug!("Cache of {} objects is ready", cache.resource.kind),
                Err(err) => warn!("Cache of {} objects never filled: {}", cache.resource.kind, err),
            }
        }
    }

    /// Synchronous index lookup; `None` when no cache keeps `index` for the
    /// request.
    pub fn lookup(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        index: &str,
        value: &str,
    ) -> Option<Vec<DynamicObject>> {
        self.cache_for(resource, namespace)?
            .lookup(namespace, index, value)
    }
}

#[async_trait]
impl Cluster for CachedCluster {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClusterError> {
        match self.cache_for(resource, namespace) {
            Some(cache) => Ok(cache.get(namespace, name)),
            None => self.live.get(resource, namespace, name).await,
        }
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        match (label_selector, self.cache_for(resource, namespace)) {
            (None, Some(cache)) => Ok(cache.list(namespace)),
            _ => self.live.list(resource, namespace, label_selector).await,
        }
    }

    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        self.live.create(resource, object).await
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError> {
        self.live.delete(resource, namespace, name).await
    }

    async fn list_indexed(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        index: &DynamicIndex,
        value: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        match self.lookup(resource, namespace, index.name(), value) {
            Some(objects) => Ok(objects),
            None => {
                self.live
                    .list_indexed(resource, namespace, index, value)
                    .await
            }
        }
    }
}
