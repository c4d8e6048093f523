use super::{BlobReader, BlobWriter, ObjectStore, ObjectStoreOpener, StoreError, StoreResult};
use crate::storage_root::BucketUrl;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Objects = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

/// In-process object store. Every store it opens shares one object map, keyed by full object
/// name (prefix + key), so tests can inspect what a launch uploaded.
#[derive(Clone, Debug, Default)]
pub struct MemoryStoreOpener {
    objects: Objects,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MemoryStoreOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, object_name: &str, content: Vec<u8>) {
        lock(&self.objects).insert(object_name.to_string(), content);
    }

    pub fn get(&self, object_name: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(object_name).cloned()
    }

    pub fn object_names(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ObjectStoreOpener for MemoryStoreOpener {
    async fn open(&self, root_url: &str) -> StoreResult<Box<dyn ObjectStore>> {
        let url = BucketUrl::parse(root_url)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryObjectStore {
            url,
            objects: self.objects.clone(),
            closed: self.closed.clone(),
        }))
    }
}

#[derive(Debug)]
pub struct MemoryObjectStore {
    url: BucketUrl,
    objects: Objects,
    closed: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn new_reader(&self, key: &str) -> StoreResult<BlobReader> {
        let content = lock(&self.objects)
            .get(&self.url.object_name(key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })?;
        Ok(Box::pin(Cursor::new(content)))
    }

    async fn new_writer(&self, key: &str) -> StoreResult<Box<dyn BlobWriter>> {
        Ok(Box::new(MemoryBlobWriter {
            object_name: self.url.object_name(key),
            buffer: Vec::new(),
            objects: self.objects.clone(),
        }))
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MemoryBlobWriter {
    object_name: String,
    buffer: Vec<u8>,
    objects: Objects,
}

#[async_trait::async_trait]
impl BlobWriter for MemoryBlobWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> StoreResult<()> {
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    async fn close(&mut self) -> StoreResult<()> {
        let content = std::mem::take(&mut self.buffer);
        lock(&self.objects).insert(self.object_name.clone(), content);
        Ok(())
    }
}

fn lock(objects: &Objects) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
    objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
