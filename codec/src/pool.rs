use crate::Serializer;
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

type Factory = Arc<dyn Fn() -> Arc<dyn Serializer> + Send + Sync>;

/// A fixed-size pool of serializer instances.
///
/// Serializer implementations are not required to be usable from several
/// tasks at once, so each user checks one out and the guard puts it back on
/// drop. When the pool runs dry a fresh instance is built, and dropped again
/// on release if the pool is already full.
pub struct CodecPool {
    name: String,
    factory: Factory,
    idle: Mutex<Vec<Arc<dyn Serializer>>>,
    capacity: usize,
}

impl CodecPool {
    /// Build `capacity` instances up front
    pub fn new<F>(name: impl Into<String>, capacity: usize, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Serializer> + Send + Sync + 'static,
    {
        let idle = (0..capacity).map(|_| factory()).collect();
        Self { name: name.into(), factory: Arc::new(factory), idle: Mutex::new(idle), capacity }
    }

    pub fn checkout(&self) -> PooledCodec<'_> {
        let codec = self.idle.lock().pop().unwrap_or_else(|| (self.factory)());
        PooledCodec { pool: self, codec: Some(codec) }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Instances currently waiting in the pool
    #[inline]
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    fn checkin(&self, codec: Arc<dyn Serializer>) {
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(codec);
        }
    }
}

impl fmt::Debug for CodecPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CodecPool({}, {}/{})", self.name, self.idle(), self.capacity)
    }
}

/// A checked-out serializer, returned to its pool when dropped
pub struct PooledCodec<'a> {
    pool: &'a CodecPool,
    codec: Option<Arc<dyn Serializer>>,
}

impl Deref for PooledCodec<'_> {
    type Target = dyn Serializer;

    #[inline]
    fn deref(&self) -> &Self::Target {
        // only taken in drop
        self.codec.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledCodec<'_> {
    fn drop(&mut self) {
        if let Some(codec) = self.codec.take() {
            self.pool.checkin(codec);
        }
    }
}
