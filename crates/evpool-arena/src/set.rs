//! Resolving several pools at once.
//!
//! A [`PoolSet`] acquires handles for a group of element types in one arena
//! in a canonical order (type name, then `TypeId`), whatever order the call
//! site declares them in. Call sites on different threads that all go
//! through a pool set can therefore never wait on each other in a cycle.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::trace;

use crate::arena::Arena;
use crate::error::Result;
use crate::handle::{PoolBuilder, PoolHandle};
use crate::typed::PoolElement;

type Acquire = Box<dyn FnOnce(&Arc<Arena>) -> Result<Box<dyn Any>>>;

struct Request {
    type_name: &'static str,
    type_id: TypeId,
    acquire: Acquire,
}

/// Collects the pools a [`PoolSet`] should resolve.
pub struct PoolSetBuilder {
    arena: Arc<Arena>,
    requests: Vec<Request>,
}

impl PoolSetBuilder {
    /// Request the pool for `T` with room for `capacity` elements.
    pub fn with<T: PoolElement>(self, capacity: usize) -> Self {
        self.with_builder(PoolBuilder::<T>::new().capacity(capacity))
    }

    /// Request the pool for `T` with full builder control.
    ///
    /// A type requested twice keeps its first request.
    pub fn with_builder<T: PoolElement>(mut self, builder: PoolBuilder<T>) -> Self {
        let type_id = TypeId::of::<T>();
        if self.requests.iter().all(|r| r.type_id != type_id) {
            self.requests.push(Request {
                type_name: type_name::<T>(),
                type_id,
                acquire: Box::new(move |arena: &Arc<Arena>| {
                    let handle = builder.build_in(arena)?;
                    Ok(Box::new(handle) as Box<dyn Any>)
                }),
            });
        }
        self
    }

    /// Resolve every requested pool in canonical order.
    ///
    /// On error, handles acquired so far are released.
    pub fn acquire(mut self) -> Result<PoolSet> {
        self.requests
            .sort_by(|a, b| a.type_name.cmp(b.type_name).then(a.type_id.cmp(&b.type_id)));

        let mut handles = IndexMap::with_capacity(self.requests.len());
        let mut order = Vec::with_capacity(self.requests.len());
        for request in self.requests {
            trace!(arena = self.arena.name(), type_name = request.type_name, "acquiring pool");
            let handle = (request.acquire)(&self.arena)?;
            handles.insert(request.type_id, handle);
            order.push(request.type_name);
        }

        Ok(PoolSet {
            arena: self.arena,
            handles,
            order,
        })
    }
}

impl fmt::Debug for PoolSetBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSetBuilder")
            .field("arena", &self.arena.name())
            .field(
                "requests",
                &self.requests.iter().map(|r| r.type_name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Handles for a group of element types, resolved together.
pub struct PoolSet {
    arena: Arc<Arena>,
    handles: IndexMap<TypeId, Box<dyn Any>>,
    order: Vec<&'static str>,
}

impl PoolSet {
    /// Start a set of pools in `arena`.
    pub fn builder(arena: &Arc<Arena>) -> PoolSetBuilder {
        PoolSetBuilder {
            arena: Arc::clone(arena),
            requests: Vec::new(),
        }
    }

    /// The handle for `T`, if it was requested and not taken.
    pub fn get<T: PoolElement>(&self) -> Option<&PoolHandle<T>> {
        self.handles.get(&TypeId::of::<T>())?.downcast_ref()
    }

    /// Mutable form of [`get`](Self::get).
    pub fn get_mut<T: PoolElement>(&mut self) -> Option<&mut PoolHandle<T>> {
        self.handles.get_mut(&TypeId::of::<T>())?.downcast_mut()
    }

    /// Move the handle for `T` out of the set.
    pub fn take<T: PoolElement>(&mut self) -> Option<PoolHandle<T>> {
        let handle = self.handles.shift_remove(&TypeId::of::<T>())?;
        handle.downcast().ok().map(|handle| *handle)
    }

    /// Type names in the order their pools were resolved.
    pub fn acquisition_order(&self) -> &[&'static str] {
        &self.order
    }

    /// Number of handles still held by the set.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether every handle has been taken.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// The arena the pools belong to.
    pub fn arena(&self) -> &Arc<Arena> {
        &self.arena
    }
}

impl fmt::Debug for PoolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSet")
            .field("arena", &self.arena.name())
            .field("order", &self.order)
            .field("held", &self.handles.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;

    #[derive(Default)]
    struct Vertex {
        barcode: i32,
    }

    #[derive(Default)]
    struct Particle {
        momentum: [f64; 4],
    }

    #[derive(Default)]
    struct Event {
        number: u64,
    }

    #[test]
    fn acquisition_order_ignores_declaration_order() {
        let arena = Arena::new("order");
        let forward = PoolSet::builder(&arena)
            .with::<Vertex>(0)
            .with::<Particle>(0)
            .with::<Event>(0)
            .acquire()
            .unwrap();
        let forward_order = forward.acquisition_order().to_vec();
        drop(forward);

        let backward = PoolSet::builder(&arena)
            .with::<Event>(0)
            .with::<Particle>(0)
            .with::<Vertex>(0)
            .acquire()
            .unwrap();
        assert_eq!(backward.acquisition_order(), forward_order.as_slice());

        let mut sorted = forward_order.clone();
        sorted.sort();
        assert_eq!(forward_order, sorted);
    }

    #[test]
    fn duplicate_request_keeps_one_handle() {
        let arena = Arena::new("dupe");
        let set = PoolSet::builder(&arena)
            .with::<Vertex>(0)
            .with::<Vertex>(4096)
            .acquire()
            .unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.get::<Vertex>().map(|h| h.capacity()),
            Some(PoolConfig::DEFAULT_MIN_CAPACITY)
        );
    }

    #[test]
    fn take_moves_handle_out() {
        let arena = Arena::new("take");
        let mut set = PoolSet::builder(&arena)
            .with::<Vertex>(0)
            .with::<Event>(0)
            .acquire()
            .unwrap();

        let vertices = set.take::<Vertex>().unwrap();
        vertices.next_element().unwrap().barcode = -3;
        assert!(set.take::<Vertex>().is_none());
        assert!(set.get::<Particle>().is_none());
        assert_eq!(set.len(), 1);

        set.get_mut::<Event>().unwrap().next_element().unwrap().number = 11;
        assert_eq!(set.get::<Event>().unwrap().allocated(), 1);
    }

    #[test]
    fn dropping_set_releases_pools() {
        let arena = Arena::new("drop");
        let set = PoolSet::builder(&arena)
            .with::<Particle>(0)
            .acquire()
            .unwrap();
        set.get::<Particle>()
            .unwrap()
            .next_element()
            .unwrap()
            .momentum[3] = 1.0;
        drop(set);
        let allocated = std::thread::scope(|s| {
            s.spawn(|| {
                PoolHandle::<Particle>::builder()
                    .try_build_in(&arena)
                    .unwrap()
                    .allocated()
            })
            .join()
            .unwrap()
        });
        assert_eq!(allocated, 1);
    }

    #[test]
    fn opposite_declarations_do_not_deadlock() {
        let arena = Arena::new("contended");
        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..200 {
                    let set = PoolSet::builder(&arena)
                        .with::<Vertex>(0)
                        .with::<Event>(0)
                        .acquire()
                        .unwrap();
                    set.get::<Vertex>().unwrap().next_element().unwrap();
                }
            });
            s.spawn(|| {
                for _ in 0..200 {
                    let set = PoolSet::builder(&arena)
                        .with::<Event>(0)
                        .with::<Vertex>(0)
                        .acquire()
                        .unwrap();
                    set.get::<Event>().unwrap().next_element().unwrap();
                }
            });
        });
        assert_eq!(arena.pool_count(), 2);
    }
}
