//! Object identity assignment
//!
//! Live object references cannot appear in the event stream; they are
//! replaced by small surrogate ids. [`ObjectIdMap`] hands out a fresh id
//! the first time a distinct object identity is seen and the same id on
//! every later sighting, without keeping the object alive: entries hold
//! [`Weak`] references, and the table purges reclaimed entries lazily
//! when it resizes. Id 0 is reserved for "no object".
//!
//! Identity here means `Arc` allocation identity, not value equality.
//! An id, once assigned, is never reused even after its object is gone.

mod object_file;

pub use object_file::{
    exception_file_names, load_object_types, object_type_file_names, string_file_names,
    ObjectIdFile, EXCEPTION_FILE_PREFIX, OBJECT_TYPE_FILE_PREFIX, STRING_FILE_PREFIX,
};

use std::sync::{Arc, Mutex, Weak};

/// An object observed by the traced program
///
/// The instrumentation hands objects to the sinks as trait objects so
/// the identity map can ask for the pieces the side tables persist:
/// the runtime type name for every object, text for string-like
/// objects, and the chain for exception-like objects.
pub trait TracedObject: Send + Sync + 'static {
    /// Runtime type name recorded in the object-type side table
    fn type_name(&self) -> &str;

    /// Textual content, for string-like objects
    fn string_content(&self) -> Option<String> {
        None
    }

    /// Exception chain, for throwable-like objects
    fn exception(&self) -> Option<ExceptionInfo> {
        None
    }
}

/// Shared reference to a traced object
pub type ObjRef = Arc<dyn TracedObject>;

/// Weak reference to a traced object
pub type WeakObjRef = Weak<dyn TracedObject>;

/// Exception chain data persisted to the exception side table
#[derive(Clone)]
pub struct ExceptionInfo {
    pub message: String,
    pub cause: Option<ObjRef>,
    pub suppressed: Vec<ObjRef>,
    /// Rendered stack frames, innermost first
    pub frames: Vec<String>,
}

/// Default initial capacity; the table starts at the next power of two
pub const DEFAULT_INITIAL_CAPACITY: usize = 64 * 1024;

struct Entry {
    weak: WeakObjRef,
    hash: u64,
    id: i64,
    next: Option<Box<Entry>>,
}

struct MapInner {
    buckets: Vec<Option<Box<Entry>>>,
    /// Live entries; decremented when a purge drops reclaimed ones
    size: usize,
    /// Next id to assign; ids start at 1 and never repeat
    next_id: i64,
}

impl MapInner {
    fn with_capacity(initial: usize) -> Self {
        let capacity = initial.max(2).next_power_of_two();
        let mut buckets = Vec::with_capacity(capacity);
        buckets.resize_with(capacity, || None);
        Self {
            buckets,
            size: 0,
            next_id: 1,
        }
    }

    fn bucket_of(&self, hash: u64) -> usize {
        (hash as usize) & (self.buckets.len() - 1)
    }

    /// Doubles the table. This is the only place reclaimed entries are
    /// purged, so the map is self-compacting.
    fn resize(&mut self) {
        let new_capacity = self.buckets.len() * 2;
        let mut new_buckets: Vec<Option<Box<Entry>>> = Vec::with_capacity(new_capacity);
        new_buckets.resize_with(new_capacity, || None);
        let mask = new_capacity - 1;

        let old = std::mem::replace(&mut self.buckets, new_buckets);
        for mut slot in old {
            while let Some(mut entry) = slot {
                slot = entry.next.take();
                if entry.weak.upgrade().is_some() {
                    let index = (entry.hash as usize) & mask;
                    entry.next = self.buckets[index].take();
                    self.buckets[index] = Some(entry);
                } else {
                    self.size -= 1;
                }
            }
        }
    }
}

/// Open hash table assigning surrogate ids to object identities
pub struct ObjectIdMap {
    inner: Mutex<MapInner>,
}

impl ObjectIdMap {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CAPACITY)
    }

    /// Create a map whose table starts at the smallest power of two
    /// holding `initial_capacity`
    pub fn with_capacity(initial_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(MapInner::with_capacity(initial_capacity)),
        }
    }

    /// The surrogate id for an object reference; 0 for `None`
    pub fn id_for(&self, obj: Option<&ObjRef>) -> i64 {
        match obj {
            None => 0,
            Some(obj) => self.assign(obj).0,
        }
    }

    /// Assign (or look up) the id for an object; the flag is true on
    /// first sighting
    pub fn assign(&self, obj: &ObjRef) -> (i64, bool) {
        let hash = identity_hash(obj);
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            // Poisoned by a panicking holder; the table itself is still
            // structurally sound, so keep assigning rather than fail
            // the traced program.
            Err(poisoned) => poisoned.into_inner(),
        };

        let index = inner.bucket_of(hash);
        let mut cursor = inner.buckets[index].as_deref();
        while let Some(entry) = cursor {
            if entry.hash == hash {
                if let Some(live) = entry.weak.upgrade() {
                    if same_identity(&live, obj) {
                        return (entry.id, false);
                    }
                }
            }
            cursor = entry.next.as_deref();
        }

        let id = inner.next_id;
        inner.next_id += 1;
        let entry = Box::new(Entry {
            weak: Arc::downgrade(obj),
            hash,
            id,
            next: inner.buckets[index].take(),
        });
        inner.buckets[index] = Some(entry);
        inner.size += 1;

        if inner.size >= inner.buckets.len() / 2 {
            inner.resize();
        }
        (id, true)
    }

    /// Live entry count (reclaimed entries leave on the next resize)
    pub fn size(&self) -> usize {
        match self.inner.lock() {
            Ok(inner) => inner.size,
            Err(poisoned) => poisoned.into_inner().size,
        }
    }

    /// Total ids ever assigned
    pub fn assigned(&self) -> u64 {
        match self.inner.lock() {
            Ok(inner) => (inner.next_id - 1) as u64,
            Err(poisoned) => (poisoned.into_inner().next_id - 1) as u64,
        }
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.inner.lock().unwrap().buckets.len()
    }
}

impl Default for ObjectIdMap {
    fn default() -> Self {
        Self::new()
    }
}

fn identity_hash(obj: &ObjRef) -> u64 {
    let addr = Arc::as_ptr(obj) as *const () as usize as u64;
    // Fibonacci hashing spreads consecutive allocation addresses
    addr.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn same_identity(a: &ObjRef, b: &ObjRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
