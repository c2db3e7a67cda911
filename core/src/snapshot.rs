use crate::index::InvertedIndex;
use parking_lot::RwLock;
use std::sync::Arc;

/// Publishes the current index snapshot to concurrent readers.
///
/// Readers take an `Arc` to the snapshot and query it without holding the
/// lock. Installing a rebuilt index swaps the pointer; readers still holding
/// the previous `Arc` finish against the old snapshot.
#[derive(Debug, Default)]
pub struct SnapshotHandle {
    current: RwLock<Arc<InvertedIndex>>,
}

impl SnapshotHandle {
    pub fn new(index: InvertedIndex) -> Self {
        Self { current: RwLock::new(Arc::new(index)) }
    }

    pub fn current(&self) -> Arc<InvertedIndex> {
        self.current.read().clone()
    }

    /// Replaces the published snapshot and returns the one it replaced.
    pub fn swap(&self, index: InvertedIndex) -> Arc<InvertedIndex> {
        let next = Arc::new(index);
        let (num_docs, num_terms) = (next.num_docs(), next.num_terms());
        let previous = std::mem::replace(&mut *self.current.write(), next);
        tracing::info!(num_docs, num_terms, previous_docs = previous.num_docs(), "swapped index snapshot");
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bm25Params, Document, Tokenizer};
    use std::thread;

    fn build(titles: &[&str]) -> InvertedIndex {
        let docs = titles
            .iter()
            .enumerate()
            .map(|(i, t)| Document::new(i as u32 + 1, *t, ""))
            .collect();
        InvertedIndex::build(docs, Tokenizer::default()).unwrap()
    }

    #[test]
    fn readers_keep_their_snapshot_across_a_swap() {
        let handle = SnapshotHandle::new(build(&["Brave Bear"]));
        let before = handle.current();
        let previous = handle.swap(build(&["Ocean Story", "Grizzly Tale"]));
        assert!(Arc::ptr_eq(&before, &previous));
        assert_eq!(before.num_docs(), 1);
        assert_eq!(handle.current().num_docs(), 2);
    }

    #[test]
    fn concurrent_queries_see_whole_snapshots() {
        let handle = Arc::new(SnapshotHandle::new(build(&["Brave Bear"])));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = Arc::clone(&handle);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let snapshot = handle.current();
                        let hits = snapshot.lexical_search("bear", 10, Bm25Params::default());
                        // one-doc snapshot or three-doc snapshot, never something in between
                        assert!(hits.len() == 1 || hits.len() == 3);
                    }
                })
            })
            .collect();
        for _ in 0..20 {
            handle.swap(build(&["Brave Bear", "Bear Island", "Ocean Story"]));
            handle.swap(build(&["Brave Bear"]));
        }
        for r in readers {
            r.join().unwrap();
        }
    }
}
