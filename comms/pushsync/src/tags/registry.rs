// Copyright 2022, The Tari Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use log::*;

use crate::tags::{ChunkState, Tag, TagError, TagSnapshot};

const LOG_TARGET: &str = "comms::pushsync::tags";

/// Registry of named tags
#[derive(Default)]
pub struct Tags {
    tags: RwLock<HashMap<String, Arc<Tag>>>,
}

impl Tags {
    pub fn new() -> Self {
        Default::default()
    }

    /// Create and register a new tag. Fails if a tag with the same name exists.
    pub fn create(&self, name: &str, total: u64) -> Result<Arc<Tag>, TagError> {
        let mut tags = acquire_write_lock!(self.tags);
        if tags.contains_key(name) {
            return Err(TagError::AlreadyExists(name.to_string()));
        }
        let tag = Arc::new(Tag::new(new_uid(&tags), name, total));
        tags.insert(name.to_string(), tag.clone());
        debug!(
            target: LOG_TARGET,
            "Created tag '{}' (uid = {}, total = {})",
            name,
            tag.uid(),
            total
        );
        Ok(tag)
    }

    /// Register a tag restored from a snapshot
    pub fn restore(&self, snapshot: TagSnapshot) -> Result<Arc<Tag>, TagError> {
        let mut tags = acquire_write_lock!(self.tags);
        if tags.contains_key(&snapshot.name) {
            return Err(TagError::AlreadyExists(snapshot.name));
        }
        let name = snapshot.name.clone();
        let tag = Arc::new(Tag::from_snapshot(snapshot));
        tags.insert(name, tag.clone());
        Ok(tag)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Tag>> {
        acquire_read_lock!(self.tags).get(name).cloned()
    }

    pub fn get_by_uid(&self, uid: u32) -> Option<Arc<Tag>> {
        acquire_read_lock!(self.tags).values().find(|t| t.uid() == uid).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Tag>> {
        acquire_read_lock!(self.tags).values().cloned().collect()
    }

    /// Increment `state` on the named tag. Does nothing if the tag does not exist.
    pub fn inc(&self, name: &str, state: ChunkState) {
        match self.get(name) {
            Some(tag) => tag.inc(state),
            None => trace!(target: LOG_TARGET, "Ignoring {} for unknown tag '{}'", state, name),
        }
    }

    pub fn len(&self) -> usize {
        acquire_read_lock!(self.tags).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn new_uid(tags: &HashMap<String, Arc<Tag>>) -> u32 {
    loop {
        let uid = rand::random::<u32>();
        if tags.values().all(|t| t.uid() != uid) {
            return uid;
        }
    }
}

#[cfg(test)]
mod test {
    use std::{thread, time::Duration};

    use rand::{seq::SliceRandom, thread_rng};
    use tokio::time::Instant;

    use super::*;

    #[test]
    fn create_rejects_duplicate_names() {
        let tags = Tags::new();
        tags.create("a", 1).unwrap();
        let err = tags.create("a", 1).unwrap_err();
        assert!(matches!(err, TagError::AlreadyExists(name) if name == "a"));
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn lookups() {
        let tags = Tags::new();
        let a = tags.create("a", 1).unwrap();
        let b = tags.create("b", 2).unwrap();
        assert_ne!(a.uid(), b.uid());
        assert_eq!(tags.get("b").unwrap().total(), 2);
        assert_eq!(tags.get_by_uid(a.uid()).unwrap().name(), "a");
        assert!(tags.get("c").is_none());
        let mut names = tags.all().iter().map(|t| t.name().to_string()).collect::<Vec<_>>();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn inc_unknown_tag_is_noop() {
        let tags = Tags::new();
        tags.inc("missing", ChunkState::Synced);
        assert!(tags.is_empty());
    }

    #[test]
    fn restore_from_snapshot() {
        let tags = Tags::new();
        let tag = tags.create("a", 3).unwrap();
        tag.inc(ChunkState::Split);
        let snapshot = tag.snapshot();

        let other = Tags::new();
        let restored = other.restore(snapshot.clone()).unwrap();
        assert_eq!(restored.uid(), tag.uid());
        assert_eq!(restored.get(ChunkState::Split), 1);
        assert!(matches!(other.restore(snapshot), Err(TagError::AlreadyExists(_))));
    }

    #[test]
    fn concurrent_increments_on_many_tags() {
        let tags = Arc::new(Tags::new());
        let names = (0..10).map(|i| format!("tag-{}", i)).collect::<Vec<_>>();
        for name in &names {
            tags.create(name, 100).unwrap();
        }

        let states = [
            ChunkState::Split,
            ChunkState::Stored,
            ChunkState::Sent,
            ChunkState::Synced,
        ];
        let handles = (0..100)
            .map(|_| {
                let tags = tags.clone();
                let mut names = names.clone();
                thread::spawn(move || {
                    names.shuffle(&mut thread_rng());
                    for name in &names {
                        for state in states {
                            tags.inc(name, state);
                        }
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        for name in &names {
            let tag = tags.get(name).unwrap();
            for state in states {
                assert_eq!(tag.get(state), 100);
            }
            let mut signals = Vec::new();
            while let Some(state) = tag.try_next_completion() {
                signals.push(state);
            }
            assert_eq!(signals.iter().filter(|s| **s == ChunkState::Synced).count(), 1);
            assert_eq!(signals.len(), states.len());
        }
    }

    #[test]
    fn counters_stay_ordered_when_incremented_in_pipeline_order() {
        let tags = Arc::new(Tags::new());
        let tag = tags.create("t", 50).unwrap();
        let observer = {
            let tag = tag.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    // Read in reverse pipeline order so that each read is no older than the next one
                    let synced = tag.get(ChunkState::Synced);
                    let sent = tag.get(ChunkState::Sent);
                    let stored = tag.get(ChunkState::Stored);
                    let split = tag.get(ChunkState::Split);
                    assert!(split >= stored && stored >= sent && sent >= synced);
                    assert!(synced <= tag.total());
                }
            })
        };
        let workers = (0..5)
            .map(|_| {
                let tag = tag.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        tag.inc(ChunkState::Split);
                        tag.inc(ChunkState::Stored);
                        tag.inc(ChunkState::Sent);
                        tag.inc(ChunkState::Synced);
                    }
                })
            })
            .collect::<Vec<_>>();
        for worker in workers {
            worker.join().unwrap();
        }
        observer.join().unwrap();
        assert!(tag.done_syncing());
    }

    #[tokio::test]
    async fn wait_until_synced_across_tasks() {
        let tags = Arc::new(Tags::new());
        let tag = tags.create("t", 10).unwrap();
        let incrementer = {
            let tags = tags.clone();
            tokio::spawn(async move {
                for _ in 0..10 {
                    tags.inc("t", ChunkState::Synced);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
        };
        tag.wait_until(ChunkState::Synced, Instant::now() + Duration::from_secs(5))
            .await
            .unwrap();
        incrementer.await.unwrap();
        assert_eq!(tag.get(ChunkState::Synced), 10);
    }
}
