//! In-memory file share used by the engine tests. Names are case-insensitive
//! and every mutation is recorded so tests can check ordering and counts.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sharemirror_core::{DirectoryEntry, ReadToken, ShareError, StatusCode, normalize_path};
use time::OffsetDateTime;
use url::Url;

use super::backend::{FileShare, ReadTokenIssuer};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File { size: u64, content: String },
}

#[derive(Debug, Clone)]
struct Item {
    path: String,
    node: Node,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryStats {
    pub directories_created: usize,
    pub copies: usize,
    pub file_deletes: usize,
    pub directory_deletes: usize,
    pub tokens_issued: usize,
    pub peak_copies_in_flight: usize,
}

#[derive(Debug, Default)]
struct State {
    root_exists: bool,
    items: BTreeMap<String, Item>,
    events: Vec<String>,
    stats: MemoryStats,
    token_expiries: Vec<OffsetDateTime>,
    failing_copies: HashSet<String>,
    failing_listings: HashSet<String>,
}

#[derive(Debug)]
pub struct MemoryShare {
    state: Mutex<State>,
    copy_source: Option<Arc<MemoryShare>>,
    copy_delay: Option<Duration>,
    issues_tokens: bool,
    copies_in_flight: AtomicUsize,
}

impl MemoryShare {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                root_exists: true,
                ..State::default()
            }),
            copy_source: None,
            copy_delay: None,
            issues_tokens: true,
            copies_in_flight: AtomicUsize::new(0),
        }
    }

    /// A share whose copies pull file data out of `source`.
    pub fn copying_from(mut self, source: &Arc<MemoryShare>) -> Self {
        self.copy_source = Some(Arc::clone(source));
        self
    }

    pub fn without_root(self) -> Self {
        self.state.lock().unwrap().root_exists = false;
        self
    }

    pub fn without_tokens(mut self) -> Self {
        self.issues_tokens = false;
        self
    }

    pub fn with_copy_delay(mut self, delay: Duration) -> Self {
        self.copy_delay = Some(delay);
        self
    }

    pub fn with_dir(self, path: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            insert_with_parents(&mut state, path, Node::Dir);
        }
        self
    }

    pub fn with_file(self, path: &str, size: u64) -> Self {
        self.with_content(path, size, &format!("{size} bytes"))
    }

    pub fn with_content(self, path: &str, size: u64, content: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            insert_with_parents(
                &mut state,
                path,
                Node::File {
                    size,
                    content: content.to_string(),
                },
            );
        }
        self
    }

    pub fn failing_copy(self, path: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_copies
            .insert(key(path));
        self
    }

    pub fn failing_listing(self, path: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_listings
            .insert(key(path));
        self
    }

    /// Every entry's path as stored, sorted case-insensitively.
    pub fn paths(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.items.values().map(|item| item.path.clone()).collect()
    }

    /// Case-folded path set, for comparing two trees.
    pub fn path_set(&self) -> BTreeSet<String> {
        self.state.lock().unwrap().items.keys().cloned().collect()
    }

    pub fn content_of(&self, path: &str) -> Option<String> {
        match self.state.lock().unwrap().items.get(&key(path)) {
            Some(Item {
                node: Node::File { content, .. },
                ..
            }) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn stats(&self) -> MemoryStats {
        self.state.lock().unwrap().stats
    }

    pub fn token_expiries(&self) -> Vec<OffsetDateTime> {
        self.state.lock().unwrap().token_expiries.clone()
    }

    pub fn clear_events(&self) {
        let mut state = self.state.lock().unwrap();
        state.events.clear();
        state.stats = MemoryStats::default();
    }

    fn file(&self, path: &str) -> Option<(u64, String)> {
        match self.state.lock().unwrap().items.get(&key(path)) {
            Some(Item {
                node: Node::File { size, content },
                ..
            }) => Some((*size, content.clone())),
            _ => None,
        }
    }

    fn finish_copy(&self, path: &str, source_url: &Url) -> Result<(), ShareError> {
        let path = normalize_path(path);
        let item_key = key(&path);
        let mut state = self.state.lock().unwrap();
        if state.failing_copies.contains(&item_key) {
            return Err(api_error(500, "injected copy failure"));
        }
        if !dir_exists(&state, parent_key(&item_key)) {
            return Err(api_error(404, "ParentNotFound"));
        }
        if !source_url.query_pairs().any(|(name, _)| name == "sig") {
            return Err(api_error(403, "AuthenticationFailed"));
        }
        if matches!(state.items.get(&item_key), Some(Item { node: Node::Dir, .. })) {
            return Err(api_error(409, "ResourceTypeMismatch"));
        }
        let source_path = source_url
            .path_segments()
            .map(|segments| segments.skip(1).collect::<Vec<_>>().join("/"))
            .unwrap_or_default();
        let (size, content) = self
            .copy_source
            .as_ref()
            .and_then(|source| source.file(&source_path))
            .ok_or_else(|| api_error(404, "CannotVerifyCopySource"))?;

        state.items.insert(
            item_key,
            Item {
                path: path.clone(),
                node: Node::File { size, content },
            },
        );
        state.events.push(format!("copy {path}"));
        state.stats.copies += 1;
        Ok(())
    }
}

#[async_trait]
impl FileShare for MemoryShare {
    async fn directory_exists(&self, path: &str) -> Result<bool, ShareError> {
        Ok(dir_exists(&self.state.lock().unwrap(), &key(path)))
    }

    async fn create_directory_if_not_exists(&self, path: &str) -> Result<bool, ShareError> {
        let path = normalize_path(path);
        let item_key = key(&path);
        let mut state = self.state.lock().unwrap();
        if item_key.is_empty() {
            let created = !state.root_exists;
            state.root_exists = true;
            return Ok(created);
        }
        match state.items.get(&item_key) {
            Some(Item { node: Node::Dir, .. }) => return Ok(false),
            Some(_) => return Err(api_error(409, "ResourceTypeMismatch")),
            None => {}
        }
        if !dir_exists(&state, parent_key(&item_key)) {
            return Err(api_error(404, "ParentNotFound"));
        }
        state.items.insert(
            item_key,
            Item {
                path: path.clone(),
                node: Node::Dir,
            },
        );
        state.events.push(format!("mkdir {path}"));
        state.stats.directories_created += 1;
        Ok(true)
    }

    async fn list_entries(&self, path: &str) -> Result<Option<Vec<DirectoryEntry>>, ShareError> {
        let dir_key = key(path);
        let state = self.state.lock().unwrap();
        if state.failing_listings.contains(&dir_key) {
            return Err(api_error(503, "injected listing failure"));
        }
        if !dir_exists(&state, &dir_key) {
            return Ok(None);
        }
        let entries = state
            .items
            .iter()
            .filter(|(item_key, _)| parent_key(item_key) == dir_key)
            .map(|(_, item)| DirectoryEntry {
                name: item
                    .path
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string(),
                is_directory: matches!(item.node, Node::Dir),
                size: match item.node {
                    Node::File { size, .. } => Some(size),
                    Node::Dir => None,
                },
            })
            .collect();
        Ok(Some(entries))
    }

    async fn file_size(&self, path: &str) -> Result<Option<u64>, ShareError> {
        Ok(self.file(path).map(|(size, _)| size))
    }

    async fn delete_file_if_exists(&self, path: &str) -> Result<bool, ShareError> {
        let item_key = key(path);
        let mut state = self.state.lock().unwrap();
        let is_file = matches!(
            state.items.get(&item_key),
            Some(Item {
                node: Node::File { .. },
                ..
            })
        );
        if !is_file {
            return Ok(false);
        }
        let item = state.items.remove(&item_key).expect("checked above");
        state.events.push(format!("rm {}", item.path));
        state.stats.file_deletes += 1;
        Ok(true)
    }

    async fn delete_directory_if_exists(&self, path: &str) -> Result<bool, ShareError> {
        let item_key = key(path);
        let mut state = self.state.lock().unwrap();
        if item_key.is_empty() {
            return Err(api_error(400, "share root cannot be deleted"));
        }
        if !dir_exists(&state, &item_key) {
            return Ok(false);
        }
        if state.items.keys().any(|other| parent_key(other) == item_key) {
            return Err(api_error(409, "DirectoryNotEmpty"));
        }
        let item = state.items.remove(&item_key).expect("checked above");
        state.events.push(format!("rmdir {}", item.path));
        state.stats.directory_deletes += 1;
        Ok(true)
    }

    async fn start_copy(&self, path: &str, source_url: &Url) -> Result<(), ShareError> {
        let in_flight = self.copies_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.lock().unwrap();
            state.stats.peak_copies_in_flight = state.stats.peak_copies_in_flight.max(in_flight);
        }
        if let Some(delay) = self.copy_delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.finish_copy(path, source_url);
        self.copies_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn file_url(&self, path: &str) -> Result<Url, ShareError> {
        let mut url = Url::parse("https://memory.test/share")?;
        url.path_segments_mut()
            .expect("http urls have path segments")
            .extend(normalize_path(path).split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }
}

#[async_trait]
impl ReadTokenIssuer for MemoryShare {
    fn can_issue_read_tokens(&self) -> bool {
        self.issues_tokens
    }

    async fn issue_read_token(
        &self,
        path: &str,
        expires_at: OffsetDateTime,
    ) -> Result<ReadToken, ShareError> {
        if !self.issues_tokens {
            return Err(ShareError::TokensUnavailable("memory".into()));
        }
        let mut state = self.state.lock().unwrap();
        state.stats.tokens_issued += 1;
        state.token_expiries.push(expires_at);
        Ok(ReadToken {
            query: format!("sp=r&sr={}&sig=memory", normalize_path(path)),
            expires_at,
        })
    }
}

fn key(path: &str) -> String {
    normalize_path(path).to_lowercase()
}

fn parent_key(item_key: &str) -> &str {
    item_key
        .rsplit_once('/')
        .map(|(parent, _)| parent)
        .unwrap_or("")
}

fn dir_exists(state: &State, dir_key: &str) -> bool {
    if dir_key.is_empty() {
        return state.root_exists;
    }
    matches!(state.items.get(dir_key), Some(Item { node: Node::Dir, .. }))
}

fn insert_with_parents(state: &mut State, path: &str, node: Node) {
    let path = normalize_path(path);
    let segments: Vec<&str> = path.split('/').collect();
    for depth in 1..segments.len() {
        let parent = segments[..depth].join("/");
        state.items.entry(key(&parent)).or_insert(Item {
            path: parent,
            node: Node::Dir,
        });
    }
    state.items.insert(key(&path), Item { path, node });
}

fn api_error(code: u16, body: &str) -> ShareError {
    ShareError::Api {
        status: StatusCode::from_u16(code).expect("valid status code"),
        body: body.to_string(),
    }
}
