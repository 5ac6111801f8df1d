//! In-memory directory server used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dirkit_ldap::{
    Connector, DirectoryPath, DirectoryTransport, Modification, RawEntry, Reply, Result,
    ResultCode, SearchScope, TransportOptions, ALL_ATTRIBUTES, MATCH_ALL_FILTER, NO_ATTRIBUTES,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub const SUFFIX: &str = "dc=example,dc=com";

type Attributes = Vec<(String, Vec<String>)>;

#[derive(Debug, Default)]
struct State {
    /// Keyed by normalized path.
    entries: BTreeMap<String, (String, Attributes)>,
    /// Busy replies still to hand out before requests are served.
    busy_remaining: u32,
    post_read: bool,
    requests: Vec<String>,
}

/// Directory tree shared by every connection the connector opens.
#[derive(Debug, Clone)]
pub struct InMemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl InMemoryDirectory {
    /// Directory holding only the suffix entry.
    pub fn new() -> Self {
        let directory = Self {
            state: Arc::new(Mutex::new(State {
                post_read: true,
                ..State::default()
            })),
        };
        directory.seed(
            SUFFIX,
            &[("objectClass", &["top", "domain"]), ("dc", &["example"])],
        );
        directory
    }

    pub fn seed(&self, path: &str, attributes: &[(&str, &[&str])]) {
        let attributes = attributes
            .iter()
            .map(|(name, values)| {
                (
                    (*name).to_string(),
                    values.iter().map(|v| (*v).to_string()).collect(),
                )
            })
            .collect();
        self.lock()
            .entries
            .insert(normalize(path), (path.to_string(), attributes));
    }

    /// Answer the next `count` requests with busy.
    pub fn busy_for(&self, count: u32) {
        self.lock().busy_remaining = count;
    }

    /// Stop echoing written entries through the post-read control.
    pub fn without_post_read(&self) {
        self.lock().post_read = false;
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock().entries.contains_key(&normalize(path))
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Requests served so far, as `operation path`.
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Connector for InMemoryDirectory {
    async fn connect(
        &self,
        _uri: &str,
        _options: &TransportOptions,
    ) -> Result<Box<dyn DirectoryTransport>> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl DirectoryTransport for InMemoryDirectory {
    async fn simple_bind(&mut self, _identity: &str, _secret: &str) -> Result<Reply<()>> {
        Ok(Reply::success(()))
    }

    async fn search(
        &mut self,
        base: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Reply<Vec<RawEntry>>> {
        let mut state = self.lock();
        if let Some(reply) = busy(&mut state) {
            return Ok(reply);
        }
        state.requests.push(format!("search {base}"));

        let key = normalize(base);
        if !state.entries.contains_key(&key) {
            return Ok(Reply::status(ResultCode::NoSuchObject, "no such base"));
        }
        let base_depth = depth(&key);
        let entries = state
            .entries
            .iter()
            .filter(|(candidate, _)| match scope {
                SearchScope::Base => **candidate == key,
                SearchScope::OneLevel => {
                    is_below(candidate, &key) && depth(candidate) == base_depth + 1
                }
                SearchScope::Subtree => **candidate == key || is_below(candidate, &key),
            })
            .filter(|(_, (_, attrs))| matches_filter(filter, attrs))
            .map(|(_, (dn, attrs))| RawEntry {
                dn: dn.clone(),
                attrs: project(attrs, attributes),
                bin_attrs: Vec::new(),
            })
            .collect();
        Ok(Reply::success(entries))
    }

    async fn add(
        &mut self,
        path: &str,
        attributes: &[(String, Vec<Vec<u8>>)],
    ) -> Result<Reply<Option<RawEntry>>> {
        let mut state = self.lock();
        if let Some(reply) = busy(&mut state) {
            return Ok(reply);
        }
        state.requests.push(format!("add {path}"));

        let key = normalize(path);
        if state.entries.contains_key(&key) {
            return Ok(Reply::status(ResultCode::EntryAlreadyExists, "already exists"));
        }
        if let Some(parent) = parent_key(&key) {
            if !state.entries.contains_key(&parent) {
                return Ok(Reply::status(ResultCode::NoSuchObject, "parent missing"));
            }
        }
        let attrs: Attributes = attributes
            .iter()
            .map(|(name, values)| (name.clone(), values.iter().map(|v| text(v)).collect()))
            .collect();
        state
            .entries
            .insert(key, (path.to_string(), attrs.clone()));
        Ok(Reply::success(echo(&state, path, attrs)))
    }

    async fn modify(
        &mut self,
        path: &str,
        modifications: &[Modification],
    ) -> Result<Reply<Option<RawEntry>>> {
        let mut state = self.lock();
        if let Some(reply) = busy(&mut state) {
            return Ok(reply);
        }
        state.requests.push(format!("modify {path}"));

        let Some((_, attrs)) = state.entries.get_mut(&normalize(path)) else {
            return Ok(Reply::status(ResultCode::NoSuchObject, "no such entry"));
        };
        for modification in modifications {
            attrs.retain(|(name, _)| !name.eq_ignore_ascii_case(&modification.attribute));
            if !modification.values.is_empty() {
                attrs.push((
                    modification.attribute.clone(),
                    modification.values.iter().map(|v| text(v)).collect(),
                ));
            }
        }
        let attrs = attrs.clone();
        Ok(Reply::success(echo(&state, path, attrs)))
    }

    async fn delete(&mut self, path: &str) -> Result<Reply<()>> {
        let mut state = self.lock();
        if let Some(reply) = busy(&mut state) {
            return Ok(reply);
        }
        state.requests.push(format!("delete {path}"));

        let key = normalize(path);
        if !state.entries.contains_key(&key) {
            return Ok(Reply::status(ResultCode::NoSuchObject, "no such entry"));
        }
        if state.entries.keys().any(|candidate| is_below(candidate, &key)) {
            return Ok(Reply::status(ResultCode::NotAllowedOnNonLeaf, "has children"));
        }
        state.entries.remove(&key);
        Ok(Reply::success(()))
    }

    async fn rename(
        &mut self,
        path: &str,
        new_rdn: &str,
        new_parent: &str,
        _delete_old_rdn: bool,
    ) -> Result<Reply<()>> {
        let mut state = self.lock();
        if let Some(reply) = busy(&mut state) {
            return Ok(reply);
        }
        state.requests.push(format!("rename {path}"));

        let key = normalize(path);
        let parent = normalize(new_parent);
        let target_dn = format!("{new_rdn},{new_parent}");
        let target = normalize(&target_dn);
        if !state.entries.contains_key(&key) || !state.entries.contains_key(&parent) {
            return Ok(Reply::status(ResultCode::NoSuchObject, "no such entry"));
        }
        if state.entries.contains_key(&target) {
            return Ok(Reply::status(ResultCode::EntryAlreadyExists, "target exists"));
        }

        let root_len = state.entries[&key].0.len();
        let moved: Vec<String> = state
            .entries
            .keys()
            .filter(|candidate| **candidate == key || is_below(candidate, &key))
            .cloned()
            .collect();
        for old in moved {
            if let Some((dn, attrs)) = state.entries.remove(&old) {
                let new_dn = format!("{}{target_dn}", &dn[..dn.len() - root_len]);
                state.entries.insert(normalize(&new_dn), (new_dn, attrs));
            }
        }
        Ok(Reply::success(()))
    }

    async fn unbind(&mut self) -> Result<()> {
        Ok(())
    }
}

fn busy<T: Default>(state: &mut State) -> Option<Reply<T>> {
    if state.busy_remaining == 0 {
        return None;
    }
    state.busy_remaining -= 1;
    state.requests.push("busy".to_string());
    Some(Reply::status(ResultCode::Busy, "server busy"))
}

fn echo(state: &State, path: &str, attrs: Attributes) -> Option<RawEntry> {
    state.post_read.then(|| RawEntry {
        dn: path.to_string(),
        attrs,
        bin_attrs: Vec::new(),
    })
}

fn normalize(path: &str) -> String {
    DirectoryPath::parse(path)
        .map(|parsed| parsed.to_string().to_ascii_lowercase())
        .unwrap_or_else(|_| path.to_ascii_lowercase())
}

fn depth(key: &str) -> usize {
    key.split(',').count()
}

fn is_below(candidate: &str, ancestor: &str) -> bool {
    candidate.len() > ancestor.len() && candidate.ends_with(&format!(",{ancestor}"))
}

fn parent_key(key: &str) -> Option<String> {
    if key == SUFFIX {
        return None;
    }
    key.split_once(',').map(|(_, parent)| parent.to_string())
}

fn text(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

fn project(attrs: &Attributes, selection: &[String]) -> Attributes {
    if selection.iter().any(|name| name == NO_ATTRIBUTES) {
        return Vec::new();
    }
    if selection.is_empty() || selection.iter().any(|name| name == ALL_ATTRIBUTES) {
        return attrs.clone();
    }
    attrs
        .iter()
        .filter(|(name, _)| selection.iter().any(|s| s.eq_ignore_ascii_case(name)))
        .cloned()
        .collect()
}

/// Supports the match-all filter and a single `(attribute=value)` equality.
fn matches_filter(filter: &str, attrs: &Attributes) -> bool {
    if filter == MATCH_ALL_FILTER {
        return true;
    }
    let Some((attribute, value)) = filter
        .strip_prefix('(')
        .and_then(|f| f.strip_suffix(')'))
        .and_then(|f| f.split_once('='))
    else {
        return false;
    };
    attrs.iter().any(|(name, values)| {
        name.eq_ignore_ascii_case(attribute) && values.iter().any(|v| v == value)
    })
}
