//! In-process store implementation for tests and single-node runs.
//!
//! Pipelined batches execute under one lock acquisition, so a batch is a
//! single round trip and atomic with respect to other clients — the same
//! contract the networked backend provides. TTLs expire lazily on access.
//! A round-trip counter supports instrumented tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::clock::{Clock, SystemClock};

use super::path;
use super::{KvStore, Op, Reply, Script, ScriptCtx, StoreError, StoreResult};

#[derive(Clone, Debug)]
enum Entry {
    Hash(HashMap<String, String>),
    Doc(Value),
    List(Vec<Value>),
    Set(BTreeSet<String>),
    Str(String),
}

#[derive(Clone, Debug)]
struct Record {
    entry: Entry,
    expires_at: Option<f64>,
}

/// Shared in-memory store.
pub struct MemoryStore {
    state: Mutex<HashMap<String, Record>>,
    clock: Arc<dyn Clock>,
    round_trips: AtomicU64,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            clock,
            round_trips: AtomicU64::new(0),
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Round trips served so far (one per `exec` or script).
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<String, Record>>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".into()))
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn exec(&self, ops: Vec<Op>) -> StoreResult<Vec<Reply>> {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut state = self.lock()?;
        ops.into_iter()
            .map(|op| apply_op(&mut state, now, op))
            .collect()
    }

    async fn eval_script(
        &self,
        script: Script,
        keys: &[String],
        args: &[Value],
    ) -> StoreResult<Value> {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut state = self.lock()?;
        let mut ctx = MemCtx {
            state: &mut state,
            now,
        };
        (script.body)(&mut ctx, keys, args)
    }
}

/// Fetch a live record, dropping it if its TTL elapsed.
fn live<'a>(
    state: &'a mut HashMap<String, Record>,
    key: &str,
    now: f64,
) -> Option<&'a mut Record> {
    let expired = state
        .get(key)
        .and_then(|record| record.expires_at)
        .is_some_and(|at| at <= now);
    if expired {
        state.remove(key);
        return None;
    }
    state.get_mut(key)
}

/// Fetch-or-create a live record with the given default entry shape.
fn ensure<'a>(
    state: &'a mut HashMap<String, Record>,
    key: &str,
    now: f64,
    default: impl FnOnce() -> Entry,
) -> &'a mut Record {
    let expired = state
        .get(key)
        .and_then(|record| record.expires_at)
        .is_some_and(|at| at <= now);
    if expired {
        state.remove(key);
    }
    state.entry(key.to_string()).or_insert_with(|| Record {
        entry: default(),
        expires_at: None,
    })
}

fn normalize_range(len: usize, start: i64, stop: i64) -> (usize, usize) {
    let len = len as i64;
    let norm = |idx: i64| -> i64 {
        if idx < 0 { (len + idx).max(0) } else { idx.min(len) }
    };
    let start = norm(start);
    // Stop is inclusive; +1 converts to an exclusive bound.
    let stop = (norm(stop) + 1).min(len);
    if start >= stop {
        (0, 0)
    } else {
        (start as usize, stop as usize)
    }
}

fn apply_op(state: &mut HashMap<String, Record>, now: f64, op: Op) -> StoreResult<Reply> {
    match op {
        Op::GetHash(key) => match live(state, &key, now) {
            Some(Record {
                entry: Entry::Hash(hash),
                ..
            }) => Ok(Reply::Hash(hash.clone())),
            Some(_) => Err(StoreError::WrongType(key)),
            None => Ok(Reply::Nil),
        },
        Op::SetHashFields(key, fields) => {
            let record = ensure(state, &key, now, || Entry::Hash(HashMap::new()));
            match &mut record.entry {
                Entry::Hash(hash) => {
                    hash.extend(fields);
                    Ok(Reply::Nil)
                }
                _ => Err(StoreError::WrongType(key)),
            }
        }
        Op::HGetOne(key, field) => match live(state, &key, now) {
            Some(Record {
                entry: Entry::Hash(hash),
                ..
            }) => Ok(hash
                .get(&field)
                .map(|value| Reply::Value(Value::String(value.clone())))
                .unwrap_or(Reply::Nil)),
            Some(_) => Err(StoreError::WrongType(key)),
            None => Ok(Reply::Nil),
        },
        Op::HDel(key, fields) => match live(state, &key, now) {
            Some(Record {
                entry: Entry::Hash(hash),
                ..
            }) => {
                let removed = fields.iter().filter(|f| hash.remove(*f).is_some()).count();
                Ok(Reply::Int(removed as i64))
            }
            Some(_) => Err(StoreError::WrongType(key)),
            None => Ok(Reply::Int(0)),
        },
        Op::JsonGet(key, json_path) => match live(state, &key, now) {
            Some(Record {
                entry: Entry::Doc(doc),
                ..
            }) => Ok(path::resolve(doc, &json_path)?
                .cloned()
                .map(Reply::Value)
                .unwrap_or(Reply::Nil)),
            Some(_) => Err(StoreError::WrongType(key)),
            None => Ok(Reply::Nil),
        },
        Op::JsonSet(key, json_path, value) => {
            let record = ensure(state, &key, now, || {
                Entry::Doc(Value::Object(serde_json::Map::new()))
            });
            match &mut record.entry {
                Entry::Doc(doc) => {
                    path::set(doc, &json_path, value)?;
                    Ok(Reply::Nil)
                }
                _ => Err(StoreError::WrongType(key)),
            }
        }
        Op::JsonDel(key, json_path) => match live(state, &key, now) {
            Some(Record {
                entry: Entry::Doc(doc),
                ..
            }) => Ok(Reply::Bool(path::del(doc, &json_path)?)),
            Some(_) => Err(StoreError::WrongType(key)),
            None => Ok(Reply::Bool(false)),
        },
        Op::JsonArrPop(key, json_path, index) => match live(state, &key, now) {
            Some(Record {
                entry: Entry::Doc(doc),
                ..
            }) => {
                let Some(node) = resolve_mut(doc, &json_path)? else {
                    return Ok(Reply::Nil);
                };
                let Some(array) = node.as_array_mut() else {
                    return Ok(Reply::Nil);
                };
                if array.is_empty() {
                    return Ok(Reply::Nil);
                }
                let len = array.len() as i64;
                let idx = if index < 0 { len + index } else { index };
                if idx < 0 || idx >= len {
                    return Ok(Reply::Nil);
                }
                Ok(Reply::Value(array.remove(idx as usize)))
            }
            Some(_) => Err(StoreError::WrongType(key)),
            None => Ok(Reply::Nil),
        },
        Op::JsonArrIndex(key, json_path, needle) => match live(state, &key, now) {
            Some(Record {
                entry: Entry::Doc(doc),
                ..
            }) => {
                let found = path::resolve(doc, &json_path)?
                    .and_then(Value::as_array)
                    .and_then(|array| array.iter().position(|item| *item == needle));
                Ok(Reply::Int(found.map(|i| i as i64).unwrap_or(-1)))
            }
            Some(_) => Err(StoreError::WrongType(key)),
            None => Ok(Reply::Int(-1)),
        },
        Op::ListPushRight(key, values) => {
            let record = ensure(state, &key, now, || Entry::List(Vec::new()));
            match &mut record.entry {
                Entry::List(list) => {
                    list.extend(values);
                    Ok(Reply::Int(list.len() as i64))
                }
                _ => Err(StoreError::WrongType(key)),
            }
        }
        Op::ListTrim(key, start, stop) => {
            if let Some(Record {
                entry: Entry::List(list),
                ..
            }) = live(state, &key, now)
            {
                let (from, to) = normalize_range(list.len(), start, stop);
                *list = list[from..to].to_vec();
            }
            Ok(Reply::Nil)
        }
        Op::ListRange(key, start, stop) => match live(state, &key, now) {
            Some(Record {
                entry: Entry::List(list),
                ..
            }) => {
                let (from, to) = normalize_range(list.len(), start, stop);
                Ok(Reply::Values(list[from..to].to_vec()))
            }
            Some(_) => Err(StoreError::WrongType(key)),
            None => Ok(Reply::Nil),
        },
        Op::ListLen(key) => match live(state, &key, now) {
            Some(Record {
                entry: Entry::List(list),
                ..
            }) => Ok(Reply::Int(list.len() as i64)),
            Some(_) => Err(StoreError::WrongType(key)),
            None => Ok(Reply::Int(0)),
        },
        Op::SetAdd(key, members) => {
            let record = ensure(state, &key, now, || Entry::Set(BTreeSet::new()));
            match &mut record.entry {
                Entry::Set(set) => {
                    set.extend(members);
                    Ok(Reply::Nil)
                }
                _ => Err(StoreError::WrongType(key)),
            }
        }
        Op::SetMembers(key) => match live(state, &key, now) {
            Some(Record {
                entry: Entry::Set(set),
                ..
            }) => Ok(Reply::Strings(set.iter().cloned().collect())),
            Some(_) => Err(StoreError::WrongType(key)),
            None => Ok(Reply::Nil),
        },
        Op::SetRemove(key, members) => {
            if let Some(Record {
                entry: Entry::Set(set),
                ..
            }) = live(state, &key, now)
            {
                for member in &members {
                    set.remove(member);
                }
            }
            Ok(Reply::Nil)
        }
        Op::KeyExists(key) => Ok(Reply::Bool(live(state, &key, now).is_some())),
        Op::Expire(key, ttl) => match live(state, &key, now) {
            Some(record) => {
                record.expires_at = Some(now + ttl as f64);
                Ok(Reply::Bool(true))
            }
            None => Ok(Reply::Bool(false)),
        },
        Op::Delete(keys) => {
            let removed = keys.iter().filter(|key| state.remove(*key).is_some()).count();
            Ok(Reply::Int(removed as i64))
        }
    }
}

/// Mutable counterpart of [`path::resolve`]; never creates nodes.
fn resolve_mut<'a>(doc: &'a mut Value, json_path: &str) -> StoreResult<Option<&'a mut Value>> {
    let mut current = doc;
    for segment in path::segments(json_path)? {
        match current.get_mut(segment) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

struct MemCtx<'a> {
    state: &'a mut HashMap<String, Record>,
    now: f64,
}

impl ScriptCtx for MemCtx<'_> {
    fn json_get(&mut self, key: &str, json_path: &str) -> StoreResult<Option<Value>> {
        apply_op(self.state, self.now, Op::JsonGet(key.into(), json_path.into()))?.into_value()
    }

    fn json_set(&mut self, key: &str, json_path: &str, value: Value) -> StoreResult<()> {
        apply_op(
            self.state,
            self.now,
            Op::JsonSet(key.into(), json_path.into(), value),
        )?;
        Ok(())
    }

    fn json_del(&mut self, key: &str, json_path: &str) -> StoreResult<bool> {
        apply_op(self.state, self.now, Op::JsonDel(key.into(), json_path.into()))?.into_bool()
    }

    fn json_arr_pop(&mut self, key: &str, json_path: &str, index: i64) -> StoreResult<Option<Value>> {
        apply_op(
            self.state,
            self.now,
            Op::JsonArrPop(key.into(), json_path.into(), index),
        )?
        .into_value()
    }

    fn json_arr_index(
        &mut self,
        key: &str,
        json_path: &str,
        value: &Value,
    ) -> StoreResult<Option<i64>> {
        let n = apply_op(
            self.state,
            self.now,
            Op::JsonArrIndex(key.into(), json_path.into(), value.clone()),
        )?
        .into_int()?;
        Ok((n >= 0).then_some(n))
    }

    fn list_push_right(&mut self, key: &str, values: Vec<Value>) -> StoreResult<i64> {
        apply_op(self.state, self.now, Op::ListPushRight(key.into(), values))?.into_int()
    }

    fn hash_get(&mut self, key: &str, field: &str) -> StoreResult<Option<String>> {
        match apply_op(self.state, self.now, Op::HGetOne(key.into(), field.into()))? {
            Reply::Value(Value::String(s)) => Ok(Some(s)),
            _ => Ok(None),
        }
    }

    fn hash_set(&mut self, key: &str, field: &str, value: String) -> StoreResult<()> {
        apply_op(
            self.state,
            self.now,
            Op::SetHashFields(key.into(), HashMap::from([(field.to_string(), value)])),
        )?;
        Ok(())
    }

    fn get_str(&mut self, key: &str) -> StoreResult<Option<String>> {
        match live(self.state, key, self.now) {
            Some(Record {
                entry: Entry::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    fn set_str(&mut self, key: &str, value: String, ttl_secs: Option<u64>) -> StoreResult<()> {
        self.state.insert(
            key.to_string(),
            Record {
                entry: Entry::Str(value),
                expires_at: ttl_secs.map(|ttl| self.now + ttl as f64),
            },
        );
        Ok(())
    }

    fn set_str_nx(&mut self, key: &str, value: String, ttl_secs: Option<u64>) -> StoreResult<bool> {
        if live(self.state, key, self.now).is_some() {
            return Ok(false);
        }
        self.set_str(key, value, ttl_secs)?;
        Ok(true)
    }

    fn delete(&mut self, key: &str) -> StoreResult<bool> {
        Ok(self.state.remove(key).is_some())
    }

    fn expire(&mut self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        apply_op(self.state, self.now, Op::Expire(key.into(), ttl_secs))?.into_bool()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::clock::ManualClock;

    use super::*;

    fn store_with_clock() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(1000.0));
        (MemoryStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn pipeline_is_one_round_trip_in_call_order() {
        let (store, _clock) = store_with_clock();
        let replies = store
            .exec(vec![
                Op::JsonSet("doc".into(), "$.a".into(), json!(1)),
                Op::JsonGet("doc".into(), "$.a".into()),
                Op::ListPushRight("list".into(), vec![json!("x"), json!("y")]),
                Op::ListRange("list".into(), 0, -1),
            ])
            .await
            .unwrap();
        assert_eq!(store.round_trips(), 1);
        assert_eq!(replies.len(), 4);
        assert!(matches!(&replies[1], Reply::Value(v) if *v == json!(1)));
        assert!(matches!(&replies[3], Reply::Values(v) if v.len() == 2));
    }

    #[tokio::test]
    async fn ttl_expires_lazily() {
        let (store, clock) = store_with_clock();
        store
            .json_set("doc", "$.a", json!(1))
            .await
            .unwrap();
        store.expire("doc", 30).await.unwrap();
        assert!(store.key_exists("doc").await.unwrap());

        clock.advance(31.0);
        assert!(!store.key_exists("doc").await.unwrap());
        assert_eq!(store.json_get("doc", "$.a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn arr_pop_on_empty_is_nil_not_error() {
        let (store, _clock) = store_with_clock();
        store
            .json_set("doc", "$.list", json!([]))
            .await
            .unwrap();
        assert_eq!(store.json_arr_pop("doc", "$.list", -1).await.unwrap(), None);

        store
            .json_set("doc", "$.list", json!([1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(
            store.json_arr_pop("doc", "$.list", 1).await.unwrap(),
            Some(json!(2))
        );
        assert_eq!(
            store.json_get("doc", "$.list").await.unwrap(),
            Some(json!([1, 3]))
        );
    }

    #[tokio::test]
    async fn arr_index_finds_values() {
        let (store, _clock) = store_with_clock();
        store
            .json_set("doc", "$.list", json!([5, 6, 7]))
            .await
            .unwrap();
        assert_eq!(
            store.json_arr_index("doc", "$.list", json!(6)).await.unwrap(),
            Some(1)
        );
        assert_eq!(
            store.json_arr_index("doc", "$.list", json!(9)).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn list_trim_keeps_inclusive_range() {
        let (store, _clock) = store_with_clock();
        store
            .list_push_right("q", (0..5).map(|n| json!(n)).collect())
            .await
            .unwrap();
        // Drop the first two processed entries.
        store.list_trim("q", 2, -1).await.unwrap();
        let rest = store.list_range("q", 0, -1).await.unwrap();
        assert_eq!(rest, vec![json!(2), json!(3), json!(4)]);
    }

    #[tokio::test]
    async fn scripts_run_atomically_against_ctx() {
        let (store, _clock) = store_with_clock();
        store
            .json_set("targets", "$.1", json!([2, 3]))
            .await
            .unwrap();

        fn pop_script(
            ctx: &mut dyn ScriptCtx,
            keys: &[String],
            args: &[Value],
        ) -> StoreResult<Value> {
            let found = ctx.json_arr_index(&keys[0], "$.1", &args[0])?;
            match found {
                Some(idx) => {
                    ctx.json_arr_pop(&keys[0], "$.1", idx)?;
                    Ok(json!(1))
                }
                None => Ok(json!(0)),
            }
        }
        let script = Script {
            name: "pop_target",
            body: pop_script,
        };

        let hit = store
            .eval_script(script, &["targets".to_string()], &[json!(3)])
            .await
            .unwrap();
        assert_eq!(hit, json!(1));
        let miss = store
            .eval_script(script, &["targets".to_string()], &[json!(3)])
            .await
            .unwrap();
        assert_eq!(miss, json!(0));
        assert_eq!(
            store.json_get("targets", "$.1").await.unwrap(),
            Some(json!([2]))
        );
    }

    #[tokio::test]
    async fn wrong_type_access_errors() {
        let (store, _clock) = store_with_clock();
        store.list_push_right("q", vec![json!(1)]).await.unwrap();
        assert!(store.get_hash("q").await.is_err());
    }
}
