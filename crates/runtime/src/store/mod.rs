//! Narrow, typed surface over the shared key-value/document store.
//!
//! The adapter exposes hash, document, list, set, and string primitives,
//! order-preserving pipelined batches, and atomic scripts. No business
//! logic lives here; the combat manager composes these primitives and
//! registers its own script bodies.

mod memory;
mod path;

pub use memory::MemoryStore;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("wrong type at key {0}")]
    WrongType(String),

    #[error("invalid document path {0:?}")]
    BadPath(String),

    #[error("script {name} failed: {reason}")]
    Script { name: &'static str, reason: String },

    #[error("unexpected reply shape for {0}")]
    ReplyShape(&'static str),

    #[error("store backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One operation inside a pipelined batch.
#[derive(Clone, Debug)]
pub enum Op {
    GetHash(String),
    SetHashFields(String, HashMap<String, String>),
    HGetOne(String, String),
    HDel(String, Vec<String>),
    /// Dot path rooted at `$`; `$` alone addresses the whole document.
    JsonGet(String, String),
    JsonSet(String, String, Value),
    JsonDel(String, String),
    JsonArrPop(String, String, i64),
    JsonArrIndex(String, String, Value),
    ListPushRight(String, Vec<Value>),
    ListTrim(String, i64, i64),
    ListRange(String, i64, i64),
    ListLen(String),
    SetAdd(String, Vec<String>),
    SetMembers(String),
    SetRemove(String, Vec<String>),
    KeyExists(String),
    Expire(String, u64),
    Delete(Vec<String>),
}

/// Reply for one pipelined operation, in call order.
#[derive(Clone, Debug)]
pub enum Reply {
    Nil,
    Bool(bool),
    Int(i64),
    Hash(HashMap<String, String>),
    Value(Value),
    Values(Vec<Value>),
    Strings(Vec<String>),
}

impl Reply {
    pub fn into_hash(self) -> StoreResult<HashMap<String, String>> {
        match self {
            Reply::Hash(hash) => Ok(hash),
            Reply::Nil => Ok(HashMap::new()),
            _ => Err(StoreError::ReplyShape("hash")),
        }
    }

    pub fn into_value(self) -> StoreResult<Option<Value>> {
        match self {
            Reply::Value(value) => Ok(Some(value)),
            Reply::Nil => Ok(None),
            _ => Err(StoreError::ReplyShape("value")),
        }
    }

    pub fn into_values(self) -> StoreResult<Vec<Value>> {
        match self {
            Reply::Values(values) => Ok(values),
            Reply::Nil => Ok(vec![]),
            _ => Err(StoreError::ReplyShape("values")),
        }
    }

    pub fn into_int(self) -> StoreResult<i64> {
        match self {
            Reply::Int(n) => Ok(n),
            Reply::Bool(b) => Ok(b as i64),
            _ => Err(StoreError::ReplyShape("int")),
        }
    }

    pub fn into_bool(self) -> StoreResult<bool> {
        match self {
            Reply::Bool(b) => Ok(b),
            Reply::Int(n) => Ok(n != 0),
            _ => Err(StoreError::ReplyShape("bool")),
        }
    }

    pub fn into_strings(self) -> StoreResult<Vec<String>> {
        match self {
            Reply::Strings(strings) => Ok(strings),
            Reply::Nil => Ok(vec![]),
            _ => Err(StoreError::ReplyShape("strings")),
        }
    }
}

/// Synchronous primitives available inside an atomic script.
///
/// A script body runs with exclusive access to the store; nothing else
/// observes intermediate state.
pub trait ScriptCtx {
    fn json_get(&mut self, key: &str, path: &str) -> StoreResult<Option<Value>>;
    fn json_set(&mut self, key: &str, path: &str, value: Value) -> StoreResult<()>;
    fn json_del(&mut self, key: &str, path: &str) -> StoreResult<bool>;
    fn json_arr_pop(&mut self, key: &str, path: &str, index: i64) -> StoreResult<Option<Value>>;
    fn json_arr_index(&mut self, key: &str, path: &str, value: &Value) -> StoreResult<Option<i64>>;
    fn list_push_right(&mut self, key: &str, values: Vec<Value>) -> StoreResult<i64>;
    fn hash_get(&mut self, key: &str, field: &str) -> StoreResult<Option<String>>;
    fn hash_set(&mut self, key: &str, field: &str, value: String) -> StoreResult<()>;
    fn get_str(&mut self, key: &str) -> StoreResult<Option<String>>;
    fn set_str(&mut self, key: &str, value: String, ttl_secs: Option<u64>) -> StoreResult<()>;
    /// Set only if absent; returns whether the write happened.
    fn set_str_nx(&mut self, key: &str, value: String, ttl_secs: Option<u64>) -> StoreResult<bool>;
    fn delete(&mut self, key: &str) -> StoreResult<bool>;
    fn expire(&mut self, key: &str, ttl_secs: u64) -> StoreResult<bool>;
}

/// An atomic script: a name for diagnostics plus a body executed with
/// exclusive store access. The backend guarantees atomicity with respect
/// to concurrent clients.
#[derive(Clone, Copy)]
pub struct Script {
    pub name: &'static str,
    pub body: fn(&mut dyn ScriptCtx, &[String], &[Value]) -> StoreResult<Value>,
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script").field("name", &self.name).finish()
    }
}

/// The store adapter. Every call is cancellable; `exec` batches ops into
/// a single round trip and returns replies in call order.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Execute a pipelined batch in one round trip.
    async fn exec(&self, ops: Vec<Op>) -> StoreResult<Vec<Reply>>;

    /// Run an atomic script.
    async fn eval_script(&self, script: Script, keys: &[String], args: &[Value])
    -> StoreResult<Value>;

    // ------------------------------------------------------------------
    // Single-op conveniences, each one round trip.
    // ------------------------------------------------------------------

    async fn get_hash(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        one(self.exec(vec![Op::GetHash(key.into())]).await?)?.into_hash()
    }

    async fn set_hash_fields(
        &self,
        key: &str,
        fields: HashMap<String, String>,
    ) -> StoreResult<()> {
        self.exec(vec![Op::SetHashFields(key.into(), fields)]).await?;
        Ok(())
    }

    async fn hget_one(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        match one(self.exec(vec![Op::HGetOne(key.into(), field.into())]).await?)? {
            Reply::Value(Value::String(s)) => Ok(Some(s)),
            Reply::Nil => Ok(None),
            _ => Err(StoreError::ReplyShape("hget_one")),
        }
    }

    async fn hdel(&self, key: &str, fields: Vec<String>) -> StoreResult<i64> {
        one(self.exec(vec![Op::HDel(key.into(), fields)]).await?)?.into_int()
    }

    async fn json_get(&self, key: &str, path: &str) -> StoreResult<Option<Value>> {
        one(self.exec(vec![Op::JsonGet(key.into(), path.into())]).await?)?.into_value()
    }

    async fn json_set(&self, key: &str, path: &str, value: Value) -> StoreResult<()> {
        self.exec(vec![Op::JsonSet(key.into(), path.into(), value)])
            .await?;
        Ok(())
    }

    async fn json_arr_pop(&self, key: &str, path: &str, index: i64) -> StoreResult<Option<Value>> {
        one(self
            .exec(vec![Op::JsonArrPop(key.into(), path.into(), index)])
            .await?)?
        .into_value()
    }

    async fn json_arr_index(&self, key: &str, path: &str, value: Value) -> StoreResult<Option<i64>> {
        let n = one(self
            .exec(vec![Op::JsonArrIndex(key.into(), path.into(), value)])
            .await?)?
        .into_int()?;
        Ok((n >= 0).then_some(n))
    }

    async fn list_push_right(&self, key: &str, values: Vec<Value>) -> StoreResult<i64> {
        one(self.exec(vec![Op::ListPushRight(key.into(), values)]).await?)?.into_int()
    }

    async fn list_trim(&self, key: &str, start: i64, stop: i64) -> StoreResult<()> {
        self.exec(vec![Op::ListTrim(key.into(), start, stop)]).await?;
        Ok(())
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Value>> {
        one(self.exec(vec![Op::ListRange(key.into(), start, stop)]).await?)?.into_values()
    }

    async fn set_add(&self, key: &str, members: Vec<String>) -> StoreResult<()> {
        self.exec(vec![Op::SetAdd(key.into(), members)]).await?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        one(self.exec(vec![Op::SetMembers(key.into())]).await?)?.into_strings()
    }

    async fn set_remove(&self, key: &str, members: Vec<String>) -> StoreResult<()> {
        self.exec(vec![Op::SetRemove(key.into(), members)]).await?;
        Ok(())
    }

    async fn key_exists(&self, key: &str) -> StoreResult<bool> {
        one(self.exec(vec![Op::KeyExists(key.into())]).await?)?.into_bool()
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        one(self.exec(vec![Op::Expire(key.into(), ttl_secs)]).await?)?.into_bool()
    }

    async fn delete(&self, keys: Vec<String>) -> StoreResult<i64> {
        one(self.exec(vec![Op::Delete(keys)]).await?)?.into_int()
    }
}

fn one(mut replies: Vec<Reply>) -> StoreResult<Reply> {
    replies
        .pop()
        .ok_or(StoreError::ReplyShape("empty pipeline reply"))
}
