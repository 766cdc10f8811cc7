//! Atomic script bodies registered by the combat manager.
//!
//! Each body runs with exclusive store access (the backend's atomicity
//! guarantee); the manager wraps them with typed entry points. Scripts
//! stay generic over keys and args so no session layout leaks into the
//! store adapter.

use serde_json::{Value, json};

use crate::store::{Script, ScriptCtx, StoreError, StoreResult};

/// Worker lock TTL; a crashed worker frees the session automatically.
pub const WORKER_LOCK_TTL_SECS: u64 = 60;

/// Soft-reservation TTL taken by the collector scheduler.
pub const BUSY_PENDING_TTL_SECS: u64 = 30;

pub const REGISTER_EXCHANGE_MOVE: Script = Script {
    name: "register_exchange_move",
    body: register_exchange_move,
};

pub const REGISTER_MOVES_BATCH: Script = Script {
    name: "register_moves_batch",
    body: register_moves_batch,
};

pub const TRANSFER_INTENTS: Script = Script {
    name: "transfer_intents",
    body: transfer_intents,
};

pub const CHECK_AND_LOCK_BUSY: Script = Script {
    name: "check_and_lock_busy",
    body: check_and_lock_busy,
};

pub const ACQUIRE_WORKER_LOCK: Script = Script {
    name: "acquire_worker_lock",
    body: acquire_worker_lock,
};

pub const CHECK_WORKER_LOCK: Script = Script {
    name: "check_worker_lock",
    body: check_worker_lock,
};

pub const RELEASE_WORKER_LOCK: Script = Script {
    name: "release_worker_lock",
    body: release_worker_lock,
};

pub const HOT_JOIN_PATCH: Script = Script {
    name: "hot_join_patch",
    body: hot_join_patch,
};

fn arg<'a>(args: &'a [Value], index: usize, script: &'static str) -> StoreResult<&'a Value> {
    args.get(index).ok_or(StoreError::Script {
        name: script,
        reason: format!("missing arg {index}"),
    })
}

fn key<'a>(keys: &'a [String], index: usize, script: &'static str) -> StoreResult<&'a str> {
    keys.get(index).map(String::as_str).ok_or(StoreError::Script {
        name: script,
        reason: format!("missing key {index}"),
    })
}

/// keys: `[targets_key, moves_key]`
/// args: `[actor_id, target_id, move_id, move_doc]`
///
/// Verifies the target is still in the actor's list, pops it by index,
/// and inserts the move at `$.exchange.{move_id}`. Returns 1 on success,
/// 0 when the target is gone (stale — the caller must not write).
fn register_exchange_move(
    ctx: &mut dyn ScriptCtx,
    keys: &[String],
    args: &[Value],
) -> StoreResult<Value> {
    const NAME: &str = "register_exchange_move";
    let targets_key = key(keys, 0, NAME)?;
    let moves_key = key(keys, 1, NAME)?;
    let actor_id = arg(args, 0, NAME)?;
    let target_id = arg(args, 1, NAME)?;
    let move_id = arg(args, 2, NAME)?.as_str().unwrap_or_default().to_string();
    let move_doc = arg(args, 3, NAME)?.clone();

    let list_path = format!("$.{actor_id}");
    let Some(index) = ctx.json_arr_index(targets_key, &list_path, target_id)? else {
        return Ok(json!(0));
    };
    ctx.json_arr_pop(targets_key, &list_path, index)?;
    ctx.json_set(moves_key, &format!("$.exchange.{move_id}"), move_doc)?;
    Ok(json!(1))
}

/// keys: `[targets_key, moves_key]`
/// args: `[actor_id, moves_array]` where each entry carries `target_id`,
/// `move_id`, and `doc`.
///
/// Same semantics as [`register_exchange_move`] per entry; returns the
/// count of successful registrations.
fn register_moves_batch(
    ctx: &mut dyn ScriptCtx,
    keys: &[String],
    args: &[Value],
) -> StoreResult<Value> {
    const NAME: &str = "register_moves_batch";
    let targets_key = key(keys, 0, NAME)?;
    let moves_key = key(keys, 1, NAME)?;
    let actor_id = arg(args, 0, NAME)?.clone();
    let entries = arg(args, 1, NAME)?
        .as_array()
        .cloned()
        .unwrap_or_default();

    let list_path = format!("$.{actor_id}");
    let mut registered = 0i64;
    for entry in entries {
        let Some(target_id) = entry.get("target_id") else {
            continue;
        };
        let Some(move_id) = entry.get("move_id").and_then(Value::as_str) else {
            continue;
        };
        let Some(doc) = entry.get("doc") else { continue };
        if let Some(index) = ctx.json_arr_index(targets_key, &list_path, target_id)? {
            ctx.json_arr_pop(targets_key, &list_path, index)?;
            ctx.json_set(moves_key, &format!("$.exchange.{move_id}"), doc.clone())?;
            registered += 1;
        }
    }
    Ok(json!(registered))
}

/// keys: `[queue_key, targets_key]`
/// args: `[actions_array, deletes_array, restores_array]` where each
/// delete is `{"key": moves_key, "path": "$.{strategy}.{move_id}"}` and
/// each restore is `{"actor": id, "target": id}`.
///
/// Pushes every action, removes every consumed intent, and returns the
/// consumed exchange targets to their owners' lists so the next round
/// can be declared. All three land together or not at all.
fn transfer_intents(ctx: &mut dyn ScriptCtx, keys: &[String], args: &[Value]) -> StoreResult<Value> {
    const NAME: &str = "transfer_intents";
    let queue_key = key(keys, 0, NAME)?;
    let targets_key = key(keys, 1, NAME)?;
    let actions = arg(args, 0, NAME)?.as_array().cloned().unwrap_or_default();
    let deletes = arg(args, 1, NAME)?.as_array().cloned().unwrap_or_default();
    let restores = arg(args, 2, NAME)?.as_array().cloned().unwrap_or_default();

    let pushed = if actions.is_empty() {
        0
    } else {
        ctx.list_push_right(queue_key, actions)?
    };
    for delete in deletes {
        let (Some(moves_key), Some(path)) = (
            delete.get("key").and_then(Value::as_str),
            delete.get("path").and_then(Value::as_str),
        ) else {
            continue;
        };
        ctx.json_del(moves_key, path)?;
    }
    for restore in restores {
        let (Some(actor), Some(target)) = (restore.get("actor"), restore.get("target")) else {
            continue;
        };
        let list_path = format!("$.{actor}");
        let mut list = match ctx.json_get(targets_key, &list_path)? {
            Some(Value::Array(list)) => list,
            _ => Vec::new(),
        };
        if !list.contains(target) {
            list.push(target.clone());
            ctx.json_set(targets_key, &list_path, Value::Array(list))?;
        }
    }
    Ok(json!(pushed))
}

/// keys: `[busy_key]` — SETNX `"pending"` with a short TTL; 1 on first
/// success. The winner owns the soft reservation and may schedule work.
fn check_and_lock_busy(
    ctx: &mut dyn ScriptCtx,
    keys: &[String],
    _args: &[Value],
) -> StoreResult<Value> {
    const NAME: &str = "check_and_lock_busy";
    let busy_key = key(keys, 0, NAME)?;
    let acquired = ctx.set_str_nx(busy_key, "pending".to_string(), Some(BUSY_PENDING_TTL_SECS))?;
    Ok(json!(acquired as i64))
}

/// keys: `[busy_key]`, args: `[worker_id]` — claim the lock when the
/// value is `"pending"` or absent.
fn acquire_worker_lock(
    ctx: &mut dyn ScriptCtx,
    keys: &[String],
    args: &[Value],
) -> StoreResult<Value> {
    const NAME: &str = "acquire_worker_lock";
    let busy_key = key(keys, 0, NAME)?;
    let worker_id = arg(args, 0, NAME)?.as_str().unwrap_or_default().to_string();
    match ctx.get_str(busy_key)? {
        None => {}
        Some(current) if current == "pending" => {}
        Some(_) => return Ok(json!(0)),
    }
    ctx.set_str(busy_key, worker_id, Some(WORKER_LOCK_TTL_SECS))?;
    Ok(json!(1))
}

/// keys: `[busy_key]`, args: `[worker_id]` — 1 iff the lock still names
/// this worker.
fn check_worker_lock(
    ctx: &mut dyn ScriptCtx,
    keys: &[String],
    args: &[Value],
) -> StoreResult<Value> {
    const NAME: &str = "check_worker_lock";
    let busy_key = key(keys, 0, NAME)?;
    let worker_id = arg(args, 0, NAME)?.as_str().unwrap_or_default();
    let held = ctx.get_str(busy_key)?.is_some_and(|v| v == worker_id);
    Ok(json!(held as i64))
}

/// keys: `[busy_key]`, args: `[worker_id]` — delete only if the value
/// still equals this worker. Idempotent.
fn release_worker_lock(
    ctx: &mut dyn ScriptCtx,
    keys: &[String],
    args: &[Value],
) -> StoreResult<Value> {
    const NAME: &str = "release_worker_lock";
    let busy_key = key(keys, 0, NAME)?;
    let worker_id = arg(args, 0, NAME)?.as_str().unwrap_or_default();
    let released = match ctx.get_str(busy_key)? {
        Some(current) if current == worker_id => ctx.delete(busy_key)?,
        _ => false,
    };
    Ok(json!(released as i64))
}

/// keys: `[meta_key, targets_key]`
/// args: `[joiner_id, team, role, enemies_array]`
///
/// Patches `teams`, `actors_info`, and `alive_counts` in the meta hash,
/// appends the joiner to every enemy's target list, and materializes the
/// joiner's own list. One atomic step keeps mutual visibility consistent.
fn hot_join_patch(ctx: &mut dyn ScriptCtx, keys: &[String], args: &[Value]) -> StoreResult<Value> {
    const NAME: &str = "hot_join_patch";
    let meta_key = key(keys, 0, NAME)?;
    let targets_key = key(keys, 1, NAME)?;
    let joiner_id = arg(args, 0, NAME)?.clone();
    let team = arg(args, 1, NAME)?.as_str().unwrap_or_default().to_string();
    let role = arg(args, 2, NAME)?.clone();
    let enemies = arg(args, 3, NAME)?.as_array().cloned().unwrap_or_default();

    let parse = |raw: Option<String>| -> Value {
        raw.and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_else(|| json!({}))
    };

    // teams[team] += joiner
    let mut teams = parse(ctx.hash_get(meta_key, "teams")?);
    let roster = teams
        .as_object_mut()
        .map(|map| map.entry(team.clone()).or_insert_with(|| json!([])));
    if let Some(Value::Array(list)) = roster {
        if !list.contains(&joiner_id) {
            list.push(joiner_id.clone());
        }
    }
    ctx.hash_set(meta_key, "teams", teams.to_string())?;

    // actors_info[joiner] = role
    let mut info = parse(ctx.hash_get(meta_key, "actors_info")?);
    if let Some(map) = info.as_object_mut() {
        map.insert(joiner_id.to_string(), role);
    }
    ctx.hash_set(meta_key, "actors_info", info.to_string())?;

    // alive_counts[team] += 1
    let mut alive = parse(ctx.hash_get(meta_key, "alive_counts")?);
    if let Some(map) = alive.as_object_mut() {
        let count = map.get(&team).and_then(Value::as_u64).unwrap_or(0);
        map.insert(team.clone(), json!(count + 1));
    }
    ctx.hash_set(meta_key, "alive_counts", alive.to_string())?;

    // Mutual visibility.
    for enemy in &enemies {
        let enemy_path = format!("$.{enemy}");
        if let Some(Value::Array(mut list)) = ctx.json_get(targets_key, &enemy_path)? {
            if !list.contains(&joiner_id) {
                list.push(joiner_id.clone());
                ctx.json_set(targets_key, &enemy_path, Value::Array(list))?;
            }
        }
    }
    ctx.json_set(
        targets_key,
        &format!("$.{joiner_id}"),
        Value::Array(enemies),
    )?;
    Ok(json!(1))
}
