//! Command evaluation.
//!
//! [`eval_and_respond`] runs a batch of commands left to right against one
//! session and one store and returns the concatenated replies, ready to be
//! written to the socket unchanged.

use bytes::{BufMut, Bytes, BytesMut};

use crate::aof;
use crate::command::{Command, ParsedCommand};
use crate::error::{EngineError, EngineResult};
use crate::eviction;
use crate::object::{
    assert_encoding, assert_type, deduce_type_encoding, Obj, Value, OBJ_ENCODING_INT,
    OBJ_TYPE_STRING,
};
use crate::resp::{self, Encode, NIL, OK, QUEUED};
use crate::session::Session;
use crate::store::{Store, Ttl};

/// Evaluate a batch of commands and return every reply, in order.
pub fn eval_and_respond(cmds: &[ParsedCommand], session: &mut Session, store: &mut Store) -> Bytes {
    tracing::debug!(commands = cmds.len(), queuing = session.is_queuing(), "evaluating batch");

    let mut buf = BytesMut::new();
    for cmd in cmds {
        eval_into(cmd, session, store, &mut buf);
    }
    buf.freeze()
}

fn eval_into(cmd: &ParsedCommand, session: &mut Session, store: &mut Store, buf: &mut BytesMut) {
    let command = cmd.command();

    if session.is_queuing() && !command.is_transaction_control() {
        session.enqueue(cmd.clone());
        buf.put_slice(QUEUED);
        return;
    }

    let reply = match command {
        Command::Multi => {
            session.begin();
            Ok(Bytes::from_static(OK))
        }
        Command::Exec => match session.take_queue() {
            Ok(queue) => {
                for queued in &queue {
                    eval_into(queued, session, store, buf);
                }
                return;
            }
            Err(e) => Err(e),
        },
        Command::Discard => session.discard().map(|()| Bytes::from_static(OK)),
        Command::Ping => eval_ping(&cmd.args),
        Command::Get => eval_get(&cmd.args, store),
        Command::Set => eval_set(&cmd.args, store),
        Command::Ttl => eval_ttl(&cmd.args, store),
        Command::Del => eval_del(&cmd.args, store),
        Command::Expire => eval_expire(&cmd.args, store),
        Command::Incr => eval_incr(&cmd.args, store),
        Command::BgRewriteAof => Ok(eval_bgrewriteaof(store)),
        Command::Info => Ok(eval_info(store)),
        Command::Client | Command::Latency => Ok(Bytes::from_static(OK)),
        Command::Lru => Ok(eval_lru(store)),
    };

    match reply {
        Ok(bytes) => buf.put_slice(&bytes),
        Err(e) => {
            tracing::debug!(command = %command, error = %e, "command failed");
            e.encode_into(buf, false);
        }
    }
}

fn eval_ping(args: &[String]) -> EngineResult<Bytes> {
    match args {
        [] => Ok(resp::encode("PONG", true)),
        [message] => Ok(resp::encode(message, false)),
        _ => Err(EngineError::WrongArity("ping".to_string())),
    }
}

fn eval_get(args: &[String], store: &mut Store) -> EngineResult<Bytes> {
    let [key] = args else {
        return Err(EngineError::WrongArity("get".to_string()));
    };

    match store.get(key) {
        Some(obj) => Ok(resp::encode(obj.value().as_str(), false)),
        None => Ok(Bytes::from_static(NIL)),
    }
}

fn eval_set(args: &[String], store: &mut Store) -> EngineResult<Bytes> {
    let [key, value, options @ ..] = args else {
        return Err(EngineError::WrongArity("set".to_string()));
    };

    let mut ex_duration_ms = None;
    let mut options = options.iter();
    while let Some(option) = options.next() {
        if !option.eq_ignore_ascii_case("EX") {
            return Err(EngineError::Syntax);
        }
        let seconds = options.next().ok_or(EngineError::Syntax)?;
        ex_duration_ms = Some(parse_seconds_as_ms(seconds)?);
    }

    store.put(key.as_str(), Obj::from_string(value.as_str()));
    if let Some(ms) = ex_duration_ms {
        store.set_expiry(key, ms);
    }
    Ok(Bytes::from_static(OK))
}

fn eval_ttl(args: &[String], store: &mut Store) -> EngineResult<Bytes> {
    let [key] = args else {
        return Err(EngineError::WrongArity("ttl".to_string()));
    };

    let secs = match store.ttl(key) {
        Ttl::Missing => return Err(EngineError::KeyNotFound),
        Ttl::Persistent => -1,
        Ttl::Expired => -2,
        Ttl::Remaining(ms) => (ms / 1000) as i64,
    };
    Ok(resp::encode(&secs, false))
}

fn eval_del(args: &[String], store: &mut Store) -> EngineResult<Bytes> {
    if args.is_empty() {
        return Err(EngineError::WrongArity("del".to_string()));
    }

    let deleted = args.iter().filter(|key| store.del(key)).count() as i64;
    Ok(resp::encode(&deleted, false))
}

fn eval_expire(args: &[String], store: &mut Store) -> EngineResult<Bytes> {
    let [key, seconds] = args else {
        return Err(EngineError::WrongArity("expire".to_string()));
    };

    if store.get(key).is_none() {
        return Ok(resp::encode(&0i64, false));
    }
    let ms = parse_seconds_as_ms(seconds)?;
    store.set_expiry(key, ms);
    Ok(resp::encode(&1i64, false))
}

fn eval_incr(args: &[String], store: &mut Store) -> EngineResult<Bytes> {
    let [key] = args else {
        return Err(EngineError::WrongArity("incr".to_string()));
    };

    let obj = store
        .get_or_put(key, || Obj::from_string("0"))
        .ok_or(EngineError::KeyNotFound)?;

    assert_type(obj.type_encoding(), OBJ_TYPE_STRING)?;
    assert_encoding(obj.type_encoding(), OBJ_ENCODING_INT)?;

    let current: i64 = obj
        .value()
        .as_str()
        .parse()
        .map_err(|_| EngineError::NotAnInteger)?;
    let next = current.checked_add(1).ok_or(EngineError::NotAnInteger)?;

    let text = next.to_string();
    let (o_type, o_enc) = deduce_type_encoding(&text);
    obj.set_value(Value::Str(text), o_type, o_enc);
    Ok(resp::encode(&next, false))
}

fn eval_bgrewriteaof(store: &Store) -> Bytes {
    if let Err(e) = aof::dump_all_aof(store) {
        tracing::error!(error = %e, "AOF rewrite failed");
    }
    Bytes::from_static(OK)
}

fn eval_info(store: &Store) -> Bytes {
    let info = store.stats().snapshot().render_info(store.expires_count());
    resp::encode(&info, false)
}

fn eval_lru(store: &mut Store) -> Bytes {
    let evicted = eviction::evict_all_keys_lru(store);
    tracing::debug!(evicted, "manual LRU eviction");
    Bytes::from_static(OK)
}

/// Parse a whole number of seconds and convert it to milliseconds.
fn parse_seconds_as_ms(seconds: &str) -> EngineResult<i64> {
    seconds
        .parse::<i64>()
        .ok()
        .and_then(|secs| secs.checked_mul(1000))
        .ok_or(EngineError::NotAnInteger)
}
