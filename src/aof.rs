//! Snapshot file.
//!
//! The file is a sequence of RESP arrays, one `SET <key> <value>` per live
//! key. A rewrite truncates the file and writes the whole keyspace; TTLs and
//! encodings are not kept. Replay feeds every array back through the
//! evaluator.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use bytes::BytesMut;

use crate::command::ParsedCommand;
use crate::error::EngineResult;
use crate::eval;
use crate::resp::{self, Encode};
use crate::session::Session;
use crate::store::Store;

/// Rewrite the store's snapshot file from scratch.
///
/// Returns the number of keys written.
pub fn dump_all_aof(store: &Store) -> EngineResult<usize> {
    let path = store.config().get_aof_file();
    tracing::info!(path = %path.display(), "rewriting AOF file");

    let entries = store.snapshot_entries();
    let mut writer = BufWriter::new(File::create(path)?);
    let mut buf = BytesMut::new();
    for (key, value) in &entries {
        buf.clear();
        dump_key(&mut buf, key, value);
        writer.write_all(&buf)?;
    }
    writer.flush()?;

    tracing::info!(path = %path.display(), keys = entries.len(), "rewriting AOF file done");
    Ok(entries.len())
}

fn dump_key(buf: &mut BytesMut, key: &str, value: &str) {
    let tokens = ["SET".to_string(), key.to_string(), value.to_string()];
    tokens[..].encode_into(buf, false);
}

/// Replay a snapshot file into `store`.
///
/// A missing file is not an error. Returns the number of commands replayed.
pub fn load_aof(path: &Path, store: &mut Store) -> EngineResult<usize> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no AOF file to load");
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };
    if data.is_empty() {
        return Ok(0);
    }

    let (values, consumed) = resp::decode_all(&data)?;
    if consumed < data.len() {
        tracing::warn!(
            path = %path.display(),
            trailing = data.len() - consumed,
            "AOF file ends with a partial command; ignoring it"
        );
    }

    let commands = values
        .into_iter()
        .map(ParsedCommand::from_value)
        .collect::<EngineResult<Vec<_>>>()?;

    let mut session = Session::new();
    let mut rejected = 0;
    for cmd in &commands {
        let reply = eval::eval_and_respond(std::slice::from_ref(cmd), &mut session, store);
        if reply.starts_with(b"-") {
            rejected += 1;
            tracing::warn!(
                command = %cmd.name,
                reply = %String::from_utf8_lossy(&reply).trim_end(),
                "AOF command rejected"
            );
        }
    }

    tracing::info!(
        path = %path.display(),
        commands = commands.len(),
        rejected,
        "loaded AOF file"
    );
    Ok(commands.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::EngineError;
    use crate::object::Obj;
    use tempfile::TempDir;

    fn store_at(dir: &TempDir) -> Store {
        let config = Config::new()
            .keys_limit(0)
            .aof_file(dir.path().join("test.aof"))
            .build();
        Store::new(config)
    }

    fn value_of(store: &mut Store, key: &str) -> Option<String> {
        store.get(key).map(|obj| obj.value().to_string())
    }

    #[test]
    fn test_dump_writes_set_arrays() {
        let dir = TempDir::new().unwrap();
        let mut store = store_at(&dir);
        store.put("foo", Obj::from_string("bar"));

        assert_eq!(dump_all_aof(&store).unwrap(), 1);
        let contents = fs::read(store.config().get_aof_file()).unwrap();
        assert_eq!(contents, b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
    }

    #[test]
    fn test_dump_truncates_previous_contents() {
        let dir = TempDir::new().unwrap();
        let mut store = store_at(&dir);
        store.put("a", Obj::from_string("1"));
        store.put("b", Obj::from_string("2"));
        dump_all_aof(&store).unwrap();

        store.del("a");
        dump_all_aof(&store).unwrap();

        let decoded = resp::decode_all(&fs::read(store.config().get_aof_file()).unwrap())
            .unwrap()
            .0;
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn test_dump_then_load_restores_values() {
        let dir = TempDir::new().unwrap();
        let mut store = store_at(&dir);
        store.put("name", Obj::from_string("echo server"));
        store.put("counter", Obj::from_string("41"));
        dump_all_aof(&store).unwrap();

        let mut restored = store_at(&dir);
        let path = restored.config().get_aof_file().to_path_buf();
        assert_eq!(load_aof(&path, &mut restored).unwrap(), 2);
        assert_eq!(value_of(&mut restored, "name"), Some("echo server".to_string()));
        assert_eq!(value_of(&mut restored, "counter"), Some("41".to_string()));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut store = store_at(&dir);
        let missing = dir.path().join("missing.aof");
        assert_eq!(load_aof(&missing, &mut store).unwrap(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.aof");
        fs::write(&path, b"not resp at all").unwrap();

        let mut store = store_at(&dir);
        assert!(matches!(
            load_aof(&path, &mut store),
            Err(EngineError::Protocol(_))
        ));
    }

    #[test]
    fn test_dump_to_unwritable_path_fails() {
        let dir = TempDir::new().unwrap();
        let config = Config::new()
            .aof_file(dir.path().join("no-such-dir").join("x.aof"))
            .build();
        let store = Store::new(config);
        assert!(matches!(dump_all_aof(&store), Err(EngineError::Io(_))));
    }
}
