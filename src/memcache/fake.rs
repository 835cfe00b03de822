//! Minimal memcached speaking `get`, `set` and `version`, for tests.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

type Entries = Arc<Mutex<HashMap<String, (u32, Vec<u8>)>>>;
type Replies = Arc<Mutex<HashMap<String, Vec<u8>>>>;
type Connections = Arc<Mutex<Vec<TcpStream>>>;

#[derive(Clone)]
struct Shared {
    entries: Entries,
    replies: Replies,
    sets: Arc<AtomicUsize>,
}

pub struct FakeMemcached {
    address: String,
    shared: Shared,
    connections: Connections,
}

impl FakeMemcached {
    /// Bind to an ephemeral port and serve connections on background threads
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let shared = Shared {
            entries: Arc::new(Mutex::new(HashMap::new())),
            replies: Arc::new(Mutex::new(HashMap::new())),
            sets: Arc::new(AtomicUsize::new(0)),
        };
        let connections: Connections = Arc::new(Mutex::new(Vec::new()));

        let accept_shared = shared.clone();
        let accept_connections = Arc::clone(&connections);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                if let Ok(handle) = stream.try_clone() {
                    accept_connections.lock().push(handle);
                }
                let shared = accept_shared.clone();
                thread::spawn(move || serve(stream, shared));
            }
        });

        Self {
            address,
            shared,
            connections,
        }
    }

    /// A local address nothing is listening on
    pub fn unused_address() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);
        address
    }

    pub fn address(&self) -> String {
        self.address.clone()
    }

    pub fn stored(&self, key: &str) -> Option<(u32, Vec<u8>)> {
        self.shared.entries.lock().get(key).cloned()
    }

    pub fn set_count(&self) -> usize {
        self.shared.sets.load(Ordering::SeqCst)
    }

    /// Answer `get <key>` with `reply` verbatim instead of the stored value
    pub fn reply_raw(&self, key: &str, reply: &[u8]) {
        self.shared
            .replies
            .lock()
            .insert(key.to_string(), reply.to_vec());
    }

    /// Close every accepted connection, as memcached does with idle clients
    pub fn close_connections(&self) {
        for stream in self.connections.lock().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

fn serve(stream: TcpStream, shared: Shared) {
    let mut writer = match stream.try_clone() {
        Ok(w) => w,
        Err(_) => return,
    };
    let mut reader = BufReader::new(stream);

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let parts: Vec<&str> = line.trim_end().split(' ').collect();

        let raw = match parts.as_slice() {
            ["get", key] => shared.replies.lock().get(*key).cloned(),
            _ => None,
        };

        let reply = match parts.as_slice() {
            _ if raw.is_some() => raw.unwrap_or_default(),
            ["get", key] => match shared.entries.lock().get(*key) {
                Some((flags, data)) => {
                    let mut out = format!("VALUE {} {} {}\r\n", key, flags, data.len()).into_bytes();
                    out.extend_from_slice(data);
                    out.extend_from_slice(b"\r\nEND\r\n");
                    out
                }
                None => b"END\r\n".to_vec(),
            },
            ["set", key, flags, _exptime, len] => {
                let len: usize = len.parse().unwrap_or(0);
                let mut data = vec![0u8; len + 2];
                if reader.read_exact(&mut data).is_err() {
                    return;
                }
                data.truncate(len);
                let flags: u32 = flags.parse().unwrap_or(0);
                shared.entries.lock().insert(key.to_string(), (flags, data));
                shared.sets.fetch_add(1, Ordering::SeqCst);
                b"STORED\r\n".to_vec()
            }
            ["version"] => b"VERSION fake-1.0\r\n".to_vec(),
            _ => b"ERROR\r\n".to_vec(),
        };

        if writer.write_all(&reply).is_err() {
            return;
        }
    }
}
