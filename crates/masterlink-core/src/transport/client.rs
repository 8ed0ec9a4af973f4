//! Client side: a `Registry` that reaches the master over TCP.
//!
//! Each session owns one stream. Requests on a session are serialized by the
//! stream mutex; handles exported by the session share that stream.

use serde_json::Value;
use std::io::BufReader;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::wire::{read_frame, write_frame, Lookup, Request, Response, WireIdentity};
use crate::config::{TargetConfig, TransportSecurity};
use crate::identity::Identity;
use crate::remote::{HandleFactory, RawCollection, RecordKey, Registry, RemoteSession};
use crate::retry::{LinkError, LinkErrorKind};

/// Registry that dials `target.host:target.port`.
#[derive(Debug, Clone)]
pub struct TcpRegistry {
    target: TargetConfig,
}

impl TcpRegistry {
    pub fn new(target: TargetConfig) -> Self {
        Self { target }
    }
}

impl Registry for TcpRegistry {
    fn lookup(&self, name: &str) -> Result<Arc<dyn HandleFactory>, LinkError> {
        if self.target.transport == TransportSecurity::Tls {
            return Err(LinkError::config(
                "tls transport is not supported by the tcp registry",
            ));
        }
        Ok(Arc::new(TcpHandleFactory {
            target: self.target.clone(),
            registry_name: name.to_string(),
        }))
    }
}

struct TcpHandleFactory {
    target: TargetConfig,
    registry_name: String,
}

impl HandleFactory for TcpHandleFactory {
    fn open(&self, identity: &Identity) -> Result<Box<dyn RemoteSession>, LinkError> {
        let addr = self.target.address();
        let stream = TcpStream::connect(&addr).map_err(|e| {
            LinkError::wrap(LinkErrorKind::Transport, format!("connect {addr}"), e)
        })?;
        stream.set_read_timeout(self.target.io_timeout())?;
        stream.set_write_timeout(self.target.io_timeout())?;
        stream.set_nodelay(true)?;
        let conn = Arc::new(Conn::new(stream)?);
        conn.call(&Request::Open {
            registry_name: self.registry_name.clone(),
            identity: WireIdentity::from(identity),
        })?;
        tracing::debug!(%addr, principal = %identity.connect_as, "tcp session opened");
        Ok(Box::new(TcpSession { conn }))
    }
}

struct Conn {
    io: Mutex<(BufReader<TcpStream>, TcpStream)>,
    broken: AtomicBool,
}

impl Conn {
    fn new(stream: TcpStream) -> Result<Self, LinkError> {
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self {
            io: Mutex::new((reader, stream)),
            broken: AtomicBool::new(false),
        })
    }

    /// One request/response exchange. Any I/O or framing failure poisons the
    /// stream: later calls fail fast with a transport error.
    fn call(&self, req: &Request) -> Result<Value, LinkError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(LinkError::transport("stream already failed"));
        }
        let mut io = self.io.lock().unwrap_or_else(PoisonError::into_inner);
        let (reader, writer) = &mut *io;
        let exchanged = write_frame(writer, req).and_then(|_| read_frame::<_, Response>(reader));
        match exchanged {
            Ok(Some(resp)) => resp.into_result(),
            Ok(None) => {
                self.broken.store(true, Ordering::SeqCst);
                Err(LinkError::transport("connection closed by master"))
            }
            Err(e) => {
                self.broken.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }
}

struct TcpSession {
    conn: Arc<Conn>,
}

impl RemoteSession for TcpSession {
    fn collection(&self, name: &str) -> Result<Arc<dyn RawCollection>, LinkError> {
        self.conn.call(&Request::Collection {
            name: name.to_string(),
        })?;
        Ok(Arc::new(TcpCollection {
            conn: Arc::clone(&self.conn),
            name: name.to_string(),
        }))
    }

    fn set_locale(&self, locale: &str) -> Result<(), LinkError> {
        self.conn.call(&Request::SetLocale {
            locale: locale.to_string(),
        })?;
        Ok(())
    }

    fn close(&self) -> Result<(), LinkError> {
        let result = self.conn.call(&Request::Close).map(|_| ());
        self.conn.broken.store(true, Ordering::SeqCst);
        let io = self.conn.io.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = io.1.shutdown(std::net::Shutdown::Both);
        result
    }
}

struct TcpCollection {
    conn: Arc<Conn>,
    name: String,
}

impl RawCollection for TcpCollection {
    fn raw_get(&self, key: &RecordKey) -> Result<Option<Value>, LinkError> {
        let value = self.conn.call(&Request::Get {
            collection: self.name.clone(),
            key: key.clone(),
        })?;
        let lookup: Lookup = serde_json::from_value(value)?;
        Ok(lookup.into())
    }

    fn raw_get_all(&self) -> Result<Vec<Value>, LinkError> {
        let value = self.conn.call(&Request::GetAll {
            collection: self.name.clone(),
        })?;
        Ok(serde_json::from_value(value)?)
    }

    fn raw_size(&self) -> Result<usize, LinkError> {
        let value = self.conn.call(&Request::Size {
            collection: self.name.clone(),
        })?;
        Ok(serde_json::from_value(value)?)
    }

    fn raw_is_empty(&self) -> Result<bool, LinkError> {
        let value = self.conn.call(&Request::IsEmpty {
            collection: self.name.clone(),
        })?;
        Ok(serde_json::from_value(value)?)
    }
}
