//! Server side: exposes any `Registry` to TCP clients, one thread per
//! connection. The first frame on a connection must be `open`.

use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, BufReader};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::wire::{read_frame, write_frame, Lookup, Request, Response};
use crate::remote::{RawCollection, Registry, RemoteSession};
use crate::retry::LinkError;

/// Accept connections forever, serving each on its own thread.
pub fn serve(listener: TcpListener, registry: Arc<dyn Registry>) -> io::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "loopback master listening");
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            let peer = stream.peer_addr().ok();
            if let Err(e) = handle_connection(stream, registry.as_ref()) {
                tracing::debug!(?peer, error = %e, "connection ended with error");
            }
        });
    }
    Ok(())
}

/// Run `serve` on a background thread.
pub fn spawn(listener: TcpListener, registry: Arc<dyn Registry>) -> JoinHandle<io::Result<()>> {
    thread::spawn(move || serve(listener, registry))
}

struct Served {
    session: Box<dyn RemoteSession>,
    collections: HashMap<String, Arc<dyn RawCollection>>,
}

impl Served {
    fn collection(&mut self, name: &str) -> Result<Arc<dyn RawCollection>, LinkError> {
        if let Some(c) = self.collections.get(name) {
            return Ok(Arc::clone(c));
        }
        let c = self.session.collection(name)?;
        self.collections.insert(name.to_string(), Arc::clone(&c));
        Ok(c)
    }
}

fn handle_connection(stream: TcpStream, registry: &dyn Registry) -> Result<(), LinkError> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    let mut served: Option<Served> = None;

    while let Some(req) = read_frame::<_, Request>(&mut reader)? {
        let closing = matches!(req, Request::Close);
        let result = dispatch(registry, &mut served, req);
        write_frame(&mut writer, &Response::from_result(result))?;
        if closing {
            break;
        }
    }

    if let Some(s) = served.take() {
        if let Err(e) = s.session.close() {
            tracing::debug!(error = %e, "closing served session failed");
        }
    }
    Ok(())
}

fn dispatch(
    registry: &dyn Registry,
    served: &mut Option<Served>,
    req: Request,
) -> Result<Value, LinkError> {
    match req {
        Request::Open {
            registry_name,
            identity,
        } => {
            if served.is_some() {
                return Err(LinkError::application(
                    "session already open on this connection",
                ));
            }
            let session = registry.lookup(&registry_name)?.open(&identity.into())?;
            *served = Some(Served {
                session,
                collections: HashMap::new(),
            });
            Ok(Value::Null)
        }
        Request::Close => match served.take() {
            Some(s) => s.session.close().map(|_| Value::Null),
            None => Err(not_open()),
        },
        other => match served.as_mut() {
            Some(s) => serve_request(s, other),
            None => Err(not_open()),
        },
    }
}

fn not_open() -> LinkError {
    LinkError::not_exported("no session open on this connection")
}

fn serve_request(s: &mut Served, req: Request) -> Result<Value, LinkError> {
    match req {
        Request::Collection { name } => s.collection(&name).map(|_| Value::Null),
        Request::Get { collection, key } => {
            let record = s.collection(&collection)?.raw_get(&key)?;
            Ok(serde_json::to_value(Lookup::from(record))?)
        }
        Request::GetAll { collection } => {
            Ok(Value::Array(s.collection(&collection)?.raw_get_all()?))
        }
        Request::Size { collection } => Ok(Value::from(s.collection(&collection)?.raw_size()?)),
        Request::IsEmpty { collection } => {
            Ok(Value::Bool(s.collection(&collection)?.raw_is_empty()?))
        }
        Request::SetLocale { locale } => s.session.set_locale(&locale).map(|_| Value::Null),
        Request::Open { .. } | Request::Close => {
            Err(LinkError::application("unexpected session control frame"))
        }
    }
}
