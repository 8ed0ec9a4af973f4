//! Line-delimited JSON frames exchanged by the loopback transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{BufRead, Write};

use crate::identity::{Credential, Identity};
use crate::remote::RecordKey;
use crate::retry::{decisive_kind, LinkError, LinkErrorKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireIdentity {
    pub locale: String,
    pub connect_as: String,
    pub authenticate_as: String,
    pub credential: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub read_only: bool,
}

impl From<&Identity> for WireIdentity {
    fn from(id: &Identity) -> Self {
        Self {
            locale: id.locale.clone(),
            connect_as: id.connect_as.clone(),
            authenticate_as: id.authenticate_as.clone(),
            credential: id.credential.expose().to_string(),
            target: id.target.clone(),
            read_only: id.read_only,
        }
    }
}

impl From<WireIdentity> for Identity {
    fn from(w: WireIdentity) -> Self {
        Identity {
            locale: w.locale,
            connect_as: w.connect_as,
            authenticate_as: w.authenticate_as,
            credential: Credential::new(w.credential),
            target: w.target,
            read_only: w.read_only,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Request {
    Open {
        registry_name: String,
        identity: WireIdentity,
    },
    Collection {
        name: String,
    },
    Get {
        collection: String,
        key: RecordKey,
    },
    GetAll {
        collection: String,
    },
    Size {
        collection: String,
    },
    IsEmpty {
        collection: String,
    },
    SetLocale {
        locale: String,
    },
    Close,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum Response {
    Ok {
        #[serde(default)]
        value: Value,
    },
    Err {
        kind: LinkErrorKind,
        message: String,
    },
}

impl Response {
    pub(crate) fn from_result(result: Result<Value, LinkError>) -> Self {
        match result {
            Ok(value) => Response::Ok { value },
            Err(e) => Response::Err {
                kind: decisive_kind(&e),
                message: e.message().to_string(),
            },
        }
    }

    pub(crate) fn into_result(self) -> Result<Value, LinkError> {
        match self {
            Response::Ok { value } => Ok(value),
            Response::Err { kind, message } => Err(LinkError::new(kind, format!("remote: {message}"))),
        }
    }
}

/// Answer to a keyed lookup. `found` tells an absent key apart from a
/// record stored as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Lookup {
    pub found: bool,
    #[serde(default)]
    pub value: Value,
}

impl From<Option<Value>> for Lookup {
    fn from(record: Option<Value>) -> Self {
        match record {
            Some(value) => Lookup { found: true, value },
            None => Lookup {
                found: false,
                value: Value::Null,
            },
        }
    }
}

impl From<Lookup> for Option<Value> {
    fn from(lookup: Lookup) -> Self {
        lookup.found.then_some(lookup.value)
    }
}

/// Write one frame followed by a newline.
pub(crate) fn write_frame<W: Write, T: Serialize>(w: &mut W, frame: &T) -> Result<(), LinkError> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    w.write_all(&line)?;
    w.flush()?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed the stream cleanly.
pub(crate) fn read_frame<R: BufRead, T: serde::de::DeserializeOwned>(
    r: &mut R,
) -> Result<Option<T>, LinkError> {
    let mut line = String::new();
    if r.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line.trim_end())?))
}
