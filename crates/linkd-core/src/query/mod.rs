//! Query handling
//!
//! Translates inbound requests into registry reads and formats the results.
//! Requests are validated for shape before the registry is touched, and every
//! registry failure is mapped onto a caller-facing [`QueryError`]; internal
//! error types never cross this boundary.
//!
//! | Request          | Reply                               | Failure        |
//! |------------------|-------------------------------------|----------------|
//! | `ListLinks`      | `[(index, name, path)]`             | none           |
//! | `GetLinkByName`  | `(index, path)`                     | `NoSuchLink`   |
//! | `GetLinkByIndex` | `(name, path)`                      | `NoSuchLink`   |
//! | `GetProperties`  | manager summary states              | none           |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::aggregate::ManagerSummary;
use crate::error::Error;
use crate::link::{LinkIndex, ResourcePaths};
use crate::registry::LinkRegistry;

/// Method names understood by [`Request::decode`]
pub const METHODS: &[&str] = &["ListLinks", "GetLinkByName", "GetLinkByIndex", "GetProperties"];

/// An inbound request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum Request {
    ListLinks,
    GetLinkByName { name: String },
    GetLinkByIndex { index: LinkIndex },
    GetProperties,
}

impl Request {
    /// Decode and validate a request object
    ///
    /// # Errors
    ///
    /// - `UnknownMethod` if `method` names no known operation
    /// - `MalformedRequest` for anything else that does not fit: a non-object
    ///   request, a missing `method`, missing or mistyped arguments
    pub fn decode(value: &Value) -> Result<Self, QueryError> {
        let Some(object) = value.as_object() else {
            return Err(QueryError::malformed("request must be a JSON object"));
        };

        match object.get("method") {
            Some(Value::String(method)) if !METHODS.contains(&method.as_str()) => {
                return Err(QueryError::UnknownMethod(method.clone()));
            }
            Some(Value::String(_)) => {}
            Some(_) => return Err(QueryError::malformed("'method' must be a string")),
            None => return Err(QueryError::malformed("missing 'method'")),
        }

        Request::deserialize(value).map_err(|e| QueryError::malformed(e.to_string()))
    }

    /// Method name of the request
    pub fn method(&self) -> &'static str {
        match self {
            Request::ListLinks => "ListLinks",
            Request::GetLinkByName { .. } => "GetLinkByName",
            Request::GetLinkByIndex { .. } => "GetLinkByIndex",
            Request::GetProperties => "GetProperties",
        }
    }
}

/// One entry of a `ListLinks` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub index: LinkIndex,
    pub name: String,
    pub path: String,
}

/// A successful reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Links(Vec<LinkEntry>),
    LinkByName { index: LinkIndex, path: String },
    LinkByIndex { name: String, path: String },
    Properties(ManagerSummary),
}

/// Caller-facing failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The identifier does not resolve to a live link
    #[error("{0}")]
    NoSuchLink(String),

    /// Request arguments failed shape validation
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// No such operation
    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    /// The request could not be completed; other requests are unaffected
    #[error("Request failed: {0}")]
    Failed(String),
}

impl QueryError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }

    /// Error name carried to the caller
    pub fn name(&self) -> &'static str {
        match self {
            QueryError::NoSuchLink(_) => "org.freedesktop.network1.NoSuchLink",
            QueryError::MalformedRequest(_) => "org.freedesktop.DBus.Error.InvalidArgs",
            QueryError::UnknownMethod(_) => "org.freedesktop.DBus.Error.UnknownMethod",
            QueryError::Failed(_) => "org.freedesktop.DBus.Error.Failed",
        }
    }
}

impl From<Error> for QueryError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(ref key) => QueryError::NoSuchLink(format!("Link {} not known", key)),
            Error::InvalidInput(msg) => QueryError::MalformedRequest(msg),
            other => QueryError::Failed(other.to_string()),
        }
    }
}

/// Answers requests from registry snapshots
#[derive(Clone)]
pub struct QueryHandler {
    registry: Arc<LinkRegistry>,
    paths: ResourcePaths,
}

impl QueryHandler {
    pub fn new(registry: Arc<LinkRegistry>, paths: ResourcePaths) -> Self {
        Self { registry, paths }
    }

    /// Decode a raw request and handle it
    pub fn handle_value(&self, value: &Value) -> Result<Response, QueryError> {
        let request = Request::decode(value)?;
        self.handle(&request)
    }

    /// Handle a decoded request
    pub fn handle(&self, request: &Request) -> Result<Response, QueryError> {
        let result = self.dispatch(request);

        match &result {
            Ok(_) => debug!("{} handled", request.method()),
            Err(e @ QueryError::Failed(_)) => error!("{} failed: {}", request.method(), e),
            Err(e) => debug!("{} rejected: {}", request.method(), e),
        }

        result
    }

    fn dispatch(&self, request: &Request) -> Result<Response, QueryError> {
        match request {
            Request::ListLinks => {
                let links = self
                    .registry
                    .list()
                    .into_iter()
                    .map(|link| LinkEntry {
                        path: self.paths.link_path(link.index),
                        index: link.index,
                        name: link.name,
                    })
                    .collect();
                Ok(Response::Links(links))
            }
            Request::GetLinkByName { name } => {
                let link = self.registry.get_by_name(name)?;
                Ok(Response::LinkByName {
                    index: link.index,
                    path: self.paths.link_path(link.index),
                })
            }
            Request::GetLinkByIndex { index } => {
                let link = self.registry.get_by_index(*index)?;
                Ok(Response::LinkByIndex {
                    path: self.paths.link_path(link.index),
                    name: link.name,
                })
            }
            Request::GetProperties => Ok(Response::Properties(self.registry.summary())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NullDispatcher;
    use serde_json::json;

    fn handler() -> QueryHandler {
        let registry = Arc::new(LinkRegistry::new(Arc::new(NullDispatcher)));
        registry.insert(2, "eth0").unwrap();
        QueryHandler::new(registry, ResourcePaths::default())
    }

    #[test]
    fn decode_accepts_well_formed_requests() {
        assert_eq!(
            Request::decode(&json!({"method": "ListLinks"})).unwrap(),
            Request::ListLinks
        );
        assert_eq!(
            Request::decode(&json!({"method": "GetLinkByName", "name": "eth0"})).unwrap(),
            Request::GetLinkByName { name: "eth0".to_string() }
        );
        assert_eq!(
            Request::decode(&json!({"method": "GetLinkByIndex", "index": 2})).unwrap(),
            Request::GetLinkByIndex { index: 2 }
        );
    }

    #[test]
    fn decode_rejects_bad_shapes() {
        let cases = [
            json!("ListLinks"),
            json!({}),
            json!({"method": 7}),
            json!({"method": "GetLinkByName"}),
            json!({"method": "GetLinkByName", "name": 3}),
            json!({"method": "GetLinkByIndex", "index": "2"}),
            json!({"method": "GetLinkByIndex", "index": 4_294_967_296_i64}),
        ];

        for case in cases {
            let err = Request::decode(&case).unwrap_err();
            assert!(
                matches!(err, QueryError::MalformedRequest(_)),
                "{} should be malformed, got {:?}",
                case,
                err
            );
            assert_eq!(err.name(), "org.freedesktop.DBus.Error.InvalidArgs");
        }
    }

    #[test]
    fn decode_reports_unknown_methods() {
        let err = Request::decode(&json!({"method": "Reconfigure"})).unwrap_err();
        assert_eq!(err, QueryError::UnknownMethod("Reconfigure".to_string()));
    }

    #[test]
    fn not_found_becomes_no_such_link() {
        let handler = handler();

        let err = handler
            .handle(&Request::GetLinkByIndex { index: -1 })
            .unwrap_err();
        assert_eq!(err, QueryError::NoSuchLink("Link -1 not known".to_string()));
        assert_eq!(err.name(), "org.freedesktop.network1.NoSuchLink");
    }

    #[test]
    fn internal_errors_become_failed() {
        let err = QueryError::from(Error::DuplicateIndex(2));
        assert!(matches!(err, QueryError::Failed(_)));
    }

    #[test]
    fn responses_serialize_as_plain_objects() {
        let handler = handler();

        let reply = handler.handle(&Request::GetLinkByName { name: "eth0".into() }).unwrap();
        assert_eq!(
            serde_json::to_value(reply).unwrap(),
            json!({"index": 2, "path": "/org/freedesktop/network1/link/2"})
        );

        let reply = handler.handle(&Request::GetProperties).unwrap();
        assert_eq!(
            serde_json::to_value(reply).unwrap(),
            json!({"OperationalState": "off", "CarrierState": "off", "AddressState": "off"})
        );
    }
}
