//! HTTP API of the diagram store
//!
//! | Request                                       | Effect                                  |
//! |-----------------------------------------------|-----------------------------------------|
//! | `GET /api/diagrams?time=T`                    | list diagrams, content if newer than `T` |
//! | `POST /api/diagram?name&type`                 | store the body as diagram               |
//! | `POST /api/buddy-diagram?name&type[&dialect]` | convert a BuDDy dump and store it       |
//! | `POST /api/diagramState?name`                 | store the body as diagram state         |
//! | `DELETE /api/diagram?name`                    | delete the diagram                      |
//!
//! Routing is independent of the transport: [`route()`] maps a method, URI
//! and the complete body to a response.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Method, Response, StatusCode, Uri};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use bddviz_dump::{Dialect, MalformedInput};

use crate::store::{self, DiagramStore, StoreError};

// spell-checker:ignore bddv

/// Response type of the router
pub type HttpResponse = Response<Full<Bytes>>;

/// Shared state of all request handlers
pub struct AppState {
    /// The diagrams
    pub store: DiagramStore,
    /// Dialect for BuDDy uploads without a `dialect` parameter
    pub default_dialect: Dialect,
}

/// Reasons for rejecting a request
#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    /// A required query parameter is absent
    #[error("missing query parameter '{0}'")]
    MissingParam(&'static str),
    /// A query parameter has an invalid value
    #[error("invalid value for query parameter '{name}': {reason}")]
    InvalidParam {
        /// Parameter name
        name: &'static str,
        /// What is wrong
        reason: String,
    },
    /// The body could not be decoded
    #[error("invalid request body: {0}")]
    Body(String),
    /// The BuDDy dump could not be converted
    #[error(transparent)]
    Convert(#[from] MalformedInput),
    /// The store failed
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The response body could not be encoded
    #[error("failed to encode the response: {0}")]
    Encode(#[source] serde_json::Error),
    /// Unknown endpoint
    #[error("no such endpoint: {0}")]
    NotFound(String),
    /// The method is not supported
    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),
}

impl RequestError {
    /// HTTP status code for this error
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::MissingParam(_)
            | RequestError::InvalidParam { .. }
            | RequestError::Body(_)
            | RequestError::Convert(_)
            | RequestError::Store(StoreError::InvalidName(_)) => StatusCode::BAD_REQUEST,
            RequestError::Store(_) | RequestError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RequestError::NotFound(_) => StatusCode::NOT_FOUND,
            RequestError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

/// Body of `POST /api/buddy-diagram`
#[derive(Deserialize, Debug)]
struct BuddyUpload {
    data: String,
    #[serde(default)]
    vars: Option<String>,
}

#[derive(Serialize, Debug)]
struct DiagramList<'a> {
    diagrams: Vec<DiagramEntry<'a>>,
    time: f64,
}

#[derive(Serialize, Debug)]
struct DiagramEntry<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    diagram: Changed<'a>,
    state: Changed<'a>,
}

/// Either the current text or `false` if the client is up to date
#[derive(Serialize, Debug)]
#[serde(untagged)]
enum Changed<'a> {
    Text(&'a str),
    Unchanged(bool),
}

impl<'a> Changed<'a> {
    fn new(text: &'a str, changed: bool) -> Self {
        if changed {
            Changed::Text(text)
        } else {
            Changed::Unchanged(false)
        }
    }
}

/// Decoded query string; for repeated keys, the first value counts
struct Query(Vec<(String, String)>);

impl Query {
    fn parse(uri: &Uri) -> Result<Self, RequestError> {
        serde_urlencoded::from_str(uri.query().unwrap_or(""))
            .map(Query)
            .map_err(|err| RequestError::Body(format!("malformed query string ({err})")))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v.as_str()))
    }

    fn require(&self, key: &'static str) -> Result<&str, RequestError> {
        self.get(key).ok_or(RequestError::MissingParam(key))
    }
}

/// Handle a request with the complete `body`
pub fn route(state: &AppState, method: &Method, uri: &Uri, body: &[u8]) -> HttpResponse {
    if method == Method::OPTIONS {
        return preflight();
    }

    let res = match api_path(uri.path()) {
        Some(path) => handle_api(state, method, &path, uri, body),
        None if method == Method::GET => Ok(landing_page(uri.path())),
        None if method == Method::POST || method == Method::DELETE => {
            Err(RequestError::NotFound(uri.path().to_string()))
        }
        None => Err(RequestError::MethodNotAllowed(method.clone())),
    };

    res.unwrap_or_else(|err| {
        let status = err.status();
        if status.is_server_error() {
            error!(%method, %uri, %err, "request failed");
        } else {
            warn!(%method, %uri, %err, "request rejected");
        }
        error_response(status, &err.to_string())
    })
}

/// Split `/api/a/b` into `["a", "b"]`, `None` for non-API paths
fn api_path(path: &str) -> Option<Vec<&str>> {
    let mut parts = path.strip_prefix('/').unwrap_or(path).split('/');
    match parts.next() {
        Some("api") => Some(parts.collect()),
        _ => None,
    }
}

fn handle_api(
    state: &AppState,
    method: &Method,
    path: &[&str],
    uri: &Uri,
    body: &[u8],
) -> Result<HttpResponse, RequestError> {
    let query = Query::parse(uri)?;
    match (method.as_str(), path) {
        ("GET", ["diagrams"]) => list_diagrams(state, &query),
        ("GET", _) => Ok(html_response("<body>Good, this is the API</body>".to_string())),
        ("POST", ["diagram"]) => {
            let name = query.require("name")?;
            let kind = query.require("type")?;
            state.store.put(name, kind, body_text(body)?)?;
            Ok(empty_response())
        }
        ("POST", ["buddy-diagram"]) => {
            let name = query.require("name")?;
            let kind = query.require("type")?;
            let dialect = match query.get("dialect") {
                Some(dialect) => {
                    dialect
                        .parse::<Dialect>()
                        .map_err(|err| RequestError::InvalidParam {
                            name: "dialect",
                            reason: err.to_string(),
                        })?
                }
                None => state.default_dialect,
            };
            let upload: BuddyUpload = serde_json::from_slice(body)
                .map_err(|err| RequestError::Body(err.to_string()))?;
            let dddmp = bddviz_dump::convert(dialect, &upload.data, upload.vars.as_deref())?;
            state.store.put(name, kind, &dddmp)?;
            Ok(empty_response())
        }
        ("POST", ["diagramState"]) => {
            let name = query.require("name")?;
            if !state.store.set_state(name, body_text(body)?)? {
                debug!(name, "state update for unknown diagram");
            }
            Ok(empty_response())
        }
        ("DELETE", ["diagram"]) => {
            state.store.delete(query.require("name")?)?;
            Ok(empty_response())
        }
        ("POST" | "DELETE", _) => Err(RequestError::NotFound(uri.path().to_string())),
        _ => Err(RequestError::MethodNotAllowed(method.clone())),
    }
}

fn list_diagrams(state: &AppState, query: &Query) -> Result<HttpResponse, RequestError> {
    let time = query.require("time")?;
    let prev_time: f64 = time.parse().map_err(|_| RequestError::InvalidParam {
        name: "time",
        reason: format!("'{time}' is not a number"),
    })?;
    let now = store::now();

    let diagrams = state.store.list();
    let list = DiagramList {
        diagrams: diagrams
            .iter()
            .map(|d| {
                let changed = d.date > prev_time;
                DiagramEntry {
                    name: &d.name,
                    kind: &d.kind,
                    diagram: Changed::new(&d.diagram, changed),
                    state: Changed::new(&d.state, changed),
                }
            })
            .collect(),
        time: now,
    };

    let json = serde_json::to_vec(&list).map_err(RequestError::Encode)?;
    Ok(with_content_type(
        base_response(StatusCode::OK, json.into()),
        "application/json",
    ))
}

fn body_text(body: &[u8]) -> Result<&str, RequestError> {
    std::str::from_utf8(body).map_err(|err| RequestError::Body(err.to_string()))
}

fn base_response(status: StatusCode, body: Bytes) -> HttpResponse {
    let mut res = Response::new(Full::new(body));
    *res.status_mut() = status;
    res.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    res
}

fn with_content_type(mut res: HttpResponse, content_type: &'static str) -> HttpResponse {
    res.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    res
}

fn empty_response() -> HttpResponse {
    base_response(StatusCode::OK, Bytes::new())
}

fn html_response(html: String) -> HttpResponse {
    with_content_type(base_response(StatusCode::OK, html.into()), "text/html")
}

/// Plain text response for failed requests
pub fn error_response(status: StatusCode, message: &str) -> HttpResponse {
    with_content_type(
        base_response(status, Bytes::from(message.to_string())),
        "text/plain; charset=utf-8",
    )
}

/// CORS preflight response
fn preflight() -> HttpResponse {
    let mut res = empty_response();
    let headers = res.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS, DELETE, POST"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("X-Requested-With, Content-Type"),
    );
    res
}

fn landing_page(path: &str) -> HttpResponse {
    html_response(format!(
        "<html><head><title>BDD-viz</title></head>\
         <body><p>Request: {}</p><p>This is the BDD-viz diagram server.</p></body></html>",
        escape_html(path)
    ))
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_api_path() {
        assert_eq!(api_path("/api/diagrams"), Some(vec!["diagrams"]));
        assert_eq!(api_path("/api/diagrams/"), Some(vec!["diagrams", ""]));
        assert_eq!(api_path("/api"), Some(vec![]));
        assert_eq!(api_path("/"), None);
        assert_eq!(api_path("/index.html"), None);
        assert_eq!(api_path("/apix/diagrams"), None);
    }

    #[test]
    fn query_first_value_wins() {
        let uri: Uri = "/api/diagram?name=a%20b&type=bdd&name=c".parse().unwrap();
        let query = Query::parse(&uri).unwrap();
        assert_eq!(query.get("name"), Some("a b"));
        assert_eq!(query.require("type").unwrap(), "bdd");
        assert!(matches!(
            query.require("time"),
            Err(RequestError::MissingParam("time"))
        ));
    }

    #[test]
    fn error_status() {
        let encode = serde_json::from_str::<u8>("x").unwrap_err();
        let err = RequestError::Encode(encode);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().starts_with("failed to encode the response"));

        let err = RequestError::Store(StoreError::InvalidName("..".to_string()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            RequestError::MissingParam("name").status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("/a<b>&'\""), "/a&lt;b&gt;&amp;&#39;&quot;");
    }

    #[test]
    fn changed_serialization() {
        assert_eq!(
            serde_json::to_string(&Changed::Text("x")).unwrap(),
            "\"x\""
        );
        assert_eq!(
            serde_json::to_string(&Changed::Unchanged(false)).unwrap(),
            "false"
        );
    }
}
