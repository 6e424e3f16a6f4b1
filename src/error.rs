use thiserror::Error;

/// everything the proxy endpoint can fail with. each variant maps to one
/// http status + `ErrorBody` (see `proxy`).
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Missing OpenRouter API key")]
    MissingCredential,
    #[error("OpenRouter error (status {status})")]
    Upstream { status: u16, body: String },
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Unexpected(err.to_string())
    }
}

/// client-side failures talking to the proxy. the ui collapses all of them
/// into a single connectivity notice.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(String),
    #[error("proxy returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode proxy reply: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Decode(err.to_string())
    }
}
