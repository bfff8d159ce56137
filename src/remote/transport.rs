use std::collections::HashMap;
use std::time::Duration;

use super::RemoteError;

/// A fully-read HTTP response. Header names are stored lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The HTTP operations the engine needs. Implemented over reqwest in
/// production and by a scripted mock in tests.
pub trait HttpTransport: Send + Sync {
    /// `GET url?query` with a bearer token.
    fn get(&self, url: &str, bearer: &str, query: &[(String, String)]) -> Result<HttpResponse, RemoteError>;

    /// `POST url` with an `application/x-www-form-urlencoded` body.
    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse, RemoteError>;
}

/// Blocking reqwest transport.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl ReqwestTransport {
    pub fn new(timeout_secs: u64) -> Result<Self, RemoteError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("caresync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RemoteError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, timeout_secs })
    }

    fn read(&self, response: reqwest::blocking::Response) -> Result<HttpResponse, RemoteError> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().map_err(|e| self.map_error(e))?;
        Ok(HttpResponse { status, headers, body })
    }

    fn map_error(&self, e: reqwest::Error) -> RemoteError {
        if e.is_timeout() {
            RemoteError::Transport(format!("Request timed out after {}s", self.timeout_secs))
        } else if e.is_connect() {
            RemoteError::Transport(format!("Connection failed: {e}"))
        } else {
            RemoteError::Transport(e.to_string())
        }
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, bearer: &str, query: &[(String, String)]) -> Result<HttpResponse, RemoteError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(bearer)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .map_err(|e| self.map_error(e))?;
        self.read(response)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse, RemoteError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .map_err(|e| self.map_error(e))?;
        self.read(response)
    }
}
