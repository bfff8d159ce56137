//! Scripted `HttpTransport` for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use super::{HttpResponse, HttpTransport, PaginatedFetcher, RemoteError, RetryPolicy, TokenManager};

pub const BASE_URL: &str = "https://api.test";

/// Replays queued responses per route. The last queued response of a route
/// is repeated once the queue is down to one entry.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    token_responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<String>>,
    bearers: Mutex<Vec<String>>,
    token_requests: AtomicUsize,
}

/// `path?k=v&...` with pairs sorted and the page-size parameter dropped.
pub fn route_key(path: &str, query: &[(String, String)]) -> String {
    let mut pairs: Vec<String> = query
        .iter()
        .filter(|(k, _)| k != "_count")
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    pairs.sort();
    format!("{path}?{}", pairs.join("&"))
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a response for `GET path` with the given filters and page number.
    pub fn on_page(&self, path: &str, filters: &[(&str, &str)], page: u32, response: HttpResponse) {
        let mut query: Vec<(String, String)> = filters
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        query.push(("page".into(), page.to_string()));
        let key = route_key(path, &query);
        self.routes
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push_back(response);
    }

    pub fn on_token(&self, response: HttpResponse) {
        self.token_responses.lock().unwrap().push_back(response);
    }

    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn bearers(&self) -> Vec<String> {
        self.bearers.lock().unwrap().clone()
    }

    pub fn request_count(&self, prefix: &str) -> usize {
        self.requests().iter().filter(|r| r.starts_with(prefix)).count()
    }
}

impl HttpTransport for MockTransport {
    fn get(&self, url: &str, bearer: &str, query: &[(String, String)]) -> Result<HttpResponse, RemoteError> {
        let path = url.strip_prefix(BASE_URL).unwrap_or(url);
        let key = route_key(path, query);
        self.requests.lock().unwrap().push(key.clone());
        self.bearers.lock().unwrap().push(bearer.to_string());

        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => Ok(queue.pop_front().unwrap()),
            Some(queue) if queue.len() == 1 => Ok(queue[0].clone()),
            _ => Ok(HttpResponse::new(404, format!("no route for {key}"))),
        }
    }

    fn post_form(&self, _url: &str, _form: &[(&str, &str)]) -> Result<HttpResponse, RemoteError> {
        let n = self.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
        let queued = self.token_responses.lock().unwrap().pop_front();
        Ok(queued.unwrap_or_else(|| {
            HttpResponse::new(
                200,
                json!({ "access_token": format!("tok-{n}"), "expires_in": 3600 }).to_string(),
            )
        }))
    }
}

/// A bundle page. `next` adds a `next` link; `last_page` adds a `last` link.
pub fn bundle(resources: Vec<Value>, next: bool, last_page: Option<u32>) -> HttpResponse {
    let mut links = Vec::new();
    if next {
        links.push(json!({ "relation": "next", "url": format!("{BASE_URL}/next") }));
    }
    if let Some(last) = last_page {
        links.push(json!({ "relation": "last", "url": format!("{BASE_URL}/x?_count=500&page={last}") }));
    }
    let entries: Vec<Value> = resources.into_iter().map(|r| json!({ "resource": r })).collect();
    HttpResponse::new(
        200,
        json!({ "resourceType": "Bundle", "entry": entries, "link": links }).to_string(),
    )
}

pub fn token_manager(transport: Arc<MockTransport>) -> TokenManager {
    TokenManager::new(
        transport,
        format!("{BASE_URL}/oauth/token"),
        Some("client".into()),
        Some("secret".into()),
    )
}

/// A fetcher over `transport` with zero pacing delays.
pub fn fetcher(transport: Arc<MockTransport>) -> PaginatedFetcher {
    PaginatedFetcher::new(
        BASE_URL,
        transport.clone(),
        token_manager(transport),
        RetryPolicy::immediate(),
    )
}
