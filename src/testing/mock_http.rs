use crate::api::{HttpRequest, HttpTransport};
use crate::error::{MarketDataError, Result};
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

struct Route {
    url_contains: String,
    responses: VecDeque<Result<Value>>,
    /// Replayed once `responses` runs dry
    repeat: Option<Result<Value>>,
}

/// Scripted transport: responses are matched by url substring, in the order
/// they were queued. Every request is recorded.
#[derive(Default)]
pub struct MockHttpTransport {
    routes: Mutex<Vec<Route>>,
    fallback: Mutex<VecDeque<Result<Value>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response for any url not matched by a route
    pub fn push_ok(&self, body: Value) {
        self.fallback.lock().unwrap_or_else(|p| p.into_inner()).push_back(Ok(body));
    }

    pub fn push_err(&self, err: MarketDataError) {
        self.fallback.lock().unwrap_or_else(|p| p.into_inner()).push_back(Err(err));
    }

    /// Queues a one-shot response for urls containing `url_contains`
    pub fn on(&self, url_contains: &str, response: Result<Value>) {
        let mut routes = self.routes.lock().unwrap_or_else(|p| p.into_inner());
        match routes.iter_mut().find(|r| r.url_contains == url_contains) {
            Some(route) => route.responses.push_back(response),
            None => routes.push(Route {
                url_contains: url_contains.to_string(),
                responses: VecDeque::from([response]),
                repeat: None,
            }),
        }
    }

    /// Answers every matching request with `response` after queued ones are used
    pub fn always(&self, url_contains: &str, response: Result<Value>) {
        let mut routes = self.routes.lock().unwrap_or_else(|p| p.into_inner());
        match routes.iter_mut().find(|r| r.url_contains == url_contains) {
            Some(route) => route.repeat = Some(response),
            None => routes.push(Route {
                url_contains: url_contains.to_string(),
                responses: VecDeque::new(),
                repeat: Some(response),
            }),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Requests whose url contains `url_contains`
    pub fn count_matching(&self, url_contains: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|r| r.url.contains(url_contains))
            .count()
    }

    fn next_response(&self, url: &str) -> Result<Value> {
        {
            let mut routes = self.routes.lock().unwrap_or_else(|p| p.into_inner());
            for route in routes.iter_mut().filter(|r| url.contains(&r.url_contains)) {
                if let Some(response) = route.responses.pop_front() {
                    return response;
                }
                if let Some(response) = &route.repeat {
                    return response.clone();
                }
            }
        }
        self.fallback
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or_else(|| {
                Err(MarketDataError::Network(format!("no scripted response for {}", url)))
            })
    }
}

#[async_trait]
impl HttpTransport for MockHttpTransport {
    async fn get_json(&self, request: &HttpRequest) -> Result<Value> {
        debug!("mock GET {} {:?}", request.url, request.query);
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());
        self.next_response(&request.url)
    }
}
