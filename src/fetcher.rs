use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::{Url, blocking::Client};
use serde_json::Value;
use tracing::{debug, error, info, info_span, instrument, trace};
use tracing_error::SpanTrace;

use crate::domain::{Filter, PVError, Record};

/// Backend data access. Returns every record of `table` matching `filter`.
pub trait TableSource: Send + Sync {
    fn get_table_data(&self, table: &str, filter: &Filter) -> Result<Vec<Record>, PVError>;
}

/// Reads tables from a REST backend at `{base_url}/api/{table}`.
pub struct HttpTableSource {
    base_url: Url,
    client: Client,
}

impl HttpTableSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PVError> {
        let base_url = base_url.into();
        let parsed = Url::parse(&base_url)
            .map_err(|e| PVError::InvalidConfig(format!("base url \"{base_url}\": {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(PVError::InvalidConfig(format!(
                "base url \"{base_url}\" cannot hold a path"
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: parsed,
            client,
        })
    }

    /// The table name always ends up as one encoded path segment.
    fn url_for(&self, table: &str) -> Result<Url, PVError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PVError::InvalidConfig(format!("base url \"{}\" cannot hold a path", self.base_url))
            })?
            .pop_if_empty()
            .push("api")
            .push(table);
        Ok(url)
    }

    // Strings go out verbatim, everything else as compact json.
    fn query_pairs(filter: &Filter) -> Vec<(String, String)> {
        filter
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

impl TableSource for HttpTableSource {
    #[instrument(level = "debug", skip(self, filter))]
    fn get_table_data(&self, table: &str, filter: &Filter) -> Result<Vec<Record>, PVError> {
        let url = self.url_for(table)?;
        let started = Instant::now();
        let response = self
            .client
            .get(url.clone())
            .query(&Self::query_pairs(filter))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(PVError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<Value>(&body)? {
            Value::Array(records) => {
                info!(
                    "Fetched {} records from {url} in {}ms",
                    records.len(),
                    started.elapsed().as_millis()
                );
                Ok(records)
            }
            other => Err(PVError::Decode(format!(
                "expected a json array, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

struct FetchReply {
    request_id: u64,
    result: Result<Vec<Record>, PVError>,
}

/// Reply slot of one request. Dropped without a reply, e.g. when the source
/// panicked, it answers with `PVError::FetchAborted`.
struct ReplySender {
    request_id: u64,
    sender: Option<Sender<FetchReply>>,
}

impl ReplySender {
    fn send(mut self, result: Result<Vec<Record>, PVError>) {
        if let Some(sender) = self.sender.take() {
            deliver(&sender, FetchReply {
                request_id: self.request_id,
                result,
            });
        }
    }
}

impl Drop for ReplySender {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            error!("Request {} ended without a reply", self.request_id);
            deliver(&sender, FetchReply {
                request_id: self.request_id,
                result: Err(PVError::FetchAborted),
            });
        }
    }
}

fn deliver(sender: &Sender<FetchReply>, reply: FetchReply) {
    // The receiving side lives as long as the fetcher, a failed send only means shutdown.
    if sender.send(reply).is_err() {
        trace!("Fetcher gone, dropping reply");
    }
}

/// Runs table requests off the UI thread.
///
/// Every request gets a new id and answers exactly once over the channel.
/// Only the answer to the latest request is handed out by `poll`, answers of
/// superseded requests are dropped.
pub struct DataFetcher {
    source: Arc<dyn TableSource>,
    sender: Sender<FetchReply>,
    receiver: Receiver<FetchReply>,
    latest_request: u64,
    pending: bool,
}

impl DataFetcher {
    pub fn new(source: Arc<dyn TableSource>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            source,
            sender,
            receiver,
            latest_request: 0,
            pending: false,
        }
    }

    pub fn request(&mut self, table: &str, filter: &Filter) -> Result<u64, PVError> {
        if table.trim().is_empty() {
            return Err(PVError::InvalidConfig(
                "collection name must not be empty".into(),
            ));
        }

        let request_id = self.latest_request + 1;
        let source = Arc::clone(&self.source);
        let sender = self.sender.clone();
        let table = table.to_string();
        let filter = filter.clone();
        let span = info_span!("fetch", request_id, table = %table);

        thread::Builder::new()
            .name(format!("fetch-{request_id}"))
            .spawn(move || {
                let _entered = span.enter();
                let reply = ReplySender {
                    request_id,
                    sender: Some(sender),
                };
                let result = source.get_table_data(&table, &filter);
                if let Err(e) = &result {
                    debug!("Request failed: {e}\n{}", SpanTrace::capture());
                }
                reply.send(result);
            })?;

        self.latest_request = request_id;
        self.pending = true;
        debug!("Issued request {request_id}");
        Ok(request_id)
    }

    /// Non blocking. Returns the result of the latest request once it arrived.
    pub fn poll(&mut self) -> Option<Result<Vec<Record>, PVError>> {
        let mut latest = None;
        loop {
            match self.receiver.try_recv() {
                Ok(reply) if reply.request_id == self.latest_request => {
                    self.pending = false;
                    latest = Some(reply.result);
                }
                Ok(reply) => {
                    debug!(
                        "Discarding reply of superseded request {} (latest {})",
                        reply.request_id, self.latest_request
                    );
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        latest
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn latest_request(&self) -> u64 {
        self.latest_request
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    use serde_json::json;

    use super::*;

    /// Answers with canned records, optionally after a fixed delay.
    pub struct StaticSource {
        response: Mutex<Result<Vec<Record>, String>>,
        delay: Option<Duration>,
        pub calls: Mutex<Vec<(String, Filter)>>,
    }

    impl StaticSource {
        pub fn products(n: usize) -> Self {
            Self::answering(Ok(product_records(n)))
        }

        pub fn failing(message: &str) -> Self {
            Self::answering(Err(message.to_string()))
        }

        fn answering(response: Result<Vec<Record>, String>) -> Self {
            Self {
                response: Mutex::new(response),
                delay: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Every following call fails with `message`.
        pub fn fail_with(&self, message: &str) {
            *self.response.lock().unwrap() = Err(message.to_string());
        }
    }

    impl TableSource for StaticSource {
        fn get_table_data(&self, table: &str, filter: &Filter) -> Result<Vec<Record>, PVError> {
            self.calls
                .lock()
                .unwrap()
                .push((table.to_string(), filter.clone()));
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            self.response.lock().unwrap().clone().map_err(PVError::Network)
        }
    }

    pub fn product_records(n: usize) -> Vec<Record> {
        (1..=n)
            .map(|id| json!({"id": id, "name": format!("Product {id}"), "price": id as f64 * 1.5}))
            .collect()
    }

    pub fn wait_for(fetcher: &mut DataFetcher) -> Result<Vec<Record>, PVError> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(result) = fetcher.poll() {
                return result;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("no fetch result within 5s");
    }
}
