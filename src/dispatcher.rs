//! Multi-credential, rate-limited request dispatcher.
//!
//! Every credential carries one token bucket per endpoint type. A request
//! takes a token from the least loaded credential that has one, injects that
//! credential into the query string and classifies the provider's answer:
//! success, terminal (quota or access denied, never retried) or transient
//! (retried with exponential backoff and jitter).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::error::{DispatchError, Error, Result};
use crate::rate_limit::TokenBucket;
use crate::retry::RetryPolicy;

/// Endpoint type tag for batched driving-distance requests.
pub const DISTANCE_MATRIX: &str = "distance_matrix";

/// An API key and its per-endpoint-type request budget (requests/second).
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub key: String,
    pub limits: BTreeMap<String, f64>,
}

impl CredentialConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            limits: BTreeMap::new(),
        }
    }

    pub fn with_limit(mut self, endpoint: impl Into<String>, qps: f64) -> Self {
        self.limits.insert(endpoint.into(), qps);
        self
    }
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("key", &"<redacted>")
            .field("limits", &self.limits)
            .finish()
    }
}

/// How to read the provider-defined status field of a JSON response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusPolicy {
    pub status_field: String,
    pub message_field: String,
    pub success_code: i64,
    /// Quota exhaustion and access-denied codes.
    pub terminal_codes: Vec<i64>,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            status_field: "status".to_string(),
            message_field: "message".to_string(),
            success_code: 0,
            terminal_codes: vec![4, 5, 301, 302],
        }
    }
}

impl StatusPolicy {
    fn classify(&self, body: Value) -> std::result::Result<Value, AttemptError> {
        let Some(code) = body.get(&self.status_field).and_then(status_code) else {
            return Err(AttemptError::Transient(format!(
                "response has no `{}` field",
                self.status_field
            )));
        };
        if code == self.success_code {
            return Ok(body);
        }

        let message = body
            .get(&self.message_field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if self.terminal_codes.contains(&code) {
            Err(AttemptError::Terminal {
                code,
                message,
                exhausts_credential: true,
            })
        } else {
            Err(AttemptError::Transient(format!("status {code}: {message}")))
        }
    }
}

fn status_code(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub credentials: Vec<CredentialConfig>,
    /// Query parameter the credential key is injected as.
    pub credential_param: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Longest a caller waits for rate-limit capacity before giving up.
    pub acquire_timeout_ms: u64,
    /// Upper bound for a single wait between capacity checks.
    pub poll_interval_ms: u64,
    pub retry: RetryPolicy,
    pub status: StatusPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            credential_param: "ak".to_string(),
            user_agent: concat!("ev-route-planner/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 10,
            acquire_timeout_ms: 30_000,
            poll_interval_ms: 50,
            retry: RetryPolicy::default(),
            status: StatusPolicy::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.credentials.is_empty() {
            return Err(Error::config("dispatcher needs at least one credential"));
        }
        for (index, credential) in self.credentials.iter().enumerate() {
            if credential.key.trim().is_empty() {
                return Err(Error::config(format!("credential #{index} has an empty key")));
            }
            for (endpoint, qps) in &credential.limits {
                if !qps.is_finite() || *qps <= 0.0 {
                    return Err(Error::config(format!(
                        "credential #{index} has a non-positive budget for {endpoint}"
                    )));
                }
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::config("poll_interval_ms must be positive"));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::config("request_timeout_secs must be positive"));
        }
        self.retry.validate().map_err(Error::config)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Outcome of a single HTTP attempt.
#[derive(Debug)]
enum AttemptError {
    Terminal {
        code: i64,
        message: String,
        exhausts_credential: bool,
    },
    Transient(String),
}

struct CredentialSlot {
    key: String,
    buckets: HashMap<String, Mutex<TokenBucket>>,
    in_flight: AtomicUsize,
}

impl CredentialSlot {
    fn new(config: &CredentialConfig, now: Instant) -> Self {
        let buckets = config
            .limits
            .iter()
            .map(|(endpoint, qps)| (endpoint.clone(), Mutex::new(TokenBucket::new(*qps, now))))
            .collect();
        Self {
            key: config.key.clone(),
            buckets,
            in_flight: AtomicUsize::new(0),
        }
    }

    fn try_acquire(&self, endpoint: &str, now: Instant) -> bool {
        self.buckets.get(endpoint).is_some_and(|bucket| {
            let mut bucket = lock(bucket);
            !bucket.is_exhausted() && bucket.try_acquire(now)
        })
    }
}

/// A consumed token on one credential; the in-flight count drops with it.
struct Lease<'a> {
    index: usize,
    slot: &'a CredentialSlot,
}

impl<'a> Lease<'a> {
    fn new(index: usize, slot: &'a CredentialSlot) -> Self {
        slot.in_flight.fetch_add(1, Ordering::SeqCst);
        Self { index, slot }
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.slot.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Thread-safe dispatcher over a pool of credentials.
///
/// Bucket state is locked per (credential, endpoint type), so unrelated
/// credentials and endpoint types never contend. The HTTP session is created
/// on first use and can be closed at any time; requests already holding the
/// session finish on their own handle.
pub struct Dispatcher {
    config: DispatcherConfig,
    slots: Vec<CredentialSlot>,
    session: Mutex<Option<Client>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("credentials", &self.slots.len())
            .field("session_open", &self.is_session_open())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Result<Self> {
        config.validate()?;
        let now = Instant::now();
        let slots = config
            .credentials
            .iter()
            .map(|credential| CredentialSlot::new(credential, now))
            .collect();
        Ok(Self {
            config,
            slots,
            session: Mutex::new(None),
        })
    }

    pub fn credential_count(&self) -> usize {
        self.slots.len()
    }

    /// Credentials configured for `endpoint` that have not been exhausted.
    pub fn usable_credentials(&self, endpoint: &str) -> usize {
        self.slots
            .iter()
            .filter(|slot| {
                slot.buckets
                    .get(endpoint)
                    .is_some_and(|bucket| !lock(bucket).is_exhausted())
            })
            .count()
    }

    /// Issue a request against `url`, retrying transient failures.
    pub fn fetch(
        &self,
        endpoint: &str,
        url: &str,
        params: &[(String, String)],
    ) -> std::result::Result<Value, DispatchError> {
        self.dispatch(endpoint, url, params, None, &CancelToken::new())
    }

    /// Like [`Dispatcher::fetch`], preferring the `lane`-th usable credential
    /// when it has capacity.
    pub fn fetch_in_lane(
        &self,
        lane: usize,
        endpoint: &str,
        url: &str,
        params: &[(String, String)],
        cancel: &CancelToken,
    ) -> std::result::Result<Value, DispatchError> {
        self.dispatch(endpoint, url, params, Some(lane), cancel)
    }

    pub fn is_session_open(&self) -> bool {
        lock(&self.session).is_some()
    }

    /// Drop the shared session. Safe to call repeatedly and concurrently.
    pub fn close(&self) {
        if lock(&self.session).take().is_some() {
            debug!("closed dispatcher HTTP session");
        }
    }

    fn dispatch(
        &self,
        endpoint: &str,
        url: &str,
        params: &[(String, String)],
        lane: Option<usize>,
        cancel: &CancelToken,
    ) -> std::result::Result<Value, DispatchError> {
        let retry = &self.config.retry;
        let started = Instant::now();
        let mut rng = rand::thread_rng();
        let mut attempts = 0;
        let mut last_error = String::new();

        while attempts < retry.max_attempts {
            attempts += 1;
            let lease = self.acquire(endpoint, lane, cancel)?;
            let client = self.client()?;

            match self.execute(&client, &lease, url, params) {
                Ok(body) => return Ok(body),
                Err(AttemptError::Terminal {
                    code,
                    message,
                    exhausts_credential,
                }) => {
                    warn!(
                        credential = lease.index,
                        endpoint,
                        code,
                        %message,
                        "provider returned a terminal status"
                    );
                    if exhausts_credential {
                        self.mark_exhausted(lease.index, endpoint);
                    }
                    return Err(DispatchError::Terminal { code, message });
                }
                Err(AttemptError::Transient(error)) => last_error = error,
            }
            drop(lease);

            if attempts >= retry.max_attempts {
                break;
            }
            let delay = retry.delay_for(attempts, &mut rng);
            if started.elapsed() + delay > retry.max_elapsed() {
                break;
            }
            warn!(
                attempt = attempts,
                endpoint,
                error = %last_error,
                delay_ms = delay.as_millis() as u64,
                "transient provider failure, retrying"
            );
            if !cancel.sleep(delay) {
                return Err(DispatchError::Cancelled);
            }
        }

        Err(DispatchError::Transient {
            attempts,
            last_error,
        })
    }

    /// Wait until some credential supporting `endpoint` can spend a token.
    fn acquire(
        &self,
        endpoint: &str,
        lane: Option<usize>,
        cancel: &CancelToken,
    ) -> std::result::Result<Lease<'_>, DispatchError> {
        let started = Instant::now();
        let acquire_timeout = self.config.acquire_timeout();

        loop {
            if cancel.is_cancelled() {
                return Err(DispatchError::Cancelled);
            }

            let now = Instant::now();
            let mut usable = Vec::new();
            let mut ready = Vec::new();
            let mut wait = self.config.poll_interval();
            for (index, slot) in self.slots.iter().enumerate() {
                let Some(bucket) = slot.buckets.get(endpoint) else {
                    continue;
                };
                let mut bucket = lock(bucket);
                if bucket.is_exhausted() {
                    continue;
                }
                usable.push(index);
                if bucket.available(now) >= 1.0 {
                    ready.push((index, slot.in_flight.load(Ordering::SeqCst)));
                } else {
                    wait = wait.min(bucket.time_until_available());
                }
            }

            if usable.is_empty() {
                return Err(DispatchError::NoCredential {
                    endpoint: endpoint.to_string(),
                });
            }

            if let Some(index) = choose_credential(&ready, &usable, lane) {
                let slot = &self.slots[index];
                if slot.try_acquire(endpoint, Instant::now()) {
                    return Ok(Lease::new(index, slot));
                }
                // Another caller took the token between the scan and now.
                continue;
            }

            if started.elapsed() >= acquire_timeout {
                return Err(DispatchError::AcquireTimeout {
                    endpoint: endpoint.to_string(),
                });
            }
            if !cancel.sleep(wait) {
                return Err(DispatchError::Cancelled);
            }
        }
    }

    fn client(&self) -> std::result::Result<Client, DispatchError> {
        let mut session = lock(&self.session);
        if let Some(client) = session.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .user_agent(self.config.user_agent.clone())
            .build()
            .map_err(|err| DispatchError::Client {
                message: err.to_string(),
            })?;
        debug!("created dispatcher HTTP session");
        *session = Some(client.clone());
        Ok(client)
    }

    fn execute(
        &self,
        client: &Client,
        lease: &Lease<'_>,
        url: &str,
        params: &[(String, String)],
    ) -> std::result::Result<Value, AttemptError> {
        let response = client
            .get(url)
            .query(params)
            .query(&[(self.config.credential_param.as_str(), lease.slot.key.as_str())])
            .send()
            .map_err(|err| AttemptError::Transient(err.without_url().to_string()))?;

        let status = response.status();
        if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            return Err(AttemptError::Transient(format!("http status {status}")));
        }
        if status.is_client_error() {
            return Err(AttemptError::Terminal {
                code: i64::from(status.as_u16()),
                message: format!("http status {status}"),
                exhausts_credential: matches!(
                    status,
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
                ),
            });
        }

        let text = response
            .text()
            .map_err(|err| AttemptError::Transient(err.without_url().to_string()))?;
        let body: Value = serde_json::from_str(&text)
            .map_err(|err| AttemptError::Transient(format!("malformed payload: {err}")))?;
        self.config.status.classify(body)
    }

    fn mark_exhausted(&self, index: usize, endpoint: &str) {
        if let Some(bucket) = self.slots[index].buckets.get(endpoint) {
            lock(bucket).mark_exhausted();
            warn!(credential = index, endpoint, "credential disabled for endpoint");
        }
    }
}

/// Pick among credentials holding a token: the lane's credential when it is
/// ready, otherwise the one with the fewest requests in flight (random among
/// ties).
fn choose_credential(
    ready: &[(usize, usize)],
    usable: &[usize],
    lane: Option<usize>,
) -> Option<usize> {
    if let Some(lane) = lane {
        let preferred = usable[lane % usable.len()];
        if ready.iter().any(|(index, _)| *index == preferred) {
            return Some(preferred);
        }
    }

    let least = ready.iter().map(|(_, load)| *load).min()?;
    let idle: Vec<usize> = ready
        .iter()
        .filter(|(_, load)| *load == least)
        .map(|(index, _)| *index)
        .collect();
    idle.choose(&mut rand::thread_rng()).copied()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
