use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How long before expiry a cached credential stops being handed out.
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(60);

/// Failure to obtain a credential from the authorization endpoint.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CredentialRefreshError {
    #[error("authorization request failed: {0}")]
    Transport(String),
    #[error("authorization endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed authorization response: {0}")]
    Malformed(String),
    #[error("authorization request timed out")]
    Timeout,
}

/// What a source hands back: the bearer and how long it stays valid.
#[derive(Debug, Clone)]
pub struct FetchedCredential {
    pub bearer: String,
    pub expires_in: Duration,
}

/// Cached bearer with its absolute expiry.
#[derive(Debug, Clone)]
pub struct ExternalCredential {
    pub bearer: String,
    pub expires_at: Instant,
}

impl ExternalCredential {
    fn is_fresh(&self, skew: Duration, now: Instant) -> bool {
        now.checked_add(skew).is_some_and(|deadline| deadline < self.expires_at)
    }
}

/// Obtains a new credential from the remote authorization endpoint.
pub trait CredentialSource: Send + Sync + 'static {
    fn fetch(
        &self,
    ) -> impl Future<Output = Result<FetchedCredential, CredentialRefreshError>> + Send;
}

type InflightFetch = Shared<BoxFuture<'static, Result<ExternalCredential, CredentialRefreshError>>>;

struct CacheState {
    credential: Option<ExternalCredential>,
    /// Refresh in progress, tagged so a finished flight only clears itself.
    inflight: Option<(u64, InflightFetch)>,
    next_flight: u64,
}

/// Lazily refreshed credential shared by all outbound calls.
///
/// The lock covers the freshness check and the decision to refresh. The
/// network call runs outside it as a shared future: the first caller to see
/// a stale credential starts it, later callers await the same future, and
/// everyone observes the same result.
pub struct ExternalTokenCache<S> {
    source: Arc<S>,
    refresh_skew: Duration,
    fetch_timeout: Duration,
    state: Mutex<CacheState>,
}

impl<S: CredentialSource> ExternalTokenCache<S> {
    pub fn new(source: S, refresh_skew: Duration, fetch_timeout: Duration) -> Self {
        Self {
            source: Arc::new(source),
            refresh_skew,
            fetch_timeout,
            state: Mutex::new(CacheState {
                credential: None,
                inflight: None,
                next_flight: 0,
            }),
        }
    }

    /// Return a bearer valid for at least the refresh skew, refreshing if needed.
    ///
    /// A failed refresh clears the cache; the next call tries again.
    pub async fn get_credential(&self) -> Result<String, CredentialRefreshError> {
        let (flight_id, flight) = {
            let mut state = self.state.lock().await;

            if let Some(credential) = &state.credential {
                if credential.is_fresh(self.refresh_skew, Instant::now()) {
                    return Ok(credential.bearer.clone());
                }
            }

            let joined = state
                .inflight
                .as_ref()
                .map(|(id, flight)| (*id, flight.clone()));

            match joined {
                Some(existing) => existing,
                None => {
                    let id = state.next_flight;
                    state.next_flight += 1;
                    let flight = self.start_fetch();
                    state.inflight = Some((id, flight.clone()));
                    debug!(flight = id, "Refreshing external credential");
                    (id, flight)
                }
            }
        };

        let result = flight.await;

        let mut state = self.state.lock().await;
        if state
            .inflight
            .as_ref()
            .is_some_and(|(id, _)| *id == flight_id)
        {
            state.inflight = None;
            match &result {
                Ok(credential) => {
                    info!("External credential refreshed");
                    state.credential = Some(credential.clone());
                }
                Err(e) => {
                    warn!(error = %e, "External credential refresh failed");
                    state.credential = None;
                }
            }
        }

        result.map(|credential| credential.bearer)
    }

    /// Drop the cached credential, e.g. after the downstream API rejected it.
    pub async fn invalidate(&self) {
        self.state.lock().await.credential = None;
    }

    /// Attach a current bearer to an outbound request.
    pub async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, CredentialRefreshError> {
        let bearer = self.get_credential().await?;
        Ok(request.bearer_auth(bearer))
    }

    /// Keep the credential warm by refreshing it every `period`.
    pub fn spawn_keep_warm(self: Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);

            loop {
                interval.tick().await;
                if let Err(e) = self.get_credential().await {
                    warn!(error = %e, "Keep-warm refresh failed");
                }
            }
        })
    }

    fn start_fetch(&self) -> InflightFetch {
        let source = self.source.clone();
        let timeout = self.fetch_timeout;

        async move {
            let fetched = tokio::time::timeout(timeout, source.fetch())
                .await
                .map_err(|_| CredentialRefreshError::Timeout)??;

            let expires_at = Instant::now()
                .checked_add(fetched.expires_in)
                .ok_or_else(|| {
                    CredentialRefreshError::Malformed(format!(
                        "expires_in out of range: {}s",
                        fetched.expires_in.as_secs()
                    ))
                })?;

            Ok(ExternalCredential {
                bearer: fetched.bearer,
                expires_at,
            })
        }
        .boxed()
        .shared()
    }
}
