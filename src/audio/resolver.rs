use crate::audio::track::TrackRef;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult, ResolveError};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

/// Turns free text or a link into a queue entry.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query_or_url: &str) -> AppResult<TrackRef>;
}

/// Accepts http(s) links as-is. Anything else is reported as no results so a
/// chain can fall through to a search backend.
#[derive(Debug, Default, Clone)]
pub struct DirectLinkResolver;

impl DirectLinkResolver {
    pub fn new() -> Self {
        Self
    }

    fn resolve_link(&self, input: &str) -> Result<TrackRef, ResolveError> {
        let mut url = Url::parse(input).map_err(|_| ResolveError::NoResults(input.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ResolveError::NoResults(input.to_string()));
        }
        url.set_fragment(None);

        let title = title_from_url(&url);
        let id = format!("url:{}", url);
        Ok(TrackRef::new(id, url.to_string(), title))
    }
}

#[async_trait]
impl TrackResolver for DirectLinkResolver {
    async fn resolve(&self, query_or_url: &str) -> AppResult<TrackRef> {
        Ok(self.resolve_link(query_or_url.trim())?)
    }
}

fn title_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| {
            urlencoding::decode(s)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| s.to_string())
        });

    match segment {
        Some(title) => title,
        None => url.host_str().unwrap_or("Unknown Title").to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    #[serde(alias = "link", alias = "webpage_url")]
    url: String,
    title: String,
    #[serde(default)]
    duration: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchBody {
    List(Vec<SearchHit>),
    Wrapped {
        #[serde(alias = "result", alias = "entries")]
        results: Vec<SearchHit>,
    },
}

/// Queries a JSON search endpoint and takes the top hit.
///
/// The endpoint is a URL template with a `{query}` placeholder. The body may
/// be a bare array of hits or an object wrapping one under `results`,
/// `result` or `entries`.
pub struct HttpSearchResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSearchResolver {
    pub fn new(endpoint: impl Into<String>, user_agent: &str) -> AppResult<Self> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn search_url(&self, query: &str) -> String {
        self.endpoint
            .replace("{query}", &urlencoding::encode(query))
    }
}

#[async_trait]
impl TrackResolver for HttpSearchResolver {
    async fn resolve(&self, query_or_url: &str) -> AppResult<TrackRef> {
        let query = query_or_url.trim();
        let url = self.search_url(query);
        log::info!("[resolve] searching: {}", query);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolveError::Service(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Service(format!("search returned HTTP {}", status)).into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| ResolveError::Service(e.to_string()))?;
        Ok(parse_search_body(query, &body)?)
    }
}

fn parse_search_body(query: &str, body: &str) -> Result<TrackRef, ResolveError> {
    let parsed: SearchBody = serde_json::from_str(body)
        .map_err(|e| ResolveError::Service(format!("unreadable search response: {}", e)))?;
    let hits = match parsed {
        SearchBody::List(hits) => hits,
        SearchBody::Wrapped { results } => results,
    };

    let top = hits
        .into_iter()
        .next()
        .ok_or_else(|| ResolveError::NoResults(query.to_string()))?;

    let title = match top.duration.as_ref().and_then(format_duration) {
        Some(duration) => format!("{} ({})", top.title, duration),
        None => top.title,
    };
    Ok(TrackRef::new(top.id, top.url, title))
}

/// Search backends report duration either as display text ("3:45") or as a
/// number of seconds.
fn format_duration(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => n.as_f64().map(|secs| format!("{}s", secs.round() as u64)),
        _ => None,
    }
}

/// Tries each resolver in order and returns the first hit.
#[derive(Clone, Default)]
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn TrackResolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: Arc<dyn TrackResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Direct links first, then the configured search endpoint if any.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let mut chain = Self::new().with(Arc::new(DirectLinkResolver::new()));
        if let Some(endpoint) = &config.search_endpoint {
            chain = chain.with(Arc::new(HttpSearchResolver::new(
                endpoint.clone(),
                &config.user_agent,
            )?));
        }
        Ok(chain)
    }
}

#[async_trait]
impl TrackResolver for ResolverChain {
    async fn resolve(&self, query_or_url: &str) -> AppResult<TrackRef> {
        let mut last_failure: Option<AppError> = None;

        for resolver in &self.resolvers {
            match resolver.resolve(query_or_url).await {
                Ok(track) => return Ok(track),
                Err(AppError::ResolveFailed(ResolveError::NoResults(_))) => {}
                Err(e) => {
                    log::warn!("[resolve] backend failed for '{}': {}", query_or_url, e);
                    last_failure = Some(e);
                }
            }
        }

        Err(last_failure
            .unwrap_or_else(|| ResolveError::NoResults(query_or_url.trim().to_string()).into()))
    }
}
