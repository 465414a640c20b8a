//! Loading source metadata.

use super::types::{SourceDescriptor, SourceOptions, TileJson, DEFAULT_TILE_SIZE};
use crate::error::SourceError;
use crate::fetch::{
    fetch_json, IdentityTransform, PassthroughNormalizer, RequestTransform, ResourceFetcher,
    ResourceKind, UrlNormalizer,
};
use reqwest::Url;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Collaborators needed to fetch metadata.
#[derive(Clone)]
pub struct MetadataContext {
    pub fetcher: Arc<dyn ResourceFetcher>,
    pub transform: Arc<dyn RequestTransform>,
    pub normalizer: Arc<dyn UrlNormalizer>,
}

impl MetadataContext {
    /// Context with no request transform and no URL normalization.
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            fetcher,
            transform: Arc::new(IdentityTransform),
            normalizer: Arc::new(PassthroughNormalizer),
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn RequestTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Arc<dyn UrlNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }
}

/// Handle to an in-flight metadata load.
pub struct MetadataRequest {
    cancel: CancellationToken,
    rx: oneshot::Receiver<Result<SourceDescriptor, SourceError>>,
}

impl MetadataRequest {
    /// Cancels the load. A later [`wait`](Self::wait) yields
    /// `Err(SourceError::Cancelled)`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token that cancels this load, for holders that do not own the
    /// request.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the resolved descriptor.
    pub async fn wait(self) -> Result<SourceDescriptor, SourceError> {
        let result = self.rx.await.unwrap_or(Err(SourceError::Cancelled));
        if self.cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        result
    }
}

/// Starts resolving `options` into a [`SourceDescriptor`].
///
/// With explicit `tiles` no request is made, but the result still arrives
/// asynchronously (after one scheduler yield) so callers observe the same
/// ordering either way.
pub fn load_tilejson(options: SourceOptions, context: MetadataContext) -> MetadataRequest {
    let cancel = CancellationToken::new();
    let (tx, rx) = oneshot::channel();

    let token = cancel.clone();
    tokio::spawn(async move {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            result = resolve(&options, &context) => result,
        };
        if token.is_cancelled() {
            return;
        }
        let _ = tx.send(result);
    });

    MetadataRequest { cancel, rx }
}

async fn resolve(
    options: &SourceOptions,
    context: &MetadataContext,
) -> Result<SourceDescriptor, SourceError> {
    if options.tiles.is_some() {
        tokio::task::yield_now().await;
        return SourceDescriptor::resolve(options, None);
    }

    let Some(url) = options.url.as_deref() else {
        return Err(SourceError::Parse(
            "vector source needs either `url` or `tiles`".to_string(),
        ));
    };

    let normalized = context.normalizer.normalize_source_url(url);
    let request = context.transform.transform(&normalized, ResourceKind::Source);
    debug!(url = %request.url, "Fetching TileJSON");

    let mut tilejson: TileJson = match fetch_json(context.fetcher.as_ref(), &request).await {
        Ok(tilejson) => tilejson,
        Err(e) => {
            warn!(url = %request.url, error = %e, "TileJSON request failed");
            return Err(e);
        }
    };

    let tile_size = options
        .tile_size
        .or(tilejson.tile_size)
        .unwrap_or(DEFAULT_TILE_SIZE);
    if let Some(templates) = tilejson.tiles.take() {
        let canonical = templates
            .iter()
            .map(|template| canonicalize_template(template, &request.url))
            .map(|template| context.normalizer.normalize_tile_url(&template, tile_size))
            .collect();
        tilejson.tiles = Some(canonical);
    }

    let descriptor = SourceDescriptor::resolve(options, Some(tilejson))?;
    info!(
        url = %request.url,
        templates = descriptor.tiles.len(),
        minzoom = descriptor.min_zoom,
        maxzoom = descriptor.max_zoom,
        "TileJSON loaded"
    );
    Ok(descriptor)
}

/// Resolves a relative tile template against the URL the TileJSON came from.
///
/// Absolute templates are returned unchanged. Placeholder braces survive the
/// join.
pub fn canonicalize_template(template: &str, base: &str) -> String {
    if template.contains("://") {
        return template.to_string();
    }
    match Url::parse(base).and_then(|base| base.join(template)) {
        Ok(joined) => joined
            .as_str()
            .replace("%7B", "{")
            .replace("%7D", "}"),
        Err(e) => {
            debug!(template = template, base = base, error = %e, "Template left relative");
            template.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{AccessTokenNormalizer, MockFetcher, Request};
    use serde_json::json;

    const TILEJSON_URL: &str = "https://t.example.com/v1/streets.json";

    fn context(fetcher: &Arc<MockFetcher>) -> MetadataContext {
        MetadataContext::new(Arc::clone(fetcher) as Arc<dyn ResourceFetcher>)
    }

    #[tokio::test]
    async fn test_explicit_tiles_skip_network() {
        let fetcher = Arc::new(MockFetcher::new());
        let options = SourceOptions::from_tiles(["https://t.example.com/{z}/{x}/{y}.pbf"]);

        let descriptor = load_tilejson(options, context(&fetcher)).wait().await.unwrap();
        assert_eq!(descriptor.tiles.len(), 1);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fetched_metadata_is_merged() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond_json(
            TILEJSON_URL,
            json!({
                "minzoom": 0,
                "maxzoom": 14,
                "tiles": ["https://t.example.com/{z}/{x}/{y}.pbf"],
                "vector_layers": [{ "id": "roads" }]
            }),
        );
        let options = SourceOptions::from_url(TILEJSON_URL).with_min_zoom(3);

        let descriptor = load_tilejson(options, context(&fetcher)).wait().await.unwrap();
        assert_eq!((descriptor.min_zoom, descriptor.max_zoom), (3, 14));
        assert_eq!(descriptor.vector_layer_ids, Some(vec!["roads".to_string()]));
    }

    #[tokio::test]
    async fn test_relative_templates_are_canonicalized() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond_json(TILEJSON_URL, json!({ "tiles": ["tiles/{z}/{x}/{y}.pbf"] }));

        let descriptor = load_tilejson(SourceOptions::from_url(TILEJSON_URL), context(&fetcher))
            .wait()
            .await
            .unwrap();
        assert_eq!(
            descriptor.tiles,
            vec!["https://t.example.com/v1/tiles/{z}/{x}/{y}.pbf".to_string()]
        );
    }

    #[tokio::test]
    async fn test_normalizer_and_transform_are_applied() {
        let fetcher = Arc::new(MockFetcher::new());
        let token_url = format!("{}?access_token=pk.1", TILEJSON_URL);
        fetcher.respond_json(
            &token_url,
            json!({ "tiles": ["https://t.example.com/{z}/{x}/{y}.pbf"] }),
        );
        let transform = |url: &str, _kind: ResourceKind| Request::new(url).with_header("X-Id", "1");
        let ctx = context(&fetcher)
            .with_normalizer(Arc::new(AccessTokenNormalizer::new("pk.1")))
            .with_transform(Arc::new(transform));

        let descriptor = load_tilejson(SourceOptions::from_url(TILEJSON_URL), ctx)
            .wait()
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), vec![token_url]);
        assert_eq!(
            descriptor.tiles[0],
            "https://t.example.com/{z}/{x}/{y}.pbf?access_token=pk.1"
        );
    }

    #[tokio::test]
    async fn test_errors_surface_verbatim() {
        let fetcher = Arc::new(MockFetcher::new());
        let err = load_tilejson(SourceOptions::from_url(TILEJSON_URL), context(&fetcher))
            .wait()
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SourceError::NotFound {
                url: TILEJSON_URL.to_string()
            }
        );
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_suppresses_result() {
        let fetcher = Arc::new(MockFetcher::gated());
        fetcher.respond_json(TILEJSON_URL, json!({ "tiles": ["x"] }));

        let request = load_tilejson(SourceOptions::from_url(TILEJSON_URL), context(&fetcher));
        request.cancel();
        fetcher.release(1);

        assert_eq!(request.wait().await, Err(SourceError::Cancelled));
    }

    #[tokio::test]
    async fn test_missing_url_and_tiles_is_parse_error() {
        let fetcher = Arc::new(MockFetcher::new());
        let err = load_tilejson(SourceOptions::default(), context(&fetcher))
            .wait()
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn test_absolute_template_unchanged() {
        let template = "https://a.example.com/{z}/{x}/{y}.pbf";
        assert_eq!(canonicalize_template(template, TILEJSON_URL), template);
    }
}
