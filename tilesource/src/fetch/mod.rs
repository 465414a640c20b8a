//! Network access for metadata and tiles.
//!
//! # Example
//!
//! ```ignore
//! use tilesource::fetch::{ReqwestFetcher, ResourceFetcher, Request};
//!
//! let fetcher = ReqwestFetcher::new()?;
//! let resource = fetcher.fetch(&Request::new("https://tiles.example.com/0/0/0.pbf")).await?;
//! println!("{} bytes, cache-control {:?}", resource.data.len(), resource.expiry.cache_control);
//! ```

mod http;
mod request;

pub use http::{
    fetch_json, FetchFuture, FetchedResource, ReqwestFetcher, ResourceFetcher,
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};
pub use request::{
    AccessTokenNormalizer, IdentityTransform, PassthroughNormalizer, Request, RequestTransform,
    ResourceKind, UrlNormalizer,
};

#[cfg(test)]
pub use http::tests::MockFetcher;
