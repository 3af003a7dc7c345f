//! `vodplay` - adaptive HLS playback controller
//!
//! # Features
//!
//! - **Stream sessions**: bind a stream URL to a playback surface, picking
//!   native playback or an in-process HLS engine per surface
//! - **Fault recovery**: network faults reload, media faults reset the
//!   decode pipeline in place, everything else fails once and loudly
//! - **HLS engine**: master/media playlists, live refresh, parallel segment
//!   fetch with retries, bounded back buffer
//! - **Catalog client**: list uploaded videos and resolve their streams
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vodplay::{HeadlessSurface, HlsEngineFactory, PlayerConfig, StreamDescriptor, StreamSession};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PlayerConfig::default();
//!     let factory = Arc::new(HlsEngineFactory::new(config.engine.request_timeout())?);
//!     let mut session = StreamSession::new(factory, &config);
//!     let mut events = session.subscribe();
//!
//!     let surface = Arc::new(HeadlessSurface::new(Box::new(std::io::stdout())));
//!     session.attach(StreamDescriptor::new("https://cdn.example/movie.m3u8", None)?, &surface);
//!     session.process_next().await;
//!     println!("{:?}", events.try_recv());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod http;
pub mod stream;
pub mod surfaces;

pub use catalog::{Catalog, CatalogClient, CatalogEntry, CatalogItem};
pub use config::PlayerConfig;
pub use error::{AttachError, CatalogError, Fault, FaultKind};
pub use stream::{
    HlsEngineFactory, Phase, PlaybackMode, PlaybackSurface, PlayerEvent, StreamDescriptor,
    StreamSession,
};
pub use surfaces::{ExternalPlayerSurface, HeadlessSurface};

/// Version of vodplay
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
