//! Playback surfaces shipped with the crate.
//!
//! UI layers normally bring their own [`PlaybackSurface`](crate::stream::PlaybackSurface);
//! these two back the command-line player.

pub mod external;
pub mod headless;

pub use external::ExternalPlayerSurface;
pub use headless::HeadlessSurface;
