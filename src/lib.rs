pub mod browser;
pub mod config;
pub mod credentials;
pub mod download;
pub mod duration;
pub mod export;
pub mod filename;
#[cfg(feature = "cli")]
pub mod logging;
pub mod paytrust;
pub mod prompt;
