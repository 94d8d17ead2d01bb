//! # Pictogate (Graphical Image-Sequence Authentication)
//!
//! `pictogate` implements graphical password authentication: a user enrolls by
//! picking an ordered sequence of images from a generated grid and later proves
//! possession by reproducing the same ordered pick from a freshly shuffled grid.
//!
//! ## Credential Commitment
//!
//! The ordered selection is never stored. Enrollment persists a single SHA-256
//! commitment over a length-prefixed framing of the image references, and
//! verification compares commitments in constant time.
//!
//! ## Image Supply
//!
//! Grids are populated by a generative image service. Calls are issued in small
//! concurrent batches with a pause between batches, rate-limited items are
//! retried with exponential backoff, and quota exhaustion fails fast. A request
//! either yields every image or fails as a whole, since a grid with missing cells
//! cannot be presented.
//!
//! ## Collaborators
//!
//! Identity (email/password, sessions) and credential persistence are external.
//! The server trusts an upstream gateway for the subject id and stores records
//! either in memory or in Postgres.

pub mod api;
pub mod cli;
pub mod credential;
pub mod pipeline;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
