//! # imgpress
//!
//! Content-addressed image variants. An upload is fingerprinted, decoded
//! once, and rendered into every (size, format, store) combination its
//! handler declares. Each variant is stored under a name derived from the
//! upload's bytes, so the same upload always lands on the same keys.
//!
//! # Architecture: One Job Per Variant
//!
//! ```text
//! upload ─┬─ DigestReader ── SHA-256 ─────────────────┐
//!         └─ decode ── PixelBuffer ─┬─ size ─ encode ─┴─ store  (variant 1)
//!                                   ├─ size ─ encode ─── store  (variant 2)
//!                                   └─ ...
//! ```
//!
//! - **Single read**: the upload streams through a hashing reader into the
//!   decoder; the digest is finalized after the decoder returns, draining
//!   any bytes it left unread.
//! - **Shared decode**: a [`dispatch::Dispatcher`] decodes once and runs the
//!   handler's combinations as independent [`job::Job`]s on a rayon pool.
//! - **Isolated failures**: one failing combination does not stop the
//!   others. Every outcome is reported.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | TOML handler config: sizes, formats, stores, validated on load |
//! | [`digest`] | SHA-256 fingerprinting reader |
//! | [`imaging`] | Size math, the codec backend trait, and the `image`-crate backend |
//! | [`job`] | The decode → size → encode → store state machine for one variant |
//! | [`dispatch`] | Handler fan-out across a worker pool, with progress events |
//! | [`naming`] | `{kind}-{value}-{digest}.{ext}` output keys |
//! | [`store`] | Store/sink traits with local-filesystem and in-memory backends |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Content-Derived Names
//!
//! Keys depend only on the upload bytes, the size constraint and the format.
//! Re-processing overwrites instead of duplicating, and any client that
//! knows the upload's digest can compute where its variants live without a
//! lookup table.
//!
//! ## Encode Before Store
//!
//! A variant is encoded fully in memory before its sink is opened. Encoder
//! failures are therefore always codec errors, and a store only ever sees
//! complete payloads.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, Lanczos3 resampling and encoding all go through the `image`
//! crate. No system libraries, no external processes.

pub mod config;
pub mod digest;
pub mod dispatch;
pub mod imaging;
pub mod job;
pub mod naming;
pub mod output;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;
