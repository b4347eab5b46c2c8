//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every entity (handler, upload, variant) is shown by its semantic identity
//! first, with paths and digests as indented context lines underneath.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Handlers
//! 001 avatars (2 variants)
//!     Sizes: square-80
//!     Formats: png, webp
//!     Stores: local:/mnt/avatars
//! ```
//!
//! ## Process
//!
//! ```text
//! photo.jpg → avatars
//!     Source: jpg 1200x800, 2 variants
//!     Digest: 54c2…a7c2
//!     square-80 png → local:/mnt/avatars: square-80-54c2…a7c2.png
//!     square-80 webp → local:/mnt/avatars: failed: write failed for …
//! ```
//!
//! # Architecture
//!
//! Each display has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::config::Config;
use crate::dispatch::{DispatchEvent, DispatchReport};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn join_display<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Check
// ============================================================================

/// Format a validated config as a handler inventory.
pub fn format_check(config: &Config) -> Vec<String> {
    let mut lines = vec!["Handlers".to_string()];
    for (pos, handler) in config.handlers.values().enumerate() {
        lines.push(format!(
            "{} {} ({})",
            format_index(pos + 1),
            handler.name,
            plural(handler.job_count(), "variant", "variants")
        ));
        lines.push(format!("{}Sizes: {}", indent(1), join_display(&handler.sizes)));
        lines.push(format!("{}Formats: {}", indent(1), join_display(&handler.formats)));
        lines.push(format!("{}Stores: {}", indent(1), join_display(&handler.stores)));
    }
    lines
}

pub fn print_check(config: &Config) {
    for line in format_check(config) {
        println!("{}", line);
    }
}

// ============================================================================
// Process
// ============================================================================

/// Header printed before an upload is dispatched.
pub fn format_upload_header(source: &Path, handler: &str) -> String {
    let name = source
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string());
    format!("{} → {}", name, handler)
}

/// Format a progress event streamed from a running dispatch.
pub fn format_dispatch_event(event: &DispatchEvent) -> Vec<String> {
    match event {
        DispatchEvent::Decoded {
            digest,
            format,
            dimensions: (w, h),
            jobs,
            ..
        } => vec![
            format!(
                "{}Source: {} {}x{}, {}",
                indent(1),
                format,
                w,
                h,
                plural(*jobs, "variant", "variants")
            ),
            format!("{}Digest: {}", indent(1), digest),
        ],
        DispatchEvent::JobFinished { spec, result } => match result {
            Ok(key) => vec![format!("{}{}: {}", indent(1), spec, key)],
            Err(message) => vec![format!("{}{}: failed: {}", indent(1), spec, message)],
        },
    }
}

/// One-line tally of a finished dispatch.
pub fn format_report_summary(report: &DispatchReport) -> String {
    let stored = report.stored().count();
    let failed = report.failures().count();
    if failed == 0 {
        format!("Stored {}", plural(stored, "variant", "variants"))
    } else {
        format!(
            "Stored {}, {} failed",
            plural(stored, "variant", "variants"),
            failed
        )
    }
}

pub fn print_report_summary(report: &DispatchReport) {
    println!("{}", format_report_summary(report));
}

// ============================================================================
// Tests
// ============================================================================
