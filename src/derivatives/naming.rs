//! Deterministic storage names for originals and derivatives.
//!
//! Layout: `photos/<folder slug | none>/<YYYY>/<MM>/...`. Originals are made
//! unique by the storage backend. Derivatives live next to their original under
//! `thumbs/` or `previews/` and keep its whole basename, so two photos never
//! share a derivative and regenerating writes over the previous file.

use chrono::{DateTime, Datelike, Utc};

use super::DerivativeKind;

const UNGROUPED_SEGMENT: &str = "none";

fn scope_prefix(folder_slug: Option<&str>, uploaded_at: &DateTime<Utc>) -> String {
    format!(
        "photos/{}/{:04}/{:02}",
        folder_slug.unwrap_or(UNGROUPED_SEGMENT),
        uploaded_at.year(),
        uploaded_at.month()
    )
}

/// Where an uploaded original lands before collision handling.
pub fn original_name(
    folder_slug: Option<&str>,
    uploaded_at: &DateTime<Utc>,
    filename: &str,
) -> String {
    format!(
        "{}/{}",
        scope_prefix(folder_slug, uploaded_at),
        sanitize_filename(filename)
    )
}

/// Derivative name for a stored original: `<original dir>/<kind dir>/<basename>_<kind>.jpg`.
pub fn derivative_name(original: &str, kind: DerivativeKind) -> String {
    let (dir, base) = match original.rsplit_once('/') {
        Some((dir, base)) => (Some(dir), base),
        None => (None, original),
    };
    let file = format!("{}_{}.jpg", base, kind.suffix());
    match dir {
        Some(dir) => format!("{}/{}/{}", dir, kind.directory(), file),
        None => format!("{}/{}", kind.directory(), file),
    }
}

/// Reduce a client-supplied filename to `[A-Za-z0-9._-]`, dropping any directory part.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
