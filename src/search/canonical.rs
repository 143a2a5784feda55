//! Canonical product paths: tracking suffixes removed, non-product routes
//! dropped, duplicates collapsed.

use std::collections::HashSet;

/// First path segments that never lead to a product page: search
/// refinements, ad-click tracking and generic catalog routes.
pub const NON_PRODUCT_ROUTES: &[&str] = &["s", "x", "gp"];

/// Prefix of the trailing reference-tracking path segment.
pub const REFERENCE_PREFIX: &str = "ref=";

/// Removes every trailing `ref=...` segment.
pub fn strip_references(path: &str) -> &str {
    let mut path = path;
    while let Some((head, last)) = path.rsplit_once('/') {
        if !last.starts_with(REFERENCE_PREFIX) {
            break;
        }
        path = head;
    }
    path
}

/// True when the first segment of `path` exists and is not a known
/// non-product route.
pub fn is_product_route(path: &str) -> bool {
    let mut segments = path.split('/');
    // paths are absolute, the first split item is empty
    if segments.next() != Some("") {
        return false;
    }
    match segments.next() {
        Some(first) => !first.is_empty() && !NON_PRODUCT_ROUTES.contains(&first),
        None => false,
    }
}

/// Canonicalizes result paths. First occurrences keep their relative order.
pub fn canonicalize<I, S>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter_map(|path| {
            let stripped = strip_references(path.as_ref());
            is_product_route(stripped).then(|| stripped.to_owned())
        })
        .filter(|path| seen.insert(path.clone()))
        .collect()
}
