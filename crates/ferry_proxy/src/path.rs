/// =======================================================
/// URL PATH JOINING
/// =======================================================
///
/// Shared by the prober (upstream path + health path) and dispatch
/// (upstream path + inbound path):
/// - If one operand is empty or "/", the result is the other, normalized.
/// - Otherwise both are concatenated with exactly one '/' between them.
/// - The result always starts with '/'.
pub(crate) fn join_url_path(a: &str, b: &str) -> String {
    if a.is_empty() || a == "/" {
        clean_path(b)
    } else if b.is_empty() || b == "/" {
        clean_path(a)
    } else {
        let joined = format!("{}/{}", a.trim_end_matches('/'), b.trim_start_matches('/'));
        clean_path(&joined)
    }
}

/// Normalize a path: empty becomes "/", anything else gains a leading '/'.
pub(crate) fn clean_path(p: &str) -> String {
    if p.is_empty() {
        return "/".to_string();
    }
    if !p.starts_with('/') {
        return format!("/{p}");
    }
    p.to_string()
}
