/// Resolve a dot-notation path in a `serde_json::Value`.
///
/// - `"attack_type"` → `value["attack_type"]`
/// - `"geo.country"` → `value["geo"]["country"]`
///
/// Returns `None` if any segment is missing.
pub fn resolve_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}
