//! Helpers for request targets and response payloads.

use reqwest::Url;
use serde_json::Value;

/// Path segments that never name a collection.
const IGNORED_SEGMENTS: &[&str] = &["", "admin"];

/// Origin relative targets are resolved against, so they parse like absolute ones.
const PLACEHOLDER_ORIGIN: &str = "http://target.invalid/";

/// Parses `target` as an absolute URL, or as a path relative to a placeholder origin.
fn parse_target(target: &str) -> Option<Url> {
    let base = Url::parse(PLACEHOLDER_ORIGIN).ok()?;
    Url::options().base_url(Some(&base)).parse(target).ok()
}

/// Removes the extension of the last path segment: `/admin/products.json` → `/admin/products`.
pub fn remove_ext(path: &str) -> &str {
    let segment_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[segment_start..].rfind('.') {
        // a leading dot is a hidden name, not an extension
        Some(dot) if dot > 0 => &path[..segment_start + dot],
        _ => path,
    }
}

/// Forces a `.json` extension onto the path of `target`, keeping any query string. Relative
/// targets stay relative.
///
/// ```
/// use throttled_pager::http::ensure_json_ext;
///
/// assert_eq!(ensure_json_ext("products/count"), "products/count.json");
/// assert_eq!(ensure_json_ext("/admin/shop.xml?fields=id"), "/admin/shop.json?fields=id");
/// assert_eq!(
///     ensure_json_ext("https://acme.myshopify.com/admin/orders"),
///     "https://acme.myshopify.com/admin/orders.json"
/// );
/// ```
pub fn ensure_json_ext(target: &str) -> String {
    if let Ok(mut url) = Url::parse(target) {
        let path = format!("{}.json", remove_ext(url.path()));
        url.set_path(&path);
        return url.into();
    }

    let Some(url) = parse_target(target) else {
        return format!("{}.json", remove_ext(target));
    };
    let path = remove_ext(url.path());
    // resolution always roots the path; only keep the slash if the caller wrote one
    let path = if target.starts_with('/') {
        path
    } else {
        path.trim_start_matches('/')
    };
    match url.query() {
        Some(query) => format!("{path}.json?{query}"),
        None => format!("{path}.json"),
    }
}

/// Derives the collection a target addresses: the first path segment that is neither empty nor
/// `admin`, without its extension.
///
/// ```
/// use throttled_pager::http::collection_name;
///
/// assert_eq!(collection_name("/admin/products.json").as_deref(), Some("products"));
/// assert_eq!(collection_name("orders/450789469/transactions").as_deref(), Some("orders"));
/// assert_eq!(collection_name("/admin/"), None);
/// ```
pub fn collection_name(target: &str) -> Option<String> {
    let url = parse_target(target)?;
    url.path_segments()?
        .find(|segment| !IGNORED_SEGMENTS.contains(segment))
        .map(remove_ext)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
}

/// The single top-level key a payload nests its data under, e.g. `products` in
/// `{ "products": [...] }`. When a payload carries several keys the first one wins.
pub fn data_key(payload: &Value) -> Option<&str> {
    payload.as_object()?.keys().next().map(String::as_str)
}

/// Reduces a shop given as a bare name, a domain or a URL to its bare name:
/// `https://acme.myshopify.com` → `acme`.
pub fn clean_shop_name(shop: &str) -> String {
    let url = Url::parse(shop).or_else(|_| Url::parse(&format!("https://{shop}")));
    let host = match url.as_ref().ok().and_then(Url::host_str) {
        Some(host) => host,
        None => shop,
    };
    host.split('.').next().unwrap_or(host).to_owned()
}
