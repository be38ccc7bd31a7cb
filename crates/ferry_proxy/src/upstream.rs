use anyhow::{bail, Context};
use http::uri::{Authority, Scheme, Uri};

/// A configured origin server: a validated absolute URL. Upstreams are
/// addressed by their stable position in the parsed set.
#[derive(Debug, Clone)]
pub struct Upstream {
    scheme: Scheme,
    authority: Authority,
    path: String,
}

impl Upstream {
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Build a target URI on this upstream for an already-joined path and an
    /// optional raw query.
    pub(crate) fn target_uri(&self, path: &str, query: Option<&str>) -> anyhow::Result<Uri> {
        let path_and_query = match query {
            Some(q) if !q.is_empty() => format!("{path}?{q}"),
            _ => path.to_string(),
        };
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .with_context(|| format!("assembling target URI on upstream '{}'", self))
    }
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)
    }
}

/// Parse a comma-separated list of upstream URLs into the ordered upstream
/// set. Entries must be absolute URLs with a scheme and host; a trailing '/'
/// is stripped from the path. Empty entries are skipped.
pub fn parse_upstreams(csv: &str) -> anyhow::Result<Vec<Upstream>> {
    let mut out = Vec::new();
    for part in csv.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let uri: Uri = part
            .parse()
            .with_context(|| format!("invalid upstream '{part}'"))?;
        let (Some(scheme), Some(authority)) = (uri.scheme(), uri.authority()) else {
            bail!("upstream must include scheme and host, got '{part}'");
        };
        let path = uri.path().trim_end_matches('/').to_string();
        out.push(Upstream {
            scheme: scheme.clone(),
            authority: authority.clone(),
            path,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::parse_upstreams;

    #[test]
    fn parses_ordered_set() {
        let ups = parse_upstreams("http://a:9000, http://b:9001 ,http://c:9002").unwrap();
        assert_eq!(ups.len(), 3);
        assert_eq!(ups[0].authority().as_str(), "a:9000");
        assert_eq!(ups[1].authority().as_str(), "b:9001");
        assert_eq!(ups[2].authority().as_str(), "c:9002");
    }

    #[test]
    fn trims_trailing_slash_from_path() {
        let ups = parse_upstreams("http://a/api/").unwrap();
        assert_eq!(ups[0].path(), "/api");

        let ups = parse_upstreams("http://a/").unwrap();
        assert_eq!(ups[0].path(), "");
    }

    #[test]
    fn skips_empty_entries() {
        let ups = parse_upstreams(",http://a:9000,, http://b:9001 ,").unwrap();
        assert_eq!(ups.len(), 2);
    }

    #[test]
    fn rejects_entries_without_scheme() {
        let err = parse_upstreams("localhost:9000").unwrap_err();
        assert!(err.to_string().contains("localhost:9000"));
    }

    #[test]
    fn rejects_entries_without_host() {
        let err = parse_upstreams("/just/a/path").unwrap_err();
        assert!(err.to_string().contains("/just/a/path"));
    }

    #[test]
    fn names_the_offending_entry_on_parse_failure() {
        let err = parse_upstreams("http://ok:9000,http://bad host").unwrap_err();
        assert!(format!("{err:#}").contains("http://bad host"));
    }

    #[test]
    fn builds_target_uris_with_query() {
        let ups = parse_upstreams("http://a:9000/api").unwrap();
        let uri = ups[0].target_uri("/api/users", Some("page=2")).unwrap();
        assert_eq!(uri.to_string(), "http://a:9000/api/users?page=2");

        let uri = ups[0].target_uri("/api/users", None).unwrap();
        assert_eq!(uri.to_string(), "http://a:9000/api/users");
    }
}
