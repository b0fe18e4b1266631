//! Object key conventions shared by the API layer, build workers and edges.

pub fn deployment_root(prefix_id: &str) -> String {
    format!("deployments/{}", prefix_id)
}

pub fn raw_bundle_key(prefix_id: &str) -> String {
    format!("{}/raw-bundle.tar.gz", deployment_root(prefix_id))
}

pub fn optimized_bundle_key(prefix_id: &str) -> String {
    format!("{}/optimized-bundle.tar.gz", deployment_root(prefix_id))
}

pub fn webroot_key(prefix_id: &str, relative_path: &str) -> String {
    format!(
        "{}/webroot/{}",
        deployment_root(prefix_id),
        relative_path.trim_start_matches('/')
    )
}

/// The pointer document edges resolve a hostname through.
pub fn domain_meta_key(domain: &str) -> String {
    format!("domains/{}/meta.json", domain)
}

pub fn cert_keys(domain: &str) -> [String; 2] {
    [
        format!("certs/{}/ssl.crt", domain),
        format!("certs/{}/ssl.key", domain),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_keys() {
        assert_eq!(raw_bundle_key("ab12-42"), "deployments/ab12-42/raw-bundle.tar.gz");
        assert_eq!(
            optimized_bundle_key("ab12-42"),
            "deployments/ab12-42/optimized-bundle.tar.gz"
        );
        assert_eq!(
            webroot_key("ab12-42", "css/app.css"),
            "deployments/ab12-42/webroot/css/app.css"
        );
        assert_eq!(
            webroot_key("ab12-42", "/index.html"),
            "deployments/ab12-42/webroot/index.html"
        );
    }

    #[test]
    fn domain_keys() {
        assert_eq!(domain_meta_key("foo.com"), "domains/foo.com/meta.json");
        assert_eq!(
            cert_keys("foo.com"),
            ["certs/foo.com/ssl.crt".to_string(), "certs/foo.com/ssl.key".to_string()]
        );
    }
}
