use std::net::IpAddr;
use tracing::warn;
use url::Url;

/// Second level labels that sit under a country code, as in `example.co.uk`
const SHARED_SECOND_LEVEL: &[&str] = &["ac", "co", "com", "edu", "gov", "net", "org"];

/// Registrable domain of a tracker announce url, without subdomain or port
pub fn tracker_domain(tracker: &str) -> String {
    if tracker.is_empty() {
        return String::new();
    }

    let url = match Url::parse(tracker) {
        Ok(url) => url,
        Err(e) => {
            warn!(tracker = %tracker, error = %e, "Failed parsing tracker host");
            return tracker.to_string();
        }
    };

    let Some(host) = url.host_str() else {
        return tracker.to_string();
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if host.parse::<IpAddr>().is_ok() {
        return host.to_string();
    }

    registrable_domain(host)
}

fn registrable_domain(host: &str) -> String {
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }

    let tld = labels[labels.len() - 1];
    let second = labels[labels.len() - 2];
    let keep = if tld.len() == 2 && SHARED_SECOND_LEVEL.contains(&second) {
        3
    } else {
        2
    };

    labels[labels.len() - keep..].join(".").to_lowercase()
}
