//! KEK label construction
//!
//! - network server: `ns[<sep><NetID hex>][<sep><host>]`
//! - application server: `as[<sep><host>]`
//!
//! `<host>` comes from a URL (`https://host:port/path`) or a plain
//! `host:port` address. Empty segments are left out.

use crate::error::{Error, Result};
use crate::lorawan::NetID;

pub const DEFAULT_SEPARATOR: &str = ":";

/// Host part of `addr`, without scheme, credentials, path or port
pub fn host_of(addr: &str) -> &str {
    let rest = match addr.find("://") {
        Some(i) => &addr[i + 3..],
        None => addr,
    };
    let rest = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let rest = rest.rsplit('@').next().unwrap_or_default();

    if let Some(bracketed) = rest.strip_prefix('[') {
        // [v6]:port
        return bracketed.split(']').next().unwrap_or_default();
    }
    match rest.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
            host
        }
        _ => rest,
    }
}

fn join(prefix: &str, segments: &[&str], separator: &str) -> Result<String> {
    let mut label = prefix.to_string();
    for segment in segments.iter().filter(|s| !s.is_empty()) {
        if !separator.is_empty() && segment.contains(separator) {
            return Err(Error::InvalidArgument(format!(
                "KEK label segment {:?} contains separator {:?}",
                segment, separator
            )));
        }
        label.push_str(separator);
        label.push_str(segment);
    }
    Ok(label)
}

/// Label of the KEK shared with the network server at `addr`
pub fn ns_kek_label(net_id: Option<&NetID>, addr: &str, separator: &str) -> Result<String> {
    let net_id = net_id.map(|id| id.to_string()).unwrap_or_default();
    join("ns", &[&net_id, host_of(addr)], separator)
}

/// Label of the KEK shared with the application server at `addr`
pub fn as_kek_label(addr: &str, separator: &str) -> Result<String> {
    join("as", &[host_of(addr)], separator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://ns.example.com:8886/api"), "ns.example.com");
        assert_eq!(host_of("ns.example.com:1884"), "ns.example.com");
        assert_eq!(host_of("ns.example.com"), "ns.example.com");
        assert_eq!(host_of("http://user:pw@host.local/x"), "host.local");
        assert_eq!(host_of("[::1]:1884"), "::1");
        assert_eq!(host_of("::1"), "::1");
        assert_eq!(host_of(""), "");
    }

    #[test]
    fn test_ns_kek_label() {
        let net_id = NetID([0x00, 0x00, 0x13]);
        assert_eq!(
            ns_kek_label(Some(&net_id), "https://ns.example.com:8886", DEFAULT_SEPARATOR).unwrap(),
            "ns:000013:ns.example.com"
        );
        assert_eq!(
            ns_kek_label(Some(&net_id), "", DEFAULT_SEPARATOR).unwrap(),
            "ns:000013"
        );
        assert_eq!(
            ns_kek_label(None, "ns.example.com:1884", DEFAULT_SEPARATOR).unwrap(),
            "ns:ns.example.com"
        );
        assert_eq!(ns_kek_label(None, "", DEFAULT_SEPARATOR).unwrap(), "ns");
        assert_eq!(
            ns_kek_label(Some(&net_id), "host", "/").unwrap(),
            "ns/000013/host"
        );
    }

    #[test]
    fn test_as_kek_label() {
        assert_eq!(
            as_kek_label("as.example.com:8884", DEFAULT_SEPARATOR).unwrap(),
            "as:as.example.com"
        );
        assert_eq!(as_kek_label("", DEFAULT_SEPARATOR).unwrap(), "as");
    }

    #[test]
    fn test_segment_with_separator_rejected() {
        let err = as_kek_label("[::1]:8884", DEFAULT_SEPARATOR).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(as_kek_label("[::1]:8884", "/").unwrap(), "as/::1");
    }
}
