//! Client configuration string: `<serverHost>:<udpPortSpec>@<token>:<localPort>`.
//!
//! `udpPortSpec` is a single port, a `min-max` range, or the literal
//! `1-65535` meaning any destination port. Splits are rightmost-first so the
//! token may contain `:`. The `:<localPort>` suffix may be omitted (or be
//! non-numeric, in which case it is part of the token); the local port then
//! defaults to [`DEFAULT_LOCAL_PORT`].

use thiserror::Error;

/// Local UDP listen port used when the config string omits one.
pub const DEFAULT_LOCAL_PORT: u16 = 5300;

const ANY_PORT_SPEC: &str = "1-65535";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("empty config")]
    Empty,
    #[error("invalid format: missing @")]
    MissingAt,
    #[error("invalid <serverHost>:<udpPortSpec>")]
    BadHostPart,
    #[error("invalid <token>:<localPort>")]
    BadTokenPart,
    #[error("empty token")]
    EmptyToken,
    #[error("invalid udpPortSpec: {0}")]
    BadPortSpec(String),
    #[error("port must be 1..=65535")]
    BadPort,
    #[error("destination port {port} not allowed; expected {min}..={max}")]
    DstPortNotAllowed { port: u16, min: u16, max: u16 },
}

/// Parsed client tunnel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_host: String,
    /// True when the port spec is the full-range sentinel `1-65535`.
    pub any_udp_port: bool,
    pub port_min: u16,
    pub port_max: u16,
    pub token: String,
    pub local_port: u16,
}

impl ClientConfig {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::Empty);
        }

        let at = raw.rfind('@').ok_or(ConfigError::MissingAt)?;
        let (left, right) = (&raw[..at], &raw[at + 1..]);

        let (server_host, port_spec) = split_host_port_spec(left)?;
        let (token, local_port) = split_token_local_port(right)?;

        let (any_udp_port, port_min, port_max) = parse_port_spec(port_spec)?;

        Ok(Self {
            server_host: server_host.to_string(),
            any_udp_port,
            port_min,
            port_max,
            token: token.to_string(),
            local_port,
        })
    }

    /// Check a destination port against the allowed range.
    pub fn validate_dst_port(&self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::BadPort);
        }
        if self.any_udp_port || (self.port_min..=self.port_max).contains(&port) {
            return Ok(());
        }
        Err(ConfigError::DstPortNotAllowed {
            port,
            min: self.port_min,
            max: self.port_max,
        })
    }
}

fn split_host_port_spec(left: &str) -> Result<(&str, &str), ConfigError> {
    let idx = left.rfind(':').ok_or(ConfigError::BadHostPart)?;
    if idx == 0 || idx == left.len() - 1 {
        return Err(ConfigError::BadHostPart);
    }
    let host = &left[..idx];
    if host.trim().is_empty() || host.contains(' ') {
        return Err(ConfigError::BadHostPart);
    }
    Ok((host, &left[idx + 1..]))
}

/// Rightmost-colon split of `<token>:<localPort>`. A missing or non-numeric
/// tail means the whole right side is the token and the local port defaults;
/// a numeric tail outside 1..=65535 is an error, not part of the token.
fn split_token_local_port(right: &str) -> Result<(&str, u16), ConfigError> {
    let Some(idx) = right.rfind(':') else {
        if right.is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        return Ok((right, DEFAULT_LOCAL_PORT));
    };
    if idx == 0 || idx == right.len() - 1 {
        return Err(ConfigError::BadTokenPart);
    }

    let tail = &right[idx + 1..];
    if tail.chars().all(|c| c.is_ascii_digit()) {
        let port = parse_port(tail)?;
        let token = &right[..idx];
        if token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }
        Ok((token, port))
    } else {
        Ok((right, DEFAULT_LOCAL_PORT))
    }
}

fn parse_port_spec(spec: &str) -> Result<(bool, u16, u16), ConfigError> {
    if spec == ANY_PORT_SPEC {
        return Ok((true, 1, 65535));
    }
    if let Some((lo, hi)) = spec.split_once('-') {
        let min = parse_port(lo).map_err(|_| ConfigError::BadPortSpec(spec.to_string()))?;
        let max = parse_port(hi).map_err(|_| ConfigError::BadPortSpec(spec.to_string()))?;
        if min > max {
            return Err(ConfigError::BadPortSpec(spec.to_string()));
        }
        return Ok((min == 1 && max == 65535, min, max));
    }
    let port = parse_port(spec).map_err(|_| ConfigError::BadPortSpec(spec.to_string()))?;
    Ok((false, port, port))
}

fn parse_port(s: &str) -> Result<u16, ConfigError> {
    match s.parse::<u16>() {
        Ok(p) if p >= 1 => Ok(p),
        _ => Err(ConfigError::BadPort),
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientConfig, ConfigError, DEFAULT_LOCAL_PORT};

    #[test]
    fn any_port_spec() {
        let cfg = ClientConfig::parse("min.xhmt.my.id:1-65535@Trial25171:1").unwrap();
        assert!(cfg.any_udp_port);
        assert_eq!(cfg.server_host, "min.xhmt.my.id");
        assert_eq!(cfg.token, "Trial25171");
        assert_eq!(cfg.local_port, 1);
        assert!(cfg.validate_dst_port(65535).is_ok());
    }

    #[test]
    fn partial_range() {
        let cfg = ClientConfig::parse("min.xhmt.my.id:54-65535@Trial25171:1").unwrap();
        assert!(!cfg.any_udp_port);
        assert_eq!((cfg.port_min, cfg.port_max), (54, 65535));
        assert!(cfg.validate_dst_port(53).is_err());
        assert!(cfg.validate_dst_port(54).is_ok());
    }

    #[test]
    fn single_port() {
        let cfg = ClientConfig::parse("example.com:53@tok:9001").unwrap();
        assert!(!cfg.any_udp_port);
        assert_eq!((cfg.port_min, cfg.port_max), (53, 53));
        assert_eq!(cfg.local_port, 9001);
        assert!(cfg.validate_dst_port(53).is_ok());
        assert!(cfg.validate_dst_port(54).is_err());
    }

    #[test]
    fn token_can_contain_colon() {
        let cfg = ClientConfig::parse("10.0.0.1:53@user:pass:5300").unwrap();
        assert_eq!(cfg.token, "user:pass");
        assert_eq!(cfg.local_port, 5300);
    }

    #[test]
    fn shorthand_without_local_port() {
        let cfg = ClientConfig::parse("turu.kacer.store:1-65535@kacer:vpn").unwrap();
        assert_eq!(cfg.token, "kacer:vpn");
        assert_eq!(cfg.local_port, DEFAULT_LOCAL_PORT);

        let cfg = ClientConfig::parse("example.com:53@singleword").unwrap();
        assert_eq!(cfg.token, "singleword");
        assert_eq!(cfg.local_port, DEFAULT_LOCAL_PORT);
    }

    #[test]
    fn full_range_written_as_range_is_any() {
        let cfg = ClientConfig::parse("h:1-65535@t:1").unwrap();
        assert!(cfg.any_udp_port);
    }

    #[test]
    fn dst_port_zero_is_always_rejected() {
        let cfg = ClientConfig::parse("h:1-65535@t:1").unwrap();
        assert_eq!(cfg.validate_dst_port(0), Err(ConfigError::BadPort));
    }

    #[test]
    fn invalid_configs() {
        for raw in [
            "",
            "badformat",
            "host:53@tok:0",
            ":53@tok:1",
            "host:100-1@tok:1",
            "host:0@tok:1",
            "host:@tok:1",
            "host:53@",
        ] {
            assert!(ClientConfig::parse(raw).is_err(), "accepted {raw:?}");
        }
    }
}
