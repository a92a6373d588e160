//! Runtime settings for the hexturf server, read once from the environment.
//!
//! | variable         | default                | meaning                                   |
//! |------------------|------------------------|-------------------------------------------|
//! | `PORT`           | `3000`                 | TCP port, bound on all interfaces         |
//! | `STATIC_DIR`     | `./public`             | front-end bundle served at `/`            |
//! | `HEXTURF_DATA`   | `./db/territory.json`  | territory snapshot; empty = memory only   |
//! | `RELAY_CAPACITY` | `256`                  | frames buffered per relay client          |
//!
//! The write-ahead log lives next to the snapshot as `<snapshot>.log`.

use std::{
    env,
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    str::FromStr,
};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_STATIC_DIR: &str = "./public";
const DEFAULT_DATA_PATH: &str = "./db/territory.json";
const DEFAULT_RELAY_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub static_dir: PathBuf,
    /// `None` keeps the territory in memory only.
    pub data_path: Option<PathBuf>,
    pub relay_capacity: usize,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Unparsable values fall back to their defaults.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = parsed(&lookup, "PORT").unwrap_or(DEFAULT_PORT);
        let static_dir = lookup("STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.into());
        let data_path = match lookup("HEXTURF_DATA") {
            None => Some(PathBuf::from(DEFAULT_DATA_PATH)),
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(PathBuf::from(v)),
        };
        let relay_capacity = parsed(&lookup, "RELAY_CAPACITY")
            .filter(|n: &usize| *n > 0)
            .unwrap_or(DEFAULT_RELAY_CAPACITY);

        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            static_dir: PathBuf::from(static_dir),
            data_path,
            relay_capacity,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_with(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_with(&[]);
        assert_eq!(config.addr.port(), DEFAULT_PORT);
        assert!(config.addr.ip().is_unspecified());
        assert_eq!(config.static_dir, PathBuf::from(DEFAULT_STATIC_DIR));
        assert_eq!(config.data_path, Some(PathBuf::from(DEFAULT_DATA_PATH)));
        assert_eq!(config.relay_capacity, DEFAULT_RELAY_CAPACITY);
    }

    #[test]
    fn overrides_are_honoured() {
        let config = config_with(&[
            ("PORT", "8088"),
            ("STATIC_DIR", "/srv/www"),
            ("HEXTURF_DATA", "/var/lib/hexturf.json"),
            ("RELAY_CAPACITY", "32"),
        ]);
        assert_eq!(config.addr.port(), 8088);
        assert_eq!(config.static_dir, PathBuf::from("/srv/www"));
        assert_eq!(config.data_path, Some(PathBuf::from("/var/lib/hexturf.json")));
        assert_eq!(config.relay_capacity, 32);
    }

    #[test]
    fn empty_data_path_means_memory_only() {
        assert_eq!(config_with(&[("HEXTURF_DATA", "  ")]).data_path, None);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = config_with(&[("PORT", "http"), ("RELAY_CAPACITY", "0")]);
        assert_eq!(config.addr.port(), DEFAULT_PORT);
        assert_eq!(config.relay_capacity, DEFAULT_RELAY_CAPACITY);
    }
}
