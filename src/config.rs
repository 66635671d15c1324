//! Portal configuration: defaults, then `MEDILINK_*` environment variables,
//! then command-line flags (flags win).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::identity::{DirectoryConfig, HashCost, StoreConfig};

pub const USAGE: &str = "medilink server\n\nUSAGE:\n  medilink [--port N] [--bind ADDR] [--session-ttl-secs N] [--check-timeout-ms N] [--require-verification] [--no-seed]\n\nOPTIONS:\n  --port N                  HTTP port (env: MEDILINK_PORT, default 8080)\n  --bind ADDR               Listen address (env: MEDILINK_BIND, default 127.0.0.1)\n  --session-ttl-secs N      Session lifetime (env: MEDILINK_SESSION_TTL_SECS, default 3600)\n  --check-timeout-ms N      Initial session check bound (env: MEDILINK_CHECK_TIMEOUT_MS, default 5000)\n  --require-verification    New accounts must verify their email (env: MEDILINK_REQUIRE_VERIFICATION)\n  --no-seed                 Skip the demo accounts (env: MEDILINK_SEED=false)\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub session_ttl: Duration,
    pub session_check_timeout: Duration,
    pub require_verification: bool,
    pub seed_demo_accounts: bool,
    /// Clients idle longer than this have their session store disposed.
    pub client_idle_timeout: Duration,
    pub sweep_interval: Duration,
    pub hash_cost: HashCost,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8080,
            session_ttl: Duration::from_secs(60 * 60),
            session_check_timeout: Duration::from_millis(5000),
            require_verification: false,
            seed_demo_accounts: true,
            client_idle_timeout: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(30),
            hash_cost: HashCost::Standard,
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].as_str());
        }
        i += 1;
    }
    None
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

impl PortalConfig {
    /// Resolve from the process environment and `std::env::args`.
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |k| std::env::var(k).ok())
    }

    /// Resolve from explicit sources. Unparseable values fall back to the
    /// next source rather than failing startup.
    pub fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let env_u64 = |k: &str| env(k).and_then(|v| v.trim().parse::<u64>().ok());
        let arg_u64 = |f: &str| arg_value(args, f).and_then(|v| v.parse::<u64>().ok());

        let port = arg_value(args, "--port")
            .and_then(|v| v.parse::<u16>().ok())
            .or_else(|| env("MEDILINK_PORT").and_then(|v| v.trim().parse::<u16>().ok()))
            .unwrap_or(d.port);
        let bind = arg_value(args, "--bind")
            .and_then(|v| v.parse::<IpAddr>().ok())
            .or_else(|| env("MEDILINK_BIND").and_then(|v| v.trim().parse::<IpAddr>().ok()))
            .unwrap_or(d.bind);
        let session_ttl = arg_u64("--session-ttl-secs")
            .or_else(|| env_u64("MEDILINK_SESSION_TTL_SECS"))
            .map(Duration::from_secs)
            .unwrap_or(d.session_ttl);
        let session_check_timeout = arg_u64("--check-timeout-ms")
            .or_else(|| env_u64("MEDILINK_CHECK_TIMEOUT_MS"))
            .map(Duration::from_millis)
            .unwrap_or(d.session_check_timeout);
        let require_verification = if has_flag(args, "--require-verification") {
            true
        } else {
            env("MEDILINK_REQUIRE_VERIFICATION").and_then(|v| parse_bool(&v)).unwrap_or(d.require_verification)
        };
        let seed_demo_accounts = if has_flag(args, "--no-seed") {
            false
        } else {
            env("MEDILINK_SEED").and_then(|v| parse_bool(&v)).unwrap_or(d.seed_demo_accounts)
        };
        let client_idle_timeout = env_u64("MEDILINK_CLIENT_IDLE_SECS").map(Duration::from_secs).unwrap_or(d.client_idle_timeout);

        Self {
            bind,
            port,
            session_ttl,
            session_check_timeout,
            require_verification,
            seed_demo_accounts,
            client_idle_timeout,
            ..d
        }
    }

    pub fn addr(&self) -> SocketAddr { SocketAddr::new(self.bind, self.port) }

    pub fn directory(&self) -> DirectoryConfig {
        DirectoryConfig {
            session_ttl: self.session_ttl,
            require_verification: self.require_verification,
            hash_cost: self.hash_cost,
            ..DirectoryConfig::default()
        }
    }

    pub fn store(&self) -> StoreConfig {
        StoreConfig { session_check_timeout: self.session_check_timeout }
    }
}
