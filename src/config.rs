//! Configuration for docdispatch
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::fmt;
use std::net::SocketAddr;

/// Fixed MongoDB port
pub const DEFAULT_PORT: u16 = 27017;

/// Fixed logical database name
pub const DATABASE_NAME: &str = "testdb";

/// Fixed collection name
pub const COLLECTION_NAME: &str = "testcol";

/// docdispatch - insert/find/update/delete against one document collection
#[derive(Parser, Debug, Clone)]
#[command(name = "docdispatch")]
#[command(about = "Stateless document-collection request handler")]
pub struct Args {
    /// MongoDB host (required unless running in dev mode)
    #[arg(long, env = "MONGO_HOST")]
    pub mongo_host: Option<String>,

    /// How incoming events are interpreted
    #[arg(long, env = "HANDLER_VARIANT", value_enum, default_value_t = Variant::Gateway)]
    pub variant: Variant,

    /// Enable development mode (in-memory store, no MongoDB)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Serve over local HTTP on this address instead of the function runtime
    #[arg(long, env = "LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

/// Ingestion variant
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// The event itself is the request payload
    Direct,
    /// API gateway event; the payload may be JSON text in `body`
    Gateway,
    /// REST-style proxy event routed on `httpMethod` and `path`
    Proxy,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Direct => write!(f, "direct"),
            Variant::Gateway => write!(f, "gateway"),
            Variant::Proxy => write!(f, "proxy"),
        }
    }
}

impl Args {
    /// Database target resolved from the configured host
    ///
    /// Returns `None` in dev mode when no host is configured.
    pub fn target(&self) -> Option<Target> {
        self.mongo_host.as_deref().map(Target::new)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match self.mongo_host.as_deref() {
                None => return Err("MONGO_HOST is required outside dev mode".to_string()),
                Some(host) if host.trim().is_empty() => {
                    return Err("MONGO_HOST must not be empty".to_string())
                }
                Some(_) => {}
            }
        }

        if self.listen.is_some() && self.variant == Variant::Direct {
            return Err("the direct variant cannot be served over HTTP; use gateway or proxy".to_string());
        }

        Ok(())
    }
}

/// Where documents live: host plus the fixed port, database and collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub collection: String,
}

impl Target {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.trim().to_string(),
            port: DEFAULT_PORT,
            database: DATABASE_NAME.to_string(),
            collection: COLLECTION_NAME.to_string(),
        }
    }

    /// Connection URI for the driver
    ///
    /// Short selection/connect timeouts keep an unreachable database from
    /// hanging the invocation until the runtime deadline.
    pub fn uri(&self) -> String {
        format!(
            "mongodb://{}:{}/?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000",
            self.host, self.port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("docdispatch").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_target_uses_fixed_names() {
        let target = Target::new("db.internal");
        assert_eq!(target.port, 27017);
        assert_eq!(target.database, "testdb");
        assert_eq!(target.collection, "testcol");
        assert!(target.uri().starts_with("mongodb://db.internal:27017/"));
    }

    fn args(mongo_host: Option<&str>, dev_mode: bool) -> Args {
        Args {
            mongo_host: mongo_host.map(str::to_string),
            variant: Variant::Gateway,
            dev_mode,
            listen: None,
            log_level: "info".to_string(),
            log_json: false,
        }
    }

    #[test]
    fn test_host_required_outside_dev_mode() {
        let err = args(None, false).validate().unwrap_err();
        assert!(err.contains("MONGO_HOST is required"));
        assert!(args(Some("  "), false).validate().is_err());
        assert!(args(None, true).validate().is_ok());

        let args = parse(&["--mongo-host", "localhost"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.target(), Some(Target::new("localhost")));
    }

    #[test]
    fn test_dev_mode_without_host() {
        let args = parse(&["--dev-mode", "--mongo-host", ""]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_direct_variant_cannot_listen() {
        let args = parse(&[
            "--mongo-host",
            "localhost",
            "--variant",
            "direct",
            "--listen",
            "127.0.0.1:9000",
        ]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_variant_names() {
        assert_eq!(parse(&["--variant", "proxy"]).variant, Variant::Proxy);
        assert_eq!(Variant::Direct.to_string(), "direct");
    }
}
