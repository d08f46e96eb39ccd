// Application configuration, loaded from environment variables and CLI flags.

use chrono_tz::Tz;

use crate::calendar::DEFAULT_TIMEZONE;
use crate::elo::PolicyKind;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Civil timezone for week and month windows.
    pub timezone: Tz,
    /// Rating policy applied to every recorded match.
    pub rating_policy: PolicyKind,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:ladder.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `LADDER_TIMEZONE` - IANA timezone name (default: `America/Denver`)
    /// - `LADDER_RATING_POLICY` - `bradley-terry` (default) or `margin-of-victory`
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:ladder.db?mode=rwc".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(&args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or(3000);

        let timezone = Self::parse_timezone(std::env::var("LADDER_TIMEZONE").ok().as_deref());
        let rating_policy =
            Self::parse_rating_policy(std::env::var("LADDER_RATING_POLICY").ok().as_deref());

        Config {
            database_url,
            port,
            timezone,
            rating_policy,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }

    fn parse_timezone(value: Option<&str>) -> Tz {
        match value {
            None => DEFAULT_TIMEZONE,
            Some(name) => name.trim().parse::<Tz>().unwrap_or_else(|_| {
                tracing::warn!(
                    "Unknown timezone {name:?}, using {}",
                    DEFAULT_TIMEZONE.name()
                );
                DEFAULT_TIMEZONE
            }),
        }
    }

    fn parse_rating_policy(value: Option<&str>) -> PolicyKind {
        match value {
            None => PolicyKind::default(),
            Some(name) => PolicyKind::from_str_name(name).unwrap_or_else(|| {
                tracing::warn!("Unknown rating policy {name:?}, using bradley-terry");
                PolicyKind::default()
            }),
        }
    }
}
