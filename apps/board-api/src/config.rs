use std::time::Duration;

/// Board API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// HMAC secret used to verify bearer tokens (HS256).
    pub jwt_secret: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Upper bound on token verification plus the user lookup at connect time.
    pub handshake_timeout: Duration,
    /// Per-connection outbound queue capacity. Events past this are dropped.
    pub outbound_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_var("DATABASE_URL"),
            jwt_secret: required_var("JWT_SECRET"),
            port: optional_var("PORT").unwrap_or(5000),
            handshake_timeout: Duration::from_secs(
                optional_var("HANDSHAKE_TIMEOUT_SECS").unwrap_or(10),
            ),
            outbound_buffer: optional_var("OUTBOUND_BUFFER").unwrap_or(256),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn optional_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Point a connection string at the `<name>_test` database.
///
/// Already-suffixed names and URLs without a database path are returned as is.
pub fn test_database_url(database_url: &str) -> String {
    let (base, query) = match database_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (database_url, None),
    };

    let Some((prefix, db_name)) = base.rsplit_once('/') else {
        return database_url.to_string();
    };
    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    match query {
        Some(query) => format!("{prefix}/{db_name}_test?{query}"),
        None => format!("{prefix}/{db_name}_test"),
    }
}
