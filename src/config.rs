use chrono_tz::Tz;

/// Timezone report timestamps are rendered in.
pub const DEFAULT_REPORT_TZ: &str = "Asia/Ho_Chi_Minh";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Upper bound on an uploaded log file. Default: 32 MiB.
    pub max_upload_bytes: usize,
    /// Upper bound on a single log line. Default: 1 MiB.
    pub max_line_bytes: usize,
    pub report_timezone: Tz,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let report_timezone = match std::env::var("LOGLENS_REPORT_TZ") {
        Ok(name) => name.parse::<Tz>().unwrap_or_else(|_| {
            eprintln!(
                "⚠️  LOGLENS_REPORT_TZ={} is not a valid timezone — using {}",
                name, DEFAULT_REPORT_TZ
            );
            DEFAULT_REPORT_TZ.parse().expect("default timezone")
        }),
        Err(_) => DEFAULT_REPORT_TZ.parse().expect("default timezone"),
    };

    Ok(Config {
        port: std::env::var("LOGLENS_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .unwrap_or(8080),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/loglens".into()),
        max_upload_bytes: std::env::var("LOGLENS_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(32 * 1024 * 1024),
        max_line_bytes: std::env::var("LOGLENS_MAX_LINE_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1 << 20),
        report_timezone,
    })
}
