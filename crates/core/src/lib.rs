pub mod domain;
pub mod extract;
pub mod ingest;
pub mod storage;

pub mod config {
    use std::path::PathBuf;

    const DEFAULT_URL_FILE: &str = "config/target_url.txt";
    const DEFAULT_SNAPSHOT_PATH: &str = "data/top_stocks.json";
    const DEFAULT_STATIC_DIR: &str = "static";
    const DEFAULT_FALLBACK_URL: &str = "https://stockanalysis.com/stocks/market-cap/";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub url_file: PathBuf,
        pub snapshot_path: PathBuf,
        pub static_dir: PathBuf,
        pub fallback_url: String,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                url_file: path_var("STOCKY_URL_FILE", DEFAULT_URL_FILE),
                snapshot_path: path_var("STOCKY_SNAPSHOT_PATH", DEFAULT_SNAPSHOT_PATH),
                static_dir: path_var("STOCKY_STATIC_DIR", DEFAULT_STATIC_DIR),
                fallback_url: string_var("FALLBACK_URL", DEFAULT_FALLBACK_URL),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            })
        }
    }

    fn string_var(key: &str, default: &str) -> String {
        std::env::var(key)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn path_var(key: &str, default: &str) -> PathBuf {
        PathBuf::from(string_var(key, default))
    }
}
