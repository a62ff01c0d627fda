use crate::metrics::BounceCriteria;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Directory holding the three campaign CSV files loaded at startup.
    pub bundle_dir: Option<String>,
    pub bounce: BounceCriteria,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let bounce_pages = parse_threshold("ADLYTICS_BOUNCE_PAGES", 1)?;
        let bounce_seconds = parse_threshold("ADLYTICS_BOUNCE_SECONDS", 4)?;

        Ok(Self {
            port: std::env::var("ADLYTICS_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            bundle_dir: std::env::var("ADLYTICS_BUNDLE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            bounce: BounceCriteria::new(bounce_pages, bounce_seconds)
                .map_err(|e| e.to_string())?,
            cors_origins: std::env::var("ADLYTICS_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn parse_threshold(var: &str, default: i64) -> Result<i64, String> {
    match std::env::var(var) {
        Ok(raw) => {
            let value: i64 = raw
                .trim()
                .parse()
                .map_err(|e| format!("invalid {var}: {e}"))?;
            if value < 0 {
                return Err(format!("{var} must be non-negative, got {value}"));
            }
            Ok(value)
        }
        Err(_) => Ok(default),
    }
}
