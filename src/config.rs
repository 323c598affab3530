use serde::Deserialize;

const DEFAULT_CCS_BASE_URL: &str = "https://www3.bcb.gov.br/bc_ccs/rest";
const DEFAULT_PARTICIPANTS_BASE_URL: &str = "https://www3.bcb.gov.br/informes/rest";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub bacen_username: String,
    pub bacen_password: String,
    pub bacen_ccs_base_url: String,
    pub bacen_participants_base_url: String,
    pub bacen_timeout_secs: u64,
    pub jwt_secret: String,
    pub batch_concurrency: usize,
    pub window_utc_offset_hours: i32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            bacen_username: required("BACEN_USERNAME")?,
            bacen_password: required("BACEN_PASSWORD")?,
            bacen_ccs_base_url: base_url("BACEN_CCS_BASE_URL", DEFAULT_CCS_BASE_URL)?,
            bacen_participants_base_url: base_url(
                "BACEN_PARTICIPANTS_BASE_URL",
                DEFAULT_PARTICIPANTS_BASE_URL,
            )?,
            bacen_timeout_secs: std::env::var("BACEN_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BACEN_TIMEOUT_SECS must be a number of seconds"))
                .and_then(|secs: u64| {
                    if secs == 0 {
                        anyhow::bail!("BACEN_TIMEOUT_SECS must be greater than zero");
                    }
                    Ok(secs)
                })?,
            jwt_secret: required("JWT_SECRET")?,
            batch_concurrency: std::env::var("CCS_BATCH_CONCURRENCY")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("CCS_BATCH_CONCURRENCY must be a positive number"))
                .and_then(|n: usize| {
                    if n == 0 {
                        anyhow::bail!("CCS_BATCH_CONCURRENCY must be at least 1");
                    }
                    Ok(n)
                })?,
            window_utc_offset_hours: std::env::var("CCS_WINDOW_UTC_OFFSET_HOURS")
                .unwrap_or_else(|_| "-3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("CCS_WINDOW_UTC_OFFSET_HOURS must be an integer"))
                .and_then(|h: i32| {
                    if !(-14..=14).contains(&h) {
                        anyhow::bail!("CCS_WINDOW_UTC_OFFSET_HOURS must be between -14 and 14");
                    }
                    Ok(h)
                })?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            config.database_url.chars().take(20).collect::<String>()
        );
        tracing::debug!("BACEN CCS base URL: {}", config.bacen_ccs_base_url);
        tracing::debug!(
            "BACEN participants base URL: {}",
            config.bacen_participants_base_url
        );
        tracing::debug!(
            "Batch concurrency: {}, window offset: UTC{:+}",
            config.batch_concurrency,
            config.window_utc_offset_hours
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    let value = std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    Ok(value)
}

fn base_url(name: &str, default: &str) -> anyhow::Result<String> {
    let value = std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string());

    let parsed = url::Url::parse(&value)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", name);
    }

    Ok(value.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_strips_trailing_slash() {
        std::env::set_var("TEST_CCS_BASE_URL_SLASH", "https://example.com/rest/");
        let url = base_url("TEST_CCS_BASE_URL_SLASH", DEFAULT_CCS_BASE_URL).unwrap();
        assert_eq!(url, "https://example.com/rest");
    }

    #[test]
    fn test_base_url_falls_back_to_default() {
        let url = base_url("TEST_CCS_BASE_URL_UNSET", DEFAULT_CCS_BASE_URL).unwrap();
        assert_eq!(url, DEFAULT_CCS_BASE_URL);
    }

    #[test]
    fn test_base_url_rejects_other_schemes() {
        std::env::set_var("TEST_CCS_BASE_URL_FTP", "ftp://example.com");
        assert!(base_url("TEST_CCS_BASE_URL_FTP", DEFAULT_CCS_BASE_URL).is_err());
    }

    #[test]
    fn test_required_rejects_blank() {
        std::env::set_var("TEST_REQUIRED_BLANK", "   ");
        assert!(required("TEST_REQUIRED_BLANK").is_err());
    }
}
