pub mod domain;
pub mod market_data;
pub mod screening;
pub mod signal;
pub mod storage;
pub mod time;

#[cfg(test)]
mod test_support;

pub mod config {
    use anyhow::Context;

    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_RETRIES: u32 = 3;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub supabase_url: Option<String>,
        pub supabase_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub krx_base_url: Option<String>,
        pub naver_chart_base_url: Option<String>,
        pub yahoo_chart_base_url: Option<String>,
        pub kind_base_url: Option<String>,
        pub data_provider_timeout_secs: u64,
        pub data_provider_retries: u32,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                database_url: None,
                supabase_url: None,
                supabase_key: None,
                sentry_dsn: None,
                krx_base_url: None,
                naver_chart_base_url: None,
                yahoo_chart_base_url: None,
                kind_base_url: None,
                data_provider_timeout_secs: DEFAULT_TIMEOUT_SECS,
                data_provider_retries: DEFAULT_RETRIES,
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: non_empty_var("DATABASE_URL"),
                supabase_url: non_empty_var("SUPABASE_URL"),
                supabase_key: non_empty_var("SUPABASE_KEY"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                krx_base_url: non_empty_var("KRX_BASE_URL"),
                naver_chart_base_url: non_empty_var("NAVER_CHART_BASE_URL"),
                yahoo_chart_base_url: non_empty_var("YAHOO_CHART_BASE_URL"),
                kind_base_url: non_empty_var("KIND_BASE_URL"),
                data_provider_timeout_secs: parse_var("DATA_PROVIDER_TIMEOUT_SECS")?
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
                data_provider_retries: parse_var("DATA_PROVIDER_RETRIES")?
                    .unwrap_or(DEFAULT_RETRIES),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        /// Both hosted-store credentials, URL first.
        pub fn require_supabase(&self) -> anyhow::Result<(&str, &str)> {
            let url = self
                .supabase_url
                .as_deref()
                .context("SUPABASE_URL is required")?;
            let key = self
                .supabase_key
                .as_deref()
                .context("SUPABASE_KEY is required")?;
            Ok((url, key))
        }
    }

    fn non_empty_var(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    fn parse_var<T>(name: &str) -> anyhow::Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        non_empty_var(name)
            .map(|v| v.trim().parse::<T>())
            .transpose()
            .with_context(|| format!("{name} is not a valid number"))
    }

}
