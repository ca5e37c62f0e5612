use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// Minutes east of UTC for the professional's local calendar.
    pub schedule_utc_offset_minutes: i32,
    pub service_day_start: String,
    pub service_day_end: String,
    pub slot_step_minutes: u32,
    pub api_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            schedule_utc_offset_minutes: parse_or("SCHEDULE_UTC_OFFSET_MINUTES", 0),
            service_day_start: env::var("SERVICE_DAY_START")
                .unwrap_or_else(|_| {
                    warn!("SERVICE_DAY_START not set, using default");
                    "08:00".to_string()
                }),
            service_day_end: env::var("SERVICE_DAY_END")
                .unwrap_or_else(|_| {
                    warn!("SERVICE_DAY_END not set, using default");
                    "20:00".to_string()
                }),
            slot_step_minutes: parse_or("SLOT_STEP_MINUTES", 15),
            api_port: parse_or("API_PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            schedule_utc_offset_minutes: 0,
            service_day_start: "08:00".to_string(),
            service_day_end: "20:00".to_string(),
            slot_step_minutes: 15,
            api_port: 3000,
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using {}", key, raw, default);
            default
        }),
        Err(_) => {
            warn!("{} not set, using default {}", key, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_not_configured() {
        let config = AppConfig::default();
        assert!(!config.is_configured());
        assert_eq!(config.slot_step_minutes, 15);
        assert_eq!(config.service_day_start, "08:00");
    }
}
