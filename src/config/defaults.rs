use super::*;

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.solarweb.com/swqapi".to_string(),
            access_key_id: String::new(),
            access_key_value: String::new(),
            user_id: String::new(),
            password: String::new(),
            timeout_secs: 30,
            max_retries: 3,
            retry_delay_secs: 1,
            page_size: 50,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            refresh_on_start: true,
        }
    }
}

impl Default for IncidentsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            escalate_after_secs: 1800,
            remind_after_hours: 15,
            remind_interval_hours: 24,
            history_cap: 200,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            morning_time: "08:00".to_string(),
            evening_time: "20:00".to_string(),
            permission_granted: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/hyperion.log".to_string(),
            format: "structured".to_string(),
            max_file_size_mb: 10,
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8088,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: "/data/hyperion_state.json".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            poll: PollConfig::default(),
            incidents: IncidentsConfig::default(),
            notifications: NotificationsConfig::default(),
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
            storage: StorageConfig::default(),
            timezone: "UTC".to_string(),
        }
    }
}
