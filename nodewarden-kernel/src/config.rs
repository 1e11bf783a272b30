use std::net::IpAddr;

/// Configuration du kernel, chargée depuis l'environnement (.env via dotenvy)
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub http_host: IpAddr,
    pub http_port: u16,
    pub data_file: String,
    /// Secondes sans heartbeat avant de classer un node offline
    pub offline_timeout: i64,
    /// Intervalle des passes du moniteur de liveness
    pub monitor_interval_secs: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            http_host: IpAddr::from([0, 0, 0, 0]),
            http_port: 8080,
            data_file: "./data/nodes.json".to_string(),
            offline_timeout: 20,
            monitor_interval_secs: 20,
        }
    }
}

impl KernelConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            http_host: env_parsed("WARDEN_HTTP_HOST", defaults.http_host),
            http_port: env_parsed("WARDEN_HTTP_PORT", defaults.http_port),
            data_file: std::env::var("WARDEN_DATA_FILE").unwrap_or(defaults.data_file),
            offline_timeout: env_parsed("WARDEN_OFFLINE_TIMEOUT", defaults.offline_timeout),
            monitor_interval_secs: env_parsed("WARDEN_MONITOR_INTERVAL", defaults.monitor_interval_secs),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            eprintln!("[kernel] invalid value for {key}, using default");
            default
        }),
        Err(_) => default,
    }
}
