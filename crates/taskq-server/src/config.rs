use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskq_worker::WorkerPoolConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub http: HttpConfig,
    pub workers: WorkersConfig,
    pub retention: RetentionConfig,
    pub auth: AuthConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    pub count: usize,
    pub max_attempts: u32,
    /// Wall-clock bound per execution in seconds; 0 disables it
    pub task_timeout_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub supervise_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// How long terminal records stay queryable
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub enabled: bool,
    /// HS256 secret shared with the credential issuer
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            http: HttpConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            workers: WorkersConfig {
                count: 4,
                max_attempts: 3,
                task_timeout_secs: 300,
                heartbeat_timeout_secs: 600,
                supervise_interval_secs: 10,
            },
            retention: RetentionConfig {
                retention_secs: 3600,
                sweep_interval_secs: 60,
            },
            auth: AuthConfig {
                enabled: false,
                secret: String::new(),
            },
            monitoring: MonitoringConfig {
                log_level: "info".to_string(),
            },
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            worker_count: self.workers.count,
            max_attempts: self.workers.max_attempts,
            task_timeout: match self.workers.task_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            heartbeat_timeout: Duration::from_secs(self.workers.heartbeat_timeout_secs),
            supervise_interval: Duration::from_secs(self.workers.supervise_interval_secs),
        }
    }
}
