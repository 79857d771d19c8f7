use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `TENANT_ADMIN__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub wizard: WizardConfig,
    #[serde(default)]
    pub redis: RedisConfig,
}

/// Tenant Subscription Service endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub api_token: Option<String>,
}

/// Where and how wizard progress is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    File,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WizardConfig {
    #[serde(default = "default_storage_backend")]
    pub storage: StorageBackend,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_max_branches")]
    pub max_branches: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_urls")]
    pub urls: Vec<String>,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

// Default functions
fn default_base_url() -> String {
    "http://localhost:8080/api/v1".to_string()
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_storage_backend() -> StorageBackend {
    StorageBackend::File
}
fn default_state_dir() -> String {
    ".tenant-admin".to_string()
}
fn default_key_prefix() -> String {
    "tenant-admin:assign-plan".to_string()
}
fn default_debounce_ms() -> u64 {
    300
}
fn default_max_branches() -> u32 {
    50
}
fn default_redis_urls() -> Vec<String> {
    vec!["redis://localhost:6379".to_string()]
}
fn default_ttl_secs() -> u64 {
    7 * 24 * 3600
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            api_token: None,
        }
    }
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            storage: default_storage_backend(),
            state_dir: default_state_dir(),
            key_prefix: default_key_prefix(),
            debounce_ms: default_debounce_ms(),
            max_branches: default_max_branches(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            urls: default_redis_urls(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            wizard: WizardConfig::default(),
            redis: RedisConfig::default(),
        }
    }
}

impl WizardConfig {
    /// Storage key of the wizard instance for one tenant.
    pub fn storage_key(&self, tenant_id: &uuid::Uuid) -> String {
        format!("{}:{}", self.key_prefix, tenant_id)
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("TENANT_ADMIN")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("redis.urls"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
