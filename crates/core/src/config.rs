use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `ROSTER__` (sections separated by `__`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub reminders: ReminderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Transactional email provider (Brevo) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_email_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Contact address exposed to templates and copied on registration mail.
    #[serde(default = "default_from_email")]
    pub admin_email: String,
    #[serde(default = "default_email_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_username")]
    pub username: String,
    #[serde(default = "default_admin_password")]
    pub password: String,
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret expected in the `secret` query parameter. Unset disables the check.
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_progressive_delay_ms")]
    pub progressive_delay_ms: u64,
    #[serde(default = "default_immediate_delay_ms")]
    pub immediate_delay_ms: u64,
    #[serde(default = "default_progressive_delay_ms")]
    pub relaunch_delay_ms: u64,
    #[serde(default = "default_error_detail_max")]
    pub error_detail_max: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_upload_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
    #[serde(default = "default_max_upload_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentsConfig {
    /// Directory whose files are registered as attachable documents at startup.
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_reminders_enabled")]
    pub enabled: bool,
    #[serde(default = "default_reminder_hour_utc")]
    pub hour_utc: u32,
}

// Default functions
fn default_node_id() -> String {
    "roster-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    10000
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_email_api_url() -> String {
    "https://api.brevo.com/v3/smtp/email".to_string()
}
fn default_from_email() -> String {
    "doc.cdo94@gmail.com".to_string()
}
fn default_from_name() -> String {
    "CDO 94 - Gardes Médicales".to_string()
}
fn default_email_timeout_secs() -> u64 {
    30
}
fn default_admin_username() -> String {
    "admin".to_string()
}
fn default_admin_password() -> String {
    "change-me".to_string()
}
fn default_session_ttl_hours() -> i64 {
    24
}
fn default_progressive_delay_ms() -> u64 {
    2000
}
fn default_immediate_delay_ms() -> u64 {
    100
}
fn default_error_detail_max() -> usize {
    500
}
fn default_upload_ttl_secs() -> u64 {
    30 * 60
}
fn default_purge_interval_secs() -> u64 {
    5 * 60
}
fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}
fn default_preview_rows() -> usize {
    10
}
fn default_reminders_enabled() -> bool {
    true
}
fn default_reminder_hour_utc() -> u32 {
    8
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: default_email_api_url(),
            api_key: String::new(),
            from_email: default_from_email(),
            from_name: default_from_name(),
            admin_email: default_from_email(),
            timeout_secs: default_email_timeout_secs(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: default_admin_username(),
            password: default_admin_password(),
            session_ttl_hours: default_session_ttl_hours(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            progressive_delay_ms: default_progressive_delay_ms(),
            immediate_delay_ms: default_immediate_delay_ms(),
            relaunch_delay_ms: default_progressive_delay_ms(),
            error_detail_max: default_error_detail_max(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_upload_ttl_secs(),
            purge_interval_secs: default_purge_interval_secs(),
            max_bytes: default_max_upload_bytes(),
            preview_rows: default_preview_rows(),
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: default_reminders_enabled(),
            hour_utc: default_reminder_hour_utc(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            email: EmailConfig::default(),
            admin: AdminConfig::default(),
            webhook: WebhookConfig::default(),
            dispatch: DispatchConfig::default(),
            uploads: UploadConfig::default(),
            documents: DocumentsConfig::default(),
            reminders: ReminderConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("ROSTER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_throttling_policy() {
        let config = AppConfig::default();
        assert_eq!(config.dispatch.progressive_delay_ms, 2000);
        assert_eq!(config.dispatch.immediate_delay_ms, 100);
        assert_eq!(config.dispatch.relaunch_delay_ms, 2000);
        assert_eq!(config.uploads.ttl_secs, 1800);
        assert_eq!(config.uploads.preview_rows, 10);
        assert!(config.webhook.secret.is_none());
    }

    #[test]
    fn test_empty_source_deserializes_to_defaults() {
        let config: AppConfig = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.api.http_port, 10000);
        assert_eq!(config.email.api_url, "https://api.brevo.com/v3/smtp/email");
    }
}
