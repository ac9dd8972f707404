pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, read_config, save_config};
pub use schema::{
    Config, DEFAULT_WEBHOOK_URL, LivenessConfig, ReconnectConfig, ReconnectPolicyKind,
    RelayConfig, SessionConfig, WebhookConfig,
};
