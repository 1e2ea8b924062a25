pub mod loader;
pub mod schema;

pub use loader::{
    default_config_path, load_config, load_config_from_str, load_config_or_default,
    validate_config, API_BASE_URL_ENV,
};
pub use schema::{
    AdmissionConfig, ClientConfig, HttpConfig, PollTierConfig, PollingConfig, QaConfig,
    SchedulingConfig, SearchType,
};
