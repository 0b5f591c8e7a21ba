mod settings;

pub use settings::{CaptureConfig, Config, TomlConfig, EXAMPLE_CONFIG};
