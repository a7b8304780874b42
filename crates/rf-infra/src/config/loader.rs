//! Layered configuration loader
//!
//! Defaults, then an optional config file, then `REGFLOW_*` environment
//! variables (double underscore for nesting, e.g.
//! `REGFLOW_OTP__COUNTDOWN_SECS=60`). Later layers win.

use std::path::Path;

use anyhow::Context;
use config::{Config, Environment, File};

use rf_core::config::RegistrationConfig;

pub fn load_config(config_path: Option<&Path>) -> anyhow::Result<RegistrationConfig> {
    let mut builder = Config::builder().add_source(
        Config::try_from(&RegistrationConfig::default())
            .context("failed to encode default configuration")?,
    );

    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(false));
    }

    builder = builder.add_source(Environment::with_prefix("REGFLOW").separator("__"));

    builder
        .build()
        .context("failed to assemble configuration")?
        .try_deserialize()
        .context("configuration does not match the expected shape")
}
