/* Copyright (c) 2021 Niels Sonnich Poulsen (http://nielssp.dk)
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Forum server settings

use std::time::Duration;

use config::{Config, ConfigError, Environment};

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    pub operation_timeout_ms: u64,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let mut s = Config::default();
        s.set_default("database", "sqlite:forum.db")?;
        s.set_default("max_connections", 10)?;
        s.set_default("busy_timeout_ms", 5000)?;
        s.set_default("operation_timeout_ms", 10000)?;
        s.merge(Environment::with_prefix("FORUM"))?;
        s.try_into()
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}
