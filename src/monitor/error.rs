// SPDX-License-Identifier: Apache-2.0

//! Error types for the query monitor
//!
//! None of these ever reach the observed operation. They are reported through
//! `tracing` and the monitor falls back to a safe default.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Serialize, Deserialize)]
pub enum MonitorError {
    #[error("Configuration unavailable: {message}")]
    ConfigurationUnavailable { message: String },

    #[error("Malformed pattern '{pattern}': {message}")]
    MalformedPattern { pattern: String, message: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl MonitorError {
    pub fn configuration_unavailable(msg: impl Into<String>) -> Self {
        Self::ConfigurationUnavailable { message: msg.into() }
    }

    pub fn malformed_pattern(pattern: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedPattern {
            pattern: pattern.into(),
            message: msg.into(),
        }
    }

    pub fn invalid_value(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: msg.into(),
        }
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;
