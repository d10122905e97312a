// Copyright 2025-Present Axiom, Inc. https://axiom.co/
// SPDX-License-Identifier: Apache-2.0

use crate::config::ConfigError;
use crate::extension::client::ControlPlaneError;

/// Errors that stop the extension. Everything else is logged and absorbed.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to register extension: {0}")]
    Registration(#[source] ControlPlaneError),

    #[error("Failed to subscribe to the Logs API: {0}")]
    Subscription(#[source] ControlPlaneError),

    #[error("Failed to fetch next lifecycle event: {0}")]
    NextEvent(#[source] ControlPlaneError),

    #[error("Failed to start log intake server: {0}")]
    IntakeStart(#[from] std::io::Error),
}
