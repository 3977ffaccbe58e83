// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {
    crate::{
        architecture::ArchitectureError, build_order::CycleError, dependency::DependencyError,
        package_version::VersionError,
    },
    thiserror::Error,
};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum DebianError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("control file parse error: {0}")]
    ControlParseError(String),

    #[error("required field missing in control paragraph: {0}")]
    ControlRequiredFieldMissing(String),

    #[error("in field {0}: {1}")]
    ControlFieldValue(&'static str, Box<DebianError>),

    #[error("version error: {0}")]
    Version(#[from] VersionError),

    #[error("architecture error: {0}")]
    Architecture(#[from] ArchitectureError),

    #[error("dependency error: {0}")]
    Dependency(#[from] DependencyError),

    #[error("{0}")]
    Cycle(#[from] CycleError),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, DebianError>;
