// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Code Mapping
//!
//! Maps an `Orchestrator::run` outcome onto a process exit code, using the
//! BSD `sysexits.h` convention (`EX_OK`, `EX_DATAERR`, `EX_UNAVAILABLE`,
//! ...) rather than a bare 0/1.

use std::process::ExitCode as ProcessExitCode;

use sentinel_domain::{Result, SentinelError};

/// `sysexits.h`-style process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Successful termination.
    Ok = 0,
    /// Generic failure not covered by a more specific code below.
    Software = 70,
    /// Invalid configuration (bad env var, malformed URL or path).
    Config = 78,
    /// Control plane or billing endpoint unreachable or returned a
    /// transient failure after retries were exhausted.
    Unavailable = 69,
    /// Authorization was denied, or a billing failure required suspension.
    NoPermission = 77,
    /// Ciphertext, manifest, or wire data failed to validate.
    DataError = 65,
    /// Shutdown was requested before the sentinel reached `Ready`.
    Interrupted = 130,
}

impl From<ExitCode> for ProcessExitCode {
    fn from(code: ExitCode) -> Self {
        ProcessExitCode::from(code as u8)
    }
}

/// Classifies a `SentinelError` into the exit code `main` should return.
pub fn map_error_to_exit_code(error: &SentinelError) -> ExitCode {
    match error {
        SentinelError::InvalidConfiguration(_) => ExitCode::Config,
        SentinelError::InvalidFormat(_)
        | SentinelError::UnsupportedVersion(_)
        | SentinelError::UnsupportedAlgorithm(_)
        | SentinelError::ChunkSizeOutOfRange(_)
        | SentinelError::AuthenticationFailed { .. }
        | SentinelError::ChunkLengthMismatch { .. }
        | SentinelError::InvalidKeyLength(_)
        | SentinelError::HashMismatch { .. } => ExitCode::DataError,
        SentinelError::AuthorizationDenied(_) | SentinelError::BillingSuspendable(_) => ExitCode::NoPermission,
        SentinelError::RangeTransient(_)
        | SentinelError::SasExpired(_)
        | SentinelError::DownloadTerminal(_)
        | SentinelError::AuthorizationTransient(_)
        | SentinelError::BillingTransient(_) => ExitCode::Unavailable,
        SentinelError::Cancelled => ExitCode::Interrupted,
        SentinelError::InvalidTransition { .. } | SentinelError::Io(_) | SentinelError::Internal(_) => ExitCode::Software,
    }
}

/// Converts the orchestrator's top-level `Result` into a process exit code.
pub fn result_to_exit_code(result: Result<()>) -> ProcessExitCode {
    match result {
        Ok(()) => ExitCode::Ok.into(),
        Err(e) => {
            let code = map_error_to_exit_code(&e);
            tracing::error!(error = %e, exit_code = code as u8, "sentinel exiting with error");
            code.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_map_to_config_exit_code() {
        assert_eq!(map_error_to_exit_code(&SentinelError::InvalidConfiguration("bad path".into())), ExitCode::Config);
    }

    #[test]
    fn denial_maps_to_no_permission() {
        assert_eq!(map_error_to_exit_code(&SentinelError::AuthorizationDenied("nope".into())), ExitCode::NoPermission);
        assert_eq!(map_error_to_exit_code(&SentinelError::BillingSuspendable("quota".into())), ExitCode::NoPermission);
    }

    #[test]
    fn transient_failures_map_to_unavailable() {
        assert_eq!(map_error_to_exit_code(&SentinelError::RangeTransient("x".into())), ExitCode::Unavailable);
        assert_eq!(map_error_to_exit_code(&SentinelError::SasExpired("x".into())), ExitCode::Unavailable);
    }

    #[test]
    fn cancellation_maps_to_interrupted() {
        assert_eq!(map_error_to_exit_code(&SentinelError::Cancelled), ExitCode::Interrupted);
    }

    #[test]
    fn data_corruption_maps_to_data_error() {
        assert_eq!(
            map_error_to_exit_code(&SentinelError::AuthenticationFailed { chunk_index: 3 }),
            ExitCode::DataError
        );
    }

    #[test]
    fn success_maps_to_ok() {
        let _code: ProcessExitCode = result_to_exit_code(Ok(()));
    }
}
