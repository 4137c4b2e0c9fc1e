// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Domain error types for zonegate.
//!
//! This module provides specialized error types for:
//! - Backend driver operations (zone writes, deletes, verification)
//! - Upstream control-panel API operations
//! - Zone text parsing
//!
//! These errors provide structured error handling for the write pipeline,
//! enabling retry classification and cause summaries on dead letters.

use thiserror::Error;

/// Errors that can occur during backend driver operations.
///
/// Each variant carries the backend name and zone involved so dead letters
/// and log lines can identify exactly which write went wrong.
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    /// Writing a zone to the backend failed
    ///
    /// Covers zone-file I/O errors, database transaction failures, and
    /// daemon-reload failures after the file was staged.
    #[error("Failed to write zone '{zone}' to backend '{backend}': {reason}")]
    WriteFailed {
        /// The backend that failed
        backend: String,
        /// The zone being written
        zone: String,
        /// Specific reason for the failure
        reason: String,
    },

    /// Deleting a zone from the backend failed
    #[error("Failed to delete zone '{zone}' from backend '{backend}': {reason}")]
    DeleteFailed {
        /// The backend that failed
        backend: String,
        /// The zone being deleted
        zone: String,
        /// Specific reason for the failure
        reason: String,
    },

    /// Post-write verification found the wrong record count
    ///
    /// Raised only after a reconcile pass also failed to converge the
    /// backend onto the reference record set.
    #[error(
        "Record count mismatch for zone '{zone}' on backend '{backend}': expected {expected}, found {actual}"
    )]
    VerifyMismatch {
        /// The backend that disagreed
        backend: String,
        /// The zone being verified
        zone: String,
        /// Record count from the parsed reference text
        expected: usize,
        /// Record count the backend reported
        actual: usize,
    },

    /// The daemon control binary did not reload within its deadline
    #[error("Daemon reload for backend '{backend}' failed: {reason}")]
    ReloadFailed {
        /// The backend whose daemon failed to reload
        backend: String,
        /// Exit status or timeout description
        reason: String,
    },

    /// The zone text handed to the driver could not be parsed
    #[error("Zone '{zone}' rejected by backend '{backend}': {reason}")]
    InvalidZone {
        /// The backend rejecting the zone
        backend: String,
        /// The zone with invalid content
        zone: String,
        /// Explanation of what is invalid
        reason: String,
    },
}

impl BackendError {
    /// Returns true if this error looks transient.
    ///
    /// I/O, transaction, reload, and verification failures are transient; a
    /// zone the driver cannot parse will never succeed and is permanent.
    /// Classification feeds operator logs only: every failure runs the full
    /// retry schedule before dead-lettering.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::WriteFailed { .. }
            | Self::DeleteFailed { .. }
            | Self::VerifyMismatch { .. }
            | Self::ReloadFailed { .. } => true,
            Self::InvalidZone { .. } => false,
        }
    }

    /// Returns the backend name this error originated from.
    #[must_use]
    pub fn backend(&self) -> &str {
        match self {
            Self::WriteFailed { backend, .. }
            | Self::DeleteFailed { backend, .. }
            | Self::VerifyMismatch { backend, .. }
            | Self::ReloadFailed { backend, .. }
            | Self::InvalidZone { backend, .. } => backend,
        }
    }

    /// Returns a stable cause label for retry and dead-letter summaries.
    #[must_use]
    pub fn cause_label(&self) -> &'static str {
        match self {
            Self::WriteFailed { .. } => "WriteFailed",
            Self::DeleteFailed { .. } => "DeleteFailed",
            Self::VerifyMismatch { .. } => "VerifyMismatch",
            Self::ReloadFailed { .. } => "ReloadFailed",
            Self::InvalidZone { .. } => "InvalidZone",
        }
    }
}

/// Errors that can occur when talking to an upstream control panel.
#[derive(Error, Debug, Clone)]
pub enum UpstreamError {
    /// The upstream rejected our credentials, even after the legacy
    /// session-login fallback
    #[error("Authentication to upstream {host} failed: {reason}")]
    AuthFailed {
        /// Upstream hostname
        host: String,
        /// Reason reported by the upstream
        reason: String,
    },

    /// The HTTP request could not be completed (network, timeout, non-2xx)
    #[error("Upstream {host} request '{command}' failed: {reason}")]
    RequestFailed {
        /// Upstream hostname
        host: String,
        /// Command path, e.g. `CMD_API_SHOW_DOMAINS`
        command: String,
        /// Connection or status error
        reason: String,
    },

    /// Neither the structured JSON form nor the legacy flat form of the
    /// response could be decoded
    #[error("Upstream {host} returned an unparseable response for '{command}'")]
    MalformedResponse {
        /// Upstream hostname
        host: String,
        /// Command path that produced the response
        command: String,
    },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
