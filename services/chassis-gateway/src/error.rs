// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Error translation
//!
//! Every failure in request handling ends up as a [`GatewayError`], which
//! knows its externally visible [`ErrorKind`] and the message callers see.
//! The `Display` text of each variant *is* that message: dial, session and
//! status-read failures carry a fixed string (the underlying error is only
//! kept as the `source` for logging), while control failures render the
//! controller's error text verbatim.

use dropshot::{ClientErrorStatusCode, HttpError};
use thiserror::Error;

use crate::bmc::BmcError;

/// Error kinds surfaced at the RPC boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    FailedPrecondition,
}

impl ErrorKind {
    /// Stable code reported in the `error_code` field of error responses
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::FailedPrecondition => "failed_precondition",
        }
    }

    pub fn status_code(&self) -> ClientErrorStatusCode {
        match self {
            ErrorKind::NotFound => ClientErrorStatusCode::NOT_FOUND,
            ErrorKind::InvalidArgument => ClientErrorStatusCode::BAD_REQUEST,
            ErrorKind::FailedPrecondition => ClientErrorStatusCode::PRECONDITION_FAILED,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("target not configured")]
    TargetNotFound(String),

    #[error("invalid command")]
    InvalidCommand(String),

    #[error("unable to reach management controller")]
    Unreachable(#[source] BmcError),

    #[error("unable to create session")]
    SessionNegotiation(#[source] BmcError),

    #[error("chassis control error")]
    StatusRead(#[source] BmcError),

    // TODO: return a generic message here too and only log the controller
    // text, as StatusRead does.
    #[error("{0}")]
    ControlFailed(#[source] BmcError),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::TargetNotFound(_) => ErrorKind::NotFound,
            GatewayError::InvalidCommand(_) => ErrorKind::InvalidArgument,
            GatewayError::Unreachable(_)
            | GatewayError::SessionNegotiation(_)
            | GatewayError::StatusRead(_)
            | GatewayError::ControlFailed(_) => ErrorKind::FailedPrecondition,
        }
    }
}

impl From<GatewayError> for HttpError {
    fn from(error: GatewayError) -> Self {
        let kind = error.kind();
        HttpError::for_client_error(
            Some(kind.as_str().to_string()),
            kind.status_code(),
            error.to_string(),
        )
    }
}
