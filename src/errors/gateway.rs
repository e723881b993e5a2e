// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//! Remote desktop gateway error types

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    UnknownRole(String),
    /// The gateway answered with a non-success status.
    Rejected { status: u16, message: String },
    Timeout(String),
    Unreachable(String),
    MalformedResponse(String),
    /// Several connections are visible and none could be picked for the role.
    AmbiguousConnection { role: String, candidates: Vec<String> },
}

impl GatewayError {
    /// Short machine-readable code used in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::UnknownRole(_) => "unknown_role",
            GatewayError::Rejected { .. } => "upstream_rejected",
            GatewayError::Timeout(_) => "upstream_timeout",
            GatewayError::Unreachable(_) => "upstream_unreachable",
            GatewayError::MalformedResponse(_) => "upstream_malformed",
            GatewayError::AmbiguousConnection { .. } => "ambiguous_connection",
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::UnknownRole(role) => write!(f, "Invalid role: {}", role),
            GatewayError::Rejected { status, message } => {
                write!(f, "Gateway rejected request (HTTP {}): {}", status, message)
            }
            GatewayError::Timeout(msg) => write!(f, "Timeout talking to gateway: {}", msg),
            GatewayError::Unreachable(msg) => write!(f, "Gateway unreachable: {}", msg),
            GatewayError::MalformedResponse(msg) => {
                write!(f, "Malformed gateway response: {}", msg)
            }
            GatewayError::AmbiguousConnection { role, candidates } => write!(
                f,
                "Multiple connections visible for {}. Set connection_id explicitly. Found: [{}]",
                role,
                candidates.join(", ")
            ),
        }
    }
}

impl std::error::Error for GatewayError {}
