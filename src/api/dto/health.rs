//! Health check DTOs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::db::PoolStatus;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "status": "healthy",
    "version": "0.1.0",
    "timestamp": "2026-01-01T12:00:00Z",
    "checks": {
        "database": {
            "status": "healthy",
            "message": "Connected",
            "response_time_ms": 2
        }
    },
    "pool": {
        "backend": "postgres",
        "max_size": 10,
        "connections": 2,
        "idle_connections": 1
    }
}))]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[schema(example = "0.1.0")]
    pub version: String,
    /// Time of the check (RFC 3339, UTC)
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: String,
    pub checks: HashMap<String, ComponentHealth>,
    pub pool: PoolState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub message: Option<String>,
    /// Round trip of `SELECT 1`, including the wait for a connection
    pub response_time_ms: Option<u64>,
}

/// Connection pool occupancy at the time of the check.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PoolState {
    #[schema(example = "postgres")]
    pub backend: String,
    pub max_size: u32,
    pub connections: u32,
    pub idle_connections: u32,
}

impl From<PoolStatus> for PoolState {
    fn from(status: PoolStatus) -> Self {
        Self {
            backend: status.backend.to_string(),
            max_size: status.max_size,
            connections: status.connections,
            idle_connections: status.idle_connections,
        }
    }
}
