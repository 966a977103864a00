//! Per-route usage rollups

use serde::{Deserialize, Serialize};

/// Raw aggregates over a route's retained events
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EventTotals {
    pub total: u64,
    pub unique_users: u64,
    pub success_count: u64,
    /// Mean over events that carry a session duration
    pub avg_session_duration: Option<f64>,
    /// Mean over events that carry a route view duration
    pub avg_duration_on_route: Option<f64>,
}

/// Statistics returned by `/api/events-stats/:routeId`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStats {
    pub total_events: u64,
    pub unique_users: u64,
    /// Percent, two decimals
    pub success_rate: f64,
    pub avg_session_duration: i64,
    pub avg_duration_on_route: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_zero_filled() {
        let json = serde_json::to_value(RouteStats::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "totalEvents": 0,
                "uniqueUsers": 0,
                "successRate": 0.0,
                "avgSessionDuration": 0,
                "avgDurationOnRoute": 0
            })
        );
    }
}
