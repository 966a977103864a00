//! Route interaction events

use crate::domain::geo::GeoPoint;
use crate::domain::types::RouteId;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Event retention window (days)
pub const EVENT_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    View,
    Select,
    Click,
    Favorite,
    Share,
    Search,
    Booking,
}

impl EventType {
    pub const ALL: [EventType; 7] = [
        EventType::View,
        EventType::Select,
        EventType::Click,
        EventType::Favorite,
        EventType::Share,
        EventType::Search,
        EventType::Booking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::View => "view",
            EventType::Select => "select",
            EventType::Click => "click",
            EventType::Favorite => "favorite",
            EventType::Share => "share",
            EventType::Search => "search",
            EventType::Booking => "booking",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown event type '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionResult {
    #[default]
    Success,
    Abandoned,
    Error,
    Pending,
}

impl ActionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionResult::Success => "success",
            ActionResult::Abandoned => "abandoned",
            ActionResult::Error => "error",
            ActionResult::Pending => "pending",
        }
    }
}

impl std::str::FromStr for ActionResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "success" => ActionResult::Success,
            "abandoned" => ActionResult::Abandoned,
            "error" => ActionResult::Error,
            "pending" => ActionResult::Pending,
            other => return Err(format!("unknown action result '{other}'")),
        })
    }
}

/// Client device descriptor
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_mobile: Option<bool>,
}

/// Calendar fields derived once from the event timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalContext {
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u8,
    pub hour_of_day: u8,
    pub is_weekend: bool,
}

impl TemporalContext {
    pub fn from_timestamp(ts: DateTime<Utc>) -> Self {
        let day_of_week = ts.weekday().num_days_from_sunday() as u8;
        Self {
            day_of_week,
            hour_of_day: ts.hour() as u8,
            is_weekend: day_of_week == 0 || day_of_week == 6,
        }
    }
}

/// One anonymized user interaction with a route. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub user_id: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_location: Option<GeoPoint>,
    /// Meters from the user to the route start point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proximity_to_route: Option<f64>,
    pub route_id: RouteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_code: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub temporal: TemporalContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_on_route: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    pub action_result: ActionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_type_round_trip_names() {
        for t in EventType::ALL {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
        }
        assert!("purchase".parse::<EventType>().is_err());
    }

    #[test]
    fn test_action_result_default_is_success() {
        assert_eq!(ActionResult::default(), ActionResult::Success);
        assert!("added".parse::<ActionResult>().is_err());
    }

    #[test]
    fn test_temporal_context_weekday() {
        // 2026-10-14 is a Wednesday
        let ts = Utc.with_ymd_and_hms(2026, 10, 14, 8, 30, 0).unwrap();
        let ctx = TemporalContext::from_timestamp(ts);
        assert_eq!(ctx.day_of_week, 3);
        assert_eq!(ctx.hour_of_day, 8);
        assert!(!ctx.is_weekend);
    }

    #[test]
    fn test_temporal_context_weekend() {
        let saturday = Utc.with_ymd_and_hms(2026, 10, 17, 23, 0, 0).unwrap();
        let sunday = Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap();
        assert_eq!(TemporalContext::from_timestamp(saturday).day_of_week, 6);
        assert!(TemporalContext::from_timestamp(saturday).is_weekend);
        assert_eq!(TemporalContext::from_timestamp(sunday).day_of_week, 0);
        assert!(TemporalContext::from_timestamp(sunday).is_weekend);
    }

    #[test]
    fn test_route_event_json_shape() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 14, 8, 30, 0).unwrap();
        let event = RouteEvent {
            event_id: "e1".into(),
            event_type: EventType::View,
            user_id: "u".into(),
            session_id: "s".into(),
            user_location: None,
            proximity_to_route: None,
            route_id: RouteId::from("r1"),
            route_code: Some("CEL-001".into()),
            timestamp: ts,
            temporal: TemporalContext::from_timestamp(ts),
            session_duration: Some(12),
            duration_on_route: None,
            device_info: None,
            action_result: ActionResult::Success,
            search_query: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "view");
        assert_eq!(json["routeId"], "r1");
        assert_eq!(json["dayOfWeek"], 3);
        assert_eq!(json["isWeekend"], false);
        assert_eq!(json["actionResult"], "success");
        assert!(json.get("durationOnRoute").is_none());

        let back: RouteEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
