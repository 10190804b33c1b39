use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// One reported (latitude, longitude) sample from the location source.
/// Field names are part of the persisted route encoding, do not rename.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A finished tracking session that has not been persisted yet. The id is
/// assigned by the store on insert.
#[derive(Clone, Debug, PartialEq)]
pub struct NewActivity {
    pub name: String,
    /// Session start time.
    pub date: DateTime<Utc>,
    pub duration_secs: i64,
    pub distance_km: f64,
    /// Chronologically ordered position fixes.
    pub route: Vec<GeoPoint>,
    /// Opaque reference to a photo owned by an external collaborator.
    pub photo_uri: Option<String>,
}

/// One persisted activity record. Immutable once stored, except deletion.
#[derive(Clone, Debug, PartialEq)]
pub struct Activity {
    pub id: i64,
    pub name: String,
    pub date: DateTime<Utc>,
    pub duration_secs: i64,
    pub distance_km: f64,
    pub route: Vec<GeoPoint>,
    pub photo_uri: Option<String>,
}

pub fn format_duration(total_secs: i64) -> String {
    let total_secs = total_secs.max(0);
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Fallback name for an activity the user didn't bother naming.
pub fn default_activity_name(at: DateTime<Utc>) -> String {
    let local = at.with_timezone(&Local);
    format!(
        "Activity on {} at {}",
        local.format("%Y-%m-%d"),
        local.format("%H:%M:%S")
    )
}
