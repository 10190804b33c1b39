use crate::activity::GeoPoint;
use crate::errors::{Error, Result};

/* Routes are persisted in the `route` TEXT column as a JSON array of
{"latitude": .., "longitude": ..} objects. The encoding must round-trip
losslessly; malformed stored text surfaces as a persistence error instead
of being silently treated as an empty route. */

pub fn encode(route: &[GeoPoint]) -> Result<String> {
    serde_json::to_string(route).map_err(|e| Error::MalformedRecord(format!("route encode: {e}")))
}

pub fn decode(text: &str) -> Result<Vec<GeoPoint>> {
    serde_json::from_str(text).map_err(|e| Error::MalformedRecord(format!("route decode: {e}")))
}
