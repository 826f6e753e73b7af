use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Latest reported position of a courier. Each sample supersedes the previous one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourierLocationSample {
    pub courier_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Utc>,
}

impl CourierLocationSample {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.latitude,
            lng: self.longitude,
        }
    }

    pub fn same_position(&self, other: &CourierLocationSample) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }

    /// True when `self` was observed strictly before `other`.
    pub fn is_older_than(&self, other: &CourierLocationSample) -> bool {
        self.observed_at < other.observed_at
    }
}
