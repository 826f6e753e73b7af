use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::engine::orders::authorize_customer;
use crate::error::AppError;
use crate::models::courier::CourierLocationSample;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SampleOutcome {
    Accepted,
    /// Older than the sample already held; discarded.
    Stale,
}

/// Answer to "where is the courier of this shop order".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourierLocationView {
    pub shop_order_id: Uuid,
    pub courier_id: Option<Uuid>,
    /// `None` until a courier is assigned and has reported at least once.
    pub location: Option<CourierLocationSample>,
}

/// Writes the courier's latest-known slot unless `sample` is older than it.
pub fn record_sample(state: &AppState, sample: CourierLocationSample) -> SampleOutcome {
    let courier_id = sample.courier_id;
    let outcome = match state.courier_locations.entry(courier_id) {
        Entry::Occupied(mut held) => {
            if sample.is_older_than(held.get()) {
                SampleOutcome::Stale
            } else {
                held.insert(sample);
                SampleOutcome::Accepted
            }
        }
        Entry::Vacant(slot) => {
            slot.insert(sample);
            SampleOutcome::Accepted
        }
    };

    let label = match outcome {
        SampleOutcome::Accepted => "accepted",
        SampleOutcome::Stale => "stale",
    };
    state
        .metrics
        .courier_location_samples_total
        .with_label_values(&[label])
        .inc();
    debug!(courier_id = %courier_id, outcome = label, "courier location sample");

    outcome
}

pub fn courier_location(
    state: &AppState,
    order_id: Uuid,
    shop_order_id: Uuid,
    caller: Option<Uuid>,
) -> Result<CourierLocationView, AppError> {
    let courier_id = {
        let order = state
            .orders
            .get(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        authorize_customer(&order, caller)?;

        order
            .shop_order(shop_order_id)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "shop order {shop_order_id} not found in order {order_id}"
                ))
            })?
            .assigned_courier_id
    };

    let location = courier_id.and_then(|id| {
        state
            .courier_locations
            .get(&id)
            .map(|entry| entry.value().clone())
    });

    Ok(CourierLocationView {
        shop_order_id,
        courier_id,
        location,
    })
}
