//! Live tracking of one shop order.
//!
//! A subscription owns a single polling task. Each tick fetches the order,
//! and while a courier is on the job, the courier's latest location. There
//! is never more than one fetch in flight: the next one is scheduled only
//! after the previous finished or was dropped.
//!
//! Retargeting bumps the subscription's epoch. A result captured under an
//! older epoch is thrown away even if it arrives after the new target's.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::epoch::{EpochCounter, FailureLedger};
use crate::client::gateway::{FetchError, TrackingSource};
use crate::geo::{distance_km, midpoint};
use crate::models::courier::{CourierLocationSample, GeoPoint};
use crate::models::order::ShopOrderStatus;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackingTarget {
    pub order_id: Uuid,
    pub shop_order_id: Uuid,
}

impl TrackingTarget {
    pub fn new(order_id: Uuid, shop_order_id: Uuid) -> Self {
        Self {
            order_id,
            shop_order_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackingUpdate {
    /// Status or courier changed.
    Status {
        target: TrackingTarget,
        status: ShopOrderStatus,
        courier_id: Option<Uuid>,
    },
    /// The courier moved.
    Location {
        target: TrackingTarget,
        sample: CourierLocationSample,
        distance_km: f64,
        map_center: GeoPoint,
    },
    /// The very first fetch for this target failed. Polling carries on.
    Unavailable {
        target: TrackingTarget,
        reason: String,
    },
}

type UpdateFn = Box<dyn Fn(TrackingUpdate) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    status: ShopOrderStatus,
    courier_id: Option<Uuid>,
    location: Option<CourierLocationSample>,
    destination: GeoPoint,
}

async fn fetch_snapshot<S>(source: &S, target: TrackingTarget) -> Result<Snapshot, FetchError>
where
    S: TrackingSource + ?Sized,
{
    let order = source.get_order(target.order_id).await?;
    order.validate().map_err(FetchError::InvalidResponse)?;

    let shop_order = order.shop_order(target.shop_order_id).ok_or_else(|| {
        FetchError::NotFound(format!(
            "shop order {} not found in order {}",
            target.shop_order_id, target.order_id
        ))
    })?;

    let location = if shop_order.status.is_trackable() {
        source
            .get_courier_location(target.order_id, target.shop_order_id)
            .await?
    } else {
        None
    };

    Ok(Snapshot {
        status: shop_order.status,
        courier_id: shop_order.assigned_courier_id,
        location,
        destination: order.address.point(),
    })
}

/// What the consumer has already been shown for the current target.
#[derive(Debug, Default)]
struct LastPublished {
    status: Option<(ShopOrderStatus, Option<Uuid>)>,
    location: Option<CourierLocationSample>,
}

impl LastPublished {
    /// Returns the updates `snapshot` warrants and whether it is terminal.
    fn absorb(&mut self, target: TrackingTarget, snapshot: Snapshot) -> (Vec<TrackingUpdate>, bool) {
        let mut updates = Vec::new();
        let status = (snapshot.status, snapshot.courier_id);

        if self.status != Some(status) {
            if self.status.map(|(_, courier)| courier) != Some(snapshot.courier_id) {
                self.location = None;
            }
            self.status = Some(status);
            updates.push(TrackingUpdate::Status {
                target,
                status: snapshot.status,
                courier_id: snapshot.courier_id,
            });
        }

        if snapshot.status.is_terminal() {
            return (updates, true);
        }

        let Some(sample) = snapshot.location else {
            return (updates, false);
        };
        if Some(sample.courier_id) != snapshot.courier_id {
            return (updates, false);
        }
        if let Some(previous) = &self.location {
            if sample.is_older_than(previous) {
                debug!(courier_id = %sample.courier_id, "dropping out-of-order location sample");
                return (updates, false);
            }
            if sample.same_position(previous) {
                return (updates, false);
            }
        }

        let courier = sample.point();
        updates.push(TrackingUpdate::Location {
            target,
            distance_km: distance_km(courier, snapshot.destination),
            map_center: midpoint(courier, snapshot.destination),
            sample: sample.clone(),
        });
        self.location = Some(sample);

        (updates, false)
    }
}

pub struct TrackingPoller<S: ?Sized> {
    source: Arc<S>,
    interval: Duration,
}

impl<S> TrackingPoller<S>
where
    S: TrackingSource + ?Sized + 'static,
{
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Starts polling `target` right away. Must be called inside a tokio runtime.
    pub fn subscribe<F>(&self, target: TrackingTarget, on_update: F) -> TrackingHandle
    where
        F: Fn(TrackingUpdate) + Send + Sync + 'static,
    {
        let epochs = Arc::new(EpochCounter::new());
        let (target_tx, target_rx) = watch::channel(target);
        let cancel = CancellationToken::new();

        let worker = Worker {
            source: Arc::clone(&self.source),
            interval: self.interval,
            epochs: Arc::clone(&epochs),
            target_rx,
            cancel: cancel.clone(),
            on_update: Box::new(on_update),
        };
        let task = tokio::spawn(worker.run());

        TrackingHandle {
            epochs,
            target_tx,
            cancel,
            task,
        }
    }
}

/// Subscribes with the default five second interval.
pub fn subscribe_to_tracking<S, F>(
    source: Arc<S>,
    order_id: Uuid,
    shop_order_id: Uuid,
    on_update: F,
) -> TrackingHandle
where
    S: TrackingSource + ?Sized + 'static,
    F: Fn(TrackingUpdate) + Send + Sync + 'static,
{
    TrackingPoller::new(source).subscribe(TrackingTarget::new(order_id, shop_order_id), on_update)
}

/// Unsubscribe handle. Dropping it unsubscribes as well.
#[derive(Debug)]
pub struct TrackingHandle {
    epochs: Arc<EpochCounter>,
    target_tx: watch::Sender<TrackingTarget>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TrackingHandle {
    pub fn target(&self) -> TrackingTarget {
        *self.target_tx.borrow()
    }

    /// Points the subscription at another shop order. Any fetch still in
    /// flight for the old target is dropped and its result ignored.
    pub fn retarget(&self, target: TrackingTarget) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.target_tx.send_if_modified(|current| {
            if *current == target {
                return false;
            }
            *current = target;
            self.epochs.advance();
            true
        });
    }

    /// Stops polling. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

impl Drop for TrackingHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker<S: ?Sized> {
    source: Arc<S>,
    interval: Duration,
    epochs: Arc<EpochCounter>,
    target_rx: watch::Receiver<TrackingTarget>,
    cancel: CancellationToken,
    on_update: UpdateFn,
}

impl<S> Worker<S>
where
    S: TrackingSource + ?Sized,
{
    async fn run(self) {
        let Worker {
            source,
            interval,
            epochs,
            mut target_rx,
            cancel,
            on_update,
        } = self;

        'target: loop {
            let (epoch, target) = {
                let current = target_rx.borrow_and_update();
                (epochs.current(), *current)
            };
            debug!(
                order_id = %target.order_id,
                shop_order_id = %target.shop_order_id,
                epoch = epoch.value(),
                "tracking target"
            );

            let mut ledger = FailureLedger::default();
            let mut published = LastPublished::default();

            loop {
                let fetched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    changed = target_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        continue 'target;
                    }
                    result = fetch_snapshot(&*source, target) => result,
                };

                if !epochs.is_current(epoch) {
                    debug!(
                        shop_order_id = %target.shop_order_id,
                        "discarding result for superseded target"
                    );
                    continue 'target;
                }

                match fetched {
                    Ok(snapshot) => {
                        ledger.record_success();
                        let (updates, terminal) = published.absorb(target, snapshot);
                        for update in updates {
                            on_update(update);
                        }

                        if terminal {
                            info!(
                                order_id = %target.order_id,
                                shop_order_id = %target.shop_order_id,
                                "shop order finished; tracking stopped"
                            );
                            tokio::select! {
                                biased;
                                _ = cancel.cancelled() => return,
                                changed = target_rx.changed() => {
                                    if changed.is_err() {
                                        return;
                                    }
                                    continue 'target;
                                }
                            }
                        }
                    }
                    Err(err) => {
                        if ledger.record_failure() {
                            on_update(TrackingUpdate::Unavailable {
                                target,
                                reason: err.to_string(),
                            });
                        }
                        warn!(
                            order_id = %target.order_id,
                            shop_order_id = %target.shop_order_id,
                            failures = ledger.consecutive_failures(),
                            error = %err,
                            "tracking fetch failed; retrying next tick"
                        );
                    }
                }

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    changed = target_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        continue 'target;
                    }
                    _ = sleep(interval) => {}
                }
            }
        }
    }
}
