use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use derive_more::{Display, Error};
use tracing::{error, info, warn};

use crate::domain::Entity;

use super::{AdmissionError, ReservationConflictChecker, ReservationId, ReservationRequest};
use super::{Reservation, VehicleId};

/// Tells the renter about changes to their booking.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn reservation_confirmed(&self, reservation: &Reservation) -> Result<(), NotifyError>;
    async fn reservation_rescheduled(&self, reservation: &Reservation)
        -> Result<(), NotifyError>;
    async fn reservation_cancelled(&self, reservation: &Reservation) -> Result<(), NotifyError>;
}

#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[display(fmt = "Notification failed: {}", reason)]
pub struct NotifyError {
    pub reason: String,
}

/// Writes notifications to the log instead of sending them.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn reservation_confirmed(&self, reservation: &Reservation) -> Result<(), NotifyError> {
        info!(
            renter_id = %reservation.renter_id(),
            reservation_id = %reservation.id(),
            "notify: reservation confirmed"
        );
        Ok(())
    }

    async fn reservation_rescheduled(
        &self,
        reservation: &Reservation,
    ) -> Result<(), NotifyError> {
        info!(
            renter_id = %reservation.renter_id(),
            reservation_id = %reservation.id(),
            "notify: reservation rescheduled"
        );
        Ok(())
    }

    async fn reservation_cancelled(&self, reservation: &Reservation) -> Result<(), NotifyError> {
        info!(
            renter_id = %reservation.renter_id(),
            reservation_id = %reservation.id(),
            "notify: reservation cancelled"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Sleep before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(25),
        }
    }
}

/// Booking flow around the checker: retries lost races, then notifies.
#[derive(Clone)]
pub struct BookingWorkflow {
    checker: ReservationConflictChecker,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
}

impl BookingWorkflow {
    pub fn new(
        checker: ReservationConflictChecker,
        notifier: Arc<dyn Notifier>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            checker,
            notifier,
            policy,
        }
    }

    pub fn checker(&self) -> &ReservationConflictChecker {
        &self.checker
    }

    pub async fn book(&self, request: ReservationRequest) -> Result<Reservation, AdmissionError> {
        let request = ReservationRequest {
            exclude: None,
            ..request
        };
        let reservation = self
            .with_retry(|| self.checker.check_and_reserve(request.clone()))
            .await?;
        if let Err(e) = self.notifier.reservation_confirmed(&reservation).await {
            error!(reservation_id = %reservation.id(), "{}", e);
        }
        Ok(reservation)
    }

    pub async fn reschedule(
        &self,
        id: ReservationId,
        request: ReservationRequest,
    ) -> Result<Reservation, AdmissionError> {
        let request = ReservationRequest {
            exclude: Some(id),
            ..request
        };
        let reservation = self
            .with_retry(|| self.checker.check_and_reserve(request.clone()))
            .await?;
        if let Err(e) = self.notifier.reservation_rescheduled(&reservation).await {
            error!(reservation_id = %reservation.id(), "{}", e);
        }
        Ok(reservation)
    }

    pub async fn cancel(
        &self,
        vehicle_id: VehicleId,
        id: ReservationId,
    ) -> Result<Reservation, AdmissionError> {
        let reservation = self
            .with_retry(|| self.checker.cancel(vehicle_id, id))
            .await?;
        if let Err(e) = self.notifier.reservation_cancelled(&reservation).await {
            error!(reservation_id = %reservation.id(), "{}", e);
        }
        Ok(reservation)
    }

    pub async fn complete(
        &self,
        vehicle_id: VehicleId,
        id: ReservationId,
    ) -> Result<Reservation, AdmissionError> {
        self.with_retry(|| self.checker.complete(vehicle_id, id))
            .await
    }

    async fn with_retry<F, Fut, T>(&self, mut op: F) -> Result<T, AdmissionError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdmissionError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    warn!(attempt, "{}, retrying", e);
                    tokio::time::sleep(self.policy.backoff * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
