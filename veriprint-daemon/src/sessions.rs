//! Enroll/verify session orchestration.
//!
//! Each accepted request claims the single admission slot and spawns a
//! blocking worker for the sensor call; the dispatch side never blocks
//! on sensor I/O. Workers translate driver progress callbacks into
//! ordered signals and always end their session with exactly one
//! terminal signal. Hardware-class failures additionally trip the
//! fatal-shutdown channel: shared sensor state is not recoverable
//! without a fresh process, so the whole daemon stops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task;

use veriprint_core::finger::parse_designation;
use veriprint_core::{EnrollResult, VerifyResult};
use veriprint_sensor::{EnrollProgress, IdentifyProgress, SensorDriver};

use crate::error::ServiceError;
use crate::identity::IdentityResolver;
use crate::signals::SignalHub;

/// Releases the admission slot when the worker finishes.
struct SlotGuard(Arc<AtomicBool>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Orchestrates enroll and verify sessions against one sensor.
pub struct SessionManager {
    sensor: Arc<dyn SensorDriver>,
    resolver: Arc<IdentityResolver>,
    hub: SignalHub,
    active: Arc<AtomicBool>,
    fatal_tx: mpsc::UnboundedSender<String>,
}

impl SessionManager {
    pub fn new(
        sensor: Arc<dyn SensorDriver>,
        resolver: Arc<IdentityResolver>,
        hub: SignalHub,
        fatal_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            sensor,
            resolver,
            hub,
            active: Arc::new(AtomicBool::new(false)),
            fatal_tx,
        }
    }

    /// Claim the single session slot, or refuse with `Busy`.
    ///
    /// One enroll or verify at a time: a second start while a session
    /// is in flight is rejected rather than queued.
    fn claim_slot(&self) -> Result<SlotGuard, ServiceError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Ok(SlotGuard(self.active.clone()))
        } else {
            Err(ServiceError::Busy)
        }
    }

    /// Begin an asynchronous enrollment session.
    ///
    /// An unrecognized finger designation is reported as a single
    /// terminal `enroll-failed` signal, not a call error, and starts no
    /// session. An unknown user fails the call itself.
    pub fn start_enroll(&self, user_name: &str, designation: &str) -> Result<(), ServiceError> {
        let Some(position) = parse_designation(designation) else {
            tracing::warn!(user = user_name, designation, "unknown finger designation");
            self.hub.emit_enroll_failed();
            return Ok(());
        };

        // Enrollment may create a record, so only the identity is
        // resolved here, never the record.
        let sid = self.resolver.resolve(user_name)?;
        let slot = self.claim_slot()?;

        tracing::info!(user = user_name, finger = position.label(), "starting enrollment");

        let sensor = self.sensor.clone();
        let session = self.hub.enroll_session();
        let manager = self.handle();
        task::spawn_blocking(move || {
            let _slot = slot;
            let result = {
                let progress = &mut |p: EnrollProgress| match p {
                    EnrollProgress::StagePassed => session.progress(EnrollResult::StagePassed),
                    EnrollProgress::BadScan(reason) => {
                        tracing::debug!(reason = %reason, "scan rejected");
                        session.progress(EnrollResult::RetryScan);
                    }
                };
                sensor.enroll(&sid, position, progress)
            };

            match result {
                Ok(()) => {
                    tracing::info!(identity = %sid, "enrollment completed");
                    session.finish(EnrollResult::Completed);
                }
                Err(e) if e.is_fatal() => {
                    session.finish(EnrollResult::Failed);
                    manager.report_fatal("enroll", &e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "enrollment failed");
                    session.finish(EnrollResult::Failed);
                }
            }
        });
        Ok(())
    }

    /// Begin an asynchronous verification session.
    ///
    /// Fails synchronously with `NoEnrolledPrints` when the user has no
    /// record; in that case no signal of any kind is emitted.
    pub fn start_verify(&self, user_name: &str, finger_hint: &str) -> Result<(), ServiceError> {
        let (_, record) = self
            .resolver
            .resolve_record(user_name)?
            .ok_or_else(|| ServiceError::NoEnrolledPrints(user_name.to_string()))?;

        let slot = self.claim_slot()?;

        tracing::info!(user = user_name, hint = finger_hint, "starting verification");

        let session = self.hub.verify_session();
        // The sensor decides which enrolled finger matches.
        session.finger_selected("any");

        let sensor = self.sensor.clone();
        let manager = self.handle();
        task::spawn_blocking(move || {
            let _slot = slot;
            let result = {
                let progress = &mut |p: IdentifyProgress| match p {
                    IdentifyProgress::BadScan(reason) => {
                        tracing::debug!(reason = %reason, "scan rejected");
                        session.progress(VerifyResult::RetryScan);
                    }
                };
                sensor.identify(progress)
            };

            match result {
                Ok(outcome) if outcome.db_id == record.db_id => {
                    tracing::info!(
                        db_id = outcome.db_id,
                        finger = outcome.subtype.label(),
                        template = %hex_prefix(&outcome.template_hash),
                        "verification matched"
                    );
                    session.finish(VerifyResult::Match);
                }
                Ok(outcome) => {
                    tracing::info!(
                        matched_db_id = outcome.db_id,
                        expected_db_id = record.db_id,
                        "matched a different user"
                    );
                    session.finish(VerifyResult::NoMatch);
                }
                Err(e) if e.is_fatal() => {
                    session.finish(VerifyResult::NoMatch);
                    manager.report_fatal("verify", &e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "verification failed");
                    session.finish(VerifyResult::NoMatch);
                }
            }
        });
        Ok(())
    }

    /// Forward a cancellation request to the sensor.
    ///
    /// Unconditional and fire-and-forget; there is no session-id and no
    /// active-session check. The driver unblocks any in-flight call so
    /// its worker reaches a terminal signal; nothing is synthesized
    /// here.
    pub fn cancel(&self) {
        tracing::debug!("cancel requested");
        self.sensor.cancel();
    }

    /// Cheap clone for moving into workers.
    fn handle(&self) -> SessionHandle {
        SessionHandle { fatal_tx: self.fatal_tx.clone() }
    }
}

/// The slice of the manager a worker needs after spawn.
struct SessionHandle {
    fatal_tx: mpsc::UnboundedSender<String>,
}

impl SessionHandle {
    fn report_fatal(&self, context: &str, error: &veriprint_sensor::SensorError) {
        tracing::error!(error = %error, context, "hardware failure, stopping daemon");
        let _ = self.fatal_tx.send(format!("{context}: {error}"));
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    hex::encode(&bytes[..bytes.len().min(8)])
}
