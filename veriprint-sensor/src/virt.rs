//! Virtual sensor backend.
//!
//! An in-memory device driven by scripted outcomes. With no script
//! queued, `enroll` and `identify` block like a real sensor waiting for
//! a finger, until `cancel()` unblocks them. Enrolled users live in a
//! plain map so the same object also serves as the [`UserStore`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};

use veriprint_core::{EnrolledFinger, FingerPosition, Sid, UserRecord};

use crate::driver::{
    EnrollProgress, IdentifyOutcome, IdentifyProgress, SensorDriver, UserStore,
};
use crate::error::SensorError;

/// Scripted outcome for one enrollment call.
pub struct EnrollScript {
    /// Intermediate progress reported before the outcome.
    pub steps: Vec<EnrollProgress>,
    /// Final result. `Ok` stores the template.
    pub outcome: Result<(), SensorError>,
}

impl EnrollScript {
    /// A session that passes `stages` scans and completes.
    pub fn completing(stages: usize) -> Self {
        Self {
            steps: vec![EnrollProgress::StagePassed; stages],
            outcome: Ok(()),
        }
    }

    pub fn failing(error: SensorError) -> Self {
        Self { steps: Vec::new(), outcome: Err(error) }
    }
}

/// Scripted outcome for one identify call.
pub struct IdentifyScript {
    /// Number of rejected scans reported before the outcome.
    pub retries: usize,
    pub outcome: Result<IdentifyOutcome, SensorError>,
}

struct State {
    enroll_scripts: VecDeque<EnrollScript>,
    identify_scripts: VecDeque<IdentifyScript>,
    users: HashMap<Sid, UserRecord>,
    next_db_id: u32,
    in_flight: bool,
    cancel_requested: bool,
}

/// In-memory scriptable sensor. See the module docs.
pub struct VirtualSensor {
    state: Mutex<State>,
    unblocked: Condvar,
}

impl VirtualSensor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                enroll_scripts: VecDeque::new(),
                identify_scripts: VecDeque::new(),
                users: HashMap::new(),
                next_db_id: 1,
                in_flight: false,
                cancel_requested: false,
            }),
            unblocked: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("virtual sensor state poisoned")
    }

    /// Queue the outcome for the next `enroll` call.
    pub fn push_enroll(&self, script: EnrollScript) {
        self.lock().enroll_scripts.push_back(script);
    }

    /// Queue the outcome for the next `identify` call.
    pub fn push_identify(&self, script: IdentifyScript) {
        self.lock().identify_scripts.push_back(script);
    }

    /// True while an unscripted call is blocked waiting for a finger.
    /// Lets tests order `cancel()` after the call has actually parked.
    pub fn is_blocked(&self) -> bool {
        self.lock().in_flight
    }

    /// Pre-populate an enrolled user; returns the record's `db_id`.
    pub fn seed_user(&self, sid: Sid, fingers: &[FingerPosition]) -> u32 {
        let mut st = self.lock();
        let db_id = st.next_db_id;
        st.next_db_id += 1;
        st.users.insert(
            sid,
            UserRecord {
                db_id,
                fingers: fingers.iter().map(|&subtype| EnrolledFinger { subtype }).collect(),
            },
        );
        db_id
    }

    /// Block until `cancel()` is called, then report cancellation.
    fn wait_for_cancel(&self, mut st: MutexGuard<'_, State>) -> SensorError {
        st.in_flight = true;
        while !st.cancel_requested {
            st = self
                .unblocked
                .wait(st)
                .expect("virtual sensor state poisoned");
        }
        st.in_flight = false;
        st.cancel_requested = false;
        SensorError::Canceled
    }

    fn store_template(&self, identity: &Sid, position: FingerPosition) {
        let mut st = self.lock();
        let db_id = match st.users.get(identity) {
            Some(rec) => rec.db_id,
            None => {
                let id = st.next_db_id;
                st.next_db_id += 1;
                id
            }
        };
        st.users
            .entry(identity.clone())
            .or_insert_with(|| UserRecord { db_id, fingers: Vec::new() })
            .fingers
            .push(EnrolledFinger { subtype: position });
    }
}

impl Default for VirtualSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorDriver for VirtualSensor {
    fn enroll(
        &self,
        identity: &Sid,
        position: FingerPosition,
        progress: &mut dyn FnMut(EnrollProgress),
    ) -> Result<(), SensorError> {
        let script = {
            let mut st = self.lock();
            match st.enroll_scripts.pop_front() {
                Some(script) => script,
                None => return Err(self.wait_for_cancel(st)),
            }
        };

        for step in script.steps {
            progress(step);
        }
        script.outcome?;
        self.store_template(identity, position);
        tracing::debug!(identity = %identity, position = position.code(), "virtual enroll stored");
        Ok(())
    }

    fn identify(
        &self,
        progress: &mut dyn FnMut(IdentifyProgress),
    ) -> Result<IdentifyOutcome, SensorError> {
        let script = {
            let mut st = self.lock();
            match st.identify_scripts.pop_front() {
                Some(script) => script,
                None => return Err(self.wait_for_cancel(st)),
            }
        };

        for _ in 0..script.retries {
            progress(IdentifyProgress::BadScan("bad scan".to_string()));
        }
        script.outcome
    }

    fn cancel(&self) {
        let mut st = self.lock();
        // No-op unless a call is actually blocked.
        if st.in_flight {
            st.cancel_requested = true;
            self.unblocked.notify_all();
        }
    }

    fn reset_secure_channel(&self) -> Result<(), SensorError> {
        tracing::debug!("virtual secure channel reset");
        Ok(())
    }

    fn raw_command(&self, request: &[u8]) -> Result<Vec<u8>, SensorError> {
        // Loopback: echo the request with a success trailer.
        let mut response = request.to_vec();
        response.extend_from_slice(&[0x90, 0x00]);
        Ok(response)
    }
}

impl UserStore for VirtualSensor {
    fn lookup_user(&self, sid: &Sid) -> Option<UserRecord> {
        self.lock().users.get(sid).cloned()
    }

    fn delete_record(&self, db_id: u32) -> Result<(), SensorError> {
        let mut st = self.lock();
        st.users.retain(|_, rec| rec.db_id != db_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn sid(uid: u32) -> Sid {
        Sid::from_uid(uid)
    }

    #[test]
    fn scripted_enroll_reports_steps_then_stores() {
        let sensor = VirtualSensor::new();
        sensor.push_enroll(EnrollScript {
            steps: vec![
                EnrollProgress::BadScan("smudge".into()),
                EnrollProgress::StagePassed,
            ],
            outcome: Ok(()),
        });

        let mut seen = Vec::new();
        sensor
            .enroll(&sid(1000), FingerPosition::LeftRing, &mut |p| seen.push(p))
            .unwrap();

        assert_eq!(
            seen,
            vec![EnrollProgress::BadScan("smudge".into()), EnrollProgress::StagePassed]
        );
        let rec = sensor.lookup_user(&sid(1000)).unwrap();
        assert_eq!(rec.fingers, vec![EnrolledFinger { subtype: FingerPosition::LeftRing }]);
    }

    #[test]
    fn failed_enroll_stores_nothing() {
        let sensor = VirtualSensor::new();
        sensor.push_enroll(EnrollScript::failing(SensorError::Protocol("nak".into())));
        let err = sensor
            .enroll(&sid(1000), FingerPosition::RightIndex, &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, SensorError::Protocol(_)));
        assert!(sensor.lookup_user(&sid(1000)).is_none());
    }

    #[test]
    fn cancel_unblocks_waiting_identify() {
        let sensor = Arc::new(VirtualSensor::new());
        let worker = {
            let sensor = sensor.clone();
            std::thread::spawn(move || sensor.identify(&mut |_| {}))
        };
        // Wait for the worker to reach the blocking wait.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !sensor.is_blocked() {
            assert!(std::time::Instant::now() < deadline, "identify never parked");
            std::thread::sleep(Duration::from_millis(5));
        }
        sensor.cancel();
        let err = worker.join().unwrap().unwrap_err();
        assert!(matches!(err, SensorError::Canceled));
    }

    #[test]
    fn cancel_with_nothing_in_flight_is_a_no_op() {
        let sensor = VirtualSensor::new();
        sensor.cancel();
        // A later scripted call must not observe a stale cancel flag.
        sensor.push_identify(IdentifyScript {
            retries: 0,
            outcome: Ok(IdentifyOutcome {
                db_id: 3,
                subtype: FingerPosition::RightThumb,
                template_hash: vec![0xab],
            }),
        });
        assert_eq!(sensor.identify(&mut |_| {}).unwrap().db_id, 3);
    }

    #[test]
    fn delete_record_is_silent_for_unknown_id() {
        let sensor = VirtualSensor::new();
        let db_id = sensor.seed_user(sid(1), &[FingerPosition::LeftThumb]);
        sensor.delete_record(999).unwrap();
        assert!(sensor.lookup_user(&sid(1)).is_some());
        sensor.delete_record(db_id).unwrap();
        assert!(sensor.lookup_user(&sid(1)).is_none());
    }

    #[test]
    fn raw_command_echoes_with_trailer() {
        let sensor = VirtualSensor::new();
        assert_eq!(sensor.raw_command(&[0x01, 0x02]).unwrap(), vec![0x01, 0x02, 0x90, 0x00]);
    }
}
