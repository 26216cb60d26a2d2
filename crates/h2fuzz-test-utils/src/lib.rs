//! Test utilities and mock connections for h2fuzz development.
//!
//! [`MockConnector`] hands out [`MockConnection`]s that record every
//! connect and every write into a shared [`Journal`], and that fail on a
//! script of [`Fault`]s. [`FaultPlan`] builds reproducible random
//! scripts from a seed.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use h2fuzz_core::{
    Connection, ConnectionError, ConnectionParams, Connector, PingPayload, PushPromise, Setting,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

// ── Journal ────────────────────────────────────────────────────────

/// One connection write, with its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    RawFrame {
        frame_type: u8,
        flags: u8,
        stream_id: u32,
        payload: Vec<u8>,
    },
    Ping(PingPayload),
    Settings(Vec<Setting>),
    Data {
        stream_id: u32,
        end_stream: bool,
        data: Vec<u8>,
    },
    PushPromise(PushPromise),
    Continuation {
        stream_id: u32,
        end_stream: bool,
        data: Vec<u8>,
    },
    Priority {
        stream_id: u32,
        stream_dep: u32,
        weight: u8,
        exclusive: bool,
    },
    Reset {
        stream_id: u32,
        error_code: u32,
    },
    WindowUpdate {
        stream_id: u32,
        incr: u32,
    },
}

/// Something a mock connection or connector did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Connection `id` was constructed from `params`.
    Connected { id: usize, params: ConnectionParams },
    /// Connection `conn_id` was asked to write `call`.
    Write { conn_id: usize, call: Call },
}

/// Shared, ordered record of [`Event`]s. Clones append to the same list.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, event: Event) {
        self.lock().push(event);
    }

    /// Snapshot of every event so far.
    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    /// Every write attempt, with the connection it went to.
    pub fn writes(&self) -> Vec<(usize, Call)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                Event::Write { conn_id, call } => Some((*conn_id, call.clone())),
                Event::Connected { .. } => None,
            })
            .collect()
    }

    /// Every connection constructed, in order.
    pub fn connections(&self) -> Vec<(usize, ConnectionParams)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                Event::Connected { id, params } => Some((*id, params.clone())),
                Event::Write { .. } => None,
            })
            .collect()
    }
}

// ── Faults ─────────────────────────────────────────────────────────

/// Scripted misbehaviour for one connection. Write counts are 1-based
/// and include every write attempted on that connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// The write succeeds, then the connection reports a GOAWAY fault.
    AfterWrite(usize),
    /// The write returns a broken-pipe error.
    FailWrite(usize),
    /// The write succeeds after sleeping for `delay`.
    Stall { write: usize, delay: Duration },
}

// ── MockConnection ─────────────────────────────────────────────────

/// A [`Connection`] that journals writes and follows a fault script.
///
/// Writes after a fault is reported are journaled and then fail with
/// [`ConnectionError::Closed`].
#[derive(Debug)]
pub struct MockConnection {
    id: usize,
    params: ConnectionParams,
    journal: Journal,
    script: Vec<Fault>,
    writes: usize,
    fault: Option<ConnectionError>,
}

impl MockConnection {
    pub fn new(id: usize, params: ConnectionParams, journal: Journal, script: Vec<Fault>) -> Self {
        Self {
            id,
            params,
            journal,
            script,
            writes: 0,
            fault: None,
        }
    }

    /// Construction order of this connection (0 for the first).
    pub fn id(&self) -> usize {
        self.id
    }

    /// Writes attempted on this connection.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Mark the connection faulted, as a reader thread would on peer close.
    pub fn inject_fault(&mut self, fault: ConnectionError) {
        self.fault = Some(fault);
    }

    fn write(&mut self, call: Call) -> Result<(), ConnectionError> {
        self.journal.push(Event::Write {
            conn_id: self.id,
            call,
        });
        self.writes += 1;
        if self.fault.is_some() {
            return Err(ConnectionError::Closed);
        }
        let n = self.writes;
        for fault in &self.script {
            match fault {
                Fault::FailWrite(at) if *at == n => {
                    let err = io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure");
                    return Err(err.into());
                }
                Fault::Stall { write, delay } if *write == n => thread::sleep(*delay),
                Fault::AfterWrite(at) if *at == n => {
                    self.fault = Some(ConnectionError::GoAway {
                        error_code: 2,
                        last_stream_id: 0,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl Connection for MockConnection {
    fn params(&self) -> &ConnectionParams {
        &self.params
    }

    fn fault(&self) -> Option<&ConnectionError> {
        self.fault.as_ref()
    }

    fn write_raw_frame(
        &mut self,
        frame_type: u8,
        flags: u8,
        stream_id: u32,
        payload: &[u8],
    ) -> Result<(), ConnectionError> {
        self.write(Call::RawFrame {
            frame_type,
            flags,
            stream_id,
            payload: payload.to_vec(),
        })
    }

    fn send_ping(&mut self, data: PingPayload) -> Result<(), ConnectionError> {
        self.write(Call::Ping(data))
    }

    fn write_settings_frame(&mut self, settings: &[Setting]) -> Result<(), ConnectionError> {
        self.write(Call::Settings(settings.to_vec()))
    }

    fn write_data_frame(
        &mut self,
        stream_id: u32,
        end_stream: bool,
        data: &[u8],
    ) -> Result<(), ConnectionError> {
        self.write(Call::Data {
            stream_id,
            end_stream,
            data: data.to_vec(),
        })
    }

    fn write_push_promise_frame(&mut self, promise: &PushPromise) -> Result<(), ConnectionError> {
        self.write(Call::PushPromise(promise.clone()))
    }

    fn write_continuation_frame(
        &mut self,
        stream_id: u32,
        end_stream: bool,
        data: &[u8],
    ) -> Result<(), ConnectionError> {
        self.write(Call::Continuation {
            stream_id,
            end_stream,
            data: data.to_vec(),
        })
    }

    fn write_priority_frame(
        &mut self,
        stream_id: u32,
        stream_dep: u32,
        weight: u8,
        exclusive: bool,
    ) -> Result<(), ConnectionError> {
        self.write(Call::Priority {
            stream_id,
            stream_dep,
            weight,
            exclusive,
        })
    }

    fn write_reset_frame(
        &mut self,
        stream_id: u32,
        error_code: u32,
    ) -> Result<(), ConnectionError> {
        self.write(Call::Reset {
            stream_id,
            error_code,
        })
    }

    fn write_window_update_frame(
        &mut self,
        stream_id: u32,
        incr: u32,
    ) -> Result<(), ConnectionError> {
        self.write(Call::WindowUpdate { stream_id, incr })
    }
}

// ── MockConnector ──────────────────────────────────────────────────

/// A [`Connector`] producing [`MockConnection`]s.
///
/// Connect attempts are numbered from 0 across the connector's lifetime;
/// connections that succeed are numbered separately, also from 0.
#[derive(Debug)]
pub struct MockConnector {
    journal: Journal,
    scripts: BTreeMap<usize, Vec<Fault>>,
    failing_attempts: BTreeSet<usize>,
    attempts: usize,
    connections: usize,
}

impl MockConnector {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            scripts: BTreeMap::new(),
            failing_attempts: BTreeSet::new(),
            attempts: 0,
            connections: 0,
        }
    }

    /// Give connection `id` the fault script `faults`.
    pub fn with_faults(mut self, id: usize, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.scripts.entry(id).or_default().extend(faults);
        self
    }

    /// Apply every entry of `plan`.
    pub fn with_plan(mut self, plan: &FaultPlan) -> Self {
        for (id, fault) in &plan.faults {
            self.scripts.entry(*id).or_default().push(fault.clone());
        }
        self
    }

    /// Make the given connect attempts fail with a handshake error.
    pub fn fail_attempts(mut self, attempts: impl IntoIterator<Item = usize>) -> Self {
        self.failing_attempts.extend(attempts);
        self
    }

    /// Connect attempts made so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Connections successfully constructed so far.
    pub fn connections(&self) -> usize {
        self.connections
    }
}

impl Connector for MockConnector {
    type Conn = MockConnection;

    fn connect(&mut self, params: &ConnectionParams) -> Result<MockConnection, ConnectionError> {
        let attempt = self.attempts;
        self.attempts += 1;
        if self.failing_attempts.contains(&attempt) {
            return Err(ConnectionError::Handshake {
                reason: format!("mock connect attempt {attempt} refused"),
            });
        }

        let id = self.connections;
        self.connections += 1;
        self.journal.push(Event::Connected {
            id,
            params: params.clone(),
        });
        let script = self.scripts.get(&id).cloned().unwrap_or_default();
        Ok(MockConnection::new(id, params.clone(), self.journal.clone(), script))
    }
}

// ── FaultPlan ──────────────────────────────────────────────────────

/// A reproducible set of connection faults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// `(connection id, fault)` pairs.
    pub faults: Vec<(usize, Fault)>,
}

impl FaultPlan {
    /// For each of `connections` connections, with probability
    /// `fault_rate`, fault on a write in `1..=max_write`. Same seed, same
    /// plan.
    pub fn random(seed: u64, connections: usize, max_write: usize, fault_rate: f64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut faults = Vec::new();
        for id in 0..connections {
            if !rng.random_bool(fault_rate) {
                continue;
            }
            let at = rng.random_range(1..=max_write.max(1));
            let fault = if rng.random_bool(0.5) {
                Fault::AfterWrite(at)
            } else {
                Fault::FailWrite(at)
            };
            faults.push((id, fault));
        }
        Self { faults }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConnectionParams {
        ConnectionParams::new("localhost:8443")
    }

    #[test]
    fn journal_orders_connects_and_writes() {
        let journal = Journal::new();
        let mut connector = MockConnector::new(journal.clone());
        let mut a = connector.connect(&params()).unwrap();
        a.send_ping([1; 8]).unwrap();
        let mut b = connector.connect(&params()).unwrap();
        b.write_reset_frame(1, 8).unwrap();

        assert_eq!(
            journal.events(),
            vec![
                Event::Connected { id: 0, params: params() },
                Event::Write { conn_id: 0, call: Call::Ping([1; 8]) },
                Event::Connected { id: 1, params: params() },
                Event::Write {
                    conn_id: 1,
                    call: Call::Reset { stream_id: 1, error_code: 8 },
                },
            ]
        );
        assert_eq!(connector.connections(), 2);
    }

    #[test]
    fn scripted_faults_fire_on_their_write() {
        let journal = Journal::new();
        let mut connector = MockConnector::new(journal.clone())
            .with_faults(0, [Fault::AfterWrite(2)])
            .with_faults(1, [Fault::FailWrite(1)]);

        let mut a = connector.connect(&params()).unwrap();
        a.write_window_update_frame(0, 1).unwrap();
        assert!(a.fault().is_none());
        a.write_window_update_frame(0, 2).unwrap();
        assert!(matches!(a.fault(), Some(ConnectionError::GoAway { .. })));
        assert!(matches!(a.write_window_update_frame(0, 3), Err(ConnectionError::Closed)));

        let mut b = connector.connect(&params()).unwrap();
        assert!(matches!(b.send_ping([0; 8]), Err(ConnectionError::Io(_))));
        assert!(b.fault().is_none());
        assert_eq!(journal.writes().len(), 4);
    }

    #[test]
    fn failing_attempts_do_not_consume_connection_ids() {
        let journal = Journal::new();
        let mut connector = MockConnector::new(journal.clone()).fail_attempts([1, 2]);
        assert_eq!(connector.connect(&params()).unwrap().id(), 0);
        assert!(connector.connect(&params()).is_err());
        assert!(connector.connect(&params()).is_err());
        assert_eq!(connector.connect(&params()).unwrap().id(), 1);
        assert_eq!(connector.attempts(), 4);
        assert_eq!(journal.connections().len(), 2);
    }

    #[test]
    fn fault_plan_is_reproducible() {
        let a = FaultPlan::random(42, 16, 5, 0.5);
        let b = FaultPlan::random(42, 16, 5, 0.5);
        assert_eq!(a, b);
        assert!(a.faults.iter().all(|(id, _)| *id < 16));
        assert!(FaultPlan::random(7, 16, 5, 0.0).faults.is_empty());
        assert_eq!(FaultPlan::random(7, 16, 5, 1.0).faults.len(), 16);
    }
}
