use crate::config::HonestyMode;
use log::info;
use std::sync::Mutex;
use std::time::Duration;

/// How many validators attested each transaction predicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredicateTallies {
    pub authenticated: usize,
    pub sound: usize,
    pub correct: usize,
    pub balance: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `mode` is the honesty mode of the node that ran the validation
    TransactionValidation {
        mode: HonestyMode,
        validated: bool,
        tallies: PredicateTallies,
        latency: Duration,
    },
    BlockValidation {
        mode: HonestyMode,
        validated: bool,
        latency: Duration,
    },
    ViewUpdate {
        extended: bool,
        latency: Duration,
    },
}

/// Sink for per-operation outcomes and latencies.
pub trait Telemetry: Send + Sync {
    fn record(&self, event: Event);
}

/// Writes every event to the log.
#[derive(Debug, Default)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn record(&self, event: Event) {
        match event {
            Event::TransactionValidation {
                mode,
                validated,
                tallies,
                latency,
            } => info!(
                "(telemetry) {} transaction validated={} auth={} sound={} correct={} balance={} in {:?}",
                mode,
                validated,
                tallies.authenticated,
                tallies.sound,
                tallies.correct,
                tallies.balance,
                latency
            ),
            Event::BlockValidation {
                mode,
                validated,
                latency,
            } => info!(
                "(telemetry) {} block validated={} in {:?}",
                mode, validated, latency
            ),
            Event::ViewUpdate { extended, latency } => {
                info!("(telemetry) view update extended={} in {:?}", extended, latency)
            }
        }
    }
}

/// Keeps events in memory for later inspection.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    events: Mutex<Vec<Event>>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// (attempts, successes) over the transaction and block validations
    /// run by nodes in `mode`.
    pub fn validation_counts(&self, mode: HonestyMode) -> (usize, usize) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter_map(|event| match event {
                Event::TransactionValidation {
                    mode: m, validated, ..
                }
                | Event::BlockValidation {
                    mode: m, validated, ..
                } if *m == mode => Some(*validated),
                _ => None,
            })
            .fold((0, 0), |(attempts, successes), validated| {
                (attempts + 1, successes + usize::from(validated))
            })
    }
}

impl Telemetry for MemoryTelemetry {
    fn record(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_keeps_order() {
        let telemetry = MemoryTelemetry::new();
        telemetry.record(Event::BlockValidation {
            mode: HonestyMode::Honest,
            validated: true,
            latency: Duration::from_millis(3),
        });
        telemetry.record(Event::ViewUpdate {
            extended: false,
            latency: Duration::from_millis(1),
        });
        let events = telemetry.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Event::BlockValidation { validated: true, .. }));
    }
    #[test]
    fn validations_are_counted_per_mode() {
        let telemetry = MemoryTelemetry::new();
        let latency = Duration::from_millis(2);
        for validated in [true, false, false] {
            telemetry.record(Event::TransactionValidation {
                mode: HonestyMode::Malicious,
                validated,
                tallies: PredicateTallies::default(),
                latency,
            });
        }
        telemetry.record(Event::BlockValidation {
            mode: HonestyMode::Honest,
            validated: true,
            latency,
        });
        telemetry.record(Event::ViewUpdate {
            extended: true,
            latency,
        });
        assert_eq!(telemetry.validation_counts(HonestyMode::Malicious), (3, 1));
        assert_eq!(telemetry.validation_counts(HonestyMode::Honest), (1, 1));
    }
}
