// Logging tests.
//
// The crate emits `tracing` events and never installs a subscriber. These
// tests install a scoped subscriber that writes into a buffer and check
// which events come through at which level.
use relbuckets::{Behavior, Relation};
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Capture {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

fn capture(directive: &str) -> (Capture, tracing::dispatcher::DefaultGuard) {
    let cap = Capture::default();
    let writer = cap.clone();
    let layer = fmt::layer()
        .with_writer(move || writer.clone())
        .with_ansi(false);
    let guard = tracing_subscriber::registry()
        .with(EnvFilter::new(directive))
        .with(layer)
        .set_default();
    (cap, guard)
}

fn workload() {
    let mut g = Relation::<u32>::graph().unwrap();
    for k in 0..200u32 {
        g.insert(k, k + 1).unwrap();
    }
    let small = Relation::<u32>::from_pairs(Behavior::Graph, [(1, 2), (2, 3)]).unwrap();
    small.transitive_closure().unwrap();
    small.reachable(&1).unwrap();
}

// Test: debug and trace events.
// Verifies: growth logs a resize at debug; closure and reachability log
// their rounds at trace.
#[test]
fn events_reach_an_installed_subscriber() {
    let (cap, _guard) = capture("relbuckets=trace");
    workload();
    let text = cap.text();
    assert!(text.contains("table resized"), "{text}");
    assert!(text.contains("transitive closure round"), "{text}");
    assert!(text.contains("reachability round"), "{text}");
}

// Test: level filtering.
// Verifies: nothing is logged at info or above during normal operation.
#[test]
fn quiet_at_info() {
    let (cap, _guard) = capture("relbuckets=info");
    workload();
    assert_eq!(cap.text(), "");
}
