use hxdbg_core::clock::ManualClock;
use hxdbg_core::config::RelayConfig;
use hxdbg_core::types::{Ack, ChannelId, EventRecord, PanelMessage, SourceId};
use hxdbg_relay::{Coordinator, MemoryChannel, ReplyHandle};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug, Deserialize)]
struct Scenario {
    name: String,
    #[allow(dead_code)]
    description: String,
    steps: Vec<Step>,
    expect: Expect,
}

#[derive(Debug, Deserialize)]
struct Step {
    at_ms: u64,
    action: Action,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Action {
    Subscribe {
        tab: u32,
        channel: u64,
    },
    /// Transport reports the channel closed.
    Unsubscribe {
        channel: u64,
    },
    /// Channel goes away silently; posts start failing.
    Close {
        channel: u64,
    },
    Submit {
        #[serde(default)]
        tab: Option<u32>,
        kind: String,
        #[serde(default)]
        data: serde_json::Value,
        #[serde(default = "one")]
        repeat: usize,
    },
    Tick,
    Liveness,
}

fn one() -> usize {
    1
}

#[derive(Debug, Deserialize)]
struct Expect {
    channels: BTreeMap<u64, ChannelExpect>,
    subscriptions: Vec<u32>,
    acks: AckExpect,
    queue_len: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChannelExpect {
    events: Option<usize>,
    heartbeats: Option<usize>,
    errors: Option<usize>,
    tests: Option<usize>,
}

#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct AckExpect {
    processed: usize,
    alive: usize,
    dropped: usize,
}

fn scenarios_dir() -> PathBuf {
    let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest.join("../../fixtures/scenarios")
}

fn load_scenarios() -> Vec<Scenario> {
    let dir = scenarios_dir();
    let mut scenarios = Vec::new();
    if !dir.exists() {
        return scenarios;
    }
    let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
        .expect("read scenarios dir")
        .map(|entry| entry.expect("dir entry").path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();
    for path in paths {
        let content = fs::read_to_string(&path).unwrap_or_else(|e| {
            panic!("failed to read scenario {:?}: {}", path, e);
        });
        let scenario: Scenario = serde_json::from_str(&content).unwrap_or_else(|e| {
            panic!("failed to parse scenario {:?}: {}", path, e);
        });
        scenarios.push(scenario);
    }
    scenarios
}

fn count(messages: &[PanelMessage], pred: impl Fn(&PanelMessage) -> bool) -> usize {
    messages.iter().filter(|&m| pred(m)).count()
}

fn run(scenario: &Scenario) {
    let clock = ManualClock::new(0);
    let mut relay: Coordinator<MemoryChannel, ManualClock> =
        Coordinator::new(RelayConfig::default(), clock.clone());
    let mut channels: BTreeMap<u64, MemoryChannel> = BTreeMap::new();
    let acks: Arc<Mutex<Vec<Ack>>> = Arc::new(Mutex::new(Vec::new()));

    for (i, step) in scenario.steps.iter().enumerate() {
        clock.set(step.at_ms);
        match &step.action {
            Action::Subscribe { tab, channel } => {
                let chan = channels
                    .entry(*channel)
                    .or_insert_with(|| MemoryChannel::new(*channel))
                    .clone();
                relay.subscribe(SourceId(*tab), chan);
            }
            Action::Unsubscribe { channel } => {
                relay.unsubscribe(ChannelId(*channel));
            }
            Action::Close { channel } => {
                channels
                    .get(channel)
                    .unwrap_or_else(|| panic!("{}: step {i} closes unknown channel", scenario.name))
                    .close();
            }
            Action::Submit {
                tab,
                kind,
                data,
                repeat,
            } => {
                for _ in 0..*repeat {
                    let record = EventRecord {
                        kind: kind.clone(),
                        timestamp: String::new(),
                        source_tag: "scenario".to_owned(),
                        payload: data.clone(),
                    };
                    let sink = Arc::clone(&acks);
                    relay.submit(
                        record,
                        tab.map(SourceId),
                        ReplyHandle::new(move |ack| sink.lock().expect("lock").push(ack)),
                    );
                }
            }
            Action::Tick => {
                relay.run_tick();
            }
            Action::Liveness => {
                relay.fire_liveness();
            }
        }
    }

    for (id, want) in &scenario.expect.channels {
        let messages = channels
            .get(id)
            .unwrap_or_else(|| panic!("{}: unknown channel {id}", scenario.name))
            .messages();
        let checks = [
            (
                "events",
                want.events,
                count(&messages, |m| matches!(m, PanelMessage::HtmxEvent { .. })),
            ),
            (
                "heartbeats",
                want.heartbeats,
                count(&messages, |m| matches!(m, PanelMessage::Heartbeat)),
            ),
            (
                "errors",
                want.errors,
                count(&messages, |m| matches!(m, PanelMessage::Error { .. })),
            ),
            (
                "tests",
                want.tests,
                count(&messages, |m| matches!(m, PanelMessage::Test { .. })),
            ),
        ];
        for (label, want, got) in checks {
            if let Some(want) = want {
                assert_eq!(got, want, "{}: channel {id} {label}", scenario.name);
            }
        }
    }

    let subscribed: Vec<u32> = relay
        .subscriptions()
        .source_ids()
        .into_iter()
        .map(|id| id.0)
        .collect();
    assert_eq!(
        subscribed, scenario.expect.subscriptions,
        "{}: subscriptions",
        scenario.name
    );

    let recorded = acks.lock().expect("lock").clone();
    let tally = AckExpect {
        processed: recorded.iter().filter(|a| **a == Ack::PROCESSED).count(),
        alive: recorded.iter().filter(|a| **a == Ack::ALIVE).count(),
        dropped: recorded.iter().filter(|a| **a == Ack::DROPPED).count(),
    };
    assert_eq!(tally, scenario.expect.acks, "{}: acks", scenario.name);
    assert_eq!(
        relay.queue().len(),
        scenario.expect.queue_len,
        "{}: queue length",
        scenario.name
    );
}

#[test]
fn test_all_scenarios() {
    let scenarios = load_scenarios();
    assert!(
        !scenarios.is_empty(),
        "no scenarios found in {:?}",
        scenarios_dir()
    );
    for scenario in &scenarios {
        run(scenario);
    }
    println!("replayed {} relay scenarios", scenarios.len());
}
