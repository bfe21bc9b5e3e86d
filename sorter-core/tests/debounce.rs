use core::time::Duration;

use sorter_core::config::DEFAULT_DEBOUNCE_WINDOW;
use sorter_core::debounce::{ButtonId, DebounceGate, DebounceHardware, DebounceState, EdgeVerdict};
use sorter_core::events::{Event, EventChannel};

/// Edge sources and one-shot timers driven by a simulated millisecond clock.
#[derive(Default)]
struct PanelClock {
    now_ms: u64,
    edge_enabled: [bool; 2],
    latched: [bool; 2],
    deadline_ms: [Option<u64>; 2],
}

impl PanelClock {
    fn new() -> Self {
        Self {
            edge_enabled: [true; 2],
            ..Self::default()
        }
    }

    /// Raw edge from the switch. Masked edges only latch their flag.
    fn edge(&mut self, gate: &DebounceGate, events: &EventChannel, button: ButtonId) -> Option<EdgeVerdict> {
        let index = button.as_index();
        if self.edge_enabled[index] {
            Some(gate.on_raw_edge(button, self, events))
        } else {
            self.latched[index] = true;
            None
        }
    }

    /// Advances time, firing expired window timers.
    fn advance(&mut self, gate: &DebounceGate, ms: u64) {
        self.now_ms += ms;
        for button in ButtonId::ALL {
            if let Some(deadline) = self.deadline_ms[button.as_index()]
                && deadline <= self.now_ms
            {
                gate.on_window_expiry(button, self);
            }
        }
    }
}

impl DebounceHardware for PanelClock {
    fn set_edge_enabled(&mut self, button: ButtonId, enabled: bool) {
        self.edge_enabled[button.as_index()] = enabled;
    }

    fn clear_latched_edge(&mut self, button: ButtonId) {
        self.latched[button.as_index()] = false;
    }

    fn arm_window(&mut self, button: ButtonId, window: Duration) {
        let window_ms = u64::try_from(window.as_millis()).unwrap();
        self.deadline_ms[button.as_index()] = Some(self.now_ms + window_ms);
    }

    fn disarm_window(&mut self, button: ButtonId) {
        self.deadline_ms[button.as_index()] = None;
    }
}

fn drain(events: &EventChannel) -> Vec<Event> {
    std::iter::from_fn(|| events.take_next()).collect()
}

#[test]
fn bounce_burst_yields_one_press() {
    let gate = DebounceGate::new(DEFAULT_DEBOUNCE_WINDOW);
    let events = EventChannel::new();
    let mut panel = PanelClock::new();

    assert_eq!(
        panel.edge(&gate, &events, ButtonId::Btn1),
        Some(EdgeVerdict::Accepted)
    );
    for _ in 0..10 {
        panel.advance(&gate, 5);
        assert_eq!(panel.edge(&gate, &events, ButtonId::Btn1), None);
    }

    assert_eq!(drain(&events), vec![Event::Btn1]);
    assert!(panel.latched[0]);
}

#[test]
fn edge_after_window_expiry_is_a_second_press() {
    let gate = DebounceGate::new(DEFAULT_DEBOUNCE_WINDOW);
    let events = EventChannel::new();
    let mut panel = PanelClock::new();

    panel.edge(&gate, &events, ButtonId::Btn2);
    panel.advance(&gate, 100);
    panel.edge(&gate, &events, ButtonId::Btn2);
    assert_eq!(drain(&events), vec![Event::Btn2]);

    panel.advance(&gate, 400);
    assert_eq!(gate.state(ButtonId::Btn2), DebounceState::Idle);
    assert!(!panel.latched[1]);
    assert!(panel.edge_enabled[1]);

    assert_eq!(
        panel.edge(&gate, &events, ButtonId::Btn2),
        Some(EdgeVerdict::Accepted)
    );
    assert_eq!(drain(&events), vec![Event::Btn2]);
}

#[test]
fn window_lasts_the_full_configured_duration() {
    let gate = DebounceGate::new(DEFAULT_DEBOUNCE_WINDOW);
    let events = EventChannel::new();
    let mut panel = PanelClock::new();

    panel.edge(&gate, &events, ButtonId::Btn1);
    panel.advance(&gate, 499);
    assert_eq!(gate.state(ButtonId::Btn1), DebounceState::Suppressing);
    panel.advance(&gate, 1);
    assert_eq!(gate.state(ButtonId::Btn1), DebounceState::Idle);
}

#[test]
fn buttons_debounce_independently() {
    let gate = DebounceGate::new(DEFAULT_DEBOUNCE_WINDOW);
    let events = EventChannel::new();
    let mut panel = PanelClock::new();

    panel.edge(&gate, &events, ButtonId::Btn1);
    panel.advance(&gate, 10);
    assert_eq!(
        panel.edge(&gate, &events, ButtonId::Btn2),
        Some(EdgeVerdict::Accepted)
    );
    assert_eq!(drain(&events), vec![Event::Btn2, Event::Btn1]);

    panel.advance(&gate, 490);
    assert_eq!(gate.state(ButtonId::Btn1), DebounceState::Idle);
    assert_eq!(gate.state(ButtonId::Btn2), DebounceState::Suppressing);
}

#[test]
fn edge_racing_the_mask_is_discarded() {
    let gate = DebounceGate::new(Duration::from_millis(50));
    let events = EventChannel::new();
    let mut panel = PanelClock::new();

    gate.on_raw_edge(ButtonId::Btn1, &mut panel, &events);
    // Edge raced in before the source was masked.
    assert_eq!(
        gate.on_raw_edge(ButtonId::Btn1, &mut panel, &events),
        EdgeVerdict::Suppressed
    );
    assert_eq!(drain(&events), vec![Event::Btn1]);
    assert_eq!(gate.window(), Duration::from_millis(50));
}
