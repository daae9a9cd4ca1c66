use statig::prelude::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CyclePhase {
    Probing,
    Reporting,
    LinkCheck,
    Sleeping,
    /// Link recovery gave up; only a device reset leaves this phase.
    Halted,
}

impl CyclePhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Probing => "probing",
            Self::Reporting => "reporting",
            Self::LinkCheck => "link_check",
            Self::Sleeping => "sleeping",
            Self::Halted => "halted",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleEvent {
    ProbeFinished { measured: bool },
    ReportFinished { accepted: bool, sleep_ms: u32 },
    LinkHealthy,
    LinkExhausted,
    SleepElapsed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleApplyStatus {
    Applied,
    InvalidTransition,
}

#[derive(Clone, Copy, Debug)]
pub(super) struct DispatchContext {
    pub(super) status: CycleApplyStatus,
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self {
            status: CycleApplyStatus::InvalidTransition,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(super) struct CycleMachine {
    pub(super) phase: CyclePhase,
    pub(super) measured: bool,
    pub(super) sleep_ms: u32,
}

impl CycleMachine {
    pub(super) fn new(interval_ms: u32) -> Self {
        Self {
            phase: CyclePhase::Probing,
            measured: false,
            sleep_ms: interval_ms,
        }
    }

    fn enter(&mut self, context: &mut DispatchContext, phase: CyclePhase) {
        self.phase = phase;
        context.status = CycleApplyStatus::Applied;
    }
}

#[state_machine(initial = "State::probing()")]
impl CycleMachine {
    #[state]
    fn probing(&mut self, context: &mut DispatchContext, event: &CycleEvent) -> Outcome<State> {
        match event {
            CycleEvent::ProbeFinished { measured } => {
                self.measured = *measured;
                self.enter(context, CyclePhase::Reporting);
                Transition(State::reporting())
            }
            _ => Handled,
        }
    }

    #[state]
    fn reporting(&mut self, context: &mut DispatchContext, event: &CycleEvent) -> Outcome<State> {
        match event {
            CycleEvent::ReportFinished { sleep_ms, .. } => {
                self.sleep_ms = *sleep_ms;
                self.enter(context, CyclePhase::LinkCheck);
                Transition(State::link_check())
            }
            _ => Handled,
        }
    }

    #[state]
    fn link_check(&mut self, context: &mut DispatchContext, event: &CycleEvent) -> Outcome<State> {
        match event {
            CycleEvent::LinkHealthy => {
                self.enter(context, CyclePhase::Sleeping);
                Transition(State::sleeping())
            }
            CycleEvent::LinkExhausted => {
                self.enter(context, CyclePhase::Halted);
                Transition(State::halted())
            }
            _ => Handled,
        }
    }

    #[state]
    fn sleeping(&mut self, context: &mut DispatchContext, event: &CycleEvent) -> Outcome<State> {
        match event {
            CycleEvent::SleepElapsed => {
                self.measured = false;
                self.enter(context, CyclePhase::Probing);
                Transition(State::probing())
            }
            _ => Handled,
        }
    }

    #[state]
    fn halted(&mut self, event: &CycleEvent) -> Outcome<State> {
        log::warn!("cycle: {:?} ignored while halted", event);
        Handled
    }
}
