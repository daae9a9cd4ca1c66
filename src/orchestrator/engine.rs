use statig::blocking::IntoStateMachineExt as _;

use super::machine::{CycleApplyStatus, CycleEvent, CycleMachine, CyclePhase, DispatchContext};

#[derive(Clone, Copy, Debug)]
pub struct CycleApplyResult {
    pub before: CyclePhase,
    pub after: CyclePhase,
    pub status: CycleApplyStatus,
}

impl CycleApplyResult {
    pub fn applied(self) -> bool {
        matches!(self.status, CycleApplyStatus::Applied)
    }
}

/// Tracks where the measurement loop is within one cycle and which sleep
/// the cycle settled on.
pub struct CycleEngine {
    machine: statig::blocking::StateMachine<CycleMachine>,
}

impl CycleEngine {
    pub fn new(interval_ms: u32) -> Self {
        Self {
            machine: CycleMachine::new(interval_ms).state_machine(),
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.machine.inner().phase
    }

    /// Sleep chosen by the last report: the interval or a backoff delay.
    pub fn sleep_ms(&self) -> u32 {
        self.machine.inner().sleep_ms
    }

    pub fn measured(&self) -> bool {
        self.machine.inner().measured
    }

    pub fn apply(&mut self, event: CycleEvent) -> CycleApplyResult {
        let before = self.phase();
        let mut context = DispatchContext::default();
        self.machine.handle_with_context(&event, &mut context);
        let after = self.phase();
        if matches!(context.status, CycleApplyStatus::InvalidTransition) {
            log::warn!("cycle: {:?} rejected in {}", event, before.as_str());
        }
        CycleApplyResult {
            before,
            after,
            status: context.status,
        }
    }
}
