use state_machines::state_machine;

state_machine! {
    name: PollMachine,
    state: PollState,
    initial: Idle,
    states: [Idle, Resolving, Extracting, Stopped],
    events {
        resolve { transition: { from: Idle, to: Resolving } }
        extract { transition: { from: Resolving, to: Extracting } }
        finish { transition: { from: Extracting, to: Idle } }
        stop { transition: { from: Idle, to: Stopped } }
    }
}

pub fn idle() -> PollMachine<(), Idle> {
    PollMachine::new(())
}
