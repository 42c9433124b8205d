// THEORY:
// The tolerance state eventually drives a physical actuator (a buzzer or light on a
// microcontroller). The link is slow and the device only cares about transitions,
// so commands are deduplicated at this boundary: a command is sent only when it
// differs from the last one the device *acknowledged*. A send that fails or is not
// acknowledged leaves the record untouched, so the next frame retries it.
//
// The transport itself lives outside this crate; anything that can deliver one
// command byte and report the outcome implements `Actuator`.

use crate::core_modules::lock_gate::ToleranceState;
use log::{error, info, warn};

/// Command byte understood by the actuator firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorCommand {
    /// Eye in position (`'L'`, low).
    WithinTolerance,
    /// Eye out of position (`'H'`, high).
    OutOfTolerance,
}

impl ActuatorCommand {
    pub fn as_byte(self) -> u8 {
        match self {
            ActuatorCommand::WithinTolerance => b'L',
            ActuatorCommand::OutOfTolerance => b'H',
        }
    }
}

impl From<ToleranceState> for ActuatorCommand {
    fn from(state: ToleranceState) -> Self {
        match state {
            ToleranceState::WithinTolerance => ActuatorCommand::WithinTolerance,
            ToleranceState::OutOfTolerance => ActuatorCommand::OutOfTolerance,
        }
    }
}

/// What the device said about one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Acknowledged,
    /// The device ended the session.
    Terminated,
    Failed,
}

/// Delivery seam for actuator commands.
pub trait Actuator {
    fn is_connected(&self) -> bool;
    fn send(&mut self, command: ActuatorCommand) -> SendOutcome;
}

/// Remembers the last acknowledged command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandGate {
    last_acknowledged: ActuatorCommand,
}

impl Default for CommandGate {
    fn default() -> Self {
        Self {
            last_acknowledged: ActuatorCommand::WithinTolerance,
        }
    }
}

impl CommandGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_acknowledged(&self) -> ActuatorCommand {
        self.last_acknowledged
    }

    /// The command that still has to be delivered for `state`, if any.
    pub fn pending(&self, state: ToleranceState) -> Option<ActuatorCommand> {
        let command = ActuatorCommand::from(state);
        (command != self.last_acknowledged).then_some(command)
    }

    /// Sends the command for `state` if it differs from the last acknowledged one
    /// and the actuator is connected. Returns the outcome of the send, or `None`
    /// when nothing had to be sent.
    pub fn dispatch(
        &mut self,
        state: ToleranceState,
        actuator: &mut dyn Actuator,
    ) -> Option<SendOutcome> {
        let command = self.pending(state)?;
        if !actuator.is_connected() {
            return None;
        }

        let outcome = actuator.send(command);
        match outcome {
            SendOutcome::Acknowledged => {
                info!("Actuator acknowledged command '{}'", command.as_byte() as char);
                self.last_acknowledged = command;
            }
            SendOutcome::Terminated => {
                error!("Actuator ended the session while sending '{}'", command.as_byte() as char);
            }
            SendOutcome::Failed => {
                warn!("Failed to send command '{}'; will retry", command.as_byte() as char);
            }
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedActuator {
        connected: bool,
        outcomes: Vec<SendOutcome>,
        sent: Vec<ActuatorCommand>,
    }

    impl ScriptedActuator {
        fn new(outcomes: Vec<SendOutcome>) -> Self {
            Self {
                connected: true,
                outcomes,
                sent: Vec::new(),
            }
        }
    }

    impl Actuator for ScriptedActuator {
        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send(&mut self, command: ActuatorCommand) -> SendOutcome {
            self.sent.push(command);
            if self.outcomes.is_empty() {
                SendOutcome::Acknowledged
            } else {
                self.outcomes.remove(0)
            }
        }
    }

    #[test]
    fn command_bytes() {
        assert_eq!(ActuatorCommand::WithinTolerance.as_byte(), b'L');
        assert_eq!(ActuatorCommand::OutOfTolerance.as_byte(), b'H');
        assert_eq!(
            ActuatorCommand::from(ToleranceState::OutOfTolerance),
            ActuatorCommand::OutOfTolerance
        );
    }

    #[test]
    fn starts_low_and_only_sends_on_change() {
        let mut gate = CommandGate::new();
        let mut actuator = ScriptedActuator::new(Vec::new());

        assert_eq!(gate.dispatch(ToleranceState::WithinTolerance, &mut actuator), None);
        assert_eq!(
            gate.dispatch(ToleranceState::OutOfTolerance, &mut actuator),
            Some(SendOutcome::Acknowledged)
        );
        assert_eq!(gate.dispatch(ToleranceState::OutOfTolerance, &mut actuator), None);
        assert_eq!(
            gate.dispatch(ToleranceState::WithinTolerance, &mut actuator),
            Some(SendOutcome::Acknowledged)
        );
        assert_eq!(
            actuator.sent,
            vec![ActuatorCommand::OutOfTolerance, ActuatorCommand::WithinTolerance]
        );
    }

    #[test]
    fn unacknowledged_sends_are_retried() {
        let mut gate = CommandGate::new();
        let mut actuator =
            ScriptedActuator::new(vec![SendOutcome::Failed, SendOutcome::Terminated]);

        assert_eq!(
            gate.dispatch(ToleranceState::OutOfTolerance, &mut actuator),
            Some(SendOutcome::Failed)
        );
        assert_eq!(
            gate.dispatch(ToleranceState::OutOfTolerance, &mut actuator),
            Some(SendOutcome::Terminated)
        );
        assert_eq!(gate.last_acknowledged(), ActuatorCommand::WithinTolerance);
        assert_eq!(
            gate.dispatch(ToleranceState::OutOfTolerance, &mut actuator),
            Some(SendOutcome::Acknowledged)
        );
        assert_eq!(gate.last_acknowledged(), ActuatorCommand::OutOfTolerance);
        assert_eq!(actuator.sent.len(), 3);
    }

    #[test]
    fn disconnected_actuator_is_skipped() {
        let mut gate = CommandGate::new();
        let mut actuator = ScriptedActuator::new(Vec::new());
        actuator.connected = false;

        assert_eq!(gate.dispatch(ToleranceState::OutOfTolerance, &mut actuator), None);
        assert!(actuator.sent.is_empty());
        assert_eq!(
            gate.pending(ToleranceState::OutOfTolerance),
            Some(ActuatorCommand::OutOfTolerance)
        );
    }
}
