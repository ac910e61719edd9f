//! `tokencom` provisioning state machine.
//!
//! The following state diagram summarizes the states and transitions a run
//! goes through:
//!
//! ```text
//!  Disconnected ──> Connected ──────────────────────────┐ (start)
//!       │             │   │                             v
//!       │             │   └──> FirmwareMode ──────> Operating
//!       │             │          (load mgmt app)        ^  │
//!       │             └──────> AppMode ─────────────────┘  │
//!       │                        (USS ignored)             │
//!       └──────────────────────────> Closed <──────────────┘
//!                                   (any failure ends here too)
//! ```

use std::fmt;

use super::events::*;
use super::states::*;
use super::Request;
use crate::session::{DeviceSession, FirmwareProbe, ModeProbe};
use crate::settings::Settings;
use crate::transport::Connect;

// =============================================================================
// Public Interface
// =============================================================================

/// Represents the provisioning state machine. Use [`factory()`] or
/// [`attach()`] to get an instance then run it by calling its `run()` method.
pub struct Provisioner<T: Connect + fmt::Debug> {
    sm: ProvisionStates<T>,
}
impl<T: Connect + fmt::Debug> Provisioner<T> {
    /// The event loop runs until the `Closed` state is reached and its
    /// `should_exit` flag is set. It then returns an exit code indicating no
    /// errors when equal to **`0`**; otherwise a termination with error.
    pub fn run(&mut self) -> i8 {
        loop {
            self.sm = self.sm.step();
            if let ProvisionStates::Closed(sm) = &self.sm {
                if sm.state.should_exit {
                    return if sm.state.with_error { 1 } else { 0 };
                }
            }
        }
    }
}

/// Factory function for the provisioning state machine. The run starts by
/// connecting to the token described by `settings`.
pub fn factory<T: Connect + fmt::Debug>(settings: Settings, request: Request) -> Provisioner<T> {
    Provisioner {
        sm: ProvisionStates::Disconnected(ProvisionSM::new(settings, request)),
    }
}

/// Start a run on an already open `session`, deciding the mode with `probe`.
pub fn attach<T: Connect + fmt::Debug>(
    settings: Settings,
    request: Request,
    session: DeviceSession<T>,
    probe: Box<dyn ModeProbe<T>>,
) -> Provisioner<T> {
    Provisioner {
        sm: ProvisionStates::Connected(
            ConnectedEvent {
                settings,
                job: Job {
                    request,
                    session,
                    probe,
                },
            }
            .into(),
        ),
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// The raw state machine. The generic state parameter allows for data shared
/// by all states next to the data of the current one.
#[derive(Debug)]
struct ProvisionSM<S> {
    settings: Settings,
    state: S,
}
impl<S> ProvisionSM<S> {
    fn run<T>(&mut self) -> Event<T>
    where
        T: Connect,
        S: Runnable<T>,
    {
        self.state.run(&self.settings)
    }
}

/// The state machine starts in the `DisconnectedState`.
impl<T: Connect> ProvisionSM<DisconnectedState<T>> {
    fn new(settings: Settings, request: Request) -> Self {
        ProvisionSM {
            settings,
            state: DisconnectedState {
                request: Some(request),
                probe: Some(Box::new(FirmwareProbe)),
            },
        }
    }
}

/// An enum wrapper around the states of the provisioning state machine.
enum ProvisionStates<T: Connect> {
    Disconnected(ProvisionSM<DisconnectedState<T>>),
    Connected(ProvisionSM<ConnectedState<T>>),
    FirmwareMode(ProvisionSM<FirmwareModeState<T>>),
    AppMode(ProvisionSM<AppModeState<T>>),
    Operating(ProvisionSM<OperatingState<T>>),
    Closed(ProvisionSM<ClosedState<T>>),
}
impl<T: Connect + fmt::Debug> ProvisionStates<T> {
    /// The unit of work in the event loop: run the current state and follow
    /// the transition its event asks for. Transitions from events go through
    /// `From`/`Into`, so only the ones implemented below can happen.
    fn step(&mut self) -> Self {
        match self {
            ProvisionStates::Disconnected(sm) => {
                let event: Event<T> = sm.run();
                match event {
                    Event::Connected(ev) => ProvisionStates::Connected(ev.into()),
                    Event::Closed(ev) => ProvisionStates::Closed(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            ProvisionStates::Connected(sm) => {
                let event: Event<T> = sm.run();
                match event {
                    Event::FirmwareMode(ev) => ProvisionStates::FirmwareMode(ev.into()),
                    Event::AppMode(ev) => ProvisionStates::AppMode(ev.into()),
                    Event::Operating(ev) => ProvisionStates::Operating(ev.into()),
                    Event::Closed(ev) => ProvisionStates::Closed(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            ProvisionStates::FirmwareMode(sm) => {
                let event: Event<T> = sm.run();
                match event {
                    Event::Operating(ev) => ProvisionStates::Operating(ev.into()),
                    Event::Closed(ev) => ProvisionStates::Closed(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            ProvisionStates::AppMode(sm) => {
                let event: Event<T> = sm.run();
                match event {
                    Event::Operating(ev) => ProvisionStates::Operating(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            ProvisionStates::Operating(sm) => {
                let event: Event<T> = sm.run();
                match event {
                    Event::Closed(ev) => ProvisionStates::Closed(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            ProvisionStates::Closed(sm) => {
                let event: Event<T> = sm.run();
                match event {
                    Event::Exit(ev) => ProvisionStates::Closed(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl<T: Connect> From<ConnectedEvent<T>> for ProvisionSM<ConnectedState<T>> {
    fn from(event: ConnectedEvent<T>) -> ProvisionSM<ConnectedState<T>> {
        ProvisionSM {
            settings: event.settings,
            state: ConnectedState {
                job: Some(event.job),
            },
        }
    }
}

impl<T: Connect> From<FirmwareModeEvent<T>> for ProvisionSM<FirmwareModeState<T>> {
    fn from(event: FirmwareModeEvent<T>) -> ProvisionSM<FirmwareModeState<T>> {
        ProvisionSM {
            settings: event.settings,
            state: FirmwareModeState {
                job: Some(event.job),
            },
        }
    }
}

impl<T: Connect> From<AppModeEvent<T>> for ProvisionSM<AppModeState<T>> {
    fn from(event: AppModeEvent<T>) -> ProvisionSM<AppModeState<T>> {
        ProvisionSM {
            settings: event.settings,
            state: AppModeState {
                job: Some(event.job),
            },
        }
    }
}

impl<T: Connect> From<OperatingEvent<T>> for ProvisionSM<OperatingState<T>> {
    fn from(event: OperatingEvent<T>) -> ProvisionSM<OperatingState<T>> {
        ProvisionSM {
            settings: event.settings,
            state: OperatingState {
                job: Some(event.job),
            },
        }
    }
}

impl<T: Connect> From<ClosedEvent<T>> for ProvisionSM<ClosedState<T>> {
    fn from(event: ClosedEvent<T>) -> ProvisionSM<ClosedState<T>> {
        let with_error = event.error.is_some();
        ProvisionSM {
            settings: event.settings,
            state: ClosedState {
                session: event.session,
                error: event.error,
                with_error,
                should_exit: false,
            },
        }
    }
}
impl<T: Connect> From<ExitEvent> for ProvisionSM<ClosedState<T>> {
    fn from(event: ExitEvent) -> ProvisionSM<ClosedState<T>> {
        ProvisionSM {
            settings: event.settings,
            state: ClosedState {
                session: None,
                error: None,
                with_error: event.with_error,
                should_exit: true,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
