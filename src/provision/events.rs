//! Events for the `tokencom` provisioning state machine.
//!
//! This module is private and restricted to the
//! [`provision`](crate::provision) scope.
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use std::fmt;

use super::Request;
use crate::error::Error;
use crate::session::{DeviceSession, ModeProbe};
use crate::settings::Settings;
use crate::transport::Transport;

// =============================================================================
// Crate-Public Interface
// =============================================================================

// Job =========================================================================

/// Everything a run carries from one state to the next once connected: the
/// request, the session owning the transport and the mode detector.
pub(crate) struct Job<T: Transport> {
    pub request: Request,
    pub session: DeviceSession<T>,
    pub probe: Box<dyn ModeProbe<T>>,
}
impl<T: Transport> fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("request", &self.request)
            .field("closed", &self.session.is_closed())
            .finish()
    }
}

// ConnectedEvent ==============================================================

/// Event fired to trigger a transition to `ConnectedState`, after the
/// transport to the token was opened.
#[derive(Debug)]
pub(crate) struct ConnectedEvent<T: Transport> {
    pub settings: Settings,
    pub job: Job<T>,
}

// FirmwareModeEvent ===========================================================

/// Event fired when the probe found the bare firmware running.
#[derive(Debug)]
pub(crate) struct FirmwareModeEvent<T: Transport> {
    pub settings: Settings,
    pub job: Job<T>,
}

// AppModeEvent ================================================================

/// Event fired when the probe found an app already running.
#[derive(Debug)]
pub(crate) struct AppModeEvent<T: Transport> {
    pub settings: Settings,
    pub job: Job<T>,
}

// OperatingEvent ==============================================================

/// Event fired to trigger a transition to `OperatingState`.
///
/// This event can happen under one of the following circumstances:
///
///  1. While at the `ConnectedState` for a request not needing any app.
///  2. While at the `FirmwareModeState` after the management app was loaded.
///  3. While at the `AppModeState`.
#[derive(Debug)]
pub(crate) struct OperatingEvent<T: Transport> {
    pub settings: Settings,
    pub job: Job<T>,
}

// ClosedEvent =================================================================

/// Event fired when the run completes and is about to terminate, normally or
/// because of `error`. The session, when there is one, gets closed.
#[derive(Debug)]
pub(crate) struct ClosedEvent<T: Transport> {
    pub settings: Settings,
    pub session: Option<DeviceSession<T>>,
    pub error: Option<Error>,
}

// ExitEvent ===================================================================

/// The last event of the run. The event loop terminates with an exit status
/// telling whether the completion was normal or not.
#[derive(Debug)]
pub(crate) struct ExitEvent {
    pub settings: Settings,
    pub with_error: bool,
}

// Events enum ==================================================================

/// Events that can be triggered within the provisioning state machine.
///
/// Each value holds the data the origin state hands over to the target state.
#[derive(Debug)]
pub(crate) enum Event<T: Transport> {
    Connected(ConnectedEvent<T>),
    FirmwareMode(FirmwareModeEvent<T>),
    AppMode(AppModeEvent<T>),
    Operating(OperatingEvent<T>),
    Closed(ClosedEvent<T>),
    Exit(ExitEvent),
}
