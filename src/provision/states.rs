//! States for the `tokencom` provisioning state machine.
//!
//! This module is private and restricted to the
//! [`provision`](crate::provision) scope.
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use std::fmt;

use console::style;
use log::{info, warn};

use super::events::*;
use super::Request;
use crate::error::{Error, PreconditionError, Result, TransportError};
use crate::secret;
use crate::session::{DeviceSession, Mode, ModeProbe};
use crate::settings::Settings;
use crate::transport::{Connect, Transport};
use crate::utils::{format_digest, read_image};

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Trait adding the ability for a state to be `run` after a transition into it.
pub(crate) trait Runnable<T: Transport> {
    /// Do the work of the state, then request a transition by returning the
    /// appropriate `event`.
    fn run(&mut self, settings: &Settings) -> Event<T>;
}

// Disconnected State ==========================================================

/// The initial state: nothing is open yet.
///
///  * **[`ConnectedEvent`] => `ConnectedState`** once the transport is open,
///  * **[`ClosedEvent`] => [`ClosedState`]** when the token cannot be reached.
pub(crate) struct DisconnectedState<T: Transport> {
    pub request: Option<Request>,
    pub probe: Option<Box<dyn ModeProbe<T>>>,
}
impl<T: Connect> Runnable<T> for DisconnectedState<T> {
    fn run(&mut self, settings: &Settings) -> Event<T> {
        info!("=> Disconnected");

        let (request, probe) = match (self.request.take(), self.probe.take()) {
            (Some(request), Some(probe)) => (request, probe),
            _ => unreachable!(),
        };

        match DeviceSession::<T>::connect(settings) {
            Ok(session) => Event::Connected(ConnectedEvent {
                settings: settings.clone(),
                job: Job {
                    request,
                    session,
                    probe,
                },
            }),
            Err(e) => closed(settings, None, Some(e)),
        }
    }
}
impl<T: Transport> fmt::Debug for DisconnectedState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisconnectedState")
            .field("request", &self.request)
            .finish()
    }
}

// Connected State =============================================================

/// The transport is open and the mode of the token unknown.
///
///  * **[`OperatingEvent`] => `OperatingState`** right away for requests
///    addressed to the firmware,
///  * **[`FirmwareModeEvent`] => `FirmwareModeState`** or
///    **[`AppModeEvent`] => `AppModeState`** depending on the probe,
///  * **[`ClosedEvent`] => [`ClosedState`]** when the probe fails.
#[derive(Debug)]
pub(crate) struct ConnectedState<T: Transport> {
    pub job: Option<Job<T>>,
}
impl<T: Transport> Runnable<T> for ConnectedState<T> {
    fn run(&mut self, settings: &Settings) -> Event<T> {
        info!("=> Connected");
        let mut job = take_job(&mut self.job);

        if let Err(e) = job.request.check(settings) {
            return closed(settings, Some(job.session), Some(e.into()));
        }

        if !job.request.needs_mgmt_app() {
            // No app gets loaded, so there is nothing to use a USS for.
            warn_uss_ignored(settings);
            return Event::Operating(OperatingEvent {
                settings: settings.clone(),
                job,
            });
        }

        match job.session.probe_mode(job.probe.as_mut()) {
            Ok(Mode::Firmware) => Event::FirmwareMode(FirmwareModeEvent {
                settings: settings.clone(),
                job,
            }),
            Ok(Mode::App) => Event::AppMode(AppModeEvent {
                settings: settings.clone(),
                job,
            }),
            Err(e) => closed(settings, Some(job.session), Some(e)),
        }
    }
}

// FirmwareMode State ==========================================================

/// Only the firmware runs: the management app image is loaded, with the USS
/// the user asked for, before anything else can happen.
///
///  * **[`OperatingEvent`] => `OperatingState`** once the app runs,
///  * **[`ClosedEvent`] => [`ClosedState`]** when it could not be loaded.
#[derive(Debug)]
pub(crate) struct FirmwareModeState<T: Transport> {
    pub job: Option<Job<T>>,
}
impl<T: Transport> Runnable<T> for FirmwareModeState<T> {
    fn run(&mut self, settings: &Settings) -> Event<T> {
        info!("=> Firmware Mode");
        let mut job = take_job(&mut self.job);

        match load_mgmt_app(&mut job.session, settings) {
            Ok(()) => Event::Operating(OperatingEvent {
                settings: settings.clone(),
                job,
            }),
            Err(e) => closed(settings, Some(job.session), Some(e)),
        }
    }
}

// AppMode State ===============================================================

/// An app already runs. A USS only takes effect when loading, so any
/// requested one is ignored.
///
///  * **[`OperatingEvent`] => `OperatingState`** always.
#[derive(Debug)]
pub(crate) struct AppModeState<T: Transport> {
    pub job: Option<Job<T>>,
}
impl<T: Transport> Runnable<T> for AppModeState<T> {
    fn run(&mut self, settings: &Settings) -> Event<T> {
        info!("=> App Mode");
        let job = take_job(&mut self.job);

        warn_uss_ignored(settings);

        Event::Operating(OperatingEvent {
            settings: settings.clone(),
            job,
        })
    }
}

// Operating State =============================================================

/// Carries out the request.
///
///  * **[`ClosedEvent`] => [`ClosedState`]** when done, successfully or not.
#[derive(Debug)]
pub(crate) struct OperatingState<T: Transport> {
    pub job: Option<Job<T>>,
}
impl<T: Transport> Runnable<T> for OperatingState<T> {
    fn run(&mut self, settings: &Settings) -> Event<T> {
        info!("=> Operating");
        let mut job = take_job(&mut self.job);

        let result = perform(&mut job.session, &job.request);
        closed(settings, Some(job.session), result.err())
    }
}

// Closed State ================================================================

/// Reached when the run completes and is about to terminate.
///
/// Like the other states, it runs once to close the session and report the
/// outcome, then fires the [`ExitEvent`] to stop the event loop.
pub(crate) struct ClosedState<T: Transport> {
    pub session: Option<DeviceSession<T>>,
    pub error: Option<Error>,
    /// When `true`, indicates an abnormal completion.
    pub with_error: bool,
    /// When `true` instructs the state machine to exit its event loop.
    pub should_exit: bool,
}
impl<T: Transport> Runnable<T> for ClosedState<T> {
    fn run(&mut self, settings: &Settings) -> Event<T> {
        info!(
            "=> Closed with{}errors",
            if self.with_error { " " } else { " no " }
        );

        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close() {
                warn!("closing the connection failed: {}", e);
            }
        }

        if let Some(e) = self.error.take() {
            println!("{}", style(format!("[TC] 💥 {}", e)).red());
            if let Error::Transport(TransportError::Timeout) = e {
                println!("[TC] 🔌 Disconnect and reconnect the token!");
            }
        }

        Event::Exit(ExitEvent {
            settings: settings.clone(),
            with_error: self.with_error,
        })
    }
}
impl<T: Transport> fmt::Debug for ClosedState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosedState")
            .field("error", &self.error)
            .field("with_error", &self.with_error)
            .field("should_exit", &self.should_exit)
            .finish()
    }
}

// =============================================================================
// Private stuff
// =============================================================================

fn take_job<T: Transport>(job: &mut Option<Job<T>>) -> Job<T> {
    match job.take() {
        Some(job) => job,
        // States run exactly once after the transition into them.
        None => unreachable!(),
    }
}

fn closed<T: Transport>(
    settings: &Settings,
    session: Option<DeviceSession<T>>,
    error: Option<Error>,
) -> Event<T> {
    Event::Closed(ClosedEvent {
        settings: settings.clone(),
        session,
        error,
    })
}

fn warn_uss_ignored(settings: &Settings) {
    if settings.enter_uss || settings.uss_file.is_some() {
        warn!("no app gets loaded, the USS is ignored");
        println!(
            "{}",
            style("[TC] ⚠️  No app loaded, USS ignored. Replug the token to load a new one.")
                .yellow()
        );
    }
}

/// Load the management app into a token in firmware mode.
fn load_mgmt_app<T: Transport>(session: &mut DeviceSession<T>, settings: &Settings) -> Result<()> {
    let path = settings
        .mgmt_app
        .as_deref()
        .ok_or(PreconditionError::MissingArgument("--app"))?;
    let image = read_image(path)?;
    let uss = secret::resolve(settings.enter_uss, settings.uss_file.as_deref())?;

    println!("[TC] ⏩ Loading management app `{}`", path);
    let digest = session.load_app(&image, uss.as_ref())?;
    println!("[TC] App digest: {}", format_digest(&digest));
    println!("{}", style("[TC] ✅ Management app loaded").green());
    Ok(())
}

/// Carry out `request` against the running app, or the firmware for
/// [`Request::Start`].
fn perform<T: Transport>(session: &mut DeviceSession<T>, request: &Request) -> Result<()> {
    match request {
        Request::Start => {
            session.start_app_flash()?;
            println!("{}", style("[TC] 🚀 App in flash started").green());
        }
        Request::Install {
            image,
            overwrite,
            enter_uss,
            uss_file,
        } => {
            // Anything that can fail on the host goes before the first frame.
            let binary = read_image(image)?;
            let uss = secret::resolve(*enter_uss, uss_file.as_deref())?;

            session.ensure_mgmt_app()?;
            if *overwrite {
                session.delete_installed_app()?;
                println!("[TC] 🗑️  Installed app deleted");
            }
            let digest = session.install_app(&binary, uss.as_ref())?;
            println!("[TC] App digest: {}", format_digest(&digest));
            println!("{}", style(format!("[TC] ✅ `{}` installed", image)).green());
        }
        Request::Delete => {
            session.ensure_mgmt_app()?;
            session.delete_installed_app()?;
            println!("{}", style("[TC] ✅ Installed app deleted").green());
        }
        Request::Register { unregister } => {
            session.ensure_mgmt_app()?;
            session.register_mgmt_app(*unregister)?;
            let done = if *unregister {
                "[TC] ✅ Management app unregistered"
            } else {
                "[TC] ✅ Management app registered"
            };
            println!("{}", style(done).green());
        }
        Request::LoadFlash => {
            session.ensure_mgmt_app()?;
            session.load_app_flash()?;
            println!("{}", style("[TC] ✅ App in flash loaded").green());
        }
    }
    Ok(())
}
