//! Serial port detection and setup.

use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Select};
use log::{debug, info};
use serialport::{available_ports, SerialPort, SerialPortType};

use crate::error::{PreconditionError, Result, TransportError};
use crate::Settings;

/// USB vendor and product id of the token's serial interface.
const TOKEN_USB_ID: (u16, u16) = (0x1207, 0x8887);

//==============================================================================
// Public Interface
//==============================================================================

/// Find the serial port of a connected token. With more than one token
/// plugged in, the user picks one.
pub(crate) fn detect_port() -> Result<String> {
    let found = enumerate_token_ports();
    debug!("token ports: {:?}", found);

    match found.len() {
        0 => Err(PreconditionError::NoDevice.into()),
        1 => Ok(port_path(&found[0])),
        _ => select_port_interactive(&found)
            .ok_or_else(|| PreconditionError::MissingArgument("--port").into()),
    }
}

pub(crate) fn open_port(
    settings: &Settings,
    path: &str,
) -> std::result::Result<Box<dyn SerialPort>, TransportError> {
    let port = serialport::new(path, settings.baud_rate)
        .data_bits(settings.data_bits)
        .stop_bits(settings.stop_bits)
        .parity(settings.parity)
        .flow_control(settings.flow_control)
        .timeout(settings.read_timeout)
        .open()
        .map_err(|source| TransportError::Open {
            path: path.to_owned(),
            source,
        })?;

    info!(
        "Connected to {} at {} baud",
        port.name().unwrap_or_else(|| path.to_owned()),
        port.baud_rate()?
    );
    debug!("data_bits    : {:#?}", port.data_bits()?);
    debug!("stop_bits    : {:#?}", port.stop_bits()?);
    debug!("parity       : {:#?}", port.parity()?);
    debug!("flow control : {:#?}", port.flow_control()?);

    Ok(port)
}

//==============================================================================
// Private stuff
//==============================================================================

/// The port name, stripped of the description added for display.
fn port_path(entry: &str) -> String {
    String::from(entry.split(": (").next().unwrap_or(entry))
}

/// Enumerates serial devices with the token's USB id.
fn enumerate_token_ports() -> Vec<String> {
    let mut token_ports = vec![];
    match available_ports() {
        Ok(ports) => {
            for p in ports {
                if let SerialPortType::UsbPort(info) = p.port_type {
                    if (info.vid, info.pid) != TOKEN_USB_ID {
                        continue;
                    }
                    let extended_name = format!(
                        "{}: ({} / {})",
                        p.port_name,
                        info.serial_number.as_ref().map_or("", String::as_str),
                        info.product.as_ref().map_or("", String::as_str)
                    );
                    token_ports.push(extended_name);
                }
            }
        }
        Err(ref e) => {
            info!("error: {}", e.to_string());
        }
    }
    token_ports
}

fn select_port_interactive(ports: &[String]) -> Option<String> {
    let term = Term::buffered_stderr();
    let theme = ColorfulTheme::default();

    let mut select = Select::with_theme(&theme);
    select.with_prompt(format!(
        "More than one token found, select one (`{}` to cancel)",
        style("Esc").cyan()
    ));
    for item in ports {
        select.item(item);
    }

    match select.default(0).interact_on_opt(&term) {
        Ok(selection) => selection.map(|x| port_path(&ports[x])),
        Err(ref e) => {
            info!("error: {}", e.to_string());
            None
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn port_path_strips_description() {
    assert_eq!(port_path("/dev/ttyACM0: (1234 / MTA1-USB-V1)"), "/dev/ttyACM0");
    assert_eq!(port_path("COM4"), "COM4");
}
