//! Character-device transport.
//!
//! Modems attached over USB enumerate as serial ports (`/dev/ttyUSB*`,
//! `/dev/ttyACM*`), while SoC-integrated basebands usually expose a plain
//! character device (`/dev/smd0`). Serial ports are opened through
//! `tokio-serial`, which puts the line in raw mode so that neither echo nor
//! canonical line editing interfere with AT framing. Other devices are
//! opened non-blocking as a [`CharDevice`].

use std::path::Path;

use ril_core::error::{Error, Result};
use ril_core::transport::Transport;
use tokio_serial::{SerialPort, SerialPortBuilderExt};

use crate::chardev::CharDevice;
use crate::stream::StreamTransport;

/// Serial line settings for modems behind a tty.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate. USB CDC modems ignore it.
    pub baud_rate: u32,
    /// Use RTS/CTS hardware flow control.
    pub hardware_flow_control: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            hardware_flow_control: false,
        }
    }
}

/// Whether the device path names a tty that needs raw-mode configuration.
pub fn is_serial_device(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("tty"))
}

/// Open a modem character device.
pub async fn open_device(path: &Path, config: &SerialConfig) -> Result<Box<dyn Transport>> {
    let label = path.display().to_string();

    if is_serial_device(path) {
        tracing::debug!(
            device = %label,
            baud_rate = config.baud_rate,
            hardware_flow_control = config.hardware_flow_control,
            "Opening serial device"
        );
        let flow = if config.hardware_flow_control {
            tokio_serial::FlowControl::Hardware
        } else {
            tokio_serial::FlowControl::None
        };
        let mut port = tokio_serial::new(label.as_str(), config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(flow)
            .open_native_async()
            .map_err(|e| Error::Transport(format!("failed to open {label}: {e}")))?;

        // Modems treat DTR drop as hang-up; keep it asserted.
        if let Err(e) = port.write_data_terminal_ready(true) {
            tracing::warn!(device = %label, error = %e, "Failed to assert DTR");
        }

        tracing::info!(device = %label, "Serial device opened");
        Ok(Box::new(StreamTransport::new(port, label)))
    } else {
        tracing::debug!(device = %label, "Opening character device");
        let device = CharDevice::open(path)
            .map_err(|e| Error::Transport(format!("failed to open {label}: {e}")))?;
        tracing::info!(device = %label, "Character device opened");
        Ok(Box::new(StreamTransport::new(device, label)))
    }
}
