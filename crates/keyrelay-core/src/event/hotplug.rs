// Keyrelay Event Handling - Hot-plug Bridge
// udev monitor thread feeding the main loop's HotplugSignal

use std::io;
use std::thread::{self, JoinHandle};

use super::wakeup::{HotplugSignal, Shutdown};

#[derive(Debug, thiserror::Error)]
pub enum HotplugError {
    #[error("Hot-plug subscription failed: {0}")]
    Subscribe(#[source] io::Error),

    #[error("Hot-plug support not compiled in (enable the `hotplug` feature)")]
    Unsupported,
}

/// Start the bridge thread.
///
/// Subscription happens on the new thread; if it fails the error is handed
/// to the main loop through `signal`, which ends the engine.
pub fn spawn_bridge(signal: HotplugSignal, shutdown: Shutdown) -> Result<JoinHandle<()>, HotplugError> {
    thread::Builder::new()
        .name("keyrelay-hotplug".to_string())
        .spawn(move || run_bridge(signal, shutdown))
        .map_err(HotplugError::Subscribe)
}

#[cfg(feature = "hotplug")]
fn run_bridge(signal: HotplugSignal, shutdown: Shutdown) {
    use std::os::unix::io::AsRawFd;

    let socket = match subscribe() {
        Ok(socket) => socket,
        Err(e) => {
            log::error!("Cannot monitor input devices: {}", e);
            signal.fail(HotplugError::Subscribe(e));
            return;
        }
    };
    log::debug!("Listening for input hot-plug notifications");

    loop {
        let mut fds = [
            libc::pollfd {
                fd: socket.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: shutdown.raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            signal.fail(HotplugError::Subscribe(err));
            return;
        }

        if shutdown.is_triggered() {
            log::debug!("Hot-plug bridge stopping");
            return;
        }

        if fds[0].revents & libc::POLLIN != 0 {
            for event in socket.iter() {
                if is_attach_or_detach(event.event_type()) {
                    log::debug!(
                        "Hot-plug {:?}: {}",
                        event.event_type(),
                        event.sysname().to_string_lossy()
                    );
                    signal.notify();
                }
            }
        }
    }
}

#[cfg(feature = "hotplug")]
fn subscribe() -> io::Result<udev::MonitorSocket> {
    udev::MonitorBuilder::new()?.match_subsystem("input")?.listen()
}

#[cfg(feature = "hotplug")]
fn is_attach_or_detach(event_type: udev::EventType) -> bool {
    matches!(event_type, udev::EventType::Add | udev::EventType::Remove)
}

#[cfg(not(feature = "hotplug"))]
fn run_bridge(signal: HotplugSignal, _shutdown: Shutdown) {
    signal.fail(HotplugError::Unsupported);
}
