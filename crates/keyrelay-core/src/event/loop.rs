// Keyrelay Event Loop
// Single poll(2) wait over devices, hot-plug and shutdown

use std::io;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::hotplug::HotplugError;
use super::wakeup::{HotplugSignal, Shutdown};
use crate::input::{DeviceRegistry, DeviceSource, RegistryError};
use crate::output::{OutputError, OutputSynchronizer};
use crate::policy::{PolicyError, RemapPolicy};
use crate::util::random_duration;

/// Default hot-plug debounce window
pub const DEFAULT_DEBOUNCE: RangeInclusive<Duration> = Duration::from_millis(1000)..=Duration::from_millis(2000);

/// Errors that terminate the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Hotplug(#[from] HotplugError),

    #[error("Readiness wait failed: {0}")]
    Wait(#[source] io::Error),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Scanning,
    Waiting,
}

/// The engine's main loop.
///
/// Owns the device registry and the policy; shares the output synchronizer
/// with whatever threads the policy starts.
pub struct EventLoop<S: DeviceSource, P: RemapPolicy> {
    registry: DeviceRegistry<S>,
    output: Arc<OutputSynchronizer>,
    policy: P,
    hotplug: HotplugSignal,
    shutdown: Shutdown,
    debounce: RangeInclusive<Duration>,
}

impl<S: DeviceSource, P: RemapPolicy> EventLoop<S, P> {
    pub fn new(
        registry: DeviceRegistry<S>,
        output: Arc<OutputSynchronizer>,
        policy: P,
        hotplug: HotplugSignal,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            registry,
            output,
            policy,
            hotplug,
            shutdown,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn with_debounce(mut self, debounce: RangeInclusive<Duration>) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn output(&self) -> &Arc<OutputSynchronizer> {
        &self.output
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn registry(&self) -> &DeviceRegistry<S> {
        &self.registry
    }

    /// Run until shutdown is triggered or a fatal error occurs.
    ///
    /// Either way, every device is released and the output is closed before
    /// returning.
    pub fn run(&mut self) -> Result<(), EngineError> {
        match self.run_phases() {
            Ok(()) => {
                log::info!("Shutting down");
                self.registry.release_all();
                self.output.close();
                self.policy.on_stop();
                Ok(())
            }
            Err(e) => {
                log::error!("Fatal: {}", e);
                self.policy.on_fatal(&e);
                self.registry.release_all();
                self.output.close();
                Err(e)
            }
        }
    }

    fn run_phases(&mut self) -> Result<(), EngineError> {
        self.policy.on_start(&self.output)?;

        let mut phase = Phase::Scanning;
        loop {
            if self.shutdown.is_triggered() {
                return Ok(());
            }
            phase = match phase {
                Phase::Scanning => {
                    self.scan()?;
                    Phase::Waiting
                }
                Phase::Waiting => self.wait()?,
            };
        }
    }

    fn scan(&mut self) -> Result<(), EngineError> {
        let devices = self.registry.scan()?;
        if devices.is_empty() {
            log::warn!("No matching input device found, waiting for hot-plug");
            self.policy.on_no_device_found();
        } else {
            self.policy.on_devices_found(devices);
        }
        Ok(())
    }

    /// Block until something is readable and handle it.
    fn wait(&mut self) -> Result<Phase, EngineError> {
        let mut fds: Vec<libc::pollfd> = Vec::with_capacity(self.registry.len() + 2);
        fds.push(readable(self.shutdown.raw_fd()));
        fds.push(readable(self.hotplug.raw_fd()));
        fds.extend(self.registry.devices().iter().map(|d| readable(d.raw_fd())));

        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            // EINTR: a signal arrived; the shutdown check at the top of the
            // loop decides whether to stop
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Phase::Waiting);
            }
            return Err(EngineError::Wait(err));
        }

        if self.shutdown.is_triggered() {
            return Ok(Phase::Waiting);
        }
        if let Some(failure) = self.hotplug.take_failure() {
            return Err(failure.into());
        }

        let ready: Vec<usize> = fds[2..]
            .iter()
            .enumerate()
            .filter(|(_, fd)| fd.revents != 0)
            .map(|(index, _)| index)
            .collect();
        let lost = self.dispatch(&ready)?;

        let mut phase = Phase::Waiting;
        if !lost.is_empty() {
            self.output.reset();
            for index in lost.into_iter().rev() {
                self.registry.release(index);
            }
            phase = Phase::Scanning;
        }

        if fds[1].revents != 0 && self.hotplug.drain() {
            self.debounce_hotplug();
            phase = Phase::Scanning;
        }

        Ok(phase)
    }

    /// Read each ready device and hand its batch to the policy.
    ///
    /// Returns the indices of devices that failed to read, ascending.
    fn dispatch(&mut self, ready: &[usize]) -> Result<Vec<usize>, EngineError> {
        let mut lost = Vec::new();
        for &index in ready {
            let Some(device) = self.registry.devices_mut().get_mut(index) else {
                continue;
            };
            match device.fetch_events() {
                Ok(events) => {
                    if events.is_empty() {
                        continue;
                    }
                    log::debug!("{} event(s) from {}", events.len(), device.name());
                    self.output.observe(&events);
                    self.policy.on_events(&self.output, device, &events)?;
                }
                Err(e) => {
                    log::warn!("Device lost: {}: {}", device, e);
                    self.policy.on_device_lost(device, &e);
                    lost.push(index);
                }
            }
        }
        Ok(lost)
    }

    /// Coalesce a burst of notifications, then drop every device so the
    /// next scan starts clean.
    fn debounce_hotplug(&mut self) {
        let delay = random_duration(self.debounce.clone());
        log::debug!("Hot-plug detected, rescanning in {:?}", delay);
        thread::sleep(delay);
        self.hotplug.drain();

        self.output.reset();
        self.registry.release_all();
        log::info!("Rescanning devices");
    }
}

fn readable(fd: std::os::unix::io::RawFd) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}
