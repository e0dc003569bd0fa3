// Keyrelay Event Handling - Wakeup Channels
// Self-pipes that make cross-thread signals visible to poll(2)

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::hotplug::HotplugError;

/// A connected socket pair; writing to one end makes the other readable.
#[derive(Debug)]
pub struct WakePipe {
    reader: UnixStream,
    writer: UnixStream,
}

impl WakePipe {
    pub fn new() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;
        Ok(Self { reader, writer })
    }

    /// Descriptor to include in the readiness wait
    pub fn raw_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    /// Make the read end readable. A full buffer already means "signalled".
    pub fn wake(&self) {
        if let Err(e) = (&self.writer).write(&[1]) {
            if e.kind() != io::ErrorKind::WouldBlock {
                log::debug!("Wakeup write failed: {}", e);
            }
        }
    }

    /// Consume every pending wakeup. Returns whether there was any.
    pub fn drain(&self) -> bool {
        let mut buf = [0u8; 64];
        let mut woken = false;
        loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => woken = true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        woken
    }
}

struct HotplugInner {
    pipe: WakePipe,
    failure: Mutex<Option<HotplugError>>,
}

/// Set by the hot-plug bridge on every add/remove notification.
///
/// Notifications overwrite each other: however many arrive before the main
/// loop drains, they produce one wakeup.
#[derive(Clone)]
pub struct HotplugSignal {
    inner: Arc<HotplugInner>,
}

impl HotplugSignal {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(HotplugInner {
                pipe: WakePipe::new()?,
                failure: Mutex::new(None),
            }),
        })
    }

    pub fn notify(&self) {
        self.inner.pipe.wake();
    }

    /// Report that the bridge cannot run. The main loop treats this as fatal.
    pub fn fail(&self, error: HotplugError) {
        *self.inner.failure.lock() = Some(error);
        self.inner.pipe.wake();
    }

    pub fn take_failure(&self) -> Option<HotplugError> {
        self.inner.failure.lock().take()
    }

    /// Clear pending notifications, returning whether any were set.
    pub fn drain(&self) -> bool {
        self.inner.pipe.drain()
    }

    pub fn raw_fd(&self) -> RawFd {
        self.inner.pipe.raw_fd()
    }
}

struct ShutdownInner {
    pipe: WakePipe,
    triggered: AtomicBool,
}

/// Level-triggered stop request. Once triggered it stays readable, so no
/// other wakeup source can starve it.
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<ShutdownInner>,
}

impl Shutdown {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(ShutdownInner {
                pipe: WakePipe::new()?,
                triggered: AtomicBool::new(false),
            }),
        })
    }

    pub fn trigger(&self) {
        if !self.inner.triggered.swap(true, Ordering::SeqCst) {
            self.inner.pipe.wake();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    pub fn raw_fd(&self) -> RawFd {
        self.inner.pipe.raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readable(fd: RawFd) -> bool {
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pfd, 1, 0) };
        rc == 1 && pfd.revents & libc::POLLIN != 0
    }

    #[test]
    fn test_wake_pipe_drain() {
        let pipe = WakePipe::new().unwrap();
        assert!(!readable(pipe.raw_fd()));
        assert!(!pipe.drain());

        pipe.wake();
        pipe.wake();
        assert!(readable(pipe.raw_fd()));
        assert!(pipe.drain());
        assert!(!readable(pipe.raw_fd()));
    }

    #[test]
    fn test_hotplug_notifications_coalesce() {
        let signal = HotplugSignal::new().unwrap();
        let bridge = signal.clone();
        bridge.notify();
        bridge.notify();
        bridge.notify();
        assert!(signal.drain());
        assert!(!signal.drain());
    }

    #[test]
    fn test_hotplug_failure_is_taken_once() {
        let signal = HotplugSignal::new().unwrap();
        signal.fail(HotplugError::Unsupported);
        assert!(readable(signal.raw_fd()));
        assert!(matches!(signal.take_failure(), Some(HotplugError::Unsupported)));
        assert!(signal.take_failure().is_none());
    }

    #[test]
    fn test_shutdown_stays_readable() {
        let shutdown = Shutdown::new().unwrap();
        assert!(!shutdown.is_triggered());
        shutdown.clone().trigger();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
        assert!(readable(shutdown.raw_fd()));
        assert!(readable(shutdown.raw_fd()));
    }
}
