//! Scriptable USB transport for tests.
//!
//! Lets a test decide what enumeration returns, which devices refuse to
//! connect, and when a pending enumeration is allowed to finish, so races
//! between overlapping operations can be reproduced deterministically.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use vmsession_core::{UsbDevice, UsbHandle};

use crate::application::ports::{ConnectOutcome, TransportError, UsbTransport};

#[derive(Debug, Default)]
struct Script {
    devices: Vec<UsbDevice>,
    refused: HashSet<UsbHandle>,
    enumerate_fails: bool,
    hold: Option<Arc<Notify>>,
}

/// A [`UsbTransport`] driven by a test script.  Clones share the script.
#[derive(Debug, Clone, Default)]
pub struct ScriptedUsbTransport {
    script: Arc<Mutex<Script>>,
    enumerations: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
}

impl ScriptedUsbTransport {
    pub fn new(devices: Vec<UsbDevice>) -> Self {
        let transport = Self::default();
        transport.set_devices(devices);
        transport
    }

    /// Replaces the list returned by later enumerations.
    pub fn set_devices(&self, devices: Vec<UsbDevice>) {
        self.script.lock().expect("lock poisoned").devices = devices;
    }

    /// Makes connect attempts for `handle` come back refused.
    pub fn refuse(&self, handle: UsbHandle) {
        self.script.lock().expect("lock poisoned").refused.insert(handle);
    }

    pub fn fail_enumeration(&self, fails: bool) {
        self.script.lock().expect("lock poisoned").enumerate_fails = fails;
    }

    /// Holds the next enumeration until the returned latch is notified.
    ///
    /// The device list is captured when the latch opens, not when the
    /// enumeration starts.
    pub fn hold_enumeration(&self) -> Arc<Notify> {
        let latch = Arc::new(Notify::new());
        self.script.lock().expect("lock poisoned").hold = Some(Arc::clone(&latch));
        latch
    }

    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsbTransport for ScriptedUsbTransport {
    async fn enumerate(&self) -> Result<Vec<UsbDevice>, TransportError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        let hold = self.script.lock().expect("lock poisoned").hold.take();
        if let Some(latch) = hold {
            latch.notified().await;
        }

        let script = self.script.lock().expect("lock poisoned");
        if script.enumerate_fails {
            return Err(TransportError::Enumeration("scripted failure".to_string()));
        }
        Ok(script.devices.clone())
    }

    async fn connect(&self, device: UsbDevice) -> Result<ConnectOutcome, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .script
            .lock()
            .expect("lock poisoned")
            .refused
            .contains(&device.handle);
        if refused {
            Ok(ConnectOutcome::refused(format!("{} is in use by the host", device.name)))
        } else {
            Ok(ConnectOutcome::connected())
        }
    }

    async fn disconnect(&self, _device: UsbDevice) -> Result<(), TransportError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
