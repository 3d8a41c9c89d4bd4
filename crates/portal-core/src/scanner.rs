//! QR scan adapter
//!
//! Wraps a camera backend (device enumeration, streaming, decoding) behind
//! [`CameraBackend`] and turns its callbacks into a single decoded card
//! number per open session:
//!
//! ```text
//! Closed -> Initializing -> Ready -> Decoded -> Closed
//!                 \            \
//!                  +--> Error   +--> (switch camera) Initializing
//! ```
//!
//! The scanner exclusively owns the stream: it is always stopped before a
//! new one starts, when a code is decoded and when the scanner closes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ScanError;

/// A video input reported by the device
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDevice {
    pub id: String,
    pub label: String,
}

/// What a started stream supports
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamCapabilities {
    pub torch: bool,
}

#[async_trait]
pub trait CameraBackend: Send {
    async fn enumerate_devices(&mut self) -> Result<Vec<CameraDevice>, ScanError>;
    async fn start_stream(&mut self, device_id: &str) -> Result<StreamCapabilities, ScanError>;
    async fn stop_stream(&mut self);
    async fn set_torch(&mut self, on: bool) -> Result<(), ScanError>;
}

/// Tone and haptic pulse played on a successful decode
pub trait ScanFeedback: Send {
    fn beep(&mut self) -> Result<(), String>;
    fn vibrate(&mut self) -> Result<(), String>;
}

/// Feedback for devices without speaker or vibration motor
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentFeedback;

impl ScanFeedback for SilentFeedback {
    fn beep(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn vibrate(&mut self) -> Result<(), String> {
        Ok(())
    }
}

/// Remembers the last camera used, across sessions
pub trait DevicePreferenceStore: Send {
    fn last_device(&self) -> Option<String>;
    fn remember_device(&mut self, device_id: &str);
}

#[derive(Clone, Debug, Default)]
pub struct MemoryDeviceStore {
    last: Option<String>,
}

impl DevicePreferenceStore for MemoryDeviceStore {
    fn last_device(&self) -> Option<String> {
        self.last.clone()
    }

    fn remember_device(&mut self, device_id: &str) {
        self.last = Some(device_id.to_string());
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPreference {
    last_device_id: String,
}

/// JSON file holding the last selected camera id
///
/// Read and write failures are logged and otherwise ignored: losing the
/// preference only means the default camera is picked next time.
#[derive(Clone, Debug)]
pub struct FileDeviceStore {
    path: PathBuf,
}

impl FileDeviceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.hospital-portal/camera.json`, when a home directory exists
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".hospital-portal").join("camera.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DevicePreferenceStore for FileDeviceStore {
    fn last_device(&self) -> Option<String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No stored camera preference at {:?}: {}", self.path, e);
                return None;
            }
        };
        match serde_json::from_str::<StoredPreference>(&content) {
            Ok(pref) => Some(pref.last_device_id),
            Err(e) => {
                warn!("Ignoring unreadable camera preference {:?}: {}", self.path, e);
                None
            }
        }
    }

    fn remember_device(&mut self, device_id: &str) {
        let pref = StoredPreference {
            last_device_id: device_id.to_string(),
        };
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_string(&pref)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            std::fs::write(&self.path, json)
        })();
        if let Err(e) = result {
            warn!("Failed to save camera preference to {:?}: {}", self.path, e);
        }
    }
}

/// Pick the camera for a new session
///
/// Last-used device if still present, then one labelled back/rear, then the first.
pub fn select_device<'a>(devices: &'a [CameraDevice], preferred: Option<&str>) -> Option<&'a CameraDevice> {
    if let Some(id) = preferred {
        if let Some(device) = devices.iter().find(|d| d.id == id) {
            return Some(device);
        }
    }
    devices
        .iter()
        .find(|d| {
            let label = d.label.to_lowercase();
            label.contains("back") || label.contains("rear")
        })
        .or_else(|| devices.first())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanState {
    Closed,
    Initializing,
    Ready { device_id: String },
    Decoded(String),
    Error(String),
}

pub struct QrScanner<C, F, S> {
    camera: C,
    feedback: F,
    store: S,
    state: ScanState,
    devices: Vec<CameraDevice>,
    streaming: bool,
    decoded: bool,
    torch_supported: bool,
    torch_on: bool,
}

impl<C, F, S> QrScanner<C, F, S>
where
    C: CameraBackend,
    F: ScanFeedback,
    S: DevicePreferenceStore,
{
    pub fn new(camera: C, feedback: F, store: S) -> Self {
        Self {
            camera,
            feedback,
            store,
            state: ScanState::Closed,
            devices: Vec::new(),
            streaming: false,
            decoded: false,
            torch_supported: false,
            torch_on: false,
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn devices(&self) -> &[CameraDevice] {
        &self.devices
    }

    pub fn active_device(&self) -> Option<&str> {
        match &self.state {
            ScanState::Ready { device_id } => Some(device_id),
            _ => None,
        }
    }

    /// Whether the torch control should be shown enabled
    pub fn torch_available(&self) -> bool {
        self.torch_supported && self.streaming
    }

    pub fn torch_on(&self) -> bool {
        self.torch_on
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    /// Open a scan session on the preferred camera
    pub async fn open(&mut self) -> Result<(), ScanError> {
        self.stop().await;
        self.state = ScanState::Initializing;
        self.decoded = false;

        let devices = match self.camera.enumerate_devices().await {
            Ok(devices) => devices,
            Err(e) => return Err(self.fail(e)),
        };
        if devices.is_empty() {
            self.devices.clear();
            return Err(self.fail(ScanError::NoCamera));
        }
        self.devices = devices;

        let preferred = self.store.last_device();
        let device_id = match select_device(&self.devices, preferred.as_deref()) {
            Some(device) => device.id.clone(),
            None => return Err(self.fail(ScanError::NoCamera)),
        };
        self.start(&device_id).await
    }

    /// Restart the stream on another camera
    pub async fn switch_camera(&mut self, device_id: &str) -> Result<(), ScanError> {
        if !matches!(self.state, ScanState::Ready { .. }) {
            return Err(ScanError::NotOpen);
        }
        if !self.devices.iter().any(|d| d.id == device_id) {
            return Err(ScanError::UnknownDevice(device_id.to_string()));
        }
        info!("Switching camera to {}", device_id);
        self.stop().await;
        self.state = ScanState::Initializing;
        self.start(device_id).await
    }

    /// Flip the torch if the stream supports it; silently does nothing otherwise
    pub async fn toggle_torch(&mut self) -> bool {
        if !self.torch_available() {
            return false;
        }
        let wanted = !self.torch_on;
        match self.camera.set_torch(wanted).await {
            Ok(()) => self.torch_on = wanted,
            Err(e) => {
                debug!("Torch control unavailable, disabling: {}", e);
                self.torch_supported = false;
                self.torch_on = false;
            }
        }
        self.torch_on
    }

    /// Decode callback from the scan loop
    ///
    /// Only the first decode of a session is honored; it plays feedback,
    /// stops the stream and yields the text. Later callbacks return `None`.
    pub async fn on_decoded(&mut self, text: &str) -> Option<String> {
        if self.decoded || !matches!(self.state, ScanState::Ready { .. }) {
            debug!("Ignoring decode callback outside an active session");
            return None;
        }
        self.decoded = true;

        if let Err(e) = self.feedback.beep() {
            debug!("Scan tone failed: {}", e);
        }
        if let Err(e) = self.feedback.vibrate() {
            debug!("Scan vibration failed: {}", e);
        }

        self.stop().await;
        self.state = ScanState::Decoded(text.to_string());
        info!("QR code decoded");
        Some(text.to_string())
    }

    /// Close the dialog; always releases the camera
    pub async fn close(&mut self) {
        self.stop().await;
        self.state = ScanState::Closed;
    }

    async fn start(&mut self, device_id: &str) -> Result<(), ScanError> {
        match self.camera.start_stream(device_id).await {
            Ok(capabilities) => {
                self.streaming = true;
                self.torch_supported = capabilities.torch;
                self.torch_on = false;
                self.store.remember_device(device_id);
                self.state = ScanState::Ready {
                    device_id: device_id.to_string(),
                };
                info!("Camera {} ready", device_id);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn stop(&mut self) {
        if self.streaming {
            self.camera.stop_stream().await;
            self.streaming = false;
        }
        self.torch_on = false;
    }

    fn fail(&mut self, error: ScanError) -> ScanError {
        warn!("Scanner error: {}", error);
        self.state = ScanState::Error(error.to_string());
        error
    }
}
