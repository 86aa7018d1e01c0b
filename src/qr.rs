// Smart-stop QR scanning: payload validation and the camera/scan state machine
//
// The scanner is a pure transition function. The host (browser glue, a test,
// a native camera wrapper) feeds it events and executes the effects it returns.

use reqwest::Url;
use std::fmt;
use std::time::Duration;

/// Every smart-stop sticker encodes a URL starting with this prefix.
pub const STATION_URL_PREFIX: &str = "https://ulasim.denizli.bel.tr/akillidurak/?durakno=";
pub const STATION_PARAM: &str = "durakno";
pub const CAMERA_START_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Not a smart-stop URL at all
    UnexpectedPrefix,
    /// Right prefix, but no usable station number
    MissingStation,
}

/// Extracts the station id from a scanned payload.
///
/// Rejection is all-or-nothing: anything that is not exactly a smart-stop URL
/// with a numeric `durakno` yields no id.
pub fn extract_station_id(payload: &str) -> Result<String, PayloadError> {
    let payload = payload.trim();
    if !payload.starts_with(STATION_URL_PREFIX) {
        return Err(PayloadError::UnexpectedPrefix);
    }

    let url = Url::parse(payload).map_err(|_| PayloadError::UnexpectedPrefix)?;
    let station = url
        .query_pairs()
        .find(|(key, _)| key == STATION_PARAM)
        .map(|(_, value)| value.into_owned())
        .ok_or(PayloadError::MissingStation)?;

    if station.is_empty() || !station.chars().all(|c| c.is_ascii_digit()) {
        return Err(PayloadError::MissingStation);
    }
    Ok(station)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    PermissionDenied,
    NotFound,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    PermissionDenied,
    NoCamera,
    Timeout,
    Camera(String),
    InvalidPayload(PayloadError),
}

impl ScanError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ScanError::PermissionDenied => {
                "Camera access was denied. Allow camera access in your browser settings and try again."
            }
            ScanError::NoCamera => "No camera was found on this device.",
            ScanError::Timeout => "The camera took too long to start. Please try again.",
            ScanError::Camera(_) => "The camera could not be started. Please try again.",
            ScanError::InvalidPayload(PayloadError::UnexpectedPrefix) => {
                "This QR code does not belong to a Denizli smart stop."
            }
            ScanError::InvalidPayload(PayloadError::MissingStation) => {
                "This QR code does not contain a station number."
            }
        }
    }

    /// Payload errors can rescan with the stream that is already running.
    pub fn keeps_camera(&self) -> bool {
        matches!(self, ScanError::InvalidPayload(_))
    }
}

impl From<CameraError> for ScanError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::PermissionDenied => ScanError::PermissionDenied,
            CameraError::NotFound => ScanError::NoCamera,
            CameraError::Other(e) => ScanError::Camera(e),
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Camera(detail) => write!(f, "{} ({})", self.user_message(), detail),
            _ => write!(f, "{}", self.user_message()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Loading,
    Scanning,
    Success { station_id: String },
    Error(ScanError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// The scan dialog was opened
    Open,
    /// The video sink started playing the stream
    StreamStarted,
    CameraFailed(CameraError),
    /// The start timeout armed on acquisition expired
    TimedOut,
    /// A frame was sampled; `Some` when it contained a QR code
    Frame(Option<String>),
    Retry,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEffect {
    /// Ask for a camera, rear-facing first, any camera as fallback
    RequestCamera { prefer_rear: bool },
    ArmTimeout(Duration),
    CancelTimeout,
    StartFrameLoop,
    StopFrameLoop,
    /// Stop every track of the stream
    ReleaseCamera,
    StationFound(String),
    CloseDialog,
}

#[derive(Debug, Clone)]
pub struct QrScanner {
    state: ScanState,
    camera_held: bool,
}

impl Default for QrScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl QrScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::Idle,
            camera_held: false,
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn is_decoding(&self) -> bool {
        self.state == ScanState::Scanning
    }

    pub fn handle(&mut self, event: ScanEvent) -> Vec<ScanEffect> {
        match (self.state.clone(), event) {
            (_, ScanEvent::Close) => self.close(),

            (ScanState::Idle, ScanEvent::Open) => self.acquire(),

            (ScanState::Loading, ScanEvent::StreamStarted) => {
                self.state = ScanState::Scanning;
                vec![ScanEffect::CancelTimeout, ScanEffect::StartFrameLoop]
            }
            (ScanState::Loading, ScanEvent::CameraFailed(err)) => {
                self.state = ScanState::Error(err.into());
                let mut effects = vec![ScanEffect::CancelTimeout];
                effects.extend(self.release());
                effects
            }
            (ScanState::Loading, ScanEvent::TimedOut) => {
                self.state = ScanState::Error(ScanError::Timeout);
                self.release()
            }

            (ScanState::Scanning, ScanEvent::Frame(None)) => Vec::new(),
            (ScanState::Scanning, ScanEvent::Frame(Some(payload))) => {
                match extract_station_id(&payload) {
                    Ok(station_id) => {
                        self.state = ScanState::Success {
                            station_id: station_id.clone(),
                        };
                        let mut effects = vec![ScanEffect::StopFrameLoop];
                        effects.extend(self.release());
                        effects.push(ScanEffect::StationFound(station_id));
                        effects.push(ScanEffect::CloseDialog);
                        effects
                    }
                    Err(err) => {
                        self.state = ScanState::Error(ScanError::InvalidPayload(err));
                        vec![ScanEffect::StopFrameLoop]
                    }
                }
            }
            (ScanState::Scanning, ScanEvent::CameraFailed(err)) => {
                self.state = ScanState::Error(err.into());
                let mut effects = vec![ScanEffect::StopFrameLoop];
                effects.extend(self.release());
                effects
            }

            (ScanState::Error(err), ScanEvent::Retry) => {
                if err.keeps_camera() && self.camera_held {
                    self.state = ScanState::Scanning;
                    vec![ScanEffect::StartFrameLoop]
                } else {
                    let mut effects = self.release();
                    self.state = ScanState::Idle;
                    effects.extend(self.acquire());
                    effects
                }
            }

            // Late frames, timeouts or stream callbacks for a state we already left
            _ => Vec::new(),
        }
    }

    fn acquire(&mut self) -> Vec<ScanEffect> {
        self.state = ScanState::Loading;
        self.camera_held = true;
        vec![
            ScanEffect::RequestCamera { prefer_rear: true },
            ScanEffect::ArmTimeout(CAMERA_START_TIMEOUT),
        ]
    }

    fn release(&mut self) -> Vec<ScanEffect> {
        if std::mem::take(&mut self.camera_held) {
            vec![ScanEffect::ReleaseCamera]
        } else {
            Vec::new()
        }
    }

    fn close(&mut self) -> Vec<ScanEffect> {
        let mut effects = Vec::new();
        match self.state {
            ScanState::Loading => effects.push(ScanEffect::CancelTimeout),
            ScanState::Scanning => effects.push(ScanEffect::StopFrameLoop),
            _ => {}
        }
        effects.extend(self.release());
        self.state = ScanState::Idle;
        effects
    }
}
