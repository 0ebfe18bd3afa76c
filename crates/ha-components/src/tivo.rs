//! TiVo DVR media player
//!
//! Controls TiVo DVRs over the TiVo TCP Remote Protocol. Commands are
//! carriage-return terminated text lines:
//!
//! - `IRCODE <KEY>` - press a remote key
//! - `SETCH <n>` - tune to a channel
//! - `TELEPORT <SCREEN>` - jump to a screen
//!
//! The DVR reports the tuned channel with `CH_STATUS <channel> <reason>`
//! when a connection opens and after every channel change.

use std::collections::HashSet;
use std::time::Duration;

use ha_config::TivoPlatformConfig;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, trace, warn};

/// Default TCP remote port
pub const DEFAULT_PORT: u16 = 31339;

/// Default device name
pub const DEFAULT_NAME: &str = "TiVo Remote";

/// Default socket timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// How often devices are polled
pub const SCAN_INTERVAL: Duration = Duration::from_secs(10);

pub const SCREEN_LIVETV: &str = "LIVETV";
pub const SCREEN_GUIDE: &str = "GUIDE";
pub const SCREEN_TIVO: &str = "TIVO";
pub const SCREEN_NOWPLAYING: &str = "NOWPLAYING";

/// Screens offered as media player sources
pub const SOURCE_LIST: [&str; 4] = [SCREEN_LIVETV, SCREEN_GUIDE, SCREEN_TIVO, SCREEN_NOWPLAYING];

/// TiVo remote errors
#[derive(Debug, Error)]
pub enum TivoError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out talking to {0}")]
    Timeout(String),

    #[error("connection closed by {0}")]
    Closed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel change failed: {0}")]
    ChannelFailed(String),

    #[error("unknown source: {0}")]
    UnknownSource(String),
}

pub type TivoResult<T> = Result<T, TivoError>;

/// Client for the TCP Remote Protocol
///
/// Connects lazily and reconnects on the next command after the
/// connection drops.
pub struct TivoRemote {
    addr: String,
    timeout: Duration,
    stream: Option<BufReader<TcpStream>>,
    /// Bytes of a status line not yet terminated
    pending: Vec<u8>,
    channel: Option<String>,
    screen: Option<String>,
}

impl TivoRemote {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            timeout,
            stream: None,
            pending: Vec::new(),
            channel: None,
            screen: None,
        }
    }

    /// `host:port` of the DVR
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Last channel reported by the DVR
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Last screen teleported to
    pub fn screen(&self) -> Option<&str> {
        self.screen.as_deref()
    }

    async fn connect(&mut self) -> TivoResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| TivoError::Timeout(self.addr.clone()))?
            .map_err(|e| TivoError::Connect {
                addr: self.addr.clone(),
                source: e,
            })?;

        debug!("Connected to TiVo at {}", self.addr);
        self.stream = Some(BufReader::new(stream));
        self.pending.clear();
        Ok(())
    }

    fn disconnect(&mut self) {
        self.stream = None;
        self.pending.clear();
    }

    /// Read one status line, `None` when nothing arrives within the timeout
    async fn read_line(&mut self) -> TivoResult<Option<String>> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TivoError::Closed(self.addr.clone()));
        };

        let read = timeout(self.timeout, stream.read_until(b'\r', &mut self.pending)).await;
        match read {
            Err(_) => Ok(None),
            Ok(Ok(0)) => {
                self.disconnect();
                Err(TivoError::Closed(self.addr.clone()))
            }
            Ok(Ok(_)) => {
                let line = String::from_utf8_lossy(&self.pending).trim().to_string();
                self.pending.clear();
                trace!("TiVo {} sent: {}", self.addr, line);
                Ok(Some(line))
            }
            Ok(Err(e)) => {
                self.disconnect();
                Err(e.into())
            }
        }
    }

    fn handle_status(&mut self, line: &str) -> TivoResult<()> {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("CH_STATUS") => {
                if let Some(channel) = parts.next() {
                    self.channel = Some(channel.to_string());
                }
                Ok(())
            }
            Some("CH_FAILED") => Err(TivoError::ChannelFailed(
                parts.next().unwrap_or("UNKNOWN").to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Process any status lines the DVR has sent
    ///
    /// Connects if needed. Fails when the DVR is unreachable or has closed
    /// the connection.
    pub async fn refresh(&mut self) -> TivoResult<Option<String>> {
        self.connect().await?;
        while let Some(line) = self.read_line().await? {
            // A stale CH_FAILED is not an error for a status poll
            if let Err(e) = self.handle_status(&line) {
                debug!("TiVo {}: {}", self.addr, e);
            }
        }
        Ok(self.channel.clone())
    }

    async fn send(&mut self, command: &str) -> TivoResult<()> {
        self.connect().await?;
        let addr = self.addr.clone();
        let Some(stream) = self.stream.as_mut() else {
            return Err(TivoError::Closed(addr));
        };

        let line = format!("{}\r", command);
        let write = timeout(self.timeout, stream.get_mut().write_all(line.as_bytes())).await;
        let result = match write {
            Err(_) => Err(TivoError::Timeout(addr)),
            Ok(result) => result.map_err(TivoError::from),
        };

        if result.is_err() {
            self.disconnect();
        } else {
            debug!("Sent to TiVo {}: {}", self.addr, command);
        }
        result
    }

    /// Press a remote key
    pub async fn send_key(&mut self, key: &str) -> TivoResult<()> {
        self.send(&format!("IRCODE {}", key.to_uppercase())).await
    }

    /// Tune to a channel and wait for the DVR to confirm
    ///
    /// Status lines already queued, such as the greeting of a fresh
    /// connection, are consumed first so only the reply to `SETCH` counts.
    pub async fn set_channel(&mut self, channel: u32) -> TivoResult<()> {
        self.refresh().await?;
        self.send(&format!("SETCH {}", channel)).await?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let Some(line) = self.read_line().await? else {
                return Err(TivoError::Timeout(self.addr.clone()));
            };
            if line.starts_with("CH_STATUS") || line.starts_with("CH_FAILED") {
                return self.handle_status(&line);
            }
            if Instant::now() >= deadline {
                return Err(TivoError::Timeout(self.addr.clone()));
            }
        }
    }

    /// Jump to one of the [`SOURCE_LIST`] screens
    pub async fn teleport(&mut self, screen: &str) -> TivoResult<()> {
        let screen = screen.to_uppercase();
        if !SOURCE_LIST.contains(&screen.as_str()) {
            return Err(TivoError::UnknownSource(screen));
        }
        self.send(&format!("TELEPORT {}", screen)).await?;
        self.screen = Some(screen);
        Ok(())
    }
}

/// Media player power state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    On,
    Off,
    Unknown,
}

/// A TiVo DVR as a media player
pub struct TivoDevice {
    name: String,
    mac: Option<String>,
    remote: TivoRemote,
    state: PlayerState,
    muted: bool,
    playing: bool,
}

impl TivoDevice {
    pub fn new(config: &TivoPlatformConfig) -> Self {
        Self {
            name: config.name.clone(),
            mac: config.mac.clone(),
            remote: TivoRemote::new(&config.host, config.port, config.timeout()),
            state: PlayerState::Unknown,
            muted: false,
            playing: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mac(&self) -> Option<&str> {
        self.mac.as_deref()
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Channel currently tuned
    pub fn media_channel(&self) -> Option<&str> {
        self.remote.channel()
    }

    pub fn is_volume_muted(&self) -> bool {
        self.muted
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Current source screen
    pub fn source(&self) -> Option<&str> {
        self.remote.screen()
    }

    pub fn source_list(&self) -> &'static [&'static str] {
        &SOURCE_LIST
    }

    /// Poll the DVR; unreachable DVRs are reported as off
    pub async fn update(&mut self) {
        match self.remote.refresh().await {
            Ok(_) => self.state = PlayerState::On,
            Err(e) => {
                if self.state != PlayerState::Off {
                    debug!("TiVo {} unavailable: {}", self.name, e);
                }
                self.state = PlayerState::Off;
            }
        }
    }

    async fn send_key(&mut self, key: &str) -> TivoResult<()> {
        let result = self.remote.send_key(key).await;
        self.update().await;
        result
    }

    pub async fn volume_up(&mut self) -> TivoResult<()> {
        self.send_key("VOLUMEUP").await
    }

    pub async fn volume_down(&mut self) -> TivoResult<()> {
        self.send_key("VOLUMEDOWN").await
    }

    /// MUTE toggles, so it is only sent when the state changes
    pub async fn mute_volume(&mut self, mute: bool) -> TivoResult<()> {
        if mute != self.muted {
            self.send_key("MUTE").await?;
            self.muted = mute;
        }
        Ok(())
    }

    pub async fn media_play(&mut self) -> TivoResult<()> {
        self.send_key("PLAY").await?;
        self.playing = true;
        Ok(())
    }

    pub async fn media_pause(&mut self) -> TivoResult<()> {
        self.send_key("PAUSE").await?;
        self.playing = false;
        Ok(())
    }

    pub async fn media_play_pause(&mut self) -> TivoResult<()> {
        if self.playing {
            self.media_pause().await
        } else {
            self.media_play().await
        }
    }

    /// Wake the DVR from standby
    pub async fn turn_on(&mut self) -> TivoResult<()> {
        self.send_key("STANDBY").await
    }

    /// STANDBY twice puts the DVR into standby
    pub async fn turn_off(&mut self) -> TivoResult<()> {
        self.send_key("STANDBY").await?;
        self.send_key("STANDBY").await
    }

    pub async fn select_source(&mut self, source: &str) -> TivoResult<()> {
        let result = self.remote.teleport(source).await;
        self.update().await;
        result
    }

    pub async fn set_channel(&mut self, channel: u32) -> TivoResult<()> {
        let result = self.remote.set_channel(channel).await;
        self.update().await;
        result
    }
}

/// DVR found by network discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TivoDiscovery {
    pub host: String,
    pub port: u16,
    /// mDNS host name, e.g. `tivo-living.local`
    pub hostname: String,
}

/// Creates devices and ignores DVRs that are already set up
#[derive(Default)]
pub struct TivoPlatform {
    known_devices: HashSet<String>,
}

impl TivoPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set up a DVR from `configuration.yaml`
    pub async fn setup(&mut self, config: &TivoPlatformConfig) -> Option<TivoDevice> {
        let key = resolve_host(&config.host, config.port).await;
        if !self.known_devices.insert(key) {
            info!("Ignoring duplicate TiVo DVR {}:{}", config.host, config.port);
            return None;
        }

        let mut device = TivoDevice::new(config);
        device.update().await;
        info!(
            "TiVo DVR '{}' found at {}:{}",
            device.name(),
            config.host,
            config.port
        );
        Some(device)
    }

    /// Set up a discovered DVR
    pub async fn setup_discovered(&mut self, discovery: &TivoDiscovery) -> Option<TivoDevice> {
        let label = discovery.hostname.split('.').next().unwrap_or_default();
        let config = TivoPlatformConfig {
            name: format!("TiVo {}", label),
            port: discovery.port,
            ..TivoPlatformConfig::new(discovery.host.clone())
        };
        self.setup(&config).await
    }

    /// Number of DVRs set up
    pub fn len(&self) -> usize {
        self.known_devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known_devices.is_empty()
    }
}

/// Set up every `tivo` entry of the `media_player` section
pub async fn setup_platform<'a>(
    platform: &mut TivoPlatform,
    configs: impl IntoIterator<Item = &'a TivoPlatformConfig>,
) -> Vec<TivoDevice> {
    let mut devices = Vec::new();
    for config in configs {
        if let Some(device) = platform.setup(config).await {
            devices.push(device);
        }
    }
    devices
}

/// Identity of a DVR: its resolved address, or the host name if it does not resolve
async fn resolve_host(host: &str, port: u16) -> String {
    match tokio::net::lookup_host((host, port)).await {
        Ok(mut addrs) => addrs
            .next()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| host.to_string()),
        Err(e) => {
            warn!("Could not resolve TiVo host {}: {}", host, e);
            host.to_string()
        }
    }
}

/// Poll devices every `interval` and log state changes
pub fn spawn_polling(mut devices: Vec<TivoDevice>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        loop {
            timer.tick().await;
            for device in devices.iter_mut() {
                let before = device.state();
                device.update().await;
                if device.state() != before {
                    info!("TiVo {} is now {:?}", device.name(), device.state());
                }
            }
        }
    })
}
