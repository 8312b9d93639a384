//! Hyprland IPC socket2 focus backend.
//!
//! Reads `activewindow>>CLASS,TITLE` lines from Hyprland's event socket.

use std::env;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::net::UnixStream;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::FocusError;
use super::FocusEvent;
use super::FocusSource;

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Hyprland focus source implementation.
pub struct HyprlandSource {
    path: PathBuf,
    reader: Option<BufReader<UnixStream>>,
    backoff: Duration,
}

impl HyprlandSource {
    /// Connect to the running Hyprland instance.
    pub async fn connect() -> Result<Self, FocusError> {
        Self::open(socket2_path()?).await
    }

    async fn open(path: PathBuf) -> Result<Self, FocusError> {
        let stream = open_socket(&path).await?;
        info!("Connected to Hyprland socket2");

        Ok(Self {
            path,
            reader: Some(BufReader::new(stream)),
            backoff: INITIAL_BACKOFF,
        })
    }

    /// Reopen the socket after a disconnect.
    ///
    /// Retries with capped exponential backoff until the socket is back.
    async fn reconnect(&mut self) {
        warn!("Socket2 connection lost");

        loop {
            debug!("Reconnecting in {:?}", self.backoff);
            tokio::time::sleep(self.backoff).await;
            self.backoff = (self.backoff * 2).min(MAX_BACKOFF);

            match open_socket(&self.path).await {
                Ok(stream) => {
                    info!("Reconnected to Hyprland socket2");
                    self.reader = Some(BufReader::new(stream));
                    self.backoff = INITIAL_BACKOFF;
                    return;
                }
                Err(e) => warn!("Reconnect failed: {}", e),
            }
        }
    }
}

#[async_trait]
impl FocusSource for HyprlandSource {
    async fn next_event(&mut self) -> Result<FocusEvent, FocusError> {
        let mut line = String::new();

        loop {
            let Some(reader) = self.reader.as_mut() else {
                self.reconnect().await;
                continue;
            };

            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    warn!("Socket2 stream ended (EOF)");
                    self.reader = None;
                }
                Ok(_) => {
                    if let Some(event) = parse_active_window(&line) {
                        debug!(
                            "Focus changed: class={:?}, title={:?}",
                            event.window_class, event.window_title
                        );
                        return Ok(event);
                    }
                }
                Err(e) => {
                    warn!("Read error: {}", e);
                    self.reader = None;
                }
            }
        }
    }
}

async fn open_socket(path: &Path) -> Result<UnixStream, FocusError> {
    debug!("Connecting to Hyprland socket2: {}", path.display());
    UnixStream::connect(path)
        .await
        .map_err(|e| FocusError::ConnectionFailed(format!("{}: {}", path.display(), e)))
}

/// `$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/.socket2.sock`
fn socket2_path() -> Result<PathBuf, FocusError> {
    let runtime_dir = env::var("XDG_RUNTIME_DIR")
        .map_err(|_| FocusError::EnvVarNotSet("XDG_RUNTIME_DIR".to_string()))?;
    let signature = env::var("HYPRLAND_INSTANCE_SIGNATURE")
        .map_err(|_| FocusError::EnvVarNotSet("HYPRLAND_INSTANCE_SIGNATURE".to_string()))?;

    let path = PathBuf::from(runtime_dir)
        .join("hypr")
        .join(signature)
        .join(".socket2.sock");

    if path.exists() {
        Ok(path)
    } else {
        Err(FocusError::SocketNotFound(path.display().to_string()))
    }
}

/// Turn one socket2 line into a focus event.
///
/// Only `activewindow` carries class and title; every other event, and an
/// empty class (focus moved to an empty workspace), yields `None`.
fn parse_active_window(line: &str) -> Option<FocusEvent> {
    let line = line.trim_end();
    let Some(data) = line.strip_prefix("activewindow>>") else {
        trace!("Ignoring line: {}", line);
        return None;
    };

    // Titles may contain commas; the class never does.
    let (class, title) = data.split_once(',').unwrap_or((data, ""));
    if class.is_empty() {
        return None;
    }

    Some(FocusEvent::new(
        Some(class.to_string()),
        None,
        Some(title.to_string()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixListener;
    use tokio::time::Instant;

    #[test]
    fn test_parse_class_and_title() {
        let event = parse_active_window("activewindow>>steam_app_250900,Isaac\n").unwrap();
        assert_eq!(event.window_class.as_deref(), Some("steam_app_250900"));
        assert_eq!(event.window_name, None);
        assert_eq!(event.window_title.as_deref(), Some("Isaac"));
    }

    #[test]
    fn test_parse_comma_in_title() {
        let event =
            parse_active_window("activewindow>>code,main.rs - profile-focusd, Editor").unwrap();
        assert_eq!(event.window_class.as_deref(), Some("code"));
        assert_eq!(
            event.window_title.as_deref(),
            Some("main.rs - profile-focusd, Editor")
        );
    }

    #[test]
    fn test_parse_without_title() {
        let event = parse_active_window("activewindow>>kitty,").unwrap();
        assert_eq!(event.window_class.as_deref(), Some("kitty"));
        assert_eq!(event.window_title, None);

        let event = parse_active_window("activewindow>>dmenu").unwrap();
        assert_eq!(event.window_class.as_deref(), Some("dmenu"));
    }

    #[test]
    fn test_empty_class_is_no_focus() {
        assert!(parse_active_window("activewindow>>,").is_none());
    }

    #[test]
    fn test_other_lines_ignored() {
        assert!(parse_active_window("activewindowv2>>0x55a1b2c3d4e5").is_none());
        assert!(parse_active_window("workspace>>1").is_none());
        assert!(parse_active_window("garbage").is_none());
        assert!(parse_active_window("").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_reconnecting_until_socket_returns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".socket2.sock");

        let listener = UnixListener::bind(&path).unwrap();
        let mut source = HyprlandSource::open(path.clone()).await.unwrap();

        // Compositor goes away: connection closed and socket file removed.
        let (server, _) = listener.accept().await.unwrap();
        drop(server);
        drop(listener);
        std::fs::remove_file(&path).unwrap();

        let start = Instant::now();
        let compositor = tokio::spawn({
            let path = path.clone();
            async move {
                // Missed by the 250ms, 750ms and 1.75s attempts.
                tokio::time::sleep(Duration::from_secs(2)).await;
                let listener = UnixListener::bind(&path).unwrap();
                let (mut stream, _) = listener.accept().await.unwrap();
                stream
                    .write_all(b"workspace>>2\nactivewindow>>kitty,shell\n")
                    .await
                    .unwrap();
                stream
            }
        });

        let event = source.next_event().await.unwrap();
        assert_eq!(event.window_class.as_deref(), Some("kitty"));
        assert_eq!(event.window_title.as_deref(), Some("shell"));
        assert!(start.elapsed() >= Duration::from_secs(2));

        // Backoff resets once the socket is back.
        assert_eq!(source.backoff, INITIAL_BACKOFF);
        drop(compositor.await.unwrap());
    }
}
