//! X11 focus backend.
//!
//! A dedicated thread blocks on the X connection, reacts to
//! `_NET_ACTIVE_WINDOW` property changes on the root window and forwards
//! focus events to the async side over a channel.

use std::thread;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::xproto::AtomEnum;
use x11rb::protocol::xproto::ChangeWindowAttributesAux;
use x11rb::protocol::xproto::ConnectionExt;
use x11rb::protocol::xproto::EventMask;
use x11rb::protocol::xproto::Window;
use x11rb::rust_connection::RustConnection;

use super::FocusError;
use super::FocusEvent;
use super::FocusSource;

/// `PointerRoot` focus value; not a real client window.
const POINTER_ROOT: Window = 1;

x11rb::atom_manager! {
    Atoms: AtomsCookie {
        _NET_ACTIVE_WINDOW,
        _NET_WM_NAME,
        UTF8_STRING,
    }
}

/// X11 focus source implementation.
pub struct X11Source {
    events: mpsc::UnboundedReceiver<FocusEvent>,
}

impl X11Source {
    /// Connect to `$DISPLAY` and start the watcher thread.
    pub fn connect() -> Result<Self, FocusError> {
        let watcher = X11Watcher::connect()?;
        let (tx, rx) = mpsc::unbounded_channel();

        thread::Builder::new()
            .name("x11-focus".to_string())
            .spawn(move || watcher.run(&tx))
            .map_err(|e| FocusError::ConnectionFailed(e.to_string()))?;

        info!("Connected to X11 display");
        Ok(Self { events: rx })
    }
}

#[async_trait]
impl FocusSource for X11Source {
    async fn next_event(&mut self) -> Result<FocusEvent, FocusError> {
        self.events.recv().await.ok_or(FocusError::Disconnected)
    }
}

/// Blocking half that owns the X connection.
struct X11Watcher {
    conn: RustConnection,
    root: Window,
    atoms: Atoms,
}

impl X11Watcher {
    fn connect() -> Result<Self, FocusError> {
        let failed = |e: &dyn std::fmt::Display| FocusError::ConnectionFailed(e.to_string());

        let (conn, screen_num) = x11rb::connect(None).map_err(|e| failed(&e))?;
        let root = conn.setup().roots[screen_num].root;
        let atoms = Atoms::new(&conn)
            .map_err(|e| failed(&e))?
            .reply()
            .map_err(|e| failed(&e))?;

        let attrs = ChangeWindowAttributesAux::new().event_mask(EventMask::PROPERTY_CHANGE);
        conn.change_window_attributes(root, &attrs)
            .map_err(|e| failed(&e))?;
        conn.flush().map_err(|e| failed(&e))?;

        Ok(Self { conn, root, atoms })
    }

    /// Forward focus changes until the connection or the receiver goes away.
    fn run(self, tx: &mpsc::UnboundedSender<FocusEvent>) {
        // Report whatever is focused at startup.
        if let Some(event) = self.focused_event()
            && tx.send(event).is_err()
        {
            return;
        }

        loop {
            let event = match self.conn.wait_for_event() {
                Ok(event) => event,
                Err(e) => {
                    warn!("X11 connection error: {}", e);
                    return;
                }
            };

            let Event::PropertyNotify(notify) = event else {
                continue;
            };
            if notify.atom != self.atoms._NET_ACTIVE_WINDOW {
                continue;
            }

            if let Some(focus) = self.focused_event() {
                trace!("X11 focus: {:?}", focus);
                if tx.send(focus).is_err() {
                    debug!("Focus receiver dropped; stopping X11 watcher");
                    return;
                }
            }
        }
    }

    fn focused_window(&self) -> Option<Window> {
        query_with_retry(|| self.active_window())
    }

    fn focused_event(&self) -> Option<FocusEvent> {
        let window = self.focused_window()?;
        let (name, class) = self.wm_class(window);
        let event = FocusEvent::new(class, name, self.title(window));

        if event.is_empty() {
            debug!("Window 0x{:x} exposes no class, name or title", window);
            return None;
        }
        Some(event)
    }

    fn active_window(&self) -> Option<Window> {
        let reply = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms._NET_ACTIVE_WINDOW,
                AtomEnum::WINDOW,
                0,
                1,
            )
            .ok()?
            .reply()
            .ok()?;

        let window = reply.value32()?.next()?;
        is_client_window(window).then_some(window)
    }

    /// `(instance, class)` from `WM_CLASS`.
    fn wm_class(&self, window: Window) -> (Option<String>, Option<String>) {
        self.conn
            .get_property(false, window, AtomEnum::WM_CLASS, AtomEnum::STRING, 0, 1024)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .map(|reply| split_wm_class(&reply.value))
            .unwrap_or_default()
    }

    /// `_NET_WM_NAME` (UTF-8), falling back to `WM_NAME`.
    fn title(&self, window: Window) -> Option<String> {
        let utf8 = self
            .conn
            .get_property(
                false,
                window,
                self.atoms._NET_WM_NAME,
                self.atoms.UTF8_STRING,
                0,
                u32::MAX,
            )
            .ok()?
            .reply()
            .ok()?;

        if utf8.type_ != x11rb::NONE {
            return Some(String::from_utf8_lossy(&utf8.value).into_owned());
        }

        let legacy = self
            .conn
            .get_property(false, window, AtomEnum::WM_NAME, AtomEnum::STRING, 0, u32::MAX)
            .ok()?
            .reply()
            .ok()?;
        Some(String::from_utf8_lossy(&legacy.value).into_owned())
    }
}

/// Run `query` again once if the server momentarily reports no client window.
fn query_with_retry(mut query: impl FnMut() -> Option<Window>) -> Option<Window> {
    query().or_else(|| {
        debug!("No valid active window; querying again");
        query()
    })
}

fn is_client_window(window: Window) -> bool {
    window != x11rb::NONE && window != POINTER_ROOT
}

/// `WM_CLASS` is `instance\0class\0`.
fn split_wm_class(raw: &[u8]) -> (Option<String>, Option<String>) {
    let mut parts = raw
        .split(|&b| b == 0)
        .map(|part| String::from_utf8_lossy(part).into_owned());

    let instance = parts.next().filter(|s| !s.is_empty());
    let class = parts.next().filter(|s| !s.is_empty());
    (instance, class)
}
