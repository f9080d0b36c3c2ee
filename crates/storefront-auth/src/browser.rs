//! Opening the authorization page in the user's browser

use std::io;
use std::process::{Command, Stdio};

/// Opens a URL without waiting for the browser.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> io::Result<()>;
}

/// Hands the URL to the platform opener (`xdg-open`, `open`, `rundll32`).
///
/// On platforms without a known opener this is a no-op; the flow logs the
/// URL either way.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        let Some(mut command) = opener(url) else {
            return Ok(());
        };
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
    }
}

fn opener(url: &str) -> Option<Command> {
    let mut command = if cfg!(target_os = "linux") {
        Command::new("xdg-open")
    } else if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut command = Command::new("rundll32");
        command.arg("url.dll,FileProtocolHandler");
        command
    } else {
        return None;
    };
    command.arg(url);
    Some(command)
}
