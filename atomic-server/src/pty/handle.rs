//! PTY handle wrapper for portable-pty

use std::io::{Read, Write};
use std::sync::Arc;

use atomic_utils::{AtomicError, Result};
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use super::PtyConfig;

/// Handle to a running process and the master side of its PTY
pub struct PtyHandle {
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,
    /// Output from the child process
    reader: Arc<Mutex<Box<dyn Read + Send>>>,
    /// Input to the child process
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl PtyHandle {
    /// Open a PTY sized per `config` and start the command on its slave side
    pub fn spawn(config: &PtyConfig) -> Result<Self> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: config.size.1,
                cols: config.size.0,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| AtomicError::pty(format!("Failed to open PTY: {}", e)))?;

        let mut cmd = CommandBuilder::new(&config.command);
        cmd.args(&config.args);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| AtomicError::ProcessSpawn(format!("{}: {}", config.command, e)))?;
        // Reads only hit EOF once every slave fd is closed
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| AtomicError::pty(format!("Failed to clone reader: {}", e)))?;

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| AtomicError::pty(format!("Failed to get writer: {}", e)))?;

        Ok(Self {
            master: Arc::new(Mutex::new(pair.master)),
            child: Arc::new(Mutex::new(child)),
            reader: Arc::new(Mutex::new(reader)),
            writer: Arc::new(Mutex::new(writer)),
        })
    }

    /// Write all data to the PTY
    pub fn write_all(&self, data: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock();
        writer
            .write_all(data)
            .and_then(|_| writer.flush())
            .map_err(|e| AtomicError::pty(format!("Write failed: {}", e)))
    }

    /// Resize the PTY
    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let master = self.master.lock();
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| AtomicError::pty(format!("Resize failed: {}", e)))
    }

    /// Exit code if the child process has exited
    pub fn try_wait(&self) -> Result<Option<i32>> {
        let mut child = self.child.lock();
        match child.try_wait() {
            Ok(Some(status)) => Ok(Some(status.exit_code() as i32)),
            Ok(None) => Ok(None),
            Err(e) => Err(AtomicError::pty(format!("Wait failed: {}", e))),
        }
    }

    /// Kill the child process
    pub fn kill(&self) -> Result<()> {
        let mut child = self.child.lock();
        child
            .kill()
            .map_err(|e| AtomicError::pty(format!("Kill failed: {}", e)))
    }

    /// Shared reader for a relay thread
    pub fn clone_reader(&self) -> Arc<Mutex<Box<dyn Read + Send>>> {
        self.reader.clone()
    }
}

impl std::fmt::Debug for PtyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyHandle").finish_non_exhaustive()
    }
}
