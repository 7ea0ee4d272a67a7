use crate::history::entry::MAX_LEVEL;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

/// Pull side of the battery telemetry contract.
///
/// The push side (change notifications) reaches the recorder as
/// [`RecordingTrigger::LevelChanged`](crate::history::RecordingTrigger) events.
pub trait BatterySource: Send + Sync {
    /// Current state of charge, 0..=100.
    fn current_level(&self) -> u8;
}

/// Reads the kernel's power-supply `capacity` attribute.
///
/// Keeps the last good reading and returns it when the file cannot be read
/// or parsed, so callers always get a level.
pub struct SysfsBatterySource {
    path: PathBuf,
    last_level: AtomicU8,
}

impl SysfsBatterySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_level: AtomicU8::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BatterySource for SysfsBatterySource {
    fn current_level(&self) -> u8 {
        match read_capacity(&self.path) {
            Some(level) => {
                self.last_level.store(level, Ordering::Relaxed);
                level
            }
            None => {
                let last = self.last_level.load(Ordering::Relaxed);
                tracing::warn!(
                    "unreadable battery capacity at {}, reusing {last}%",
                    self.path.display()
                );
                last
            }
        }
    }
}

fn read_capacity(path: &Path) -> Option<u8> {
    let content = std::fs::read_to_string(path).ok()?;
    let value: u32 = content.trim().parse().ok()?;
    Some(value.min(u32::from(MAX_LEVEL)) as u8)
}

/// Source pinned to a settable level, for hosts without a battery.
#[derive(Debug)]
pub struct FixedBatterySource(AtomicU8);

impl FixedBatterySource {
    pub fn new(level: u8) -> Self {
        Self(AtomicU8::new(level.min(MAX_LEVEL)))
    }

    pub fn set(&self, level: u8) {
        self.0.store(level.min(MAX_LEVEL), Ordering::SeqCst);
    }
}

impl BatterySource for FixedBatterySource {
    fn current_level(&self) -> u8 {
        self.0.load(Ordering::SeqCst)
    }
}
