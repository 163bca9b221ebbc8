//! Control channels driven by an active gesture.

use log::{debug, info};

use crate::config::{Bindings, Channel, ControlSettings};
use crate::error::Result;
use crate::gestures::GestureType;

/// A level in `[0, 1]` that a gesture adjusts: output volume, display brightness.
pub trait ControlSink {
    fn level(&self) -> Result<f32>;
    /// Sets the level, clipping to `[0, 1]`; returns what was applied.
    fn set_level(&mut self, level: f32) -> Result<f32>;
}

/// Keeps the level in memory. Stands in for OS mixer/backlight backends.
#[derive(Debug, Clone)]
pub struct MemorySink {
    name: &'static str,
    level: f32,
}

impl MemorySink {
    pub fn new(name: &'static str, level: f32) -> Self {
        Self {
            name,
            level: level.clamp(0.0, 1.0),
        }
    }
}

impl ControlSink for MemorySink {
    fn level(&self) -> Result<f32> {
        Ok(self.level)
    }

    fn set_level(&mut self, level: f32) -> Result<f32> {
        let level = level.clamp(0.0, 1.0);
        if level != self.level {
            debug!("{}: {:.3} -> {:.3}", self.name, self.level, level);
        }
        self.level = level;
        Ok(level)
    }
}

#[derive(Debug, Clone, Copy)]
struct Session {
    channel: Channel,
    start_level: f32,
}

/// Maps the active gesture onto its bound channel: the level captured when the
/// gesture began, plus the scaled gesture delta.
pub struct Controls {
    bindings: Bindings,
    settings: ControlSettings,
    volume: Box<dyn ControlSink>,
    brightness: Box<dyn ControlSink>,
    session: Option<Session>,
}

impl Controls {
    pub fn new(
        bindings: Bindings,
        settings: ControlSettings,
        volume: Box<dyn ControlSink>,
        brightness: Box<dyn ControlSink>,
    ) -> Self {
        Self {
            bindings,
            settings,
            volume,
            brightness,
            session: None,
        }
    }

    /// In-memory channels seeded from the profile's initial levels.
    pub fn in_memory(bindings: Bindings, settings: ControlSettings) -> Self {
        let volume = MemorySink::new("volume", settings.initial_volume);
        let brightness = MemorySink::new("brightness", settings.initial_brightness);
        Self::new(bindings, settings, Box::new(volume), Box::new(brightness))
    }

    pub fn channel_for(&self, gesture: GestureType) -> Channel {
        match gesture {
            GestureType::None => Channel::None,
            GestureType::Two => self.bindings.two_finger,
            GestureType::Three => self.bindings.three_finger,
        }
    }

    pub fn begin(&mut self, gesture: GestureType) -> Result<()> {
        let channel = self.channel_for(gesture);
        let session = match self.sink(channel) {
            Some(sink) => {
                let start_level = sink.level()?;
                info!("{channel:?} control engaged at {start_level:.3}");
                Some(Session {
                    channel,
                    start_level,
                })
            }
            None => None,
        };
        self.session = session;
        Ok(())
    }

    /// Returns the applied level, if a channel is engaged.
    pub fn apply(&mut self, delta: f32) -> Result<Option<f32>> {
        let Some(session) = self.session else {
            return Ok(None);
        };
        let scale = match session.channel {
            Channel::Volume => self.settings.volume_scale,
            Channel::Brightness => self.settings.brightness_scale,
            Channel::None => return Ok(None),
        };
        let target = session.start_level + delta * scale;
        match self.sink(session.channel) {
            Some(sink) => Ok(Some(sink.set_level(target)?)),
            None => Ok(None),
        }
    }

    pub fn end(&mut self) {
        if let Some(s) = self.session.take() {
            info!("{:?} control released", s.channel);
        }
    }

    pub fn volume(&self) -> Result<f32> {
        self.volume.level()
    }

    pub fn brightness(&self) -> Result<f32> {
        self.brightness.level()
    }

    fn sink(&mut self, channel: Channel) -> Option<&mut Box<dyn ControlSink>> {
        match channel {
            Channel::Volume => Some(&mut self.volume),
            Channel::Brightness => Some(&mut self.brightness),
            Channel::None => None,
        }
    }
}
