use std::time::{Duration, Instant};

use eframe::egui::{Pos2, Vec2, ViewportCommand};

/// Window placement captured before going fullscreen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowBounds {
    pub position: Option<Pos2>,
    pub size: Vec2,
}

/// Where playback was when the window mode switched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSnapshot {
    pub position: Duration,
    pub was_playing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingResume {
    snapshot: PlaybackSnapshot,
    deadline: Instant,
}

#[derive(Debug, Default)]
pub struct FullscreenState {
    active: bool,
    saved_bounds: Option<WindowBounds>,
    pending_resume: Option<PendingResume>,
}

impl FullscreenState {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the viewport commands that switch modes. Playback should be
    /// paused by the caller; `due_resume` hands the snapshot back after `delay`.
    ///
    /// A toggle made while a resume is still pending keeps the earlier
    /// snapshot, since playback was already paused by the first switch.
    pub fn toggle(
        &mut self,
        bounds: Option<WindowBounds>,
        snapshot: PlaybackSnapshot,
        now: Instant,
        delay: Duration,
    ) -> Vec<ViewportCommand> {
        let snapshot = self
            .pending_resume
            .map_or(snapshot, |pending| pending.snapshot);
        self.pending_resume = Some(PendingResume {
            snapshot,
            deadline: now + delay,
        });

        if self.active {
            self.active = false;
            let mut commands = vec![
                ViewportCommand::Fullscreen(false),
                ViewportCommand::Decorations(true),
            ];
            if let Some(bounds) = self.saved_bounds.take() {
                commands.extend(restore_commands(bounds));
            }
            commands
        } else {
            self.active = true;
            self.saved_bounds = bounds;
            vec![
                ViewportCommand::Decorations(false),
                ViewportCommand::Fullscreen(true),
            ]
        }
    }

    #[cfg(test)]
    pub fn saved_bounds(&self) -> Option<WindowBounds> {
        self.saved_bounds
    }

    /// Time left until the pending resume fires.
    pub fn resume_in(&self, now: Instant) -> Option<Duration> {
        self.pending_resume
            .map(|pending| pending.deadline.saturating_duration_since(now))
    }

    pub fn due_resume(&mut self, now: Instant) -> Option<PlaybackSnapshot> {
        match self.pending_resume {
            Some(pending) if pending.deadline <= now => {
                self.pending_resume = None;
                Some(pending.snapshot)
            }
            _ => None,
        }
    }
}

pub fn restore_commands(bounds: WindowBounds) -> Vec<ViewportCommand> {
    let mut commands = Vec::with_capacity(2);
    if let Some(position) = bounds.position {
        commands.push(ViewportCommand::OuterPosition(position));
    }
    commands.push(ViewportCommand::InnerSize(bounds.size));
    commands
}
