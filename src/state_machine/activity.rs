// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tracing::info;

/// Suspend detection by idle ticks: a periodic timer calls [`tick`], bus
/// traffic calls [`record`]. After `threshold` consecutive ticks without
/// traffic the link is reported suspended; the next traffic resumes it.
///
/// [`tick`]: ActivityMonitor::tick
/// [`record`]: ActivityMonitor::record
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    threshold: u32,
    idle_ticks: u32,
    active: bool,
    suspended: bool,
}

impl ActivityMonitor {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            idle_ticks: 0,
            active: false,
            suspended: false,
        }
    }

    #[inline]
    pub fn record(&mut self) {
        self.active = true;
    }

    /// Advance one timer period. Returns whether the link is suspended.
    pub fn tick(&mut self) -> bool {
        if std::mem::take(&mut self.active) {
            self.idle_ticks = 0;
            if self.suspended {
                self.suspended = false;
                info!("bus activity resumed");
            }
        } else {
            self.idle_ticks = self.idle_ticks.saturating_add(1);
            if self.idle_ticks >= self.threshold && !self.suspended {
                self.suspended = true;
                info!(idle_ticks = self.idle_ticks, "bus idle, link suspended");
            }
        }
        self.suspended
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }
}
