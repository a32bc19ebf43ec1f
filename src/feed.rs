use std::time::{Duration, Instant};

use crate::logging::debug_log;

pub const SWIPE_THRESHOLD_PX: f64 = 90.0;
pub const WHEEL_THRESHOLD: f64 = 60.0;
pub const NAV_COOLDOWN: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

/// Where a navigation request came from. Everything except `Button` is an
/// implicit gesture and goes through the shared cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavSource {
    Drag,
    Wheel,
    Key,
    Button,
}

impl NavSource {
    fn is_implicit(self) -> bool {
        !matches!(self, NavSource::Button)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureConfig {
    pub swipe_threshold_px: f64,
    pub wheel_threshold: f64,
    pub cooldown: Duration,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            swipe_threshold_px: SWIPE_THRESHOLD_PX,
            wheel_threshold: WHEEL_THRESHOLD,
            cooldown: NAV_COOLDOWN,
        }
    }
}

/// Active position in the main feed.
#[derive(Debug, Clone)]
pub struct FeedNavigator {
    index: usize,
    len: usize,
    gestures: GestureConfig,
    cooldown_until: Option<Instant>,
    drag_start: Option<f64>,
}

impl FeedNavigator {
    pub fn new(len: usize, gestures: GestureConfig) -> Self {
        Self {
            index: 0,
            len,
            gestures,
            cooldown_until: None,
            drag_start: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn at_start(&self) -> bool {
        self.index == 0
    }

    pub fn at_end(&self) -> bool {
        self.index + 1 >= self.len
    }

    pub fn prev(&mut self) -> bool {
        let target = self.index.saturating_sub(1);
        self.set_index(target)
    }

    pub fn next(&mut self) -> bool {
        let target = (self.index + 1).min(self.len.saturating_sub(1));
        self.set_index(target)
    }

    /// Jumps straight to `index` (dot selector). Out-of-range targets are
    /// ignored.
    pub fn jump(&mut self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        self.set_index(index)
    }

    /// Arrow buttons: never subject to the cooldown.
    pub fn button(&mut self, direction: Direction) -> bool {
        self.navigate(direction, NavSource::Button, Instant::now())
    }

    pub fn navigate(&mut self, direction: Direction, source: NavSource, now: Instant) -> bool {
        if source.is_implicit() {
            if self.cooldown_until.is_some_and(|until| now < until) {
                debug_log(format!("feed: {source:?} {direction:?} ignored (cooldown)"));
                return false;
            }
            self.cooldown_until = Some(now + self.gestures.cooldown);
        }
        match direction {
            Direction::Prev => self.prev(),
            Direction::Next => self.next(),
        }
    }

    pub fn begin_drag(&mut self, y: f64) {
        self.drag_start = Some(y);
    }

    /// Finishes a vertical drag. Dragging up moves to the next item.
    pub fn end_drag(&mut self, y: f64, now: Instant) -> bool {
        let Some(start) = self.drag_start.take() else {
            return false;
        };
        let dy = y - start;
        if dy < -self.gestures.swipe_threshold_px {
            self.navigate(Direction::Next, NavSource::Drag, now)
        } else if dy > self.gestures.swipe_threshold_px {
            self.navigate(Direction::Prev, NavSource::Drag, now)
        } else {
            false
        }
    }

    pub fn cancel_drag(&mut self) {
        self.drag_start = None;
    }

    pub fn wheel(&mut self, delta_y: f64, now: Instant) -> bool {
        if delta_y > self.gestures.wheel_threshold {
            self.navigate(Direction::Next, NavSource::Wheel, now)
        } else if delta_y < -self.gestures.wheel_threshold {
            self.navigate(Direction::Prev, NavSource::Wheel, now)
        } else {
            false
        }
    }

    pub fn key(&mut self, direction: Direction, modal_open: bool, now: Instant) -> bool {
        if modal_open {
            return false;
        }
        self.navigate(direction, NavSource::Key, now)
    }

    fn set_index(&mut self, target: usize) -> bool {
        if self.len == 0 || target == self.index {
            return false;
        }
        debug_log(format!("feed: {} -> {}", self.index, target));
        self.index = target;
        true
    }
}
