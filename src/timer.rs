use crate::pool::Pool;

/// Marker for a connection with no running timer.
pub const TIMER_HANDLE_INVALID: u32 = u32::MAX;

const WHEEL_SLOTS: u64 = 512;
const TICK_SECS: f64 = 1.0;

#[derive(Debug)]
struct Entry {
    conn_handle: u32,
    target_tick: u64,
}

/// Coarse single-level timer wheel with one-second ticks, one per worker.
///
/// `expire` only reports which packed connection handles fired; the
/// engine runs the two-phase invalidate/timeout pass over them, since a
/// connection may have been freed (and its slot recycled) between the
/// wheel firing and the callback running.
#[derive(Debug)]
pub struct TimerWheel {
    timers: Pool<Entry>,
    slots: Vec<Vec<u32>>,
    current_tick: u64,
    last_run: f64,
}

impl TimerWheel {
    pub fn new(now: f64) -> Self {
        Self {
            timers: Pool::new(),
            slots: (0..WHEEL_SLOTS).map(|_| Vec::new()).collect(),
            current_tick: 0,
            last_run: now,
        }
    }

    fn schedule(&mut self, timer: u32, target_tick: u64) {
        self.slots[(target_tick % WHEEL_SLOTS) as usize].push(timer);
    }

    /// Arms a timer for `conn_handle`, returns its handle.
    pub fn start(&mut self, conn_handle: u32, interval_secs: u32) -> u32 {
        let target_tick = self.current_tick + u64::from(interval_secs.max(1));
        let timer = self.timers.alloc(Entry {
            conn_handle,
            target_tick,
        });
        self.schedule(timer, target_tick);
        timer
    }

    pub fn stop(&mut self, timer: u32) {
        self.timers.free(timer);
    }

    /// Pushes the expiry out to `interval_secs` from now. Rescheduling is
    /// lazy: the stale slot entry is moved when its tick comes up.
    pub fn update(&mut self, timer: u32, interval_secs: u32) {
        let target_tick = self.current_tick + u64::from(interval_secs.max(1));
        if let Some(entry) = self.timers.get_mut(timer) {
            entry.target_tick = target_tick;
        }
    }

    /// Advances the wheel to `now`, returns the connection handles of all
    /// timers that expired.
    pub fn expire(&mut self, now: f64) -> Vec<u32> {
        let mut fired = Vec::new();
        while self.last_run + TICK_SECS <= now {
            self.last_run += TICK_SECS;
            self.current_tick += 1;
            let due = std::mem::take(&mut self.slots[(self.current_tick % WHEEL_SLOTS) as usize]);
            for timer in due {
                let target_tick = match self.timers.get(timer) {
                    Some(entry) => entry.target_tick,
                    None => continue, // stopped since scheduling
                };
                if target_tick > self.current_tick {
                    self.schedule(timer, target_tick);
                } else if let Some(entry) = self.timers.free(timer) {
                    fired.push(entry.conn_handle);
                }
            }
        }
        fired
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fires_after_interval() {
        let mut wheel = TimerWheel::new(0.0);
        wheel.start(7, 3);
        assert!(wheel.expire(2.5).is_empty());
        assert_eq!(wheel.expire(3.5), vec![7]);
        assert!(wheel.expire(10.0).is_empty());
    }

    #[test]
    fn stop_prevents_firing() {
        let mut wheel = TimerWheel::new(0.0);
        let t = wheel.start(7, 2);
        wheel.stop(t);
        assert!(wheel.expire(5.0).is_empty());
    }

    #[test]
    fn update_pushes_expiry_out() {
        let mut wheel = TimerWheel::new(0.0);
        let t = wheel.start(7, 2);
        assert!(wheel.expire(1.5).is_empty());
        wheel.update(t, 4);
        // the original tick comes and goes without firing
        assert!(wheel.expire(3.0).is_empty());
        assert_eq!(wheel.expire(5.5), vec![7]);
    }

    #[test]
    fn interval_longer_than_wheel() {
        let mut wheel = TimerWheel::new(0.0);
        wheel.start(9, (WHEEL_SLOTS + 5) as u32);
        assert!(wheel.expire(WHEEL_SLOTS as f64).is_empty());
        assert_eq!(wheel.expire((WHEEL_SLOTS + 6) as f64), vec![9]);
    }
}
