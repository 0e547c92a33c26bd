//! Wall-clock job scheduling for the delivery loop.
//!
//! A job with period `every` minutes is due when the minutes elapsed since
//! local midnight is a multiple of `every`. Each job remembers the minute
//! it last fired, so it fires at most once per matching minute no matter
//! how many ticks fall inside it.

use chrono::{NaiveDateTime, Timelike};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    /// Ingestion pass
    Scrape,
    /// Release cycle
    Publish,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    /// Minutes since the Unix epoch at which each job last fired
    last_fired: HashMap<Job, i64>,
}

fn minutes_since_midnight(now: NaiveDateTime) -> u32 {
    now.hour() * 60 + now.minute()
}

fn epoch_minute(now: NaiveDateTime) -> i64 {
    now.and_utc().timestamp().div_euclid(60)
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `job` should fire at `now`.
    pub fn due(&self, job: Job, now: NaiveDateTime, every: u32) -> bool {
        if every == 0 || minutes_since_midnight(now) % every != 0 {
            return false;
        }
        self.last_fired.get(&job) != Some(&epoch_minute(now))
    }

    /// Record that `job` fired at `now`.
    pub fn fire(&mut self, job: Job, now: NaiveDateTime) {
        self.last_fired.insert(job, epoch_minute(now));
    }

    /// Fire `job` if it is due, returning whether it fired.
    pub fn try_fire(&mut self, job: Job, now: NaiveDateTime, every: u32) -> bool {
        let due = self.due(job, now, every);
        if due {
            self.fire(job, now);
        }
        due
    }
}
