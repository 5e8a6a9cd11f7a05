// Time source and id generation

use chrono::{DateTime, Duration, Local, NaiveDate, SubsecRound, TimeZone, Utc};
use std::cell::Cell;
use std::rc::Rc;
use uuid::Uuid;

/// Source of "now" and of the calendar day a timestamp falls on
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// The calendar day `at` falls on for the user
    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate;

    fn today(&self) -> NaiveDate {
        self.local_date(self.now())
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        (**self).local_date(at)
    }
}

/// Wall clock in the machine's local timezone, at millisecond precision
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&Local).date_naive()
    }
}

/// Settable clock that reads days in UTC, for tests and replays
#[derive(Debug)]
pub struct FixedClock {
    now: Cell<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Cell::new(now) }
    }

    /// Clock set to `hour`:00 UTC on the given day
    pub fn on(date: NaiveDate, hour: u32) -> Self {
        let naive = date.and_hms_opt(hour, 0, 0).unwrap_or_default();
        Self::new(Utc.from_utc_datetime(&naive))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.date_naive()
    }
}

/// Current timestamp in milliseconds since the epoch
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

const ID_SUFFIX_LEN: u32 = 9;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a record id: `{epoch_ms}-{9 base36 chars}`
pub fn generate_id() -> String {
    generate_id_at(now_ms())
}

pub fn generate_id_at(timestamp_ms: i64) -> String {
    // rand_b of a v7 uuid: the low 62 bits are random
    let random = (Uuid::now_v7().as_u128() as u64) & ((1u64 << 62) - 1);
    let mut n = random % 36u64.pow(ID_SUFFIX_LEN);

    let mut suffix = [b'0'; ID_SUFFIX_LEN as usize];
    for slot in suffix.iter_mut().rev() {
        *slot = BASE36[(n % 36) as usize];
        n /= 36;
    }

    format!("{}-{}", timestamp_ms, String::from_utf8_lossy(&suffix))
}
