// Daily-task rollover: flag daily tasks left open on earlier days

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::models::Task;
use crate::record::keys;
use crate::schema::{Stored, date_field};
use crate::store::Store;

/// What a rollover run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rollover {
    /// Nothing recorded yet; today is now the last-checked day
    FirstRun { today: NaiveDate },
    /// Already ran today
    UpToDate,
    /// Days `since..today` were reconciled
    Reconciled {
        since: NaiveDate,
        today: NaiveDate,
        missed: Vec<String>,
    },
}

impl Rollover {
    pub fn missed(&self) -> &[String] {
        match self {
            Rollover::Reconciled { missed, .. } => missed,
            _ => &[],
        }
    }
}

impl Store {
    pub fn last_daily_check(&self) -> Option<NaiveDate> {
        let raw: String = self.read_value(keys::LAST_DAILY_CHECK)?;
        let parsed = date_field::parse(&raw);
        if parsed.is_none() {
            warn!(value = %raw, "Ignoring unreadable last daily check date");
        }
        parsed
    }

    pub fn set_last_daily_check(&mut self, date: NaiveDate) -> Result<(), StoreError> {
        let formatted = date.format(date_field::FORMAT).to_string();
        self.write_value(keys::LAST_DAILY_CHECK, &formatted)
    }

    /// Run once per start-up
    ///
    /// Every daily task that is not completed, not already flagged, and was
    /// created on a day from the last-checked day up to yesterday gets
    /// `missedDate` set to its creation day. The last-checked day then moves
    /// to today, so a second run on the same day changes nothing.
    pub fn run_daily_rollover(&mut self) -> Result<Rollover, StoreError> {
        let today = self.clock().today();

        let since = match self.last_daily_check() {
            None => {
                self.set_last_daily_check(today)?;
                debug!(%today, "First daily check recorded");
                return Ok(Rollover::FirstRun { today });
            }
            Some(last) if last == today => return Ok(Rollover::UpToDate),
            Some(last) if last > today => {
                warn!(%last, %today, "Last daily check is in the future, resetting to today");
                self.set_last_daily_check(today)?;
                return Ok(Rollover::UpToDate);
            }
            Some(last) => last,
        };

        let mut tasks = self.load::<Task>();
        let mut missed = Vec::new();

        for task in tasks.iter_mut().filter_map(Stored::record_mut) {
            if !task.is_daily || task.is_completed() || task.missed_date.is_some() {
                continue;
            }

            let created = self.clock().local_date(task.created_at);
            if created < since || created >= today {
                continue;
            }

            let stamp = self.next_stamp(task.updated_at);
            task.missed_date = Some(created);
            task.updated_at = Some(stamp);
            missed.push(task.id.clone());
        }

        if !missed.is_empty() {
            self.save_stored(&tasks)?;
        }
        self.set_last_daily_check(today)?;

        info!(%since, %today, missed = missed.len(), "Daily rollover complete");
        Ok(Rollover::Reconciled { since, today, missed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::clock::{Clock, FixedClock};
    use crate::models::Task;
    use crate::patch::TaskPatch;
    use chrono::Duration;
    use std::rc::Rc;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn store_on(d: u32) -> (Store, Rc<FixedClock>) {
        let clock = Rc::new(FixedClock::on(date(d), 10));
        (Store::new(MemoryBackend::new()).with_clock(Rc::clone(&clock)), clock)
    }

    #[test]
    fn test_first_run_records_today() {
        let (mut store, _) = store_on(5);
        assert_eq!(store.run_daily_rollover().unwrap(), Rollover::FirstRun { today: date(5) });
        assert_eq!(store.last_daily_check(), Some(date(5)));
    }

    #[test]
    fn test_yesterdays_open_task_is_missed() {
        let (mut store, clock) = store_on(4);
        store.set_last_daily_check(date(4)).unwrap();
        store.add_task(Task::daily("d1", "Stretch", clock.now())).unwrap();
        store.add_task(Task::daily("d2", "Done one", clock.now())).unwrap();
        store.update_task("d2", TaskPatch::complete(clock.now())).unwrap();
        store.add_task(Task::new("o1", "One-off", clock.now())).unwrap();

        clock.advance(Duration::days(1));
        let outcome = store.run_daily_rollover().unwrap();
        assert_eq!(outcome.missed(), ["d1".to_string()]);

        let task = store.get::<Task>("d1").unwrap();
        assert_eq!(task.missed_date, Some(date(4)));
        assert!(store.get::<Task>("d2").unwrap().missed_date.is_none());
        assert!(store.get::<Task>("o1").unwrap().missed_date.is_none());
        assert_eq!(store.last_daily_check(), Some(date(5)));
    }

    #[test]
    fn test_second_run_same_day_is_noop() {
        let (mut store, clock) = store_on(4);
        store.set_last_daily_check(date(4)).unwrap();
        store.add_task(Task::daily("d1", "Stretch", clock.now())).unwrap();

        clock.advance(Duration::days(1));
        store.run_daily_rollover().unwrap();
        let snapshot = store.get_tasks();

        assert_eq!(store.run_daily_rollover().unwrap(), Rollover::UpToDate);
        assert_eq!(store.get_tasks(), snapshot);
    }

    #[test]
    fn test_gap_of_several_days_is_reconciled() {
        let (mut store, clock) = store_on(1);
        store.set_last_daily_check(date(1)).unwrap();
        store.add_task(Task::daily("d1", "Day one", clock.now())).unwrap();
        clock.advance(Duration::days(1));
        store.add_task(Task::daily("d2", "Day two", clock.now())).unwrap();

        clock.set(FixedClock::on(date(6), 8).now());
        let outcome = store.run_daily_rollover().unwrap();

        assert_eq!(outcome.missed().len(), 2);
        assert_eq!(store.get::<Task>("d1").unwrap().missed_date, Some(date(1)));
        assert_eq!(store.get::<Task>("d2").unwrap().missed_date, Some(date(2)));
    }

    #[test]
    fn test_tasks_from_before_last_check_are_left_alone() {
        let (mut store, clock) = store_on(1);
        store.add_task(Task::daily("old", "Old", clock.now())).unwrap();
        store.set_last_daily_check(date(3)).unwrap();

        clock.set(FixedClock::on(date(4), 8).now());
        let outcome = store.run_daily_rollover().unwrap();
        assert!(outcome.missed().is_empty());
        assert!(store.get::<Task>("old").unwrap().missed_date.is_none());
    }

    #[test]
    fn test_todays_tasks_are_not_missed() {
        let (mut store, clock) = store_on(4);
        store.set_last_daily_check(date(3)).unwrap();
        store.add_task(Task::daily("today", "Fresh", clock.now())).unwrap();

        let outcome = store.run_daily_rollover().unwrap();
        assert!(outcome.missed().is_empty());
        assert_eq!(store.last_daily_check(), Some(date(4)));
    }

    #[test]
    fn test_unreadable_task_kept_through_rollover() {
        let (mut store, clock) = store_on(4);
        store.set_last_daily_check(date(4)).unwrap();
        store.add_task(Task::daily("d1", "Stretch", clock.now())).unwrap();

        let mut raw: Vec<serde_json::Value> =
            serde_json::from_str(&store.backend().get(keys::TASKS).unwrap().unwrap()).unwrap();
        let odd = serde_json::json!({"id": "d2", "isDaily": "yes"});
        raw.push(odd.clone());
        store.write_value(keys::TASKS, &raw).unwrap();

        clock.advance(Duration::days(1));
        assert_eq!(store.run_daily_rollover().unwrap().missed(), ["d1".to_string()]);

        let after: Vec<serde_json::Value> =
            serde_json::from_str(&store.backend().get(keys::TASKS).unwrap().unwrap()).unwrap();
        assert_eq!(after[1], odd);
    }

    #[test]
    fn test_future_last_check_resets() {
        let (mut store, _) = store_on(4);
        store.set_last_daily_check(date(9)).unwrap();
        assert_eq!(store.run_daily_rollover().unwrap(), Rollover::UpToDate);
        assert_eq!(store.last_daily_check(), Some(date(4)));
    }
}
