//! Appointment date and time-slot generation.
//!
//! Weeks run Sunday through Saturday. Week 0 is the remainder of the
//! current week (today included); week n is the full week n weeks later.
//! Slots are half-open intervals of `slot_minutes` starting at opening
//! time. A slot is only offered if it ends at or before closing time.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc, Weekday};
use chrono_tz::Tz;

use crate::config::SchedulingConfig;

/// A bookable interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentSlot {
    pub date: NaiveDate,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl AppointmentSlot {
    /// Local start time, e.g. "09:30".
    pub fn label(&self) -> String {
        self.start.format("%H:%M").to_string()
    }

    pub fn start_time(&self) -> NaiveTime {
        self.start.time()
    }
}

/// Generates candidate dates and slots in the business timezone.
#[derive(Debug, Clone)]
pub struct SlotGenerator {
    timezone: Tz,
    opening: NaiveTime,
    closing: NaiveTime,
    slot_length: TimeDelta,
}

impl SlotGenerator {
    pub fn new(config: &SchedulingConfig) -> Self {
        Self {
            timezone: config.timezone,
            opening: config.opening,
            closing: config.closing,
            slot_length: TimeDelta::minutes(i64::from(config.slot_minutes.max(1))),
        }
    }

    /// Today's date in the business timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// Days offered for `week_offset`, ascending, relative to `today`.
    pub fn dates(&self, today: NaiveDate, week_offset: u32) -> Vec<NaiveDate> {
        let days_to_saturday = u64::from(6 - today.weekday().num_days_from_sunday());

        let (first, count) = if week_offset == 0 {
            (Some(today), days_to_saturday + 1)
        } else {
            let next_sunday = days_to_saturday + 1;
            let skip = next_sunday + 7 * u64::from(week_offset - 1);
            (today.checked_add_days(Days::new(skip)), 7)
        };

        let Some(first) = first else {
            return Vec::new();
        };

        (0..count)
            .filter_map(|i| first.checked_add_days(Days::new(i)))
            .collect()
    }

    /// All slots for `date`, ascending.
    ///
    /// Local times that do not exist on that date (DST gaps) are skipped.
    pub fn slots(&self, date: NaiveDate) -> Vec<AppointmentSlot> {
        let mut slots = Vec::new();
        let mut time = self.opening;

        loop {
            let (end, wrapped) = time.overflowing_add_signed(self.slot_length);
            if wrapped != 0 || end > self.closing {
                break;
            }
            if let Some(slot) = self.slot_at(date, time) {
                slots.push(slot);
            }
            time = end;
        }
        slots
    }

    /// The slot starting at `time` on `date`, if that local time exists.
    pub fn slot_at(&self, date: NaiveDate, time: NaiveTime) -> Option<AppointmentSlot> {
        let start = self
            .timezone
            .from_local_datetime(&date.and_time(time))
            .earliest()?;
        Some(AppointmentSlot {
            date,
            end: start + self.slot_length,
            start,
        })
    }
}

/// Spanish weekday name plus day/month.
pub fn date_label(date: NaiveDate) -> String {
    format!(
        "{} {:02}/{:02}",
        weekday_name(date.weekday()),
        date.day(),
        date.month()
    )
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Lunes",
        Weekday::Tue => "Martes",
        Weekday::Wed => "Miércoles",
        Weekday::Thu => "Jueves",
        Weekday::Fri => "Viernes",
        Weekday::Sat => "Sábado",
        Weekday::Sun => "Domingo",
    }
}
