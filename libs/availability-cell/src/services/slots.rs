use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use shared_models::SchedulingError;

use crate::models::OpenSlot;
use crate::store::ScheduleReader;

type Interval = (DateTime<Utc>, DateTime<Utc>);

/// Computes open slots for a provider/resource. Pure read/compute; holds no
/// state beyond the injected store handle.
pub struct SlotCalculator {
    reader: Arc<dyn ScheduleReader>,
}

impl SlotCalculator {
    pub fn new(reader: Arc<dyn ScheduleReader>) -> Self {
        Self { reader }
    }

    /// Find every open interval of exactly `duration_minutes` for the
    /// provider within `[range_start, range_end)`.
    ///
    /// Recurring windows are expanded across the range, time-off exceptions
    /// and existing non-cancelled bookings are subtracted, and a window of
    /// the requested duration slides across what remains at the duration's
    /// own granularity. Free stretches shorter than the duration yield
    /// nothing; slots are never clipped into partial intervals.
    pub async fn find_open_slots(
        &self,
        provider_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Result<Vec<OpenSlot>, SchedulingError> {
        self.find_open_slots_excluding(provider_id, range_start, range_end, duration_minutes, None)
            .await
    }

    /// As `find_open_slots`, but with one booking omitted from the busy
    /// set — the booking a reschedule is about to vacate.
    pub async fn find_open_slots_excluding(
        &self,
        provider_id: Uuid,
        range_start: DateTime<Utc>,
        range_end: DateTime<Utc>,
        duration_minutes: i64,
        exclude: Option<Uuid>,
    ) -> Result<Vec<OpenSlot>, SchedulingError> {
        if duration_minutes <= 0 {
            return Err(SchedulingError::invalid_state(
                "slot duration must be positive",
            ));
        }
        if range_start >= range_end {
            return Ok(vec![]);
        }

        let schedule = self.reader.get_provider_schedule(provider_id).await?;

        debug!(
            "Computing open slots for provider {} from {} to {} ({} min)",
            provider_id, range_start, range_end, duration_minutes
        );

        // Expand recurring windows into concrete intervals across the range.
        let mut open: Vec<Interval> = Vec::new();
        let mut date = range_start.date_naive();
        let last_date = range_end.date_naive();
        while date <= last_date {
            for window in &schedule.windows {
                if window.start_time >= window.end_time || !window.applies_on(date) {
                    continue;
                }
                let start = date.and_time(window.start_time).and_utc();
                let end = date.and_time(window.end_time).and_utc();
                // Clip to the query range.
                let start = start.max(range_start);
                let end = end.min(range_end);
                if start < end {
                    open.push((start, end));
                }
            }
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        let open = merge_intervals(open);

        let time_off: Vec<Interval> = schedule
            .time_off
            .iter()
            .map(|t| (t.starts_at, t.ends_at))
            .collect();
        let open = subtract_intervals(open, &merge_intervals(time_off));

        let booked: Vec<Interval> = self
            .reader
            .booked_intervals_in_range(provider_id, range_start, range_end, exclude)
            .await?
            .into_iter()
            .map(|b| (b.start, b.end))
            .collect();
        let open = subtract_intervals(open, &merge_intervals(booked));

        // Slide a fixed-size window across each free stretch.
        let step = Duration::minutes(duration_minutes);
        let mut slots = Vec::new();
        for (free_start, free_end) in open {
            let mut cursor = free_start;
            while cursor + step <= free_end {
                slots.push(OpenSlot {
                    provider_id,
                    start: cursor,
                    end: cursor + step,
                });
                cursor += step;
            }
        }

        debug!("Found {} open slots for provider {}", slots.len(), provider_id);
        Ok(slots)
    }

    /// Whether a specific `[start, end)` interval is currently open.
    /// Used by the booking coordinator to re-validate a requested start.
    pub async fn is_slot_open(
        &self,
        provider_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<bool, SchedulingError> {
        let duration = (end - start).num_minutes();
        let slots = self
            .find_open_slots_excluding(provider_id, start, end, duration, exclude)
            .await?;
        Ok(slots.iter().any(|s| s.start == start && s.end == end))
    }
}

/// Sort and coalesce overlapping or adjacent intervals.
fn merge_intervals(mut intervals: Vec<Interval>) -> Vec<Interval> {
    intervals.retain(|(start, end)| start < end);
    if intervals.is_empty() {
        return intervals;
    }
    intervals.sort_by_key(|&(start, end)| (start, end));

    let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
    for (start, end) in intervals {
        if let Some(last) = merged.last_mut() {
            if start <= last.1 {
                last.1 = last.1.max(end);
                continue;
            }
        }
        merged.push((start, end));
    }
    merged
}

/// Subtract `busy` (sorted, non-overlapping) from `free` (sorted,
/// non-overlapping), keeping half-open semantics.
fn subtract_intervals(free: Vec<Interval>, busy: &[Interval]) -> Vec<Interval> {
    let mut result = Vec::with_capacity(free.len());
    for (start, end) in free {
        let mut cursor = start;
        for &(busy_start, busy_end) in busy {
            if busy_end <= cursor {
                continue;
            }
            if busy_start >= end {
                break;
            }
            if busy_start > cursor {
                result.push((cursor, busy_start.min(end)));
            }
            cursor = cursor.max(busy_end);
            if cursor >= end {
                break;
            }
        }
        if cursor < end {
            result.push((cursor, end));
        }
    }
    result
}
