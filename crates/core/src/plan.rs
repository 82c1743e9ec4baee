use crate::error::{Error, Result};

/// Which side of the plan the caller last set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDriver {
    Interval,
    FrameCount,
}

/// Interval and frame count over a fixed duration, kept mutually consistent.
///
/// Each setter derives the opposite field exactly once and never touches the
/// field it was given, so a two-way bound input surface cannot oscillate.
/// The relationship is not a bijection: with `duration = 10`, interval 3
/// yields 3 frames, while 3 frames yields interval 3 again, but interval 4
/// yields 2 frames and 2 frames yields interval 5.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingPlan {
    duration_secs: u32,
    interval_secs: u32,
    frame_count: u32,
    driver: PlanDriver,
}

impl SamplingPlan {
    /// One frame per second, the state an input surface starts in.
    pub fn new(duration_secs: u32) -> Result<Self> {
        Self::with_interval(duration_secs, 1)
    }

    pub fn with_interval(duration_secs: u32, interval_secs: u32) -> Result<Self> {
        let mut plan = Self::blank(duration_secs)?;
        plan.set_interval(interval_secs)?;
        Ok(plan)
    }

    pub fn with_frame_count(duration_secs: u32, frame_count: u32) -> Result<Self> {
        let mut plan = Self::blank(duration_secs)?;
        plan.set_frame_count(frame_count)?;
        Ok(plan)
    }

    fn blank(duration_secs: u32) -> Result<Self> {
        if duration_secs == 0 {
            return Err(Error::InvalidRange {
                field: "duration",
                value: 0,
                max: u32::MAX,
            });
        }
        Ok(Self {
            duration_secs,
            interval_secs: 1,
            frame_count: duration_secs,
            driver: PlanDriver::Interval,
        })
    }

    pub fn set_interval(&mut self, interval_secs: u32) -> Result<()> {
        self.check_range("interval", interval_secs)?;
        self.interval_secs = interval_secs;
        self.frame_count = frame_count_for_interval(self.duration_secs, interval_secs);
        self.driver = PlanDriver::Interval;
        Ok(())
    }

    pub fn set_frame_count(&mut self, frame_count: u32) -> Result<()> {
        self.check_range("frame count", frame_count)?;
        self.frame_count = frame_count;
        self.interval_secs = interval_for_frame_count(self.duration_secs, frame_count);
        self.driver = PlanDriver::FrameCount;
        Ok(())
    }

    fn check_range(&self, field: &'static str, value: u32) -> Result<()> {
        if value == 0 || value > self.duration_secs {
            return Err(Error::InvalidRange {
                field,
                value,
                max: self.duration_secs,
            });
        }
        Ok(())
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn interval_secs(&self) -> u32 {
        self.interval_secs
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn driver(&self) -> PlanDriver {
        self.driver
    }
}

pub fn frame_count_for_interval(duration_secs: u32, interval_secs: u32) -> u32 {
    (duration_secs / interval_secs.max(1)).max(1)
}

pub fn interval_for_frame_count(duration_secs: u32, frame_count: u32) -> u32 {
    (duration_secs / frame_count.max(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_one_frame_per_second() {
        let plan = SamplingPlan::new(100).unwrap();
        assert_eq!(plan.interval_secs(), 1);
        assert_eq!(plan.frame_count(), 100);
    }

    #[test]
    fn interval_drives_frame_count() {
        let mut plan = SamplingPlan::new(100).unwrap();
        plan.set_interval(10).unwrap();
        assert_eq!(plan.frame_count(), 10);
        assert_eq!(plan.interval_secs(), 10);
        assert_eq!(plan.driver(), PlanDriver::Interval);

        plan.set_interval(30).unwrap();
        assert_eq!(plan.frame_count(), 3);
    }

    #[test]
    fn frame_count_drives_interval() {
        let mut plan = SamplingPlan::new(100).unwrap();
        plan.set_frame_count(7).unwrap();
        assert_eq!(plan.interval_secs(), 14);
        assert_eq!(plan.frame_count(), 7);
        assert_eq!(plan.driver(), PlanDriver::FrameCount);
    }

    #[test]
    fn setters_are_idempotent() {
        let mut plan = SamplingPlan::new(57).unwrap();
        plan.set_interval(8).unwrap();
        let first = plan.clone();
        plan.set_interval(8).unwrap();
        assert_eq!(plan, first);
    }

    #[test]
    fn derived_values_stay_in_range_for_all_inputs() {
        for duration in 1..=120u32 {
            for value in 1..=duration {
                let by_interval = SamplingPlan::with_interval(duration, value).unwrap();
                assert_eq!(by_interval.frame_count(), (duration / value).max(1));
                assert!((1..=duration).contains(&by_interval.frame_count()));

                let by_count = SamplingPlan::with_frame_count(duration, value).unwrap();
                assert!((1..=duration).contains(&by_count.interval_secs()));
            }
        }
    }

    #[test]
    fn round_trip_never_increases_frames_beyond_request() {
        let duration = 100;
        for interval in 1..=duration {
            let count = frame_count_for_interval(duration, interval);
            let back = interval_for_frame_count(duration, count);
            // floor division can only move the interval up, never down
            assert!(back >= interval);
            if duration % interval == 0 {
                assert_eq!(back, interval);
            }
        }
    }

    #[test]
    fn out_of_range_values_are_rejected_without_change() {
        let mut plan = SamplingPlan::with_interval(60, 5).unwrap();
        let before = plan.clone();

        assert!(matches!(
            plan.set_interval(0),
            Err(Error::InvalidRange { field: "interval", .. })
        ));
        assert!(matches!(
            plan.set_frame_count(61),
            Err(Error::InvalidRange { max: 60, .. })
        ));
        assert_eq!(plan, before);
    }

    #[test]
    fn zero_duration_has_no_plan() {
        assert!(SamplingPlan::new(0).is_err());
    }
}
