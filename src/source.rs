pub(crate) mod iter;
pub use iter::{from_iter, IterFlow, IterSub};

pub(crate) mod delay;
pub use delay::{delay_for, DelayFlow, TimedSingle};

pub(crate) mod interval;
pub use interval::{interval, interval_at, IntervalFlow, TimedPeriodic};

pub(crate) mod with_latest_from;
pub use with_latest_from::{with_latest_from, WithLatestFrom};
