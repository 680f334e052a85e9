use getset::CopyGetters;
use std::time::Duration;

#[derive(Debug, CopyGetters, PartialEq, Eq)]
pub struct Options {
    /// Delay before confirming a pass that created or deleted objects.
    #[getset(get_copy = "pub")]
    requeue_after_change: Duration,

    #[getset(get_copy = "pub")]
    controller_error_requeue_duration: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            requeue_after_change: Duration::from_secs(1),
            controller_error_requeue_duration: Duration::from_secs(5),
        }
    }
}
