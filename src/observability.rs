use biometrics::{Collector, Counter, Moments};

pub(crate) static CHAT_CONNECTS: Counter = Counter::new("twitchmod.chat.connects");
pub(crate) static CHAT_LINES_SENT: Counter = Counter::new("twitchmod.chat.lines_sent");
pub(crate) static CHAT_PONGS: Counter = Counter::new("twitchmod.chat.pongs");
pub(crate) static CHAT_READ_ERRORS: Counter = Counter::new("twitchmod.chat.read_errors");

pub(crate) static HELIX_REQUESTS: Counter = Counter::new("twitchmod.helix.requests");
pub(crate) static HELIX_REQUEST_ERRORS: Counter = Counter::new("twitchmod.helix.request_errors");
pub(crate) static HELIX_REQUEST_DURATION: Moments =
    Moments::new("twitchmod.helix.request_duration_seconds");

pub(crate) static BATCH_SUCCEEDED: Counter = Counter::new("twitchmod.batch.succeeded");
pub(crate) static BATCH_FAILED: Counter = Counter::new("twitchmod.batch.failed");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CHAT_CONNECTS);
    collector.register_counter(&CHAT_LINES_SENT);
    collector.register_counter(&CHAT_PONGS);
    collector.register_counter(&CHAT_READ_ERRORS);

    collector.register_counter(&HELIX_REQUESTS);
    collector.register_counter(&HELIX_REQUEST_ERRORS);
    collector.register_moments(&HELIX_REQUEST_DURATION);

    collector.register_counter(&BATCH_SUCCEEDED);
    collector.register_counter(&BATCH_FAILED);
}
