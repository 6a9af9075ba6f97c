//! Fuzz target for keyevent channel parsing and notification translation.

#![no_main]

use libfuzzer_sys::fuzz_target;
use redis_replicator::capture::notifications::translate_notification;
use redis_replicator::capture::parse_keyevent_channel;
use redis_replicator::Classifier;

fuzz_target!(|data: (&str, &[u8])| {
    let (channel, key) = data;

    if let Some(event) = parse_keyevent_channel(channel) {
        assert!(!event.is_empty());
        assert!(channel.ends_with(event));
    }

    // Should never panic
    let _ = translate_notification(&Classifier::default(), channel, key.to_vec());
});
