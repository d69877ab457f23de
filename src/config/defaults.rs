//! Default value functions referenced by serde attributes.

pub(crate) fn default_port() -> u16 {
    3570
}

pub(crate) fn default_max_message_size() -> usize {
    65536 // 64KB
}

pub(crate) fn default_send_queue_capacity() -> usize {
    256
}

pub(crate) fn default_send_failure_streak() -> u32 {
    8
}

pub(crate) fn default_max_events_per_second() -> u32 {
    120
}

pub(crate) fn default_cors_origins() -> String {
    "*".to_string()
}

pub(crate) fn default_chat_window_secs() -> u64 {
    10
}

pub(crate) fn default_chat_max_messages() -> u32 {
    6
}

pub(crate) fn default_chat_max_length() -> usize {
    280
}

pub(crate) fn default_join_window_secs() -> u64 {
    60
}

pub(crate) fn default_max_join_attempts() -> u32 {
    20
}

pub(crate) fn default_log_dir() -> String {
    "logs".to_string()
}

pub(crate) fn default_log_filename() -> String {
    "server.log".to_string()
}

pub(crate) fn default_log_rotation() -> String {
    "daily".to_string()
}
