use std::time::Duration;

/// Default limit for a single frame payload, and for a reassembled message.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 128 * 1024;

/// Default socket receive timeout, in milliseconds.
pub const DEFAULT_RECEIVE_TIMEOUT: u64 = 200;

/// Default TCP connect timeout, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 6000;

/// Configuration for a [`WebSocketConnection`](crate::WebSocketConnection).
///
/// `Options` is a plain value: the connection copies it when `connect` is called, so changing an
/// `Options` afterwards has no effect on a connection that is already running.
///
/// Setters never fail. Input that would make the options inconsistent is ignored, which makes it
/// safe to feed partially typed user input straight into them:
///
/// - A payload size of `0` is ignored. Setting one payload limit raises the other when needed, so
///   that `max_frame_payload_size() <= max_message_payload_size()` holds after every call.
/// - Negative timeouts and intervals are ignored. `0` disables the timeout (or reconnection).
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use securews::Options;
///
/// let options = Options::default()
///     .with_max_message_payload_size(64 * 1024)
///     .with_socket_connect_timeout(2_000)
///     .with_reconnect_interval(5_000);
///
/// assert_eq!(options.max_frame_payload_size(), 64 * 1024);
/// assert_eq!(options.socket_connect_timeout(), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    max_frame_payload_size: usize,
    max_message_payload_size: usize,
    socket_receive_timeout: u64,
    socket_connect_timeout: u64,
    tcp_no_delay: bool,
    receive_text_messages_raw: bool,
    validate_incoming_utf8: bool,
    mask_client_frames: bool,
    reconnect_interval: u64,
    max_missed_receive_timeouts: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_frame_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_message_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            socket_receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            socket_connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tcp_no_delay: true,
            receive_text_messages_raw: false,
            validate_incoming_utf8: true,
            mask_client_frames: true,
            reconnect_interval: 0,
            max_missed_receive_timeouts: 0,
        }
    }
}

fn millis(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_millis(value))
}

impl Options {
    /// Maximum payload size of a single incoming frame, in bytes.
    pub fn max_frame_payload_size(&self) -> usize {
        self.max_frame_payload_size
    }

    /// Maximum size of a reassembled incoming message, in bytes.
    pub fn max_message_payload_size(&self) -> usize {
        self.max_message_payload_size
    }

    /// Time a single socket read may wait for data, `None` when reads never time out.
    pub fn socket_receive_timeout(&self) -> Option<Duration> {
        millis(self.socket_receive_timeout)
    }

    /// Time allowed for the TCP (and TLS) connect, and again for the handshake.
    /// `None` when connecting never times out.
    pub fn socket_connect_timeout(&self) -> Option<Duration> {
        millis(self.socket_connect_timeout)
    }

    pub fn tcp_no_delay(&self) -> bool {
        self.tcp_no_delay
    }

    /// When set, text messages are delivered as bytes through
    /// [`on_raw_text_message`](crate::ConnectionObserver::on_raw_text_message).
    pub fn receive_text_messages_raw(&self) -> bool {
        self.receive_text_messages_raw
    }

    pub fn validate_incoming_utf8(&self) -> bool {
        self.validate_incoming_utf8
    }

    pub fn mask_client_frames(&self) -> bool {
        self.mask_client_frames
    }

    /// Delay before reconnecting after a lost connection, `None` when reconnection is disabled.
    pub fn reconnect_interval(&self) -> Option<Duration> {
        millis(self.reconnect_interval)
    }

    /// Consecutive receive timeouts tolerated before the peer is considered gone.
    /// `0` means silence alone never ends the connection.
    pub fn max_missed_receive_timeouts(&self) -> u32 {
        self.max_missed_receive_timeouts
    }

    /// Sets the frame payload limit, raising the message limit if it would fall below it.
    pub fn set_max_frame_payload_size(&mut self, size: usize) {
        if size == 0 {
            return;
        }
        self.max_frame_payload_size = size;
        if self.max_message_payload_size < size {
            self.max_message_payload_size = size;
        }
    }

    /// Sets the message payload limit, lowering the frame limit if it would exceed it.
    pub fn set_max_message_payload_size(&mut self, size: usize) {
        if size == 0 {
            return;
        }
        self.max_message_payload_size = size;
        if self.max_frame_payload_size > size {
            self.max_frame_payload_size = size;
        }
    }

    /// Sets the receive timeout in milliseconds. Negative values are ignored.
    pub fn set_socket_receive_timeout(&mut self, millis: i64) {
        if let Ok(millis) = u64::try_from(millis) {
            self.socket_receive_timeout = millis;
        }
    }

    /// Sets the connect timeout in milliseconds. Negative values are ignored.
    pub fn set_socket_connect_timeout(&mut self, millis: i64) {
        if let Ok(millis) = u64::try_from(millis) {
            self.socket_connect_timeout = millis;
        }
    }

    /// Sets the reconnect interval in milliseconds. Negative values are ignored.
    pub fn set_reconnect_interval(&mut self, millis: i64) {
        if let Ok(millis) = u64::try_from(millis) {
            self.reconnect_interval = millis;
        }
    }

    pub fn set_tcp_no_delay(&mut self, enabled: bool) {
        self.tcp_no_delay = enabled;
    }

    pub fn set_receive_text_messages_raw(&mut self, enabled: bool) {
        self.receive_text_messages_raw = enabled;
    }

    pub fn set_validate_incoming_utf8(&mut self, enabled: bool) {
        self.validate_incoming_utf8 = enabled;
    }

    pub fn set_mask_client_frames(&mut self, enabled: bool) {
        self.mask_client_frames = enabled;
    }

    pub fn set_max_missed_receive_timeouts(&mut self, count: u32) {
        self.max_missed_receive_timeouts = count;
    }

    /// Builder form of [`set_max_frame_payload_size`](Self::set_max_frame_payload_size).
    pub fn with_max_frame_payload_size(mut self, size: usize) -> Self {
        self.set_max_frame_payload_size(size);
        self
    }

    /// Builder form of [`set_max_message_payload_size`](Self::set_max_message_payload_size).
    pub fn with_max_message_payload_size(mut self, size: usize) -> Self {
        self.set_max_message_payload_size(size);
        self
    }

    pub fn with_socket_receive_timeout(mut self, millis: i64) -> Self {
        self.set_socket_receive_timeout(millis);
        self
    }

    pub fn with_socket_connect_timeout(mut self, millis: i64) -> Self {
        self.set_socket_connect_timeout(millis);
        self
    }

    pub fn with_reconnect_interval(mut self, millis: i64) -> Self {
        self.set_reconnect_interval(millis);
        self
    }

    pub fn with_tcp_no_delay(mut self, enabled: bool) -> Self {
        self.set_tcp_no_delay(enabled);
        self
    }

    pub fn with_receive_text_messages_raw(mut self, enabled: bool) -> Self {
        self.set_receive_text_messages_raw(enabled);
        self
    }

    pub fn with_validate_incoming_utf8(mut self, enabled: bool) -> Self {
        self.set_validate_incoming_utf8(enabled);
        self
    }

    pub fn with_mask_client_frames(mut self, enabled: bool) -> Self {
        self.set_mask_client_frames(enabled);
        self
    }

    pub fn with_max_missed_receive_timeouts(mut self, count: u32) -> Self {
        self.set_max_missed_receive_timeouts(count);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.max_frame_payload_size(), 128 * 1024);
        assert_eq!(options.max_message_payload_size(), 128 * 1024);
        assert_eq!(
            options.socket_receive_timeout(),
            Some(Duration::from_millis(200))
        );
        assert_eq!(
            options.socket_connect_timeout(),
            Some(Duration::from_millis(6000))
        );
        assert!(options.tcp_no_delay());
        assert!(!options.receive_text_messages_raw());
        assert!(options.validate_incoming_utf8());
        assert!(options.mask_client_frames());
        assert_eq!(options.reconnect_interval(), None);
        assert_eq!(options.max_missed_receive_timeouts(), 0);
    }

    #[test]
    fn test_frame_size_raises_message_size() {
        let mut options = Options::default();
        options.set_max_frame_payload_size(1024 * 1024);
        assert_eq!(options.max_frame_payload_size(), 1024 * 1024);
        assert_eq!(options.max_message_payload_size(), 1024 * 1024);

        options.set_max_frame_payload_size(10);
        assert_eq!(options.max_frame_payload_size(), 10);
        assert_eq!(options.max_message_payload_size(), 1024 * 1024);
    }

    #[test]
    fn test_message_size_lowers_frame_size() {
        let mut options = Options::default();
        options.set_max_message_payload_size(100);
        assert_eq!(options.max_message_payload_size(), 100);
        assert_eq!(options.max_frame_payload_size(), 100);

        options.set_max_message_payload_size(500);
        assert_eq!(options.max_message_payload_size(), 500);
        assert_eq!(options.max_frame_payload_size(), 100);
    }

    #[test]
    fn test_invariant_holds_after_any_sequence() {
        let mut options = Options::default();
        for (i, size) in [7, 0, 4096, 3, 1, 1 << 20, 12].into_iter().enumerate() {
            if i % 2 == 0 {
                options.set_max_frame_payload_size(size);
            } else {
                options.set_max_message_payload_size(size);
            }
            assert!(options.max_frame_payload_size() > 0);
            assert!(options.max_frame_payload_size() <= options.max_message_payload_size());
        }
    }

    #[test]
    fn test_zero_sizes_ignored() {
        let options = Options::default()
            .with_max_frame_payload_size(0)
            .with_max_message_payload_size(0);
        assert_eq!(options, Options::default());
    }

    #[test]
    fn test_negative_timeouts_ignored() {
        let options = Options::default()
            .with_socket_receive_timeout(-1)
            .with_socket_connect_timeout(-5000)
            .with_reconnect_interval(-10);
        assert_eq!(options, Options::default());
    }

    #[test]
    fn test_zero_disables_timeouts() {
        let options = Options::default()
            .with_socket_receive_timeout(0)
            .with_socket_connect_timeout(0)
            .with_reconnect_interval(0);
        assert_eq!(options.socket_receive_timeout(), None);
        assert_eq!(options.socket_connect_timeout(), None);
        assert_eq!(options.reconnect_interval(), None);
    }

    #[test]
    fn test_copy_is_independent() {
        let original = Options::default();
        let mut copy = original;
        copy.set_reconnect_interval(1000);
        copy.set_mask_client_frames(false);
        assert_eq!(original.reconnect_interval(), None);
        assert!(original.mask_client_frames());
        assert_eq!(copy.reconnect_interval(), Some(Duration::from_secs(1)));
    }
}
