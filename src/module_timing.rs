use embassy_time::Duration;

/// Generic command response time
pub const fn response_time() -> Duration {
    Duration::from_millis(5000)
}

/// Time to wait for a TCP/UDP connection to open (`+QIOPEN`)
pub const fn connect_time() -> Duration {
    Duration::from_millis(20000)
}

/// Grace period for a pending close notification before `close` acts
pub const fn close_grace_time() -> Duration {
    Duration::from_millis(25)
}

/// DNS resolution (`+QIDNSGIP`) including the result URCs
pub const fn dns_time() -> Duration {
    Duration::from_millis(10 * 5000)
}

/// PDP activation, deactivation and HTTP configuration
pub const fn pdp_time() -> Duration {
    Duration::from_millis(2 * 5000)
}

/// PDP context configuration (`+QICSGP`)
pub const fn context_time() -> Duration {
    Duration::from_millis(5 * 5000)
}

/// Time to wait for `RDY` after power on
pub const fn ready_time() -> Duration {
    Duration::from_millis(2 * 5000)
}

/// Upper bound for acquiring a usable signal after power on
pub const fn signal_time() -> Duration {
    Duration::from_millis(40 * 5000)
}

/// Interval between `AT` checks while the module boots
pub const fn boot_poll_interval() -> Duration {
    Duration::from_millis(100)
}

/// Interval between signal quality polls
pub const fn signal_poll_interval() -> Duration {
    Duration::from_millis(500)
}
