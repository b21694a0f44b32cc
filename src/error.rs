use crate::socket::SocketError;

#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    // General device errors
    Unspecified,
    Busy,
    Timeout,
    Unsupported,
    Parameter,
    Uninitialized,
    PoweredDown,

    // Socket layer errors surfaced through driver calls (PDP/HTTP)
    Socket(SocketError),

    // Error code reported by the module itself
    Device(u16),
    // Non-zero `<err>` of an HTTP(S) result URC
    Http(u16),

    Atat(atat::Error),

    SubscriberOverflow(embassy_sync::pubsub::Error),
}

impl Error {
    /// Negative status code of the driver error taxonomy.
    pub fn code(&self) -> i32 {
        match self {
            Self::Busy => -2,
            Self::Timeout | Self::Atat(atat::Error::Timeout) => -3,
            Self::Unsupported => -4,
            Self::Parameter => -5,
            Self::Device(_) | Self::Http(_) => -6,
            _ => -1,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter<'_>) {
        match self {
            Self::Unspecified => defmt::write!(f, "Unspecified"),
            Self::Busy => defmt::write!(f, "Busy"),
            Self::Timeout => defmt::write!(f, "Timeout"),
            Self::Unsupported => defmt::write!(f, "Unsupported"),
            Self::Parameter => defmt::write!(f, "Parameter"),
            Self::Uninitialized => defmt::write!(f, "Uninitialized"),
            Self::PoweredDown => defmt::write!(f, "PoweredDown"),
            Self::Socket(e) => defmt::write!(f, "Socket({:?})", e),
            Self::Device(e) => defmt::write!(f, "Device({})", e),
            Self::Http(e) => defmt::write!(f, "Http({})", e),
            Self::Atat(e) => defmt::write!(f, "Atat({:?})", e),
            _ => defmt::write!(f, "non_exhaustive"),
        }
    }
}

impl From<atat::Error> for Error {
    fn from(e: atat::Error) -> Self {
        Self::Atat(e)
    }
}

impl From<SocketError> for Error {
    fn from(e: SocketError) -> Self {
        Self::Socket(e)
    }
}

impl From<embassy_time::TimeoutError> for Error {
    fn from(_: embassy_time::TimeoutError) -> Self {
        Self::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_codes() {
        assert_eq!(Error::Unspecified.code(), -1);
        assert_eq!(Error::Busy.code(), -2);
        assert_eq!(Error::Timeout.code(), -3);
        assert_eq!(Error::Atat(atat::Error::Timeout).code(), -3);
        assert_eq!(Error::Atat(atat::Error::Parse).code(), -1);
        assert_eq!(Error::Unsupported.code(), -4);
        assert_eq!(Error::Parameter.code(), -5);
        assert_eq!(Error::Http(703).code(), -6);
        assert_eq!(Error::Socket(SocketError::InvalidSocket).code(), -1);
    }
}
