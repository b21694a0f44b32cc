use embassy_time::Duration;

use crate::command::psn::types::{AuthMethod, ContextType};

/// Highest PDP context identifier accepted by the module.
pub const CONTEXT_ID_MAX: u8 = 7;
/// Context used when a configuration leaves the identifier at zero.
pub const CONTEXT_ID_DEFAULT: u8 = 1;

pub trait CellularConfig {
    /// Serial baudrate the module is expected to run at.
    const BAUD_RATE: u32 = 38400;
    const ECHO: bool = false;

    /// The module does not report remote link info on incoming connections,
    /// so `accept` and `sock_name` query `+QISTATE` instead.
    const CONN_INFO_POLLING: bool = false;

    /// HTTP transfers are polled; connection-open notifications then do not
    /// wake pending accepts.
    const HTTP_POLLING: bool = false;

    /// Default PDP context used by `Control::activate(None, ..)`.
    const CONTEXT: ContextConfig<'static> = ContextConfig::new(CONTEXT_ID_DEFAULT);

    /// How long a blocking `accept` waits per attempt. `None` waits forever.
    const ACCEPT_TIMEOUT: Option<Duration> = None;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Apn<'a> {
    #[default]
    None,
    Given {
        name: &'a str,
        username: Option<&'a str>,
        password: Option<&'a str>,
    },
}

/// Configuration of one PDP context (`+QICSGP`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig<'a> {
    /// `0` selects [`CONTEXT_ID_DEFAULT`].
    pub context_id: u8,
    pub context_type: Option<ContextType>,
    pub apn: Apn<'a>,
    pub authentication: AuthMethod,
}

impl<'a> ContextConfig<'a> {
    pub const fn new(context_id: u8) -> Self {
        Self {
            context_id,
            context_type: None,
            apn: Apn::None,
            authentication: AuthMethod::None,
        }
    }

    pub const fn with_apn(mut self, context_type: ContextType, apn: Apn<'a>) -> Self {
        self.context_type = Some(context_type);
        self.apn = apn;
        self
    }

    pub const fn with_authentication(mut self, authentication: AuthMethod) -> Self {
        self.authentication = authentication;
        self
    }

    /// Effective context identifier, or `None` when out of range.
    pub fn id(&self) -> Option<u8> {
        match self.context_id {
            0 => Some(CONTEXT_ID_DEFAULT),
            id @ 1..=CONTEXT_ID_MAX => Some(id),
            _ => None,
        }
    }

    /// Whether this configuration writes the context rather than reading it.
    pub fn is_write(&self) -> bool {
        !matches!(self.apn, Apn::None) || self.authentication != AuthMethod::None
    }
}

impl Default for ContextConfig<'_> {
    fn default() -> Self {
        Self::new(CONTEXT_ID_DEFAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_id_range() {
        assert_eq!(ContextConfig::new(0).id(), Some(1));
        assert_eq!(ContextConfig::new(1).id(), Some(1));
        assert_eq!(ContextConfig::new(7).id(), Some(7));
        assert_eq!(ContextConfig::new(8).id(), None);
    }

    #[test]
    fn query_unless_apn_or_auth() {
        assert!(!ContextConfig::new(1).is_write());
        assert!(ContextConfig::new(1)
            .with_authentication(AuthMethod::Pap)
            .is_write());
        let cfg = ContextConfig::new(1).with_apn(
            ContextType::Ipv4,
            Apn::Given {
                name: "internet",
                username: None,
                password: None,
            },
        );
        assert!(cfg.is_write());
    }
}
