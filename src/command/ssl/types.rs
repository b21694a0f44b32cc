//! Argument and parameter types used by SSL Commands
use atat::atat_derive::AtatEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
pub enum SslVersion {
    Ssl30 = 0,
    Tls10 = 1,
    Tls11 = 2,
    Tls12 = 3,
    All = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AtatEnum)]
pub enum SecurityLevel {
    /// No authentication
    None = 0,
    /// Server authentication
    Server = 1,
    /// Server and client authentication
    Mutual = 2,
}

/// A `+QSSLCFG` parameter of one SSL context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SslOption<'a> {
    Version(SslVersion),
    /// Cipher suite code, `0xFFFF` selects all
    CipherSuite(u16),
    CaCert(&'a str),
    ClientCert(&'a str),
    ClientKey(&'a str),
    SecurityLevel(SecurityLevel),
    IgnoreLocalTime(bool),
    /// Handshake timeout in seconds
    NegotiateTime(u16),
    Sni(bool),
    IgnoreMultiCertChainVerify(bool),
    IgnoreInvalidCertSign(bool),
    Dtls(bool),
}

impl SslOption<'_> {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Version(_) => "sslversion",
            Self::CipherSuite(_) => "ciphersuite",
            Self::CaCert(_) => "cacert",
            Self::ClientCert(_) => "clientcert",
            Self::ClientKey(_) => "clientkey",
            Self::SecurityLevel(_) => "seclevel",
            Self::IgnoreLocalTime(_) => "ignorelocaltime",
            Self::NegotiateTime(_) => "negotiatetime",
            Self::Sni(_) => "sni",
            Self::IgnoreMultiCertChainVerify(_) => "ignoremulticertchainverify",
            Self::IgnoreInvalidCertSign(_) => "ignoreinvalidcertsign",
            Self::Dtls(_) => "dtls",
        }
    }
}
