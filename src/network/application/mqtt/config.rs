//! Session configuration.

use serde::{Deserialize, Serialize};

use super::error::Error;

/// Tunables of a [`Client`](super::Client) that are not part of a request.
///
/// Keep-alive and clean-session travel with each [`Connect`](super::Connect)
/// request; store capacities are const generics on the client.
///
/// # Examples
///
/// ```rust
/// use libmqtt::network::application::mqtt::ClientConfig;
///
/// let config = ClientConfig::from_json(br#"{"default_timeout":10}"#).unwrap();
/// assert_eq!(config.default_timeout, 10);
///
/// let mut buf = [0u8; 32];
/// let len = config.to_json(&mut buf).unwrap();
/// assert_eq!(&buf[..len], br#"{"default_timeout":10}"#);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClientConfig {
    /// Seconds to wait for a CONNACK, and for a PINGRESP once a ping is out.
    ///
    /// 0 disables the connect timeout; the ping timeout then falls back to
    /// the keep-alive interval.
    #[serde(default)]
    pub default_timeout: u16,
}

impl ClientConfig {
    /// Parses a JSON object such as `{"default_timeout":5}`.
    pub fn from_json(json: &[u8]) -> Result<Self, Error> {
        serde_json_core::from_slice::<ClientConfig>(json)
            .map(|(config, _)| config)
            .map_err(|_| Error::Config)
    }

    /// Writes the configuration as JSON into `buf`, returning the length.
    pub fn to_json(&self, buf: &mut [u8]) -> Result<usize, Error> {
        serde_json_core::to_slice(self, buf).map_err(|_| Error::Config)
    }
}
