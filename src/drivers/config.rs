use std::borrow::Cow;
use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

use super::http::HttpDriverConfig;
use super::Drivers;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriversConfig {
    pub enabled: Cow<'static, [Drivers]>,

    pub http_driver_config: HttpDriverConfig,
}

impl Default for DriversConfig {
    fn default() -> Self {
        Self {
            enabled: Cow::Borrowed(&[Drivers::Http]),

            http_driver_config: HttpDriverConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniDriverConfig {
    pub port: u16,
    pub host: IpAddr,
}

impl Default for UniDriverConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}
