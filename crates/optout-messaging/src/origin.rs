//! Trusted origin registry
//!
//! Registrable domains of known consent-management vendors, plus the host
//! page's own origin. Matching is exact host or subdomain, never substring.

use url::{Origin, Url};

use crate::error::ValidationError;
use crate::Result;

const VENDOR_HOSTS: &[&str] = &[
    // OneTrust
    "cookielaw.org",
    "onetrust.com",
    // Cookiebot
    "cookiebot.com",
    "cookiebot.eu",
    // IAB consensu.org vendor hosting
    "consensu.org",
    // Didomi
    "didomi.io",
    // Usercentrics
    "usercentrics.eu",
    // Quantcast
    "quantcast.com",
    // SourcePoint
    "privacy-mgmt.com",
    "sp-prod.net",
    "sourcepoint.com",
    // TrustArc
    "trustarc.com",
    "truste.com",
    // Others
    "consentmanager.net",
    "iubenda.com",
    "osano.com",
    "cookieyes.com",
];

#[derive(Debug, Clone)]
pub struct TrustedOriginRegistry {
    page_origin: Origin,
    vendor_hosts: Vec<String>,
}

impl TrustedOriginRegistry {
    /// Registry for a page, given its URL or origin string
    pub fn for_page(page_url: &str) -> Result<Self> {
        Self::with_vendor_hosts(page_url, VENDOR_HOSTS.iter().copied())
    }

    pub fn with_vendor_hosts<'a, I>(page_url: &str, hosts: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let page_origin = Url::parse(page_url)
            .map(|u| u.origin())
            .map_err(|_| ValidationError::InvalidPageOrigin(page_url.to_string()))?;

        if !page_origin.is_tuple() {
            return Err(ValidationError::InvalidPageOrigin(page_url.to_string()));
        }

        Ok(Self {
            page_origin,
            vendor_hosts: hosts
                .into_iter()
                .map(|h| h.trim().trim_start_matches('.').to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        })
    }

    /// Serialized page origin, the only target used for outbound messages
    pub fn page_origin(&self) -> String {
        self.page_origin.ascii_serialization()
    }

    pub fn is_same_origin(&self, origin: &str) -> bool {
        match Url::parse(origin) {
            Ok(parsed) => parsed.origin() == self.page_origin,
            Err(_) => false,
        }
    }

    /// Registered vendor host the origin belongs to, if any
    pub fn vendor_for(&self, origin: &str) -> Option<&str> {
        let parsed = Url::parse(origin).ok()?;
        if parsed.scheme() != "https" {
            return None;
        }
        let host = parsed.host_str()?.to_lowercase();

        self.vendor_hosts
            .iter()
            .find(|vendor| {
                host == vendor.as_str()
                    || host
                        .strip_suffix(vendor.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
            .map(String::as_str)
    }

    pub fn is_trusted(&self, origin: &str) -> bool {
        self.is_same_origin(origin) || self.vendor_for(origin).is_some()
    }
}
