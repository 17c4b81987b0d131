//! Poster fetching.
//!
//! A poster that cannot be fetched or decoded is replaced by a placeholder;
//! image problems never fail a query.

use std::net::{IpAddr, ToSocketAddrs};
use std::time::Duration;

use image::GenericImageView;
use serde::Serialize;
use url::{Host, Url};

pub const PLACEHOLDER: &str = "could not load image";

/// Largest poster accepted, in bytes
const MAX_POSTER_BYTES: usize = 10 * 1024 * 1024;
const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Poster {
    Image {
        data: Vec<u8>,
        mime: &'static str,
        dimensions: (u32, u32),
    },
    Placeholder,
}

/// JSON body sent in place of a poster.
#[derive(Debug, Serialize)]
pub struct PlaceholderBody {
    pub placeholder: &'static str,
}

impl Default for PlaceholderBody {
    fn default() -> Self {
        Self {
            placeholder: PLACEHOLDER,
        }
    }
}

pub struct PosterFetcher {
    client: reqwest::blocking::Client,
}

impl PosterFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::custom(|attempt| {
                if attempt.previous().len() >= MAX_REDIRECTS {
                    attempt.error("too many redirects")
                } else if is_public_url(attempt.url()) {
                    attempt.follow()
                } else {
                    attempt.stop()
                }
            }))
            .build()?;
        Ok(Self { client })
    }

    /// Downloads and decodes the poster at `url`.
    ///
    /// Only http(s) URLs whose host resolves to public addresses are
    /// requested; anything else is a placeholder without a request.
    pub fn fetch(&self, url: &str) -> Poster {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return Poster::Placeholder,
        };
        if !is_public_url(&parsed) {
            log::debug!("{url}: refusing to fetch a non-public address");
            return Poster::Placeholder;
        }

        match self.download(parsed) {
            Ok(bytes) => decode_poster(bytes).unwrap_or_else(|| {
                log::debug!("{url}: not a decodable image");
                Poster::Placeholder
            }),
            Err(err) => {
                log::debug!("{url}: poster download failed: {err}");
                Poster::Placeholder
            }
        }
    }

    fn download(&self, url: Url) -> anyhow::Result<Vec<u8>> {
        let response = self.client.get(url).send()?.error_for_status()?;
        let bytes = response.bytes()?;
        anyhow::ensure!(
            bytes.len() <= MAX_POSTER_BYTES,
            "poster is {} bytes, limit is {MAX_POSTER_BYTES}",
            bytes.len()
        );
        Ok(bytes.to_vec())
    }
}

/// True for http(s) URLs whose host is, or resolves only to, publicly
/// routable addresses.
pub fn is_public_url(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }

    match url.host() {
        Some(Host::Ipv4(ip)) => is_public_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_public_ip(IpAddr::V6(ip)),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return false;
            }
            let port = url.port_or_known_default().unwrap_or(80);
            match (domain.as_str(), port).to_socket_addrs() {
                Ok(addrs) => {
                    let addrs: Vec<_> = addrs.collect();
                    !addrs.is_empty() && addrs.iter().all(|addr| is_public_ip(addr.ip()))
                }
                Err(_) => false,
            }
        }
        None => false,
    }
}

fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            let shared = a == 100 && (b & 0xc0) == 64;
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_multicast()
                || shared
                || a == 0)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_public_ip(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            let unique_local = (first & 0xfe00) == 0xfc00;
            let link_local = (first & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || v6.is_multicast() || unique_local || link_local)
        }
    }
}

/// Identifies and decodes image bytes; `None` when they are not an image.
pub fn decode_poster(data: Vec<u8>) -> Option<Poster> {
    let format = image::guess_format(&data).ok()?;
    let img = image::load_from_memory_with_format(&data, format).ok()?;
    let dimensions = img.dimensions();

    Some(Poster::Image {
        mime: format.to_mime_type(),
        data,
        dimensions,
    })
}
