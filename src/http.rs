//! HTTP transport shared by the metadata and oEmbed fetches

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use url::Url;

use crate::error::{Error, Result};

const DEFAULT_MAX_REDIRECTS: usize = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024; // 2 MB

/// Configuration for HTTP requests.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Allow insecure HTTPS connections (self-signed certs).
    ///
    /// **Security Warning:** Enabling this allows man-in-the-middle attacks.
    /// Only use for testing or when connecting to known self-signed services.
    pub allow_insecure: bool,

    /// Follow HTTP redirects
    pub follow_redirects: bool,

    /// Maximum number of redirects to follow
    pub max_redirects: usize,

    /// Timeout applied to each request, including reading the body
    pub timeout: Duration,

    /// Maximum response body size in bytes.
    ///
    /// Bodies are read no further than this. Default: 2 MB.
    pub max_body_size: usize,

    /// Block requests to private/internal IP addresses (SSRF protection).
    ///
    /// When enabled, requests to localhost, private networks (10.x, 172.16-31.x, 192.168.x),
    /// link-local addresses, and cloud metadata endpoints (169.254.x) are blocked.
    /// Default: true.
    pub block_private_ips: bool,

    /// User-Agent header
    pub user_agent: String,

    /// Additional headers to send
    pub headers: Vec<(String, String)>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            allow_insecure: false,
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            block_private_ips: true,
            user_agent: format!(
                "webpage-embed/{} (https://crates.io/crates/webpage-embed)",
                env!("CARGO_PKG_VERSION")
            ),
            headers: Vec::new(),
        }
    }
}

impl HttpOptions {
    /// Create a new HttpOptions with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to allow insecure HTTPS connections.
    pub fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    /// Set whether to follow redirects.
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum response body size in bytes.
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Set whether to block requests to private/internal IP addresses.
    ///
    /// **Security Note:** Disabling this exposes your application to SSRF attacks
    /// if URLs come from untrusted sources.
    pub fn block_private_ips(mut self, block: bool) -> Self {
        self.block_private_ips = block;
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Build a reqwest Client from these options.
    pub(crate) fn build_client(&self) -> Result<Client> {
        let redirect_policy = if self.follow_redirects {
            reqwest::redirect::Policy::limited(self.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };

        let mut builder = Client::builder()
            .danger_accept_invalid_certs(self.allow_insecure)
            .redirect(redirect_policy)
            .timeout(self.timeout)
            .user_agent(&self.user_agent);

        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                headers.insert(name, value);
            }
        }
        builder = builder.default_headers(headers);

        Ok(builder.build()?)
    }
}

/// Check if an IPv4 address is private/internal.
fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()                           // 127.0.0.0/8
        || ip.is_private()                     // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
        || ip.is_link_local()                  // 169.254.0.0/16 (includes cloud metadata)
        || ip.is_broadcast()                   // 255.255.255.255
        || ip.is_unspecified()                 // 0.0.0.0
        || ip.is_documentation()              // 192.0.2.0/24, 198.51.100.0/24, 203.0.113.0/24
        || ip.octets()[0] == 0                // 0.0.0.0/8
        || ip.octets()[0] >= 224 // Multicast and reserved (224.0.0.0+)
}

/// Check if an IPv6 address is private/internal.
fn is_private_ipv6(ip: Ipv6Addr) -> bool {
    ip.is_loopback()                           // ::1
        || ip.is_unspecified()                 // ::
        || ip.is_multicast()                   // ff00::/8
        || ip.to_ipv4_mapped().is_some_and(is_private_ipv4)
        || (ip.segments()[0] & 0xfe00) == 0xfc00 // fc00::/7
        || (ip.segments()[0] & 0xffc0) == 0xfe80 // fe80::/10
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_ipv4(v4),
        IpAddr::V6(v6) => is_private_ipv6(v6),
    }
}

/// Reject URLs that are not http(s) or that resolve to internal addresses.
async fn validate_url_for_ssrf(url: &Url) -> Result<()> {
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(Error::InvalidUrl(format!(
                "unsupported scheme '{}', only http/https allowed",
                scheme
            )));
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidUrl("missing host".to_string()))?;

    let host_lower = host.to_lowercase();
    if host_lower == "localhost"
        || host_lower.ends_with(".local")
        || host_lower.ends_with(".internal")
    {
        return Err(Error::SsrfBlocked(format!(
            "blocked request to internal host: {}",
            host
        )));
    }

    let port = url.port_or_known_default().unwrap_or(80);
    let addr_str = format!("{}:{}", host, port);

    // If DNS resolution fails, let reqwest report it.
    if let Ok(addrs) = tokio::net::lookup_host(&addr_str).await {
        for addr in addrs {
            if is_private_ip(addr.ip()) {
                return Err(Error::SsrfBlocked(format!(
                    "blocked request to private IP: {} (resolved from {})",
                    addr.ip(),
                    host
                )));
            }
        }
    }

    Ok(())
}

/// Issue a GET request and fail on any non-success status.
pub(crate) async fn get(
    client: &Client,
    url: &str,
    options: &HttpOptions,
    accept: Option<&str>,
) -> Result<Response> {
    let parsed = Url::parse(url)?;
    if options.block_private_ips {
        validate_url_for_ssrf(&parsed).await?;
    }

    tracing::debug!(url = %parsed, "fetching");
    let mut request = client.get(parsed);
    if let Some(accept) = accept {
        request = request.header(ACCEPT, accept);
    }
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Status {
            url: response.url().to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

/// Read a response body, stopping at `max_body_size` bytes.
pub(crate) async fn read_body(response: Response, max_body_size: usize) -> Result<Vec<u8>> {
    let content_length = response.content_length().unwrap_or(0) as usize;
    let capacity = content_length.min(max_body_size).min(1024 * 1024); // Cap initial alloc at 1MB
    let mut bytes = Vec::with_capacity(capacity);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let remaining = max_body_size.saturating_sub(bytes.len());
        if remaining == 0 {
            break;
        }
        let to_take = chunk.len().min(remaining);
        bytes.extend_from_slice(&chunk[..to_take]);
        if to_take < chunk.len() {
            break; // Hit the limit
        }
    }

    Ok(bytes)
}
