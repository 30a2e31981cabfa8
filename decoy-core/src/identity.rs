/// Server identity spoofing: every response carries a `Server` banner borrowed
/// from a common real-world deployment instead of our own.
///
/// The banner is drawn once per responder and never changes afterwards, so a
/// scanner revisiting the host keeps seeing the same "server".
use crate::response::Response;
use rand::seq::SliceRandom;
use rand::Rng;

/// Banners observed in the wild on ordinary production hosts.
pub const BANNERS: &[&str] = &[
    "Apache",
    "nginx",
    "Microsoft-IIS/7.5",
    "Microsoft-HTTPAPI/2.0",
    "Apache/2.2.15",
    "SmartXFilter",
    "Microsoft-IIS/8.5",
    "Apache/2.4.6",
    "Apache-Coyote/1.1",
    "Microsoft-IIS/7.0",
    "Apache/2.4.18",
    "AkamaiGHost",
    "Apache/2.2.25",
    "Microsoft-IIS/10.0",
    "Apache/2.2.3",
    "nginx/1.12.1",
    "Apache/2.4.29",
    "cloudflare",
    "Apache/2.2.22",
];

/// Immutable `Server` banner for one responder instance. The empty banner
/// means "do not spoof".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    banner: String,
}

impl ServerIdentity {
    /// Pick a banner uniformly at random from [`BANNERS`].
    pub fn random() -> Self {
        Self::from_rng(&mut rand::thread_rng())
    }

    pub fn from_rng<R: Rng + ?Sized>(rng: &mut R) -> Self {
        // BANNERS is a non-empty constant, so choose() always yields.
        let banner = BANNERS.choose(rng).copied().unwrap_or("nginx");
        Self::fixed(banner)
    }

    pub fn fixed(banner: impl Into<String>) -> Self {
        Self {
            banner: banner.into(),
        }
    }

    /// Leave the transport's own `Server` header alone.
    pub fn none() -> Self {
        Self::fixed("")
    }

    /// Resolve the configured identity: pinned, disabled (`""`) or random.
    pub fn from_config(pinned: Option<&str>) -> Self {
        match pinned {
            Some(banner) => Self::fixed(banner),
            None => Self::random(),
        }
    }

    pub fn banner(&self) -> &str {
        &self.banner
    }

    pub fn is_spoofing(&self) -> bool {
        !self.banner.is_empty()
    }

    /// Replace the response's `Server` header with our banner.
    pub fn apply(&self, response: &mut Response) {
        if self.is_spoofing() {
            response.remove_header("Server");
            response.set_header("Server", &self.banner);
        }
    }
}
