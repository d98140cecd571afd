//! # Offline Cache Protocol
//!
//! The service worker served at `/service-worker.js` keeps the app shell
//! available without a connection. Its behavior is fixed here and rendered
//! from a [`CacheManifest`]:
//!
//! - **install**: fetch every shell URL into the cache named by
//!   [`CacheManifest::cache_key`], then activate immediately.
//! - **activate**: delete every cache whose key differs from the current
//!   one. Bumping the version is the only invalidation mechanism.
//! - **fetch**: non-GET and cross-origin requests pass through untouched.
//!   Navigations go network-first with the cached `/` as fallback. Other
//!   same-origin GETs are stale-while-revalidate: the cached copy (if any)
//!   answers immediately while a network fetch refreshes the entry.

use crate::{APP_VERSION, OUTPUT_FILENAME_PREFIX};

/// URLs every client must hold to render the app offline.
pub const APP_SHELL: &[&str] = &["/", "/manifest.webmanifest", "/pwa-icon.svg"];

const CACHE_NAME_SLOT: &str = "__CACHE_NAME__";
const APP_SHELL_SLOT: &str = "__APP_SHELL__";

const SERVICE_WORKER_TEMPLATE: &str = r#"const CACHE_NAME = "__CACHE_NAME__";
const APP_SHELL = __APP_SHELL__;

self.addEventListener("install", (event) => {
  event.waitUntil(caches.open(CACHE_NAME).then((cache) => cache.addAll(APP_SHELL)));
  self.skipWaiting();
});

self.addEventListener("activate", (event) => {
  event.waitUntil(
    caches.keys().then((keys) => Promise.all(
      keys.filter((key) => key !== CACHE_NAME).map((key) => caches.delete(key))
    ))
  );
  self.clients.claim();
});

self.addEventListener("fetch", (event) => {
  const req = event.request;
  if (req.method !== "GET") return;

  if (req.mode === "navigate") {
    event.respondWith(
      fetch(req).catch(() => caches.match("/"))
    );
    return;
  }

  const sameOrigin = new URL(req.url).origin === self.location.origin;
  if (!sameOrigin) return;

  event.respondWith(
    caches.match(req).then((cached) => {
      const fetched = fetch(req)
        .then((networkRes) => {
          const copy = networkRes.clone();
          caches.open(CACHE_NAME).then((cache) => cache.put(req, copy));
          return networkRes;
        })
        .catch(() => cached);
      return cached || fetched;
    })
  );
});
"#;

/// Version-qualified set of URLs to precache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheManifest {
    version: String,
    shell: Vec<String>,
}

impl CacheManifest {
    /// Manifest for `version` precaching `shell`, in order.
    pub fn new(version: impl Into<String>, shell: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            version: version.into(),
            shell: shell.into_iter().map(Into::into).collect(),
        }
    }

    /// Version tag embedded in the cache key.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Ordered shell URLs.
    pub fn shell(&self) -> &[String] {
        &self.shell
    }

    /// Cache storage key, e.g. `nebuladocx-cache-v1.1.0`.
    pub fn cache_key(&self) -> String {
        format!("{OUTPUT_FILENAME_PREFIX}-cache-v{}", self.version)
    }

    /// Render the service worker script for this manifest.
    pub fn service_worker_script(&self) -> String {
        let shell = serde_json::to_string(&self.shell).unwrap_or_else(|_| "[]".to_string());
        SERVICE_WORKER_TEMPLATE
            .replace(CACHE_NAME_SLOT, &self.cache_key())
            .replace(APP_SHELL_SLOT, &shell)
    }
}

impl Default for CacheManifest {
    fn default() -> Self {
        Self::new(APP_VERSION, APP_SHELL.iter().copied())
    }
}
