use std::sync::Arc;

use cookie::{Cookie, time::Duration as CookieDuration};
use reqwest::cookie::Jar;
use tracing::debug;
use url::Url;

use crate::storage::StorageArea;

/// Cookie names the identity stack is known to write.
pub const AUTH_COOKIE_NAMES: [&str; 3] = [
    "sb-access-token",
    "sb-refresh-token",
    "supabase-auth-token",
];

/// Storage keys containing either fragment count as auth material.
const AUTH_KEY_MARKERS: [&str; 2] = ["supabase", "auth"];

/// Best-effort purge of persisted credentials.
///
/// Cookies are expired across every scoping variant they could have been
/// written under, since the original attributes are not recoverable from the
/// jar. Runs are idempotent and never fail; missing jar or storage handles
/// short-circuit to a no-op.
pub struct CredentialSweeper {
    site: Url,
    jar: Option<Arc<Jar>>,
    storage: Option<Arc<dyn StorageArea>>,
}

impl CredentialSweeper {
    pub fn new(site: Url) -> Self {
        Self {
            site,
            jar: None,
            storage: None,
        }
    }

    pub fn with_jar(mut self, jar: Arc<Jar>) -> Self {
        self.jar = Some(jar);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageArea>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Expire every known auth cookie and remove auth-flavored storage keys.
    pub fn sweep(&self) {
        self.sweep_cookies();
        self.sweep_storage();
    }

    fn sweep_cookies(&self) {
        let Some(jar) = &self.jar else { return };
        let host = self.site.host_str().map(str::to_owned);
        for name in AUTH_COOKIE_NAMES {
            for variant in expiring_variants(name, host.as_deref()) {
                jar.add_cookie_str(&variant.to_string(), &self.site);
            }
        }
        debug!(target: "auth.sweeper", host = host.as_deref().unwrap_or("-"), "expired auth cookies");
    }

    fn sweep_storage(&self) {
        let Some(storage) = &self.storage else { return };
        let keys = match storage.keys() {
            Ok(keys) => keys,
            Err(err) => {
                debug!(target: "auth.sweeper", error = %err, "could not enumerate storage");
                return;
            }
        };
        for key in keys {
            if !is_auth_key(&key) {
                continue;
            }
            if let Err(err) = storage.remove(&key) {
                debug!(target: "auth.sweeper", key = key.as_str(), error = %err, "could not remove key");
            }
        }
    }
}

fn is_auth_key(key: &str) -> bool {
    AUTH_KEY_MARKERS.iter().any(|marker| key.contains(marker))
}

/// Expiring rewrites covering the scope combinations the cookie could have
/// originally been set with: bare, path-rooted, host-scoped, and
/// dot-prefixed host.
fn expiring_variants(name: &str, host: Option<&str>) -> Vec<Cookie<'static>> {
    let mut variants = Vec::with_capacity(4);
    variants.push(
        Cookie::build((name.to_owned(), ""))
            .max_age(CookieDuration::ZERO)
            .build(),
    );
    variants.push(
        Cookie::build((name.to_owned(), ""))
            .path("/")
            .max_age(CookieDuration::ZERO)
            .build(),
    );
    if let Some(host) = host {
        variants.push(
            Cookie::build((name.to_owned(), ""))
                .path("/")
                .domain(host.to_owned())
                .max_age(CookieDuration::ZERO)
                .build(),
        );
        variants.push(
            Cookie::build((name.to_owned(), ""))
                .path("/")
                .domain(format!(".{host}"))
                .max_age(CookieDuration::ZERO)
                .build(),
        );
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageArea};
    use reqwest::cookie::CookieStore;

    fn site() -> Url {
        Url::parse("https://courtside.test/").expect("site url")
    }

    fn jar_cookies(jar: &Jar) -> String {
        jar.cookies(&site())
            .map(|header| header.to_str().unwrap_or_default().to_owned())
            .unwrap_or_default()
    }

    #[test]
    fn auth_key_predicate() {
        assert!(is_auth_key("supabase.session.v1"));
        assert!(is_auth_key("courtside-auth-token"));
        assert!(is_auth_key("sb-auth-refresh"));
        assert!(!is_auth_key("theme"));
        assert!(!is_auth_key("scoreboard-layout"));
    }

    #[test]
    fn expiring_variants_cover_all_scopes() {
        let variants = expiring_variants("sb-access-token", Some("courtside.test"));
        assert_eq!(variants.len(), 4);
        assert!(variants.iter().all(|cookie| cookie.value().is_empty()));
        assert!(
            variants
                .iter()
                .all(|cookie| cookie.max_age() == Some(CookieDuration::ZERO))
        );
        let domains: Vec<_> = variants.iter().filter_map(|cookie| cookie.domain()).collect();
        assert!(domains.contains(&"courtside.test"));
    }

    #[test]
    fn sweep_expires_auth_cookies_and_keeps_the_rest() {
        let jar = Arc::new(Jar::default());
        jar.add_cookie_str("sb-access-token=abc; Path=/", &site());
        jar.add_cookie_str("sb-refresh-token=def; Path=/", &site());
        jar.add_cookie_str("scoreboard=compact; Path=/", &site());

        let sweeper = CredentialSweeper::new(site()).with_jar(jar.clone());
        sweeper.sweep();

        let remaining = jar_cookies(&jar);
        assert!(!remaining.contains("sb-access-token"));
        assert!(!remaining.contains("sb-refresh-token"));
        assert!(remaining.contains("scoreboard=compact"));
    }

    #[test]
    fn sweep_purges_auth_storage_keys() {
        let storage: Arc<dyn StorageArea> = Arc::new(MemoryStorage::new());
        storage.set("supabase.session.v1", "{}").unwrap();
        storage.set("courtside-auth-token", "{}").unwrap();
        storage.set("theme", "dark").unwrap();

        let sweeper = CredentialSweeper::new(site()).with_storage(storage.clone());
        sweeper.sweep();

        assert_eq!(storage.keys().unwrap(), vec!["theme".to_owned()]);
    }

    #[test]
    fn sweep_is_idempotent() {
        let jar = Arc::new(Jar::default());
        jar.add_cookie_str("supabase-auth-token=xyz; Path=/", &site());
        let storage: Arc<dyn StorageArea> = Arc::new(MemoryStorage::new());
        storage.set("supabase.session.v1", "{}").unwrap();

        let sweeper = CredentialSweeper::new(site())
            .with_jar(jar.clone())
            .with_storage(storage.clone());
        sweeper.sweep();
        let after_first = (jar_cookies(&jar), storage.keys().unwrap());
        sweeper.sweep();
        let after_second = (jar_cookies(&jar), storage.keys().unwrap());

        assert_eq!(after_first, after_second);
        assert!(!after_second.0.contains("supabase-auth-token"));
        assert!(after_second.1.is_empty());
    }

    #[test]
    fn sweep_without_handles_is_a_no_op() {
        CredentialSweeper::new(site()).sweep();
    }
}
